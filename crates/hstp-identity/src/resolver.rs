//! The resolver seam every DID method implements.

use crate::error::IdentityError;
use async_trait::async_trait;
use hstp_types::{Did, ResolvedDid};

/// Resolve an identity to its document and metadata.
///
/// A deactivated identity resolves successfully with
/// `metadata.deactivated = true`; only genuine failures return an error.
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &Did) -> Result<ResolvedDid, IdentityError>;
}
