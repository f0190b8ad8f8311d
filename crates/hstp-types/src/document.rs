//! # Identity Documents
//!
//! A resolved DID document plus its resolution metadata. Documents are
//! immutable once fetched: a new resolution yields a new `ResolvedDid`,
//! never an in-place update.

use crate::identity::Did;
use crate::time::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A public key or other verification material bound to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub controller: Did,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
}

/// A service endpoint advertised by an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub service_endpoint: String,
}

/// The resolved document: keys, service endpoints, controller relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: Did,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controller: Vec<Did>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceEndpoint>,
}

impl DidDocument {
    /// A document carrying only its subject.
    #[must_use]
    pub fn new(id: Did) -> Self {
        Self {
            id,
            controller: Vec::new(),
            verification_method: Vec::new(),
            service: Vec::new(),
        }
    }

    /// Find a service endpoint by its `type`.
    #[must_use]
    pub fn service_of_kind(&self, kind: &str) -> Option<&ServiceEndpoint> {
        self.service.iter().find(|s| s.kind == kind)
    }
}

/// Metadata produced by a single resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default)]
    pub deactivated: bool,
    pub fetched_at: Timestamp,
}

impl ResolutionMetadata {
    /// Metadata for an active identity fetched at `fetched_at`.
    #[must_use]
    pub fn active(fetched_at: Timestamp) -> Self {
        Self {
            updated: None,
            version_id: None,
            deactivated: false,
            fetched_at,
        }
    }
}

/// `(document, metadata)` pair returned by resolution.
///
/// The document is shared behind an `Arc`; cloning a `ResolvedDid` never
/// copies the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDid {
    pub document: Arc<DidDocument>,
    pub metadata: ResolutionMetadata,
}

impl ResolvedDid {
    #[must_use]
    pub fn new(document: DidDocument, metadata: ResolutionMetadata) -> Self {
        Self {
            document: Arc::new(document),
            metadata,
        }
    }

    /// A deactivated-shaped result for `did`: empty document,
    /// `deactivated = true`.
    #[must_use]
    pub fn deactivated(did: Did, fetched_at: Timestamp) -> Self {
        Self::new(
            DidDocument::new(did),
            ResolutionMetadata {
                deactivated: true,
                ..ResolutionMetadata::active(fetched_at)
            },
        )
    }

    #[must_use]
    pub fn is_deactivated(&self) -> bool {
        self.metadata.deactivated
    }

    #[must_use]
    pub fn fetched_at(&self) -> Timestamp {
        self.metadata.fetched_at
    }
}
