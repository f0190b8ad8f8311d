//! In-memory resolver for local identities.

use crate::error::IdentityError;
use crate::resolver::DidResolver;
use async_trait::async_trait;
use dashmap::DashMap;
use hstp_types::{Did, DidDocument, ResolutionMetadata, ResolvedDid, TimeSource};
use std::sync::Arc;

struct Record {
    document: Arc<DidDocument>,
    version: u64,
    deactivated: bool,
}

/// Resolves identities from documents held in memory.
///
/// Every `insert` bumps the record's version, so callers can observe that a
/// re-resolution produced a new document.
pub struct StaticResolver {
    records: DashMap<Did, Record>,
    clock: Arc<dyn TimeSource>,
}

impl StaticResolver {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Store (or replace) the document for its subject.
    pub fn insert(&self, document: DidDocument) {
        let did = document.id.clone();
        let version = self.records.get(&did).map_or(1, |r| r.version + 1);
        self.records.insert(
            did,
            Record {
                document: Arc::new(document),
                version,
                deactivated: false,
            },
        );
    }

    /// Store an empty document for `did`.
    pub fn insert_identity(&self, did: Did) {
        self.insert(DidDocument::new(did));
    }

    /// Mark an identity deactivated. Returns `false` if it is unknown.
    pub fn deactivate(&self, did: &Did) -> bool {
        match self.records.get_mut(did) {
            Some(mut record) => {
                record.deactivated = true;
                record.version += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, did: &Did) -> bool {
        self.records.remove(did).is_some()
    }
}

#[async_trait]
impl DidResolver for StaticResolver {
    async fn resolve(&self, did: &Did) -> Result<ResolvedDid, IdentityError> {
        let record = self
            .records
            .get(did)
            .ok_or_else(|| IdentityError::NotFound(did.clone()))?;

        Ok(ResolvedDid {
            document: record.document.clone(),
            metadata: ResolutionMetadata {
                version_id: Some(record.version.to_string()),
                deactivated: record.deactivated,
                ..ResolutionMetadata::active(self.clock.now())
            },
        })
    }
}
