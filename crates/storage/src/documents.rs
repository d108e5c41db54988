//! In-memory document store
//!
//! Reference [`DocumentStore`]: routing documents in a `BTreeMap` keyed by
//! (object name, object id), so the listing primitive walks ids in a stable
//! order and a continuation token is simply the last id of the previous
//! page. Writes are compare-and-swap on the document's content hash.

use lode_core::document::{DocumentHash, ObjectDocument};
use lode_core::error::{Error, Result};
use lode_core::traits::{DiscoveryPage, DocumentStore};
use lode_core::types::{ContinuationToken, ObjectIdentifier};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// In-memory `DocumentStore` implementation
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<BTreeMap<(String, String), ObjectDocument>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn key(object: &ObjectIdentifier) -> (String, String) {
        (object.object_name.clone(), object.object_id.clone())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, object: &ObjectIdentifier) -> Result<Option<(ObjectDocument, DocumentHash)>> {
        let docs = self.docs.read();
        match docs.get(&Self::key(object)) {
            Some(doc) => {
                let hash = doc.hash()?;
                Ok(Some((doc.clone(), hash)))
            }
            None => Ok(None),
        }
    }

    fn set(&self, doc: &ObjectDocument, expected: Option<DocumentHash>) -> Result<DocumentHash> {
        let mut docs = self.docs.write();
        let key = Self::key(&doc.object);
        let current = docs.get(&key).map(|d| d.hash()).transpose()?;
        if current != expected {
            return Err(Error::DocumentConflict {
                object: doc.object.clone(),
            });
        }
        let new_hash = doc.hash()?;
        docs.insert(key, doc.clone());
        Ok(new_hash)
    }

    fn list(
        &self,
        object_name: &str,
        token: Option<ContinuationToken>,
        page_size: usize,
    ) -> Result<DiscoveryPage> {
        let docs = self.docs.read();
        let lower = match &token {
            Some(t) => Bound::Excluded((object_name.to_string(), t.as_str().to_string())),
            None => Bound::Included((object_name.to_string(), String::new())),
        };
        let mut objects = Vec::with_capacity(page_size.min(64));
        let mut more = false;
        for ((name, id), _) in docs.range((lower, Bound::Unbounded)) {
            if name != object_name {
                break;
            }
            if objects.len() == page_size {
                more = true;
                break;
            }
            objects.push(ObjectIdentifier::new(name.clone(), id.clone()));
        }
        let next = (more && !objects.is_empty())
            .then(|| ContinuationToken::new(objects.last().map(|o| o.object_id.clone()).unwrap_or_default()));
        Ok(DiscoveryPage { objects, next })
    }
}
