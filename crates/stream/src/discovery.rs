//! Catch-up discovery
//!
//! Enumerates the object ids known for given object-type names as a lazy,
//! continuation-token-paginated sequence of work items. External rebuild
//! processes (projection catch-up, audits) walk this; it shares the
//! document-listing primitive with migration tooling but carries no
//! migration logic of its own.

use lode_core::error::Result;
use lode_core::traits::DocumentStore;
use lode_core::types::{ContinuationToken, ObjectIdentifier};
use std::collections::VecDeque;
use std::sync::Arc;

/// Default page size for discovery listings
const DEFAULT_PAGE_SIZE: usize = 256;

/// Lazy enumeration of entities by object-type name
#[derive(Clone)]
pub struct Discovery {
    documents: Arc<dyn DocumentStore>,
    page_size: usize,
}

impl Discovery {
    /// Bind discovery to a document store
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the listing page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Iterate every object id recorded for `object_name`, one page of
    /// documents per store call
    pub fn objects(&self, object_name: impl Into<String>) -> ObjectIter {
        ObjectIter {
            documents: Arc::clone(&self.documents),
            object_name: object_name.into(),
            token: None,
            page_size: self.page_size,
            buffered: VecDeque::new(),
            done: false,
        }
    }
}

/// Iterator over discovered object identifiers.
///
/// A store error ends the iteration after being yielded once.
pub struct ObjectIter {
    documents: Arc<dyn DocumentStore>,
    object_name: String,
    token: Option<ContinuationToken>,
    page_size: usize,
    buffered: VecDeque<ObjectIdentifier>,
    done: bool,
}

impl Iterator for ObjectIter {
    type Item = Result<ObjectIdentifier>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(object) = self.buffered.pop_front() {
            return Some(Ok(object));
        }
        if self.done {
            return None;
        }
        match self
            .documents
            .list(&self.object_name, self.token.take(), self.page_size)
        {
            Ok(page) => {
                match page.next {
                    Some(token) => self.token = Some(token),
                    None => self.done = true,
                }
                self.buffered.extend(page.objects);
                match self.buffered.pop_front() {
                    Some(object) => Some(Ok(object)),
                    None => {
                        self.done = true;
                        None
                    }
                }
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
