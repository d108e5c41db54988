//! Stream engine configuration

/// Tunables for stream reads, redirection and document upkeep
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Events fetched per backend call when iterating history
    pub read_page_size: usize,
    /// Maximum continuation hops a redirected write may take before the
    /// closed-stream error surfaces (guards against broken chains)
    pub hop_limit: u32,
    /// CAS retries when refreshing a routing document after commit
    pub document_update_retries: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_page_size: 256,
            hop_limit: 3,
            document_update_retries: 4,
        }
    }
}

impl StreamConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read page size
    pub fn with_read_page_size(mut self, read_page_size: usize) -> Self {
        self.read_page_size = read_page_size;
        self
    }

    /// Set the continuation hop limit
    pub fn with_hop_limit(mut self, hop_limit: u32) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    /// Set the document CAS retry bound
    pub fn with_document_update_retries(mut self, retries: u32) -> Self {
        self.document_update_retries = retries;
        self
    }
}
