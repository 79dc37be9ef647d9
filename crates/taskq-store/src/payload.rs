use tracing::warn;

use crate::error::StoreError;

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub payload_warn_threshold_bytes: usize,
    pub payload_max_size_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            payload_warn_threshold_bytes: 1024 * 1024,
            payload_max_size_bytes: 2 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Rejects payloads above the hard limit and logs the ones above the soft limit.
    pub fn validate_payload(
        &self,
        payload: &serde_json::Value,
        context: &str,
    ) -> Result<(), StoreError> {
        let size = serde_json::to_vec(payload)?.len();
        if size > self.payload_max_size_bytes {
            return Err(StoreError::invalid_argument(format!(
                "{} exceeds maximum size of {} bytes ({} bytes). Store large data externally and enqueue a reference.",
                context, self.payload_max_size_bytes, size
            )));
        }

        if size > self.payload_warn_threshold_bytes {
            warn!(
                size_bytes = size,
                context = context,
                "Payload exceeds {} bytes. Consider storing large data externally.",
                self.payload_warn_threshold_bytes
            );
        }

        Ok(())
    }
}
