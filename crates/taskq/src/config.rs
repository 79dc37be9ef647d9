use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Upper bound on a single handler invocation. A handler that exceeds it
    /// is quarantined like any other failure. `None` lets handlers run as long
    /// as they need, holding their row lock throughout.
    pub handler_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }
}
