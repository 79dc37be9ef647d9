use std::time::Duration;

use chrono::Utc;
use serde_json::json;

/// Why a handler invocation did not succeed.
#[derive(Debug)]
pub enum HandlerFailure {
    Failed(anyhow::Error),
    TimedOut(Duration),
}

impl HandlerFailure {
    /// The JSON stored in the quarantined row's `error` column.
    pub fn to_detail(&self) -> serde_json::Value {
        let failed_at = Utc::now().to_rfc3339();
        match self {
            Self::Failed(err) => json!({
                "message": err.to_string(),
                "chain": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
                "failed_at": failed_at,
            }),
            Self::TimedOut(limit) => json!({
                "message": format!("handler timed out after {}ms", limit.as_millis()),
                "chain": [],
                "failed_at": failed_at,
                "timed_out": true,
            }),
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "{err:#}"),
            Self::TimedOut(limit) => write!(f, "handler timed out after {limit:?}"),
        }
    }
}
