//! Shared model fragments

use serde::{Deserialize, Serialize};

/// Provenance stamp carried by every produced document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl ToolInfo {
    pub fn current() -> Self {
        ToolInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// One recorded per-package error: step, timestamp, message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepError {
    pub step: String,
    pub time: String,
    pub message: String,
}

impl StepError {
    pub fn new(step: &str, message: &str) -> Self {
        StepError {
            step: step.to_string(),
            time: chrono::Utc::now().to_rfc3339(),
            message: message.to_string(),
        }
    }
}
