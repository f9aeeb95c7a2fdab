//! Backend stream message

use serde::{Deserialize, Serialize};

/// One newline-delimited JSON object from the backend stream
///
/// Every field is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendMessage {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
    /// Opaque payload for renaming UI elsewhere; never parsed here
    #[serde(default)]
    pub structured_data: Option<serde_json::Value>,
}

impl BackendMessage {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: Some(true),
            ..Default::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.unwrap_or(false)
    }

    pub fn output_text(&self) -> &str {
        self.output.as_deref().unwrap_or("")
    }
}
