//! Classifier response types
//!
//! Backend-agnostic; produced by both the remote client and the mock.

use serde::Serialize;

/// The model's reply before extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawModelReply {
    /// `choices[0].message.content`; `None` when the model sent nothing
    pub content: Option<String>,
    /// Model name echoed by the service, if any
    pub model: Option<String>,
    /// Attempts it took to get this reply
    pub attempts: u32,
}

impl RawModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            model: None,
            attempts: 1,
        }
    }
}
