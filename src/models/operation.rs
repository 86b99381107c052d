use serde::{Deserialize, Serialize};

use crate::errors::StreamError;

/// Outcome of a public lifecycle operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: &StreamError) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<Result<String, StreamError>> for OperationResult {
    fn from(result: Result<String, StreamError>) -> Self {
        match result {
            Ok(message) => Self::ok(message),
            Err(error) => Self::failed(&error),
        }
    }
}
