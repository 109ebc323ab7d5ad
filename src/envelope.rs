//! Uniform response envelope and the error taxonomy that feeds it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::StoreError;
use crate::tools::{Rejection, ToolError};

/// Category of a failed dispatch, as seen by callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownTool,
    InvalidArguments,
    NotFound,
    ExecutorFailure,
    StoreFailure,
}

/// Every way a dispatch can fail.  Converted to an [`Envelope`] at the
/// dispatcher boundary; never surfaced to callers as-is.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    ExecutorFailure(String),
    #[error("{0}")]
    StoreFailure(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::UnknownTool(_) => ErrorKind::UnknownTool,
            DispatchError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            DispatchError::NotFound(_) => ErrorKind::NotFound,
            DispatchError::ExecutorFailure(_) => ErrorKind::ExecutorFailure,
            DispatchError::StoreFailure(_) => ErrorKind::StoreFailure,
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => DispatchError::NotFound(id),
            other => DispatchError::StoreFailure(other.to_string()),
        }
    }
}

impl From<ToolError> for DispatchError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Executor(msg) => DispatchError::ExecutorFailure(msg),
            ToolError::Store(e) => e.into(),
        }
    }
}

impl From<Rejection> for DispatchError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::UnknownTool(name) => DispatchError::UnknownTool(name),
            Rejection::InvalidArguments(msg) => DispatchError::InvalidArguments(msg),
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Synchronous tool finished.
    Text(String),
    /// Asynchronous tool accepted; poll the job id for the outcome.
    JobAccepted(String),
    Error { kind: ErrorKind, message: String },
}

impl Envelope {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Envelope::Error { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Envelope::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Envelope::JobAccepted(id) => Some(id),
            _ => None,
        }
    }

    /// Single text rendering, for transports that only carry text.
    pub fn to_text(&self) -> String {
        match self {
            Envelope::Text(text) => text.clone(),
            Envelope::JobAccepted(id) => format!("Migration job started with ID: {id}"),
            Envelope::Error { message, .. } => format!("Error: {message}"),
        }
    }
}

impl From<DispatchError> for Envelope {
    fn from(err: DispatchError) -> Self {
        Envelope::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Wire form: `{ok, text}`, `{ok, jobId}` or `{ok, kind, message}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&Envelope> for WireEnvelope {
    fn from(env: &Envelope) -> Self {
        let mut wire = WireEnvelope {
            ok: env.is_ok(),
            text: None,
            job_id: None,
            kind: None,
            message: None,
        };
        match env {
            Envelope::Text(text) => wire.text = Some(text.clone()),
            Envelope::JobAccepted(id) => wire.job_id = Some(id.clone()),
            Envelope::Error { kind, message } => {
                wire.kind = Some(*kind);
                wire.message = Some(message.clone());
            }
        }
        wire
    }
}

impl Serialize for Envelope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireEnvelope::from(self).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shapes() {
        assert_eq!(
            serde_json::to_value(Envelope::Text("hi".into())).unwrap(),
            json!({ "ok": true, "text": "hi" })
        );
        assert_eq!(
            serde_json::to_value(Envelope::JobAccepted("job-1".into())).unwrap(),
            json!({ "ok": true, "jobId": "job-1" })
        );
        let err: Envelope = DispatchError::NotFound("job-9".into()).into();
        assert_eq!(
            serde_json::to_value(err).unwrap(),
            json!({ "ok": false, "kind": "NotFound", "message": "job not found: job-9" })
        );
    }

    #[test]
    fn store_not_found_maps_to_not_found_kind() {
        let err: DispatchError = ToolError::Store(StoreError::NotFound("x".into())).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err: DispatchError = StoreError::Storage("disk gone".into()).into();
        assert_eq!(err.kind(), ErrorKind::StoreFailure);
    }
}
