// src/api/mod.rs  -  Backend seams: attendance marking + class options
pub mod http;

pub use http::HttpApi;

use serde::Deserialize;

use crate::model::{AttendanceMarkRequest, ClassSessionTarget, MarkResponse};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server answered and said no
    #[error("request rejected: {}", .message.as_deref().unwrap_or("no reason given"))]
    Rejected { message: Option<String> },

    #[error("{0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Message the server itself supplied, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { message } => message.as_deref().filter(|m| !m.trim().is_empty()),
            _ => None,
        }
    }
}

/// Mark-attendance endpoint.
pub trait AttendanceApi: Send + Sync {
    fn mark_attendance(&self, token: &str, request: &AttendanceMarkRequest) -> Result<MarkResponse, ApiError>;
}

/// Class/session options listing.
pub trait ClassOptionsSource: Send + Sync {
    fn fetch_class_options(&self, token: Option<&str>) -> Result<Vec<ClassSessionTarget>, ApiError>;
}

/// Map an HTTP status + body from the mark endpoint to an outcome.
pub fn interpret_mark_response(status: u16, body: &str) -> Result<MarkResponse, ApiError> {
    let parsed = serde_json::from_str::<MarkResponse>(body).ok();
    if (200..300).contains(&status) {
        return match parsed {
            Some(r) if r.success => Ok(r),
            Some(r)              => Err(ApiError::Rejected { message: r.message }),
            None => Err(ApiError::Decode(format!("HTTP {status}: body is not a mark response"))),
        };
    }
    // Error bodies often carry a message even without the `success` field
    let message = parsed.and_then(|r| r.message).or_else(|| error_body_message(body));
    Err(ApiError::Rejected {
        message: message.or_else(|| Some(format!("HTTP {status}"))),
    })
}

fn error_body_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error:   Option<String>,
    }
    let b: ErrorBody = serde_json::from_str(body).ok()?;
    b.message.or(b.error)
}

/// Class options come either as a bare array or wrapped in `{ "data": [...] }`.
pub fn parse_class_options(body: &str) -> Result<Vec<ClassSessionTarget>, ApiError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Options {
        Bare(Vec<ClassSessionTarget>),
        Wrapped { data: Vec<ClassSessionTarget> },
    }
    match serde_json::from_str::<Options>(body) {
        Ok(Options::Bare(v)) | Ok(Options::Wrapped { data: v }) => Ok(v),
        Err(e) => Err(ApiError::Decode(e.to_string())),
    }
}
