// src/api/http.rs  -  reqwest client for the attendance backend
use reqwest::blocking::Client;
use std::time::Duration;

use super::{interpret_mark_response, parse_class_options, ApiError, AttendanceApi, ClassOptionsSource};
use crate::model::{AttendanceMarkRequest, ClassSessionTarget, MarkResponse};

pub struct HttpApi {
    base_url: String,
    client:   Client,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Transport("Request timed out.".into())
    } else {
        ApiError::Transport(e.to_string())
    }
}

impl AttendanceApi for HttpApi {
    fn mark_attendance(&self, token: &str, request: &AttendanceMarkRequest) -> Result<MarkResponse, ApiError> {
        let resp = self.client
            .post(self.url("/attendance/mark"))
            .bearer_auth(token)
            .json(request)
            .send()
            .map_err(transport)?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(transport)?;
        log::debug!("[http] POST /attendance/mark → {status}");
        interpret_mark_response(status, &body)
    }
}

impl ClassOptionsSource for HttpApi {
    fn fetch_class_options(&self, token: Option<&str>) -> Result<Vec<ClassSessionTarget>, ApiError> {
        let mut req = self.client.get(self.url("/attendance/classes"));
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        let resp = req.send().map_err(transport)?;
        let status = resp.status();
        let body = resp.text().map_err(transport)?;
        log::debug!("[http] GET /attendance/classes → {}", status.as_u16());
        if !status.is_success() {
            return Err(ApiError::Rejected { message: Some(format!("HTTP {}", status.as_u16())) });
        }
        parse_class_options(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalised() {
        let api = HttpApi::new("https://lms.example.org/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.url("/attendance/mark"), "https://lms.example.org/api/attendance/mark");
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        // port 9 (discard) on localhost is closed in test environments
        let api = HttpApi::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = api.fetch_class_options(None).unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
