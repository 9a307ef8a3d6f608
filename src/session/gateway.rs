// src/session/gateway.rs  -  Single-flight wrapper around the mark endpoint
//
// At most one request is in flight.  The status goes idle → loading →
// success | error and stays there until the operator resumes scanning
// (`reset_marking_status`).  There is no timer reset and no automatic
// retry: a retried mark could double-record a student if the first request
// reached the server after we gave up on it.
use chrono::Utc;
use std::sync::Arc;

use crate::api::{ApiError, AttendanceApi};
use crate::model::{AttendanceMarkRequest, MarkResponse};
use crate::task::{Pending, Poll};

use super::resolver::MarkIntent;

pub const AUTH_REQUIRED:        &str = "Authentication required.";
pub const MARK_FAILED_FALLBACK: &str = "Failed to mark attendance.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkingStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkError {
    #[error("a mark request is already in flight")]
    Busy,
    #[error("Authentication required.")]
    Unauthenticated,
}

/// Credentials of the operator session.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub token:   Option<String>,
    pub user_id: Option<String>,
}

impl AuthState {
    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

struct InFlight {
    /// Scan session the request was sent for
    session:    u64,
    student_id: String,
    pending:    Pending<Result<MarkResponse, ApiError>>,
}

pub struct MarkingGateway {
    api:       Arc<dyn AttendanceApi>,
    auth:      AuthState,
    status:    MarkingStatus,
    error:     Option<String>,
    message:   Option<String>,
    in_flight: Option<InFlight>,
    session:   u64,
}

impl MarkingGateway {
    pub fn new(api: Arc<dyn AttendanceApi>, auth: AuthState) -> Self {
        Self {
            api,
            auth,
            status:    MarkingStatus::Idle,
            error:     None,
            message:   None,
            in_flight: None,
            session:   0,
        }
    }

    pub fn status(&self) -> MarkingStatus { self.status }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }
    /// Server message of the last successful mark
    pub fn message(&self) -> Option<&str> { self.message.as_deref() }
    pub fn is_loading(&self) -> bool { self.status == MarkingStatus::Loading }
    pub fn auth(&self) -> &AuthState { &self.auth }

    pub fn mark(&mut self, intent: &MarkIntent) -> Result<(), MarkError> {
        if self.in_flight.is_some() {
            log::debug!("[gateway] busy, mark for {} refused", intent.student_id);
            return Err(MarkError::Busy);
        }
        let Some(token) = self.auth.bearer().map(str::to_string) else {
            log::warn!("[gateway] no bearer token, mark for {} not sent", intent.student_id);
            self.status = MarkingStatus::Error;
            self.error  = Some(AUTH_REQUIRED.to_string());
            return Err(MarkError::Unauthenticated);
        };

        let request = AttendanceMarkRequest {
            student_id:        intent.student_id.clone(),
            class_instance_id: intent.class_instance_id.clone(),
            marked_by_user_id: self.auth.user_id.clone().unwrap_or_default(),
            timestamp:         Utc::now(),
            status:            intent.status.clone(),
            notes:             intent.notes.clone(),
        };
        log::info!("[gateway] marking {} in {}", request.student_id, request.class_instance_id);

        self.status  = MarkingStatus::Loading;
        self.error   = None;
        self.message = None;
        let api = Arc::clone(&self.api);
        self.in_flight = Some(InFlight {
            session:    self.session,
            student_id: intent.student_id.clone(),
            pending:    Pending::spawn("mark-attendance", move || api.mark_attendance(&token, &request)),
        });
        Ok(())
    }

    /// Apply a finished request.  Returns the new status when one landed.
    pub fn poll(&mut self) -> Option<MarkingStatus> {
        let flight = self.in_flight.as_ref()?;
        let result = match flight.pending.try_take() {
            Poll::Waiting  => return None,
            Poll::Ready(r) => r,
            Poll::Lost     => Err(ApiError::Transport("mark request worker stopped".into())),
        };
        let flight = self.in_flight.take()?;

        // Applied regardless: the operator may already be on the next scan,
        // but the server did (or did not) record this one.
        if flight.session != self.session {
            log::warn!(
                "[gateway] late response for {} applied after the scan was dismissed",
                flight.student_id
            );
        }

        match result {
            Ok(resp) => {
                log::info!("[gateway] {} marked", flight.student_id);
                self.status  = MarkingStatus::Success;
                self.message = resp.message;
            }
            Err(e) => {
                let reason = failure_reason(&e);
                log::warn!("[gateway] mark for {} failed: {reason}", flight.student_id);
                self.status = MarkingStatus::Error;
                self.error  = Some(reason);
            }
        }
        Some(self.status)
    }

    /// Operator resumes scanning.  No-op when already idle.
    pub fn reset_marking_status(&mut self) {
        if self.status == MarkingStatus::Idle && self.error.is_none() && self.message.is_none() {
            return;
        }
        self.status  = MarkingStatus::Idle;
        self.error   = None;
        self.message = None;
        self.session += 1;
    }
}

/// Server message, else the error's own message, else a generic one.
pub fn failure_reason(err: &ApiError) -> String {
    if let Some(m) = err.server_message() {
        return m.to_string();
    }
    let own = match err {
        ApiError::Rejected { .. } => String::new(),
        other => other.to_string(),
    };
    if own.trim().is_empty() { MARK_FAILED_FALLBACK.to_string() } else { own }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Records requests; each call blocks until the test releases a result.
    struct GatedApi {
        seen:    Mutex<Vec<(String, AttendanceMarkRequest)>>,
        results: Mutex<Receiver<Result<MarkResponse, ApiError>>>,
    }

    fn gated() -> (Arc<GatedApi>, Sender<Result<MarkResponse, ApiError>>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(GatedApi { seen: Mutex::new(Vec::new()), results: Mutex::new(rx) }), tx)
    }

    impl AttendanceApi for GatedApi {
        fn mark_attendance(&self, token: &str, request: &AttendanceMarkRequest) -> Result<MarkResponse, ApiError> {
            self.seen.lock().unwrap().push((token.to_string(), request.clone()));
            self.results.lock().unwrap()
                .recv()
                .unwrap_or_else(|_| Err(ApiError::Transport("test ended".into())))
        }
    }

    fn auth() -> AuthState {
        AuthState { token: Some("tok-1".into()), user_id: Some("op_7".into()) }
    }

    fn intent(student: &str) -> MarkIntent {
        MarkIntent { student_id: student.into(), class_instance_id: "cls_1".into(), status: None, notes: None }
    }

    fn settle(gw: &mut MarkingGateway) -> MarkingStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(s) = gw.poll() { return s; }
            assert!(Instant::now() < deadline, "mark request never finished");
            std::thread::yield_now();
        }
    }

    #[test]
    fn success_path_sends_one_authenticated_request() {
        let (api, tx) = gated();
        let mut gw = MarkingGateway::new(api.clone(), auth());
        gw.mark(&intent("u_42")).unwrap();
        assert_eq!(gw.status(), MarkingStatus::Loading);

        tx.send(Ok(MarkResponse { success: true, message: Some("Marked present".into()) })).unwrap();
        assert_eq!(settle(&mut gw), MarkingStatus::Success);
        assert_eq!(gw.message(), Some("Marked present"));

        let seen = api.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "tok-1");
        assert_eq!(seen[0].1.student_id, "u_42");
        assert_eq!(seen[0].1.marked_by_user_id, "op_7");
    }

    #[test]
    fn second_mark_while_in_flight_is_refused() {
        let (api, tx) = gated();
        let mut gw = MarkingGateway::new(api.clone(), auth());
        gw.mark(&intent("u_1")).unwrap();
        assert_eq!(gw.mark(&intent("u_2")), Err(MarkError::Busy));
        tx.send(Ok(MarkResponse { success: true, message: None })).unwrap();
        settle(&mut gw);
        assert_eq!(api.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_token_fails_without_request() {
        let (api, _tx) = gated();
        let mut gw = MarkingGateway::new(api.clone(), AuthState { token: Some("  ".into()), user_id: None });
        assert_eq!(gw.mark(&intent("u_1")), Err(MarkError::Unauthenticated));
        assert_eq!(gw.status(), MarkingStatus::Error);
        assert_eq!(gw.error(), Some("Authentication required."));
        assert_eq!(gw.poll(), None);
        assert!(api.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn failure_reason_priority() {
        assert_eq!(failure_reason(&ApiError::Rejected { message: Some("Already marked".into()) }), "Already marked");
        assert_eq!(failure_reason(&ApiError::Transport("Request timed out.".into())), "Request timed out.");
        assert_eq!(failure_reason(&ApiError::Rejected { message: None }), MARK_FAILED_FALLBACK);
        assert_eq!(failure_reason(&ApiError::Transport(String::new())), MARK_FAILED_FALLBACK);
    }

    #[test]
    fn server_rejection_surfaces_as_error_status() {
        let (api, tx) = gated();
        let mut gw = MarkingGateway::new(api, auth());
        gw.mark(&intent("u_1")).unwrap();
        tx.send(Err(ApiError::Rejected { message: Some("Session closed".into()) })).unwrap();
        assert_eq!(settle(&mut gw), MarkingStatus::Error);
        assert_eq!(gw.error(), Some("Session closed"));
        // nothing left in flight, no retry happened
        assert_eq!(gw.poll(), None);
        assert_eq!(gw.status(), MarkingStatus::Error);
    }

    #[test]
    fn reset_is_idempotent_and_never_automatic() {
        let (api, tx) = gated();
        let mut gw = MarkingGateway::new(api, auth());
        gw.reset_marking_status();
        assert_eq!(gw.status(), MarkingStatus::Idle);

        gw.mark(&intent("u_1")).unwrap();
        tx.send(Ok(MarkResponse { success: true, message: None })).unwrap();
        settle(&mut gw);
        assert_eq!(gw.poll(), None);
        assert_eq!(gw.status(), MarkingStatus::Success);

        gw.reset_marking_status();
        gw.reset_marking_status();
        assert_eq!(gw.status(), MarkingStatus::Idle);
        assert_eq!(gw.error(), None);
    }

    #[test]
    fn late_response_after_reset_is_still_applied() {
        let (api, tx) = gated();
        let mut gw = MarkingGateway::new(api, auth());
        gw.mark(&intent("u_1")).unwrap();
        gw.reset_marking_status(); // operator dismissed while loading
        assert_eq!(gw.status(), MarkingStatus::Idle);
        assert_eq!(gw.mark(&intent("u_2")), Err(MarkError::Busy));

        tx.send(Ok(MarkResponse { success: true, message: None })).unwrap();
        assert_eq!(settle(&mut gw), MarkingStatus::Success);
    }
}
