// src/session/selector.rs  -  Target class + casual-mode state
//
// Two slots with one rule between them: a scan either marks attendance for
// a selected class or, in casual mode, only identifies the student.  Never
// both.  Selecting a class turns casual mode off; turning casual mode on
// clears the class.
use std::sync::Arc;

use crate::api::{ApiError, ClassOptionsSource};
use crate::model::ClassSessionTarget;
use crate::task::{Pending, Poll};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    Succeeded,
    Failed(String),
}

pub struct ClassSelector {
    selected:     Option<ClassSessionTarget>,
    casual:       bool,
    options:      Vec<ClassSessionTarget>,
    status:       FetchStatus,
    pending:      Option<Pending<Result<Vec<ClassSessionTarget>, ApiError>>>,
    /// Class id requested before the options were loaded
    preferred_id: Option<String>,
}

impl Default for ClassSelector {
    fn default() -> Self { Self::new() }
}

impl ClassSelector {
    pub fn new() -> Self {
        Self {
            selected:     None,
            casual:       false,
            options:      Vec::new(),
            status:       FetchStatus::Idle,
            pending:      None,
            preferred_id: None,
        }
    }

    pub fn select_class(&mut self, target: ClassSessionTarget) {
        if self.casual {
            log::info!("[selector] class selected → casual mode off");
        }
        log::info!("[selector] class '{}' ({})", target.label(), target.id);
        self.casual   = false;
        self.selected = Some(target);
    }

    /// Select one of the loaded options.  Before the options arrive the id
    /// is remembered and applied when they do.
    pub fn select_class_by_id(&mut self, id: &str) -> bool {
        if let Some(t) = self.options.iter().find(|o| o.id == id).cloned() {
            self.preferred_id = None;
            self.select_class(t);
            return true;
        }
        if self.status != FetchStatus::Succeeded {
            self.preferred_id = Some(id.to_string());
        } else {
            log::warn!("[selector] no class with id '{id}'");
        }
        false
    }

    /// Step to the next loaded option (wraps; from "none" picks the first).
    pub fn cycle_class(&mut self) -> Option<&ClassSessionTarget> {
        if self.options.is_empty() {
            return None;
        }
        let next = match &self.selected {
            Some(cur) => self.options.iter()
                .position(|o| o.id == cur.id)
                .map_or(0, |i| (i + 1) % self.options.len()),
            None => 0,
        };
        let target = self.options[next].clone();
        self.select_class(target);
        self.selected.as_ref()
    }

    pub fn set_casual_scan_mode(&mut self, on: bool) {
        if on && self.selected.is_some() {
            log::info!("[selector] casual mode on → class cleared");
        }
        self.casual = on;
        if on {
            self.selected     = None;
            self.preferred_id = None;
        }
    }

    /// Drop the selection (unmount / input mode switch).
    pub fn clear(&mut self) {
        self.selected     = None;
        self.casual       = false;
        self.preferred_id = None;
    }

    pub fn selected_class(&self) -> Option<&ClassSessionTarget> { self.selected.as_ref() }

    /// Selected class id, `""` when none.
    pub fn selected_class_id(&self) -> &str {
        self.selected.as_ref().map_or("", |c| c.id.as_str())
    }

    pub fn is_casual(&self) -> bool { self.casual }

    pub fn options(&self) -> &[ClassSessionTarget] { &self.options }

    pub fn status(&self) -> &FetchStatus { &self.status }

    pub fn can_retry(&self) -> bool { matches!(self.status, FetchStatus::Failed(_)) }

    /// Start loading options unless already loading or loaded.  After a
    /// failure this is the retry.  Returns whether a fetch was started.
    pub fn fetch_options(&mut self, source: Arc<dyn ClassOptionsSource>, token: Option<String>) -> bool {
        if matches!(self.status, FetchStatus::Loading | FetchStatus::Succeeded) {
            return false;
        }
        log::debug!("[selector] fetching class options");
        self.status  = FetchStatus::Loading;
        self.pending = Some(Pending::spawn("class-options", move || {
            source.fetch_class_options(token.as_deref())
        }));
        true
    }

    /// Apply a finished fetch.  Returns true when the status changed.
    pub fn poll(&mut self) -> bool {
        let Some(pending) = &self.pending else { return false; };
        let result = match pending.try_take() {
            Poll::Waiting  => return false,
            Poll::Ready(r) => r,
            Poll::Lost     => Err(ApiError::Transport("class options worker stopped".into())),
        };
        self.pending = None;
        self.apply_fetch(result);
        true
    }

    fn apply_fetch(&mut self, result: Result<Vec<ClassSessionTarget>, ApiError>) {
        match result {
            Ok(options) => {
                log::info!("[selector] {} class options loaded", options.len());
                self.options = options;
                self.status  = FetchStatus::Succeeded;
                if let Some(id) = self.preferred_id.take() {
                    self.select_class_by_id(&id);
                }
            }
            Err(e) => {
                log::warn!("[selector] class options failed: {e}");
                self.status = FetchStatus::Failed(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn class(id: &str) -> ClassSessionTarget {
        ClassSessionTarget { id: id.into(), course_name: "CS101".into(), session_name: id.to_uppercase() }
    }

    /// Hands out scripted results, counting calls.
    struct ScriptedOptions {
        results: Mutex<Vec<Result<Vec<ClassSessionTarget>, ApiError>>>,
        calls:   AtomicUsize,
    }

    impl ScriptedOptions {
        fn new(results: Vec<Result<Vec<ClassSessionTarget>, ApiError>>) -> Arc<Self> {
            Arc::new(Self { results: Mutex::new(results), calls: AtomicUsize::new(0) })
        }
    }

    impl ClassOptionsSource for ScriptedOptions {
        fn fetch_class_options(&self, _token: Option<&str>) -> Result<Vec<ClassSessionTarget>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.lock().unwrap().remove(0)
        }
    }

    fn settle(sel: &mut ClassSelector) {
        while !sel.poll() {
            std::thread::yield_now();
        }
    }

    #[test]
    fn selecting_a_class_turns_casual_off() {
        let mut sel = ClassSelector::new();
        sel.set_casual_scan_mode(true);
        sel.select_class(class("cls_1"));
        assert!(!sel.is_casual());
        assert_eq!(sel.selected_class_id(), "cls_1");
    }

    #[test]
    fn casual_mode_clears_the_class() {
        let mut sel = ClassSelector::new();
        sel.select_class(class("cls_1"));
        sel.set_casual_scan_mode(true);
        assert!(sel.is_casual());
        assert_eq!(sel.selected_class_id(), "");
        assert!(sel.selected_class().is_none());

        // turning casual off does not bring the class back
        sel.set_casual_scan_mode(false);
        assert!(sel.selected_class().is_none());
    }

    #[test]
    fn fetch_is_idempotent_once_loaded() {
        let src = ScriptedOptions::new(vec![Ok(vec![class("a"), class("b")])]);
        let mut sel = ClassSelector::new();
        assert!(sel.fetch_options(src.clone(), None));
        assert!(!sel.fetch_options(src.clone(), None)); // still loading
        settle(&mut sel);
        assert_eq!(sel.status(), &FetchStatus::Succeeded);
        assert!(!sel.fetch_options(src.clone(), None));
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sel.options().len(), 2);
    }

    #[test]
    fn failure_offers_retry_and_does_not_block_casual_mode() {
        let src = ScriptedOptions::new(vec![
            Err(ApiError::Transport("connection refused".into())),
            Ok(vec![class("a")]),
        ]);
        let mut sel = ClassSelector::new();
        sel.fetch_options(src.clone(), Some("tok".into()));
        settle(&mut sel);
        assert!(sel.can_retry());
        assert_eq!(sel.status(), &FetchStatus::Failed("connection refused".into()));

        sel.set_casual_scan_mode(true);
        assert!(sel.is_casual());

        assert!(sel.fetch_options(src.clone(), Some("tok".into())));
        settle(&mut sel);
        assert!(!sel.can_retry());
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn preferred_id_applies_when_options_arrive() {
        let src = ScriptedOptions::new(vec![Ok(vec![class("a"), class("cls_1")])]);
        let mut sel = ClassSelector::new();
        assert!(!sel.select_class_by_id("cls_1"));
        sel.fetch_options(src, None);
        settle(&mut sel);
        assert_eq!(sel.selected_class_id(), "cls_1");
    }

    #[test]
    fn cycle_wraps_through_options() {
        let src = ScriptedOptions::new(vec![Ok(vec![class("a"), class("b")])]);
        let mut sel = ClassSelector::new();
        assert!(sel.cycle_class().is_none());
        sel.fetch_options(src, None);
        settle(&mut sel);
        sel.set_casual_scan_mode(true);
        assert_eq!(sel.cycle_class().unwrap().id, "a");
        assert!(!sel.is_casual());
        assert_eq!(sel.cycle_class().unwrap().id, "b");
        assert_eq!(sel.cycle_class().unwrap().id, "a");
    }
}
