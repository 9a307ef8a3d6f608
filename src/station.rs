// src/station.rs  -  Scan station: wires listener, camera, selector, resolver, gateway
//
// Data flow per scan:
//
//   key burst / camera frame ─► ScanEvent ─► resolver ─► (mark intent) ─► gateway
//
// A scan opens the result modal.  While it is open the HID listener is off,
// the camera is not read and no further scan is processed; `resume` closes
// it.  Everything timed is driven by `tick(now)` from the main loop.
use std::sync::Arc;
use std::time::Instant;

use crate::api::ClassOptionsSource;
use crate::camera::CameraDecoder;
use crate::model::StudentLookupRecord;
use crate::roster::Roster;
use crate::scanner::{HidScannerListener, KeyInput, KeyOutcome, ScanEvent, ScanSource};
use crate::session::{
    AttendanceEvent, ClassSelector, EventBus, FetchStatus, MarkError, MarkingGateway,
    MarkingStatus, Resolution, ScanResolver, Subscription,
};

/// The scan currently shown to the operator.
#[derive(Debug, Clone)]
struct ScanModal {
    code:     String,
    source:   ScanSource,
    /// A mark was requested for this scan
    marking:  bool,
}

// ── Read-only view for the UI ─────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct StationView {
    pub class_label:      Option<String>,
    pub casual:           bool,
    pub fetch_status:     FetchStatus,
    pub class_count:      usize,
    pub can_retry:        bool,
    pub listener_active:  bool,
    pub camera_active:    bool,
    pub buffer:           String,
    pub roster_len:       usize,
    pub modal:            Option<ModalView>,
    pub revision:         u64,
    pub last_event:       Option<AttendanceEvent>,
}

#[derive(Debug, Clone)]
pub struct ModalView {
    pub code:     String,
    pub source:   ScanSource,
    pub student:  Option<StudentLookupRecord>,
    pub marking:  bool,
    pub status:   MarkingStatus,
    pub error:    Option<String>,
    pub message:  Option<String>,
}

pub struct ScanStation {
    listener:   HidScannerListener,
    camera:     Option<CameraDecoder>,
    selector:   ClassSelector,
    resolver:   ScanResolver,
    gateway:    MarkingGateway,
    roster:     Roster,
    classes:    Arc<dyn ClassOptionsSource>,
    events:     Option<Subscription>,
    modal:      Option<ScanModal>,
    /// Last key seen while the result was open
    modal_key:  Option<Instant>,
    revision:   u64,
    last_event: Option<AttendanceEvent>,
}

impl ScanStation {
    /// Mount the station: listener on, class options requested.
    pub fn new(
        mut listener: HidScannerListener,
        roster:       Roster,
        gateway:      MarkingGateway,
        classes:      Arc<dyn ClassOptionsSource>,
    ) -> Self {
        listener.enable();
        let mut station = Self {
            listener,
            camera:     None,
            selector:   ClassSelector::new(),
            resolver:   ScanResolver::new(),
            gateway,
            roster,
            classes,
            events:     None,
            modal:      None,
            modal_key:  None,
            revision:   0,
            last_event: None,
        };
        station.retry_class_fetch();
        station
    }

    /// Attach and start a camera source next to the HID listener.
    pub fn attach_camera(&mut self, mut camera: CameraDecoder) -> anyhow::Result<()> {
        camera.activate()?;
        self.camera = Some(camera);
        Ok(())
    }

    pub fn subscribe_events(&mut self, bus: &EventBus) {
        self.events = Some(bus.subscribe());
    }

    /// Unmount: stop listening, release the camera and the event feed.
    pub fn shutdown(&mut self) {
        self.listener.disable();
        if let Some(cam) = self.camera.as_mut() {
            cam.deactivate();
        }
        if let Some(sub) = self.events.take() {
            sub.unsubscribe();
        }
        self.selector.clear();
    }

    // ── Input ────────────────────────────────────────────────────────────────
    pub fn handle_key(&mut self, key: &KeyInput, now: Instant) -> KeyOutcome {
        if self.modal.is_some() {
            log::debug!("[station] key '{}' ignored while the result is open", key.key);
            self.modal_key = Some(now);
            return KeyOutcome::default();
        }
        let outcome = self.listener.on_key(key, now);
        if let Some(code) = &outcome.emitted {
            self.handle_scan(ScanEvent::new(code.as_str(), ScanSource::Hid));
        }
        if self.modal.is_some() {
            // the terminator of this scan may still be on its way
            self.modal_key = Some(now);
        }
        outcome
    }

    /// Enter/Space while the result is open.  Within the burst gap of the
    /// previous key it is a scanner terminator and is swallowed; otherwise
    /// it is the operator resuming.
    pub fn dismiss_key(&mut self, now: Instant) -> bool {
        let in_burst = self.modal_key
            .is_some_and(|t| now.saturating_duration_since(t) < self.listener.threshold());
        self.modal_key = Some(now);
        if in_burst {
            log::debug!("[station] terminator of a scanner burst swallowed");
            return false;
        }
        self.resume(now)
    }

    /// Process one detection.  Returns false when the scan was refused.
    pub fn handle_scan(&mut self, event: ScanEvent) -> bool {
        if self.gateway.is_loading() {
            log::debug!("[station] '{}' refused: mark in progress", event.code);
            return false;
        }
        if self.modal.is_some() {
            log::debug!("[station] '{}' refused: result still open", event.code);
            return false;
        }

        log::info!(
            "[station] scan '{}' via {:?} at {}",
            event.code, event.source, event.scanned_at.format("%H:%M:%S")
        );
        self.listener.disable();
        self.resolver.begin();
        let mut marking = false;

        match self.resolver.resolve(&event.code, &self.roster, &self.selector) {
            Some(Resolution::Found { mark: Some(intent), .. }) => {
                match self.gateway.mark(&intent) {
                    Ok(()) => marking = true,
                    Err(MarkError::Unauthenticated) => marking = true,
                    Err(MarkError::Busy) => {
                        log::warn!("[station] previous mark still running, {} not marked", intent.student_id);
                    }
                }
            }
            Some(Resolution::Found { mark: None, .. }) | Some(Resolution::NotFound { .. }) | None => {}
        }

        self.modal = Some(ScanModal { code: event.code, source: event.source, marking });
        true
    }

    // ── Timed work ───────────────────────────────────────────────────────────
    pub fn tick(&mut self, now: Instant) {
        if let Some(code) = self.listener.tick(now) {
            self.handle_scan(ScanEvent::new(code, ScanSource::Hid));
        }

        // Frames stay queued in the decoder until a scan can be processed.
        if self.modal.is_none() && !self.gateway.is_loading() {
            let frame = self.camera.as_mut().and_then(|cam| cam.poll(now));
            if let Some(ev) = frame {
                self.handle_scan(ev);
            }
        }

        if self.gateway.poll() == Some(MarkingStatus::Success) {
            self.revision += 1;
        }

        self.selector.poll();

        let mut received = Vec::new();
        if let Some(sub) = &self.events {
            while let Some(ev) = sub.try_next() {
                received.push(ev);
            }
        }
        for ev in received {
            log::debug!("[station] remote event for {}", ev.class_instance_id());
            self.revision += 1;
            self.last_event = Some(ev);
        }
    }

    /// Operator dismissed the result.  Refused while a mark is loading.
    pub fn resume(&mut self, _now: Instant) -> bool {
        if self.gateway.is_loading() {
            log::debug!("[station] resume refused: mark in progress");
            return false;
        }
        self.gateway.reset_marking_status();
        self.modal     = None;
        self.modal_key = None;
        self.listener.enable();
        if let Some(cam) = self.camera.as_mut() {
            cam.release_lock();
        }
        true
    }

    // ── Class / mode ─────────────────────────────────────────────────────────
    pub fn set_casual_scan_mode(&mut self, on: bool) {
        self.selector.set_casual_scan_mode(on);
    }

    pub fn toggle_casual(&mut self) {
        let on = !self.selector.is_casual();
        self.selector.set_casual_scan_mode(on);
    }

    pub fn select_class_by_id(&mut self, id: &str) -> bool {
        self.selector.select_class_by_id(id)
    }

    pub fn cycle_class(&mut self) {
        self.selector.cycle_class();
    }

    pub fn retry_class_fetch(&mut self) -> bool {
        let token = self.gateway.auth().bearer().map(str::to_string);
        self.selector.fetch_options(Arc::clone(&self.classes), token)
    }

    // ── Queries ──────────────────────────────────────────────────────────────
    pub fn modal_open(&self) -> bool { self.modal.is_some() }

    pub fn snapshot(&self) -> StationView {
        let modal = self.modal.as_ref().map(|m| ModalView {
            code:    m.code.clone(),
            source:  m.source,
            student: self.resolver.student_info().cloned(),
            marking: m.marking,
            status:  self.gateway.status(),
            error:   self.gateway.error().map(str::to_string),
            message: self.gateway.message().map(str::to_string),
        });
        StationView {
            class_label:     self.selector.selected_class().map(|c| c.label()),
            casual:          self.selector.is_casual(),
            fetch_status:    self.selector.status().clone(),
            class_count:     self.selector.options().len(),
            can_retry:       self.selector.can_retry(),
            listener_active: self.listener.is_active(),
            camera_active:   self.camera.as_ref().is_some_and(|c| c.is_active()),
            buffer:          self.listener.buffer().to_string(),
            roster_len:      self.roster.len(),
            modal,
            revision:        self.revision,
            last_event:      self.last_event.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, AttendanceApi};
    use crate::camera::{CameraConfig, FrameDecoder, FrameOpener};
    use crate::model::{AttendanceMarkRequest, ClassSessionTarget, MarkResponse};
    use crate::scanner::ListenerConfig;
    use crate::session::AuthState;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Mutex;
    use std::time::Duration;

    fn ms(v: u64) -> Duration { Duration::from_millis(v) }

    struct RecordingApi {
        seen: Mutex<Vec<AttendanceMarkRequest>>,
    }

    impl AttendanceApi for RecordingApi {
        fn mark_attendance(&self, _token: &str, request: &AttendanceMarkRequest) -> Result<MarkResponse, ApiError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(MarkResponse { success: true, message: Some("Marked present".into()) })
        }
    }

    struct OneClass;

    impl ClassOptionsSource for OneClass {
        fn fetch_class_options(&self, _token: Option<&str>) -> Result<Vec<ClassSessionTarget>, ApiError> {
            Ok(vec![ClassSessionTarget { id: "cls_1".into(), course_name: "CS101".into(), session_name: "Lab".into() }])
        }
    }

    fn student(id: &str, name: &str, barcode: &str) -> StudentLookupRecord {
        StudentLookupRecord {
            id:         id.into(),
            name:       name.into(),
            email:      format!("{id}@example.org"),
            barcode_id: barcode.into(),
            class_id:   None,
            is_active:  Some(true),
            avatar_url: None,
        }
    }

    fn station() -> (ScanStation, Arc<RecordingApi>) {
        let api = Arc::new(RecordingApi { seen: Mutex::new(Vec::new()) });
        let gateway = MarkingGateway::new(
            api.clone(),
            AuthState { token: Some("tok".into()), user_id: Some("op_1".into()) },
        );
        let roster = Roster::from_records(vec![
            student("u_42", "Ada", "A1B2C3"),
            student("u_7", "Grace", "G7G7"),
        ]);
        let st = ScanStation::new(
            HidScannerListener::new(ListenerConfig::default()),
            roster,
            gateway,
            Arc::new(OneClass),
        );
        (st, api)
    }

    /// Wait for the class options, then select cls_1.
    fn select_cls_1(st: &mut ScanStation) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while st.snapshot().fetch_status == FetchStatus::Loading {
            assert!(Instant::now() < deadline, "class options never arrived");
            st.tick(Instant::now());
            std::thread::yield_now();
        }
        assert!(st.select_class_by_id("cls_1"));
    }

    /// Type `text` as a scanner burst, 5 ms apart, then Enter.
    fn burst(st: &mut ScanStation, text: &str, t0: Instant) -> Instant {
        let mut t = t0;
        for c in text.chars() {
            st.handle_key(&KeyInput::char(c), t);
            t += ms(5);
        }
        st.handle_key(&KeyInput::named("Enter"), t);
        t
    }

    /// Tick until the mark request settles.
    fn settle(st: &mut ScanStation, mut now: Instant) -> MarkingStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            st.tick(now);
            let status = st.snapshot().modal.map(|m| m.status);
            if status != Some(MarkingStatus::Loading) {
                return status.unwrap_or(MarkingStatus::Idle);
            }
            assert!(Instant::now() < deadline, "mark never finished");
            now += ms(10);
            std::thread::yield_now();
        }
    }

    #[test]
    fn scanner_burst_marks_exactly_once() {
        let (mut st, api) = station();
        select_cls_1(&mut st);
        let t = burst(&mut st, "A1B2C3", Instant::now());

        let view = st.snapshot();
        assert!(!view.listener_active);
        assert_eq!(view.modal.as_ref().unwrap().student.as_ref().unwrap().id, "u_42");

        assert_eq!(settle(&mut st, t), MarkingStatus::Success);
        assert_eq!(st.snapshot().revision, 1);
        let seen = api.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].student_id, "u_42");
        assert_eq!(seen[0].class_instance_id, "cls_1");
        assert_eq!(seen[0].marked_by_user_id, "op_1");
    }

    #[test]
    fn unknown_code_shows_not_found_without_marking() {
        let (mut st, api) = station();
        select_cls_1(&mut st);
        burst(&mut st, "ZZZ999", Instant::now());
        let modal = st.snapshot().modal.unwrap();
        assert!(modal.student.is_none());
        assert!(!modal.marking);
        assert_eq!(modal.status, MarkingStatus::Idle);
        assert!(api.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn casual_mode_identifies_only() {
        let (mut st, api) = station();
        select_cls_1(&mut st);
        st.set_casual_scan_mode(true);
        burst(&mut st, "A1B2C3", Instant::now());
        let modal = st.snapshot().modal.unwrap();
        assert_eq!(modal.student.unwrap().name, "Ada");
        assert!(!modal.marking);
        assert!(api.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn scans_are_refused_until_resume() {
        let (mut st, api) = station();
        st.set_casual_scan_mode(true);
        let t = burst(&mut st, "A1B2C3", Instant::now());
        assert!(!st.handle_scan(ScanEvent::new("u_42", ScanSource::Camera)));
        assert_eq!(st.snapshot().modal.unwrap().code, "A1B2C3");

        assert!(st.resume(t));
        assert!(st.snapshot().listener_active);
        assert!(st.handle_scan(ScanEvent::new("u_42", ScanSource::Camera)));
        assert!(api.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn scanner_enter_does_not_dismiss_the_open_result() {
        let (mut st, _api) = station();
        st.set_casual_scan_mode(true);
        let t0 = Instant::now();
        let t = burst(&mut st, "A1B2C3", t0);
        // CR LF scanners send a second terminator right behind the first
        assert!(!st.dismiss_key(t + ms(2)));

        // another badge while the result is still open
        let t2 = t + ms(2000);
        for (i, c) in "G7G7".chars().enumerate() {
            st.handle_key(&KeyInput::char(c), t2 + ms(5 * i as u64));
        }
        assert!(!st.dismiss_key(t2 + ms(20)));
        assert_eq!(st.snapshot().modal.unwrap().code, "A1B2C3");

        // the operator's own Enter a moment later
        assert!(st.dismiss_key(t2 + ms(1000)));
        assert!(st.snapshot().modal.is_none());
        assert!(st.snapshot().listener_active);
    }

    #[test]
    fn dismiss_key_exactly_at_the_burst_gap_resumes() {
        let (mut st, _api) = station();
        st.set_casual_scan_mode(true);
        let t = burst(&mut st, "A1B2C3", Instant::now());
        assert!(!st.dismiss_key(t + ms(49)));
        assert!(st.dismiss_key(t + ms(99)));
    }

    #[test]
    fn remote_event_bumps_revision() {
        let (mut st, _api) = station();
        let bus = EventBus::new();
        st.subscribe_events(&bus);
        bus.publish(AttendanceEvent::AttendanceStatisticsUpdated { class_instance_id: "cls_1".into() });
        st.tick(Instant::now());
        assert_eq!(st.snapshot().revision, 1);
        assert!(st.snapshot().last_event.is_some());

        st.shutdown();
        let ev = AttendanceEvent::AttendanceMarked { student_id: "u_7".into(), class_instance_id: "cls_1".into() };
        assert_eq!(bus.publish(ev), 0);
    }

    struct ChannelFrames(Receiver<String>);

    impl FrameDecoder for ChannelFrames {
        fn poll(&mut self) -> Option<String> { self.0.try_recv().ok() }
        fn name(&self) -> &str { "test-frames" }
    }

    fn with_camera(st: &mut ScanStation) -> Sender<String> {
        let (tx, rx) = mpsc::channel();
        let mut rx = Some(rx);
        let opener: FrameOpener = Box::new(move || {
            let rx = rx.take().ok_or_else(|| anyhow::anyhow!("already opened"))?;
            Ok(Box::new(ChannelFrames(rx)) as Box<dyn FrameDecoder>)
        });
        st.attach_camera(CameraDecoder::new(CameraConfig::default(), opener)).unwrap();
        tx
    }

    #[test]
    fn camera_frames_feed_the_same_pipeline() {
        let (mut st, api) = station();
        select_cls_1(&mut st);
        let tx = with_camera(&mut st);
        assert!(st.snapshot().camera_active);

        let t = Instant::now();
        tx.send("A1B2C3".into()).unwrap();
        st.tick(t);
        assert_eq!(st.snapshot().modal.unwrap().source, ScanSource::Camera);
        assert_eq!(settle(&mut st, t), MarkingStatus::Success);
        assert_eq!(api.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn camera_decode_during_open_result_waits_for_resume() {
        let (mut st, api) = station();
        select_cls_1(&mut st);
        let tx = with_camera(&mut st);
        let t0 = Instant::now();

        let t = burst(&mut st, "A1B2C3", t0);
        assert_eq!(settle(&mut st, t), MarkingStatus::Success);

        tx.send("G7G7".into()).unwrap();
        st.tick(t0 + ms(1600));
        assert_eq!(st.snapshot().modal.unwrap().code, "A1B2C3");

        assert!(st.resume(t0 + ms(1700)));
        tx.send("G7G7".into()).unwrap();
        st.tick(t0 + ms(1800));
        let modal = st.snapshot().modal.unwrap();
        assert_eq!(modal.code, "G7G7");
        assert_eq!(modal.source, ScanSource::Camera);

        assert_eq!(settle(&mut st, t0 + ms(1800)), MarkingStatus::Success);
        let seen = api.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].student_id, "u_7");
    }

    #[test]
    fn class_fetch_runs_on_mount() {
        let (mut st, _api) = station();
        select_cls_1(&mut st);
        let view = st.snapshot();
        assert_eq!(view.fetch_status, FetchStatus::Succeeded);
        assert_eq!(view.class_count, 1);
        assert!(!view.can_retry);
        assert!(!st.retry_class_fetch());
    }
}
