// src/camera/mod.rs  -  Camera barcode decoder wrapper
//
// The frame decoder itself (zbar, a phone app, ...) produces decoded text at
// frame rate; the same code shows up on every frame while the badge is in
// view.  This wrapper turns that stream into discrete ScanEvents:
//
//   * empty / whitespace decodes are dropped
//   * a code equal to the previous one within 2 × scan_delay is a duplicate
//   * after an accepted scan a processing lock holds until it expires or
//     the result modal closes (`release_lock`)
//
// While inactive the frame source is closed, which releases the camera.
pub mod zbar;

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::scanner::{ScanEvent, ScanSource};

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub scan_delay:      Duration,
    pub processing_lock: Duration,
    /// Decoder command for the default frame source
    pub command:         String,
    pub args:            Vec<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            scan_delay:      Duration::from_millis(500),
            processing_lock: Duration::from_millis(1500),
            command:         "zbarcam".into(),
            args:            vec!["--raw".into(), "--nodisplay".into()],
        }
    }
}

/// A continuously decoding frame source.  Non-blocking.
pub trait FrameDecoder: Send {
    /// Next decoded text, if any arrived since the last poll
    fn poll(&mut self) -> Option<String>;
    fn name(&self) -> &str;
}

pub type FrameOpener = Box<dyn FnMut() -> Result<Box<dyn FrameDecoder>> + Send>;

pub struct CameraDecoder {
    cfg:          CameraConfig,
    opener:       FrameOpener,
    frames:       Option<Box<dyn FrameDecoder>>,
    last:         Option<(String, Instant)>,
    locked_until: Option<Instant>,
}

impl CameraDecoder {
    pub fn new(cfg: CameraConfig, opener: FrameOpener) -> Self {
        Self { cfg, opener, frames: None, last: None, locked_until: None }
    }

    /// Open the frame source.  No-op when already active.
    pub fn activate(&mut self) -> Result<()> {
        if self.frames.is_none() {
            let frames = (self.opener)()?;
            log::info!("[camera] active via {}", frames.name());
            self.frames = Some(frames);
        }
        Ok(())
    }

    /// Close the frame source and release the camera.
    pub fn deactivate(&mut self) {
        if let Some(frames) = self.frames.take() {
            log::info!("[camera] {} stopped", frames.name());
        }
        self.locked_until = None;
    }

    pub fn is_active(&self) -> bool { self.frames.is_some() }

    pub fn is_locked(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Modal closed: accept the next scan immediately.
    pub fn release_lock(&mut self) {
        self.locked_until = None;
    }

    /// Pull at most one decode from the frame source.
    pub fn poll(&mut self, now: Instant) -> Option<ScanEvent> {
        let text = self.frames.as_mut()?.poll()?;
        self.accept(&text, now)
    }

    pub fn accept(&mut self, text: &str, now: Instant) -> Option<ScanEvent> {
        if !self.is_active() {
            return None;
        }
        let code = text.trim();
        if code.is_empty() {
            log::debug!("[camera] empty decode dropped");
            return None;
        }
        if self.is_locked(now) {
            log::debug!("[camera] '{code}' dropped while processing");
            return None;
        }
        if let Some((prev, at)) = &self.last {
            if prev == code && now.saturating_duration_since(*at) < self.cfg.scan_delay * 2 {
                log::debug!("[camera] duplicate '{code}'");
                return None;
            }
        }

        self.last         = Some((code.to_string(), now));
        self.locked_until = Some(now + self.cfg.processing_lock);
        Some(ScanEvent::new(code, ScanSource::Camera))
    }
}
