// src/scanner/listener.rs  -  Keystroke bursts → barcode strings
//
// A barcode scanner in keyboard-wedge mode "types" the whole code in a few
// milliseconds and usually terminates it with Enter.  A human never types
// that fast, so the inter-key gap is the discriminator:
//
//   gap <  threshold  → same burst, keep appending
//   gap >= threshold  → the burst is over; flush what we have
//
// A flush deadline (last key + threshold) catches scanners that send no
// terminator.  The caller drives it through `tick()`, same as the main loop
// ticks every other timed state machine.
use std::time::{Duration, Instant};

use super::KeyInput;

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Max gap between keystrokes of one scan
    pub threshold:   Duration,
    pub min_length:  usize,
    pub max_length:  usize,
    /// Identical code inside this window is a duplicate
    pub scan_delay:  Duration,
    pub prefix_keys: Vec<String>,
    pub suffix_keys: Vec<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            threshold:   Duration::from_millis(50),
            min_length:  3,
            max_length:  100,
            scan_delay:  Duration::from_millis(500),
            prefix_keys: Vec::new(),
            suffix_keys: vec!["Enter".into()],
        }
    }
}

/// Result of feeding one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyOutcome {
    /// A completed, validated, non-duplicate code
    pub emitted:         Option<String>,
    /// The key terminated a scan and must not reach the rest of the UI
    pub prevent_default: bool,
}

pub struct HidScannerListener {
    cfg:       ListenerConfig,
    active:    bool,
    buffer:    String,
    last_key:  Option<Instant>,
    flush_at:  Option<Instant>,
    last_code: Option<String>,
    last_emit: Option<Instant>,
}

impl HidScannerListener {
    pub fn new(cfg: ListenerConfig) -> Self {
        Self {
            cfg,
            active:    false,
            buffer:    String::new(),
            last_key:  None,
            flush_at:  None,
            last_code: None,
            last_emit: None,
        }
    }

    pub fn enable(&mut self) {
        if !self.active {
            log::debug!("[hid] listener enabled");
        }
        self.active = true;
    }

    /// Detach: the pending buffer is discarded, never flushed late.
    pub fn disable(&mut self) {
        if self.active {
            log::debug!("[hid] listener disabled (discarding {} buffered chars)", self.buffer.len());
        }
        self.active   = false;
        self.buffer.clear();
        self.flush_at = None;
        self.last_key = None;
    }

    pub fn is_active(&self) -> bool { self.active }

    /// Max gap between keys of one burst.
    pub fn threshold(&self) -> Duration { self.cfg.threshold }

    /// Characters collected for the scan in progress.
    pub fn buffer(&self) -> &str { &self.buffer }

    pub fn on_key(&mut self, key: &KeyInput, now: Instant) -> KeyOutcome {
        if !self.active || key.modifier {
            return KeyOutcome::default();
        }

        if self.cfg.suffix_keys.iter().any(|k| *k == key.key) {
            return KeyOutcome { emitted: self.flush(now), prevent_default: true };
        }

        let Some(c) = key.as_char() else {
            return KeyOutcome::default();
        };

        let in_burst = self.last_key
            .map_or(true, |t| now.saturating_duration_since(t) < self.cfg.threshold);

        // The timeout for the previous burst has already elapsed even if
        // nobody ticked us; flush it before starting over.
        let mut emitted = None;
        if !self.buffer.is_empty() && !in_burst {
            emitted = self.flush(now);
        }

        self.buffer.push(c);
        self.last_key = Some(now);
        self.flush_at = Some(now + self.cfg.threshold);
        KeyOutcome { emitted, prevent_default: false }
    }

    /// Flush on timeout. Call every loop tick.
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        match self.flush_at {
            Some(at) if now >= at && !self.buffer.is_empty() => self.flush(now),
            _ => None,
        }
    }

    fn flush(&mut self, now: Instant) -> Option<String> {
        self.flush_at = None;
        let raw = std::mem::take(&mut self.buffer);
        if raw.is_empty() {
            return None;
        }

        let code = self.strip_affixes(&raw).to_string();
        let len  = code.chars().count();
        if len < self.cfg.min_length || len > self.cfg.max_length {
            log::debug!(
                "[hid] dropped {len}-char sequence (accepting {}..={})",
                self.cfg.min_length, self.cfg.max_length
            );
            return None;
        }

        if let (Some(prev), Some(at)) = (&self.last_code, self.last_emit) {
            if *prev == code && now.saturating_duration_since(at) < self.cfg.scan_delay {
                log::debug!("[hid] duplicate '{code}' within {:?}", self.cfg.scan_delay);
                return None;
            }
        }

        log::debug!("[hid] scan '{code}'");
        self.last_code = Some(code.clone());
        self.last_emit = Some(now);
        Some(code)
    }

    fn strip_affixes<'a>(&self, raw: &'a str) -> &'a str {
        let mut s = raw;
        while let Some(rest) = self.cfg.prefix_keys.iter()
            .filter(|p| !p.is_empty())
            .find_map(|p| s.strip_prefix(p.as_str()))
        {
            s = rest;
        }
        while let Some(rest) = self.cfg.suffix_keys.iter()
            .filter(|p| !p.is_empty())
            .find_map(|p| s.strip_suffix(p.as_str()))
        {
            s = rest;
        }
        s
    }
}
