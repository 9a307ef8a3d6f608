// src/scanner/mod.rs  -  Scan input types, KeySource trait + adapter registry
pub mod listener;
#[cfg(feature = "scanner-hidraw")]
pub mod hid_usage;
#[cfg(feature = "scanner-hidraw")]
pub mod hidraw;
#[cfg(feature = "tui")]
pub mod keyboard;

pub use listener::{HidScannerListener, KeyOutcome, ListenerConfig};

use chrono::{DateTime, Utc};

/// Where a scan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    Hid,
    Camera,
}

/// One normalised detection. Created per scan, consumed by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEvent {
    pub code:       String,
    pub source:     ScanSource,
    pub scanned_at: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(code: impl Into<String>, source: ScanSource) -> Self {
        Self { code: code.into(), source, scanned_at: Utc::now() }
    }
}

/// A single keydown as the listener sees it.
///
/// Printable keys carry the character itself (`"a"`, `"7"`, `"-"`); named keys
/// use the usual key names (`"Enter"`, `"Tab"`, `"Shift"`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    pub key:      String,
    /// True for Shift/Ctrl/Alt/Meta pressed on their own
    pub modifier: bool,
}

impl KeyInput {
    pub fn char(c: char) -> Self {
        Self { key: c.to_string(), modifier: false }
    }

    pub fn named(name: &str) -> Self {
        Self { key: name.to_string(), modifier: false }
    }

    pub fn modifier(name: &str) -> Self {
        Self { key: name.to_string(), modifier: true }
    }

    /// The character for printable keys, `None` for named keys.
    pub fn as_char(&self) -> Option<char> {
        let mut chars = self.key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

/// Adapter interface for device-level key sources. Non-blocking.
pub trait KeySource: Send {
    /// Poll for the next key (returns `None` if nothing is pending)
    fn poll(&mut self) -> Option<KeyInput>;
    /// Human-readable adapter name
    fn name(&self) -> &str;
}

/// List HID devices (used by --list-devices)
pub fn list_devices() -> Vec<String> {
    #[cfg(feature = "scanner-hidraw")]
    {
        let out = hidraw::list_devices();
        if !out.is_empty() {
            return out;
        }
        return vec!["No HID devices found (check /dev/hidraw* permissions).".into()];
    }
    #[cfg(not(feature = "scanner-hidraw"))]
    {
        vec!["scanner-hidraw feature not compiled in.".into()]
    }
}
