// src/scanner/hidraw.rs  -  Scanner opened directly as a USB HID keyboard
//
// In keyboard-wedge mode the scanner is just another keyboard, which means
// its keystrokes land in whatever window has focus.  Opening it through
// hidapi instead gives us its reports exclusively (on Linux via
// /dev/hidraw*), and the same listener turns them into codes.
//
// ── Linux permissions ─────────────────────────────────────────────────────────
// /dev/hidraw* is root-only by default.  Create a udev rule once:
//
//   echo 'SUBSYSTEM=="hidraw", ATTRS{idVendor}=="0c2e", \
//         ATTRS{idProduct}=="0b61", GROUP="plugdev", MODE="0660"' \
//     | sudo tee /etc/udev/rules.d/99-scan-attend.rules
//   sudo udevadm control --reload-rules && sudo udevadm trigger
//
// Substitute your scanner's ids (see `scan-attend --list-devices`).
use anyhow::{anyhow, Result};
use hidapi::HidApi;
use std::collections::VecDeque;

use super::hid_usage::ReportTracker;
use super::{KeyInput, KeySource};

/// Usage page / usage of a generic desktop keyboard collection.
const PAGE_GENERIC_DESKTOP: u16 = 0x01;
const USAGE_KEYBOARD:       u16 = 0x06;

pub struct HidrawScanner {
    device:  hidapi::HidDevice,
    tracker: ReportTracker,
    pending: VecDeque<KeyInput>,
    label:   String,
}

impl HidrawScanner {
    pub fn open(vid: u16, pid: u16) -> Result<Self> {
        let api = HidApi::new().map_err(|e| anyhow!("hidapi init failed: {e}"))?;

        // Prefer the keyboard collection; composite scanners expose several.
        let infos: Vec<_> = api.device_list()
            .filter(|d| d.vendor_id() == vid && d.product_id() == pid)
            .collect();
        let keyboard = infos.iter()
            .find(|d| d.usage_page() == PAGE_GENERIC_DESKTOP && d.usage() == USAGE_KEYBOARD)
            .or_else(|| infos.first());

        let Some(info) = keyboard else {
            return Err(anyhow!("No HID device {vid:04x}:{pid:04x}{}", open_hint()));
        };
        let device = info.open_device(&api)
            .map_err(|e| anyhow!("Cannot open HID {vid:04x}:{pid:04x}: {e}{}", open_hint()))?;

        let label = format!(
            "{} ({vid:04x}:{pid:04x})",
            info.product_string().unwrap_or("HID scanner")
        );
        log::info!("[hidraw] opened {label}  path={}", info.path().to_string_lossy());
        Ok(Self { device, tracker: ReportTracker::new(), pending: VecDeque::new(), label })
    }

    fn read_report(&mut self) {
        let mut buf = [0u8; 9];
        match self.device.read_timeout(&mut buf, 1) {
            Ok(n) if n >= 8 => {
                // hidapi on Windows prepends the report id (0x00 when unused)
                let report = if n == 9 { &buf[1..9] } else { &buf[..8] };
                let keys = self.tracker.feed(report);
                self.pending.extend(keys);
            }
            Ok(0) => {}
            Ok(n) => log::debug!("[hidraw] short report ({n} bytes) ignored"),
            Err(e) => log::warn!("[hidraw] read error: {e}"),
        }
    }
}

impl KeySource for HidrawScanner {
    fn poll(&mut self) -> Option<KeyInput> {
        if self.pending.is_empty() {
            self.read_report();
        }
        self.pending.pop_front()
    }

    fn name(&self) -> &str { &self.label }
}

/// One line per HID device: `vid:pid  usage_page/usage  product`.
pub fn list_devices() -> Vec<String> {
    let Ok(api) = HidApi::new() else { return Vec::new(); };
    api.device_list()
        .map(|d| format!(
            "{:04x}:{:04x}  {:04x}/{:04x}  {}",
            d.vendor_id(), d.product_id(), d.usage_page(), d.usage(),
            d.product_string().unwrap_or("?")
        ))
        .collect()
}

fn open_hint() -> &'static str {
    if cfg!(target_os = "linux") {
        "\n  Hint: /dev/hidraw* may lack permissions.\
         \n  Quick fix:  sudo chmod a+rw /dev/hidraw*\
         \n  Permanent:  install a udev rule (see top of hidraw.rs)"
    } else if cfg!(target_os = "macos") {
        "\n  Hint: macOS requires Input Monitoring permission for HID keyboards.\
         \n  → System Settings → Privacy & Security → Input Monitoring"
    } else {
        ""
    }
}
