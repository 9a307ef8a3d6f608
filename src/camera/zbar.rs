// src/camera/zbar.rs  -  External decoder process as a FrameDecoder
//
// `zbarcam --raw --nodisplay` prints one decoded symbol per line.  A reader
// thread forwards lines over a channel so poll() never blocks; dropping the
// process kills the child, which releases the camera device.
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use super::{CameraConfig, FrameDecoder};

pub struct ZbarProcess {
    child: Child,
    rx:    Receiver<String>,
    label: String,
}

impl ZbarProcess {
    pub fn spawn(cfg: &CameraConfig) -> Result<Self> {
        let mut child = Command::new(&cfg.command)
            .args(&cfg.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Starting camera decoder {:?}", cfg.command))?;
        let stdout = child.stdout.take()
            .context("camera decoder has no stdout")?;

        let (tx, rx) = mpsc::channel::<String>();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(strip_symbol_type(&line).to_string()).is_err() {
                    break;
                }
            }
            log::debug!("[zbar] decoder output closed");
        });

        let label = format!("{} (pid {})", cfg.command, child.id());
        Ok(Self { child, rx, label })
    }
}

impl FrameDecoder for ZbarProcess {
    fn poll(&mut self) -> Option<String> { self.rx.try_recv().ok() }
    fn name(&self) -> &str { &self.label }
}

impl Drop for ZbarProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Without `--raw` zbar prefixes the symbology (`QR-Code:...`, `EAN-13:...`).
fn strip_symbol_type(line: &str) -> &str {
    match line.split_once(':') {
        Some((kind, data)) if is_symbol_type(kind) => data,
        _ => line,
    }
}

fn is_symbol_type(kind: &str) -> bool {
    matches!(
        kind,
        "QR-Code" | "EAN-13" | "EAN-8" | "UPC-A" | "UPC-E" | "ISBN-10" | "ISBN-13"
            | "CODE-128" | "CODE-39" | "CODE-93" | "I2/5" | "CODABAR" | "DataBar" | "PDF417"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_prefix_is_removed_only_when_known() {
        assert_eq!(strip_symbol_type("QR-Code:STU-001"), "STU-001");
        assert_eq!(strip_symbol_type("CODE-128:A1B2C3"), "A1B2C3");
        assert_eq!(strip_symbol_type("urn:student:42"), "urn:student:42");
        assert_eq!(strip_symbol_type("A1B2C3"), "A1B2C3");
    }

    #[cfg(unix)]
    #[test]
    fn spawned_process_lines_become_frames() {
        let cfg = CameraConfig {
            command: "sh".into(),
            args:    vec!["-c".into(), "echo QR-Code:STU-9".into()],
            ..Default::default()
        };
        let mut p = ZbarProcess::spawn(&cfg).unwrap();
        let got = p.rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(got, "STU-9");
    }

    #[test]
    fn missing_command_is_an_error() {
        let cfg = CameraConfig { command: "/nonexistent/zbarcam".into(), ..Default::default() };
        assert!(ZbarProcess::spawn(&cfg).is_err());
    }
}
