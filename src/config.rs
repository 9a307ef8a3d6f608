// src/config.rs  -  Runtime configuration (CLI + TOML)
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::camera::CameraConfig;
use crate::scanner::ListenerConfig;

/// The example config is embedded directly in the binary at compile time.
/// Users can write it out with:  scan-attend --write-config
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml.example");

/// Environment variable consulted for the bearer token when neither the
/// config file nor the CLI provide one.
pub const TOKEN_ENV: &str = "SCAN_ATTEND_TOKEN";

// ── CLI ───────────────────────────────────────────────────────────────────────
#[derive(Parser, Debug, Default)]
#[command(
    name        = "scan-attend",
    about       = "Barcode scanner attendance station",
    version,
)]
pub struct Cli {
    /// Config file path (default: ~/.config/scan-attend/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Attendance backend base URL (e.g. https://lms.example.org/api)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Bearer token of the operator session (or set SCAN_ATTEND_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Operator user id, recorded as markedByUserId
    #[arg(long)]
    pub user_id: Option<String>,

    /// Roster JSON file
    #[arg(long)]
    pub roster: Option<PathBuf>,

    /// Scan input: keyboard | hidraw | camera
    #[arg(long)]
    pub input: Option<InputKind>,

    /// Preselect a class session by id
    #[arg(long)]
    pub class_id: Option<String>,

    /// Start in casual (identify-only) scan mode
    #[arg(long, action)]
    pub casual: bool,

    /// Max gap between scanner keystrokes in ms (default: 50)
    #[arg(long)]
    pub threshold_ms: Option<u64>,

    /// Minimum accepted barcode length (default: 3)
    #[arg(long)]
    pub min_length: Option<usize>,

    /// Maximum accepted barcode length (default: 100)
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Duplicate-suppression window in ms (default: 500)
    #[arg(long)]
    pub scan_delay_ms: Option<u64>,

    /// JSON-lines event feed to follow (e.g. a named pipe)
    #[arg(long)]
    pub events_feed: Option<PathBuf>,

    /// List HID devices (to find the scanner's VID/PID) and exit
    #[arg(long, action)]
    pub list_devices: bool,

    /// Write the built-in default config.toml to the config path and exit.
    /// Use --config <PATH> to write to a custom location.
    #[arg(long, action)]
    pub write_config: bool,

    /// Print the built-in default config.toml to stdout and exit
    #[arg(long, action)]
    pub print_config: bool,
}

// ── Enums shared across CLI + TOML ────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Scanner in keyboard-wedge mode, read through the terminal
    Keyboard,
    /// Scanner opened directly as a USB HID device
    #[cfg_attr(not(feature = "scanner-hidraw"), value(skip))]
    Hidraw,
    /// Camera frames decoded by an external decoder process
    Camera,
}

// ── TOML file structure ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    pub general: Option<GeneralCfg>,
    pub scanner: Option<ScannerCfg>,
    pub camera:  Option<CameraCfg>,
    pub session: Option<SessionCfg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralCfg {
    pub api_url:      Option<String>,
    pub token:        Option<String>,
    pub user_id:      Option<String>,
    pub roster:       Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub events_feed:  Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerCfg {
    pub input:         Option<InputKind>,
    pub threshold_ms:  Option<u64>,
    pub min_length:    Option<usize>,
    pub max_length:    Option<usize>,
    pub scan_delay_ms: Option<u64>,
    pub prefix_keys:   Option<Vec<String>>,
    pub suffix_keys:   Option<Vec<String>>,
    /// hidraw vendor id, hex
    pub vid:           Option<String>,
    /// hidraw product id, hex
    pub pid:           Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraCfg {
    pub command:            Option<String>,
    pub args:               Option<Vec<String>>,
    pub processing_lock_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCfg {
    pub class_id: Option<String>,
    pub casual:   Option<bool>,
}

// ── Resolved / merged config ──────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url:            String,
    pub token:              Option<String>,
    pub user_id:            Option<String>,
    pub roster:             PathBuf,
    pub timeout:            Duration,
    pub events_feed:        Option<PathBuf>,
    pub input:              InputKind,
    pub threshold_ms:       u64,
    pub min_length:         usize,
    pub max_length:         usize,
    pub scan_delay_ms:      u64,
    pub prefix_keys:        Vec<String>,
    pub suffix_keys:        Vec<String>,
    pub hid_vid:            Option<u16>,
    pub hid_pid:            Option<u16>,
    pub camera_command:     String,
    pub camera_args:        Vec<String>,
    pub processing_lock_ms: u64,
    pub class_id:           Option<String>,
    pub casual:             bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url:            "http://localhost:8000/api".into(),
            token:              None,
            user_id:            None,
            roster:             PathBuf::from("roster.json"),
            timeout:            Duration::from_secs(10),
            events_feed:        None,
            input:              InputKind::Keyboard,
            threshold_ms:       50,
            min_length:         3,
            max_length:         100,
            scan_delay_ms:      500,
            prefix_keys:        Vec::new(),
            suffix_keys:        vec!["Enter".into()],
            hid_vid:            None,
            hid_pid:            None,
            camera_command:     "zbarcam".into(),
            camera_args:        vec!["--raw".into(), "--nodisplay".into()],
            processing_lock_ms: 1500,
            class_id:           None,
            casual:             false,
        }
    }
}

// ── Config loader ─────────────────────────────────────────────────────────────
impl AppConfig {
    /// Write the embedded default config to disk.
    /// Returns the path it was written to.
    pub fn write_default_config(cli: &Cli) -> Result<PathBuf> {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating config directory {:?}", parent))?;
        }
        std::fs::write(&path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("Writing config to {:?}", path))?;
        Ok(path)
    }

    pub fn load(cli: &Cli) -> Result<Self> {
        let mut cfg = Self::default();

        // 1. Load TOML file
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Reading config {:?}", path))?;
            let fc: FileConfig = toml::from_str(&raw)
                .with_context(|| format!("Parsing config {:?}", path))?;
            cfg.apply_file(&fc)?;
        } else {
            log::warn!(
                "No config file found at {}  → run `scan-attend --write-config` to create one",
                path.display()
            );
        }

        // 2. Environment token, then CLI overrides
        if cfg.token.is_none() {
            cfg.token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());
        }
        cfg.apply_cli(cli);
        Ok(cfg)
    }

    fn apply_file(&mut self, fc: &FileConfig) -> Result<()> {
        if let Some(g) = &fc.general {
            if let Some(v) = &g.api_url      { self.api_url     = v.clone(); }
            if let Some(v) = &g.token        { self.token       = Some(v.clone()); }
            if let Some(v) = &g.user_id      { self.user_id     = Some(v.clone()); }
            if let Some(v) = &g.roster       { self.roster      = v.clone(); }
            if let Some(v) = g.timeout_secs  { self.timeout     = Duration::from_secs(v); }
            if let Some(v) = &g.events_feed  { self.events_feed = Some(v.clone()); }
        }
        if let Some(s) = &fc.scanner {
            if let Some(v) = s.input         { self.input         = v; }
            if let Some(v) = s.threshold_ms  { self.threshold_ms  = v; }
            if let Some(v) = s.min_length    { self.min_length    = v; }
            if let Some(v) = s.max_length    { self.max_length    = v; }
            if let Some(v) = s.scan_delay_ms { self.scan_delay_ms = v; }
            if let Some(v) = &s.prefix_keys  { self.prefix_keys   = v.clone(); }
            if let Some(v) = &s.suffix_keys  { self.suffix_keys   = v.clone(); }
            if let Some(v) = &s.vid {
                self.hid_vid = Some(parse_hex_id(v).with_context(|| format!("scanner.vid {v:?}"))?);
            }
            if let Some(v) = &s.pid {
                self.hid_pid = Some(parse_hex_id(v).with_context(|| format!("scanner.pid {v:?}"))?);
            }
        }
        if let Some(c) = &fc.camera {
            if let Some(v) = &c.command           { self.camera_command     = v.clone(); }
            if let Some(v) = &c.args              { self.camera_args        = v.clone(); }
            if let Some(v) = c.processing_lock_ms { self.processing_lock_ms = v; }
        }
        if let Some(s) = &fc.session {
            if let Some(v) = &s.class_id { self.class_id = Some(v.clone()).filter(|id| !id.is_empty()); }
            if let Some(v) = s.casual    { self.casual   = v; }
        }
        Ok(())
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = &cli.api_url      { self.api_url       = v.clone(); }
        if let Some(v) = &cli.token        { self.token         = Some(v.clone()); }
        if let Some(v) = &cli.user_id      { self.user_id       = Some(v.clone()); }
        if let Some(v) = &cli.roster       { self.roster        = v.clone(); }
        if let Some(v) = cli.input         { self.input         = v; }
        if let Some(v) = &cli.class_id     { self.class_id      = Some(v.clone()); }
        if cli.casual                      { self.casual        = true; }
        if let Some(v) = cli.threshold_ms  { self.threshold_ms  = v; }
        if let Some(v) = cli.min_length    { self.min_length    = v; }
        if let Some(v) = cli.max_length    { self.max_length    = v; }
        if let Some(v) = cli.scan_delay_ms { self.scan_delay_ms = v; }
        if let Some(v) = &cli.events_feed  { self.events_feed   = Some(v.clone()); }
    }

    /// Operator credentials that are absent or blank.  Marks still go out
    /// without a user id; without a token nothing is marked.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.token)   { missing.push("token"); }
        if blank(&self.user_id) { missing.push("user_id"); }
        missing
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            threshold:   Duration::from_millis(self.threshold_ms),
            min_length:  self.min_length,
            max_length:  self.max_length,
            scan_delay:  Duration::from_millis(self.scan_delay_ms),
            prefix_keys: self.prefix_keys.clone(),
            suffix_keys: self.suffix_keys.clone(),
        }
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            scan_delay:      Duration::from_millis(self.scan_delay_ms),
            processing_lock: Duration::from_millis(self.processing_lock_ms),
            command:         self.camera_command.clone(),
            args:            self.camera_args.clone(),
        }
    }
}

/// Accepts "0c2e", "0x0C2E" or "0C2E".
fn parse_hex_id(s: &str) -> Result<u16> {
    let t = s.trim();
    let t = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")).unwrap_or(t);
    u16::from_str_radix(t, 16).with_context(|| format!("not a hex USB id: {s:?}"))
}

fn default_config_path() -> PathBuf {
    dirs_next().join("scan-attend").join("config.toml")
}

fn dirs_next() -> PathBuf {
    if let Ok(v) = std::env::var("XDG_CONFIG_HOME") { return PathBuf::from(v); }
    if let Ok(v) = std::env::var("APPDATA")          { return PathBuf::from(v); }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_default();
    PathBuf::from(home).join(".config")
}
