// src/main.rs  -  scan-attend  entry point
mod api;
mod camera;
mod config;
mod model;
mod roster;
mod scanner;
mod session;
mod station;
mod task;
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppConfig, Cli, InputKind};
use scanner::{HidScannerListener, KeyInput};
use session::{AuthState, EventBus, MarkingGateway};
use station::ScanStation;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    // ── --print-config  ───────────────────────────────────────────────────────
    if cli.print_config {
        print!("{}", config::DEFAULT_CONFIG_TOML);
        return Ok(());
    }

    // ── --write-config  ───────────────────────────────────────────────────────
    if cli.write_config {
        let path = AppConfig::write_default_config(&cli)?;
        println!("Config written to: {}", path.display());
        println!("Edit it to set the API URL, token, roster file and scanner.");
        return Ok(());
    }

    // ── --list-devices  ───────────────────────────────────────────────────────
    if cli.list_devices {
        println!("HID devices (vid:pid  usage_page/usage  product):");
        for d in scanner::list_devices() { println!("  {d}"); }
        return Ok(());
    }

    // ── Load config + roster ──────────────────────────────────────────────────
    let cfg = AppConfig::load(&cli)?;
    let roster = roster::Roster::load(&cfg.roster)?;
    if roster.is_empty() {
        log::warn!("[main] roster {} is empty: every scan will be unknown", cfg.roster.display());
    } else {
        log::info!("[main] {} students on roster {}", roster.len(), cfg.roster.display());
    }

    // ── Backend ───────────────────────────────────────────────────────────────
    let api = Arc::new(api::HttpApi::new(&cfg.api_url, cfg.timeout)?);
    for missing in cfg.missing_credentials() {
        match missing {
            "token" => log::warn!("[main] no token configured: scans will identify but not mark"),
            _ => log::warn!("[main] no {missing} configured: marks will carry an empty markedByUserId"),
        }
    }
    let auth = AuthState { token: cfg.token.clone(), user_id: cfg.user_id.clone() };
    let gateway = MarkingGateway::new(api.clone(), auth);

    // ── Station ───────────────────────────────────────────────────────────────
    let mut station = ScanStation::new(
        HidScannerListener::new(cfg.listener_config()),
        roster,
        gateway,
        api,
    );
    if cfg.casual {
        station.set_casual_scan_mode(true);
    } else if let Some(id) = &cfg.class_id {
        // applied once the class options arrive
        station.select_class_by_id(id);
    }

    // ── Push events ───────────────────────────────────────────────────────────
    let bus = EventBus::new();
    station.subscribe_events(&bus);
    if let Some(path) = &cfg.events_feed {
        let feed = std::fs::File::open(path)
            .with_context(|| format!("Opening event feed {:?}", path))?;
        session::events::spawn_json_lines_feed(feed, bus.clone());
        log::info!("[main] following events from {}", path.display());
    }

    // ── Scan input ────────────────────────────────────────────────────────────
    // Device key sources run on their own thread and feed this channel;
    // terminal keys are read in the main loop.
    let (tx_key, rx_key) = mpsc::channel::<KeyInput>();
    match cfg.input {
        InputKind::Keyboard => {
            log::info!("[main] keyboard-wedge input via terminal");
        }
        InputKind::Hidraw => spawn_hidraw(&cfg, tx_key)?,
        InputKind::Camera => {
            let cam_cfg = cfg.camera_config();
            let spawn_cfg = cam_cfg.clone();
            let opener: camera::FrameOpener = Box::new(move || {
                let proc = camera::zbar::ZbarProcess::spawn(&spawn_cfg)?;
                Ok(Box::new(proc) as Box<dyn camera::FrameDecoder>)
            });
            station.attach_camera(camera::CameraDecoder::new(cam_cfg, opener))?;
        }
    }

    // ── TUI ───────────────────────────────────────────────────────────────────
    let mut tui = tui::Tui::new()?;
    #[cfg(not(feature = "tui"))]
    log::info!("[main] running headless, stop with Ctrl+C");

    // ── Main loop ─────────────────────────────────────────────────────────────
    let tick = Duration::from_millis(10);

    'main: loop {
        let now = Instant::now();

        // ── Single crossterm event reader ─────────────────────────────────────
        #[cfg(feature = "tui")]
        {
            use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
            while event::poll(Duration::from_millis(0))? {
                if let Event::Key(k) = event::read()? {
                    if k.kind == KeyEventKind::Release {
                        continue;
                    }

                    // Escape or Ctrl+C always quit
                    if k.code == KeyCode::Esc
                        || (k.code == KeyCode::Char('c')
                            && k.modifiers.contains(KeyModifiers::CONTROL))
                    {
                        break 'main;
                    }

                    match k.code {
                        KeyCode::F(2) => station.toggle_casual(),
                        KeyCode::F(3) => station.cycle_class(),
                        KeyCode::F(5) => {
                            if !station.retry_class_fetch() {
                                log::debug!("[main] class options already loaded or loading");
                            }
                        }
                        KeyCode::Enter | KeyCode::Char(' ') if station.modal_open() => {
                            station.dismiss_key(now);
                        }
                        _ => {
                            if let Some(key) = scanner::keyboard::key_input_from_crossterm(&k) {
                                station.handle_key(&key, now);
                            }
                        }
                    }
                }
            }
        }

        // Device keys (hidraw)
        while let Ok(key) = rx_key.try_recv() {
            station.handle_key(&key, now);
        }

        station.tick(now);
        tui.draw(&station.snapshot())?;

        thread::sleep(tick);
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    station.shutdown();
    tui.cleanup();

    println!("\nscan-attend stopped.\n");
    Ok(())
}

/// Open the scanner over hidapi and pump its keys into `tx`.
#[cfg(feature = "scanner-hidraw")]
fn spawn_hidraw(cfg: &AppConfig, tx: Sender<KeyInput>) -> Result<()> {
    use scanner::KeySource;

    let (Some(vid), Some(pid)) = (cfg.hid_vid, cfg.hid_pid) else {
        anyhow::bail!("input = hidraw needs scanner.vid and scanner.pid (see --list-devices)");
    };
    let mut source: Box<dyn KeySource> = Box::new(scanner::hidraw::HidrawScanner::open(vid, pid)?);
    log::info!("[main] scanning via {}", source.name());
    thread::spawn(move || loop {
        while let Some(key) = source.poll() {
            if tx.send(key).is_err() {
                return;
            }
        }
        thread::sleep(Duration::from_millis(2));
    });
    Ok(())
}

#[cfg(not(feature = "scanner-hidraw"))]
fn spawn_hidraw(_cfg: &AppConfig, _tx: Sender<KeyInput>) -> Result<()> {
    anyhow::bail!("scanner-hidraw feature not compiled in")
}
