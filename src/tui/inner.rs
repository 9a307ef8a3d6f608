// src/tui/inner.rs  -  ratatui layout
use anyhow::Result;
use crossterm::{execute, terminal::{self, EnterAlternateScreen, LeaveAlternateScreen}};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Terminal,
};
use crate::scanner::ScanSource;
use crate::session::{AttendanceEvent, FetchStatus, MarkingStatus};
use crate::station::{ModalView, StationView};
use std::io::stdout;

pub struct Tui {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
}

impl Tui {
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut out = stdout();
        execute!(out, EnterAlternateScreen)?;
        let backend  = CrosstermBackend::new(out);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    pub fn cleanup(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
    }

    pub fn draw(&mut self, s: &StationView) -> Result<()> {
        self.terminal.draw(|f| {
            let area = f.area();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),  // header / status bar
                    Constraint::Length(5),  // class + mode
                    Constraint::Min(6),     // scan result
                    Constraint::Length(3),  // footer hints
                ])
                .split(area);

            // ── Header ────────────────────────────────────────────────────
            let input = if s.camera_active { "camera" } else { "scanner" };
            let header = Paragraph::new(format!(
                " Attendance Scanner  |  input: {input}  |  roster: {}  |  rev {}",
                s.roster_len, s.revision
            ))
            .style(Style::default().fg(Color::Black).bg(Color::Cyan)
                   .add_modifier(Modifier::BOLD));
            f.render_widget(header, chunks[0]);

            // ── Class / mode ──────────────────────────────────────────────
            let (mode, mode_color) = match (&s.class_label, s.casual) {
                (_, true)        => ("CASUAL  identify only".to_string(), Color::Magenta),
                (Some(label), _) => (format!("MARKING  {label}"), Color::Green),
                (None, false)    => ("NO CLASS  identify only".to_string(), Color::Yellow),
            };
            let fetch = match &s.fetch_status {
                FetchStatus::Idle      => "not loaded".to_string(),
                FetchStatus::Loading   => "loading…".to_string(),
                FetchStatus::Succeeded => format!("{} available", s.class_count),
                FetchStatus::Failed(e) => format!("failed: {e}  (F5 retry)"),
            };
            let class_lines = vec![
                Line::from(Span::styled(mode, Style::default().fg(mode_color).add_modifier(Modifier::BOLD))),
                Line::from(vec![
                    Span::styled("CLASSES: ", Style::default().fg(Color::DarkGray)),
                    Span::raw(fetch),
                ]),
                Line::from(vec![
                    Span::styled("REMOTE:  ", Style::default().fg(Color::DarkGray)),
                    Span::raw(s.last_event.as_ref().map_or_else(String::new, describe_event)),
                ]),
            ];
            let class_block = Paragraph::new(class_lines)
                .block(Block::default()
                    .title(" SESSION ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(mode_color)));
            f.render_widget(class_block, chunks[1]);

            // ── Scan result ───────────────────────────────────────────────
            let (result_lines, border) = match &s.modal {
                Some(m) => result_lines(m),
                None => {
                    let listening = if s.listener_active { "Waiting for scan…" } else { "Scanner paused" };
                    (vec![
                        Line::from(Span::styled(listening, Style::default().fg(Color::DarkGray))),
                        Line::from(vec![
                            Span::styled("BUFFER:  ", Style::default().fg(Color::DarkGray)),
                            Span::styled(s.buffer.clone(), Style::default().fg(Color::Cyan)),
                        ]),
                    ], Color::DarkGray)
                }
            };
            let result_block = Paragraph::new(result_lines)
                .block(Block::default()
                    .title(" SCAN ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(border)))
                .wrap(Wrap { trim: true });
            f.render_widget(result_block, chunks[2]);

            // ── Footer ────────────────────────────────────────────────────
            let footer_text = match &s.modal {
                Some(m) if m.status == MarkingStatus::Loading => " Marking…   Esc = quit",
                Some(_) => " Enter/Space = scan next   Esc = quit",
                None if s.can_retry => " F2 = casual mode   F3 = next class   F5 = reload classes   Esc = quit",
                None    => " F2 = casual mode   F3 = next class   Esc = quit",
            };
            let footer = Paragraph::new(footer_text)
            .style(Style::default().fg(Color::DarkGray).bg(Color::Black));
            f.render_widget(footer, chunks[3]);
        })?;
        Ok(())
    }
}

fn result_lines(m: &ModalView) -> (Vec<Line<'static>>, Color) {
    let via = match m.source {
        ScanSource::Hid    => "scanner",
        ScanSource::Camera => "camera",
    };
    let mut lines = vec![Line::from(vec![
        Span::styled("CODE:    ", Style::default().fg(Color::DarkGray)),
        Span::styled(m.code.clone(), Style::default().fg(Color::Cyan)),
        Span::styled(format!("  ({via})"), Style::default().fg(Color::DarkGray)),
    ])];

    let Some(student) = &m.student else {
        lines.push(Line::from(Span::styled(
            "Student not found",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        return (lines, Color::Yellow);
    };
    lines.push(Line::from(vec![
        Span::styled("STUDENT: ", Style::default().fg(Color::DarkGray)),
        Span::styled(student.name.clone(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw(format!("  {}", student.email)),
    ]));

    if !m.marking {
        lines.push(Line::from(Span::styled("Identified (not marked)", Style::default().fg(Color::Magenta))));
        return (lines, Color::Magenta);
    }
    let (text, color) = match m.status {
        MarkingStatus::Idle | MarkingStatus::Loading => ("Marking attendance…".to_string(), Color::Cyan),
        MarkingStatus::Success => (
            m.message.clone().unwrap_or_else(|| "Attendance marked".into()),
            Color::Green,
        ),
        MarkingStatus::Error => (
            m.error.clone().unwrap_or_else(|| "Failed to mark attendance.".into()),
            Color::Red,
        ),
    };
    lines.push(Line::from(Span::styled(text, Style::default().fg(color).add_modifier(Modifier::BOLD))));
    (lines, color)
}

fn describe_event(ev: &AttendanceEvent) -> String {
    match ev {
        AttendanceEvent::AttendanceMarked { student_id, class_instance_id } => {
            format!("{student_id} marked in {class_instance_id}")
        }
        AttendanceEvent::AttendanceStatisticsUpdated { class_instance_id } => {
            format!("statistics updated for {class_instance_id}")
        }
    }
}
