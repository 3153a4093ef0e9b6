// src/tui/inner.rs  —  ratatui layout
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
use crate::i18n::I18n;
use crate::AppState;
use std::io::stdout;

pub struct Tui {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    i18n: I18n,
}

impl Tui {
    pub fn new(lang: &str) -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut out = stdout();
        execute!(out, EnterAlternateScreen)?;
        let backend  = CrosstermBackend::new(out);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal, i18n: I18n::new(lang) })
    }

    pub fn cleanup(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
    }

    pub fn draw(&mut self, s: &AppState) -> Result<()> {
        let i18n = &self.i18n;
        self.terminal.draw(|f| {
            let area = f.area();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),  // header / status bar
                    Constraint::Min(6),     // SIM TX log
                    Constraint::Min(4),     // YOUR decoded text
                    Constraint::Length(3),  // footer hints
                ])
                .split(area);

            // ── Header ────────────────────────────────────────────────────
            let header = Paragraph::new(format!(
                " {}  |  MY: {}  ←→  SIM: {}  |  {}  {}  |  {:.0}WPM  {:.0}Hz  {:+.0}dB",
                i18n.t("app.title"), s.my_call, s.other_call, s.runtime_state, s.qso_state,
                s.wpm_estimate, s.tone_hz, s.level_db
            ))
            .style(Style::default().fg(Color::Black).bg(Color::Cyan)
                   .add_modifier(Modifier::BOLD));
            f.render_widget(header, chunks[0]);

            // ── SIM TX ────────────────────────────────────────────────────
            let sim_text: Vec<Line> = s.tx_tail.iter()
                .map(|l| Line::from(Span::styled(
                    l.clone(),
                    Style::default().fg(Color::Green),
                )))
                .collect();
            let pending = if s.pending_callers.is_empty() {
                String::new()
            } else {
                format!("  [pending: {}]", s.pending_callers.join(", "))
            };
            let sim_block = Paragraph::new(sim_text)
                .block(Block::default()
                    .title(format!(" {}  ({}){} ", i18n.t("label.tx"), s.other_call, pending))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Green)))
                .wrap(Wrap { trim: true });
            f.render_widget(sim_block, chunks[1]);

            // ── User decoded ──────────────────────────────────────────────
            let rx_text: Vec<Line> = s.rx_tail.iter()
                .map(|l| Line::from(Span::styled(l.clone(), Style::default().fg(Color::White))))
                .collect();
            let user_lines: Vec<Line> = rx_text.into_iter().chain([
                Line::from(vec![
                    Span::styled(format!("{}: ", i18n.t("label.decoded")), Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                    Span::styled(s.decoded_tail.clone(), Style::default().fg(Color::White)),
                ]),
                Line::from(vec![
                    Span::styled(
                        if s.text_mode { "TYPING:  " } else { "CURRENT: " },
                        Style::default().fg(Color::DarkGray)
                    ),
                    Span::styled(s.current_code.clone(), Style::default().fg(Color::Cyan)),
                ]),
                Line::from(vec![
                    Span::styled(format!("{}:  ", i18n.t("label.status")), Style::default().fg(Color::DarkGray)),
                    Span::styled(s.status.clone(), Style::default().fg(Color::Magenta)),
                ]),
            ]).collect();
            let user_block = Paragraph::new(user_lines)
                .block(Block::default()
                    .title(format!(" {} ", i18n.t("label.rx")))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow)))
                .wrap(Wrap { trim: true });
            f.render_widget(user_block, chunks[2]);

            // ── Footer ────────────────────────────────────────────────────
            let footer_text = if s.text_mode {
                format!(" Type callsign/exchange   Space = word   Enter = send over (K)   {}", i18n.t("app.quit"))
            } else {
                format!(" Hardware keyer active   {}", i18n.t("app.quit"))
            };
            let footer = Paragraph::new(footer_text)
            .style(Style::default().fg(Color::DarkGray).bg(Color::Black));
            f.render_widget(footer, chunks[3]);
        })?;
        Ok(())
    }
}
