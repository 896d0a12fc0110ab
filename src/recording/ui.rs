//! Terminal modal for the recorder.
//!
//! Renders a [`SessionView`] and turns key presses into session events. The
//! modal holds no session state of its own apart from the elapsed-time clock.

use std::io::{stdout, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::session::{format_size, SessionEvent, SessionState, SessionView, TextKey, TextProvider};

const FOREGROUND: Color = Color::Rgb(185, 207, 212);
const BACKGROUND: Color = Color::Rgb(0, 0, 0);
const DISABLED: Color = Color::DarkGray;

const MODAL_WIDTH: u16 = 64;
const MODAL_HEIGHT: u16 = 9;

/// Terminal UI hosting the recorder modal.
pub struct RecorderModal {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    recording_since: Option<Instant>,
}

impl RecorderModal {
    /// Enters raw mode and the alternate screen.
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            recording_since: None,
        })
    }

    pub fn render(&mut self, view: &SessionView, text: &dyn TextProvider) -> Result<()> {
        match (view.state, self.recording_since) {
            (SessionState::Recording, None) => self.recording_since = Some(Instant::now()),
            (SessionState::Recording, Some(_)) => {}
            _ => self.recording_since = None,
        }
        let elapsed = self.recording_since.map(|since| since.elapsed());

        self.terminal.draw(|frame| {
            let area = frame.area();
            draw_modal(frame, area, view, text, elapsed);
        })?;
        Ok(())
    }

    /// Waits up to `timeout` for a key press and maps it to a session event.
    pub fn poll_event(&mut self, timeout: Duration) -> Result<Option<SessionEvent>> {
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                return Ok(key_to_event(key));
            }
        }
        Ok(None)
    }

    /// Leaves the alternate screen and restores the terminal.
    pub fn cleanup(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

/// Key bindings of the modal.
pub fn key_to_event(key: KeyEvent) -> Option<SessionEvent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    let event = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => SessionEvent::Close,
        KeyCode::Char('r') | KeyCode::Char(' ') => SessionEvent::StartStop,
        KeyCode::Char('p') => SessionEvent::TogglePlayback,
        KeyCode::Enter | KeyCode::Char('u') => SessionEvent::Upload,
        KeyCode::Char('c') | KeyCode::Backspace => SessionEvent::Cancel,
        KeyCode::Esc | KeyCode::Char('q') => SessionEvent::Close,
        _ => return None,
    };
    tracing::debug!("Key {:?} -> {}", key.code, event.name());
    Some(event)
}

/// Draws the modal centered in `area`.
pub fn draw_modal(
    frame: &mut Frame,
    area: Rect,
    view: &SessionView,
    text: &dyn TextProvider,
    elapsed: Option<Duration>,
) {
    let modal = centered(area, MODAL_WIDTH, MODAL_HEIGHT);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", text.text(TextKey::Title)))
        .style(Style::default().fg(FOREGROUND).bg(BACKGROUND));

    let mut status = Vec::new();
    if let Some(indicator) = indicator(view.state) {
        status.push(indicator);
    }
    status.push(Span::raw(text.text(view.description)));
    if let Some(elapsed) = elapsed {
        let secs = elapsed.as_secs();
        status.push(Span::raw(format!(" {}:{:02}", secs / 60, secs % 60)));
    }

    let size = if matches!(view.state, SessionState::Recording | SessionState::Processing) {
        format_size(Some(view.buffered_bytes))
    } else {
        view.recording_size.clone()
    };

    let actions = Line::from(vec![
        action("r", text.text(view.record_action), view.disallow_record),
        Span::raw("  "),
        action("p", text.text(view.playback_action), view.disallow_playback),
        Span::raw("  "),
        action("enter", text.text(TextKey::ActionUpload), view.disallow_upload),
        Span::raw("  "),
        action("c", text.text(TextKey::ActionCancel), !view.state.is_capturing()),
    ]);

    let mut lines = vec![
        Line::from(status),
        Line::from(format!("{}: {}", text.text(TextKey::SizeLabel), size)),
        Line::default(),
        actions,
        Line::default(),
    ];
    if let Some(flash) = view.flash {
        lines.push(Line::from(Span::styled(
            text.text(flash.key),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true });

    frame.render_widget(Clear, modal);
    frame.render_widget(paragraph, modal);
}

fn indicator(state: SessionState) -> Option<Span<'static>> {
    match state {
        SessionState::Recording => Some(Span::styled("● ", Style::default().fg(Color::Red))),
        SessionState::RequestingDevice | SessionState::RecordingStart | SessionState::Processing => {
            Some(Span::styled("◌ ", Style::default().fg(Color::Yellow)))
        }
        SessionState::Playing => Some(Span::styled("▶ ", Style::default().fg(Color::Green))),
        SessionState::Idle => None,
    }
}

fn action(key: &str, label: String, disabled: bool) -> Span<'static> {
    let style = if disabled {
        Style::default().fg(DISABLED)
    } else {
        Style::default().fg(FOREGROUND)
    };
    Span::styled(format!("[{key}] {label}"), style)
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
