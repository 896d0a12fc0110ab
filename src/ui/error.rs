//! Full-screen error display for failures that end the recorder.

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Block, Paragraph, Wrap},
};
use std::io::{self, Stdout};

const ERROR_BACKGROUND: Color = Color::Rgb(255, 0, 0);
const ERROR_FOREGROUND: Color = Color::Rgb(255, 255, 255);

/// Red screen with the message centered; any key dismisses it.
pub struct ErrorScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    active: bool,
}

impl ErrorScreen {
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(ErrorScreen {
            terminal,
            active: true,
        })
    }

    /// Shows `message` and blocks until a key is pressed.
    pub fn show_error(&mut self, message: &str) -> anyhow::Result<()> {
        loop {
            self.terminal.draw(|frame| {
                let area = frame.area();
                draw_error(frame, area, message);
            })?;

            if event::poll(std::time::Duration::from_millis(100))? {
                if let Event::Key(_) = event::read()? {
                    break;
                }
            }
        }
        Ok(())
    }

    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for ErrorScreen {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Shows `message` on an error screen and restores the terminal afterwards.
pub fn show_fatal(message: &str) -> anyhow::Result<()> {
    let mut screen = ErrorScreen::new()?;
    screen.show_error(message)?;
    screen.cleanup()
}

/// Renders the error message, one paragraph line per message line, wrapped
/// to 80% of the width and vertically centered.
pub fn draw_error(frame: &mut Frame, area: Rect, message: &str) {
    let style = Style::default().fg(ERROR_FOREGROUND).bg(ERROR_BACKGROUND);
    frame.render_widget(Block::default().style(style), area);

    let lines: Vec<Line> = message
        .lines()
        .map(|line| Line::from(Span::styled(line.to_string(), style)))
        .collect();
    let height = (lines.len() as u16).min(area.height);

    let text_area = Rect {
        x: area.x + area.width / 10,
        y: area.y + (area.height - height) / 2,
        width: area.width * 8 / 10,
        height: area.height - (area.height - height) / 2,
    };

    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, text_area);
}
