pub mod screen;

use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::{App, Status};
use crimp::controller::ControllerState;
use crimp::phase::PHASE_COUNT;

const HORIZONTAL_MARGIN: u16 = 2;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let screen = screen::current_screen(self.state());
        let [header, body, footer] = Layout::vertical([
            Constraint::Length(2),
            Constraint::Min(3),
            Constraint::Length(2),
        ])
        .horizontal_margin(HORIZONTAL_MARGIN)
        .areas(area);

        let hints = if self.editor.is_some() {
            screen::EDIT_HINTS.to_vec()
        } else {
            screen.hints()
        };

        header_line(self, &screen.title(self)).render(header, buf);
        screen.render(self, body, buf);
        footer_lines(self, &hints).render(footer, buf);
    }
}

/// `MM:SS`, or `H:MM:SS` past the hour.
pub fn format_clock(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// Pads `label` to `width` display columns.
pub fn pad_label(label: &str, width: usize) -> String {
    let fill = width.saturating_sub(label.width());
    format!("{label}{}", " ".repeat(fill))
}

fn header_line(app: &App, title: &str) -> Paragraph<'static> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let session = app.controller.session();

    let mut spans = vec![Span::styled(title.to_string(), bold.fg(Color::Cyan))];
    if let ControllerState::Active(phase) = app.state() {
        spans.push(Span::raw(format!(
            "  ({}/{})",
            phase.index() + 1,
            PHASE_COUNT
        )));
        spans.push(Span::styled(
            format!(
                "   phase {}   total {}",
                format_clock(session.current_phase_elapsed_seconds),
                format_clock(session.data.total_elapsed_seconds)
            ),
            bold,
        ));
    }
    Paragraph::new(Line::from(spans))
}

fn footer_lines(app: &App, hints: &[&str]) -> Paragraph<'static> {
    let italic = Style::default().add_modifier(Modifier::ITALIC);
    let hint_line = Line::from(Span::styled(hints.iter().join(" / "), italic));

    let status_line = match &app.status {
        Some(Status::Info(msg)) => Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Green))),
        Some(Status::Error(msg)) => Line::from(Span::styled(
            msg.clone(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        None if app.saves_in_flight > 0 => Line::from(Span::styled(
            format!("{} save(s) in flight", app.saves_in_flight),
            Style::default().fg(Color::Yellow),
        )),
        None => Line::default(),
    };

    Paragraph::new(vec![status_line, hint_line])
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true })
}
