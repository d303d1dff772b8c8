use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Cell, List, ListItem, ListState, Paragraph, Row, StatefulWidget, Table, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::ui::{format_clock, pad_label};
use crate::App;
use crimp::controller::ControllerState;
use crimp::fields::FieldTarget;
use crimp::phase::{Grade, Phase, StatKey, StatType};

/// A UI Screen boundary: one per controller state
pub trait Screen {
    fn title(&self, app: &App) -> String;
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer);
    fn hints(&self) -> Vec<&'static str>;
}

pub const EDIT_HINTS: [&str; 2] = ["(enter) apply", "(esc) cancel"];

/// Nothing started yet
pub struct WelcomeScreen;

impl Screen for WelcomeScreen {
    fn title(&self, _app: &App) -> String {
        "crimp".to_string()
    }

    fn render(&self, _app: &App, area: Rect, buf: &mut Buffer) {
        let lines = vec![
            Line::from(Span::styled(
                "Ready to train",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::default(),
            Line::from(
                Phase::ALL
                    .iter()
                    .map(|p| p.label())
                    .collect::<Vec<_>>()
                    .join(" > "),
            ),
        ];
        let [_, middle, _] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(3),
            Constraint::Fill(1),
        ])
        .areas(area);
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .render(middle, buf);
    }

    fn hints(&self) -> Vec<&'static str> {
        vec!["(s)tart", "(q)uit"]
    }
}

/// An active phase
pub struct PhaseScreen(pub Phase);

impl Screen for PhaseScreen {
    fn title(&self, _app: &App) -> String {
        self.0.label().to_string()
    }

    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        match self.0 {
            Phase::Hangboard | Phase::PowerEndurance => {
                render_fields(app, &FieldTarget::form_for(self.0), area, buf)
            }
            Phase::Climbing => render_tallies(app, area, buf),
            Phase::Rehab => render_rehab(app, area, buf),
            Phase::Stretching => render_timer(app, area, buf),
        }
    }

    fn hints(&self) -> Vec<&'static str> {
        let next = if self.0.is_last() {
            "(n) finish"
        } else {
            "(n)ext phase"
        };
        match self.0 {
            Phase::Hangboard | Phase::PowerEndurance => {
                vec!["(up/down) select", "(enter) edit", next, "(q)uit"]
            }
            Phase::Climbing => vec!["(arrows) select", "(+/-) count", next, "(q)uit"],
            Phase::Rehab => vec!["(+/-) sets", next, "(q)uit"],
            Phase::Stretching => vec![next, "(q)uit"],
        }
    }
}

/// Review of a finished session
pub struct SummaryScreen;

impl Screen for SummaryScreen {
    fn title(&self, app: &App) -> String {
        match app
            .controller
            .summary()
            .and_then(|s| s.started_at())
        {
            Some(start) => format!(
                "Summary: {}",
                start.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
            ),
            None => "Summary".to_string(),
        }
    }

    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let [moves, fields] =
            Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(area);
        Paragraph::new(format!("Total moves: {}", app.data().total_moves))
            .style(Style::default().add_modifier(Modifier::BOLD))
            .render(moves, buf);
        render_fields(app, &FieldTarget::summary_form(), fields, buf);
    }

    fn hints(&self) -> Vec<&'static str> {
        vec![
            "(enter) edit",
            "(e)mail",
            "e(x)port",
            "(s)ave",
            "(n)ew session",
            "(q)uit",
        ]
    }
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen(state: ControllerState) -> Box<dyn Screen> {
    match state {
        ControllerState::Inactive => Box::new(WelcomeScreen),
        ControllerState::Active(phase) => Box::new(PhaseScreen(phase)),
        ControllerState::Terminal => Box::new(SummaryScreen),
    }
}

fn render_fields(app: &App, fields: &[FieldTarget], area: Rect, buf: &mut Buffer) {
    let data = app.data();
    let label_width = fields
        .iter()
        .map(|f| f.label().width())
        .max()
        .unwrap_or(0)
        + 2;

    let items: Vec<ListItem> = fields
        .iter()
        .map(|target| {
            let (text, style) = match &app.editor {
                Some(editor) if editor.target() == *target => {
                    let style = if editor.is_invalid() {
                        Style::default()
                            .fg(Color::Red)
                            .add_modifier(Modifier::UNDERLINED)
                    } else {
                        Style::default().fg(Color::Yellow)
                    };
                    (format!("{}_", editor.text()), style)
                }
                _ => (target.current_text(data), Style::default()),
            };
            ListItem::new(Line::from(vec![
                Span::raw(pad_label(&target.label(), label_width)),
                Span::styled(text, style),
            ]))
        })
        .collect();

    let list = List::new(items)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(app.selected));
    StatefulWidget::render(list, area, buf, &mut state);
}

fn render_tallies(app: &App, area: Rect, buf: &mut Buffer) {
    let [table_area, total_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(area);
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let selected = app.selected_tally();

    let header = Row::new(
        std::iter::once(Cell::from("Grade"))
            .chain(StatType::ALL.iter().map(|stat| Cell::from(stat.label()))),
    )
    .style(bold);

    let rows = Grade::ALL.iter().map(|&grade| {
        let counts = StatType::ALL.iter().map(move |&stat| {
            let key = StatKey::new(grade, stat);
            let style = if selected == Some(key) {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Cell::from(format!("- {:>3} +", app.tallies.value(key))).style(style)
        });
        Row::new(std::iter::once(Cell::from(grade.to_string())).chain(counts))
    });

    let widths = [
        Constraint::Length(8),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
    ];
    Widget::render(
        Table::new(rows, widths)
            .header(header)
            .block(Block::bordered().title("Tallies")),
        table_area,
        buf,
    );
    Paragraph::new(format!("Total moves: {}", app.data().total_moves))
        .style(bold)
        .render(total_area, buf);
}

fn render_rehab(app: &App, area: Rect, buf: &mut Buffer) {
    Paragraph::new(vec![
        Line::from(Span::styled(
            "Rehab Sets",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("- {} +", app.rehab.value())),
    ])
    .alignment(Alignment::Center)
    .block(Block::bordered())
    .render(area, buf);
}

fn render_timer(app: &App, area: Rect, buf: &mut Buffer) {
    let elapsed = app.controller.session().current_phase_elapsed_seconds;
    Paragraph::new(Line::from(Span::styled(
        format_clock(elapsed),
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    )))
    .alignment(Alignment::Center)
    .render(area, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Controller;
    use crimp::clock::ManualClock;
    use crimp::config::Config;
    use crimp::controller::PhaseSessionController;
    use crimp::durable::MemoryStore;
    use crimp::fields::FieldEditor;
    use std::path::PathBuf;

    fn create_test_app() -> (App, ManualClock) {
        let clock = ManualClock::at_secs(1_700_000_000);
        let controller: Controller =
            PhaseSessionController::new(Box::new(MemoryStore::new()), Box::new(clock.clone()));
        (
            App::new(controller, Config::default(), None, PathBuf::from("exports")),
            clock,
        )
    }

    fn advance_to(app: &mut App, phase_index: usize) {
        app.controller.start().unwrap();
        for _ in 0..phase_index {
            app.controller.complete_phase().unwrap();
        }
    }

    fn rendered(app: &App) -> String {
        let area = Rect::new(0, 0, 100, 60);
        let mut buffer = Buffer::empty(area);
        app.render(area, &mut buffer);
        buffer
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect::<String>()
    }

    #[test]
    fn test_screen_per_state() {
        assert_eq!(current_screen(ControllerState::Inactive).hints(), vec!["(s)tart", "(q)uit"]);
        let rehab = current_screen(ControllerState::Active(Phase::Rehab));
        assert!(rehab.hints().contains(&"(n) finish"));
        assert!(current_screen(ControllerState::Terminal)
            .hints()
            .contains(&"(s)ave"));
    }

    #[test]
    fn test_welcome_lists_phases() {
        let (app, _) = create_test_app();
        let content = rendered(&app);
        assert!(content.contains("Ready to train"));
        assert!(content.contains("Stretching > Hangboard"));
    }

    #[test]
    fn test_stretching_shows_timers() {
        let (mut app, clock) = create_test_app();
        advance_to(&mut app, 0);
        clock.advance_secs(75);
        app.on_tick();
        let content = rendered(&app);
        assert!(content.contains("Stretching"));
        assert!(content.contains("(1/5)"));
        assert!(content.contains("01:15"));
    }

    #[test]
    fn test_climbing_grid() {
        let (mut app, _) = create_test_app();
        advance_to(&mut app, 2);
        app.controller
            .record_climbing_stat(Grade::V11Plus, StatType::Flashes, 3)
            .unwrap();
        app.tallies
            .sync_from(&app.controller.session().data.climbing_stats);

        let content = rendered(&app);
        assert!(content.contains("V11+"));
        assert!(content.contains("Flashes"));
        assert!(content.contains("Total moves: 3"));
    }

    #[test]
    fn test_form_shows_editor_text() {
        let (mut app, _) = create_test_app();
        advance_to(&mut app, 1);
        let mut editor = FieldEditor::new(FieldTarget::HangboardWeight(0), String::new());
        editor.push('4');
        editor.push('2');
        app.editor = Some(editor);

        let content = rendered(&app);
        assert!(content.contains("Hang Set 1 Weight (lbs)"));
        assert!(content.contains("42_"));
        assert!(content.contains("(enter) apply"));
    }

    #[test]
    fn test_summary_lists_fields() {
        let (mut app, _) = create_test_app();
        advance_to(&mut app, 5);
        let content = rendered(&app);
        assert!(content.contains("Summary"));
        assert!(content.contains("Total Time"));
        assert!(content.contains("Total moves: 0"));
    }

    #[test]
    fn test_status_line_is_shown() {
        let (mut app, _) = create_test_app();
        app.status = Some(crate::Status::Error("Save failed: offline".into()));
        assert!(rendered(&app).contains("Save failed: offline"));
    }

    #[test]
    fn test_render_tiny_area_does_not_panic() {
        let (mut app, _) = create_test_app();
        advance_to(&mut app, 2);
        let area = Rect::new(0, 0, 10, 4);
        let mut buffer = Buffer::empty(area);
        app.render(area, &mut buffer);
    }
}
