//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on exit,
//! and drawing the run status, the hook output and the modal overlays.

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::Terminal;

use crate::ansi::ansi_spans;
use crate::app::{App, InputMode, StatusLevel};
use crate::host::Host;
use crate::state::RunStatus;
use crate::supervisor::Supervisor;

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

const HELP_SYMBOLS: &str = "a all files · s staged · h hook · i install · u autoupdate · k kill · ? help · q quit";
const HELP_PLAIN: &str = "a all files | s staged | h hook | i install | u autoupdate | k kill | ? help | q quit";

/// Enables raw mode, enters the alternate screen, and creates a `ratatui` Terminal instance.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Disables raw mode, leaves the alternate screen, and shows the cursor.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Mirrors the run status into the terminal title.
pub fn set_title(terminal: &mut TuiTerminal, status: RunStatus) -> io::Result<()> {
    execute!(terminal.backend_mut(), SetTitle(format!("hookrack · {}", status)))
}

pub fn draw<H: Host>(
    app: &mut App,
    supervisor: &Supervisor<H>,
    terminal: &mut TuiTerminal,
) -> io::Result<()> {
    let state = supervisor.state();
    let unavailable = supervisor.unavailable_reason();

    terminal.draw(|frame| {
        let area = frame.size();
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(area);
        let border_style = Style::default().fg(Color::DarkGray);

        let mut header = vec![Line::from(vec![
            Span::styled(
                format!("{} ", status_glyph(state.status(), app.use_symbols)),
                status_style(state.status()),
            ),
            Span::styled(
                state.status().to_string(),
                status_style(state.status()).add_modifier(Modifier::BOLD),
            ),
            Span::raw(match supervisor.active_command() {
                Some(command) => format!("  {}", shell_words::join(command)),
                None => String::new(),
            }),
        ])];
        if let Some(reason) = &unavailable {
            header.push(Line::from(Span::styled(
                format!("unavailable: {}", reason),
                Style::default().fg(Color::Yellow),
            )));
        } else if !state.failed_hooks().is_empty() {
            header.push(Line::from(vec![
                Span::styled("failed: ", Style::default().fg(Color::Red)),
                Span::raw(state.failed_hooks().join(", ")),
            ]));
        }
        let header = Paragraph::new(Text::from(header)).block(
            Block::default()
                .title("hookrack")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        );
        frame.render_widget(header, vertical[0]);

        let output_block = Block::default()
            .title(if app.follow { "Output" } else { "Output (paused)" })
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border_style);
        let output_area = output_block.inner(vertical[1]);
        let output = supervisor.output();
        app.set_view_size(output_area.height as usize, output.line_count());

        let width = output_area.width as usize;
        let lines: Vec<Line<'static>> = output
            .lines()
            .skip(app.view_start())
            .take(output_area.height as usize)
            .map(|line| Line::from(truncate_spans(ansi_spans(line), width)))
            .collect();
        frame.render_widget(Paragraph::new(lines).block(output_block), vertical[1]);
        if output.is_empty() {
            let hint = Paragraph::new("No output yet").style(Style::default().fg(Color::DarkGray));
            frame.render_widget(hint, output_area);
        }

        let default_help = if app.use_symbols { HELP_SYMBOLS } else { HELP_PLAIN };
        let footer = match app.status_message() {
            Some((text, StatusLevel::Warning)) => {
                Span::styled(text.to_string(), Style::default().fg(Color::Yellow))
            }
            Some((text, StatusLevel::Info)) => Span::raw(text.to_string()),
            None => Span::styled(default_help, Style::default().fg(Color::DarkGray)),
        };
        let footer = Paragraph::new(Line::from(footer)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        );
        frame.render_widget(footer, vertical[2]);

        match app.input_mode {
            InputMode::PickHook => {
                let popup = centered_rect(50, 60, area);
                let hooks = app.filtered_hooks();
                let items: Vec<ListItem> = hooks
                    .iter()
                    .map(|id| ListItem::new(id.to_string()))
                    .collect();
                let mut list_state = ListState::default();
                if !hooks.is_empty() {
                    list_state.select(Some(app.hook_selected.min(hooks.len() - 1)));
                }
                let list = List::new(items)
                    .block(
                        Block::default()
                            .title(format!("Run hook: {}", app.query))
                            .borders(Borders::ALL)
                            .border_type(BorderType::Rounded),
                    )
                    .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
                    .highlight_symbol(if app.use_symbols { "▶ " } else { "> " });
                frame.render_widget(Clear, popup);
                frame.render_stateful_widget(list, popup, &mut list_state);
            }
            InputMode::Confirm => {
                let popup = centered_rect(50, 20, area);
                let dialog = Paragraph::new(Text::from(vec![
                    Line::from(app.confirm_message.clone()),
                    Line::from(Span::styled("y kill and restart · n keep", Style::default().fg(Color::DarkGray))),
                ]))
                .block(
                    Block::default()
                        .title("Hooks are running")
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded)
                        .border_style(Style::default().fg(Color::Yellow)),
                );
                frame.render_widget(Clear, popup);
                frame.render_widget(dialog, popup);
            }
            InputMode::Normal if app.show_help => {
                let popup = centered_rect(50, 60, area);
                let help_text = [
                    "Runs:",
                    "  a          All hooks, all files",
                    "  s          All hooks, staged files",
                    "  h          Pick a single hook",
                    "  i          Install git hook",
                    "  u          Autoupdate hook revisions",
                    "  k          Kill the active run",
                    "",
                    "Output:",
                    "  Up/Down    Scroll",
                    "  PageUp/Dn  Scroll a page",
                    "  Home/End   Top / follow",
                    "  f          Toggle follow",
                    "",
                    "  ?          Toggle this help",
                    "  q          Quit",
                ]
                .join("\n");
                let help = Paragraph::new(help_text)
                    .block(
                        Block::default()
                            .title("Help")
                            .borders(Borders::ALL)
                            .border_type(BorderType::Rounded),
                    )
                    .style(Style::default().bg(Color::DarkGray).fg(Color::White));
                frame.render_widget(Clear, popup);
                frame.render_widget(help, popup);
            }
            InputMode::Normal => {}
        }
    })?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn status_glyph(status: RunStatus, use_symbols: bool) -> char {
    match (status, use_symbols) {
        (RunStatus::Idle, true) => '·',
        (RunStatus::Running, true) => '▲',
        (RunStatus::Succeeded, true) => '✔',
        (RunStatus::Failed, true) => '✘',
        (RunStatus::Idle, false) => '.',
        (RunStatus::Running, false) => 'R',
        (RunStatus::Succeeded, false) => '+',
        (RunStatus::Failed, false) => 'X',
    }
}

fn status_style(status: RunStatus) -> Style {
    match status {
        RunStatus::Idle => Style::default().fg(Color::DarkGray),
        RunStatus::Running => Style::default().fg(Color::Yellow),
        RunStatus::Succeeded => Style::default().fg(Color::Green),
        RunStatus::Failed => Style::default().fg(Color::Red),
    }
}

fn truncate_spans(spans: Vec<Span<'static>>, max: usize) -> Vec<Span<'static>> {
    if max == 0 {
        return Vec::new();
    }
    let total_len: usize = spans.iter().map(|span| span.content.chars().count()).sum();
    if total_len <= max {
        return spans;
    }

    let mut remaining = max.saturating_sub(1);
    let mut out = Vec::new();
    for span in spans {
        if remaining == 0 {
            break;
        }
        let count = span.content.chars().count();
        if count <= remaining {
            remaining -= count;
            out.push(span);
        } else {
            let truncated: String = span.content.chars().take(remaining).collect();
            out.push(Span::styled(truncated, span.style));
            remaining = 0;
        }
    }
    out.push(Span::raw("~"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_spans_marks_cut_lines() {
        let spans = vec![Span::raw("black"), Span::styled("....Failed", Style::default().fg(Color::Red))];
        let out = truncate_spans(spans, 8);
        let text: String = out.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "black..~");
        assert_eq!(out[1].style.fg, Some(Color::Red));
    }

    #[test]
    fn truncate_spans_keeps_short_lines() {
        let out = truncate_spans(vec![Span::raw("ok")], 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "ok");
    }

    #[test]
    fn centered_rect_stays_inside() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = centered_rect(50, 50, area);
        assert!(popup.x >= area.x && popup.right() <= area.right());
        assert!(popup.y >= area.y && popup.bottom() <= area.bottom());
    }
}
