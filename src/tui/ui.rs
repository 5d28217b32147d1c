use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, ListGeometry, Row};
use crate::models::CoachStatus;

pub fn draw(frame: &mut Frame, app: &mut App) {
    // Main horizontal split: day on the left, details and coach on the right
    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
        .split(frame.area());

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Date and streak
            Constraint::Min(0),    // Blocks
            Constraint::Length(1), // Status line
        ])
        .split(main_chunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(55), // Activity details
            Constraint::Min(0),         // Coach
            Constraint::Length(1),      // Coach status
        ])
        .split(main_chunks[1]);

    render_header(frame, app, left_chunks[0]);
    render_day(frame, app, left_chunks[1]);
    render_status(frame, app, left_chunks[2]);

    render_details(frame, app, right_chunks[0]);
    render_coach(frame, app, right_chunks[1]);
    render_coach_status(frame, app, right_chunks[2]);

    if app.picker.is_some() {
        render_picker(frame, app);
    }

    if app.show_help {
        render_help(frame);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let relative = match (app.date - app.today).num_days() {
        0 => " (today)".to_string(),
        1 => " (tomorrow)".to_string(),
        -1 => " (yesterday)".to_string(),
        _ => String::new(),
    };
    let title = format!(" {}{} ", app.date.format("%A %d %B %Y"), relative);

    let total = app.schedule.len();
    let done = app
        .schedule
        .all_ids()
        .into_iter()
        .filter(|id| app.is_done(id))
        .count();
    let sync = if app.is_syncing() { " | ⇅ sync on" } else { "" };
    let stats = format!(
        " {}/{} done | streak {} (best {}){}",
        done, total, app.overall.current, app.overall.longest, sync
    );

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let paragraph = Paragraph::new(stats).style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, inner);
}

fn render_day(frame: &mut Frame, app: &mut App, area: Rect) {
    let rows = app.rows();

    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| match *row {
            Row::Header(block) => {
                let mut spans = vec![Span::styled(
                    block.label(),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )];
                if app.busy.contains(&block) {
                    spans.push(Span::styled(
                        "  [calendar busy]",
                        Style::default().fg(Color::Magenta),
                    ));
                }
                ListItem::new(Line::from(spans))
            }
            Row::Item { block, .. } => {
                let id = app.row_activity(*row).unwrap_or_default();
                let done = app.is_done(id);
                let check = if done { "  [x] " } else { "  [ ] " };
                let style = if done {
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::CROSSED_OUT)
                } else {
                    Style::default().fg(Color::White)
                };

                let mut spans = vec![
                    Span::styled(check, Style::default().fg(Color::Green)),
                    Span::styled(app.catalog.name_of(id).to_string(), style),
                ];
                if let Some(activity) = app.catalog.get(id) {
                    spans.push(Span::styled(
                        format!("  {}m", activity.duration_minutes),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
                if let Some(streak) = app.streak_of(id).filter(|s| s.current > 1) {
                    spans.push(Span::styled(
                        format!("  🔥{}", streak.current),
                        Style::default().fg(Color::Yellow),
                    ));
                }
                if let Some(warning) = app.warning_for(id, block) {
                    spans.push(Span::styled(
                        format!("  ⚠ {}", warning.kind.label()),
                        Style::default().fg(Color::Red),
                    ));
                }
                ListItem::new(Line::from(spans))
            }
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default()
        .with_offset(app.list.offset)
        .with_selected(Some(app.selected));

    frame.render_stateful_widget(list, area, &mut state);

    app.list = ListGeometry {
        top: area.y.saturating_add(1),
        height: area.height.saturating_sub(2),
        offset: state.offset(),
    };
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let (text, color) = match app.status_text() {
        Some(message) => (message.to_string(), Color::Yellow),
        None => (
            "j/k:nav  space:done  a:add  t:tomorrow  c:coach  ?:help  q:quit".to_string(),
            Color::DarkGray,
        ),
    };

    let paragraph = Paragraph::new(text).style(Style::default().fg(color));
    frame.render_widget(paragraph, area);
}

fn render_details(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Activity ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let Some(activity) = app.selected_activity() else {
        let hint = match app.selected_row() {
            Some(Row::Header(time_block)) => format!(
                "{}\n\nPress 'a' to add an activity to this block.",
                time_block.label()
            ),
            _ => "No activity selected".to_string(),
        };
        let paragraph = Paragraph::new(hint).block(block).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    };

    let mut lines = vec![
        Line::from(Span::styled(
            activity.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!(
                "{} · {} min{}",
                activity.category.label(),
                activity.duration_minutes,
                if activity.outdoor { " · outdoor" } else { "" }
            ),
            Style::default().fg(Color::Blue),
        )),
        Line::from(""),
        Line::from(activity.instructions.clone()),
    ];

    if let Some(streak) = app.streak_of(&activity.id) {
        lines.push(Line::from(""));
        lines.push(Line::from(format!(
            "Streak {} days, best {}, done {} times",
            streak.current, streak.longest, streak.total
        )));
    }

    let block_of = app.schedule.block_of(&activity.id);
    if let Some(warning) = block_of.and_then(|b| app.warning_for(&activity.id, b)) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("⚠ {}", warning),
            Style::default().fg(Color::Red),
        )));
    }

    if let Some(url) = activity.external_url() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("o: open {}", url),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_coach(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Coach ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let lines: Vec<Line> = match (&app.advice, app.coach_status) {
        (_, CoachStatus::Thinking) => vec![Line::from("Thinking about your day...")],
        (Some(advice), _) if !advice.suggestions.is_empty() => advice
            .suggestions
            .iter()
            .enumerate()
            .flat_map(|(i, s)| {
                vec![
                    Line::from(vec![
                        Span::styled(format!("{}. ", i + 1), Style::default().fg(Color::Yellow)),
                        Span::styled(
                            app.catalog.name_of(&s.activity_id).to_string(),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(
                            format!("  {}", s.time_block.label()),
                            Style::default().fg(Color::Cyan),
                        ),
                    ]),
                    Line::from(format!("   {}", s.reason)),
                ]
            })
            .collect(),
        (Some(_), _) => vec![Line::from("Nothing to add, your day looks balanced.")],
        (None, _) => vec![Line::from("Press 'c' for suggestions.")],
    };

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_coach_status(frame: &mut Frame, app: &App, area: Rect) {
    let status = match app.coach_status {
        CoachStatus::Idle => String::new(),
        CoachStatus::Thinking => "⏳ Asking coach...".to_string(),
        CoachStatus::Failed => "❌ Coach failed, showing local picks".to_string(),
        CoachStatus::Offline => "⚠️  No API key, showing local picks".to_string(),
        CoachStatus::Ready => app
            .advice
            .as_ref()
            .map(|a| format!("✓ {} | 1-3: accept", a.model_version))
            .unwrap_or_default(),
    };

    let paragraph = Paragraph::new(status).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

fn render_picker(frame: &mut Frame, app: &App) {
    let Some(picker) = &app.picker else {
        return;
    };
    let area = centered_rect(50, 60, frame.area());

    let items: Vec<ListItem> = picker
        .candidates
        .iter()
        .filter_map(|id| app.catalog.get(id))
        .map(|activity| {
            ListItem::new(Line::from(vec![
                Span::raw(activity.name.clone()),
                Span::styled(
                    format!("  {} · {}m", activity.category.label(), activity.duration_minutes),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(" Add to {} ", picker.block.label()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(picker.selected));

    frame.render_widget(Clear, area);
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_help(frame: &mut Frame) {
    let area = centered_rect(50, 70, frame.area());

    let help_text = vec![
        "",
        " Navigation:",
        "   j / ↓        Move down",
        "   k / ↑        Move up",
        "   h / ←        Previous day",
        "   l / →        Next day",
        "   T            Back to today",
        "",
        " Schedule:",
        "   space/Enter  Toggle done",
        "   J / K        Move activity down / up",
        "   [ / ]        Move to previous / next block",
        "   t            Push to tomorrow",
        "   a            Add activity",
        "   d            Remove activity",
        "   mouse drag   Reorder",
        "",
        " Coach and more:",
        "   c            Ask the coach",
        "   1-3          Accept a suggestion",
        "   o            Open activity link",
        "   s            Sync now",
        "",
        " General:",
        "   ?            Toggle this help",
        "   q            Quit",
        "",
        " Press any key to close",
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(help_text.join("\n"))
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
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
