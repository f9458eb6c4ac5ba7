use hibernation_core::{
    format_bytes, ActionKind, ActionResult, KernelSupport, ReadinessReport, SwapEntry, SwapKind,
    Verdict, VERSION,
};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, Dialog, Task};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Draw the whole screen
pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Status
            Constraint::Length(7), // Result
            Constraint::Length(3), // Actions
            Constraint::Length(3), // Footer
        ])
        .split(f.size());

    draw_header(f, chunks[0]);
    draw_status(f, chunks[1], app);
    draw_result(f, chunks[2], app);
    draw_actions(f, chunks[3], app);
    draw_footer(f, chunks[4], app);

    if let Some(dialog) = app.dialog {
        draw_dialog(f, dialog, app);
    }
}

fn draw_header(f: &mut Frame, area: Rect) {
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Hibernation Helper",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" v{}  ", VERSION)),
        Span::styled(
            "swap, resume arguments and test hibernation",
            Style::default().fg(Color::DarkGray),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL))
    .alignment(Alignment::Center);

    f.render_widget(header, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let Some(report) = &app.report else {
        let waiting = Paragraph::new(format!("{} Inspecting system...", spinner(app.tick)))
            .block(Block::default().borders(Borders::ALL).title(" Status "));
        f.render_widget(waiting, area);
        return;
    };

    let verdict = report.verdict();
    let mut lines = vec![
        row("RAM", report.total_ram_bytes.map(format_bytes)),
        row("Hibernation swap", Some(describe_swap(report))),
    ];
    lines.extend(swap_lines(report));
    lines.extend([
        row(
            "Resume (running)",
            Some(report.resume_parameter_value().unwrap_or_else(|| "not set".into())),
        ),
        row(
            "Resume (next boot)",
            Some(
                report
                    .configured_resume
                    .as_ref()
                    .map(|r| r.to_args())
                    .unwrap_or_else(|| "not set".into()),
            ),
        ),
        row("Kernel support", Some(describe_kernel(report))),
        row("Free space", report.free_space_bytes.map(format_bytes)),
        row("State", Some(app.lifecycle.state().to_string())),
        Line::from(""),
        Line::from(Span::styled(
            verdict.describe(),
            Style::default()
                .fg(verdict_color(&verdict))
                .add_modifier(Modifier::BOLD),
        )),
    ]);

    for error in &report.probe_errors {
        lines.push(Line::from(Span::styled(
            format!("  could not read {}: {}", error.field, error.message),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let status = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Status "))
        .wrap(Wrap { trim: false });
    f.render_widget(status, area);
}

fn draw_result(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default().borders(Borders::ALL).title(" Last action ");

    let paragraph = match (app.busy, &app.message) {
        (Some(Task::Action(kind)), _) => Paragraph::new(Line::from(vec![
            Span::styled(spinner(app.tick), Style::default().fg(Color::Yellow)),
            Span::raw(format!(" {}... authenticate if prompted", progress_label(kind))),
        ])),
        (_, Some(result)) => Paragraph::new(result_lines(result)),
        _ => Paragraph::new(Span::styled(
            "No action run yet",
            Style::default().fg(Color::DarkGray),
        )),
    };

    f.render_widget(paragraph.block(block).wrap(Wrap { trim: false }), area);
}

fn draw_actions(f: &mut Frame, area: Rect, app: &App) {
    let button = |key: &'static str, label: &'static str, enabled: bool| {
        let style = if enabled {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        vec![Span::styled(format!(" {} {} ", key, label), style), Span::raw("  ")]
    };

    let mut spans = Vec::new();
    spans.extend(button("e", "Enable", app.can_trigger(ActionKind::Enable)));
    spans.extend(button("t", "Test hibernate", app.can_trigger(ActionKind::Test)));
    spans.extend(button("d", "Disable", app.can_trigger(ActionKind::Disable)));
    spans.extend(button("r", "Refresh", app.busy.is_none()));

    let actions = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" Actions "))
        .alignment(Alignment::Center);
    f.render_widget(actions, area);
}

/// Draw footer with keyboard shortcuts
fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Black).bg(Color::Gray));

    let mut spans = vec![
        key(" q/Esc "),
        Span::raw(" Quit  "),
        key(" a "),
        Span::raw(" About  "),
    ];
    if app.dialog.is_some() {
        spans.extend([key(" y "), Span::raw(" Yes  "), key(" n "), Span::raw(" No  ")]);
    }

    let footer = Paragraph::new(Line::from(spans))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Gray)),
        )
        .alignment(Alignment::Left);
    f.render_widget(footer, area);
}

fn draw_dialog(f: &mut Frame, dialog: Dialog, app: &App) {
    let config = app.helper().config();
    let swap_file = config.swap.file_path.display().to_string();

    let (title, body): (&str, Vec<String>) = match dialog {
        Dialog::ConfirmEnable => (
            " Enable hibernation ",
            vec![
                "Set up swap and kernel resume arguments for hibernation?".into(),
                format!("A swap file may be created at {}.", swap_file),
                "Steps already applied are kept if a later step fails.".into(),
            ],
        ),
        Dialog::ConfirmTest => (
            " Test hibernation ",
            vec![
                "The system will hibernate now.".into(),
                "Save your work first. Continue?".into(),
            ],
        ),
        Dialog::ConfirmDisable => (
            " Disable hibernation ",
            vec!["Remove the resume kernel arguments?".into()],
        ),
        Dialog::RemoveSwapFile => (
            " Remove swap file ",
            vec![
                format!("Also delete {} and its fstab entry?", swap_file),
                "y: delete it   n: keep it   Esc: cancel".into(),
            ],
        ),
        Dialog::About => (
            " About ",
            vec![
                format!("Hibernation Helper v{}", VERSION),
                "Checks hibernation readiness, configures swap and resume".into(),
                "arguments, and runs a test hibernation.".into(),
                format!("Bootloader tool: {}", config.bootloader.tool),
            ],
        ),
    };

    let lines: Vec<Line> = body.into_iter().map(Line::from).collect();
    let area = centered_rect(60, lines.len() as u16 + 4, f.size());

    let popup = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(title),
        )
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center);

    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

fn row(label: &str, value: Option<String>) -> Line<'static> {
    let value = match value {
        Some(value) => Span::raw(value),
        None => Span::styled("unknown", Style::default().fg(Color::DarkGray)),
    };
    Line::from(vec![
        Span::styled(format!("{:<20}", label), Style::default().fg(Color::Gray)),
        value,
    ])
}

fn describe_swap(report: &ReadinessReport) -> String {
    match (report.swap_kind, &report.swap_path) {
        (SwapKind::None, _) | (_, None) => "none usable for hibernation".to_string(),
        (kind, Some(path)) => format!(
            "{} {} ({})",
            kind,
            path.display(),
            format_bytes(report.swap_size_bytes)
        ),
    }
}

/// Every active swap area, zram included but marked as unusable
fn swap_lines(report: &ReadinessReport) -> Vec<Line<'static>> {
    if report.swaps.is_empty() {
        return vec![row("Active swap", Some("none".to_string()))];
    }

    let total: u64 = report.swaps.iter().map(|s| s.size_bytes).sum();
    let mut lines = vec![row(
        "Active swap",
        Some(format!("{} area(s), {} total", report.swaps.len(), format_bytes(total))),
    )];
    for entry in &report.swaps {
        let style = if entry.is_zram() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::raw(format!("{:<20}", "")),
            Span::styled(describe_entry(entry), style),
        ]));
    }
    lines
}

fn describe_entry(entry: &SwapEntry) -> String {
    let mut text = format!(
        "{} {} ({})",
        entry.path.display(),
        entry.kind,
        format_bytes(entry.size_bytes)
    );
    if entry.is_zram() {
        text.push_str(" [zram: in RAM, cannot hold a hibernation image]");
    }
    text
}

fn describe_kernel(report: &ReadinessReport) -> String {
    if let Some(mode) = &report.lockdown {
        return format!("blocked by lockdown ({})", mode);
    }
    match report.kernel_support {
        KernelSupport::Supported => "yes".to_string(),
        KernelSupport::Unsupported => "no".to_string(),
        KernelSupport::Unknown => "unknown".to_string(),
    }
}

fn result_lines(result: &ActionResult) -> Vec<Line<'static>> {
    let (color, heading) = match (result.success, result.failure) {
        (true, _) => (Color::Green, "Success".to_string()),
        (false, Some(kind)) => (Color::Red, format!("Failed: {}", kind.label())),
        (false, None) => (Color::Red, "Failed".to_string()),
    };

    let mut lines = vec![Line::from(Span::styled(
        heading,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))];
    lines.extend(result.message.lines().map(|l| Line::from(l.to_string())));
    lines
}

fn verdict_color(verdict: &Verdict) -> Color {
    match verdict {
        Verdict::Ready => Color::Green,
        Verdict::RebootRequired => Color::Yellow,
        Verdict::Unknown => Color::Gray,
        _ => Color::Red,
    }
}

fn progress_label(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Enable => "Enabling hibernation",
        ActionKind::Disable => "Disabling hibernation",
        ActionKind::Test => "Requesting hibernation",
    }
}

fn spinner(tick: usize) -> &'static str {
    SPINNER[tick % SPINNER.len()]
}

/// Rectangle of `percent_x` width and `height` rows centered in `area`
fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let height = height.min(area.height);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(area.height.saturating_sub(height) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
