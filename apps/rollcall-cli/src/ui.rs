use std::{
    collections::{BTreeMap, VecDeque},
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Rectangle},
        Block, Borders, List, ListItem, Paragraph, Row, Table,
    },
    Frame, Terminal,
};
use rollcall_overlay::{Color as OverlayColor, DrawCommand, OverlayRenderer, SceneRecorder, Viewport};
use rollcall_types::{
    attendance::AttendanceRow,
    events::{Condition, ConnectionState, EventPayload, KioskEvent, OverlayEvent, StatusMessage, Tone},
};
use tokio::sync::mpsc::UnboundedSender;

const MAX_LOG_ENTRIES: usize = 120;
const SCALE_STEP: f32 = 0.25;

pub enum UiMessage {
    Event(KioskEvent),
    Shutdown,
}

/// What the operator asked for at the keyboard.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Register(String),
    IdentityInput(String),
    DisplayScale(f32),
}

/// Everything the dashboard shows, folded from kiosk events.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub phase: String,
    pub connection: ConnectionState,
    pub status: Option<StatusMessage>,
    /// Failed conditions, each cleared by its own recovery.
    pub faults: BTreeMap<Condition, StatusMessage>,
    pub overlay: Option<OverlayEvent>,
    /// Newest first, bounded like the kiosk's attendance feed.
    pub attendance: VecDeque<AttendanceRow>,
    max_rows: Option<usize>,
    /// Newest first.
    pub activity: VecDeque<String>,
    pub identity: String,
    pub scale: f32,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DashboardState {
    pub fn new(max_rows: Option<usize>) -> Self {
        Self {
            phase: "starting".into(),
            connection: ConnectionState::Connecting,
            status: None,
            faults: BTreeMap::new(),
            overlay: None,
            attendance: VecDeque::new(),
            max_rows,
            activity: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            identity: String::new(),
            scale: 1.0,
        }
    }

    /// The status line: a failed condition wins over the latest status.
    pub fn status_line(&self) -> Option<&StatusMessage> {
        self.faults.values().next().or(self.status.as_ref())
    }

    pub fn apply(&mut self, event: KioskEvent) {
        match event.payload {
            EventPayload::Lifecycle(lifecycle) => {
                self.phase = format!("{:?}", lifecycle.phase).to_lowercase();
            }
            EventPayload::Overlay(overlay) => self.overlay = Some(overlay),
            EventPayload::Attendance(row) => {
                self.attendance.push_front(row);
                if let Some(max_rows) = self.max_rows {
                    self.attendance.truncate(max_rows);
                }
            }
            EventPayload::Activity(activity) => {
                self.activity.push_front(activity.line);
                self.activity.truncate(MAX_LOG_ENTRIES);
            }
            EventPayload::Status(status) => {
                if let Some(condition) = status.raises() {
                    self.faults.insert(condition, status);
                } else {
                    if let Some(condition) = status.clears() {
                        self.faults.remove(&condition);
                    }
                    self.status = Some(status);
                }
            }
            EventPayload::Connection(state) => {
                if state == ConnectionState::Connected {
                    self.faults.remove(&Condition::Channel);
                }
                self.connection = state;
            }
            EventPayload::IdentityInput(text) => self.identity = text,
        }
    }

    /// Map a key press to an action, editing local state as needed.
    /// Returns `None` for keys with no kiosk-side effect.
    pub fn on_key(&mut self, code: KeyCode) -> Option<UiAction> {
        match code {
            KeyCode::Char(c) => {
                self.identity.push(c);
                Some(UiAction::IdentityInput(self.identity.clone()))
            }
            KeyCode::Backspace => {
                self.identity.pop();
                Some(UiAction::IdentityInput(self.identity.clone()))
            }
            KeyCode::Enter => Some(UiAction::Register(self.identity.clone())),
            KeyCode::Up => {
                self.scale = (self.scale + SCALE_STEP).min(4.0);
                Some(UiAction::DisplayScale(self.scale))
            }
            KeyCode::Down => {
                self.scale = (self.scale - SCALE_STEP).max(SCALE_STEP);
                Some(UiAction::DisplayScale(self.scale))
            }
            _ => None,
        }
    }
}

pub fn run(
    receiver: Receiver<UiMessage>,
    actions: UnboundedSender<UiAction>,
    summary: String,
    max_rows: Option<usize>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, DashboardState::new(max_rows), receiver, actions, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    mut state: DashboardState,
    receiver: Receiver<UiMessage>,
    actions: UnboundedSender<UiAction>,
    summary: &str,
) -> Result<()> {
    let renderer = OverlayRenderer::default();

    loop {
        let mut should_close = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => state.apply(event),
                Ok(UiMessage::Shutdown) | Err(TryRecvError::Disconnected) => {
                    should_close = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        terminal.draw(|f| draw(f, &state, &renderer, summary))?;

        if should_close {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let interrupt =
                    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
                if key.code == KeyCode::Esc || interrupt {
                    break;
                }
                if let Some(action) = state.on_key(key.code) {
                    if actions.send(action).is_err() {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn draw(f: &mut Frame, state: &DashboardState, renderer: &OverlayRenderer, summary: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(f.size());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "rollcall",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::raw(state.phase.clone()),
        Span::raw("  "),
        connection_span(&state.connection),
        Span::raw("  "),
        Span::styled("config:", Style::default().fg(Color::Magenta)),
        Span::raw(" "),
        Span::raw(summary),
        Span::raw("  "),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" quits"),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Kiosk"));
    f.render_widget(header, rows[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[1]);
    draw_overlay(f, body[0], state, renderer);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(body[1]);
    draw_attendance(f, side[0], state);

    let items: Vec<ListItem> = state
        .activity
        .iter()
        .map(|line| ListItem::new(line.clone()))
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Activity"));
    f.render_widget(list, side[1]);

    let status_line = state.status_line().map(status_span).unwrap_or_else(|| Span::raw(""));
    let status = Paragraph::new(Line::from(status_line))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, rows[2]);

    let input = Paragraph::new(Line::from(vec![
        Span::raw(state.identity.clone()),
        Span::styled("_", Style::default().fg(Color::Yellow)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Name to register (Enter)"),
    );
    f.render_widget(input, rows[3]);
}

/// Replays the overlay through a scene recorder and paints the commands on
/// a canvas whose bounds are the frame's pixel space.
fn draw_overlay(f: &mut Frame, area: Rect, state: &DashboardState, renderer: &OverlayRenderer) {
    let title = match &state.overlay {
        Some(overlay) => format!(
            "Overlay seq {} ({} faces, x{:.2})",
            overlay.annotations.seq,
            overlay.annotations.detections.len(),
            state.scale
        ),
        None => "Overlay".to_string(),
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let Some(overlay) = &state.overlay else {
        f.render_widget(Paragraph::new("Waiting for recognition results").block(block), area);
        return;
    };

    let mut scene = SceneRecorder::new();
    renderer.render(
        &mut scene,
        &overlay.annotations,
        Viewport::new(overlay.width, overlay.height),
    );
    let height = overlay.height as f64;
    let canvas = Canvas::default()
        .block(block)
        .x_bounds([0.0, overlay.width.max(1) as f64])
        .y_bounds([0.0, height.max(1.0)])
        .paint(|ctx| {
            for command in scene.commands() {
                match command {
                    DrawCommand::StrokeRect { rect, color, .. } => ctx.draw(&Rectangle {
                        x: rect.x as f64,
                        y: height - rect.bottom() as f64,
                        width: rect.width as f64,
                        height: rect.height as f64,
                        color: terminal_color(*color),
                    }),
                    DrawCommand::Text { text, x, y, color, .. } => {
                        ctx.print(
                            *x as f64,
                            height - *y as f64,
                            Line::styled(
                                text.clone(),
                                Style::default().fg(Color::Black).bg(terminal_color(*color)),
                            ),
                        );
                    }
                    DrawCommand::Clear { .. } | DrawCommand::FillRect { .. } => {}
                }
            }
        });
    f.render_widget(canvas, area);
}

fn draw_attendance(f: &mut Frame, area: Rect, state: &DashboardState) {
    let rows: Vec<Row> = state
        .attendance
        .iter()
        .map(|row| Row::new(vec![row.name.clone(), row.date.clone(), row.time.clone()]))
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Percentage(35),
            Constraint::Percentage(25),
        ],
    )
    .header(
        Row::new(vec!["Name", "Date", "Time"]).style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Attendance ({})", state.attendance.len())),
    );
    f.render_widget(table, area);
}

fn terminal_color(color: OverlayColor) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

fn connection_span(state: &ConnectionState) -> Span<'static> {
    match state {
        ConnectionState::Connecting => Span::styled("connecting", Style::default().fg(Color::Yellow)),
        ConnectionState::Connected => Span::styled("connected", Style::default().fg(Color::Green)),
        ConnectionState::Disconnected { .. } => {
            Span::styled("disconnected", Style::default().fg(Color::Red))
        }
    }
}

fn status_span(status: &StatusMessage) -> Span<'static> {
    let color = match status.tone {
        Tone::Info => Color::White,
        Tone::Success => Color::Green,
        Tone::Error => Color::Red,
    };
    Span::styled(status.text.clone(), Style::default().fg(color))
}

/// One-line rendering of an event for headless logging.
pub fn describe(event: &KioskEvent) -> String {
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!(
            "Lifecycle::{:?} {}",
            lifecycle.phase,
            lifecycle.details.clone().unwrap_or_default()
        ),
        EventPayload::Overlay(overlay) => {
            let names: Vec<_> = overlay
                .annotations
                .detections
                .iter()
                .map(|d| d.name.as_str())
                .collect();
            format!("Overlay seq={} [{}]", overlay.annotations.seq, names.join(", "))
        }
        EventPayload::Attendance(row) => {
            format!("Attendance {} {} {}", row.name, row.date, row.time)
        }
        EventPayload::Activity(activity) => activity.line.clone(),
        EventPayload::Status(status) => format!("Status {:?}: {}", status.tone, status.text),
        EventPayload::Connection(state) => format!("Connection {:?}", state),
        EventPayload::IdentityInput(text) => format!("Identity input {:?}", text),
    }
}
