//! Interactive application state and event loop
//!
//! Actions run on a background thread and report back over a channel, so
//! the screen keeps redrawing (and the spinner turning) while a privileged
//! command waits for authentication.

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use hibernation_core::{
    ActionKind, ActionResult, DisableOptions, FailureKind, HibernationHelper, Lifecycle,
    ReadinessReport,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::ui;

/// Modal prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialog {
    ConfirmEnable,
    ConfirmTest,
    ConfirmDisable,
    /// Asked after confirming disable, when the managed swap file exists
    RemoveSwapFile,
    About,
}

/// Work running on the background thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Refresh,
    Action(ActionKind),
}

enum WorkerEvent {
    Inspected(ReadinessReport),
    Finished {
        kind: ActionKind,
        result: ActionResult,
        report: ReadinessReport,
    },
}

pub struct App {
    helper: Arc<HibernationHelper>,
    pub report: Option<ReadinessReport>,
    pub lifecycle: Lifecycle,
    pub busy: Option<Task>,
    /// Result of the last action, shown until the next one starts
    pub message: Option<ActionResult>,
    pub dialog: Option<Dialog>,
    pub tick: usize,
    pub should_quit: bool,
    tx: Sender<WorkerEvent>,
    rx: Receiver<WorkerEvent>,
}

impl App {
    pub fn new(helper: Arc<HibernationHelper>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            helper,
            report: None,
            lifecycle: Lifecycle::new(),
            busy: None,
            message: None,
            dialog: None,
            tick: 0,
            should_quit: false,
            tx,
            rx,
        }
    }

    pub fn helper(&self) -> &HibernationHelper {
        &self.helper
    }

    /// Action buttons are live only when idle and the lifecycle allows them
    pub fn can_trigger(&self, kind: ActionKind) -> bool {
        self.busy.is_none() && self.lifecycle.can_start(kind)
    }

    pub fn refresh(&mut self) {
        if self.busy.is_some() {
            return;
        }
        self.busy = Some(Task::Refresh);

        let helper = Arc::clone(&self.helper);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let report = helper.inspect();
            if tx.send(WorkerEvent::Inspected(report)).is_err() {
                debug!("UI closed before inspection finished");
            }
        });
    }

    fn start(&mut self, kind: ActionKind, options: DisableOptions) {
        if let Err(e) = self.lifecycle.begin(kind) {
            self.message = Some(ActionResult::from_error(&e));
            return;
        }
        info!("User started action: {}", kind);
        self.busy = Some(Task::Action(kind));
        self.message = None;

        let helper = Arc::clone(&self.helper);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = match kind {
                ActionKind::Enable => helper.enable(),
                ActionKind::Disable => helper.disable(options),
                ActionKind::Test => helper.test_hibernate(),
            };
            let report = helper.inspect();
            let event = WorkerEvent::Finished {
                kind,
                result,
                report,
            };
            if tx.send(event).is_err() {
                debug!("UI closed before {} finished", kind);
            }
        });
    }

    /// Apply everything the worker has sent since the last frame
    pub fn poll_worker(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                WorkerEvent::Inspected(report) => {
                    self.lifecycle.observe(&report);
                    self.report = Some(report);
                }
                WorkerEvent::Finished {
                    kind,
                    result,
                    report,
                } => {
                    self.lifecycle.complete(kind, &result);
                    // A failure stays on screen until the next refresh
                    if result.success {
                        self.lifecycle.observe(&report);
                    }
                    self.report = Some(report);
                    self.message = Some(result);
                }
            }
            self.busy = None;
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        if let Some(dialog) = self.dialog {
            self.handle_dialog_key(dialog, code);
            return;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                if self.busy.is_some() {
                    self.message = Some(ActionResult::failed(
                        FailureKind::Busy,
                        "An action is still running; wait for it to finish before quitting.",
                    ));
                } else {
                    self.should_quit = true;
                }
            }
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('e') if self.can_trigger(ActionKind::Enable) => {
                self.dialog = Some(Dialog::ConfirmEnable)
            }
            KeyCode::Char('t') if self.can_trigger(ActionKind::Test) => {
                self.dialog = Some(Dialog::ConfirmTest)
            }
            KeyCode::Char('d') if self.can_trigger(ActionKind::Disable) => {
                self.dialog = Some(Dialog::ConfirmDisable)
            }
            KeyCode::Char('a') | KeyCode::Char('?') => self.dialog = Some(Dialog::About),
            _ => {}
        }
    }

    fn handle_dialog_key(&mut self, dialog: Dialog, code: KeyCode) {
        let answer = match code {
            KeyCode::Char('y') | KeyCode::Enter => Some(true),
            KeyCode::Char('n') => Some(false),
            KeyCode::Esc => None,
            _ if dialog == Dialog::About => None,
            _ => return,
        };
        self.dialog = None;

        match (dialog, answer) {
            (Dialog::ConfirmEnable, Some(true)) => {
                self.start(ActionKind::Enable, DisableOptions::default())
            }
            (Dialog::ConfirmTest, Some(true)) => {
                self.start(ActionKind::Test, DisableOptions::default())
            }
            (Dialog::ConfirmDisable, Some(true)) => {
                let file_present = self
                    .report
                    .as_ref()
                    .is_some_and(|r| r.managed_swap_file_present);
                if file_present {
                    self.dialog = Some(Dialog::RemoveSwapFile);
                } else {
                    self.start(
                        ActionKind::Disable,
                        DisableOptions {
                            remove_swap_file: false,
                        },
                    );
                }
            }
            (Dialog::RemoveSwapFile, Some(remove_swap_file)) => {
                self.start(ActionKind::Disable, DisableOptions { remove_swap_file })
            }
            _ => {}
        }
    }
}

/// Run the interactive UI until the user quits
pub fn run(helper: Arc<HibernationHelper>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(helper);
    app.refresh();
    let outcome = event_loop(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    outcome
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);

    while !app.should_quit {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        app.poll_worker();
        app.tick = app.tick.wrapping_add(1);
    }

    Ok(())
}
