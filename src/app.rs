//! Main application logic and orchestration

use crate::audio::{self, AudioSource, MicrophoneSource, SourceEvent, SourceHandle};
use crate::config::PipelineConfig;
use crate::error::{MeterError, MeterResult};
use crate::file::FileSource;
use crate::pipeline::{LoudnessPipeline, MeterReading};
use crate::state::{MeterSession, SessionState};
use crate::ui;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use std::time::Duration;

/// Exit codes for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    UserExit = 1, // User pressed Escape or Ctrl+C
    Error = 2,    // Actual application error
}

/// Extended result that tracks exit reason
pub struct RunResult {
    pub result: MeterResult<()>,
    pub exit_code: ExitCode,
}

impl RunResult {
    fn error(err: MeterError) -> Self {
        Self {
            result: Err(err),
            exit_code: ExitCode::Error,
        }
    }
}

/// One pipeline tick of a file run, positioned in the file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileTick {
    pub at_secs: f64,
    pub reading: MeterReading,
}

/// What a key press asks the live loop to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    Reset,
    None,
}

fn key_action(code: KeyCode, modifiers: KeyModifiers) -> KeyAction {
    match code {
        KeyCode::Esc | KeyCode::Char('q') => KeyAction::Quit,
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char('r') | KeyCode::Char('R') => KeyAction::Reset,
        _ => KeyAction::None,
    }
}

/// Status line text for the current session
fn status_line(session: &MeterSession, source_name: &str) -> String {
    match (session.state(), session.failure()) {
        (SessionState::Running, _) => {
            format!("Monitoring {}... Press r to reset, Escape to quit.", source_name)
        }
        (SessionState::Idle, Some(reason)) => format!("{} Press Escape to quit.", reason),
        (SessionState::Idle, None) => "Stopped. Press Escape to quit.".to_string(),
    }
}

/// Terminal in raw mode on the alternate screen, restored on drop
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn enter() -> MeterResult<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
        let _ = self.terminal.show_cursor();
    }
}

/// Main application struct
pub struct App {
    config: PipelineConfig,
}

impl App {
    /// Initialize the application with configuration
    pub fn new_with_config(config: PipelineConfig) -> MeterResult<Self> {
        config.validate()?;
        Ok(App { config })
    }

    fn session(&self) -> MeterResult<MeterSession> {
        Ok(MeterSession::new(LoudnessPipeline::new(self.config.clone())?))
    }

    /// Run the live terminal meter until the user quits
    pub async fn run_live(self, device_name: Option<String>, label_shift: f32) -> RunResult {
        let mut source = match MicrophoneSource::open(device_name.as_deref()) {
            Ok(source) => source,
            Err(e) => return RunResult::error(e),
        };
        let mut session = match self.session() {
            Ok(session) => session,
            Err(e) => return RunResult::error(e),
        };

        let (tx, mut rx) = audio::block_queue();
        let mut handle = match session.start(&mut source, tx) {
            Ok(handle) => Some(handle),
            Err(e) => return RunResult::error(e),
        };

        let mut guard = match TerminalGuard::enter() {
            Ok(guard) => guard,
            Err(e) => return RunResult::error(e),
        };

        let source_name = source.info().name.clone();
        let display = self.config.display;
        let redraw_every = Duration::from_millis(crate::constants::ui::UPDATE_INTERVAL_MS);
        let mut redraw = tokio::time::interval(redraw_every);
        let mut dropped_blocks = 0;

        loop {
            tokio::select! {
                event = rx.recv(), if session.state() == SessionState::Running => {
                    match event {
                        Some(event) => {
                            session.handle_event(event);
                        }
                        None => session.stop(),
                    }
                }
                reason = source_failure(&mut handle) => {
                    session.handle_event(SourceEvent::Failed(reason));
                }
                _ = redraw.tick() => {
                    if let Some(running) = handle.as_ref() {
                        dropped_blocks = running.dropped_blocks();
                    }

                    let ui_state = ui::UiState {
                        source_name: source_name.clone(),
                        reading: session.reading(),
                        floor: display.floor,
                        ceiling: display.ceiling,
                        label_shift,
                        session: session.state(),
                        status: status_line(&session, &source_name),
                        dropped_blocks,
                    };
                    if let Err(e) = guard.terminal.draw(|f| ui::render_ui(f, &ui_state)) {
                        return RunResult::error(e.into());
                    }

                    match poll_key() {
                        KeyAction::Quit => break,
                        KeyAction::Reset => session.reset(),
                        KeyAction::None => {}
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }

            // Release the stream as soon as the session goes idle
            if session.state() == SessionState::Idle
                && let Some(stopped) = handle.take()
            {
                dropped_blocks = stopped.dropped_blocks();
                rx.close();
                stopped.stop();
            }
        }

        rx.close();
        drop(handle);
        drop(guard);

        let exit_code = match session.failure() {
            Some(reason) => {
                tracing::warn!(%reason, "live session ended after source failure");
                eprintln!("{}", reason);
                ExitCode::Error
            }
            None => ExitCode::UserExit,
        };

        RunResult {
            result: Ok(()),
            exit_code,
        }
    }

    /// Monitor an input device headless and return the final reading
    pub async fn run_measure(
        &self,
        device_name: Option<String>,
        duration: Option<Duration>,
    ) -> MeterResult<MeterReading> {
        let mut source = MicrophoneSource::open(device_name.as_deref())?;
        let mut session = self.session()?;
        let (tx, mut rx) = audio::block_queue();
        let mut handle = session.start(&mut source, tx)?;

        let deadline = async {
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => {
                    eprintln!("Monitoring {}... Press Enter to stop.", source.info().name);
                    let _ = tokio::task::spawn_blocking(|| {
                        let mut line = String::new();
                        io::stdin().read_line(&mut line)
                    })
                    .await;
                }
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        session.handle_event(event);
                        if session.state() == SessionState::Idle {
                            break;
                        }
                    }
                    None => break,
                },
                reason = handle.failed() => {
                    session.handle_event(SourceEvent::Failed(reason));
                    break;
                }
                _ = &mut deadline => break,
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        rx.close();
        let dropped = handle.dropped_blocks();
        handle.stop();
        if dropped > 0 {
            tracing::warn!(dropped, "sample blocks dropped while measuring");
        }

        if let Some(reason) = session.failure() {
            return Err(MeterError::unavailable(reason.to_string()));
        }
        if session.pipeline().ticks() == 0 {
            return Err(MeterError::unavailable("No audio received from the input device"));
        }

        session.stop();
        Ok(session.reading())
    }

    /// Feed a decoded file through the pipeline, reporting each tick
    pub async fn run_file<F>(
        &self,
        mut source: FileSource,
        realtime: bool,
        mut on_tick: F,
    ) -> MeterResult<MeterReading>
    where
        F: FnMut(FileTick),
    {
        if realtime {
            source = source.with_pacing(self.config.tick_interval());
        }
        let sample_rate = source.info().sample_rate.max(1) as f64;
        let block_len = self.config.block_len(source.info().sample_rate);

        let mut session = self.session()?;
        let (tx, mut rx) = audio::block_queue();
        let handle = session.start(&mut source, tx)?;

        let mut position = 0usize;
        while let Some(event) = rx.recv().await {
            if let Some(reading) = session.handle_event(event) {
                position += block_len;
                on_tick(FileTick {
                    at_secs: position.min(source.samples().len()) as f64 / sample_rate,
                    reading,
                });
            }
        }

        handle.stop();
        session.stop();
        Ok(session.reading())
    }
}

/// Resolves with the failure reason of the attached source, if there is one
async fn source_failure(handle: &mut Option<SourceHandle>) -> String {
    match handle {
        Some(handle) => handle.failed().await,
        None => std::future::pending().await,
    }
}

/// Non-blocking check for a key press
fn poll_key() -> KeyAction {
    if !crossterm::event::poll(Duration::from_millis(0)).unwrap_or(false) {
        return KeyAction::None;
    }
    match crossterm::event::read() {
        Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
            key_action(key.code, key.modifiers)
        }
        _ => KeyAction::None,
    }
}
