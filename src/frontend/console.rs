//! Console loop
//!
//! The console owns the [`SessionController`] and multiplexes two inputs with
//! `crossbeam_channel::select!`: command lines (fed by a stdin reader thread)
//! and a fixed refresh tick. The tick reads a snapshot and reaps a failed loop;
//! its timing is independent of the acquisition rate.

use crate::error::Result;
use crate::frontend::commands::{ConsoleCommand, HELP};
use crate::frontend::status::{render_json, render_status, render_status_line};
use crate::session::controller::SessionController;
use crate::session::types::Phase;
use crossbeam_channel::{select, tick, unbounded, Receiver};
use std::io::{BufRead, Write};
use std::time::Duration;

/// Whether the console keeps running after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Line-oriented front end over a [`SessionController`]
pub struct Console<W: Write> {
    controller: SessionController,
    out: W,
    refresh: Duration,
    /// Redraw a one-line status on every tick while recording
    live: bool,
    /// Whether the live line is on screen and needs a newline before output
    line_open: bool,
}

impl<W: Write> Console<W> {
    pub fn new(controller: SessionController, out: W) -> Self {
        let refresh = controller.config().refresh_interval();
        Self {
            controller,
            out,
            refresh,
            live: true,
            line_open: false,
        }
    }

    /// Turn the live status line on or off
    pub fn with_live_status(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Run until `exit` or until the command channel closes
    ///
    /// The controller is shut down on the way out in both cases.
    pub fn run(&mut self, commands: Receiver<String>) -> Result<()> {
        writeln!(self.out, "{}", HELP)?;
        let ticker = tick(self.refresh);

        loop {
            select! {
                recv(commands) -> line => match line {
                    Ok(line) => {
                        if self.handle_line(&line)? == Flow::Exit {
                            break;
                        }
                    }
                    Err(_) => {
                        tracing::debug!("Command input closed");
                        break;
                    }
                },
                recv(ticker) -> _ => self.on_tick()?,
            }
        }

        self.controller.shutdown();
        self.end_live_line()?;
        writeln!(self.out, "Goodbye")?;
        Ok(())
    }

    /// Parse and execute one input line
    pub fn handle_line(&mut self, line: &str) -> Result<Flow> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }
        self.end_live_line()?;

        match line.parse::<ConsoleCommand>() {
            Ok(command) => self.execute(command),
            Err(e) => {
                writeln!(self.out, "{}", e)?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Execute a parsed command; operation failures are reported, not returned
    pub fn execute(&mut self, command: ConsoleCommand) -> Result<Flow> {
        tracing::debug!("Console command: {:?}", command);

        match command {
            ConsoleCommand::Start(name) => match self.controller.start(name.as_deref()) {
                Ok(()) => {
                    let path = self.controller.log_path().map(|p| p.display().to_string());
                    writeln!(self.out, "Recording to {}", path.unwrap_or_default())?;
                }
                Err(e) => writeln!(self.out, "Cannot start: {}", e)?,
            },
            ConsoleCommand::Stop => {
                let result = self.controller.stop();
                if let Err(e) = result {
                    writeln!(self.out, "Stop reported: {}", e)?;
                }
                writeln!(self.out, "{}", render_status(&self.controller.snapshot()))?;
            }
            ConsoleCommand::Archive => {
                if let Some(path) = self.controller.log_path() {
                    writeln!(self.out, "Archiving {}...", path.display())?;
                }
                match self.controller.archive() {
                    Ok(outcome) => writeln!(
                        self.out,
                        "Archived {} samples with ID: {}",
                        outcome.sample_count, outcome.remote_id
                    )?,
                    Err(e) => writeln!(self.out, "{}", e)?,
                }
            }
            ConsoleCommand::Discard => match self.controller.discard() {
                Ok(()) => writeln!(self.out, "Session discarded")?,
                Err(e) => writeln!(self.out, "{}", e)?,
            },
            ConsoleCommand::Status => {
                writeln!(self.out, "{}", render_status(&self.controller.snapshot()))?;
            }
            ConsoleCommand::Json => match render_json(&self.controller.snapshot()) {
                Ok(json) => writeln!(self.out, "{}", json)?,
                Err(e) => writeln!(self.out, "Cannot render JSON: {}", e)?,
            },
            ConsoleCommand::Help => writeln!(self.out, "{}", HELP)?,
            ConsoleCommand::Exit => {
                if self.controller.phase() == Phase::Recording {
                    writeln!(self.out, "Stopping recording before exit")?;
                }
                return Ok(Flow::Exit);
            }
        }

        self.out.flush()?;
        Ok(Flow::Continue)
    }

    /// Periodic refresh: reap a dead loop, redraw the live line
    pub fn on_tick(&mut self) -> Result<()> {
        if let Err(e) = self.controller.supervise() {
            self.end_live_line()?;
            writeln!(self.out, "Recording stopped: {}", e)?;
            writeln!(self.out, "{}", render_status(&self.controller.snapshot()))?;
        }

        if self.live && self.controller.phase() == Phase::Recording {
            let line = render_status_line(&self.controller.snapshot());
            write!(self.out, "\r\x1b[2K{}", line)?;
            self.out.flush()?;
            self.line_open = true;
        }
        Ok(())
    }

    fn end_live_line(&mut self) -> Result<()> {
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

/// Read stdin lines on a dedicated thread
///
/// The channel closes when stdin reaches EOF or fails.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::error!("Failed to spawn stdin reader: {}", e);
    }
    rx
}
