//! Periodic status line for interactive runs.
//!
//! Worker tasks update the shared state; a reporter task reads it on a
//! fixed interval. Both sides go through the same mutex.

use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    InitialReviews,
    CrossCheck,
    Arbiter,
    Assembling,
    Cleanup,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Setup => write!(f, "setup"),
            Phase::InitialReviews => write!(f, "initial_reviews"),
            Phase::CrossCheck => write!(f, "cross_check"),
            Phase::Arbiter => write!(f, "arbiter"),
            Phase::Assembling => write!(f, "assembling"),
            Phase::Cleanup => write!(f, "cleanup"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    pub phase: Phase,
    pub agents_total: usize,
    pub agents_done: usize,
    pub arbiter_step: usize,
    pub arbiter_max: usize,
}

#[derive(Debug, Clone)]
pub struct Progress {
    state: Arc<Mutex<ProgressState>>,
    started: Instant,
}

impl Progress {
    pub fn new(arbiter_max: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressState {
                phase: Phase::Setup,
                agents_total: 0,
                agents_done: 0,
                arbiter_step: 0,
                arbiter_max,
            })),
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        // A panicked writer leaves plain counters behind; keep reporting.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_phase(&self, phase: Phase) {
        self.lock().phase = phase;
    }

    /// Enter a review round with `total` agents
    pub fn start_round(&self, phase: Phase, total: usize) {
        let mut state = self.lock();
        state.phase = phase;
        state.agents_total = total;
        state.agents_done = 0;
    }

    pub fn mark_agent_done(&self) {
        self.lock().agents_done += 1;
    }

    pub fn set_arbiter_step(&self, step: usize) {
        self.lock().arbiter_step = step;
    }

    pub fn snapshot(&self) -> ProgressState {
        self.lock().clone()
    }

    pub fn status_line(&self) -> String {
        let state = self.snapshot();
        format!(
            "Status[{}s]: phase={}, agents={}/{}, arbiter_steps={}/{}",
            self.started.elapsed().as_secs(),
            state.phase,
            state.agents_done,
            state.agents_total,
            state.arbiter_step,
            state.arbiter_max
        )
    }
}

/// Background task printing [`Progress::status_line`] every interval.
pub struct ProgressReporter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(progress: Progress, interval: Duration) -> Self {
        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let interactive = std::io::stderr().is_terminal();

        let handle = tokio::spawn(async move {
            let mut last_len = 0usize;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let line = progress.status_line();
                if interactive {
                    let mut stderr = std::io::stderr().lock();
                    let _ = write!(stderr, "\r{:<width$}", line, width = last_len);
                    let _ = stderr.flush();
                    last_len = line.len();
                } else {
                    info!("{}", line);
                }
            }

            // Leave the terminal on a fresh line
            if last_len > 0 {
                eprintln!();
            }
        });

        Self { stop, handle }
    }

    pub async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}
