// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::flusher::{FlushReport, Flusher};

/// What [`Scheduler::start`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Started,
    AlreadyRunning,
    /// The scheduler was shut down and cannot be restarted.
    Stopped,
}

enum SchedulerState {
    NotStarted,
    Running {
        cancel_token: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Background task that flushes on a fixed period until cancelled.
pub struct Scheduler {
    flusher: Arc<Flusher>,
    period: Duration,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    #[must_use]
    pub fn new(flusher: Arc<Flusher>, period: Duration) -> Self {
        Scheduler {
            flusher,
            period,
            state: Mutex::new(SchedulerState::NotStarted),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawns the flush loop on the current tokio runtime. Calling it again
    /// while running spawns nothing.
    pub fn start(&self) -> Activation {
        let mut state = self.lock();
        match *state {
            SchedulerState::Running { .. } => return Activation::AlreadyRunning,
            SchedulerState::Stopped => return Activation::Stopped,
            SchedulerState::NotStarted => {}
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&self.flusher),
            self.period,
            cancel_token.clone(),
        ));
        *state = SchedulerState::Running {
            cancel_token,
            handle,
        };
        debug!(
            "TABLE | Scheduler started, flushing every {}s",
            self.period.as_secs()
        );
        Activation::Started
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), SchedulerState::Running { .. })
    }

    /// Cancels the loop and waits for an in-flight flush to finish.
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.lock(), SchedulerState::Stopped);
        if let SchedulerState::Running {
            cancel_token,
            handle,
        } = previous
        {
            cancel_token.cancel();
            if let Err(e) = handle.await {
                error!("TABLE | Scheduler task failed: {e}");
            }
            debug!("TABLE | Scheduler stopped");
        }
    }
}

async fn run(flusher: Arc<Flusher>, period: Duration, cancel_token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                if let FlushReport::Flushed(count) = flusher.flush_with_retry().await {
                    debug!("TABLE | Scheduled flush wrote {count} records");
                }
            }
        }
    }
}
