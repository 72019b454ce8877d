// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Poll scheduler: runs sweeps on an interval and on demand.
//!
//! A single task owns the table of in-flight sweeps and receives requests over
//! a channel, so "is a sweep running for this account" is never raced. Each
//! sweep runs in its own task with a child cancellation token and a deadline.

use crate::config::Config;
use crate::db::AccountStore;
use crate::error::{AppError, Result};
use crate::services::poll::{SweepRunner, WindowStart};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Scheduler timing.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Time between scheduled sweeps of every account.
    pub interval: Duration,
    /// Budget for a single sweep; overruns are cancelled.
    pub sweep_timeout: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval,
            sweep_timeout: config.sweep_timeout,
        }
    }
}

/// Result of asking for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A sweep for the account was already running; nothing was queued.
    AlreadyRunning,
}

enum Command {
    Trigger {
        user_id: i64,
        reply: oneshot::Sender<TriggerOutcome>,
    },
    ForceCheck {
        user_id: i64,
        since: DateTime<Utc>,
        reply: oneshot::Sender<()>,
    },
    Finished {
        user_id: i64,
        generation: u64,
    },
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle for talking to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SchedulerHandle {
    /// Start a sweep from the watermark unless one is already running.
    pub async fn trigger(&self, user_id: i64) -> Result<TriggerOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Trigger { user_id, reply })?;
        rx.await.map_err(|_| AppError::Cancelled)
    }

    /// Cancel any running sweep for the account, then sweep from `since`.
    ///
    /// Returns once the new sweep is scheduled, not when it finishes.
    pub async fn force_check(&self, user_id: i64, since: DateTime<Utc>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ForceCheck {
            user_id,
            since,
            reply,
        })?;
        rx.await.map_err(|_| AppError::Cancelled)
    }

    /// Stop the timer, cancel every sweep, and wait for all of them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Poll scheduler task panicked");
            }
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        self.commands.send(command).map_err(|_| AppError::Cancelled)
    }
}

/// The scheduler loop state.
pub struct PollScheduler {
    runner: Arc<dyn SweepRunner>,
    store: Arc<dyn AccountStore>,
    settings: SchedulerSettings,
    shutdown: CancellationToken,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    in_flight: HashMap<i64, InFlight>,
    next_generation: u64,
}

impl PollScheduler {
    /// Spawn the scheduler loop. The first scheduled tick fires immediately.
    pub fn spawn(
        runner: Arc<dyn SweepRunner>,
        store: Arc<dyn AccountStore>,
        settings: SchedulerSettings,
    ) -> SchedulerHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let scheduler = Self {
            runner,
            store,
            settings,
            shutdown: shutdown.clone(),
            commands_tx: commands_tx.clone(),
            commands_rx,
            in_flight: HashMap::new(),
            next_generation: 0,
        };
        let task = tokio::spawn(scheduler.run());

        SchedulerHandle {
            commands: commands_tx,
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(mut self) {
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            "Poll scheduler started"
        );

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(command) = self.commands_rx.recv() => self.handle(command),
                _ = ticker.tick() => self.tick().await,
            }
        }

        tracing::info!(
            in_flight = self.in_flight.len(),
            "Poll scheduler stopping, waiting for sweeps to exit"
        );
        let handles: Vec<_> = self
            .in_flight
            .drain()
            .map(|(_, sweep)| {
                sweep.cancel.cancel();
                sweep.handle
            })
            .collect();
        futures_util::future::join_all(handles).await;
        tracing::info!("Poll scheduler stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Trigger { user_id, reply } => {
                let outcome = if self.in_flight.contains_key(&user_id) {
                    tracing::debug!(user_id, "Sweep already running, trigger skipped");
                    TriggerOutcome::AlreadyRunning
                } else {
                    self.start_sweep(user_id, WindowStart::Watermark, None);
                    TriggerOutcome::Started
                };
                let _ = reply.send(outcome);
            }
            Command::ForceCheck {
                user_id,
                since,
                reply,
            } => {
                let previous = self.in_flight.remove(&user_id).map(|sweep| {
                    tracing::info!(user_id, "Cancelling in-flight sweep for force check");
                    sweep.cancel.cancel();
                    sweep.handle
                });
                self.start_sweep(user_id, WindowStart::Since(since), previous);
                let _ = reply.send(());
            }
            Command::Finished {
                user_id,
                generation,
            } => {
                // A replaced sweep must not evict its replacement.
                if self
                    .in_flight
                    .get(&user_id)
                    .is_some_and(|sweep| sweep.generation == generation)
                {
                    self.in_flight.remove(&user_id);
                }
            }
        }
    }

    /// Scheduled sweep of every stored account.
    async fn tick(&mut self) {
        let accounts = match self.store.list().await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list accounts for scheduled sweep");
                return;
            }
        };

        for account in accounts {
            if self.in_flight.contains_key(&account.user_id) {
                tracing::debug!(
                    user_id = account.user_id,
                    "Previous sweep still running, skipping"
                );
                continue;
            }
            self.start_sweep(account.user_id, WindowStart::Watermark, None);
        }
    }

    /// Spawn a sweep task. If `previous` is given, the new sweep waits for it
    /// to exit before starting.
    fn start_sweep(&mut self, user_id: i64, start: WindowStart, previous: Option<JoinHandle<()>>) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let cancel = self.shutdown.child_token();
        let runner = self.runner.clone();
        let commands = self.commands_tx.clone();
        let timeout = self.settings.sweep_timeout;
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            // Dropped on return and on panic alike.
            let _finished = FinishNotice {
                commands,
                user_id,
                generation,
            };
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            run_sweep(runner, user_id, start, token, timeout).await;
        });

        self.in_flight.insert(
            user_id,
            InFlight {
                generation,
                cancel,
                handle,
            },
        );
    }
}

/// Tells the scheduler loop that a sweep task has exited.
struct FinishNotice {
    commands: mpsc::UnboundedSender<Command>,
    user_id: i64,
    generation: u64,
}

impl Drop for FinishNotice {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(user_id = self.user_id, "Sweep task panicked");
        }
        let _ = self.commands.send(Command::Finished {
            user_id: self.user_id,
            generation: self.generation,
        });
    }
}

/// Run one sweep under a deadline and log how it ended.
async fn run_sweep(
    runner: Arc<dyn SweepRunner>,
    user_id: i64,
    start: WindowStart,
    cancel: CancellationToken,
    timeout: Duration,
) {
    if cancel.is_cancelled() {
        return;
    }

    let sweep = runner.run(user_id, start, cancel.clone());
    tokio::pin!(sweep);

    let result = tokio::select! {
        result = &mut sweep => result,
        _ = tokio::time::sleep(timeout) => {
            tracing::warn!(user_id, timeout_secs = timeout.as_secs(), "Sweep deadline exceeded, cancelling");
            cancel.cancel();
            sweep.await
        }
    };

    match result {
        Ok(report) if report.throttled => {}
        Ok(report) => tracing::info!(
            user_id,
            releases = report.releases_found,
            watermark_advanced = report.watermark_advanced,
            "Sweep completed"
        ),
        Err(AppError::Cancelled) => tracing::info!(user_id, "Sweep cancelled"),
        Err(e) => tracing::error!(user_id, error = %e, "Sweep failed"),
    }
}
