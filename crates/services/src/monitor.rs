use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use exam_core::Clock;
use exam_core::model::{SessionId, SubmitOutcome, UserId, WarningKind};
use exam_core::policy;
use exam_core::time::format_mm_ss;
use serde::Serialize;
use storage::repository::SessionRepository;

use crate::error::EngineError;
use crate::sessions::SessionEngine;

/// Events the monitor hands to the external notifier (the excluded
/// transport layer turns these into user-facing messages).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MonitorEvent {
    WarningRaised {
        session_id: SessionId,
        user_id: UserId,
        kind: WarningKind,
    },
    AutoSubmitted {
        session_id: SessionId,
        user_id: UserId,
        outcome: SubmitOutcome,
    },
}

/// Sink for monitor events.
#[async_trait]
pub trait ExamNotifier: Send + Sync {
    async fn notify(&self, event: MonitorEvent);
}

/// Notifier backed by an unbounded channel; the receiving side is the
/// transport's problem.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<MonitorEvent>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ExamNotifier for ChannelNotifier {
    async fn notify(&self, event: MonitorEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("monitor event dropped, receiver gone");
        }
    }
}

/// Recurring sweep over active timed sessions: raises at most one threshold
/// warning per session per sweep and force-submits expired sessions through
/// the same finalize path as a user-triggered submit.
///
/// Polling is intentional: warnings and auto-submits may lag by up to one
/// sweep interval, and the sweep state survives process restarts because it
/// lives entirely in the store. Sweeps never overlap; the loop awaits the
/// current sweep before scheduling the next tick.
pub struct ExpiryMonitor {
    clock: Clock,
    engine: SessionEngine,
    sessions: Arc<dyn SessionRepository>,
    notifier: Arc<dyn ExamNotifier>,
    sweep_interval: Duration,
    pass_percent: u32,
}

impl ExpiryMonitor {
    #[must_use]
    pub fn new(
        clock: Clock,
        engine: SessionEngine,
        sessions: Arc<dyn SessionRepository>,
        notifier: Arc<dyn ExamNotifier>,
    ) -> Self {
        Self {
            clock,
            engine,
            sessions,
            notifier,
            sweep_interval: Duration::from_secs(policy::SWEEP_INTERVAL_SECS),
            pass_percent: policy::PASS_PERCENT,
        }
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_pass_percent(mut self, pass_percent: u32) -> Self {
        self.pass_percent = pass_percent;
        self
    }

    /// One pass over all active exam sessions.
    ///
    /// Per-session failures are logged and skipped so one broken session
    /// cannot starve the rest of the sweep.
    ///
    /// # Errors
    ///
    /// Returns storage errors from listing the scan set.
    pub async fn sweep_once(&self) -> Result<(), EngineError> {
        let now = self.clock.now();
        let sessions = self.sessions.active_exam_sessions().await?;

        for session in sessions {
            let Some(remaining) = session.remaining_seconds(now) else {
                continue;
            };

            if remaining <= 0 {
                match self
                    .engine
                    .finalize_and_submit(session.id(), self.pass_percent)
                    .await
                {
                    Ok(outcome) => {
                        tracing::info!(
                            session_id = %session.id(),
                            percent = outcome.result.percent,
                            "expired session auto-submitted"
                        );
                        self.notifier
                            .notify(MonitorEvent::AutoSubmitted {
                                session_id: session.id(),
                                user_id: session.user_id(),
                                outcome,
                            })
                            .await;
                    }
                    // a manual submit won the terminal transition first
                    Err(EngineError::InvalidState(_)) => {}
                    Err(error) => {
                        tracing::warn!(session_id = %session.id(), %error, "auto-submit failed");
                    }
                }
                continue;
            }

            if let Some(kind) = session.due_warning(now) {
                if let Err(error) = self.sessions.set_warning_sent(session.id(), kind).await {
                    tracing::warn!(session_id = %session.id(), %error, "warning flag update failed");
                    continue;
                }
                tracing::info!(
                    session_id = %session.id(),
                    remaining = %format_mm_ss(remaining),
                    minutes = kind.minutes(),
                    "time warning raised"
                );
                self.notifier
                    .notify(MonitorEvent::WarningRaised {
                        session_id: session.id(),
                        user_id: session.user_id(),
                        kind,
                    })
                    .await;
            }
        }

        Ok(())
    }

    /// Run the sweep loop until `shutdown` flips to `true` (or its sender is
    /// dropped). An in-flight sweep always completes before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.sweep_once().await {
                        tracing::warn!(%error, "expiry sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("expiry monitor stopped");
    }
}
