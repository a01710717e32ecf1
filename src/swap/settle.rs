//! Waiting for the target application to reach a state
//!
//! A settle polls a probe command until a condition holds or a timeout elapses.
//! When the probe is not configured or cannot run on the device, it sleeps a
//! fixed fallback interval instead. Every wait is cancellable.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::{CommandOutcome, PrivilegedChannel};

/// Timing for one kind of settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleWindow {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Fixed delay when no usable probe exists
    pub fallback: Duration,
}

/// All settle timings used by the engine and driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    /// After stopping the app
    pub stop: SettleWindow,
    /// After launching the app, until it is in the foreground
    pub launch: SettleWindow,
    /// After firing the friend link
    pub signal: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            stop: SettleWindow {
                poll_interval: Duration::from_millis(250),
                timeout: Duration::from_secs(5),
                fallback: Duration::from_secs(1),
            },
            launch: SettleWindow {
                poll_interval: Duration::from_millis(500),
                timeout: Duration::from_secs(20),
                fallback: Duration::from_secs(10),
            },
            signal: Duration::from_secs(2),
        }
    }
}

impl SettlePolicy {
    /// Policy with every wait shortened to `d`; used by tests and dry runs
    pub fn uniform(d: Duration) -> Self {
        let window = SettleWindow {
            poll_interval: d,
            timeout: d,
            fallback: d,
        };
        Self {
            stop: window,
            launch: window,
            signal: d,
        }
    }
}

/// How a settle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SettleOutcome {
    /// The probe confirmed the condition
    Confirmed { polls: u32 },
    /// The probe never confirmed within the timeout
    TimedOut { polls: u32 },
    /// No usable probe; slept the fallback interval
    FixedDelay,
    Cancelled,
}

impl SettleOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SettleOutcome::Cancelled)
    }
}

/// Verdict of one probe run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Met,
    NotMet,
    /// The probe command is missing on this device
    Unavailable,
}

/// Sleep for `duration` unless cancelled first. Returns `false` when cancelled.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn verdict<F>(outcome: &CommandOutcome, condition: &F) -> ProbeVerdict
where
    F: Fn(&CommandOutcome) -> bool,
{
    if outcome.is_command_missing() {
        ProbeVerdict::Unavailable
    } else if condition(outcome) {
        ProbeVerdict::Met
    } else {
        ProbeVerdict::NotMet
    }
}

async fn fixed(window: &SettleWindow, cancel: &CancellationToken) -> SettleOutcome {
    if pause(window.fallback, cancel).await {
        SettleOutcome::FixedDelay
    } else {
        SettleOutcome::Cancelled
    }
}

/// Poll `probe` until `condition` holds, the window times out, or `cancel` fires.
pub async fn wait_until<C, F>(
    channel: &C,
    probe: Option<&str>,
    condition: F,
    window: &SettleWindow,
    cancel: &CancellationToken,
) -> SettleOutcome
where
    C: PrivilegedChannel + ?Sized,
    F: Fn(&CommandOutcome) -> bool,
{
    let Some(probe) = probe else {
        return fixed(window, cancel).await;
    };

    let deadline = Instant::now() + window.timeout;
    let mut polls = 0;
    loop {
        if cancel.is_cancelled() {
            return SettleOutcome::Cancelled;
        }
        polls += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return SettleOutcome::Cancelled,
            result = channel.execute(probe) => result,
        };
        match result.as_ref().map(|outcome| verdict(outcome, &condition)) {
            Ok(ProbeVerdict::Met) => return SettleOutcome::Confirmed { polls },
            Ok(ProbeVerdict::NotMet) => {}
            Ok(ProbeVerdict::Unavailable) | Err(_) => {
                tracing::debug!(probe, "Settle probe unavailable, using fixed delay");
                return fixed(window, cancel).await;
            }
        }

        if Instant::now() >= deadline {
            tracing::warn!(probe, polls, "Settle timed out");
            return SettleOutcome::TimedOut { polls };
        }
        if !pause(window.poll_interval, cancel).await {
            return SettleOutcome::Cancelled;
        }
    }
}

/// The app is no longer running: the pid probe printed nothing
pub fn app_stopped(outcome: &CommandOutcome) -> bool {
    outcome.stdout.iter().all(|line| line.trim().is_empty())
}

/// The app's activity is resumed: probe output names the package
pub fn app_in_foreground(package: &str) -> impl Fn(&CommandOutcome) -> bool + '_ {
    move |outcome| outcome.stdout.iter().any(|line| line.contains(package))
}
