//! Sequential automation over an event's team slots
//!
//! For every filled slot the driver restores the slot's profile, launches the
//! app, waits for it to settle, and fires the add-friend link for the team's
//! customer. Items run strictly one after another and a failed item never stops
//! the run.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::automation::directory::{
    resolve_customer, resolve_profile, DirectoryError, ResolutionError, TeamDirectory,
};
use crate::automation::observer::{
    ChannelObserver, ItemStep, RunEvent, RunObserver, RunState, RunSummary,
};
use crate::data::Team;
use crate::swap::{RestoreOptions, SwapEngine, SwapError};

const EVENT_BUFFER: usize = 64;

/// One filled slot to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub team_id: i64,
    /// 1-based
    pub slot: usize,
    pub profile_id: i64,
    pub customer_id: Option<i64>,
}

/// Work for one team, in slot order
#[derive(Debug, Clone)]
pub struct TeamPlan {
    pub team: Team,
    pub items: Vec<WorkItem>,
    /// 1-based numbers of empty slots
    pub skipped: Vec<usize>,
}

impl TeamPlan {
    pub fn from_team(team: Team) -> Self {
        let mut items = Vec::new();
        let mut skipped = Vec::new();
        for (index, slot) in team.slots.iter().enumerate() {
            match slot {
                Some(profile_id) => items.push(WorkItem {
                    team_id: team.id,
                    slot: index + 1,
                    profile_id: *profile_id,
                    customer_id: team.customer_id,
                }),
                None => skipped.push(index + 1),
            }
        }
        Self {
            team,
            items,
            skipped,
        }
    }
}

#[derive(Debug, Error)]
enum ItemError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Swap(#[from] SwapError),
}

impl ItemError {
    fn is_cancelled(&self) -> bool {
        matches!(self, ItemError::Swap(SwapError::Cancelled))
    }
}

/// Handle to a run executing on a background task
pub struct RunHandle {
    pub run_id: Uuid,
    /// Events in order; the last one is always `RunFinished`
    pub events: mpsc::Receiver<RunEvent>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Request cancellation; the in-flight command finishes first
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

pub struct AutomationDriver {
    engine: Arc<SwapEngine>,
    directory: Arc<dyn TeamDirectory>,
    restore_options: RestoreOptions,
}

impl AutomationDriver {
    pub fn new(engine: Arc<SwapEngine>, directory: Arc<dyn TeamDirectory>) -> Self {
        Self {
            engine,
            directory,
            restore_options: RestoreOptions {
                trees: true,
                relaunch: false,
            },
        }
    }

    /// Whether auxiliary trees are restored along with the primary file
    pub fn with_trees(mut self, trees: bool) -> Self {
        self.restore_options.trees = trees;
        self
    }

    /// Build the ordered work plan for an event
    pub fn plan(&self, event_id: i64) -> Result<Vec<TeamPlan>, DirectoryError> {
        Ok(self
            .directory
            .teams_for_event(event_id)?
            .into_iter()
            .map(TeamPlan::from_team)
            .collect())
    }

    /// Run on a background task, forwarding events to the returned handle
    pub fn spawn(self: Arc<Self>, event_id: i64) -> RunHandle {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let run_id = Uuid::new_v4();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let observer = ChannelObserver::new(tx);
            self.run_with_id(run_id, event_id, &observer, token).await
        });
        RunHandle {
            run_id,
            events,
            cancel,
            join,
        }
    }

    /// Run to completion on the current task
    pub async fn run(
        &self,
        event_id: i64,
        observer: &dyn RunObserver,
        cancel: CancellationToken,
    ) -> RunSummary {
        self.run_with_id(Uuid::new_v4(), event_id, observer, cancel)
            .await
    }

    async fn run_with_id(
        &self,
        run_id: Uuid,
        event_id: i64,
        observer: &dyn RunObserver,
        cancel: CancellationToken,
    ) -> RunSummary {
        let started_at = Utc::now();
        let mut summary = RunSummary {
            run_id,
            event_id,
            state: RunState::Completed,
            completed: 0,
            failed: 0,
            skipped: 0,
            started_at,
            finished_at: started_at,
        };

        let plan = match self.plan(event_id) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::error!(event_id, error = %err, "Could not load teams, aborting run");
                summary.state = RunState::Aborted {
                    reason: err.to_string(),
                };
                return finish(summary, observer).await;
            }
        };

        let total_items: usize = plan.iter().map(|t| t.items.len()).sum();
        tracing::info!(%run_id, event_id, teams = plan.len(), items = total_items, "Run started");
        observer
            .on_event(RunEvent::RunStarted {
                run_id,
                event_id,
                teams: plan.len(),
                items: total_items,
            })
            .await;

        'teams: for team_plan in &plan {
            let team_id = team_plan.team.id;
            for slot in &team_plan.skipped {
                summary.skipped += 1;
                observer
                    .on_event(RunEvent::SlotSkipped {
                        team_id,
                        slot: *slot,
                    })
                    .await;
            }

            let (mut completed, mut failed) = (0, 0);
            for item in &team_plan.items {
                if cancel.is_cancelled() {
                    summary.state = RunState::Cancelled;
                    break 'teams;
                }

                observer
                    .on_event(RunEvent::ItemStarted {
                        team_id,
                        slot: item.slot,
                        profile_id: item.profile_id,
                    })
                    .await;

                match self.run_item(item, observer, &cancel).await {
                    Ok((profile, user_id)) => {
                        completed += 1;
                        observer
                            .on_event(RunEvent::ItemCompleted {
                                team_id,
                                slot: item.slot,
                                profile,
                                user_id,
                            })
                            .await;
                    }
                    Err(err) => {
                        failed += 1;
                        if err.is_cancelled() {
                            summary.state = RunState::Cancelled;
                        }
                        tracing::warn!(team_id, slot = item.slot, error = %err, "Item failed");
                        observer
                            .on_event(RunEvent::ItemFailed {
                                team_id,
                                slot: item.slot,
                                error: err.to_string(),
                            })
                            .await;
                    }
                }
            }

            summary.completed += completed;
            summary.failed += failed;
            observer
                .on_event(RunEvent::TeamCompleted {
                    team_id,
                    name: team_plan.team.name.clone(),
                    completed,
                    failed,
                })
                .await;

            if summary.state == RunState::Cancelled {
                break;
            }
        }

        finish(summary, observer).await
    }

    /// Resolve, restore, launch and signal one slot. Returns the profile name
    /// and the user id the link was sent to.
    async fn run_item(
        &self,
        item: &WorkItem,
        observer: &dyn RunObserver,
        cancel: &CancellationToken,
    ) -> Result<(String, String), ItemError> {
        let profile = resolve_profile(self.directory.as_ref(), item.profile_id)?;
        let (customer, user_id) = resolve_customer(self.directory.as_ref(), item.customer_id)?;
        tracing::info!(
            team_id = item.team_id,
            slot = item.slot,
            profile = %profile.name,
            customer = %customer.name,
            "Running slot"
        );

        let session = self.engine.session_with_cancel(cancel.clone()).await?;
        session
            .restore(profile.namespace, &profile.name, self.restore_options)
            .await?;
        self.progress(observer, item, ItemStep::Restored).await;

        let launched = session.launch_app().await?;
        if launched.is_cancelled() {
            return Err(SwapError::Cancelled.into());
        }
        self.progress(observer, item, ItemStep::Launched).await;

        session.open_friend_link(&user_id).await?;
        self.progress(observer, item, ItemStep::LinkOpened).await;

        Ok((profile.name, user_id))
    }

    async fn progress(&self, observer: &dyn RunObserver, item: &WorkItem, step: ItemStep) {
        observer
            .on_event(RunEvent::ItemProgress {
                team_id: item.team_id,
                slot: item.slot,
                step,
            })
            .await;
    }
}

async fn finish(mut summary: RunSummary, observer: &dyn RunObserver) -> RunSummary {
    summary.finished_at = Utc::now();
    tracing::info!(
        run_id = %summary.run_id,
        state = ?summary.state,
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        "Run finished"
    );
    observer
        .on_event(RunEvent::RunFinished(summary.clone()))
        .await;
    summary
}
