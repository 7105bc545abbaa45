//! Convergence driver
//!
//! Resources are visited one at a time in collection order and each of
//! their actions runs in order. A converged action queues the resource's
//! notifications: immediate ones run on the spot, delayed ones are drained
//! after the main list. The first unignored failure aborts the run and
//! discards whatever delayed notifications are still pending.

use crate::collection::ResolvedCollection;
use crate::context::{ApplyContext, NoObserver, RunObserver};
use crate::notify::{DelayedQueue, Timing};
use crate::provider::provider_for;
use crate::resource::{Action, Resource, ResourceKey};
use crate::types::{
    ActionRecord, NotificationRecord, NotificationState, ResourceOutcome, RunReport, RunStatus,
};

/// Converge every resource in `collection`
///
/// Provider errors never escape; they become `failed` outcomes in the
/// returned report.
pub fn converge<O: RunObserver>(
    collection: &ResolvedCollection,
    ctx: &ApplyContext,
    observer: &mut O,
) -> RunReport {
    observer.on_run_start(collection.len(), ctx.why_run);
    let mut run = Run {
        collection,
        ctx,
        observer,
        actions: Vec::new(),
        notifications: Vec::new(),
        delayed: DelayedQueue::new(),
        failure: None,
    };

    'main: for resource in collection.iter() {
        for &action in &resource.actions {
            if !run.run_action(resource, action, None) {
                break 'main;
            }
        }
    }

    if run.failure.is_none() {
        run.drain_delayed();
    }
    if run.failure.is_some() {
        run.discard_delayed();
    }

    let status = match run.failure.take() {
        None => RunStatus::Success,
        Some((resource, error)) => RunStatus::Failed { resource, error },
    };
    let report = RunReport {
        actions: run.actions,
        notifications: run.notifications,
        status,
        why_run: ctx.why_run,
    };
    observer.on_run_complete(&report);
    report
}

/// Converge without progress reporting
pub fn converge_simple(collection: &ResolvedCollection, ctx: &ApplyContext) -> RunReport {
    converge(collection, ctx, &mut NoObserver)
}

struct Run<'a, O: RunObserver> {
    collection: &'a ResolvedCollection,
    ctx: &'a ApplyContext<'a>,
    observer: &'a mut O,
    actions: Vec<ActionRecord>,
    notifications: Vec<NotificationRecord>,
    delayed: DelayedQueue,
    failure: Option<(String, String)>,
}

impl<O: RunObserver> Run<'_, O> {
    /// Run one action and whatever it notifies immediately
    ///
    /// Returns `false` when the run must abort.
    fn run_action(
        &mut self,
        resource: &Resource,
        action: Action,
        notified_by: Option<&ResourceKey>,
    ) -> bool {
        let collection = self.collection;
        let key = resource.key();
        let key_str = key.to_string();
        self.observer.on_action_start(&key_str, action);

        let outcome = self.evaluate(resource, action);
        log_outcome(&key_str, action, &outcome, self.ctx.why_run);

        let record = ActionRecord {
            resource: key_str.clone(),
            action,
            outcome: outcome.clone(),
            notified_by: notified_by.map(ToString::to_string),
        };
        self.observer.on_action_complete(&record);
        self.actions.push(record);

        match outcome {
            ResourceOutcome::Failed { error, ignored: false } => {
                self.failure = Some((key_str, error));
                return false;
            }
            ResourceOutcome::Converged { .. } => {}
            _ => return true,
        }

        for notification in &resource.notifies {
            let target_str = notification.target.to_string();
            match notification.timing {
                Timing::Immediately => {
                    let Some(target) = collection.get(&notification.target) else {
                        continue;
                    };
                    log::debug!("{key_str} notifying {target_str} to {} immediately", notification.action);
                    self.observer.on_notification(
                        &key_str,
                        &target_str,
                        notification.action,
                        Timing::Immediately,
                    );
                    self.notifications.push(NotificationRecord {
                        source: key_str.clone(),
                        target: target_str,
                        action: notification.action,
                        timing: Timing::Immediately,
                        state: NotificationState::Fired,
                    });
                    if !self.run_action(target, notification.action, Some(&key)) {
                        return false;
                    }
                }
                Timing::Delayed => {
                    if self.delayed.push(key.clone(), notification.target.clone(), notification.action) {
                        log::debug!("{key_str} queued delayed {} of {target_str}", notification.action);
                        self.observer.on_notification(
                            &key_str,
                            &target_str,
                            notification.action,
                            Timing::Delayed,
                        );
                    } else {
                        log::debug!("{} of {target_str} is already queued or fired", notification.action);
                    }
                }
            }
        }
        true
    }

    fn evaluate(&self, resource: &Resource, action: Action) -> ResourceOutcome {
        if action == Action::Nothing {
            return ResourceOutcome::Skipped {
                reason: "action nothing".to_string(),
            };
        }
        match resource.guards.evaluate(self.ctx) {
            Ok(Some(reason)) => return ResourceOutcome::Skipped { reason },
            Ok(None) => {}
            Err(e) => {
                return ResourceOutcome::Failed {
                    error: format!("{e:#}"),
                    ignored: resource.ignore_failure,
                };
            }
        }
        match provider_for(resource).apply(action, self.ctx) {
            Ok(result) if result.is_change() => ResourceOutcome::Converged { result },
            Ok(_) => ResourceOutcome::Unchanged,
            Err(e) => ResourceOutcome::Failed {
                error: format!("{e:#}"),
                ignored: resource.ignore_failure,
            },
        }
    }

    /// Fire delayed notifications, including any queued while draining
    fn drain_delayed(&mut self) {
        let collection = self.collection;
        while let Some(pending) = self.delayed.pop() {
            self.notifications.push(NotificationRecord {
                source: pending.source.to_string(),
                target: pending.target.to_string(),
                action: pending.action,
                timing: Timing::Delayed,
                state: NotificationState::Fired,
            });
            let Some(target) = collection.get(&pending.target) else {
                continue;
            };
            if !self.run_action(target, pending.action, Some(&pending.source)) {
                return;
            }
        }
    }

    fn discard_delayed(&mut self) {
        for pending in self.delayed.discard() {
            log::info!(
                "Discarding delayed {} of {} after failure",
                pending.action,
                pending.target
            );
            self.notifications.push(NotificationRecord {
                source: pending.source.to_string(),
                target: pending.target.to_string(),
                action: pending.action,
                timing: Timing::Delayed,
                state: NotificationState::Discarded,
            });
        }
    }
}

fn log_outcome(key: &str, action: Action, outcome: &ResourceOutcome, why_run: bool) {
    match outcome {
        ResourceOutcome::Unchanged => log::info!("{key} action {action} (up to date)"),
        ResourceOutcome::Converged { result } if why_run => {
            log::info!("{key} action {action} (would be {result})")
        }
        ResourceOutcome::Converged { result } => log::info!("{key} action {action} ({result})"),
        ResourceOutcome::Skipped { reason } => {
            log::debug!("{key} action {action} skipped: {reason}")
        }
        ResourceOutcome::Failed { error, ignored: true } => {
            log::warn!("{key} action {action} failed (ignored): {error}")
        }
        ResourceOutcome::Failed { error, ignored: false } => {
            log::error!("{key} action {action} failed: {error}")
        }
    }
}
