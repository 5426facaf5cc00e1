//! Central dispatch orchestration: lookup, validation, locking, execution,
//! persistence and fan-out, shared by the on-demand (HTTP) and cron entry
//! points.
//!
//! Auth enforcement (§6) happens one layer up, in the HTTP handler, before
//! `dispatch` is ever called — this module only threads the already-checked
//! [`RequestContext`] through for `PAL_REQUEST` substitution. The cron entry
//! point never builds one.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use warden_types::{Action, ActionStatus, KvEntry, Notification, RunHistoryEntry};

use crate::error::{Result, WardenError};
use crate::lock::LockManager;
use crate::store::Store;
use crate::{executor, notifications, validate};

/// Metadata about the inbound HTTP request, serialized into `$PAL_REQUEST`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
}

/// What field of a previous run the caller asked for instead of a fresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastField {
    Output,
    Success,
    Failure,
}

pub enum DispatchOutcome {
    /// Step 4: the caller asked for a cached field; no run took place.
    ShortCircuited(String),
    /// Step 8 background branch: the action was launched and detached.
    Backgrounded,
    /// Steps 9-12 ran synchronously; carries the executor's output and the
    /// resulting status.
    Completed { output: String, status: ActionStatus },
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
    locks: Arc<LockManager>,
    config: warden_config::Config,
}

impl Dispatcher {
    pub fn new(store: Store, locks: Arc<LockManager>, config: warden_config::Config) -> Self {
        Self { store, locks, config }
    }

    /// On-demand entry point (§4.6 steps 1-12).
    pub fn dispatch(
        &self,
        group: &str,
        action_name: &str,
        input: Option<&str>,
        last_field: Option<LastField>,
        request_ctx: Option<RequestContext>,
    ) -> Result<DispatchOutcome> {
        let action = self
            .store
            .get_group_action(group, action_name)?
            .ok_or_else(|| WardenError::NotFound("invalid action".to_string()))?;

        if action.disabled {
            return Err(WardenError::Validation("action is disabled".to_string()));
        }

        if let Some(field) = last_field {
            if !action.output {
                return Err(WardenError::Validation("error output not enabled".to_string()));
            }
            let value = match field {
                LastField::Output => match action.status {
                    ActionStatus::Error => action.last_failure_output.clone(),
                    _ => action.last_success_output.clone(),
                },
                LastField::Success => action.last_success_output.clone(),
                LastField::Failure => action.last_failure_output.clone(),
            };
            return Ok(DispatchOutcome::ShortCircuited(value));
        }

        let effective_input = input.map(str::to_string).unwrap_or_else(|| action.input.clone());
        validate::validate(&effective_input, &action.input_validate)
            .map_err(WardenError::Validation)?;

        self.run_action(group, action, effective_input, request_ctx)
    }

    /// Cron entry point: same pipeline minus auth/last-field/caller input,
    /// always using `action.input`, never via HTTP.
    pub fn dispatch_cron(&self, group: &str, action_name: &str) -> Result<DispatchOutcome> {
        let action = self
            .store
            .get_group_action(group, action_name)?
            .ok_or_else(|| WardenError::NotFound("invalid action".to_string()))?;

        if action.disabled {
            return Err(WardenError::Validation("action is disabled".to_string()));
        }

        let input = action.input.clone();
        self.run_action(group, action, input, None)
    }

    fn run_action(
        &self,
        group: &str,
        mut action: Action,
        input: String,
        request_ctx: Option<RequestContext>,
    ) -> Result<DispatchOutcome> {
        if !action.concurrent && !self.locks.try_acquire(group, &action.action) {
            return Err(WardenError::LockConflict);
        }

        if !action.concurrent {
            // Mirror the in-memory acquire onto the persisted advisory flag
            // so introspection (UI, catalog dump) reflects a run in flight,
            // not just the in-process lock that actually enforces exclusion.
            action.lock = true;
            if let Err(err) = self.store.put_group_action(group, action.clone()) {
                eprintln!("[warn] failed to persist lock flag for {group}/{}: {err:#}", action.action);
            }
        }

        if action.background {
            // The lock is held for the duration of the detached run, not just
            // until the response is sent: a second non-concurrent dispatch
            // issued while the background run is still in flight must see
            // `LockConflict`, not race ahead of it.
            let dispatcher = self.clone();
            let group = group.to_string();
            std::thread::spawn(move || {
                dispatcher.execute_and_fanout(&group, action, input, request_ctx);
            });
            return Ok(DispatchOutcome::Backgrounded);
        }

        let (output, status) = self.execute_and_fanout(group, action, input, request_ctx);
        Ok(DispatchOutcome::Completed { output, status })
    }

    fn execute_and_fanout(
        &self,
        group: &str,
        mut action: Action,
        input: String,
        request_ctx: Option<RequestContext>,
    ) -> (String, ActionStatus) {
        let env = build_env(group, &action.action, &input, request_ctx.as_ref());
        let global_prefix = &self.config.global.cmd_prefix;
        let working_dir = &self.config.global.working_dir;

        let result = if action.container.is_set() {
            let container_cmd = self.config.global.container_cmd.as_deref().unwrap_or("docker");
            executor::run_containerized(&action, container_cmd, global_prefix, working_dir, &env)
        } else {
            executor::run(&action, global_prefix, working_dir, &env)
        };

        let now = Utc::now();
        let status = if result.error.is_none() {
            action.status = ActionStatus::Success;
            action.last_ran = Some(now);
            action.last_success = Some(now);
            action.last_duration = result.duration.clone();
            if action.output {
                action.last_success_output = result.output.clone();
            }
            action.run_count += 1;
            action.push_run_history(RunHistoryEntry {
                ran: now,
                duration: result.duration.clone(),
                status: ActionStatus::Success,
            });
            ActionStatus::Success
        } else {
            action.status = ActionStatus::Error;
            action.last_ran = Some(now);
            action.last_failure = Some(now);
            action.last_duration = result.duration.clone();
            action.last_failure_output = format!(
                "{} {}",
                result.error.clone().unwrap_or_default(),
                result.output
            );
            action.run_count += 1;
            action.push_run_history(RunHistoryEntry {
                ran: now,
                duration: result.duration.clone(),
                status: ActionStatus::Error,
            });
            ActionStatus::Error
        };

        if !action.concurrent {
            self.locks.release(group, &action.action);
            action.lock = false;
        }

        if let Err(err) = self.store.put_group_action(group, action.clone()) {
            eprintln!("[warn] failed to persist {group}/{}: {err:#}", action.action);
        }

        self.fan_out(group, &action, &input, status, &result.output);

        (result.output, status)
    }

    fn fan_out(&self, group: &str, action: &Action, input: &str, status: ActionStatus, output: &str) {
        let (notification_template, webhooks, runs) = match status {
            ActionStatus::Success => (
                &action.on_success.notification,
                &action.on_success.webhooks,
                &action.on_success.run,
            ),
            ActionStatus::Error => (
                &action.on_error.notification,
                &action.on_error.webhooks,
                &action.on_error.run,
            ),
            ActionStatus::Unset => return,
        };

        let status_str = match status {
            ActionStatus::Success => "success",
            ActionStatus::Error => "error",
            ActionStatus::Unset => "",
        };
        let ctx = warden_webhook::TemplateContext {
            group: group.to_string(),
            action: action.action.clone(),
            input: input.to_string(),
            status: status_str.to_string(),
            output: if action.output { Some(output.to_string()) } else { None },
        };

        if !notification_template.is_empty() {
            let message = ctx.substitute(notification_template);
            let note = Notification {
                id: uuid::Uuid::new_v4(),
                group: group.to_string(),
                action: action.action.clone(),
                status: status_str.to_string(),
                notification: message,
                notification_received: Utc::now(),
            };
            if let Err(err) = notifications::put(
                &self.store,
                &self.config.global.timezone,
                self.config.notifications.store_max,
                note,
            ) {
                eprintln!("[warn] failed to enqueue notification for {group}/{}: {err:#}", action.action);
            }
        }

        for webhook_name in webhooks {
            if let Some(spec) = self.config.notifications.webhooks.get(webhook_name) {
                warden_webhook::send_webhook_detached(spec.clone(), ctx.clone());
            } else {
                eprintln!("[warn] webhook '{webhook_name}' referenced by {group}/{} is not configured", action.action);
            }
        }

        for run_ref in runs {
            let dispatcher = self.clone();
            let trigger_group = run_ref.group.clone();
            let trigger_action = run_ref.action.clone();
            let trigger_input = ctx.substitute(&run_ref.input);
            std::thread::spawn(move || {
                if let Err(err) = dispatcher.dispatch(
                    &trigger_group,
                    &trigger_action,
                    Some(&trigger_input),
                    None,
                    None,
                ) {
                    eprintln!("[warn] cascading dispatch {trigger_group}/{trigger_action} failed: {err}");
                }
            });
        }

        if action.register.is_set() {
            let key = ctx.substitute(&action.register.key);
            let value = ctx.substitute(&action.register.value);
            let entry = KvEntry {
                key,
                value,
                secret: action.register.secret,
            };
            if let Err(err) = self.store.put(&entry) {
                eprintln!("[warn] failed to register kv entry for {group}/{}: {err:#}", action.action);
            }
        }
    }
}

fn build_env(
    group: &str,
    action: &str,
    input: &str,
    request_ctx: Option<&RequestContext>,
) -> Vec<(String, String)> {
    let request_json = request_ctx
        .map(|ctx| serde_json::to_string(ctx).unwrap_or_default())
        .unwrap_or_default();
    vec![
        ("PAL_UPLOAD_DIR".to_string(), String::new()),
        ("PAL_GROUP".to_string(), group.to_string()),
        ("PAL_ACTION".to_string(), action.to_string()),
        ("PAL_INPUT".to_string(), input.to_string()),
        ("PAL_REQUEST".to_string(), request_json),
    ]
}
