//! Domain types for the warden action catalog.
//!
//! These mirror the persisted and YAML-facing shapes of groups, actions,
//! triggers, KV entries, and notifications. The catalog, store, and
//! dispatcher crate operate on these types directly; this crate has no
//! knowledge of execution, scheduling, or persistence.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_duration::{deserialize_duration, serialize_duration};

/// Reserved store key under which the merged catalog is persisted.
pub const RESERVED_KEY_GROUPS: &str = "pal_groups";
/// Reserved store key under which the notification ring is persisted.
pub const RESERVED_KEY_NOTIFICATIONS: &str = "pal_notifications";

/// True for any key the public KV API refuses to read or write.
pub fn is_reserved_key(key: &str) -> bool {
    key == RESERVED_KEY_GROUPS || key == RESERVED_KEY_NOTIFICATIONS
}

/// A YAML action file deserializes to this: a map from group name to its
/// ordered list of actions. Later files win on duplicate group names when
/// merged in sorted-filename order (see the catalog loader).
pub type GroupMap = BTreeMap<String, Vec<Action>>;

fn default_timeout() -> Duration {
    Duration::from_secs(600)
}

/// Runtime status of the most recent execution. The empty variant is the
/// pre-first-run state, distinct from a successful or failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActionStatus {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "error")]
    Error,
}

/// Container execution settings for an action whose `image` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    /// Image reference to pull with policy "missing" before each run.
    pub image: String,
    /// Extra `docker run`/`podman run` flags.
    pub options: Vec<String>,
    /// Run the container engine invocation under `sudo`.
    pub sudo: bool,
}

impl ContainerSpec {
    pub fn is_set(&self) -> bool {
        !self.image.is_empty()
    }
}

/// A cross-reference to another action, used by `on_success.run`/`on_error.run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRef {
    pub group: String,
    pub action: String,
    #[serde(default)]
    pub input: String,
}

/// `register` writes a KV entry from the outcome of a run, after `$PAL_*`
/// substitution is applied to `key` and `value`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterSpec {
    pub key: String,
    pub value: String,
    pub secret: bool,
}

impl RegisterSpec {
    pub fn is_set(&self) -> bool {
        !self.key.is_empty()
    }
}

/// Fan-out performed after a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnSuccess {
    /// Notification text template; empty disables notifications on success.
    pub notification: String,
    /// Cascading dispatches fired fire-and-forget.
    pub run: Vec<RunRef>,
    /// Names of configured webhooks to invoke.
    pub webhooks: Vec<String>,
}

/// Fan-out and retry policy applied after a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnError {
    pub notification: String,
    /// Number of additional attempts the executor makes before giving up.
    pub retries: u32,
    /// Sleep between retry attempts.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub retry_interval: Duration,
    pub run: Vec<RunRef>,
    pub webhooks: Vec<String>,
}

impl Default for OnError {
    fn default() -> Self {
        Self {
            notification: String::new(),
            retries: 0,
            retry_interval: Duration::from_secs(0),
            run: Vec::new(),
            webhooks: Vec::new(),
        }
    }
}

/// One entry of an action's bounded run history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    pub ran: DateTime<Utc>,
    /// Human-formatted elapsed time, e.g. `"1h2m3s"`.
    pub duration: String,
    pub status: ActionStatus,
}

/// Maximum number of entries kept in `Action::run_history` (invariant 2).
pub const RUN_HISTORY_LIMIT: usize = 5;

/// An HTTP response header an action's handler should emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub header: String,
    pub value: String,
}

/// The unit of execution: a named shell (or containerized) command, its
/// triggering rules, and its accumulated runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Action name, unique within its owning group.
    pub action: String,
    /// Shell one-liner. Required, non-empty.
    pub cmd: String,
    /// Overrides `global.cmd_prefix` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_prefix: Option<String>,
    #[serde(default)]
    pub container: ContainerSpec,
    #[serde(
        default = "default_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,
    #[serde(default)]
    pub background: bool,
    /// If false, at most one execution of this action may be in flight.
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default)]
    pub input: String,
    /// Validation expression applied to caller-supplied input.
    #[serde(default)]
    pub input_validate: String,

    #[serde(default)]
    pub crons: Vec<String>,
    #[serde(default)]
    pub on_success: OnSuccess,
    #[serde(default)]
    pub on_error: OnError,

    #[serde(default)]
    pub output: bool,
    #[serde(default)]
    pub response_headers: Vec<ResponseHeader>,
    #[serde(default)]
    pub register: RegisterSpec,

    // Runtime state, persisted alongside the definition but preserved across
    // catalog reloads for surviving (group, action) pairs.
    #[serde(default)]
    pub status: ActionStatus,
    #[serde(default)]
    pub lock: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ran: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success_output: String,
    #[serde(default)]
    pub last_failure_output: String,
    #[serde(default)]
    pub last_duration: String,
    #[serde(default)]
    pub run_history: Vec<RunHistoryEntry>,
    /// Derived by the trigger graph builder; not authored in YAML.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

impl Action {
    /// Reset every field the dispatcher/scheduler mutate, leaving the
    /// definition fields untouched. Used when an action is freshly loaded.
    pub fn reset_runtime_state(&mut self) {
        self.status = ActionStatus::Unset;
        self.lock = false;
        self.run_count = 0;
        self.last_ran = None;
        self.last_success = None;
        self.last_failure = None;
        self.last_success_output.clear();
        self.last_failure_output.clear();
        self.last_duration.clear();
        self.run_history.clear();
        self.triggers.clear();
    }

    /// Prepend a new run history entry, keeping at most [`RUN_HISTORY_LIMIT`].
    pub fn push_run_history(&mut self, entry: RunHistoryEntry) {
        self.run_history.insert(0, entry);
        self.run_history.truncate(RUN_HISTORY_LIMIT);
    }

    pub fn effective_cmd_prefix<'a>(&'a self, global_prefix: &'a str) -> &'a str {
        self.cmd_prefix.as_deref().unwrap_or(global_prefix)
    }
}

/// Whether a trigger fires after a successful or failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    Success,
    Error,
}

/// A derived, immutable edge in the trigger graph, mirrored onto both the
/// origin and target action's `triggers` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub origin_group: String,
    pub origin_action: String,
    pub trigger_group: String,
    pub trigger_action: String,
    pub condition: TriggerCondition,
    pub input: String,
}

/// A single KV store entry. Opaque byte-string keys are represented as
/// `String` here; callers are responsible for any binary encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

/// An entry in the bounded notification ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub group: String,
    pub action: String,
    pub status: String,
    pub notification: String,
    pub notification_received: DateTime<Utc>,
}
