//! Action catalog: loading YAML action files, merging them with a previously
//! persisted catalog on reload, and building the trigger graph.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use warden_types::{Action, GroupMap};

/// Load every `.yml`/`.yaml` file in `dir`, parsing each as a `{group: [Action]}`
/// map. Files that fail to parse, or contain an action missing `action`/`cmd`,
/// are skipped with a logged warning rather than aborting the whole load.
///
/// Files are merged in sorted-filename order, so on a duplicate group name the
/// lexicographically-last file wins — deterministic, per the resolved
/// ordering question this catalog inherited from its source.
pub fn load(dir: &Path) -> Result<GroupMap> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read actions directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    paths.sort();

    let mut merged: GroupMap = BTreeMap::new();
    for path in paths {
        match load_file(&path) {
            Ok(groups) => {
                for (group, actions) in groups {
                    merged.insert(group, actions);
                }
            }
            Err(err) => {
                eprintln!("[warn] skipping action file {}: {err:#}", path.display());
            }
        }
    }
    Ok(merged)
}

fn load_file(path: &Path) -> Result<GroupMap> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let groups: GroupMap =
        serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;

    for (group, actions) in &groups {
        for action in actions {
            if action.action.is_empty() {
                anyhow::bail!("group '{group}' has an action with an empty name");
            }
            if action.cmd.is_empty() {
                anyhow::bail!("action '{group}/{}' has an empty cmd", action.action);
            }
        }
    }
    Ok(groups)
}

/// Merge a freshly loaded catalog with the previously persisted one.
///
/// For every (group, action) present in both, the definition fields come
/// from `fresh` but the runtime fields (`status`, `lock`, `disabled`,
/// `run_count`, `last_*`, `run_history`, `triggers`) are kept from `persisted`.
/// Actions absent from `fresh` are dropped; actions absent from `persisted`
/// start with zeroed runtime state (their own YAML-provided defaults).
pub fn reload(persisted: &GroupMap, fresh: GroupMap) -> GroupMap {
    let mut persisted_actions: BTreeMap<(String, String), Action> = BTreeMap::new();
    for (group, actions) in persisted {
        for action in actions {
            persisted_actions.insert((group.clone(), action.action.clone()), action.clone());
        }
    }

    let mut merged: GroupMap = BTreeMap::new();
    for (group, actions) in fresh {
        let mut merged_actions = Vec::with_capacity(actions.len());
        for mut action in actions {
            if let Some(old) = persisted_actions.get(&(group.clone(), action.action.clone())) {
                action.status = old.status;
                action.lock = old.lock;
                action.disabled = old.disabled;
                action.run_count = old.run_count;
                action.last_ran = old.last_ran;
                action.last_success = old.last_success;
                action.last_failure = old.last_failure;
                action.last_success_output = old.last_success_output.clone();
                action.last_failure_output = old.last_failure_output.clone();
                action.last_duration = old.last_duration.clone();
                action.run_history = old.run_history.clone();
            }
            merged_actions.push(action);
        }
        merged.insert(group, merged_actions);
    }
    merged
}
