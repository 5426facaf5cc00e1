//! Trigger graph: a pure function of the catalog. Walks each action's
//! `on_success.run`/`on_error.run` and mirrors a [`Trigger`] record onto both
//! the origin and target action's `triggers` list. Targets that don't exist
//! in the catalog are dropped silently.
//!
//! Cycles (A triggers B triggers A) are permitted at definition time; this
//! module does not detect them. Dispatch-time recursion is currently
//! unbounded — the dispatcher spawns one fire-and-forget thread per
//! cascading `run_ref` with no depth counter or visited-set, so a cyclic
//! trigger graph will cascade indefinitely. See DESIGN.md's "remaining open
//! item" for the planned fix.

use warden_types::{GroupMap, Trigger, TriggerCondition};

/// Rebuild every action's `triggers` list in place from its `on_success.run`
/// and `on_error.run` entries.
pub fn rebuild(groups: &mut GroupMap) {
    let edges = collect_edges(groups);

    for actions in groups.values_mut() {
        for action in actions.iter_mut() {
            action.triggers.clear();
        }
    }

    for edge in edges {
        if !target_exists(groups, &edge.trigger_group, &edge.trigger_action) {
            continue;
        }
        if let Some(origin) = find_mut(groups, &edge.origin_group, &edge.origin_action) {
            origin.triggers.push(edge.clone());
        }
        if let Some(target) = find_mut(groups, &edge.trigger_group, &edge.trigger_action) {
            if !target.triggers.contains(&edge) {
                target.triggers.push(edge);
            }
        }
    }
}

fn collect_edges(groups: &GroupMap) -> Vec<Trigger> {
    let mut edges = Vec::new();
    for (group, actions) in groups {
        for action in actions {
            for run_ref in &action.on_success.run {
                edges.push(Trigger {
                    origin_group: group.clone(),
                    origin_action: action.action.clone(),
                    trigger_group: run_ref.group.clone(),
                    trigger_action: run_ref.action.clone(),
                    condition: TriggerCondition::Success,
                    input: run_ref.input.clone(),
                });
            }
            for run_ref in &action.on_error.run {
                edges.push(Trigger {
                    origin_group: group.clone(),
                    origin_action: action.action.clone(),
                    trigger_group: run_ref.group.clone(),
                    trigger_action: run_ref.action.clone(),
                    condition: TriggerCondition::Error,
                    input: run_ref.input.clone(),
                });
            }
        }
    }
    edges
}

fn target_exists(groups: &GroupMap, group: &str, action: &str) -> bool {
    groups
        .get(group)
        .is_some_and(|actions| actions.iter().any(|a| a.action == action))
}

fn find_mut<'a>(
    groups: &'a mut GroupMap,
    group: &str,
    action: &str,
) -> Option<&'a mut warden_types::Action> {
    groups
        .get_mut(group)?
        .iter_mut()
        .find(|a| a.action == action)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use warden_types::RunRef;

    use super::*;

    fn action(name: &str) -> warden_types::Action {
        serde_yaml::from_str(&format!("action: {name}\ncmd: echo hi\n")).unwrap()
    }

    #[test]
    fn rebuild_mirrors_trigger_onto_both_endpoints() {
        let mut a = action("a");
        a.on_success.run.push(RunRef {
            group: "g1".to_string(),
            action: "b".to_string(),
            input: "from-a".to_string(),
        });
        let b = action("b");

        let mut groups: GroupMap = BTreeMap::new();
        groups.insert("g1".to_string(), vec![a, b]);

        rebuild(&mut groups);

        let actions = &groups["g1"];
        assert_eq!(actions[0].triggers.len(), 1);
        assert_eq!(actions[1].triggers.len(), 1);
        assert_eq!(actions[1].triggers[0].origin_action, "a");
    }

    #[test]
    fn rebuild_drops_triggers_whose_target_is_absent() {
        let mut a = action("a");
        a.on_success.run.push(RunRef {
            group: "g1".to_string(),
            action: "missing".to_string(),
            input: String::new(),
        });

        let mut groups: GroupMap = BTreeMap::new();
        groups.insert("g1".to_string(), vec![a]);

        rebuild(&mut groups);

        assert!(groups["g1"][0].triggers.is_empty());
    }

    #[test]
    fn rebuild_permits_cycles() {
        let mut a = action("a");
        a.on_success.run.push(RunRef {
            group: "g1".to_string(),
            action: "b".to_string(),
            input: String::new(),
        });
        let mut b = action("b");
        b.on_success.run.push(RunRef {
            group: "g1".to_string(),
            action: "a".to_string(),
            input: String::new(),
        });

        let mut groups: GroupMap = BTreeMap::new();
        groups.insert("g1".to_string(), vec![a, b]);

        rebuild(&mut groups);

        assert_eq!(groups["g1"][0].triggers.len(), 1);
        assert_eq!(groups["g1"][1].triggers.len(), 1);
    }
}
