//! Policy evaluation: `are_actions_allowed_on_resource` (§4.E).

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{Intent, Rule, Scope, Skill, ViewDefinition};

/// Outcome of a policy evaluation, carried in the `policy_decision` audit
/// event.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub actions: Vec<String>,
    /// `intent -> matched rule descriptions`, for audit.
    pub basis: HashMap<String, Vec<String>>,
}

fn describe(rule: &Rule) -> String {
    format!("actions={:?} targets={:?}", rule.actions, rule.targets)
}

/// For the skill's resource path and required action set, evaluate
/// whether the view authorizes every exported action.
///
/// A scope-qualified rule is one the view's scope is at least as broad as
/// the session's scope; if the view doesn't qualify at all, the decision
/// is a denial with an empty basis. An explicit deny matching a required
/// action forces denial regardless of any allow rule; otherwise every
/// required action must be covered by at least one allow rule.
pub fn are_actions_allowed_on_resource(
    view: &ViewDefinition,
    session_scope: &Scope,
    skill: &Skill,
) -> PolicyDecision {
    let mut basis: HashMap<String, Vec<String>> = HashMap::new();

    if !view.scope.covers(session_scope) {
        return PolicyDecision {
            allowed: false,
            actions: skill.exported_actions.clone(),
            basis,
        };
    }

    let applicable: Vec<&Rule> = view
        .rules
        .iter()
        .filter(|r| r.matches_target(&skill.resource_path))
        .collect();

    // Explicit deny on any required action is terminal.
    for action in &skill.exported_actions {
        for rule in &applicable {
            if rule.intent == Intent::Deny && rule.matches_action(action) {
                basis
                    .entry("deny".to_string())
                    .or_default()
                    .push(describe(rule));
            }
        }
    }
    if basis.contains_key("deny") {
        return PolicyDecision {
            allowed: false,
            actions: skill.exported_actions.clone(),
            basis,
        };
    }

    // Every required action must be covered by at least one allow rule.
    let mut covered = vec![false; skill.exported_actions.len()];
    for (i, action) in skill.exported_actions.iter().enumerate() {
        for rule in &applicable {
            if rule.intent == Intent::Allow && rule.matches_action(action) {
                covered[i] = true;
                basis
                    .entry("allow".to_string())
                    .or_default()
                    .push(describe(rule));
            }
        }
    }

    PolicyDecision {
        allowed: covered.iter().all(|&c| c),
        actions: skill.exported_actions.clone(),
        basis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunnerRef;
    use std::collections::HashMap as StdHashMap;

    fn scope(catalog: &str) -> Scope {
        Scope {
            catalog: catalog.into(),
            variant: String::new(),
            namespace: String::new(),
        }
    }

    fn skill(resource_path: &str, actions: &[&str]) -> Skill {
        Skill {
            name: "s".into(),
            description: String::new(),
            input_schema: serde_json::Value::Null,
            output_schema: serde_json::Value::Null,
            resource_path: resource_path.into(),
            exported_actions: actions.iter().map(|s| s.to_string()).collect(),
            runner: RunnerRef {
                runner_id: "stdio".into(),
                config: StdHashMap::new(),
            },
        }
    }

    fn view(scope: Scope, rules: Vec<Rule>) -> ViewDefinition {
        ViewDefinition { scope, rules }
    }

    #[test]
    fn allows_when_all_actions_covered() {
        let v = view(
            scope("acme"),
            vec![Rule {
                intent: Intent::Allow,
                actions: vec!["fs.read".into()],
                targets: vec!["files/*".into()],
            }],
        );
        let s = skill("files/report", &["fs.read"]);
        let decision = are_actions_allowed_on_resource(&v, &scope("acme"), &s);
        assert!(decision.allowed);
        assert!(decision.basis.contains_key("allow"));
    }

    #[test]
    fn denies_on_explicit_deny_even_with_allow() {
        let v = view(
            scope("acme"),
            vec![
                Rule {
                    intent: Intent::Allow,
                    actions: vec!["fs.write".into()],
                    targets: vec!["files/*".into()],
                },
                Rule {
                    intent: Intent::Deny,
                    actions: vec!["fs.write".into()],
                    targets: vec!["files/secret".into()],
                },
            ],
        );
        let s = skill("files/secret", &["fs.write"]);
        let decision = are_actions_allowed_on_resource(&v, &scope("acme"), &s);
        assert!(!decision.allowed);
        assert!(decision.basis.contains_key("deny"));
    }

    #[test]
    fn denies_when_action_uncovered() {
        let v = view(
            scope("acme"),
            vec![Rule {
                intent: Intent::Allow,
                actions: vec!["fs.read".into()],
                targets: vec!["files/*".into()],
            }],
        );
        let s = skill("files/report", &["fs.write"]);
        let decision = are_actions_allowed_on_resource(&v, &scope("acme"), &s);
        assert!(!decision.allowed);
    }

    #[test]
    fn denies_when_scope_not_qualified() {
        let v = view(
            scope("acme"),
            vec![Rule {
                intent: Intent::Allow,
                actions: vec!["fs.read".into()],
                targets: vec!["files/*".into()],
            }],
        );
        let s = skill("files/report", &["fs.read"]);
        let decision = are_actions_allowed_on_resource(&v, &scope("other-tenant"), &s);
        assert!(!decision.allowed);
        assert!(decision.basis.is_empty());
    }

    #[test]
    fn no_required_actions_is_allowed() {
        let v = view(scope("acme"), vec![]);
        let s = skill("files/report", &[]);
        let decision = are_actions_allowed_on_resource(&v, &scope("acme"), &s);
        assert!(decision.allowed);
    }
}
