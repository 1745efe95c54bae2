//! The data model of §3: views, skills, skillsets, and invocation records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A scope triple: catalog / variant / namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub catalog: String,
    pub variant: String,
    pub namespace: String,
}

impl Scope {
    /// A scope is "at least as broad" as another when each non-empty field
    /// of `other` is matched exactly or left wildcarded (empty) on `self`.
    pub fn covers(&self, other: &Scope) -> bool {
        Self::field_covers(&self.catalog, &other.catalog)
            && Self::field_covers(&self.variant, &other.variant)
            && Self::field_covers(&self.namespace, &other.namespace)
    }

    fn field_covers(mine: &str, theirs: &str) -> bool {
        mine.is_empty() || mine == theirs
    }
}

/// Allow or deny intent on a policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Allow,
    Deny,
}

/// One rule within a view definition: an intent over a set of actions,
/// scoped to a set of target path patterns (glob-style, `*` = one segment,
/// `**` = any number of segments).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub intent: Intent,
    pub actions: Vec<String>,
    pub targets: Vec<String>,
}

impl Rule {
    pub fn matches_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    pub fn matches_target(&self, path: &str) -> bool {
        self.targets.iter().any(|pat| glob_match(pat, path))
    }
}

/// Dot/slash-segmented glob match: `*` matches exactly one segment, `**`
/// matches zero or more segments. Segments are split on `/`.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let pat_segs: Vec<&str> = pattern.split('/').collect();
    let path_segs: Vec<&str> = path.split('/').collect();
    segs_match(&pat_segs, &path_segs)
}

fn segs_match(pat: &[&str], path: &[&str]) -> bool {
    match (pat.first(), path.first()) {
        (None, None) => true,
        (Some(&"**"), _) => {
            segs_match(&pat[1..], path)
                || (!path.is_empty() && segs_match(pat, &path[1..]))
        }
        (Some(&"*"), Some(_)) => segs_match(&pat[1..], &path[1..]),
        (Some(p), Some(s)) if p == s => segs_match(&pat[1..], &path[1..]),
        _ => false,
    }
}

/// A view definition: a scope plus a set of allow/deny rules. Immutable
/// within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub scope: Scope,
    pub rules: Vec<Rule>,
}

/// A reference to a runner: id + opaque config map (§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerRef {
    pub runner_id: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

/// A named operation within a skillset (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
    /// Resource path this skill acts on; the unit the policy evaluator
    /// matches rule targets against.
    pub resource_path: String,
    /// Action strings this skill requires — the principal decision input.
    pub exported_actions: Vec<String>,
    pub runner: RunnerRef,
}

/// A collection of skills addressable by a hierarchical path.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Skillset {
    pub path: String,
    pub skills: Vec<Skill>,
}

impl Skillset {
    pub fn find(&self, name: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.name == name)
    }
}

/// One execution of one skill within a session (§3, §4.C).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    pub invocation_id: String,
    pub invoker_id: String,
    pub tool_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_covers_wildcards_empty_fields() {
        let broad = Scope {
            catalog: "acme".into(),
            variant: String::new(),
            namespace: String::new(),
        };
        let narrow = Scope {
            catalog: "acme".into(),
            variant: "prod".into(),
            namespace: "billing".into(),
        };
        assert!(broad.covers(&narrow));
    }

    #[test]
    fn scope_does_not_cover_mismatched_catalog() {
        let a = Scope {
            catalog: "acme".into(),
            variant: String::new(),
            namespace: String::new(),
        };
        let b = Scope {
            catalog: "other".into(),
            variant: String::new(),
            namespace: String::new(),
        };
        assert!(!a.covers(&b));
    }

    #[test]
    fn glob_match_literal() {
        assert!(glob_match("a/b/c", "a/b/c"));
        assert!(!glob_match("a/b/c", "a/b/d"));
    }

    #[test]
    fn glob_match_single_star() {
        assert!(glob_match("files/*/read", "files/report/read"));
        assert!(!glob_match("files/*/read", "files/a/b/read"));
    }

    #[test]
    fn glob_match_double_star() {
        assert!(glob_match("files/**", "files/a/b/c"));
        assert!(glob_match("files/**", "files"));
    }

    #[test]
    fn skillset_find_by_name() {
        let set = Skillset {
            path: "acme/billing".into(),
            skills: vec![Skill {
                name: "echo-skill".into(),
                description: String::new(),
                input_schema: Value::Null,
                output_schema: Value::Null,
                resource_path: "files/echo".into(),
                exported_actions: vec!["fs.read".into()],
                runner: RunnerRef {
                    runner_id: "stdio".into(),
                    config: HashMap::new(),
                },
            }],
        };
        assert!(set.find("echo-skill").is_some());
        assert!(set.find("missing").is_none());
    }
}
