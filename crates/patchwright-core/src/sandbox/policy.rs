//! Resolver policy: which packages a sandboxed module may load from the
//! runner's environment.

use serde::{Deserialize, Serialize};

/// A single rule matching a package specifier prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolverRule {
    Allow { package: String },
    Deny { package: String, reason: String },
}

impl ResolverRule {
    pub fn allow(package: impl Into<String>) -> Self {
        ResolverRule::Allow {
            package: package.into(),
        }
    }

    pub fn deny(package: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolverRule::Deny {
            package: package.into(),
            reason: reason.into(),
        }
    }

    fn package(&self) -> &str {
        match self {
            ResolverRule::Allow { package } | ResolverRule::Deny { package, .. } => package,
        }
    }

    /// Returns `true` if this rule covers `specifier` (the package itself or
    /// one of its subpaths).
    pub fn matches(&self, specifier: &str) -> bool {
        covers(self.package(), specifier)
    }

    pub fn verdict(&self) -> PolicyVerdict {
        match self {
            ResolverRule::Allow { .. } => PolicyVerdict::Allowed,
            ResolverRule::Deny { reason, .. } => PolicyVerdict::Denied {
                reason: reason.clone(),
            },
        }
    }
}

/// Outcome of evaluating a specifier against a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyVerdict {
    Allowed,
    Denied { reason: String },
}

impl PolicyVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyVerdict::Allowed)
    }
}

/// Runtime packages plus an ordered rule list, evaluated first-match-wins.
///
/// Runtime packages are always resolvable. Anything else not matched by a
/// rule is **denied** and ends up stubbed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Framework runtime packages, e.g. `svelte` (covers `svelte/internal`).
    pub runtime: Vec<String>,
    pub rules: Vec<ResolverRule>,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            runtime: vec!["svelte".to_string()],
            rules: Vec::new(),
        }
    }
}

impl ResolverPolicy {
    /// A policy with no runtime packages and no rules: everything is stubbed.
    pub fn empty() -> Self {
        Self {
            runtime: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_runtime(mut self, package: impl Into<String>) -> Self {
        self.runtime.push(package.into());
        self
    }

    pub fn with_rule(mut self, rule: ResolverRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Allow-list from a comma separated package list (`"clsx,date-fns"`).
    pub fn allowing_csv(mut self, csv: &str) -> Self {
        self.rules.extend(
            csv.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ResolverRule::allow),
        );
        self
    }

    pub fn is_runtime(&self, specifier: &str) -> bool {
        self.runtime.iter().any(|pkg| covers(pkg, specifier))
    }
}

fn covers(package: &str, specifier: &str) -> bool {
    specifier == package
        || specifier
            .strip_prefix(package)
            .is_some_and(|rest| rest.starts_with('/'))
}
