//! Policy evaluation engine: first-match-wins, default-deny.

use super::policy::{PolicyVerdict, ResolverPolicy};

/// Evaluate an environment package specifier against a [`ResolverPolicy`].
///
/// Runtime packages are always allowed. Otherwise the first rule covering the
/// specifier decides; with no match the specifier is **denied**.
pub fn evaluate_specifier(policy: &ResolverPolicy, specifier: &str) -> PolicyVerdict {
    if policy.is_runtime(specifier) {
        return PolicyVerdict::Allowed;
    }
    for rule in &policy.rules {
        if rule.matches(specifier) {
            return rule.verdict();
        }
    }

    PolicyVerdict::Denied {
        reason: format!("no resolver rule allows `{specifier}`"),
    }
}
