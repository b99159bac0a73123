// # Access Policy
//
// Turns an ordered rule list plus a mode into an allow/deny verdict.
//
// ## Verdicts
//
// - Whitelist: Allow iff an enabled rule matches
// - Blacklist: Deny iff an enabled rule matches
//
// ## Degenerate cases
//
// - A policy with no rules at all allows. Stored rule sets always carry
//   at least one entry, so this only applies to hand-built policies.
// - A whitelist whose rules are all disabled denies. Disabling the only
//   whitelist rule must not open the gate.

use crate::acl::matcher::{AddressPattern, parse_source};
use crate::config::{AccessMode, AccessRuleSet};
use crate::error::Result;
use std::net::IpAddr;

/// Outcome of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The request may proceed
    Allow,
    /// The request must be rejected
    Deny,
}

impl Verdict {
    /// `true` for [`Verdict::Allow`]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// One rule of a policy: a list of patterns that can be switched off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    /// Disabled rules contribute no matches
    pub enabled: bool,
    /// Parsed entries
    pub patterns: Vec<AddressPattern>,
}

impl AccessRule {
    /// Parse entries into an enabled rule
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let patterns = entries
            .iter()
            .map(|entry| AddressPattern::parse(entry.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            enabled: true,
            patterns,
        })
    }

    fn matching(&self, source: &IpAddr) -> Option<&AddressPattern> {
        self.patterns.iter().find(|pattern| pattern.contains(source))
    }
}

/// An immutable snapshot of rules evaluated in one mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    mode: AccessMode,
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    /// Create a policy from already parsed rules
    pub fn new(mode: AccessMode, rules: Vec<AccessRule>) -> Self {
        Self { mode, rules }
    }

    /// Build a policy from a stored rule set
    ///
    /// The rule set is read once; later edits do not affect this policy.
    pub fn from_rule_set(rule_set: &AccessRuleSet) -> Result<Self> {
        let mut rule = AccessRule::parse(rule_set.entries.as_slice())?;
        rule.enabled = rule_set.enabled;
        Ok(Self::new(rule_set.mode, vec![rule]))
    }

    /// Policy mode
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Decide whether `source` may pass
    pub fn evaluate(&self, source: &str) -> Result<Verdict> {
        let source = parse_source(source)?;
        Ok(self.evaluate_addr(&source))
    }

    /// Decide for an already parsed address
    pub fn evaluate_addr(&self, source: &IpAddr) -> Verdict {
        if self.rules.is_empty() {
            return Verdict::Allow;
        }

        let matched = self
            .rules
            .iter()
            .filter(|rule| rule.enabled)
            .find_map(|rule| rule.matching(source));

        if let Some(pattern) = matched {
            tracing::debug!("{} matched {:?} entry {}", source, self.mode, pattern);
        }

        match (self.mode, matched.is_some()) {
            (AccessMode::Whitelist, true) | (AccessMode::Blacklist, false) => Verdict::Allow,
            (AccessMode::Whitelist, false) | (AccessMode::Blacklist, true) => Verdict::Deny,
        }
    }
}

/// Evaluate a single rule set against a source address
pub fn evaluate(rule_set: &AccessRuleSet, source: &str) -> Result<Verdict> {
    AccessPolicy::from_rule_set(rule_set)?.evaluate(source)
}

/// Evaluate rule sets independently; every one of them must allow
///
/// The source is parsed once, so a malformed address fails even when the
/// slice is empty.
pub fn evaluate_all(rule_sets: &[AccessRuleSet], source: &str) -> Result<Verdict> {
    let source = parse_source(source)?;
    for rule_set in rule_sets {
        let policy = AccessPolicy::from_rule_set(rule_set)?;
        if policy.evaluate_addr(&source) == Verdict::Deny {
            tracing::debug!("{} denied by rule set {}", source, rule_set.id);
            return Ok(Verdict::Deny);
        }
    }
    Ok(Verdict::Allow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn lan(mode: AccessMode) -> AccessRuleSet {
        AccessRuleSet::new("lan", mode, vec!["192.168.1.0/24".to_string()])
    }

    #[test]
    fn test_whitelist() {
        let rules = lan(AccessMode::Whitelist);
        assert_eq!(evaluate(&rules, "192.168.1.5").unwrap(), Verdict::Allow);
        assert_eq!(evaluate(&rules, "10.0.0.1").unwrap(), Verdict::Deny);
    }

    #[test]
    fn test_blacklist_inverts_whitelist() {
        let rules = lan(AccessMode::Blacklist);
        assert_eq!(evaluate(&rules, "192.168.1.5").unwrap(), Verdict::Deny);
        assert_eq!(evaluate(&rules, "10.0.0.1").unwrap(), Verdict::Allow);
    }

    #[test]
    fn test_disabled_whitelist_denies() {
        let rules = lan(AccessMode::Whitelist).with_enabled(false);
        assert_eq!(evaluate(&rules, "192.168.1.5").unwrap(), Verdict::Deny);
        assert_eq!(evaluate(&rules, "10.0.0.1").unwrap(), Verdict::Deny);
    }

    #[test]
    fn test_disabled_blacklist_allows() {
        let rules = lan(AccessMode::Blacklist).with_enabled(false);
        assert_eq!(evaluate(&rules, "192.168.1.5").unwrap(), Verdict::Allow);
    }

    #[test]
    fn test_policy_without_rules_allows() {
        for mode in [AccessMode::Whitelist, AccessMode::Blacklist] {
            let policy = AccessPolicy::new(mode, Vec::new());
            assert_eq!(policy.evaluate("203.0.113.9").unwrap(), Verdict::Allow);
        }
    }

    #[test]
    fn test_only_enabled_rules_match() {
        let mut disabled = AccessRule::parse(&["10.0.0.0/8"]).unwrap();
        disabled.enabled = false;
        let enabled = AccessRule::parse(&["192.168.0.0/16", "2001:db8::/32"]).unwrap();
        let policy = AccessPolicy::new(AccessMode::Whitelist, vec![disabled, enabled]);

        assert_eq!(policy.evaluate("10.1.1.1").unwrap(), Verdict::Deny);
        assert_eq!(policy.evaluate("192.168.44.1").unwrap(), Verdict::Allow);
        assert_eq!(policy.evaluate("2001:db8::42").unwrap(), Verdict::Allow);
    }

    #[test]
    fn test_malformed_source_fails_check() {
        for mode in [AccessMode::Whitelist, AccessMode::Blacklist] {
            let rules = lan(mode);
            assert!(matches!(
                evaluate(&rules, "not-an-address"),
                Err(Error::InvalidAddress(_))
            ));
        }
    }

    #[test]
    fn test_evaluate_all_requires_every_allow() {
        let office = lan(AccessMode::Whitelist);
        let banned = AccessRuleSet::new(
            "banned",
            AccessMode::Blacklist,
            vec!["192.168.1.13".to_string()],
        );
        let sets = vec![office, banned];

        assert_eq!(evaluate_all(&sets, "192.168.1.5").unwrap(), Verdict::Allow);
        assert_eq!(evaluate_all(&sets, "192.168.1.13").unwrap(), Verdict::Deny);
        assert_eq!(evaluate_all(&sets, "10.0.0.1").unwrap(), Verdict::Deny);
        assert_eq!(evaluate_all(&[], "10.0.0.1").unwrap(), Verdict::Allow);
        assert!(evaluate_all(&[], "bogus").is_err());
    }

    #[test]
    fn test_snapshot_is_independent_of_later_edits() {
        let mut rules = lan(AccessMode::Whitelist);
        let policy = AccessPolicy::from_rule_set(&rules).unwrap();
        rules.entries = vec!["10.0.0.0/8".to_string()];

        assert_eq!(policy.evaluate("192.168.1.5").unwrap(), Verdict::Allow);
        assert_eq!(policy.mode(), AccessMode::Whitelist);
    }
}
