//! Dotted-path rule matching
//!
//! Disable and cached-only policies are expressed as rule sets: lists of
//! dotted-path prefixes matched hierarchically against function identifiers,
//! plus a universal sentinel that matches everything.

use crate::identifier::FunctionIdentifier;

/// Sentinel values that turn a rule set into a match-everything switch
const UNIVERSAL_SENTINELS: [&str; 2] = ["1", "true"];

/// An ordered set of dotted-path prefix rules.
///
/// A rule matches an identifier when the identifier's leading segments equal
/// the rule's segments exactly: `a.b` matches `a.b` and `a.b.c`, but not
/// `a.bc` and not `a` under rule `a.b`. Matching is case-sensitive and has
/// no side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    prefixes: Vec<String>,
    universal: bool,
}

impl RuleSet {
    /// A rule set matching nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// A rule set matching every identifier
    pub fn all() -> Self {
        Self {
            prefixes: Vec::new(),
            universal: true,
        }
    }

    /// Build from explicit dotted-path prefixes
    pub fn from_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            universal: false,
        }
    }

    /// Parse the environment-variable form of a rule set.
    ///
    /// Empty input matches nothing, `1` or `true` matches everything, and
    /// anything else is a comma-separated list of dotted-path prefixes.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::none();
        }
        if UNIVERSAL_SENTINELS.contains(&raw) {
            return Self::all();
        }
        Self {
            prefixes: raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            universal: false,
        }
    }

    /// Whether any rule applies to the given identifier
    pub fn matches(&self, identifier: &FunctionIdentifier) -> bool {
        if self.universal {
            return true;
        }
        self.prefixes
            .iter()
            .any(|prefix| segment_prefix_matches(prefix, identifier.as_str()))
    }

    /// True when no rule can ever match
    pub fn is_empty(&self) -> bool {
        !self.universal && self.prefixes.is_empty()
    }
}

/// Hierarchical prefix check: the identifier equals the prefix, or starts
/// with it at a segment boundary. Substring matches do not count.
fn segment_prefix_matches(prefix: &str, identifier: &str) -> bool {
    match identifier.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ident(path: &str) -> FunctionIdentifier {
        FunctionIdentifier::new("", path)
    }

    #[test]
    fn test_exact_and_ancestor_prefixes_match() {
        let rules = RuleSet::from_prefixes(["a.b"]);
        assert!(rules.matches(&ident("a.b")));
        assert!(rules.matches(&ident("a.b.c")));
    }

    #[test]
    fn test_sibling_and_descendant_rules_do_not_match() {
        assert!(!RuleSet::from_prefixes(["a.bc"]).matches(&ident("a.b.c")));
        assert!(!RuleSet::from_prefixes(["a.b.c.d"]).matches(&ident("a.b.c")));
    }

    #[test]
    fn test_universal_sentinel_matches_everything() {
        assert!(RuleSet::parse("1").matches(&ident("anything.at.all")));
        assert!(RuleSet::parse("true").matches(&ident("x")));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        assert!(!RuleSet::parse("").matches(&ident("a.b")));
        assert!(RuleSet::parse("  ").is_empty());
    }

    #[test]
    fn test_parse_comma_separated_list() {
        let rules = RuleSet::parse("pkg.modx, other.f ,");
        assert!(rules.matches(&ident("pkg.modx.f")));
        assert!(rules.matches(&ident("other.f")));
        assert!(!rules.matches(&ident("pkg.other")));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert!(!RuleSet::from_prefixes(["Pkg.Modx"]).matches(&ident("pkg.modx.f")));
    }

    fn segments() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-z][a-z0-9_]{0,6}", 1..5)
    }

    proptest! {
        /// A rule equal to the identifier's leading segments always matches.
        #[test]
        fn prop_ancestor_prefix_always_matches(
            path in segments(),
            take in any::<prop::sample::Index>(),
        ) {
            let identifier = ident(&path.join("."));
            let len = take.index(path.len()) + 1;
            let rules = RuleSet::from_prefixes([path[..len].join(".")]);
            prop_assert!(rules.matches(&identifier));
        }

        /// A rule one segment deeper than the identifier never matches.
        #[test]
        fn prop_descendant_rule_never_matches(path in segments(), extra in "[a-z]{1,6}") {
            let identifier = ident(&path.join("."));
            let mut deeper = path.clone();
            deeper.push(extra);
            let rules = RuleSet::from_prefixes([deeper.join(".")]);
            prop_assert!(!rules.matches(&identifier));
        }
    }
}
