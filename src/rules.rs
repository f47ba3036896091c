//! Rule matching: path -> transform chain.
//!
//! Rules form an ordered list of (predicate, chain) pairs. The first rule
//! whose predicate accepts a path decides its chain; later rules are never
//! consulted for that path, even when they would also match.

use std::path::Path;

use regex::Regex;

use crate::config::{PackConfig, RuleConfig};
use crate::paths::to_slash;

/// What a rule matches against.
#[derive(Debug, Clone)]
pub enum RulePattern {
    /// Regular expression over the `/`-separated absolute path
    Regex(Regex),
    /// Plain suffix of the path
    Suffix(String),
}

impl RulePattern {
    fn is_match(&self, path: &str) -> bool {
        match self {
            RulePattern::Regex(re) => re.is_match(path),
            RulePattern::Suffix(suffix) => path.ends_with(suffix.as_str()),
        }
    }

    /// Pattern source text, for diagnostics.
    pub fn source(&self) -> &str {
        match self {
            RulePattern::Regex(re) => re.as_str(),
            RulePattern::Suffix(suffix) => suffix,
        }
    }
}

/// A single ordered rule.
#[derive(Debug, Clone)]
pub struct TransformRule {
    /// Position in declaration order
    pub index: usize,
    /// Inclusion pattern
    pub pattern: RulePattern,
    /// Optional exclusion pattern
    pub exclude: Option<Regex>,
    /// Transform ids in declaration order (closest to output first)
    pub chain: Vec<String>,
    /// Output extension for `files` mode
    pub emit_extension: Option<String>,
}

impl TransformRule {
    /// Build a rule from its configuration entry.
    ///
    /// Regexes are compiled here; configuration validation has already
    /// rejected invalid ones, so an error here is reported verbatim.
    pub fn from_config(index: usize, rule: &RuleConfig) -> Result<Self, regex::Error> {
        let pattern = match (&rule.test, &rule.suffix) {
            (Some(test), _) => RulePattern::Regex(Regex::new(test)?),
            (None, Some(suffix)) => RulePattern::Suffix(suffix.clone()),
            (None, None) => RulePattern::Suffix(String::new()),
        };
        let exclude = rule.exclude.as_deref().map(Regex::new).transpose()?;
        Ok(Self {
            index,
            pattern,
            exclude,
            chain: rule.uses.ids(),
            emit_extension: rule.emit_extension.clone(),
        })
    }

    /// Whether this rule accepts the given `/`-separated path.
    pub fn matches(&self, path: &str) -> bool {
        if !self.pattern.is_match(path) {
            return false;
        }
        !self.exclude.as_ref().is_some_and(|re| re.is_match(path))
    }
}

/// The result of matching a path.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    /// Winning rule, or `None` for pass-through
    pub rule: Option<&'a TransformRule>,
}

impl<'a> RuleMatch<'a> {
    /// The chain to apply; empty when no rule matched.
    pub fn chain(&self) -> &'a [String] {
        self.rule.map(|r| r.chain.as_slice()).unwrap_or(&[])
    }

    /// Output extension override of the winning rule.
    pub fn emit_extension(&self) -> Option<&'a str> {
        self.rule.and_then(|r| r.emit_extension.as_deref())
    }
}

/// Ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<TransformRule>,
}

impl RuleMatcher {
    /// Create a matcher from already-built rules.
    pub fn new(rules: Vec<TransformRule>) -> Self {
        Self { rules }
    }

    /// Compile the configured rules in declaration order.
    pub fn from_config(config: &PackConfig) -> Result<Self, regex::Error> {
        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| TransformRule::from_config(i, rule))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// All rules in declaration order.
    pub fn rules(&self) -> &[TransformRule] {
        &self.rules
    }

    /// Find the first matching rule for a file.
    pub fn match_path(&self, path: &Path) -> RuleMatch<'_> {
        let path = to_slash(path);
        RuleMatch { rule: self.rules.iter().find(|rule| rule.matches(&path)) }
    }

    /// The transform chain for a file; empty when no rule matches.
    pub fn chain_for(&self, path: &Path) -> &[String] {
        self.match_path(path).chain()
    }

    /// Every rule that accepts the path, in declaration order.
    ///
    /// Only the first of these is ever applied; the rest are shadowed.
    pub fn matching_rules(&self, path: &Path) -> Vec<&TransformRule> {
        let path = to_slash(path);
        self.rules.iter().filter(|rule| rule.matches(&path)).collect()
    }
}
