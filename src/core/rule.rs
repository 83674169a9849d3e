//! Filter rules and the ordered rule list edited by the configuration surface.

use crate::core::error::ValidationError;
use crate::core::router::ChannelId;
use crate::utils::color::parse_color;
use crate::utils::ids::random_token;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Compiled-size ceiling for user patterns.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(random_token("rule"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// What a rule does to a line it matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleAction {
    /// Substitute the match using `$1`/`${name}` capture references.
    Replace {
        template: String,
        /// Replace every match instead of only the first.
        #[serde(default)]
        all: bool,
    },
    Colorize {
        color: String,
    },
    RouteTo {
        tab: ChannelId,
    },
    PlaySound {
        sound: String,
    },
    /// Drop the line entirely.
    Suppress,
}

impl RuleAction {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleAction::Replace { .. } => "replace",
            RuleAction::Colorize { .. } => "colorize",
            RuleAction::RouteTo { .. } => "route_to",
            RuleAction::PlaySound { .. } => "play_sound",
            RuleAction::Suppress => "suppress",
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "RuleId::generate")]
    pub id: RuleId,
    #[serde(default)]
    pub name: String,
    pub pattern: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    pub action: RuleAction,
}

impl Rule {
    /// A new enabled, case-sensitive rule with a fresh id.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, action: RuleAction) -> Self {
        Self {
            id: RuleId::generate(),
            name: name.into(),
            pattern: pattern.into(),
            enabled: true,
            order: 0,
            case_sensitive: true,
            action,
        }
    }

    pub fn with_id(mut self, id: impl Into<RuleId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn compile(&self) -> Result<Regex, regex::Error> {
        compile_pattern(&self.pattern, self.case_sensitive)
    }

    /// Reject a rule the engine could not run as written.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "id" });
        }
        if self.pattern.is_empty() {
            return Err(ValidationError::EmptyField { field: "pattern" });
        }
        self.compile()
            .map_err(|err| ValidationError::InvalidPattern {
                pattern: self.pattern.clone(),
                reason: err.to_string(),
            })?;

        match &self.action {
            RuleAction::Replace { .. } | RuleAction::Suppress => Ok(()),
            RuleAction::Colorize { color } => parse_color(color)
                .map(|_| ())
                .ok_or_else(|| ValidationError::UnknownColor(color.clone())),
            RuleAction::RouteTo { tab } if tab.as_str().trim().is_empty() => {
                Err(ValidationError::EmptyField { field: "tab" })
            }
            RuleAction::RouteTo { .. } => Ok(()),
            RuleAction::PlaySound { sound } if sound.trim().is_empty() => {
                Err(ValidationError::EmptyField { field: "sound" })
            }
            RuleAction::PlaySound { .. } => Ok(()),
        }
    }
}

pub(crate) fn compile_pattern(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
}

/// Rules kept sorted by ascending, unique `order`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleList {
    rules: Vec<Rule>,
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted records, repairing duplicate ids. Orders are
    /// renumbered to `0..len` after sorting, whatever values were stored.
    ///
    /// Records are not validated here: a rule whose pattern no longer compiles
    /// is kept so it can be fixed, and the engine skips it at run time.
    pub fn from_rules(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|rule| rule.order);

        let mut seen = std::collections::HashSet::new();
        for rule in &mut rules {
            if !seen.insert(rule.id.clone()) {
                let fresh = RuleId::generate();
                warn!(rule = %rule.id, replacement = %fresh, "duplicate rule id; assigning a new one");
                rule.id = fresh;
                seen.insert(rule.id.clone());
            }
        }

        if rules.windows(2).any(|pair| pair[0].order == pair[1].order) {
            warn!("duplicate rule order values; renumbering");
        }
        let mut list = Self { rules };
        list.renumber();
        list
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn as_slice(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.iter().find(|rule| &rule.id == id)
    }

    /// Look a rule up by id, falling back to a case-insensitive name match.
    pub fn find(&self, id_or_name: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|rule| rule.id.as_str() == id_or_name)
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|rule| rule.name.eq_ignore_ascii_case(id_or_name))
            })
    }

    /// Validate and append `rule` after every existing rule.
    pub fn add(&mut self, mut rule: Rule) -> Result<RuleId, ValidationError> {
        rule.validate()?;
        if self.get(&rule.id).is_some() {
            return Err(ValidationError::DuplicateId(rule.id.to_string()));
        }
        rule.order = self.next_order();
        let id = rule.id.clone();
        self.rules.push(rule);
        Ok(id)
    }

    /// Deleting is the only way a rule leaves the list; disabling keeps it.
    pub fn remove(&mut self, id: &RuleId) -> Result<Rule, ValidationError> {
        let index = self.index_of(id)?;
        Ok(self.rules.remove(index))
    }

    pub fn set_enabled(&mut self, id: &RuleId, enabled: bool) -> Result<(), ValidationError> {
        let index = self.index_of(id)?;
        self.rules[index].enabled = enabled;
        Ok(())
    }

    /// Replace the stored rule with the same id, keeping its position.
    pub fn update(&mut self, mut rule: Rule) -> Result<(), ValidationError> {
        rule.validate()?;
        let index = self.index_of(&rule.id)?;
        rule.order = self.rules[index].order;
        self.rules[index] = rule;
        Ok(())
    }

    /// Move a rule to `index` in evaluation order and renumber every rule.
    pub fn move_to(&mut self, id: &RuleId, index: usize) -> Result<(), ValidationError> {
        let from = self.index_of(id)?;
        let rule = self.rules.remove(from);
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
        self.renumber();
        Ok(())
    }

    pub fn into_vec(self) -> Vec<Rule> {
        self.rules
    }

    fn next_order(&self) -> i64 {
        self.rules
            .last()
            .map_or(0, |rule| rule.order.saturating_add(1))
    }

    fn renumber(&mut self) {
        for (order, rule) in self.rules.iter_mut().enumerate() {
            rule.order = order as i64;
        }
    }

    fn index_of(&self, id: &RuleId) -> Result<usize, ValidationError> {
        self.rules
            .iter()
            .position(|rule| &rule.id == id)
            .ok_or_else(|| ValidationError::UnknownRule(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colorize(name: &str, pattern: &str) -> Rule {
        Rule::new(
            name,
            pattern,
            RuleAction::Colorize {
                color: "gold".into(),
            },
        )
        .with_id(name)
    }

    #[test]
    fn validate_rejects_bad_patterns_and_fields() {
        let bad = colorize("bad", "(unclosed");
        assert!(matches!(
            bad.validate(),
            Err(ValidationError::InvalidPattern { .. })
        ));

        let empty = colorize("empty", "");
        assert_eq!(
            empty.validate(),
            Err(ValidationError::EmptyField { field: "pattern" })
        );

        let color = Rule::new(
            "color",
            "x",
            RuleAction::Colorize {
                color: "sparkly".into(),
            },
        );
        assert_eq!(
            color.validate(),
            Err(ValidationError::UnknownColor("sparkly".into()))
        );

        let sound = Rule::new(
            "sound",
            "x",
            RuleAction::PlaySound {
                sound: " ".into(),
            },
        );
        assert_eq!(
            sound.validate(),
            Err(ValidationError::EmptyField { field: "sound" })
        );
    }

    #[test]
    fn add_appends_with_increasing_order() {
        let mut list = RuleList::new();
        list.add(colorize("a", "a")).unwrap();
        list.add(colorize("b", "b")).unwrap();
        list.add(colorize("c", "c")).unwrap();

        let orders: Vec<_> = list.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(
            list.add(colorize("a", "again")),
            Err(ValidationError::DuplicateId("a".into()))
        );
    }

    #[test]
    fn invalid_rule_is_not_added() {
        let mut list = RuleList::new();
        assert!(list.add(colorize("bad", "[")).is_err());
        assert!(list.is_empty());
    }

    #[test]
    fn move_to_renumbers() {
        let mut list = RuleList::new();
        for name in ["a", "b", "c"] {
            list.add(colorize(name, name)).unwrap();
        }
        list.move_to(&RuleId::from("c"), 0).unwrap();

        let ids: Vec<_> = list.iter().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        let orders: Vec<_> = list.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn disabling_keeps_the_rule() {
        let mut list = RuleList::new();
        list.add(colorize("a", "a")).unwrap();
        list.set_enabled(&RuleId::from("a"), false).unwrap();

        assert_eq!(list.len(), 1);
        assert!(!list.get(&RuleId::from("a")).unwrap().enabled);
        assert_eq!(
            list.set_enabled(&RuleId::from("zz"), true),
            Err(ValidationError::UnknownRule("zz".into()))
        );
    }

    #[test]
    fn update_keeps_position() {
        let mut list = RuleList::new();
        list.add(colorize("a", "a")).unwrap();
        list.add(colorize("b", "b")).unwrap();

        let mut edited = list.get(&RuleId::from("a")).unwrap().clone();
        edited.pattern = "alpha".into();
        edited.order = 99;
        list.update(edited).unwrap();

        let first = &list.as_slice()[0];
        assert_eq!(first.pattern, "alpha");
        assert_eq!(first.order, 0);
    }

    #[test]
    fn from_rules_sorts_and_repairs_duplicates() {
        let mut a = colorize("a", "a");
        a.order = 5;
        let mut b = colorize("b", "b");
        b.order = 1;
        let mut dup = colorize("a", "again");
        dup.order = 5;

        let list = RuleList::from_rules(vec![a, b, dup]);
        let orders: Vec<_> = list.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(list.as_slice()[0].id.as_str(), "b");
        assert_ne!(list.as_slice()[1].id, list.as_slice()[2].id);
    }

    #[test]
    fn extreme_stored_orders_leave_room_to_append() {
        let mut last = colorize("last", "z");
        last.order = i64::MAX;
        let mut first = colorize("first", "a");
        first.order = i64::MIN;

        let mut list = RuleList::from_rules(vec![last, first]);
        list.add(colorize("new", "n")).unwrap();

        let ids: Vec<_> = list.iter().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["first", "last", "new"]);
        let orders: Vec<_> = list.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn find_matches_id_then_name() {
        let mut list = RuleList::new();
        let mut rule = colorize("r1", "x");
        rule.name = "Mentions".into();
        list.add(rule).unwrap();

        assert!(list.find("r1").is_some());
        assert!(list.find("mentions").is_some());
        assert!(list.find("other").is_none());
    }

    #[test]
    fn case_insensitive_rules_compile_accordingly() {
        let rule = colorize("a", "steve").case_insensitive();
        assert!(rule.compile().unwrap().is_match("STEVE joined"));
    }
}
