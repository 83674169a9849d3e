//! Channels (tabs) and the router that assigns filtered messages to them.

use crate::core::error::ValidationError;
use crate::core::filter::ProcessedMessage;
use crate::core::rule::{compile_pattern, RuleId};
use crate::utils::ids::random_token;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(random_token("tab"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Which messages a non-main channel claims on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Membership {
    /// Only messages explicitly routed here by a `route_to` rule.
    #[default]
    Hints,
    /// Messages matched by any of these rules.
    Rules { rule_ids: Vec<RuleId> },
    /// Messages whose filtered text matches the pattern.
    Pattern {
        pattern: String,
        #[serde(default = "default_true")]
        case_sensitive: bool,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default = "ChannelId::generate")]
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
    #[serde(default)]
    pub is_main: bool,
    /// Text pre-filled in the input box while this tab is active.
    #[serde(default)]
    pub starting_message: String,
    #[serde(default)]
    pub membership: Membership,
}

impl Channel {
    pub fn new(name: impl Into<String>, membership: Membership) -> Self {
        Self {
            id: ChannelId::generate(),
            name: name.into(),
            abbreviation: String::new(),
            is_main: false,
            starting_message: String::new(),
            membership,
        }
    }

    pub fn main(name: impl Into<String>, abbreviation: impl Into<String>) -> Self {
        Self {
            id: ChannelId::new("main"),
            name: name.into(),
            abbreviation: abbreviation.into(),
            is_main: true,
            starting_message: String::new(),
            membership: Membership::Hints,
        }
    }

    pub fn with_id(mut self, id: impl Into<ChannelId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.abbreviation = abbreviation.into();
        self
    }

    /// The abbreviation (or name when blank), cut to `max_chars` graphemes.
    pub fn display_abbreviation(&self, max_chars: usize) -> String {
        let source = if self.abbreviation.trim().is_empty() {
            self.name.as_str()
        } else {
            self.abbreviation.as_str()
        };
        source.graphemes(true).take(max_chars.max(1)).collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "id" });
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "name" });
        }
        if let Membership::Pattern {
            pattern,
            case_sensitive,
        } = &self.membership
        {
            if pattern.is_empty() {
                return Err(ValidationError::EmptyField { field: "pattern" });
            }
            compile_pattern(pattern, *case_sensitive).map_err(|err| {
                ValidationError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: err.to_string(),
                }
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Hints,
    Rules(Vec<RuleId>),
    Pattern(Regex),
}

impl Predicate {
    fn compile(channel: &Channel) -> Self {
        match &channel.membership {
            Membership::Hints => Predicate::Hints,
            Membership::Rules { rule_ids } => Predicate::Rules(rule_ids.clone()),
            Membership::Pattern {
                pattern,
                case_sensitive,
            } => match compile_pattern(pattern, *case_sensitive) {
                Ok(regex) => Predicate::Pattern(regex),
                Err(err) => {
                    warn!(tab = %channel.id, pattern = %pattern, error = %err, "tab pattern does not compile; tab only receives routed messages");
                    Predicate::Hints
                }
            },
        }
    }

    fn matches(&self, message: &ProcessedMessage) -> bool {
        match self {
            Predicate::Hints => false,
            Predicate::Rules(ids) => ids.iter().any(|id| message.matched(id)),
            Predicate::Pattern(regex) => regex.is_match(message.text.plain()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDirection {
    Forward,
    Backward,
}

/// Owns the ordered channel list and the active pointer.
#[derive(Debug, Clone)]
pub struct TabRouter {
    channels: Vec<Channel>,
    predicates: Vec<Predicate>,
    active: ChannelId,
    unread: HashMap<ChannelId, usize>,
}

impl TabRouter {
    /// Build a router from persisted channels.
    ///
    /// Guarantees exactly one main channel: a missing one is created from
    /// `main_name`/`main_abbreviation` at the front, extra ones are demoted.
    /// Invalid or duplicate records are dropped with a warning.
    pub fn new(channels: Vec<Channel>, main_name: &str, main_abbreviation: &str) -> Self {
        let mut kept: Vec<Channel> = Vec::with_capacity(channels.len() + 1);
        let mut has_main = false;
        for mut channel in channels {
            if let Err(err) = channel.validate() {
                warn!(tab = %channel.id, error = %err, "skipping invalid tab");
                continue;
            }
            if kept.iter().any(|c| c.id == channel.id) {
                warn!(tab = %channel.id, "skipping tab with duplicate id");
                continue;
            }
            if channel.is_main {
                if has_main {
                    warn!(tab = %channel.id, "second main tab demoted");
                    channel.is_main = false;
                } else {
                    has_main = true;
                }
            }
            kept.push(channel);
        }

        if !has_main {
            let mut main = Channel::main(main_name, main_abbreviation);
            while kept.iter().any(|c| c.id == main.id) {
                main.id = ChannelId::generate();
            }
            kept.insert(0, main);
        }

        let predicates = kept.iter().map(Predicate::compile).collect();
        let active = kept
            .iter()
            .find(|c| c.is_main)
            .map(|c| c.id.clone())
            .unwrap_or_else(|| ChannelId::new("main"));

        Self {
            channels: kept,
            predicates,
            active,
            unread: HashMap::new(),
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn get(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| &c.id == id)
    }

    /// Look a channel up by id, then by case-insensitive name.
    pub fn find(&self, id_or_name: &str) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|c| c.id.as_str() == id_or_name)
            .or_else(|| {
                self.channels
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(id_or_name))
            })
    }

    pub fn main_channel(&self) -> &Channel {
        // `new` and every edit keep exactly one main channel in the list.
        self.channels
            .iter()
            .find(|c| c.is_main)
            .unwrap_or(&self.channels[0])
    }

    pub fn active(&self) -> &Channel {
        self.get(&self.active)
            .unwrap_or_else(|| self.main_channel())
    }

    pub fn active_id(&self) -> &ChannelId {
        &self.active
    }

    /// Decide which channels receive `message`.
    ///
    /// The result is the union of known routing hints and every non-main
    /// channel whose predicate matches, in channel order. When that union is
    /// empty the main channel receives the message.
    pub fn route(&self, message: &ProcessedMessage) -> Vec<ChannelId> {
        for hint in &message.route_hints {
            if self.get(hint).is_none() {
                debug!(tab = %hint, "ignoring routing hint for unknown tab");
            }
        }

        let targets: Vec<ChannelId> = self
            .channels
            .iter()
            .zip(&self.predicates)
            .filter(|(channel, predicate)| {
                message.route_hints.contains(&channel.id)
                    || (!channel.is_main && predicate.matches(message))
            })
            .map(|(channel, _)| channel.id.clone())
            .collect();

        if targets.is_empty() {
            vec![self.main_channel().id.clone()]
        } else {
            targets
        }
    }

    /// Count a delivery towards the unread badge of inactive channels.
    pub fn mark_delivered(&mut self, targets: &[ChannelId]) {
        for id in targets {
            if *id != self.active {
                *self.unread.entry(id.clone()).or_default() += 1;
            }
        }
    }

    pub fn unread(&self, id: &ChannelId) -> usize {
        self.unread.get(id).copied().unwrap_or(0)
    }

    /// Move the active pointer one step, wrapping at either end.
    pub fn cycle_active(&mut self, direction: CycleDirection) -> &Channel {
        let len = self.channels.len();
        let current = self
            .channels
            .iter()
            .position(|c| c.id == self.active)
            .unwrap_or(0);
        let next = match direction {
            CycleDirection::Forward => (current + 1) % len,
            CycleDirection::Backward => (current + len - 1) % len,
        };
        let id = self.channels[next].id.clone();
        self.activate(id);
        self.active()
    }

    /// Select a channel; an unknown id selects main and returns `false`.
    pub fn set_active(&mut self, id: &ChannelId) -> bool {
        if self.get(id).is_some() {
            self.activate(id.clone());
            true
        } else {
            debug!(tab = %id, "unknown tab selected; falling back to main");
            let main = self.main_channel().id.clone();
            self.activate(main);
            false
        }
    }

    /// Append a new non-main channel.
    pub fn add_channel(&mut self, channel: Channel) -> Result<ChannelId, ValidationError> {
        channel.validate()?;
        if channel.is_main {
            return Err(ValidationError::DuplicateMain);
        }
        if self.get(&channel.id).is_some() {
            return Err(ValidationError::DuplicateId(channel.id.to_string()));
        }
        let id = channel.id.clone();
        self.predicates.push(Predicate::compile(&channel));
        self.channels.push(channel);
        Ok(id)
    }

    /// Delete a channel. The main channel cannot be removed; removing the
    /// active channel makes main active.
    pub fn remove_channel(&mut self, id: &ChannelId) -> Result<Channel, ValidationError> {
        let index = self.index_of(id)?;
        if self.channels[index].is_main {
            return Err(ValidationError::MainChannelRemoval);
        }
        self.predicates.remove(index);
        let removed = self.channels.remove(index);
        self.unread.remove(id);
        if self.active == removed.id {
            self.active = self.main_channel().id.clone();
        }
        Ok(removed)
    }

    /// Replace the stored channel with the same id, keeping its position and
    /// main flag.
    pub fn update_channel(&mut self, mut channel: Channel) -> Result<(), ValidationError> {
        channel.validate()?;
        let index = self.index_of(&channel.id)?;
        let was_main = self.channels[index].is_main;
        if channel.is_main && !was_main {
            return Err(ValidationError::DuplicateMain);
        }
        if was_main && !channel.is_main {
            return Err(ValidationError::MainChannelRemoval);
        }
        channel.is_main = was_main;
        self.predicates[index] = Predicate::compile(&channel);
        self.channels[index] = channel;
        Ok(())
    }

    pub fn move_channel(&mut self, id: &ChannelId, index: usize) -> Result<(), ValidationError> {
        let from = self.index_of(id)?;
        let channel = self.channels.remove(from);
        let predicate = self.predicates.remove(from);
        let index = index.min(self.channels.len());
        self.channels.insert(index, channel);
        self.predicates.insert(index, predicate);
        Ok(())
    }

    /// Take over the active selection and unread counts of `previous` for
    /// channels that still exist here.
    pub fn carry_view_from(&mut self, previous: &TabRouter) {
        for (id, count) in &previous.unread {
            if self.get(id).is_some() {
                self.unread.insert(id.clone(), *count);
            }
        }
        let active = match self.get(&previous.active) {
            Some(channel) => channel.id.clone(),
            None => self.main_channel().id.clone(),
        };
        self.activate(active);
    }

    fn activate(&mut self, id: ChannelId) {
        self.unread.remove(&id);
        self.active = id;
    }

    fn index_of(&self, id: &ChannelId) -> Result<usize, ValidationError> {
        self.channels
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| ValidationError::UnknownChannel(id.to_string()))
    }
}
