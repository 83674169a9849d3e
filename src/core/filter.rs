//! The filter engine: runs one incoming chat line through the rule list.
//!
//! Rules are evaluated in ascending `order`. Each rule matches against the
//! working text as left by the rules before it, so a `replace` early in the
//! list changes what later rules see. Colour runs recorded earlier are carried
//! through later replacements by [`StyledText::splice`].

use crate::core::router::ChannelId;
use crate::core::rule::{Rule, RuleAction, RuleId, RuleList};
use crate::ui::span::StyledText;
use crate::utils::color::parse_color;
use ratatui::style::Style;
use regex::Regex;
use std::ops::Range;
use tracing::{debug, warn};

/// A line that survived filtering, with everything the router and host need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMessage {
    pub original: String,
    pub text: StyledText,
    /// Explicit `route_to` targets, in the order the rules fired.
    pub route_hints: Vec<ChannelId>,
    pub matched_rules: Vec<RuleId>,
    /// Sound ids to play, one per matching `play_sound` rule.
    pub sounds: Vec<String>,
}

impl ProcessedMessage {
    fn unmodified(raw: &str) -> Self {
        Self {
            original: raw.to_string(),
            text: StyledText::new(raw),
            route_hints: Vec::new(),
            matched_rules: Vec::new(),
            sounds: Vec::new(),
        }
    }

    pub fn matched(&self, rule: &RuleId) -> bool {
        self.matched_rules.contains(rule)
    }
}

#[derive(Debug, Clone)]
enum CompiledAction {
    Replace { template: String, all: bool },
    Colorize(Style),
    RouteTo(ChannelId),
    PlaySound(String),
    Suppress,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    id: RuleId,
    regex: Regex,
    action: CompiledAction,
}

impl CompiledRule {
    /// `None` when persisted data no longer compiles; the caller skips it.
    fn compile(rule: &Rule) -> Option<Self> {
        let regex = match rule.compile() {
            Ok(regex) => regex,
            Err(err) => {
                warn!(rule = %rule.id, pattern = %rule.pattern, error = %err, "skipping rule with invalid pattern");
                return None;
            }
        };

        let action = match &rule.action {
            RuleAction::Replace { template, all } => CompiledAction::Replace {
                template: template.clone(),
                all: *all,
            },
            RuleAction::Colorize { color } => match parse_color(color) {
                Some(color) => CompiledAction::Colorize(Style::default().fg(color)),
                None => {
                    warn!(rule = %rule.id, color = %color, "skipping rule with unknown color");
                    return None;
                }
            },
            RuleAction::RouteTo { tab } => CompiledAction::RouteTo(tab.clone()),
            RuleAction::PlaySound { sound } => CompiledAction::PlaySound(sound.clone()),
            RuleAction::Suppress => CompiledAction::Suppress,
        };

        Some(Self {
            id: rule.id.clone(),
            regex,
            action,
        })
    }
}

/// Rules compiled once per edit and reused for every message.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    rules: Vec<CompiledRule>,
}

impl FilterEngine {
    /// Compile the enabled rules of `rules`, in list order.
    pub fn new(rules: &RuleList) -> Self {
        let rules = rules
            .iter()
            .filter(|rule| rule.enabled)
            .filter_map(CompiledRule::compile)
            .collect();
        Self { rules }
    }

    /// Number of rules that will actually run.
    pub fn active_rules(&self) -> usize {
        self.rules.len()
    }

    /// One-shot form for callers without a cached engine.
    pub fn process_with(raw: &str, rules: &RuleList) -> Vec<ProcessedMessage> {
        Self::new(rules).process(raw)
    }

    /// Run `raw` through every active rule.
    ///
    /// Returns an empty vector when a `suppress` rule matched and a single
    /// message otherwise.
    pub fn process(&self, raw: &str) -> Vec<ProcessedMessage> {
        let mut message = ProcessedMessage::unmodified(raw);

        for rule in &self.rules {
            let matched = match &rule.action {
                CompiledAction::Replace { template, all } => {
                    replace(&rule.regex, &mut message.text, template, *all)
                }
                CompiledAction::Colorize(style) => {
                    let found = rule.regex.find(message.text.plain()).map(|m| m.range());
                    match found {
                        Some(range) => {
                            message.text.style_range(range, *style);
                            true
                        }
                        None => false,
                    }
                }
                _ => rule.regex.is_match(message.text.plain()),
            };
            if !matched {
                continue;
            }

            message.matched_rules.push(rule.id.clone());
            match &rule.action {
                CompiledAction::RouteTo(tab) => {
                    if !message.route_hints.contains(tab) {
                        message.route_hints.push(tab.clone());
                    }
                }
                CompiledAction::PlaySound(sound) => message.sounds.push(sound.clone()),
                CompiledAction::Suppress => {
                    debug!(rule = %rule.id, "message suppressed");
                    return Vec::new();
                }
                CompiledAction::Replace { .. } | CompiledAction::Colorize(_) => {}
            }
        }

        vec![message]
    }
}

/// Substitute the first (or every) match, expanding capture references.
fn replace(regex: &Regex, text: &mut StyledText, template: &str, all: bool) -> bool {
    let limit = if all { usize::MAX } else { 1 };
    let edits: Vec<(Range<usize>, String)> = regex
        .captures_iter(text.plain())
        .take(limit)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let mut expanded = String::new();
            caps.expand(template, &mut expanded);
            Some((whole.range(), expanded))
        })
        .collect();

    for (range, replacement) in edits.iter().rev() {
        text.splice(range.clone(), replacement);
    }
    !edits.is_empty()
}
