//! Suggestors complete the text being typed into the chat box.

use super::{option_bool, option_strings, Builtin, EntryOptions, Registry};
use std::collections::HashSet;

/// What a suggestor sees: the current input and the people recently heard.
#[derive(Debug, Clone, Copy)]
pub struct SuggestContext<'a> {
    pub input: &'a str,
    /// Most recent first.
    pub speakers: &'a [String],
}

/// A candidate completion. Accepting it replaces `input[start..]` with
/// `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub replacement: String,
    pub start: usize,
    pub hint: Option<String>,
}

impl Suggestion {
    /// The full input after accepting this suggestion.
    pub fn apply_to(&self, input: &str) -> String {
        let start = self.start.min(input.len());
        let start = (0..=start)
            .rev()
            .find(|i| input.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}{}", &input[..start], self.replacement)
    }
}

pub trait Suggestor: Send + Sync {
    fn suggest(&self, ctx: &SuggestContext<'_>) -> Vec<Suggestion>;
}

impl Registry<dyn Suggestor> {
    /// Concatenate suggestions from every enabled suggestor, dropping later
    /// duplicates of the same replacement, up to `limit` results.
    pub fn apply(&self, ctx: &SuggestContext<'_>, limit: usize) -> Vec<Suggestion> {
        let mut seen = HashSet::new();
        self.enabled()
            .flat_map(|suggestor| suggestor.suggest(ctx))
            .filter(|suggestion| seen.insert(suggestion.replacement.clone()))
            .take(limit)
            .collect()
    }
}

pub const COMMANDS: &str = "commands";
pub const PLAYERS: &str = "players";

const DEFAULT_COMMANDS: &[&str] = &[
    "/help", "/list", "/me", "/msg", "/r", "/reply", "/tell", "/w",
];

pub(crate) fn builtins() -> Vec<Builtin<dyn Suggestor>> {
    let mut command_options = EntryOptions::new();
    command_options.insert(
        "commands".into(),
        toml::Value::Array(
            DEFAULT_COMMANDS
                .iter()
                .map(|c| toml::Value::String(c.to_string()))
                .collect(),
        ),
    );
    let mut player_options = EntryOptions::new();
    player_options.insert("prune".into(), toml::Value::Boolean(true));

    vec![
        Builtin {
            id: COMMANDS,
            enabled: true,
            options: command_options,
            factory: Box::new(|options: &EntryOptions| {
                Box::new(CommandSuggestor::from_options(options)) as Box<dyn Suggestor>
            }),
        },
        Builtin {
            id: PLAYERS,
            enabled: true,
            options: player_options,
            factory: Box::new(|options: &EntryOptions| {
                Box::new(PlayerSuggestor::from_options(options)) as Box<dyn Suggestor>
            }),
        },
    ]
}

/// Completes a leading `/command` word.
#[derive(Debug, Clone)]
pub struct CommandSuggestor {
    commands: Vec<String>,
}

impl Default for CommandSuggestor {
    fn default() -> Self {
        Self {
            commands: DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl CommandSuggestor {
    pub fn from_options(options: &EntryOptions) -> Self {
        let commands: Vec<String> = option_strings(options, "commands")
            .into_iter()
            .map(|c| {
                if c.starts_with('/') {
                    c
                } else {
                    format!("/{c}")
                }
            })
            .collect();
        if commands.is_empty() {
            Self::default()
        } else {
            Self { commands }
        }
    }
}

impl Suggestor for CommandSuggestor {
    fn suggest(&self, ctx: &SuggestContext<'_>) -> Vec<Suggestion> {
        let input = ctx.input;
        if !input.starts_with('/') || input.contains(char::is_whitespace) {
            return Vec::new();
        }
        let lower = input.to_lowercase();
        let mut matches: Vec<&String> = self
            .commands
            .iter()
            .filter(|c| c.to_lowercase().starts_with(&lower))
            .collect();
        matches.sort();
        matches
            .into_iter()
            .map(|command| Suggestion {
                replacement: format!("{command} "),
                start: 0,
                hint: None,
            })
            .collect()
    }
}

/// Completes the word under the cursor from recently seen speakers.
#[derive(Debug, Clone)]
pub struct PlayerSuggestor {
    prune: bool,
}

impl PlayerSuggestor {
    pub fn from_options(options: &EntryOptions) -> Self {
        Self {
            prune: option_bool(options, "prune", true),
        }
    }
}

impl Suggestor for PlayerSuggestor {
    fn suggest(&self, ctx: &SuggestContext<'_>) -> Vec<Suggestion> {
        let input = ctx.input;
        // A bare command word is the command suggestor's job.
        if input.starts_with('/') && !input.contains(char::is_whitespace) {
            return Vec::new();
        }
        let start = input
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map_or(0, |(i, c)| i + c.len_utf8());
        let prefix = input[start..].to_lowercase();

        let mut seen = HashSet::new();
        ctx.speakers
            .iter()
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .filter(|name| !self.prune || seen.insert(name.to_lowercase()))
            .map(|name| Suggestion {
                replacement: name.clone(),
                start,
                hint: Some("player".to_string()),
            })
            .collect()
    }
}
