use crate::core::hud::{Easing, FadeSettings, HudSettings};
use crate::core::registry::PersistedEntry;
use crate::core::router::Channel;
use crate::core::rule::Rule;
use crate::core::speakers::DEFAULT_OWNER_PATTERN;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Schema version written by this build.
pub const CONFIG_VERSION: u32 = 1;

pub const MIN_STORED_LINES: usize = 20;
pub const MAX_STORED_LINES: usize = 1000;
pub const MAX_SIDE_CHARS: usize = 10;
pub const MAX_STACK_DEPTH: usize = 20;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Clear every tab's history when the connection drops.
    pub clear_on_disconnect: bool,
    /// Merge repeated lines into one with a counter.
    pub stack_messages: bool,
    /// How many of the newest lines a repeat is compared against.
    pub stack_depth: usize,
    /// Group 1 captures the name of the player who sent a line.
    pub message_owner_regex: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            clear_on_disconnect: true,
            stack_messages: true,
            stack_depth: 1,
            message_owner_regex: DEFAULT_OWNER_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HudConfig {
    pub stored_lines: usize,
    pub visible_lines: usize,
    pub fade_start_ms: u64,
    pub fade_time_ms: u64,
    pub fade_easing: Easing,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            stored_lines: 200,
            visible_lines: 13,
            fade_start_ms: 5000,
            fade_time_ms: 2000,
            fade_easing: Easing::Linear,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TabsConfig {
    pub main_name: String,
    pub main_abbreviation: String,
    /// Characters of each tab abbreviation shown in the side bar.
    pub side_chars: usize,
}

impl Default for TabsConfig {
    fn default() -> Self {
        Self {
            main_name: "Main".to_string(),
            main_abbreviation: "Main".to_string(),
            side_chars: 3,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SuggestionsConfig {
    pub max_suggestions: usize,
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self { max_suggestions: 10 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub config_version: u32,
    pub general: GeneralConfig,
    pub hud: HudConfig,
    pub tabs: TabsConfig,
    pub suggestions: SuggestionsConfig,
    /// Filter rules in evaluation order.
    pub rules: Vec<Rule>,
    /// Tabs in display order.
    pub channels: Vec<Channel>,
    pub formatters: Vec<PersistedEntry>,
    pub suggestors: Vec<PersistedEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            general: GeneralConfig::default(),
            hud: HudConfig::default(),
            tabs: TabsConfig::default(),
            suggestions: SuggestionsConfig::default(),
            rules: Vec::new(),
            channels: Vec::new(),
            formatters: Vec::new(),
            suggestors: Vec::new(),
        }
    }
}

impl Config {
    pub fn hud_settings(&self) -> HudSettings {
        HudSettings {
            capacity: self
                .hud
                .stored_lines
                .clamp(MIN_STORED_LINES, MAX_STORED_LINES),
            viewport_lines: self.hud.visible_lines.max(1),
            stack_depth: if self.general.stack_messages {
                self.general.stack_depth.clamp(1, MAX_STACK_DEPTH)
            } else {
                0
            },
            fade: FadeSettings {
                fade_start: Duration::from_millis(self.hud.fade_start_ms),
                fade_time: Duration::from_millis(self.hud.fade_time_ms),
                easing: self.hud.fade_easing,
            },
        }
    }

    pub fn side_chars(&self) -> usize {
        self.tabs.side_chars.clamp(1, MAX_SIDE_CHARS)
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
