//! Tracks who has spoken recently, for player-name completion.

use crate::utils::color::strip_legacy_codes;
use regex::Regex;
use std::collections::VecDeque;
use tracing::warn;

pub const DEFAULT_OWNER_PATTERN: &str = "^<([A-Za-z0-9_§]{3,16})>";
const MAX_SPEAKERS: usize = 64;

#[derive(Debug, Clone)]
pub struct SpeakerTracker {
    pattern: Option<Regex>,
    recent: VecDeque<String>,
}

impl Default for SpeakerTracker {
    fn default() -> Self {
        Self::new(DEFAULT_OWNER_PATTERN)
    }
}

impl SpeakerTracker {
    /// `owner_pattern` must capture the speaker's name in group 1.
    pub fn new(owner_pattern: &str) -> Self {
        let pattern = match Regex::new(owner_pattern) {
            Ok(regex) if regex.captures_len() > 1 => Some(regex),
            Ok(_) => {
                warn!(pattern = %owner_pattern, "message owner pattern has no capture group; speaker tracking disabled");
                None
            }
            Err(err) => {
                warn!(pattern = %owner_pattern, error = %err, "invalid message owner pattern; speaker tracking disabled");
                None
            }
        };
        Self {
            pattern,
            recent: VecDeque::with_capacity(MAX_SPEAKERS),
        }
    }

    /// Record the speaker of a raw chat line, if the line has one.
    pub fn observe(&mut self, raw: &str) -> Option<&str> {
        let name = {
            let caps = self.pattern.as_ref()?.captures(raw)?;
            strip_legacy_codes(caps.get(1)?.as_str())
        };
        if name.is_empty() {
            return None;
        }
        self.recent.retain(|existing| *existing != name);
        self.recent.push_front(name);
        self.recent.truncate(MAX_SPEAKERS);
        self.recent.front().map(String::as_str)
    }

    /// Most recent first.
    pub fn recent(&self) -> Vec<String> {
        self.recent.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.recent.clear();
    }
}
