//! Formatters run over filtered text before it reaches the HUD.

use super::{option_bool, option_str, option_strings, Builtin, EntryOptions, Registry};
use crate::ui::span::StyledText;
use crate::utils::color::{parse_color, LegacyCode};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use ratatui::style::{Color, Modifier, Style};
use regex::{Regex, RegexBuilder};
use std::ops::Range;
use tracing::warn;

/// Per-message facts a formatter may use.
#[derive(Debug, Clone)]
pub struct FormatContext {
    pub received_at: DateTime<Local>,
}

impl FormatContext {
    pub fn now() -> Self {
        Self {
            received_at: Local::now(),
        }
    }
}

pub trait Formatter: Send + Sync {
    fn format(&self, text: StyledText, ctx: &FormatContext) -> StyledText;
}

impl Registry<dyn Formatter> {
    /// Fold `text` through every enabled formatter in order.
    pub fn apply(&self, text: StyledText, ctx: &FormatContext) -> StyledText {
        self.enabled()
            .fold(text, |text, formatter| formatter.format(text, ctx))
    }
}

pub const COLOR_CODES: &str = "color_codes";
pub const MENTION_HIGHLIGHT: &str = "mention_highlight";
pub const TIMESTAMP: &str = "timestamp";

pub(crate) fn builtins() -> Vec<Builtin<dyn Formatter>> {
    vec![
        Builtin {
            id: COLOR_CODES,
            enabled: true,
            options: EntryOptions::new(),
            factory: Box::new(|options: &EntryOptions| {
                Box::new(ColorCodes::from_options(options)) as Box<dyn Formatter>
            }),
        },
        Builtin {
            id: MENTION_HIGHLIGHT,
            enabled: false,
            options: EntryOptions::new(),
            factory: Box::new(|options: &EntryOptions| {
                Box::new(MentionHighlight::from_options(options)) as Box<dyn Formatter>
            }),
        },
        Builtin {
            id: TIMESTAMP,
            enabled: false,
            options: EntryOptions::new(),
            factory: Box::new(|options: &EntryOptions| {
                Box::new(Timestamp::from_options(options)) as Box<dyn Formatter>
            }),
        },
    ]
}

/// Turns legacy `§x` (and optionally `&x`) codes into styles and strips them.
///
/// Styles from codes only fill bytes no rule has coloured yet.
#[derive(Debug, Clone, Default)]
pub struct ColorCodes {
    ampersand: bool,
}

impl ColorCodes {
    pub fn from_options(options: &EntryOptions) -> Self {
        Self {
            ampersand: option_bool(options, "ampersand", false),
        }
    }

    fn is_marker(&self, c: char) -> bool {
        c == '§' || (self.ampersand && c == '&')
    }

    fn codes(&self, text: &str) -> Vec<(Range<usize>, LegacyCode)> {
        let mut codes = Vec::new();
        let mut chars = text.char_indices().peekable();
        while let Some((start, c)) = chars.next() {
            if !self.is_marker(c) {
                continue;
            }
            let Some(&(code_at, code_char)) = chars.peek() else {
                break;
            };
            if let Some(code) = LegacyCode::from_char(code_char.to_ascii_lowercase()) {
                chars.next();
                codes.push((start..code_at + code_char.len_utf8(), code));
            }
        }
        codes
    }
}

impl Formatter for ColorCodes {
    fn format(&self, mut text: StyledText, _ctx: &FormatContext) -> StyledText {
        let codes = self.codes(text.plain());
        if codes.is_empty() {
            return text;
        }

        let mut style = Style::default();
        for (index, (range, code)) in codes.iter().enumerate() {
            style = code.apply(style);
            let segment_end = codes
                .get(index + 1)
                .map_or(text.len(), |(next, _)| next.start);
            if style != Style::default() && range.end < segment_end {
                text.fill_unstyled(range.end..segment_end, style);
            }
        }
        for (range, _) in codes.iter().rev() {
            text.splice(range.clone(), "");
        }
        text
    }
}

/// Highlights configured names wherever they appear as whole words.
#[derive(Debug, Clone)]
pub struct MentionHighlight {
    pattern: Option<Regex>,
    style: Style,
}

impl MentionHighlight {
    pub fn from_options(options: &EntryOptions) -> Self {
        let names = option_strings(options, "names");
        let color = option_str(options, "color")
            .and_then(|name| {
                let parsed = parse_color(name);
                if parsed.is_none() {
                    warn!(color = %name, "unknown mention color; using yellow");
                }
                parsed
            })
            .unwrap_or(Color::Rgb(0xFF, 0xFF, 0x55));

        let pattern = if names.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = names.iter().map(|n| regex::escape(n)).collect();
            RegexBuilder::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
                .case_insensitive(true)
                .build()
                .map_err(|err| warn!(error = %err, "mention names do not form a valid pattern"))
                .ok()
        };

        Self {
            pattern,
            style: Style::default().fg(color).add_modifier(Modifier::BOLD),
        }
    }
}

impl Formatter for MentionHighlight {
    fn format(&self, mut text: StyledText, _ctx: &FormatContext) -> StyledText {
        let Some(pattern) = &self.pattern else {
            return text;
        };
        let ranges: Vec<_> = pattern.find_iter(text.plain()).map(|m| m.range()).collect();
        for range in ranges {
            text.style_range(range, self.style);
        }
        text
    }
}

const DEFAULT_TIME_FORMAT: &str = "%H:%M";
const DEFAULT_TIME_TEMPLATE: &str = "[%TIME%] ";

/// Prefixes each line with its local receive time.
#[derive(Debug, Clone)]
pub struct Timestamp {
    format: String,
    template: String,
    style: Style,
}

impl Timestamp {
    pub fn from_options(options: &EntryOptions) -> Self {
        let format = match option_str(options, "format") {
            Some(format) if valid_time_format(format) => format.to_string(),
            Some(format) => {
                warn!(format = %format, "invalid timestamp format; using {DEFAULT_TIME_FORMAT}");
                DEFAULT_TIME_FORMAT.to_string()
            }
            None => DEFAULT_TIME_FORMAT.to_string(),
        };
        let template = option_str(options, "template")
            .filter(|t| t.contains("%TIME%"))
            .unwrap_or(DEFAULT_TIME_TEMPLATE)
            .to_string();
        let color = option_str(options, "color")
            .and_then(parse_color)
            .unwrap_or(Color::Rgb(0xAA, 0xAA, 0xAA));

        Self {
            format,
            template,
            style: Style::default().fg(color),
        }
    }
}

fn valid_time_format(format: &str) -> bool {
    !format.is_empty() && StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}

impl Formatter for Timestamp {
    fn format(&self, text: StyledText, ctx: &FormatContext) -> StyledText {
        let time = ctx.received_at.format(&self.format).to_string();
        let mut stamped = StyledText::styled(self.template.replace("%TIME%", &time), self.style);
        stamped.append(text);
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::Registries;
    use chrono::TimeZone;

    fn ctx() -> FormatContext {
        FormatContext {
            received_at: Local
                .with_ymd_and_hms(2024, 3, 9, 14, 5, 30)
                .single()
                .expect("unambiguous local time"),
        }
    }

    fn options(pairs: &[(&str, toml::Value)]) -> EntryOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn color_codes_become_styles() {
        let out = ColorCodes::default().format(StyledText::new("§cRed §lbold§r plain"), &ctx());

        assert_eq!(out.plain(), "Red bold plain");
        let red = Style::default().fg(Color::Rgb(0xFF, 0x55, 0x55));
        assert_eq!(out.style_at(0), Some(red));
        assert_eq!(out.style_at(4), Some(red.add_modifier(Modifier::BOLD)));
        assert_eq!(out.style_at(9), None);
    }

    #[test]
    fn ampersand_codes_are_opt_in() {
        let text = StyledText::new("&aGreen");
        assert_eq!(ColorCodes::default().format(text.clone(), &ctx()).plain(), "&aGreen");

        let enabled = ColorCodes::from_options(&options(&[("ampersand", toml::Value::Boolean(true))]));
        let out = enabled.format(text, &ctx());
        assert_eq!(out.plain(), "Green");
        assert!(out.style_at(0).is_some());
    }

    #[test]
    fn rule_colors_win_over_codes() {
        let gold = Style::default().fg(Color::Rgb(0xFF, 0xAA, 0x00));
        let mut text = StyledText::new("§7<Steve> hi");
        text.style_range(3..10, gold);

        let out = ColorCodes::default().format(text, &ctx());
        assert_eq!(out.plain(), "<Steve> hi");
        assert_eq!(out.style_at(0), Some(gold));
        assert_eq!(out.style_at(8), Some(Style::default().fg(Color::Rgb(0xAA, 0xAA, 0xAA))));
    }

    #[test]
    fn trailing_and_unknown_markers_are_kept() {
        let out = ColorCodes::default().format(StyledText::new("50§ and §z"), &ctx());
        assert_eq!(out.plain(), "50§ and §z");
    }

    #[test]
    fn mentions_highlight_whole_words_only() {
        let names = toml::Value::Array(vec!["Steve".into()]);
        let formatter = MentionHighlight::from_options(&options(&[("names", names)]));
        let out = formatter.format(StyledText::new("hi steve, not Steven"), &ctx());

        assert!(out.style_at(3).is_some());
        assert!(out.style_at(14).is_none());
    }

    #[test]
    fn timestamp_prefixes_styled_time() {
        let formatter = Timestamp::from_options(&EntryOptions::new());
        let out = formatter.format(StyledText::new("hello"), &ctx());

        assert_eq!(out.plain(), "[14:05] hello");
        assert!(out.style_at(0).is_some());
        assert_eq!(out.style_at(8), None);
    }

    #[test]
    fn invalid_timestamp_format_falls_back() {
        let formatter = Timestamp::from_options(&options(&[
            ("format", toml::Value::String("%Q".into())),
            ("template", toml::Value::String("<%TIME%> ".into())),
        ]));
        let out = formatter.format(StyledText::new("x"), &ctx());
        assert_eq!(out.plain(), "<14:05> x");
    }

    #[test]
    fn registry_folds_enabled_formatters_in_order() {
        let mut registries = Registries::builtin();
        registries.formatters_mut().set_enabled(TIMESTAMP, true).unwrap();

        let out = registries
            .formatters()
            .apply(StyledText::new("§aok"), &ctx());
        assert_eq!(out.plain(), "[14:05] ok");

        registries.formatters_mut().set_enabled(COLOR_CODES, false).unwrap();
        let out = registries
            .formatters()
            .apply(StyledText::new("§aok"), &ctx());
        assert_eq!(out.plain(), "[14:05] §aok");
    }
}
