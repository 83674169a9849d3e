use crate::core::config::Config;
use crate::core::router::{Channel, Membership};
use crate::core::rule::{Rule, RuleAction, RuleId};
use chrono::{DateTime, Local, TimeZone};

pub fn rule(id: &str, pattern: &str, action: RuleAction) -> Rule {
    Rule::new(id, pattern, action).with_id(id)
}

/// 2024-03-09 09:30:00 local time.
pub fn fixed_time() -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 3, 9, 9, 30, 0)
        .single()
        .expect("unambiguous local time")
}

/// A small but realistic profile: a spam filter, name and mod colouring, a
/// mention sound and a staff tab fed by the mod rule.
pub fn sample_config() -> Config {
    let mut spam = rule("spam", r"spam\.example", RuleAction::Suppress);
    spam.name = "mute spam".into();

    let rules = vec![
        spam,
        rule(
            "names",
            r"^<(\w+)>",
            RuleAction::Colorize {
                color: "gold".into(),
            },
        ),
        rule(
            "mod-only",
            r"^\[Mod\]",
            RuleAction::Colorize {
                color: "red".into(),
            },
        ),
        rule(
            "ping",
            r"> .*\bSteve\b",
            RuleAction::PlaySound {
                sound: "block.note_block.pling".into(),
            },
        ),
    ];
    let rules = rules
        .into_iter()
        .enumerate()
        .map(|(order, rule)| Rule {
            order: order as i64,
            ..rule
        })
        .collect();

    let channels = vec![
        Channel::main("Main", "Main"),
        Channel::new(
            "Staff",
            Membership::Rules {
                rule_ids: vec![RuleId::from("mod-only")],
            },
        )
        .with_id("staff")
        .with_abbreviation("STF"),
    ];

    Config {
        rules,
        channels,
        ..Config::default()
    }
}
