//! Portable text blobs for sharing a single rule or tab.
//!
//! A blob is one line of JSON tagged with its `kind` and a format `version`.
//! Ids and ordering are not part of a blob: importing always creates a new
//! record appended at the end of the destination list.

use crate::core::error::ValidationError;
use crate::core::router::{Channel, ChannelId, Membership};
use crate::core::rule::{Rule, RuleAction, RuleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

const BLOB_VERSION: u32 = 1;
const RULE_KIND: &str = "rule";
const TAB_KIND: &str = "tab";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    Empty,
    Malformed(String),
    WrongKind {
        expected: &'static str,
        found: String,
    },
    Invalid(ValidationError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Empty => write!(f, "Nothing to import"),
            ImportError::Malformed(reason) => write!(f, "Not a valid shared blob: {reason}"),
            ImportError::WrongKind { expected, found } => {
                write!(f, "Expected a shared {expected}, found '{found}'")
            }
            ImportError::Invalid(err) => write!(f, "Shared record is invalid: {err}"),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Invalid(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for ImportError {
    fn from(err: ValidationError) -> Self {
        ImportError::Invalid(err)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
struct RuleBlob {
    kind: String,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    name: String,
    pattern: String,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_true")]
    case_sensitive: bool,
    action: RuleAction,
}

#[derive(Debug, Serialize, Deserialize)]
struct TabBlob {
    kind: String,
    #[serde(default)]
    version: u32,
    name: String,
    #[serde(default)]
    abbreviation: String,
    #[serde(default)]
    starting_message: String,
    #[serde(default)]
    membership: Membership,
}

pub fn export_rule(rule: &Rule) -> serde_json::Result<String> {
    serde_json::to_string(&RuleBlob {
        kind: RULE_KIND.to_string(),
        version: BLOB_VERSION,
        name: rule.name.clone(),
        pattern: rule.pattern.clone(),
        enabled: rule.enabled,
        case_sensitive: rule.case_sensitive,
        action: rule.action.clone(),
    })
}

pub fn export_channel(channel: &Channel) -> serde_json::Result<String> {
    serde_json::to_string(&TabBlob {
        kind: TAB_KIND.to_string(),
        version: BLOB_VERSION,
        name: channel.name.clone(),
        abbreviation: channel.abbreviation.clone(),
        starting_message: channel.starting_message.clone(),
        membership: channel.membership.clone(),
    })
}

/// Parse and validate a rule blob. The rule gets a fresh id; nothing is
/// added anywhere until the caller appends it.
pub fn import_rule(blob: &str) -> Result<Rule, ImportError> {
    let value = parse_tagged(blob, RULE_KIND)?;
    let blob: RuleBlob =
        serde_json::from_value(value).map_err(|err| ImportError::Malformed(err.to_string()))?;
    let rule = Rule {
        id: RuleId::generate(),
        name: blob.name,
        pattern: blob.pattern,
        enabled: blob.enabled,
        order: 0,
        case_sensitive: blob.case_sensitive,
        action: blob.action,
    };
    rule.validate()?;
    Ok(rule)
}

/// Parse and validate a tab blob. Imported tabs are never the main tab.
pub fn import_channel(blob: &str) -> Result<Channel, ImportError> {
    let value = parse_tagged(blob, TAB_KIND)?;
    let blob: TabBlob =
        serde_json::from_value(value).map_err(|err| ImportError::Malformed(err.to_string()))?;
    let channel = Channel {
        id: ChannelId::generate(),
        name: blob.name,
        abbreviation: blob.abbreviation,
        is_main: false,
        starting_message: blob.starting_message,
        membership: blob.membership,
    };
    channel.validate()?;
    Ok(channel)
}

fn parse_tagged(blob: &str, expected: &'static str) -> Result<serde_json::Value, ImportError> {
    let blob = blob.trim();
    if blob.is_empty() {
        return Err(ImportError::Empty);
    }
    let value: serde_json::Value =
        serde_json::from_str(blob).map_err(|err| ImportError::Malformed(err.to_string()))?;

    let kind = value
        .get("kind")
        .and_then(|kind| kind.as_str())
        .ok_or_else(|| ImportError::Malformed("missing \"kind\"".to_string()))?;
    if kind != expected {
        return Err(ImportError::WrongKind {
            expected,
            found: kind.to_string(),
        });
    }

    let version = value
        .get("version")
        .and_then(|version| version.as_u64())
        .unwrap_or(u64::from(BLOB_VERSION));
    if version > u64::from(BLOB_VERSION) {
        warn!(version, "shared blob is from a newer version; importing known fields");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> Rule {
        Rule {
            id: RuleId::from("r-1"),
            name: "Owner names".into(),
            pattern: r"^<(\w+)>".into(),
            enabled: false,
            order: 7,
            case_sensitive: false,
            action: RuleAction::Replace {
                template: "[$1]".into(),
                all: true,
            },
        }
    }

    #[test]
    fn rule_round_trip_keeps_everything_but_id_and_order() {
        let original = sample_rule();
        let blob = export_rule(&original).unwrap();
        let imported = import_rule(&blob).unwrap();

        assert_ne!(imported.id, original.id);
        assert_eq!(imported.order, 0);
        assert_eq!(
            Rule {
                id: original.id.clone(),
                order: original.order,
                ..imported
            },
            original
        );
    }

    #[test]
    fn channel_round_trip_keeps_membership() {
        let mut original = Channel::new(
            "Staff",
            Membership::Rules {
                rule_ids: vec![RuleId::from("mod-only")],
            },
        )
        .with_abbreviation("ST");
        original.starting_message = "/sc ".into();

        let imported = import_channel(&export_channel(&original).unwrap()).unwrap();
        assert_eq!(
            Channel {
                id: original.id.clone(),
                ..imported
            },
            original
        );
    }

    #[test]
    fn main_flag_is_not_imported() {
        let main = Channel::main("Main", "M");
        let imported = import_channel(&export_channel(&main).unwrap()).unwrap();
        assert!(!imported.is_main);
    }

    #[test]
    fn rejects_empty_garbage_and_wrong_kind() {
        assert_eq!(import_rule("   "), Err(ImportError::Empty));
        assert!(matches!(import_rule("{nope"), Err(ImportError::Malformed(_))));
        assert!(matches!(import_rule("{\"pattern\":\"x\"}"), Err(ImportError::Malformed(_))));

        let tab = export_channel(&Channel::new("T", Membership::Hints)).unwrap();
        assert_eq!(
            import_rule(&tab),
            Err(ImportError::WrongKind {
                expected: "rule",
                found: "tab".into()
            })
        );
    }

    #[test]
    fn invalid_pattern_is_reported_not_imported() {
        let blob = r#"{"kind":"rule","version":1,"pattern":"(","action":{"kind":"suppress"}}"#;
        assert!(matches!(
            import_rule(blob),
            Err(ImportError::Invalid(ValidationError::InvalidPattern { .. }))
        ));
    }

    #[test]
    fn newer_versions_still_import_known_fields() {
        let blob = r#"{"kind":"rule","version":9,"pattern":"x","action":{"kind":"suppress"},"extra":1}"#;
        let rule = import_rule(blob).unwrap();
        assert_eq!(rule.pattern, "x");
        assert!(rule.enabled);
    }
}
