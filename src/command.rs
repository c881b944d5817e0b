//! The replicated command: every mutation is one tagged wire entry.
//!
//! Encoding is JSON with an `op` discriminator and optional payload fields.
//! Unset fields are absent from the encoding (not null-filled); followers
//! decode strictly.

use serde::{Deserialize, Serialize};

use crate::types::{Event, ExecutionRecord, Rule};

/// Discriminator for the command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    AddRule,
    UpdateRule,
    RemoveRule,
    AddScript,
    UpdateScript,
    RemoveScript,
    Stash,
    FlushBucket,
    AddRecord,
    RemoveRecord,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::AddRule => "add_rule",
            Op::UpdateRule => "update_rule",
            Op::RemoveRule => "remove_rule",
            Op::AddScript => "add_script",
            Op::UpdateScript => "update_script",
            Op::RemoveScript => "remove_script",
            Op::Stash => "stash",
            Op::FlushBucket => "flush_bucket",
            Op::AddRecord => "add_record",
            Op::RemoveRecord => "remove_record",
        }
    }
}

/// A single log entry. Only the fields the op needs are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub op: Op,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
    #[serde(rename = "ruleID", default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<ExecutionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

impl Command {
    fn bare(op: Op) -> Self {
        Self {
            op,
            rule: None,
            rule_id: None,
            event: None,
            script_id: None,
            script: None,
            record: None,
            record_id: None,
        }
    }

    pub fn add_rule(rule: Rule) -> Self {
        Self {
            rule: Some(rule),
            ..Self::bare(Op::AddRule)
        }
    }

    pub fn update_rule(rule: Rule) -> Self {
        Self {
            rule: Some(rule),
            ..Self::bare(Op::UpdateRule)
        }
    }

    pub fn remove_rule(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: Some(rule_id.into()),
            ..Self::bare(Op::RemoveRule)
        }
    }

    pub fn add_script(script_id: impl Into<String>, script: Vec<u8>) -> Self {
        Self {
            script_id: Some(script_id.into()),
            script: Some(script),
            ..Self::bare(Op::AddScript)
        }
    }

    pub fn update_script(script_id: impl Into<String>, script: Vec<u8>) -> Self {
        Self {
            script_id: Some(script_id.into()),
            script: Some(script),
            ..Self::bare(Op::UpdateScript)
        }
    }

    pub fn remove_script(script_id: impl Into<String>) -> Self {
        Self {
            script_id: Some(script_id.into()),
            ..Self::bare(Op::RemoveScript)
        }
    }

    pub fn stash(rule_id: impl Into<String>, event: Event) -> Self {
        Self {
            rule_id: Some(rule_id.into()),
            event: Some(event),
            ..Self::bare(Op::Stash)
        }
    }

    pub fn flush_bucket(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: Some(rule_id.into()),
            ..Self::bare(Op::FlushBucket)
        }
    }

    pub fn add_record(record: ExecutionRecord) -> Self {
        Self {
            record: Some(record),
            ..Self::bare(Op::AddRecord)
        }
    }

    pub fn remove_record(record_id: impl Into<String>) -> Self {
        Self {
            record_id: Some(record_id.into()),
            ..Self::bare(Op::RemoveRecord)
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn op_strings_are_snake_case() {
        for op in [
            Op::AddRule,
            Op::UpdateRule,
            Op::RemoveRule,
            Op::AddScript,
            Op::UpdateScript,
            Op::RemoveScript,
            Op::Stash,
            Op::FlushBucket,
            Op::AddRecord,
            Op::RemoveRecord,
        ] {
            let encoded = serde_json::to_value(op).expect("encode op");
            assert_eq!(encoded, json!(op.as_str()));
        }
    }

    #[test]
    fn unset_fields_are_absent_from_the_wire_form() {
        let cmd = Command::flush_bucket("r1");
        let value = serde_json::to_value(&cmd).expect("encode");
        let obj = value.as_object().expect("object");

        assert_eq!(obj.get("op"), Some(&json!("flush_bucket")));
        assert_eq!(obj.get("ruleID"), Some(&json!("r1")));
        assert!(!obj.contains_key("rule"));
        assert!(!obj.contains_key("event"));
        assert!(!obj.contains_key("script"));
        assert!(!obj.contains_key("script_id"));
        assert!(!obj.contains_key("record"));
        assert!(!obj.contains_key("record_id"));
    }

    #[test]
    fn stash_roundtrips_through_the_wire_form() {
        let event = Event::new("foo.bar", json!({"amount": 12}));
        let cmd = Command::stash("r1", event.clone());

        let bytes = cmd.encode().expect("encode");
        let decoded = Command::decode(&bytes).expect("decode");

        assert_eq!(decoded.op, Op::Stash);
        assert_eq!(decoded.rule_id.as_deref(), Some("r1"));
        assert_eq!(decoded.event, Some(event));
    }

    #[test]
    fn script_bytes_roundtrip() {
        let cmd = Command::add_script("s1", b"function f() {}".to_vec());
        let decoded = Command::decode(&cmd.encode().expect("encode")).expect("decode");
        assert_eq!(decoded.script.as_deref(), Some(&b"function f() {}"[..]));
    }
}
