//! The deterministic state machine: four tables plus the command applier.
//!
//! `apply` is a pure function of (current state, command). Every timestamp
//! that lands in state arrives inside the command payload, stamped by the
//! leader, so replaying the same log prefix on any replica produces
//! byte-identical tables. Malformed or stale commands (a stash for a rule
//! that was removed in between) are deterministic no-ops, logged and
//! skipped. The applier cannot report errors back to the submitter.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::{Command, Op};
use crate::tables::{BucketTable, HistoryTable, RuleTable, ScriptTable};
use crate::types::{Bucket, ExecutionRecord, Rule};

/// The replicated in-memory database.
#[derive(Default)]
pub struct MemDb {
    pub rules: RuleTable,
    pub buckets: BucketTable,
    pub scripts: ScriptTable,
    pub history: HistoryTable,
}

/// Full serializable image of the four tables, keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub buckets: HashMap<String, Bucket>,
    pub rules: HashMap<String, Rule>,
    pub history: HashMap<String, ExecutionRecord>,
    pub scripts: HashMap<String, Vec<u8>>,
}

impl MemDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one committed command. Lock order: rules → buckets → scripts
    /// → history; each lock is released before the next is taken.
    pub fn apply(&self, cmd: &Command) {
        match cmd.op {
            Op::AddRule => {
                let Some(rule) = &cmd.rule else {
                    warn!(op = cmd.op.as_str(), "command missing rule payload");
                    return;
                };
                if !self.rules.insert_new(rule.clone()) {
                    warn!(rule_id = %rule.id, "duplicate add_rule ignored");
                    return;
                }
                self.buckets.create_empty(rule);
            }
            Op::UpdateRule => {
                let Some(rule) = &cmd.rule else {
                    warn!(op = cmd.op.as_str(), "command missing rule payload");
                    return;
                };
                if !self.rules.contains(&rule.id) {
                    warn!(rule_id = %rule.id, "update_rule for unknown rule ignored");
                    return;
                }
                self.rules.upsert(rule.clone());
                // The bucket keeps buffering, but under the new windows.
                self.buckets.refresh_rule(rule);
            }
            Op::RemoveRule => {
                let Some(rule_id) = &cmd.rule_id else {
                    warn!(op = cmd.op.as_str(), "command missing ruleID payload");
                    return;
                };
                self.rules.delete(rule_id);
                self.buckets.delete(rule_id);
            }
            Op::AddScript | Op::UpdateScript => {
                let (Some(id), Some(script)) = (&cmd.script_id, &cmd.script) else {
                    warn!(op = cmd.op.as_str(), "command missing script payload");
                    return;
                };
                self.scripts.upsert(id.clone(), script.clone());
            }
            Op::RemoveScript => {
                let Some(id) = &cmd.script_id else {
                    warn!(op = cmd.op.as_str(), "command missing script_id payload");
                    return;
                };
                self.scripts.delete(id);
            }
            Op::Stash => {
                let (Some(rule_id), Some(event)) = (&cmd.rule_id, &cmd.event) else {
                    warn!(op = cmd.op.as_str(), "command missing stash payload");
                    return;
                };
                // The rule may have been removed between match and apply;
                // the event is then dropped.
                let Some(rule) = self.rules.get(rule_id) else {
                    debug!(rule_id = %rule_id, "stash for removed rule dropped");
                    return;
                };
                self.buckets.stash(&rule, event.clone());
            }
            Op::FlushBucket => {
                let Some(rule_id) = &cmd.rule_id else {
                    warn!(op = cmd.op.as_str(), "command missing ruleID payload");
                    return;
                };
                self.buckets.flush(rule_id);
            }
            Op::AddRecord => {
                let Some(record) = &cmd.record else {
                    warn!(op = cmd.op.as_str(), "command missing record payload");
                    return;
                };
                if !self.history.insert(record.clone()) {
                    warn!(record_id = %record.id, "duplicate add_record ignored");
                }
            }
            Op::RemoveRecord => {
                let Some(record_id) = &cmd.record_id else {
                    warn!(op = cmd.op.as_str(), "command missing record_id payload");
                    return;
                };
                self.history.delete(record_id);
            }
        }
    }

    /// Full image of the four tables.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            buckets: self.buckets.clone_map(),
            rules: self.rules.clone_map(),
            history: self.history.clone_map(),
            scripts: self.scripts.clone_map(),
        }
    }

    /// Replace all state from a snapshot image.
    pub fn restore(&self, snapshot: Snapshot) {
        self.rules.replace_all(snapshot.rules);
        self.buckets.replace_all(snapshot.buckets);
        self.scripts.replace_all(snapshot.scripts);
        self.history.replace_all(snapshot.history);
    }
}
