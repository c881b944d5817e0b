//! The four replicated in-memory tables: rules, buckets, scripts, history.
//!
//! Each table owns its map behind an `RwLock`; reads are lock-light, writes
//! take the exclusive guard for a short critical section. No lock is ever
//! held across consensus apply or an HTTP call. Cross-table operations
//! acquire locks in a fixed order (rules, then buckets, then scripts, then
//! history) and release each before taking the next.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{Bucket, Event, ExecutionRecord, Rule};

/// Keyed table of rule definitions.
#[derive(Default)]
pub struct RuleTable {
    m: RwLock<HashMap<String, Rule>>,
}

impl RuleTable {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Rule>> {
        self.m.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Rule>> {
        self.m.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, id: &str) -> Option<Rule> {
        self.read().get(id).cloned()
    }

    /// All rules, ordered by id so that iteration order is the same on
    /// every replica.
    pub fn get_all(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self.read().values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Insert only if the id is absent. Returns false on conflict.
    pub fn insert_new(&self, rule: Rule) -> bool {
        let mut m = self.write();
        if m.contains_key(&rule.id) {
            return false;
        }
        m.insert(rule.id.clone(), rule);
        true
    }

    pub fn upsert(&self, rule: Rule) {
        self.write().insert(rule.id.clone(), rule);
    }

    pub fn delete(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clone_map(&self) -> HashMap<String, Rule> {
        self.read().clone()
    }

    pub fn replace_all(&self, map: HashMap<String, Rule>) {
        *self.write() = map;
    }
}

/// Per-rule buckets of buffered events.
#[derive(Default)]
pub struct BucketTable {
    m: RwLock<HashMap<String, Bucket>>,
}

impl BucketTable {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Bucket>> {
        self.m.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Bucket>> {
        self.m.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, rule_id: &str) -> Option<Bucket> {
        self.read().get(rule_id).cloned()
    }

    /// Ensure an empty bucket exists for the rule (rule creation).
    pub fn create_empty(&self, rule: &Rule) {
        self.write()
            .entry(rule.id.clone())
            .or_insert_with(|| Bucket::new(rule.clone()));
    }

    /// Append an event to the rule's bucket, creating the bucket if it is
    /// missing (lazy creation on first stash).
    pub fn stash(&self, rule: &Rule, event: Event) {
        let mut m = self.write();
        m.entry(rule.id.clone())
            .or_insert_with(|| Bucket::new(rule.clone()))
            .append(event);
    }

    /// Empty the rule's bucket and reset its timestamps.
    pub fn flush(&self, rule_id: &str) {
        if let Some(bucket) = self.write().get_mut(rule_id) {
            bucket.drain();
        }
    }

    /// Refresh the rule snapshot a bucket carries (rule update).
    pub fn refresh_rule(&self, rule: &Rule) {
        if let Some(bucket) = self.write().get_mut(&rule.id) {
            bucket.rule = rule.clone();
        }
    }

    pub fn delete(&self, rule_id: &str) -> bool {
        self.write().remove(rule_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Point-in-time value copy used by the flusher to iterate without
    /// holding the map lock.
    pub fn clone_map(&self) -> HashMap<String, Bucket> {
        self.read().clone()
    }

    pub fn replace_all(&self, map: HashMap<String, Bucket>) {
        *self.write() = map;
    }
}

/// Keyed blob table of scripts. No schema enforced.
#[derive(Default)]
pub struct ScriptTable {
    m: RwLock<HashMap<String, Vec<u8>>>,
}

impl ScriptTable {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<u8>>> {
        self.m.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<u8>>> {
        self.m.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        self.read().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn upsert(&self, id: impl Into<String>, script: Vec<u8>) {
        self.write().insert(id.into(), script);
    }

    pub fn delete(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clone_map(&self) -> HashMap<String, Vec<u8>> {
        self.read().clone()
    }

    pub fn replace_all(&self, map: HashMap<String, Vec<u8>>) {
        *self.write() = map;
    }
}

#[derive(Default)]
struct HistoryInner {
    m: HashMap<String, ExecutionRecord>,
    /// Secondary view: record ids per rule, in insertion order.
    by_rule: HashMap<String, Vec<String>>,
}

/// Execution history. `insert` is the only mutation of record content;
/// records are never modified after creation.
#[derive(Default)]
pub struct HistoryTable {
    inner: RwLock<HistoryInner>,
}

impl HistoryTable {
    fn read(&self) -> RwLockReadGuard<'_, HistoryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HistoryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a record. Returns false (and leaves the table untouched) if
    /// the id already exists.
    pub fn insert(&self, record: ExecutionRecord) -> bool {
        let mut inner = self.write();
        if inner.m.contains_key(&record.id) {
            return false;
        }
        inner
            .by_rule
            .entry(record.bucket.rule.id.clone())
            .or_default()
            .push(record.id.clone());
        inner.m.insert(record.id.clone(), record);
        true
    }

    pub fn get(&self, id: &str) -> Option<ExecutionRecord> {
        self.read().m.get(id).cloned()
    }

    pub fn delete(&self, id: &str) -> bool {
        let mut inner = self.write();
        let Some(record) = inner.m.remove(id) else {
            return false;
        };
        if let Some(ids) = inner.by_rule.get_mut(&record.bucket.rule.id) {
            ids.retain(|r| r != id);
            if ids.is_empty() {
                inner.by_rule.remove(&record.bucket.rule.id);
            }
        }
        true
    }

    /// Records for one rule, in insertion order.
    pub fn records_for_rule(&self, rule_id: &str) -> Vec<ExecutionRecord> {
        let inner = self.read();
        inner
            .by_rule
            .get(rule_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.m.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count_for_rule(&self, rule_id: &str) -> usize {
        self.read()
            .by_rule
            .get(rule_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.read().m.len()
    }

    /// Ids of the `n` oldest records: first by `created_at`, ties broken
    /// lexicographically by id.
    pub fn oldest(&self, n: usize) -> Vec<String> {
        let inner = self.read();
        let mut keyed: Vec<(chrono::DateTime<chrono::Utc>, String)> = inner
            .m
            .values()
            .map(|r| (r.created_at, r.id.clone()))
            .collect();
        keyed.sort();
        keyed.into_iter().take(n).map(|(_, id)| id).collect()
    }

    pub fn clone_map(&self) -> HashMap<String, ExecutionRecord> {
        self.read().m.clone()
    }

    /// Replace the table from a snapshot. The per-rule view is rebuilt in
    /// `(created_at, id)` order, which equals insertion order for records
    /// stamped by a single leader.
    pub fn replace_all(&self, map: HashMap<String, ExecutionRecord>) {
        let mut by_rule: HashMap<String, Vec<String>> = HashMap::new();
        let mut ordered: Vec<&ExecutionRecord> = map.values().collect();
        ordered.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        for record in ordered {
            by_rule
                .entry(record.bucket.rule.id.clone())
                .or_default()
                .push(record.id.clone());
        }

        let mut inner = self.write();
        inner.m = map;
        inner.by_rule = by_rule;
    }
}
