//! Session store for multi-step form submissions
//!
//! Clients post the cycle, profile and symptom sections of the form in
//! separate requests under one session id. Entries expire a fixed time after
//! their last write and the store holds a bounded number of sessions,
//! evicting the least recently updated one when full.

use crate::models::CycleRecord;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Session id used when a client does not send one
pub const DEFAULT_SESSION_ID: &str = "default";

/// Default time-to-live since last write
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Source of the current time
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// One page of the multi-step form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormSection {
    CycleData,
    UserData,
    SymptomsData,
}

impl FormSection {
    /// Merge order: later sections overwrite earlier ones
    pub const ALL: [FormSection; 3] = [
        FormSection::CycleData,
        FormSection::UserData,
        FormSection::SymptomsData,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            FormSection::CycleData => "cycle_data",
            FormSection::UserData => "user_data",
            FormSection::SymptomsData => "symptoms_data",
        }
    }
}

/// Data collected for one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub sections: std::collections::BTreeMap<FormSection, Map<String, Value>>,
    pub cycles: Vec<CycleRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            sections: Default::default(),
            cycles: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        (now - self.updated_at)
            .to_std()
            .map(|elapsed| elapsed >= ttl)
            .unwrap_or(false)
    }

    /// All form sections flattened into one feature mapping
    pub fn merged_features(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for section in FormSection::ALL {
            if let Some(data) = self.sections.get(&section) {
                merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        merged
    }
}

/// Expiry and capacity policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SESSION_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

/// Concurrent, expiring, bounded session store
#[derive(Debug, Clone)]
pub struct SessionStore {
    entries: Arc<DashMap<String, Session>>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace one form section of a session
    pub fn save_section(&self, session_id: &str, section: FormSection, data: Map<String, Value>) {
        self.upsert(session_id, |session| {
            session.sections.insert(section, data);
        });
    }

    /// Replace the cycle records of a session
    pub fn save_cycles(&self, session_id: &str, cycles: Vec<CycleRecord>) {
        self.upsert(session_id, |session| session.cycles = cycles);
    }

    /// Snapshot of a live session
    pub fn get(&self, session_id: &str) -> Option<Session> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(session_id)?;
            if !entry.is_expired(now, self.config.ttl) {
                return Some(entry.value().clone());
            }
        }
        self.entries.remove(session_id);
        None
    }

    /// Merged form sections of a session, empty when it does not exist
    pub fn merged_features(&self, session_id: &str) -> Map<String, Value> {
        self.get(session_id)
            .map(|s| s.merged_features())
            .unwrap_or_default()
    }

    /// Number of stored sessions, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, session| !session.is_expired(now, ttl));
        before.saturating_sub(self.entries.len())
    }

    fn upsert<F>(&self, session_id: &str, apply: F)
    where
        F: FnOnce(&mut Session),
    {
        let now = self.clock.now();
        if !self.entries.contains_key(session_id) {
            self.make_room();
        }

        let mut entry = self
            .entries
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(now));
        if entry.is_expired(now, self.config.ttl) {
            *entry = Session::new(now);
        }
        apply(&mut entry);
        entry.updated_at = now;
    }

    /// Evict least recently updated sessions until one more fits
    fn make_room(&self) {
        let capacity = self.config.max_sessions.max(1);
        while self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().updated_at)
                .map(|entry| entry.key().clone());
            let Some(key) = oldest else {
                break;
            };
            debug!(session_id = %key, "Evicting least recently updated session");
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn section(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn store_with_clock(ttl_secs: u64, max_sessions: usize) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let config = SessionConfig {
            ttl: Duration::from_secs(ttl_secs),
            max_sessions,
        };
        (SessionStore::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn test_sections_merge_in_form_order() {
        let store = SessionStore::default();
        store.save_section(
            "s1",
            FormSection::SymptomsData,
            section(json!({"AvgBleedingIntensity": 4, "Age": 40})),
        );
        store.save_section(
            "s1",
            FormSection::CycleData,
            section(json!({"AvgCycleLength": 29})),
        );
        store.save_section(
            "s1",
            FormSection::UserData,
            section(json!({"Age": 31, "BMI": 22.0})),
        );

        let merged = store.merged_features("s1");
        assert_eq!(merged["AvgCycleLength"], json!(29));
        assert_eq!(merged["BMI"], json!(22.0));
        // Symptoms are merged last
        assert_eq!(merged["Age"], json!(40));
        assert!(store.merged_features("missing").is_empty());
    }

    #[test]
    fn test_section_replaced_not_merged() {
        let store = SessionStore::default();
        store.save_section(
            "s1",
            FormSection::UserData,
            section(json!({"Age": 31, "BMI": 22.0})),
        );
        store.save_section("s1", FormSection::UserData, section(json!({"Age": 32})));
        let merged = store.merged_features("s1");
        assert_eq!(merged["Age"], json!(32));
        assert!(!merged.contains_key("BMI"));
    }

    #[test]
    fn test_sessions_expire_after_ttl_since_last_write() {
        let (store, clock) = store_with_clock(60, 10);
        store.save_cycles("s1", vec![CycleRecord::new("2024-01-01", "2024-01-05")]);

        clock.advance(chrono::Duration::seconds(45));
        store.save_section("s1", FormSection::UserData, section(json!({"Age": 30})));
        clock.advance(chrono::Duration::seconds(45));
        assert_eq!(store.get("s1").map(|s| s.cycles.len()), Some(1));

        clock.advance(chrono::Duration::seconds(15));
        assert!(store.get("s1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_write_after_expiry_starts_fresh() {
        let (store, clock) = store_with_clock(60, 10);
        store.save_section("s1", FormSection::UserData, section(json!({"Age": 30})));
        clock.advance(chrono::Duration::seconds(61));
        store.save_section(
            "s1",
            FormSection::CycleData,
            section(json!({"AvgCycleLength": 28})),
        );

        let merged = store.merged_features("s1");
        assert!(!merged.contains_key("Age"));
        assert_eq!(merged["AvgCycleLength"], json!(28));
    }

    #[test]
    fn test_purge_expired() {
        let (store, clock) = store_with_clock(60, 10);
        store.save_cycles("old", Vec::new());
        clock.advance(chrono::Duration::seconds(30));
        store.save_cycles("new", Vec::new());
        clock.advance(chrono::Duration::seconds(40));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("new").is_some());
    }

    #[test]
    fn test_capacity_evicts_least_recently_updated() {
        let (store, clock) = store_with_clock(3600, 2);
        store.save_cycles("a", Vec::new());
        clock.advance(chrono::Duration::seconds(1));
        store.save_cycles("b", Vec::new());
        clock.advance(chrono::Duration::seconds(1));
        // Touching "a" makes "b" the oldest
        store.save_cycles("a", Vec::new());
        clock.advance(chrono::Duration::seconds(1));
        store.save_cycles("c", Vec::new());

        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn test_unknown_session_is_absent() {
        let store = SessionStore::default();
        assert!(store.get(DEFAULT_SESSION_ID).is_none());
        store.save_cycles(DEFAULT_SESSION_ID, Vec::new());
        assert!(store.get(DEFAULT_SESSION_ID).is_some());
        assert!(store.get("other").is_none());
    }

    #[test]
    fn test_section_wire_names() {
        assert_eq!(
            serde_json::to_value(FormSection::SymptomsData).unwrap(),
            json!("symptoms_data")
        );
        assert_eq!(FormSection::CycleData.key(), "cycle_data");
    }
}
