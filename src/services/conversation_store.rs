use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::clock::Clock;
use crate::models::{ConversationState, ConversationStep, StatePatch};
use crate::services::extractor::{normalize_time, DAY_PARTS};

/// Idle time after which a conversation is forgotten.
pub const STALE_AFTER_MINUTES: i64 = 6;
/// Longest a conversation may sit in one non-initial step.
pub const STEP_TIMEOUT_MINUTES: i64 = 10;

const SENTINELS: &[&str] = &["undefined", "null", ""];

/// `"00 am"` not preceded by `:`, as left behind by a double-appended hour.
static MALFORMED_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|[^:])00 ?(am|pm)").expect("valid malformed-time pattern"));

pub fn is_expired(entry: &ConversationState, now: NaiveDateTime) -> bool {
    if now - entry.last_updated > Duration::minutes(STALE_AFTER_MINUTES) {
        return true;
    }
    entry.conversation_step != ConversationStep::Initial
        && now - entry.step_entered_at > Duration::minutes(STEP_TIMEOUT_MINUTES)
}

pub fn is_corrupt(entry: &ConversationState) -> bool {
    if entry.selected_service.as_deref().is_some_and(is_sentinel)
        || entry.selected_date.as_deref().is_some_and(is_sentinel)
    {
        return true;
    }
    if let Some(time) = entry.selected_time.as_deref() {
        if is_sentinel(time) || is_malformed_time(time) {
            return true;
        }
    }

    match entry.conversation_step {
        ConversationStep::TimeSelected => entry.selected_time.is_none(),
        ConversationStep::DateSelected => entry.selected_date.is_none(),
        ConversationStep::ServiceSelected => entry.selected_service.is_none(),
        _ => false,
    }
}

fn is_sentinel(value: &str) -> bool {
    let trimmed = value.trim();
    SENTINELS.contains(&trimmed) || trimmed.chars().count() < 2
}

fn is_malformed_time(value: &str) -> bool {
    if MALFORMED_TIME.is_match(value) {
        return true;
    }
    let lower = value.trim().to_lowercase();
    if DAY_PARTS.contains(&lower.as_str()) {
        return false;
    }
    normalize_time(&lower).is_none()
}

/// Per-phone booking progress. In-memory only; a restart forgets every
/// in-flight conversation.
pub struct ConversationStore {
    states: Mutex<HashMap<String, ConversationState>>,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ConversationState>> {
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the live state for `phone`, deleting it first if it is
    /// expired or corrupt.
    pub fn get(&self, phone: &str) -> Option<ConversationState> {
        let now = self.clock.now();
        let mut states = self.lock();
        let entry = states.get(phone)?;

        if is_expired(entry, now) {
            tracing::debug!(phone, step = entry.conversation_step.as_str(), "dropping stale conversation");
            states.remove(phone);
            return None;
        }
        if is_corrupt(entry) {
            tracing::warn!(phone, ?entry, "dropping corrupt conversation");
            states.remove(phone);
            return None;
        }
        Some(entry.clone())
    }

    /// Merges `patch` into the stored state (creating it when absent) and
    /// refreshes `last_updated`.
    pub fn update(&self, phone: &str, patch: StatePatch) -> ConversationState {
        let now = self.clock.now();
        let mut states = self.lock();
        let mut state = states
            .remove(phone)
            .unwrap_or_else(|| ConversationState::new(phone, now));

        if let Some(service) = patch.selected_service {
            state.selected_service = service;
        }
        if let Some(date) = patch.selected_date {
            state.selected_date = date;
        }
        if let Some(time) = patch.selected_time {
            state.selected_time = time;
        }
        if let Some(step) = patch.conversation_step {
            if step != state.conversation_step {
                state.step_entered_at = now;
            }
            state.conversation_step = step;
        }
        state.last_updated = now;

        tracing::debug!(
            phone,
            step = state.conversation_step.as_str(),
            service = ?state.selected_service,
            date = ?state.selected_date,
            time = ?state.selected_time,
            "conversation updated"
        );
        states.insert(phone.to_string(), state.clone());
        state
    }

    pub fn clear(&self, phone: &str) -> bool {
        let removed = self.lock().remove(phone).is_some();
        if removed {
            tracing::debug!(phone, "conversation cleared");
        }
        removed
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, live or not yet collected.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `state` verbatim, bypassing merge rules.
    pub fn insert_raw(&self, state: ConversationState) {
        self.lock().insert(state.phone_number.clone(), state);
    }
}
