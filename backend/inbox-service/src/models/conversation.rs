use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A conversation and its per-participant facets.
///
/// `unread_count` and `is_archived` are keyed by participant id and entries
/// appear lazily; a missing key reads as 0 / false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Sorted, unique
    pub participant_ids: Vec<Uuid>,
    pub property_id: Option<Uuid>,
    pub title: Option<String>,
    /// Weak reference, the message may no longer exist
    pub last_message_id: Option<Uuid>,
    pub unread_count: HashMap<Uuid, i64>,
    pub is_archived: HashMap<Uuid, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        participant_ids: Vec<Uuid>,
        property_id: Option<Uuid>,
        title: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            participant_ids,
            property_id,
            title,
            last_message_id: None,
            unread_count: HashMap::new(),
            is_archived: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participant_ids.binary_search(&user_id).is_ok()
    }

    pub fn unread_for(&self, user_id: Uuid) -> i64 {
        self.unread_count.get(&user_id).copied().unwrap_or(0)
    }

    pub fn archived_for(&self, user_id: Uuid) -> bool {
        self.is_archived.get(&user_id).copied().unwrap_or(false)
    }
}

/// Input for find-or-create
#[derive(Debug, Clone, Default)]
pub struct NewConversation {
    pub participant_ids: Vec<Uuid>,
    pub property_id: Option<Uuid>,
    pub title: Option<String>,
}

impl NewConversation {
    pub fn between(participant_ids: &[Uuid]) -> Self {
        Self {
            participant_ids: participant_ids.to_vec(),
            ..Default::default()
        }
    }

    pub fn for_property(mut self, property_id: Uuid) -> Self {
        self.property_id = Some(property_id);
        self
    }
}

/// Sort and dedupe participant ids so lookups are order independent
pub fn normalize_participants(ids: &[Uuid]) -> Vec<Uuid> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Stable text key of a normalized participant set
pub fn participant_key(normalized: &[Uuid]) -> String {
    normalized
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            normalize_participants(&[a, b]),
            normalize_participants(&[b, a, b])
        );
        assert_eq!(normalize_participants(&[a, a]).len(), 1);
    }

    #[test]
    fn test_missing_facets_read_as_defaults() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = Conversation::new(normalize_participants(&[a, b]), None, None, Utc::now());

        assert!(conv.is_participant(a));
        assert!(!conv.is_participant(Uuid::new_v4()));
        assert_eq!(conv.unread_for(a), 0);
        assert!(!conv.archived_for(b));
    }

    #[test]
    fn test_participant_key_matches_for_same_set() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            participant_key(&normalize_participants(&[a, b])),
            participant_key(&normalize_participants(&[b, a]))
        );
    }
}
