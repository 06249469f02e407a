//! Unread aggregation over a user's conversations.
//!
//! The cached path sums the per-conversation counters. The authoritative path
//! recounts unread messages from the message store and is also the fallback
//! when the cached read fails.

use crate::error::AppResult;
use crate::metrics;
use crate::store::{ConversationStore, MessageStore};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Whether archived conversations contribute to unread totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivedPolicy {
    #[default]
    Include,
    Exclude,
}

impl ArchivedPolicy {
    pub fn from_include_flag(include_archived: bool) -> Self {
        if include_archived {
            ArchivedPolicy::Include
        } else {
            ArchivedPolicy::Exclude
        }
    }

    fn counts(self, is_archived: bool) -> bool {
        self == ArchivedPolicy::Include || !is_archived
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreadSource {
    Cached,
    Authoritative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnreadTotal {
    pub total: i64,
    /// Path that actually produced `total`
    pub source: UnreadSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationUnread {
    pub conversation_id: Uuid,
    pub unread_count: i64,
    pub is_archived: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    pub conversation_id: Uuid,
    pub cached: i64,
    pub actual: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub corrected: Vec<CounterDrift>,
}

#[derive(Clone)]
pub struct UnreadAggregator {
    messages: Arc<dyn MessageStore>,
    conversations: Arc<dyn ConversationStore>,
    default_policy: ArchivedPolicy,
}

impl UnreadAggregator {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        conversations: Arc<dyn ConversationStore>,
        default_policy: ArchivedPolicy,
    ) -> Self {
        Self {
            messages,
            conversations,
            default_policy,
        }
    }

    /// Total unread for `user_id`, always >= 0.
    ///
    /// `policy: None` uses the configured default. An authoritative request
    /// first reconciles the cached counters against the message store.
    pub async fn total_unread(
        &self,
        user_id: Uuid,
        source: UnreadSource,
        policy: Option<ArchivedPolicy>,
    ) -> AppResult<UnreadTotal> {
        let policy = policy.unwrap_or(self.default_policy);

        match source {
            UnreadSource::Cached => match self.cached_total(user_id, policy).await {
                Ok(total) => Ok(UnreadTotal {
                    total,
                    source: UnreadSource::Cached,
                }),
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        error = %e,
                        "cached unread counters unavailable, recounting"
                    );
                    self.recount_total(user_id, policy).await
                }
            },
            UnreadSource::Authoritative => {
                if let Err(e) = self.reconcile_user(user_id).await {
                    tracing::warn!(user_id = %user_id, error = %e, "unread reconcile skipped");
                }
                self.recount_total(user_id, policy).await
            }
        }
    }

    /// Cached per-conversation counters, clamped at 0
    pub async fn unread_by_conversation(
        &self,
        user_id: Uuid,
        policy: Option<ArchivedPolicy>,
    ) -> AppResult<Vec<ConversationUnread>> {
        let policy = policy.unwrap_or(self.default_policy);
        let counters = self.conversations.unread_counters(user_id).await?;
        Ok(counters
            .into_iter()
            .filter(|c| policy.counts(c.is_archived))
            .map(|c| ConversationUnread {
                conversation_id: c.conversation_id,
                unread_count: c.unread_count.max(0),
                is_archived: c.is_archived,
            })
            .collect())
    }

    /// Recount every drifted counter of `user_id` from the message store.
    ///
    /// The snapshot only selects candidates; each correction is an atomic
    /// recount in the store, and drift is reported from its before/after.
    pub async fn reconcile_user(&self, user_id: Uuid) -> AppResult<ReconcileReport> {
        let counters = self.conversations.unread_counters(user_id).await?;
        let actual = self.messages.count_unread_by_conversation(user_id).await?;

        let mut report = ReconcileReport {
            checked: counters.len(),
            corrected: Vec::new(),
        };
        for counter in counters {
            let truth = actual.get(&counter.conversation_id).copied().unwrap_or(0);
            if counter.unread_count == truth {
                continue;
            }

            let recount = self
                .conversations
                .recount_unread(counter.conversation_id, user_id)
                .await?;
            if !recount.drifted() {
                continue;
            }

            tracing::warn!(
                user_id = %user_id,
                conversation_id = %counter.conversation_id,
                cached = recount.previous,
                actual = recount.current,
                "unread counter drift corrected"
            );
            metrics::record_unread_drift();
            report.corrected.push(CounterDrift {
                conversation_id: counter.conversation_id,
                cached: recount.previous,
                actual: recount.current,
            });
        }
        Ok(report)
    }

    async fn cached_total(&self, user_id: Uuid, policy: ArchivedPolicy) -> AppResult<i64> {
        let counters = self.conversations.unread_counters(user_id).await?;
        Ok(counters
            .iter()
            .filter(|c| policy.counts(c.is_archived))
            .map(|c| c.unread_count.max(0))
            .sum())
    }

    async fn recount_total(&self, user_id: Uuid, policy: ArchivedPolicy) -> AppResult<UnreadTotal> {
        let actual = self.messages.count_unread_by_conversation(user_id).await?;
        let archived = match policy {
            ArchivedPolicy::Include => HashSet::new(),
            ArchivedPolicy::Exclude => self.archived_conversations(user_id).await?,
        };

        Ok(UnreadTotal {
            total: sum_excluding(&actual, &archived),
            source: UnreadSource::Authoritative,
        })
    }

    async fn archived_conversations(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
        Ok(self
            .conversations
            .list_for_user(user_id, true)
            .await?
            .into_iter()
            .filter(|c| c.archived_for(user_id))
            .map(|c| c.id)
            .collect())
    }
}

fn sum_excluding(counts: &HashMap<Uuid, i64>, excluded: &HashSet<Uuid>) -> i64 {
    counts
        .iter()
        .filter(|(id, _)| !excluded.contains(*id))
        .map(|(_, n)| (*n).max(0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_flag() {
        assert_eq!(ArchivedPolicy::from_include_flag(true), ArchivedPolicy::Include);
        assert_eq!(ArchivedPolicy::from_include_flag(false), ArchivedPolicy::Exclude);
        assert_eq!(ArchivedPolicy::default(), ArchivedPolicy::Include);
    }

    #[test]
    fn test_sum_excluding_skips_archived_and_negatives() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let counts = HashMap::from([(a, 2), (b, 3), (c, -4)]);
        let excluded = HashSet::from([b]);
        assert_eq!(sum_excluding(&counts, &excluded), 2);
    }
}
