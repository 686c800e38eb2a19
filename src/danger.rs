//! Danger Aggregator — per-user danger scores and human-readable rosters.
//!
//! A user's score is the sum of their occurrence counters over items with a
//! malicious verdict. Scores are computed on demand from the store and never
//! cached.

use std::sync::Arc;

use crate::bot::types::ChatMember;
use crate::error::DatabaseError;
use crate::store::ItemStore;

/// Classification of a danger score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DangerLevel {
    Clean,
    Suspicious,
    Dangerous,
}

impl DangerLevel {
    /// Fixed thresholds: 0 is clean, 1–5 suspicious, above 5 dangerous.
    pub fn classify(score: i64) -> Self {
        match score {
            0 => DangerLevel::Clean,
            1..=5 => DangerLevel::Suspicious,
            _ => DangerLevel::Dangerous,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DangerLevel::Clean => "clean",
            DangerLevel::Suspicious => "suspicious",
            DangerLevel::Dangerous => "dangerous",
        }
    }
}

pub struct DangerAggregator {
    store: Arc<dyn ItemStore>,
}

impl DangerAggregator {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    /// Score and classify one user.
    pub async fn assess_user(&self, user_id: i64) -> Result<(i64, DangerLevel), DatabaseError> {
        let score = self.store.danger_score(user_id).await?;
        Ok((score, DangerLevel::classify(score)))
    }

    /// Batched roster for a group's member list: one line per member with a
    /// non-clean history, or an all-clear sentence.
    pub async fn group_roster(&self, members: &[ChatMember]) -> Result<String, DatabaseError> {
        let user_ids: Vec<i64> = members
            .iter()
            .filter(|m| !m.is_bot)
            .map(|m| m.user_id)
            .collect();
        let scores = self.store.danger_scores(&user_ids).await?;

        let mut lines = Vec::new();
        for member in members.iter().filter(|m| !m.is_bot) {
            let score = scores.get(&member.user_id).copied().unwrap_or(0);
            match DangerLevel::classify(score) {
                DangerLevel::Clean => {}
                level => lines.push(format!(
                    "{} {} — {} (score {})",
                    level_marker(level),
                    member.display_name(),
                    level.as_str(),
                    score
                )),
            }
        }

        if lines.is_empty() {
            Ok(format!(
                "Safety check complete: no dangerous activity among {} members.",
                user_ids.len()
            ))
        } else {
            Ok(format!(
                "Members with a history of dangerous shares:\n{}",
                lines.join("\n")
            ))
        }
    }

    /// Join notice for a single new member; `None` when they are clean.
    pub async fn join_notice(&self, member: &ChatMember) -> Result<Option<String>, DatabaseError> {
        let (score, level) = self.assess_user(member.user_id).await?;
        Ok(match level {
            DangerLevel::Clean => None,
            level => Some(format!(
                "{} {} joined and has previously shared {} content (score {}). \
                 Be careful with links and files from them.",
                level_marker(level),
                member.display_name(),
                level.as_str(),
                score
            )),
        })
    }
}

fn level_marker(level: DangerLevel) -> &'static str {
    match level {
        DangerLevel::Clean => "",
        DangerLevel::Suspicious => "⚠️",
        DangerLevel::Dangerous => "‼️",
    }
}
