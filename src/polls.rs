use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

pub const DEFAULT_TIME_LIMIT_SECS: i64 = 60;
pub const HISTORY_LIMIT: usize = 50;

/// Poll options arrive either as bare text or as `{text, isCorrect}`.
/// The shape is resolved exactly once, at poll creation; nothing downstream
/// branches on it again.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionInput {
    Text(String),
    #[serde(rename_all = "camelCase")]
    Detailed {
        text: String,
        #[serde(default)]
        is_correct: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub user_id: String,
    pub user_name: String,
    pub option: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answers: Vec<usize>,
    pub created_by: String,
    pub time_limit: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub votes: Vec<Vote>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Poll {
    /// Normalizes the raw option inputs and builds a fresh active poll.
    /// Option texts are trimmed; correct-answer indices are collected from
    /// flagged entries in their original order. A missing or non-positive
    /// time limit falls back to 60 seconds.
    pub fn new(
        question: String,
        options: Vec<OptionInput>,
        time_limit: Option<i64>,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let mut texts = Vec::with_capacity(options.len());
        let mut correct_answers = Vec::new();
        for (index, option) in options.into_iter().enumerate() {
            match option {
                OptionInput::Text(text) => texts.push(text.trim().to_string()),
                OptionInput::Detailed { text, is_correct } => {
                    texts.push(text.trim().to_string());
                    if is_correct {
                        correct_answers.push(index);
                    }
                }
            }
        }
        Poll {
            id: Uuid::new_v4(),
            question,
            options: texts,
            correct_answers,
            created_by: created_by.to_string(),
            time_limit: time_limit.filter(|t| *t > 0).unwrap_or(DEFAULT_TIME_LIMIT_SECS),
            start_time: Some(now),
            votes: Vec::new(),
            created_at: now,
            is_active: true,
        }
    }

    fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<f64> {
        self.start_time
            .map(|start| (now - start).num_milliseconds() as f64 / 1000.0)
    }

    /// A poll without a start time never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.elapsed_secs(now) {
            Some(elapsed) => elapsed > self.time_limit as f64,
            None => false,
        }
    }

    /// Whole seconds left to answer, rounded up and clamped to zero.
    /// Zero for inactive polls and polls that never started.
    pub fn remaining_time(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_active {
            return 0;
        }
        match self.elapsed_secs(now) {
            Some(elapsed) => (self.time_limit as f64 - elapsed).max(0.0).ceil() as i64,
            None => 0,
        }
    }

    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.votes.iter().any(|v| v.user_id == voter_id)
    }

    /// Records a vote, overwriting option and timestamp in place when the
    /// voter already voted. The stored display name is kept on overwrite.
    fn record_vote(&mut self, vote: Vote) {
        match self.votes.iter_mut().find(|v| v.user_id == vote.user_id) {
            Some(existing) => {
                existing.option = vote.option;
                existing.timestamp = vote.timestamp;
            }
            None => self.votes.push(vote),
        }
    }
}

/// All polls the process knows about, in creation order. At most one is
/// active at any time; deactivation is terminal. Expiry is evaluated lazily
/// against a caller-supplied clock, never by a background timer.
#[derive(Default)]
pub struct PollLedger {
    polls: Vec<Poll>,
}

impl PollLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads persisted polls at startup. Storage may hold more than one
    /// active row after a crash; only the newest keeps its active flag.
    pub fn absorb(&mut self, mut polls: Vec<Poll>) {
        polls.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if let Some(newest_active) = polls.iter().rposition(|p| p.is_active) {
            let mut repaired = 0;
            for poll in &mut polls[..newest_active] {
                if poll.is_active {
                    poll.is_active = false;
                    repaired += 1;
                }
            }
            if repaired > 0 {
                warn!("found {repaired} extra active polls in storage, kept only the newest");
            }
        }
        self.polls = polls;
    }

    /// The admission gate: a new poll may be created when no poll is active,
    /// when the active poll has outlived its time limit (it is deactivated
    /// here as a side effect), or when the active poll has collected no
    /// votes yet. An active, unexpired poll with at least one vote blocks
    /// creation.
    pub fn can_create(&mut self, now: DateTime<Utc>) -> bool {
        let Some(active) = self.polls.iter_mut().find(|p| p.is_active) else {
            return true;
        };
        if active.is_expired(now) {
            active.is_active = false;
            return true;
        }
        active.votes.is_empty()
    }

    /// Installs a freshly created poll, deactivating whatever was active.
    /// Admission is the caller's responsibility.
    pub fn insert_active(&mut self, poll: Poll) -> Poll {
        for existing in &mut self.polls {
            existing.is_active = false;
        }
        let snapshot = poll.clone();
        self.polls.push(poll);
        snapshot
    }

    pub fn get(&self, poll_id: Uuid) -> Option<&Poll> {
        self.polls.iter().find(|p| p.id == poll_id)
    }

    pub fn active(&self) -> Option<&Poll> {
        self.polls.iter().find(|p| p.is_active)
    }

    /// Validates a vote attempt and builds the vote value to persist.
    /// Nothing is committed here; `apply_vote` does that once storage has
    /// accepted the write.
    pub fn prepare_vote(
        &self,
        poll_id: Uuid,
        voter_id: &str,
        user_name: Option<&str>,
        option: &str,
        now: DateTime<Utc>,
    ) -> Result<Vote, SessionError> {
        let poll = self.get(poll_id).ok_or(SessionError::PollNotFound)?;
        if !poll.is_active {
            return Err(SessionError::InvalidState("Poll is not active"));
        }
        if poll.is_expired(now) {
            return Err(SessionError::Expired);
        }
        let user_name = match user_name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => "Anonymous".to_string(),
        };
        Ok(Vote {
            user_id: voter_id.to_string(),
            user_name,
            option: option.to_string(),
            timestamp: now,
        })
    }

    /// Commits a prepared vote and returns the full updated poll for tally
    /// display.
    pub fn apply_vote(&mut self, poll_id: Uuid, vote: Vote) -> Result<Poll, SessionError> {
        let poll = self
            .polls
            .iter_mut()
            .find(|p| p.id == poll_id)
            .ok_or(SessionError::PollNotFound)?;
        poll.record_vote(vote);
        Ok(poll.clone())
    }

    /// Inactive polls, newest creation first, capped.
    pub fn history(&self, limit: usize) -> Vec<Poll> {
        let mut inactive: Vec<&Poll> = self.polls.iter().filter(|p| !p.is_active).collect();
        inactive.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        inactive.into_iter().take(limit).cloned().collect()
    }
}
