use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::chat::ChatMessage;
use crate::db::connection::DbPool;
use crate::db::repositories::{chat_repository, poll_repository, user_repository, vote_repository};
use crate::error::SessionError;
use crate::polls::{Poll, Vote};
use crate::users::Participant;

/// Durable storage behind the session hub. Writes happen before the
/// matching in-memory commit, so a store that rejects a write leaves the
/// session exactly as it was.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_participant(&self, participant: &Participant) -> Result<(), SessionError>;
    async fn deactivate_active_polls(&self) -> Result<(), SessionError>;
    async fn insert_poll(&self, poll: &Poll) -> Result<(), SessionError>;
    async fn upsert_vote(&self, poll_id: Uuid, vote: &Vote) -> Result<(), SessionError>;
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), SessionError>;
    async fn load_polls(&self) -> Result<Vec<Poll>, SessionError>;
    async fn load_recent_messages(&self, limit: i64) -> Result<Vec<ChatMessage>, SessionError>;
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn save_participant(&self, participant: &Participant) -> Result<(), SessionError> {
        user_repository::upsert_participant(&self.pool, participant).await?;
        Ok(())
    }

    async fn deactivate_active_polls(&self) -> Result<(), SessionError> {
        poll_repository::deactivate_active_polls(&self.pool).await?;
        Ok(())
    }

    async fn insert_poll(&self, poll: &Poll) -> Result<(), SessionError> {
        poll_repository::insert_poll(&self.pool, poll).await?;
        Ok(())
    }

    async fn upsert_vote(&self, poll_id: Uuid, vote: &Vote) -> Result<(), SessionError> {
        vote_repository::upsert_vote(&self.pool, poll_id, vote).await?;
        Ok(())
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), SessionError> {
        chat_repository::insert_message(&self.pool, message).await?;
        Ok(())
    }

    async fn load_polls(&self) -> Result<Vec<Poll>, SessionError> {
        let poll_rows = poll_repository::all_polls(&self.pool).await?;
        let vote_rows = vote_repository::all_votes(&self.pool).await?;

        let mut votes_by_poll: HashMap<Uuid, Vec<Vote>> = HashMap::new();
        for row in vote_rows {
            votes_by_poll.entry(row.poll_id).or_default().push(row.into());
        }

        Ok(poll_rows
            .into_iter()
            .map(|row| {
                let votes = votes_by_poll.remove(&row.id).unwrap_or_default();
                row.into_poll(votes)
            })
            .collect())
    }

    async fn load_recent_messages(&self, limit: i64) -> Result<Vec<ChatMessage>, SessionError> {
        let rows = chat_repository::recent_messages(&self.pool, limit).await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }
}

/// Store double for hub tests. Records every accepted write and can be
/// switched to reject writes wholesale.
#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        fail_writes: AtomicBool,
        pub participants: Mutex<Vec<Participant>>,
        pub polls: Mutex<Vec<Poll>>,
        pub votes: Mutex<Vec<(Uuid, Vote)>>,
        pub messages: Mutex<Vec<ChatMessage>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        fn gate(&self) -> Result<(), SessionError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(SessionError::Persistence("storage offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
        async fn save_participant(&self, participant: &Participant) -> Result<(), SessionError> {
            self.gate()?;
            self.participants.lock().unwrap().push(participant.clone());
            Ok(())
        }

        async fn deactivate_active_polls(&self) -> Result<(), SessionError> {
            self.gate()?;
            for poll in self.polls.lock().unwrap().iter_mut() {
                poll.is_active = false;
            }
            Ok(())
        }

        async fn insert_poll(&self, poll: &Poll) -> Result<(), SessionError> {
            self.gate()?;
            self.polls.lock().unwrap().push(poll.clone());
            Ok(())
        }

        async fn upsert_vote(&self, poll_id: Uuid, vote: &Vote) -> Result<(), SessionError> {
            self.gate()?;
            self.votes.lock().unwrap().push((poll_id, vote.clone()));
            Ok(())
        }

        async fn insert_message(&self, message: &ChatMessage) -> Result<(), SessionError> {
            self.gate()?;
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn load_polls(&self) -> Result<Vec<Poll>, SessionError> {
            Ok(self.polls.lock().unwrap().clone())
        }

        async fn load_recent_messages(&self, limit: i64) -> Result<Vec<ChatMessage>, SessionError> {
            let messages = self.messages.lock().unwrap();
            let skip = messages.len().saturating_sub(limit as usize);
            Ok(messages.iter().skip(skip).cloned().collect())
        }
    }
}
