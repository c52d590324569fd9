use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chat::ChatMessage;
use crate::polls::{Poll, Vote};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollRow {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answers: Vec<i32>,
    pub created_by: String,
    pub time_limit: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl PollRow {
    pub fn into_poll(self, votes: Vec<Vote>) -> Poll {
        Poll {
            id: self.id,
            question: self.question,
            options: self.options,
            correct_answers: self
                .correct_answers
                .into_iter()
                .map(|i| i as usize)
                .collect(),
            created_by: self.created_by,
            time_limit: self.time_limit,
            start_time: self.start_time,
            votes,
            created_at: self.created_at,
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoteRow {
    pub poll_id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub option: String,
    pub created_at: DateTime<Utc>,
}

impl From<VoteRow> for Vote {
    fn from(row: VoteRow) -> Self {
        Vote {
            user_id: row.user_id,
            user_name: row.user_name,
            option: row.option,
            timestamp: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessageRow {
    pub user_name: String,
    pub message: String,
    pub socket_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        ChatMessage {
            user_name: row.user_name,
            message: row.message,
            socket_id: row.socket_id,
            timestamp: row.created_at,
        }
    }
}
