use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::chat::{CHAT_RETENTION, ChatLog, ChatMessage};
use crate::error::SessionError;
use crate::polls::{HISTORY_LIMIT, OptionInput, Poll, PollLedger};
use crate::rooms::{RoomDirectory, RoomMember};
use crate::store::SessionStore;
use crate::users::{Participant, ParticipantRegistry, Role};

struct SessionState {
    participants: ParticipantRegistry,
    polls: PollLedger,
    rooms: RoomDirectory,
    chat: ChatLog,
}

/// The one coordinator every connection talks to. A single lock serializes
/// session mutations, and storage writes happen under it, so the persisted
/// order always matches the committed order. Methods return plain values;
/// deciding who hears about a change is the gateway's job.
pub struct SessionHub {
    store: Arc<dyn SessionStore>,
    state: Mutex<SessionState>,
}

impl SessionHub {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        SessionHub {
            store,
            state: Mutex::new(SessionState {
                participants: ParticipantRegistry::new(),
                polls: PollLedger::new(),
                rooms: RoomDirectory::new(),
                chat: ChatLog::new(),
            }),
        }
    }

    /// Reloads polls and recent chat from storage. An active poll survives
    /// a process restart with its votes and deadline intact.
    pub async fn hydrate(&self) -> Result<(), SessionError> {
        let polls = self.store.load_polls().await?;
        let messages = self
            .store
            .load_recent_messages(CHAT_RETENTION as i64)
            .await?;

        let mut state = self.state.lock().await;
        info!(
            "restored {} polls and {} chat messages from storage",
            polls.len(),
            messages.len()
        );
        state.polls.absorb(polls);
        state.chat.absorb(messages);
        Ok(())
    }

    /// Registers or updates a participant; the role set is replaced
    /// wholesale.
    pub async fn select_roles(
        &self,
        connection_id: &str,
        roles: Vec<Role>,
        user_name: Option<&str>,
    ) -> Result<Participant, SessionError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let record = state.participants.merged(connection_id, roles, user_name, now);
        self.store.save_participant(&record).await?;
        state.participants.insert(record.clone());
        Ok(record)
    }

    pub async fn create_poll(
        &self,
        connection_id: &str,
        question: String,
        options: Vec<OptionInput>,
        time_limit: Option<i64>,
    ) -> Result<Poll, SessionError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if !state.participants.has_role(connection_id, Role::Teacher) {
            return Err(SessionError::Unauthorized("Only teachers can create polls"));
        }
        if !state.polls.can_create(now) {
            return Err(SessionError::InvalidState(
                "Cannot create new poll. Please wait for all students to answer the current question or for it to expire.",
            ));
        }

        let poll = Poll::new(question, options, time_limit, connection_id, now);
        self.store.deactivate_active_polls().await?;
        self.store.insert_poll(&poll).await?;

        let poll = state.polls.insert_active(poll);
        state.rooms.ensure(poll.id);
        info!("poll {} created by {connection_id}", poll.id);
        Ok(poll)
    }

    /// Validates and records one vote, returning the updated poll for tally
    /// broadcast. A caller without the student role is upserted as a student
    /// first, replacing whatever role set it had. Votes are keyed by the
    /// caller-supplied user id when one is given, otherwise by connection
    /// id, and a repeat vote under the same key replaces the earlier choice.
    pub async fn submit_vote(
        &self,
        connection_id: &str,
        poll_id: Uuid,
        option: &str,
        user_name: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Poll, SessionError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if !state.participants.has_role(connection_id, Role::Student) {
            let record =
                state
                    .participants
                    .merged(connection_id, vec![Role::Student], user_name, now);
            self.store.save_participant(&record).await?;
            state.participants.insert(record);
            info!("registered voting student {connection_id}");
        }

        let voter_id = match user_id {
            Some(id) if !id.is_empty() => id,
            _ => connection_id,
        };
        let vote = state
            .polls
            .prepare_vote(poll_id, voter_id, user_name, option, now)?;
        self.store.upsert_vote(poll_id, &vote).await?;
        state.polls.apply_vote(poll_id, vote)
    }

    /// Snapshot for a connection that just asked what is running: the
    /// active poll, seconds left, and whether this connection already
    /// voted under its own id.
    pub async fn active_poll(&self, connection_id: &str) -> Option<(Poll, i64, bool)> {
        let now = Utc::now();
        let state = self.state.lock().await;
        let poll = state.polls.active()?;
        Some((
            poll.clone(),
            poll.remaining_time(now),
            poll.has_voted(connection_id),
        ))
    }

    pub async fn recovery_poll(&self) -> Option<(Poll, i64)> {
        let now = Utc::now();
        let state = self.state.lock().await;
        let poll = state.polls.active()?;
        Some((poll.clone(), poll.remaining_time(now)))
    }

    pub async fn poll_history(&self) -> Vec<Poll> {
        self.state.lock().await.polls.history(HISTORY_LIMIT)
    }

    /// Membership requires the poll to exist; any poll will do, closed ones
    /// included, so latecomers can watch final tallies. A display name in
    /// the join payload wins over the registered one.
    pub async fn join_room(
        &self,
        connection_id: &str,
        poll_id: Uuid,
        user_name: Option<&str>,
    ) -> Result<Vec<RoomMember>, SessionError> {
        let mut state = self.state.lock().await;
        if state.polls.get(poll_id).is_none() {
            return Err(SessionError::PollNotFound);
        }

        let record = state.participants.get(connection_id);
        let user_name = match user_name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => record.and_then(|p| p.user_name.clone()).unwrap_or_default(),
        };
        let role = record.map(|p| p.primary_role()).unwrap_or(Role::Student);
        let member = RoomMember {
            user_name,
            socket_id: connection_id.to_string(),
            role,
        };
        Ok(state.rooms.join(poll_id, member))
    }

    pub async fn leave_room(
        &self,
        connection_id: &str,
        poll_id: Uuid,
    ) -> Option<Vec<RoomMember>> {
        self.state.lock().await.rooms.remove(poll_id, connection_id)
    }

    /// Teacher-only removal of another connection from a room. Returns the
    /// updated roster when the target was actually a member.
    pub async fn kick(
        &self,
        connection_id: &str,
        poll_id: Uuid,
        target_socket_id: &str,
    ) -> Result<Option<Vec<RoomMember>>, SessionError> {
        let mut state = self.state.lock().await;
        if !state.participants.has_role(connection_id, Role::Teacher) {
            return Err(SessionError::Unauthorized("Only teachers can kick users"));
        }
        Ok(state.rooms.remove(poll_id, target_socket_id))
    }

    /// Clears a closed connection out of every room, returning the rooms
    /// that actually changed. Participant records are left in place.
    pub async fn disconnect(&self, connection_id: &str) -> Vec<(Uuid, Vec<RoomMember>)> {
        self.state.lock().await.rooms.disconnect(connection_id)
    }

    pub async fn send_chat(
        &self,
        connection_id: &str,
        user_name: Option<&str>,
        text: String,
    ) -> Result<ChatMessage, SessionError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let message = ChatMessage::new(user_name, text, connection_id, now);
        self.store.insert_message(&message).await?;
        state.chat.push(message.clone());
        Ok(message)
    }

    pub async fn chat_messages(&self, limit: usize) -> Vec<ChatMessage> {
        self.state.lock().await.chat.recent(limit)
    }
}
