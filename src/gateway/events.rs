use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::ChatMessage;
use crate::polls::{OptionInput, Poll};
use crate::rooms::RoomMember;
use crate::users::Role;

/// Every frame on the wire is `{"event": <name>, "data": <payload>}` in
/// both directions, with kebab-case event names and camelCase payload
/// fields.
#[derive(Debug, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    SelectRoles {
        roles: Vec<Role>,
        user_name: Option<String>,
    },
    CreatePoll {
        question: String,
        options: Vec<OptionInput>,
        time_limit: Option<i64>,
    },
    SubmitVote {
        poll_id: Option<Uuid>,
        option: String,
        user_name: Option<String>,
        user_id: Option<String>,
    },
    GetActivePoll,
    JoinPollRoom {
        poll_id: Option<Uuid>,
        user_name: Option<String>,
    },
    LeavePollRoom {
        poll_id: Option<Uuid>,
    },
    /// Subscribes to a poll's updates without appearing on its roster.
    JoinPoll {
        poll_id: Option<Uuid>,
    },
    SendChatMessage {
        message: String,
        user_name: Option<String>,
    },
    GetChatMessages,
    KickUser {
        poll_id: Option<Uuid>,
        socket_id: Option<String>,
    },
    GetPollHistory,
}

#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    RolesSelected(RoleSelection),
    PollCreated(PollResult),
    VoteSubmitted(PollResult),
    ActivePoll(ActivePollSnapshot),
    NewPoll(Poll),
    PollUpdated(Poll),
    ParticipantsUpdated(Vec<RoomMember>),
    ChatMessage(ChatMessage),
    ChatHistory(ChatHistory),
    UserKicked { poll_id: Uuid },
    PollHistory(Vec<Poll>),
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSelection {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoleSelection {
    pub fn ok(roles: Vec<Role>) -> Self {
        RoleSelection {
            success: true,
            roles: Some(roles),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        RoleSelection {
            success: false,
            roles: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<Poll>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollResult {
    pub fn ok(poll: Poll) -> Self {
        PollResult {
            success: true,
            poll: Some(poll),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        PollResult {
            success: false,
            poll: None,
            error: Some(error),
        }
    }
}

/// `poll` stays `null` on the wire when nothing is running, so clients can
/// bind to it without probing for the field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePollSnapshot {
    pub success: bool,
    pub poll: Option<Poll>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_voted: Option<bool>,
}

impl ActivePollSnapshot {
    pub fn running(poll: Poll, remaining_time: i64, has_voted: bool) -> Self {
        ActivePollSnapshot {
            success: true,
            poll: Some(poll),
            remaining_time: Some(remaining_time),
            has_voted: Some(has_voted),
        }
    }

    pub fn idle() -> Self {
        ActivePollSnapshot {
            success: false,
            poll: None,
            remaining_time: None,
            has_voted: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    pub success: bool,
    pub messages: Vec<ChatMessage>,
}
