use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

/// One known participant, keyed by the connection id the gateway assigned.
/// Records are upserted on every role selection and never removed; a
/// disconnected participant simply goes stale.
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection_id: String,
    pub user_name: Option<String>,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// The role shown on rosters: first selected role, student when none.
    pub fn primary_role(&self) -> Role {
        self.roles.first().copied().unwrap_or(Role::Student)
    }
}

#[derive(Default)]
pub struct ParticipantRegistry {
    participants: HashMap<String, Participant>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the record an upsert would produce, without committing it.
    /// The hub persists the record first and commits with `insert` after.
    /// The role set is replaced wholesale; the display name is only updated
    /// when a non-empty one is supplied; the creation timestamp survives
    /// re-selection.
    pub fn merged(
        &self,
        connection_id: &str,
        roles: Vec<Role>,
        user_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Participant {
        let existing = self.participants.get(connection_id);
        let user_name = match user_name {
            Some(name) if !name.trim().is_empty() => Some(name.to_string()),
            _ => existing.and_then(|p| p.user_name.clone()),
        };
        Participant {
            connection_id: connection_id.to_string(),
            user_name,
            roles,
            created_at: existing.map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        }
    }

    pub fn insert(&mut self, participant: Participant) {
        self.participants
            .insert(participant.connection_id.clone(), participant);
    }

    pub fn get(&self, connection_id: &str) -> Option<&Participant> {
        self.participants.get(connection_id)
    }

    pub fn has_role(&self, connection_id: &str, role: Role) -> bool {
        self.get(connection_id).is_some_and(|p| p.has_role(role))
    }
}
