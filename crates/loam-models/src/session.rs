//! Session and turn types.
//!
//! A session is a conversation scoped to exactly one folder. Its turns are
//! append-only: a session's history only ever grows until the whole session
//! is archived by the retention sweep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::folder::FolderPath;
use crate::ids::SessionId;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Message sent by the user.
    User,
    /// Reply produced by the agent.
    Agent,
}

/// One message in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Author of the turn.
    pub role: Role,
    /// Message text.
    pub text: String,
    /// When the turn was recorded.
    pub at: DateTime<Utc>,
}

impl Turn {
    /// Creates a user turn stamped with the current time.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    /// Creates an agent turn stamped with the current time.
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// A conversational thread within one folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Identifier, unique within the owning folder.
    pub id: SessionId,

    /// Optional user-given title.
    #[serde(default)]
    pub title: Option<String>,

    /// Starred sessions are never evicted.
    #[serde(default)]
    pub starred: bool,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session last received a turn or was created.
    pub last_active_at: DateTime<Utc>,

    /// Ordered turn history, oldest first.
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Session {
    /// Creates an empty session.
    pub fn new(id: SessionId, title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            starred: false,
            created_at: now,
            last_active_at: now,
            turns: Vec::new(),
        }
    }

    /// Appends a turn and refreshes `last_active_at`.
    pub fn push_turn(&mut self, turn: Turn) {
        if turn.at > self.last_active_at {
            self.last_active_at = turn.at;
        }
        self.turns.push(turn);
    }

    /// Returns the last `window` turns (all turns when `window` is `None`).
    pub fn recent_turns(&self, window: Option<usize>) -> &[Turn] {
        match window {
            Some(window) if self.turns.len() > window => {
                &self.turns[self.turns.len() - window..]
            }
            _ => &self.turns,
        }
    }

    /// Title, or a placeholder for unnamed sessions.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or("(unnamed)")
    }

    /// Builds a listing summary for this session.
    pub fn summary(&self, folder: &FolderPath) -> SessionSummary {
        SessionSummary {
            folder: folder.clone(),
            id: self.id.clone(),
            title: self.title.clone(),
            starred: self.starred,
            created_at: self.created_at,
            last_active_at: self.last_active_at,
            turn_count: self.turns.len(),
        }
    }
}

/// Lightweight view of a session used by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Folder owning the session.
    pub folder: FolderPath,
    /// Session identifier.
    pub id: SessionId,
    /// Optional title.
    pub title: Option<String>,
    /// Star flag.
    pub starred: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last activity time.
    pub last_active_at: DateTime<Utc>,
    /// Number of stored turns.
    pub turn_count: usize,
}

impl SessionSummary {
    /// Title, or a placeholder for unnamed sessions.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or("(unnamed)")
    }

    /// Handle used to select the session from chat: `folder#id`.
    pub fn handle(&self) -> String {
        format!("{}#{}", self.folder, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> Session {
        Session::new(SessionId::from_string("s-00000001"), None)
    }

    #[test]
    fn test_push_turn_updates_last_active() {
        let mut s = session();
        let mut turn = Turn::user("hello");
        turn.at = s.last_active_at + Duration::seconds(5);
        let expected = turn.at;

        s.push_turn(turn);
        assert_eq!(s.turns.len(), 1);
        assert_eq!(s.last_active_at, expected);
    }

    #[test]
    fn test_history_only_grows() {
        let mut s = session();
        for i in 0..200 {
            s.push_turn(Turn::user(format!("m{}", i)));
            assert_eq!(s.turns.len(), i + 1);
        }
        assert_eq!(s.turns[0].text, "m0");
        assert_eq!(s.turns[199].text, "m199");
    }

    #[test]
    fn test_recent_turns_window() {
        let mut s = session();
        for i in 0..4 {
            s.push_turn(Turn::user(format!("m{}", i)));
        }
        let recent = s.recent_turns(Some(2));
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "m2");
        assert_eq!(s.recent_turns(None).len(), 4);
        assert_eq!(s.recent_turns(Some(10)).len(), 4);
        assert!(s.recent_turns(Some(0)).is_empty());
    }

    #[test]
    fn test_summary_handle() {
        let folder = FolderPath::parse("philosophy").unwrap();
        let mut s = session();
        s.title = Some("Free will".to_string());
        let summary = s.summary(&folder);
        assert_eq!(summary.handle(), "philosophy#s-00000001");
        assert_eq!(summary.display_name(), "Free will");
        assert_eq!(session().display_name(), "(unnamed)");
    }
}
