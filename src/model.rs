/// Core archive records and the user table.
///
/// The chat and reaction tables are plain chronologically ordered vectors of
/// these records; every derived ranking is recomputed from them per request.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum nicknames a single user may accumulate.
pub const MAX_NICKNAMES: usize = 5;
/// Username length bounds (also applied to nicknames).
pub const MIN_NAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 20;

/// Reactions counted as negative for the "most disliked" style rankings.
pub const NEGATIVE_EMOJIS: &[&str] = &[
    "👎", "😢", "😭", "🤬", "🤡", "💩", "😫", "😩", "🥶", "🤨", "🧐", "🙃", "😒", "😠", "😣", "🗿",
];

/// Kind of a stored chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    VideoNote,
    Audio,
    Gif,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::VideoNote => "video_note",
            Self::Audio => "audio",
            Self::Gif => "gif",
        }
    }

    /// File extension used for the stored media of this kind.
    pub fn media_extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Image => "jpg",
            Self::Video | Self::VideoNote => "mp4",
            Self::Audio => "ogg",
            Self::Gif => "gif",
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "video_note" => Ok(Self::VideoNote),
            "audio" => Ok(Self::Audio),
            "gif" => Ok(Self::Gif),
            other => Err(format!("unknown message kind: {}", other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment class used to partition reactions before counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    All,
    Negative,
    Positive,
}

impl Sentiment {
    /// Whether an emoji belongs to this class.
    pub fn matches(&self, emoji: &str) -> bool {
        match self {
            Self::All => true,
            Self::Negative => NEGATIVE_EMOJIS.contains(&emoji),
            Self::Positive => !NEGATIVE_EMOJIS.contains(&emoji),
        }
    }

    /// Listing label prefix ("Top messages" vs "Worst messages").
    pub fn label(&self) -> &'static str {
        match self {
            Self::All | Self::Positive => "Top",
            Self::Negative => "Worst",
        }
    }
}

/// One message from the cleaned chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: i64,
    /// Author's resolved display username.
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    /// Empty string when the message carries no text.
    pub text: String,
    /// Reaction emojis attached to the message, in arrival order.
    pub reaction_emojis: Vec<String>,
}

impl MessageRecord {
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn reaction_count(&self) -> usize {
        self.reaction_emojis.len()
    }
}

/// One reaction event, independent of the per-message emoji list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub reacting_username: String,
    pub reacted_to_username: String,
    pub emoji: String,
    pub timestamp: DateTime<Utc>,
}

/// Rows that carry an event timestamp and can be window-filtered.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for MessageRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for ReactionRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A chat member with a stable id, mutable display username and nicknames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub nicknames: Vec<String>,
}

/// User-table mutation failures, surfaced to the requester as plain text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("Nickname *{nickname}* not added for *{username}*. Nicknames limit is {limit}.")]
    NicknameLimit {
        nickname: String,
        username: String,
        limit: usize,
    },
    #[error("Username *{0}* is already taken.")]
    UsernameTaken(String),
    #[error("Unknown user id: {0}")]
    UnknownUser(i64),
}

/// Ordered user table, keyed by id and searchable by display username.
///
/// Row order is the persisted table order; username resolution depends on it
/// (first substring match wins).
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    users: Vec<UserRecord>,
}

impl UserTable {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self { users }
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.iter()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, user_id: i64) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    pub fn usernames(&self) -> Vec<&str> {
        self.users.iter().map(|u| u.username.as_str()).collect()
    }

    /// Resolve a free-form query against display usernames.
    ///
    /// A case-insensitive exact match always wins; only when none exists and
    /// the query is at least 3 characters long does a case-insensitive
    /// substring match apply, first match in table order.
    pub fn resolve(&self, query: &str) -> Option<&UserRecord> {
        let needle = query.to_lowercase();

        if let Some(user) = self
            .users
            .iter()
            .find(|u| u.username.to_lowercase() == needle)
        {
            return Some(user);
        }

        if needle.chars().count() >= MIN_NAME_LEN {
            return self
                .users
                .iter()
                .find(|u| u.username.to_lowercase().contains(&needle));
        }

        None
    }

    /// Append a nickname for a user, bounded by [`MAX_NICKNAMES`].
    ///
    /// On rejection the stored nickname list is left untouched.
    pub fn add_nickname(&mut self, user_id: i64, nickname: &str) -> Result<&UserRecord, UserError> {
        let user = self
            .users
            .iter_mut()
            .find(|u| u.user_id == user_id)
            .ok_or(UserError::UnknownUser(user_id))?;

        if user.nicknames.len() >= MAX_NICKNAMES {
            return Err(UserError::NicknameLimit {
                nickname: nickname.to_string(),
                username: user.username.clone(),
                limit: MAX_NICKNAMES,
            });
        }

        user.nicknames.push(nickname.to_string());
        Ok(user)
    }

    /// Change a user's display username; rejects names already in use.
    ///
    /// Length bounds are enforced upstream by the argument resolver.
    pub fn set_username(&mut self, user_id: i64, username: &str) -> Result<String, UserError> {
        if self
            .users
            .iter()
            .any(|u| u.user_id != user_id && u.username.eq_ignore_ascii_case(username))
        {
            return Err(UserError::UsernameTaken(username.to_string()));
        }

        let user = self
            .users
            .iter_mut()
            .find(|u| u.user_id == user_id)
            .ok_or(UserError::UnknownUser(user_id))?;

        let previous = std::mem::replace(&mut user.username, username.to_string());
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> UserTable {
        UserTable::new(vec![
            UserRecord {
                user_id: 1,
                username: "Alice".to_string(),
                nicknames: vec![],
            },
            UserRecord {
                user_id: 2,
                username: "alicja".to_string(),
                nicknames: vec![],
            },
            UserRecord {
                user_id: 3,
                username: "Bob".to_string(),
                nicknames: vec![],
            },
        ])
    }

    #[test]
    fn exact_match_wins_over_substring() {
        let users = table();
        // "alice" is a substring of nothing before "Alice" exactly matches.
        let user = users.resolve("alice").unwrap();
        assert_eq!(user.user_id, 1);

        // Exact match on a later row beats an earlier substring match.
        let user = users.resolve("ALICJA").unwrap();
        assert_eq!(user.user_id, 2);
    }

    #[test]
    fn substring_match_requires_three_chars() {
        let users = table();
        assert!(users.resolve("al").is_none());
        let user = users.resolve("ali").unwrap();
        assert_eq!(user.user_id, 1);
    }

    #[test]
    fn resolve_unknown_user() {
        let users = table();
        assert!(users.resolve("charlie").is_none());
    }

    #[test]
    fn nickname_limit_rejected_and_list_unchanged() {
        let mut users = table();
        for i in 0..MAX_NICKNAMES {
            users.add_nickname(1, &format!("nick{}", i)).unwrap();
        }

        let err = users.add_nickname(1, "one-too-many").unwrap_err();
        assert_eq!(
            err,
            UserError::NicknameLimit {
                nickname: "one-too-many".to_string(),
                username: "Alice".to_string(),
                limit: MAX_NICKNAMES,
            }
        );
        assert!(err.to_string().contains("limit is 5"));
        assert_eq!(users.get(1).unwrap().nicknames.len(), MAX_NICKNAMES);
    }

    #[test]
    fn set_username_rejects_duplicates() {
        let mut users = table();
        let err = users.set_username(3, "alice").unwrap_err();
        assert_eq!(err, UserError::UsernameTaken("alice".to_string()));

        let previous = users.set_username(3, "Bobby").unwrap();
        assert_eq!(previous, "Bob");
        assert_eq!(users.get(3).unwrap().username, "Bobby");
    }

    #[test]
    fn negative_sentiment_partition() {
        assert!(Sentiment::Negative.matches("👎"));
        assert!(!Sentiment::Negative.matches("👍"));
        assert!(Sentiment::Positive.matches("👍"));
        assert!(!Sentiment::Positive.matches("💩"));
        assert!(Sentiment::All.matches("💩"));
    }
}
