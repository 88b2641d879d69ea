use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque post identifier as stored in the graph (`Tweet.tweetId`).
pub type PostId = String;

/// Weakly-connected component id assigned by the backend for one run.
pub type ComponentId = i64;

// --- Subjects ---

/// An author whose involvement in reply threads is being studied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Name of the per-subject projection on the graph server.
    ///
    /// ASCII letters and digits are kept; every other byte, `_` included,
    /// becomes `_` plus two hex digits. The encoding is reversible, so two
    /// distinct subject ids never share a projection.
    pub fn scope_name(&self) -> String {
        let mut name = String::with_capacity("replies_".len() + self.id.len());
        name.push_str("replies_");
        for byte in self.id.bytes() {
            if byte.is_ascii_alphanumeric() {
                name.push(byte as char);
            } else {
                name.push_str(&format!("_{byte:02x}"));
            }
        }
        name
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.id, name),
            None => write!(f, "{}", self.id),
        }
    }
}

// --- Conversations ---

/// Placement of a post relative to the subject's participation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionLabel {
    /// Subject post, or any post between the first and last subject post.
    Involved,
    /// Non-subject post before the first subject post.
    Pre,
    /// Non-subject post after the last subject post.
    Post,
}

impl PositionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Involved => "INVOLVED",
            Self::Pre => "PRE",
            Self::Post => "POST",
        }
    }

    /// Integer code used by the import files (`positionType:int`).
    pub fn code(&self) -> i64 {
        match self {
            Self::Involved => 0,
            Self::Pre => 1,
            Self::Post => 2,
        }
    }
}

impl fmt::Display for PositionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an extraction task hands to the sink: a labelled conversation that
/// has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedConversation {
    pub subject_id: String,
    pub posts: Vec<(PostId, PositionLabel)>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

/// One retained post inside a persisted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationMember {
    pub post_id: PostId,
    pub position: PositionLabel,
    pub sequence_index: usize,
}

/// The persisted output unit. Created once by the sink, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationRecord {
    pub conversation_id: u64,
    pub subject_id: String,
    pub members: Vec<ConversationMember>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

impl ConversationRecord {
    pub fn from_annotated(conversation_id: u64, conversation: AnnotatedConversation) -> Self {
        let members = conversation
            .posts
            .into_iter()
            .enumerate()
            .map(|(sequence_index, (post_id, position))| ConversationMember {
                post_id,
                position,
                sequence_index,
            })
            .collect();
        Self {
            conversation_id,
            subject_id: conversation.subject_id,
            members,
            started_at: conversation.started_at,
            ended_at: conversation.ended_at,
        }
    }

    /// External key, e.g. `c17`.
    pub fn key(&self) -> String {
        format!("c{}", self.conversation_id)
    }
}
