// Core domain types shared across all Marginalia crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A discussion anchored to a piece of document text.
///
/// Threads are owned by the persisted store. A thread never records its own
/// position: the live anchor is derived from content-tree marks on every
/// resolution pass, so the store and the content can never disagree about
/// where a thread points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: Uuid,
    pub doc_id: Uuid,
    /// Snapshot of the text the thread was created on. Display code prefers
    /// the live anchored text whenever a mark still resolves.
    pub highlighted_text: String,
    /// Insertion order; the first message is the thread's root.
    pub messages: Vec<Message>,
    pub resolved: bool,
    /// AI threads carry the margin-editor conversation and have no anchor
    /// requirement.
    pub is_ai_thread: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_mode: Option<AiMode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Create a human comment thread with its root message.
    pub fn new(doc_id: Uuid, highlighted_text: impl Into<String>, root: Message) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            doc_id,
            highlighted_text: highlighted_text.into(),
            messages: vec![root],
            resolved: false,
            is_ai_thread: false,
            ai_mode: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an AI discussion thread. AI threads are exempt from the
    /// one-mark-minimum invariant.
    pub fn new_ai(doc_id: Uuid, mode: AiMode, root: Message) -> Self {
        let mut thread = Self::new(doc_id, "", root);
        thread.is_ai_thread = true;
        thread.ai_mode = Some(mode);
        thread
    }

    /// The thread's root message, if any message survives.
    pub fn root(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A single message inside a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub author: AuthorKind,
    pub content: String,
    /// Only meaningful for model-authored messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author: AuthorKind::Human,
            content: content.into(),
            status: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn model(content: impl Into<String>, status: MessageStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author: AuthorKind::Model,
            content: content.into(),
            status: Some(status),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    Human,
    Model,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Complete,
    Error,
}

/// The two margin-editor collaboration modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiMode {
    Critique,
    Synthesize,
}

impl AiMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critique => "critique",
            Self::Synthesize => "synthesize",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critique" => Some(Self::Critique),
            "synthesize" => Some(Self::Synthesize),
            _ => None,
        }
    }
}

/// Persisted project-level context supplied read-only to AI requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectBrain {
    pub goal: String,
    pub constraints: Vec<String>,
    pub glossary: Vec<GlossaryEntry>,
    pub decisions: Vec<Decision>,
}

impl ProjectBrain {
    /// True when no field would contribute anything to a prompt.
    pub fn is_empty(&self) -> bool {
        self.goal.trim().is_empty()
            && self.constraints.is_empty()
            && self.glossary.is_empty()
            && self.decisions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GlossaryEntry {
    pub term: String,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
