// AI margin-editor collaboration protocol.
//
// A single request operation: the surface POSTs a `CollabRequest`, the
// server answers a `CollabResponse`. Field names are camelCase on the wire.
//
// Every field is optional at the deserialization layer; the server's
// validator owns presence/shape checks so rejections can name the exact
// violated field instead of surfacing a serde error.

use serde::{Deserialize, Serialize};

/// Request body for `POST /v1/ai/collaborate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CollabRequest {
    /// One of "critique" or "synthesize".
    pub mode: Option<String>,
    pub user_prompt: Option<String>,
    pub context: Option<ContextPack>,
    /// Project Brain payload; shape-checked by the validator.
    pub brain: Option<serde_json::Value>,
    /// Opaque caller metadata, passed through untouched.
    pub meta: Option<serde_json::Value>,
}

/// The bundle of extracted text sent with an AI request.
///
/// Constructed fresh per request by the context-pack builder; never
/// persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextPack {
    /// Trimmed text of the current range selection; empty when there is no
    /// range.
    pub selected_text: String,
    /// The block containing the selection plus nearby blocks, joined with
    /// blank lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_context: Option<String>,
    /// Depth-ordered heading outline, one `#`-prefixed line per heading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outline: Option<String>,
    /// Whole document text; only present when explicitly requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_doc_text: Option<String>,
    /// Attached source excerpts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// Response body for the collaboration endpoint.
///
/// Provider failures and timeouts are masked into a plain `message` with a
/// 200 status, so this shape covers every non-validation outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CollabResponse {
    pub message: String,
    /// Synthesize mode's proposed rewrite, when the reply parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarifying_question: Option<String>,
}

impl CollabResponse {
    pub fn message_only(message: impl Into<String>) -> Self {
        Self { message: message.into(), proposed_text: None, clarifying_question: None }
    }
}
