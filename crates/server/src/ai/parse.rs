// Best-effort extraction of structured replies.
//
// Synthesize replies are asked for as a JSON object carrying `message` and
// `proposedText`, but free-form model output drifts. Extraction tries, in
// strict order, stopping at the first success:
//   1. a fenced code block's contents,
//   2. the first brace-delimited substring anywhere in the reply,
//   3. the whole reply.
// A tier succeeds only when both required fields come out. Exhausting all
// three tiers is a definitive fallback to the raw text as a plain message,
// not an error; no further guessing happens beyond these tiers.

use marginalia_common::protocol::collab::CollabResponse;
use marginalia_common::types::AiMode;

/// Turn a raw provider reply into the response payload for `mode`.
pub fn parse_collab_reply(mode: AiMode, raw: &str) -> CollabResponse {
    match mode {
        // Critique replies are the message, verbatim.
        AiMode::Critique => CollabResponse::message_only(raw),
        AiMode::Synthesize => {
            extract_synthesize(raw).unwrap_or_else(|| CollabResponse::message_only(raw))
        }
    }
}

fn extract_synthesize(raw: &str) -> Option<CollabResponse> {
    fenced_block(raw)
        .and_then(parse_reply_object)
        .or_else(|| brace_substring(raw).and_then(parse_reply_object))
        .or_else(|| parse_reply_object(raw))
}

/// Parse one candidate as the reply object. Both `message` and
/// `proposedText` must be present; otherwise the candidate is rejected and
/// the next tier runs.
fn parse_reply_object(candidate: &str) -> Option<CollabResponse> {
    let value: serde_json::Value = serde_json::from_str(candidate.trim()).ok()?;
    let message = value.get("message")?.as_str()?.to_string();
    let proposed_text = value.get("proposedText")?.as_str()?.to_string();
    let clarifying_question =
        value.get("clarifyingQuestion").and_then(|question| question.as_str()).map(String::from);

    Some(CollabResponse {
        message,
        proposed_text: Some(proposed_text),
        clarifying_question,
    })
}

/// Contents of the first fenced block, language tag line excluded.
fn fenced_block(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after_fence = &raw[open + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// First `{` through last `}`.
fn brace_substring(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}
