// Request validation for the collaboration endpoint.
//
// Checks run in a fixed order and stop at the first violated field, so a
// rejection always carries one specific message naming that field. Nothing
// is dispatched to the provider until the whole request validates.

use chrono::{DateTime, Utc};
use serde_json::Value;

use marginalia_common::protocol::collab::{CollabRequest, ContextPack};
use marginalia_common::types::{AiMode, Decision, GlossaryEntry, ProjectBrain};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: &'static str,
}

const fn invalid(field: &'static str, message: &'static str) -> ValidationError {
    ValidationError { field, message }
}

/// A request that passed every check, with typed fields.
#[derive(Debug, Clone)]
pub struct ValidRequest {
    pub mode: AiMode,
    pub user_prompt: String,
    pub context: ContextPack,
    pub brain: Option<ProjectBrain>,
}

pub fn validate(request: &CollabRequest) -> Result<ValidRequest, ValidationError> {
    let mode = request
        .mode
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(invalid("mode", "mode is required"))
        .and_then(|raw| {
            AiMode::parse(raw).ok_or(invalid("mode", "mode must be one of: critique, synthesize"))
        })?;

    let user_prompt = request
        .user_prompt
        .as_deref()
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .ok_or(invalid("userPrompt", "userPrompt must not be empty"))?
        .to_string();

    let context = request
        .context
        .clone()
        .filter(|context| !context.selected_text.trim().is_empty())
        .ok_or(invalid("context.selectedText", "context.selectedText must not be empty"))?;

    let brain = match &request.brain {
        None => None,
        Some(value) => Some(brain_from_payload(value)?),
    };

    Ok(ValidRequest { mode, user_prompt, context, brain })
}

/// Shape-check the brain payload field by field. Each field is optional,
/// but a present field must match its expected shape.
fn brain_from_payload(value: &Value) -> Result<ProjectBrain, ValidationError> {
    let object = value
        .as_object()
        .ok_or(invalid("brain", "brain must be an object"))?;

    let goal = match object.get("goal") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(goal)) => goal.clone(),
        Some(_) => return Err(invalid("brain.goal", "brain.goal must be text")),
    };

    let constraints = match object.get("constraints") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or(invalid("brain.constraints", "brain.constraints must be a list of text entries"))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(invalid("brain.constraints", "brain.constraints must be a list of text entries"))
        }
    };

    let glossary = match object.get("glossary") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let term = item.get("term").and_then(Value::as_str);
                let definition = item.get("definition").and_then(Value::as_str);
                match (term, definition) {
                    (Some(term), Some(definition)) => Ok(GlossaryEntry {
                        term: term.to_string(),
                        definition: definition.to_string(),
                    }),
                    _ => Err(invalid(
                        "brain.glossary",
                        "brain.glossary must be a list of term/definition pairs",
                    )),
                }
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(invalid(
                "brain.glossary",
                "brain.glossary must be a list of term/definition pairs",
            ))
        }
    };

    let decisions = match object.get("decisions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let text = item
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or(invalid(
                        "brain.decisions",
                        "brain.decisions must be a list of decision entries",
                    ))?;
                let created_at = item
                    .get("createdAt")
                    .and_then(Value::as_str)
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|parsed| parsed.with_timezone(&Utc));
                Ok(Decision { text: text.to_string(), created_at })
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(invalid(
                "brain.decisions",
                "brain.decisions must be a list of decision entries",
            ))
        }
    };

    Ok(ProjectBrain { goal, constraints, glossary, decisions })
}
