// Prompt assembly for the margin editor.
//
// The system instruction is fixed; the user message concatenates the
// request's pieces in a stable order: mode, request, selected text, local
// context, outline, Project Brain fields, full document text, sources,
// then a mode-specific closing instruction.

use marginalia_common::types::{AiMode, ProjectBrain};

use super::validate::ValidRequest;

pub const SYSTEM_INSTRUCTION: &str = "\
You are a margin editor: a careful collaborator working in the margins of a writer's draft.
Respond only when asked. Stay scoped to the selected text and its immediate context; do not rework other parts of the document.
Be concise. Ask at most one clarifying question, and only when you cannot proceed without it.
The human author has final authority over every word; offer changes, never insist on them.
Never fabricate sources, quotations, or facts the draft does not state.";

/// Build the user message for one validated request.
pub fn build_user_message(request: &ValidRequest) -> String {
    let mut sections: Vec<String> = Vec::new();

    sections.push(format!("Mode: {}", request.mode.as_str()));
    sections.push(format!("Request:\n{}", request.user_prompt));
    sections.push(format!("Selected text:\n{}", request.context.selected_text));

    if let Some(local) = nonempty(request.context.local_context.as_deref()) {
        sections.push(format!("Local context:\n{local}"));
    }
    if let Some(outline) = nonempty(request.context.outline.as_deref()) {
        sections.push(format!("Document outline:\n{outline}"));
    }
    if let Some(brain) = request.brain.as_ref().filter(|brain| !brain.is_empty()) {
        push_brain_sections(&mut sections, brain);
    }
    if let Some(full) = nonempty(request.context.full_doc_text.as_deref()) {
        sections.push(format!("Full document:\n{full}"));
    }
    if let Some(sources) = request.context.sources.as_ref().filter(|sources| !sources.is_empty()) {
        let listed: Vec<String> = sources.iter().map(|source| format!("- {source}")).collect();
        sections.push(format!("Sources:\n{}", listed.join("\n")));
    }

    sections.push(closing_instruction(request.mode).to_string());
    sections.join("\n\n")
}

fn push_brain_sections(sections: &mut Vec<String>, brain: &ProjectBrain) {
    if !brain.goal.trim().is_empty() {
        sections.push(format!("Project goal:\n{}", brain.goal));
    }
    if !brain.constraints.is_empty() {
        let listed: Vec<String> =
            brain.constraints.iter().map(|constraint| format!("- {constraint}")).collect();
        sections.push(format!("Constraints:\n{}", listed.join("\n")));
    }
    if !brain.glossary.is_empty() {
        let listed: Vec<String> = brain
            .glossary
            .iter()
            .map(|entry| format!("- {}: {}", entry.term, entry.definition))
            .collect();
        sections.push(format!("Glossary:\n{}", listed.join("\n")));
    }
    if !brain.decisions.is_empty() {
        let listed: Vec<String> =
            brain.decisions.iter().map(|decision| format!("- {}", decision.text)).collect();
        sections.push(format!("Decisions:\n{}", listed.join("\n")));
    }
}

fn closing_instruction(mode: AiMode) -> &'static str {
    match mode {
        AiMode::Critique => "Give feedback on the selected text.",
        AiMode::Synthesize => {
            "Propose an improved version of the selected text, preserving the author's voice. \
             Answer with a JSON object containing \"message\" and \"proposedText\"."
        }
    }
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}
