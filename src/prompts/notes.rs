//! Prompt builders for the two generation phases.
//!
//! User prompts are Tera templates rendered with the topic, the approved
//! outline (content phase only) and the optional customization text.

use tera::{Context, Tera};

use crate::error::GeneratorError;

/// System and user prompt for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePrompt {
    /// System prompt establishing the model's role.
    pub system: String,
    /// User prompt with the specific request.
    pub user: String,
}

impl NotePrompt {
    /// Creates a prompt pair.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// System prompt for outline drafting.
pub const STRUCTURE_SYSTEM: &str = r#"You are an experienced teacher planning a study note.

Produce a hierarchical markdown outline only: headings and short bullet points
describing what each section will cover. Do not write the note itself.

Rules:
- Start with a level-1 heading naming the topic
- 4 to 8 level-2 sections, ordered from fundamentals to applications
- Include a section for common misconceptions and one for review questions
- No preamble, no closing remarks"#;

/// User template for outline drafting.
pub const STRUCTURE_USER_TEMPLATE: &str = r#"Topic: {{ topic }}
{% if customization %}
Additional instructions from the author:
{{ customization }}
{% endif %}
Write the outline now."#;

/// System prompt for content generation.
pub const CONTENT_SYSTEM: &str = r#"You are an experienced teacher writing a complete study note in markdown.

Follow the provided outline exactly: keep its headings and their order, and
expand every bullet into clear explanatory prose with examples. Use tables,
lists and fenced code blocks where they help. Use mermaid code blocks for
diagrams when a process or hierarchy benefits from one.

Output only the finished markdown document."#;

/// User template for content generation.
pub const CONTENT_USER_TEMPLATE: &str = r#"Topic: {{ topic }}

Approved outline:
{{ structure }}
{% if customization %}
Additional instructions from the author:
{{ customization }}
{% endif %}
Write the full study note now."#;

/// Builds the outline-drafting prompt.
pub fn build_structure_prompt(
    topic: &str,
    customization: Option<&str>,
) -> Result<NotePrompt, GeneratorError> {
    let mut context = Context::new();
    context.insert("topic", topic);
    context.insert("customization", &non_blank(customization));
    let user = Tera::one_off(STRUCTURE_USER_TEMPLATE, &context, false)?;
    Ok(NotePrompt::new(STRUCTURE_SYSTEM, user))
}

/// Builds the content prompt from an approved outline.
pub fn build_content_prompt(
    topic: &str,
    structure: &str,
    customization: Option<&str>,
) -> Result<NotePrompt, GeneratorError> {
    let mut context = Context::new();
    context.insert("topic", topic);
    context.insert("structure", structure);
    context.insert("customization", &non_blank(customization));
    let user = Tera::one_off(CONTENT_USER_TEMPLATE, &context, false)?;
    Ok(NotePrompt::new(CONTENT_SYSTEM, user))
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}
