use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PROMPT_TEMPLATE;
use crate::models::{Prompt, Record};

/// Builds prompts from a template with `{name}` and `{description}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptBuilder {
    pub template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn build(&self, record: &Record) -> Prompt {
        let description = sentence(record.description.trim());
        let text = fill(&self.template, record.name.trim(), &description);

        Prompt::new(collapse_whitespace(&text))
    }
}

/// Substitutes both placeholders in one scan, so placeholder-like text inside
/// a value is copied verbatim.
fn fill(template: &str, name: &str, description: &str) -> String {
    let mut out = String::with_capacity(template.len() + name.len() + description.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{name}") {
            out.push_str(name);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{description}") {
            out.push_str(description);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Ends a non-empty description with a full stop so the template reads naturally.
fn sentence(text: &str) -> String {
    if text.is_empty() || text.ends_with(['.', '!', '?']) {
        text.to_string()
    } else {
        format!("{text}.")
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
