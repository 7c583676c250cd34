//! Prompt templates for the Map and Reduce phases.
//!
//! Templates use `{{name}}` placeholders and are rendered in a single pass,
//! so placeholder-like text inside the substituted values is left untouched.

use serde::{Deserialize, Serialize};

use crate::errors::{DigestError, Result};

/// Built-in Map prompt.
pub const DEFAULT_MAP_TEMPLATE: &str = include_str!("../../prompts/map_segment.md");

/// Built-in Reduce prompt.
pub const DEFAULT_REDUCE_TEMPLATE: &str = include_str!("../../prompts/reduce_final.md");

/// Data rendered into the Map prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MapPromptData<'a> {
    /// The segment to summarize.
    pub segment_text: &'a str,
    /// Where the segment came from.
    pub source_url: &'a str,
}

/// Data rendered into the Reduce prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReducePromptData<'a> {
    /// All intermediate summaries, already joined.
    pub combined_text: &'a str,
}

/// Renders Map and Reduce prompts from templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBuilder {
    map_template: String,
    reduce_template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            map_template: DEFAULT_MAP_TEMPLATE.to_string(),
            reduce_template: DEFAULT_REDUCE_TEMPLATE.to_string(),
        }
    }
}

impl PromptBuilder {
    /// Creates a builder with the built-in templates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the Map template.
    #[must_use]
    pub fn with_map_template(mut self, template: impl Into<String>) -> Self {
        self.map_template = template.into();
        self
    }

    /// Replaces the Reduce template.
    #[must_use]
    pub fn with_reduce_template(mut self, template: impl Into<String>) -> Self {
        self.reduce_template = template.into();
        self
    }

    /// Renders the Map prompt.
    ///
    /// # Errors
    ///
    /// Fails on empty `segment_text` or an unknown placeholder.
    pub fn build_map(&self, data: MapPromptData<'_>) -> Result<String> {
        if data.segment_text.is_empty() {
            return Err(DigestError::Prompt(
                "map prompt requires non-empty segment_text".to_string(),
            ));
        }
        render(
            &self.map_template,
            &[
                ("segment_text", data.segment_text),
                ("source_url", data.source_url),
            ],
        )
    }

    /// Renders the Reduce prompt.
    ///
    /// # Errors
    ///
    /// Fails on empty `combined_text` or an unknown placeholder.
    pub fn build_reduce(&self, data: ReducePromptData<'_>) -> Result<String> {
        if data.combined_text.is_empty() {
            return Err(DigestError::Prompt(
                "reduce prompt requires non-empty combined_text".to_string(),
            ));
        }
        render(&self.reduce_template, &[("combined_text", data.combined_text)])
    }
}

fn render(template: &str, values: &[(&str, &str)]) -> Result<String> {
    let capacity = template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>();
    let mut out = String::with_capacity(capacity);
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(DigestError::Prompt("unterminated placeholder".to_string()));
        };
        let name = after[..close].trim();
        let value = values
            .iter()
            .find_map(|(key, value)| (*key == name).then_some(*value))
            .ok_or_else(|| DigestError::Prompt(format!("unknown placeholder '{name}'")))?;
        out.push_str(value);
        rest = &after[close + 2..];
    }
    out.push_str(rest);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_map_prompt_contains_segment_and_source() {
        let prompt = PromptBuilder::new()
            .build_map(MapPromptData {
                segment_text: "Rust 1.80 stabilised LazyLock.",
                source_url: "https://example.com/news",
            })
            .unwrap();
        assert!(prompt.contains("Rust 1.80 stabilised LazyLock."));
        assert!(prompt.contains("Source: https://example.com/news"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_empty_segment_rejected() {
        let err = PromptBuilder::new()
            .build_map(MapPromptData {
                segment_text: "",
                source_url: "https://example.com",
            })
            .unwrap_err();
        assert!(matches!(err, DigestError::Prompt(_)));
    }

    #[test]
    fn test_empty_combined_text_rejected() {
        let err = PromptBuilder::new()
            .build_reduce(ReducePromptData { combined_text: "" })
            .unwrap_err();
        assert!(matches!(err, DigestError::Prompt(_)));
    }

    #[test]
    fn test_reduce_prompt_mentions_markers() {
        let prompt = PromptBuilder::new()
            .build_reduce(ReducePromptData {
                combined_text: "one\n\n--- INTERMEDIATE SUMMARY END ---\n\ntwo",
            })
            .unwrap();
        assert!(prompt.contains("<FINAL_START>"));
        assert!(prompt.contains("<FINAL_END>"));
        assert!(prompt.ends_with("two\n"));
    }

    #[test]
    fn test_values_are_not_re_expanded() {
        let builder = PromptBuilder::new().with_map_template("[{{segment_text}}|{{ source_url }}]");
        let prompt = builder
            .build_map(MapPromptData {
                segment_text: "{{source_url}}",
                source_url: "u",
            })
            .unwrap();
        assert_eq!(prompt, "[{{source_url}}|u]");
    }

    #[test]
    fn test_unknown_placeholder_is_an_error() {
        let builder = PromptBuilder::new().with_reduce_template("{{nope}}");
        let err = builder
            .build_reduce(ReducePromptData { combined_text: "x" })
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
