//! Code-to-rule translation.
//!
//! A code file is sent to the generation service with a fixed instruction
//! asking for one `Rule N: ...` line per business rule. Any failure falls
//! back to the raw code so ingestion never stops on a translation error;
//! the outcome is tagged so callers can tell the two apart.

use tracing::warn;

use crate::generation::{fill_template, Generator};

/// Instruction template; `{filename}`, `{filetype}` and `{code}` are substituted.
pub const RULE_PROMPT: &str = "You are a business analyst who specializes in extracting business rules from source code.

Analyze the following code and extract ALL of its business rules, both explicit and implicit.
Ignore implementation details; describe WHAT the system must do and under which conditions.

File: {filename}
Type: {filetype}

Code:
{code}

For each rule found, answer with one line in the format:
\"Rule N: <clear description of the rule>\"

Rules:";

/// Result of translating one code file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Rule narrative produced by the generation service.
    Translated(String),
    /// The untranslated source, used after a service failure.
    Fallback(String),
}

impl Translation {
    pub fn text(&self) -> &str {
        match self {
            Translation::Translated(t) | Translation::Fallback(t) => t,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Translation::Translated(t) | Translation::Fallback(t) => t,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Translation::Fallback(_))
    }
}

pub fn render_rule_prompt(code: &str, filename: &str, filetype: &str) -> String {
    fill_template(
        RULE_PROMPT,
        &[("filename", filename), ("filetype", filetype), ("code", code)],
    )
}

pub struct RuleTranslator<'a> {
    generator: &'a dyn Generator,
    temperature: f32,
}

impl<'a> RuleTranslator<'a> {
    pub fn new(generator: &'a dyn Generator, temperature: f32) -> Self {
        Self {
            generator,
            temperature,
        }
    }

    pub async fn translate(&self, code: &str, filename: &str, filetype: &str) -> Translation {
        let prompt = render_rule_prompt(code, filename, filetype);
        match self.generator.generate(&prompt, self.temperature).await {
            Ok(rules) if !rules.trim().is_empty() => Translation::Translated(rules.trim().to_string()),
            Ok(_) => {
                warn!(filename, "translation returned no rules; using raw source");
                Translation::Fallback(code.to_string())
            }
            Err(e) => {
                warn!(filename, error = %e, "translation failed; using raw source");
                Translation::Fallback(code.to_string())
            }
        }
    }
}
