//! Extraction of structured action directives from model replies.
//!
//! The model is prompted to answer either with plain prose or with a single
//! JSON directive (`{"action": ..., "params": ...}`), but it is not
//! contractually guaranteed to emit syntactically isolated output — replies
//! like `Sure, here you go: {...} enjoy!` happen. Extraction therefore
//! tolerates surrounding prose: try the whole trimmed text first, then scan
//! for balanced-brace substrings and attempt to decode each in order.
//! Candidates that fail to decode are skipped, never fatal; when nothing
//! decodes the reply is plain conversational text.

use serde::Deserialize;
use serde_json::Value;

/// Brace nesting deeper than this aborts the current candidate. Directives
/// are at most two levels deep (`params` holding an array of objects);
/// anything deeper is not one.
const MAX_BRACE_DEPTH: usize = 8;

/// A decoded action directive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionDirective {
    /// Action name, e.g. `searchIngredients`.
    pub action: String,
    /// Open argument map; validated into a typed action before dispatch.
    pub params: serde_json::Map<String, Value>,
    /// Slot the model says is still missing, if any.
    #[serde(default)]
    pub needs_info: Option<String>,
    /// Message the model wants spoken while the action runs.
    #[serde(default)]
    pub user_message: String,
}

/// Extract a directive from a model reply, or `None` when the reply is
/// plain conversational text.
#[must_use]
pub fn parse_directive(text: &str) -> Option<ActionDirective> {
    let trimmed = text.trim();

    // Fully delimited replies decode directly.
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Some(directive) = decode_candidate(trimmed) {
            return Some(directive);
        }
    }

    // Otherwise scan for embedded candidates, in order of appearance.
    for candidate in brace_candidates(trimmed) {
        if let Some(directive) = decode_candidate(candidate) {
            return Some(directive);
        }
    }

    None
}

/// Decode one candidate. Requires both `action` and `params`; decoding
/// failures are non-fatal to the scan.
fn decode_candidate(candidate: &str) -> Option<ActionDirective> {
    match serde_json::from_str::<ActionDirective>(candidate) {
        Ok(directive) => Some(directive),
        Err(e) => {
            tracing::trace!("directive candidate rejected: {e}");
            None
        }
    }
}

/// Yield balanced-brace substrings of `text` in order of appearance.
///
/// A bounded-depth matcher, not a JSON parser: braces inside string literals
/// will confuse it, but the decode attempt on each candidate catches that.
fn brace_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut start = None;
    let mut depth = 0usize;

    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
                if depth > MAX_BRACE_DEPTH {
                    start = None;
                    depth = 0;
                }
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        candidates.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    candidates
}
