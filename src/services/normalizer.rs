// src/services/normalizer.rs
//
// Best-effort projection of a Gemini response onto a flat string. The
// upstream shape varies (and is sometimes plain wrong), so this is an
// ordered chain of fallbacks that always produces text and never fails.
use serde_json::Value;

// Bounds the debug fallback so a huge payload cannot be dumped wholesale
// into a client response.
const FALLBACK_LIMIT: usize = 2000;

/// Extract display text from an arbitrary upstream payload.
///
/// Fallback order: absent/null input gives an empty string; a non-empty
/// `candidates` array is walked candidate by candidate; anything else
/// degrades to a truncated serialization of the whole payload.
pub fn extract_text(payload: Option<&Value>) -> String {
    let Some(value) = payload else {
        return String::new();
    };
    if value.is_null() {
        return String::new();
    }
    candidates_text(value).unwrap_or_else(|| truncated(value))
}

fn candidates_text(value: &Value) -> Option<String> {
    let candidates = value.get("candidates")?.as_array()?;
    if candidates.is_empty() {
        return None;
    }
    let texts: Vec<String> = candidates.iter().map(candidate_text).collect();
    Some(texts.join("\n\n"))
}

fn candidate_text(candidate: &Value) -> String {
    let Some(turns) = candidate.get("content").and_then(Value::as_array) else {
        // Unrecognized candidate shape: keep it visible rather than drop it.
        return candidate.to_string();
    };
    let lines: Vec<String> = turns.iter().map(turn_text).collect();
    lines.join("\n")
}

fn turn_text(turn: &Value) -> String {
    match turn.get("parts").and_then(Value::as_array) {
        Some(parts) => parts
            .iter()
            .map(|part| part.get("text").and_then(Value::as_str).unwrap_or(""))
            .collect(),
        None => turn
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    }
}

/// Text fragment carried by one streaming chunk, if any.
///
/// Streamed chunks put `content` on the first candidate as an object with a
/// `parts` array; the batch-style array shape is accepted too.
pub fn chunk_text(chunk: &Value) -> Option<String> {
    let candidate = chunk.get("candidates")?.as_array()?.first()?;
    let content = candidate.get("content")?;
    let text = match content {
        Value::Array(_) => candidate_text(candidate),
        _ => turn_text(content),
    };
    if text.is_empty() { None } else { Some(text) }
}

fn truncated(value: &Value) -> String {
    let serialized = value.to_string();
    if serialized.chars().count() <= FALLBACK_LIMIT {
        serialized
    } else {
        serialized.chars().take(FALLBACK_LIMIT).collect()
    }
}
