use crate::error::{AppError, AppResult};

/// Extracts the first balanced `{...}` span from free text.
///
/// Model completions are not guaranteed to contain only JSON; they routinely
/// wrap the object in prose or markdown fences. This is an explicit scanner
/// with a defined grammar rather than a regex heuristic: it finds the first
/// `{`, then tracks brace depth while honoring string literals and escape
/// sequences, so nested objects and braces inside strings cannot truncate or
/// extend the span.
pub fn extract_json_object(text: &str) -> AppResult<&str> {
    let start = text
        .find('{')
        .ok_or_else(|| AppError::Parse("no JSON object in model output".to_string()))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    Err(AppError::Parse(
        "unterminated JSON object in model output".to_string(),
    ))
}
