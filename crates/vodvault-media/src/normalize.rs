//! Normalization of the metadata JSON printed by yt-dlp.
//!
//! Some extractors leak Python `repr` output into the JSON document: bare
//! `True`/`False`/`None`, single-quoted strings, and lists of objects
//! serialized into a string (`"[{'id': 'x'}]"`). [`parse_metadata`] first
//! tries a strict parse and only falls back to [`normalize_metadata_json`]
//! when that fails. The normalization rules, applied outside string literals
//! only, are:
//!
//! 1. `True`, `False`, `None` become `true`, `false`, `null`.
//! 2. A single-quoted string becomes a double-quoted one; inner `"` are
//!    escaped and `\'` is unescaped.
//! 3. A double-quoted string whose whole content is `[{ ... }]` is replaced
//!    by its content, normalized recursively.
//!
//! Text inside well-formed double-quoted strings is never touched, so a title
//! containing the word `True` survives unchanged.

use vodvault_models::VideoMetadata;

use crate::error::{MediaError, MediaResult};

/// Parse yt-dlp's `--dump-single-json` output into [`VideoMetadata`].
///
/// Any failure, including one after normalization, is a
/// [`MediaError::MetadataParse`].
pub fn parse_metadata(raw: &str) -> MediaResult<VideoMetadata> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MediaError::metadata_parse("empty metadata document"));
    }

    match serde_json::from_str::<VideoMetadata>(raw) {
        Ok(meta) => Ok(meta),
        Err(strict_err) => {
            let normalized = normalize_metadata_json(raw);
            serde_json::from_str::<VideoMetadata>(&normalized).map_err(|e| {
                MediaError::metadata_parse(format!(
                    "{} (before normalization: {})",
                    e, strict_err
                ))
            })
        }
    }
}

/// Rewrite Python-flavoured JSON into strict JSON. See the module docs.
pub fn normalize_metadata_json(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let (content, next) = read_quoted(&chars, i, '"');
                if is_stringified_object_list(&content) {
                    out.push_str(&normalize_metadata_json(&content.replace("\\\"", "\"")));
                } else {
                    out.push('"');
                    out.push_str(&content);
                    out.push('"');
                }
                i = next;
            }
            '\'' => {
                let (content, next) = read_quoted(&chars, i, '\'');
                out.push('"');
                out.push_str(&requote_single(&content));
                out.push('"');
                i = next;
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Read a quoted literal starting at `start` (which holds `quote`).
///
/// Returns the raw content with escapes preserved and the index just past
/// the closing quote. An unterminated literal runs to the end of input.
fn read_quoted(chars: &[char], start: usize, quote: char) -> (String, usize) {
    let mut content = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            content.push(c);
            content.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c == quote {
            return (content, i + 1);
        }
        content.push(c);
        i += 1;
    }

    (content, i)
}

fn is_stringified_object_list(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.starts_with("[{") && trimmed.ends_with("}]")
}

/// Content of a single-quoted literal as the body of a double-quoted one.
fn requote_single(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_json_passes_through() {
        let meta = parse_metadata(r#"{"title": "True Story", "duration": 10}"#).unwrap();
        assert_eq!(meta.title.as_deref(), Some("True Story"));
    }

    #[test]
    fn test_python_literals_and_quotes() {
        let raw = r#"{'title': 'It\'s "live"', 'is_live': False, 'age_limit': None, 'ok': True}"#;
        let normalized = normalize_metadata_json(raw);
        assert_eq!(
            normalized,
            r#"{"title": "It's \"live\"", "is_live": false, "age_limit": null, "ok": true}"#
        );

        let meta = parse_metadata(raw).unwrap();
        assert_eq!(meta.title.as_deref(), Some("It's \"live\""));
    }

    #[test]
    fn test_stringified_object_list_is_unwrapped() {
        let raw = r#"{"title": "x", "chapters": "[{'title': 'intro', 'start_time': 0}]"}"#;
        let normalized = normalize_metadata_json(raw);
        assert_eq!(
            normalized,
            r#"{"title": "x", "chapters": [{"title": "intro", "start_time": 0}]}"#
        );
        assert!(serde_json::from_str::<serde_json::Value>(&normalized).is_ok());
    }

    #[test]
    fn test_words_inside_strings_untouched() {
        let raw = r#"{"description": "None of this is False", "x": 'None'}"#;
        let normalized = normalize_metadata_json(raw);
        assert!(normalized.contains("\"None of this is False\""));
        assert!(normalized.contains("\"x\": \"None\""));
    }

    #[test]
    fn test_unparseable_is_metadata_error() {
        assert!(matches!(
            parse_metadata("ERROR: video unavailable"),
            Err(MediaError::MetadataParse(_))
        ));
        assert!(matches!(parse_metadata("  "), Err(MediaError::MetadataParse(_))));
    }
}
