//! YAML front-matter documents.
//!
//! An entry document is:
//!
//! ```text
//! ---
//! <yaml mapping>
//! ---
//!
//! <markdown body>
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static FRONT_MATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A---[ \t]*\r?\n(?:(.*?)\r?\n)?---[ \t]*(?:\r?\n|\z)").unwrap()
});

/// Split a document into its front-matter fields and body.
///
/// A document without front-matter yields an empty map and the whole text as
/// body. One blank line after the closing delimiter is not part of the body.
///
/// # Errors
///
/// Returns the YAML parser message if the front-matter is not a mapping.
pub fn parse(text: &str) -> Result<(Map<String, Value>, String), String> {
    let Some(captures) = FRONT_MATTER.captures(text) else {
        return Ok((Map::new(), text.to_owned()));
    };

    let yaml = captures.get(1).map_or("", |m| m.as_str());
    let rest = &text[captures.get(0).map_or(0, |m| m.end())..];
    let body = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let fields = if yaml.trim().is_empty() {
        Map::new()
    } else {
        match serde_yaml::from_str::<Value>(yaml).map_err(|e| e.to_string())? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(format!("expected a mapping, found `{other}`")),
        }
    };
    Ok((fields, body.to_owned()))
}

/// Render fields and body as a front-matter document.
///
/// # Errors
///
/// Returns the YAML serializer message if a value cannot be represented.
pub fn render(fields: &Map<String, Value>, body: &str) -> Result<String, String> {
    let yaml = if fields.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(fields).map_err(|e| e.to_string())?
    };
    Ok(format!("---\n{yaml}---\n\n{body}"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_document() {
        let text = "---\ntitle: Hello\ndraft: true\ntags:\n  - a\n  - b\n---\n\n# Heading\n";

        let (fields, body) = parse(text).unwrap();

        assert_eq!(fields["title"], json!("Hello"));
        assert_eq!(fields["draft"], json!(true));
        assert_eq!(fields["tags"], json!(["a", "b"]));
        assert_eq!(body, "# Heading\n");
    }

    #[test]
    fn test_parse_without_front_matter() {
        let (fields, body) = parse("just text\n").unwrap();

        assert!(fields.is_empty());
        assert_eq!(body, "just text\n");
    }

    #[test]
    fn test_parse_empty_front_matter() {
        let (fields, body) = parse("---\n---\nbody").unwrap();

        assert!(fields.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn test_parse_crlf() {
        let (fields, body) = parse("---\r\ntitle: A\r\n---\r\n\r\nbody").unwrap();

        assert_eq!(fields["title"], json!("A"));
        assert_eq!(body, "body");
    }

    #[test]
    fn test_parse_non_mapping_is_error() {
        assert!(parse("---\n- a\n- b\n---\n").is_err());
    }

    #[test]
    fn test_parse_invalid_yaml_is_error() {
        assert!(parse("---\ntitle: [unclosed\n---\n").is_err());
    }

    #[test]
    fn test_render_preserves_field_order_and_types() {
        let mut fields = Map::new();
        fields.insert("title".to_owned(), json!("Hello World"));
        fields.insert("draft".to_owned(), json!(true));
        fields.insert("count".to_owned(), json!(3));

        let text = render(&fields, "Body").unwrap();

        assert_eq!(
            text,
            "---\ntitle: Hello World\ndraft: true\ncount: 3\n---\n\nBody"
        );
        let (parsed, body) = parse(&text).unwrap();
        assert_eq!(parsed, fields);
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_render_empty_fields() {
        let text = render(&Map::new(), "Body").unwrap();

        assert_eq!(text, "---\n---\n\nBody");
        assert_eq!(parse(&text).unwrap(), (Map::new(), "Body".to_owned()));
    }
}
