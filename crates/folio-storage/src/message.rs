//! Commit message contract shared by the content layer and version control.
//!
//! A message is produced from `(action, collection, slug)`. The default
//! template is [`DEFAULT_MESSAGE_TEMPLATE`]; configuration can supply another
//! pattern or an arbitrary function.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Default commit message pattern.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "{action}: {collection}/{slug}";

/// Mutation that produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    /// Lowercase name used in messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type MessageFn = dyn Fn(Action, &str, &str) -> String + Send + Sync;

/// Commit message formatter `(action, collection, slug) -> String`.
///
/// Cheap to clone; the formatter is shared.
#[derive(Clone)]
pub struct MessageTemplate {
    render: Arc<MessageFn>,
}

impl MessageTemplate {
    /// Build a template from a pattern with `{action}`, `{collection}` and
    /// `{slug}` placeholders.
    ///
    /// Placeholders are expanded in one pass, so braces inside the substituted
    /// values are kept literally. Unknown placeholders are left as written.
    #[must_use]
    pub fn from_pattern(pattern: impl Into<String>) -> Self {
        let pattern: String = pattern.into();
        Self::from_fn(move |action, collection, slug| {
            expand(&pattern, action, collection, slug)
        })
    }

    /// Build a template from an arbitrary function.
    #[must_use]
    pub fn from_fn(render: impl Fn(Action, &str, &str) -> String + Send + Sync + 'static) -> Self {
        Self {
            render: Arc::new(render),
        }
    }

    /// Render the message for a mutation.
    #[must_use]
    pub fn render(&self, action: Action, collection: &str, slug: &str) -> String {
        (self.render)(action, collection, slug)
    }
}

fn expand(pattern: &str, action: Action, collection: &str, slug: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + collection.len() + slug.len());
    let mut rest = pattern;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            rest = tail;
            break;
        };
        let value = match &tail[1..end] {
            "action" => Some(action.as_str()),
            "collection" => Some(collection),
            "slug" => Some(slug),
            _ => None,
        };
        match value {
            Some(value) => {
                out.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::from_pattern(DEFAULT_MESSAGE_TEMPLATE)
    }
}

impl fmt::Debug for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageTemplate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template() {
        let template = MessageTemplate::default();

        assert_eq!(
            template.render(Action::Create, "posts", "hello-world"),
            "create: posts/hello-world"
        );
    }

    #[test]
    fn test_custom_pattern() {
        let template = MessageTemplate::from_pattern("cms({collection}): {action} {slug}");

        assert_eq!(
            template.render(Action::Delete, "pages", "about"),
            "cms(pages): delete about"
        );
    }

    #[test]
    fn test_placeholders_in_values_are_literal() {
        let template = MessageTemplate::from_pattern("{action}: {collection}/{slug}");

        assert_eq!(
            template.render(Action::Create, "{slug}", "{collection}"),
            "create: {slug}/{collection}"
        );
    }

    #[test]
    fn test_unknown_and_unclosed_braces_kept() {
        let template = MessageTemplate::from_pattern("{{slug}} {author} {slug");

        assert_eq!(
            template.render(Action::Update, "posts", "a"),
            "{a} {author} {slug"
        );
    }

    #[test]
    fn test_custom_fn() {
        let template = MessageTemplate::from_fn(|action, _, slug| format!("{slug} [{action}]"));

        assert_eq!(template.render(Action::Update, "posts", "a"), "a [update]");
    }

    #[test]
    fn test_action_serde() {
        let action: Action = serde_json::from_str("\"update\"").unwrap();
        assert_eq!(action, Action::Update);
        assert_eq!(action.to_string(), "update");
    }
}
