//! Rich text and source-location field content
//!
//! Both are stored as small JSON objects inside the work item's field document.

use pulldown_cmark::{html, Event, Options, Parser};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const CONTENT_KEY: &str = "content";
const MARKUP_KEY: &str = "markup";

const REPO_KEY: &str = "repo";
const BRANCH_KEY: &str = "branch";
const FILENAME_KEY: &str = "filename";
const LINENUMBER_KEY: &str = "linenumber";
const CODEBASE_ID_KEY: &str = "codebaseid";

/// Markup language of a rich text value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarkupKind {
    #[default]
    PlainText,
    Markdown,
}

impl MarkupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkupKind::PlainText => "PlainText",
            MarkupKind::Markdown => "Markdown",
        }
    }

    /// Unknown or empty names fall back to plain text
    pub fn parse_lenient(name: &str) -> Self {
        match name {
            "Markdown" => MarkupKind::Markdown,
            _ => MarkupKind::PlainText,
        }
    }
}

/// Rich text with its markup language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupContent {
    pub content: String,
    pub markup: MarkupKind,
}

impl MarkupContent {
    pub fn new(content: impl Into<String>, markup: MarkupKind) -> Self {
        Self {
            content: content.into(),
            markup,
        }
    }

    pub fn plain_text(content: impl Into<String>) -> Self {
        Self::new(content, MarkupKind::PlainText)
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self::new(content, MarkupKind::Markdown)
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        let content = map
            .get(CONTENT_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let markup = map
            .get(MARKUP_KEY)
            .and_then(Value::as_str)
            .map(MarkupKind::parse_lenient)
            .unwrap_or_default();
        Self { content, markup }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(CONTENT_KEY.to_string(), Value::String(self.content.clone()));
        map.insert(
            MARKUP_KEY.to_string(),
            Value::String(self.markup.as_str().to_string()),
        );
        map
    }

    /// Render to HTML; plain text is escaped, never interpreted
    pub fn render_html(&self) -> String {
        let mut out = String::new();
        match self.markup {
            MarkupKind::Markdown => {
                let parser = Parser::new_ext(&self.content, Options::all());
                html::push_html(&mut out, parser);
            }
            MarkupKind::PlainText => {
                let events = std::iter::once(Event::Text(self.content.as_str().into()));
                html::push_html(&mut out, events);
            }
        }
        out
    }
}

/// Pointer into a source repository
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodebaseContent {
    pub repository: String,
    pub branch: Option<String>,
    pub file_name: Option<String>,
    pub line_number: Option<i64>,
    pub codebase_id: Option<String>,
}

impl CodebaseContent {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Default::default()
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, String> {
        let repository = map
            .get(REPO_KEY)
            .and_then(Value::as_str)
            .filter(|repo| !repo.trim().is_empty())
            .ok_or_else(|| "codebase content requires a repository".to_string())?
            .to_string();

        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            repository,
            branch: text(BRANCH_KEY),
            file_name: text(FILENAME_KEY),
            line_number: map.get(LINENUMBER_KEY).and_then(Value::as_i64),
            codebase_id: text(CODEBASE_ID_KEY),
        })
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(REPO_KEY.to_string(), Value::String(self.repository.clone()));
        if let Some(branch) = &self.branch {
            map.insert(BRANCH_KEY.to_string(), Value::String(branch.clone()));
        }
        if let Some(file_name) = &self.file_name {
            map.insert(FILENAME_KEY.to_string(), Value::String(file_name.clone()));
        }
        if let Some(line) = self.line_number {
            map.insert(LINENUMBER_KEY.to_string(), Value::from(line));
        }
        if let Some(id) = &self.codebase_id {
            map.insert(CODEBASE_ID_KEY.to_string(), Value::String(id.clone()));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_markup_defaults_to_plain_text() {
        let map = json!({ "content": "hello" });
        let markup = MarkupContent::from_map(map.as_object().unwrap());
        assert_eq!(markup.markup, MarkupKind::PlainText);

        let map = json!({ "content": "hello", "markup": "Textile" });
        let markup = MarkupContent::from_map(map.as_object().unwrap());
        assert_eq!(markup.markup, MarkupKind::PlainText);
    }

    #[test]
    fn test_markdown_rendering() {
        let html = MarkupContent::markdown("# Title\n\n**bold**").render_html();
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
    }

    #[test]
    fn test_plain_text_is_escaped() {
        let html = MarkupContent::plain_text("<script>x</script>").render_html();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_codebase_requires_repository() {
        let map = json!({ "branch": "main" });
        assert!(CodebaseContent::from_map(map.as_object().unwrap()).is_err());

        let map = json!({ "repo": "https://github.com/a/b", "linenumber": 42, "filename": "x.rs" });
        let content = CodebaseContent::from_map(map.as_object().unwrap()).unwrap();
        assert_eq!(content.line_number, Some(42));
        assert_eq!(content.file_name.as_deref(), Some("x.rs"));
        assert_eq!(content.branch, None);
    }
}
