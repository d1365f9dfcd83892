use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ContentError;

/// One editable element on a public page, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentElement {
    Text {
        value: String,
    },
    RichText {
        html: String,
    },
    Block {
        title: String,
        body: String,
        #[serde(default)]
        metadata: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct ContentEntry {
    page: String,
    element: String,
    content: ContentElement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    pub element: ContentElement,
    pub from_store: bool,
}

#[derive(Debug, Default)]
pub struct ContentCatalog {
    entries: HashMap<(String, String), ContentElement>,
}

impl ContentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(content: &str) -> Result<Self, ContentError> {
        let rows: Vec<ContentEntry> = serde_json::from_str(content)?;
        let mut catalog = Self::new();
        for row in rows {
            catalog.insert(&row.page, &row.element, row.content);
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Later inserts for the same key replace earlier ones.
    pub fn insert(&mut self, page: &str, element: &str, content: ContentElement) {
        self.entries
            .insert((page.to_string(), element.to_string()), content);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, page: &str, element: &str, fallback: &str) -> ResolvedContent {
        match self.entries.get(&(page.to_string(), element.to_string())) {
            Some(stored) => ResolvedContent {
                element: stored.clone(),
                from_store: true,
            },
            None => {
                tracing::debug!("No stored content for {}/{}, using fallback", page, element);
                ResolvedContent {
                    element: ContentElement::Text {
                        value: fallback.to_string(),
                    },
                    from_store: false,
                }
            }
        }
    }
}

pub fn render_plain(element: &ContentElement) -> String {
    match element {
        ContentElement::Text { value } => value.clone(),
        ContentElement::RichText { html } => strip_tags(html),
        ContentElement::Block {
            title,
            body,
            metadata,
        } => {
            let mut output = format!("{}\n\n{}", title, body);
            for (key, value) in metadata {
                output.push_str(&format!("\n{}: {}", key, value));
            }
            output
        }
    }
}

fn strip_tags(html: &str) -> String {
    let mut output = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => output.push(c),
            _ => {}
        }
    }
    output
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {"page": "home", "element": "hero_title", "content": {"type": "text", "value": "Welcome"}},
        {"page": "home", "element": "intro", "content": {"type": "rich_text", "html": "<p>Study <b>here</b> &amp; thrive</p>"}},
        {"page": "about", "element": "dean", "content": {"type": "block", "title": "Dean", "body": "Message", "metadata": {"author": "Office of the Dean"}}}
    ]"#;

    #[test]
    fn resolves_stored_elements_by_page_and_key() {
        let catalog = ContentCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 3);

        let resolved = catalog.resolve("home", "hero_title", "Hello");
        assert!(resolved.from_store);
        assert_eq!(render_plain(&resolved.element), "Welcome");
    }

    #[test]
    fn missing_key_falls_back_to_text() {
        let catalog = ContentCatalog::from_json(CATALOG).unwrap();
        let resolved = catalog.resolve("about", "hero_title", "About us");
        assert!(!resolved.from_store);
        assert_eq!(
            resolved.element,
            ContentElement::Text {
                value: "About us".to_string()
            }
        );
    }

    #[test]
    fn renders_each_kind() {
        let catalog = ContentCatalog::from_json(CATALOG).unwrap();
        let intro = catalog.resolve("home", "intro", "");
        assert_eq!(render_plain(&intro.element), "Study here & thrive");

        let dean = catalog.resolve("about", "dean", "");
        assert_eq!(
            render_plain(&dean.element),
            "Dean\n\nMessage\nauthor: Office of the Dean"
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let bad = r#"[{"page": "p", "element": "e", "content": {"type": "video", "url": "x"}}]"#;
        assert!(matches!(
            ContentCatalog::from_json(bad),
            Err(ContentError::Format(_))
        ));
    }
}
