use serde::Deserialize;

/// A notebook as returned by the notebooks collection.
///
/// Only the fields the traversal depends on are modeled; nodes are immutable
/// snapshots fetched on demand.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub sections_url: Option<String>,
    pub section_groups_url: Option<String>,
}

/// A section group: a container that may hold sections and nested groups.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionGroup {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub sections_url: Option<String>,
    pub section_groups_url: Option<String>,
}

/// A section, the direct parent of pages.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub pages_url: Option<String>,
}

/// A terminal page node; `content_url` points at the page body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: Option<String>,
    pub title: Option<String>,
    pub content_url: Option<String>,
}

impl Page {
    pub fn title_or_untitled(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled Page")
    }
}
