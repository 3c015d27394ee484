use std::collections::VecDeque;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::client::NotesClient;
use super::error::{ApiError, ApiResult};
use super::types::{Notebook, Page, Section, SectionGroup};

/// Substitute content for a page descriptor without a `contentUrl`.
pub const MISSING_CONTENT_PLACEHOLDER: &[u8] = b"<!-- Page has no contentUrl -->";

/// Fetch the notebooks collection root. Tolerates both the paged
/// `{"value": [...]}` wrapper and a bare array.
pub async fn list_notebooks(client: &NotesClient) -> ApiResult<Vec<Notebook>> {
    debug!("fetching all notebooks");
    let url = client.endpoint("notebooks")?;
    let value = client.get_json(url.clone()).await?;
    Ok(parse_collection::<Notebook>(&url, value).items)
}

/// Exact, case-sensitive match on `displayName`; first match wins.
pub fn find_notebook<'a>(notebooks: &'a [Notebook], display_name: &str) -> Option<&'a Notebook> {
    notebooks
        .iter()
        .find(|notebook| notebook.display_name.as_deref() == Some(display_name))
}

/// Resolve `notebook_name` and return a lazy walk over its pages, in
/// depth-first order: a container's sections before its nested groups, pages
/// in API order within each section. `section_name` restricts the walk to
/// sections with that exact display name.
pub async fn notebook_pages<'a>(
    client: &'a NotesClient,
    notebook_name: &str,
    section_name: Option<&str>,
) -> ApiResult<PageWalk<'a>> {
    debug!(notebook = notebook_name, section = ?section_name, "resolving notebook");
    let notebooks = list_notebooks(client).await?;
    let notebook = find_notebook(&notebooks, notebook_name).ok_or_else(|| {
        ApiError::NotebookNotFound {
            name: notebook_name.to_owned(),
            available: notebooks
                .iter()
                .filter_map(|notebook| notebook.display_name.clone())
                .collect(),
        }
    })?;
    Ok(PageWalk::new(
        client,
        notebook,
        section_name.map(str::to_owned),
    ))
}

/// Fetch the raw content bytes for a page, or the fixed placeholder when the
/// descriptor carries no `contentUrl`.
pub async fn get_page_content(client: &NotesClient, page: &Page) -> ApiResult<Vec<u8>> {
    match &page.content_url {
        Some(content_url) => {
            debug!(title = page.title_or_untitled(), "fetching page content");
            client.get_bytes(Url::parse(content_url)?).await
        }
        None => {
            warn!(title = page.title_or_untitled(), "page has no contentUrl");
            Ok(MISSING_CONTENT_PLACEHOLDER.to_vec())
        }
    }
}

/// Pending traversal work. The stack makes the walk state explicit: expanding
/// a container fetches its section collection and defers its groups, a
/// streamed section turns into a pagination cursor.
#[derive(Debug)]
enum Frame {
    Expand {
        sections_url: Option<String>,
        section_groups_url: Option<String>,
    },
    ExpandGroups(String),
    Stream(Section),
}

/// Lazy, one-pass walk over a notebook's pages.
///
/// Each call to [`PageWalk::next`] performs at most one collection fetch;
/// nothing is pre-fetched and no state persists across walks. Dropping the
/// walk early leaves no dangling resources.
#[derive(Debug)]
pub struct PageWalk<'a> {
    client: &'a NotesClient,
    section_filter: Option<String>,
    stack: Vec<Frame>,
    cursor: Option<Url>,
    buffered: VecDeque<Page>,
}

impl<'a> PageWalk<'a> {
    fn new(client: &'a NotesClient, notebook: &Notebook, section_filter: Option<String>) -> Self {
        Self {
            client,
            section_filter,
            stack: vec![Frame::Expand {
                sections_url: notebook.sections_url.clone(),
                section_groups_url: notebook.section_groups_url.clone(),
            }],
            cursor: None,
            buffered: VecDeque::new(),
        }
    }

    /// The next page in depth-first order, or `None` when the notebook is
    /// exhausted. A returned error aborts the walk for the caller; the walk
    /// itself holds no open connections between calls.
    pub async fn next(&mut self) -> Option<ApiResult<Page>> {
        loop {
            if let Some(page) = self.buffered.pop_front() {
                return Some(Ok(page));
            }
            if let Some(url) = self.cursor.take() {
                if let Err(err) = self.fetch_page_collection(url).await {
                    return Some(Err(err));
                }
                continue;
            }
            let frame = self.stack.pop()?;
            if let Err(err) = self.step(frame).await {
                return Some(Err(err));
            }
        }
    }

    async fn step(&mut self, frame: Frame) -> ApiResult<()> {
        match frame {
            Frame::Expand {
                sections_url,
                section_groups_url,
            } => {
                // Groups sit below the sections on the stack so every
                // section streams before any nested group expands.
                if let Some(groups_url) = section_groups_url {
                    self.stack.push(Frame::ExpandGroups(groups_url));
                }
                if let Some(sections_url) = sections_url {
                    let url = Url::parse(&sections_url)?;
                    let value = self.client.get_json(url.clone()).await?;
                    let sections = parse_collection::<Section>(&url, value).items;
                    for section in sections.into_iter().rev() {
                        if let Some(filter) = &self.section_filter {
                            if section.display_name.as_deref() != Some(filter.as_str()) {
                                continue;
                            }
                        }
                        self.stack.push(Frame::Stream(section));
                    }
                }
                Ok(())
            }
            Frame::ExpandGroups(groups_url) => {
                let url = Url::parse(&groups_url)?;
                let value = self.client.get_json(url.clone()).await?;
                let groups = parse_collection::<SectionGroup>(&url, value).items;
                for group in groups.into_iter().rev() {
                    self.stack.push(Frame::Expand {
                        sections_url: group.sections_url,
                        section_groups_url: group.section_groups_url,
                    });
                }
                Ok(())
            }
            Frame::Stream(section) => {
                debug!(
                    section = section.display_name.as_deref().unwrap_or("unnamed"),
                    "streaming section pages"
                );
                if let Some(pages_url) = section.pages_url {
                    self.cursor = Some(Url::parse(&pages_url)?);
                }
                Ok(())
            }
        }
    }

    async fn fetch_page_collection(&mut self, url: Url) -> ApiResult<()> {
        let value = self.client.get_json(url.clone()).await?;
        let collection = parse_collection::<Page>(&url, value);
        self.buffered.extend(collection.items);
        self.cursor = collection.next_link;
        Ok(())
    }
}

struct CollectionPage<T> {
    items: Vec<T>,
    next_link: Option<Url>,
}

/// Decode a paged collection response, degrading to an empty slice with a
/// logged warning when the shape is not the expected wrapper. One malformed
/// response should not abort a large export on its own.
fn parse_collection<T: DeserializeOwned>(url: &Url, value: Value) -> CollectionPage<T> {
    match value {
        Value::Object(mut map) => {
            let next_link = map
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .and_then(|link| Url::parse(link).ok());
            match map.remove("value") {
                Some(items) => decode_items(url, items, next_link),
                None => {
                    warn!(url = %url, "collection response missing 'value' wrapper, treating as empty");
                    CollectionPage {
                        items: Vec::new(),
                        next_link: None,
                    }
                }
            }
        }
        items @ Value::Array(_) => decode_items(url, items, None),
        other => {
            warn!(url = %url, kind = shape_name(&other), "unexpected collection response shape, treating as empty");
            CollectionPage {
                items: Vec::new(),
                next_link: None,
            }
        }
    }
}

fn decode_items<T: DeserializeOwned>(
    url: &Url,
    items: Value,
    next_link: Option<Url>,
) -> CollectionPage<T> {
    match serde_json::from_value(items) {
        Ok(items) => CollectionPage { items, next_link },
        Err(err) => {
            warn!(url = %url, %err, "failed to decode collection items, treating as empty");
            CollectionPage {
                items: Vec::new(),
                next_link: None,
            }
        }
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
