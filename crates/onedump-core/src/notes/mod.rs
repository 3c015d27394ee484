mod client;
mod error;
mod types;
mod walk;

pub use client::NotesClient;
pub use error::ApiError;
pub use types::{Notebook, Page, Section, SectionGroup};
pub use walk::{
    find_notebook, get_page_content, list_notebooks, notebook_pages, PageWalk,
    MISSING_CONTENT_PLACEHOLDER,
};
