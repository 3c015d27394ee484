//! Output sink for dumped pages.
//!
//! The traversal core hands this module a page descriptor and its raw
//! content bytes; everything about file naming and writing lives here. Page
//! content is written as received, one file per page.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use onedump_core::notes::Page;
use tracing::info;

pub struct ExportSink {
    dir: PathBuf,
    used_names: HashSet<String>,
    exported: usize,
    started: Instant,
}

impl ExportSink {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            used_names: HashSet::new(),
            exported: 0,
            started: Instant::now(),
        })
    }

    /// Write one page's content; returns the path written.
    pub fn write_page(&mut self, page: &Page, content: &[u8]) -> Result<PathBuf> {
        let file_name = self.unique_file_name(page.title_or_untitled());
        let path = self.dir.join(file_name);
        fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.exported += 1;
        Ok(path)
    }

    /// Completion hook: log a summary of the finished run.
    pub fn done(self) {
        info!(
            pages = self.exported,
            elapsed_secs = self.started.elapsed().as_secs_f64(),
            output = %self.dir.display(),
            "export finished"
        );
    }

    fn unique_file_name(&mut self, title: &str) -> String {
        let stem = sanitize_title(title);
        let mut candidate = format!("{stem}.html");
        let mut counter = 2;
        while !self.used_names.insert(candidate.clone()) {
            candidate = format!("{stem} ({counter}).html");
            counter += 1;
        }
        candidate
    }
}

/// Reduce a page title to a safe file stem.
fn sanitize_title(title: &str) -> String {
    const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_control() || FORBIDDEN.contains(&c) {
                '-'
            } else {
                c
            }
        })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.').trim();
    if trimmed.is_empty() {
        "Untitled Page".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn page_titled(title: &str) -> Page {
        Page {
            id: None,
            title: Some(title.to_owned()),
            content_url: None,
        }
    }

    #[test]
    fn sanitizes_forbidden_characters() {
        assert_eq!(sanitize_title("a/b:c?"), "a-b-c-");
        assert_eq!(sanitize_title("  spaced  "), "spaced");
        assert_eq!(sanitize_title("trailing..."), "trailing");
        assert_eq!(sanitize_title("///"), "---");
        assert_eq!(sanitize_title("   "), "Untitled Page");
    }

    #[test]
    fn writes_pages_and_resolves_name_collisions() {
        let dir = TempDir::new().unwrap();
        let mut sink = ExportSink::new(dir.path()).unwrap();

        let first = sink.write_page(&page_titled("Notes"), b"one").unwrap();
        let second = sink.write_page(&page_titled("Notes"), b"two").unwrap();

        assert!(first.ends_with("Notes.html"));
        assert!(second.ends_with("Notes (2).html"));
        assert_eq!(fs::read(&first).unwrap(), b"one");
        assert_eq!(fs::read(&second).unwrap(), b"two");
        sink.done();
    }
}
