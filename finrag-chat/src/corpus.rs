//! Loading the filing corpus from disk.
//!
//! Every `.txt` or `.md` file below the corpus directory is one filing whose
//! text was extracted ahead of time. Pages are separated by form feeds
//! (`\x0c`), as written by `pdftotext`; each non-blank page becomes one
//! [`Document`].

use std::fs;
use std::path::{Path, PathBuf};

use finrag_rag::Document;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{ChatError, Result};

/// Separator between pages in extracted filing text.
pub const PAGE_BREAK: char = '\x0c';

const EXTENSIONS: [&str; 2] = ["txt", "md"];

fn corpus_error(path: &Path, message: impl Into<String>) -> ChatError {
    ChatError::Corpus { path: path.display().to_string(), message: message.into() }
}

/// Find the filing files below `root`, in sorted order.
pub fn discover_filings(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(corpus_error(root, "corpus directory does not exist"));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| corpus_error(root, e.to_string()))?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| EXTENSIONS.iter().any(|e| ext == *e))
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Split one filing into per-page documents.
///
/// Page numbers are 1-based and count blank pages, so they match the
/// source filing even though blank pages produce no document.
pub fn split_pages(id: &str, text: &str) -> Vec<Document> {
    text.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| Document::new(id, page).with_page(i as u32 + 1))
        .collect()
}

/// Load every filing below `root`.
///
/// Document ids are paths relative to `root` with `/` separators, so the
/// same corpus produces the same ids on every platform.
pub fn load_corpus(root: impl AsRef<Path>) -> Result<Vec<Document>> {
    let root = root.as_ref();
    let mut documents = Vec::new();

    for path in discover_filings(root)? {
        let text = fs::read_to_string(&path).map_err(|e| corpus_error(&path, e.to_string()))?;
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let pages = split_pages(&id, &text);
        debug!(filing = %id, pages = pages.len(), "loaded filing");
        documents.extend(pages);
    }

    info!(root = %root.display(), documents = documents.len(), "corpus loaded");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_pages_are_skipped_but_counted() {
        let pages = split_pages("tsla.txt", "cover\x0c \n\x0cRevenue was $25B");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page, Some(1));
        assert_eq!(pages[1].page, Some(3));
        assert_eq!(pages[1].text, "Revenue was $25B");
    }

    #[test]
    fn loads_text_files_in_sorted_order() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("2023")).unwrap();
        fs::write(root.join("b.txt"), "beta").unwrap();
        fs::write(root.join("2023/a.md"), "alpha\x0cpage two").unwrap();
        fs::write(root.join("notes.pdf"), "binary").unwrap();

        let documents = load_corpus(root).unwrap();
        let ids: Vec<_> = documents.iter().map(Document::citation).collect();
        assert_eq!(ids, ["2023/a.md p.1", "2023/a.md p.2", "b.txt p.1"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = load_corpus(temp.path().join("missing")).unwrap_err();
        assert!(matches!(err, ChatError::Corpus { .. }));
    }
}
