//! Discovers the files a build operates on.
//!
//! The source root is walked recursively (following symbolic links) in file
//! name order. Anything whose name starts with [`EXCLUSION_MARKER`] is
//! invisible to the build: excluded directories are not descended into.
//! Markdown files become posts and everything else is copied verbatim.
//! Finally the active theme's static assets are added, except where the
//! source tree already provides a file at the same URL.

use crate::entry::{self, Candidate, EntryKind, SourceFile};
use crate::theme::{self, Theme};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Files and directories whose name starts with this are skipped.
pub const EXCLUSION_MARKER: char = '_';

fn is_excluded(entry: &DirEntry) -> bool {
    // The root is never excluded, whatever its name.
    entry.depth() > 0
        && entry
            .file_name()
            .to_string_lossy()
            .starts_with(EXCLUSION_MARKER)
}

/// Walks `root` and returns every file to build, source files first and then
/// the theme's non-shadowed static assets.
pub fn discover(root: &Path, theme: Option<&Theme>) -> Result<Vec<Candidate>> {
    let mut candidates = walk(root)?;

    if let Some(theme) = theme {
        let mut urls: HashSet<String> = candidates.iter().map(Candidate::url).collect();
        for path in theme.static_files()? {
            let file = SourceFile::new(&path, theme.directory())?;
            if urls.insert(file.url().to_owned()) {
                debug!(url = file.url(), "adding theme asset");
                candidates.push(Candidate {
                    kind: EntryKind::Plain,
                    file,
                });
            } else {
                debug!(url = file.url(), "theme asset shadowed by source file");
            }
        }
    }

    Ok(candidates)
}

/// Walks `root`, skipping excluded entries, and classifies each file. Every
/// candidate has a distinct output URL: where a plain file would land on a
/// post's page (`a.html` next to `a.md`), the post wins.
pub fn walk(root: &Path) -> Result<Vec<Candidate>> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut urls: HashMap<String, usize> = HashMap::new();
    for result in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry))
    {
        let entry = result.map_err(|err| walk_error(root, err))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file = SourceFile::new(entry.path(), root)?;
        let kind = match file.is_markdown() {
            true => EntryKind::Content,
            false => EntryKind::Plain,
        };
        debug!(url = file.url(), ?kind, "discovered");
        let candidate = Candidate { kind, file };
        let url = candidate.url();
        match urls.get(&url) {
            Some(&i) => {
                let (post, shadowed) = match candidate.kind {
                    EntryKind::Content => (&candidate, &candidates[i]),
                    EntryKind::Plain => (&candidates[i], &candidate),
                };
                warn!(
                    url = %url,
                    post = %post.file.source_path().display(),
                    shadowed = %shadowed.file.source_path().display(),
                    "source file shadowed by a post with the same URL"
                );
                if candidate.kind == EntryKind::Content {
                    candidates[i] = candidate;
                }
            }
            None => {
                urls.insert(url, candidates.len());
                candidates.push(candidate);
            }
        }
    }
    Ok(candidates)
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err
        .path()
        .map(Path::to_owned)
        .unwrap_or_else(|| root.to_owned());
    Error::Walk {
        path,
        err: err.into(),
    }
}

/// The result of discovering source files.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error discovering source files.
#[derive(Debug, Error)]
pub enum Error {
    /// A directory could not be read.
    #[error("reading '{}': {err}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// A discovered path could not be resolved.
    #[error(transparent)]
    Entry(#[from] entry::Error),

    /// The theme's assets could not be listed.
    #[error(transparent)]
    Theme(#[from] theme::Error),
}
