//! Defines the entities a build operates on: [`SourceFile`] (any discovered
//! file, copied verbatim), [`ContentItem`] (a Markdown post rendered to an
//! HTML page) and [`DiscoveredEntry`], the tagged union of the two.

use crate::frontmatter::{self, HistoryDates, Metadata};
use crate::history::VersionHistory;
use crate::markdown::{self, ContentRenderer};
use crate::path;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// The extension identifying Markdown sources.
pub const MARKDOWN_EXTENSION: &str = "md";
/// The extension of rendered pages.
pub const HTML_EXTENSION: &str = "html";

/// The marker which separates the summary of a post from the rest of it.
const FOLD_TAG: &str = "<!-- more -->";

/// A file discovered below a root directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    source_path: PathBuf,
    root_path: PathBuf,
    url: String,
}

impl SourceFile {
    /// Creates a [`SourceFile`] for `path` below `root`. Both paths are made
    /// absolute and normalized.
    pub fn new(path: &Path, root: &Path) -> Result<SourceFile> {
        let filesystem = |err| Error::Filesystem {
            path: path.to_owned(),
            err,
        };
        let source_path = path::absolute(path).map_err(filesystem)?;
        let root_path = path::absolute(root).map_err(filesystem)?;
        let url = path::url(&source_path, &root_path);
        Ok(SourceFile {
            source_path,
            root_path,
            url,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// The root-relative URL, e.g. `images/logo.png`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn basename(&self) -> String {
        self.source_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn basename_without_ext(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Where the file is copied to below `output_root`.
    pub fn destination_path(&self, output_root: &Path) -> PathBuf {
        output_root.join(&self.url)
    }

    pub fn is_markdown(&self) -> bool {
        self.source_path
            .extension()
            .map(|ext| ext == MARKDOWN_EXTENSION)
            .unwrap_or(false)
    }

    /// The category of a post stored at this path: the POSIX directory path
    /// from the root to the file's directory, or `.` for the root itself.
    pub fn category(&self) -> String {
        match self.source_path.parent() {
            Some(dir) => path::url(dir, &self.root_path),
            None => ".".to_owned(),
        }
    }

    /// The URL of the page rendered from this file:
    /// `{category}/{basename_without_ext}.html`, normalized.
    pub fn page_url(&self) -> String {
        let page = Path::new(&self.category())
            .join(format!("{}.{}", self.basename_without_ext(), HTML_EXTENSION));
        path::to_posix(&path::normalize(&page))
    }

    /// The relative path from this file's directory back up to the root,
    /// ending in `/`.
    pub fn relative_root_prefix(&self) -> String {
        match self.source_path.parent() {
            Some(dir) => path::relative_root_prefix(dir, &self.root_path),
            None => "./".to_owned(),
        }
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.source_path).map_err(|err| Error::Filesystem {
            path: self.source_path.clone(),
            err,
        })
    }
}

/// A Markdown post.
#[derive(Debug)]
pub struct ContentItem {
    file: SourceFile,
    category: String,
    url: String,
    metadata: Metadata,
    body: String,

    // Assigned at most once, the first time the body is rendered.
    rendered: OnceLock<String>,
}

impl ContentItem {
    /// Reads `file`, splits its front matter from its body and applies the
    /// metadata defaults. Version history is only consulted for defaults; if
    /// it is unavailable the dates are simply left unset.
    pub fn load(file: SourceFile, history: &dyn VersionHistory) -> Result<ContentItem> {
        let bytes = file.read()?;
        let document = String::from_utf8(bytes).map_err(|err| Error::Filesystem {
            path: file.source_path.clone(),
            err: io::Error::new(io::ErrorKind::InvalidData, err),
        })?;
        let (parsed, body) = frontmatter::split(&document).map_err(|err| Error::Metadata {
            path: file.source_path.clone(),
            err,
        })?;

        let dates = match history.log(&file.root_path, Some(&file.source_path)) {
            Ok(commits) => HistoryDates::from_commits(&commits),
            Err(err) => {
                debug!(path = %file.source_path.display(), %err, "version history unavailable");
                None
            }
        };
        let metadata = frontmatter::apply_defaults(parsed, &file.basename_without_ext(), dates);

        Ok(ContentItem::new(file, metadata, body.to_owned()))
    }

    /// Assembles a post from already-parsed parts.
    pub fn new(file: SourceFile, metadata: Metadata, body: String) -> ContentItem {
        ContentItem {
            category: file.category(),
            url: file.page_url(),
            file,
            metadata,
            body,
            rendered: OnceLock::new(),
        }
    }

    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// The page URL, `{category}/{basename_without_ext}.html`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn title(&self) -> String {
        self.metadata.title()
    }

    pub fn tags(&self) -> Vec<String> {
        self.metadata.tags()
    }

    /// The Markdown body, front matter excluded.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn destination_path(&self, output_root: &Path) -> PathBuf {
        output_root.join(&self.url)
    }

    pub fn relative_root_prefix(&self) -> String {
        self.file.relative_root_prefix()
    }

    /// The body rendered to HTML. The first call renders and caches the
    /// result; later calls return the cached HTML.
    pub fn rendered_body(&self, renderer: &dyn ContentRenderer) -> Result<&str> {
        if let Some(html) = self.rendered.get() {
            return Ok(html);
        }
        let html = renderer.render(&self.body).map_err(|err| Error::Render {
            path: self.file.source_path.clone(),
            err,
        })?;
        Ok(self.rendered.get_or_init(|| html))
    }

    /// The rendered body, if [`ContentItem::rendered_body`] has been called.
    pub fn rendered(&self) -> Option<&str> {
        self.rendered.get().map(String::as_str)
    }

    /// The part of the rendered body above the `<!-- more -->` fold, and
    /// whether the fold was present. Returns `None` if the body hasn't been
    /// rendered yet.
    pub fn summary(&self) -> Option<(&str, bool)> {
        let html = self.rendered.get()?;
        Some(match html.find(FOLD_TAG) {
            Some(i) => (&html[..i], true),
            None => (html.as_str(), false),
        })
    }
}

/// Whether a discovered file is copied verbatim or rendered as a post.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Plain,
    Content,
}

/// A discovered file, before it's loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub kind: EntryKind,
    pub file: SourceFile,
}

impl Candidate {
    /// The URL the candidate will occupy in the output tree.
    pub fn url(&self) -> String {
        match self.kind {
            EntryKind::Plain => self.file.url().to_owned(),
            EntryKind::Content => self.file.page_url(),
        }
    }
}

/// A loaded entry, ready to be built.
#[derive(Debug)]
pub enum DiscoveredEntry {
    Plain(SourceFile),
    Content(ContentItem),
}

impl DiscoveredEntry {
    /// Loads a [`Candidate`], parsing the front matter of posts.
    pub fn load(candidate: Candidate, history: &dyn VersionHistory) -> Result<DiscoveredEntry> {
        match candidate.kind {
            EntryKind::Plain => Ok(DiscoveredEntry::Plain(candidate.file)),
            EntryKind::Content => Ok(DiscoveredEntry::Content(ContentItem::load(
                candidate.file,
                history,
            )?)),
        }
    }
}

/// The result of loading or rendering an entry.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading or rendering an entry.
#[derive(Debug, Error)]
pub enum Error {
    /// A path could not be resolved or a file could not be read.
    #[error("'{}': {err}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// The front matter of a post is malformed.
    #[error("'{}': {err}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        err: frontmatter::Error,
    },

    /// The body of a post could not be rendered.
    #[error("rendering '{}': {err}", path.display())]
    Render {
        path: PathBuf,
        #[source]
        err: markdown::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frontmatter::{MetaValue, CREATED, TITLE, UPDATED};
    use crate::history::{self, Commit, NoHistory};
    use chrono::DateTime;
    use std::fs;

    struct FixedHistory(Vec<Commit>);

    impl VersionHistory for FixedHistory {
        fn log(&self, _: &Path, _: Option<&Path>) -> history::Result<Vec<Commit>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenHistory;

    impl VersionHistory for BrokenHistory {
        fn log(&self, _: &Path, _: Option<&Path>) -> history::Result<Vec<Commit>> {
            Err(history::Error::Failed("not a git repository".to_owned()))
        }
    }

    fn commit(timestamp: &str) -> Commit {
        Commit {
            id: "abc".to_owned(),
            author: "Ada".to_owned(),
            email: "ada@example.org".to_owned(),
            timestamp: DateTime::parse_from_rfc3339(timestamp).unwrap(),
            message: "msg".to_owned(),
        }
    }

    #[test]
    fn test_source_file_paths() -> Result<()> {
        let file = SourceFile::new(Path::new("/r/posts/tech/../tech/a.md"), Path::new("/r/posts"))?;
        assert_eq!("tech/a.md", file.url());
        assert_eq!("a.md", file.basename());
        assert_eq!("a", file.basename_without_ext());
        assert_eq!("tech", file.category());
        assert_eq!("tech/a.html", file.page_url());
        assert_eq!("../", file.relative_root_prefix());
        assert_eq!(
            Path::new("/out/tech/a.md"),
            file.destination_path(Path::new("/out"))
        );
        assert!(file.is_markdown());
        Ok(())
    }

    #[test]
    fn test_top_level_post() -> Result<()> {
        let file = SourceFile::new(Path::new("/r/posts/a.md"), Path::new("/r/posts"))?;
        assert_eq!(".", file.category());
        assert_eq!("a.html", file.page_url());
        assert_eq!("./", file.relative_root_prefix());
        Ok(())
    }

    #[test]
    fn test_content_item_destination() -> Result<()> {
        let file = SourceFile::new(Path::new("/r/posts/a/b/c.md"), Path::new("/r/posts"))?;
        let item = ContentItem::new(file, Metadata::new(), String::new());
        assert_eq!(
            Path::new("/site").join("a/b").join("c.html"),
            item.destination_path(Path::new("/site"))
        );
        Ok(())
    }

    #[test]
    fn test_load_with_history() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("notes"))?;
        let path = dir.path().join("notes/first.md");
        fs::write(&path, "---\ncreated: 2020-01-01\n---\nHello\n")?;

        let history = FixedHistory(vec![
            commit("2024-05-01T00:00:00Z"),
            commit("2024-01-01T00:00:00Z"),
        ]);
        let item = ContentItem::load(SourceFile::new(&path, dir.path())?, &history)?;
        assert_eq!("first", item.title());
        assert_eq!("notes", item.category());
        assert_eq!("Hello\n", item.body());
        assert_eq!(
            Some(&MetaValue::Text("2020-01-01".to_owned())),
            item.metadata().get(CREATED)
        );
        assert_eq!(
            Some(&MetaValue::Timestamp(
                DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")?
            )),
            item.metadata().get(UPDATED)
        );
        Ok(())
    }

    #[test]
    fn test_load_without_history() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.md");
        fs::write(&path, "---\ntitle: Hi\n---\nbody")?;
        let item = ContentItem::load(SourceFile::new(&path, dir.path())?, &BrokenHistory)?;
        assert_eq!(Some(&MetaValue::Text("Hi".to_owned())), item.metadata().get(TITLE));
        assert!(!item.metadata().contains_key(CREATED));
        assert!(!item.metadata().contains_key(UPDATED));
        Ok(())
    }

    #[test]
    fn test_load_malformed_front_matter() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.md");
        fs::write(&path, "---\ntitle: [oops\n---\nbody")?;
        match ContentItem::load(SourceFile::new(&path, dir.path())?, &NoHistory) {
            Err(err @ Error::Metadata { .. }) => assert!(err.to_string().contains("bad.md")),
            other => panic!("wanted a metadata error; found {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_rendered_body_is_cached() -> Result<()> {
        struct CountingRenderer(std::sync::atomic::AtomicUsize);
        impl ContentRenderer for CountingRenderer {
            fn render(&self, markdown: &str) -> markdown::Result<String> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(format!("<p>{}</p><!-- more --><p>rest</p>", markdown))
            }
        }

        let file = SourceFile::new(Path::new("/r/a.md"), Path::new("/r"))?;
        let item = ContentItem::new(file, Metadata::new(), "x".to_owned());
        assert_eq!(None, item.summary());

        let renderer = CountingRenderer(Default::default());
        assert_eq!(
            "<p>x</p><!-- more --><p>rest</p>",
            item.rendered_body(&renderer)?
        );
        item.rendered_body(&renderer)?;
        assert_eq!(1, renderer.0.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(Some(("<p>x</p>", true)), item.summary());
        Ok(())
    }
}
