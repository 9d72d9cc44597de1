//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: cleaning the output directory,
//! discovering and loading the source tree ([`crate::source`]), sorting the
//! posts, rendering each post and copying every other file, indexing the
//! posts ([`crate::index`]) and finally rendering the two listing pages.

use crate::config::{Config, SortKey};
use crate::entry::{self, ContentItem, DiscoveredEntry, SourceFile};
use crate::frontmatter::{self, SortValue, CREATED, DATE, UPDATED};
use crate::history::VersionHistory;
use crate::index;
use crate::markdown::{self, ContentRenderer};
use crate::source;
use crate::theme::{self, Templates, ThemeRegistry, CATEGORIES_TEMPLATE, MAIN_TEMPLATE, POST_TEMPLATE};
use crate::value;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// The name of the main listing page in the output root.
pub const INDEX_PAGE: &str = "index.html";
/// The name of the category listing page in the output root.
pub const CATEGORIES_PAGE: &str = "categories.html";

/// The steps of a build, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Cleaning,
    Discovering,
    Sorting,
    BuildingItems,
    Indexing,
    RenderingTopLevelPages,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Stage::Cleaning => "cleaning",
            Stage::Discovering => "discovering",
            Stage::Sorting => "sorting",
            Stage::BuildingItems => "building items",
            Stage::Indexing => "indexing",
            Stage::RenderingTopLevelPages => "rendering top-level pages",
            Stage::Done => "done",
        })
    }
}

/// What a successful build did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildReport {
    /// Wall time from the start of cleaning to the end of the build.
    pub elapsed: Duration,

    /// The number of HTML pages written (posts and listing pages).
    pub pages: usize,

    /// The number of files copied verbatim.
    pub files: usize,
}

/// Builds the site described by `config`. `history` supplies default post
/// dates and the commit log for the main page; `renderer` turns post bodies
/// into HTML. The first error aborts the build, possibly leaving a partially
/// written output directory.
pub fn build_site(
    config: &Config,
    history: &dyn VersionHistory,
    renderer: &dyn ContentRenderer,
) -> Result<BuildReport> {
    let start = Instant::now();
    let pool = thread_pool(config.threads)?;
    let pool = pool.as_ref();

    enter(Stage::Cleaning);
    clean(&config.output_directory)?;

    enter(Stage::Discovering);
    let theme = ThemeRegistry::new(config.theme_search_paths.clone()).resolve(&config.theme)?;
    let templates = theme.load_templates()?;
    let candidates = source::discover(&config.posts_directory, Some(&theme))?;
    let entries = each(pool, candidates, |candidate| {
        Ok(DiscoveredEntry::load(candidate, history)?)
    })?;
    let (mut items, files) = partition(entries);
    info!(posts = items.len(), files = files.len(), theme = theme.name(), "discovered");

    enter(Stage::Sorting);
    sort(&mut items, config.sort_key);

    enter(Stage::BuildingItems);
    let builder = Builder {
        output: &config.output_directory,
        templates: &templates,
        renderer,
    };
    let written = each(pool, items.iter().collect(), |item| builder.build_item(item))?;
    let mut pages = written.into_iter().filter(|written| *written).count();
    each(pool, files.iter().collect(), |file| builder.copy_file(file))?;

    enter(Stage::Indexing);
    let categories = index::categories(&items);
    let tags = index::tags(&items);
    debug!(categories = categories.len(), tags = tags.len(), "indexed");

    enter(Stage::RenderingTopLevelPages);
    let commits = match history.log(&config.source_directory, None) {
        Ok(commits) => commits,
        Err(err) => {
            warn!(%err, "version history unavailable; listing no commits");
            Vec::new()
        }
    };
    let main = value::listing_page(&items, &categories, &tags, Some(commits.as_slice()));
    if builder.write_page(MAIN_TEMPLATE, main, &config.output_directory.join(INDEX_PAGE))? {
        pages += 1;
    }
    let listing = value::listing_page(&items, &categories, &tags, None);
    if builder.write_page(
        CATEGORIES_TEMPLATE,
        listing,
        &config.output_directory.join(CATEGORIES_PAGE),
    )? {
        pages += 1;
    }

    enter(Stage::Done);
    let report = BuildReport {
        elapsed: start.elapsed(),
        pages,
        files: files.len(),
    };
    info!(
        elapsed = ?report.elapsed,
        pages = report.pages,
        files = report.files,
        "built site"
    );
    Ok(report)
}

fn enter(stage: Stage) {
    info!(%stage, "build stage");
}

// `None` runs sequentially on the calling thread.
fn thread_pool(threads: usize) -> Result<Option<ThreadPool>> {
    if threads <= 1 {
        return Ok(None);
    }
    Ok(Some(ThreadPoolBuilder::new().num_threads(threads).build()?))
}

// Applies `f` to every input, on `pool` if there is one. Results keep the
// order of `inputs`; the first error wins.
fn each<T, U, F>(pool: Option<&ThreadPool>, inputs: Vec<T>, f: F) -> Result<Vec<U>>
where
    T: Send,
    U: Send,
    F: Fn(T) -> Result<U> + Sync + Send,
{
    match pool {
        Some(pool) => pool.install(|| inputs.into_par_iter().map(&f).collect()),
        None => inputs.into_iter().map(f).collect(),
    }
}

fn partition(entries: Vec<DiscoveredEntry>) -> (Vec<ContentItem>, Vec<SourceFile>) {
    let mut items = Vec::new();
    let mut files = Vec::new();
    for entry in entries {
        match entry {
            DiscoveredEntry::Content(item) => items.push(item),
            DiscoveredEntry::Plain(file) => files.push(file),
        }
    }
    (items, files)
}

fn sort_value(item: &ContentItem, key: SortKey) -> SortValue {
    let metadata = item.metadata();
    let value = match key {
        SortKey::Date => metadata.get(DATE).or_else(|| metadata.get(CREATED)),
        SortKey::Created => metadata.get(CREATED),
        SortKey::Updated => metadata.get(UPDATED),
    };
    SortValue::from(value)
}

/// Orders `items` newest first by `key`, breaking ties by title (also
/// descending). Posts without a sort value come last.
pub fn sort(items: &mut [ContentItem], key: SortKey) {
    items.sort_by(|a, b| compare(b, a, key));
}

fn compare(a: &ContentItem, b: &ContentItem, key: SortKey) -> Ordering {
    sort_value(a, key)
        .cmp(&sort_value(b, key))
        .then_with(|| a.title().cmp(&b.title()))
}

/// Removes everything in `output` except hidden entries (names starting with
/// `.`), so e.g. a `.git` directory in the output survives rebuilds. A
/// missing output directory is not an error.
pub fn clean(output: &Path) -> Result<()> {
    let filesystem = |path: &Path| {
        let path = path.to_owned();
        move |err| Error::Filesystem { path, err }
    };

    let entries = match fs::read_dir(output) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(filesystem(output)(err)),
    };
    for entry in entries {
        let entry = entry.map_err(filesystem(output))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type().map_err(filesystem(&path))?;
        debug!(path = %path.display(), "removing");
        let removed = match file_type.is_dir() {
            true => fs::remove_dir_all(&path),
            false => fs::remove_file(&path),
        };
        removed.map_err(filesystem(&path))?;
    }
    Ok(())
}

struct Builder<'a> {
    output: &'a Path,
    templates: &'a Templates,
    renderer: &'a dyn ContentRenderer,
}

impl Builder<'_> {
    // Returns whether a page was written.
    fn build_item(&self, item: &ContentItem) -> Result<bool> {
        item.rendered_body(self.renderer)?;
        self.write_page(
            POST_TEMPLATE,
            value::post_page(item),
            &item.destination_path(self.output),
        )
    }

    fn copy_file(&self, file: &SourceFile) -> Result<()> {
        let destination = file.destination_path(self.output);
        create_parent(&destination)?;
        fs::copy(file.source_path(), &destination).map_err(|err| Error::Filesystem {
            path: file.source_path().to_owned(),
            err,
        })?;
        debug!(url = file.url(), "copied");
        Ok(())
    }

    // Renders `template` to `destination`; whitespace-only results are not
    // written.
    fn write_page(&self, template: &str, bindings: gtmpl::Value, destination: &Path) -> Result<bool> {
        let html = self
            .templates
            .render(template, bindings)
            .map_err(|err| match err {
                theme::Error::Template { template, message } => Error::Render {
                    path: destination.to_owned(),
                    template,
                    message,
                },
                err => Error::Theme(err),
            })?;
        if html.trim().is_empty() {
            debug!(path = %destination.display(), template, "skipping empty page");
            return Ok(false);
        }

        create_parent(destination)?;
        fs::write(destination, html).map_err(|err| Error::Filesystem {
            path: destination.to_owned(),
            err,
        })?;
        debug!(path = %destination.display(), template, "wrote page");
        Ok(true)
    }
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) => fs::create_dir_all(dir).map_err(|err| Error::Filesystem {
            path: dir.to_owned(),
            err,
        }),
        None => Ok(()),
    }
}

/// The result of a build.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site.
#[derive(Debug, Error)]
pub enum Error {
    /// A file or directory could not be read, written or removed.
    #[error("'{}': {err}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// A post's front matter is malformed.
    #[error("parsing front matter of '{}': {err}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        err: frontmatter::Error,
    },

    /// The theme could not be resolved or read.
    #[error(transparent)]
    Theme(#[from] theme::Error),

    /// A template failed while rendering a page.
    #[error("rendering '{}' with template `{template}`: {message}", path.display())]
    Render {
        path: PathBuf,
        template: String,
        message: String,
    },

    /// A post's Markdown body could not be rendered.
    #[error("rendering '{}': {err}", path.display())]
    Content {
        path: PathBuf,
        #[source]
        err: markdown::Error,
    },

    /// The worker pool could not be started.
    #[error("starting build threads: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
}

impl From<entry::Error> for Error {
    fn from(err: entry::Error) -> Error {
        match err {
            entry::Error::Filesystem { path, err } => Error::Filesystem { path, err },
            entry::Error::Metadata { path, err } => Error::Metadata { path, err },
            entry::Error::Render { path, err } => Error::Content { path, err },
        }
    }
}

impl From<source::Error> for Error {
    fn from(err: source::Error) -> Error {
        match err {
            source::Error::Walk { path, err } => Error::Filesystem { path, err },
            source::Error::Entry(err) => err.into(),
            source::Error::Theme(err) => Error::Theme(err),
        }
    }
}
