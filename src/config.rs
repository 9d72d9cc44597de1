//! Build configuration. A [`Config`] is derived from a source directory and
//! the optional project file `tessera.yaml` inside it:
//!
//! ```yaml
//! theme: default          # name of the theme directory
//! theme_paths: [../themes] # extra theme search paths, relative to the source directory
//! sort_key: date          # date | created | updated
//! threads: 4              # worker threads used to build pages
//! history: true           # consult `git log` for created/updated dates
//! ```

use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The name of the optional project file in the source directory.
pub const PROJECT_FILE: &str = "tessera.yaml";
/// The directory below the source directory holding posts.
pub const POSTS_DIR: &str = "posts";
/// The directory below the source directory receiving the site.
pub const SITE_DIR: &str = "site";
/// The directory below the source directory searched for themes.
pub const THEMES_DIR: &str = "themes";
/// The theme used when none is configured.
pub const DEFAULT_THEME: &str = "default";

/// The metadata that orders posts (newest first). Ties are broken by title.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// The explicit `date` field, falling back to `created` when absent.
    #[default]
    Date,

    /// The `created` field.
    Created,

    /// The `updated` field.
    Updated,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            SortKey::Date => "date",
            SortKey::Created => "created",
            SortKey::Updated => "updated",
        })
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "date" => Ok(SortKey::Date),
            "created" => Ok(SortKey::Created),
            "updated" => Ok(SortKey::Updated),
            _ => Err(format!(
                "unknown sort key `{}` (expected date, created or updated)",
                s
            )),
        }
    }
}

#[derive(Deserialize)]
struct Threads(usize);
impl Default for Threads {
    fn default() -> Self {
        Threads(1)
    }
}

#[derive(Deserialize)]
struct History(bool);
impl Default for History {
    fn default() -> Self {
        History(true)
    }
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Project {
    #[serde(default)]
    theme: Option<String>,

    #[serde(default)]
    theme_paths: Vec<PathBuf>,

    #[serde(default)]
    sort_key: SortKey,

    #[serde(default)]
    threads: Threads,

    #[serde(default)]
    history: History,
}

/// Everything a build needs to know. Paths are used as given; the build
/// resolves them against the working directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The project directory (the `--src-dir`). History queries for the
    /// main page run here.
    pub source_directory: PathBuf,

    /// The root of the post tree, `{source_directory}/posts`.
    pub posts_directory: PathBuf,

    /// The output root, `{source_directory}/site`.
    pub output_directory: PathBuf,

    /// The name of the theme to render with.
    pub theme: String,

    /// Directories searched (in order) for `{path}/{theme}`.
    pub theme_search_paths: Vec<PathBuf>,

    /// How posts are ordered.
    pub sort_key: SortKey,

    /// The number of threads used to build pages; `1` builds sequentially.
    pub threads: usize,

    /// Whether version history is consulted.
    pub history: bool,
}

impl Config {
    /// The default configuration for a source directory, ignoring any
    /// project file.
    pub fn new(source_directory: &Path) -> Config {
        Config::from_project(source_directory, Project::default())
    }

    /// Loads the configuration for `source_directory`, reading
    /// [`PROJECT_FILE`] if it exists.
    pub fn from_directory(source_directory: &Path) -> Result<Config> {
        let path = source_directory.join(PROJECT_FILE);
        let project = match File::open(&path) {
            // An empty project file is the same as a missing one.
            Ok(file) => serde_yaml::from_reader::<_, Option<Project>>(file)
                .map_err(|err| Error::Parse {
                    path: path.clone(),
                    err,
                })?
                .unwrap_or_default(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Project::default(),
            Err(err) => return Err(Error::Open { path, err }),
        };
        Ok(Config::from_project(source_directory, project))
    }

    fn from_project(source_directory: &Path, project: Project) -> Config {
        let mut theme_search_paths = vec![source_directory.join(THEMES_DIR)];
        theme_search_paths.extend(
            project
                .theme_paths
                .iter()
                .map(|path| source_directory.join(path)),
        );
        Config {
            source_directory: source_directory.to_owned(),
            posts_directory: source_directory.join(POSTS_DIR),
            output_directory: source_directory.join(SITE_DIR),
            theme: project.theme.unwrap_or_else(|| DEFAULT_THEME.to_owned()),
            theme_search_paths,
            sort_key: project.sort_key,
            threads: project.threads.0.max(1),
            history: project.history.0,
        }
    }
}

/// The result of loading configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading the project file.
#[derive(Debug, Error)]
pub enum Error {
    /// The project file exists but can't be opened.
    #[error("opening project file '{}': {err}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// The project file is not valid.
    #[error("loading project file '{}': {err}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },
}
