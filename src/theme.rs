//! Themes. A theme is a directory holding the three page templates
//! ([`MAIN_TEMPLATE`], [`CATEGORIES_TEMPLATE`], [`POST_TEMPLATE`]) plus any
//! static assets (stylesheets, scripts, images) that should ship with the
//! site. Themes are looked up by name in an explicit list of search
//! directories ([`ThemeRegistry`]); there is no global registry.
//!
//! Templates use Go's `text/template` syntax (via [`gtmpl`]).

use globset::{Glob, GlobSet, GlobSetBuilder};
use gtmpl::Value;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// The template rendered to `index.html`.
pub const MAIN_TEMPLATE: &str = "main.html";
/// The template rendered to `categories.html`.
pub const CATEGORIES_TEMPLATE: &str = "categories.html";
/// The template rendered once per post.
pub const POST_TEMPLATE: &str = "post.html";

const REQUIRED_TEMPLATES: [&str; 3] = [MAIN_TEMPLATE, CATEGORIES_TEMPLATE, POST_TEMPLATE];

/// Theme files matching any of these (case-insensitive) patterns are never
/// copied into the output: hidden files, theme source code, templates and
/// readmes.
const EXCLUDED_PATTERNS: [&str; 7] = [".*", "*/.*", "*.py", "*.pyc", "*.rs", "*.html", "*readme*"];

/// Maps theme names to theme directories.
#[derive(Clone, Debug)]
pub struct ThemeRegistry {
    search_paths: Vec<PathBuf>,
}

impl ThemeRegistry {
    /// Creates a registry which looks for `{search_path}/{name}` in each of
    /// `search_paths`, in order.
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        ThemeRegistry { search_paths }
    }

    /// Resolves a theme by name. The first search path containing a directory
    /// called `name` wins; that directory must contain every required
    /// template.
    pub fn resolve(&self, name: &str) -> Result<Theme> {
        let directory = self
            .search_paths
            .iter()
            .map(|search_path| search_path.join(name))
            .find(|candidate| candidate.is_dir())
            .ok_or_else(|| Error::NotFound {
                name: name.to_owned(),
                search_paths: self.search_paths.clone(),
            })?;

        for template in REQUIRED_TEMPLATES.iter() {
            if !directory.join(template).is_file() {
                return Err(Error::MissingTemplate {
                    name: name.to_owned(),
                    template: (*template).to_owned(),
                });
            }
        }

        debug!(theme = name, directory = %directory.display(), "resolved theme");
        Ok(Theme {
            name: name.to_owned(),
            directory,
        })
    }
}

/// A resolved theme.
#[derive(Clone, Debug)]
pub struct Theme {
    name: String,
    directory: PathBuf,
}

impl Theme {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Lists the theme's static assets: every file under the theme directory
    /// that isn't excluded by [`EXCLUDED_PATTERNS`], sorted by path.
    pub fn static_files(&self) -> Result<Vec<PathBuf>> {
        let excluded = excluded_patterns()?;
        let mut files = Vec::new();
        for result in WalkDir::new(&self.directory)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = result.map_err(|err| self.walk_error(err))?;
            if !entry.file_type().is_file() {
                continue;
            }
            // strip_prefix can't fail; every entry is below the theme dir
            let relative = match entry.path().strip_prefix(&self.directory) {
                Ok(relative) => crate::path::to_posix(relative).to_lowercase(),
                Err(_) => continue,
            };
            if !excluded.is_match(&relative) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Reads every required template into memory.
    pub fn load_templates(&self) -> Result<Templates> {
        let mut sources = HashMap::new();
        for template in REQUIRED_TEMPLATES.iter() {
            let path = self.directory.join(template);
            let source = std::fs::read_to_string(&path)
                .map_err(|err| Error::ReadTemplate { path, err })?;
            sources.insert((*template).to_owned(), source);
        }
        Ok(Templates {
            theme: self.name.clone(),
            sources,
        })
    }

    fn walk_error(&self, err: walkdir::Error) -> Error {
        let path = err
            .path()
            .map(Path::to_owned)
            .unwrap_or_else(|| self.directory.clone());
        Error::Walk {
            path,
            err: err.into(),
        }
    }
}

fn excluded_patterns() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in EXCLUDED_PATTERNS.iter() {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// A theme's templates, keyed by file name.
#[derive(Clone, Debug)]
pub struct Templates {
    theme: String,
    sources: HashMap<String, String>,
}

impl Templates {
    /// Builds a template set from in-memory sources.
    pub fn from_sources<I, K, V>(theme: &str, sources: I) -> Templates
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Templates {
            theme: theme.to_owned(),
            sources: sources
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Renders the template called `name` with `bindings` as the template's
    /// dot (`.`) value.
    pub fn render(&self, name: &str, bindings: Value) -> Result<String> {
        let source = self.sources.get(name).ok_or_else(|| Error::MissingTemplate {
            name: self.theme.clone(),
            template: name.to_owned(),
        })?;
        gtmpl::template(source, bindings).map_err(|err| Error::Template {
            template: name.to_owned(),
            message: err.to_string(),
        })
    }
}

/// The result of a theme operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error resolving a theme or rendering one of its templates.
#[derive(Debug, Error)]
pub enum Error {
    /// No search path contains a directory for the theme.
    #[error("theme `{name}` not found (searched {search_paths:?})")]
    NotFound {
        name: String,
        search_paths: Vec<PathBuf>,
    },

    /// The theme directory lacks a required template.
    #[error("theme `{name}` is missing template `{template}`")]
    MissingTemplate { name: String, template: String },

    /// A template file could not be read.
    #[error("reading template '{}': {err}", path.display())]
    ReadTemplate {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// The theme directory could not be walked.
    #[error("listing theme files '{}': {err}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// An exclusion pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] globset::Error),

    /// A template failed to parse or execute.
    #[error("rendering template `{template}`: {message}")]
    Template { template: String, message: String },
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn theme_dir(root: &Path, name: &str) -> io::Result<PathBuf> {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("css"))?;
        fs::create_dir_all(dir.join(".git"))?;
        for template in REQUIRED_TEMPLATES.iter() {
            fs::write(dir.join(template), "{{.title}}")?;
        }
        fs::write(dir.join("css/style.css"), "body {}")?;
        fs::write(dir.join("logo.png"), [0u8, 1, 2])?;
        fs::write(dir.join(".hidden"), "")?;
        fs::write(dir.join(".git/config"), "")?;
        fs::write(dir.join("theme.py"), "")?;
        fs::write(dir.join("theme.pyc"), "")?;
        fs::write(dir.join("README.md"), "")?;
        fs::write(dir.join("partial.HTML"), "")?;
        Ok(dir)
    }

    #[test]
    fn test_resolve_first_search_path_wins() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let first = tempfile::tempdir()?;
        let second = tempfile::tempdir()?;
        theme_dir(second.path(), "plain")?;
        let registry = ThemeRegistry::new(vec![first.path().to_owned(), second.path().to_owned()]);
        let theme = registry.resolve("plain")?;
        assert_eq!(second.path().join("plain"), theme.directory());
        assert_eq!("plain", theme.name());
        Ok(())
    }

    #[test]
    fn test_resolve_missing_theme() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = ThemeRegistry::new(vec![dir.path().to_owned()]);
        match registry.resolve("nope") {
            Err(err @ Error::NotFound { .. }) => assert!(err.to_string().contains("nope")),
            other => panic!("wanted NotFound; found {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_resolve_incomplete_theme() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("broken"))?;
        fs::write(dir.path().join("broken").join(MAIN_TEMPLATE), "")?;
        let registry = ThemeRegistry::new(vec![dir.path().to_owned()]);
        assert!(matches!(
            registry.resolve("broken"),
            Err(Error::MissingTemplate { template, .. }) if template == CATEGORIES_TEMPLATE
        ));
        Ok(())
    }

    #[test]
    fn test_static_files() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let dir = theme_dir(root.path(), "plain")?;
        let theme = ThemeRegistry::new(vec![root.path().to_owned()]).resolve("plain")?;
        let files: Vec<String> = theme
            .static_files()?
            .iter()
            .map(|f| crate::path::url(f, &dir))
            .collect();
        assert_eq!(vec!["css/style.css".to_owned(), "logo.png".to_owned()], files);
        Ok(())
    }

    #[test]
    fn test_render() -> Result<()> {
        let templates = Templates::from_sources(
            "inline",
            vec![(POST_TEMPLATE, "<h1>{{.title}}</h1>{{range .tags}}[{{.}}]{{end}}")],
        );
        let mut bindings = HashMap::new();
        bindings.insert("title".to_owned(), Value::String("Hello".to_owned()));
        bindings.insert(
            "tags".to_owned(),
            Value::Array(vec![Value::String("a".to_owned()), Value::String("b".to_owned())]),
        );
        assert_eq!(
            "<h1>Hello</h1>[a][b]",
            templates.render(POST_TEMPLATE, Value::Object(bindings))?
        );
        Ok(())
    }

    #[test]
    fn test_render_errors() {
        let templates = Templates::from_sources("inline", vec![(POST_TEMPLATE, "{{.title")]);
        assert!(matches!(
            templates.render(POST_TEMPLATE, Value::Nil),
            Err(Error::Template { .. })
        ));
        assert!(matches!(
            templates.render(MAIN_TEMPLATE, Value::Nil),
            Err(Error::MissingTemplate { .. })
        ));
    }
}
