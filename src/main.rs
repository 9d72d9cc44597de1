use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tessera::build::build_site;
use tessera::config::{self, Config};
use tessera::history::{GitHistory, NoHistory, VersionHistory};
use tessera::markdown::MarkdownRenderer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// The theme written by `tessera init`.
const THEME_FILES: [(&str, &str); 4] = [
    ("main.html", include_str!("../themes/default/main.html")),
    ("categories.html", include_str!("../themes/default/categories.html")),
    ("post.html", include_str!("../themes/default/post.html")),
    ("style.css", include_str!("../themes/default/style.css")),
];

const DEFAULT_PROJECT: &str = "\
theme: default
theme_paths: []
sort_key: date      # date | created | updated
threads: 1
history: true       # read created/updated dates from `git log`
";

#[derive(Parser)]
#[command(name = "tessera", version)]
#[command(about = "Renders a tree of Markdown posts into a static site")]
struct Cli {
    /// Log every file as it is discovered and written
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build `{src-dir}/posts` into `{src-dir}/site`
    Build {
        /// The project directory
        #[arg(long, default_value = ".")]
        src_dir: PathBuf,

        /// The theme to render with (overrides the project file)
        #[arg(long)]
        theme: Option<String>,

        /// Worker threads used to build pages (overrides the project file)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Create a new project with an empty post tree and the default theme
    Init {
        /// The project directory
        #[arg(long, default_value = ".")]
        src_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;

    match cli.command {
        Command::Build {
            src_dir,
            theme,
            threads,
        } => {
            let mut config = Config::from_directory(&src_dir)?;
            if let Some(theme) = theme {
                config.theme = theme;
            }
            if let Some(threads) = threads {
                config.threads = threads.max(1);
            }

            let history: &dyn VersionHistory = match config.history {
                true => &GitHistory,
                false => &NoHistory,
            };
            let report = build_site(&config, history, &MarkdownRenderer::new())
                .with_context(|| format!("building '{}'", src_dir.display()))?;
            println!(
                "Built {} pages and copied {} files in {:.2?}",
                report.pages, report.files, report.elapsed
            );
        }
        Command::Init { src_dir } => init(&src_dir)?,
    }

    Ok(())
}

fn initialize_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

// Existing files are left alone so `init` can be rerun safely.
fn init(src_dir: &Path) -> Result<()> {
    let posts = src_dir.join(config::POSTS_DIR);
    fs::create_dir_all(&posts).with_context(|| format!("creating '{}'", posts.display()))?;

    let theme = src_dir.join(config::THEMES_DIR).join(config::DEFAULT_THEME);
    fs::create_dir_all(&theme).with_context(|| format!("creating '{}'", theme.display()))?;

    let mut files = vec![(src_dir.join(config::PROJECT_FILE), DEFAULT_PROJECT)];
    files.extend(
        THEME_FILES
            .iter()
            .map(|(name, contents)| (theme.join(name), *contents)),
    );
    for (path, contents) in files {
        if path.exists() {
            info!(path = %path.display(), "exists; skipping");
            continue;
        }
        fs::write(&path, contents).with_context(|| format!("writing '{}'", path.display()))?;
        info!(path = %path.display(), "created");
    }
    Ok(())
}
