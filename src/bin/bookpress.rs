//! CLI binary for bookpress.
//!
//! A thin shim over the library crate that loads `book.json`, maps CLI flags
//! onto `BookConfig` and prints results.

use anyhow::{Context, Result};
use bookpress::config::CONFIG_FILE_NAME;
use bookpress::{build, outline, BookConfig, BuildProgressCallback, ProgressCallback, TransformPolicy};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar advancing per chapter, with one log
/// line per finished chapter printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Name and start time of the chapter being processed.
    current: Mutex<Option<(String, Instant)>>,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading fonts and assets…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            current: Mutex::new(None),
            warnings: AtomicUsize::new(0),
        })
    }
}

impl BuildProgressCallback for CliProgressCallback {
    fn on_build_start(&self, total_chapters: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chapters  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_chapters as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Typesetting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Building {total_chapters} chapters…"))
        ));
    }

    fn on_chapter_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some((name.to_string(), Instant::now()));
        }
        self.bar.set_message(name.to_string());
    }

    fn on_chapter_complete(&self, index: usize, total: usize, html_len: usize) {
        let (name, elapsed_ms) = self
            .current
            .lock()
            .ok()
            .and_then(|mut c| c.take())
            .map(|(n, t)| (n, t.elapsed().as_millis()))
            .unwrap_or_default();
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<32} {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{html_len:>7} bytes")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_chapter_warning(&self, _index: usize, _total: usize, warning: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!("  {} {}", yellow("⚠"), yellow(warning)));
    }

    fn on_render_start(&self) {
        self.bar.set_prefix("Rendering");
        self.bar.set_message("Compiling PDF…");
    }

    fn on_build_complete(&self, chapters: usize, pages: usize) {
        self.bar.finish_and_clear();
        let warnings = self.warnings.load(Ordering::SeqCst);
        let warned = if warnings > 0 {
            format!("  ({} warnings)", yellow(&warnings.to_string()))
        } else {
            String::new()
        };
        eprintln!(
            "{} {} chapters, {} pages{warned}",
            green("✔"),
            bold(&chapters.to_string()),
            bold(&pages.to_string()),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Build the book in the current directory (reads ./book.json)
  bookpress build

  # Build another project, failing on malformed chapter HTML
  bookpress build --project ~/books/dandy-code --strict

  # Write the PDF elsewhere and keep the generated Typst source
  bookpress build -o /tmp/book.pdf --emit-typst

  # Machine-readable build summary
  bookpress build --no-progress --json

  # Heading checklist of all chapters
  bookpress outline

PROJECT LAYOUT:
  book.json            title, author, fonts, page geometry, …
  content/*.md         chapters, in file-name order
  assets/fonts/        font files named in book.json
  assets/cover.jpg     front cover (.jpg/.jpeg/.png or .html), optional
  assets/cover-back.*  back cover, optional
  assets/colophon.html [commit] and [year] are substituted, optional
  assets/theme.typ     Typst rules appended to the built-in theme, optional
  export/              output directory (created when missing)

ENVIRONMENT VARIABLES:
  RUST_LOG             Override the log filter (e.g. bookpress=debug)
"#;

/// Assemble a directory of Markdown chapters into a typeset PDF book.
#[derive(Parser, Debug)]
#[command(
    name = "bookpress",
    version,
    about = "Assemble a directory of Markdown chapters into a typeset PDF book",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BOOKPRESS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BOOKPRESS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the PDF.
    Build(BuildArgs),
    /// List every heading of every chapter.
    Outline(OutlineArgs),
}

#[derive(Args, Debug)]
struct ProjectArgs {
    /// Project directory.
    #[arg(short, long, env = "BOOKPRESS_PROJECT", default_value = ".")]
    project: PathBuf,

    /// Configuration file. Default: <project>/book.json.
    #[arg(short, long, env = "BOOKPRESS_CONFIG")]
    config: Option<PathBuf>,
}

impl ProjectArgs {
    fn load(&self) -> Result<BookConfig> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| self.project.join(CONFIG_FILE_NAME));
        BookConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Write the PDF here instead of <export>/<title>.pdf.
    #[arg(short, long, env = "BOOKPRESS_OUTPUT")]
    output: Option<PathBuf>,

    /// Abort on malformed chapter HTML instead of skipping the stage.
    #[arg(long, env = "BOOKPRESS_STRICT")]
    strict: bool,

    /// Also write the generated Typst source next to the PDF.
    #[arg(long)]
    emit_typst: bool,

    /// Disable progress bar.
    #[arg(long, env = "BOOKPRESS_NO_PROGRESS")]
    no_progress: bool,

    /// Print the build summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct OutlineArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Print headings as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match &cli.command {
        Command::Build(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Outline(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Build(args) => run_build(&cli, args, show_progress),
        Command::Outline(args) => run_outline(args),
    }
}

fn run_build(cli: &Cli, args: &BuildArgs, show_progress: bool) -> Result<()> {
    let mut config = args.project.load()?;
    if args.strict {
        config.transform_policy = TransformPolicy::Strict;
    }
    if args.emit_typst {
        config.emit_typst = true;
    }
    if let Some(ref output) = args.output {
        config.output = Some(absolute(output)?);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        config.progress_callback = Some(cb);
    }

    let output = build(&args.project.project, &config).context("Build failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }
    if !show_progress {
        eprintln!(
            "Built {} chapters, {} pages in {}ms",
            output.stats.chapters, output.stats.pages, output.stats.duration_ms
        );
        for w in &output.stats.warnings {
            eprintln!("  {} {}", yellow("⚠"), w);
        }
        for w in &output.stats.render_warnings {
            eprintln!("  {} {}", yellow("⚠"), w);
        }
    }
    eprintln!("   →  {}", bold(&output.output_path.display().to_string()));
    if let Some(ref typ) = output.typst_path {
        eprintln!("   {}", dim(&format!("Typst source: {}", typ.display())));
    }
    Ok(())
}

fn run_outline(args: &OutlineArgs) -> Result<()> {
    let config = args.project.load()?;
    let content = args.project.project.join(&config.paths.content);
    let entries = outline::collect(&content)
        .with_context(|| format!("Failed to read chapters from {}", content.display()))?;
    if args.json {
        let json = serde_json::to_string_pretty(&entries).context("Failed to serialise outline")?;
        println!("{json}");
    } else {
        print!("{}", outline::format_checklist(&entries));
    }
    Ok(())
}

/// `--output` is relative to the working directory, not the project.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    Ok(cwd.join(path))
}
