// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! Command-line interface for cg2md.
//!
//! This binary provides the `cg2md` command for converting ChatGPT
//! conversation exports from JSON to Markdown, and for splitting a full
//! export archive into one file per conversation.

use cg2md::batch::{self, BatchOptions, BatchSummary};
use cg2md::classify::ClassifierConfig;
use cg2md::parser::{self, Export};
use cg2md::renderer::{self, RenderOptions};
use cg2md::{engine, graph, split};
use lexopt::prelude::*;
use snafu::{OptionExt, ensure, prelude::*};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// How many failures to list after a batch run.
const MAX_LISTED_FAILURES: usize = 10;

/// Where to write the rendered output.
#[derive(Clone)]
enum OutputTarget {
    /// Write each file to the specified directory.
    Directory(PathBuf),
    /// Write to stdout.
    Stdout,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Command {
    Convert,
    Split,
}

#[allow(clippy::struct_excessive_bools)]
struct Cli {
    command: Command,
    input: Vec<PathBuf>,
    output: Option<OutputTarget>,
    render: RenderOptions,
    classifier: ClassifierConfig,
    log_file: Option<PathBuf>,
    verbose: bool,
    quiet: bool,
    dry_run: bool,
    force: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("at least one input file or directory is required"))]
    NoInputFiles,

    #[snafu(display("missing required option: --output"))]
    MissingOutput,

    #[snafu(display("stdout output takes exactly one conversation"))]
    NotSingleConversation,

    #[snafu(display("split takes exactly one archive"))]
    SplitArgs,

    #[snafu(display("failed to create output directory: {source}"))]
    CreateOutputDir { source: std::io::Error },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: parser::ParseError,
    },

    #[snafu(display("failed to convert {}: {source}", path.display()))]
    Convert {
        path: PathBuf,
        source: graph::GraphError,
    },

    #[snafu(display("failed to write log: {source}"))]
    WriteLog { source: batch::ConvertError },

    #[snafu(transparent)]
    Split { source: split::SplitError },

    #[snafu(display("all {count} conversation(s) failed"))]
    AllFailed { count: usize },
}

fn print_help() {
    println!(
        "\
{name} {version}
Convert ChatGPT conversation exports to Markdown

Usage: {name} [convert] [OPTIONS] -o <OUTPUT> <INPUT>...
       {name} split [-o <DIR>] <ARCHIVE>

Commands:
  convert  Convert threads or archives to Markdown (default)
  split    Split conversations.json into one JSON file per thread

Arguments:
  <INPUT>...  Input JSON files or directories containing exports
  <ARCHIVE>   A conversations.json export

Options:
  -o, --output <OUTPUT>     Output directory (or - for stdout)
                            For split: defaults to raw/ next to the archive
      --heading-offset <N>  Shift heading levels by N (0-5, default: 0)
      --assistant-label <L> Heading label for responses (default: ChatGPT)
      --no-front-matter     Omit the YAML front matter

Metadata display (use --show-* or --hide-*):
      --show-timestamps     Include message timestamps (default: on)
      --hide-timestamps     Hide message timestamps
      --show-model          Include model slug (default: on)
      --hide-model          Hide model slug

Content selection:
      --allow-kind <KIND>   Render messages of this content type
      --skip-kind <KIND>    Drop messages of this content type silently

Other options:
      --log <FILE>          Write warnings and errors here
                            (default: <OUTPUT>/{log_file})
  -v, --verbose             Log progress details (RUST_LOG overrides)
  -q, --quiet               Suppress progress messages
  -n, --dry-run             Show what would be processed without writing
  -f, --force               Overwrite existing output files
  -h, --help                Print help
  -V, --version             Print version",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        log_file = batch::LOG_FILE,
    );
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    // Show help if no arguments provided
    if std::env::args().len() == 1 {
        print_help();
        std::process::exit(0);
    }

    let mut cli = Cli {
        command: Command::Convert,
        input: Vec::new(),
        output: None,
        render: RenderOptions::default(),
        classifier: ClassifierConfig::default(),
        log_file: None,
        verbose: false,
        quiet: false,
        dry_run: false,
        force: false,
    };
    let mut seen_command = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) if !seen_command && cli.input.is_empty() && (val == "convert" || val == "split") => {
                seen_command = true;
                if val == "split" {
                    cli.command = Command::Split;
                }
            }
            Short('o') | Long("output") => {
                let val: PathBuf = parser.value()?.parse()?;
                cli.output = Some(if val == Path::new("-") {
                    OutputTarget::Stdout
                } else {
                    OutputTarget::Directory(val)
                });
            }
            // Show/hide flags - last one wins
            Long("show-timestamps") => cli.render.show_timestamps = true,
            Long("hide-timestamps") => cli.render.show_timestamps = false,
            Long("show-model") => cli.render.show_model = true,
            Long("hide-model" | "no-model") => cli.render.show_model = false,
            Long("no-front-matter") => cli.render.front_matter = false,
            Long("heading-offset") => {
                let val: u8 = parser
                    .value()?
                    .parse()
                    .map_err(|_| "heading-offset must be a number 0-5")?;
                if val > 5 {
                    return Err("heading-offset must be 0-5".into());
                }
                cli.render.heading_offset = val;
            }
            Long("assistant-label") => cli.render.assistant_label = parser.value()?.string()?,
            Long("allow-kind") => {
                cli.classifier = cli.classifier.with_allowed(parser.value()?.string()?);
            }
            Long("skip-kind") => {
                cli.classifier = cli.classifier.with_silent_skip(parser.value()?.string()?);
            }
            Long("log") => cli.log_file = Some(parser.value()?.parse()?),
            Short('v') | Long("verbose") => cli.verbose = true,
            Short('q') | Long("quiet") => cli.quiet = true,
            Short('n') | Long("dry-run") => cli.dry_run = true,
            Short('f') | Long("force") => cli.force = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) => cli.input.push(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(cli)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;
    init_tracing(cli.verbose);

    ensure!(!cli.input.is_empty(), NoInputFilesSnafu);

    match cli.command {
        Command::Split => run_split(&cli),
        Command::Convert => match cli.output.clone().context(MissingOutputSnafu)? {
            OutputTarget::Stdout => process_to_stdout(&cli),
            OutputTarget::Directory(dir) => process_directory(&dir, &cli),
        },
    }
}

/// Creates batch options from CLI arguments.
fn make_batch_options(cli: &Cli) -> BatchOptions {
    BatchOptions {
        render: cli.render.clone(),
        classifier: cli.classifier.clone(),
        force: cli.force,
        dry_run: cli.dry_run,
        quiet: cli.quiet,
    }
}

/// Converts a single conversation and writes it to stdout.
fn process_to_stdout(cli: &Cli) -> Result<(), Error> {
    let files = batch::collect_input_files(&cli.input);
    ensure!(files.len() == 1, NotSingleConversationSnafu);
    let input = &files[0].path;

    if cli.dry_run {
        eprintln!("Would output {}", input.display());
        return Ok(());
    }

    let json = std::fs::read_to_string(input).context(ReadFileSnafu { path: input })?;
    let conversation = match parser::parse_any(&json).context(ParseFileSnafu { path: input })? {
        Export::Thread(conversation) => conversation,
        Export::Archive(mut list) if list.len() == 1 => list.remove(0),
        Export::Archive(_) => return NotSingleConversationSnafu.fail(),
    };

    let mut diagnostics = Vec::new();
    let document = engine::convert(&conversation, &cli.classifier, &mut diagnostics)
        .context(ConvertSnafu { path: input })?;

    if !cli.quiet {
        for diagnostic in &diagnostics {
            eprintln!("warning: {diagnostic}");
        }
    }

    print!("{}", renderer::render_markdown(&document, &cli.render));
    Ok(())
}

/// Converts every input into the output directory and reports a summary.
fn process_directory(dir: &Path, cli: &Cli) -> Result<(), Error> {
    let files = batch::collect_input_files(&cli.input);
    ensure!(!files.is_empty(), NoInputFilesSnafu);

    if !cli.dry_run {
        std::fs::create_dir_all(dir).context(CreateOutputDirSnafu)?;
    }

    let summary = batch::run_batch(&files, dir, &make_batch_options(cli));

    if !cli.dry_run && !summary.log.is_empty() {
        let log_path = cli.log_file.clone().unwrap_or_else(|| dir.join(batch::LOG_FILE));
        batch::write_log(&summary.log, &log_path).context(WriteLogSnafu)?;
        if !cli.quiet {
            eprintln!("Details in {}", log_path.display());
        }
    }

    report(&summary, cli.quiet);

    ensure!(
        summary.read == 0 || summary.succeeded > 0,
        AllFailedSnafu {
            count: summary.failed
        }
    );
    Ok(())
}

fn report(summary: &BatchSummary, quiet: bool) {
    if !summary.is_consistent() {
        eprintln!(
            "warning: counts do not add up: {} read, {} succeeded, {} failed",
            summary.read, summary.succeeded, summary.failed
        );
    }
    if quiet {
        return;
    }

    eprintln!(
        "Converted {} of {} conversation(s): {} with warnings, {} empty, {} skipped, {} failed",
        summary.succeeded,
        summary.read,
        summary.flagged,
        summary.empty,
        summary.skipped,
        summary.failed
    );
    for failure in summary.failures.iter().take(MAX_LISTED_FAILURES) {
        eprintln!("  {}: {}", failure.input, failure.error);
    }
    if summary.failures.len() > MAX_LISTED_FAILURES {
        eprintln!(
            "  ... and {} more",
            summary.failures.len() - MAX_LISTED_FAILURES
        );
    }
}

/// Splits one archive into per-thread JSON files.
fn run_split(cli: &Cli) -> Result<(), Error> {
    ensure!(cli.input.len() == 1, SplitArgsSnafu);
    let archive = &cli.input[0];

    let out_dir = match &cli.output {
        Some(OutputTarget::Directory(dir)) => dir.clone(),
        Some(OutputTarget::Stdout) => return SplitArgsSnafu.fail(),
        None => archive
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("raw"),
    };

    if cli.dry_run {
        eprintln!("Would split {} into {}", archive.display(), out_dir.display());
        return Ok(());
    }

    let summary = split::split_archive(archive, &out_dir)?;

    if !cli.quiet {
        eprintln!(
            "Split {} thread(s) into {} ({} failed)",
            summary.written,
            out_dir.display(),
            summary.failed
        );
    }

    ensure!(
        summary.written > 0 || summary.failed == 0,
        AllFailedSnafu {
            count: summary.failed
        }
    );
    Ok(())
}
