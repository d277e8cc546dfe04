// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! Converting many export files in one run.
//!
//! [`run_batch`] walks the inputs, converts every conversation it finds,
//! and writes one Markdown file per conversation:
//!
//! - A single-thread file (as written by [`crate::split`]) is written to the
//!   output directory at its path relative to the input directory, with the
//!   extension changed to `.md`.
//! - A full archive is expanded, each conversation placed in the dated tree
//!   used by the splitter.
//!
//! A file that cannot be read, parsed, or converted is recorded and the
//! batch moves on. Diagnostics and failures are collected into log lines
//! that can be written out with [`write_log`].

use crate::classify::ClassifierConfig;
use crate::engine;
use crate::graph::GraphError;
use crate::parser::{self, Conversation, Export, ParseError};
use crate::renderer::{ConversationDocument, RenderOptions, render_markdown};
use crate::split::{INDEX_FILE, PathAllocator};
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default name of the log file, relative to the output directory.
pub const LOG_FILE: &str = "conversion_log.txt";

/// Error type for converting one conversation or file.
#[derive(Debug, Snafu)]
pub enum ConvertError {
    /// Failed to read an input file.
    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadInput {
        /// The input path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse an input file.
    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseInput {
        /// The input path.
        path: PathBuf,
        /// The underlying parse error.
        source: ParseError,
    },

    /// The conversation's message graph is malformed.
    #[snafu(display("malformed conversation '{title}': {source}"))]
    Structure {
        /// The conversation title.
        title: String,
        /// The underlying graph error.
        source: GraphError,
    },

    /// An archived conversation has no creation time to place it by.
    #[snafu(display("conversation '{title}' has no create_time"))]
    MissingCreateTime {
        /// The conversation title.
        title: String,
    },

    /// Failed to create an output directory.
    #[snafu(display("failed to create {}: {source}", path.display()))]
    CreateOutputDir {
        /// The directory path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to write an output file.
    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteOutput {
        /// The output path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Settings for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// How documents are rendered.
    pub render: RenderOptions,
    /// Which payload kinds are rendered or silently skipped.
    pub classifier: ClassifierConfig,
    /// Overwrite existing output files.
    pub force: bool,
    /// Report what would be written without writing anything.
    pub dry_run: bool,
    /// Suppress progress messages.
    pub quiet: bool,
}

/// An input file and its path relative to the input it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Where the file is.
    pub path: PathBuf,
    /// The path mirrored under the output directory.
    pub relative: PathBuf,
}

/// A conversation or file that could not be converted.
#[derive(Debug)]
pub struct Failure {
    /// The input file name, with the conversation title for archives.
    pub input: String,
    /// What went wrong.
    pub error: ConvertError,
}

/// Outcome of a batch run.
///
/// Counts are per conversation: an archive contributes one per thread, a
/// file that cannot be read or parsed contributes one failure.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Conversations encountered.
    pub read: usize,
    /// Conversations converted, including empty and skipped ones.
    pub succeeded: usize,
    /// Converted conversations that produced at least one diagnostic.
    pub flagged: usize,
    /// Conversations that could not be converted.
    pub failed: usize,
    /// Converted conversations with nothing to render; no file is written.
    pub empty: usize,
    /// Converted conversations whose output already existed.
    pub skipped: usize,
    /// Every failure, in processing order.
    pub failures: Vec<Failure>,
    /// Diagnostic and failure lines, each prefixed with its input.
    pub log: Vec<String>,
}

impl BatchSummary {
    /// Returns `true` if every conversation read was accounted for.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.read == self.succeeded + self.failed
    }
}

/// Collects all JSON files from the given inputs (files and directories).
///
/// Directories are walked recursively in file-name order. `index.json`
/// files written by the splitter are skipped. Explicit file inputs are
/// taken as is.
#[must_use]
pub fn collect_input_files(inputs: &[PathBuf]) -> Vec<InputFile> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                .filter(|e| e.file_name() != INDEX_FILE)
            {
                let relative = entry
                    .path()
                    .strip_prefix(input)
                    .unwrap_or_else(|_| entry.path())
                    .to_path_buf();
                files.push(InputFile {
                    path: entry.path().to_path_buf(),
                    relative,
                });
            }
        } else {
            let relative = input
                .file_name()
                .map_or_else(|| input.clone(), PathBuf::from);
            files.push(InputFile {
                path: input.clone(),
                relative,
            });
        }
    }
    files
}

/// Converts every input file into `out_dir`.
///
/// Never stops early: failures are recorded in the returned summary.
#[must_use]
pub fn run_batch(files: &[InputFile], out_dir: &Path, options: &BatchOptions) -> BatchSummary {
    let mut batch = Batch {
        out_dir,
        options,
        summary: BatchSummary::default(),
    };
    for file in files {
        batch.process_file(file);
    }

    let summary = batch.summary;
    info!(
        "Batch complete: {} read, {} succeeded, {} failed",
        summary.read, summary.succeeded, summary.failed
    );
    summary
}

/// Writes log lines to `path`, one per line.
///
/// # Errors
///
/// Returns an error if the file or its directory cannot be written.
pub fn write_log(lines: &[String], path: &Path) -> Result<(), ConvertError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateOutputDirSnafu { path: parent })?;
    }
    let mut contents = lines.join("\n");
    contents.push('\n');
    std::fs::write(path, contents).context(WriteOutputSnafu { path })
}

struct Batch<'a> {
    out_dir: &'a Path,
    options: &'a BatchOptions,
    summary: BatchSummary,
}

impl Batch<'_> {
    fn process_file(&mut self, file: &InputFile) {
        let name = file
            .path
            .file_name()
            .map_or_else(|| file.path.display().to_string(), |n| n.to_string_lossy().into_owned());
        debug!("Reading {}", file.path.display());

        let export = match read_export(&file.path) {
            Ok(export) => export,
            Err(error) => {
                self.summary.read += 1;
                self.fail(name, error);
                return;
            }
        };

        match export {
            Export::Thread(conversation) => {
                let relative = file.relative.with_extension("md");
                self.summary.read += 1;
                self.convert(&conversation, name, &relative);
            }
            Export::Archive(conversations) => {
                let mut paths = PathAllocator::new();
                for conversation in &conversations {
                    let label = format!("{name} ({})", conversation.title);
                    self.summary.read += 1;
                    let relative = conversation
                        .create_time
                        .and_then(|t| paths.allocate(t, &conversation.title, "md"));
                    match relative {
                        Some(relative) => self.convert(conversation, label, Path::new(&relative)),
                        None => {
                            let error = MissingCreateTimeSnafu {
                                title: &conversation.title,
                            }
                            .build();
                            self.fail(label, error);
                        }
                    }
                }
            }
        }
    }

    fn convert(&mut self, conversation: &Conversation, label: String, relative: &Path) {
        let mut diagnostics = Vec::new();
        let result = engine::convert(conversation, &self.options.classifier, &mut diagnostics)
            .context(StructureSnafu {
                title: &conversation.title,
            });
        let document = match result {
            Ok(document) => document,
            Err(error) => {
                self.fail(label, error);
                return;
            }
        };

        if !diagnostics.is_empty() {
            self.summary.flagged += 1;
        }
        for diagnostic in &diagnostics {
            info!("{label}: {diagnostic}");
            self.summary.log.push(format!("{label}: warning: {diagnostic}"));
        }

        if document.is_empty() {
            info!("{label}: nothing to render");
            self.summary.empty += 1;
            self.summary.succeeded += 1;
            return;
        }

        let out_path = self.out_dir.join(relative);
        match self.write(&document, &out_path) {
            Ok(()) => self.summary.succeeded += 1,
            Err(error) => self.fail(label, error),
        }
    }

    fn write(&mut self, document: &ConversationDocument, out_path: &Path) -> Result<(), ConvertError> {
        if self.options.dry_run {
            eprintln!("Would write {}", out_path.display());
            return Ok(());
        }

        if out_path.exists() && !self.options.force {
            self.summary.skipped += 1;
            if !self.options.quiet {
                eprintln!(
                    "Skipping {} (already exists, use --force to overwrite)",
                    out_path.display()
                );
            }
            return Ok(());
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).context(CreateOutputDirSnafu { path: parent })?;
        }
        let markdown = render_markdown(document, &self.options.render);
        std::fs::write(out_path, markdown).context(WriteOutputSnafu { path: out_path })?;

        if !self.options.quiet {
            eprintln!("Wrote {}", out_path.display());
        }
        Ok(())
    }

    fn fail(&mut self, input: String, error: ConvertError) {
        warn!("{input}: {error}");
        self.summary.log.push(format!("{input}: error: {error}"));
        self.summary.failed += 1;
        self.summary.failures.push(Failure { input, error });
    }
}

fn read_export(path: &Path) -> Result<Export, ConvertError> {
    let json = std::fs::read_to_string(path).context(ReadInputSnafu { path })?;
    parser::parse_any(&json).context(ParseInputSnafu { path })
}
