// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! Splitting a full export archive into one file per conversation.
//!
//! ChatGPT exports every conversation into a single `conversations.json`.
//! [`split_archive`] writes each conversation out verbatim to
//! `YYYY/MM/YYYY-MM-DD-<title>.json` under an output directory, dated by
//! the conversation's creation time (UTC), and writes an `index.json`
//! listing every thread in creation order. Comparing two indexes from
//! different exports shows which threads were added or updated.
//!
//! The same path scheme is used by the batch converter when it expands an
//! archive directly to Markdown; see [`PathAllocator`].

use crate::parser::Conversation;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use snafu::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the index written next to the split threads.
pub const INDEX_FILE: &str = "index.json";

const MAX_TITLE_CHARS: usize = 50;

/// Error type for archive splitting.
#[derive(Debug, Snafu)]
pub enum SplitError {
    /// Failed to read the archive.
    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadArchive {
        /// The archive path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The archive is not valid JSON.
    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseArchive {
        /// The archive path.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The archive's top level is not an array.
    #[snafu(display("{} is not an archive: expected an array of conversations", path.display()))]
    NotAnArchive {
        /// The archive path.
        path: PathBuf,
    },

    /// Failed to create an output directory.
    #[snafu(display("failed to create {}: {source}", path.display()))]
    CreateDir {
        /// The directory path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to serialize a thread or the index.
    #[snafu(display("failed to serialize {}: {source}", path.display()))]
    Serialize {
        /// The file being written.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Failed to write a file.
    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A thread has no creation time, so it has no place in the tree.
    #[snafu(display("thread #{position} has no create_time"))]
    MissingCreateTime {
        /// One-based position in the archive.
        position: usize,
    },

    /// A thread is not a JSON object.
    #[snafu(display("thread #{position} is not a conversation: {source}"))]
    InvalidThread {
        /// One-based position in the archive.
        position: usize,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Outcome of a split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitSummary {
    /// Threads written.
    pub written: usize,
    /// Threads skipped because of an error.
    pub failed: usize,
}

/// One line of `index.json`.
#[derive(Debug, Serialize)]
struct IndexEntry {
    path: String,
    id: String,
    title: String,
    create_time: f64,
    update_time: Option<f64>,
    message_count: usize,
    model: Option<String>,
}

/// Makes a title safe to use as a file name.
///
/// Removes characters that are reserved on common filesystems, trims
/// whitespace, and caps the length at 50 characters. Returns `"untitled"`
/// if nothing is left.
///
/// ```
/// use cg2md::split::sanitize_filename;
///
/// assert_eq!(sanitize_filename("What is 2/3: a fraction?"), "What is 23 a fraction");
/// assert_eq!(sanitize_filename(" ??? "), "untitled");
/// ```
#[must_use]
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return "untitled".to_owned();
    }
    let truncated: String = cleaned.chars().take(MAX_TITLE_CHARS).collect();
    truncated.trim_end().to_owned()
}

fn creation_date(create_time: f64) -> Option<DateTime<Utc>> {
    if !create_time.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = (create_time * 1000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Hands out output paths in the dated tree, suffixing name collisions.
///
/// Paths are relative, `/`-separated, and unique among those handed out by
/// the same allocator: a second thread created on the same day with the
/// same title gets `_1`, the third `_2`, and so on.
#[derive(Debug, Default)]
pub struct PathAllocator {
    claimed: HashSet<String>,
}

impl PathAllocator {
    /// Creates an allocator with no claimed paths.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the path for a thread with the given creation time and title.
    ///
    /// Returns `None` if the creation time is not a representable date.
    ///
    /// ```
    /// use cg2md::split::PathAllocator;
    ///
    /// let mut paths = PathAllocator::new();
    /// let first = paths.allocate(1740795968.0, "Plans", "md").unwrap();
    /// let second = paths.allocate(1740795999.0, "Plans", "md").unwrap();
    ///
    /// assert_eq!(first, "2025/03/2025-03-01-Plans.md");
    /// assert_eq!(second, "2025/03/2025-03-01-Plans_1.md");
    /// ```
    pub fn allocate(&mut self, create_time: f64, title: &str, extension: &str) -> Option<String> {
        let date = creation_date(create_time)?;
        let dir = date.format("%Y/%m").to_string();
        let stem = format!("{}-{}", date.format("%Y-%m-%d"), sanitize_filename(title));

        let mut candidate = format!("{dir}/{stem}.{extension}");
        let mut counter = 1;
        while self.claimed.contains(&candidate) {
            candidate = format!("{dir}/{stem}_{counter}.{extension}");
            counter += 1;
        }
        self.claimed.insert(candidate.clone());
        Some(candidate)
    }
}

/// Splits an archive into per-thread files under `out_dir`.
///
/// Threads that cannot be placed or written are logged and counted in
/// [`SplitSummary::failed`]; they do not stop the split. `index.json` is
/// written last and lists the threads that were written, oldest first.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or is not a JSON array,
/// or if the output directory or the index cannot be written.
pub fn split_archive(archive: &Path, out_dir: &Path) -> Result<SplitSummary, SplitError> {
    let json = std::fs::read_to_string(archive).context(ReadArchiveSnafu { path: archive })?;
    let value: Value = serde_json::from_str(&json).context(ParseArchiveSnafu { path: archive })?;
    let Value::Array(threads) = value else {
        return NotAnArchiveSnafu { path: archive }.fail();
    };

    info!("Splitting {} threads from {}", threads.len(), archive.display());
    std::fs::create_dir_all(out_dir).context(CreateDirSnafu { path: out_dir })?;

    let mut paths = PathAllocator::new();
    let mut index = Vec::new();
    let mut summary = SplitSummary::default();

    for (i, thread) in threads.into_iter().enumerate() {
        match write_thread(thread, i + 1, out_dir, &mut paths) {
            Ok(entry) => {
                debug!("Wrote {}", entry.path);
                index.push(entry);
                summary.written += 1;
            }
            Err(err) => {
                warn!("Skipping thread: {err}");
                summary.failed += 1;
            }
        }
    }

    index.sort_by(|a, b| a.create_time.total_cmp(&b.create_time));
    let index_path = out_dir.join(INDEX_FILE);
    let index_json =
        serde_json::to_string_pretty(&index).context(SerializeSnafu { path: &index_path })?;
    std::fs::write(&index_path, index_json).context(WriteFileSnafu { path: &index_path })?;

    info!(
        "Split complete: {} written, {} failed",
        summary.written, summary.failed
    );
    Ok(summary)
}

fn write_thread(
    thread: Value,
    position: usize,
    out_dir: &Path,
    paths: &mut PathAllocator,
) -> Result<IndexEntry, SplitError> {
    let conversation: Conversation =
        serde_json::from_value(thread.clone()).context(InvalidThreadSnafu { position })?;
    let create_time = conversation
        .create_time
        .context(MissingCreateTimeSnafu { position })?;
    let relative = paths
        .allocate(create_time, &conversation.title, "json")
        .context(MissingCreateTimeSnafu { position })?;

    let path = out_dir.join(&relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;
    }
    let json = serde_json::to_string_pretty(&thread).context(SerializeSnafu { path: &path })?;
    std::fs::write(&path, json).context(WriteFileSnafu { path: &path })?;

    Ok(IndexEntry {
        path: relative,
        id: conversation.id.clone().unwrap_or_else(|| "unknown".to_owned()),
        message_count: conversation.message_count(),
        title: conversation.title,
        create_time,
        update_time: conversation.update_time,
        model: conversation.default_model_slug,
    })
}
