// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! Markdown rendering for assembled conversations.
//!
//! Rendering happens in two steps. [`build_document`] maps the retained
//! [`Turn`]s to a [`ConversationDocument`], keeping only renderable text and
//! the metadata needed to present it. [`render_markdown`] then writes that
//! document out.
//!
//! # Output Format
//!
//! The rendered Markdown includes:
//! - Optional YAML front matter (title, dates, duration, turn count)
//! - A `# <title>` heading with the conversation period
//! - A `## Turn NN` section per turn, with `### User` and `### ChatGPT`
//!   subsections
//! - One labeled subsection per alternate (`response 2 of 3`) when an answer
//!   was regenerated
//! - Distinct markers for code, reasoning, and reasoning-recap content
//!
//! # Example
//!
//! ```
//! use cg2md::classify::ClassifierConfig;
//! use cg2md::diagnostics::Discard;
//! use cg2md::engine::convert;
//! use cg2md::parser::parse_conversation;
//! use cg2md::renderer::{render_markdown, RenderOptions};
//!
//! let json = r#"{
//!     "title": "Arithmetic",
//!     "mapping": {
//!         "u": { "parent": null, "children": ["a"], "message": {
//!             "author": { "role": "user" },
//!             "content": { "content_type": "text", "parts": ["What is 2+2?"] } } },
//!         "a": { "parent": "u", "children": [], "message": {
//!             "author": { "role": "assistant" },
//!             "content": { "content_type": "text", "parts": ["4"] } } }
//!     }
//! }"#;
//!
//! let conversation = parse_conversation(json).unwrap();
//! let document = convert(&conversation, &ClassifierConfig::default(), &mut Discard).unwrap();
//! let markdown = render_markdown(&document, &RenderOptions::default());
//!
//! assert!(markdown.contains("# Arithmetic"));
//! assert!(markdown.contains("What is 2+2?"));
//! assert!(markdown.contains("### ChatGPT\n\n4"));
//! ```

use crate::assemble::{Entry, Turn};
use crate::classify::TextStyle;
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Configuration options for Markdown rendering.
///
/// Controls which optional elements are included in the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Whether to include per-message timestamps.
    pub show_timestamps: bool,

    /// Whether to include the model slug under each response.
    pub show_model: bool,

    /// Whether to start the document with YAML front matter.
    pub front_matter: bool,

    /// Number of heading levels to shift (0-5).
    ///
    /// A value of 0 produces H1/H2/H3 headings (default).
    /// A value of 1 produces H2/H3/H4 headings, useful for embedding.
    pub heading_offset: u8,

    /// Heading used for assistant sections.
    pub assistant_label: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_timestamps: true,
            show_model: true,
            front_matter: true,
            heading_offset: 0,
            assistant_label: "ChatGPT".to_owned(),
        }
    }
}

/// Document metadata passed through from the archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMeta {
    /// The conversation title.
    pub title: String,
    /// Creation time in Unix seconds.
    pub create_time: Option<f64>,
    /// Last update time in Unix seconds.
    pub update_time: Option<f64>,
}

/// One rendered message.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// The trimmed message text.
    pub text: String,
    /// How to present the text.
    pub style: TextStyle,
    /// Source language for code sections.
    pub language: Option<String>,
    /// Number of attachments left out.
    pub attachments: usize,
    /// Creation time in Unix seconds.
    pub create_time: Option<f64>,
    /// The model that produced the message.
    pub model_slug: Option<String>,
}

/// One rendered turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnBlock {
    /// Zero-based position in the document.
    pub ordinal: usize,
    /// The user's message, unless it had no renderable text.
    pub prompt: Option<Section>,
    /// Renderable responses in archive order. More than one means the answer
    /// was regenerated.
    pub responses: Vec<Section>,
}

/// A conversation ready to be written out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationDocument {
    /// Title and dates from the archive.
    pub meta: DocumentMeta,
    /// Turns in ordinal order.
    pub turns: Vec<TurnBlock>,
}

impl ConversationDocument {
    /// Returns `true` if no turn survived.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Time of the last message: the last turn's last response, or its
    /// prompt when it has none.
    #[must_use]
    pub fn last_message_time(&self) -> Option<f64> {
        let last = self.turns.last()?;
        match last.responses.last() {
            Some(response) => response.create_time,
            None => last.prompt.as_ref()?.create_time,
        }
    }

    /// Whole days between conversation creation and the last message.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn duration_days(&self) -> i64 {
        match (self.meta.create_time, self.last_message_time()) {
            (Some(first), Some(last)) if last > first => ((last - first) / 86_400.0) as i64,
            _ => 0,
        }
    }
}

/// Maps retained turns to a document.
///
/// Turns are expected in ordinal order with empty ones already removed.
#[must_use]
pub fn build_document(meta: DocumentMeta, turns: &[Turn<'_>]) -> ConversationDocument {
    let turns = turns
        .iter()
        .map(|turn| TurnBlock {
            ordinal: turn.ordinal,
            prompt: section(&turn.human),
            responses: turn.renderable_responses().filter_map(section).collect(),
        })
        .collect();
    ConversationDocument { meta, turns }
}

fn section(entry: &Entry<'_>) -> Option<Section> {
    let text = entry.text()?;
    let message = entry.node.message.as_ref()?;
    Some(Section {
        text: text.to_owned(),
        style: TextStyle::for_kind(&message.kind),
        language: message.payload.language.clone(),
        attachments: message.payload.attachments,
        create_time: message.create_time,
        model_slug: message.model_slug.clone(),
    })
}

/// Returns a markdown heading prefix with the given level and offset.
///
/// The heading level is clamped to a maximum of 6 (H6).
fn heading(level: u8, offset: u8) -> String {
    let actual = (level + offset).min(6);
    "#".repeat(actual as usize)
}

/// Formats Unix seconds as `YYYY-MM-DDTHH:MM` in UTC.
#[must_use]
pub fn format_timestamp(unix_seconds: Option<f64>) -> Option<String> {
    let seconds = unix_seconds.filter(|s| s.is_finite())?;
    #[allow(clippy::cast_possible_truncation)]
    let millis = (seconds * 1000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.format("%Y-%m-%dT%H:%M").to_string())
}

/// Renders a document as Markdown.
///
/// The output depends only on the document and the options.
#[must_use]
pub fn render_markdown(doc: &ConversationDocument, opts: &RenderOptions) -> String {
    let mut out = String::new();

    if opts.front_matter {
        render_front_matter(&mut out, doc);
    }
    render_header(&mut out, doc, opts);

    if doc.is_empty() {
        out.push_str("_No messages._\n");
        return out;
    }

    for turn in &doc.turns {
        render_turn(&mut out, turn, opts);
    }

    out
}

fn render_front_matter(out: &mut String, doc: &ConversationDocument) {
    let date = |t: Option<f64>| format_timestamp(t).unwrap_or_default();
    let _ = write!(
        out,
        "---\n\
         title: {}\n\
         date: {}\n\
         date-update: {}\n\
         first-message-date: {}\n\
         last-message-date: {}\n\
         duration-days: {}\n\
         turn-count: {}\n\
         ---\n\n",
        yaml_string(&doc.meta.title),
        date(doc.meta.create_time),
        date(doc.meta.update_time),
        date(doc.meta.create_time),
        date(doc.last_message_time()),
        doc.duration_days(),
        doc.turns.len(),
    );
}

fn render_header(out: &mut String, doc: &ConversationDocument, opts: &RenderOptions) {
    let _ = writeln!(out, "{} {}\n", heading(1, opts.heading_offset), doc.meta.title);

    let first = format_timestamp(doc.meta.create_time);
    let last = format_timestamp(doc.last_message_time());
    if let (Some(first), Some(last)) = (first, last) {
        let _ = writeln!(
            out,
            "**Period:** {first} – {last} ({} days)  ",
            doc.duration_days()
        );
    }
    let _ = writeln!(out, "**Turns:** {}\n", doc.turns.len());
}

fn render_turn(out: &mut String, turn: &TurnBlock, opts: &RenderOptions) {
    let offset = opts.heading_offset;
    let speaker_level = 3 + offset;

    let _ = writeln!(out, "{} Turn {:02}\n", heading(2, offset), turn.ordinal + 1);

    let _ = writeln!(out, "{} User\n", heading(3, offset));
    match &turn.prompt {
        Some(prompt) => render_section(out, prompt, speaker_level, opts, false),
        None => out.push_str("_No message._\n\n"),
    }

    let label = &opts.assistant_label;
    match turn.responses.as_slice() {
        [] => {
            let _ = writeln!(out, "{} {label}\n\n_No response._\n", heading(3, offset));
        }
        [only] => {
            let _ = writeln!(out, "{} {label}\n", heading(3, offset));
            render_section(out, only, speaker_level, opts, true);
        }
        alternates => {
            let total = alternates.len();
            for (i, response) in alternates.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{} {label} (response {} of {total})\n",
                    heading(3, offset),
                    i + 1
                );
                render_section(out, response, speaker_level, opts, true);
            }
        }
    }
}

fn render_section(
    out: &mut String,
    section: &Section,
    speaker_level: u8,
    opts: &RenderOptions,
    is_response: bool,
) {
    match section.style {
        TextStyle::Plain => {
            out.push_str(&format_body(&section.text, speaker_level));
            out.push_str("\n\n");
        }
        TextStyle::Code => {
            let fence = code_fence(&section.text);
            let lang = section.language.as_deref().unwrap_or_default();
            let _ = writeln!(out, "{fence}{lang}\n{}\n{fence}\n", section.text);
        }
        TextStyle::Thoughts => {
            out.push_str("> 💭 **Thoughts**\n>\n");
            for line in format_body(&section.text, speaker_level).lines() {
                if line.is_empty() {
                    out.push_str(">\n");
                } else {
                    let _ = writeln!(out, "> {line}");
                }
            }
            out.push('\n');
        }
        TextStyle::Recap => {
            let recap = section.text.lines().collect::<Vec<_>>().join(" ");
            let _ = writeln!(out, "*💭 {}*\n", escape_xml_tags(&recap));
        }
    }

    if section.attachments > 0 {
        let plural = if section.attachments == 1 { "" } else { "s" };
        let _ = writeln!(out, "*[{} attachment{plural} omitted]*\n", section.attachments);
    }

    let metadata = section_metadata(section, opts, is_response);
    if !metadata.is_empty() {
        let _ = writeln!(out, "{metadata}\n");
    }
}

fn section_metadata(section: &Section, opts: &RenderOptions, is_response: bool) -> String {
    let timestamp = if opts.show_timestamps {
        format_timestamp(section.create_time)
    } else {
        None
    };
    let model = if opts.show_model && is_response {
        section.model_slug.as_deref()
    } else {
        None
    };

    match (timestamp, model) {
        (Some(ts), Some(model)) => format!("*{model} · {ts}*"),
        (Some(ts), None) => format!("*{ts}*"),
        (None, Some(model)) => format!("*{model}*"),
        (None, None) => String::new(),
    }
}

/// Quotes a string for a YAML double-quoted scalar.
fn yaml_string(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(quoted, "\\u{:04x}", u32::from(c));
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Returns a backtick fence longer than any backtick run in `text`.
fn code_fence(text: &str) -> String {
    let longest = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat((longest + 1).max(3))
}

/// Returns `true` if the line opens or closes a fenced code block.
fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Returns the ATX heading level of a line, if it is a heading.
fn heading_level(line: &str) -> Option<usize> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let level = trimmed.bytes().take_while(|&b| b == b'#').count();
    let rest = &trimmed[level..];
    let is_heading =
        (1..=6).contains(&level) && (rest.is_empty() || rest.starts_with([' ', '\t']));
    is_heading.then_some(level)
}

/// Prepares message text for embedding under a speaker heading.
///
/// Outside code fences, headings are pushed down so the shallowest one sits
/// one level below `speaker_level`, and XML-like tags are escaped. Fenced
/// code is left untouched.
fn format_body(text: &str, speaker_level: u8) -> String {
    let mut in_fence = false;
    let shallowest = text
        .lines()
        .filter(|line| {
            if is_fence(line) {
                in_fence = !in_fence;
                return false;
            }
            !in_fence
        })
        .filter_map(heading_level)
        .min();
    let shift = shallowest.map_or(0, |min| (usize::from(speaker_level) + 1).saturating_sub(min));

    let mut in_fence = false;
    let mut out = Vec::new();
    for line in text.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
            out.push(line.to_owned());
        } else if in_fence {
            out.push(line.to_owned());
        } else if let Some(level) = heading_level(line) {
            let trimmed = line.trim_start_matches(' ');
            let new_level = (level + shift).min(6);
            out.push(format!(
                "{}{}",
                "#".repeat(new_level),
                escape_xml_tags(&trimmed[level..])
            ));
        } else {
            out.push(escape_xml_tags(line));
        }
    }
    out.join("\n")
}

/// Escapes XML/HTML-like tags so they render literally in Markdown.
///
/// Uses HTML entities (`&lt;` `&gt;`) which are more reliably rendered across
/// markdown viewers. Only escapes `<` when followed by a letter, `/`, or `!`
/// to avoid false positives on mathematical comparisons like `x < 5`. Text
/// inside inline code spans is left alone.
fn escape_xml_tags(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    let mut chars = s.chars().peekable();
    let mut in_tag = false;
    let mut code_run: Option<usize> = None;

    while let Some(c) = chars.next() {
        if c == '`' {
            let mut run = 1;
            while chars.next_if_eq(&'`').is_some() {
                run += 1;
            }
            result.push_str(&"`".repeat(run));
            code_run = match code_run {
                None => Some(run),
                Some(open) if open == run => None,
                other => other,
            };
        } else if code_run.is_some() {
            result.push(c);
        } else if c == '<' {
            let is_tag_start = chars
                .peek()
                .is_some_and(|&next| next.is_ascii_alphabetic() || next == '/' || next == '!');

            if is_tag_start {
                result.push_str("&lt;");
                in_tag = true;
            } else {
                result.push(c);
            }
        } else if c == '>' && in_tag {
            result.push_str("&gt;");
            in_tag = false;
        } else {
            result.push(c);
        }
    }

    result
}
