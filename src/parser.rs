// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! JSON parsing for ChatGPT conversation exports.
//!
//! This module turns the `conversations.json` file produced by ChatGPT's data
//! export (or one conversation split out of it) into typed Rust values.
//!
//! # Format Overview
//!
//! An export is a JSON array of conversations. Each conversation carries:
//! - Metadata (title, creation and update times, default model)
//! - A `mapping` object from node id to node, in creation order
//! - Per node: `parent`, `children`, and an optional `message` with an
//!   author role, a `content` object tagged by `content_type`, and metadata
//!
//! The parser is lenient: missing or oddly-typed fields fall back to empty
//! values, so a new export revision degrades into diagnostics further down
//! the pipeline instead of refusing to load. Malformed JSON, a top level that
//! is not a conversation, and a `mapping` entry that is not a node object are
//! errors.
//!
//! The order of `mapping` matters and is preserved.
//!
//! # Example
//!
//! ```
//! use cg2md::parser::parse_conversation;
//!
//! let json = r#"{
//!     "title": "Greetings",
//!     "create_time": 1740795968.0,
//!     "mapping": {
//!         "root": { "id": "root", "parent": null, "children": ["u1"] },
//!         "u1": {
//!             "id": "u1",
//!             "parent": "root",
//!             "children": [],
//!             "message": {
//!                 "author": { "role": "user" },
//!                 "content": { "content_type": "text", "parts": ["Hello"] }
//!             }
//!         }
//!     }
//! }"#;
//!
//! let conversation = parse_conversation(json).unwrap();
//! assert_eq!(conversation.title, "Greetings");
//! assert_eq!(conversation.graph.len(), 2);
//! ```

use crate::graph::{Message, MessageNode, NodeGraph, Payload, Role};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use snafu::prelude::*;

/// Error type for JSON parsing failures.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// Failed to parse JSON content.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },

    /// The top-level JSON value is neither a conversation nor an archive.
    #[snafu(display("expected a conversation object or an array of them, found {found}"))]
    UnexpectedTopLevel {
        /// The JSON type that was found.
        found: &'static str,
    },

    /// A `mapping` entry is not a node object.
    #[snafu(display("mapping entry {key:?} is not an object"))]
    InvalidNode {
        /// The mapping key of the offending entry.
        key: String,
    },
}

/// One conversation thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    /// The conversation id, when present.
    pub id: Option<String>,

    /// The thread title (`"Untitled"` when absent).
    pub title: String,

    /// Creation time in Unix seconds.
    pub create_time: Option<f64>,

    /// Last update time in Unix seconds.
    pub update_time: Option<f64>,

    /// The model the thread was started with.
    pub default_model_slug: Option<String>,

    /// The message graph.
    pub graph: NodeGraph,
}

impl Conversation {
    /// Number of nodes that carry a message.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.graph
            .nodes()
            .iter()
            .filter(|node| node.message.is_some())
            .count()
    }
}

/// The contents of an export file.
#[derive(Debug, Clone, PartialEq)]
pub enum Export {
    /// A single conversation, as written by the thread splitter.
    Thread(Conversation),
    /// A full archive holding many conversations.
    Archive(Vec<Conversation>),
}

impl<'de> Deserialize<'de> for Conversation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(D::Error::custom)
    }
}

impl Conversation {
    /// Builds a conversation from an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnexpectedTopLevel`] if `value` is not an object
    /// and [`ParseError::InvalidNode`] if a `mapping` entry is not an object.
    pub fn from_value(value: &Value) -> Result<Self, ParseError> {
        ensure!(
            value.is_object(),
            UnexpectedTopLevelSnafu {
                found: json_type(value)
            }
        );

        let nodes = value
            .get("mapping")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
            .map(|(key, node)| {
                if node.is_object() {
                    Ok(parse_node(key, node))
                } else {
                    InvalidNodeSnafu { key }.fail()
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: get_string(value, &["id"]).or_else(|| get_string(value, &["conversation_id"])),
            title: get_string(value, &["title"]).unwrap_or_else(|| "Untitled".to_owned()),
            create_time: value.get("create_time").and_then(Value::as_f64),
            update_time: value.get("update_time").and_then(Value::as_f64),
            default_model_slug: get_string(value, &["default_model_slug"]),
            graph: NodeGraph::new(nodes),
        })
    }
}

fn parse_node(key: &str, value: &Value) -> MessageNode {
    MessageNode {
        id: get_string(value, &["id"]).unwrap_or_else(|| key.to_owned()),
        parent: get_string(value, &["parent"]),
        children: value
            .get("children")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        message: value
            .get("message")
            .filter(|m| m.is_object())
            .map(parse_message),
    }
}

fn parse_message(value: &Value) -> Message {
    Message {
        role: get_str(value, &["author", "role"]).map_or_else(|| Role::Unknown(String::new()), Role::from_name),
        kind: get_string(value, &["content", "content_type"]).unwrap_or_default(),
        payload: value.get("content").map(extract_payload).unwrap_or_default(),
        create_time: value.get("create_time").and_then(Value::as_f64),
        model_slug: get_string(value, &["metadata", "model_slug"]),
    }
}

/// Pulls text fragments out of a `content` object.
///
/// Different kinds keep their text in different places: `parts` (text,
/// multimodal), `text` (code), `content` (reasoning recap), or a list of
/// `thoughts`. Non-string `parts` entries are images or file pointers and
/// are only counted.
fn extract_payload(content: &Value) -> Payload {
    let language = get_string(content, &["language"]).filter(|lang| lang != "unknown");

    if let Some(parts) = content.get("parts").and_then(Value::as_array) {
        let fragments: Vec<String> = parts
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        let attachments = parts.iter().filter(|p| !p.is_string() && !p.is_null()).count();
        return Payload {
            fragments,
            attachments,
            language,
        };
    }

    let fragments = if let Some(text) = get_str(content, &["text"]) {
        vec![text.to_owned()]
    } else if let Some(text) = get_str(content, &["content"]) {
        vec![text.to_owned()]
    } else if let Some(thoughts) = content.get("thoughts").and_then(Value::as_array) {
        vec![join_thoughts(thoughts)]
    } else {
        Vec::new()
    };

    Payload {
        fragments,
        attachments: 0,
        language,
    }
}

/// Joins reasoning steps into one block, each led by its bolded summary.
fn join_thoughts(thoughts: &[Value]) -> String {
    thoughts
        .iter()
        .filter_map(|thought| {
            let summary = get_str(thought, &["summary"]).map_or("", str::trim);
            let body = get_str(thought, &["content"]).map_or("", str::trim);
            match (summary.is_empty(), body.is_empty()) {
                (true, true) => None,
                (false, true) => Some(format!("**{summary}**")),
                (true, false) => Some(body.to_owned()),
                (false, false) => Some(format!("**{summary}**\n\n{body}")),
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Navigates a JSON path and returns the string value at the end.
///
/// # Arguments
///
/// * `value` - The root JSON value to navigate from
/// * `path` - A sequence of keys to follow through the JSON structure
fn get_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

/// Like [`get_str`] but returns an owned `String`.
fn get_string(value: &Value, path: &[&str]) -> Option<String> {
    get_str(value, path).map(str::to_owned)
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parses a single conversation (one thread file).
///
/// # Errors
///
/// Returns an error if the JSON is malformed, is not an object, or has a
/// `mapping` entry that is not an object.
pub fn parse_conversation(json_str: &str) -> Result<Conversation, ParseError> {
    let value: Value = serde_json::from_str(json_str).context(JsonSnafu)?;
    Conversation::from_value(&value)
}

/// Parses a full archive (a JSON array of conversations).
///
/// # Errors
///
/// Returns an error if the JSON is malformed, is not an array, or contains
/// an element that [`parse_conversation`] would reject.
pub fn parse_archive(json_str: &str) -> Result<Vec<Conversation>, ParseError> {
    match serde_json::from_str::<Value>(json_str).context(JsonSnafu)? {
        Value::Array(items) => items.iter().map(Conversation::from_value).collect(),
        other => UnexpectedTopLevelSnafu {
            found: json_type(&other),
        }
        .fail(),
    }
}

/// Parses either a single conversation or a full archive.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or its top level is neither an
/// object nor an array of objects.
///
/// # Example
///
/// ```
/// use cg2md::parser::{parse_any, Export};
///
/// let export = parse_any(r#"[{"title": "a"}, {"title": "b"}]"#).unwrap();
/// assert!(matches!(export, Export::Archive(ref list) if list.len() == 2));
/// ```
pub fn parse_any(json_str: &str) -> Result<Export, ParseError> {
    let value: Value = serde_json::from_str(json_str).context(JsonSnafu)?;
    match value {
        Value::Array(items) => items
            .iter()
            .map(Conversation::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Export::Archive),
        Value::Object(_) => Conversation::from_value(&value).map(Export::Thread),
        other => UnexpectedTopLevelSnafu {
            found: json_type(&other),
        }
        .fail(),
    }
}
