// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! Convert ChatGPT conversation exports to Markdown.
//!
//! This crate turns the JSON produced by ChatGPT's data export into readable
//! Markdown documents, one per conversation.
//!
//! # Overview
//!
//! A ChatGPT conversation is stored as a graph of message nodes. Converting
//! one takes these steps:
//!
//! 1. Parse the JSON into a [`parser::Conversation`] holding a
//!    [`graph::NodeGraph`]
//! 2. Linearize the graph into storage order, keeping every branch
//! 3. Classify each message once: renderable text, dropped, or absent
//! 4. Assemble the messages into turns (a user message plus its answers)
//! 5. Drop turns with nothing to show and build a document
//! 6. Render the document as Markdown
//!
//! Steps 2-5 are [`engine::convert`]. Anything unusual found along the way
//! is reported to a [`diagnostics::DiagnosticSink`] instead of failing the
//! conversion.
//!
//! # Example
//!
//! ```no_run
//! use cg2md::classify::ClassifierConfig;
//! use cg2md::{engine, parser, renderer};
//!
//! let json = std::fs::read_to_string("conversation.json").unwrap();
//! let conversation = parser::parse_conversation(&json).unwrap();
//!
//! let mut diagnostics = Vec::new();
//! let document = engine::convert(&conversation, &ClassifierConfig::default(), &mut diagnostics).unwrap();
//!
//! let opts = renderer::RenderOptions {
//!     show_timestamps: false,
//!     ..Default::default()
//! };
//!
//! println!("{}", renderer::render_markdown(&document, &opts));
//! for diagnostic in &diagnostics {
//!     eprintln!("warning: {diagnostic}");
//! }
//! ```
//!
//! # Modules
//!
//! - [`parser`]: JSON parsing for single threads and full archives
//! - [`graph`]: the message graph and its linearization
//! - [`classify`]: per-message content classification
//! - [`assemble`]: grouping messages into turns
//! - [`diagnostics`]: non-fatal anomalies and where they go
//! - [`engine`]: the conversion pipeline for one conversation
//! - [`renderer`]: Markdown generation with configurable output options
//! - [`split`]: splitting an archive into one file per conversation
//! - [`batch`]: converting many files and collecting a summary

#![deny(missing_docs)]

pub mod assemble;
pub mod batch;
pub mod classify;
pub mod diagnostics;
pub mod engine;
pub mod graph;
pub mod parser;
pub mod renderer;
pub mod split;
