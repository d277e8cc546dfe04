// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! Grouping of classified messages into turns.
//!
//! A [`Turn`] is one user message plus every assistant message that follows
//! it before the next user message. Several assistant messages in a row are
//! regenerations of the same answer and stay together as alternates.
//!
//! Assembly is a single pass over the linearized nodes:
//!
//! - A user message closes the open turn (if any) and opens a new one, even
//!   when its own content was dropped.
//! - An assistant message joins the open turn, whatever its classification.
//! - Nodes of any other role are stepped over without closing the turn.
//! - Assistant messages before the first user message cannot belong to a turn
//!   and are discarded with a single diagnostic.
//!
//! Whether a turn is worth rendering is decided afterwards by
//! [`retain_renderable`].

use crate::classify::{DropReason, ExtractedContent};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::graph::{MessageNode, Role};

/// A node together with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<'a> {
    /// The source node.
    pub node: &'a MessageNode,
    /// What the classifier made of it.
    pub content: ExtractedContent,
}

impl Entry<'_> {
    /// Returns the renderable text, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.text()
    }
}

/// One user message and the assistant messages answering it.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn<'a> {
    /// Zero-based position among the turns.
    pub ordinal: usize,
    /// The user message that opened the turn.
    pub human: Entry<'a>,
    /// The assistant messages, in archive order, including dropped ones.
    pub responses: Vec<Entry<'a>>,
}

impl<'a> Turn<'a> {
    /// Returns `true` if either side of the turn has renderable text.
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.human.content.is_text() || self.responses.iter().any(|r| r.content.is_text())
    }

    /// The responses that have renderable text, in order.
    pub fn renderable_responses(&self) -> impl Iterator<Item = &Entry<'a>> {
        self.responses.iter().filter(|r| r.content.is_text())
    }
}

/// Groups classified nodes into turns.
///
/// Ordinals are assigned in emission order, so the result is numbered
/// `0..n` before any suppression.
pub fn assemble<'a>(entries: Vec<Entry<'a>>, sink: &mut dyn DiagnosticSink) -> Vec<Turn<'a>> {
    let mut turns = Vec::new();
    let mut open: Option<Turn<'a>> = None;
    let mut leading_assistants = 0;

    for entry in entries {
        match entry.node.role() {
            Some(Role::Human) => {
                if let Some(turn) = open.take() {
                    turns.push(turn);
                }
                open = Some(Turn {
                    ordinal: turns.len(),
                    human: entry,
                    responses: Vec::new(),
                });
            }
            Some(Role::Assistant) => match &mut open {
                Some(turn) => turn.responses.push(entry),
                None => leading_assistants += 1,
            },
            Some(Role::System | Role::Tool | Role::Unknown(_)) | None => {}
        }
    }

    if let Some(turn) = open {
        turns.push(turn);
    }

    if leading_assistants > 0 {
        sink.emit(Diagnostic::LeadingAssistantAnomaly {
            discarded: leading_assistants,
        });
    }

    turns
}

/// Drops turns without renderable content and renumbers the rest.
///
/// A turn survives if its user message or any of its responses has text.
/// Each dropped turn is reported, except one whose user message was silently
/// skipped: that is the platform's personalization preamble, not an anomaly.
///
/// Surviving turns are renumbered from zero in their original order.
pub fn retain_renderable<'a>(turns: Vec<Turn<'a>>, sink: &mut dyn DiagnosticSink) -> Vec<Turn<'a>> {
    turns
        .into_iter()
        .filter(|turn| {
            if turn.is_renderable() {
                return true;
            }
            if turn.human.content != ExtractedContent::Dropped(DropReason::SilentlySkipped) {
                sink.emit(Diagnostic::EmptyTurnSuppressed {
                    ordinal: turn.ordinal,
                });
            }
            false
        })
        .enumerate()
        .map(|(ordinal, turn)| Turn { ordinal, ..turn })
        .collect()
}
