// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! Non-fatal anomalies reported while converting a conversation.
//!
//! The conversion pipeline never fails because of content it does not
//! understand. It reports such content as a [`Diagnostic`] to a
//! [`DiagnosticSink`] passed in by the caller and carries on. The sink is
//! owned by the caller, so conversions running side by side never share
//! state unless the caller wants them to.

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// A single anomaly found during conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A message used a payload kind that is neither renderable nor known to
    /// be safe to skip. The message was left out of the document.
    UnrecognizedPayloadKind {
        /// Id of the node carrying the payload.
        node: String,
        /// The payload kind tag.
        kind: String,
    },

    /// The conversation starts with assistant messages before any user
    /// message. Those messages were discarded.
    LeadingAssistantAnomaly {
        /// Number of discarded assistant nodes.
        discarded: usize,
    },

    /// A turn had no renderable content on either side and was left out.
    EmptyTurnSuppressed {
        /// The turn's position in assembly order.
        ordinal: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedPayloadKind { node, kind } => {
                write!(f, "skipped unrecognized payload kind '{kind}' (node {node})")
            }
            Self::LeadingAssistantAnomaly { discarded } => write!(
                f,
                "discarded {discarded} assistant message(s) preceding the first user message"
            ),
            Self::EmptyTurnSuppressed { ordinal } => {
                write!(f, "suppressed turn {ordinal} with no renderable content")
            }
        }
    }
}

/// Receives diagnostics as they are produced.
pub trait DiagnosticSink {
    /// Records one diagnostic. Must not fail or block the caller.
    fn emit(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// A sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl DiagnosticSink for Discard {
    fn emit(&mut self, _diagnostic: Diagnostic) {}
}

/// A sink shared between conversions running on several threads.
///
/// Writes from different threads interleave in arrival order.
impl<S: DiagnosticSink> DiagnosticSink for &Mutex<S> {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(diagnostic);
    }
}
