// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! Per-message content classification.
//!
//! Every node is classified once into an [`ExtractedContent`]. Only user and
//! assistant messages can carry renderable text; everything else is
//! [`ExtractedContent::Absent`].
//!
//! Payload kinds are matched against an allow set. Kinds that are known to be
//! noise (personalization context, app pairing data) sit in a separate
//! silent-skip set and vanish without comment. Any other kind is dropped with
//! a [`Diagnostic::UnrecognizedPayloadKind`], so new kinds introduced by the
//! export format show up in the log instead of being rendered as garbage.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::graph::{MessageNode, Role};
use std::collections::BTreeSet;

/// Payload kinds rendered by default.
pub const DEFAULT_ALLOWED_KINDS: &[&str] = &[
    "text",
    "code",
    "multimodal_text",
    "reasoning_recap",
    "thoughts",
];

/// Payload kinds dropped without a diagnostic by default.
pub const DEFAULT_SILENT_SKIP_KINDS: &[&str] = &[
    "personalization",
    "user_editable_context",
    "model_editable_context",
    "app_pairing_content",
];

/// Why a message was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The payload kind is known noise.
    SilentlySkipped,
    /// The payload kind is not in the allow set.
    UnrecognizedKind,
    /// The payload kind is allowed but carries no text.
    EmptyPayload,
}

/// The outcome of classifying one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedContent {
    /// Renderable text, trimmed and non-empty.
    Text(String),
    /// A user or assistant message that will not be rendered.
    Dropped(DropReason),
    /// The node has no message, or one authored by another role.
    Absent,
}

impl ExtractedContent {
    /// Returns the text if this is renderable content.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns `true` for [`ExtractedContent::Text`].
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// How renderable content of a given kind should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    /// Ordinary prose.
    Plain,
    /// A code payload, rendered as a fenced block.
    Code,
    /// The model's exposed reasoning.
    Thoughts,
    /// A one-line summary of reasoning time ("Thought for 5 seconds").
    Recap,
}

impl TextStyle {
    /// Returns the presentation style for a payload kind.
    #[must_use]
    pub fn for_kind(kind: &str) -> Self {
        match kind {
            "code" => Self::Code,
            "thoughts" => Self::Thoughts,
            "reasoning_recap" => Self::Recap,
            _ => Self::Plain,
        }
    }
}

/// The payload kinds the classifier renders or silently skips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    allowed: BTreeSet<String>,
    silent_skip: BTreeSet<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            allowed: DEFAULT_ALLOWED_KINDS.iter().map(|&k| k.to_owned()).collect(),
            silent_skip: DEFAULT_SILENT_SKIP_KINDS
                .iter()
                .map(|&k| k.to_owned())
                .collect(),
        }
    }
}

impl ClassifierConfig {
    /// Adds a kind to the allow set, removing it from the silent-skip set.
    #[must_use]
    pub fn with_allowed(mut self, kind: impl Into<String>) -> Self {
        let kind = kind.into();
        self.silent_skip.remove(&kind);
        self.allowed.insert(kind);
        self
    }

    /// Adds a kind to the silent-skip set, removing it from the allow set.
    #[must_use]
    pub fn with_silent_skip(mut self, kind: impl Into<String>) -> Self {
        let kind = kind.into();
        self.allowed.remove(&kind);
        self.silent_skip.insert(kind);
        self
    }

    /// Returns `true` if the kind is rendered.
    #[must_use]
    pub fn is_allowed(&self, kind: &str) -> bool {
        self.allowed.contains(kind)
    }

    /// Returns `true` if the kind is dropped without a diagnostic.
    #[must_use]
    pub fn is_silently_skipped(&self, kind: &str) -> bool {
        self.silent_skip.contains(kind)
    }
}

/// Classifies one node.
///
/// Emits exactly one [`Diagnostic::UnrecognizedPayloadKind`] when a user or
/// assistant message uses a kind outside both sets, and nothing otherwise.
pub fn classify(
    node: &MessageNode,
    config: &ClassifierConfig,
    sink: &mut dyn DiagnosticSink,
) -> ExtractedContent {
    let Some(message) = &node.message else {
        return ExtractedContent::Absent;
    };

    match message.role {
        Role::Human | Role::Assistant => {}
        Role::System | Role::Tool | Role::Unknown(_) => return ExtractedContent::Absent,
    }

    if config.is_silently_skipped(&message.kind) {
        return ExtractedContent::Dropped(DropReason::SilentlySkipped);
    }

    if !config.is_allowed(&message.kind) {
        sink.emit(Diagnostic::UnrecognizedPayloadKind {
            node: node.id.clone(),
            kind: message.kind.clone(),
        });
        return ExtractedContent::Dropped(DropReason::UnrecognizedKind);
    }

    message
        .payload
        .fragments
        .first()
        .map(String::as_str)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map_or(ExtractedContent::Dropped(DropReason::EmptyPayload), |text| {
            ExtractedContent::Text(text.to_owned())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{bare, node};
    use crate::graph::Payload;

    fn run(node: &MessageNode) -> (ExtractedContent, Vec<Diagnostic>) {
        run_with(node, &ClassifierConfig::default())
    }

    fn run_with(node: &MessageNode, config: &ClassifierConfig) -> (ExtractedContent, Vec<Diagnostic>) {
        let mut sink: Vec<Diagnostic> = Vec::new();
        let content = classify(node, config, &mut sink);
        (content, sink)
    }

    #[test]
    fn extracts_trimmed_text() {
        let (content, diagnostics) = run(&node("a", None, Role::Human, "text", "  Hello \n"));

        assert_eq!(content, ExtractedContent::Text("Hello".into()));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn node_without_message_is_absent() {
        assert_eq!(run(&bare("root", None)).0, ExtractedContent::Absent);
    }

    #[test]
    fn system_and_tool_messages_are_absent() {
        for role in [Role::System, Role::Tool, Role::Unknown("critic".into())] {
            let (content, diagnostics) = run(&node("s", None, role, "text", "internal"));
            assert_eq!(content, ExtractedContent::Absent);
            assert!(diagnostics.is_empty());
        }
    }

    #[test]
    fn role_check_precedes_kind_check() {
        // A tool node with an odd kind is invisible, not a diagnostic.
        let (content, diagnostics) = run(&node("t", None, Role::Tool, "execution_output", "x"));

        assert_eq!(content, ExtractedContent::Absent);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn silent_skip_kinds_never_emit_diagnostics() {
        let config = ClassifierConfig::default();
        let mut sink: Vec<Diagnostic> = Vec::new();
        for _ in 0..5 {
            let n = node("p", None, Role::Human, "user_editable_context", "About me");
            assert_eq!(
                classify(&n, &config, &mut sink),
                ExtractedContent::Dropped(DropReason::SilentlySkipped)
            );
        }

        assert!(sink.is_empty());
    }

    #[test]
    fn personalization_is_skipped_by_default() {
        let (content, diagnostics) = run(&node("p", None, Role::Human, "personalization", "About me"));

        assert_eq!(content, ExtractedContent::Dropped(DropReason::SilentlySkipped));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unknown_kind_emits_one_diagnostic_per_occurrence() {
        let config = ClassifierConfig::default();
        let mut sink: Vec<Diagnostic> = Vec::new();
        for i in 0..3 {
            let n = node(&format!("x{i}"), None, Role::Assistant, "unknown_future_kind", "??");
            assert_eq!(
                classify(&n, &config, &mut sink),
                ExtractedContent::Dropped(DropReason::UnrecognizedKind)
            );
        }

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink[2],
            Diagnostic::UnrecognizedPayloadKind {
                node: "x2".into(),
                kind: "unknown_future_kind".into(),
            }
        );
    }

    #[test]
    fn blank_text_is_empty_payload() {
        let (content, diagnostics) = run(&node("a", None, Role::Assistant, "text", " \n\t "));

        assert_eq!(content, ExtractedContent::Dropped(DropReason::EmptyPayload));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn missing_fragments_are_empty_payload() {
        let mut n = node("a", None, Role::Assistant, "multimodal_text", "");
        if let Some(message) = &mut n.message {
            message.payload = Payload {
                fragments: Vec::new(),
                attachments: 1,
                language: None,
            };
        }

        assert_eq!(run(&n).0, ExtractedContent::Dropped(DropReason::EmptyPayload));
    }

    #[test]
    fn takes_only_the_first_fragment() {
        let mut n = node("a", None, Role::Human, "multimodal_text", "");
        if let Some(message) = &mut n.message {
            message.payload.fragments = vec![" caption ".into(), "later".into()];
        }
        assert_eq!(run(&n).0, ExtractedContent::Text("caption".into()));

        if let Some(message) = &mut n.message {
            message.payload.fragments = vec![String::new(), "later".into()];
        }
        assert_eq!(run(&n).0, ExtractedContent::Dropped(DropReason::EmptyPayload));
    }

    #[test]
    fn config_can_extend_sets() {
        let config = ClassifierConfig::default()
            .with_silent_skip("system_error")
            .with_allowed("tether_quote");

        let (skipped, d1) = run_with(&node("p", None, Role::Human, "system_error", "x"), &config);
        let (allowed, d2) = run_with(&node("q", None, Role::Assistant, "tether_quote", "quoted"), &config);

        assert_eq!(skipped, ExtractedContent::Dropped(DropReason::SilentlySkipped));
        assert_eq!(allowed, ExtractedContent::Text("quoted".into()));
        assert!(d1.is_empty() && d2.is_empty());
    }

    #[test]
    fn moving_a_kind_between_sets_keeps_them_disjoint() {
        let config = ClassifierConfig::default().with_silent_skip("thoughts");

        assert!(!config.is_allowed("thoughts"));
        assert!(config.is_silently_skipped("thoughts"));

        let config = config.with_allowed("thoughts");
        assert!(config.is_allowed("thoughts"));
        assert!(!config.is_silently_skipped("thoughts"));
    }

    #[test]
    fn maps_kinds_to_styles() {
        assert_eq!(TextStyle::for_kind("text"), TextStyle::Plain);
        assert_eq!(TextStyle::for_kind("multimodal_text"), TextStyle::Plain);
        assert_eq!(TextStyle::for_kind("code"), TextStyle::Code);
        assert_eq!(TextStyle::for_kind("thoughts"), TextStyle::Thoughts);
        assert_eq!(TextStyle::for_kind("reasoning_recap"), TextStyle::Recap);
    }
}
