// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! The conversion pipeline for one conversation.
//!
//! Linearize the graph, classify each node once, assemble turns, drop the
//! empty ones, and build the document. No I/O happens here and nothing is
//! shared between calls, so conversations can be converted independently in
//! any order or in parallel.

use crate::assemble::{Entry, assemble, retain_renderable};
use crate::classify::{ClassifierConfig, classify};
use crate::diagnostics::DiagnosticSink;
use crate::graph::{GraphError, NodeGraph};
use crate::parser::Conversation;
use crate::renderer::{ConversationDocument, DocumentMeta, build_document};

impl From<&Conversation> for DocumentMeta {
    fn from(conversation: &Conversation) -> Self {
        Self {
            title: conversation.title.clone(),
            create_time: conversation.create_time,
            update_time: conversation.update_time,
        }
    }
}

/// Converts a parsed conversation into a document.
///
/// # Errors
///
/// Returns a [`GraphError`] if the message graph is malformed. Content
/// problems are never errors; they are reported to `sink`.
pub fn convert(
    conversation: &Conversation,
    config: &ClassifierConfig,
    sink: &mut dyn DiagnosticSink,
) -> Result<ConversationDocument, GraphError> {
    convert_graph(&conversation.graph, DocumentMeta::from(conversation), config, sink)
}

/// Converts a bare node graph, with metadata supplied by the caller.
///
/// # Errors
///
/// Returns a [`GraphError`] if the graph is malformed.
pub fn convert_graph(
    graph: &NodeGraph,
    meta: DocumentMeta,
    config: &ClassifierConfig,
    sink: &mut dyn DiagnosticSink,
) -> Result<ConversationDocument, GraphError> {
    let entries = graph
        .linearize()?
        .into_iter()
        .map(|node| Entry {
            node,
            content: classify(node, config, &mut *sink),
        })
        .collect();

    let turns = assemble(entries, sink);
    let turns = retain_renderable(turns, sink);
    Ok(build_document(meta, &turns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;
    use crate::graph::Role;
    use crate::graph::test_support::{bare, chain, graph, node};
    use crate::renderer::{RenderOptions, render_markdown};

    fn run(graph: &NodeGraph) -> (ConversationDocument, Vec<Diagnostic>) {
        run_with(graph, &ClassifierConfig::default())
    }

    fn run_with(graph: &NodeGraph, config: &ClassifierConfig) -> (ConversationDocument, Vec<Diagnostic>) {
        let mut sink: Vec<Diagnostic> = Vec::new();
        let doc = convert_graph(graph, DocumentMeta::default(), config, &mut sink).unwrap();
        (doc, sink)
    }

    fn response_texts(doc: &ConversationDocument, turn: usize) -> Vec<&str> {
        doc.turns[turn].responses.iter().map(|r| r.text.as_str()).collect()
    }

    #[test]
    fn regeneration_renders_as_labeled_alternates() {
        let graph = graph(vec![
            bare("root", None),
            node("u", Some("root"), Role::Human, "text", "Hello"),
            node("a1", Some("u"), Role::Assistant, "text", "Hi!"),
            node("a2", Some("u"), Role::Assistant, "text", "Hey!"),
        ]);
        let (doc, diagnostics) = run(&graph);

        assert_eq!(doc.turns.len(), 1);
        assert_eq!(doc.turns[0].prompt.as_ref().unwrap().text, "Hello");
        assert_eq!(response_texts(&doc, 0), ["Hi!", "Hey!"]);
        assert!(diagnostics.is_empty());

        let opts = RenderOptions {
            front_matter: false,
            ..RenderOptions::default()
        };
        let markdown = render_markdown(&doc, &opts);
        assert!(markdown.contains("(response 1 of 2)\n\nHi!"));
        assert!(markdown.contains("(response 2 of 2)\n\nHey!"));
    }

    #[test]
    fn personalization_preamble_is_suppressed_without_diagnostics() {
        let graph = graph(vec![
            bare("root", None),
            node("p", Some("root"), Role::Human, "personalization", "About me"),
            node("u", Some("p"), Role::Human, "text", "What is 2+2?"),
            node("a", Some("u"), Role::Assistant, "text", "4"),
        ]);
        let (doc, diagnostics) = run(&graph);

        assert_eq!(doc.turns.len(), 1);
        assert_eq!(doc.turns[0].ordinal, 0);
        assert_eq!(doc.turns[0].prompt.as_ref().unwrap().text, "What is 2+2?");
        assert_eq!(response_texts(&doc, 0), ["4"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn empty_first_message_leaves_one_turn_at_ordinal_zero() {
        let graph = chain(&[
            (Role::Human, "   "),
            (Role::Human, "Real question"),
            (Role::Assistant, "Real answer"),
        ]);
        let (doc, _) = run(&graph);

        assert_eq!(doc.turns.len(), 1);
        assert_eq!(doc.turns[0].ordinal, 0);
        assert_eq!(doc.turns[0].prompt.as_ref().unwrap().text, "Real question");
    }

    #[test]
    fn unknown_kind_keeps_turn_with_empty_response_section() {
        let graph = graph(vec![
            bare("root", None),
            node("u", Some("root"), Role::Human, "text", "Q"),
            node("a", Some("u"), Role::Assistant, "unknown_future_kind", "???"),
        ]);
        let (doc, diagnostics) = run(&graph);

        assert_eq!(doc.turns.len(), 1);
        assert_eq!(doc.turns[0].prompt.as_ref().unwrap().text, "Q");
        assert!(doc.turns[0].responses.is_empty());
        assert_eq!(
            diagnostics,
            [Diagnostic::UnrecognizedPayloadKind {
                node: "a".into(),
                kind: "unknown_future_kind".into(),
            }]
        );
    }

    #[test]
    fn classifies_each_node_once() {
        // An unknown kind on the opening message must not be reported twice
        // (once while assembling, once while rendering).
        let graph = chain(&[(Role::Human, "Q"), (Role::Assistant, "A")]);
        let mut nodes = graph.nodes().to_vec();
        if let Some(message) = &mut nodes[1].message {
            message.kind = "mystery".into();
        }
        let (doc, diagnostics) = run(&NodeGraph::new(nodes));

        assert_eq!(diagnostics.len(), 1);
        assert!(doc.turns[0].prompt.is_none());
        assert_eq!(response_texts(&doc, 0), ["A"]);
    }

    #[test]
    fn empty_graph_yields_empty_document() {
        let (doc, diagnostics) = run(&NodeGraph::default());

        assert!(doc.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn metadata_only_conversation_is_empty() {
        let graph = graph(vec![
            bare("root", None),
            node("s", Some("root"), Role::System, "text", "You are ChatGPT"),
        ]);
        let (doc, diagnostics) = run(&graph);

        assert!(doc.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn structural_errors_abort_conversion() {
        let graph = graph(vec![
            bare("root", None),
            node("u", Some("gone"), Role::Human, "text", "Q"),
        ]);
        let result = convert_graph(&graph, DocumentMeta::default(), &ClassifierConfig::default(), &mut Vec::<Diagnostic>::new());

        assert!(matches!(result, Err(GraphError::DanglingParent { .. })));
    }

    #[test]
    fn conversion_is_deterministic() {
        let graph = graph(vec![
            bare("root", None),
            node("u1", Some("root"), Role::Human, "text", "one"),
            node("a1", Some("u1"), Role::Assistant, "text", "1"),
            node("a2", Some("u1"), Role::Assistant, "text", "uno"),
            node("u2", Some("a2"), Role::Human, "text", "two"),
            node("a3", Some("u2"), Role::Assistant, "code", "print(2)"),
        ]);
        let opts = RenderOptions::default();

        let first = render_markdown(&run(&graph).0, &opts);
        let second = render_markdown(&run(&graph).0, &opts);
        assert_eq!(first, second);
    }

    #[test]
    fn takes_metadata_from_conversation() {
        let conversation = Conversation {
            id: None,
            title: "Thread".into(),
            create_time: Some(1.0),
            update_time: Some(2.0),
            default_model_slug: None,
            graph: NodeGraph::default(),
        };
        let doc = convert(&conversation, &ClassifierConfig::default(), &mut Vec::<Diagnostic>::new()).unwrap();

        assert_eq!(doc.meta.title, "Thread");
        assert_eq!(doc.meta.create_time, Some(1.0));
        assert_eq!(doc.meta.update_time, Some(2.0));
    }
}
