use std::cell::RefCell;
use std::path::Path;

use corpus_audit_core::query::rel;
use corpus_audit_core::summary::render;
use corpus_audit_core::{
    run_catalog, AuditError, CheckOptions, CheckResult, GraphQuery, GraphQueryService,
    MemoryGraph, NodeLabel, Outcome, QueryShape, Record, Severity, ValidationRun,
    WordMorphemeReading,
};
use serde_json::json;

/// One text, one section, one phrase holding one word at position 0, one
/// morpheme under the word and one gloss analysing it.
fn healthy_corpus() -> MemoryGraph {
    let mut graph = MemoryGraph::new();
    graph
        .add_node("t1", &["Text"], json!({ "ID": "t1", "title": "Frog story" }))
        .add_node("s1", &["Section"], json!({ "ID": "s1" }))
        .add_node("p1", &["Phrase"], json!({ "ID": "p1" }))
        .add_node("w1", &["Word"], json!({ "ID": "w1", "surface_form": "kuti" }))
        .add_node("m1", &["Morpheme"], json!({ "ID": "m1", "surface_form": "kut" }))
        .add_node("g1", &["Gloss"], json!({ "ID": "g1", "annotation": "frog" }))
        .add_relationship(rel::PHRASE_IN_SECTION, "s1", "p1", json!({}))
        .add_relationship(rel::PHRASE_COMPOSED_OF, "p1", "w1", json!({ "Order": 0 }))
        .add_relationship(rel::WORD_MADE_OF, "w1", "m1", json!({}))
        .add_relationship(rel::ANALYZES, "g1", "w1", json!({}));
    graph
}

fn linked_corpus() -> MemoryGraph {
    let mut graph = healthy_corpus();
    graph.add_relationship(rel::SECTION_PART_OF_TEXT, "t1", "s1", json!({}));
    graph
}

fn run(graph: &MemoryGraph) -> ValidationRun {
    run_catalog(graph, &CheckOptions::default(), "test").unwrap()
}

fn check<'a>(run: &'a ValidationRun, name: &str) -> &'a CheckResult {
    run.checks
        .iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("no check named {name}"))
}

fn failed_names(run: &ValidationRun) -> Vec<&str> {
    run.checks
        .iter()
        .filter(|c| !c.passed())
        .map(|c| c.name.as_str())
        .collect()
}

#[test]
fn healthy_corpus_passes_every_check() {
    let run = run(&linked_corpus());
    assert_eq!(run.total(), 15);
    assert_eq!(failed_names(&run), Vec::<&str>::new());
    assert_eq!(run.outcome(), Outcome::Passed);
    assert_eq!(run.outcome().exit_code(), 0);
    assert!(render(&run).contains("Failed: 0\n"));
}

#[test]
fn reversed_section_link_is_reported_twice_over() {
    let mut graph = healthy_corpus();
    graph.add_relationship(rel::SECTION_PART_OF_TEXT, "s1", "t1", json!({}));
    let run = run(&graph);

    assert_eq!(
        failed_names(&run),
        ["Orphaned Sections", "Relationship Directions"]
    );

    let directions = check(&run, "Relationship Directions");
    assert_eq!(directions.issues.len(), 1);
    assert_eq!(
        directions.issues[0].description,
        "SECTION_PART_OF_TEXT relationship reversed: Section s1 -> Text t1"
    );
    assert_eq!(directions.issues[0].details["section_id"], json!("s1"));
    assert_eq!(directions.issues[0].details["text_id"], json!("t1"));

    let orphans = check(&run, "Orphaned Sections");
    assert_eq!(orphans.issues.len(), 1);
    assert_eq!(orphans.issues[0].details["section_id"], json!("s1"));

    assert_eq!(run.outcome().exit_code(), 1);
    insta::assert_snapshot!("reversed_section_report", render(&run).trim_start());
}

#[test]
fn every_known_label_without_id_is_one_issue() {
    for label in NodeLabel::KNOWN {
        let mut graph = linked_corpus();
        graph.add_node("anonymous", &[label.as_str()], json!({ "name": "x" }));
        let run = run(&graph);

        let result = check(&run, "Unique ID Constraints");
        assert!(!result.passed(), "{label} without ID should fail");
        assert_eq!(result.issues.len(), 1, "{label}");
        assert_eq!(result.issues[0].details["node_type"], json!(label.as_str()));
        assert_eq!(result.issues[0].details["count"], json!(1));

        let catch_all = check(&run, "Required ID Properties");
        assert_eq!(catch_all.issues.len(), 1, "{label}");
        assert_eq!(catch_all.issues[0].details["label"], json!(label.as_str()));
    }
}

#[test]
fn unlisted_and_unlabelled_nodes_without_id() {
    let mut graph = linked_corpus();
    graph
        .add_node("x1", &["Lexeme"], json!({}))
        .add_node("x2", &["Lexeme"], json!({}))
        .add_node("x3", &[], json!({}));
    let run = run(&graph);

    assert!(check(&run, "Unique ID Constraints").passed());
    let result = check(&run, "Required ID Properties");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].description, "Lexeme nodes missing ID property");
    assert_eq!(result.issues[0].details["count"], json!(2));
}

#[test]
fn passed_flag_always_matches_issue_count() {
    let mut graph = MemoryGraph::new();
    graph
        .add_node("t1", &["Text"], json!({}))
        .add_node("s1", &["Section"], json!({ "ID": "s1" }))
        .add_node("p1", &["Phrase"], json!({ "ID": "p1" }))
        .add_node("w1", &["Word"], json!({ "ID": "w1" }))
        .add_node("m1", &["Morpheme"], json!({ "ID": "m1" }))
        .add_node("g1", &["Gloss"], json!({ "ID": "g1" }))
        .add_relationship(rel::WORD_MADE_OF, "m1", "w1", json!({}));
    let run = run(&graph);

    assert!(run.failed() > 0);
    for result in &run.checks {
        assert_eq!(result.passed(), result.issues.is_empty(), "{}", result.name);
        assert!(result.violations >= result.issues.len() as u64);
    }
}

#[test]
fn section_claimed_by_two_texts() {
    let mut graph = linked_corpus();
    let single = run(&graph);
    assert!(check(&single, "Text-Section Consistency").passed());

    graph
        .add_node("t2", &["Text"], json!({ "ID": "t2", "language": "yol" }))
        .add_relationship(rel::SECTION_PART_OF_TEXT, "t2", "s1", json!({}));
    let run = run(&graph);
    let result = check(&run, "Text-Section Consistency");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].details["section_id"], json!("s1"));
    assert_eq!(result.issues[0].details["text_count"], json!(2));
    assert_eq!(
        result.issues[0].description,
        "Section s1 belongs to 2 Texts (should be 1)"
    );
}

#[test]
fn composed_of_without_order_names_only_that_pair() {
    let mut graph = linked_corpus();
    graph
        .add_node("w2", &["Word"], json!({ "ID": "w2", "surface_form": "nga" }))
        .add_node("m2", &["Morpheme"], json!({ "ID": "m2" }))
        .add_relationship(rel::PHRASE_COMPOSED_OF, "p1", "w2", json!({}))
        .add_relationship(rel::WORD_MADE_OF, "w2", "m2", json!({}));
    let run = run(&graph);

    let result = check(&run, "PHRASE_COMPOSED_OF Order Property");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].details["phrase_id"], json!("p1"));
    assert_eq!(result.issues[0].details["word_id"], json!("w2"));
    assert_eq!(failed_names(&run), ["PHRASE_COMPOSED_OF Order Property"]);
}

#[test]
fn gloss_analyzing_a_text_captures_its_labels() {
    let mut graph = linked_corpus();
    graph.add_relationship(rel::ANALYZES, "g1", "t1", json!({}));
    let run = run(&graph);

    let result = check(&run, "Gloss ANALYZES Targets");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].details["target_labels"], json!(["Text"]));
    assert_eq!(result.issues[0].details["target_id"], json!("t1"));
    assert_eq!(result.issues[0].details["gloss_id"], json!("g1"));
}

#[test]
fn reversed_analyzes_reports_target_type() {
    let mut graph = linked_corpus();
    graph.add_relationship(rel::ANALYZES, "m1", "g1", json!({}));
    let run = run(&graph);

    let result = check(&run, "Relationship Directions");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(
        result.issues[0].description,
        "ANALYZES relationship reversed: Morpheme m1 -> Gloss g1"
    );
}

#[test]
fn reversed_made_of_names_morpheme_then_word() {
    let mut graph = linked_corpus();
    graph.add_relationship(rel::WORD_MADE_OF, "m1", "w1", json!({}));
    let run = run(&graph);

    assert_eq!(failed_names(&run), ["Relationship Directions"]);
    let result = check(&run, "Relationship Directions");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(
        result.issues[0].description,
        "WORD_MADE_OF relationship reversed: Morpheme m1 -> Word w1"
    );
    assert_eq!(result.issues[0].details["morpheme_id"], json!("m1"));
    assert_eq!(result.issues[0].details["word_id"], json!("w1"));
}

#[test]
fn reversed_composed_of_names_word_then_phrase() {
    let mut graph = linked_corpus();
    graph.add_relationship(rel::PHRASE_COMPOSED_OF, "w1", "p1", json!({}));
    let run = run(&graph);

    // Only the Phrase -> Word orientation is checked for a missing Order.
    assert_eq!(failed_names(&run), ["Relationship Directions"]);
    let result = check(&run, "Relationship Directions");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(
        result.issues[0].description,
        "PHRASE_COMPOSED_OF relationship reversed: Word w1 -> Phrase p1"
    );
    assert_eq!(result.issues[0].details["word_id"], json!("w1"));
    assert_eq!(result.issues[0].details["phrase_id"], json!("p1"));
}

#[test]
fn phrase_outside_any_section_is_orphaned() {
    let mut graph = linked_corpus();
    graph
        .add_node("p2", &["Phrase"], json!({ "ID": "p2" }))
        .add_relationship(rel::PHRASE_COMPOSED_OF, "p2", "w1", json!({ "Order": 0 }));
    let run = run(&graph);

    assert_eq!(failed_names(&run), ["Orphaned Phrases"]);
    let result = check(&run, "Orphaned Phrases");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].description, "Phrase p2 has no parent Section");
    assert_eq!(result.issues[0].details["phrase_id"], json!("p2"));
}

#[test]
fn word_held_only_by_a_section_has_a_parent() {
    let mut graph = linked_corpus();
    graph
        .add_node("w3", &["Word"], json!({ "ID": "w3", "surface_form": "gu" }))
        .add_node("m3", &["Morpheme"], json!({ "ID": "m3", "surface_form": "g" }))
        .add_relationship(rel::SECTION_CONTAINS, "s1", "w3", json!({}))
        .add_relationship(rel::WORD_MADE_OF, "w3", "m3", json!({}));
    let run = run(&graph);

    assert!(check(&run, "Orphaned Words").passed());
    assert_eq!(failed_names(&run), Vec::<&str>::new());
}

#[test]
fn duplicate_composition_with_same_order() {
    let mut graph = linked_corpus();
    graph.add_relationship(rel::PHRASE_COMPOSED_OF, "p1", "w1", json!({ "Order": 0 }));
    let run = run(&graph);

    let result = check(&run, "Duplicate Relationships");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].details["rel_count"], json!(2));
    assert_eq!(result.issues[0].details["order"], json!(0));

    let mut distinct = linked_corpus();
    distinct.add_relationship(rel::PHRASE_COMPOSED_OF, "p1", "w1", json!({ "Order": 1 }));
    let distinct_run = run_catalog(&distinct, &CheckOptions::default(), "distinct").unwrap();
    assert!(check(&distinct_run, "Duplicate Relationships").passed());
}

#[test]
fn empty_phrase_and_orphans() {
    let mut graph = linked_corpus();
    graph
        .add_node("p2", &["Phrase"], json!({ "ID": "p2" }))
        .add_node("w9", &["Word"], json!({ "ID": "w9", "surface_form": "ya" }))
        .add_node("m9", &["Morpheme"], json!({ "ID": "m9", "surface_form": "y" }))
        .add_node("g9", &["Gloss"], json!({ "ID": "g9", "annotation": "PL" }))
        .add_relationship(rel::PHRASE_IN_SECTION, "s1", "p2", json!({}));
    let run = run(&graph);

    assert_eq!(
        check(&run, "Phrase-Word Consistency").issues[0].description,
        "Phrase p2 has no words"
    );
    assert_eq!(
        check(&run, "Orphaned Words").issues[0].description,
        "Word w9 (ya) has no Section or Phrase parent"
    );
    assert_eq!(
        check(&run, "Orphaned Morphemes").issues[0].description,
        "Morpheme m9 (y) has no parent Word"
    );
    assert_eq!(
        check(&run, "Orphaned Glosses").issues[0].description,
        "Gloss g9 (PL) has no ANALYZES relationship"
    );
}

#[test]
fn missing_properties_only_warn() {
    let mut graph = linked_corpus();
    graph
        .add_node("t2", &["Text"], json!({ "ID": "t2" }))
        .add_node("s2", &["Section"], json!({ "ID": "s2" }))
        .add_node("w2", &["Word"], json!({ "ID": "w2" }))
        .add_node("m2", &["Morpheme"], json!({ "ID": "m2" }))
        .add_relationship(rel::SECTION_PART_OF_TEXT, "t2", "s2", json!({}))
        .add_relationship(rel::SECTION_CONTAINS, "s2", "w2", json!({}))
        .add_relationship(rel::WORD_MADE_OF, "w2", "m2", json!({}));
    let run = run(&graph);

    assert_eq!(failed_names(&run), ["Missing Required Properties"]);
    let result = check(&run, "Missing Required Properties");
    assert_eq!(result.severity, Severity::Warning);
    let descriptions: Vec<_> = result.issues.iter().map(|i| i.description.as_str()).collect();
    assert_eq!(
        descriptions,
        [
            "Text t2 missing title and language properties",
            "Word w2 missing surface_form property",
        ]
    );
    assert_eq!(run.outcome(), Outcome::PassedWithWarnings);
    assert_eq!(run.outcome().exit_code(), 0);
}

#[test]
fn word_morpheme_readings_disagree_on_analysed_phrase_words() {
    let mut graph = linked_corpus();
    graph
        .add_node("w2", &["Word"], json!({ "ID": "w2", "surface_form": "ba" }))
        .add_relationship(rel::SECTION_CONTAINS, "s1", "w2", json!({}));

    let grouped = run(&graph);
    let result = check(&grouped, "Word-Morpheme Consistency");
    let flagged: Vec<_> = result.issues.iter().map(|i| i.details["word_id"].clone()).collect();
    assert_eq!(flagged, [json!("w2")]);
    assert_eq!(grouped.outcome(), Outcome::PassedWithWarnings);

    let literal = run_catalog(
        &graph,
        &CheckOptions {
            word_morpheme_reading: WordMorphemeReading::Literal,
        },
        "literal",
    )
    .unwrap();
    let result = check(&literal, "Word-Morpheme Consistency");
    let flagged: Vec<_> = result.issues.iter().map(|i| i.details["word_id"].clone()).collect();
    // w1 has a morpheme but sits in a phrase, which the ungrouped OR accepts.
    assert_eq!(flagged, [json!("w1"), json!("w2")]);
}

#[test]
fn sample_is_capped_but_total_is_exact() {
    let mut graph = linked_corpus();
    for i in 0..120 {
        graph.add_node(&format!("orphan{i}"), &["Section"], json!({ "ID": format!("x{i}") }));
    }
    let run = run(&graph);

    let result = check(&run, "Orphaned Sections");
    assert_eq!(result.issues.len(), 100);
    assert_eq!(result.violations, 120);
    assert!(!result.passed());

    let text = render(&run);
    assert!(text.contains("  ✗ Orphaned Sections: FAILED (120 issue(s))\n"));
    assert!(text.contains("    - Section x4 has no parent Text\n"));
    assert!(!text.contains("    - Section x5 has no parent Text\n"));
    assert!(text.contains("    ... and 115 more\n"));
}

/// Counts queries by shape and forwards them.
struct Recording<'a> {
    inner: &'a MemoryGraph,
    shapes: RefCell<Vec<QueryShape>>,
}

impl GraphQueryService for Recording<'_> {
    fn fetch(&self, query: &GraphQuery) -> Result<Vec<Record>, AuditError> {
        self.shapes.borrow_mut().push(query.shape);
        self.inner.fetch(query)
    }
}

#[test]
fn totals_are_only_queried_for_full_samples() {
    let graph = linked_corpus();
    let recording = Recording {
        inner: &graph,
        shapes: RefCell::new(Vec::new()),
    };
    run_catalog(&recording, &CheckOptions::default(), "clean").unwrap();
    assert!(!recording
        .shapes
        .borrow()
        .iter()
        .any(|s| *s == QueryShape::Total));

    let mut crowded = linked_corpus();
    for i in 0..50 {
        crowded.add_node(&format!("t{i}x"), &["Text"], json!({ "ID": format!("t{i}x") }));
    }
    let recording = Recording {
        inner: &crowded,
        shapes: RefCell::new(Vec::new()),
    };
    let run = run_catalog(&recording, &CheckOptions::default(), "crowded").unwrap();
    let totals = recording
        .shapes
        .borrow()
        .iter()
        .filter(|s| **s == QueryShape::Total)
        .count();
    assert_eq!(totals, 1);
    let result = check(&run, "Missing Required Properties");
    assert_eq!(result.issues.len(), 50);
    assert_eq!(result.violations, 50);
}

/// Fails on the n-th query.
struct Flaky {
    fail_at: usize,
    calls: RefCell<usize>,
}

impl GraphQueryService for Flaky {
    fn fetch(&self, query: &GraphQuery) -> Result<Vec<Record>, AuditError> {
        let mut calls = self.calls.borrow_mut();
        *calls += 1;
        if *calls == self.fail_at {
            return Err(AuditError::Decode {
                probe: query.probe.name(),
                column: "section_id",
                message: "connection reset".into(),
            });
        }
        MemoryGraph::new().fetch(query)
    }
}

#[test]
fn service_failure_aborts_the_run() {
    let flaky = Flaky {
        fail_at: 11,
        calls: RefCell::new(0),
    };
    let err = run_catalog(&flaky, &CheckOptions::default(), "flaky").unwrap_err();
    assert!(matches!(
        err,
        AuditError::Decode {
            probe: "orphaned_phrases",
            ..
        }
    ));
    assert_eq!(*flaky.calls.borrow(), 11);
}

#[test]
fn snapshot_file_validates_offline() {
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let graph = MemoryGraph::from_json_path(&fixtures.join("frog_story.json")).unwrap();
    let run = run(&graph);

    // w2 has neither morphemes nor a surface form.
    assert_eq!(
        failed_names(&run),
        ["Word-Morpheme Consistency", "Missing Required Properties"]
    );
    assert_eq!(run.outcome(), Outcome::PassedWithWarnings);

    assert!(matches!(
        MemoryGraph::from_json_path(&fixtures.join("absent.json")),
        Err(AuditError::Snapshot { .. })
    ));
}
