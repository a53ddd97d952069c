//! The fixed catalog of structural checks.
//!
//! Each check is a plain function over a [`CheckContext`]. Checks share no
//! state; the only thing that can stop the catalog is an error from the
//! query service.

use tracing::{debug, info, info_span};

use crate::error::Result;
use crate::query::{
    GraphQuery, GraphQueryService, NodeLabel, Probe, QueryShape, Record, WordMorphemeReading,
};
use crate::report::{CheckResult, Issue, Severity, ValidationRun};

#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub word_morpheme_reading: WordMorphemeReading,
}

/// Entry of the catalog table.
pub struct CheckSpec {
    pub name: &'static str,
    pub severity: Severity,
    run: fn(&mut CheckContext<'_>) -> Result<()>,
}

impl CheckSpec {
    const fn new(
        name: &'static str,
        severity: Severity,
        run: fn(&mut CheckContext<'_>) -> Result<()>,
    ) -> Self {
        Self {
            name,
            severity,
            run,
        }
    }

    pub fn execute(
        &self,
        service: &dyn GraphQueryService,
        options: &CheckOptions,
    ) -> Result<CheckResult> {
        let _span = info_span!("check", check = self.name).entered();
        let mut ctx = CheckContext {
            service,
            options,
            result: CheckResult::new(self.name, self.severity),
        };
        (self.run)(&mut ctx)?;
        let result = ctx.result;
        info!(
            target: "corpus_audit.check",
            check = self.name,
            severity = %self.severity,
            violations = result.violations,
            sampled = result.issues.len(),
            "check finished"
        );
        Ok(result)
    }
}

pub const CATALOG: &[CheckSpec] = &[
    CheckSpec::new("Unique ID Constraints", Severity::Error, unique_id_constraints),
    CheckSpec::new("Required ID Properties", Severity::Error, required_id_properties),
    CheckSpec::new("Orphaned Sections", Severity::Error, orphaned_sections),
    CheckSpec::new("Orphaned Phrases", Severity::Error, orphaned_phrases),
    CheckSpec::new("Orphaned Words", Severity::Error, orphaned_words),
    CheckSpec::new("Orphaned Morphemes", Severity::Error, orphaned_morphemes),
    CheckSpec::new("Orphaned Glosses", Severity::Error, orphaned_glosses),
    CheckSpec::new("Relationship Directions", Severity::Error, relationship_directions),
    CheckSpec::new(
        "PHRASE_COMPOSED_OF Order Property",
        Severity::Error,
        composed_of_order,
    ),
    CheckSpec::new("Gloss ANALYZES Targets", Severity::Error, gloss_analyzes_targets),
    CheckSpec::new("Text-Section Consistency", Severity::Error, text_section_consistency),
    CheckSpec::new("Phrase-Word Consistency", Severity::Error, phrase_word_consistency),
    CheckSpec::new(
        "Word-Morpheme Consistency",
        Severity::Warning,
        word_morpheme_consistency,
    ),
    CheckSpec::new("Duplicate Relationships", Severity::Error, duplicate_relationships),
    CheckSpec::new(
        "Missing Required Properties",
        Severity::Warning,
        missing_required_properties,
    ),
];

/// Run every check in catalog order.
pub fn run_catalog(
    service: &dyn GraphQueryService,
    options: &CheckOptions,
    run_id: impl Into<String>,
) -> Result<ValidationRun> {
    let mut checks = Vec::with_capacity(CATALOG.len());
    for spec in CATALOG {
        checks.push(spec.execute(service, options)?);
    }
    Ok(ValidationRun::new(run_id, checks))
}

pub struct CheckContext<'a> {
    service: &'a dyn GraphQueryService,
    options: &'a CheckOptions,
    result: CheckResult,
}

impl CheckContext<'_> {
    fn fetch(&self, probe: Probe, shape: QueryShape) -> Result<Vec<Record>> {
        let query = GraphQuery::new(probe, shape);
        debug!(probe = probe.name(), cypher = %query.cypher(), "running probe");
        self.service.fetch(&query)
    }

    fn all(&self, probe: Probe) -> Result<Vec<Record>> {
        self.fetch(probe, QueryShape::All)
    }

    /// Record one issue per sampled row; a full sample triggers a total count.
    fn sample(&mut self, probe: Probe, describe: impl Fn(&Record) -> Issue) -> Result<()> {
        let Some(cap) = probe.cap() else {
            for record in self.all(probe)? {
                self.result.record(describe(&record));
            }
            return Ok(());
        };

        let before = self.result.issues.len();
        let records = self.fetch(probe, QueryShape::Sample { limit: cap })?;
        let full = records.len() as u64 >= cap;
        for record in records.iter().take(cap as usize) {
            self.result.record(describe(record));
        }
        if full {
            let total = self
                .fetch(probe, QueryShape::Total)?
                .first()
                .and_then(|r| r.get_i64(GraphQuery::TOTAL_COLUMN))
                .unwrap_or(0);
            self.result
                .observe_total(before, u64::try_from(total).unwrap_or(0));
        }
        Ok(())
    }
}

/// Issue carrying the named columns of `record` as details.
fn issue(description: String, record: &Record, keys: &[&str]) -> Issue {
    keys.iter().fold(Issue::new(description), |issue, key| {
        issue.with(*key, record.get(key).clone())
    })
}

fn unique_id_constraints(ctx: &mut CheckContext<'_>) -> Result<()> {
    for label in NodeLabel::KNOWN {
        let count = ctx
            .all(Probe::MissingIdCount(label))?
            .first()
            .and_then(|r| r.get_i64("count"))
            .unwrap_or(0);
        if count > 0 {
            ctx.result.record(
                Issue::new(format!("{label} nodes missing ID property"))
                    .with("count", count)
                    .with("node_type", label.as_str()),
            );
        }
    }
    Ok(())
}

fn required_id_properties(ctx: &mut CheckContext<'_>) -> Result<()> {
    for record in ctx.all(Probe::MissingIdByLabel)? {
        let Some(label) = record.get("label").as_str().filter(|l| !l.is_empty()) else {
            continue;
        };
        ctx.result.record(
            Issue::new(format!("{label} nodes missing ID property"))
                .with("count", record.get_i64("count").unwrap_or(0))
                .with("label", label),
        );
    }
    Ok(())
}

fn orphaned_sections(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::OrphanedSections, |r| {
        issue(
            format!("Section {} has no parent Text", r.text("section_id")),
            r,
            &["section_id"],
        )
    })
}

fn orphaned_phrases(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::OrphanedPhrases, |r| {
        issue(
            format!("Phrase {} has no parent Section", r.text("phrase_id")),
            r,
            &["phrase_id"],
        )
    })
}

fn orphaned_words(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::OrphanedWords, |r| {
        issue(
            format!(
                "Word {} ({}) has no Section or Phrase parent",
                r.text("word_id"),
                r.text("surface_form")
            ),
            r,
            &["word_id", "surface_form"],
        )
    })
}

fn orphaned_morphemes(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::OrphanedMorphemes, |r| {
        issue(
            format!(
                "Morpheme {} ({}) has no parent Word",
                r.text("morpheme_id"),
                r.text("surface_form")
            ),
            r,
            &["morpheme_id", "surface_form"],
        )
    })
}

fn orphaned_glosses(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::OrphanedGlosses, |r| {
        issue(
            format!(
                "Gloss {} ({}) has no ANALYZES relationship",
                r.text("gloss_id"),
                r.text("annotation")
            ),
            r,
            &["gloss_id", "annotation"],
        )
    })
}

fn relationship_directions(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::ReversedSectionPartOfText, |r| {
        issue(
            format!(
                "SECTION_PART_OF_TEXT relationship reversed: Section {} -> Text {}",
                r.text("section_id"),
                r.text("text_id")
            ),
            r,
            &["section_id", "text_id"],
        )
    })?;
    ctx.sample(Probe::ReversedWordMadeOf, |r| {
        issue(
            format!(
                "WORD_MADE_OF relationship reversed: Morpheme {} -> Word {}",
                r.text("morpheme_id"),
                r.text("word_id")
            ),
            r,
            &["morpheme_id", "word_id"],
        )
    })?;
    ctx.sample(Probe::ReversedPhraseComposedOf, |r| {
        issue(
            format!(
                "PHRASE_COMPOSED_OF relationship reversed: Word {} -> Phrase {}",
                r.text("word_id"),
                r.text("phrase_id")
            ),
            r,
            &["word_id", "phrase_id"],
        )
    })?;
    ctx.sample(Probe::ReversedAnalyzes, |r| {
        issue(
            format!(
                "ANALYZES relationship reversed: {} {} -> Gloss {}",
                r.text("target_type"),
                r.text("target_id"),
                r.text("gloss_id")
            ),
            r,
            &["target_type", "target_id", "gloss_id"],
        )
    })
}

fn composed_of_order(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::ComposedOfWithoutOrder, |r| {
        issue(
            format!(
                "PHRASE_COMPOSED_OF relationship missing Order property: Phrase {} -> Word {}",
                r.text("phrase_id"),
                r.text("word_id")
            ),
            r,
            &["phrase_id", "word_id"],
        )
    })
}

fn gloss_analyzes_targets(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::InvalidAnalyzesTarget, |r| {
        issue(
            format!(
                "Gloss {} ANALYZES invalid target type: {}",
                r.text("gloss_id"),
                r.text("target_labels")
            ),
            r,
            &["gloss_id", "target_labels", "target_id"],
        )
    })
}

fn text_section_consistency(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::SectionWithManyTexts, |r| {
        issue(
            format!(
                "Section {} belongs to {} Texts (should be 1)",
                r.text("section_id"),
                r.text("text_count")
            ),
            r,
            &["section_id", "text_count"],
        )
    })
}

fn phrase_word_consistency(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::PhraseWithoutWords, |r| {
        issue(
            format!("Phrase {} has no words", r.text("phrase_id")),
            r,
            &["phrase_id"],
        )
    })
}

// Some words legitimately carry no morpheme analysis, hence WARNING.
fn word_morpheme_consistency(ctx: &mut CheckContext<'_>) -> Result<()> {
    let reading = ctx.options.word_morpheme_reading;
    ctx.sample(Probe::WordWithoutMorphemes(reading), |r| {
        issue(
            format!(
                "Word {} ({}) has no morphemes (may be intentional)",
                r.text("word_id"),
                r.text("surface_form")
            ),
            r,
            &["word_id", "surface_form"],
        )
    })
}

fn duplicate_relationships(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::DuplicateComposedOf, |r| {
        issue(
            format!(
                "Duplicate PHRASE_COMPOSED_OF: Phrase {} -> Word {} (Order: {}, Count: {})",
                r.text("phrase_id"),
                r.text("word_id"),
                r.text("order"),
                r.text("rel_count")
            ),
            r,
            &["phrase_id", "word_id", "order", "rel_count"],
        )
    })
}

fn missing_required_properties(ctx: &mut CheckContext<'_>) -> Result<()> {
    ctx.sample(Probe::TextWithoutTitleOrLanguage, |r| {
        issue(
            format!(
                "Text {} missing title and language properties",
                r.text("text_id")
            ),
            r,
            &["text_id"],
        )
    })?;
    ctx.sample(Probe::WordWithoutSurfaceForm, |r| {
        issue(
            format!("Word {} missing surface_form property", r.text("word_id")),
            r,
            &["word_id"],
        )
    })
}
