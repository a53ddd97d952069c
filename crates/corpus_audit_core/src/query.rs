//! Read-only probes the catalog issues against the corpus graph.
//!
//! Every probe renders to Cypher for the Neo4j adapter and is evaluated
//! natively by [`crate::MemoryGraph`]. Checks never see query text; they
//! only name a [`Probe`] and read back [`Record`]s.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Node labels the corpus application stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Text,
    Section,
    Phrase,
    Word,
    Morpheme,
    Gloss,
    InterlinearText,
    User,
}

impl NodeLabel {
    /// Every label whose nodes must carry an `ID` property.
    pub const KNOWN: [NodeLabel; 8] = [
        NodeLabel::Text,
        NodeLabel::Section,
        NodeLabel::Phrase,
        NodeLabel::Word,
        NodeLabel::Morpheme,
        NodeLabel::Gloss,
        NodeLabel::InterlinearText,
        NodeLabel::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeLabel::Text => "Text",
            NodeLabel::Section => "Section",
            NodeLabel::Phrase => "Phrase",
            NodeLabel::Word => "Word",
            NodeLabel::Morpheme => "Morpheme",
            NodeLabel::Gloss => "Gloss",
            NodeLabel::InterlinearText => "InterlinearText",
            NodeLabel::User => "User",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types of the corpus hierarchy.
pub mod rel {
    pub const SECTION_PART_OF_TEXT: &str = "SECTION_PART_OF_TEXT";
    pub const PHRASE_IN_SECTION: &str = "PHRASE_IN_SECTION";
    pub const SECTION_CONTAINS: &str = "SECTION_CONTAINS";
    pub const PHRASE_COMPOSED_OF: &str = "PHRASE_COMPOSED_OF";
    pub const WORD_MADE_OF: &str = "WORD_MADE_OF";
    pub const ANALYZES: &str = "ANALYZES";
}

/// How the "words without morphemes" condition binds.
///
/// `Grouped` flags words that have no `WORD_MADE_OF` relation and are
/// linked from a section or a phrase. `Literal` keeps the ungrouped form
/// `NOT made_of AND section_contains OR phrase_composed_of`, where `AND`
/// binds first, so every word inside a phrase is flagged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordMorphemeReading {
    #[default]
    Grouped,
    Literal,
}

/// One read query of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    MissingIdCount(NodeLabel),
    MissingIdByLabel,
    OrphanedSections,
    OrphanedPhrases,
    OrphanedWords,
    OrphanedMorphemes,
    OrphanedGlosses,
    ReversedSectionPartOfText,
    ReversedWordMadeOf,
    ReversedPhraseComposedOf,
    ReversedAnalyzes,
    ComposedOfWithoutOrder,
    InvalidAnalyzesTarget,
    SectionWithManyTexts,
    PhraseWithoutWords,
    WordWithoutMorphemes(WordMorphemeReading),
    DuplicateComposedOf,
    TextWithoutTitleOrLanguage,
    WordWithoutSurfaceForm,
}

impl Probe {
    pub fn name(&self) -> &'static str {
        match self {
            Probe::MissingIdCount(_) => "missing_id_count",
            Probe::MissingIdByLabel => "missing_id_by_label",
            Probe::OrphanedSections => "orphaned_sections",
            Probe::OrphanedPhrases => "orphaned_phrases",
            Probe::OrphanedWords => "orphaned_words",
            Probe::OrphanedMorphemes => "orphaned_morphemes",
            Probe::OrphanedGlosses => "orphaned_glosses",
            Probe::ReversedSectionPartOfText => "reversed_section_part_of_text",
            Probe::ReversedWordMadeOf => "reversed_word_made_of",
            Probe::ReversedPhraseComposedOf => "reversed_phrase_composed_of",
            Probe::ReversedAnalyzes => "reversed_analyzes",
            Probe::ComposedOfWithoutOrder => "composed_of_without_order",
            Probe::InvalidAnalyzesTarget => "invalid_analyzes_target",
            Probe::SectionWithManyTexts => "section_with_many_texts",
            Probe::PhraseWithoutWords => "phrase_without_words",
            Probe::WordWithoutMorphemes(_) => "word_without_morphemes",
            Probe::DuplicateComposedOf => "duplicate_composed_of",
            Probe::TextWithoutTitleOrLanguage => "text_without_title_or_language",
            Probe::WordWithoutSurfaceForm => "word_without_surface_form",
        }
    }

    /// Reporting cap. `None` means the probe aggregates and is read whole.
    pub fn cap(&self) -> Option<u64> {
        match self {
            Probe::MissingIdCount(_) | Probe::MissingIdByLabel => None,
            Probe::OrphanedSections
            | Probe::OrphanedPhrases
            | Probe::OrphanedWords
            | Probe::OrphanedMorphemes
            | Probe::OrphanedGlosses
            | Probe::ComposedOfWithoutOrder
            | Probe::PhraseWithoutWords => Some(100),
            Probe::ReversedSectionPartOfText
            | Probe::ReversedWordMadeOf
            | Probe::ReversedPhraseComposedOf
            | Probe::ReversedAnalyzes
            | Probe::InvalidAnalyzesTarget
            | Probe::SectionWithManyTexts
            | Probe::WordWithoutMorphemes(_)
            | Probe::DuplicateComposedOf
            | Probe::TextWithoutTitleOrLanguage
            | Probe::WordWithoutSurfaceForm => Some(50),
        }
    }

    /// `MATCH ... WHERE ...` part shared by the sample and total forms.
    pub fn pattern(&self) -> String {
        match self {
            Probe::MissingIdCount(label) => format!("MATCH (n:{label}) WHERE n.ID IS NULL"),
            Probe::MissingIdByLabel => "MATCH (n) WHERE n.ID IS NULL".into(),
            Probe::OrphanedSections => {
                "MATCH (s:Section) WHERE NOT (s)<-[:SECTION_PART_OF_TEXT]-()".into()
            }
            Probe::OrphanedPhrases => {
                "MATCH (p:Phrase) WHERE NOT (p)<-[:PHRASE_IN_SECTION]-()".into()
            }
            Probe::OrphanedWords => "MATCH (w:Word) WHERE NOT (w)<-[:SECTION_CONTAINS]-() \
                 AND NOT (w)<-[:PHRASE_COMPOSED_OF]-()"
                .into(),
            Probe::OrphanedMorphemes => {
                "MATCH (m:Morpheme) WHERE NOT (m)<-[:WORD_MADE_OF]-()".into()
            }
            Probe::OrphanedGlosses => "MATCH (g:Gloss) WHERE NOT (g)-[:ANALYZES]->()".into(),
            Probe::ReversedSectionPartOfText => {
                "MATCH (s:Section)-[:SECTION_PART_OF_TEXT]->(t:Text)".into()
            }
            Probe::ReversedWordMadeOf => "MATCH (m:Morpheme)-[:WORD_MADE_OF]->(w:Word)".into(),
            Probe::ReversedPhraseComposedOf => {
                "MATCH (w:Word)-[:PHRASE_COMPOSED_OF]->(p:Phrase)".into()
            }
            Probe::ReversedAnalyzes => "MATCH (target)-[:ANALYZES]->(g:Gloss) \
                 WHERE target:Word OR target:Phrase OR target:Morpheme"
                .into(),
            Probe::ComposedOfWithoutOrder => {
                "MATCH (p:Phrase)-[r:PHRASE_COMPOSED_OF]->(w:Word) WHERE r.Order IS NULL".into()
            }
            Probe::InvalidAnalyzesTarget => "MATCH (g:Gloss)-[:ANALYZES]->(target) \
                 WHERE NOT (target:Word OR target:Phrase OR target:Morpheme)"
                .into(),
            Probe::SectionWithManyTexts => "MATCH (s:Section)<-[:SECTION_PART_OF_TEXT]-(t:Text) \
                 WITH s, count(t) AS text_count WHERE text_count > 1"
                .into(),
            Probe::PhraseWithoutWords => {
                "MATCH (p:Phrase) WHERE NOT (p)-[:PHRASE_COMPOSED_OF]->()".into()
            }
            Probe::WordWithoutMorphemes(WordMorphemeReading::Grouped) => {
                "MATCH (w:Word) WHERE NOT (w)-[:WORD_MADE_OF]->() \
                 AND ((w)<-[:SECTION_CONTAINS]-() OR (w)<-[:PHRASE_COMPOSED_OF]-())"
                    .into()
            }
            Probe::WordWithoutMorphemes(WordMorphemeReading::Literal) => {
                "MATCH (w:Word) WHERE (NOT (w)-[:WORD_MADE_OF]->() \
                 AND (w)<-[:SECTION_CONTAINS]-()) OR (w)<-[:PHRASE_COMPOSED_OF]-()"
                    .into()
            }
            Probe::DuplicateComposedOf => "MATCH (p:Phrase)-[r:PHRASE_COMPOSED_OF]->(w:Word) \
                 WITH p, w, r.Order AS order, count(*) AS rel_count WHERE rel_count > 1"
                .into(),
            Probe::TextWithoutTitleOrLanguage => {
                "MATCH (t:Text) WHERE t.title IS NULL AND t.language IS NULL".into()
            }
            Probe::WordWithoutSurfaceForm => "MATCH (w:Word) WHERE w.surface_form IS NULL".into(),
        }
    }

    /// `RETURN` clause of the record-producing form.
    pub fn projection(&self) -> &'static str {
        match self {
            Probe::MissingIdCount(_) => "RETURN count(n) AS count",
            Probe::MissingIdByLabel => {
                "RETURN labels(n)[0] AS label, count(n) AS count ORDER BY count DESC"
            }
            Probe::OrphanedSections => "RETURN s.ID AS section_id",
            Probe::OrphanedPhrases | Probe::PhraseWithoutWords => "RETURN p.ID AS phrase_id",
            Probe::OrphanedWords | Probe::WordWithoutMorphemes(_) => {
                "RETURN w.ID AS word_id, w.surface_form AS surface_form"
            }
            Probe::OrphanedMorphemes => "RETURN m.ID AS morpheme_id, m.surface_form AS surface_form",
            Probe::OrphanedGlosses => "RETURN g.ID AS gloss_id, g.annotation AS annotation",
            Probe::ReversedSectionPartOfText => "RETURN s.ID AS section_id, t.ID AS text_id",
            Probe::ReversedWordMadeOf => "RETURN m.ID AS morpheme_id, w.ID AS word_id",
            Probe::ReversedPhraseComposedOf => "RETURN w.ID AS word_id, p.ID AS phrase_id",
            Probe::ReversedAnalyzes => {
                "RETURN labels(target)[0] AS target_type, target.ID AS target_id, g.ID AS gloss_id"
            }
            Probe::ComposedOfWithoutOrder => "RETURN p.ID AS phrase_id, w.ID AS word_id",
            Probe::InvalidAnalyzesTarget => {
                "RETURN g.ID AS gloss_id, labels(target) AS target_labels, target.ID AS target_id"
            }
            Probe::SectionWithManyTexts => "RETURN s.ID AS section_id, text_count",
            Probe::DuplicateComposedOf => {
                "RETURN p.ID AS phrase_id, w.ID AS word_id, order, rel_count"
            }
            Probe::TextWithoutTitleOrLanguage => "RETURN t.ID AS text_id",
            Probe::WordWithoutSurfaceForm => "RETURN w.ID AS word_id",
        }
    }

    /// Column names produced by [`Probe::projection`], in order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Probe::MissingIdCount(_) => &["count"],
            Probe::MissingIdByLabel => &["label", "count"],
            Probe::OrphanedSections => &["section_id"],
            Probe::OrphanedPhrases | Probe::PhraseWithoutWords => &["phrase_id"],
            Probe::OrphanedWords | Probe::WordWithoutMorphemes(_) => &["word_id", "surface_form"],
            Probe::OrphanedMorphemes => &["morpheme_id", "surface_form"],
            Probe::OrphanedGlosses => &["gloss_id", "annotation"],
            Probe::ReversedSectionPartOfText => &["section_id", "text_id"],
            Probe::ReversedWordMadeOf => &["morpheme_id", "word_id"],
            Probe::ReversedPhraseComposedOf => &["word_id", "phrase_id"],
            Probe::ReversedAnalyzes => &["target_type", "target_id", "gloss_id"],
            Probe::ComposedOfWithoutOrder => &["phrase_id", "word_id"],
            Probe::InvalidAnalyzesTarget => &["gloss_id", "target_labels", "target_id"],
            Probe::SectionWithManyTexts => &["section_id", "text_count"],
            Probe::DuplicateComposedOf => &["phrase_id", "word_id", "order", "rel_count"],
            Probe::TextWithoutTitleOrLanguage => &["text_id"],
            Probe::WordWithoutSurfaceForm => &["word_id"],
        }
    }
}

/// Which form of a probe to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// Every record of the projection.
    All,
    /// At most `limit` records of the projection.
    Sample { limit: u64 },
    /// A single `total` column counting the matches.
    Total,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphQuery {
    pub probe: Probe,
    pub shape: QueryShape,
}

impl GraphQuery {
    pub const TOTAL_COLUMN: &'static str = "total";

    pub fn new(probe: Probe, shape: QueryShape) -> Self {
        Self { probe, shape }
    }

    pub fn cypher(&self) -> String {
        let pattern = self.probe.pattern();
        match self.shape {
            QueryShape::All => format!("{pattern} {}", self.probe.projection()),
            QueryShape::Sample { .. } => {
                format!("{pattern} {} LIMIT $limit", self.probe.projection())
            }
            QueryShape::Total => format!("{pattern} RETURN count(*) AS total"),
        }
    }

    pub fn params(&self) -> Vec<(&'static str, i64)> {
        match self.shape {
            QueryShape::Sample { limit } => {
                vec![("limit", i64::try_from(limit).unwrap_or(i64::MAX))]
            }
            QueryShape::All | QueryShape::Total => Vec::new(),
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self.shape {
            QueryShape::Total => &[Self::TOTAL_COLUMN],
            QueryShape::All | QueryShape::Sample { .. } => self.probe.columns(),
        }
    }
}

/// One result row, fields addressed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Missing fields read as `null`, as an absent property does in Cypher.
    pub fn get(&self, key: &str) -> &Value {
        self.fields.get(key).unwrap_or(&Value::Null)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).as_i64()
    }

    /// Display form used inside issue descriptions.
    pub fn text(&self, key: &str) -> String {
        match self.get(key) {
            Value::Null => "<none>".to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Read-only access to the corpus graph.
pub trait GraphQueryService {
    fn fetch(&self, query: &GraphQuery) -> Result<Vec<Record>>;
}

impl<T: GraphQueryService + ?Sized> GraphQueryService for &T {
    fn fetch(&self, query: &GraphQuery) -> Result<Vec<Record>> {
        (**self).fetch(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sample_form_limits_with_parameter() {
        let query = GraphQuery::new(Probe::OrphanedSections, QueryShape::Sample { limit: 100 });
        assert_eq!(
            query.cypher(),
            "MATCH (s:Section) WHERE NOT (s)<-[:SECTION_PART_OF_TEXT]-() \
             RETURN s.ID AS section_id LIMIT $limit"
        );
        assert_eq!(query.params(), vec![("limit", 100)]);
    }

    #[test]
    fn total_form_counts_rows_after_grouping() {
        let query = GraphQuery::new(Probe::SectionWithManyTexts, QueryShape::Total);
        assert!(query
            .cypher()
            .ends_with("WHERE text_count > 1 RETURN count(*) AS total"));
        assert_eq!(query.columns(), &["total"]);
        assert!(query.params().is_empty());
    }

    #[test]
    fn label_is_interpolated_for_count_probe() {
        let query = GraphQuery::new(Probe::MissingIdCount(NodeLabel::Morpheme), QueryShape::All);
        assert_eq!(
            query.cypher(),
            "MATCH (n:Morpheme) WHERE n.ID IS NULL RETURN count(n) AS count"
        );
    }

    #[test]
    fn readings_differ_in_grouping() {
        let grouped = Probe::WordWithoutMorphemes(WordMorphemeReading::Grouped).pattern();
        let literal = Probe::WordWithoutMorphemes(WordMorphemeReading::Literal).pattern();
        assert!(grouped.contains("AND ((w)<-[:SECTION_CONTAINS]-() OR"));
        assert!(literal.contains(") OR (w)<-[:PHRASE_COMPOSED_OF]-()"));
    }

    #[test]
    fn record_reads_missing_fields_as_null() {
        let record: Record = [("word_id", json!("w1")), ("count", json!(3))]
            .into_iter()
            .collect();
        assert_eq!(record.text("word_id"), "w1");
        assert_eq!(record.get_i64("count"), Some(3));
        assert_eq!(record.text("surface_form"), "<none>");
    }
}
