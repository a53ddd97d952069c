//! In-memory property graph answering every [`Probe`] without a database.
//!
//! Loaded from a JSON snapshot for offline validation, or assembled in
//! code by tests. Nodes are addressed by a snapshot `key`, which plays the
//! role of the database's internal element id; the corpus `ID` property is
//! an ordinary property and may be missing.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AuditError, Result};
use crate::query::{
    rel, GraphQuery, GraphQueryService, NodeLabel, Probe, QueryShape, Record,
    WordMorphemeReading,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryNode {
    pub key: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl MemoryNode {
    fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Null-valued properties count as absent.
    fn prop(&self, name: &str) -> &Value {
        self.properties.get(name).unwrap_or(&Value::Null)
    }

    fn id(&self) -> Value {
        self.prop("ID").clone()
    }

    fn first_label(&self) -> Value {
        self.labels
            .first()
            .map_or(Value::Null, |l| Value::String(l.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRelationship {
    #[serde(rename = "type")]
    pub kind: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl MemoryRelationship {
    fn prop(&self, name: &str) -> &Value {
        self.properties.get(name).unwrap_or(&Value::Null)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryGraph {
    #[serde(default)]
    nodes: Vec<MemoryNode>,
    #[serde(default)]
    relationships: Vec<MemoryRelationship>,
}

fn object(properties: Value) -> BTreeMap<String, Value> {
    match properties {
        Value::Object(map) => map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect(),
        _ => BTreeMap::new(),
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_path(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|err| AuditError::Snapshot {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&data).map_err(|message| AuditError::Snapshot {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_json_str(data: &str) -> std::result::Result<Self, String> {
        let mut graph: MemoryGraph = serde_json::from_str(data).map_err(|e| e.to_string())?;
        for node in &mut graph.nodes {
            node.properties.retain(|_, v| !v.is_null());
        }
        for relationship in &mut graph.relationships {
            relationship.properties.retain(|_, v| !v.is_null());
        }
        graph.verify()?;
        Ok(graph)
    }

    fn verify(&self) -> std::result::Result<(), String> {
        let mut keys = HashSet::new();
        for node in &self.nodes {
            if !keys.insert(node.key.as_str()) {
                return Err(format!("duplicate node key `{}`", node.key));
            }
        }
        for relationship in &self.relationships {
            for end in [&relationship.from, &relationship.to] {
                if !keys.contains(end.as_str()) {
                    return Err(format!(
                        "{} relationship references unknown node `{end}`",
                        relationship.kind
                    ));
                }
            }
        }
        Ok(())
    }

    /// Add a node; `properties` is a JSON object, nulls are dropped.
    pub fn add_node(&mut self, key: &str, labels: &[&str], properties: Value) -> &mut Self {
        self.nodes.push(MemoryNode {
            key: key.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: object(properties),
        });
        self
    }

    pub fn add_relationship(
        &mut self,
        kind: &str,
        from: &str,
        to: &str,
        properties: Value,
    ) -> &mut Self {
        self.relationships.push(MemoryRelationship {
            kind: kind.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            properties: object(properties),
        });
        self
    }

    fn node(&self, key: &str) -> Option<&MemoryNode> {
        self.nodes.iter().find(|n| n.key == key)
    }

    fn labelled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a MemoryNode> + 'a {
        self.nodes.iter().filter(move |n| n.has_label(label))
    }

    fn has_incoming(&self, node: &MemoryNode, kind: &str) -> bool {
        self.relationships
            .iter()
            .any(|r| r.kind == kind && r.to == node.key)
    }

    fn has_outgoing(&self, node: &MemoryNode, kind: &str) -> bool {
        self.relationships
            .iter()
            .any(|r| r.kind == kind && r.from == node.key)
    }

    /// `(from)-[kind]->(to)` matches, with labels required on either end.
    fn edges<'a>(
        &'a self,
        kind: &'a str,
        from_label: Option<&'a str>,
        to_label: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a MemoryNode, &'a MemoryRelationship, &'a MemoryNode)> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.kind == kind)
            .filter_map(move |r| Some((self.node(&r.from)?, r, self.node(&r.to)?)))
            .filter(move |(from, _, to)| {
                from_label.map_or(true, |l| from.has_label(l))
                    && to_label.map_or(true, |l| to.has_label(l))
            })
    }

    fn missing_id(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.iter().filter(|n| n.id().is_null())
    }

    fn rows(&self, probe: Probe) -> Vec<Record> {
        const ANALYZABLE: [&str; 3] = ["Word", "Phrase", "Morpheme"];
        let analyzable = |n: &MemoryNode| ANALYZABLE.iter().any(|l| n.has_label(l));

        match probe {
            Probe::MissingIdCount(label) => {
                let count = self
                    .missing_id()
                    .filter(|n| n.has_label(label.as_str()))
                    .count();
                vec![record([("count", json!(count))])]
            }
            Probe::MissingIdByLabel => {
                let mut groups: Vec<(Value, u64)> = Vec::new();
                for node in self.missing_id() {
                    let label = node.first_label();
                    match groups.iter_mut().find(|(l, _)| *l == label) {
                        Some((_, count)) => *count += 1,
                        None => groups.push((label, 1)),
                    }
                }
                groups.sort_by(|a, b| b.1.cmp(&a.1));
                groups
                    .into_iter()
                    .map(|(label, count)| record([("label", label), ("count", json!(count))]))
                    .collect()
            }
            Probe::OrphanedSections => self
                .labelled(NodeLabel::Section.as_str())
                .filter(|s| !self.has_incoming(s, rel::SECTION_PART_OF_TEXT))
                .map(|s| record([("section_id", s.id())]))
                .collect(),
            Probe::OrphanedPhrases => self
                .labelled(NodeLabel::Phrase.as_str())
                .filter(|p| !self.has_incoming(p, rel::PHRASE_IN_SECTION))
                .map(|p| record([("phrase_id", p.id())]))
                .collect(),
            Probe::OrphanedWords => self
                .labelled(NodeLabel::Word.as_str())
                .filter(|w| {
                    !self.has_incoming(w, rel::SECTION_CONTAINS)
                        && !self.has_incoming(w, rel::PHRASE_COMPOSED_OF)
                })
                .map(word_row)
                .collect(),
            Probe::OrphanedMorphemes => self
                .labelled(NodeLabel::Morpheme.as_str())
                .filter(|m| !self.has_incoming(m, rel::WORD_MADE_OF))
                .map(|m| {
                    record([
                        ("morpheme_id", m.id()),
                        ("surface_form", m.prop("surface_form").clone()),
                    ])
                })
                .collect(),
            Probe::OrphanedGlosses => self
                .labelled(NodeLabel::Gloss.as_str())
                .filter(|g| !self.has_outgoing(g, rel::ANALYZES))
                .map(|g| {
                    record([
                        ("gloss_id", g.id()),
                        ("annotation", g.prop("annotation").clone()),
                    ])
                })
                .collect(),
            Probe::ReversedSectionPartOfText => self
                .edges(rel::SECTION_PART_OF_TEXT, Some("Section"), Some("Text"))
                .map(|(s, _, t)| record([("section_id", s.id()), ("text_id", t.id())]))
                .collect(),
            Probe::ReversedWordMadeOf => self
                .edges(rel::WORD_MADE_OF, Some("Morpheme"), Some("Word"))
                .map(|(m, _, w)| record([("morpheme_id", m.id()), ("word_id", w.id())]))
                .collect(),
            Probe::ReversedPhraseComposedOf => self
                .edges(rel::PHRASE_COMPOSED_OF, Some("Word"), Some("Phrase"))
                .map(|(w, _, p)| record([("word_id", w.id()), ("phrase_id", p.id())]))
                .collect(),
            Probe::ReversedAnalyzes => self
                .edges(rel::ANALYZES, None, Some("Gloss"))
                .filter(|(target, _, _)| analyzable(*target))
                .map(|(target, _, g)| {
                    record([
                        ("target_type", target.first_label()),
                        ("target_id", target.id()),
                        ("gloss_id", g.id()),
                    ])
                })
                .collect(),
            Probe::ComposedOfWithoutOrder => self
                .edges(rel::PHRASE_COMPOSED_OF, Some("Phrase"), Some("Word"))
                .filter(|(_, r, _)| r.prop("Order").is_null())
                .map(|(p, _, w)| record([("phrase_id", p.id()), ("word_id", w.id())]))
                .collect(),
            Probe::InvalidAnalyzesTarget => self
                .edges(rel::ANALYZES, Some("Gloss"), None)
                .filter(|(_, _, target)| !analyzable(*target))
                .map(|(g, _, target)| {
                    record([
                        ("gloss_id", g.id()),
                        ("target_labels", json!(target.labels)),
                        ("target_id", target.id()),
                    ])
                })
                .collect(),
            Probe::SectionWithManyTexts => self
                .labelled(NodeLabel::Section.as_str())
                .filter_map(|s| {
                    let text_count = self
                        .edges(rel::SECTION_PART_OF_TEXT, Some("Text"), Some("Section"))
                        .filter(|(_, _, to)| to.key == s.key)
                        .count();
                    (text_count > 1)
                        .then(|| record([("section_id", s.id()), ("text_count", json!(text_count))]))
                })
                .collect(),
            Probe::PhraseWithoutWords => self
                .labelled(NodeLabel::Phrase.as_str())
                .filter(|p| !self.has_outgoing(p, rel::PHRASE_COMPOSED_OF))
                .map(|p| record([("phrase_id", p.id())]))
                .collect(),
            Probe::WordWithoutMorphemes(reading) => self
                .labelled(NodeLabel::Word.as_str())
                .filter(|w| {
                    let no_morphemes = !self.has_outgoing(w, rel::WORD_MADE_OF);
                    let in_section = self.has_incoming(w, rel::SECTION_CONTAINS);
                    let in_phrase = self.has_incoming(w, rel::PHRASE_COMPOSED_OF);
                    match reading {
                        WordMorphemeReading::Grouped => no_morphemes && (in_section || in_phrase),
                        WordMorphemeReading::Literal => (no_morphemes && in_section) || in_phrase,
                    }
                })
                .map(word_row)
                .collect(),
            Probe::DuplicateComposedOf => {
                let mut groups: Vec<(&str, &str, Value, u64)> = Vec::new();
                for (p, r, w) in self.edges(rel::PHRASE_COMPOSED_OF, Some("Phrase"), Some("Word")) {
                    let order = r.prop("Order").clone();
                    match groups
                        .iter_mut()
                        .find(|(gp, gw, go, _)| *gp == p.key && *gw == w.key && *go == order)
                    {
                        Some((_, _, _, count)) => *count += 1,
                        None => groups.push((p.key.as_str(), w.key.as_str(), order, 1)),
                    }
                }
                groups
                    .into_iter()
                    .filter(|(_, _, _, count)| *count > 1)
                    .filter_map(|(p, w, order, count)| {
                        Some(record([
                            ("phrase_id", self.node(p)?.id()),
                            ("word_id", self.node(w)?.id()),
                            ("order", order),
                            ("rel_count", json!(count)),
                        ]))
                    })
                    .collect()
            }
            Probe::TextWithoutTitleOrLanguage => self
                .labelled(NodeLabel::Text.as_str())
                .filter(|t| t.prop("title").is_null() && t.prop("language").is_null())
                .map(|t| record([("text_id", t.id())]))
                .collect(),
            Probe::WordWithoutSurfaceForm => self
                .labelled(NodeLabel::Word.as_str())
                .filter(|w| w.prop("surface_form").is_null())
                .map(|w| record([("word_id", w.id())]))
                .collect(),
        }
    }

    /// Matches counted by `RETURN count(*)` after the probe's pattern.
    fn total(&self, probe: Probe) -> u64 {
        match probe {
            Probe::MissingIdCount(label) => self
                .missing_id()
                .filter(|n| n.has_label(label.as_str()))
                .count() as u64,
            Probe::MissingIdByLabel => self.missing_id().count() as u64,
            other => self.rows(other).len() as u64,
        }
    }
}

fn record<const N: usize>(fields: [(&str, Value); N]) -> Record {
    fields.into_iter().collect()
}

fn word_row(w: &MemoryNode) -> Record {
    record([
        ("word_id", w.id()),
        ("surface_form", w.prop("surface_form").clone()),
    ])
}

impl GraphQueryService for MemoryGraph {
    fn fetch(&self, query: &GraphQuery) -> Result<Vec<Record>> {
        Ok(match query.shape {
            QueryShape::All => self.rows(query.probe),
            QueryShape::Sample { limit } => {
                let mut rows = self.rows(query.probe);
                rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                rows
            }
            QueryShape::Total => vec![record([(
                GraphQuery::TOTAL_COLUMN,
                json!(self.total(query.probe)),
            )])],
        })
    }
}
