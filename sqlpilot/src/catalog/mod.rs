//! In-memory schema catalog.
//!
//! Holds a full schema per connection and answers [`SchemaRetriever`]
//! lookups by ranking tables against the words of the question.

use crate::agents::{SchemaRetriever, ValueMappings};
use crate::state::{SchemaInfo, TableInfo};
use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};

/// The schema and value mappings registered for one connection.
#[derive(Debug, Clone, Default)]
pub struct CatalogEntry {
    /// Every table of the database.
    pub schema: SchemaInfo,
    /// `table.column` to term to stored value.
    pub value_mappings: ValueMappings,
}

/// A concurrent, connection-keyed schema store.
#[derive(Debug)]
pub struct InMemorySchemaCatalog {
    entries: DashMap<i64, CatalogEntry>,
    max_tables: usize,
}

impl Default for InMemorySchemaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySchemaCatalog {
    /// Creates an empty catalog returning at most 8 tables per lookup.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            max_tables: 8,
        }
    }

    /// Caps the number of directly matched tables per lookup.
    #[must_use]
    pub fn with_max_tables(mut self, max_tables: usize) -> Self {
        self.max_tables = max_tables.max(1);
        self
    }

    /// Registers or replaces the schema of a connection.
    pub fn register(&self, connection_id: i64, schema: SchemaInfo, value_mappings: ValueMappings) {
        self.entries.insert(
            connection_id,
            CatalogEntry {
                schema,
                value_mappings,
            },
        );
    }

    /// Removes a connection.
    pub fn remove(&self, connection_id: i64) -> Option<CatalogEntry> {
        self.entries.remove(&connection_id).map(|(_, entry)| entry)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Selects the tables relevant to `query` from `schema`.
    ///
    /// Directly matched tables are ranked by score; tables one relationship
    /// away from a match are pulled in afterwards.
    #[must_use]
    pub fn select(&self, schema: &SchemaInfo, query: &str) -> SchemaInfo {
        let lowered = query.to_lowercase();
        let stems: BTreeSet<String> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| w.len() > 1)
            .map(stem)
            .collect();

        let mut ranked: Vec<(usize, &String)> = schema
            .tables
            .iter()
            .map(|(name, table)| (score_table(table, &stems, &lowered), name))
            .filter(|(score, _)| *score > 0)
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        ranked.truncate(self.max_tables);

        let mut selected: BTreeSet<&String> = ranked.iter().map(|(_, name)| *name).collect();
        let neighbours: Vec<&String> = schema
            .relationships
            .iter()
            .flat_map(|rel| {
                let source = selected.iter().any(|t| t.eq_ignore_ascii_case(&rel.source_table));
                let target = selected.iter().any(|t| t.eq_ignore_ascii_case(&rel.target_table));
                match (source, target) {
                    (true, false) => schema.tables.get_key_value(&rel.target_table).map(|(k, _)| k),
                    (false, true) => schema.tables.get_key_value(&rel.source_table).map(|(k, _)| k),
                    _ => None,
                }
            })
            .collect();
        selected.extend(neighbours);

        let tables: BTreeMap<String, TableInfo> = selected
            .into_iter()
            .filter_map(|name| schema.tables.get(name).map(|t| (name.clone(), t.clone())))
            .collect();
        let relationships = schema
            .relationships
            .iter()
            .filter(|rel| tables.contains_key(&rel.source_table) && tables.contains_key(&rel.target_table))
            .cloned()
            .collect();

        SchemaInfo {
            tables,
            relationships,
            value_mappings: BTreeMap::new(),
        }
    }
}

fn stem(word: &str) -> String {
    let word = word.trim_matches('_');
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn score_table(table: &TableInfo, stems: &BTreeSet<String>, lowered: &str) -> usize {
    let described = |text: &Option<String>| {
        text.as_deref()
            .is_some_and(|d| !d.is_ascii() && !d.is_empty() && lowered.contains(&d.to_lowercase()))
    };

    let mut score = 0;
    if stems.contains(&stem(&table.name.to_lowercase())) {
        score += 3;
    }
    if described(&table.description) {
        score += 3;
    }
    for column in &table.columns {
        let name = column.name.to_lowercase();
        if name.split('_').any(|part| part.len() > 1 && stems.contains(&stem(part))) {
            score += 1;
        }
        if described(&column.description) {
            score += 1;
        }
    }
    score
}

#[async_trait]
impl SchemaRetriever for InMemorySchemaCatalog {
    async fn retrieve_schema(&self, connection_id: i64, query: &str) -> anyhow::Result<SchemaInfo> {
        let entry = self
            .entries
            .get(&connection_id)
            .ok_or_else(|| anyhow!("unknown connection {connection_id}"))?;
        let selected = self.select(&entry.schema, query);
        tracing::debug!(
            connection_id,
            tables = selected.tables.len(),
            "Selected schema tables"
        );
        Ok(selected)
    }

    async fn get_value_mappings(
        &self,
        connection_id: i64,
        tables: &[String],
    ) -> anyhow::Result<ValueMappings> {
        let entry = self
            .entries
            .get(&connection_id)
            .ok_or_else(|| anyhow!("unknown connection {connection_id}"))?;
        Ok(entry
            .value_mappings
            .iter()
            .filter(|(column, _)| {
                column
                    .split_once('.')
                    .is_some_and(|(table, _)| tables.iter().any(|t| t.eq_ignore_ascii_case(table)))
            })
            .map(|(column, terms)| (column.clone(), terms.clone()))
            .collect())
    }
}
