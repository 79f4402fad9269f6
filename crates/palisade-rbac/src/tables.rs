//! Table references and their extraction from raw queries.

use std::collections::{BTreeSet, HashSet};
use std::convert::Infallible;
use std::fmt;
use std::ops::ControlFlow;

use sqlparser::ast::{ObjectName, ObjectNamePart, Query, Visit, Visitor};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{Result, SecurityError};

/// A table referenced by name, optionally qualified by schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Table {
    pub schema: Option<String>,
    pub table: String,
}

impl Table {
    pub fn new(table: impl Into<String>, schema: Option<&str>) -> Self {
        Self {
            schema: schema.filter(|s| !s.is_empty()).map(str::to_string),
            table: table.into(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

/// Extracts the tables a raw query reads from.
pub trait TableExtractor: Send + Sync {
    /// Returns every referenced table; unqualified tables take `default_schema`.
    fn extract_tables(&self, sql: &str, default_schema: Option<&str>) -> Result<BTreeSet<Table>>;
}

/// [`TableExtractor`] backed by `sqlparser` with the generic dialect.
///
/// Common table expression names are not reported as tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlParserExtractor;

impl TableExtractor for SqlParserExtractor {
    fn extract_tables(&self, sql: &str, default_schema: Option<&str>) -> Result<BTreeSet<Table>> {
        let dialect = GenericDialect {};
        let statements =
            Parser::parse_sql(&dialect, sql).map_err(|e| SecurityError::SqlParse(e.to_string()))?;

        let mut collector = RelationCollector::default();
        match statements.visit(&mut collector) {
            ControlFlow::Continue(()) => {}
            ControlFlow::Break(never) => match never {},
        }

        Ok(collector
            .relations
            .into_iter()
            .filter_map(|parts| to_table(parts, default_schema))
            .collect())
    }
}

#[derive(Default)]
struct RelationCollector {
    ctes: HashSet<String>,
    relations: Vec<Vec<String>>,
}

impl Visitor for RelationCollector {
    type Break = Infallible;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let parts = name_parts(relation);
        let is_cte = parts.len() == 1 && self.ctes.contains(&parts[0].to_lowercase());
        if !is_cte {
            self.relations.push(parts);
        }
        ControlFlow::Continue(())
    }
}

fn name_parts(name: &ObjectName) -> Vec<String> {
    name.0.iter().map(part_value).collect()
}

fn part_value(part: &ObjectNamePart) -> String {
    match part.as_ident() {
        Some(ident) => ident.value.clone(),
        None => part.to_string(),
    }
}

// `catalog.schema.table`, `schema.table` or `table`
fn to_table(mut parts: Vec<String>, default_schema: Option<&str>) -> Option<Table> {
    let table = parts.pop()?;
    let schema = parts.pop();
    Some(Table::new(table, schema.as_deref().or(default_schema)))
}
