//! User-defined query catalog.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A named SQL query with its declared result layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefinition {
    /// Key referenced from `Server::queries`.
    pub identifier: String,
    /// Query text, executed without bound parameters.
    pub sql: String,
    /// Columns rendered as tags.
    pub tags: Vec<String>,
    /// Columns emitted as metrics, one observation per column.
    pub values: Vec<String>,
}

impl QueryDefinition {
    pub fn new(identifier: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// Lookup from query identifier to definition.
///
/// Built fresh for every pass. When several definitions share an identifier
/// the last one wins.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    queries: HashMap<String, QueryDefinition>,
}

impl QueryCatalog {
    pub fn build(definitions: &[QueryDefinition]) -> Self {
        let mut queries = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            if queries
                .insert(definition.identifier.clone(), definition.clone())
                .is_some()
            {
                debug!(identifier = %definition.identifier, "query definition overridden");
            }
        }
        Self { queries }
    }

    pub fn get(&self, identifier: &str) -> Option<&QueryDefinition> {
        self.queries.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Identifiers in sorted order.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.queries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
