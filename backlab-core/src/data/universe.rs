//! Universe configuration: the ordered list of instruments a run trades.
//!
//! Stored as TOML:
//!
//! ```toml
//! benchmark = "KOSPI"
//!
//! [[instruments]]
//! id = "005930"
//! name = "Samsung Electronics"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Instrument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }

    /// Display name, falling back to the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    /// Optional benchmark series id, reported alongside the strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
}

impl Universe {
    /// Build a universe, dropping repeated ids (first occurrence wins).
    pub fn new(instruments: Vec<Instrument>) -> Self {
        let mut u = Self {
            instruments,
            benchmark: None,
        };
        u.dedup();
        u
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ids.into_iter().map(Instrument::new).collect())
    }

    pub fn with_benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = Some(benchmark.into());
        self
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("read universe file: {e}"))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let mut u: Self =
            toml::from_str(content).map_err(|e| format!("parse universe TOML: {e}"))?;
        u.dedup();
        Ok(u)
    }

    fn dedup(&mut self) {
        let mut seen = HashSet::new();
        self.instruments.retain(|i| seen.insert(i.id.clone()));
    }

    pub fn ids(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.id == id)
    }

    pub fn label(&self, id: &str) -> String {
        self.get(id).map_or_else(|| id.to_string(), |i| i.label().to_string())
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
