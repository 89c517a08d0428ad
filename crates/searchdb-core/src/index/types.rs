//! Document, metadata, and result types.

use crate::config::RankingConfig;
use crate::error::{Result, SearchDbError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the five weighted text slots of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldWeight {
    Weight0,
    Weight1,
    Weight2,
    Weight3,
    Weight4,
}

impl FieldWeight {
    pub const ALL: [FieldWeight; 5] = [
        FieldWeight::Weight0,
        FieldWeight::Weight1,
        FieldWeight::Weight2,
        FieldWeight::Weight3,
        FieldWeight::Weight4,
    ];

    /// Column name in the full-text table.
    pub fn column(self) -> &'static str {
        match self {
            FieldWeight::Weight0 => "weight0",
            FieldWeight::Weight1 => "weight1",
            FieldWeight::Weight2 => "weight2",
            FieldWeight::Weight3 => "weight3",
            FieldWeight::Weight4 => "weight4",
        }
    }

    /// Fixed ranking weight of this tier.
    pub fn rank_weight(self) -> f64 {
        RankingConfig::COLUMN_WEIGHTS[4 + self as usize]
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|weight| weight.column() == key)
    }
}

/// The five searchable text fields of a document. Empty means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchableFields {
    pub weight0: String,
    pub weight1: String,
    pub weight2: String,
    pub weight3: String,
    pub weight4: String,
}

impl SearchableFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for a single tier.
    pub fn with(mut self, weight: FieldWeight, text: impl Into<String>) -> Self {
        *self.get_mut(weight) = text.into();
        self
    }

    pub fn get(&self, weight: FieldWeight) -> &str {
        match weight {
            FieldWeight::Weight0 => &self.weight0,
            FieldWeight::Weight1 => &self.weight1,
            FieldWeight::Weight2 => &self.weight2,
            FieldWeight::Weight3 => &self.weight3,
            FieldWeight::Weight4 => &self.weight4,
        }
    }

    fn get_mut(&mut self, weight: FieldWeight) -> &mut String {
        match weight {
            FieldWeight::Weight0 => &mut self.weight0,
            FieldWeight::Weight1 => &mut self.weight1,
            FieldWeight::Weight2 => &mut self.weight2,
            FieldWeight::Weight3 => &mut self.weight3,
            FieldWeight::Weight4 => &mut self.weight4,
        }
    }

    /// Build from a loosely keyed map (`weight0`..`weight4`).
    ///
    /// Missing keys stay empty; unknown keys are ignored.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut fields = Self::default();
        for (key, value) in map {
            if let Some(weight) = FieldWeight::from_key(key) {
                *fields.get_mut(weight) = value.clone();
            }
        }
        fields
    }

    /// True when at least one tier carries text.
    pub fn has_text(&self) -> bool {
        FieldWeight::ALL
            .iter()
            .any(|weight| !self.get(*weight).is_empty())
    }
}

/// Display-only metadata stored next to each indexed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    pub title: String,
    pub subtitle: String,
    pub uri: String,
    #[serde(rename = "type", alias = "filetype")]
    pub kind: String,
    #[serde(rename = "imageuri")]
    pub image_uri: String,
}

impl DocumentMetadata {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Build from a loosely keyed map. Missing keys stay empty.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let lookup = |key: &str| map.get(key).cloned().unwrap_or_default();
        Self {
            title: lookup("title"),
            subtitle: lookup("subtitle"),
            uri: lookup("uri"),
            kind: map
                .get("type")
                .or_else(|| map.get("filetype"))
                .cloned()
                .unwrap_or_default(),
            image_uri: lookup("imageuri"),
        }
    }
}

/// A complete request to index one document.
///
/// This is also the on-disk format of index-info files queued by
/// [`SearchManager`](crate::SearchManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRequest {
    #[serde(rename = "moduleid")]
    pub module_id: String,
    #[serde(rename = "entityid", alias = "fileid")]
    pub entity_id: String,
    pub language: String,
    pub boost: f64,
    #[serde(rename = "searchablestrings", default)]
    pub fields: SearchableFields,
    #[serde(rename = "filemetadata", default)]
    pub metadata: DocumentMetadata,
}

impl IndexRequest {
    pub fn new(
        module_id: impl Into<String>,
        entity_id: impl Into<String>,
        language: impl Into<String>,
        boost: f64,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            entity_id: entity_id.into(),
            language: language.into(),
            boost,
            fields: SearchableFields::default(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_fields(mut self, fields: SearchableFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Reject requests missing a key, a language, or any searchable text.
    pub fn validate(&self) -> Result<()> {
        if self.module_id.is_empty() {
            return Err(SearchDbError::validation("module_id", "must not be empty"));
        }
        if self.entity_id.is_empty() {
            return Err(SearchDbError::validation("entity_id", "must not be empty"));
        }
        if self.language.is_empty() {
            return Err(SearchDbError::validation("language", "must not be empty"));
        }
        if !self.fields.has_text() {
            return Err(SearchDbError::validation(
                "fields",
                "at least one searchable field must contain text",
            ));
        }
        Ok(())
    }
}

/// One ranked hit returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub module_id: String,
    pub entity_id: String,
    pub title: String,
    pub subtitle: String,
    pub uri: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub image_uri: String,
    pub snippet: String,
    pub rank: f64,
    pub is_favorited: bool,
}
