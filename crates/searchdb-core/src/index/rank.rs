//! Relevance ranking over FTS4 `matchinfo()` statistics.
//!
//! SQLite calls the registered `rank(matchinfo(searchindex), boost)` function
//! once per matched row. The blob uses the default `pcx` layout:
//!
//! ```text
//! [p, c, (row_hits, total_hits, docs_with_hits) × p × c]
//! ```
//!
//! Each phrase/column pair contributes `weight × row_hits / total_hits`, and
//! the sum is scaled by the document boost. A hit in `weight4` (50) outweighs
//! dozens of hits in `weight0` (1).

use crate::config::RankingConfig;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use thiserror::Error;

/// Malformed `matchinfo()` input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchInfoError {
    #[error("matchinfo blob length {0} is not a multiple of 4")]
    Misaligned(usize),

    #[error("matchinfo is missing its phrase/column header")]
    MissingHeader,

    #[error("matchinfo holds {actual} values, expected {expected} for {phrases} phrases x {columns} columns")]
    LengthMismatch {
        phrases: usize,
        columns: usize,
        expected: usize,
        actual: usize,
    },
}

/// Hit statistics for one phrase in one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnHits {
    /// Hits in the current row.
    pub row_hits: u32,
    /// Hits across every row of the table.
    pub total_hits: u32,
    /// Rows with at least one hit.
    pub docs_with_hits: u32,
}

/// Decoded `matchinfo()` statistics for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    phrases: usize,
    columns: usize,
    values: Vec<u32>,
}

impl MatchInfo {
    /// Decode a native-endian `pcx` blob as produced by SQLite.
    pub fn from_blob(blob: &[u8]) -> Result<Self, MatchInfoError> {
        if blob.len() % 4 != 0 {
            return Err(MatchInfoError::Misaligned(blob.len()));
        }
        let values = blob
            .chunks_exact(4)
            .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::from_values(values)
    }

    /// Build from already decoded integers (header included).
    pub fn from_values(values: Vec<u32>) -> Result<Self, MatchInfoError> {
        if values.len() < 2 {
            return Err(MatchInfoError::MissingHeader);
        }
        let phrases = values[0] as usize;
        let columns = values[1] as usize;
        let expected = phrases
            .checked_mul(columns)
            .and_then(|cells| cells.checked_mul(3))
            .and_then(|n| n.checked_add(2));

        if expected != Some(values.len()) {
            return Err(MatchInfoError::LengthMismatch {
                phrases,
                columns,
                expected: expected.unwrap_or(usize::MAX),
                actual: values.len(),
            });
        }

        Ok(Self {
            phrases,
            columns,
            values,
        })
    }

    pub fn phrase_count(&self) -> usize {
        self.phrases
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    /// Statistics for `phrase` in `column`, or `None` if either is out of range.
    pub fn hits(&self, phrase: usize, column: usize) -> Option<ColumnHits> {
        if phrase >= self.phrases || column >= self.columns {
            return None;
        }
        let base = 2 + 3 * (phrase * self.columns + column);
        Some(ColumnHits {
            row_hits: self.values[base],
            total_hits: self.values[base + 1],
            docs_with_hits: self.values[base + 2],
        })
    }
}

/// Score a row: weighted hit ratios summed over phrases and columns, times boost.
///
/// Columns past the end of `weights` don't score.
pub fn rank_score(info: &MatchInfo, boost: f64, weights: &[f64]) -> f64 {
    let mut score = 0.0;

    for phrase in 0..info.phrase_count() {
        for (column, weight) in weights.iter().enumerate().take(info.column_count()) {
            let Some(hits) = info.hits(phrase, column) else {
                continue;
            };
            if hits.row_hits == 0 || hits.total_hits == 0 || *weight == 0.0 {
                continue;
            }
            score += weight * f64::from(hits.row_hits) / f64::from(hits.total_hits);
        }
    }

    score * boost
}

/// Read the boost argument, tolerating the storage classes FTS hands back.
fn boost_value(value: ValueRef<'_>) -> f64 {
    match value {
        ValueRef::Real(boost) => boost,
        ValueRef::Integer(boost) => boost as f64,
        ValueRef::Text(text) => std::str::from_utf8(text)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(1.0),
        ValueRef::Null | ValueRef::Blob(_) => 1.0,
    }
}

fn rank_function(ctx: &Context<'_>) -> rusqlite::Result<f64> {
    if ctx.len() != 2 {
        return Err(rusqlite::Error::UserFunctionError(
            "wrong number of arguments to function rank()".into(),
        ));
    }

    let info = match ctx.get_raw(0) {
        ValueRef::Blob(blob) => MatchInfo::from_blob(blob),
        _ => Err(MatchInfoError::MissingHeader),
    }
    .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;

    let boost = boost_value(ctx.get_raw(1));
    Ok(rank_score(&info, boost, &RankingConfig::COLUMN_WEIGHTS))
}

/// Register `rank(matchinfo, boost)` on a connection.
pub fn register_ranking_function(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        RankingConfig::FUNCTION_NAME,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        rank_function,
    )
}
