//! Explicit transaction control for a single connection.

use crate::error::{Result, SearchDbError};
use crate::retry::{retry_busy, RetryConfig};
use rusqlite::Connection;
use tracing::{debug, warn};

/// Where the handle's single transaction currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    Open,
    Committing,
    RollingBack,
}

/// Owns the transaction state of one connection.
///
/// Transactions never nest: `begin` outside of `Idle` is an error.
#[derive(Debug)]
pub(crate) struct TransactionManager {
    state: TransactionState,
    retry: RetryConfig,
}

impl TransactionManager {
    pub(crate) fn new(retry: RetryConfig) -> Self {
        Self {
            state: TransactionState::Idle,
            retry,
        }
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Start a write transaction, waiting out busy locks.
    pub(crate) fn begin(&mut self, conn: &Connection) -> Result<()> {
        if self.state != TransactionState::Idle {
            return Err(SearchDbError::Transaction {
                message: format!("cannot begin: transaction already {:?}", self.state),
                source: None,
            });
        }

        retry_busy(&self.retry, "BEGIN", || conn.execute_batch("BEGIN IMMEDIATE"))
            .map_err(|e| SearchDbError::transaction("Failed to begin transaction", e))?;

        self.state = TransactionState::Open;
        Ok(())
    }

    /// Commit, retrying while SQLite reports busy.
    ///
    /// A hard failure rolls back whatever is left open so the handle ends `Idle`.
    pub(crate) fn commit(&mut self, conn: &Connection) -> Result<()> {
        if self.state != TransactionState::Open {
            return Err(SearchDbError::Transaction {
                message: format!("cannot commit: transaction is {:?}", self.state),
                source: None,
            });
        }

        self.state = TransactionState::Committing;
        let result = retry_busy(&self.retry, "COMMIT", || conn.execute_batch("COMMIT"));

        if let Err(e) = result {
            if !conn.is_autocommit() {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    warn!("Rollback after failed commit also failed: {}", rollback_err);
                }
            }
            self.state = TransactionState::Idle;
            return Err(SearchDbError::transaction("Failed to commit transaction", e));
        }

        self.state = TransactionState::Idle;
        Ok(())
    }

    /// Roll back the open transaction.
    pub(crate) fn rollback(&mut self, conn: &Connection) -> Result<()> {
        if self.state != TransactionState::Open {
            return Err(SearchDbError::Transaction {
                message: format!("cannot roll back: transaction is {:?}", self.state),
                source: None,
            });
        }

        self.state = TransactionState::RollingBack;
        let result = if conn.is_autocommit() {
            // SQLite already unwound it (e.g. after a constraint abort)
            Ok(())
        } else {
            retry_busy(&self.retry, "ROLLBACK", || conn.execute_batch("ROLLBACK"))
        };
        self.state = TransactionState::Idle;

        result.map_err(|e| SearchDbError::transaction("Failed to roll back transaction", e))
    }

    /// Run `body` inside `begin`/`commit`, rolling back if it fails.
    ///
    /// The body's error is returned as-is; a rollback failure is only logged.
    pub(crate) fn run<T, F>(&mut self, conn: &Connection, what: &str, body: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.begin(conn)?;

        match body(conn) {
            Ok(value) => {
                self.commit(conn)?;
                debug!("Committed {}", what);
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback(conn) {
                    warn!("Rollback of {} failed: {}", what, rollback_err);
                }
                debug!("Rolled back {}: {}", what, e);
                Err(e)
            }
        }
    }
}
