// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::{ErrorCode, ffi};
use thiserror::Error;

use crate::models::PaymentStatus;

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate payment: {0}")]
    Duplicate(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment {id} is {status}; cannot {action}")]
    InvalidState {
        id: i64,
        status: PaymentStatus,
        action: &'static str,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Persistence error: {0}")]
    Persistence(rusqlite::Error),
}

impl From<rusqlite::Error> for ReconcileError {
    fn from(err: rusqlite::Error) -> Self {
        // Only the invoice claim index means another writer got there first.
        if is_claim_violation(&err) {
            return ReconcileError::Conflict(err.to_string());
        }
        ReconcileError::Persistence(err)
    }
}

fn is_claim_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) => {
            e.code == ErrorCode::ConstraintViolation
                && e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                && msg
                    .as_deref()
                    .is_some_and(|m| m.contains("payments.invoice_id"))
        }
        _ => false,
    }
}

impl ReconcileError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ReconcileError::Conflict(_) | ReconcileError::InvalidState { .. }
        )
    }
}
