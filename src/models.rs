// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Unknown {kind} status '{value}'")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

/// Lifecycle of an imported payment: unmatched -> matched -> confirmed,
/// with unmatch as the only way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unmatched,
    Matched,
    Confirmed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unmatched => "unmatched",
            PaymentStatus::Matched => "matched",
            PaymentStatus::Confirmed => "confirmed",
        }
    }

    /// Whether a record in this status must carry an invoice link.
    pub fn is_linked(&self) -> bool {
        !matches!(self, PaymentStatus::Unmatched)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unmatched" => Ok(PaymentStatus::Unmatched),
            "matched" => Ok(PaymentStatus::Matched),
            "confirmed" => Ok(PaymentStatus::Confirmed),
            _ => Err(ParseStatusError {
                kind: "payment",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            _ => Err(ParseStatusError {
                kind: "invoice",
                value: s.to_string(),
            }),
        }
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

sql_text_enum!(PaymentStatus);
sql_text_enum!(InvoiceStatus);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub payment_date: NaiveDate,
    pub amount: i64, // minor units
    pub payer_name: Option<String>,
    pub reference_number: Option<String>,
    pub bank_name: Option<String>,
    pub status: PaymentStatus,
    pub invoice_id: Option<i64>,
    pub import_batch_id: i64,
    pub notes: Option<String>,
    pub created_at: String,
}

impl PaymentRecord {
    pub(crate) const COLUMNS: &'static str = "id, payment_date, amount, payer_name, reference_number, bank_name, status, invoice_id, import_batch_id, notes, created_at";

    pub(crate) fn from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(PaymentRecord {
            id: r.get(0)?,
            payment_date: r.get(1)?,
            amount: r.get(2)?,
            payer_name: r.get(3)?,
            reference_number: r.get(4)?,
            bank_name: r.get(5)?,
            status: r.get(6)?,
            invoice_id: r.get(7)?,
            import_batch_id: r.get(8)?,
            notes: r.get(9)?,
            created_at: r.get(10)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub total_amount: i64,
    pub status: InvoiceStatus,
    pub client_name: Option<String>,
    pub paid_at: Option<String>,
}

impl Invoice {
    pub(crate) const COLUMNS: &'static str =
        "id, invoice_number, total_amount, status, client_name, paid_at";

    pub(crate) fn from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Invoice {
            id: r.get(0)?,
            invoice_number: r.get(1)?,
            total_amount: r.get(2)?,
            status: r.get(3)?,
            client_name: r.get(4)?,
            paid_at: r.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: i64,
    pub file_name: String,
    pub encoding: String,
    pub row_count: i64,
    pub imported_count: i64,
    pub skipped_invalid: i64,
    pub skipped_duplicate: i64,
    pub imported_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSignal {
    ExactAmount,
    AmountWithinTolerance,
    ReferenceMatch,
    PayerNameMatch,
    PayerNameSimilar,
}

/// A scored pairing of one payment with one eligible invoice. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub invoice_id: i64,
    pub invoice_number: String,
    pub total_amount: i64,
    pub score: u8,
    pub confidence: MatchConfidence,
    pub signals: Vec<MatchSignal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    MatchedAuto,
    MatchedManual,
    Confirmed,
    Unmatched,
    FlaggedAmbiguous,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::MatchedAuto => "matched_auto",
            EventAction::MatchedManual => "matched_manual",
            EventAction::Confirmed => "confirmed",
            EventAction::Unmatched => "unmatched",
            EventAction::FlaggedAmbiguous => "flagged_ambiguous",
        }
    }
}

impl FromStr for EventAction {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matched_auto" => Ok(EventAction::MatchedAuto),
            "matched_manual" => Ok(EventAction::MatchedManual),
            "confirmed" => Ok(EventAction::Confirmed),
            "unmatched" => Ok(EventAction::Unmatched),
            "flagged_ambiguous" => Ok(EventAction::FlaggedAmbiguous),
            _ => Err(ParseStatusError {
                kind: "event",
                value: s.to_string(),
            }),
        }
    }
}

sql_text_enum!(EventAction);

/// Append-only audit entry for every reconciliation decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: i64,
    pub payment_id: i64,
    pub action: EventAction,
    pub invoice_id: Option<i64>,
    pub prior_invoice_status: Option<InvoiceStatus>,
    pub operator: Option<String>,
    pub at: String,
}
