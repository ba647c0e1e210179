// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{ReconcileError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

pub const AMOUNT_TOLERANCE: &str = "match.amount_tolerance";
pub const TOLERANCE_PERCENT: &str = "match.tolerance_percent";

pub const KNOWN_KEYS: [&str; 2] = [AMOUNT_TOLERANCE, TOLERANCE_PERCENT];

/// Knobs for the fuzzy "amount within tolerance" rule. Both default to zero,
/// which makes that rule accept exact amounts only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchConfig {
    /// Absolute band in minor units.
    pub amount_tolerance: i64,
    /// Band as a percentage of the invoice total.
    pub tolerance_percent: Decimal,
}

impl MatchConfig {
    pub fn tolerance_for(&self, total: i64) -> i64 {
        let pct_band = (Decimal::from(total) * self.tolerance_percent / Decimal::ONE_HUNDRED)
            .floor()
            .to_i64()
            .unwrap_or(0);
        self.amount_tolerance.max(pct_band)
    }
}

pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key=?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v)
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let value = value.trim();
    validate(key, value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn validate(key: &str, value: &str) -> Result<()> {
    match key {
        AMOUNT_TOLERANCE => {
            let v = value.parse::<i64>().map_err(|_| {
                ReconcileError::Validation(format!("Invalid tolerance '{}', expected an integer", value))
            })?;
            if v < 0 {
                return Err(ReconcileError::Validation(format!(
                    "Tolerance must not be negative, got {}",
                    v
                )));
            }
        }
        TOLERANCE_PERCENT => {
            let v = value.parse::<Decimal>().map_err(|_| {
                ReconcileError::Validation(format!("Invalid percentage '{}'", value))
            })?;
            if v.is_sign_negative() || v > Decimal::ONE_HUNDRED {
                return Err(ReconcileError::Validation(format!(
                    "Percentage must be within 0..=100, got {}",
                    v
                )));
            }
        }
        _ => {
            return Err(ReconcileError::Validation(format!(
                "Unknown setting '{}' (known: {})",
                key,
                KNOWN_KEYS.join(", ")
            )));
        }
    }
    Ok(())
}

pub fn match_config(conn: &Connection) -> Result<MatchConfig> {
    let mut cfg = MatchConfig::default();
    if let Some(v) = get(conn, AMOUNT_TOLERANCE)? {
        cfg.amount_tolerance = v.parse().map_err(|_| {
            ReconcileError::Validation(format!("Stored {} '{}' is not an integer", AMOUNT_TOLERANCE, v))
        })?;
    }
    if let Some(v) = get(conn, TOLERANCE_PERCENT)? {
        cfg.tolerance_percent = v.parse().map_err(|_| {
            ReconcileError::Validation(format!("Stored {} '{}' is not a decimal", TOLERANCE_PERCENT, v))
        })?;
    }
    Ok(cfg)
}
