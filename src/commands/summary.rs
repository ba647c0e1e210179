// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::Result;
use crate::utils::{fmt_amount, maybe_print_json, pretty_table};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub total_payments: i64,
    pub unmatched: i64,
    pub matched: i64,
    pub confirmed: i64,
    pub total_amount: i64,
    /// Matched and confirmed together.
    pub matched_amount: i64,
    pub confirmed_amount: i64,
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let s = summary(conn)?;
    if !maybe_print_json(m.get_flag("json"), false, &s)? {
        let rows = vec![
            vec!["unmatched".into(), s.unmatched.to_string(), String::new()],
            vec!["matched".into(), s.matched.to_string(), String::new()],
            vec![
                "confirmed".into(),
                s.confirmed.to_string(),
                fmt_amount(s.confirmed_amount),
            ],
            vec![
                "matched + confirmed".into(),
                (s.matched + s.confirmed).to_string(),
                fmt_amount(s.matched_amount),
            ],
            vec![
                "total".into(),
                s.total_payments.to_string(),
                fmt_amount(s.total_amount),
            ],
        ];
        println!("{}", pretty_table(&["Status", "Payments", "Amount"], rows));
    }
    Ok(())
}

// Counts and amounts come from one statement, i.e. one snapshot.
pub fn summary(conn: &Connection) -> Result<ReconciliationSummary> {
    let s = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status='unmatched'), 0),
                COALESCE(SUM(status='matched'), 0),
                COALESCE(SUM(status='confirmed'), 0),
                COALESCE(SUM(amount), 0),
                COALESCE(SUM(CASE WHEN status IN ('matched','confirmed') THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status='confirmed' THEN amount ELSE 0 END), 0)
         FROM payments",
        [],
        |r| {
            Ok(ReconciliationSummary {
                total_payments: r.get(0)?,
                unmatched: r.get(1)?,
                matched: r.get(2)?,
                confirmed: r.get(3)?,
                total_amount: r.get(4)?,
                matched_amount: r.get(5)?,
                confirmed_amount: r.get(6)?,
            })
        },
    )?;
    Ok(s)
}
