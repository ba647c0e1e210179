// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::Result;
use crate::utils::pretty_table;
use rusqlite::Connection;

pub fn handle(conn: &Connection) -> anyhow::Result<()> {
    let rows = diagnose(conn)?;
    if rows.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}

/// Scan persisted reconciliation state for anything the state machine should
/// have made impossible.
pub fn diagnose(conn: &Connection) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();

    // 1) Link/status disagreement
    let mut stmt = conn.prepare(
        "SELECT id, status FROM payments
         WHERE (status='unmatched' AND invoice_id IS NOT NULL)
            OR (status IN ('matched','confirmed') AND invoice_id IS NULL)",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let status: String = r.get(1)?;
        rows.push(vec!["link_status_mismatch".into(), format!("payment {} ({})", id, status)]);
    }

    // 2) One invoice held by several live matches
    let mut stmt2 = conn.prepare(
        "SELECT invoice_id, COUNT(*) FROM payments
         WHERE status IN ('matched','confirmed') GROUP BY invoice_id HAVING COUNT(*) > 1",
    )?;
    let mut cur2 = stmt2.query([])?;
    while let Some(r) = cur2.next()? {
        let inv: i64 = r.get(0)?;
        let n: i64 = r.get(1)?;
        rows.push(vec!["invoice_double_claim".into(), format!("invoice {} x{}", inv, n)]);
    }

    // 3) Confirmed payment whose invoice is not paid
    let mut stmt3 = conn.prepare(
        "SELECT p.id, i.invoice_number, i.status FROM payments p JOIN invoices i ON p.invoice_id=i.id
         WHERE p.status='confirmed' AND i.status != 'paid'",
    )?;
    let mut cur3 = stmt3.query([])?;
    while let Some(r) = cur3.next()? {
        let id: i64 = r.get(0)?;
        let number: String = r.get(1)?;
        let status: String = r.get(2)?;
        rows.push(vec![
            "confirmed_invoice_unpaid".into(),
            format!("payment {} -> {} ({})", id, number, status),
        ]);
    }

    // 4) Matched payment whose invoice left `sent` behind our back
    let mut stmt4 = conn.prepare(
        "SELECT p.id, i.invoice_number, i.status FROM payments p JOIN invoices i ON p.invoice_id=i.id
         WHERE p.status='matched' AND i.status != 'sent'",
    )?;
    let mut cur4 = stmt4.query([])?;
    while let Some(r) = cur4.next()? {
        let id: i64 = r.get(0)?;
        let number: String = r.get(1)?;
        let status: String = r.get(2)?;
        rows.push(vec![
            "matched_invoice_not_sent".into(),
            format!("payment {} -> {} ({})", id, number, status),
        ]);
    }

    Ok(rows)
}
