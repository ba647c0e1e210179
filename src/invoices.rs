// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Boundary to the invoicing component. Reconciliation only reads invoices
//! and requests the `sent <-> paid` transition; everything else about an
//! invoice belongs to its owner.

use crate::error::{ReconcileError, Result};
use crate::models::{Invoice, InvoiceStatus};
use rusqlite::{Connection, OptionalExtension, params};

pub trait InvoiceBook {
    fn find_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>>;
    fn get_by_id(&self, id: i64) -> Result<Option<Invoice>>;
    fn set_status(&self, id: i64, status: InvoiceStatus) -> Result<()>;
}

impl InvoiceBook for Connection {
    fn find_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE status=?1 ORDER BY id",
            Invoice::COLUMNS
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt.query_map(params![status], Invoice::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn get_by_id(&self, id: i64) -> Result<Option<Invoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE id=?1", Invoice::COLUMNS);
        let inv = self
            .query_row(&sql, params![id], Invoice::from_row)
            .optional()?;
        Ok(inv)
    }

    fn set_status(&self, id: i64, status: InvoiceStatus) -> Result<()> {
        let n = if status == InvoiceStatus::Paid {
            self.execute(
                "UPDATE invoices SET status=?1, paid_at=datetime('now') WHERE id=?2",
                params![status, id],
            )?
        } else {
            self.execute(
                "UPDATE invoices SET status=?1, paid_at=NULL WHERE id=?2",
                params![status, id],
            )?
        };
        if n == 0 {
            return Err(ReconcileError::NotFound(format!("Invoice {}", id)));
        }
        Ok(())
    }
}

pub fn invoice_by_number(conn: &Connection, number: &str) -> Result<Invoice> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE invoice_number=?1",
        Invoice::COLUMNS
    );
    conn.query_row(&sql, params![number], Invoice::from_row)
        .optional()?
        .ok_or_else(|| ReconcileError::NotFound(format!("Invoice '{}'", number)))
}

/// `sent` invoices that no matched or confirmed payment has claimed yet.
pub fn unclaimed_sent(conn: &Connection) -> Result<Vec<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices i WHERE i.status='sent'
         AND NOT EXISTS (SELECT 1 FROM payments p
                         WHERE p.invoice_id=i.id AND p.status IN ('matched','confirmed'))
         ORDER BY i.id",
        Invoice::COLUMNS
            .split(", ")
            .map(|c| format!("i.{}", c))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], Invoice::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn is_claimed(conn: &Connection, invoice_id: i64) -> Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT id FROM payments WHERE invoice_id=?1 AND status IN ('matched','confirmed') LIMIT 1",
            params![invoice_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}
