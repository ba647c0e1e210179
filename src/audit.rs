// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::Result;
use crate::models::{EventAction, InvoiceStatus, PaymentEvent};
use rusqlite::{Connection, OptionalExtension, params};

pub fn record_event(
    conn: &Connection,
    payment_id: i64,
    action: EventAction,
    invoice_id: Option<i64>,
    prior_invoice_status: Option<InvoiceStatus>,
    operator: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO payment_events(payment_id, action, invoice_id, prior_invoice_status, operator)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![payment_id, action, invoice_id, prior_invoice_status, operator],
    )?;
    Ok(())
}

/// Most recent event of any kind for a payment.
pub fn last_event(conn: &Connection, payment_id: i64) -> Result<Option<PaymentEvent>> {
    let ev = conn
        .query_row(
            "SELECT id, payment_id, action, invoice_id, prior_invoice_status, operator, at
             FROM payment_events WHERE payment_id=?1 ORDER BY id DESC LIMIT 1",
            params![payment_id],
            event_from_row,
        )
        .optional()?;
    Ok(ev)
}

/// Most recent event that changed the payment's state. Ambiguity flags are
/// notes for reviewers and are skipped.
pub fn last_transition(conn: &Connection, payment_id: i64) -> Result<Option<PaymentEvent>> {
    let ev = conn
        .query_row(
            "SELECT id, payment_id, action, invoice_id, prior_invoice_status, operator, at
             FROM payment_events WHERE payment_id=?1 AND action != 'flagged_ambiguous'
             ORDER BY id DESC LIMIT 1",
            params![payment_id],
            event_from_row,
        )
        .optional()?;
    Ok(ev)
}

/// Invoice status captured when the payment was last confirmed.
pub fn status_before_confirm(conn: &Connection, payment_id: i64) -> Result<Option<InvoiceStatus>> {
    let prior: Option<Option<InvoiceStatus>> = conn
        .query_row(
            "SELECT prior_invoice_status FROM payment_events
             WHERE payment_id=?1 AND action='confirmed' ORDER BY id DESC LIMIT 1",
            params![payment_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(prior.flatten())
}

pub fn events_for(conn: &Connection, payment_id: i64) -> Result<Vec<PaymentEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, payment_id, action, invoice_id, prior_invoice_status, operator, at
         FROM payment_events WHERE payment_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![payment_id], event_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn event_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentEvent> {
    Ok(PaymentEvent {
        id: r.get(0)?,
        payment_id: r.get(1)?,
        action: r.get(2)?,
        invoice_id: r.get(3)?,
        prior_invoice_status: r.get(4)?,
        operator: r.get(5)?,
        at: r.get(6)?,
    })
}
