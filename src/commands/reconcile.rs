// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::audit::{last_transition, record_event, status_before_confirm};
use crate::commands::payments::get_payment;
use crate::db::write_tx;
use crate::error::{ReconcileError, Result};
use crate::invoices::InvoiceBook;
use crate::models::{EventAction, InvoiceStatus, PaymentRecord, PaymentStatus};
use crate::utils::{maybe_print_json, parse_id};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, info};

/// Result of a confirm/unmatch call. `changed` is false when the record was
/// already in the target state and nothing was written.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub record: PaymentRecord,
    pub changed: bool,
}

pub fn handle_confirm(conn: &mut Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = parse_id(m.get_one::<String>("payment").unwrap())?;
    let operator = m.get_one::<String>("operator").map(|s| s.as_str());
    let t = confirm(conn, id, operator)?;
    if !maybe_print_json(m.get_flag("json"), false, &t)? {
        if t.changed {
            println!("Confirmed payment {}", id);
        } else {
            println!("Payment {} was already confirmed", id);
        }
    }
    Ok(())
}

pub fn handle_unmatch(conn: &mut Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = parse_id(m.get_one::<String>("payment").unwrap())?;
    let operator = m.get_one::<String>("operator").map(|s| s.as_str());
    let t = unmatch(conn, id, operator)?;
    if !maybe_print_json(m.get_flag("json"), false, &t)? {
        if t.changed {
            println!("Unmatched payment {}", id);
        } else {
            println!("Payment {} was already unmatched", id);
        }
    }
    Ok(())
}

/// Finalise a proposed match: payment `matched -> confirmed`, invoice
/// `sent -> paid`. Repeating it on a confirmed payment is a no-op.
pub fn confirm(conn: &mut Connection, payment_id: i64, operator: Option<&str>) -> Result<Transition> {
    let tx = write_tx(conn)?;
    let payment = get_payment(&tx, payment_id)?;
    match payment.status {
        PaymentStatus::Confirmed => {
            debug!(payment_id, "confirm on confirmed payment, nothing to do");
            return Ok(Transition {
                record: payment,
                changed: false,
            });
        }
        PaymentStatus::Unmatched => {
            return Err(ReconcileError::InvalidState {
                id: payment_id,
                status: payment.status,
                action: "confirm",
            });
        }
        PaymentStatus::Matched => {}
    }

    let invoice_id = linked_invoice(&payment)?;
    let invoice = tx
        .get_by_id(invoice_id)?
        .ok_or_else(|| ReconcileError::NotFound(format!("Invoice {}", invoice_id)))?;
    if invoice.status != InvoiceStatus::Sent {
        return Err(ReconcileError::Conflict(format!(
            "Invoice {} is {}, expected sent",
            invoice.invoice_number, invoice.status
        )));
    }

    let n = tx.execute(
        "UPDATE payments SET status='confirmed' WHERE id=?1 AND status='matched' AND invoice_id=?2",
        params![payment_id, invoice_id],
    )?;
    if n != 1 {
        return Err(ReconcileError::Conflict(format!(
            "Payment {} changed concurrently",
            payment_id
        )));
    }
    tx.set_status(invoice_id, InvoiceStatus::Paid)?;
    record_event(
        &tx,
        payment_id,
        EventAction::Confirmed,
        Some(invoice_id),
        Some(invoice.status),
        operator,
    )?;
    let record = get_payment(&tx, payment_id)?;
    tx.commit()?;

    info!(payment_id, invoice = %invoice.invoice_number, ?operator, "payment confirmed, invoice paid");
    Ok(Transition {
        record,
        changed: true,
    })
}

/// Reverse a match. From `confirmed` the invoice goes back to the status it
/// had before the confirm. A repeated unmatch is a no-op; unmatching a
/// payment that was never matched is an error.
pub fn unmatch(conn: &mut Connection, payment_id: i64, operator: Option<&str>) -> Result<Transition> {
    let tx = write_tx(conn)?;
    let payment = get_payment(&tx, payment_id)?;
    if !payment.status.is_linked() {
        let retried = last_transition(&tx, payment_id)?
            .is_some_and(|ev| ev.action == EventAction::Unmatched);
        if retried {
            debug!(payment_id, "unmatch on unmatched payment, nothing to do");
            return Ok(Transition {
                record: payment,
                changed: false,
            });
        }
        return Err(ReconcileError::InvalidState {
            id: payment_id,
            status: payment.status,
            action: "unmatch",
        });
    }

    let invoice_id = linked_invoice(&payment)?;
    let n = tx.execute(
        "UPDATE payments SET status='unmatched', invoice_id=NULL WHERE id=?1 AND status=?2",
        params![payment_id, payment.status],
    )?;
    if n != 1 {
        return Err(ReconcileError::Conflict(format!(
            "Payment {} changed concurrently",
            payment_id
        )));
    }

    if payment.status == PaymentStatus::Confirmed {
        let restore = status_before_confirm(&tx, payment_id)?.unwrap_or(InvoiceStatus::Sent);
        tx.set_status(invoice_id, restore)?;
        debug!(payment_id, invoice_id, %restore, "invoice status restored");
    }
    record_event(&tx, payment_id, EventAction::Unmatched, Some(invoice_id), None, operator)?;
    let record = get_payment(&tx, payment_id)?;
    tx.commit()?;

    info!(payment_id, invoice_id, from = %payment.status, ?operator, "payment unmatched");
    Ok(Transition {
        record,
        changed: true,
    })
}

fn linked_invoice(payment: &PaymentRecord) -> Result<i64> {
    payment.invoice_id.ok_or_else(|| {
        ReconcileError::Conflict(format!(
            "Payment {} is {} but has no linked invoice",
            payment.id, payment.status
        ))
    })
}
