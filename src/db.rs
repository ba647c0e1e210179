// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Payrecon", "payrecon"));

pub const DB_ENV: &str = "PAYRECON_DB";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_path() -> Result<PathBuf> {
    if let Some(p) = std::env::var_os(DB_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("payrecon.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    open_at(&db_path()?)
}

pub fn open_at(path: &Path) -> Result<Connection> {
    let mut conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    init_schema(&mut conn)?;
    Ok(conn)
}

/// Start a write transaction that holds the database write lock from the
/// first statement, so competing writers queue instead of interleaving.
pub fn write_tx(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

pub fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- Owned by the invoicing component; only status/paid_at are touched here.
    CREATE TABLE IF NOT EXISTS invoices(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_number TEXT NOT NULL UNIQUE,
        total_amount INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'draft'
            CHECK(status IN ('draft','sent','paid','overdue')),
        client_name TEXT,
        paid_at TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);

    CREATE TABLE IF NOT EXISTS import_batches(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_name TEXT NOT NULL,
        encoding TEXT NOT NULL,
        row_count INTEGER NOT NULL DEFAULT 0,
        imported_count INTEGER NOT NULL DEFAULT 0,
        skipped_invalid INTEGER NOT NULL DEFAULT 0,
        skipped_duplicate INTEGER NOT NULL DEFAULT 0,
        imported_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS payments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        payment_date TEXT NOT NULL,
        amount INTEGER NOT NULL CHECK(amount > 0), -- minor units
        payer_name TEXT,
        reference_number TEXT,
        bank_name TEXT,
        status TEXT NOT NULL DEFAULT 'unmatched'
            CHECK(status IN ('unmatched','matched','confirmed')),
        invoice_id INTEGER,
        import_batch_id INTEGER NOT NULL,
        notes TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        CHECK((status = 'unmatched') = (invoice_id IS NULL)),
        FOREIGN KEY(invoice_id) REFERENCES invoices(id),
        FOREIGN KEY(import_batch_id) REFERENCES import_batches(id)
    );
    CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(status);
    CREATE INDEX IF NOT EXISTS idx_payments_dedup
        ON payments(payment_date, amount, reference_number);
    -- An invoice can be claimed by at most one live match.
    CREATE UNIQUE INDEX IF NOT EXISTS ux_payments_claimed_invoice
        ON payments(invoice_id) WHERE status IN ('matched','confirmed');

    CREATE TABLE IF NOT EXISTS payment_events(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        payment_id INTEGER NOT NULL,
        action TEXT NOT NULL,
        invoice_id INTEGER,
        prior_invoice_status TEXT,
        operator TEXT,
        at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(payment_id) REFERENCES payments(id)
    );
    CREATE INDEX IF NOT EXISTS idx_payment_events_payment
        ON payment_events(payment_id, id);
    "#,
    )?;
    Ok(())
}
