// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::Result;
use crate::models::ImportBatch;
use crate::utils::{maybe_print_json, pretty_table};
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    if let Some(("list", sub)) = m.subcommand() {
        let data = list_batches(conn)?;
        if !maybe_print_json(sub.get_flag("json"), false, &data)? {
            let rows = data
                .iter()
                .map(|b| {
                    vec![
                        b.id.to_string(),
                        b.file_name.clone(),
                        b.encoding.clone(),
                        b.row_count.to_string(),
                        b.imported_count.to_string(),
                        b.skipped_invalid.to_string(),
                        b.skipped_duplicate.to_string(),
                        b.imported_at.clone(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(
                    &["ID", "File", "Encoding", "Rows", "Imported", "Invalid", "Duplicate", "At"],
                    rows
                )
            );
        }
    }
    Ok(())
}

pub fn list_batches(conn: &Connection) -> Result<Vec<ImportBatch>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_name, encoding, row_count, imported_count, skipped_invalid, skipped_duplicate, imported_at
         FROM import_batches ORDER BY id DESC",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(ImportBatch {
            id: r.get(0)?,
            file_name: r.get(1)?,
            encoding: r.get(2)?,
            row_count: r.get(3)?,
            imported_count: r.get(4)?,
            skipped_invalid: r.get(5)?,
            skipped_duplicate: r.get(6)?,
            imported_at: r.get(7)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
