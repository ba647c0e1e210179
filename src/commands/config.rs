// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::settings::{self, KNOWN_KEYS};
use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("get", sub)) => {
            let key = sub.get_one::<String>("key").unwrap().trim();
            match settings::get(conn, key)? {
                Some(v) => println!("{} = {}", key, v),
                None => println!("{} is not set", key),
            }
        }
        Some(("set", sub)) => {
            let key = sub.get_one::<String>("key").unwrap().trim();
            let value = sub.get_one::<String>("value").unwrap();
            settings::set(conn, key, value)?;
            println!("{} = {}", key, value.trim());
        }
        Some(("list", _)) => {
            let mut rows = Vec::new();
            for key in KNOWN_KEYS {
                let v = settings::get(conn, key)?.unwrap_or_else(|| "(default 0)".into());
                rows.push(vec![key.to_string(), v]);
            }
            println!("{}", pretty_table(&["Key", "Value"], rows));
        }
        _ => {}
    }
    Ok(())
}
