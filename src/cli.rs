// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};

fn json_flag() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print JSON instead of a table")
}

fn operator_arg() -> Arg {
    Arg::new("operator")
        .long("operator")
        .value_name("NAME")
        .help("Who is performing the action (recorded in the audit trail)")
}

fn payment_arg() -> Arg {
    Arg::new("payment")
        .long("payment")
        .value_name("ID")
        .required(true)
}

pub fn build_cli() -> Command {
    Command::new("payrecon")
        .version(clap::crate_version!())
        .about("Import bank transfers, match them to invoices, and reconcile")
        .subcommand_required(false)
        .subcommand(Command::new("init").about("Create the database if missing"))
        .subcommand(
            Command::new("import").about("Import bank files").subcommand(
                Command::new("payments")
                    .about("Import a bank-transfer CSV (UTF-8 or Shift_JIS)")
                    .arg(Arg::new("path").long("path").required(true))
                    .arg(
                        Arg::new("encoding")
                            .long("encoding")
                            .value_name("auto|utf-8|shift_jis")
                            .default_value("auto"),
                    )
                    .arg(json_flag()),
            ),
        )
        .subcommand(
            Command::new("match")
                .about("Match payments to invoices")
                .subcommand(
                    Command::new("auto")
                        .about("Run one auto-match pass over unmatched payments")
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("manual")
                        .about("Link a payment to a chosen sent invoice")
                        .arg(payment_arg())
                        .arg(
                            Arg::new("invoice")
                                .long("invoice")
                                .value_name("ID")
                                .required(true),
                        )
                        .arg(operator_arg()),
                )
                .subcommand(
                    Command::new("candidates")
                        .about("Rank sent invoices for a payment")
                        .arg(payment_arg())
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize))
                                .default_value("10"),
                        )
                        .arg(json_flag()),
                ),
        )
        .subcommand(
            Command::new("confirm")
                .about("Confirm a matched payment and mark its invoice paid")
                .arg(payment_arg())
                .arg(operator_arg())
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("unmatch")
                .about("Reverse a match or confirmation")
                .arg(payment_arg())
                .arg(operator_arg())
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("payments")
                .about("Browse imported payments")
                .subcommand(
                    Command::new("list")
                        .arg(Arg::new("status").long("status").value_name("STATUS"))
                        .arg(
                            Arg::new("page")
                                .long("page")
                                .value_parser(value_parser!(usize))
                                .default_value("1"),
                        )
                        .arg(
                            Arg::new("per_page")
                                .long("per-page")
                                .value_parser(value_parser!(usize))
                                .default_value("20"),
                        )
                        .arg(json_flag())
                        .arg(
                            Arg::new("jsonl")
                                .long("jsonl")
                                .action(ArgAction::SetTrue)
                                .conflicts_with("json"),
                        ),
                )
                .subcommand(
                    Command::new("show")
                        .about("Show one payment with its audit trail")
                        .arg(Arg::new("id").required(true)),
                ),
        )
        .subcommand(
            Command::new("summary")
                .about("Counts and amounts per reconciliation status")
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("invoice")
                .about("Invoices known to reconciliation")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("number").long("number").required(true))
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(Arg::new("client").long("client"))
                        .arg(Arg::new("status").long("status").default_value("sent")),
                )
                .subcommand(
                    Command::new("list")
                        .arg(Arg::new("status").long("status"))
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("status")
                        .arg(Arg::new("number").long("number").required(true))
                        .arg(Arg::new("set").long("set").required(true)),
                ),
        )
        .subcommand(
            Command::new("batches")
                .about("Import batch history")
                .subcommand(Command::new("list").arg(json_flag())),
        )
        .subcommand(
            Command::new("export").about("Export data").subcommand(
                Command::new("payments")
                    .arg(
                        Arg::new("format")
                            .long("format")
                            .value_parser(["csv", "json"])
                            .default_value("csv"),
                    )
                    .arg(Arg::new("out").long("out").required(true)),
            ),
        )
        .subcommand(
            Command::new("config")
                .about("Matching settings")
                .subcommand(Command::new("get").arg(Arg::new("key").required(true)))
                .subcommand(
                    Command::new("set")
                        .arg(Arg::new("key").required(true))
                        .arg(Arg::new("value").required(true).allow_hyphen_values(true)),
                )
                .subcommand(Command::new("list")),
        )
        .subcommand(Command::new("doctor").about("Check reconciliation invariants"))
}
