// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Write one element of a tabular parameter.

use clap::Parser;
use hc::cli::{parse_value, report_error, report_protocol_error, report_usage, Endpoint, TypeArg};

#[derive(Parser)]
#[command(about = "Set one element of a tabular parameter")]
struct Cli {
    #[command(flatten)]
    endpoint: Endpoint,

    /// Parameter id.
    pid: u16,

    /// Element id.
    eid: u32,

    /// Wire type of the value, since the client cannot discover it.
    #[arg(long, value_enum, default_value_t = TypeArg::I32)]
    r#type: TypeArg,

    /// Value to write, formatted for the chosen type.
    value: String,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let value = match parse_value(cli.r#type, &cli.value) {
        Ok(v) => v,
        Err(msg) => std::process::exit(report_usage(&msg)),
    };

    let client = match cli.endpoint.connect() {
        Ok(c) => c,
        Err(e) => std::process::exit(report_error(&e)),
    };

    match client.iset_raw(cli.pid, cli.eid, &value) {
        Ok(()) => std::process::exit(0),
        Err(code) => std::process::exit(report_protocol_error(code)),
    }
}
