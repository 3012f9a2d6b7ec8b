// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Invoke one element of a tabular callable parameter.

use clap::Parser;
use hc::cli::{report_error, report_protocol_error, Endpoint};

#[derive(Parser)]
#[command(about = "Invoke one element of a tabular callable parameter")]
struct Cli {
    #[command(flatten)]
    endpoint: Endpoint,

    /// Parameter id.
    pid: u16,

    /// Element id.
    eid: u32,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let client = match cli.endpoint.connect() {
        Ok(c) => c,
        Err(e) => std::process::exit(report_error(&e)),
    };

    match client.icall_raw(cli.pid, cli.eid) {
        Ok(()) => std::process::exit(0),
        Err(code) => std::process::exit(report_protocol_error(code)),
    }
}
