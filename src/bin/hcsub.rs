// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Subscribe to a path and print every publish as it arrives. Runs until
//! killed; there is no wire opcode to end a subscription from the other
//! end, only `cl_unsub`, which a long-running process has no chance to
//! send once the process itself is interrupted.

use clap::Parser;
use hc::cli::{report_error, report_protocol_error, Endpoint};
use std::sync::mpsc;

#[derive(Parser)]
#[command(about = "Subscribe to a path and print publishes as they arrive")]
struct Cli {
    #[command(flatten)]
    endpoint: Endpoint,

    /// Path to subscribe under.
    path: String,

    /// Subscription criterion (server-defined filter expression).
    #[arg(default_value = "")]
    criterion: String,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let client = match cli.endpoint.connect() {
        Ok(c) => c,
        Err(e) => std::process::exit(report_error(&e)),
    };

    let (tx, rx) = mpsc::channel();
    let subscribed = client.cl_sub(&cli.path, &cli.criterion, move |pid, value| {
        let _ = tx.send((pid, value));
    });
    if let Err(code) = subscribed {
        std::process::exit(report_protocol_error(code));
    }

    for (pid, value) in rx {
        println!("{} {}", pid, value.to_text());
    }
}
