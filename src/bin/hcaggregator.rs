// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Run an aggregator from an XML configuration file until killed.

use clap::Parser;
use hc::aggregator::Aggregator;
use hc::cli::{report_error, EXIT_USAGE};
use std::fs;

#[derive(Parser)]
#[command(about = "Run an aggregator described by an XML configuration file")]
struct Cli {
    /// Path to the aggregator's XML configuration document.
    config: String,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let xml = match fs::read_to_string(&cli.config) {
        Ok(xml) => xml,
        Err(e) => {
            eprintln!("error: could not read {:?}: {}", cli.config, e);
            std::process::exit(EXIT_USAGE);
        }
    };

    let aggregator = match Aggregator::build(&xml) {
        Ok(a) => a,
        Err(e) => std::process::exit(report_error(&e)),
    };

    if let Err(e) = aggregator.start() {
        std::process::exit(report_error(&e));
    }

    log::info!(
        "aggregator running with {} connection(s): {:?}",
        aggregator.connection_count(),
        aggregator.connection_names()
    );

    loop {
        std::thread::park();
    }
}
