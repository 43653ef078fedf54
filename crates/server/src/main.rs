// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use companion::config::Config;
use companion::run;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    run::init_logging(&config);

    if let Err(e) = run::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
