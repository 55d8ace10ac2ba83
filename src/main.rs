//! appup command-line entry point.

use appup_cli::cli;
use appup_cli::core::{exit_code_for, user_friendly_error};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    if let Err(e) = cli.execute().await {
        let code = exit_code_for(&e);
        user_friendly_error(e).display();
        std::process::exit(code);
    }
}
