use std::process::ExitCode;

use clap::Parser;
use masm_cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match masm_cli::run(&cli) {
        Ok(summary) => {
            eprintln!(
                "wrote {} functions and {} tags to {}",
                summary.functions,
                summary.tags,
                cli.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
