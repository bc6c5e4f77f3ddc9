mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use tilepress::PipelineError;

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "tilepress=info",
        1 => "tilepress=debug",
        _ => "tilepress=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Run(args) => commands::run(&cli, args),
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        // One exit code per fatal error class.
        let code = err
            .downcast_ref::<PipelineError>()
            .map_or(1, PipelineError::exit_code);
        std::process::exit(code);
    }
}
