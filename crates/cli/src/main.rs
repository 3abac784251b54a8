// CLI modules
mod cli;
mod logging;
mod state;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Cat, Exists, Init, Put, Rm, Sweep, Version, Watch};

command_enum! {
    (Cat, Cat),
    (Exists, Exists),
    (Init, Init),
    (Put, Put),
    (Rm, Rm),
    (Sweep, Sweep),
    (Version, Version),
    (Watch, Watch),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Log settings come from the config directory when there is one
    let log_settings = state::AppState::load(args.config_path.clone())
        .map(|state| state.config.log)
        .unwrap_or_default();
    let guards = logging::init_logging(&log_settings);

    let ctx = cli::op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            let output = output.to_string();
            if !output.is_empty() {
                println!("{}", output);
            }
            drop(guards);
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            drop(guards);
            std::process::exit(1);
        }
    }
}
