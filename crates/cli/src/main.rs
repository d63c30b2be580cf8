mod cli;
mod logging;
mod state;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, HostId, Init, Keys, Record, Subscribe, Thread, Token};

command_enum! {
    (Init, Init),
    (Token, Token),
    (HostId, HostId),
    (Thread, Thread),
    (Record, Record),
    (Subscribe, Subscribe),
    (Keys, Keys),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let ctx = cli::op::OpContext::new(args.remote, args.config_path);

    // explicit flag > config file > info
    let level = args
        .log_level
        .or_else(|| {
            ctx.state()
                .ok()
                .and_then(|state| state.config.log_level.parse().ok())
        })
        .unwrap_or(tracing::Level::INFO);
    let guard = logging::init_logging(level);

    let result = args.command.execute(&ctx).await;
    drop(guard);
    match result {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
