use clap::Parser;
use daemon::args::Args;
use daemon::Daemon;
use log::error;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args = Arc::new(Args::parse());

    if let Err(e) = daemon::log::init_log(&args.logs_path(), args.log_level) {
        panic!("failed to initialize logger: {e}");
    }

    let daemon = Daemon::new(args);
    if let Err(e) = daemon.start().await {
        error!("{e}");
        std::process::exit(1);
    }
}
