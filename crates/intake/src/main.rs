use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use intake::{logging, Agent, Config};

fn main() -> ExitCode {
    logging::init();

    info!("Starting intake v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::resolve_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut agent = match Agent::open(config) {
        Ok(agent) => agent,
        Err(e) => {
            error!("Failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown requested");
        flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not install signal handler: {}", e);
    }

    agent.run(shutdown);
    ExitCode::SUCCESS
}
