//! `metricol run` — start the agent and block until a termination signal.

use std::path::Path;

use metricol_core::{SampleQueue, Supervisor, registry};

/// Run the agent.
pub fn run(config_path: &Path, log_level: Option<&str>) {
    let config = super::load_config(config_path);
    super::init_logging(log_level, config.default_value("log_level"));

    // Set up SIGINT/SIGTERM handler; the handler only signals the main thread.
    let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded::<()>(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    }) {
        eprintln!("Error setting signal handler: {e}");
        std::process::exit(1);
    }

    let queue = SampleQueue::new();
    let supervisor = Supervisor::new();
    for section in config.worker_sections() {
        match registry::is_enabled(&section) {
            Ok(true) => {}
            Ok(false) => {
                log::info!("[{}] disabled, skipping", section.name());
                continue;
            }
            Err(e) => {
                log::error!("[{}] {e}", section.name());
                continue;
            }
        }
        let worker = match registry::build_worker(&section, &queue) {
            Ok(w) => w,
            Err(e) => {
                log::error!("[{}] skipped: {e}", section.name());
                continue;
            }
        };
        if let Err(e) = supervisor.spawn(worker) {
            log::error!("[{}] cannot start thread: {e}", section.name());
        }
    }

    if supervisor.is_empty() {
        log::error!("no worker started from {}", config_path.display());
        std::process::exit(1);
    }
    log::info!(
        "metricol {} running {} worker(s): {}",
        metricol_core::VERSION,
        supervisor.len(),
        supervisor.names().join(", ")
    );

    if shutdown_rx.recv().is_err() {
        log::warn!("signal channel closed");
    }
    log::info!("shutting down...");
    supervisor.stop_all();
    let joined = supervisor.join_all();
    log::info!("{joined} worker(s) stopped");
    std::process::exit(0);
}
