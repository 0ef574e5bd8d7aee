//! The polling service loop.
//!
//! Single-threaded and cooperative: one drain cycle, then sleep. The only
//! cancellation point is the signal flag checked between cycles. A failed
//! cycle is reported loudly on stderr and the loop carries on; only startup
//! failures (missing credentials, unreachable session, broken store) keep
//! the loop from starting at all.

use qa_core::config::QaConfig;
use qa_transport::ChatTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::executor::run_cycle;
use crate::service::QaService;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to register shutdown signal handler: {source}")]
    Signal {
        #[source]
        source: std::io::Error,
    },
}

/// Register SIGINT/SIGTERM to flip a shared shutdown flag.
pub fn install_shutdown_flag() -> Result<Arc<AtomicBool>, DaemonError> {
    let flag = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&flag))
            .map_err(|source| DaemonError::Signal { source })?;
    }
    Ok(flag)
}

/// Run drain cycles until the shutdown flag is set (or once, for
/// `--once`). The transport session must already be verified.
pub fn run_service_loop(
    service: &QaService,
    transport: &dyn ChatTransport,
    config: &QaConfig,
    shutdown: &AtomicBool,
    once: bool,
) {
    let poll = Duration::from_secs(config.daemon.poll_interval_secs.max(1));

    loop {
        if shutdown.load(Ordering::SeqCst) {
            eprintln!("[qad] shutdown requested, stopping");
            break;
        }

        match run_cycle(service, transport, config) {
            Ok(outcome) => {
                if outcome.activity() > 0 {
                    eprintln!(
                        "[qad] cycle: {} drained, {} applied, {} discarded, {} errors, {} observed",
                        outcome.drained,
                        outcome.applied,
                        outcome.discarded,
                        outcome.errors,
                        outcome.observed
                    );
                }
            }
            Err(err) => {
                // Storage or logbook trouble: the cycle is abandoned but
                // the process keeps polling.
                eprintln!("[qad] cycle failed: {err}");
            }
        }

        if once {
            break;
        }
        thread::sleep(poll);
    }
}
