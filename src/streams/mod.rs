//! Stream supervision: three polling loops (mod log, new posts, inbox)
//! sharing one stop signal.
//!
//! Error handling is uniform across the loops: a fatal platform error
//! (revoked credentials, lost moderator access) triggers the shared stop
//! signal and ends every loop; a rate limit suspends only the loop that
//! hit it; anything else is logged and retried on the next poll cycle.

mod inbox;
mod modlog;
mod posts;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::config::BotContext;
use crate::error::Error;

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

/// Shared shutdown flag for the stream loops. Set once, by whichever loop
/// (or signal handler) first decides the process must stop.
#[derive(Clone)]
pub struct StopSignal(Arc<AtomicU8>);

impl StopSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(RUNNING)))
    }

    /// Ask every loop to finish its current batch and exit.
    pub fn trigger(&self) {
        let _ = self
            .0
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.0.load(Ordering::SeqCst) != RUNNING
    }

    fn mark_stopped(&self) {
        self.0.store(STOPPED, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst) == STOPPED
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the three stream loops and waits for all of them to finish.
pub struct Supervisor {
    ctx: Arc<BotContext>,
}

impl Supervisor {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    /// Run until every loop has exited, whether by interrupt, an `exit`
    /// inbox command, or a fatal platform error.
    pub async fn run(self) {
        let stop = StopSignal::new();

        {
            let stop = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, stopping streams");
                    stop.trigger();
                }
            });
        }

        let handles = vec![
            tokio::spawn(modlog::run(self.ctx.clone(), stop.clone())),
            tokio::spawn(posts::run(self.ctx.clone(), stop.clone())),
            tokio::spawn(inbox::run(self.ctx.clone(), stop.clone())),
        ];

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Stream task panicked");
            }
        }
        stop.mark_stopped();
        info!("All streams stopped");
    }
}

/// One iteration's outcome, as seen by the shared loop driver.
enum LoopStep {
    Continue,
    Stop,
}

/// Classify a poll error and react: trigger shutdown on fatal errors,
/// sleep through platform rate limits, log and carry on otherwise.
async fn handle_poll_error(stream: &str, e: Error, stop: &StopSignal) -> LoopStep {
    if e.is_fatal() {
        error!(stream, error = %e, "Fatal error, shutting down");
        stop.trigger();
        return LoopStep::Stop;
    }
    if let Some(wait) = e.retry_after() {
        warn!(stream, error = %e, wait_secs = wait.as_secs(), "Rate limited, suspending stream");
        tokio::time::sleep(wait).await;
        return LoopStep::Continue;
    }
    warn!(stream, error = %e, "Poll failed, will retry next cycle");
    LoopStep::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_is_set_once() {
        let stop = StopSignal::new();
        assert!(!stop.is_stopping());
        stop.trigger();
        assert!(stop.is_stopping());
        assert!(!stop.is_stopped());

        let clone = stop.clone();
        clone.trigger();
        assert!(stop.is_stopping());

        stop.mark_stopped();
        assert!(stop.is_stopped());
        // A late trigger cannot regress the state.
        stop.trigger();
        assert!(stop.is_stopped());
    }
}
