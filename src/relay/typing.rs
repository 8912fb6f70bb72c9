//! "Typing" indicator kept alive while a reply is being produced.
//!
//! Every session opens its own signalling connection and runs one task that
//! re-sends the typing signal each period until the session is stopped. The
//! task owns the connection and always closes it on the way out.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::backend::{SignalChannel, SignalConnection};
use crate::error::Result;
use crate::types::TypingTarget;

const TYPING_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on waiting for the indicator to tear down its connection.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct TypingIndicator {
    signal: Arc<dyn SignalChannel>,
    token: String,
    interval: Duration,
}

impl TypingIndicator {
    pub fn new(signal: Arc<dyn SignalChannel>, token: String) -> Self {
        Self {
            signal,
            token,
            interval: TYPING_INTERVAL,
        }
    }

    /// Starts signalling on `target` in the background.
    pub fn start(&self, target: TypingTarget) -> TypingSession {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_session(
            Arc::clone(&self.signal),
            self.token.clone(),
            target,
            self.interval,
            stop_rx,
        ));
        TypingSession { stop_tx, task }
    }
}

/// Handle to one running indicator.
///
/// Dropping the handle also ends the session: the task sees its stop channel
/// close and tears down the connection.
pub struct TypingSession {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TypingSession {
    /// Stops signalling and waits until the connection is closed, or aborts
    /// the task once [`STOP_TIMEOUT`] has passed.
    pub async fn stop(self) {
        // The task may already be gone after a signalling failure.
        let _ = self.stop_tx.send(());
        let mut task = self.task;
        match time::timeout(STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Typing indicator task ended abnormally: {e}"),
            Err(_) => {
                warn!(
                    "Typing indicator did not close within {}s, aborting it",
                    STOP_TIMEOUT.as_secs()
                );
                task.abort();
            }
        }
    }
}

async fn run_session(
    signal: Arc<dyn SignalChannel>,
    token: String,
    target: TypingTarget,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let opened = tokio::select! {
        biased;
        _ = &mut stop => return,
        opened = signal.open() => opened,
    };
    let mut connection = match opened {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Failed to open typing connection: {e}");
            return;
        }
    };

    if let Err(e) =
        signal_until_stopped(connection.as_mut(), &token, &target, interval, &mut stop).await
    {
        warn!(
            "Typing indicator for channel {} stopped early: {e}",
            target.channel_id
        );
    }

    match connection.close().await {
        Ok(()) => debug!("Typing connection for channel {} closed", target.channel_id),
        Err(e) => debug!("Failed to close typing connection: {e}"),
    }
}

/// Authenticates, then sends one signal immediately and one per `interval`
/// until `stop` fires or is dropped.
async fn signal_until_stopped(
    connection: &mut dyn SignalConnection,
    token: &str,
    target: &TypingTarget,
    interval: Duration,
    stop: &mut oneshot::Receiver<()>,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = &mut *stop => return Ok(()),
        result = connection.authenticate(token) => result?,
    }

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut *stop => return Ok(()),
            result = async {
                ticker.tick().await;
                connection.send_typing(target).await
            } => result?,
        }
    }
}
