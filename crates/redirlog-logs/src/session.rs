//! Viewer session lifecycle.
//!
//! A session moves `Connecting -> Active -> Closed`. It attaches to the
//! [`BroadcastHub`], flushes the backlog, then forwards live entries while
//! probing the viewer for liveness. Whatever ends the session, the hub
//! registration is removed exactly once, after the state turns `Closed`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use redirlog_types::LogEntry;

use crate::error::SessionError;
use crate::hub::{BroadcastHub, SessionId};

/// Frame sent to a viewer
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Entry(Arc<LogEntry>),
    Probe,
}

/// Signal received from a viewer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Answer to a liveness probe
    ProbeReply,
    /// Any other message; ignored apart from counting as a sign of life
    Message,
    /// The viewer closed the connection
    Close,
}

/// Sending half of a viewer connection
pub trait ViewerSink: Send {
    fn send(&mut self, frame: Outbound) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Receiving half of a viewer connection.
///
/// `None` means the connection is gone.
pub trait ViewerSource: Send {
    fn recv(&mut self) -> impl Future<Output = Option<Inbound>> + Send;
}

/// Session timing
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Upper bound on one frame send
    pub send_timeout: Duration,

    /// Silence after which a probe is sent
    pub probe_interval: Duration,

    /// Unanswered probes tolerated before the session closes
    pub max_missed_probes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(1),
            probe_interval: Duration::from_secs(5),
            max_missed_probes: 2,
        }
    }
}

/// Why a session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    SendFailed,
    SendTimeout,
    ProbeTimeout,
    ViewerDisconnected,
    /// The hub dropped the session
    Detached,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed(CloseReason),
}

/// Deregisters from the hub when dropped, whichever path ends the session
struct DetachGuard {
    hub: BroadcastHub,
    id: SessionId,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        self.hub.detach(self.id);
    }
}

/// One live viewer connection
pub struct ViewerSession<S, R> {
    hub: BroadcastHub,
    sink: S,
    source: R,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
}

impl<S: ViewerSink, R: ViewerSource> ViewerSession<S, R> {
    pub fn new(hub: BroadcastHub, sink: S, source: R, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            hub,
            sink,
            source,
            config,
            state,
        }
    }

    /// Watch the session's state transitions
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Drive the session until it closes
    pub async fn run(mut self) -> CloseReason {
        let attachment = match self.hub.attach().await {
            Ok(attachment) => attachment,
            Err(_) => {
                self.state
                    .send_replace(SessionState::Closed(CloseReason::Shutdown));
                return CloseReason::Shutdown;
            }
        };
        let id = attachment.id;
        let _guard = DetachGuard {
            hub: self.hub.clone(),
            id,
        };

        let reason = self.serve(attachment.backlog, attachment.entries, attachment.cancel).await;

        info!(session = %id, ?reason, "viewer session closed");
        self.state.send_replace(SessionState::Closed(reason));
        reason
    }

    async fn serve(
        &mut self,
        backlog: Vec<Arc<LogEntry>>,
        mut entries: mpsc::Receiver<Arc<LogEntry>>,
        cancel: CancellationToken,
    ) -> CloseReason {
        let send_timeout = self.config.send_timeout;
        let probe_interval = self.config.probe_interval;

        for entry in backlog {
            if let Err(reason) = send_frame(&mut self.sink, Outbound::Entry(entry), send_timeout).await
            {
                return reason;
            }
        }
        self.state.send_replace(SessionState::Active);

        let mut missed_probes = 0u32;
        let probe_timer = tokio::time::sleep(probe_interval);
        tokio::pin!(probe_timer);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return if self.hub.is_shut_down() {
                        CloseReason::Shutdown
                    } else {
                        CloseReason::Detached
                    };
                }

                entry = entries.recv() => {
                    let Some(entry) = entry else {
                        return CloseReason::Detached;
                    };
                    if let Err(reason) = send_frame(&mut self.sink, Outbound::Entry(entry), send_timeout).await {
                        return reason;
                    }
                }

                signal = self.source.recv() => {
                    match signal {
                        None | Some(Inbound::Close) => return CloseReason::ViewerDisconnected,
                        Some(_) => {
                            missed_probes = 0;
                            probe_timer.as_mut().reset(Instant::now() + probe_interval);
                        }
                    }
                }

                () = &mut probe_timer => {
                    if missed_probes >= self.config.max_missed_probes {
                        return CloseReason::ProbeTimeout;
                    }
                    if let Err(reason) = send_frame(&mut self.sink, Outbound::Probe, send_timeout).await {
                        return reason;
                    }
                    missed_probes += 1;
                    debug!(missed_probes, "liveness probe sent");
                    probe_timer.as_mut().reset(Instant::now() + probe_interval);
                }
            }
        }
    }
}

async fn send_frame<S: ViewerSink>(
    sink: &mut S,
    frame: Outbound,
    send_timeout: Duration,
) -> Result<(), CloseReason> {
    match tokio::time::timeout(send_timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(error = %e, "viewer send failed");
            Err(CloseReason::SendFailed)
        }
        Err(_) => Err(CloseReason::SendTimeout),
    }
}
