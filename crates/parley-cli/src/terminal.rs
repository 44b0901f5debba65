//! Terminal driver for the CLI.
//!
//! Implements the [`Driver`] trait with stdin lines for intents, incremental
//! line output for rendering, and the WebSocket transport for the network.
//!
//! The runtime polls continuously, so [`TerminalDriver::recv_transport`] is
//! where the loop waits: for a frame, a line of input, or the tick interval,
//! whichever comes first.

use std::{
    collections::VecDeque,
    io::{self, Write},
    time::Duration,
};

use parley_app::{ChatView, Driver, Intent};
use parley_client::{
    Environment, TransportEvent, TransportId,
    transport::{self, ConnectedClient},
};
use parley_proto::{Frame, RoomId, payloads::message::MessageRecord};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::{HistoryStub, LineRenderer, SystemEnv};

/// Longest wait for I/O before the runtime ticks the client.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Terminal driver errors.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// I/O error writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No transport to send on.
    #[error("not connected")]
    NotConnected,
}

/// Terminal driver implementing the [`Driver`] trait.
pub struct TerminalDriver<W> {
    server_url: String,
    env: SystemEnv,
    input: mpsc::Receiver<String>,
    input_open: bool,
    intents: VecDeque<Intent>,
    pending: VecDeque<TransportEvent>,
    connection: Option<(TransportId, ConnectedClient)>,
    history: HistoryStub,
    renderer: LineRenderer,
    out: W,
    tick: Duration,
}

impl<W: Write + Send> TerminalDriver<W> {
    /// Driver connecting to `server_url`, reading lines from `input` and
    /// writing to `out`.
    pub fn new(
        server_url: impl Into<String>,
        env: SystemEnv,
        input: mpsc::Receiver<String>,
        renderer: LineRenderer,
        out: W,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            env,
            input,
            input_open: true,
            intents: VecDeque::new(),
            pending: VecDeque::new(),
            connection: None,
            history: HistoryStub::new(),
            renderer,
            out,
            tick: DEFAULT_TICK,
        }
    }

    /// Override the tick interval.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Queue an intent ahead of typed input (e.g. from command line flags).
    pub fn queue_intent(&mut self, intent: Intent) {
        self.intents.push_back(intent);
    }

    /// Output written so far.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// True while a transport is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn accept_line(&mut self, line: &str) -> Result<(), TerminalError> {
        match Intent::parse_line(line) {
            Ok(Some(intent)) => self.intents.push_back(intent),
            Ok(None) => {},
            Err(e) => {
                writeln!(self.out, "! {e}")?;
                self.out.flush()?;
            },
        }
        Ok(())
    }

    /// End of input quits, after letting the client clean up.
    fn close_input(&mut self) {
        self.input_open = false;
        self.intents.push_back(Intent::InputClosed);
        self.intents.push_back(Intent::Quit);
    }
}

impl<W: Write + Send> Driver for TerminalDriver<W> {
    type Error = TerminalError;
    type Instant = std::time::Instant;

    async fn poll_intent(&mut self) -> Result<Option<Intent>, Self::Error> {
        if self.intents.is_empty() && self.input_open {
            match self.input.try_recv() {
                Ok(line) => self.accept_line(&line)?,
                Err(TryRecvError::Empty) => {},
                Err(TryRecvError::Disconnected) => self.close_input(),
            }
        }
        Ok(self.intents.pop_front())
    }

    async fn open_transport(&mut self, transport: TransportId) {
        match transport::connect(&self.server_url).await {
            Ok(client) => {
                if let Some((_, stale)) = self.connection.replace((transport, client)) {
                    stale.stop();
                }
                self.pending.push_back(TransportEvent::Opened { transport });
            },
            Err(e) => {
                tracing::warn!(url = %self.server_url, error = %e, "connect failed");
                self.pending.push_back(TransportEvent::Failed { transport, reason: e.to_string() });
            },
        }
    }

    fn dispose_transport(&mut self, transport: TransportId) {
        if self.connection.as_ref().is_some_and(|(current, _)| *current == transport)
            && let Some((_, client)) = self.connection.take()
        {
            client.stop();
        }
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let sender = match &self.connection {
            Some((_, client)) => client.to_server.clone(),
            None => return Err(TerminalError::NotConnected),
        };
        sender.send(frame).await.map_err(|_| TerminalError::NotConnected)
    }

    async fn recv_transport(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if !self.intents.is_empty() {
            return None;
        }

        let input_open = self.input_open;
        tokio::select! {
            line = self.input.recv(), if input_open => {
                match line {
                    Some(line) => {
                        if let Err(e) = self.accept_line(&line) {
                            tracing::warn!(error = %e, "failed to report input error");
                        }
                    },
                    None => self.close_input(),
                }
                None
            },
            event = next_event(&mut self.connection) => event,
            () = tokio::time::sleep(self.tick) => None,
        }
    }

    async fn fetch_history(&mut self, room_id: RoomId) -> Result<Vec<MessageRecord>, Self::Error> {
        Ok(self.history.fetch(room_id))
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render(&mut self, view: &ChatView) -> Result<(), Self::Error> {
        self.renderer.render(view, &mut self.out)?;
        self.out.flush()?;
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((_, client)) = self.connection.take() {
            client.stop();
        }
        self.input.close();
    }
}

/// Next event on the open transport. Pending forever without one.
async fn next_event(
    connection: &mut Option<(TransportId, ConnectedClient)>,
) -> Option<TransportEvent> {
    let Some((transport, client)) = connection.as_mut() else {
        return std::future::pending().await;
    };
    let transport = *transport;
    let received = client.from_server.recv().await;

    match received {
        Some(Ok(frame)) => Some(TransportEvent::Frame { transport, frame }),
        Some(Err(e)) => {
            *connection = None;
            Some(TransportEvent::Closed { transport, reason: e.to_string() })
        },
        None => {
            *connection = None;
            Some(TransportEvent::Closed { transport, reason: "connection task ended".to_string() })
        },
    }
}
