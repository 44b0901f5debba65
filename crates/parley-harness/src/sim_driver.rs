//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the terminal driver but talks
//! to a [`SharedSimServer`] in memory. It implements [`Driver`] so the same
//! [`parley_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! Transports open instantly: `open_transport` queues an `Opened` event (or
//! `Failed` while the server is unreachable), and every frame the server
//! queues for the session comes back out of `recv_transport` in order.

use std::collections::VecDeque;

use parley_app::{ChatView, Driver, Intent};
use parley_client::{Environment, TransportEvent, TransportId};
use parley_proto::{Frame, Payload, RoomId, payloads::message::MessageRecord};

use crate::{
    SharedSimServer, SimEnv, SimInstant,
    invariants::{ClientSnapshot, InvariantRegistry, SnapshotHistory, SystemSnapshot},
    sim_server::SessionId,
};

/// Error type for simulation driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    id: u64,
    server: SharedSimServer,
    env: SimEnv,
    intents: VecDeque<Intent>,
    pending: VecDeque<TransportEvent>,
    session: Option<(TransportId, SessionId)>,
    sent: Vec<Frame>,
    views: Vec<ChatView>,
    invariants: Option<InvariantRegistry>,
    history: SnapshotHistory,
    stopped: bool,
}

impl SimDriver {
    /// Create a driver for simulated client `id`.
    pub fn new(id: u64, server: SharedSimServer, env: SimEnv) -> Self {
        Self {
            id,
            server,
            env,
            intents: VecDeque::new(),
            pending: VecDeque::new(),
            session: None,
            sent: Vec::new(),
            views: Vec::new(),
            invariants: None,
            history: SnapshotHistory::new(),
            stopped: false,
        }
    }

    /// Enable invariant checking on every render.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Queue a user intent.
    pub fn push_intent(&mut self, intent: Intent) {
        self.intents.push_back(intent);
    }

    /// Queue several user intents.
    pub fn push_intents(&mut self, intents: impl IntoIterator<Item = Intent>) {
        self.intents.extend(intents);
    }

    /// Drop the connection from the server side.
    ///
    /// The client sees the transport close on its next receive.
    pub fn sever(&mut self) {
        if let Some((_, session_id)) = self.session {
            self.server.lock().close(session_id);
        }
    }

    /// True when there is nothing left to process: no queued intent, no
    /// pending transport event and no frame waiting on the server.
    pub fn is_idle(&self) -> bool {
        if !self.intents.is_empty() || !self.pending.is_empty() {
            return false;
        }
        let Some((_, session_id)) = self.session else {
            return true;
        };
        let server = self.server.lock();
        server.is_open(session_id) && !server.has_mail(session_id)
    }

    /// Server session of the live transport.
    pub fn session(&self) -> Option<SessionId> {
        self.session.map(|(_, session_id)| session_id)
    }

    /// Every frame the client has sent, in order.
    pub fn sent_frames(&self) -> &[Frame] {
        &self.sent
    }

    /// Decoded payloads of every frame the client has sent.
    pub fn sent_payloads(&self) -> Vec<Payload> {
        self.sent.iter().filter_map(|f| Payload::from_frame(f).ok()).collect()
    }

    /// Every view rendered so far.
    pub fn views(&self) -> &[ChatView] {
        &self.views
    }

    /// Most recent view, if anything was rendered.
    pub fn last_view(&self) -> Option<&ChatView> {
        self.views.last()
    }

    /// True once the runtime has stopped the driver.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn check_invariants(&mut self, view: &ChatView) -> Result<(), SimDriverError> {
        let Some(registry) = &self.invariants else {
            return Ok(());
        };

        let mut snapshot = ClientSnapshot::from_view(self.id, view);
        self.history.record(&mut snapshot);
        registry.check_all(&SystemSnapshot::single(snapshot)).map_err(|violations| {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            SimDriverError(format!("client {}: {}", self.id, messages.join("; ")))
        })
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_intent(&mut self) -> Result<Option<Intent>, Self::Error> {
        Ok(self.intents.pop_front())
    }

    async fn open_transport(&mut self, transport: TransportId) {
        let opened = self.server.lock().open();
        match opened {
            Some(session_id) => {
                self.session = Some((transport, session_id));
                self.pending.push_back(TransportEvent::Opened { transport });
            },
            None => {
                let reason = "connection refused".to_string();
                self.pending.push_back(TransportEvent::Failed { transport, reason });
            },
        }
    }

    fn dispose_transport(&mut self, transport: TransportId) {
        if let Some((current, session_id)) = self.session
            && current == transport
        {
            self.server.lock().close(session_id);
            self.session = None;
        }
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let Some((_, session_id)) = self.session else {
            return Err(SimDriverError("no open transport".to_string()));
        };

        let mut server = self.server.lock();
        if !server.is_open(session_id) {
            return Err(SimDriverError("transport closed".to_string()));
        }
        server.receive(session_id, &frame);
        drop(server);

        self.sent.push(frame);
        Ok(())
    }

    async fn recv_transport(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        let (transport, session_id) = self.session?;
        let mut server = self.server.lock();
        if let Some(frame) = server.take(session_id) {
            return Some(TransportEvent::Frame { transport, frame });
        }

        if server.is_open(session_id) {
            None
        } else {
            drop(server);
            self.session = None;
            Some(TransportEvent::Closed { transport, reason: "closed by server".to_string() })
        }
    }

    async fn fetch_history(&mut self, room_id: RoomId) -> Result<Vec<MessageRecord>, Self::Error> {
        self.server
            .lock()
            .history(room_id)
            .ok_or_else(|| SimDriverError(format!("room {room_id} not found")))
    }

    fn now(&self) -> SimInstant {
        self.env.now()
    }

    fn render(&mut self, view: &ChatView) -> Result<(), Self::Error> {
        self.check_invariants(view)?;
        self.views.push(view.clone());
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((_, session_id)) = self.session.take() {
            self.server.lock().close(session_id);
        }
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use parley_client::{Client, ClientAction, ClientConfig, ClientEvent};
    use parley_proto::payloads::session::Hello;

    use super::*;
    use crate::SimServer;

    fn driver() -> SimDriver {
        let env = SimEnv::new();
        let server = SharedSimServer::new(SimServer::new(env.clone()));
        SimDriver::new(0, server, env)
    }

    #[test]
    fn push_intent_queues() {
        let mut driver = driver();
        assert!(driver.is_idle());

        driver.push_intent(Intent::Keystroke);
        assert!(!driver.is_idle());
    }

    #[tokio::test]
    async fn open_reports_opened() {
        let mut driver = driver();
        let mut client = Client::new(SimEnv::new(), ClientConfig::default());
        let actions = client.handle(ClientEvent::Connect { token: "t".into() }).unwrap();
        let transport = actions
            .iter()
            .find_map(|a| match a {
                ClientAction::OpenTransport { transport } => Some(*transport),
                _ => None,
            })
            .unwrap();

        driver.open_transport(transport).await;

        assert_eq!(driver.recv_transport().await, Some(TransportEvent::Opened { transport }));
        assert!(driver.session().is_some());
    }

    #[tokio::test]
    async fn unreachable_server_fails_open() {
        let mut driver = driver();
        driver.server.lock().set_reachable(false);
        let mut client = Client::new(SimEnv::new(), ClientConfig::default());
        let actions = client.handle(ClientEvent::Connect { token: "t".into() }).unwrap();
        let Some(ClientAction::OpenTransport { transport }) = actions.last().cloned() else {
            panic!("connect should open a transport: {actions:?}");
        };

        driver.open_transport(transport).await;

        assert!(matches!(
            driver.recv_transport().await,
            Some(TransportEvent::Failed { reason, .. }) if reason == "connection refused"
        ));
    }

    #[tokio::test]
    async fn send_without_transport_fails() {
        let mut driver = driver();
        let frame = Payload::Hello(Hello { version: 1, token: "t".into() }).into_frame(None).unwrap();

        assert!(driver.send_frame(frame).await.is_err());
        assert!(driver.sent_frames().is_empty());
    }
}
