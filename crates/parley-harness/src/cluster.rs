//! Synchronous multi-client simulation.
//!
//! `SimCluster` drives several [`Client`]s against one [`SimServer`] without
//! an async runtime: client actions are executed inline, and transport
//! events are delivered one at a time when the test asks for them. Tests
//! choose the interleaving, which is what property-based tests need to
//! explore reorderings.

use std::collections::VecDeque;

use parley_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, Environment, RoomId,
    TransportEvent, TransportId, UserId,
};

use crate::{
    SimEnv, SimInstant, SimServer,
    invariants::{ClientSnapshot, InvariantRegistry, SnapshotHistory, SystemSnapshot, Violation},
    sim_server::SessionId,
};

/// Upper bound on deliveries in [`SimCluster::settle`].
const MAX_SETTLE_DELIVERIES: usize = 100_000;

struct Member {
    client: Client<SimEnv>,
    token: String,
    session: Option<(TransportId, SessionId)>,
    pending: VecDeque<TransportEvent>,
    history: SnapshotHistory,
}

/// Several clients sharing one in-memory server and one virtual clock.
pub struct SimCluster {
    env: SimEnv,
    server: SimServer,
    members: Vec<Member>,
}

impl SimCluster {
    /// One client per `(user_id, username)`, all able to join `rooms`.
    ///
    /// Client `i` authenticates with [`SimCluster::token`]`(user_id)`.
    pub fn new(seed: u64, users: &[(UserId, &str)], rooms: &[RoomId]) -> Self {
        Self::with_config(seed, users, rooms, &ClientConfig::default())
    }

    /// Like [`SimCluster::new`] with a custom client configuration.
    pub fn with_config(
        seed: u64,
        users: &[(UserId, &str)],
        rooms: &[RoomId],
        config: &ClientConfig,
    ) -> Self {
        let env = SimEnv::with_seed(seed);
        let mut server = SimServer::new(env.clone());
        for &room_id in rooms {
            server.create_room(room_id);
        }

        let members = users
            .iter()
            .map(|&(user_id, username)| {
                let token = Self::token(user_id);
                server.register_user(token.clone(), user_id, username);
                Member {
                    client: Client::new(env.clone(), config.clone()),
                    token,
                    session: None,
                    pending: VecDeque::new(),
                    history: SnapshotHistory::new(),
                }
            })
            .collect();

        Self { env, server, members }
    }

    /// Token the server accepts for `user_id`.
    pub fn token(user_id: UserId) -> String {
        format!("token-{user_id}")
    }

    /// Number of clients.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if the cluster has no clients.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Client `index`.
    pub fn client(&self, index: usize) -> &Client<SimEnv> {
        &self.members[index].client
    }

    /// The server.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Mutable server, for fault injection.
    pub fn server_mut(&mut self) -> &mut SimServer {
        &mut self.server
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Connect client `index` with its registered token.
    pub fn connect(&mut self, index: usize) -> Result<Vec<ClientAction>, ClientError> {
        let token = self.members[index].token.clone();
        self.handle(index, ClientEvent::Connect { token })
    }

    /// Hand `event` to client `index` and execute the resulting actions.
    ///
    /// Returns the actions the driver itself does not consume (status
    /// changes, failures, logs, state changes), including those produced by
    /// history results fed back in.
    pub fn handle(
        &mut self,
        index: usize,
        event: ClientEvent<SimInstant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let actions = self.members[index].client.handle(event)?;
        Ok(self.execute(index, actions))
    }

    /// Deliver one transport event to client `index`. Returns `false` if
    /// nothing was waiting.
    pub fn deliver_one(&mut self, index: usize) -> bool {
        let Some(event) = self.next_transport_event(index) else {
            return false;
        };
        let actions = self.members[index].client.handle(ClientEvent::Transport(event));
        if let Ok(actions) = actions {
            self.execute(index, actions);
        }
        true
    }

    /// Deliver everything to everyone, round robin, until quiet.
    ///
    /// Returns `false` if the cluster was still busy after a large number
    /// of deliveries.
    pub fn settle(&mut self) -> bool {
        for _ in 0..MAX_SETTLE_DELIVERIES {
            let mut delivered = false;
            for index in 0..self.members.len() {
                delivered |= self.deliver_one(index);
            }
            if !delivered {
                return true;
            }
        }
        tracing::warn!(seed = self.env.seed(), "cluster did not settle");
        false
    }

    /// Advance the clock and tick every client.
    pub fn advance(&mut self, by: std::time::Duration) {
        self.env.advance(by);
        let now = self.env.now();
        for index in 0..self.members.len() {
            if let Ok(actions) = self.members[index].client.handle(ClientEvent::Tick { now }) {
                self.execute(index, actions);
            }
        }
    }

    /// Drop client `index`'s connection from the server side.
    pub fn sever(&mut self, index: usize) {
        if let Some((_, session_id)) = self.members[index].session {
            self.server.close(session_id);
        }
    }

    /// Snapshot every client, carrying per-client history forward.
    pub fn snapshot(&mut self) -> SystemSnapshot {
        let clients = self
            .members
            .iter_mut()
            .enumerate()
            .map(|(index, member)| {
                let mut snapshot = ClientSnapshot::from_client(index as u64, &member.client);
                member.history.record(&mut snapshot);
                snapshot
            })
            .collect();
        SystemSnapshot::from_clients(clients)
    }

    /// Check `registry` against a fresh snapshot.
    pub fn check(&mut self, registry: &InvariantRegistry) -> Result<(), Vec<Violation>> {
        let snapshot = self.snapshot();
        registry.check_all(&snapshot)
    }

    fn next_transport_event(&mut self, index: usize) -> Option<TransportEvent> {
        let member = &mut self.members[index];
        if let Some(event) = member.pending.pop_front() {
            return Some(event);
        }

        let (transport, session_id) = member.session?;
        if let Some(frame) = self.server.take(session_id) {
            return Some(TransportEvent::Frame { transport, frame });
        }
        if self.server.is_open(session_id) {
            return None;
        }

        member.session = None;
        Some(TransportEvent::Closed { transport, reason: "closed by server".to_string() })
    }

    fn execute(&mut self, index: usize, actions: Vec<ClientAction>) -> Vec<ClientAction> {
        let mut queue: VecDeque<ClientAction> = actions.into();
        let mut surfaced = Vec::new();

        while let Some(action) = queue.pop_front() {
            let member = &mut self.members[index];
            match action {
                ClientAction::OpenTransport { transport } => match self.server.open() {
                    Some(session_id) => {
                        member.session = Some((transport, session_id));
                        member.pending.push_back(TransportEvent::Opened { transport });
                    },
                    None => member.pending.push_back(TransportEvent::Failed {
                        transport,
                        reason: "connection refused".to_string(),
                    }),
                },
                ClientAction::DisposeTransport { transport } => {
                    if let Some((current, session_id)) = member.session
                        && current == transport
                    {
                        self.server.close(session_id);
                        member.session = None;
                    }
                },
                ClientAction::Send(frame) => {
                    if let Some((_, session_id)) = member.session {
                        self.server.receive(session_id, &frame);
                    }
                },
                ClientAction::FetchHistory { room_id, epoch } => {
                    let event = match self.server.history(room_id) {
                        Some(messages) => ClientEvent::HistoryLoaded { room_id, epoch, messages },
                        None => ClientEvent::HistoryFailed {
                            room_id,
                            epoch,
                            reason: format!("room {room_id} not found"),
                        },
                    };
                    if let Ok(more) = member.client.handle(event) {
                        queue.extend(more);
                    }
                },
                other => surfaced.push(other),
            }
        }

        surfaced
    }
}

#[cfg(test)]
mod tests {
    use parley_client::ConnectionStatus;

    use super::*;

    #[test]
    fn clients_connect_and_see_each_other() {
        let mut cluster = SimCluster::new(1, &[(1, "ada"), (2, "bob")], &[10]);
        cluster.connect(0).unwrap();
        cluster.connect(1).unwrap();
        assert!(cluster.settle());

        for index in 0..2 {
            let client = cluster.client(index);
            assert_eq!(client.status(), ConnectionStatus::Connected);
            assert!(client.is_online(1));
            assert!(client.is_online(2));
        }
    }

    #[test]
    fn message_reaches_the_room() {
        let mut cluster = SimCluster::new(1, &[(1, "ada"), (2, "bob")], &[10]);
        for index in 0..2 {
            cluster.connect(index).unwrap();
        }
        cluster.settle();
        for index in 0..2 {
            cluster.handle(index, ClientEvent::SelectRoom(Some(10))).unwrap();
        }

        cluster.handle(0, ClientEvent::SendMessage { content: "hello".into() }).unwrap();
        cluster.settle();

        let seen = &cluster.client(1).messages()[0];
        assert_eq!(seen.content, "hello");
        assert_eq!(seen.readers.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(cluster.client(0).messages()[0].readers, seen.readers);
        assert!(cluster.check(&InvariantRegistry::standard()).is_ok());
    }
}
