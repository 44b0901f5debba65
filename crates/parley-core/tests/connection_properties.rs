//! Property-based tests for the connection manager.
//!
//! Arbitrary sequences of connect, disconnect, transport events (for current
//! and stale transports) and timer ticks. Verifies:
//! - At most one transport is held at a time, and it is the manager's
//! - Events for any other transport change nothing
//! - An identity exists exactly while connected

use std::{
    collections::BTreeSet,
    time::{Duration, Instant},
};

use parley_core::{
    ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionStatus, TransportEvent,
    TransportId,
};
use parley_proto::{
    Payload,
    payloads::session::{ConnectError, HelloReply},
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Connect,
    Disconnect,
    Opened { pick: usize },
    Reply { pick: usize },
    Reject { pick: usize },
    Close { pick: usize },
    Advance { secs: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Connect),
        1 => Just(Op::Disconnect),
        3 => any::<usize>().prop_map(|pick| Op::Opened { pick }),
        3 => any::<usize>().prop_map(|pick| Op::Reply { pick }),
        1 => any::<usize>().prop_map(|pick| Op::Reject { pick }),
        2 => any::<usize>().prop_map(|pick| Op::Close { pick }),
        2 => (0u64..15).prop_map(|secs| Op::Advance { secs }),
    ]
}

fn frame_event(transport: TransportId, payload: Payload) -> TransportEvent {
    let frame = payload.into_frame(None).expect("session payload encodes");
    TransportEvent::Frame { transport, frame }
}

proptest! {
    #[test]
    fn prop_single_transport_and_stale_events_are_inert(
        ops in prop::collection::vec(op_strategy(), 0..60),
    ) {
        let mut now = Instant::now();
        let mut manager: ConnectionManager = ConnectionManager::new(ConnectionConfig::default());
        let mut issued: Vec<TransportId> = Vec::new();
        let mut held: BTreeSet<TransportId> = BTreeSet::new();

        for op in &ops {
            let event = match op {
                Op::Connect | Op::Disconnect | Op::Advance { .. } => None,
                Op::Opened { pick }
                | Op::Reply { pick }
                | Op::Reject { pick }
                | Op::Close { pick } => {
                    if issued.is_empty() {
                        continue;
                    }
                    let transport = issued[pick % issued.len()];
                    Some(match op {
                        Op::Opened { .. } => TransportEvent::Opened { transport },
                        Op::Reply { .. } => frame_event(
                            transport,
                            Payload::HelloReply(HelloReply {
                                user_id: 3,
                                username: "me".into(),
                                session_id: 1,
                            }),
                        ),
                        Op::Reject { .. } => frame_event(
                            transport,
                            Payload::ConnectError(ConnectError { reason: "denied".into() }),
                        ),
                        _ => TransportEvent::Closed { transport, reason: "peer".into() },
                    })
                },
            };

            let status_before = manager.status();
            let actions = match (op, event) {
                (Op::Connect, _) => manager.connect("token", now),
                (Op::Disconnect, _) => manager.disconnect(),
                (Op::Advance { secs }, _) => {
                    now += Duration::from_secs(*secs);
                    manager.tick(now)
                },
                (_, Some(event)) => {
                    let stale = Some(event.transport()) != manager.transport();
                    let actions = manager.handle_transport(event, now);
                    if stale {
                        prop_assert!(actions.is_empty());
                        prop_assert_eq!(manager.status(), status_before);
                    }
                    actions
                },
                (_, None) => Vec::new(),
            };

            for action in &actions {
                match action {
                    ConnectionAction::OpenTransport { transport } => {
                        prop_assert!(held.is_empty(), "opened {:?} holding {:?}", transport, held);
                        issued.push(*transport);
                        held.insert(*transport);
                    },
                    ConnectionAction::DisposeTransport { transport } => {
                        prop_assert!(held.remove(transport));
                    },
                    _ => {},
                }
            }

            prop_assert!(held.len() <= 1);
            prop_assert_eq!(held.iter().next().copied(), manager.transport());
            prop_assert_eq!(
                manager.identity().is_some(),
                manager.status() == ConnectionStatus::Connected
            );
        }
    }
}
