//! Model-based tests: random operation sequences against the simulated
//! server, with the server as the oracle.
//!
//! Operations include partial delivery, so frames from a room the client has
//! already left, handshakes racing room switches, and connections severed
//! mid-flight all come up. After every operation the standard invariants must
//! hold for every client. Once the cluster settles, every connected client
//! must show exactly the server's messages for its active room.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use parley_client::{
    Client, ClientEvent, ConnectionStatus, Message, MessageId, RoomId, UserId,
};
use parley_harness::{InvariantRegistry, SimCluster, SimEnv};
use proptest::{prelude::*, test_runner::TestCaseError};

const USERS: [(UserId, &str); 3] = [(1, "ada"), (2, "bob"), (3, "cy")];
const ROOMS: [RoomId; 2] = [10, 20];

#[derive(Debug, Clone)]
enum Op {
    Connect(usize),
    Disconnect(usize),
    Sever(usize),
    Select(usize, Option<RoomId>),
    Send(usize, u8),
    Edit(usize, u8),
    Delete(usize, u8),
    Keystroke(usize),
    Deliver(usize, u8),
    Advance(u16),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let client = 0..USERS.len();
    let room = prop_oneof![Just(None), Just(Some(ROOMS[0])), Just(Some(ROOMS[1]))];
    prop_oneof![
        3 => client.clone().prop_map(Op::Connect),
        1 => client.clone().prop_map(Op::Disconnect),
        1 => client.clone().prop_map(Op::Sever),
        3 => (client.clone(), room).prop_map(|(i, r)| Op::Select(i, r)),
        5 => (client.clone(), 0u8..6).prop_map(|(i, n)| Op::Send(i, n)),
        2 => (client.clone(), any::<u8>()).prop_map(|(i, n)| Op::Edit(i, n)),
        1 => (client.clone(), any::<u8>()).prop_map(|(i, n)| Op::Delete(i, n)),
        2 => client.clone().prop_map(Op::Keystroke),
        6 => (client, 1u8..10).prop_map(|(i, n)| Op::Deliver(i, n)),
        2 => (0u16..3_000).prop_map(Op::Advance),
    ]
}

/// One of the client's own live messages, chosen by `pick`.
fn own_message(client: &Client<SimEnv>, pick: u8) -> Option<MessageId> {
    let me = client.identity()?.user_id;
    let own: Vec<_> = client
        .messages()
        .iter()
        .filter(|m| m.author_id == me && !m.is_deleted)
        .filter_map(Message::id)
        .collect();
    (!own.is_empty()).then(|| own[pick as usize % own.len()])
}

/// Intent errors are expected here (sending with no room, editing while
/// disconnected); only the resulting state matters.
fn apply(cluster: &mut SimCluster, op: &Op) {
    match *op {
        Op::Connect(i) => {
            let _ = cluster.connect(i);
        },
        Op::Disconnect(i) => {
            let _ = cluster.handle(i, ClientEvent::Disconnect);
        },
        Op::Sever(i) => cluster.sever(i),
        Op::Select(i, room) => {
            let _ = cluster.handle(i, ClientEvent::SelectRoom(room));
        },
        Op::Send(i, n) => {
            let _ = cluster.handle(i, ClientEvent::SendMessage { content: format!("m{n}") });
        },
        Op::Edit(i, n) => {
            if let Some(message_id) = own_message(cluster.client(i), n) {
                let content = format!("e{n}");
                let _ = cluster.handle(i, ClientEvent::EditMessage { message_id, content });
            }
        },
        Op::Delete(i, n) => {
            if let Some(message_id) = own_message(cluster.client(i), n) {
                let _ = cluster.handle(i, ClientEvent::DeleteMessage { message_id });
            }
        },
        Op::Keystroke(i) => {
            let _ = cluster.handle(i, ClientEvent::Keystroke);
        },
        Op::Deliver(i, n) => {
            for _ in 0..n {
                cluster.deliver_one(i);
            }
        },
        Op::Advance(ms) => cluster.advance(Duration::from_millis(u64::from(ms))),
    }
}

type MessageView = (String, bool, BTreeSet<UserId>);

fn assert_converged(cluster: &SimCluster) -> Result<(), TestCaseError> {
    for index in 0..cluster.len() {
        let client = cluster.client(index);
        let (ConnectionStatus::Connected, Some(room_id)) = (client.status(), client.active_room())
        else {
            continue;
        };

        let seen: BTreeMap<MessageId, MessageView> = client
            .messages()
            .iter()
            .filter_map(|m| Some((m.id()?, (m.content.clone(), m.is_deleted, m.readers.clone()))))
            .collect();
        let truth: BTreeMap<MessageId, MessageView> = cluster
            .server()
            .messages(room_id)
            .iter()
            .map(|r| (r.id, (r.content.clone(), r.is_deleted, r.readers.iter().copied().collect())))
            .collect();

        prop_assert_eq!(seen, truth, "client {} in room {}", index, room_id);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_and_views_converge(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..80),
    ) {
        let registry = InvariantRegistry::standard();
        let mut cluster = SimCluster::new(seed, &USERS, &ROOMS);

        for (step, op) in ops.iter().enumerate() {
            apply(&mut cluster, op);
            if let Err(violations) = cluster.check(&registry) {
                prop_assert!(false, "step {} {:?}: {:?}", step, op, violations);
            }
        }

        prop_assert!(cluster.settle());
        if let Err(violations) = cluster.check(&registry) {
            prop_assert!(false, "after settle: {:?}", violations);
        }
        assert_converged(&cluster)?;
    }

    #[test]
    fn everyone_converges_after_reconnecting(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let mut cluster = SimCluster::new(seed, &USERS, &ROOMS);
        for op in &ops {
            apply(&mut cluster, op);
        }

        for index in 0..cluster.len() {
            let _ = cluster.connect(index);
            let _ = cluster.handle(index, ClientEvent::SelectRoom(Some(ROOMS[0])));
        }
        prop_assert!(cluster.settle());

        for index in 0..cluster.len() {
            prop_assert_eq!(cluster.client(index).status(), ConnectionStatus::Connected);
        }
        assert_converged(&cluster)?;
    }
}

#[test]
fn stale_edit_from_earlier_visit_does_not_win() {
    let mut cluster = SimCluster::new(3, &USERS[..2], &ROOMS);
    for index in 0..2 {
        cluster.connect(index).unwrap();
        cluster.handle(index, ClientEvent::SelectRoom(Some(10))).unwrap();
    }
    cluster.settle();

    cluster.handle(0, ClientEvent::SendMessage { content: "draft".into() }).unwrap();
    cluster.settle();
    cluster.handle(0, ClientEvent::EditMessage { message_id: 1, content: "v1".into() }).unwrap();

    // Bob leaves and comes back with the first edit still queued.
    cluster.handle(1, ClientEvent::SelectRoom(Some(20))).unwrap();
    cluster.handle(0, ClientEvent::EditMessage { message_id: 1, content: "v2".into() }).unwrap();
    cluster.handle(1, ClientEvent::SelectRoom(Some(10))).unwrap();
    assert_eq!(cluster.client(1).messages()[0].content, "v2");

    cluster.settle();
    assert_eq!(cluster.client(1).messages()[0].content, "v2");
}
