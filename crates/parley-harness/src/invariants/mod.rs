//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must hold after every processed event,
//! whatever interleaving of wire events, intents and timer ticks produced
//! the current state.
//!
//! Observable client state is extracted into a [`SystemSnapshot`], then
//! every registered [`Invariant`] runs against it. Facts that span several
//! snapshots (tombstones seen, reader counts) are carried forward by a
//! [`SnapshotHistory`] per client.
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let mut snapshot = ClientSnapshot::from_client(0, &client);
//! history.record(&mut snapshot);
//! registry.assert_all(&SystemSnapshot::single(snapshot), "after send");
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    NoSelfTyping, ReadersMonotonic, SelfOnline, TombstonesPersist, TypingRequiresRoom,
    UniqueMessageIds,
};
pub use snapshot::{ClientSnapshot, MessageSnapshot, SnapshotHistory, SystemSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant, attributed to the client that broke it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Invariant name
    pub invariant: &'static str,
    /// Snapshot id of the offending client
    pub client: u64,
    /// What was observed
    pub message: String,
}

impl Violation {
    /// Violation of `invariant` by `client`.
    pub fn new(invariant: &'static str, client: u64, message: impl Into<String>) -> Self {
        Self { invariant, client, message: message.into() }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (client {}): {}", self.invariant, self.client, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against every snapshot.
pub trait Invariant: Send + Sync {
    /// Name used in violations.
    fn name(&self) -> &'static str;

    /// Check the property, returning the first violation found.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Set of invariants run together.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl fmt::Debug for InvariantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl InvariantRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every client invariant:
    ///
    /// - [`UniqueMessageIds`]: one entry per server id
    /// - [`TombstonesPersist`]: deleted messages stay deleted and present
    /// - [`ReadersMonotonic`]: reader sets never shrink
    /// - [`SelfOnline`]: the authenticated user is always online
    /// - [`NoSelfTyping`]: the user never sees themselves typing
    /// - [`TypingRequiresRoom`]: no typing indicator without an active room
    pub fn standard() -> Self {
        Self::new()
            .with(UniqueMessageIds)
            .with(TombstonesPersist)
            .with(ReadersMonotonic)
            .with(SelfOnline)
            .with(NoSelfTyping)
            .with(TypingRequiresRoom)
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with<I: Invariant + 'static>(mut self, invariant: I) -> Self {
        self.add(invariant);
        self
    }

    /// Register an invariant.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Registered invariant names, in check order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.invariants.iter().map(|inv| inv.name())
    }

    /// Run every invariant, collecting all violations.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Run every invariant and panic listing all violations.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let lines: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariants violated {context}:\n  {}", lines.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_order() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec![
            "unique_message_ids",
            "tombstones_persist",
            "readers_monotonic",
            "self_online",
            "no_self_typing",
            "typing_requires_room",
        ]);
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&SystemSnapshot::empty()).is_ok());
    }

    #[test]
    fn every_violation_is_reported() {
        let registry = InvariantRegistry::standard();
        let mut client = ClientSnapshot::new(4);
        client.user_id = Some(3);
        client.connected = true;
        client.typing_users = vec![3];

        let violations = registry.check_all(&SystemSnapshot::single(client)).unwrap_err();
        let names: Vec<_> = violations.iter().map(|v| v.invariant).collect();

        assert_eq!(names, vec!["self_online", "no_self_typing", "typing_requires_room"]);
        assert!(violations.iter().all(|v| v.client == 4));
        assert!(violations[0].to_string().starts_with("self_online (client 4): "));
    }
}
