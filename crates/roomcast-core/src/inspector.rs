//! Read-only views over the registry for operators.

use serde::Serialize;

use crate::code::RoomCode;
use crate::registry::RoomRegistry;
use crate::room::RoomState;
use crate::stats::CounterSnapshot;

/// One room member as seen by an operator.
#[derive(Debug, Clone, Serialize)]
pub struct MemberInfo {
    /// Connection identifier.
    pub id: String,
    /// Remote peer description.
    pub remote_id: String,
    /// Whether the connection is still open.
    pub alive: bool,
    /// Seconds since the member joined.
    pub connected_secs: u64,
}

/// Summary of one room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    /// Room code.
    pub code: RoomCode,
    /// Lifecycle state.
    pub state: String,
    /// Number of members.
    pub members: usize,
    /// Seconds since the room was created.
    pub age_secs: u64,
}

/// Relay-wide statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    /// Number of live rooms.
    pub rooms: usize,
    /// Members across all live rooms.
    pub members: usize,
    /// Cumulative counters.
    #[serde(flatten)]
    pub counters: CounterSnapshot,
}

/// Snapshot queries for the admin console.
///
/// Holds a registry clone and only ever reads from it.
#[derive(Clone)]
pub struct AdminInspector {
    registry: RoomRegistry,
}

impl AdminInspector {
    /// Create an inspector over `registry`.
    #[must_use]
    pub fn new(registry: RoomRegistry) -> Self {
        Self { registry }
    }

    /// Sorted codes of all live rooms.
    #[must_use]
    pub fn list_room_codes(&self) -> Vec<RoomCode> {
        self.registry.codes()
    }

    /// Members of one room, ordered by connection ID.
    ///
    /// Returns `None` if the room does not exist.
    #[must_use]
    pub fn list_members(&self, code: &RoomCode) -> Option<Vec<MemberInfo>> {
        let room = self.registry.lookup(code)?;
        let mut members: Vec<MemberInfo> = room
            .members()
            .iter()
            .map(|client| MemberInfo {
                id: client.id().to_string(),
                remote_id: client.remote_id(),
                alive: client.is_open(),
                connected_secs: client.connected_for().as_secs(),
            })
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        Some(members)
    }

    /// Summary of one room.
    #[must_use]
    pub fn room_summary(&self, code: &RoomCode) -> Option<RoomSummary> {
        let room = self.registry.lookup(code)?;
        Some(RoomSummary {
            code: room.code().clone(),
            state: room.state().to_string(),
            members: room.member_count(),
            age_secs: room.age().as_secs(),
        })
    }

    /// Relay-wide statistics.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        let codes = self.registry.codes();
        let members = codes
            .iter()
            .filter_map(|code| self.registry.lookup(code))
            .filter(|room| room.state() == RoomState::Running)
            .map(|room| room.member_count())
            .sum();

        RelayStats {
            rooms: codes.len(),
            members,
            counters: self.registry.counters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_transport::MemoryConnection;

    fn code(raw: &str) -> RoomCode {
        RoomCode::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_list_rooms_and_members() {
        let registry = RoomRegistry::new();
        let inspector = AdminInspector::new(registry.clone());
        assert!(inspector.list_room_codes().is_empty());

        let room = registry.create(code("BBB222")).unwrap();
        registry.create(code("AAA111")).unwrap();

        let (conn, _peer) = MemoryConnection::pair("10.0.0.7:5555");
        let member = room.attach(Box::new(conn)).unwrap();

        let codes: Vec<String> = inspector
            .list_room_codes()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(codes, vec!["AAA111", "BBB222"]);

        let members = inspector.list_members(&code("BBB222")).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].remote_id, "10.0.0.7:5555");
        assert_eq!(members[0].id, member.client().id().to_string());
        assert!(members[0].alive);

        assert!(inspector.list_members(&code("AAA111")).unwrap().is_empty());
        assert!(inspector.list_members(&code("NOPE00")).is_none());
    }

    #[tokio::test]
    async fn test_stats_and_summary() {
        let registry = RoomRegistry::new();
        let inspector = AdminInspector::new(registry.clone());
        let room = registry.create(code("STAT01")).unwrap();

        let (c1, _p1) = MemoryConnection::pair("one");
        let (c2, _p2) = MemoryConnection::pair("two");
        let _m1 = room.attach(Box::new(c1)).unwrap();
        let _m2 = room.attach(Box::new(c2)).unwrap();

        let stats = inspector.stats();
        assert_eq!(stats.rooms, 1);
        assert_eq!(stats.members, 2);
        assert_eq!(stats.counters.rooms_created, 1);

        let summary = inspector.room_summary(&code("STAT01")).unwrap();
        assert_eq!(summary.members, 2);
        assert_eq!(summary.state, "running");

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["rooms"], 1);
        assert_eq!(json["rooms_created"], 1);
    }

    #[tokio::test]
    async fn test_inspection_does_not_mutate() {
        let registry = RoomRegistry::new();
        let inspector = AdminInspector::new(registry.clone());
        registry.create(code("READ01")).unwrap();

        for _ in 0..3 {
            let _ = inspector.list_room_codes();
            let _ = inspector.list_members(&code("READ01"));
            let _ = inspector.stats();
        }
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&code("READ01")).unwrap().is_running());
    }
}
