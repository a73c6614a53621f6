//! Operator console on stdin.
//!
//! Commands:
//!
//! ```text
//! rooms           list live rooms
//! list <code>     list the members of a room
//! close <code>    delete a room and disconnect its members
//! stats           relay-wide statistics
//! help            show this help
//! exit            shut the server down
//! ```

use roomcast_core::{AdminInspector, RoomCode, RoomRegistry};
use std::fmt::Write as _;
use std::io::{BufRead as _, Write as _};
use tokio::sync::mpsc;
use tracing::{info, warn};

const HELP: &str = "\
Commands:
  rooms           list live rooms
  list <code>     list the members of a room
  close <code>    delete a room and disconnect its members
  stats           relay-wide statistics
  help            show this help
  exit            shut the server down
";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rooms,
    List(String),
    Close(String),
    Stats,
    Help,
    Exit,
    Empty,
    /// Unrecognised input or a missing argument.
    Invalid(String),
}

impl Command {
    /// Parse one input line. Command words are case-insensitive.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Self::Empty;
        };
        let arg = words.next().map(str::to_string);

        match (word.to_ascii_lowercase().as_str(), arg) {
            ("rooms", _) => Self::Rooms,
            ("list", Some(code)) => Self::List(code),
            ("close", Some(code)) => Self::Close(code),
            ("list" | "close", None) => Self::Invalid(format!("'{word}' needs a room code")),
            ("stats", _) => Self::Stats,
            ("help" | "?", _) => Self::Help,
            ("exit" | "quit", _) => Self::Exit,
            _ => Self::Invalid(format!("Unknown command '{word}'. Type 'help' for usage.")),
        }
    }
}

/// What the console loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Executes console commands against the registry.
pub struct Console {
    registry: RoomRegistry,
    inspector: AdminInspector,
}

impl Console {
    #[must_use]
    pub fn new(registry: RoomRegistry, inspector: AdminInspector) -> Self {
        Self {
            registry,
            inspector,
        }
    }

    /// Run `command`, appending its output to `out`.
    pub fn execute(&self, command: &Command, out: &mut String) -> Flow {
        // Writing to a String cannot fail.
        let _ = self.write_output(command, out);
        match command {
            Command::Exit => Flow::Exit,
            _ => Flow::Continue,
        }
    }

    fn write_output(&self, command: &Command, out: &mut String) -> std::fmt::Result {
        match command {
            Command::Rooms => {
                let codes = self.inspector.list_room_codes();
                if codes.is_empty() {
                    writeln!(out, "No active rooms")?;
                }
                for code in codes {
                    match self.inspector.room_summary(&code) {
                        Some(summary) => writeln!(
                            out,
                            "{}  {} member(s)  {}  {}s",
                            summary.code, summary.members, summary.state, summary.age_secs
                        )?,
                        None => writeln!(out, "{code}")?,
                    }
                }
            }
            Command::List(raw) => match RoomCode::parse(raw) {
                Err(e) => writeln!(out, "{e}")?,
                Ok(code) => match self.inspector.list_members(&code) {
                    None => writeln!(out, "Room {code} not found")?,
                    Some(members) if members.is_empty() => writeln!(out, "Room {code} is empty")?,
                    Some(members) => {
                        for member in members {
                            writeln!(
                                out,
                                "{}  {}  {}  {}s",
                                member.id,
                                member.remote_id,
                                if member.alive { "open" } else { "closed" },
                                member.connected_secs
                            )?;
                        }
                    }
                },
            },
            Command::Close(raw) => match RoomCode::parse(raw) {
                Err(e) => writeln!(out, "{e}")?,
                Ok(code) => {
                    // Count before deleting; the worker clears members once it quits.
                    let members = self.registry.lookup(&code).map(|room| room.member_count());
                    match (members, self.registry.delete(&code)) {
                        (Some(members), Some(_)) => {
                            info!(room = %code, members, "Room closed from console");
                            writeln!(out, "Closed room {code} ({members} member(s))")?;
                        }
                        _ => writeln!(out, "Room {code} not found")?,
                    }
                }
            },
            Command::Stats => {
                let stats = self.inspector.stats();
                let c = stats.counters;
                writeln!(out, "rooms:              {}", stats.rooms)?;
                writeln!(out, "members:            {}", stats.members)?;
                writeln!(out, "rooms created:      {}", c.rooms_created)?;
                writeln!(out, "rooms deleted:      {}", c.rooms_deleted)?;
                writeln!(out, "messages posted:    {}", c.messages_posted)?;
                writeln!(out, "messages delivered: {}", c.messages_delivered)?;
                writeln!(out, "bytes delivered:    {}", c.bytes_delivered)?;
                writeln!(out, "delivery failures:  {}", c.delivery_failures)?;
                writeln!(out, "messages dropped:   {}", c.messages_dropped)?;
            }
            Command::Help => out.push_str(HELP),
            Command::Exit => writeln!(out, "Shutting down")?,
            Command::Empty => {}
            Command::Invalid(message) => writeln!(out, "{message}")?,
        }
        Ok(())
    }

    /// Execute lines from `input` until `exit` or until every sender is gone.
    ///
    /// Returns `true` if the operator asked to exit.
    pub async fn run<W>(&self, mut input: mpsc::UnboundedReceiver<String>, output: &mut W) -> bool
    where
        W: std::io::Write,
    {
        while let Some(line) = input.recv().await {
            let command = Command::parse(&line);
            let mut out = String::new();
            let flow = self.execute(&command, &mut out);

            if let Err(e) = output.write_all(out.as_bytes()).and_then(|()| output.flush()) {
                warn!(error = %e, "Console output failed");
            }
            if flow == Flow::Exit {
                return true;
            }
        }
        false
    }

    /// Run against the process's stdin and stdout.
    ///
    /// Stdin is read on a detached thread so a pending read never holds up
    /// runtime shutdown.
    pub async fn run_stdin(&self) -> bool {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("roomcast-console".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Console input failed");
                            break;
                        }
                    }
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start console reader");
            return false;
        }

        info!("Admin console ready, type 'help' for commands");
        let mut stdout = std::io::stdout();
        self.run(rx, &mut stdout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_transport::MemoryConnection;

    fn console() -> (Console, RoomRegistry) {
        let registry = RoomRegistry::new();
        let inspector = AdminInspector::new(registry.clone());
        (Console::new(registry.clone(), inspector), registry)
    }

    fn code(raw: &str) -> RoomCode {
        RoomCode::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("rooms"), Command::Rooms);
        assert_eq!(Command::parse("  LIST abc123 "), Command::List("abc123".into()));
        assert_eq!(Command::parse("close XYZ"), Command::Close("XYZ".into()));
        assert_eq!(Command::parse("stats"), Command::Stats);
        assert_eq!(Command::parse("exit"), Command::Exit);
        assert_eq!(Command::parse(""), Command::Empty);
        assert!(matches!(Command::parse("list"), Command::Invalid(_)));
        assert!(matches!(Command::parse("frobnicate"), Command::Invalid(_)));
    }

    #[tokio::test]
    async fn test_rooms_and_list() {
        let (console, registry) = console();
        let mut out = String::new();
        console.execute(&Command::Rooms, &mut out);
        assert_eq!(out, "No active rooms\n");

        let room = registry.create(code("ROOM01")).unwrap();
        let (conn, _peer) = MemoryConnection::pair("10.1.1.1:4000");
        let _member = room.attach(Box::new(conn)).unwrap();

        out.clear();
        console.execute(&Command::Rooms, &mut out);
        assert!(out.starts_with("ROOM01  1 member(s)"));

        out.clear();
        console.execute(&Command::List("room01".into()), &mut out);
        assert!(out.contains("10.1.1.1:4000"));
        assert!(out.contains("open"));

        out.clear();
        console.execute(&Command::List("NONE00".into()), &mut out);
        assert_eq!(out, "Room NONE00 not found\n");
    }

    #[tokio::test]
    async fn test_close_room() {
        let (console, registry) = console();
        let room = registry.create(code("SHUT01")).unwrap();
        let (conn, mut peer) = MemoryConnection::pair("peer");
        let _member = room.attach(Box::new(conn)).unwrap();

        let mut out = String::new();
        assert_eq!(console.execute(&Command::Close("SHUT01".into()), &mut out), Flow::Continue);
        assert_eq!(out, "Closed room SHUT01 (1 member(s))\n");
        assert!(registry.is_empty());
        peer.closed().await;

        out.clear();
        console.execute(&Command::Close("SHUT01".into()), &mut out);
        assert_eq!(out, "Room SHUT01 not found\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_reports_members_before_teardown() {
        let (console, registry) = console();
        let room = registry.create(code("SHUT02")).unwrap();
        let mut peers = Vec::new();
        let mut members = Vec::new();
        for i in 0..3 {
            let (conn, peer) = MemoryConnection::pair(format!("peer{i}"));
            members.push(room.attach(Box::new(conn)).unwrap());
            peers.push(peer);
        }

        let mut out = String::new();
        console.execute(&Command::Close("shut02".into()), &mut out);
        assert_eq!(out, "Closed room SHUT02 (3 member(s))\n");
        for peer in &mut peers {
            peer.closed().await;
        }
        assert_eq!(room.member_count(), 0);
    }

    fn feed(lines: &[&str]) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        for line in lines {
            tx.send((*line).to_string()).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_run_until_exit() {
        let (console, registry) = console();
        registry.create(code("LOOP01")).unwrap();

        let mut output = Vec::new();
        assert!(console.run(feed(&["stats", "bogus", "exit", "rooms"]), &mut output).await);

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("rooms:              1"));
        assert!(text.contains("Unknown command 'bogus'"));
        assert!(text.ends_with("Shutting down\n"));
    }

    #[tokio::test]
    async fn test_run_stops_at_eof() {
        let (console, _registry) = console();
        let mut output = Vec::new();
        assert!(!console.run(feed(&["help"]), &mut output).await);
        assert!(String::from_utf8(output).unwrap().contains("close <code>"));
    }
}
