//! The WINS protocol engine: packet admission, opcode dispatch, deferred
//! ownership verification and periodic maintenance.
//!
//! Scheduling is single threaded and cooperative: the host's event loop
//! feeds parsed packets into [Wins::handle_packet] and wall clock progress
//! into [Wins::tick], and nothing in here ever blocks. A disputed
//! registration returns immediately after issuing its challenge; the
//! continuation runs later as an independent dispatch.

mod query;
mod registration;
mod refresh;
mod release;
mod verification;

use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, trace, warn};

use crate::common::{
    AdditionalRecord, AddressEntry, IncomingPacket, NameSource, NbFlags, NetBiosName, Opcode,
    ResponseData, ResultCode, QUESTION_TYPE_NB_QUERY,
};
use crate::config::Config;
use crate::database::{file, NameDatabase};

use verification::{PendingVerification, PendingVerifications, VerificationKind};

/// Grace period (seconds) a WACK grants the requester of a disputed name
/// while the recorded owner is interrogated.
const WACK_GRACE_TTL: u32 = 60;

/// Minimum wall clock progress between maintenance passes.
const MAINTENANCE_INTERVAL: u64 = 5;

/// Name types this server registers for each of its own names.
const SELF_NAME_TYPES: [u8; 3] = [0x00, 0x03, 0x20];

/// The transport seam. The engine never touches sockets: it consumes
/// already-parsed packets and hands every outbound message to this sink.
pub trait PacketSink {
    /// Encode and send a response to the packet's source.
    fn reply(
        &mut self,
        to: &IncomingPacket,
        rcode: ResultCode,
        opcode: Opcode,
        ttl: u32,
        rdata: ResponseData,
    );

    /// Send a directed, non-recursive name query to `target`, asking it
    /// whether it still claims `name`. The answer comes back through
    /// [Wins::handle_packet]; its absence surfaces in [Wins::tick].
    fn challenge(&mut self, transaction_id: u16, target: Ipv4Addr, name: &NetBiosName);

    /// Hand a missed query to the asynchronous DNS collaborator, which
    /// later calls [Wins::handle_dns_answer] with the same packet.
    fn queue_dns_query(&mut self, packet: IncomingPacket, name: NetBiosName);
}

/// The WINS name server engine for one network scope.
#[derive(Debug)]
pub struct Wins {
    config: Config,
    database: NameDatabase,
    verifications: PendingVerifications,
    next_transaction_id: u16,
    /// Last maintenance pass (epoch seconds), 0 until the first one runs.
    last_maintenance: u64,
}

impl Wins {
    /// Creates the engine, registers this server's own names and replays
    /// the persisted database. Load problems are logged, never fatal.
    pub fn new(config: Config) -> Wins {
        let mut database = NameDatabase::new();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);

        if config.wins_server {
            add_self_names(&config, &mut database, now);

            match file::load(&config.database_path, &mut database, now) {
                Ok(loaded) => info!(loaded, total = database.len(), "Initialised WINS database"),
                Err(error) => warn!(%error, "Could not load WINS database file"),
            }
        }

        database.clear_dirty();

        Wins {
            config,
            database,
            verifications: PendingVerifications::new(),
            next_transaction_id: rand::random(),
            last_maintenance: 0,
        }
    }

    // === Getters ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &NameDatabase {
        &self.database
    }

    // === Public Methods ===

    /// Determines whether an inbound Name Service packet is this WINS
    /// server's concern. Pure predicate, no side effects.
    pub fn packet_is_for_wins_server(&self, packet: &IncomingPacket) -> bool {
        // Only unicast packets go to a WINS server.
        if !self.config.wins_server || packet.is_broadcast {
            trace!("failing WINS test: no WINS role or broadcast");
            return false;
        }

        if packet.question_type != QUESTION_TYPE_NB_QUERY {
            return false;
        }

        match packet.opcode {
            // A WINS server issues WACKs, it never receives them.
            Opcode::Wack => false,
            // Registration, refresh and release requests only, not
            // responses.
            Opcode::Registration
            | Opcode::MultihomedRegistration
            | Opcode::Refresh
            | Opcode::RefreshAlt
            | Opcode::Release => !packet.is_response,
            // Unicast queries with recursion desired, or any response
            // (challenge answers come back this way).
            Opcode::Query => packet.is_response || packet.recursion_desired,
        }
    }

    /// Routes an admitted packet to its handler.
    pub fn handle_packet(&mut self, packet: IncomingPacket, sink: &mut dyn PacketSink) {
        match packet.opcode {
            Opcode::Registration => self.handle_name_registration(packet, sink),
            Opcode::MultihomedRegistration => self.handle_multihomed_registration(packet, sink),
            Opcode::Refresh | Opcode::RefreshAlt => self.handle_name_refresh(packet, sink),
            Opcode::Release => self.handle_name_release(packet, sink),
            Opcode::Query if packet.is_response => self.handle_challenge_answer(packet, sink),
            Opcode::Query => self.handle_name_query(packet, sink),
            Opcode::Wack => {
                // The admission filter already rejects these.
                debug!(from = %packet.source_ip, "Dropping WACK");
            }
        }
    }

    /// Periodic time dependent processing: fires challenge timeouts, then
    /// (rate limited, WINS role only) sweeps expired names and persists
    /// the database if anything changed.
    pub fn tick(&mut self, now: u64, sink: &mut dyn PacketSink) {
        for pending in self
            .verifications
            .take_expired(now, self.config.challenge_timeout)
        {
            debug!(name = %pending.name, target = %pending.target, "Ownership challenge timed out");
            self.verification_failed(pending, sink);
        }

        if !self.config.wins_server {
            return;
        }

        if self.last_maintenance != 0
            && now.saturating_sub(self.last_maintenance) < MAINTENANCE_INTERVAL
        {
            return;
        }
        self.last_maintenance = now;

        self.database.sweep(now);

        if self.database.dirty() {
            if let Err(error) = file::save(&self.config.database_path, &self.database) {
                warn!(%error, "Failed to write WINS database");
            }
            self.database.clear_dirty();
        }
    }

    // === Private Methods ===

    /// Clamps a requested registration ttl to the configured bounds.
    fn ttl_from_packet(&self, additional: &AdditionalRecord) -> u32 {
        additional
            .ttl
            .clamp(self.config.min_wins_ttl, self.config.max_wins_ttl)
    }

    fn next_tid(&mut self) -> u16 {
        let tid = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        tid
    }

    /// Registration (and refresh) responses echo the request's address
    /// record back with the result code.
    fn send_registration_response(
        &self,
        packet: &IncomingPacket,
        rcode: ResultCode,
        ttl: u32,
        sink: &mut dyn PacketSink,
    ) {
        sink.reply(packet, rcode, Opcode::Registration, ttl, echoed_rdata(packet));
    }

    fn send_release_response(
        &self,
        packet: &IncomingPacket,
        rcode: ResultCode,
        sink: &mut dyn PacketSink,
    ) {
        sink.reply(packet, rcode, Opcode::Release, 0, echoed_rdata(packet));
    }

    /// Parks the requester behind a WACK, sends the ownership challenge
    /// and retains the original request until the challenge resolves.
    fn issue_challenge(
        &mut self,
        kind: VerificationKind,
        target: Ipv4Addr,
        packet: IncomingPacket,
        sink: &mut dyn PacketSink,
    ) {
        sink.reply(
            &packet,
            ResultCode::Ok,
            Opcode::Wack,
            WACK_GRACE_TTL,
            ResponseData::EchoFlags(packet.wack_flags()),
        );

        let transaction_id = self.next_tid();
        sink.challenge(transaction_id, target, &packet.question);

        debug!(name = %packet.question, %target, transaction_id, "Verifying name ownership");

        let issued_at = packet.timestamp;
        self.verifications.insert(PendingVerification {
            transaction_id,
            name: packet.question.clone(),
            target,
            kind,
            packet,
            issued_at,
        });
    }

    /// A response to one of our directed challenge queries arrived.
    fn handle_challenge_answer(&mut self, packet: IncomingPacket, sink: &mut dyn PacketSink) {
        let Some(pending) = self
            .verifications
            .take_matching(packet.transaction_id, packet.source_ip)
        else {
            debug!(
                transaction_id = packet.transaction_id,
                from = %packet.source_ip,
                "Unexpected query response"
            );
            return;
        };

        if packet.rcode == ResultCode::Ok {
            self.verification_succeeded(pending, sink);
        } else {
            self.verification_failed(pending, sink);
        }
    }
}

fn echoed_rdata(packet: &IncomingPacket) -> ResponseData {
    match &packet.additional {
        Some(additional) => ResponseData::Addresses(vec![AddressEntry {
            nb_flags: additional.nb_flags,
            ip: additional.owner_ip,
        }]),
        None => ResponseData::Empty,
    }
}

/// Registers this server's own names, permanent and owned by every local
/// interface. They are re-derived here at every startup rather than being
/// replayed from the database file.
fn add_self_names(config: &Config, database: &mut NameDatabase, now: u64) {
    let owners: Vec<Ipv4Addr> = config.interfaces.iter().map(|iface| iface.ip).collect();

    if owners.is_empty() {
        return;
    }

    for my_name in &config.my_names {
        for name_type in SELF_NAME_TYPES {
            let name = NetBiosName::new(my_name, name_type);

            if let Err(error) = database.insert(
                name,
                NbFlags::unique(),
                None,
                NameSource::SelfName,
                &owners,
                now,
            ) {
                debug!(%error, "Skipping duplicate self name");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn packet(opcode: Opcode) -> IncomingPacket {
        IncomingPacket {
            transaction_id: 1,
            opcode,
            is_response: false,
            is_broadcast: false,
            recursion_desired: true,
            rcode: ResultCode::Ok,
            question_type: QUESTION_TYPE_NB_QUERY,
            question: NetBiosName::new("WKS1", 0x00),
            source_ip: [10, 0, 0, 5].into(),
            timestamp: 100,
            additional: None,
        }
    }

    #[test]
    fn admission_rejects_broadcasts_and_disabled_role() {
        let wins = Wins::new(Config::default());

        let mut broadcast = packet(Opcode::Registration);
        broadcast.is_broadcast = true;
        assert!(!wins.packet_is_for_wins_server(&broadcast));

        let disabled = Wins::new(Config {
            wins_server: false,
            ..Default::default()
        });
        assert!(!disabled.packet_is_for_wins_server(&packet(Opcode::Registration)));
    }

    #[test]
    fn admission_rejects_non_name_questions_and_wacks() {
        let wins = Wins::new(Config::default());

        let mut status = packet(Opcode::Query);
        status.question_type = crate::common::QUESTION_TYPE_NB_STATUS;
        assert!(!wins.packet_is_for_wins_server(&status));

        assert!(!wins.packet_is_for_wins_server(&packet(Opcode::Wack)));
    }

    #[test]
    fn admission_rejects_responses_except_query_responses() {
        let wins = Wins::new(Config::default());

        for opcode in [
            Opcode::Registration,
            Opcode::MultihomedRegistration,
            Opcode::Refresh,
            Opcode::RefreshAlt,
            Opcode::Release,
        ] {
            assert!(wins.packet_is_for_wins_server(&packet(opcode)));

            let mut response = packet(opcode);
            response.is_response = true;
            assert!(!wins.packet_is_for_wins_server(&response));
        }

        let mut query_response = packet(Opcode::Query);
        query_response.is_response = true;
        query_response.recursion_desired = false;
        assert!(wins.packet_is_for_wins_server(&query_response));
    }

    #[test]
    fn admission_requires_recursion_desired_on_query_requests() {
        let wins = Wins::new(Config::default());

        assert!(wins.packet_is_for_wins_server(&packet(Opcode::Query)));

        let mut no_rd = packet(Opcode::Query);
        no_rd.recursion_desired = false;
        assert!(!wins.packet_is_for_wins_server(&no_rd));
    }

    #[test]
    fn self_names_are_registered_at_startup() {
        let wins = Wins::new(Config {
            my_names: vec!["WINSSRV".to_string()],
            interfaces: vec![crate::config::Interface::new(
                [10, 0, 0, 1].into(),
                [255, 255, 255, 0].into(),
            )],
            database_path: std::path::PathBuf::from("/nonexistent/wins.dat"),
            ..Default::default()
        });

        let record = wins
            .database()
            .find(&NetBiosName::new("WINSSRV", 0x20))
            .expect("self name registered");

        assert_eq!(record.source, NameSource::SelfName);
        assert_eq!(record.expiry, crate::common::Expiry::Permanent);
        assert!(!wins.database().dirty());
    }
}
