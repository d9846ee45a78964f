//! NAME REGISTRATION and MULTIHOMED REGISTRATION handling, including the
//! continuations that resume once an ownership challenge resolves.

use std::net::Ipv4Addr;

use tracing::{debug, error, warn};

use crate::common::{
    IncomingPacket, NameSource, ResultCode, NAME_TYPE_BROWSER_ELECTION, NAME_TYPE_DOMAIN_GROUP,
};

use super::verification::{PendingVerification, VerificationKind};
use super::{PacketSink, Wins};

impl Wins {
    /// A name registration request (unique or group).
    ///
    /// The decision ladder, in order: drop broadcasts; evict stale DNS
    /// records; protect static and self names; rewrite plain group owners
    /// to the broadcast address; accept-without-store for unique 0x1d;
    /// group/unique collision rules; idempotent re-registration; then
    /// either create the record or challenge the recorded owner.
    pub(crate) fn handle_name_registration(
        &mut self,
        packet: IncomingPacket,
        sink: &mut dyn PacketSink,
    ) {
        let Some(additional) = packet.additional.clone() else {
            warn!(name = %packet.question, "Registration request without an address record");
            return;
        };

        if packet.is_broadcast {
            error!(
                name = %packet.question,
                from = %packet.source_ip,
                "Broadcast name registration should not be sent to a WINS server"
            );
            return;
        }

        let question = packet.question.clone();
        let registering_group = additional.nb_flags.is_group();
        let ttl = self.ttl_from_packet(&additional);
        let mut from_ip = additional.owner_ip;

        debug!(
            name = %question,
            group = registering_group,
            from = %from_ip,
            "Name registration"
        );

        // A live client registration always supersedes a stale DNS guess.
        self.remove_superseded_dns_record(&question);

        // Never let static or self names be overwritten.
        if let Some(record) = self.database.find(&question) {
            if record.source != NameSource::Registered {
                debug!(name = %question, source = ?record.source, "Name exists with a non-registered source");
                self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
                return;
            }
        }

        // Ordinary group names are not tracked per member; only 0x1c
        // groups carry real member addresses.
        if registering_group && question.name_type() != NAME_TYPE_DOMAIN_GROUP {
            from_ip = Ipv4Addr::BROADCAST;
        }

        // Browser election names are transient by convention: accept, but
        // never store.
        if !registering_group && question.name_type() == NAME_TYPE_BROWSER_ELECTION {
            debug!(name = %question, from = %packet.source_ip, "Ignoring 0x1d registration");
            self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
            return;
        }

        let existing = self.database.find(&question).cloned();

        if let Some(record) = &existing {
            if record.is_group() {
                if registering_group {
                    // Same group, another member: add the address and
                    // extend the group's life.
                    self.database.add_owner(&question, from_ip);
                    self.database.renew(&question, ttl, packet.timestamp);
                    self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
                } else {
                    debug!(name = %question, "Name already exists in WINS as a GROUP name");
                    self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
                }
                return;
            }
        }

        // From here on any existing record is a unique name.

        if let Some(record) = &existing {
            if self.config.is_my_name(record.name.name()) {
                if self.config.is_my_ip(from_ip) {
                    self.database.renew(&question, ttl, packet.timestamp);
                    self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
                } else {
                    debug!(name = %question, "Name is one of our own; denying registration");
                    self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
                }
                return;
            }
        }

        if !registering_group {
            if let Some(record) = &existing {
                if record.owners().len() == 1 && record.owners()[0] == from_ip {
                    // Idempotent re-registration by the current owner.
                    self.database.renew(&question, ttl, packet.timestamp);
                    self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
                    return;
                }
            }
        }

        if let Some(owner) = existing.as_ref().and_then(|record| record.first_owner()) {
            // The name is in dispute. Park the requester behind a WACK and
            // ask the recorded owner whether it still wants the name.
            if self.verifications.contains_name(&question) {
                debug!(name = %question, "Ownership verification already in flight; dropping request");
                return;
            }

            self.issue_challenge(VerificationKind::Registration, owner, packet, sink);
            return;
        }

        // Name did not exist; add it.
        match self.database.insert(
            question,
            additional.nb_flags,
            Some(ttl),
            NameSource::Registered,
            &[from_ip],
            packet.timestamp,
        ) {
            Ok(_) => self.send_registration_response(&packet, ResultCode::Ok, ttl, sink),
            Err(error) => {
                warn!(%error, "Failed to add name");
                self.send_registration_response(&packet, ResultCode::SrvErr, 0, sink);
            }
        }
    }

    /// A multihomed registration: one host adding another interface
    /// address to a unique name it already holds elsewhere.
    pub(crate) fn handle_multihomed_registration(
        &mut self,
        packet: IncomingPacket,
        sink: &mut dyn PacketSink,
    ) {
        let Some(additional) = packet.additional.clone() else {
            warn!(name = %packet.question, "Multihomed registration without an address record");
            return;
        };

        if packet.is_broadcast {
            error!(
                name = %packet.question,
                from = %packet.source_ip,
                "Broadcast multihomed registration should not be sent to a WINS server"
            );
            return;
        }

        // Only unique names may be registered multihomed.
        if additional.nb_flags.is_group() {
            error!(
                name = %packet.question,
                from = %packet.source_ip,
                "Group names should not be multihomed"
            );
            return;
        }

        let question = packet.question.clone();
        let ttl = self.ttl_from_packet(&additional);
        let from_ip = additional.owner_ip;

        debug!(name = %question, from = %from_ip, "Multihomed name registration");

        if question.name_type() == NAME_TYPE_BROWSER_ELECTION {
            debug!(name = %question, from = %packet.source_ip, "Ignoring 0x1d registration");
            self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
            return;
        }

        self.remove_superseded_dns_record(&question);

        if let Some(record) = self.database.find(&question) {
            if record.source != NameSource::Registered {
                debug!(name = %question, source = ?record.source, "Name exists with a non-registered source");
                self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
                return;
            }
        }

        let existing = self.database.find(&question).cloned();

        if let Some(record) = &existing {
            if record.is_group() {
                debug!(name = %question, "Name already exists in WINS as a GROUP name");
                self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
                return;
            }
        }

        if let Some(record) = &existing {
            if self.config.is_my_name(record.name.name()) {
                if self.config.is_my_ip(from_ip) {
                    self.database.add_owner(&question, from_ip);
                    self.database.renew(&question, ttl, packet.timestamp);
                    self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
                } else {
                    debug!(name = %question, "Name is one of our own; denying registration");
                    self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
                }
                return;
            }
        }

        if let Some(record) = &existing {
            if record.has_owner(from_ip) {
                // This interface is already recorded; just extend the ttl.
                self.database.renew(&question, ttl, packet.timestamp);
                self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
                return;
            }
        }

        if existing.is_some() {
            // The name exists with other owners. Ask the registering
            // machine itself to answer for the name before adding the
            // extra address.
            if self.verifications.contains_name(&question) {
                debug!(name = %question, "Ownership verification already in flight; dropping request");
                return;
            }

            let target = packet.source_ip;
            self.issue_challenge(VerificationKind::Multihomed, target, packet, sink);
            return;
        }

        match self.database.insert(
            question,
            additional.nb_flags,
            Some(ttl),
            NameSource::Registered,
            &[from_ip],
            packet.timestamp,
        ) {
            Ok(_) => self.send_registration_response(&packet, ResultCode::Ok, ttl, sink),
            Err(error) => {
                warn!(%error, "Failed to add name");
                self.send_registration_response(&packet, ResultCode::SrvErr, 0, sink);
            }
        }
    }

    /// The challenged node answered positively.
    pub(super) fn verification_succeeded(
        &mut self,
        pending: PendingVerification,
        sink: &mut dyn PacketSink,
    ) {
        match pending.kind {
            VerificationKind::Registration => {
                // The recorded owner still wants the name, so the original
                // requester loses the dispute.
                debug!(
                    name = %pending.name,
                    owner = %pending.target,
                    "Owner still wants the name; rejecting registration"
                );
                self.send_registration_response(&pending.packet, ResultCode::RfsErr, 0, sink);
            }
            VerificationKind::Multihomed => {
                // The requester answered for the name. The database may
                // have moved on during the round trip, so re-check the
                // record before adding the extra address.
                let packet = pending.packet;
                let Some(additional) = packet.additional.clone() else {
                    return;
                };
                let ttl = self.ttl_from_packet(&additional);

                match self.database.find(&pending.name) {
                    Some(record) if record.source == NameSource::Registered => {
                        self.database.add_owner(&pending.name, additional.owner_ip);
                        self.database.renew(&pending.name, ttl, packet.timestamp);
                        self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
                    }
                    _ => {
                        debug!(
                            name = %pending.name,
                            "Name is not in the correct state to add another address"
                        );
                        self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
                    }
                }
            }
        }
    }

    /// The challenge timed out or came back negative.
    pub(super) fn verification_failed(
        &mut self,
        pending: PendingVerification,
        sink: &mut dyn PacketSink,
    ) {
        match pending.kind {
            VerificationKind::Registration => {
                // The owner no longer answers for the name. An arbitrary
                // amount of time may have passed since the challenge went
                // out, so only evict the record if it is still in the
                // state observed back then.
                let unchanged = matches!(
                    self.database.find(&pending.name),
                    Some(record) if record.source == NameSource::Registered
                        && record.first_owner() == Some(pending.target)
                );

                if unchanged {
                    self.database.remove(&pending.name);
                }

                if self.database.find(&pending.name).is_none() {
                    // Replay the retained request from the top; with the
                    // stale record gone it will do the right thing.
                    self.handle_name_registration(pending.packet, sink);
                } else {
                    debug!(
                        name = %pending.name,
                        "WINS database changed while verifying ownership; dropping request"
                    );
                }
            }
            VerificationKind::Multihomed => {
                debug!(
                    name = %pending.name,
                    requester = %pending.target,
                    "Registering machine failed to answer for the name"
                );
                self.send_registration_response(&pending.packet, ResultCode::RfsErr, 0, sink);
            }
        }
    }

    fn remove_superseded_dns_record(&mut self, question: &crate::common::NetBiosName) {
        if let Some(record) = self.database.find(question) {
            if matches!(record.source, NameSource::Dns | NameSource::DnsFailed) {
                debug!(name = %question, "Name in WINS was a dns lookup; removing it");
                self.database.remove(question);
            }
        }
    }
}
