//! NAME QUERY handling, the `*<1b>` domain master aggregation query and
//! the DNS proxy completion path.

use std::net::Ipv4Addr;

use tracing::{debug, warn};

use crate::common::{
    AddressEntry, IncomingPacket, NameRecord, NameSource, NbFlags, Opcode, ResponseData,
    ResultCode, NAME_TYPE_DOMAIN_MASTER, NAME_TYPE_SERVER, NAME_TYPE_WORKSTATION,
};

use super::{PacketSink, Wins};

impl Wins {
    pub(crate) fn handle_name_query(&mut self, packet: IncomingPacket, sink: &mut dyn PacketSink) {
        let question = packet.question.clone();

        debug!(name = %question, from = %packet.source_ip, "Name query");

        // `*<1b>` asks for every domain master browser we know of, so
        // other domains can be discovered across subnets.
        if question.is_star() && question.name_type() == NAME_TYPE_DOMAIN_MASTER {
            self.handle_domain_master_query(&packet, sink);
            return;
        }

        if let Some(record) = self.database.find(&question).cloned() {
            if record.source == NameSource::DnsFailed {
                debug!(name = %question, "Query hit a cached dns failure");
                self.send_query_response(&packet, ResultCode::NamErr, None, sink);
                return;
            }

            if record.expiry.is_expired(packet.timestamp) {
                debug!(name = %question, "Query hit an expired name");
                self.send_query_response(&packet, ResultCode::NamErr, None, sink);
                return;
            }

            self.send_query_response(&packet, ResultCode::Ok, Some(&record), sink);
            return;
        }

        // Not in WINS; try dns for server and workstation names.
        if self.config.dns_proxy
            && matches!(
                question.name_type(),
                NAME_TYPE_SERVER | NAME_TYPE_WORKSTATION
            )
        {
            debug!(name = %question, "Name not found; queueing dns lookup");
            sink.queue_dns_query(packet, question);
            return;
        }

        self.send_query_response(&packet, ResultCode::NamErr, None, sink);
    }

    /// Completion callback of the asynchronous DNS collaborator: caches
    /// the outcome and answers the retained query.
    pub fn handle_dns_answer(
        &mut self,
        packet: IncomingPacket,
        address: Option<Ipv4Addr>,
        sink: &mut dyn PacketSink,
    ) {
        let question = packet.question.clone();

        if self.database.find(&question).is_none() {
            let (source, owner) = match address {
                Some(ip) => (NameSource::Dns, ip),
                // Cache the miss too, so repeat queries fail fast.
                None => (NameSource::DnsFailed, Ipv4Addr::UNSPECIFIED),
            };

            if let Err(error) = self.database.insert(
                question.clone(),
                NbFlags::unique(),
                Some(self.config.max_wins_ttl),
                source,
                &[owner],
                packet.timestamp,
            ) {
                warn!(%error, "Failed to cache dns lookup");
            }
        }

        match self.database.find(&question).cloned() {
            Some(record)
                if record.source != NameSource::DnsFailed
                    && !record.expiry.is_expired(packet.timestamp) =>
            {
                self.send_query_response(&packet, ResultCode::Ok, Some(&record), sink);
            }
            _ => self.send_query_response(&packet, ResultCode::NamErr, None, sink),
        }
    }

    // === Private Methods ===

    /// Scans the whole database for 0x1b records and aggregates every
    /// owner address into one answer.
    fn handle_domain_master_query(&self, packet: &IncomingPacket, sink: &mut dyn PacketSink) {
        let mut entries = Vec::new();

        for record in self.database.iter() {
            if record.name.name_type() == NAME_TYPE_DOMAIN_MASTER {
                entries.extend(record.owners().iter().map(|ip| AddressEntry {
                    nb_flags: record.nb_flags,
                    ip: *ip,
                }));
            }
        }

        if entries.is_empty() {
            debug!("No domain master browser names registered");
            self.send_query_response(packet, ResultCode::NamErr, None, sink);
            return;
        }

        sink.reply(
            packet,
            ResultCode::Ok,
            Opcode::Query,
            self.config.min_wins_ttl,
            ResponseData::Addresses(entries),
        );
    }

    fn send_query_response(
        &self,
        packet: &IncomingPacket,
        rcode: ResultCode,
        record: Option<&NameRecord>,
        sink: &mut dyn PacketSink,
    ) {
        let mut ttl = 0;
        let mut rdata = ResponseData::Empty;

        if rcode == ResultCode::Ok {
            if let Some(record) = record {
                ttl = record
                    .expiry
                    .remaining_ttl(packet.timestamp, self.config.max_wins_ttl);
                rdata = ResponseData::Addresses(self.ordered_addresses(record, packet.source_ip));
            }
        }

        sink.reply(packet, rcode, Opcode::Query, ttl, rdata);
    }

    /// Owner sextets for a query answer. If the requester shares a local
    /// subnet with one of the owners, that owner moves to the front as a
    /// best-path hint; the order of the rest is not significant.
    fn ordered_addresses(&self, record: &NameRecord, requester: Ipv4Addr) -> Vec<AddressEntry> {
        let mut entries: Vec<AddressEntry> = record
            .owners()
            .iter()
            .map(|ip| AddressEntry {
                nb_flags: record.nb_flags,
                ip: *ip,
            })
            .collect();

        if entries.len() > 1 {
            if let Some(iface) = self.config.local_interface_for(requester) {
                if let Some(index) = entries.iter().position(|entry| iface.same_net(entry.ip)) {
                    let preferred = entries.remove(index);
                    entries.insert(0, preferred);
                }
            }
        }

        entries
    }
}
