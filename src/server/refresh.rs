//! NAME REFRESH handling: ttl renewal for existing owners.

use tracing::{debug, error, warn};

use crate::common::{
    IncomingPacket, ResultCode, NAME_TYPE_BROWSER_ELECTION, NAME_TYPE_DOMAIN_GROUP,
};

use super::{PacketSink, Wins};

impl Wins {
    pub(crate) fn handle_name_refresh(&mut self, packet: IncomingPacket, sink: &mut dyn PacketSink) {
        let Some(additional) = packet.additional.clone() else {
            warn!(name = %packet.question, "Refresh request without an address record");
            return;
        };

        if packet.is_broadcast {
            error!(
                name = %packet.question,
                from = %packet.source_ip,
                "Broadcast name refresh should not be sent to a WINS server"
            );
            return;
        }

        let question = packet.question.clone();
        let refreshing_group = additional.nb_flags.is_group();
        let ttl = self.ttl_from_packet(&additional);
        let from_ip = additional.owner_ip;

        debug!(name = %question, from = %from_ip, "Name refresh");

        // Cannot refresh the nonexistent.
        let Some(record) = self.database.find(&question).cloned() else {
            debug!(name = %question, "Refresh for a name that does not exist");
            self.send_registration_response(&packet, ResultCode::NamErr, 0, sink);
            return;
        };

        if refreshing_group != record.is_group() {
            debug!(
                name = %question,
                group = refreshing_group,
                "Group bit does not match the record"
            );
            self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
            return;
        }

        if refreshing_group {
            // 0x1c groups carry real member addresses and the refresher
            // must be one of them; plain groups only hold the broadcast
            // placeholder, so there is no owner to check.
            if question.name_type() == NAME_TYPE_DOMAIN_GROUP && !record.has_owner(from_ip) {
                debug!(name = %question, %from_ip, "Refreshing IP is not a group member");
                self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
                return;
            }

            self.database.renew(&question, ttl, packet.timestamp);
            self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
            return;
        }

        // Unique 0x1d names are never stored; pretend the refresh worked.
        if question.name_type() == NAME_TYPE_BROWSER_ELECTION {
            self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
            return;
        }

        if record.has_owner(from_ip) {
            self.database.renew(&question, ttl, packet.timestamp);
            self.send_registration_response(&packet, ResultCode::Ok, ttl, sink);
        } else {
            debug!(name = %question, %from_ip, "Refreshing IP is not known to the name");
            self.send_registration_response(&packet, ResultCode::RfsErr, 0, sink);
        }
    }
}
