//! NAME RELEASE handling.

use tracing::{debug, error, warn};

use crate::common::{
    IncomingPacket, NameSource, ResultCode, NAME_TYPE_BROWSER_ELECTION, NAME_TYPE_DOMAIN_GROUP,
};

use super::{PacketSink, Wins};

impl Wins {
    pub(crate) fn handle_name_release(&mut self, packet: IncomingPacket, sink: &mut dyn PacketSink) {
        let Some(additional) = packet.additional.clone() else {
            warn!(name = %packet.question, "Release request without an address record");
            return;
        };

        if packet.is_broadcast {
            error!(
                name = %packet.question,
                from = %packet.source_ip,
                "Broadcast name release should not be sent to a WINS server"
            );
            return;
        }

        let question = packet.question.clone();
        let releasing_group = additional.nb_flags.is_group();
        let from_ip = additional.owner_ip;

        debug!(
            name = %question,
            group = releasing_group,
            from = %from_ip,
            "Name release"
        );

        // Unique 0x1d names were never stored; acknowledge without action.
        if !releasing_group && question.name_type() == NAME_TYPE_BROWSER_ELECTION {
            self.send_release_response(&packet, ResultCode::Ok, sink);
            return;
        }

        let Some(record) = self.database.find(&question) else {
            self.send_release_response(&packet, ResultCode::NamErr, sink);
            return;
        };

        if record.source != NameSource::Registered {
            self.send_release_response(&packet, ResultCode::NamErr, sink);
            return;
        }

        // Plain group names carry the broadcast placeholder, not member
        // addresses; say yes and let the group time out.
        if releasing_group && question.name_type() != NAME_TYPE_DOMAIN_GROUP {
            self.send_release_response(&packet, ResultCode::Ok, sink);
            return;
        }

        // The releasing node must be one of the recorded owners.
        if !record.has_owner(from_ip) {
            debug!(
                name = %question,
                %from_ip,
                "Refusing release; IP is not one of the known addresses for this name"
            );
            self.send_release_response(&packet, ResultCode::NamErr, sink);
            return;
        }

        // Acknowledge first, then drop the owner; the record goes away
        // entirely once no addresses remain.
        self.send_release_response(&packet, ResultCode::Ok, sink);
        self.database.remove_owner(&question, from_ip);
    }
}
