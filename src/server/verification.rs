//! Correlation table for in-flight ownership challenges.

use std::net::Ipv4Addr;

use crate::common::{IncomingPacket, NetBiosName};

/// Which handler resumes when a challenge resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerificationKind {
    /// The recorded owner of a disputed unique name was challenged.
    Registration,
    /// The requester of a multihomed registration was challenged.
    Multihomed,
}

/// One in-flight ownership challenge. The original request packet is
/// retained here, owned, and consumed exactly once when the challenge's
/// answer or timeout fires.
#[derive(Debug)]
pub(crate) struct PendingVerification {
    pub transaction_id: u16,
    pub name: NetBiosName,
    /// The address the challenge was sent to.
    pub target: Ipv4Addr,
    pub kind: VerificationKind,
    pub packet: IncomingPacket,
    /// Wall clock (epoch seconds) the challenge went out.
    pub issued_at: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PendingVerifications {
    entries: Vec<PendingVerification>,
}

impl PendingVerifications {
    pub fn new() -> PendingVerifications {
        PendingVerifications::default()
    }

    /// There is at most one pending verification per disputed name; the
    /// handlers check this before issuing another challenge.
    pub fn contains_name(&self, name: &NetBiosName) -> bool {
        self.entries.iter().any(|entry| entry.name == *name)
    }

    pub fn insert(&mut self, entry: PendingVerification) {
        self.entries.push(entry);
    }

    /// Removes and returns the entry a challenge answer belongs to. The
    /// answer must come from the address that was challenged.
    pub fn take_matching(
        &mut self,
        transaction_id: u16,
        from: Ipv4Addr,
    ) -> Option<PendingVerification> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.transaction_id == transaction_id && entry.target == from)?;

        Some(self.entries.remove(index))
    }

    /// Removes and returns every entry whose timeout has elapsed.
    pub fn take_expired(&mut self, now: u64, timeout: u64) -> Vec<PendingVerification> {
        let mut expired = Vec::new();

        let mut i = 0;
        while i < self.entries.len() {
            if now.saturating_sub(self.entries[i].issued_at) >= timeout {
                expired.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }

        expired
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::{Opcode, ResultCode};

    fn entry(tid: u16, name: &str, target: [u8; 4], issued_at: u64) -> PendingVerification {
        let name = NetBiosName::new(name, 0x00);

        PendingVerification {
            transaction_id: tid,
            name: name.clone(),
            target: target.into(),
            kind: VerificationKind::Registration,
            packet: IncomingPacket {
                transaction_id: tid,
                opcode: Opcode::Registration,
                is_response: false,
                is_broadcast: false,
                recursion_desired: true,
                rcode: ResultCode::Ok,
                question_type: crate::common::QUESTION_TYPE_NB_QUERY,
                question: name,
                source_ip: [10, 0, 0, 9].into(),
                timestamp: issued_at,
                additional: None,
            },
            issued_at,
        }
    }

    #[test]
    fn take_matching_requires_the_challenged_address() {
        let mut pending = PendingVerifications::new();
        pending.insert(entry(7, "WKS1", [10, 0, 0, 5], 100));

        assert!(pending.take_matching(7, [10, 0, 0, 9].into()).is_none());
        assert!(pending.take_matching(8, [10, 0, 0, 5].into()).is_none());

        let taken = pending.take_matching(7, [10, 0, 0, 5].into());
        assert!(taken.is_some());
        assert!(pending.is_empty(), "an entry resolves exactly once");
    }

    #[test]
    fn take_expired() {
        let mut pending = PendingVerifications::new();
        pending.insert(entry(1, "WKS1", [10, 0, 0, 5], 100));
        pending.insert(entry(2, "WKS2", [10, 0, 0, 6], 103));

        let expired = pending.take_expired(102, 2);

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].transaction_id, 1);
        assert!(!pending.is_empty());
    }

    #[test]
    fn contains_name() {
        let mut pending = PendingVerifications::new();
        pending.insert(entry(1, "WKS1", [10, 0, 0, 5], 100));

        assert!(pending.contains_name(&NetBiosName::new("WKS1", 0x00)));
        assert!(!pending.contains_name(&NetBiosName::new("WKS1", 0x20)));
    }
}
