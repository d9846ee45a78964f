//! Registry entries: where a name came from, when it dies, and who owns it.

use std::net::Ipv4Addr;

use crate::common::{NbFlags, NetBiosName};

/// Provenance of a record. Only [NameSource::Registered] records may be
/// mutated or removed by client protocol actions; everything else is
/// replaced wholesale, never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    /// One of this server's own names, re-derived at startup.
    SelfName,
    /// Registered by a NetBIOS client over the wire.
    Registered,
    /// Filled in by a successful DNS proxy lookup.
    Dns,
    /// A DNS proxy lookup that came back empty, cached as a negative entry.
    DnsFailed,
    /// Statically configured, never expires.
    Permanent,
}

/// Record lifetime: an absolute death time or the permanent sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Permanent,
    At(u64),
}

impl Expiry {
    pub fn is_expired(&self, now: u64) -> bool {
        match self {
            Expiry::Permanent => false,
            Expiry::At(death_time) => *death_time < now,
        }
    }

    /// Seconds of life left, or `max_ttl` for permanent records.
    pub fn remaining_ttl(&self, now: u64, max_ttl: u32) -> u32 {
        match self {
            Expiry::Permanent => max_ttl,
            Expiry::At(death_time) => death_time.saturating_sub(now) as u32,
        }
    }
}

/// One entry in the WINS registry.
///
/// Invariants: `owners` is non-empty and duplicate free (the database
/// removes a record as soon as its last owner goes), and the group bit is
/// immutable for the record's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    pub name: NetBiosName,
    owners: Vec<Ipv4Addr>,
    pub nb_flags: NbFlags,
    pub source: NameSource,
    pub expiry: Expiry,
}

impl NameRecord {
    pub fn new(
        name: NetBiosName,
        nb_flags: NbFlags,
        source: NameSource,
        expiry: Expiry,
        owners: Vec<Ipv4Addr>,
    ) -> NameRecord {
        NameRecord {
            name,
            owners,
            nb_flags,
            source,
            expiry,
        }
    }

    // === Getters ===

    pub fn is_group(&self) -> bool {
        self.nb_flags.is_group()
    }

    /// Owner addresses in insertion order. The first entry is the one a
    /// single-address response carries.
    pub fn owners(&self) -> &[Ipv4Addr] {
        &self.owners
    }

    pub fn first_owner(&self) -> Option<Ipv4Addr> {
        self.owners.first().copied()
    }

    pub fn has_owner(&self, ip: Ipv4Addr) -> bool {
        self.owners.contains(&ip)
    }

    // === Crate-internal mutation, driven by the database ===

    pub(crate) fn push_owner(&mut self, ip: Ipv4Addr) {
        if !self.owners.contains(&ip) {
            self.owners.push(ip);
        }
    }

    /// Removes an owner and reports whether any owners are left.
    pub(crate) fn drop_owner(&mut self, ip: Ipv4Addr) -> bool {
        self.owners.retain(|owner| *owner != ip);
        !self.owners.is_empty()
    }
}
