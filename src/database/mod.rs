//! The authoritative in-memory table of registered names for one subnet.

pub mod file;

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tracing::debug;

use crate::common::{Expiry, NameRecord, NameSource, NbFlags, NetBiosName};
use crate::{Error, Result};

pub use file::DatLineError;

/// The WINS name registry. All mutation goes through here so the dirty
/// flag consumed by the persistence writer cannot be missed.
#[derive(Debug, Default)]
pub struct NameDatabase {
    records: HashMap<NetBiosName, NameRecord>,
    dirty: bool,
}

impl NameDatabase {
    pub fn new() -> NameDatabase {
        NameDatabase::default()
    }

    // === Getters ===

    /// Exact-match lookup; any record source qualifies.
    pub fn find(&self, name: &NetBiosName) -> Option<&NameRecord> {
        self.records.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NameRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Set on any mutation, consumed by the persistence writer.
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    // === Public Methods ===

    /// Creates a new record. Callers are responsible for pre-emptively
    /// removing superseded records; an occupied key is an error.
    pub fn insert(
        &mut self,
        name: NetBiosName,
        nb_flags: NbFlags,
        ttl: Option<u32>,
        source: NameSource,
        owners: &[Ipv4Addr],
        now: u64,
    ) -> Result<&NameRecord> {
        if self.records.contains_key(&name) {
            return Err(Error::NameExists(name));
        }

        let expiry = match ttl {
            Some(ttl) => Expiry::At(now + u64::from(ttl)),
            None => Expiry::Permanent,
        };

        debug!(name = %name, ?source, ?expiry, ?owners, "Adding name");

        let record = NameRecord::new(name.clone(), nb_flags, source, expiry, owners.to_vec());

        self.dirty = true;
        Ok(self.records.entry(name).or_insert(record))
    }

    pub fn remove(&mut self, name: &NetBiosName) -> Option<NameRecord> {
        let removed = self.records.remove(name);

        if let Some(record) = &removed {
            debug!(name = %record.name, "Removed name");
            self.dirty = true;
        }

        removed
    }

    /// Adds an owner address to an existing record, keeping insertion
    /// order and uniqueness.
    pub fn add_owner(&mut self, name: &NetBiosName, ip: Ipv4Addr) {
        if let Some(record) = self.records.get_mut(name) {
            record.push_owner(ip);
            self.dirty = true;
        }
    }

    /// Removes an owner address; a record left with no owners is removed
    /// entirely. Returns true if the record itself went away.
    pub fn remove_owner(&mut self, name: &NetBiosName, ip: Ipv4Addr) -> bool {
        let Some(record) = self.records.get_mut(name) else {
            return false;
        };

        if record.drop_owner(ip) {
            self.dirty = true;
            return false;
        }

        self.remove(name);
        true
    }

    /// Extends a record's life by `ttl` seconds from `now`. The caller
    /// clamps the ttl to the configured bounds first. Permanent records
    /// stay permanent.
    pub fn renew(&mut self, name: &NetBiosName, ttl: u32, now: u64) {
        if let Some(record) = self.records.get_mut(name) {
            if record.expiry == Expiry::Permanent {
                return;
            }

            record.expiry = Expiry::At(now + u64::from(ttl));
            self.dirty = true;
        }
    }

    /// Removes every record whose death time has passed. Permanent
    /// records survive any sweep.
    pub fn sweep(&mut self, now: u64) {
        let before = self.records.len();

        self.records.retain(|name, record| {
            let keep = !record.expiry.is_expired(now);
            if !keep {
                debug!(name = %name, "Expiring name");
            }
            keep
        });

        if self.records.len() != before {
            self.dirty = true;
        }
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn name(s: &str, t: u8) -> NetBiosName {
        NetBiosName::new(s, t)
    }

    fn registered(db: &mut NameDatabase, s: &str, ips: &[[u8; 4]], ttl: u32, now: u64) {
        let ips: Vec<Ipv4Addr> = ips.iter().map(|ip| (*ip).into()).collect();
        db.insert(
            name(s, 0x00),
            NbFlags::unique(),
            Some(ttl),
            NameSource::Registered,
            &ips,
            now,
        )
        .expect("insert");
    }

    #[test]
    fn insert_refuses_occupied_key() {
        let mut db = NameDatabase::new();
        registered(&mut db, "WKS1", &[[10, 0, 0, 5]], 300, 100);

        let err = db.insert(
            name("WKS1", 0x00),
            NbFlags::unique(),
            Some(300),
            NameSource::Registered,
            &[[10, 0, 0, 9].into()],
            100,
        );

        assert!(matches!(err, Err(Error::NameExists(_))));
    }

    #[test]
    fn remove_owner_drops_empty_record() {
        let mut db = NameDatabase::new();
        registered(&mut db, "WKS1", &[[10, 0, 0, 5], [10, 0, 0, 9]], 300, 100);

        assert!(!db.remove_owner(&name("WKS1", 0x00), [10, 0, 0, 5].into()));
        assert!(db.remove_owner(&name("WKS1", 0x00), [10, 0, 0, 9].into()));
        assert!(db.find(&name("WKS1", 0x00)).is_none());
    }

    #[test]
    fn sweep_spares_permanent_records() {
        let mut db = NameDatabase::new();
        registered(&mut db, "WKS1", &[[10, 0, 0, 5]], 300, 100);
        db.insert(
            name("STATIC", 0x20),
            NbFlags::unique(),
            None,
            NameSource::Permanent,
            &[[10, 0, 0, 1].into()],
            100,
        )
        .expect("insert");

        db.sweep(1000);

        assert!(db.find(&name("WKS1", 0x00)).is_none());
        assert!(db.find(&name("STATIC", 0x20)).is_some());
    }

    #[test]
    fn renew_never_demotes_a_permanent_record() {
        let mut db = NameDatabase::new();
        db.insert(
            name("WINSSRV", 0x00),
            NbFlags::unique(),
            None,
            NameSource::SelfName,
            &[[10, 0, 0, 1].into()],
            100,
        )
        .expect("insert");
        db.clear_dirty();

        db.renew(&name("WINSSRV", 0x00), 300, 200);

        let record = db.find(&name("WINSSRV", 0x00)).expect("kept");
        assert_eq!(record.expiry, Expiry::Permanent);
        assert!(!db.dirty(), "a no-op renew is not a change");
    }

    #[test]
    fn mutations_set_the_dirty_flag() {
        let mut db = NameDatabase::new();
        assert!(!db.dirty());

        registered(&mut db, "WKS1", &[[10, 0, 0, 5]], 300, 100);
        assert!(db.dirty());

        db.clear_dirty();
        db.renew(&name("WKS1", 0x00), 600, 200);
        assert!(db.dirty());

        db.clear_dirty();
        db.sweep(200);
        assert!(!db.dirty(), "a sweep that removes nothing is not a change");
    }
}
