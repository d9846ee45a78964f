//! WINS engine configuration.

use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Default lower clamp for requested registration ttls: 6 hours.
pub const DEFAULT_MIN_WINS_TTL: u32 = 6 * 60 * 60;
/// Default upper clamp for requested registration ttls: 3 days.
pub const DEFAULT_MAX_WINS_TTL: u32 = 3 * 24 * 60 * 60;
/// Default time to wait for an ownership challenge answer before treating
/// the challenged node as gone.
pub const DEFAULT_CHALLENGE_TIMEOUT: u64 = 2;

/// One local interface, used to answer "is this one of our addresses" and
/// to prefer same-subnet owners in query responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl Interface {
    pub fn new(ip: Ipv4Addr, netmask: Ipv4Addr) -> Interface {
        Interface { ip, netmask }
    }

    /// True if `ip` falls inside this interface's subnet.
    pub fn same_net(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        u32::from(self.ip) & mask == u32::from(ip) & mask
    }
}

/// WINS engine configuration values. Loading these from any particular
/// config mechanism is the host process's business.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether this instance serves the WINS role at all. When false the
    /// admission filter rejects everything and maintenance is a no-op.
    pub wins_server: bool,
    /// Lower clamp for requested ttls.
    ///
    /// Defaults to [DEFAULT_MIN_WINS_TTL].
    pub min_wins_ttl: u32,
    /// Upper clamp for requested ttls.
    ///
    /// Defaults to [DEFAULT_MAX_WINS_TTL].
    pub max_wins_ttl: u32,
    /// Fall back to an asynchronous DNS lookup for missed queries of
    /// workstation (0x00) and server (0x20) names.
    pub dns_proxy: bool,
    /// This server's own NetBIOS names (name portion only, any type).
    pub my_names: Vec<String>,
    /// This server's interfaces.
    pub interfaces: Vec<Interface>,
    /// Where the registry is persisted.
    ///
    /// Defaults to `wins.dat` in the working directory.
    pub database_path: PathBuf,
    /// Seconds before an unanswered ownership challenge counts as a
    /// failure.
    ///
    /// Defaults to [DEFAULT_CHALLENGE_TIMEOUT].
    pub challenge_timeout: u64,
}

impl Config {
    pub fn is_my_ip(&self, ip: Ipv4Addr) -> bool {
        self.interfaces.iter().any(|iface| iface.ip == ip)
    }

    pub fn is_my_name(&self, name: &str) -> bool {
        self.my_names.iter().any(|my| my.eq_ignore_ascii_case(name))
    }

    /// The local interface whose subnet contains `ip`, if any.
    pub fn local_interface_for(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.same_net(ip))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wins_server: true,
            min_wins_ttl: DEFAULT_MIN_WINS_TTL,
            max_wins_ttl: DEFAULT_MAX_WINS_TTL,
            dns_proxy: false,
            my_names: Vec::new(),
            interfaces: Vec::new(),
            database_path: PathBuf::from("wins.dat"),
            challenge_timeout: DEFAULT_CHALLENGE_TIMEOUT,
        }
    }
}
