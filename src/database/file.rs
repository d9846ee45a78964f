//! The `wins.dat` flat file: one record per line,
//!
//! ```text
//! "<name>#<type-hex>" <death-time|-1> <ip> [<ip> ...] <flags-hex><R|S>
//! ```
//!
//! Lines beginning with `#` are comments. A trailing `R` marks a client
//! registered name that is replayed at startup; `S` marks one of the
//! server's own names, which are re-derived at startup instead of being
//! replayed. Malformed lines are logged and skipped, never fatal.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::Ipv4Addr;
use std::path::Path;

use tracing::{debug, warn};

use crate::common::{Expiry, NameSource, NbFlags, NetBiosName};
use crate::database::NameDatabase;
use crate::Result;

/// Death-time sentinel for records that never expire.
const PERMANENT_SENTINEL: i64 = -1;

/// Hard cap on owner addresses per line; anything longer is garbage.
const MAX_IPS_PER_LINE: usize = 25;

/// Records reloaded at startup must still have this much life in them.
const MIN_REMAINING_LIFE: u64 = 60;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DatLineError {
    /// Fewer than the minimum `name death-time ip flags` tokens.
    #[error("truncated line")]
    Truncated,

    #[error("bad name token {0:?}")]
    BadName(String),

    #[error("bad death time {0:?}")]
    BadDeathTime(String),

    #[error("bad owner address {0:?}")]
    BadAddress(String),

    #[error("no owner addresses")]
    NoAddresses,

    #[error("too many owner addresses ({0})")]
    TooManyAddresses(usize),

    #[error("bad nb_flags token {0:?}")]
    BadFlags(String),
}

/// One successfully parsed `wins.dat` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatLine {
    pub name: NetBiosName,
    pub expiry: Expiry,
    pub owners: Vec<Ipv4Addr>,
    pub nb_flags: NbFlags,
    /// True for `S` suffixed lines (this server's own names).
    pub self_name: bool,
}

/// Parses a single non-comment line.
pub fn parse_line(line: &str) -> std::result::Result<DatLine, DatLineError> {
    let mut tokens = line.split_whitespace();

    let name_token = tokens.next().ok_or(DatLineError::Truncated)?;
    let death_token = tokens.next().ok_or(DatLineError::Truncated)?;
    let rest: Vec<&str> = tokens.collect();

    if rest.is_empty() {
        return Err(DatLineError::Truncated);
    }

    let name = parse_name_token(name_token)?;

    let death_time: i64 = death_token
        .parse()
        .map_err(|_| DatLineError::BadDeathTime(death_token.to_string()))?;
    let expiry = if death_time == PERMANENT_SENTINEL {
        Expiry::Permanent
    } else {
        Expiry::At(death_time.max(0) as u64)
    };

    // Every token before the last is an owner address; the last is the
    // flags byte with its R/S suffix.
    let (flags_token, ip_tokens) = rest.split_last().unwrap_or((&"", &[]));

    if ip_tokens.is_empty() {
        return Err(DatLineError::NoAddresses);
    }
    if ip_tokens.len() > MAX_IPS_PER_LINE {
        return Err(DatLineError::TooManyAddresses(ip_tokens.len()));
    }

    let mut owners = Vec::with_capacity(ip_tokens.len());
    for token in ip_tokens {
        let ip: Ipv4Addr = token
            .parse()
            .map_err(|_| DatLineError::BadAddress(token.to_string()))?;
        owners.push(ip);
    }

    let (self_name, flags_hex) = match flags_token.strip_suffix('S') {
        Some(hex) => (true, hex),
        // Default to R for compatibility with files written before the
        // suffix existed.
        None => (false, flags_token.strip_suffix('R').unwrap_or(flags_token)),
    };

    let raw_flags = u16::from_str_radix(flags_hex.trim(), 16)
        .map_err(|_| DatLineError::BadFlags(flags_token.to_string()))?;

    Ok(DatLine {
        name,
        expiry,
        owners,
        nb_flags: NbFlags::new(raw_flags),
        self_name,
    })
}

/// Formats one registered record as a `wins.dat` line.
pub fn format_record(
    name: &NetBiosName,
    expiry: Expiry,
    owners: &[Ipv4Addr],
    nb_flags: NbFlags,
) -> String {
    let death_time = match expiry {
        Expiry::Permanent => PERMANENT_SENTINEL,
        Expiry::At(at) => at as i64,
    };

    let mut line = format!(
        "\"{}#{:02x}\" {} ",
        name.name(),
        name.name_type(),
        death_time
    );

    for ip in owners {
        line.push_str(&ip.to_string());
        line.push(' ');
    }

    line.push_str(&format!("{:02x}R", nb_flags.bits()));
    line
}

/// Replays a `wins.dat` file into the database. A missing file is normal
/// first-boot behavior. Returns the number of records loaded.
pub fn load(path: &Path, database: &mut NameDatabase, now: u64) -> Result<usize> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?path, "No WINS database file to load");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let mut loaded = 0;

    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parsed = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(%error, line, "Skipping malformed wins.dat line");
                continue;
            }
        };

        if parsed.self_name {
            debug!(name = %parsed.name, "Ignoring SELF name");
            continue;
        }

        // Only replay records with at least a minute of life left.
        let ttl = match parsed.expiry {
            Expiry::Permanent => None,
            Expiry::At(death_time) if death_time.saturating_sub(MIN_REMAINING_LIFE) > now => {
                Some((death_time - now) as u32)
            }
            Expiry::At(death_time) => {
                debug!(name = %parsed.name, death_time, "Not reloading expiring name");
                continue;
            }
        };

        match database.insert(
            parsed.name,
            parsed.nb_flags,
            ttl,
            NameSource::Registered,
            &parsed.owners,
            now,
        ) {
            Ok(record) => {
                debug!(name = %record.name, "Reloaded name");
                loaded += 1;
            }
            Err(error) => warn!(%error, line, "Skipping duplicate wins.dat line"),
        }
    }

    // Replaying the file is not a change that needs writing back.
    database.clear_dirty();

    Ok(loaded)
}

/// Writes all client registered records out, atomically: the new contents
/// go to a temporary file which is then renamed over the live one, so a
/// crash can never leave a truncated database behind.
pub fn save(path: &Path, database: &NameDatabase) -> Result<()> {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".");
    let tmp_path = Path::new(&tmp_path);

    let mut file = fs::File::create(tmp_path)?;

    for record in database.iter() {
        if record.source != NameSource::Registered {
            continue;
        }

        writeln!(
            file,
            "{}",
            format_record(&record.name, record.expiry, record.owners(), record.nb_flags)
        )?;
    }

    file.sync_all()?;
    drop(file);

    fs::rename(tmp_path, path)?;

    debug!(?path, "Wrote WINS database");
    Ok(())
}

fn parse_name_token(token: &str) -> std::result::Result<NetBiosName, DatLineError> {
    let bad = || DatLineError::BadName(token.to_string());

    let inner = token
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(bad)?;

    let (name, type_hex) = inner.split_once('#').ok_or_else(bad)?;

    if name.is_empty() {
        return Err(bad());
    }

    let name_type = u8::from_str_radix(type_hex, 16).map_err(|_| bad())?;

    Ok(NetBiosName::new(name, name_type))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_single_owner() {
        let parsed = parse_line("\"WKS1#00\" 1756500000 10.0.0.5 00R").expect("parses");

        assert_eq!(parsed.name, NetBiosName::new("WKS1", 0x00));
        assert_eq!(parsed.expiry, Expiry::At(1756500000));
        assert_eq!(parsed.owners, vec![Ipv4Addr::new(10, 0, 0, 5)]);
        assert!(!parsed.nb_flags.is_group());
        assert!(!parsed.self_name);
    }

    #[test]
    fn parse_multihomed_owner_list() {
        let parsed =
            parse_line("\"FILESRV#20\" -1 10.0.0.5 192.168.1.5 10.0.2.5 00R").expect("parses");

        assert_eq!(parsed.expiry, Expiry::Permanent);
        assert_eq!(parsed.owners.len(), 3);
    }

    #[test]
    fn parse_self_suffix() {
        let parsed = parse_line("\"WINSSRV#00\" -1 10.0.0.1 00S").expect("parses");
        assert!(parsed.self_name);
    }

    #[test]
    fn parse_group_flags() {
        let parsed = parse_line("\"WORKGROUP#1e\" 1756500000 255.255.255.255 8000R")
            .expect("parses");
        assert!(parsed.nb_flags.is_group());
    }

    #[test]
    fn parse_missing_suffix_defaults_to_registered() {
        let parsed = parse_line("\"WKS1#00\" 1756500000 10.0.0.5 00").expect("parses");
        assert!(!parsed.self_name);
    }

    #[test]
    fn malformed_lines() {
        for (line, expected) in [
            ("", DatLineError::Truncated),
            ("\"WKS1#00\"", DatLineError::Truncated),
            ("\"WKS1#00\" 1756500000", DatLineError::Truncated),
            (
                "WKS1 1756500000 10.0.0.5 00R",
                DatLineError::BadName("WKS1".to_string()),
            ),
            (
                "\"WKS1#zz\" 1756500000 10.0.0.5 00R",
                DatLineError::BadName("\"WKS1#zz\"".to_string()),
            ),
            (
                "\"WKS1#00\" never 10.0.0.5 00R",
                DatLineError::BadDeathTime("never".to_string()),
            ),
            (
                "\"WKS1#00\" 1756500000 10.0.0.500 00R",
                DatLineError::BadAddress("10.0.0.500".to_string()),
            ),
            ("\"WKS1#00\" 1756500000 00R", DatLineError::NoAddresses),
            (
                "\"WKS1#00\" 1756500000 10.0.0.5 flagsR",
                DatLineError::BadFlags("flagsR".to_string()),
            ),
        ] {
            assert_eq!(parse_line(line), Err(expected), "line: {line:?}");
        }
    }

    #[test]
    fn too_many_addresses() {
        let ips = (0..=MAX_IPS_PER_LINE)
            .map(|i| format!("10.0.{}.{}", i / 250, i % 250 + 1))
            .collect::<Vec<_>>()
            .join(" ");
        let line = format!("\"WKS1#00\" -1 {ips} 00R");

        assert_eq!(
            parse_line(&line),
            Err(DatLineError::TooManyAddresses(MAX_IPS_PER_LINE + 1))
        );
    }

    #[test]
    fn format_then_parse_round_trips() {
        let name = NetBiosName::new("FILESRV", 0x20);
        let owners = vec![Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(192, 168, 1, 5)];

        let line = format_record(&name, Expiry::At(1756500000), &owners, NbFlags::unique());
        let parsed = parse_line(&line).expect("parses");

        assert_eq!(parsed.name, name);
        assert_eq!(parsed.expiry, Expiry::At(1756500000));
        assert_eq!(parsed.owners, owners);
        assert!(!parsed.self_name);
    }
}
