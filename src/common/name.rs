//! NetBIOS names: a 16 byte padded identifier, a one byte type and an
//! optional dotted scope suffix.

use std::fmt::{self, Display, Formatter};

/// Maximum length of the name portion, the 16th byte is the type.
pub const MAX_NETBIOS_NAME_LEN: usize = 15;

/// Name type registered by domain master browsers.
pub const NAME_TYPE_DOMAIN_MASTER: u8 = 0x1b;
/// Group type registered per-member by domain controllers.
pub const NAME_TYPE_DOMAIN_GROUP: u8 = 0x1c;
/// Transient browser election names, accepted but never stored.
pub const NAME_TYPE_BROWSER_ELECTION: u8 = 0x1d;
/// The server service type, eligible for DNS proxy lookups.
pub const NAME_TYPE_SERVER: u8 = 0x20;
/// The workstation service type, eligible for DNS proxy lookups.
pub const NAME_TYPE_WORKSTATION: u8 = 0x00;

/// A NetBIOS name. Equality is structural over the upcased name, the type
/// byte and the scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetBiosName {
    name: String,
    name_type: u8,
    scope: String,
}

impl NetBiosName {
    /// Creates a name, upcasing it and stripping the trailing space padding
    /// a client may have left in the 16 byte wire field.
    pub fn new(name: &str, name_type: u8) -> NetBiosName {
        let mut name = name.trim_end_matches(' ').to_uppercase();
        name.truncate(MAX_NETBIOS_NAME_LEN);

        NetBiosName {
            name,
            name_type,
            scope: String::new(),
        }
    }

    pub fn with_scope(mut self, scope: &str) -> NetBiosName {
        self.scope = scope.trim_matches('.').to_uppercase();
        self
    }

    // === Getters ===

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_type(&self) -> u8 {
        self.name_type
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// True for the wildcard name `*`, used by the domain master
    /// aggregation query `*<1b>`.
    pub fn is_star(&self) -> bool {
        self.name == "*"
    }
}

impl Display for NetBiosName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.scope.is_empty() {
            write!(f, "{}<{:02x}>", self.name, self.name_type)
        } else {
            write!(f, "{}<{:02x}>.{}", self.name, self.name_type, self.scope)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn padding_and_case() {
        let a = NetBiosName::new("wks1           ", 0x00);
        let b = NetBiosName::new("WKS1", 0x00);

        assert_eq!(a, b);
        assert_eq!(a.name(), "WKS1");
    }

    #[test]
    fn type_is_part_of_identity() {
        let a = NetBiosName::new("WKS1", 0x00);
        let b = NetBiosName::new("WKS1", 0x20);

        assert_ne!(a, b);
    }

    #[test]
    fn display() {
        assert_eq!(NetBiosName::new("WKS1", 0x20).to_string(), "WKS1<20>");
        assert_eq!(
            NetBiosName::new("WKS1", 0x00).with_scope("corp.example")
                .to_string(),
            "WKS1<00>.CORP.EXAMPLE"
        );
    }

    #[test]
    fn star() {
        assert!(NetBiosName::new("*", 0x1b).is_star());
        assert!(!NetBiosName::new("WKS1", 0x1b).is_star());
    }
}
