//! The parsed Name Service packet surface the engine consumes, and the
//! payloads it hands back to the transport.
//!
//! Header bit-packing, retransmission and socket IO live on the other side
//! of [crate::server::PacketSink]; the engine only ever sees these types.

use std::net::Ipv4Addr;

use crate::common::NetBiosName;

/// The question type of a standard NetBIOS name query.
pub const QUESTION_TYPE_NB_QUERY: u16 = 0x0020;
/// The question type of a node status request, never serviced by WINS.
pub const QUESTION_TYPE_NB_STATUS: u16 = 0x0021;

/// NB flags bit for group (vs. unique) names.
const NB_GROUP: u16 = 0x8000;

/// Name Service opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Query,
    Registration,
    Release,
    Wack,
    Refresh,
    /// rfc1002 is ambiguous about the refresh opcode, so both 0x8 and 0x9
    /// are accepted as synonyms. WinNT sends 0x8.
    RefreshAlt,
    MultihomedRegistration,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Opcode> {
        match value {
            0x0 => Some(Opcode::Query),
            0x5 => Some(Opcode::Registration),
            0x6 => Some(Opcode::Release),
            0x7 => Some(Opcode::Wack),
            0x8 => Some(Opcode::Refresh),
            0x9 => Some(Opcode::RefreshAlt),
            0xf => Some(Opcode::MultihomedRegistration),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Opcode::Query => 0x0,
            Opcode::Registration => 0x5,
            Opcode::Release => 0x6,
            Opcode::Wack => 0x7,
            Opcode::Refresh => 0x8,
            Opcode::RefreshAlt => 0x9,
            Opcode::MultihomedRegistration => 0xf,
        }
    }
}

/// Name Service result codes carried in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    /// Format error in the request.
    FmtErr,
    /// Server failure.
    SrvErr,
    /// Requested name does not exist.
    NamErr,
    /// Unsupported request.
    ImpErr,
    /// Registration or refresh refused.
    RfsErr,
    /// Active error, name owned by another node.
    ActErr,
    /// Name in conflict.
    CftErr,
}

impl ResultCode {
    pub fn as_u8(&self) -> u8 {
        match self {
            ResultCode::Ok => 0x0,
            ResultCode::FmtErr => 0x1,
            ResultCode::SrvErr => 0x2,
            ResultCode::NamErr => 0x3,
            ResultCode::ImpErr => 0x4,
            ResultCode::RfsErr => 0x5,
            ResultCode::ActErr => 0x6,
            ResultCode::CftErr => 0x7,
        }
    }
}

/// The 16 bit NB flags field of an address record: the group bit plus the
/// owner node type bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NbFlags(u16);

impl NbFlags {
    pub fn new(raw: u16) -> NbFlags {
        NbFlags(raw)
    }

    pub fn group() -> NbFlags {
        NbFlags(NB_GROUP)
    }

    pub fn unique() -> NbFlags {
        NbFlags(0)
    }

    pub fn is_group(&self) -> bool {
        self.0 & NB_GROUP != 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }
}

/// The additional (address) record of a registration, refresh or release
/// request: the requested ttl and the owner sextet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalRecord {
    pub ttl: u32,
    pub owner_ip: Ipv4Addr,
    pub nb_flags: NbFlags,
}

/// A parsed inbound Name Service packet, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPacket {
    pub transaction_id: u16,
    pub opcode: Opcode,
    pub is_response: bool,
    pub is_broadcast: bool,
    pub recursion_desired: bool,
    /// Result code; only meaningful when `is_response` is set.
    pub rcode: ResultCode,
    pub question_type: u16,
    pub question: NetBiosName,
    pub source_ip: Ipv4Addr,
    /// Wall clock (epoch seconds) at which the packet arrived.
    pub timestamp: u64,
    pub additional: Option<AdditionalRecord>,
}

impl IncomingPacket {
    /// The two flag bytes a WACK response echoes back from the request
    /// header it is parking.
    pub fn wack_flags(&self) -> [u8; 2] {
        let mut rdata = [0u8; 2];

        rdata[0] = (self.opcode.as_u8() & 0xf) << 3;
        if self.recursion_desired {
            rdata[0] |= 0x1;
        }
        if self.is_broadcast {
            rdata[1] |= 0x10;
        }

        rdata
    }
}

/// One owner entry of an address-record response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressEntry {
    pub nb_flags: NbFlags,
    pub ip: Ipv4Addr,
}

/// Opcode specific response payload handed to the transport for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseData {
    Empty,
    /// WACK payload: the echoed request flag bytes.
    EchoFlags([u8; 2]),
    /// Registration and query payload: one sextet per owner.
    Addresses(Vec<AddressEntry>),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        for value in [0x0, 0x5, 0x6, 0x7, 0x8, 0x9, 0xf] {
            let opcode = Opcode::from_u8(value).expect("known opcode");
            assert_eq!(opcode.as_u8(), value);
        }

        assert_eq!(Opcode::from_u8(0x3), None);
    }

    #[test]
    fn group_bit() {
        assert!(NbFlags::group().is_group());
        assert!(!NbFlags::unique().is_group());
        assert!(NbFlags::new(0xe000).is_group());
        assert!(!NbFlags::new(0x6000).is_group());
    }
}
