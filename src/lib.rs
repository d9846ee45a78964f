//! An authoritative WINS (Windows Internet Name Service) engine: the
//! registration/refresh/query/release decision logic of a NetBIOS name
//! server, with flat-file persistence and ttl based expiry.
//!
//! The crate deliberately stops at the protocol engine. Socket IO, packet
//! bit-packing and retransmission live behind the [server::PacketSink]
//! seam; the host process's event loop feeds parsed packets into
//! [server::Wins::handle_packet] and time into [server::Wins::tick].

mod common;
mod config;
mod error;

pub mod database;
pub mod server;

pub use common::*;
pub use config::{Config, Interface};
pub use database::NameDatabase;
pub use error::Error;
pub use server::{PacketSink, Wins};

pub type Result<T, E = Error> = std::result::Result<T, E>;
