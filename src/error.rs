//! Main crate error.

use crate::common::NetBiosName;
use crate::database::DatLineError;

#[derive(thiserror::Error, Debug)]
/// WINS engine error enum.
pub enum Error {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    /// An insert hit an existing record the caller did not clear first.
    #[error("name {0} already exists in the WINS database")]
    NameExists(NetBiosName),

    #[error("bad wins.dat line: {0}")]
    DatLine(#[from] DatLineError),
}
