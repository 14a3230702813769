//! Cast model: identity, derived paths, lifecycle location and raw header.

mod discovery;
mod hex;
mod types;

pub use discovery::{casts_by_name, discover_casts};
pub use hex::{HexHeader, HexHeaderError};
pub use types::{Cast, CastLocation, CastRoots, RAW_EXTENSION};

pub(crate) use types::has_extension;
