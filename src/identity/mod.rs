//! Identity module
//!
//! Identifiers the router works with:
//! - `LocationId` / `Location` for real peers
//! - `Sha1Sum` for the content hashes tunnels are dug for
//! - virtual locations, derived from tunnel ids, addressing tunnel endpoints

pub mod location;
pub mod virtual_location;

pub use location::{Location, LocationId, Sha1Sum, LOCATION_ID_LENGTH, SHA1_LENGTH};
pub use virtual_location::{from_tunnel, tunnel_id_of, virtual_location_id, VIRTUAL_LOCATION_NAME};
