//! Synthetic locations addressing tunnel endpoints

use super::location::{Location, LocationId, LOCATION_ID_LENGTH};

/// Name given to every virtual location
pub const VIRTUAL_LOCATION_NAME: &str = "TurtleVirtualLocation";

/// Derives the location that stands in for the far end of a tunnel.
///
/// The first four bytes hold the tunnel id in big-endian order and the rest
/// is zero, so the mapping is deterministic and injective on tunnel ids.
pub fn from_tunnel(tunnel_id: u32) -> Location {
    Location::new(virtual_location_id(tunnel_id), VIRTUAL_LOCATION_NAME)
}

/// Identifier part of [`from_tunnel`]
pub fn virtual_location_id(tunnel_id: u32) -> LocationId {
    let mut bytes = [0u8; LOCATION_ID_LENGTH];
    bytes[..4].copy_from_slice(&tunnel_id.to_be_bytes());
    LocationId::from_bytes(bytes)
}

/// Recovers the tunnel id a virtual location was derived from.
///
/// Returns `None` when the trailing bytes are not all zero, which rules out
/// most real locations. Callers still have to check the tunnel exists.
pub fn tunnel_id_of(location: &LocationId) -> Option<u32> {
    let bytes = location.as_bytes();
    if bytes[4..].iter().any(|b| *b != 0) {
        return None;
    }
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_layout() {
        let location = from_tunnel(0x0102_0304);
        let id = location.id();
        let bytes = id.as_bytes();
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert!(bytes[4..].iter().all(|b| *b == 0));
        assert_eq!(location.name(), VIRTUAL_LOCATION_NAME);
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(from_tunnel(42), from_tunnel(42));
    }

    #[test]
    fn test_injective_on_sample() {
        let ids = [0u32, 1, 2, 255, 256, 0xffff, 0x1_0000, 0x7fff_ffff, 0x8000_0000, u32::MAX];
        let locations: HashSet<_> = ids.iter().map(|id| virtual_location_id(*id)).collect();
        assert_eq!(locations.len(), ids.len());
    }

    #[test]
    fn test_round_trip_tunnel_id() {
        for id in [0u32, 7, 0xdead_beef, u32::MAX] {
            assert_eq!(tunnel_id_of(&virtual_location_id(id)), Some(id));
        }
    }

    #[test]
    fn test_real_location_is_not_virtual() {
        let real = LocationId::from_bytes([0x11; LOCATION_ID_LENGTH]);
        assert_eq!(tunnel_id_of(&real), None);
    }
}
