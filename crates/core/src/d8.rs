//! D8 flow-direction codec
//!
//! Translates D8 direction codes into grid offsets and back. Codes are the
//! eight powers of two from 1 to 128, clockwise starting at due east
//! (the ESRI convention):
//!
//! ```text
//!  32  64  128
//!  16   .    1
//!   8   4    2
//! ```
//!
//! Any other value (0, a nodata sentinel, a corrupt byte) means the cell has
//! no outgoing flow — a pit, sink or nodata cell — and is reported as `None`
//! rather than an error, since such cells are expected in normal data.

/// The eight valid D8 codes, clockwise from east.
pub const CODES: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// Moore-neighborhood (row, col) offsets in the same clockwise-from-east
/// order as [`CODES`]. Traversal scans neighbors in exactly this order, so
/// visiting order is reproducible.
pub const NEIGHBOR_OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // 1:   E
    (1, 1),   // 2:   SE
    (1, 0),   // 4:   S
    (1, -1),  // 8:   SW
    (0, -1),  // 16:  W
    (-1, -1), // 32:  NW
    (-1, 0),  // 64:  N
    (-1, 1),  // 128: NE
];

/// Index of a code within [`CODES`], or `None` if the value is not a valid
/// single direction (treated as no-flow).
#[inline]
fn code_index(code: u8) -> Option<usize> {
    if code != 0 && code.is_power_of_two() {
        Some(code.trailing_zeros() as usize)
    } else {
        None
    }
}

/// (row, col) offset of the single downstream neighbor for `code`.
///
/// Returns `None` for anything that is not one of the eight valid codes;
/// flow terminates at that cell.
#[inline]
pub fn offset(code: u8) -> Option<(isize, isize)> {
    code_index(code).map(|i| NEIGHBOR_OFFSETS[i])
}

/// The D8 code that points from a cell toward the neighbor at `(dr, dc)`.
#[inline]
pub fn code_for_offset(dr: isize, dc: isize) -> Option<u8> {
    NEIGHBOR_OFFSETS
        .iter()
        .position(|&(r, c)| r == dr && c == dc)
        .map(|i| CODES[i])
}

/// The code a neighbor at offset `(dr, dc)` from a cell must carry for its
/// flow to enter that cell. This is the inverse mapping the traversal uses
/// to find upstream contributors without scanning the whole grid.
#[inline]
pub fn inbound_code(dr: isize, dc: isize) -> Option<u8> {
    code_for_offset(-dr, -dc)
}

/// Whether `code` encodes an actual outgoing direction.
#[inline]
pub fn is_flow(code: u8) -> bool {
    code_index(code).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_match_codes() {
        assert_eq!(offset(1), Some((0, 1))); // E
        assert_eq!(offset(2), Some((1, 1))); // SE
        assert_eq!(offset(4), Some((1, 0))); // S
        assert_eq!(offset(8), Some((1, -1))); // SW
        assert_eq!(offset(16), Some((0, -1))); // W
        assert_eq!(offset(32), Some((-1, -1))); // NW
        assert_eq!(offset(64), Some((-1, 0))); // N
        assert_eq!(offset(128), Some((-1, 1))); // NE
    }

    #[test]
    fn test_invalid_codes_are_no_flow() {
        for code in [0u8, 3, 5, 9, 12, 100, 255] {
            assert_eq!(offset(code), None, "code {} should be no-flow", code);
            assert!(!is_flow(code));
        }
    }

    #[test]
    fn test_inbound_is_opposite() {
        // A neighbor to the east (0, 1) drains into us if it flows west (16).
        assert_eq!(inbound_code(0, 1), Some(16));
        // A neighbor to the north (-1, 0) drains into us if it flows south (4).
        assert_eq!(inbound_code(-1, 0), Some(4));
        assert_eq!(inbound_code(1, 1), Some(32)); // SE neighbor flows NW
        assert_eq!(inbound_code(-1, -1), Some(2)); // NW neighbor flows SE
    }

    #[test]
    fn test_roundtrip_offset_code() {
        for &code in &CODES {
            let (dr, dc) = offset(code).unwrap();
            assert_eq!(code_for_offset(dr, dc), Some(code));
        }
    }

    #[test]
    fn test_inbound_never_self() {
        assert_eq!(code_for_offset(0, 0), None);
        assert_eq!(inbound_code(0, 0), None);
    }
}
