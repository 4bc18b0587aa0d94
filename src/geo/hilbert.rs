//! Module implement the Hilbert-curve linearisation of a lat/lon
//! coordinate into a 54-bit integer, preserving spatial locality in a
//! single dimension.
//!
//! Grounded on the source's `GeoIndex_Hilbert`/`GeoMkHilbert`: the
//! hemisphere bit `z` is seeded before the loop and shifted left by 2
//! alongside every one of the 26 iterations of the standard Hilbert
//! quadrant rotation, so it ends up in the code's high-order bits rather
//! than folded in as a low bit afterwards.

const ITERATIONS: u32 = 26;
const SCALE: f64 = (1u64 << 25) as f64;

/// `hilbert(lat, lon)`: assumes both are already validated in range.
pub fn encode(lat: f64, lon: f64) -> u64 {
    let (hemisphere, lon_folded) = if lon < 0.0 { (0u64, lon + 180.0) } else { (1u64, lon) };

    let y = ((lat + 90.0) / 180.0 * SCALE) as u64;
    let x = (lon_folded / 180.0 * SCALE) as u64;

    let mut x = x & ((1u64 << 25) - 1);
    let mut y = y & ((1u64 << 25) - 1);

    let mut result: u64 = hemisphere;
    for i in (0..ITERATIONS).rev() {
        let xi = (x >> i) & 1;
        let yi = (y >> i) & 1;
        result = (result << 2) | quadrant_bits(xi, yi);

        // Rotate the remaining, lower bits of (x, y) according to which
        // quadrant this iteration fell in, so the next iteration walks
        // the curve inside the correctly-oriented sub-square.
        if yi == 0 {
            if xi == 1 {
                x = !x;
                y = !y;
            }
            std::mem::swap(&mut x, &mut y);
        }
    }

    result
}

fn quadrant_bits(xi: u64, yi: u64) -> u64 {
    match (xi, yi) {
        (0, 0) => 0,
        (0, 1) => 1,
        (1, 1) => 2,
        (1, 0) => 3,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_54_bits() {
        let h = encode(45.0, 45.0);
        assert!(h < (1u64 << 54));
    }

    #[test]
    fn test_hemisphere_bit_matches_sign() {
        let hemisphere_bit = 1u64 << (ITERATIONS * 2);
        let east = encode(10.0, 10.0);
        let west = encode(10.0, -10.0);
        assert_eq!(east & hemisphere_bit, hemisphere_bit);
        assert_eq!(west & hemisphere_bit, 0);
    }

    #[test]
    fn test_nearby_points_have_close_codes() {
        let a = encode(0.0, 0.0);
        let b = encode(0.001, 0.001);
        let c = encode(80.0, -170.0);
        let near = (a as i128 - b as i128).abs();
        let far = (a as i128 - c as i128).abs();
        assert!(near < far);
    }
}
