//! Module implement the two distance measures used by the geo index:
//! squared normalised mole distance (cheap, used for comparison and
//! pot-pruning) and great-circle meters (derived from SNMD only when a
//! caller-facing distance is needed).

/// Mean earth radius in meters, matching the source's constant.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Unit-sphere embedding of a (lat, lon) pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub fn embed(lat: f64, lon: f64) -> Point3 {
    let lat_r = lat.to_radians();
    let lon_r = lon.to_radians();
    Point3 { x: lat_r.cos() * lon_r.cos(), y: lat_r.cos() * lon_r.sin(), z: lat_r.sin() }
}

/// Squared Euclidean distance between two unit-sphere embeddings — the
/// "mole distance", as if tunnelled straight through the earth.
pub fn snmd(a: Point3, b: Point3) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    dx * dx + dy * dy + dz * dz
}

/// Convert a squared mole distance to great-circle meters.
pub fn snmd_to_meters(snmd: f64) -> f64 {
    2.0 * EARTH_RADIUS_M * (snmd.sqrt() / 2.0).asin()
}

/// Convert a great-circle distance in meters to its equivalent SNMD, for
/// comparing a query radius against stored SNMD values without a sqrt
/// per candidate.
pub fn meters_to_snmd(meters: f64) -> f64 {
    let half_chord = (meters / (2.0 * EARTH_RADIUS_M)).sin();
    4.0 * half_chord * half_chord
}

/// The caller-selected set of fixed reference points used for
/// pot-pruning. Each variant names a regular polyhedron whose vertices
/// are taken as reference points on the unit sphere.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FixedPointSet {
    NorthSouth,
    Triangle,
    Tetrahedron,
    Bipyramid5,
    Octahedron6,
    Cube8,
}

impl FixedPointSet {
    pub fn points(self) -> Vec<Point3> {
        match self {
            FixedPointSet::NorthSouth => {
                vec![Point3 { x: 0.0, y: 0.0, z: 1.0 }, Point3 { x: 0.0, y: 0.0, z: -1.0 }]
            }
            FixedPointSet::Triangle => (0..3)
                .map(|i| {
                    let theta = (i as f64) * std::f64::consts::TAU / 3.0;
                    Point3 { x: theta.cos(), y: theta.sin(), z: 0.0 }
                })
                .collect(),
            FixedPointSet::Tetrahedron => {
                let a = 1.0 / 3f64.sqrt();
                vec![
                    Point3 { x: a, y: a, z: a },
                    Point3 { x: a, y: -a, z: -a },
                    Point3 { x: -a, y: a, z: -a },
                    Point3 { x: -a, y: -a, z: a },
                ]
            }
            FixedPointSet::Bipyramid5 => {
                let mut pts: Vec<Point3> = (0..5)
                    .map(|i| {
                        let theta = (i as f64) * std::f64::consts::TAU / 5.0;
                        Point3 { x: theta.cos(), y: theta.sin(), z: 0.0 }
                    })
                    .collect();
                pts.push(Point3 { x: 0.0, y: 0.0, z: 1.0 });
                pts.push(Point3 { x: 0.0, y: 0.0, z: -1.0 });
                pts
            }
            FixedPointSet::Octahedron6 => vec![
                Point3 { x: 1.0, y: 0.0, z: 0.0 },
                Point3 { x: -1.0, y: 0.0, z: 0.0 },
                Point3 { x: 0.0, y: 1.0, z: 0.0 },
                Point3 { x: 0.0, y: -1.0, z: 0.0 },
                Point3 { x: 0.0, y: 0.0, z: 1.0 },
                Point3 { x: 0.0, y: 0.0, z: -1.0 },
            ],
            FixedPointSet::Cube8 => {
                let a = 1.0 / 3f64.sqrt();
                let mut pts = Vec::with_capacity(8);
                for &sx in &[-a, a] {
                    for &sy in &[-a, a] {
                        for &sz in &[-a, a] {
                            pts.push(Point3 { x: sx, y: sy, z: sz });
                        }
                    }
                }
                pts
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snmd_zero_for_identical_points() {
        let p = embed(12.0, 34.0);
        assert!(snmd(p, p) < 1e-12);
    }

    #[test]
    fn test_meters_roundtrip() {
        let meters = 150_000.0;
        let back = snmd_to_meters(meters_to_snmd(meters));
        assert!((back - meters).abs() < 1.0);
    }

    #[test]
    fn test_antipodal_distance_is_max() {
        let north = embed(90.0, 0.0);
        let south = embed(-90.0, 0.0);
        let d = snmd_to_meters(snmd(north, south));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }
}
