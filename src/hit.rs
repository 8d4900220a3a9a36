//! Hit types: raw sensor measurements and plane-sorted hits in the
//! common telescope frame.
//!

/// A measurement as delivered by the hit reconstruction, before any
/// geometric processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawHit {
    /// Sensor identifier, resolved to a plane index through a
    /// [`SensorLayout`](crate::SensorLayout).
    pub sensor_id: i32,
    /// Position in millimetres, `[x, y, z]`.
    pub position: [f64; 3],
}

/// A hit in the common telescope frame.
///
/// All coordinates are in micrometres. `z` is the longitudinal (beam) axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// 0-based index of the plane that produced the hit.
    pub plane: usize,
}

impl Hit {
    pub fn new(x: f64, y: f64, z: f64, plane: usize) -> Self {
        Self { x, y, z, plane }
    }

    /// Transverse (x, y) distance to another hit.
    #[inline]
    pub fn transverse_distance(&self, other: &Hit) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// The hits of one event, grouped by plane.
///
/// Within a plane hits keep their insertion order, which fixes the
/// enumeration order of the candidate finder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaneHits {
    planes: Vec<Vec<Hit>>,
}

impl PlaneHits {
    /// Empty hit sets for `n_planes` planes.
    pub fn new(n_planes: usize) -> Self {
        Self {
            planes: vec![Vec::new(); n_planes],
        }
    }

    /// Append a hit to the set of its plane.
    ///
    /// Hits whose plane index is outside the configured stack are ignored
    /// and `false` is returned.
    pub fn push(&mut self, hit: Hit) -> bool {
        match self.planes.get_mut(hit.plane) {
            Some(plane) => {
                plane.push(hit);
                true
            }
            None => false,
        }
    }

    /// Number of planes.
    pub fn n_planes(&self) -> usize {
        self.planes.len()
    }

    /// Hits of one plane, in insertion order.
    pub fn plane(&self, index: usize) -> &[Hit] {
        &self.planes[index]
    }

    /// Iterate over the per-plane hit sets in plane order.
    pub fn iter(&self) -> impl Iterator<Item = &[Hit]> {
        self.planes.iter().map(|p| p.as_slice())
    }

    /// Per-plane hit multiplicities.
    pub fn multiplicities(&self) -> Vec<usize> {
        self.planes.iter().map(Vec::len).collect()
    }

    /// Total number of hits across all planes.
    pub fn total(&self) -> usize {
        self.planes.iter().map(Vec::len).sum()
    }

    /// `true` if at least one plane has no hit, in which case no track
    /// candidate can exist.
    pub fn has_empty_plane(&self) -> bool {
        self.planes.iter().any(Vec::is_empty)
    }

    /// `true` if every plane holds exactly one hit.
    pub fn is_single_hit(&self) -> bool {
        self.planes.iter().all(|p| p.len() == 1)
    }
}
