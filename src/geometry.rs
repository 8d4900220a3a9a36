//! Telescope geometry: the sensor-ID → plane table and the per-plane
//! pre-alignment transform applied to every raw hit.
//!
//! The pre-alignment is a first-order correction taken from an earlier,
//! coarse alignment pass. It only has to bring hits close enough that the
//! candidate finder's distance cut works; the global alignment fit that
//! consumes our records determines the final constants.
//!
//! Plane 0 is the reference plane and is never transformed.

use std::collections::HashMap;

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::hit::{Hit, PlaneHits, RawHit};

/// Raw hit positions are delivered in millimetres; the pipeline works in micrometres.
pub const MM_TO_UM: f64 = 1000.0;

/// Small-angle rigid transform for one plane.
///
/// Offsets are in micrometres, angles in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaneTransform {
    pub off_x: f64,
    pub off_y: f64,
    /// Rotation about the x axis.
    pub theta_x: f64,
    /// Rotation about the y axis.
    pub theta_y: f64,
    /// Rotation about the z (beam) axis.
    pub theta_z: f64,
}

impl PlaneTransform {
    /// The identity transform (all constants zero).
    pub const IDENTITY: PlaneTransform = PlaneTransform {
        off_x: 0.0,
        off_y: 0.0,
        theta_x: 0.0,
        theta_y: 0.0,
        theta_z: 0.0,
    };

    /// Build from the five constants in `[off_x, off_y, theta_x, theta_y, theta_z]` order.
    pub fn from_constants(c: [f64; 5]) -> Self {
        Self {
            off_x: c[0],
            off_y: c[1],
            theta_x: c[2],
            theta_y: c[3],
            theta_z: c[4],
        }
    }

    /// Linear part of the transform acting on (x, y).
    pub fn matrix(&self) -> Matrix2<f64> {
        let (sx, cx) = self.theta_x.sin_cos();
        let (sy, cy) = self.theta_y.sin_cos();
        let (sz, cz) = self.theta_z.sin_cos();
        Matrix2::new(
            cy * cz,
            -sx * sy * cz + cx * sz,
            -cy * sz,
            sx * sy * sz + cx * cz,
        )
    }

    /// Apply the transform to a transverse position (micrometres).
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let v = self.matrix() * Vector2::new(x, y) + Vector2::new(self.off_x, self.off_y);
        (v.x, v.y)
    }
}

/// Maps sensor IDs to 0-based plane indices.
///
/// Plane order is the order in which sensor IDs are listed, which must
/// follow the beam direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorLayout {
    sensor_ids: Vec<i32>,
    index: HashMap<i32, usize>,
}

impl SensorLayout {
    /// Build a layout from sensor IDs listed in plane order.
    pub fn new(sensor_ids: Vec<i32>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(sensor_ids.len());
        for (plane, &id) in sensor_ids.iter().enumerate() {
            if index.insert(id, plane).is_some() {
                return Err(ConfigError::DuplicateSensor(id));
            }
        }
        Ok(Self { sensor_ids, index })
    }

    /// Layout where sensor `i` sits on plane `i`.
    pub fn sequential(n_planes: usize) -> Self {
        let sensor_ids: Vec<i32> = (0..n_planes as i32).collect();
        let index = sensor_ids
            .iter()
            .enumerate()
            .map(|(plane, &id)| (id, plane))
            .collect();
        Self { sensor_ids, index }
    }

    /// Number of planes in the stack.
    pub fn n_planes(&self) -> usize {
        self.sensor_ids.len()
    }

    /// Plane index of a sensor, if it belongs to the stack.
    pub fn plane_of(&self, sensor_id: i32) -> Option<usize> {
        self.index.get(&sensor_id).copied()
    }

    /// Sensor IDs in plane order.
    pub fn sensor_ids(&self) -> &[i32] {
        &self.sensor_ids
    }
}

/// Everything the preprocessor needs to turn raw hits into [`Hit`]s.
#[derive(Debug, Clone)]
pub struct TelescopeGeometry {
    pub layout: SensorLayout,
    /// Pre-alignment constants for planes 1, 2, ... Planes without an
    /// entry use the identity transform.
    pub transforms: Vec<PlaneTransform>,
}

impl TelescopeGeometry {
    pub fn new(layout: SensorLayout, transforms: Vec<PlaneTransform>) -> Self {
        Self { layout, transforms }
    }

    pub fn n_planes(&self) -> usize {
        self.layout.n_planes()
    }

    /// Transform used for a plane.
    pub fn transform_for(&self, plane: usize) -> PlaneTransform {
        if plane == 0 {
            return PlaneTransform::IDENTITY;
        }
        self.transforms
            .get(plane - 1)
            .copied()
            .unwrap_or(PlaneTransform::IDENTITY)
    }

    /// Convert one raw hit to the common frame.
    ///
    /// Scales to micrometres and applies the plane's pre-alignment.
    /// Returns `None` for sensors that are not part of the layout.
    pub fn preprocess(&self, raw: &RawHit) -> Option<Hit> {
        let plane = self.layout.plane_of(raw.sensor_id)?;
        let x = raw.position[0] * MM_TO_UM;
        let y = raw.position[1] * MM_TO_UM;
        let z = raw.position[2] * MM_TO_UM;
        let (x, y) = if plane == 0 {
            (x, y)
        } else {
            self.transform_for(plane).apply(x, y)
        };
        Some(Hit::new(x, y, z, plane))
    }

    /// Preprocess all hits of an event and group them by plane.
    pub fn build_plane_hits(&self, raw_hits: &[RawHit]) -> PlaneHits {
        let mut hits = PlaneHits::new(self.n_planes());
        for raw in raw_hits {
            match self.preprocess(raw) {
                Some(hit) => {
                    hits.push(hit);
                }
                None => debug!("Ignoring hit from unknown sensor {}", raw.sensor_id),
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let (x, y) = PlaneTransform::IDENTITY.apply(12.5, -7.0);
        assert_eq!((x, y), (12.5, -7.0));
    }

    #[test]
    fn test_offsets_only() {
        let t = PlaneTransform::from_constants([10.0, -20.0, 0.0, 0.0, 0.0]);
        let (x, y) = t.apply(1.0, 2.0);
        assert!((x - 11.0).abs() < 1e-12);
        assert!((y + 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_about_z_matches_formula() {
        let tz = 0.01_f64;
        let t = PlaneTransform::from_constants([0.0, 0.0, 0.0, 0.0, tz]);
        let (x, y) = t.apply(100.0, 50.0);
        // X' = cos(tz) x + sin(tz) y ; Y' = -sin(tz) x + cos(tz) y
        assert!((x - (tz.cos() * 100.0 + tz.sin() * 50.0)).abs() < 1e-9);
        assert!((y - (-tz.sin() * 100.0 + tz.cos() * 50.0)).abs() < 1e-9);
    }

    #[test]
    fn test_full_formula() {
        let (ox, oy, ax, ay, az) = (5.0, -3.0, 0.002, -0.001, 0.003);
        let t = PlaneTransform::from_constants([ox, oy, ax, ay, az]);
        let (x0, y0) = (1234.0, -567.0);
        let (x, y) = t.apply(x0, y0);
        let ex = ay.cos() * az.cos() * x0
            + (-ax.sin() * ay.sin() * az.cos() + ax.cos() * az.sin()) * y0
            + ox;
        let ey = -ay.cos() * az.sin() * x0
            + (ax.sin() * ay.sin() * az.sin() + ax.cos() * az.cos()) * y0
            + oy;
        assert!((x - ex).abs() < 1e-9);
        assert!((y - ey).abs() < 1e-9);
    }

    #[test]
    fn test_plane_zero_is_never_transformed() {
        let geometry = TelescopeGeometry::new(
            SensorLayout::sequential(3),
            vec![PlaneTransform::from_constants([100.0, 100.0, 0.0, 0.0, 0.0])],
        );
        let h0 = geometry
            .preprocess(&RawHit {
                sensor_id: 0,
                position: [1.0, 2.0, 3.0],
            })
            .unwrap();
        assert_eq!((h0.x, h0.y, h0.z), (1000.0, 2000.0, 3000.0));

        let h1 = geometry
            .preprocess(&RawHit {
                sensor_id: 1,
                position: [1.0, 2.0, 3.0],
            })
            .unwrap();
        assert_eq!((h1.x, h1.y, h1.z), (1100.0, 2100.0, 3000.0));

        // Plane 2 has no constants configured: identity
        let h2 = geometry
            .preprocess(&RawHit {
                sensor_id: 2,
                position: [1.0, 2.0, 3.0],
            })
            .unwrap();
        assert_eq!((h2.x, h2.y), (1000.0, 2000.0));
    }

    #[test]
    fn test_layout_lookup() {
        let layout = SensorLayout::new(vec![10, 11, 12, 20]).unwrap();
        assert_eq!(layout.n_planes(), 4);
        assert_eq!(layout.plane_of(12), Some(2));
        assert_eq!(layout.plane_of(20), Some(3));
        assert_eq!(layout.plane_of(99), None);
        assert_eq!(
            SensorLayout::new(vec![1, 2, 1]),
            Err(ConfigError::DuplicateSensor(1))
        );
    }

    #[test]
    fn test_unknown_sensor_is_dropped() {
        let geometry = TelescopeGeometry::new(SensorLayout::new(vec![4, 5]).unwrap(), vec![]);
        let hits = geometry.build_plane_hits(&[
            RawHit {
                sensor_id: 4,
                position: [0.0, 0.0, 0.0],
            },
            RawHit {
                sensor_id: 9,
                position: [0.0, 0.0, 0.0],
            },
            RawHit {
                sensor_id: 5,
                position: [0.0, 0.0, 10.0],
            },
        ]);
        assert_eq!(hits.multiplicities(), vec![1, 1]);
    }
}
