//! Hand-landmark heuristics.
//!
//! Landmarks follow the 21-point hand topology (0 = wrist, 4 = thumb tip,
//! 8 = index tip, ...), in normalized image coordinates with y growing
//! downward.

use anyhow::{anyhow, Result};

pub const LANDMARK_COUNT: usize = 21;

const THUMB_TIP: usize = 4;
const INDEX_TIP: usize = 8;
const MIDDLE_PIP: usize = 10;
const MIDDLE_TIP: usize = 12;
const RING_PIP: usize = 14;
const RING_TIP: usize = 16;
const PINKY_PIP: usize = 18;
const PINKY_TIP: usize = 20;

/// Maximum thumb-to-index distance for the two tips to count as touching.
pub const OK_SIGN_TIP_DISTANCE: f32 = 0.05;

/// Confidence reported for a landmark-derived OK sign.
pub const OK_SIGN_CONFIDENCE: f32 = 0.85;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn distance(&self, other: &Landmark) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandLandmarks {
    points: [Landmark; LANDMARK_COUNT],
}

impl HandLandmarks {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Build from a flat `[x0, y0, z0, x1, ...]` slice of 63 values.
    pub fn from_flat(values: &[f32]) -> Result<Self> {
        if values.len() != LANDMARK_COUNT * 3 {
            return Err(anyhow!(
                "expected {} landmark values, got {}",
                LANDMARK_COUNT * 3,
                values.len()
            ));
        }
        let mut points = [Landmark::default(); LANDMARK_COUNT];
        for (point, xyz) in points.iter_mut().zip(values.chunks_exact(3)) {
            *point = Landmark {
                x: xyz[0],
                y: xyz[1],
                z: xyz[2],
            };
        }
        Ok(Self { points })
    }

    pub fn point(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    /// Thumb and index tips touching while middle, ring and pinky are raised.
    pub fn is_ok_sign(&self) -> bool {
        let p = &self.points;
        if p[THUMB_TIP].distance(&p[INDEX_TIP]) > OK_SIGN_TIP_DISTANCE {
            return false;
        }
        [(MIDDLE_TIP, MIDDLE_PIP), (RING_TIP, RING_PIP), (PINKY_TIP, PINKY_PIP)]
            .iter()
            .all(|&(tip, pip)| p[tip].y < p[pip].y)
    }
}
