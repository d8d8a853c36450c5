//! Archimedean spiral waypoint generation.
//!
//! Pure and deterministic: trajectory parameters in, an ordered waypoint
//! sequence out. The generator never blocks and performs no I/O; the motion
//! gateway consumes the sequence as a Cartesian path request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{GeometryError, Pose, Vec3};

/// Errors produced by spiral generation.
#[derive(Error, Debug)]
pub enum SpiralError {
    /// Parameters violated their invariants; rejected before any computation.
    #[error("invalid spiral parameters: {0}")]
    InvalidParameters(String),

    /// The center pose carried a non-normalized orientation.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Parameters describing one spiral path.
///
/// `num_points` and `loops` jointly determine the angular step between
/// samples; `max_radius` is the distance from the spiral's end to its center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpiralParameters {
    /// Number of waypoints to produce. Must be at least 1.
    pub num_points: u32,
    /// Radius at the outer end of the spiral, in meters. Must be >= 0.
    pub max_radius: f64,
    /// Number of revolutions the spiral winds through. Must be > 0.
    pub loops: f64,
    /// When true, the sequence starts at the outer radius and winds inward;
    /// when false it starts at the center and winds outward.
    pub start_outside: bool,
}

impl SpiralParameters {
    /// Check the parameter invariants without generating anything.
    pub fn validate(&self) -> Result<(), SpiralError> {
        if self.num_points < 1 {
            return Err(SpiralError::InvalidParameters(format!(
                "num_points must be at least 1, got {}",
                self.num_points
            )));
        }
        if self.loops <= 0.0 || !self.loops.is_finite() {
            return Err(SpiralError::InvalidParameters(format!(
                "loops must be positive, got {}",
                self.loops
            )));
        }
        if self.max_radius < 0.0 || !self.max_radius.is_finite() {
            return Err(SpiralError::InvalidParameters(format!(
                "max_radius must be non-negative, got {}",
                self.max_radius
            )));
        }
        Ok(())
    }
}

/// Generate the spiral waypoint sequence around `center`.
///
/// The spiral lies in the XY plane of `center` with Z held constant; every
/// waypoint carries the center's orientation unchanged. With `start_outside`
/// the sequence is reversed so motion begins at the outer radius and winds
/// inward.
pub fn generate(center: &Pose, params: &SpiralParameters) -> Result<Vec<Pose>, SpiralError> {
    params.validate()?;
    center.validate()?;

    let theta_total = params.loops * 2.0 * std::f64::consts::PI;
    let theta_step = theta_total / f64::from(params.num_points);
    let b = params.max_radius / (2.0 * std::f64::consts::PI * params.loops);

    let mut waypoints = Vec::with_capacity(params.num_points as usize);
    for i in 0..params.num_points {
        let theta = f64::from(i) * theta_step;
        let r = b * theta;
        waypoints.push(Pose {
            position: Vec3::new(
                center.position.x + r * theta.cos(),
                center.position.y + r * theta.sin(),
                center.position.z,
            ),
            orientation: center.orientation,
        });
    }

    if params.start_outside {
        waypoints.reverse();
    }

    Ok(waypoints)
}
