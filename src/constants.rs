//! # Constants and type definitions for daylink
//!
//! This module centralizes the angular constants, default engine parameters and
//! common type aliases used throughout the `daylink` library.
//!
//! These definitions are used by all main modules, including the spatial index,
//! tracklet formation and track linking.

// -------------------------------------------------------------------------------------------------
// Angular constants
// -------------------------------------------------------------------------------------------------

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Numerical epsilon used for floating-point comparisons
pub const EPS: f64 = 1e-10;

// -------------------------------------------------------------------------------------------------
// Default engine parameters
// -------------------------------------------------------------------------------------------------

/// Maximum number of entries held by a leaf bucket of the spatial index
pub const DEFAULT_LEAF_SIZE: usize = 16;

/// Default in-memory output buffer: hold up to 1 GiB before purging to disk
pub const DEFAULT_OUTPUT_BUFFER_BYTES: usize = 1 << 30;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Sky-plane rate in degrees per day
pub type DegPerDay = f64;
/// Modified Julian Date (days)
pub type MJD = f64;

/// Identity of a detection in the input catalog
pub type DetectionId = i64;
