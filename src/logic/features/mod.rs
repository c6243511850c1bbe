//! Features Module - sensor readings as detector input
//!
//! - `vector.rs`: `RawReading` (as stored) and `FeatureVector` (coerced)

pub mod vector;

pub use vector::{FeatureVector, RawReading, RawValue};
