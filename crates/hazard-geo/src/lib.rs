//! Tiered geolocation for the road-hazard detection pipeline.
//!
//! This crate provides:
//! - The device location provider seam
//! - The resolver walking GPS → IP → default fallback tiers
//! - A continuous background watch with last-write-wins state

pub mod error;
pub mod provider;
pub mod resolver;

pub use error::{GeoError, GeoResult};
pub use provider::{Accuracy, DeviceLocationProvider, NoDeviceLocation};
pub use resolver::{GeoResolver, GeoResolverConfig};
