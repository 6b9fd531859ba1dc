//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the renderer:
//! - Math types and left-handed projection helpers
//! - Bounding volumes and containment tests
//! - Generational slot pools
//! - Logging utilities

pub mod math;
pub mod bounds;
pub mod collections;
pub mod logging;
