//! Core algorithms: map handling and Monte Carlo localization.

pub mod localization;
pub mod mapping;
