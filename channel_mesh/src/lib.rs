//! Core library for generating structured channel bed meshes from surveyed
//! cross-sections, water-land borders and a terrain model.

pub mod config;
pub mod cross_lines;
pub mod element_count;
pub mod elements;
pub mod error;
pub mod features;
pub mod geometry;
pub mod interpolation;
pub mod io;
pub mod longitudinal;
pub mod orientation;
pub mod pipeline;
pub mod preparation;
pub mod quality;
pub mod store;
pub mod terrain;
pub mod vertices;

pub use error::{MeshError, Result};
