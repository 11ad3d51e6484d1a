// src/materials/mod.rs
//! Materials and per-object material instances.

mod instance;
mod material;

pub use instance::MaterialInstance;
pub use material::{Material, MaterialFlags};
