//! Data types shared across crates

pub mod events;
pub mod profile;
pub mod status;
