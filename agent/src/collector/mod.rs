//! Sample collection: session control, storage and symbolization

pub mod recorder;
pub mod session;
pub mod store;
pub mod symbols;
