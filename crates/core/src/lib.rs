//! Domain records, client views and the pure transforms between them.

pub mod management;
pub mod profile;
pub mod scoring;
pub mod types;
pub mod updates;
pub mod validation;
