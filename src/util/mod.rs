//! Small helpers shared by the binary and the driver

pub mod resource;
pub mod time;
pub mod verification;
