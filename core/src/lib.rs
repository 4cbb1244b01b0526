pub mod boot;
pub mod device;
pub mod harness;
pub mod host;
pub mod target;
pub mod tools;
pub mod types;
