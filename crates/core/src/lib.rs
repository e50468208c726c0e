#![forbid(unsafe_code)]

pub mod model;
pub mod policy;
pub mod scoring;
pub mod time;

pub use time::Clock;
