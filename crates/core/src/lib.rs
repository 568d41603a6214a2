#![forbid(unsafe_code)]

pub mod aggregate;
pub mod error;
pub mod model;
pub mod queue;
pub mod scheduler;
pub mod time;

pub use error::SessionError;
pub use time::Clock;
