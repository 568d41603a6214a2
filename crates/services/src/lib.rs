#![forbid(unsafe_code)]

pub mod error;
pub mod review_engine;

pub use srs_core::Clock;

pub use error::ReviewEngineError;
pub use review_engine::{RatingOutcome, ReviewEngine};
