//! Daily high-temperature range contract decisions.
//!
//! Morning forecasts are combined into a weighted consensus, the live station
//! feed is watched around the forecast peak hour, and the day's estimate is
//! mapped onto the listed temperature-range contracts.

pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod market;
pub mod monitoring;
pub mod storage;
pub mod strategies;
