pub mod kalshi;
pub mod range;
pub mod types;
