pub mod providers;
pub mod sources;
pub mod types;
pub mod weather;
