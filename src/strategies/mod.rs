pub mod consensus;
pub mod cooling;
pub mod decision;
pub mod monitor;
pub mod peak;
pub mod types;
pub mod window;
