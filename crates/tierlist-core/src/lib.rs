pub mod config;
pub mod db;
pub mod mode;
pub mod model;
pub mod rank;
pub mod roles;
pub mod store;
pub mod tier;

pub use mode::{Device, GameMode, Region};
pub use tier::Tier;
