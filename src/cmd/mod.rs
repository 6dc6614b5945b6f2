pub mod check;
pub mod config;
pub mod open;
pub mod play;
