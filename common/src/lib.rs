pub mod config;
pub mod frame;
pub mod grid;
pub mod models;
