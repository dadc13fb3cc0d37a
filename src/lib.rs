pub mod canonical;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod export;
pub mod input;
pub mod normalize;
pub mod recipe;
pub mod session;
pub mod step;
