pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod pipeline;
pub mod traits;
pub mod workdir;
