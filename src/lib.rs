// Rakkan image watermarking pipeline library

pub mod auth;
pub mod blobstore;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod logging;
pub mod processor;
pub mod queue;
pub mod records;
pub mod server;
pub mod worker;
