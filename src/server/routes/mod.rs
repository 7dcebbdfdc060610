pub mod auth;
pub mod batches;
pub mod images;
