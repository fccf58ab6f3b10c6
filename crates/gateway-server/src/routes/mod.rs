pub mod chat;
pub mod misc;
pub mod models;
pub mod sessions;
