pub mod api;
pub mod cache;
pub mod config;
pub mod desk;
pub mod model;
pub mod notify;
pub mod session;
pub mod workflow;
