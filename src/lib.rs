pub mod api;
pub mod models;
pub mod sensors;
pub mod services;
pub mod utils;
