pub mod controller;
pub mod error;
pub mod models;
pub mod platform;
pub mod receiver;
pub mod settings;
