pub mod auth;
pub mod error;
pub mod files;
pub mod health;
