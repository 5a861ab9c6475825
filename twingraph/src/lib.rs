mod client;
mod config;
mod credentials;
mod models;
mod token;

pub use client::*;
pub use config::*;
pub use credentials::*;
pub use models::*;
pub use token::*;
