//! Request handlers.

pub mod client_config;
pub mod events;
pub mod health;
pub mod results;
pub mod schema;
pub mod uploads;

pub use client_config::*;
pub use events::*;
pub use health::*;
pub use results::*;
pub use schema::*;
pub use uploads::*;
