//! TCP server and client speaking the framed packet protocol.

pub mod auth;
pub mod server;
pub mod client;

pub use auth::{password_hash, UserStore};
pub use client::{DbClient, NetworkClient};
pub use server::DbServer;
