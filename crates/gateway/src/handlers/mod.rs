//! Request handlers

pub mod chat;
pub mod clusters;
pub mod health;
pub mod resolve;
