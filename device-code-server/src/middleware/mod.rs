//! Request authentication

pub mod admin;
pub mod signature;
