//! Data models

pub mod merchant;
pub mod device;
pub mod access_log;

pub use merchant::*;
pub use device::*;
pub use access_log::*;
