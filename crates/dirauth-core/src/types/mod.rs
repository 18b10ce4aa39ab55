//! Core types for Dirauth

mod endpoint;
mod group;
mod user;

pub use endpoint::*;
pub use group::*;
pub use user::*;
