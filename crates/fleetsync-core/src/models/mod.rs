//! Data models shared by the sync engine and the store client

mod mapping;
mod position;

pub use mapping::*;
pub use position::*;
