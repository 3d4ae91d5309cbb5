pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod io;
pub mod mutation;
pub mod selection;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use error::{Result, ReviewError};
