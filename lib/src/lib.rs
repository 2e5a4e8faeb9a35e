#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod observe;
pub mod reconcile;
pub mod util;

#[cfg(test)]
mod testing;

pub use error::Error;
pub use error::Result;
