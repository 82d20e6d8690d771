//! ovb: media transformation jobs for chat bots.
//!
//! A command and its chat context go in; one reply (a transformed file or an
//! error line) comes out. [`pipeline::JobService`] ties the stages together.

pub mod config;
pub mod console;
pub mod domain;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod resolver;
pub mod transfer;
pub mod utils;
pub mod workspace;

pub use error::{Error, Result};
