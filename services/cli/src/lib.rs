//! Terminal front end for the team introduction service.

pub mod config;
pub mod console;
pub mod input;
