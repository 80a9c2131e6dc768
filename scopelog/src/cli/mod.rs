//! Command-line interface of the `scopelog` inspection tool

mod args;

pub use args::{Args, Command};
