//! `evlog` command line front end
//!
//! [`config`] holds the argument parser and the TOML settings file;
//! [`commands`] implements each subcommand against a store and an output
//! sink.

pub mod commands;
pub mod config;
