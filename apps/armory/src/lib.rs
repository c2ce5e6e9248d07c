//! # Armory
//!
//! Host application for the Armory content registry.
//!
//! Owns everything armory-core leaves to its host: the redb files behind
//! the compendium and roster registries, configuration, and the CLI.

pub mod cli;
pub mod config;
