//! # Armory CLI Module
//!
//! This module implements the CLI interface for Armory.
//!
//! ## Available Commands
//!
//! - `init` - Create the compendium and roster databases
//! - `load-pack` - Load authored content into the compendium
//! - `import` - Import a packed entry into the roster
//! - `sync` - Re-sync a roster mech from a packed mech
//! - `sync-pilot` - Re-sync a roster pilot and its mechs
//! - `show` - Print one entry
//! - `list` - List the ids of one entry type
//! - `export` - Write a registry archive
//! - `restore` - Load a registry archive

mod commands;

use crate::config::ArmoryConfig;
use armory_core::{ArmoryError, EntryType};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Armory - typed content registry for mech combat rules
///
/// Authored content lives in the compendium; imported, mutable pilots and
/// mechs live in the roster.
#[derive(Parser, Debug)]
#[command(name = "armory")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the config file (defaults to ./armory.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the compendium database
    #[arg(short = 'C', long, global = true)]
    pub compendium: Option<PathBuf>,

    /// Path to the roster database
    #[arg(short = 'R', long, global = true)]
    pub roster: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Which registry a command reads or writes.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Roster,
    Compendium,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create empty compendium and roster databases
    Init {
        /// Recreate the databases even if they exist
        #[arg(short, long)]
        force: bool,
    },

    /// Load a content pack (JSON object of entry type to packed records)
    LoadPack {
        /// Path to the pack file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Import a packed entry from a file into the roster
    Import {
        /// Entry type (pilot, mech, ...)
        #[arg(short = 't', long, value_parser = parse_entry_type)]
        entry_type: EntryType,

        /// Path to the packed record
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Re-sync a roster mech from a packed mech record
    Sync {
        /// Id of the roster mech
        #[arg(short, long)]
        mech: String,

        /// Path to the packed mech
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Re-sync a roster pilot from `{"pilot": ..., "mechs": [...]}`
    SyncPilot {
        /// Id of the roster pilot
        #[arg(short, long)]
        pilot: String,

        /// Path to the packed pilot bundle
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print one entry as stored
    Show {
        /// Entry type
        #[arg(short = 't', long, value_parser = parse_entry_type)]
        entry_type: EntryType,

        /// Entry id
        #[arg(short, long)]
        id: String,

        /// Print in packed (authored) form
        #[arg(long)]
        packed: bool,

        #[arg(short, long, value_enum, default_value_t = Side::Roster)]
        side: Side,
    },

    /// List the ids and names of one entry type
    List {
        /// Entry type
        #[arg(short = 't', long, value_parser = parse_entry_type)]
        entry_type: EntryType,

        #[arg(short, long, value_enum, default_value_t = Side::Roster)]
        side: Side,
    },

    /// Export a registry to a binary archive
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Side::Roster)]
        side: Side,
    },

    /// Restore a registry from a binary archive
    Restore {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Side::Roster)]
        side: Side,
    },
}

fn parse_entry_type(value: &str) -> Result<EntryType, String> {
    value.parse::<EntryType>().map_err(|e| e.to_string())
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli, config: ArmoryConfig) -> Result<(), ArmoryError> {
    let settings = Settings::resolve(config, cli.compendium, cli.roster)?;

    match cli.command {
        Commands::Init { force } => cmd_init(&settings, force),
        Commands::LoadPack { file } => cmd_load_pack(&settings, &file).await,
        Commands::Import { entry_type, file } => cmd_import(&settings, entry_type, &file).await,
        Commands::Sync { mech, file } => cmd_sync(&settings, &mech, &file).await,
        Commands::SyncPilot { pilot, file } => cmd_sync_pilot(&settings, &pilot, &file).await,
        Commands::Show {
            entry_type,
            id,
            packed,
            side,
        } => cmd_show(&settings, side, entry_type, &id, packed).await,
        Commands::List { entry_type, side } => cmd_list(&settings, side, entry_type).await,
        Commands::Export { output, side } => cmd_export(&settings, side, &output).await,
        Commands::Restore { input, side } => cmd_restore(&settings, side, &input).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn entry_type_flag_is_parsed() {
        let cli = Cli::try_parse_from(["armory", "list", "-t", "weapon_mod", "-s", "compendium"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Commands::List {
                entry_type: EntryType::WeaponMod,
                side: Side::Compendium,
            }
        ));
    }

    #[test]
    fn unknown_entry_type_is_rejected() {
        assert!(Cli::try_parse_from(["armory", "list", "-t", "talent"]).is_err());
    }
}
