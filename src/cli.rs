//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// market-bot - OCR-driven marketplace purchasing.
#[derive(Parser, Debug)]
#[command(name = "market-bot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Profile file (defaults to profiles.json next to the executable)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bot, driven by F8 (start), F9 (stop) and F7 (exit)
    Run(RunArgs),

    /// Manage threshold profiles
    #[command(subcommand)]
    Profiles(ProfilesCommand),

    /// Read the price region once and print the parsed number
    TestOcr(TestOcrArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Profile to use instead of the active one
    #[arg(short, long)]
    pub profile: Option<String>,
}

#[derive(Args, Debug)]
pub struct TestOcrArgs {
    /// Read the convertible-item price region
    #[arg(long)]
    pub convertible: bool,

    /// Also read the balance region
    #[arg(long)]
    pub balance: bool,
}

/// Subcommands for `market-bot profiles`
#[derive(Subcommand, Debug)]
pub enum ProfilesCommand {
    /// List profiles, marking the active one
    List,
    /// Print a profile as JSON (the active one by default)
    Show { name: Option<String> },
    /// Make a profile active
    Activate { name: String },
    /// Add a profile or replace one with the same name
    Set(SetProfileArgs),
    /// Delete a profile
    Remove { name: String },
}

#[derive(Args, Debug)]
pub struct SetProfileArgs {
    pub name: String,

    /// Buy at or below this unit price
    #[arg(long)]
    pub ideal: u64,

    /// Free-refresh above this unit price
    #[arg(long)]
    pub unacceptable: u64,

    /// Units the displayed price covers
    #[arg(long, default_value_t = 1)]
    pub volume: u64,

    #[arg(long, default_value_t = 150)]
    pub screenshot_delay_ms: u64,

    #[arg(long, default_value_t = 500)]
    pub loop_gap_ms: u64,

    #[arg(long)]
    pub convertible: bool,

    /// Buy one item and stop
    #[arg(long)]
    pub key_mode: bool,

    /// Estimate prices from the balance drop between purchases
    #[arg(long)]
    pub half_coin_mode: bool,

    /// Make the profile active
    #[arg(long)]
    pub activate: bool,
}
