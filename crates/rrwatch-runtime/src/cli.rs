//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_CONFIG_PATH: &str = "rrwatch.toml";

#[derive(Parser)]
#[command(
    name = "rrwatch",
    about = "Retro Rewind room tracker, notifier and session VR tracker"
)]
pub struct Cli {
    /// Config file (TOML). Missing file means defaults.
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "RRWATCH_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Notify on high-VR rooms, joinable slots and watchlisted players
    Notify(PollOpts),
    /// Live terminal view of tracked rooms
    Dashboard(PollOpts),
    /// Track your own VR race by race
    Session(PollOpts),
    /// Load and validate the config, then exit
    CheckConfig,
}

#[derive(clap::Args, Default)]
pub struct PollOpts {
    /// Override the poll interval from the config, in seconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,
}
