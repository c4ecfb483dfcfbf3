use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, PartialEq)]
#[command(name = "gitmind")]
#[command(about = "Watch a git working folder, render commit diffs and manage the repository cache")]
pub struct Cli {
    /// Settings folder (defaults to the per-user config folder)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Monitor a working folder and report status and ref changes until Ctrl-C
    Watch { folder: PathBuf },

    /// Print the current status of a working folder
    Status {
        folder: PathBuf,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write before/after files for a commit, or a range with --to
    Diff {
        folder: PathBuf,
        commit: String,

        /// Diff `commit` against this revision instead of its parent
        #[arg(long)]
        to: Option<String>,

        /// Prefix content lines with their file index
        #[arg(long)]
        prefixes: bool,

        /// Open the result in the configured diff tool
        #[arg(long)]
        launch: bool,
    },

    /// Inspect or maintain the repository model cache
    Cache {
        folder: PathBuf,

        #[arg(value_enum)]
        action: CacheAction,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheAction {
    Show,
    Rebuild,
    Clear,
}
