use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short = 'C',
        long = "directory",
        value_name = "DIR",
        help = "Build context directory"
    )]
    pub context_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Execute a recipe and produce an image descriptor")]
    Build {
        #[arg(value_name = "RECIPE", help = "Recipe file (defaults to kiln.toml)")]
        recipe: Option<PathBuf>,
    },

    #[command(about = "Check a recipe without executing it")]
    Validate {
        #[arg(value_name = "RECIPE", help = "Recipe file (defaults to kiln.toml)")]
        recipe: Option<PathBuf>,
    },

    #[command(about = "Initialize a sample kiln.toml recipe")]
    Init {
        #[arg(long, help = "Recipe name")]
        name: Option<String>,
    },

    #[command(about = "Manage build history")]
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    #[command(about = "Show recent builds")]
    Show {
        #[arg(short, long, help = "Number of entries to show")]
        count: Option<usize>,
    },

    #[command(about = "Clear build history")]
    Clear,
}

impl Cli {
    pub fn context_directory(&self) -> PathBuf {
        self.context_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap())
    }
}
