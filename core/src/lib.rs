pub mod cli;
pub mod config;
pub mod executor;
pub mod history;
pub mod image;
pub mod logger;
pub mod parser;
pub mod recipe;
pub mod runner;
pub mod staging;

pub use cli::{Cli, Commands, HistoryCommands};
pub use config::Config;
pub use executor::{BuildError, CommandRunner, ExecutionResult, ShellRunner, StepUpdate};
pub use history::{BuildHistory, BuildHistoryEntry, BuildStepResult};
pub use image::{Entrypoint, ImageDescriptor};
pub use parser::{DiagnosticParser, LogEntry, LogLevel};
pub use recipe::{BuildStep, ImageConfig, Recipe};
pub use runner::{BuildContext, BuildResult, BuildRunner, BuildStatus, CancelFlag};
pub use staging::{DirSource, MemorySource, SourceProvider, StagingEnvironment};
