use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use kiln_core::logger::Logger;
use kiln_core::parser::{LogEntry, LogLevel};
use kiln_core::{
    BuildContext, BuildHistory, BuildHistoryEntry, BuildResult, BuildRunner, BuildStepResult,
    CancelFlag, Cli, Commands, Config, DirSource, HistoryCommands, Recipe, ShellRunner, StepUpdate,
};

fn resolve_recipe_path(context_dir: &Path, recipe: Option<&Path>) -> PathBuf {
    match recipe {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => context_dir.join(path),
        None => context_dir.join("kiln.toml"),
    }
}

async fn run_build(context_dir: &Path, recipe_path: Option<&Path>) -> Result<()> {
    let config = Config::load(context_dir)?;
    let recipe = Recipe::load_from_file(resolve_recipe_path(context_dir, recipe_path))?;

    let recipe_name = recipe.display_name().to_string();
    let base_image = recipe.image.base.clone();

    let logger = Logger::new();
    logger.log(
        LogLevel::Info,
        &format!("Building {} (base: {})", recipe_name, base_image),
    );

    let (log_tx, mut log_rx) = mpsc::unbounded_channel::<LogEntry>();
    let (step_tx, mut step_rx) = mpsc::unbounded_channel();

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let log_task = tokio::spawn(async move {
        let logger = Logger::new();
        let mut errors = 0usize;
        let mut warnings = 0usize;
        while let Some(entry) = log_rx.recv().await {
            match entry.level {
                LogLevel::Error => errors += 1,
                LogLevel::Warning => warnings += 1,
                _ => {}
            }
            logger.log_entry(&entry);
        }
        (errors, warnings)
    });

    let step_task = tokio::spawn(async move {
        let logger = Logger::new();
        let mut steps: Vec<BuildStepResult> = Vec::new();
        let mut current = String::new();
        while let Some(update) = step_rx.recv().await {
            match update {
                StepUpdate::Started { description, .. } => {
                    logger.log(LogLevel::Info, &format!("Step: {}", description));
                    current = description;
                }
                StepUpdate::Finished { result, .. } => {
                    steps.push(BuildStepResult {
                        description: current.clone(),
                        duration: result.duration,
                        success: result.success,
                    });
                }
            }
        }
        steps
    });

    let ctx = BuildContext::new(
        recipe,
        config.staging_dir(context_dir),
        log_tx,
        step_tx,
    )
    .with_cancel(cancel);

    let runner = BuildRunner::new(ShellRunner::new(), DirSource::new(context_dir.to_path_buf()));
    let result = runner.execute(&ctx).await?;

    // Dropping the context closes both channels so the tasks drain and stop.
    drop(ctx);
    let (errors, warnings) = log_task.await?;
    let steps = step_task.await?;

    record_history(&config, &recipe_name, &result, steps, errors, warnings)?;

    match result {
        BuildResult::Succeeded {
            image, duration, ..
        } => {
            logger.log(
                LogLevel::Info,
                &format!(
                    "Build succeeded in {:.1}s ({} errors, {} warnings)",
                    duration, errors, warnings
                ),
            );
            println!("{}", image);
            Ok(())
        }
        BuildResult::Rejected { error } => {
            logger.log(LogLevel::Error, &format!("Recipe rejected: {}", error));
            std::process::exit(1);
        }
        BuildResult::Failed { step, error, .. } => {
            logger.log(
                LogLevel::Error,
                &format!("Build failed at step {}: {}", step, error),
            );
            std::process::exit(1);
        }
    }
}

fn record_history(
    config: &Config,
    recipe_name: &str,
    result: &BuildResult,
    steps: Vec<BuildStepResult>,
    errors: usize,
    warnings: usize,
) -> Result<()> {
    let mut history = BuildHistory::new(config.storage_path(), config.history.max_builds)
        .context("Failed to load build history")?;

    let mut entry = BuildHistoryEntry::new(recipe_name.to_string());
    for step in steps {
        entry.add_step(step);
    }

    match result {
        BuildResult::Succeeded {
            image, duration, ..
        } => entry.finalize(Some(image.build_id), *duration, true, errors, warnings),
        BuildResult::Rejected { .. } => entry.finalize(None, 0.0, false, errors, warnings),
        BuildResult::Failed { duration, .. } => {
            entry.finalize(None, *duration, false, errors, warnings)
        }
    }

    history.add_entry(entry)
}

fn validate_recipe(context_dir: &Path, recipe_path: Option<&Path>) -> Result<()> {
    let logger = Logger::new();
    let recipe = Recipe::load_from_file(resolve_recipe_path(context_dir, recipe_path))?;

    match recipe.validate() {
        Ok(()) => {
            logger.log(
                LogLevel::Info,
                &format!(
                    "Recipe {} is valid ({} steps)",
                    recipe.display_name(),
                    recipe.steps.len()
                ),
            );
            Ok(())
        }
        Err(error) => {
            logger.log(LogLevel::Error, &error.to_string());
            std::process::exit(1);
        }
    }
}

fn init_recipe(context_dir: &Path, name: Option<String>) -> Result<()> {
    let recipe_path = context_dir.join("kiln.toml");

    if recipe_path.exists() {
        anyhow::bail!(
            "kiln.toml already exists at {}. Remove it first if you want to reinitialize.",
            recipe_path.display()
        );
    }

    let name = name.unwrap_or_else(|| "hello-java".to_string());
    let template = format!(
        r#"name = "{}"

[image]
base = "openjdk:17-slim"
workdir = "/usr/src/app"

[[step]]
copy = {{ source = "Main.java", dest = "Main.java" }}

[[step]]
run = {{ command = "javac", args = ["/usr/src/app/Main.java"] }}

[[step]]
entrypoint = {{ command = "java", args = ["Main"] }}
"#,
        name
    );

    std::fs::write(&recipe_path, template)
        .with_context(|| format!("Failed to write {}", recipe_path.display()))?;

    println!("Created kiln.toml at {}", recipe_path.display());

    Ok(())
}

fn show_history(config: &Config, count: Option<usize>) -> Result<()> {
    let logger = Logger::new();
    let history = BuildHistory::new(config.storage_path(), config.history.max_builds)
        .context("Failed to load history")?;

    let entries = history.entries();
    let count = count.unwrap_or(10).min(entries.len());

    if entries.is_empty() {
        logger.log(LogLevel::Info, "No build history found.");
        return Ok(());
    }

    logger.log(
        LogLevel::Info,
        &format!("Build History (last {} entries):", count),
    );

    for entry in entries.iter().rev().take(count) {
        let status = if entry.success { "✓" } else { "✗" };
        let build_id = entry
            .build_id
            .map(|id| format!("#{}", id))
            .unwrap_or_else(|| "-".to_string());
        logger.log(
            LogLevel::Info,
            &format!(
                "{} {} | {} {} | {:.1}s | {} errors, {} warnings",
                status,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.recipe,
                build_id,
                entry.duration,
                entry.error_count,
                entry.warning_count
            ),
        );
    }

    Ok(())
}

fn clear_history(config: &Config) -> Result<()> {
    let mut history = BuildHistory::new(config.storage_path(), config.history.max_builds)
        .context("Failed to load build history")?;
    history.clear()?;
    println!("Build history cleared.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context_dir = cli.context_directory();

    match &cli.command {
        Some(Commands::Init { name }) => init_recipe(&context_dir, name.clone()),
        Some(Commands::Validate { recipe }) => validate_recipe(&context_dir, recipe.as_deref()),
        Some(Commands::History { command }) => {
            let config = Config::load(&context_dir)?;
            match command {
                HistoryCommands::Show { count } => show_history(&config, *count),
                HistoryCommands::Clear => clear_history(&config),
            }
        }
        Some(Commands::Build { recipe }) => run_build(&context_dir, recipe.as_deref()).await,
        None => run_build(&context_dir, None).await,
    }
}
