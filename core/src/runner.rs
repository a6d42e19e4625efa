use chrono::Local;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;

use crate::{
    executor::{BuildError, CommandRunner, ExecutionResult, StepUpdate},
    image::{next_build_id, Entrypoint, ImageDescriptor},
    parser::{DiagnosticParser, LogEntry},
    recipe::{BuildStep, Recipe},
    staging::{SourceProvider, StagingEnvironment},
};

/// Caller-supplied cancellation signal, checked between steps. External run
/// commands may hang; canceling stops the build before the next step starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Linear build progression. There is no state machine beyond this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Pending,
    Running(usize),
    Succeeded,
    /// The recipe was rejected by validation; no step ever started.
    Rejected,
    Failed(usize),
}

#[derive(Debug, Clone)]
pub enum BuildResult {
    Succeeded {
        image: ImageDescriptor,
        duration: f64,
        steps_executed: usize,
    },
    /// Validation rejected the whole recipe before any step ran. Distinct
    /// from `Failed` so a rejection cannot be mistaken for the first step
    /// failing.
    Rejected {
        error: BuildError,
    },
    Failed {
        step: usize,
        error: BuildError,
        duration: f64,
    },
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildResult::Succeeded { .. })
    }
}

/// Everything one build needs: the recipe, where to stage, and the channels
/// progress flows over. Each build owns an independent context; nothing is
/// shared between concurrent builds.
pub struct BuildContext {
    recipe: Recipe,
    staging_dir: PathBuf,
    log_tx: mpsc::UnboundedSender<LogEntry>,
    step_tx: mpsc::UnboundedSender<StepUpdate>,
    cancel: CancelFlag,
}

impl BuildContext {
    pub fn new(
        recipe: Recipe,
        staging_dir: PathBuf,
        log_tx: mpsc::UnboundedSender<LogEntry>,
        step_tx: mpsc::UnboundedSender<StepUpdate>,
    ) -> Self {
        Self {
            recipe,
            staging_dir,
            log_tx,
            step_tx,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }
}

/// Evaluates a recipe's steps strictly in order against a fresh staging
/// environment, halting on the first failure.
pub struct BuildRunner<R, S> {
    runner: R,
    sources: S,
    status: Arc<Mutex<BuildStatus>>,
}

impl<R: CommandRunner, S: SourceProvider> BuildRunner<R, S> {
    pub fn new(runner: R, sources: S) -> Self {
        Self {
            runner,
            sources,
            status: Arc::new(Mutex::new(BuildStatus::Pending)),
        }
    }

    pub fn status(&self) -> BuildStatus {
        *self.status.lock().unwrap()
    }

    fn set_status(&self, status: BuildStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Runs the build to completion or first failure. Recipe-level errors
    /// (`InvalidRecipe`, `CopySourceNotFound`, `CommandFailed`, `Canceled`)
    /// surface in the returned `BuildResult`; infrastructure failures such
    /// as an unspawnable command propagate as errors.
    pub async fn execute(&self, ctx: &BuildContext) -> anyhow::Result<BuildResult> {
        let start = Instant::now();
        let recipe = ctx.recipe();

        if let Err(error) = recipe.validate() {
            self.set_status(BuildStatus::Rejected);
            return Ok(BuildResult::Rejected { error });
        }

        let build_id = next_build_id();
        let mut staging = StagingEnvironment::new(
            ctx.staging_dir.join(format!("build-{}", build_id)),
            recipe.image.workdir.clone(),
        )?;

        let mut entrypoint: Option<Entrypoint> = None;
        let mut parser = DiagnosticParser::new();
        let log_tx = ctx.log_tx.clone();

        for (index, step) in recipe.steps.iter().enumerate() {
            if ctx.cancel.is_canceled() {
                self.set_status(BuildStatus::Failed(index));
                return Ok(BuildResult::Failed {
                    step: index,
                    error: BuildError::Canceled,
                    duration: start.elapsed().as_secs_f64(),
                });
            }

            self.set_status(BuildStatus::Running(index));
            let _ = ctx.step_tx.send(StepUpdate::Started {
                index,
                description: step.description(),
            });

            let step_start = Instant::now();

            match step {
                BuildStep::Copy { source, dest } => {
                    let contents = match self.sources.read(source) {
                        Ok(contents) => contents,
                        Err(_) => {
                            self.set_status(BuildStatus::Failed(index));
                            return Ok(BuildResult::Failed {
                                step: index,
                                error: BuildError::CopySourceNotFound {
                                    path: source.clone(),
                                },
                                duration: start.elapsed().as_secs_f64(),
                            });
                        }
                    };

                    staging.stage(recipe.resolve_dest(dest), contents)?;

                    let _ = ctx.step_tx.send(StepUpdate::Finished {
                        index,
                        result: ExecutionResult::internal(step_start.elapsed().as_secs_f64()),
                    });
                }
                BuildStep::Run { command, args } => {
                    let rebased: Vec<String> =
                        args.iter().map(|arg| staging.rebase_arg(arg)).collect();
                    let cwd = staging.work_dir_on_disk();

                    let mut on_line = |line: String| {
                        let entry = parser.parse_line(&line);
                        let _ = log_tx.send(entry);
                    };

                    let result = self
                        .runner
                        .run(command, &rebased, &cwd, &mut on_line)
                        .await?;

                    let _ = ctx.step_tx.send(StepUpdate::Finished {
                        index,
                        result: result.clone(),
                    });

                    if !result.success {
                        self.set_status(BuildStatus::Failed(index));
                        return Ok(BuildResult::Failed {
                            step: index,
                            error: BuildError::CommandFailed {
                                exit_code: result.exit_code,
                                output: result.captured_output(),
                            },
                            duration: start.elapsed().as_secs_f64(),
                        });
                    }
                }
                BuildStep::Entrypoint { command, args } => {
                    entrypoint = Some(Entrypoint {
                        command: command.clone(),
                        args: args.clone(),
                    });

                    let _ = ctx.step_tx.send(StepUpdate::Finished {
                        index,
                        result: ExecutionResult::internal(step_start.elapsed().as_secs_f64()),
                    });
                }
            }
        }

        self.set_status(BuildStatus::Succeeded);

        let files = staging.manifest()?;
        let image = ImageDescriptor {
            build_id,
            base_image: recipe.image.base.clone(),
            working_dir: recipe.image.workdir.clone(),
            entrypoint,
            files,
            staging_root: staging.root().to_path_buf(),
            created_at: Local::now(),
        };

        Ok(BuildResult::Succeeded {
            image,
            duration: start.elapsed().as_secs_f64(),
            steps_executed: recipe.steps.len(),
        })
    }
}
