use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::executor::BuildError;

/// One declarative action in a build recipe. Steps are immutable once
/// parsed and are consumed exactly once per build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    Copy {
        source: PathBuf,
        dest: PathBuf,
    },
    Run {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Entrypoint {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl BuildStep {
    pub fn description(&self) -> String {
        match self {
            BuildStep::Copy { source, dest } => {
                format!("Copying {} -> {}", source.display(), dest.display())
            }
            BuildStep::Run { command, args } => {
                if args.is_empty() {
                    format!("Running {}", command)
                } else {
                    format!("Running {} {}", command, args.join(" "))
                }
            }
            BuildStep::Entrypoint { command, args } => {
                if args.is_empty() {
                    format!("Setting entry point to {}", command)
                } else {
                    format!("Setting entry point to {} {}", command, args.join(" "))
                }
            }
        }
    }
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub base: String,
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
}

fn default_workdir() -> PathBuf {
    PathBuf::from("/build")
}

/// A build recipe: the explicit configuration a build-step evaluator needs,
/// in place of the ambient state a container build file assumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub name: Option<String>,
    pub image: ImageConfig,
    #[serde(rename = "step", default)]
    pub steps: Vec<BuildStep>,
}

impl Recipe {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe file: {}", path.display()))?;

        let recipe: Recipe = toml::from_str(&content)
            .with_context(|| format!("Failed to parse recipe file: {}", path.display()))?;

        Ok(recipe)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Resolves a copy destination against the recipe working directory.
    pub fn resolve_dest(&self, dest: &Path) -> PathBuf {
        if dest.is_absolute() {
            dest.to_path_buf()
        } else {
            self.image.workdir.join(dest)
        }
    }

    /// Static validation, run before any side effect. Rejects empty recipes,
    /// empty commands, and run steps that reference a staged path before the
    /// copy step that materializes it.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.steps.is_empty() {
            return Err(BuildError::InvalidRecipe(
                "recipe contains no steps".to_string(),
            ));
        }

        if self.image.base.trim().is_empty() {
            return Err(BuildError::InvalidRecipe(
                "image.base must not be empty".to_string(),
            ));
        }

        let all_dests: HashSet<PathBuf> = self
            .steps
            .iter()
            .filter_map(|step| match step {
                BuildStep::Copy { dest, .. } => Some(self.resolve_dest(dest)),
                _ => None,
            })
            .collect();

        let mut staged: HashSet<PathBuf> = HashSet::new();

        for (index, step) in self.steps.iter().enumerate() {
            match step {
                BuildStep::Copy { source, dest } => {
                    if source.as_os_str().is_empty() {
                        return Err(BuildError::InvalidRecipe(format!(
                            "step {}: copy source must not be empty",
                            index
                        )));
                    }
                    if dest.as_os_str().is_empty() {
                        return Err(BuildError::InvalidRecipe(format!(
                            "step {}: copy dest must not be empty",
                            index
                        )));
                    }
                    staged.insert(self.resolve_dest(dest));
                }
                BuildStep::Run { command, args } => {
                    if command.trim().is_empty() {
                        return Err(BuildError::InvalidRecipe(format!(
                            "step {}: run command must not be empty",
                            index
                        )));
                    }

                    // Arguments produced by earlier commands are fine; only a
                    // path that some later copy step materializes is an
                    // ordering error.
                    for arg in args {
                        let referenced = self.resolve_dest(Path::new(arg));
                        if all_dests.contains(&referenced) && !staged.contains(&referenced) {
                            return Err(BuildError::InvalidRecipe(format!(
                                "step {}: references {} before it is copied",
                                index, arg
                            )));
                        }
                    }
                }
                BuildStep::Entrypoint { command, .. } => {
                    if command.trim().is_empty() {
                        return Err(BuildError::InvalidRecipe(format!(
                            "step {}: entry point command must not be empty",
                            index
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn java_recipe() -> Recipe {
        Recipe {
            name: Some("hello-java".to_string()),
            image: ImageConfig {
                base: "openjdk:17-slim".to_string(),
                workdir: PathBuf::from("/usr/src/app"),
            },
            steps: vec![
                BuildStep::Copy {
                    source: PathBuf::from("Main.java"),
                    dest: PathBuf::from("Main.java"),
                },
                BuildStep::Run {
                    command: "javac".to_string(),
                    args: vec!["/usr/src/app/Main.java".to_string()],
                },
                BuildStep::Entrypoint {
                    command: "java".to_string(),
                    args: vec!["Main".to_string()],
                },
            ],
        }
    }

    #[test]
    fn test_valid_recipe_passes_validation() {
        assert!(java_recipe().validate().is_ok());
    }

    #[test]
    fn test_empty_recipe_is_invalid() {
        let mut recipe = java_recipe();
        recipe.steps.clear();

        let err = recipe.validate().unwrap_err();
        assert!(matches!(err, BuildError::InvalidRecipe(_)));
    }

    #[test]
    fn test_empty_entrypoint_command_is_invalid() {
        let mut recipe = java_recipe();
        recipe.steps.push(BuildStep::Entrypoint {
            command: "  ".to_string(),
            args: vec![],
        });

        let err = recipe.validate().unwrap_err();
        assert!(matches!(err, BuildError::InvalidRecipe(_)));
    }

    #[test]
    fn test_run_before_copy_is_rejected() {
        let mut recipe = java_recipe();
        recipe.steps.swap(0, 1);

        let err = recipe.validate().unwrap_err();
        match err {
            BuildError::InvalidRecipe(message) => {
                assert!(message.contains("before it is copied"), "{}", message);
            }
            other => panic!("Expected InvalidRecipe, got {:?}", other),
        }
    }

    #[test]
    fn test_run_referencing_command_output_is_allowed() {
        let mut recipe = java_recipe();
        recipe.steps.insert(
            2,
            BuildStep::Run {
                command: "java".to_string(),
                args: vec!["-cp".to_string(), "/usr/src/app".to_string()],
            },
        );

        assert!(recipe.validate().is_ok());
    }

    #[test]
    fn test_resolve_dest_against_workdir() {
        let recipe = java_recipe();
        assert_eq!(
            recipe.resolve_dest(Path::new("Main.java")),
            PathBuf::from("/usr/src/app/Main.java")
        );
        assert_eq!(
            recipe.resolve_dest(Path::new("/etc/app.conf")),
            PathBuf::from("/etc/app.conf")
        );
    }

    #[test]
    fn test_recipe_toml_round_trip() {
        let toml_src = r#"
            name = "hello-java"

            [image]
            base = "openjdk:17-slim"
            workdir = "/usr/src/app"

            [[step]]
            copy = { source = "Main.java", dest = "Main.java" }

            [[step]]
            run = { command = "javac", args = ["/usr/src/app/Main.java"] }

            [[step]]
            entrypoint = { command = "java", args = ["Main"] }
        "#;

        let recipe: Recipe = toml::from_str(toml_src).unwrap();
        assert_eq!(recipe, java_recipe());
    }

    #[test]
    fn test_step_description() {
        let step = BuildStep::Run {
            command: "javac".to_string(),
            args: vec!["Main.java".to_string()],
        };
        assert_eq!(step.description(), "Running javac Main.java");
    }
}
