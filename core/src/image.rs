use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUILD_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonically assigned identifier for one build. Shared across all
/// builds in the process so concurrent builds never collide.
pub fn next_build_id() -> u64 {
    NEXT_BUILD_ID.fetch_add(1, Ordering::Relaxed)
}

/// The command an image runs by default when instantiated by a container
/// runtime. The last entry point step in a recipe wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrypoint {
    pub command: String,
    pub args: Vec<String>,
}

impl fmt::Display for Entrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Opaque handle to a build's output, consumable by an external container
/// runtime. The on-disk layered format is that runtime's concern; kiln only
/// records what went into the image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub build_id: u64,
    pub base_image: String,
    pub working_dir: PathBuf,
    pub entrypoint: Option<Entrypoint>,
    pub files: Vec<PathBuf>,
    pub staging_root: PathBuf,
    pub created_at: DateTime<Local>,
}

impl fmt::Display for ImageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "image #{} (base: {})", self.build_id, self.base_image)?;
        writeln!(f, "  workdir: {}", self.working_dir.display())?;
        match &self.entrypoint {
            Some(entrypoint) => writeln!(f, "  entrypoint: {}", entrypoint)?,
            None => writeln!(f, "  entrypoint: (none)")?,
        }
        writeln!(f, "  files: {}", self.files.len())?;
        write!(f, "  root: {}", self.staging_root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ids_are_monotonic() {
        let first = next_build_id();
        let second = next_build_id();
        assert!(second > first);
    }

    #[test]
    fn test_entrypoint_display() {
        let entrypoint = Entrypoint {
            command: "java".to_string(),
            args: vec!["Main".to_string()],
        };
        assert_eq!(entrypoint.to_string(), "java Main");

        let bare = Entrypoint {
            command: "java".to_string(),
            args: vec![],
        };
        assert_eq!(bare.to_string(), "java");
    }
}
