use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Supplies bytes for copy-step source paths. The production implementation
/// reads from the build context directory; tests substitute an in-memory map.
pub trait SourceProvider {
    fn read(&self, source: &Path) -> std::io::Result<Vec<u8>>;
}

/// Host filesystem collaborator rooted at the build context directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl SourceProvider for DirSource {
    fn read(&self, source: &Path) -> std::io::Result<Vec<u8>> {
        let path = if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.root.join(source)
        };
        std::fs::read(path)
    }
}

/// In-memory source provider for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file<P: Into<PathBuf>>(mut self, source: P, contents: &[u8]) -> Self {
        self.files.insert(source.into(), contents.to_vec());
        self
    }
}

impl SourceProvider for MemorySource {
    fn read(&self, source: &Path) -> std::io::Result<Vec<u8>> {
        self.files.get(source).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such source file: {}", source.display()),
            )
        })
    }
}

/// The filesystem state accumulated during one build: a mapping from
/// destination path to file contents, backed by an on-disk root so run
/// steps see real files. Owned by exactly one build.
#[derive(Debug)]
pub struct StagingEnvironment {
    root: PathBuf,
    workdir: PathBuf,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl StagingEnvironment {
    /// Creates the staging root and the working directory inside it.
    pub fn new(root: PathBuf, workdir: PathBuf) -> anyhow::Result<Self> {
        let staging = Self {
            root,
            workdir,
            files: BTreeMap::new(),
        };

        let work_dir = staging.work_dir_on_disk();
        std::fs::create_dir_all(&work_dir).with_context(|| {
            format!(
                "Failed to create staging working directory: {}",
                work_dir.display()
            )
        })?;

        Ok(staging)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Maps a destination-space absolute path to its location under the
    /// staging root.
    pub fn disk_path(&self, dest: &Path) -> PathBuf {
        let relative = dest.strip_prefix("/").unwrap_or(dest);
        self.root.join(relative)
    }

    pub fn work_dir_on_disk(&self) -> PathBuf {
        self.disk_path(&self.workdir)
    }

    /// Rewrites a command argument that names a path under the recipe
    /// working directory so it points into the staging root. Other
    /// arguments pass through untouched.
    pub fn rebase_arg(&self, arg: &str) -> String {
        let path = Path::new(arg);
        if path.starts_with(&self.workdir) {
            self.disk_path(path).display().to_string()
        } else {
            arg.to_string()
        }
    }

    /// Materializes contents at a destination path, both on disk and in the
    /// staged-file index.
    pub fn stage(&mut self, dest: PathBuf, contents: Vec<u8>) -> anyhow::Result<()> {
        let disk = self.disk_path(&dest);

        if let Some(parent) = disk.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create staging directory: {}", parent.display())
            })?;
        }

        std::fs::write(&disk, &contents)
            .with_context(|| format!("Failed to stage file: {}", disk.display()))?;

        self.files.insert(dest, contents);
        Ok(())
    }

    pub fn contains(&self, dest: &Path) -> bool {
        self.files.contains_key(dest)
    }

    /// Destination paths staged by copy steps, in sorted order.
    pub fn staged_files(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    /// Walks the staging root and returns every file in destination space,
    /// sorted. Includes artifacts written by run steps, not just staged
    /// copies.
    pub fn manifest(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        collect_files(&self.root, &self.root, &mut paths)?;
        paths.sort();
        Ok(paths)
    }
}

fn collect_files(root: &Path, dir: &Path, paths: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read staging directory: {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, paths)?;
        } else {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            paths.push(Path::new("/").join(relative));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_staging() -> (tempfile::TempDir, StagingEnvironment) {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingEnvironment::new(
            dir.path().join("build-1"),
            PathBuf::from("/usr/src/app"),
        )
        .unwrap();
        (dir, staging)
    }

    #[test]
    fn test_stage_writes_to_disk_and_index() {
        let (_dir, mut staging) = create_staging();
        let dest = PathBuf::from("/usr/src/app/Main.java");

        staging.stage(dest.clone(), b"class Main {}".to_vec()).unwrap();

        assert!(staging.contains(&dest));
        let on_disk = staging.disk_path(&dest);
        assert_eq!(std::fs::read(on_disk).unwrap(), b"class Main {}");
    }

    #[test]
    fn test_rebase_arg_only_touches_workdir_paths() {
        let (_dir, staging) = create_staging();

        let rebased = staging.rebase_arg("/usr/src/app/Main.java");
        assert_eq!(
            rebased,
            staging
                .disk_path(Path::new("/usr/src/app/Main.java"))
                .display()
                .to_string()
        );

        assert_eq!(staging.rebase_arg("-verbose"), "-verbose");
        assert_eq!(staging.rebase_arg("/etc/passwd"), "/etc/passwd");
    }

    #[test]
    fn test_manifest_includes_run_step_artifacts() {
        let (_dir, mut staging) = create_staging();
        staging
            .stage(PathBuf::from("/usr/src/app/Main.java"), b"x".to_vec())
            .unwrap();

        // Simulate a compiler writing an artifact next to the source.
        let class_file = staging.disk_path(Path::new("/usr/src/app/Main.class"));
        std::fs::write(class_file, b"cafebabe").unwrap();

        let manifest = staging.manifest().unwrap();
        assert_eq!(
            manifest,
            vec![
                PathBuf::from("/usr/src/app/Main.class"),
                PathBuf::from("/usr/src/app/Main.java"),
            ]
        );
    }

    #[test]
    fn test_memory_source_missing_file() {
        let source = MemorySource::new().with_file("Main.java", b"class Main {}");

        assert!(source.read(Path::new("Main.java")).is_ok());
        let err = source.read(Path::new("Other.java")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_dir_source_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Main.java"), b"class Main {}").unwrap();

        let source = DirSource::new(dir.path().to_path_buf());
        assert_eq!(source.read(Path::new("Main.java")).unwrap(), b"class Main {}");
        assert!(source.read(Path::new("missing.java")).is_err());
    }
}
