use crate::error::{LayoutError, LayoutResult};
use crate::identity::RunIdentity;
use crate::snapshot::{read_checkpoint_root, SNAPSHOT_FILE};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Checkpoint file holding the most recent training state.
pub const LAST_CHECKPOINT: &str = "last.ckpt";
/// File stem of the best-metric checkpoint.
pub const BEST_CHECKPOINT_STEM: &str = "best";
const CHECKPOINT_EXTENSION: &str = "ckpt";
const CHECKPOINTS_DIR: &str = "checkpoints";

/// Filesystem access needed to resolve a layout.
///
/// Resolution only inspects the filesystem; it never creates or writes anything.
pub trait LayoutProbe {
    fn exists(&self, path: &Path) -> io::Result<bool>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// The local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LayoutProbe for LocalFs {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Only this stage probes for earlier attempts and resumes them.
    pub training_stage: String,
    /// Optional root that checkpoint directories are placed under.
    pub checkpoint_root: Option<PathBuf>,
    /// Highest attempt suffix that may be probed before giving up.
    pub max_attempts: u32,
    pub snapshot_file: String,
    /// Key path of the checkpoint directory inside a snapshot.
    pub checkpoint_key: Vec<String>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            training_stage: "fit".to_string(),
            checkpoint_root: None,
            max_attempts: 10_000,
            snapshot_file: SNAPSHOT_FILE.to_string(),
            checkpoint_key: vec!["model_ckpt".to_string(), "dirpath".to_string()],
        }
    }
}

impl ResolverOptions {
    pub fn validate(&self) -> LayoutResult<()> {
        if self.training_stage.trim().is_empty() {
            return Err(LayoutError::InvalidConfig("training_stage is required".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(LayoutError::InvalidConfig("max_attempts must be >= 1".to_string()));
        }
        if self.snapshot_file.trim().is_empty() {
            return Err(LayoutError::InvalidConfig("snapshot_file is required".to_string()));
        }
        if self.checkpoint_key.is_empty() {
            return Err(LayoutError::InvalidConfig("checkpoint_key must name at least one key".to_string()));
        }
        Ok(())
    }
}

/// The attempt a resumed run continues from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousAttempt {
    pub sub_dir: String,
    pub log_dir: PathBuf,
    pub snapshot_path: PathBuf,
    /// Checkpoint directory recorded in the previous snapshot.
    pub checkpoint_root: PathBuf,
}

/// Where the current invocation logs and checkpoints, and what it resumes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLayout {
    pub stage: String,
    pub sub_dir: String,
    /// 0 for the unsuffixed directory, `N` for `<stage>N`.
    pub attempt: u32,
    pub log_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub resume_checkpoint_path: Option<PathBuf>,
    #[serde(default)]
    pub previous: Option<PreviousAttempt>,
}

impl ResolvedLayout {
    #[must_use]
    pub fn is_resume(&self) -> bool {
        self.resume_checkpoint_path.is_some()
    }

    #[must_use]
    pub fn last_checkpoint_path(&self) -> PathBuf {
        self.checkpoint_dir.join(LAST_CHECKPOINT)
    }

    #[must_use]
    pub fn best_checkpoint_path(&self) -> PathBuf {
        self.checkpoint_dir.join(BEST_CHECKPOINT_STEM).with_extension(CHECKPOINT_EXTENSION)
    }

    /// Persist the layout so that other ranks can load it instead of resolving.
    pub fn save_json(&self, path: &Path) -> LayoutResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> LayoutResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Resolves the log and checkpoint layout of a run from its identity and on-disk state.
///
/// For the training stage the first attempt logs to `<run_root>/<stage>`; every later
/// invocation probes `<stage>1`, `<stage>2`, ... and takes the first free suffix,
/// resuming from `last.ckpt` of the attempt before it.
#[derive(Debug, Clone)]
pub struct LayoutResolver<P = LocalFs> {
    probe: P,
    options: ResolverOptions,
}

impl LayoutResolver<LocalFs> {
    #[must_use]
    pub fn new(options: ResolverOptions) -> Self {
        Self::with_probe(LocalFs, options)
    }
}

impl<P: LayoutProbe> LayoutResolver<P> {
    #[must_use]
    pub fn with_probe(probe: P, options: ResolverOptions) -> Self {
        Self { probe, options }
    }

    #[must_use]
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn resolve(&self, identity: &RunIdentity) -> LayoutResult<ResolvedLayout> {
        identity.validate()?;
        self.options.validate()?;

        let (sub_dir, attempt, previous) = if identity.subcommand == self.options.training_stage {
            self.probe_attempts(identity)?
        } else {
            (identity.subcommand.clone(), 0, None)
        };

        let log_dir = identity.attempt_dir(&sub_dir);
        let checkpoint_dir = self.checkpoint_dir_for(&log_dir);
        let resume_checkpoint_path = previous.as_ref().map(|p| p.checkpoint_root.join(LAST_CHECKPOINT));

        if let Some(ref resume) = resume_checkpoint_path {
            tracing::info!(
                sub_dir = %sub_dir,
                resume = %resume.display(),
                "resuming training from previous attempt"
            );
        }

        Ok(ResolvedLayout {
            stage: identity.subcommand.clone(),
            sub_dir,
            attempt,
            log_dir,
            checkpoint_dir,
            resume_checkpoint_path,
            previous,
        })
    }

    fn checkpoint_dir_for(&self, log_dir: &Path) -> PathBuf {
        match self.options.checkpoint_root {
            Some(ref root) => root.join(log_dir).join(CHECKPOINTS_DIR),
            None => log_dir.join(CHECKPOINTS_DIR),
        }
    }

    fn probe_attempts(&self, identity: &RunIdentity) -> LayoutResult<(String, u32, Option<PreviousAttempt>)> {
        let stage = identity.subcommand.as_str();

        let first = identity.attempt_dir(stage);
        let exists = self.probe.exists(&first)?;
        tracing::debug!(path = %first.display(), exists, "probed attempt directory");
        if !exists {
            return Ok((stage.to_string(), 0, None));
        }

        let mut next: u32 = 1;
        loop {
            let candidate = identity.attempt_dir(&attempt_name(stage, next));
            let exists = self.probe.exists(&candidate)?;
            tracing::debug!(path = %candidate.display(), exists, "probed attempt directory");
            if !exists {
                break;
            }
            if next >= self.options.max_attempts {
                return Err(LayoutError::TooManyAttempts {
                    run_root: identity.run_root(),
                    max_attempts: self.options.max_attempts,
                });
            }
            next += 1;
        }

        let previous = self.read_previous(identity, attempt_name(stage, next - 1))?;
        Ok((attempt_name(stage, next), next, Some(previous)))
    }

    fn read_previous(&self, identity: &RunIdentity, sub_dir: String) -> LayoutResult<PreviousAttempt> {
        let log_dir = identity.attempt_dir(&sub_dir);
        let snapshot_path = log_dir.join(&self.options.snapshot_file);

        let text = match self.probe.read_to_string(&snapshot_path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LayoutError::resume_lineage(&snapshot_path, "config snapshot is missing"));
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(LayoutError::resume_lineage(&snapshot_path, "config snapshot is not valid UTF-8"));
            }
            Err(e) => return Err(e.into()),
        };

        let checkpoint_root = read_checkpoint_root(&text, &self.options.checkpoint_key)
            .map_err(|e| LayoutError::resume_lineage(&snapshot_path, e.to_string()))?;

        Ok(PreviousAttempt { sub_dir, log_dir, snapshot_path, checkpoint_root })
    }
}

/// Directory name of attempt `n`; attempt 0 carries no suffix.
fn attempt_name(stage: &str, n: u32) -> String {
    if n == 0 { stage.to_string() } else { format!("{stage}{n}") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use tempfile::TempDir;

    fn write_snapshot_at(dir: &Path, ckpt_dir: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("config.yaml"), format!("model_ckpt:\n  dirpath: {ckpt_dir}\n")).unwrap();
    }

    fn identity(root: &Path, stage: &str) -> RunIdentity {
        RunIdentity::new(root, "exp", "version_0", stage).unwrap()
    }

    fn train_options() -> ResolverOptions {
        ResolverOptions { training_stage: "train".to_string(), ..Default::default() }
    }

    #[derive(Default)]
    struct RecordingProbe {
        dirs: HashSet<PathBuf>,
        files: HashMap<PathBuf, String>,
        calls: RefCell<Vec<PathBuf>>,
    }

    impl LayoutProbe for RecordingProbe {
        fn exists(&self, path: &Path) -> io::Result<bool> {
            self.calls.borrow_mut().push(path.to_path_buf());
            Ok(self.dirs.contains(path))
        }

        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.calls.borrow_mut().push(path.to_path_buf());
            self.files.get(path).cloned().ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
    }

    #[test]
    fn test_fresh_run_uses_unsuffixed_dir() {
        let temp = TempDir::new().unwrap();
        let layout = LayoutResolver::new(train_options()).resolve(&identity(temp.path(), "train")).unwrap();

        assert_eq!(layout.sub_dir, "train");
        assert_eq!(layout.attempt, 0);
        assert_eq!(layout.log_dir, temp.path().join("exp/version_0/train"));
        assert_eq!(layout.checkpoint_dir, temp.path().join("exp/version_0/train/checkpoints"));
        assert!(layout.resume_checkpoint_path.is_none());
        assert!(layout.previous.is_none());
    }

    #[test]
    fn test_second_attempt_resumes_from_unsuffixed_dir() {
        let temp = TempDir::new().unwrap();
        let run_root = temp.path().join("exp/version_0");
        write_snapshot_at(&run_root.join("train"), "/ckpts/attempt0");

        let layout = LayoutResolver::new(train_options()).resolve(&identity(temp.path(), "train")).unwrap();

        assert_eq!(layout.sub_dir, "train1");
        assert_eq!(layout.attempt, 1);
        let previous = layout.previous.as_ref().unwrap();
        assert_eq!(previous.sub_dir, "train");
        assert_eq!(previous.snapshot_path, run_root.join("train/config.yaml"));
        assert_eq!(layout.resume_checkpoint_path, Some(PathBuf::from("/ckpts/attempt0/last.ckpt")));
    }

    #[test]
    fn test_probing_skips_to_first_free_suffix() {
        let temp = TempDir::new().unwrap();
        let run_root = temp.path().join("exp/version_0");
        std::fs::create_dir_all(run_root.join("train")).unwrap();
        write_snapshot_at(&run_root.join("train1"), "/ckpts/attempt1");

        let layout = LayoutResolver::new(train_options()).resolve(&identity(temp.path(), "train")).unwrap();

        assert_eq!(layout.sub_dir, "train2");
        assert_eq!(layout.log_dir, run_root.join("train2"));
        assert_eq!(layout.previous.as_ref().unwrap().sub_dir, "train1");
        assert_eq!(layout.previous.as_ref().unwrap().snapshot_path, run_root.join("train1/config.yaml"));
        assert_eq!(layout.resume_checkpoint_path, Some(PathBuf::from("/ckpts/attempt1/last.ckpt")));
    }

    #[test]
    fn test_non_training_stage_never_probes() {
        let root = PathBuf::from("/runs");
        let mut probe = RecordingProbe::default();
        probe.dirs.insert(root.join("exp/version_0/validate"));
        probe.dirs.insert(root.join("exp/version_0/validate1"));

        let resolver = LayoutResolver::with_probe(probe, train_options());
        let layout = resolver.resolve(&identity(&root, "validate")).unwrap();

        assert_eq!(layout.sub_dir, "validate");
        assert_eq!(layout.attempt, 0);
        assert!(layout.resume_checkpoint_path.is_none());
        assert!(resolver.probe.calls.borrow().is_empty());
    }

    #[test]
    fn test_probe_order_is_increasing() {
        let root = PathBuf::from("/runs");
        let run_root = root.join("exp/version_0");
        let mut probe = RecordingProbe::default();
        probe.dirs.insert(run_root.join("train"));
        probe.dirs.insert(run_root.join("train1"));
        probe.files.insert(run_root.join("train1/config.yaml"), "model_ckpt:\n  dirpath: /c\n".to_string());

        let resolver = LayoutResolver::with_probe(probe, train_options());
        resolver.resolve(&identity(&root, "train")).unwrap();

        let calls = resolver.probe.calls.borrow();
        assert_eq!(
            *calls,
            vec![
                run_root.join("train"),
                run_root.join("train1"),
                run_root.join("train2"),
                run_root.join("train1/config.yaml"),
            ]
        );
    }

    #[test]
    fn test_missing_snapshot_is_fatal() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("exp/version_0/train")).unwrap();

        let err = LayoutResolver::new(train_options()).resolve(&identity(temp.path(), "train")).unwrap_err();
        assert!(matches!(err, LayoutError::ResumeLineage { .. }), "got {err:?}");
    }

    #[test]
    fn test_corrupt_snapshot_is_fatal() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("exp/version_0/train");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), "model_ckpt: [unclosed").unwrap();

        let err = LayoutResolver::new(train_options()).resolve(&identity(temp.path(), "train")).unwrap_err();
        assert!(matches!(err, LayoutError::ResumeLineage { .. }), "got {err:?}");
    }

    #[test]
    fn test_non_utf8_snapshot_is_fatal() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("exp/version_0/train");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), [0xff, 0xfe, 0x00]).unwrap();

        let err = LayoutResolver::new(train_options()).resolve(&identity(temp.path(), "train")).unwrap_err();
        match err {
            LayoutError::ResumeLineage { ref path, .. } => assert_eq!(*path, dir.join("config.yaml")),
            other => panic!("expected a resume-lineage error, got {other:?}"),
        }
    }

    /// Denies every snapshot read, and every existence check when `deny_exists` is set.
    struct DeniedProbe {
        deny_exists: bool,
        dirs: HashSet<PathBuf>,
    }

    impl LayoutProbe for DeniedProbe {
        fn exists(&self, path: &Path) -> io::Result<bool> {
            if self.deny_exists {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            Ok(self.dirs.contains(path))
        }

        fn read_to_string(&self, _path: &Path) -> io::Result<String> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }
    }

    #[test]
    fn test_unreadable_run_dir_is_not_a_fresh_start() {
        let probe = DeniedProbe { deny_exists: true, dirs: HashSet::new() };
        let resolver = LayoutResolver::with_probe(probe, train_options());

        let err = resolver.resolve(&identity(Path::new("/runs"), "train")).unwrap_err();
        assert!(
            matches!(err, LayoutError::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied),
            "got {err:?}"
        );
    }

    #[test]
    fn test_unreadable_snapshot_keeps_io_error() {
        let root = PathBuf::from("/runs");
        let dirs = HashSet::from([root.join("exp/version_0/train")]);
        let resolver = LayoutResolver::with_probe(DeniedProbe { deny_exists: false, dirs }, train_options());

        let err = resolver.resolve(&identity(&root, "train")).unwrap_err();
        assert!(
            matches!(err, LayoutError::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied),
            "got {err:?}"
        );
    }

    #[test]
    fn test_attempt_limit_is_enforced() {
        let temp = TempDir::new().unwrap();
        let run_root = temp.path().join("exp/version_0");
        for sub in ["train", "train1", "train2"] {
            write_snapshot_at(&run_root.join(sub), "/c");
        }

        let options = ResolverOptions { max_attempts: 2, ..train_options() };
        let err = LayoutResolver::new(options).resolve(&identity(temp.path(), "train")).unwrap_err();
        assert!(matches!(err, LayoutError::TooManyAttempts { max_attempts: 2, .. }), "got {err:?}");
    }

    #[test]
    fn test_checkpoint_root_override_nests_run_path() {
        let options = ResolverOptions { checkpoint_root: Some(PathBuf::from("/scratch")), ..train_options() };
        let layout = LayoutResolver::new(options).resolve(&identity(Path::new("logs"), "test")).unwrap();

        assert_eq!(layout.log_dir, PathBuf::from("logs/exp/version_0/test"));
        assert_eq!(layout.checkpoint_dir, PathBuf::from("/scratch/logs/exp/version_0/test/checkpoints"));
        assert_eq!(layout.best_checkpoint_path(), PathBuf::from("/scratch/logs/exp/version_0/test/checkpoints/best.ckpt"));
    }

    #[test]
    fn test_layout_json_handoff() {
        let temp = TempDir::new().unwrap();
        let layout = LayoutResolver::new(train_options()).resolve(&identity(temp.path(), "train")).unwrap();
        let path = temp.path().join("handoff/layout.json");

        layout.save_json(&path).unwrap();
        assert_eq!(ResolvedLayout::load_json(&path).unwrap(), layout);
    }
}
