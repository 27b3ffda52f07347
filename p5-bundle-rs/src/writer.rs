//! Artifact persistence and completion reporting.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use futures::channel::oneshot;
use log::info;
use tempfile::NamedTempFile;

use crate::error::{BuildError, WriteError};

/// A written bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Path as displayed to the user, e.g. `lib/p5.js`.
    pub relative_path: PathBuf,
    pub content: String,
}

impl Artifact {
    /// The line reported once the bundle is on disk.
    pub fn created_message(&self) -> String {
        format!(">> Bundle {} created.", self.relative_path.display())
    }
}

/// Writes `content` to `root/relative_path`, replacing any existing file.
///
/// The content goes to a temporary file in the target directory first and is
/// then renamed into place, so a failed write never leaves a partial file.
pub fn write_artifact(
    root: &Path,
    relative_path: &Path,
    content: String,
) -> Result<Artifact, WriteError> {
    let path = root.join(relative_path);
    let fail = |source| WriteError {
        path: path.clone(),
        source,
    };
    let dir = path.parent().unwrap_or(root);
    fs::create_dir_all(dir).map_err(fail)?;

    let mut file = NamedTempFile::new_in(dir).map_err(fail)?;
    file.write_all(content.as_bytes()).map_err(fail)?;
    file.as_file().sync_all().map_err(fail)?;
    file.persist(&path).map_err(|err| fail(err.error))?;

    let artifact = Artifact {
        path: path.clone(),
        relative_path: relative_path.to_path_buf(),
        content,
    };
    info!("{}", artifact.created_message());
    Ok(artifact)
}

/// Reports the end of a build to whoever started it. Firing consumes the
/// signal, so it fires at most once.
#[derive(Debug)]
pub struct CompletionSignal {
    sender: oneshot::Sender<Result<Artifact, BuildError>>,
}

impl CompletionSignal {
    pub fn new() -> (Self, oneshot::Receiver<Result<Artifact, BuildError>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    pub fn fire(self, outcome: Result<Artifact, BuildError>) {
        // A dropped receiver means nobody is waiting for the outcome.
        self.sender.send(outcome).ok();
    }
}
