use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{Context, Result};

use super::locator::{self, Located};
use super::matio;
use super::model::Container;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Everything a session needs from a freshly opened file.
#[derive(Debug)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub container: Container,
    pub located: Located,
    /// Sorted nonzero labels of the located mask.
    pub categories: Vec<i64>,
    /// Element count per category.
    pub counts: BTreeMap<i64, usize>,
}

/// Parse a MAT file, locate its segmentation mask and extract categories.
pub fn load_file(path: &Path) -> Result<LoadedFile> {
    load_with_progress(path, &mut |msg| log::debug!("{msg}"))
}

fn load_with_progress(path: &Path, progress: &mut dyn FnMut(String)) -> Result<LoadedFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    progress(format!("Loading {name}…"));

    let container =
        matio::read_file(path).with_context(|| format!("reading {}", path.display()))?;
    progress(format!(
        "Parsed {} variables, searching for a mask…",
        container.variables.len()
    ));

    let located = locator::locate(&container).context("locating segmentation mask")?;
    progress(format!(
        "Mask at '{}': shape {:?}, class {}",
        located.path,
        located.mask.shape(),
        located.mask.class
    ));

    let categories = located.mask.categories();
    let counts = located.mask.category_counts();
    log::info!(
        "Loaded {} with {} categories from '{}'",
        path.display(),
        categories.len(),
        located.path
    );

    Ok(LoadedFile {
        path: path.to_path_buf(),
        container,
        located,
        categories,
        counts,
    })
}

// ---------------------------------------------------------------------------
// Background load
// ---------------------------------------------------------------------------

/// Messages from the load worker: any number of `Progress`, then exactly one
/// of `Finished` / `Failed`.
#[derive(Debug)]
pub enum LoadMessage {
    Progress(String),
    Finished(Box<LoadedFile>),
    Failed(String),
}

impl LoadMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoadMessage::Progress(_))
    }
}

/// Handle to a single in-flight load running on its own thread.
pub struct LoadTask {
    pub path: PathBuf,
    rx: Receiver<LoadMessage>,
}

impl LoadTask {
    /// Start loading `path` on a worker thread. `notify` is called after
    /// every message so the UI can schedule a repaint.
    pub fn spawn(path: PathBuf, notify: impl Fn() + Send + 'static) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker_path = path.clone();

        thread::spawn(move || {
            let mut progress = |msg: String| {
                let _ = tx.send(LoadMessage::Progress(msg));
                notify();
            };
            let outcome = match load_with_progress(&worker_path, &mut progress) {
                Ok(file) => LoadMessage::Finished(Box::new(file)),
                Err(e) => {
                    log::error!("Failed to load {}: {e:#}", worker_path.display());
                    LoadMessage::Failed(format!("{e:#}"))
                }
            };
            let _ = tx.send(outcome);
            notify();
        });

        LoadTask { path, rx }
    }

    /// Next pending message, if any. A worker that disappeared without a
    /// terminal message is reported as a failure.
    pub fn poll(&self) -> Option<LoadMessage> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(LoadMessage::Failed(
                "loader thread stopped without a result".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::error::MaskError;
    use crate::data::model::{CharArray, MatValue, NumericArray, NumericData};

    fn write_sample(dir: &Path, name: &str, container: &Container) -> PathBuf {
        let path = dir.join(name);
        matio::write_file(&path, container, false).unwrap();
        path
    }

    fn labelled() -> Container {
        let mut c = Container::default();
        c.push(
            "segmentation",
            MatValue::Numeric(NumericArray::new(
                vec![2, 2],
                NumericData::UInt8(vec![0, 4, 4, 9]),
            )),
        );
        c
    }

    #[test]
    fn test_load_file_extracts_categories() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path(), "a.mat", &labelled());
        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded.categories, vec![4, 9]);
        assert_eq!(loaded.counts.get(&4), Some(&2));
        assert_eq!(loaded.located.path.to_string(), "segmentation");
    }

    #[test]
    fn test_load_file_error_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.mat");
        std::fs::write(&garbage, b"definitely not a MAT file").unwrap();
        let err = load_file(&garbage).unwrap_err();
        assert!(matches!(err.downcast_ref::<MaskError>(), Some(MaskError::Parse(_))));

        let mut c = Container::default();
        c.push("note", MatValue::Char(CharArray::from_text("no mask here")));
        let path = write_sample(dir.path(), "nomask.mat", &c);
        let err = load_file(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<MaskError>(), Some(MaskError::NotFound)));
    }

    fn wait_terminal(task: &LoadTask) -> LoadMessage {
        loop {
            match task.poll() {
                Some(msg) if msg.is_terminal() => return msg,
                Some(_) => {}
                None => thread::sleep(std::time::Duration::from_millis(5)),
            }
        }
    }

    #[test]
    fn test_background_load_delivers_one_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path(), "bg.mat", &labelled());
        let task = LoadTask::spawn(path.clone(), || {});
        match wait_terminal(&task) {
            LoadMessage::Finished(file) => assert_eq!(file.path, path),
            other => panic!("unexpected {other:?}"),
        }

        let missing = LoadTask::spawn(dir.path().join("missing.mat"), || {});
        assert!(matches!(wait_terminal(&missing), LoadMessage::Failed(_)));
    }
}
