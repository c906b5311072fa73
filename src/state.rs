use std::path::{Path, PathBuf};

use crate::config::EditorConfig;
use crate::data::filter::kept_count;
use crate::data::loader::{LoadMessage, LoadTask, LoadedFile};
use crate::data::session::Session;
use crate::preview::slice_count;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Status line content: the outcome of the last operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Info(String),
    Error(String),
}

impl Status {
    pub fn text(&self) -> &str {
        match self {
            Status::Info(s) | Status::Error(s) => s,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }
}

/// The full UI state, independent of rendering.
pub struct AppState {
    pub config: EditorConfig,

    /// Opened file (None until a load succeeds).
    pub session: Option<Session>,

    /// The single in-flight background load, if any.
    pub pending_load: Option<LoadTask>,

    pub status: Status,

    /// Displayed plane of a 3-D mask.
    pub slice: usize,

    /// Bumped whenever the displayed masks change, so previews re-render.
    pub revision: u64,

    /// Outcome the UI should pop up as a dialog (failed load, save result).
    alert: Option<Status>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl AppState {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config,
            session: None,
            pending_load: None,
            status: Status::Info("Ready".to_string()),
            slice: 0,
            revision: 0,
            alert: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    /// Start loading `path` in the background. Refused while another load is
    /// in flight.
    pub fn start_load(&mut self, path: PathBuf, notify: impl Fn() + Send + 'static) -> bool {
        if self.is_loading() {
            log::warn!("Ignoring open of {}: a load is in progress", path.display());
            return false;
        }
        self.status = Status::Info(format!("Loading {}…", path.display()));
        self.pending_load = Some(LoadTask::spawn(path, notify));
        true
    }

    /// Drain messages from the background load. Returns true if anything
    /// arrived.
    pub fn poll_load(&mut self) -> bool {
        let Some(task) = &self.pending_load else {
            return false;
        };
        let mut messages = Vec::new();
        while let Some(msg) = task.poll() {
            let terminal = msg.is_terminal();
            messages.push(msg);
            if terminal {
                break;
            }
        }

        let received = !messages.is_empty();
        for msg in messages {
            match msg {
                LoadMessage::Progress(text) => self.status = Status::Info(text),
                LoadMessage::Finished(file) => {
                    self.pending_load = None;
                    self.finish_load(*file);
                }
                LoadMessage::Failed(reason) => {
                    self.pending_load = None;
                    self.fail_load(reason);
                }
            }
        }
        received
    }

    /// Replace the session with a newly loaded file.
    pub fn finish_load(&mut self, file: LoadedFile) {
        let n = file.categories.len();
        self.session = Some(Session::new(file));
        self.slice = 0;
        self.revision += 1;
        self.status = Status::Info(format!("Loaded, {n} categories"));
    }

    /// Report a failed load; the current session is left as it was.
    pub fn fail_load(&mut self, reason: String) {
        log::error!("Load failed: {reason}");
        self.status = Status::Error(format!("Load failed: {reason}"));
        self.alert = Some(self.status.clone());
    }

    /// The pending dialog message, if any; cleared once taken.
    pub fn take_alert(&mut self) -> Option<Status> {
        self.alert.take()
    }

    pub fn toggle_category(&mut self, id: i64) {
        if let Some(session) = &mut self.session {
            session.toggle(id);
        }
    }

    pub fn select_all(&mut self) {
        if let Some(session) = &mut self.session {
            session.set_all(true);
        }
    }

    pub fn select_none(&mut self) {
        if let Some(session) = &mut self.session {
            session.set_all(false);
        }
    }

    pub fn apply_selection(&mut self) {
        if let Some(session) = &mut self.session {
            let kept = session.apply();
            self.revision += 1;
            self.status = Status::Info(format!(
                "Applied selection, keeping {kept} of {} categories",
                session.categories.len()
            ));
        }
    }

    pub fn reset_selection(&mut self) {
        if let Some(session) = &mut self.session {
            session.reset();
            self.revision += 1;
            self.status = Status::Info("Reset all selections".to_string());
        }
    }

    pub fn slice_count(&self) -> usize {
        self.session
            .as_ref()
            .map_or(1, |s| slice_count(&s.original))
    }

    pub fn set_slice(&mut self, slice: usize) {
        let slice = slice.min(self.slice_count().saturating_sub(1));
        if slice != self.slice {
            self.slice = slice;
            self.revision += 1;
        }
    }

    /// Where "save" writes for the current session.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.session
            .as_ref()
            .map(|s| s.output_path(&self.config.output_suffix))
    }

    /// Save the working mask to `out`. The outcome goes to the status line
    /// and is queued as an alert; the session is unchanged either way.
    pub fn save_to(&mut self, out: &Path) -> bool {
        let Some(session) = &self.session else {
            self.status = Status::Error("Nothing to save".to_string());
            return false;
        };
        match session.save(out, self.config.compress_output) {
            Ok(()) => {
                let name = out.file_name().unwrap_or_default().to_string_lossy();
                self.status = Status::Info(format!(
                    "Saved to {name} ({} categories kept)",
                    kept_count(&session.keep)
                ));
                self.alert = Some(self.status.clone());
                true
            }
            Err(e) => {
                log::error!("Save to {} failed: {e}", out.display());
                self.status = Status::Error(format!("Save failed: {e}"));
                self.alert = Some(self.status.clone());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_file;
    use crate::data::matio;
    use crate::data::model::{Container, MatValue, NumericArray, NumericData};
    use std::time::{Duration, Instant};

    fn write_volume(dir: &Path) -> PathBuf {
        let mut c = Container::default();
        c.push(
            "labels",
            MatValue::Numeric(NumericArray::new(
                vec![2, 2, 3],
                NumericData::Int32((0..12).map(|i| i % 4).collect()),
            )),
        );
        let path = dir.join("vol.mat");
        matio::write_file(&path, &c, true).unwrap();
        path
    }

    fn wait_for_load(state: &mut AppState) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while state.is_loading() {
            assert!(Instant::now() < deadline, "load did not finish");
            state.poll_load();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_background_load_populates_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_volume(dir.path());
        let mut state = AppState::default();

        assert!(state.start_load(path.clone(), || {}));
        assert!(!state.start_load(path.clone(), || {}));
        wait_for_load(&mut state);

        let session = state.session.as_ref().unwrap();
        assert_eq!(session.categories, vec![1, 2, 3]);
        assert_eq!(state.slice_count(), 3);
        assert!(!state.status.is_error());
    }

    #[test]
    fn test_failed_load_keeps_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_volume(dir.path());
        let mut state = AppState::default();
        state.finish_load(load_file(&path).unwrap());
        state.toggle_category(2);
        state.apply_selection();
        let before = state.session.clone().unwrap();

        let bad = dir.path().join("bad.mat");
        std::fs::write(&bad, b"junk").unwrap();
        state.start_load(bad, || {});
        wait_for_load(&mut state);

        assert!(state.status.is_error());
        assert!(matches!(state.take_alert(), Some(Status::Error(_))));
        assert_eq!(state.take_alert(), None);
        let after = state.session.as_ref().unwrap();
        assert_eq!(after.path, before.path);
        assert_eq!(after.working, before.working);
        assert_eq!(after.keep, before.keep);
    }

    #[test]
    fn test_apply_reset_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_volume(dir.path());
        let mut state = AppState::default();
        state.finish_load(load_file(&path).unwrap());
        let rev = state.revision;

        state.select_none();
        state.toggle_category(3);
        state.apply_selection();
        assert!(state.revision > rev);
        let session = state.session.as_ref().unwrap();
        assert!(session.working.labels.iter().all(|&l| l == 0 || l == 3));

        let out = state.output_path().unwrap();
        assert_eq!(out.file_name().unwrap(), "vol_edited.mat");
        assert!(state.save_to(&out));
        assert!(matches!(state.take_alert(), Some(Status::Info(_))));
        assert_eq!(load_file(&out).unwrap().categories, vec![3]);

        state.reset_selection();
        let session = state.session.as_ref().unwrap();
        assert_eq!(session.working, session.original);

        state.set_slice(10);
        assert_eq!(state.slice, 2);
    }

    #[test]
    fn test_save_without_session_reports_error() {
        let mut state = AppState::default();
        assert!(!state.save_to(Path::new("/tmp/never.mat")));
        assert!(state.status.is_error());
    }
}
