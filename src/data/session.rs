use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::{MaskError, Result};
use super::filter::{filter_mask, init_keep_set, kept_count, KeepSet};
use super::loader::LoadedFile;
use super::locator::SourcePath;
use super::matio;
use super::model::{Container, Mask};
use super::writeback::writeback;

/// `<stem><suffix><.ext>` next to `input`.
pub fn edited_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let name = match input.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    input.with_file_name(name)
}

/// Whether two paths name the same file. Paths that do not exist yet are
/// compared as written.
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// Session – one opened file and its edits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Session {
    /// The input file; never written to.
    pub path: PathBuf,
    pub container: Container,
    pub source: SourcePath,
    /// Mask as located at load time.
    pub original: Mask,
    /// Mask after the last apply/reset.
    pub working: Mask,
    /// Fixed universe of togglable categories.
    pub categories: Vec<i64>,
    pub counts: BTreeMap<i64, usize>,
    /// Current selection, edited by toggles.
    pub keep: KeepSet,
    /// Selection that produced `working`.
    applied: KeepSet,
}

impl Session {
    pub fn new(file: LoadedFile) -> Self {
        let keep = init_keep_set(&file.categories);
        Session {
            path: file.path,
            container: file.container,
            source: file.located.path,
            working: file.located.mask.clone(),
            original: file.located.mask,
            categories: file.categories,
            counts: file.counts,
            applied: keep.clone(),
            keep,
        }
    }

    pub fn is_kept(&self, id: i64) -> bool {
        self.keep.get(&id).copied().unwrap_or(false)
    }

    pub fn toggle(&mut self, id: i64) {
        if let Some(flag) = self.keep.get_mut(&id) {
            *flag = !*flag;
        }
    }

    pub fn set_all(&mut self, keep: bool) {
        self.keep.values_mut().for_each(|flag| *flag = keep);
    }

    /// Selection differs from what the working mask shows.
    pub fn has_pending_changes(&self) -> bool {
        self.keep != self.applied
    }

    /// Working mask differs from the load-time mask.
    pub fn is_modified(&self) -> bool {
        self.working != self.original
    }

    /// Recompute the working mask from the original and the current
    /// selection. Returns the number of kept categories.
    pub fn apply(&mut self) -> usize {
        self.working = filter_mask(&self.original, &self.keep);
        self.applied = self.keep.clone();
        let kept = kept_count(&self.keep);
        log::info!("Applied selection: keeping {kept}/{} categories", self.categories.len());
        kept
    }

    /// Restore the load-time mask and keep every category.
    pub fn reset(&mut self) {
        self.working = self.original.clone();
        self.keep = init_keep_set(&self.categories);
        self.applied = self.keep.clone();
        log::info!("Reset selection");
    }

    pub fn output_path(&self, suffix: &str) -> PathBuf {
        edited_path(&self.path, suffix)
    }

    /// Write the container with the working mask to `out`. The session is
    /// left untouched whether or not this succeeds.
    pub fn save(&self, out: &Path, compress: bool) -> Result<()> {
        if same_file(out, &self.path) {
            return Err(MaskError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "refusing to overwrite the input file",
            )));
        }
        let updated = writeback(&self.container, &self.source, &self.working)?;
        matio::write_file(out, &updated, compress)?;
        log::info!("Saved edited mask to {}", out.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_file;
    use crate::data::model::{MatValue, NumericArray, NumericData, StructArray};

    fn open_sample(dir: &Path) -> Session {
        let mut c = Container::default();
        c.push(
            "GTcls",
            MatValue::Struct(StructArray::scalar(vec![(
                "Segmentation".to_string(),
                MatValue::Numeric(NumericArray::new(
                    vec![2, 3],
                    NumericData::UInt8(vec![0, 1, 2, 3, 2, 1]),
                )),
            )])),
        );
        let path = dir.join("img.mat");
        matio::write_file(&path, &c, false).unwrap();
        Session::new(load_file(&path).unwrap())
    }

    #[test]
    fn test_edited_path() {
        assert_eq!(
            edited_path(Path::new("/data/2008_000123.mat"), "_edited"),
            PathBuf::from("/data/2008_000123_edited.mat")
        );
        assert_eq!(
            edited_path(Path::new("/data/mask"), "_edited"),
            PathBuf::from("/data/mask_edited")
        );
    }

    #[test]
    fn test_apply_then_reset_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = open_sample(dir.path());
        assert_eq!(s.categories, vec![1, 2, 3]);
        assert!(s.keep.values().all(|&k| k));

        s.toggle(2);
        assert!(s.has_pending_changes());
        assert_eq!(s.apply(), 2);
        assert!(!s.has_pending_changes());
        assert_eq!(s.working.column_major(), vec![0, 1, 0, 3, 0, 1]);

        s.set_all(false);
        s.apply();
        assert!(s.working.labels.iter().all(|&l| l == 0));

        s.reset();
        assert_eq!(s.working, s.original);
        assert!(s.categories.iter().all(|&id| s.is_kept(id)));
        assert!(!s.is_modified());
    }

    #[test]
    fn test_save_writes_edited_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = open_sample(dir.path());
        let input_bytes = std::fs::read(&s.path).unwrap();

        s.toggle(1);
        s.apply();
        let out = s.output_path("_edited");
        s.save(&out, true).unwrap();

        let reloaded = load_file(&out).unwrap();
        assert_eq!(reloaded.located.mask, s.working);
        assert_eq!(reloaded.categories, vec![2, 3]);
        assert_eq!(std::fs::read(&s.path).unwrap(), input_bytes);

        assert!(matches!(s.save(&s.path.clone(), false), Err(MaskError::Io(_))));
    }

    #[test]
    fn test_save_refuses_other_spellings_of_the_input() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let s = open_sample(dir.path());
        let input_bytes = std::fs::read(&s.path).unwrap();

        let detour = dir.path().join("sub").join("..").join("img.mat");
        assert_ne!(detour, s.path);
        assert!(matches!(s.save(&detour, false), Err(MaskError::Io(_))));
        assert_eq!(std::fs::read(&s.path).unwrap(), input_bytes);
    }

    #[test]
    fn test_failed_save_keeps_session_editable() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = open_sample(dir.path());
        s.container.variables.clear();
        let out = s.output_path("_edited");
        assert!(matches!(s.save(&out, false), Err(MaskError::Structural(_))));
        assert!(!out.exists());

        s.toggle(3);
        assert_eq!(s.apply(), 2);
    }
}
