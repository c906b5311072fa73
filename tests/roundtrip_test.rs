use std::path::{Path, PathBuf};

use mask_panda::data::error::MaskError;
use mask_panda::data::loader::load_file;
use mask_panda::data::locator::{Nesting, SourcePath};
use mask_panda::data::matio;
use mask_panda::data::model::{
    CellArray, CharArray, Container, MatValue, NumericArray, NumericData, StructArray,
};
use mask_panda::data::session::Session;

/// 3x4 mask with categories 1, 2 and 7 (column-major).
fn segmentation() -> NumericArray {
    NumericArray::new(
        vec![3, 4],
        NumericData::UInt8(vec![0, 1, 1, 2, 2, 0, 7, 7, 1, 0, 0, 2]),
    )
}

fn nest(value: MatValue, depth: usize) -> MatValue {
    (0..depth).fold(value, |v, _| MatValue::Cell(CellArray::wrap(v)))
}

fn write_gtcls(dir: &Path, depth: usize) -> PathBuf {
    let mut c = Container::default();
    c.push("note", MatValue::Char(CharArray::from_text("annotated by hand")));
    c.push(
        "GTcls",
        MatValue::Struct(StructArray::scalar(vec![
            (
                "Boundaries".to_string(),
                nest(
                    MatValue::Numeric(NumericArray::new(
                        vec![3, 4],
                        NumericData::UInt8(vec![1; 12]),
                    )),
                    1,
                ),
            ),
            (
                "Segmentation".to_string(),
                nest(MatValue::Numeric(segmentation()), depth),
            ),
        ])),
    );
    let path = dir.join(format!("image_{depth}.mat"));
    matio::write_file(&path, &c, true).unwrap();
    path
}

#[test]
fn test_filter_and_save_preserves_structure_at_every_depth() {
    let dir = tempfile::tempdir().unwrap();
    let nestings = [Nesting::Bare, Nesting::Single, Nesting::Double];

    for (depth, nesting) in nestings.into_iter().enumerate() {
        let input = write_gtcls(dir.path(), depth);
        let mut session = Session::new(load_file(&input).unwrap());
        assert_eq!(session.source, SourcePath::field("GTcls", "Segmentation", nesting));
        assert_eq!(session.categories, vec![1, 2, 7]);

        session.toggle(2);
        assert_eq!(session.apply(), 2);

        let out = session.output_path("_edited");
        assert_eq!(
            out.file_name().unwrap().to_string_lossy(),
            format!("image_{depth}_edited.mat")
        );
        session.save(&out, true).unwrap();

        let reloaded = load_file(&out).unwrap();
        assert_eq!(reloaded.located.path, session.source);
        assert_eq!(reloaded.categories, vec![1, 7]);
        assert_eq!(
            reloaded.located.mask.column_major(),
            vec![0, 1, 1, 0, 0, 0, 7, 7, 1, 0, 0, 0]
        );

        // Everything except the mask is carried over unchanged.
        let before = matio::read_file(&input).unwrap();
        let after = matio::read_file(&out).unwrap();
        assert_eq!(after.get("note"), before.get("note"));
        let field = |c: &Container, name: &str| match c.get("GTcls") {
            Some(MatValue::Struct(s)) => s.field(0, name).cloned(),
            _ => None,
        };
        assert_eq!(field(&after, "Boundaries"), field(&before, "Boundaries"));
        assert_eq!(
            after.variables.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            vec!["note", "GTcls"]
        );
    }
}

#[test]
fn test_unchanged_save_reproduces_container() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_gtcls(dir.path(), 1);
    let session = Session::new(load_file(&input).unwrap());

    let out = session.output_path("_edited");
    session.save(&out, false).unwrap();
    let before = matio::read_file(&input).unwrap();
    let after = matio::read_file(&out).unwrap();
    assert_eq!(after.variables, before.variables);
}

#[test]
fn test_input_file_is_never_written() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_gtcls(dir.path(), 0);
    let original_bytes = std::fs::read(&input).unwrap();

    let mut session = Session::new(load_file(&input).unwrap());
    session.set_all(false);
    session.apply();
    assert!(session.save(&input, true).is_err());
    assert_eq!(std::fs::read(&input).unwrap(), original_bytes);
}

#[test]
fn test_file_without_mask_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = Container::default();
    c.push("title", MatValue::Char(CharArray::from_text("no labels here")));
    c.push(
        "results",
        MatValue::Struct(StructArray::scalar(vec![(
            "scores".to_string(),
            MatValue::Numeric(NumericArray::new(vec![1, 3], NumericData::Double(vec![0.5; 3]))),
        )])),
    );
    let path = dir.path().join("empty.mat");
    matio::write_file(&path, &c, false).unwrap();

    let err = load_file(&path).unwrap_err();
    assert!(matches!(err.downcast_ref::<MaskError>(), Some(MaskError::NotFound)));
}
