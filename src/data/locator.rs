use std::fmt;

use super::error::{MaskError, Result};
use super::model::{Container, Mask, MatValue, StructArray};

/// Field-name fragments that suggest a segmentation mask (matched
/// case-insensitively as substrings).
pub const MASK_VOCABULARY: [&str; 5] = ["segmentation", "seg", "mask", "labels", "gt"];

/// Known struct layouts (SBD `GTinst` / `GTcls`), tried in this order.
const KNOWN_STRUCTS: [(&str, &str); 2] = [("GTinst", "Segmentation"), ("GTcls", "Segmentation")];
/// Known bare variable holding the mask directly.
const KNOWN_BARE: &str = "segmentation";

// ---------------------------------------------------------------------------
// Source path
// ---------------------------------------------------------------------------

/// How many 1x1 cell levels wrap the mask inside its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    Bare,
    Single,
    Double,
}

impl Nesting {
    pub fn depth(self) -> usize {
        match self {
            Nesting::Bare => 0,
            Nesting::Single => 1,
            Nesting::Double => 2,
        }
    }

    fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => Some(Nesting::Bare),
            1 => Some(Nesting::Single),
            2 => Some(Nesting::Double),
            _ => None,
        }
    }
}

/// Where the mask was found: a top-level variable, optionally a field of
/// its (singleton) struct, and the cell nesting around the array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    pub variable: String,
    pub field: Option<String>,
    pub nesting: Nesting,
}

impl SourcePath {
    pub fn bare(variable: &str) -> Self {
        SourcePath {
            variable: variable.to_string(),
            field: None,
            nesting: Nesting::Bare,
        }
    }

    pub fn field(variable: &str, field: &str, nesting: Nesting) -> Self {
        SourcePath {
            variable: variable.to_string(),
            field: Some(field.to_string()),
            nesting,
        }
    }
}

/// Dotted form: `"GTcls.Segmentation"` or `"segmentation"`.
impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}", self.variable, field),
            None => write!(f, "{}", self.variable),
        }
    }
}

/// A successfully located mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub mask: Mask,
    pub path: SourcePath,
}

// ---------------------------------------------------------------------------
// Unwrapping helpers (shared with write-back)
// ---------------------------------------------------------------------------

/// The struct behind `value` if it is a struct array with exactly one element.
pub fn singleton_struct(value: &MatValue) -> Option<&StructArray> {
    match value {
        MatValue::Struct(s) if s.elements.len() == 1 => Some(s),
        _ => None,
    }
}

/// Peel up to two levels of 1x1 cell wrapping.
pub fn unwrap_singleton(value: &MatValue) -> (&MatValue, Nesting) {
    let mut current = value;
    let mut depth = 0;
    while depth < Nesting::Double.depth() {
        match current {
            MatValue::Cell(cell) if cell.cells.len() == 1 => {
                current = &cell.cells[0];
                depth += 1;
            }
            _ => break,
        }
    }
    (current, Nesting::from_depth(depth).unwrap_or(Nesting::Double))
}

/// Validate a value as a mask. Anything that is not a numeric array is a
/// shape error, as are numeric arrays failing [`Mask::from_numeric`].
pub fn as_mask(value: &MatValue) -> Result<Mask> {
    match value {
        MatValue::Numeric(array) => Mask::from_numeric(array),
        other => Err(MaskError::Shape(format!("{} array", other.class_name()))),
    }
}

/// Try one candidate, logging why it was rejected.
fn accept(value: &MatValue, path: SourcePath) -> Option<Located> {
    match as_mask(value) {
        Ok(mask) => Some(Located { mask, path }),
        Err(e) => {
            log::debug!("Candidate '{path}' rejected: {e}");
            None
        }
    }
}

/// Field of a singleton struct, unwrapped and validated.
fn struct_field(variable: &str, value: &MatValue, field: &str) -> Option<Located> {
    let inner = singleton_struct(value)?.field(0, field)?;
    let (array, nesting) = unwrap_singleton(inner);
    accept(array, SourcePath::field(variable, field, nesting))
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

type Strategy = fn(&Container) -> Option<Located>;

/// Search order: known struct layouts, the known bare name, then the
/// generic name/shape heuristic.
const STRATEGIES: [(&str, Strategy); 4] = [
    ("GTinst", known_gtinst),
    ("GTcls", known_gtcls),
    ("segmentation", known_bare),
    ("generic", generic),
];

fn known_struct(container: &Container, (variable, field): (&str, &str)) -> Option<Located> {
    struct_field(variable, container.get(variable)?, field)
}

fn known_gtinst(container: &Container) -> Option<Located> {
    known_struct(container, KNOWN_STRUCTS[0])
}

fn known_gtcls(container: &Container) -> Option<Located> {
    known_struct(container, KNOWN_STRUCTS[1])
}

fn known_bare(container: &Container) -> Option<Located> {
    accept(container.get(KNOWN_BARE)?, SourcePath::bare(KNOWN_BARE))
}

pub fn matches_vocabulary(field: &str) -> bool {
    let lower = field.to_lowercase();
    MASK_VOCABULARY.iter().any(|word| lower.contains(word))
}

/// First struct field whose name matches the vocabulary, or first plain
/// numeric array, in file order. Cells, chars and opaque values are skipped.
fn generic(container: &Container) -> Option<Located> {
    container.searchable().find_map(|var| match &var.value {
        MatValue::Struct(s) => s
            .field_names
            .iter()
            .filter(|f| matches_vocabulary(f))
            .find_map(|f| struct_field(&var.name, &var.value, f)),
        MatValue::Numeric(_) => accept(&var.value, SourcePath::bare(&var.name)),
        _ => None,
    })
}

/// Find the segmentation mask in a container.
pub fn locate(container: &Container) -> Result<Located> {
    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| {
            let found = strategy(container)?;
            log::info!("Mask located at '{}' by the {name} strategy", found.path);
            Some(found)
        })
        .ok_or(MaskError::NotFound)
}
