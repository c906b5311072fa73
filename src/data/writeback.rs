use super::error::{MaskError, Result};
use super::locator::{Nesting, SourcePath};
use super::model::{Container, Mask, MatValue};

/// Return a copy of `container` with `mask` stored at `path`, at the same
/// cell nesting depth the mask was read from and in the slot's original
/// class and flags. Every other value is left as it was.
pub fn writeback(container: &Container, path: &SourcePath, mask: &Mask) -> Result<Container> {
    let mut updated = container.clone();

    let variable = updated.get_mut(&path.variable).ok_or_else(|| {
        MaskError::Structural(format!("variable '{}' is missing", path.variable))
    })?;

    let slot = match &path.field {
        None => variable,
        Some(field) => match variable {
            MatValue::Struct(s) if s.elements.len() == 1 => s.field_mut(0, field).ok_or_else(|| {
                MaskError::Structural(format!("struct '{}' has no field '{field}'", path.variable))
            })?,
            _ => {
                return Err(MaskError::Structural(format!(
                    "'{}' is no longer a 1x1 struct",
                    path.variable
                )))
            }
        },
    };

    let target = descend(slot, path.nesting, path)?;
    match target {
        MatValue::Numeric(array) if array.dims.as_slice() == mask.shape() => {
            *array = mask.to_numeric(array);
        }
        MatValue::Numeric(array) => {
            return Err(MaskError::Structural(format!(
                "'{path}' holds a {:?} array, mask is {:?}",
                array.dims,
                mask.shape()
            )))
        }
        other => {
            return Err(MaskError::Structural(format!(
                "'{path}' holds a {} value, expected a numeric array",
                other.class_name()
            )))
        }
    }
    log::debug!("Wrote mask {:?} back to '{path}'", mask.shape());
    Ok(updated)
}

/// Step through exactly `nesting` levels of 1x1 cells.
fn descend<'a>(slot: &'a mut MatValue, nesting: Nesting, path: &SourcePath) -> Result<&'a mut MatValue> {
    let mut current = slot;
    for level in 0..nesting.depth() {
        current = match current {
            MatValue::Cell(cell) if cell.cells.len() == 1 => &mut cell.cells[0],
            _ => {
                return Err(MaskError::Structural(format!(
                    "'{path}' lost its 1x1 cell wrapping at level {}",
                    level + 1
                )))
            }
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::{filter_mask, KeepSet};
    use crate::data::locator::locate;
    use crate::data::matio;
    use crate::data::model::{CellArray, NumericArray, NumericData, StructArray, FLAG_LOGICAL};

    fn seg() -> MatValue {
        MatValue::Numeric(NumericArray::new(
            vec![2, 3],
            NumericData::UInt8(vec![0, 1, 2, 2, 1, 0]),
        ))
    }

    fn wrap(value: MatValue, depth: usize) -> MatValue {
        (0..depth).fold(value, |v, _| MatValue::Cell(CellArray::wrap(v)))
    }

    fn gtcls(field_value: MatValue) -> Container {
        let mut c = Container::default();
        c.push("__globals__", MatValue::Numeric(NumericArray::new(vec![0, 0], NumericData::Double(vec![]))));
        c.push(
            "GTcls",
            MatValue::Struct(StructArray::scalar(vec![
                ("Boundaries".to_string(), wrap(seg(), 1)),
                ("Segmentation".to_string(), field_value),
            ])),
        );
        c
    }

    #[test]
    fn test_round_trip_at_every_depth() {
        for depth in 0..=2 {
            let container = gtcls(wrap(seg(), depth));
            let located = locate(&container).unwrap();
            assert_eq!(located.path.nesting.depth(), depth);

            // unchanged write-back reproduces the container
            let same = writeback(&container, &located.path, &located.mask).unwrap();
            assert_eq!(same, container);

            let keep: KeepSet = [(1, true), (2, false)].into_iter().collect();
            let edited = filter_mask(&located.mask, &keep);
            let updated = writeback(&container, &located.path, &edited).unwrap();

            let bytes = matio::to_bytes(&updated, true).unwrap();
            let again = locate(&matio::parse(&bytes).unwrap()).unwrap();
            assert_eq!(again.mask, edited);
            assert_eq!(again.path, located.path);
            // sibling field untouched
            assert_eq!(
                updated.get("GTcls").and_then(|v| match v {
                    MatValue::Struct(s) => s.field(0, "Boundaries").cloned(),
                    _ => None,
                }),
                Some(wrap(seg(), 1))
            );
        }
    }

    #[test]
    fn test_bare_variable_keeps_flags() {
        let mut array = NumericArray::new(vec![2, 2], NumericData::UInt8(vec![1, 0, 1, 1]));
        array.flags = FLAG_LOGICAL;
        let mut c = Container::default();
        c.push("mask", MatValue::Numeric(array));

        let located = locate(&c).unwrap();
        let cleared = filter_mask(&located.mask, &KeepSet::new());
        let updated = writeback(&c, &located.path, &cleared).unwrap();
        match updated.get("mask") {
            Some(MatValue::Numeric(a)) => {
                assert!(a.is_logical());
                assert_eq!(a.real, NumericData::UInt8(vec![0, 0, 0, 0]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_structural_errors() {
        let container = gtcls(wrap(seg(), 1));
        let located = locate(&container).unwrap();

        let mut missing = container.clone();
        missing.variables.retain(|v| v.name != "GTcls");
        assert!(matches!(
            writeback(&missing, &located.path, &located.mask),
            Err(MaskError::Structural(_))
        ));

        let unwrapped = gtcls(seg());
        assert!(matches!(
            writeback(&unwrapped, &located.path, &located.mask),
            Err(MaskError::Structural(_))
        ));

        let other_shape = gtcls(wrap(
            MatValue::Numeric(NumericArray::new(vec![3, 2], NumericData::UInt8(vec![0; 6]))),
            1,
        ));
        assert!(matches!(
            writeback(&other_shape, &located.path, &located.mask),
            Err(MaskError::Structural(_))
        ));

        let no_field = SourcePath::field("GTcls", "Missing", Nesting::Bare);
        assert!(matches!(
            writeback(&container, &no_field, &located.mask),
            Err(MaskError::Structural(_))
        ));
    }
}
