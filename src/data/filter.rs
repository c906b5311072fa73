use std::collections::BTreeMap;

use super::model::Mask;

// ---------------------------------------------------------------------------
// Keep-set: which categories survive filtering
// ---------------------------------------------------------------------------

/// Per-category keep flag: category id → keep.
/// A label absent from the map is treated as not kept.
pub type KeepSet = BTreeMap<i64, bool>;

/// Initialise a [`KeepSet`] with every category kept.
pub fn init_keep_set(categories: &[i64]) -> KeepSet {
    categories.iter().map(|&id| (id, true)).collect()
}

/// Display name of a category.
pub fn category_name(id: i64) -> String {
    format!("Category {id}")
}

/// Number of categories currently kept.
pub fn kept_count(keep: &KeepSet) -> usize {
    keep.values().filter(|&&k| k).count()
}

/// Return a mask of the same shape and class where every element whose label
/// is not kept is reset to background (0). Kept labels stay in place.
pub fn filter_mask(original: &Mask, keep: &KeepSet) -> Mask {
    let labels = original.labels.mapv(|label| {
        if label != 0 && keep.get(&label).copied().unwrap_or(false) {
            label
        } else {
            0
        }
    });
    Mask {
        class: original.class,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{NumericArray, NumericClass, NumericData};
    use ndarray::{ArrayD, IxDyn};

    /// 4x4 mask containing labels 0..=3.
    fn mask_4x4() -> Mask {
        let labels = vec![
            0, 1, 1, 2, //
            0, 1, 2, 2, //
            3, 3, 0, 2, //
            3, 0, 1, 0,
        ];
        Mask {
            class: NumericClass::UInt8,
            labels: ArrayD::from_shape_vec(IxDyn(&[4, 4]), labels).unwrap(),
        }
    }

    #[test]
    fn test_drop_one_category() {
        let m = mask_4x4();
        let keep: KeepSet = [(1, true), (2, false), (3, true)].into_iter().collect();
        let out = filter_mask(&m, &keep);

        assert_eq!(out.shape(), m.shape());
        assert_eq!(out.class, m.class);
        for (before, after) in m.labels.iter().zip(out.labels.iter()) {
            match before {
                2 => assert_eq!(*after, 0),
                other => assert_eq!(after, other),
            }
        }
        assert_eq!(out.categories(), vec![1, 3]);
    }

    #[test]
    fn test_all_kept_is_identity() {
        let m = mask_4x4();
        let keep = init_keep_set(&m.categories());
        assert_eq!(filter_mask(&m, &keep), m);
    }

    #[test]
    fn test_none_kept_is_all_zero() {
        let m = mask_4x4();
        let keep: KeepSet = m.categories().into_iter().map(|id| (id, false)).collect();
        let out = filter_mask(&m, &keep);
        assert_eq!(out.shape(), &[4, 4]);
        assert!(out.labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let m = mask_4x4();
        let keep: KeepSet = [(1, false), (2, true), (3, true)].into_iter().collect();
        let once = filter_mask(&m, &keep);
        assert_eq!(filter_mask(&once, &keep), once);
    }

    #[test]
    fn test_filter_preserves_3d_layout() {
        let arr = NumericArray::new(
            vec![2, 2, 2],
            NumericData::Double(vec![1.0, 2.0, 0.0, 2.0, 5.0, 1.0, 5.0, 0.0]),
        );
        let m = Mask::from_numeric(&arr).unwrap();
        let keep: KeepSet = [(1, true), (2, false), (5, true)].into_iter().collect();
        let out = filter_mask(&m, &keep);
        assert_eq!(out.column_major(), vec![1, 0, 0, 0, 5, 1, 5, 0]);
        assert_eq!(out.to_numeric(&arr).real, NumericData::Double(vec![1.0, 0.0, 0.0, 0.0, 5.0, 1.0, 5.0, 0.0]));
    }

    #[test]
    fn test_names_and_counts() {
        assert_eq!(category_name(15), "Category 15");
        let keep: KeepSet = [(1, true), (2, false), (3, true)].into_iter().collect();
        assert_eq!(kept_count(&keep), 2);
    }
}
