use std::path::Path;

use mask_panda::data::matio;
use mask_panda::data::model::{
    CellArray, Container, MatValue, NumericArray, NumericClass, NumericData, StructArray,
};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// A labelled ball: centre, radius and category.
struct Blob {
    centre: [f64; 3],
    radius: f64,
    label: i64,
}

fn random_blobs(rng: &mut SimpleRng, dims: [usize; 3], labels: &[i64], per_label: usize) -> Vec<Blob> {
    let max_r = dims[0].min(dims[1]) as f64 / 6.0;
    labels
        .iter()
        .flat_map(|&label| std::iter::repeat(label).take(per_label))
        .map(|label| Blob {
            centre: [
                rng.range(0.0, dims[0] as f64),
                rng.range(0.0, dims[1] as f64),
                rng.range(0.0, dims[2] as f64),
            ],
            radius: rng.range(max_r / 3.0, max_r),
            label,
        })
        .collect()
}

/// Paint blobs into a column-major label volume; later blobs win.
fn paint(dims: [usize; 3], blobs: &[Blob]) -> Vec<i64> {
    let [rows, cols, planes] = dims;
    let mut out = vec![0i64; rows * cols * planes];
    for k in 0..planes {
        for c in 0..cols {
            for r in 0..rows {
                let p = [r as f64, c as f64, k as f64];
                let hit = blobs.iter().rev().find(|b| {
                    let d2: f64 = (0..3).map(|i| (p[i] - b.centre[i]).powi(2)).sum();
                    d2 <= b.radius * b.radius
                });
                if let Some(b) = hit {
                    out[r + c * rows + k * rows * cols] = b.label;
                }
            }
        }
    }
    out
}

/// 1 where a 2-D label map changes between 4-neighbours.
fn boundaries(labels: &[i64], rows: usize, cols: usize) -> Vec<u8> {
    let at = |r: usize, c: usize| labels[r + c * rows];
    let mut out = vec![0u8; rows * cols];
    for c in 0..cols {
        for r in 0..rows {
            let edge = (r + 1 < rows && at(r + 1, c) != at(r, c))
                || (c + 1 < cols && at(r, c + 1) != at(r, c));
            out[r + c * rows] = edge as u8;
        }
    }
    out
}

fn write_gtcls(rng: &mut SimpleRng) {
    let (rows, cols) = (120, 160);
    let blobs = random_blobs(rng, [rows, cols, 1], &[1, 5, 9, 15, 20], 3);
    let labels = paint([rows, cols, 1], &blobs);

    let mut present: Vec<i64> = labels.iter().copied().filter(|&l| l != 0).collect();
    present.sort_unstable();
    present.dedup();

    let segmentation = NumericArray::new(
        vec![rows, cols],
        NumericData::from_labels(NumericClass::UInt8, labels.clone()),
    );
    let edges = NumericArray::new(vec![rows, cols], NumericData::UInt8(boundaries(&labels, rows, cols)));
    let categories = NumericArray::new(
        vec![present.len(), 1],
        NumericData::Double(present.iter().map(|&l| l as f64).collect()),
    );

    let mut container = Container::default();
    container.push(
        "GTcls",
        MatValue::Struct(StructArray::scalar(vec![
            (
                "Boundaries".to_string(),
                MatValue::Cell(CellArray::wrap(MatValue::Numeric(edges))),
            ),
            ("Segmentation".to_string(), MatValue::Numeric(segmentation)),
            ("CategoriesPresent".to_string(), MatValue::Numeric(categories)),
        ])),
    );

    let output_path = "sample_gtcls.mat";
    matio::write_file(Path::new(output_path), &container, true).expect("Failed to write sample");
    println!("Wrote {rows}x{cols} mask with categories {present:?} to {output_path}");
}

fn write_volume(rng: &mut SimpleRng) {
    let dims = [48, 48, 8];
    let blobs = random_blobs(rng, dims, &[1, 2, 3, 4], 2);
    let labels = paint(dims, &blobs);

    let mut container = Container::default();
    container.push(
        "labels",
        MatValue::Numeric(NumericArray::new(
            dims.to_vec(),
            NumericData::from_labels(NumericClass::UInt16, labels),
        )),
    );

    let output_path = "sample_volume.mat";
    matio::write_file(Path::new(output_path), &container, false).expect("Failed to write sample");
    println!("Wrote {}x{}x{} label volume to {output_path}", dims[0], dims[1], dims[2]);
}

fn main() {
    let mut rng = SimpleRng::new(42);
    write_gtcls(&mut rng);
    write_volume(&mut rng);
}
