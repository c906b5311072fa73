use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use super::error::{MaskError, Result};

/// Array flag bits as stored in the MAT array-flags sub-element.
pub const FLAG_COMPLEX: u8 = 0x08;
pub const FLAG_GLOBAL: u8 = 0x04;
pub const FLAG_LOGICAL: u8 = 0x02;

/// Variables with this prefix are metadata: never searched, always preserved.
pub const METADATA_PREFIX: &str = "__";

/// Number of elements described by a dimension vector.
pub fn numel(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Like [`numel`], but `None` when the product does not fit in `usize`.
pub fn checked_numel(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

// ---------------------------------------------------------------------------
// NumericClass / NumericData – typed storage of numeric arrays
// ---------------------------------------------------------------------------

/// MATLAB numeric array classes (`mxDOUBLE_CLASS` .. `mxUINT64_CLASS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericClass {
    Double,
    Single,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
}

impl NumericClass {
    pub fn from_code(code: u8) -> Option<Self> {
        use NumericClass::*;
        Some(match code {
            6 => Double,
            7 => Single,
            8 => Int8,
            9 => UInt8,
            10 => Int16,
            11 => UInt16,
            12 => Int32,
            13 => UInt32,
            14 => Int64,
            15 => UInt64,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        use NumericClass::*;
        match self {
            Double => 6,
            Single => 7,
            Int8 => 8,
            UInt8 => 9,
            Int16 => 10,
            UInt16 => 11,
            Int32 => 12,
            UInt32 => 13,
            Int64 => 14,
            UInt64 => 15,
        }
    }

    pub fn name(self) -> &'static str {
        use NumericClass::*;
        match self {
            Double => "double",
            Single => "single",
            Int8 => "int8",
            UInt8 => "uint8",
            Int16 => "int16",
            UInt16 => "uint16",
            Int32 => "int32",
            UInt32 => "uint32",
            Int64 => "int64",
            UInt64 => "uint64",
        }
    }
}

impl fmt::Display for NumericClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element values of a numeric array, held in the array's own class.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericData {
    Double(Vec<f64>),
    Single(Vec<f32>),
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
}

/// Run `$body` with `$v` bound to the inner vector, whatever its type.
macro_rules! with_values {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            NumericData::Double($v) => $body,
            NumericData::Single($v) => $body,
            NumericData::Int8($v) => $body,
            NumericData::UInt8($v) => $body,
            NumericData::Int16($v) => $body,
            NumericData::UInt16($v) => $body,
            NumericData::Int32($v) => $body,
            NumericData::UInt32($v) => $body,
            NumericData::Int64($v) => $body,
            NumericData::UInt64($v) => $body,
        }
    };
}

/// Numeric cast of every element into the storage type of `$class`.
macro_rules! cast_into {
    ($values:expr, $class:expr) => {
        match $class {
            NumericClass::Double => NumericData::Double($values.iter().map(|&x| x as f64).collect()),
            NumericClass::Single => NumericData::Single($values.iter().map(|&x| x as f32).collect()),
            NumericClass::Int8 => NumericData::Int8($values.iter().map(|&x| x as i8).collect()),
            NumericClass::UInt8 => NumericData::UInt8($values.iter().map(|&x| x as u8).collect()),
            NumericClass::Int16 => NumericData::Int16($values.iter().map(|&x| x as i16).collect()),
            NumericClass::UInt16 => NumericData::UInt16($values.iter().map(|&x| x as u16).collect()),
            NumericClass::Int32 => NumericData::Int32($values.iter().map(|&x| x as i32).collect()),
            NumericClass::UInt32 => NumericData::UInt32($values.iter().map(|&x| x as u32).collect()),
            NumericClass::Int64 => NumericData::Int64($values.iter().map(|&x| x as i64).collect()),
            NumericClass::UInt64 => NumericData::UInt64($values.iter().map(|&x| x as u64).collect()),
        }
    };
}

impl NumericData {
    pub fn len(&self) -> usize {
        with_values!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The class whose storage type this data uses.
    pub fn class(&self) -> NumericClass {
        match self {
            NumericData::Double(_) => NumericClass::Double,
            NumericData::Single(_) => NumericClass::Single,
            NumericData::Int8(_) => NumericClass::Int8,
            NumericData::UInt8(_) => NumericClass::UInt8,
            NumericData::Int16(_) => NumericClass::Int16,
            NumericData::UInt16(_) => NumericClass::UInt16,
            NumericData::Int32(_) => NumericClass::Int32,
            NumericData::UInt32(_) => NumericClass::UInt32,
            NumericData::Int64(_) => NumericClass::Int64,
            NumericData::UInt64(_) => NumericClass::UInt64,
        }
    }

    /// Convert to the storage type of `class` (MAT files may store e.g. a
    /// double array as `miUINT8` on disk).
    pub fn to_class(&self, class: NumericClass) -> NumericData {
        if self.class() == class {
            return self.clone();
        }
        with_values!(self, v => cast_into!(v, class))
    }

    /// Interpret every element as an integer label. `None` if any element is
    /// fractional, non-finite or outside the `i64` range.
    pub fn to_labels(&self) -> Option<Vec<i64>> {
        match self {
            NumericData::Double(v) => v.iter().map(|&x| float_label(x)).collect(),
            NumericData::Single(v) => v.iter().map(|&x| float_label(x as f64)).collect(),
            NumericData::UInt64(v) => v.iter().map(|&x| i64::try_from(x).ok()).collect(),
            NumericData::Int8(v) => Some(v.iter().map(|&x| x as i64).collect()),
            NumericData::UInt8(v) => Some(v.iter().map(|&x| x as i64).collect()),
            NumericData::Int16(v) => Some(v.iter().map(|&x| x as i64).collect()),
            NumericData::UInt16(v) => Some(v.iter().map(|&x| x as i64).collect()),
            NumericData::Int32(v) => Some(v.iter().map(|&x| x as i64).collect()),
            NumericData::UInt32(v) => Some(v.iter().map(|&x| x as i64).collect()),
            NumericData::Int64(v) => Some(v.clone()),
        }
    }

    /// Build data of the given class from integer labels.
    pub fn from_labels(class: NumericClass, labels: Vec<i64>) -> NumericData {
        NumericData::Int64(labels).to_class(class)
    }
}

fn float_label(x: f64) -> Option<i64> {
    let in_range = x >= i64::MIN as f64 && x < i64::MAX as f64;
    (x.is_finite() && x.fract() == 0.0 && in_range).then_some(x as i64)
}

// ---------------------------------------------------------------------------
// MatValue – one array stored in a MAT container
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    pub class: NumericClass,
    /// Column-major dimensions, always at least two.
    pub dims: Vec<usize>,
    /// Raw flag bits (`FLAG_*`).
    pub flags: u8,
    pub real: NumericData,
    pub imag: Option<NumericData>,
}

impl NumericArray {
    /// A real, unflagged array.
    pub fn new(dims: Vec<usize>, real: NumericData) -> Self {
        NumericArray {
            class: real.class(),
            dims,
            flags: 0,
            real,
            imag: None,
        }
    }

    pub fn is_complex(&self) -> bool {
        self.imag.is_some() || self.flags & FLAG_COMPLEX != 0
    }

    pub fn is_logical(&self) -> bool {
        self.flags & FLAG_LOGICAL != 0
    }
}

/// Character array kept as UTF-16 code units in column-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct CharArray {
    pub dims: Vec<usize>,
    pub flags: u8,
    pub data: Vec<u16>,
}

impl CharArray {
    pub fn from_text(text: &str) -> Self {
        let data: Vec<u16> = text.encode_utf16().collect();
        CharArray {
            dims: vec![1, data.len()],
            flags: 0,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellArray {
    pub dims: Vec<usize>,
    pub flags: u8,
    /// Cells in column-major order.
    pub cells: Vec<MatValue>,
}

impl CellArray {
    /// A 1x1 cell wrapping `value`.
    pub fn wrap(value: MatValue) -> Self {
        CellArray {
            dims: vec![1, 1],
            flags: 0,
            cells: vec![value],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructArray {
    pub dims: Vec<usize>,
    pub flags: u8,
    /// Field names in file order.
    pub field_names: Vec<String>,
    /// One entry per element (column-major), each holding one value per field.
    pub elements: Vec<Vec<MatValue>>,
}

impl StructArray {
    /// A 1x1 struct with the given fields.
    pub fn scalar(fields: Vec<(String, MatValue)>) -> Self {
        let (field_names, values) = fields.into_iter().unzip();
        StructArray {
            dims: vec![1, 1],
            flags: 0,
            field_names,
            elements: vec![values],
        }
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }

    pub fn field(&self, element: usize, name: &str) -> Option<&MatValue> {
        let idx = self.field_index(name)?;
        self.elements.get(element)?.get(idx)
    }

    pub fn field_mut(&mut self, element: usize, name: &str) -> Option<&mut MatValue> {
        let idx = self.field_index(name)?;
        self.elements.get_mut(element)?.get_mut(idx)
    }
}

/// An array class this tool does not interpret (sparse, object, function
/// handle...). The element payload is kept byte for byte, in the byte order
/// of the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueArray {
    pub class_code: u8,
    pub dims: Vec<usize>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatValue {
    Numeric(NumericArray),
    Char(CharArray),
    Cell(CellArray),
    Struct(StructArray),
    Opaque(OpaqueArray),
}

impl MatValue {
    pub fn dims(&self) -> &[usize] {
        match self {
            MatValue::Numeric(a) => &a.dims,
            MatValue::Char(a) => &a.dims,
            MatValue::Cell(a) => &a.dims,
            MatValue::Struct(a) => &a.dims,
            MatValue::Opaque(a) => &a.dims,
        }
    }

    pub fn class_name(&self) -> String {
        match self {
            MatValue::Numeric(a) if a.is_logical() => "logical".to_string(),
            MatValue::Numeric(a) => a.class.to_string(),
            MatValue::Char(_) => "char".to_string(),
            MatValue::Cell(_) => "cell".to_string(),
            MatValue::Struct(_) => "struct".to_string(),
            MatValue::Opaque(a) => format!("class {}", a.class_code),
        }
    }
}

// ---------------------------------------------------------------------------
// Container – the whole deserialized file
// ---------------------------------------------------------------------------

/// The 128-byte MAT v5 file header.
#[derive(Debug, Clone, PartialEq)]
pub struct MatHeader {
    /// Descriptive text, up to 116 bytes.
    pub text: Vec<u8>,
    /// Subsystem data offset as read from the file.
    pub subsys: [u8; 8],
    /// Index of the variable `subsys` points at (MATLAB's
    /// `__function_workspace__`). The offset is recomputed on write.
    pub subsys_variable: Option<usize>,
    pub version: u16,
    pub big_endian: bool,
}

impl Default for MatHeader {
    fn default() -> Self {
        MatHeader {
            text: b"MATLAB 5.0 MAT-file, Platform: rust, Created by: mask-panda".to_vec(),
            subsys: [0; 8],
            subsys_variable: None,
            version: 0x0100,
            big_endian: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: MatValue,
}

/// Named top-level variables in file order, plus the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    pub header: MatHeader,
    pub variables: Vec<Variable>,
}

impl Container {
    pub fn is_metadata_name(name: &str) -> bool {
        name.starts_with(METADATA_PREFIX)
    }

    pub fn push(&mut self, name: &str, value: MatValue) {
        self.variables.push(Variable {
            name: name.to_string(),
            value,
        });
    }

    pub fn get(&self, name: &str) -> Option<&MatValue> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MatValue> {
        self.variables
            .iter_mut()
            .find(|v| v.name == name)
            .map(|v| &mut v.value)
    }

    /// Variables eligible for the mask search, in file order.
    pub fn searchable(&self) -> impl Iterator<Item = &Variable> {
        self.variables
            .iter()
            .filter(|v| !Self::is_metadata_name(&v.name))
    }
}

// ---------------------------------------------------------------------------
// Mask – the located label array
// ---------------------------------------------------------------------------

/// A 2-D or 3-D label array together with the class it is stored as.
/// Label 0 is background.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub class: NumericClass,
    pub labels: ArrayD<i64>,
}

impl Mask {
    /// Validate a numeric array as a mask: real, rank 2 or 3, no empty
    /// dimension, integral values.
    pub fn from_numeric(array: &NumericArray) -> Result<Mask> {
        if array.is_complex() {
            return Err(MaskError::Shape("complex array".into()));
        }
        let rank = array.dims.len();
        if !(2..=3).contains(&rank) {
            return Err(MaskError::Shape(format!("rank {rank}, expected 2 or 3")));
        }
        if array.dims.contains(&0) {
            return Err(MaskError::Shape(format!("empty array {:?}", array.dims)));
        }
        let labels = array
            .real
            .to_labels()
            .ok_or_else(|| MaskError::Shape("values are not integer labels".into()))?;
        let labels = ArrayD::from_shape_vec(IxDyn(&array.dims).f(), labels)
            .map_err(|e| MaskError::Shape(format!("data does not match {:?}: {e}", array.dims)))?;
        Ok(Mask {
            class: array.class,
            labels,
        })
    }

    /// Convert back into a numeric array shaped like `template`, keeping its
    /// flags (logical, global).
    pub fn to_numeric(&self, template: &NumericArray) -> NumericArray {
        NumericArray {
            class: self.class,
            dims: self.shape().to_vec(),
            flags: template.flags & !FLAG_COMPLEX,
            real: NumericData::from_labels(self.class, self.column_major()),
            imag: None,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.labels.shape()
    }

    pub fn ndim(&self) -> usize {
        self.labels.ndim()
    }

    /// Labels in MAT (column-major) element order.
    pub fn column_major(&self) -> Vec<i64> {
        self.labels.t().iter().copied().collect()
    }

    /// Sorted distinct nonzero labels.
    pub fn categories(&self) -> Vec<i64> {
        let set: BTreeSet<i64> = self.labels.iter().copied().filter(|&l| l != 0).collect();
        set.into_iter().collect()
    }

    /// Number of elements carrying each nonzero label.
    pub fn category_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for &label in self.labels.iter().filter(|&&l| l != 0) {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }
}
