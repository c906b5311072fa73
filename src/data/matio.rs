use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::error::{MaskError, Result};
use super::model::{
    checked_numel, numel, CellArray, CharArray, Container, MatHeader, MatValue, NumericArray, NumericClass,
    NumericData, OpaqueArray, StructArray, Variable, FLAG_COMPLEX,
};

// ---------------------------------------------------------------------------
// MAT v5 constants
// ---------------------------------------------------------------------------

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;
const MI_UTF32: u32 = 18;

const MX_CELL: u8 = 1;
const MX_STRUCT: u8 = 2;
const MX_CHAR: u8 = 4;

const HEADER_LEN: usize = 128;
const HEADER_TEXT_LEN: usize = 116;
const MAT5_VERSION: u16 = 0x0100;
/// Field name slots are at least this wide, like MATLAB writes them.
const MIN_FIELD_NAME_LEN: usize = 32;
/// Every nested `miMATRIX` element takes at least a tag.
const MIN_NESTED_ELEMENT_LEN: usize = 8;
/// Upper bound for struct arrays without fields, whose elements take no bytes.
const MAX_EMPTY_STRUCT_ELEMENTS: usize = 1 << 16;

fn parse_err(msg: impl Into<String>) -> MaskError {
    MaskError::Parse(msg.into())
}

fn padding(n: usize) -> usize {
    (8 - n % 8) % 8
}

fn read_u16(b: &[u8], big_endian: bool) -> u16 {
    let a = [b[0], b[1]];
    if big_endian {
        u16::from_be_bytes(a)
    } else {
        u16::from_le_bytes(a)
    }
}

fn read_u64(b: &[u8], big_endian: bool) -> u64 {
    let mut a = [0u8; 8];
    a.copy_from_slice(&b[..8]);
    if big_endian {
        u64::from_be_bytes(a)
    } else {
        u64::from_le_bytes(a)
    }
}

fn put_u64(out: &mut [u8], value: u64, big_endian: bool) {
    let bytes = if big_endian {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    };
    out.copy_from_slice(&bytes);
}

fn read_u32(b: &[u8], big_endian: bool) -> u32 {
    let a = [b[0], b[1], b[2], b[3]];
    if big_endian {
        u32::from_be_bytes(a)
    } else {
        u32::from_le_bytes(a)
    }
}

// ---------------------------------------------------------------------------
// Element reader
// ---------------------------------------------------------------------------

struct ElementReader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> ElementReader<'a> {
    fn new(buf: &'a [u8], big_endian: bool) -> Self {
        ElementReader {
            buf,
            pos: 0,
            big_endian,
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(parse_err(format!(
                "unexpected end of data: need {n} bytes, {} left",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(read_u32(bytes, self.big_endian))
    }

    /// Read one data element, returning its type and payload. Handles the
    /// small-element form (payload packed into the tag) and skips padding.
    fn element(&mut self) -> Result<(u32, &'a [u8])> {
        let first = self.u32()?;
        if first >> 16 != 0 {
            let nbytes = (first >> 16) as usize;
            if nbytes > 4 {
                return Err(parse_err(format!("small element claims {nbytes} bytes")));
            }
            let data = self.take(4)?;
            return Ok((first & 0xFFFF, &data[..nbytes]));
        }
        let nbytes = self.u32()? as usize;
        let data = self.take(nbytes)?;
        // Compressed elements are not padded.
        if first != MI_COMPRESSED {
            self.pos = (self.pos + padding(nbytes)).min(self.buf.len());
        }
        Ok((first, data))
    }
}

macro_rules! decode_vec {
    ($bytes:expr, $big_endian:expr, $t:ty) => {{
        const N: usize = std::mem::size_of::<$t>();
        if $bytes.len() % N != 0 {
            return Err(parse_err(format!(
                "{} bytes is not a whole number of {}-byte values",
                $bytes.len(),
                N
            )));
        }
        $bytes
            .chunks_exact(N)
            .map(|c| {
                let mut a = [0u8; N];
                a.copy_from_slice(c);
                if $big_endian {
                    <$t>::from_be_bytes(a)
                } else {
                    <$t>::from_le_bytes(a)
                }
            })
            .collect::<Vec<$t>>()
    }};
}

fn decode_numeric(kind: u32, bytes: &[u8], big_endian: bool) -> Result<NumericData> {
    Ok(match kind {
        MI_INT8 => NumericData::Int8(decode_vec!(bytes, big_endian, i8)),
        MI_UINT8 => NumericData::UInt8(decode_vec!(bytes, big_endian, u8)),
        MI_INT16 => NumericData::Int16(decode_vec!(bytes, big_endian, i16)),
        MI_UINT16 => NumericData::UInt16(decode_vec!(bytes, big_endian, u16)),
        MI_INT32 => NumericData::Int32(decode_vec!(bytes, big_endian, i32)),
        MI_UINT32 => NumericData::UInt32(decode_vec!(bytes, big_endian, u32)),
        MI_SINGLE => NumericData::Single(decode_vec!(bytes, big_endian, f32)),
        MI_DOUBLE => NumericData::Double(decode_vec!(bytes, big_endian, f64)),
        MI_INT64 => NumericData::Int64(decode_vec!(bytes, big_endian, i64)),
        MI_UINT64 => NumericData::UInt64(decode_vec!(bytes, big_endian, u64)),
        other => return Err(parse_err(format!("unsupported numeric data type {other}"))),
    })
}

fn decode_chars(kind: u32, bytes: &[u8], big_endian: bool) -> Result<Vec<u16>> {
    Ok(match kind {
        MI_UINT16 | MI_UTF16 => decode_vec!(bytes, big_endian, u16),
        MI_UTF8 | MI_UINT8 | MI_INT8 => String::from_utf8_lossy(bytes).encode_utf16().collect(),
        MI_UTF32 => decode_vec!(bytes, big_endian, u32)
            .into_iter()
            .map(|c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect::<String>()
            .encode_utf16()
            .collect(),
        other => return Err(parse_err(format!("unsupported char data type {other}"))),
    })
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Read and parse a MAT file from disk.
pub fn read_file(path: &Path) -> Result<Container> {
    let bytes = std::fs::read(path)?;
    parse(&bytes)
}

/// Parse a Level-5 MAT file.
pub fn parse(bytes: &[u8]) -> Result<Container> {
    if bytes.len() < HEADER_LEN {
        return Err(parse_err(format!(
            "file too small ({} bytes, need at least {HEADER_LEN})",
            bytes.len()
        )));
    }
    let big_endian = match &bytes[126..128] {
        b"IM" => false,
        b"MI" => true,
        _ => {
            return Err(parse_err(
                "missing MAT v5 endian indicator (MAT v4 files are not supported)",
            ))
        }
    };
    let version = read_u16(&bytes[124..126], big_endian);
    if version != MAT5_VERSION {
        return Err(parse_err(format!(
            "unsupported MAT version {version:#06x} (v7.3/HDF5 files are not supported)"
        )));
    }
    let mut subsys = [0u8; 8];
    subsys.copy_from_slice(&bytes[HEADER_TEXT_LEN..124]);
    let subsys_offset = subsys_offset(&subsys, big_endian);

    let mut reader = ElementReader::new(&bytes[HEADER_LEN..], big_endian);
    let mut variables = Vec::new();
    let mut subsys_variable = None;
    while reader.remaining() >= 8 {
        let start = (HEADER_LEN + reader.pos) as u64;
        let (kind, data) = reader.element()?;
        let variable = match kind {
            MI_COMPRESSED => {
                let inflated = inflate(data)?;
                let mut inner = ElementReader::new(&inflated, big_endian);
                let (inner_kind, payload) = inner.element()?;
                if inner_kind != MI_MATRIX {
                    log::warn!("Skipping compressed element of type {inner_kind}");
                    continue;
                }
                parse_variable(payload, big_endian)?
            }
            MI_MATRIX => parse_variable(data, big_endian)?,
            other => {
                log::warn!("Skipping top-level element of type {other}");
                continue;
            }
        };
        if subsys_offset == Some(start) {
            subsys_variable = Some(variables.len());
        }
        variables.push(variable);
    }

    if subsys_offset.is_some() && subsys_variable.is_none() {
        log::warn!("Subsystem offset does not point at a variable; keeping it as is");
    }
    let header = MatHeader {
        text: bytes[..HEADER_TEXT_LEN].to_vec(),
        subsys,
        subsys_variable,
        version,
        big_endian,
    };

    log::debug!("Parsed {} MAT variables", variables.len());
    Ok(Container { header, variables })
}

/// The subsystem offset, or `None` when the field is unset (all zeros or
/// all spaces).
fn subsys_offset(subsys: &[u8; 8], big_endian: bool) -> Option<u64> {
    if subsys.iter().all(|&b| b == 0) || subsys.iter().all(|&b| b == b' ') {
        return None;
    }
    Some(read_u64(subsys, big_endian))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| parse_err(format!("corrupt compressed variable: {e}")))?;
    Ok(out)
}

fn parse_variable(payload: &[u8], big_endian: bool) -> Result<Variable> {
    let (name, value) = parse_matrix(payload, big_endian)?;
    Ok(Variable { name, value })
}

fn parse_nested(reader: &mut ElementReader<'_>) -> Result<MatValue> {
    let (kind, payload) = reader.element()?;
    if kind != MI_MATRIX {
        return Err(parse_err(format!("expected nested matrix, found type {kind}")));
    }
    Ok(parse_matrix(payload, reader.big_endian)?.1)
}

/// Parse the payload of one `miMATRIX` element into its name and value.
fn parse_matrix(payload: &[u8], big_endian: bool) -> Result<(String, MatValue)> {
    // MATLAB writes empty cell/struct slots as zero-length matrices.
    if payload.is_empty() {
        let empty = NumericArray::new(vec![0, 0], NumericData::Double(Vec::new()));
        return Ok((String::new(), MatValue::Numeric(empty)));
    }

    let mut reader = ElementReader::new(payload, big_endian);

    let (kind, flag_bytes) = reader.element()?;
    if kind != MI_UINT32 || flag_bytes.len() != 8 {
        return Err(parse_err("malformed array flags"));
    }
    let word = read_u32(flag_bytes, big_endian);
    let class_code = (word & 0xFF) as u8;
    let flags = ((word >> 8) & 0xFF) as u8;

    let (kind, dim_bytes) = reader.element()?;
    if kind != MI_INT32 {
        return Err(parse_err(format!("dimensions stored as type {kind}")));
    }
    let dims = decode_vec!(dim_bytes, big_endian, i32)
        .into_iter()
        .map(|d| usize::try_from(d).map_err(|_| parse_err(format!("negative dimension {d}"))))
        .collect::<Result<Vec<usize>>>()?;

    let (_, name_bytes) = reader.element()?;
    let name = String::from_utf8_lossy(name_bytes).into_owned();
    let n = checked_numel(&dims)
        .ok_or_else(|| parse_err(format!("'{name}': dimensions {dims:?} overflow")))?;

    let value = match class_code {
        MX_CELL => {
            if n > reader.remaining() / MIN_NESTED_ELEMENT_LEN {
                return Err(parse_err(format!(
                    "cell '{name}' claims {n} cells in {} bytes",
                    reader.remaining()
                )));
            }
            let mut cells = Vec::with_capacity(n);
            for _ in 0..n {
                cells.push(parse_nested(&mut reader)?);
            }
            MatValue::Cell(CellArray { dims, flags, cells })
        }
        MX_STRUCT => {
            let field_names = parse_field_names(&mut reader)?;
            let fits = match n.checked_mul(field_names.len()) {
                Some(0) => n <= MAX_EMPTY_STRUCT_ELEMENTS,
                Some(values) => values <= reader.remaining() / MIN_NESTED_ELEMENT_LEN,
                None => false,
            };
            if !fits {
                return Err(parse_err(format!(
                    "struct '{name}' claims {n} elements of {} fields in {} bytes",
                    field_names.len(),
                    reader.remaining()
                )));
            }
            let mut elements = Vec::with_capacity(n);
            for _ in 0..n {
                let mut values = Vec::with_capacity(field_names.len());
                for _ in &field_names {
                    values.push(parse_nested(&mut reader)?);
                }
                elements.push(values);
            }
            MatValue::Struct(StructArray {
                dims,
                flags,
                field_names,
                elements,
            })
        }
        MX_CHAR => {
            let data = if reader.remaining() > 0 {
                let (kind, bytes) = reader.element()?;
                decode_chars(kind, bytes, big_endian)?
            } else {
                Vec::new()
            };
            MatValue::Char(CharArray { dims, flags, data })
        }
        code => match NumericClass::from_code(code) {
            Some(class) => {
                let (kind, bytes) = reader.element()?;
                let real = decode_numeric(kind, bytes, big_endian)?.to_class(class);
                let imag = if flags & FLAG_COMPLEX != 0 {
                    let (kind, bytes) = reader.element()?;
                    Some(decode_numeric(kind, bytes, big_endian)?.to_class(class))
                } else {
                    None
                };
                if real.len() != n {
                    return Err(parse_err(format!(
                        "'{name}': {:?} needs {n} values, found {}",
                        dims,
                        real.len()
                    )));
                }
                MatValue::Numeric(NumericArray {
                    class,
                    dims,
                    flags,
                    real,
                    imag,
                })
            }
            None => {
                log::debug!("Keeping '{name}' (class {code}) as opaque payload");
                MatValue::Opaque(OpaqueArray {
                    class_code: code,
                    dims,
                    payload: payload.to_vec(),
                })
            }
        },
    };

    Ok((name, value))
}

fn parse_field_names(reader: &mut ElementReader<'_>) -> Result<Vec<String>> {
    let (_, len_bytes) = reader.element()?;
    if len_bytes.len() < 4 {
        return Err(parse_err("missing struct field name length"));
    }
    let name_len = read_u32(len_bytes, reader.big_endian) as usize;
    let (_, names) = reader.element()?;
    if name_len == 0 {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        return Err(parse_err("struct field names with zero length"));
    }
    Ok(names
        .chunks(name_len)
        .map(|chunk| {
            let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
            String::from_utf8_lossy(&chunk[..end]).into_owned()
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

macro_rules! encode_vec {
    ($values:expr, $big_endian:expr) => {{
        let mut out = Vec::new();
        for x in $values {
            if $big_endian {
                out.extend_from_slice(&x.to_be_bytes());
            } else {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        out
    }};
}

fn encode_numeric(data: &NumericData, big_endian: bool) -> (u32, Vec<u8>) {
    match data {
        NumericData::Double(v) => (MI_DOUBLE, encode_vec!(v, big_endian)),
        NumericData::Single(v) => (MI_SINGLE, encode_vec!(v, big_endian)),
        NumericData::Int8(v) => (MI_INT8, encode_vec!(v, big_endian)),
        NumericData::UInt8(v) => (MI_UINT8, v.clone()),
        NumericData::Int16(v) => (MI_INT16, encode_vec!(v, big_endian)),
        NumericData::UInt16(v) => (MI_UINT16, encode_vec!(v, big_endian)),
        NumericData::Int32(v) => (MI_INT32, encode_vec!(v, big_endian)),
        NumericData::UInt32(v) => (MI_UINT32, encode_vec!(v, big_endian)),
        NumericData::Int64(v) => (MI_INT64, encode_vec!(v, big_endian)),
        NumericData::UInt64(v) => (MI_UINT64, encode_vec!(v, big_endian)),
    }
}

fn len_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| MaskError::Structural(format!("element of {n} bytes is too large")))
}

fn put_u32(out: &mut Vec<u8>, value: u32, big_endian: bool) {
    if big_endian {
        out.extend_from_slice(&value.to_be_bytes());
    } else {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn write_element(out: &mut Vec<u8>, kind: u32, data: &[u8], big_endian: bool) -> Result<()> {
    let n = data.len();
    if (1..=4).contains(&n) && kind != MI_MATRIX {
        put_u32(out, ((n as u32) << 16) | kind, big_endian);
        out.extend_from_slice(data);
        out.resize(out.len() + 4 - n, 0);
        return Ok(());
    }
    put_u32(out, kind, big_endian);
    put_u32(out, len_u32(n)?, big_endian);
    out.extend_from_slice(data);
    out.resize(out.len() + padding(n), 0);
    Ok(())
}

/// Array flags, dimensions and name sub-elements shared by every class.
fn write_array_header(
    out: &mut Vec<u8>,
    class_code: u8,
    flags: u8,
    dims: &[usize],
    name: &str,
    big_endian: bool,
) -> Result<()> {
    let word = class_code as u32 | (flags as u32) << 8;
    let mut flag_bytes = Vec::with_capacity(8);
    put_u32(&mut flag_bytes, word, big_endian);
    put_u32(&mut flag_bytes, 0, big_endian);
    write_element(out, MI_UINT32, &flag_bytes, big_endian)?;

    let dims = dims
        .iter()
        .map(|&d| {
            i32::try_from(d).map_err(|_| MaskError::Structural(format!("dimension {d} too large")))
        })
        .collect::<Result<Vec<i32>>>()?;
    write_element(out, MI_INT32, &encode_vec!(&dims, big_endian), big_endian)?;
    write_element(out, MI_INT8, name.as_bytes(), big_endian)
}

fn write_matrix(out: &mut Vec<u8>, name: &str, value: &MatValue, big_endian: bool) -> Result<()> {
    let mut body = Vec::new();
    match value {
        MatValue::Opaque(array) => body.extend_from_slice(&array.payload),
        MatValue::Numeric(array) => {
            let flags = if array.imag.is_some() {
                array.flags | FLAG_COMPLEX
            } else {
                array.flags & !FLAG_COMPLEX
            };
            write_array_header(&mut body, array.class.code(), flags, &array.dims, name, big_endian)?;
            let (kind, bytes) = encode_numeric(&array.real, big_endian);
            write_element(&mut body, kind, &bytes, big_endian)?;
            if let Some(imag) = &array.imag {
                let (kind, bytes) = encode_numeric(imag, big_endian);
                write_element(&mut body, kind, &bytes, big_endian)?;
            }
        }
        MatValue::Char(array) => {
            write_array_header(&mut body, MX_CHAR, array.flags, &array.dims, name, big_endian)?;
            write_element(&mut body, MI_UINT16, &encode_vec!(&array.data, big_endian), big_endian)?;
        }
        MatValue::Cell(array) => {
            if array.cells.len() != numel(&array.dims) {
                return Err(MaskError::Structural(format!(
                    "cell '{name}' has {} cells for dimensions {:?}",
                    array.cells.len(),
                    array.dims
                )));
            }
            write_array_header(&mut body, MX_CELL, array.flags, &array.dims, name, big_endian)?;
            for cell in &array.cells {
                write_matrix(&mut body, "", cell, big_endian)?;
            }
        }
        MatValue::Struct(array) => {
            let n_fields = array.field_names.len();
            if array.elements.len() != numel(&array.dims)
                || array.elements.iter().any(|e| e.len() != n_fields)
            {
                return Err(MaskError::Structural(format!(
                    "struct '{name}' elements do not match its fields or dimensions"
                )));
            }
            write_array_header(&mut body, MX_STRUCT, array.flags, &array.dims, name, big_endian)?;

            let name_len = array
                .field_names
                .iter()
                .map(|f| f.len() + 1)
                .max()
                .unwrap_or(1)
                .max(MIN_FIELD_NAME_LEN);
            let len_word = encode_vec!(&[len_u32(name_len)?], big_endian);
            write_element(&mut body, MI_INT32, &len_word, big_endian)?;

            let mut names = vec![0u8; name_len * n_fields];
            for (i, field) in array.field_names.iter().enumerate() {
                names[i * name_len..i * name_len + field.len()].copy_from_slice(field.as_bytes());
            }
            write_element(&mut body, MI_INT8, &names, big_endian)?;

            for element in &array.elements {
                for value in element {
                    write_matrix(&mut body, "", value, big_endian)?;
                }
            }
        }
    }
    write_element(out, MI_MATRIX, &body, big_endian)
}

/// Serialize a container into MAT v5 bytes, in the byte order recorded in its
/// header. With `compress`, every variable is stored as a zlib stream.
pub fn to_bytes(container: &Container, compress: bool) -> Result<Vec<u8>> {
    let header = &container.header;
    let big_endian = header.big_endian;

    let mut out = Vec::new();
    let mut text = header.text.clone();
    text.truncate(HEADER_TEXT_LEN);
    text.resize(HEADER_TEXT_LEN, b' ');
    out.extend_from_slice(&text);
    out.extend_from_slice(&header.subsys);
    let mut subsys_at = None;
    if big_endian {
        out.extend_from_slice(&MAT5_VERSION.to_be_bytes());
        out.extend_from_slice(b"MI");
    } else {
        out.extend_from_slice(&MAT5_VERSION.to_le_bytes());
        out.extend_from_slice(b"IM");
    }

    for (index, var) in container.variables.iter().enumerate() {
        if header.subsys_variable == Some(index) {
            subsys_at = Some(out.len() as u64);
        }
        let mut element = Vec::new();
        write_matrix(&mut element, &var.name, &var.value, big_endian)?;
        if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&element)?;
            let packed = encoder.finish()?;
            put_u32(&mut out, MI_COMPRESSED, big_endian);
            put_u32(&mut out, len_u32(packed.len())?, big_endian);
            out.extend_from_slice(&packed);
        } else {
            out.extend_from_slice(&element);
        }
    }

    // Elements move when re-encoded, so the subsystem offset is rewritten to
    // where its variable landed, or cleared if the variable is gone.
    if header.subsys_variable.is_some() {
        put_u64(&mut out[HEADER_TEXT_LEN..124], subsys_at.unwrap_or(0), big_endian);
    }
    Ok(out)
}

/// Encode the whole container in memory, then write it next to `path` and
/// rename it into place so a failed save never leaves a truncated file.
pub fn write_file(path: &Path, container: &Container, compress: bool) -> Result<()> {
    let bytes = to_bytes(container, compress)?;
    let tmp = partial_path(path);
    if let Err(e) = std::fs::write(&tmp, &bytes).and_then(|_| std::fs::rename(&tmp, path)) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    log::info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}
