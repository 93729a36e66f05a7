//! Reader and writer for the NumPy `.npy` array container
//!
//! Only the subset the factor store needs is supported: a two-dimensional,
//! C-ordered array of little-endian `f64` (`descr` `'<f8'`). Format versions
//! 1.0, 2.0 and 3.0 are accepted; they differ only in the width of the header
//! length field.

use std::io::{self, Read, Write};

use thiserror::Error;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const F64_DESCR: &str = "<f8";
const HEADER_ALIGN: usize = 64;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("missing .npy magic string")]
    BadMagic,

    #[error("unsupported .npy format version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("unsupported dtype {0:?}, expected '<f8'")]
    UnsupportedDtype(String),

    #[error("Fortran-ordered arrays are not supported")]
    FortranOrder,

    #[error("expected a 2-D array, found shape {0:?}")]
    BadShape(Vec<usize>),

    #[error("array payload holds {actual} bytes, header promises {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("array payload has {extra} bytes past the end of the data")]
    TrailingBytes { extra: usize },
}

/// Row-major `f64` matrix decoded from a `.npy` file.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

/// Decodes a 2-D `<f8` array.
pub fn read_matrix<R: Read>(mut reader: R) -> Result<NpyMatrix, NpyError> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => NpyError::BadMagic,
        _ => NpyError::Io(e),
    })?;
    if &magic[..6] != MAGIC {
        return Err(NpyError::BadMagic);
    }

    let (major, minor) = (magic[6], magic[7]);
    let header_len = match major {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        _ => return Err(NpyError::UnsupportedVersion { major, minor }),
    };

    let mut header = Vec::new();
    reader
        .by_ref()
        .take(header_len as u64)
        .read_to_end(&mut header)?;
    if header.len() < header_len {
        return Err(NpyError::MalformedHeader(
            "header is shorter than its declared length".to_string(),
        ));
    }
    let header = std::str::from_utf8(&header)
        .map_err(|_| NpyError::MalformedHeader("header is not valid UTF-8".to_string()))?;

    let descr = parse_quoted(field(header, "descr")?)?;
    if descr != F64_DESCR {
        return Err(NpyError::UnsupportedDtype(descr.to_string()));
    }
    if parse_bool(field(header, "fortran_order")?)? {
        return Err(NpyError::FortranOrder);
    }
    let shape = parse_shape(field(header, "shape")?)?;
    let (rows, cols) = match shape.as_slice() {
        [rows, cols] => (*rows, *cols),
        _ => return Err(NpyError::BadShape(shape)),
    };

    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f64>()))
        .ok_or_else(|| NpyError::BadShape(vec![rows, cols]))?;

    // The header is untrusted; the buffer only grows with bytes actually read.
    let mut payload = Vec::new();
    reader
        .by_ref()
        .take((expected as u64).saturating_add(1))
        .read_to_end(&mut payload)?;
    if payload.len() < expected {
        return Err(NpyError::Truncated {
            expected,
            actual: payload.len(),
        });
    }
    if payload.len() > expected {
        let rest = io::copy(&mut reader, &mut io::sink())?;
        return Err(NpyError::TrailingBytes {
            extra: payload.len() - expected + rest as usize,
        });
    }

    let data = payload
        .chunks_exact(8)
        .map(|bytes| {
            let mut word = [0u8; 8];
            word.copy_from_slice(bytes);
            f64::from_le_bytes(word)
        })
        .collect();

    Ok(NpyMatrix { rows, cols, data })
}

/// Encodes a row-major matrix as a version 1.0 `<f8` array.
pub fn write_matrix<W: Write>(
    mut writer: W,
    rows: usize,
    cols: usize,
    data: &[f64],
) -> Result<(), NpyError> {
    if rows.checked_mul(cols) != Some(data.len()) {
        return Err(NpyError::BadShape(vec![rows, cols]));
    }

    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, {}), }}",
        F64_DESCR, rows, cols
    );
    // magic + version + u16 length + header + '\n' must be 64-byte aligned
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| NpyError::MalformedHeader("header too long for format 1.0".to_string()))?;

    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    for value in data {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Returns the text following `'key':` in the header dict.
fn field<'h>(header: &'h str, key: &str) -> Result<&'h str, NpyError> {
    for quote in ['\'', '"'] {
        let needle = format!("{quote}{key}{quote}");
        if let Some(pos) = header.find(&needle) {
            let rest = header[pos + needle.len()..].trim_start();
            return rest
                .strip_prefix(':')
                .map(str::trim_start)
                .ok_or_else(|| NpyError::MalformedHeader(format!("missing ':' after '{key}'")));
        }
    }
    Err(NpyError::MalformedHeader(format!("missing key '{key}'")))
}

fn parse_quoted(value: &str) -> Result<&str, NpyError> {
    let mut chars = value.chars();
    let quote = chars
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| NpyError::MalformedHeader("expected a quoted string".to_string()))?;
    let body = chars.as_str();
    let end = body
        .find(quote)
        .ok_or_else(|| NpyError::MalformedHeader("unterminated string".to_string()))?;
    Ok(&body[..end])
}

fn parse_bool(value: &str) -> Result<bool, NpyError> {
    if value.starts_with("True") {
        Ok(true)
    } else if value.starts_with("False") {
        Ok(false)
    } else {
        Err(NpyError::MalformedHeader(
            "fortran_order must be True or False".to_string(),
        ))
    }
}

fn parse_shape(value: &str) -> Result<Vec<usize>, NpyError> {
    let body = value
        .strip_prefix('(')
        .ok_or_else(|| NpyError::MalformedHeader("shape must be a tuple".to_string()))?;
    let end = body
        .find(')')
        .ok_or_else(|| NpyError::MalformedHeader("unterminated shape tuple".to_string()))?;

    body[..end]
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.parse::<usize>()
                .map_err(|_| NpyError::MalformedHeader(format!("bad shape dimension {dim:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(rows: usize, cols: usize, data: &[f64]) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_matrix(&mut bytes, rows, cols, data).unwrap();
        bytes
    }

    fn raw(version: u8, header: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[version, 0]);
        if version == 1 {
            bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        } else {
            bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
        }
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn payload(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_written_header_is_aligned() {
        let bytes = encode(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % HEADER_ALIGN, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
    }

    #[test]
    fn test_reads_written_matrix() {
        let data = [1.0, -0.5, 0.25, 8.0];
        let matrix = read_matrix(encode(2, 2, &data).as_slice()).unwrap();
        assert_eq!(matrix.rows, 2);
        assert_eq!(matrix.cols, 2);
        assert_eq!(matrix.data, data.to_vec());
    }

    #[test]
    fn test_reads_version_two_header_with_double_quotes() {
        let header = "{\"descr\": \"<f8\", \"fortran_order\": False, \"shape\": (1, 3)}\n";
        let bytes = raw(2, header, &payload(&[1.0, 2.0, 3.0]));
        let matrix = read_matrix(bytes.as_slice()).unwrap();
        assert_eq!((matrix.rows, matrix.cols), (1, 3));
        assert_eq!(matrix.data, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_reads_empty_matrix() {
        let matrix = read_matrix(encode(0, 4, &[]).as_slice()).unwrap();
        assert_eq!((matrix.rows, matrix.cols), (0, 4));
        assert!(matrix.data.is_empty());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let result = read_matrix(b"PK\x03\x04 not numpy".as_slice());
        assert!(matches!(result, Err(NpyError::BadMagic)));
    }

    #[test]
    fn test_rejects_short_file() {
        let result = read_matrix(b"\x93NUM".as_slice());
        assert!(matches!(result, Err(NpyError::BadMagic)));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let bytes = raw(9, "{}", &[]);
        assert!(matches!(
            read_matrix(bytes.as_slice()),
            Err(NpyError::UnsupportedVersion { major: 9, minor: 0 })
        ));
    }

    #[test]
    fn test_rejects_float32() {
        let header = "{'descr': '<f4', 'fortran_order': False, 'shape': (1, 1), }\n";
        let bytes = raw(1, header, &[0, 0, 128, 63]);
        match read_matrix(bytes.as_slice()) {
            Err(NpyError::UnsupportedDtype(descr)) => assert_eq!(descr, "<f4"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_fortran_order() {
        let header = "{'descr': '<f8', 'fortran_order': True, 'shape': (1, 1), }\n";
        let bytes = raw(1, header, &payload(&[1.0]));
        assert!(matches!(
            read_matrix(bytes.as_slice()),
            Err(NpyError::FortranOrder)
        ));
    }

    #[test]
    fn test_rejects_one_dimensional_shape() {
        let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }\n";
        let bytes = raw(1, header, &payload(&[1.0, 2.0, 3.0]));
        match read_matrix(bytes.as_slice()) {
            Err(NpyError::BadShape(shape)) => assert_eq!(shape, vec![3]),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let mut bytes = encode(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        bytes.truncate(bytes.len() - 8);
        assert!(matches!(
            read_matrix(bytes.as_slice()),
            Err(NpyError::Truncated {
                expected: 32,
                actual: 24
            })
        ));
    }

    #[test]
    fn test_huge_declared_shape_without_payload_is_truncated() {
        let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (1000000000, 1200000000), }\n";
        let bytes = raw(1, header, &[]);
        match read_matrix(bytes.as_slice()) {
            Err(NpyError::Truncated { expected, actual }) => {
                assert_eq!(expected, 1_000_000_000 * 1_200_000_000 * 8);
                assert_eq!(actual, 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_oversized_header_length_is_malformed() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(b"{'descr': '<f8'");
        assert!(matches!(
            read_matrix(bytes.as_slice()),
            Err(NpyError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_overflowing_shape_is_rejected() {
        let header = format!(
            "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, 2), }}\n",
            usize::MAX
        );
        let bytes = raw(1, &header, &[]);
        assert!(matches!(
            read_matrix(bytes.as_slice()),
            Err(NpyError::BadShape(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_are_counted() {
        let mut bytes = encode(1, 1, &[1.0]);
        bytes.extend_from_slice(&[0; 5]);
        assert!(matches!(
            read_matrix(bytes.as_slice()),
            Err(NpyError::TrailingBytes { extra: 5 })
        ));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode(1, 1, &[1.0]);
        bytes.push(0);
        assert!(matches!(
            read_matrix(bytes.as_slice()),
            Err(NpyError::TrailingBytes { extra: 1 })
        ));
    }

    #[test]
    fn test_rejects_missing_shape_key() {
        let header = "{'descr': '<f8', 'fortran_order': False}\n";
        let bytes = raw(1, header, &[]);
        assert!(matches!(
            read_matrix(bytes.as_slice()),
            Err(NpyError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_write_rejects_shape_mismatch() {
        let mut sink = Vec::new();
        assert!(matches!(
            write_matrix(&mut sink, 2, 2, &[1.0]),
            Err(NpyError::BadShape(_))
        ));
    }
}
