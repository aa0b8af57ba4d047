//! NumPy `.npz` stores as written by `np.savez`: a zip archive of `.npy`
//! members. `embeddings` is a `[N, D]` float32/float64 matrix and
//! `product_ids` a `[N]` array of `<U`, `|S` or integer ids. `created_at`,
//! `version` and `source_files` are optional string arrays.

use std::io::{Cursor, Read, Write};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, StoreError};
use crate::store::{
    StoreMetadata, VectorStore, CREATED_AT_KEY, EMBEDDINGS_TENSOR, PRODUCT_IDS_KEY, SOURCE_FILES_KEY, VERSION_KEY,
};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const HEADER_ALIGN: usize = 64;

pub(crate) fn is_npz(bytes: &[u8]) -> bool { bytes.starts_with(ZIP_MAGIC) }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Int,
    Uint,
    Unicode,
    Bytes,
}

#[derive(Debug, Clone, Copy)]
struct Descr {
    endian: Endian,
    kind: Kind,
    /// Bytes per item, or code points per item for `U`.
    size: usize,
}

impl Descr {
    fn parse(s: &str) -> std::result::Result<Self, String> {
        let native = if cfg!(target_endian = "big") { Endian::Big } else { Endian::Little };
        let (endian, rest) = match s.as_bytes().first() {
            Some(b'<') | Some(b'|') => (Endian::Little, &s[1..]),
            Some(b'>') => (Endian::Big, &s[1..]),
            Some(b'=') => (native, &s[1..]),
            _ => (native, s),
        };
        let unsupported = || format!("unsupported dtype {s:?}");
        let mut chars = rest.chars();
        let kind = match chars.next() {
            Some('f') => Kind::Float,
            Some('i') => Kind::Int,
            Some('u') => Kind::Uint,
            Some('U') => Kind::Unicode,
            Some('S') | Some('a') => Kind::Bytes,
            _ => return Err(unsupported()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;
        Ok(Self { endian, kind, size })
    }

    fn item_bytes(&self) -> usize {
        if self.kind == Kind::Unicode { self.size * 4 } else { self.size }
    }
}

struct NpyArray {
    dtype: String,
    descr: Descr,
    shape: Vec<usize>,
    fortran_order: bool,
    data: Vec<u8>,
}

fn uint(bytes: &[u8], endian: Endian) -> u64 {
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    match endian {
        Endian::Little => bytes.iter().rev().fold(0, fold),
        Endian::Big => bytes.iter().fold(0, fold),
    }
}

fn int(bytes: &[u8], endian: Endian) -> i64 {
    let shift = 64 - 8 * bytes.len().min(8) as u32;
    if shift == 0 { uint(bytes, endian) as i64 } else { ((uint(bytes, endian) << shift) as i64) >> shift }
}

impl NpyArray {
    fn items(&self) -> std::slice::ChunksExact<'_, u8> { self.data.chunks_exact(self.descr.item_bytes().max(1)) }

    fn to_f32(&self) -> std::result::Result<Vec<f32>, String> {
        let Descr { endian, kind, size } = self.descr;
        let values: Vec<f32> = match (kind, size) {
            (Kind::Float, 4) => self.items().map(|b| f32::from_bits(uint(b, endian) as u32)).collect(),
            (Kind::Float, 8) => self.items().map(|b| f64::from_bits(uint(b, endian)) as f32).collect(),
            _ => return Err(format!("expected float32 or float64, found {}", self.dtype)),
        };
        match (self.fortran_order, self.shape.as_slice()) {
            (true, &[rows, cols]) => {
                Ok((0..rows * cols).map(|k| values[(k % cols) * rows + k / cols]).collect())
            }
            _ => Ok(values),
        }
    }

    fn to_strings(&self) -> std::result::Result<Vec<String>, String> {
        let Descr { endian, kind, size } = self.descr;
        let values = match kind {
            Kind::Unicode if size == 0 => vec![String::new(); self.len()],
            Kind::Unicode => self
                .items()
                .map(|b| {
                    let s: String = b
                        .chunks_exact(4)
                        .map(|cp| char::from_u32(uint(cp, endian) as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                        .collect();
                    s.trim_end_matches('\0').to_string()
                })
                .collect(),
            Kind::Bytes if size == 0 => vec![String::new(); self.len()],
            Kind::Bytes => self.items().map(|b| String::from_utf8_lossy(b).trim_end_matches('\0').to_string()).collect(),
            Kind::Int => self.items().map(|b| int(b, endian).to_string()).collect(),
            Kind::Uint => self.items().map(|b| uint(b, endian).to_string()).collect(),
            Kind::Float => return Err(format!("expected strings or integers, found {}", self.dtype)),
        };
        Ok(values)
    }

    fn len(&self) -> usize { self.shape.iter().product() }
}

fn dict_value<'a>(header: &'a str, key: &str) -> std::result::Result<&'a str, String> {
    let pos = header
        .find(&format!("'{key}'"))
        .or_else(|| header.find(&format!("\"{key}\"")))
        .ok_or_else(|| format!("npy header without {key}"))?;
    header[pos + key.len() + 2..]
        .trim_start()
        .strip_prefix(':')
        .map(str::trim_start)
        .ok_or_else(|| format!("malformed npy header near {key}"))
}

fn dict_string(header: &str, key: &str) -> std::result::Result<String, String> {
    let value = dict_value(header, key)?;
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"').ok_or_else(|| format!("{key} is not a string"))?;
    let body = &value[1..];
    let end = body.find(quote).ok_or_else(|| format!("unterminated {key}"))?;
    Ok(body[..end].to_string())
}

fn parse_shape(value: &str) -> std::result::Result<Vec<usize>, String> {
    let inner = value
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .map(|(inner, _)| inner)
        .ok_or_else(|| "malformed npy shape".to_string())?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| d.trim_end_matches('L').parse::<usize>().map_err(|_| format!("bad dimension {d:?}")))
        .collect()
}

fn parse_npy(bytes: &[u8]) -> std::result::Result<NpyArray, String> {
    if bytes.len() < 10 || !bytes.starts_with(NPY_MAGIC) { return Err("not an npy array".into()); }
    let (header_len, start) = match bytes[6] {
        1 => (usize::from(u16::from_le_bytes([bytes[8], bytes[9]])), 10),
        2 | 3 if bytes.len() >= 12 => (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12),
        v => return Err(format!("unsupported npy version {v}")),
    };
    let header = bytes.get(start..start + header_len).ok_or("truncated npy header")?;
    let header = std::str::from_utf8(header).map_err(|_| "npy header is not text")?;
    let dtype = dict_string(header, "descr")?;
    let descr = Descr::parse(&dtype)?;
    let fortran_order = dict_value(header, "fortran_order")?.starts_with("True");
    let shape = parse_shape(dict_value(header, "shape")?)?;

    let count: usize = shape.iter().product();
    let needed = count.checked_mul(descr.item_bytes()).ok_or("npy array too large")?;
    let data = &bytes[start + header_len..];
    if data.len() < needed {
        return Err(format!("npy data truncated: {} of {needed} bytes", data.len()));
    }
    Ok(NpyArray { dtype, descr, shape, fortran_order, data: data[..needed].to_vec() })
}

fn encode_npy(dtype: &str, shape: &[usize], data: &[u8]) -> Vec<u8> {
    let shape = match shape {
        [n] => format!("({n},)"),
        dims => format!("({})", dims.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")),
    };
    let mut header = format!("{{'descr': '{dtype}', 'fortran_order': False, 'shape': {shape}, }}");
    let unpadded = NPY_MAGIC.len() + 4 + header.len() + 1;
    header.extend(std::iter::repeat(' ').take((HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN));
    header.push('\n');

    let mut out = Vec::with_capacity(NPY_MAGIC.len() + 4 + header.len() + data.len());
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
    out
}

/// `<U{width}` array holding `values`, width being the longest value.
fn encode_strings(shape: &[usize], values: &[String]) -> Vec<u8> {
    let width = values.iter().map(|v| v.chars().count()).max().unwrap_or(0).max(1);
    let mut data = Vec::with_capacity(values.len() * width * 4);
    for v in values {
        let mut n = 0;
        for c in v.chars() {
            data.extend_from_slice(&u32::from(c).to_le_bytes());
            n += 1;
        }
        data.resize(data.len() + (width - n) * 4, 0);
    }
    encode_npy(&format!("<U{width}"), shape, &data)
}

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

fn member(archive: &mut Archive<'_>, name: &str) -> Result<Option<NpyArray>> {
    let file_name = format!("{name}.npy");
    let invalid = |reason: String| StoreError::Invalid(format!("{file_name}: {reason}"));
    let mut file = match archive.by_name(&file_name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(invalid(e.to_string())),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(|e| invalid(e.to_string()))?;
    parse_npy(&buf).map(Some).map_err(invalid)
}

/// Optional string members are best effort: unreadable ones are ignored.
fn optional_strings(archive: &mut Archive<'_>, name: &str) -> Option<Vec<String>> {
    member(archive, name).ok().flatten().and_then(|a| a.to_strings().ok())
}

pub(crate) fn from_npz(bytes: &[u8]) -> Result<VectorStore> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| StoreError::Invalid(format!("not an npz archive: {e}")))?;
    let embeddings = member(&mut archive, EMBEDDINGS_TENSOR)?
        .ok_or_else(|| StoreError::Invalid(format!("missing {EMBEDDINGS_TENSOR} array")))?;
    let ids = member(&mut archive, PRODUCT_IDS_KEY)?
        .ok_or_else(|| StoreError::Invalid(format!("missing {PRODUCT_IDS_KEY} array")))?;

    let (rows, dim) = match embeddings.shape.as_slice() {
        [rows, dim] => (*rows, *dim),
        other => return Err(StoreError::Invalid(format!("{EMBEDDINGS_TENSOR} must be 2-D, found {other:?}"))),
    };
    if ids.shape.len() != 1 {
        return Err(StoreError::Invalid(format!("{PRODUCT_IDS_KEY} must be 1-D, found {:?}", ids.shape)));
    }
    let product_ids = ids.to_strings().map_err(|e| StoreError::Invalid(format!("{PRODUCT_IDS_KEY}: {e}")))?;
    if product_ids.len() != rows {
        return Err(StoreError::Invalid(format!("{rows} rows but {} product ids", product_ids.len())));
    }
    let data = embeddings.to_f32().map_err(|e| StoreError::Invalid(format!("{EMBEDDINGS_TENSOR}: {e}")))?;

    let mut store = VectorStore::from_flat(product_ids, data, dim)?;
    store.metadata = StoreMetadata {
        created_at: optional_strings(&mut archive, CREATED_AT_KEY).and_then(|v| v.into_iter().next()),
        version: optional_strings(&mut archive, VERSION_KEY).and_then(|v| v.into_iter().next()),
        source_files: optional_strings(&mut archive, SOURCE_FILES_KEY).unwrap_or_default(),
    };
    Ok(store)
}

fn put(zip: &mut ZipWriter<Cursor<Vec<u8>>>, name: &str, npy: &[u8]) -> Result<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    zip.start_file(format!("{name}.npy"), options).map_err(|e| StoreError::Invalid(e.to_string()))?;
    zip.write_all(npy).map_err(|e| StoreError::Invalid(e.to_string()))
}

pub(crate) fn to_npz(store: &VectorStore) -> Result<Vec<u8>> {
    let raw: Vec<u8> = store.rows().flat_map(|(_, row)| row.iter().flat_map(|x| x.to_le_bytes())).collect();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    put(&mut zip, EMBEDDINGS_TENSOR, &encode_npy("<f4", &[store.len(), store.dim()], &raw))?;
    put(&mut zip, PRODUCT_IDS_KEY, &encode_strings(&[store.len()], store.product_ids()))?;
    let meta = &store.metadata;
    if let Some(created_at) = &meta.created_at {
        put(&mut zip, CREATED_AT_KEY, &encode_strings(&[], std::slice::from_ref(created_at)))?;
    }
    if let Some(version) = &meta.version {
        put(&mut zip, VERSION_KEY, &encode_strings(&[], std::slice::from_ref(version)))?;
    }
    if !meta.source_files.is_empty() {
        put(&mut zip, SOURCE_FILES_KEY, &encode_strings(&[meta.source_files.len()], &meta.source_files))?;
    }
    let cursor = zip.finish().map_err(|e| StoreError::Invalid(e.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_parse() {
        let h = "{'descr': '<U7', 'fortran_order': False, 'shape': (3,), }";
        assert_eq!(dict_string(h, "descr").unwrap(), "<U7");
        assert_eq!(parse_shape(dict_value(h, "shape").unwrap()).unwrap(), vec![3]);
        assert_eq!(parse_shape("(), }").unwrap(), Vec::<usize>::new());
        assert_eq!(parse_shape("(2, 768), }").unwrap(), vec![2, 768]);
        assert!(Descr::parse("|O").is_err());
        assert_eq!(Descr::parse(">f8").unwrap().endian, Endian::Big);
    }

    #[test]
    fn encoded_headers_are_aligned() {
        let npy = encode_npy("<f4", &[2, 3], &[0u8; 24]);
        let header_len = usize::from(u16::from_le_bytes([npy[8], npy[9]]));
        assert_eq!((10 + header_len) % HEADER_ALIGN, 0);
        assert_eq!(npy[10 + header_len - 1], b'\n');
        let parsed = parse_npy(&npy).unwrap();
        assert_eq!(parsed.shape, vec![2, 3]);
    }

    #[test]
    fn integers_sign_extend() {
        assert_eq!(int(&[0xff, 0xff, 0xff, 0xff], Endian::Little), -1);
        assert_eq!(int(&[0x01, 0x00], Endian::Big), 256);
        assert_eq!(uint(&[0x2a, 0, 0, 0, 0, 0, 0, 0], Endian::Little), 42);
    }

    #[test]
    fn fortran_matrices_are_transposed() {
        // column-major [[1, 2, 3], [4, 5, 6]]
        let raw: Vec<u8> = [1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0].iter().flat_map(|x| x.to_le_bytes()).collect();
        let mut npy = encode_npy("<f4", &[2, 3], &raw);
        let at = npy.windows(5).position(|w| w == b"False").unwrap();
        npy[at..at + 5].copy_from_slice(b"True ");
        let parsed = parse_npy(&npy).unwrap();
        assert!(parsed.fortran_order);
        assert_eq!(parsed.to_f32().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
