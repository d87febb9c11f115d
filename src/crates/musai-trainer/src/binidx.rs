//! Megatron `MMapIndexedDataset` files, the binidx format RWKV-LM trains from
//!
//! `<prefix>.idx`, all little-endian:
//!
//! ```text
//! b"MMIDIDX\0\0"   magic
//! u64              version, 1
//! u8               dtype code: 8 = u16, 4 = i32
//! u64              number of sequences
//! u64              number of document boundaries (sequences + 1)
//! i32[len]         sequence sizes, in tokens
//! i64[len]         sequence offsets into the .bin file, in bytes
//! i64[doc_count]   document boundaries, as sequence indices
//! ```
//!
//! `<prefix>.bin` holds the token values back to back.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrainerError};

pub const MAGIC: &[u8; 9] = b"MMIDIDX\x00\x00";
pub const VERSION: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    U16,
    I32,
}

impl DType {
    pub fn code(self) -> u8 {
        match self {
            DType::U16 => 8,
            DType::I32 => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            8 => Some(DType::U16),
            4 => Some(DType::I32),
            _ => None,
        }
    }

    pub fn size(self) -> usize {
        match self {
            DType::U16 => 2,
            DType::I32 => 4,
        }
    }

    /// Narrowest type holding every id below `vocab_size`
    pub fn for_vocab(vocab_size: u32) -> Self {
        if vocab_size <= u16::MAX as u32 + 1 {
            DType::U16
        } else {
            DType::I32
        }
    }
}

pub fn idx_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "idx")
}

pub fn bin_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "bin")
}

fn with_suffix(prefix: &Path, ext: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(".");
    path.push(ext);
    PathBuf::from(path)
}

/// Write documents as `<prefix>.bin` and `<prefix>.idx`
pub fn write_binidx(prefix: &Path, documents: &[Vec<u32>], dtype: DType) -> Result<()> {
    let mut bin = Vec::new();
    let mut sizes = Vec::with_capacity(documents.len());
    let mut pointers = Vec::with_capacity(documents.len());

    for doc in documents {
        pointers.push(bin.len() as i64);
        sizes.push(doc.len() as i32);
        for &id in doc {
            match dtype {
                DType::U16 => {
                    let value = u16::try_from(id).map_err(|_| {
                        TrainerError::binidx(bin_path(prefix), format!("token {} does not fit in u16", id))
                    })?;
                    bin.extend_from_slice(&value.to_le_bytes());
                }
                DType::I32 => {
                    let value = i32::try_from(id).map_err(|_| {
                        TrainerError::binidx(bin_path(prefix), format!("token {} does not fit in i32", id))
                    })?;
                    bin.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
    }

    let mut idx = Vec::with_capacity(34 + documents.len() * 20);
    idx.extend_from_slice(MAGIC);
    idx.extend_from_slice(&VERSION.to_le_bytes());
    idx.push(dtype.code());
    idx.extend_from_slice(&(documents.len() as u64).to_le_bytes());
    idx.extend_from_slice(&(documents.len() as u64 + 1).to_le_bytes());
    for size in &sizes {
        idx.extend_from_slice(&size.to_le_bytes());
    }
    for pointer in &pointers {
        idx.extend_from_slice(&pointer.to_le_bytes());
    }
    for doc in 0..=documents.len() as i64 {
        idx.extend_from_slice(&doc.to_le_bytes());
    }

    fs::write(bin_path(prefix), bin)?;
    fs::write(idx_path(prefix), idx)?;
    Ok(())
}

/// A binidx dataset loaded in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinIdx {
    pub dtype: DType,
    pub sizes: Vec<i32>,
    pub pointers: Vec<i64>,
    pub doc_idx: Vec<i64>,
    tokens: Vec<u32>,
}

impl BinIdx {
    pub fn open(prefix: &Path) -> Result<Self> {
        let idx_file = idx_path(prefix);
        let data = fs::read(&idx_file)?;
        let mut reader = Reader::new(&data, &idx_file);

        if reader.take(MAGIC.len())? != MAGIC {
            return Err(TrainerError::binidx(&idx_file, "bad magic"));
        }
        let version = reader.u64()?;
        if version != VERSION {
            return Err(TrainerError::binidx(&idx_file, format!("unsupported version {}", version)));
        }
        let code = reader.take(1)?[0];
        let dtype = DType::from_code(code)
            .ok_or_else(|| TrainerError::binidx(&idx_file, format!("unsupported dtype code {}", code)))?;
        let len = reader.u64()? as usize;
        let doc_count = reader.u64()? as usize;

        let sizes = (0..len).map(|_| reader.i32()).collect::<Result<Vec<_>>>()?;
        let pointers = (0..len).map(|_| reader.i64()).collect::<Result<Vec<_>>>()?;
        let doc_idx = (0..doc_count).map(|_| reader.i64()).collect::<Result<Vec<_>>>()?;

        let bin_file = bin_path(prefix);
        let bin = fs::read(&bin_file)?;
        if bin.len() % dtype.size() != 0 {
            return Err(TrainerError::binidx(&bin_file, "truncated token data"));
        }
        let tokens: Vec<u32> = match dtype {
            DType::U16 => bin
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .collect(),
            DType::I32 => bin
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .map(|id| {
                    u32::try_from(id)
                        .map_err(|_| TrainerError::binidx(&bin_file, format!("negative token {}", id)))
                })
                .collect::<Result<_>>()?,
        };

        for (size, pointer) in sizes.iter().zip(&pointers) {
            let outside = || TrainerError::binidx(&bin_file, "sequence outside of the token data");
            let size = usize::try_from(*size).map_err(|_| outside())?;
            let start = usize::try_from(*pointer).map_err(|_| outside())?;
            let end = size
                .checked_mul(dtype.size())
                .and_then(|bytes| bytes.checked_add(start))
                .ok_or_else(outside)?;
            if start % dtype.size() != 0 || end > bin.len() {
                return Err(outside());
            }
        }

        Ok(BinIdx {
            dtype,
            sizes,
            pointers,
            doc_idx,
            tokens,
        })
    }

    /// Number of sequences
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn sequence(&self, index: usize) -> &[u32] {
        let start = self.pointers[index] as usize / self.dtype.size();
        &self.tokens[start..start + self.sizes[index] as usize]
    }

    /// Every token, in file order
    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<u32> {
        self.tokens
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], path: &'a Path) -> Self {
        Reader { data, pos: 0, path }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(TrainerError::binidx(self.path, "unexpected end of index"));
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_open() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("dataset");
        let docs = vec![vec![5, 6, 7, 2], vec![], vec![300, 2]];

        write_binidx(&prefix, &docs, DType::U16).unwrap();
        let data = BinIdx::open(&prefix).unwrap();

        assert_eq!(data.dtype, DType::U16);
        assert_eq!(data.len(), 3);
        assert_eq!(data.sizes, vec![4, 0, 2]);
        assert_eq!(data.pointers, vec![0, 8, 8]);
        assert_eq!(data.doc_idx, vec![0, 1, 2, 3]);
        assert_eq!(data.sequence(2), &[300, 2]);
        assert_eq!(data.tokens(), &[5, 6, 7, 2, 300, 2]);
    }

    #[test]
    fn test_header_layout() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("d");
        write_binidx(&prefix, &[vec![1, 2, 3]], DType::I32).unwrap();

        let idx = fs::read(idx_path(&prefix)).unwrap();
        assert_eq!(&idx[..9], MAGIC);
        assert_eq!(u64::from_le_bytes(idx[9..17].try_into().unwrap()), 1);
        assert_eq!(idx[17], 4);
        assert_eq!(u64::from_le_bytes(idx[18..26].try_into().unwrap()), 1);
        assert_eq!(u64::from_le_bytes(idx[26..34].try_into().unwrap()), 2);
        assert_eq!(idx.len(), 34 + 4 + 8 + 2 * 8);
        assert_eq!(fs::read(bin_path(&prefix)).unwrap().len(), 12);
    }

    #[test]
    fn test_dtype_choice() {
        assert_eq!(DType::for_vocab(600), DType::U16);
        assert_eq!(DType::for_vocab(65536), DType::U16);
        assert_eq!(DType::for_vocab(65537), DType::I32);
    }

    #[test]
    fn test_u16_overflow_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = write_binidx(&dir.path().join("d"), &[vec![70000]], DType::U16);
        assert!(matches!(result, Err(TrainerError::Binidx { .. })));
        let result = write_binidx(&dir.path().join("d"), &[vec![u32::MAX]], DType::I32);
        assert!(matches!(result, Err(TrainerError::Binidx { .. })));
    }

    fn patch_idx(prefix: &Path, offset: usize, bytes: &[u8]) {
        let mut idx = fs::read(idx_path(prefix)).unwrap();
        idx[offset..offset + bytes.len()].copy_from_slice(bytes);
        fs::write(idx_path(prefix), idx).unwrap();
    }

    #[test]
    fn test_corrupt_sizes_and_pointers_are_errors() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("d");
        let sizes_at = 34;
        let pointers_at = 34 + 4;

        write_binidx(&prefix, &[vec![1, 2, 3]], DType::U16).unwrap();
        patch_idx(&prefix, sizes_at, &(-1i32).to_le_bytes());
        assert!(matches!(BinIdx::open(&prefix), Err(TrainerError::Binidx { .. })));

        write_binidx(&prefix, &[vec![1, 2, 3]], DType::U16).unwrap();
        patch_idx(&prefix, sizes_at, &i32::MAX.to_le_bytes());
        assert!(matches!(BinIdx::open(&prefix), Err(TrainerError::Binidx { .. })));

        write_binidx(&prefix, &[vec![1, 2, 3]], DType::U16).unwrap();
        patch_idx(&prefix, pointers_at, &(-2i64).to_le_bytes());
        assert!(matches!(BinIdx::open(&prefix), Err(TrainerError::Binidx { .. })));

        write_binidx(&prefix, &[vec![1, 2, 3]], DType::U16).unwrap();
        patch_idx(&prefix, pointers_at, &i64::MAX.to_le_bytes());
        assert!(matches!(BinIdx::open(&prefix), Err(TrainerError::Binidx { .. })));
    }

    #[test]
    fn test_negative_i32_tokens_are_errors() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("d");
        write_binidx(&prefix, &[vec![1, 2, 3]], DType::I32).unwrap();

        let mut bin = fs::read(bin_path(&prefix)).unwrap();
        bin[4..8].copy_from_slice(&(-1i32).to_le_bytes());
        fs::write(bin_path(&prefix), bin).unwrap();

        assert!(matches!(BinIdx::open(&prefix), Err(TrainerError::Binidx { .. })));
    }

    #[test]
    fn test_rejects_bad_magic_and_truncation() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("d");
        write_binidx(&prefix, &[vec![1, 2]], DType::U16).unwrap();

        let mut idx = fs::read(idx_path(&prefix)).unwrap();
        idx.truncate(40);
        fs::write(idx_path(&prefix), &idx).unwrap();
        assert!(matches!(BinIdx::open(&prefix), Err(TrainerError::Binidx { .. })));

        idx[0] = b'X';
        fs::write(idx_path(&prefix), &idx).unwrap();
        assert!(matches!(BinIdx::open(&prefix), Err(TrainerError::Binidx { .. })));
    }
}
