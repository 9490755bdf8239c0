use crate::core::error::{Error, ErrorKind, Result};
use serde::{Serialize, Deserialize};

/// Compressed block storage for frame bodies and backup files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedBlock {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub compression: CompressionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Lz4,      // frames on the wire and on disk
    Zstd,     // backup archives
}

impl CompressedBlock {
    pub fn compress(data: &[u8], compression: CompressionType) -> Result<Self> {
        let compressed = match compression {
            CompressionType::None => data.to_vec(),
            CompressionType::Lz4 => lz4_pack(data),
            CompressionType::Zstd => zstd::encode_all(data, 3)?,
        };

        Ok(CompressedBlock {
            data: compressed,
            original_size: data.len(),
            compression,
        })
    }

    pub fn decompress(&self) -> Result<Vec<u8>> {
        let out = match self.compression {
            CompressionType::None => self.data.clone(),
            CompressionType::Lz4 => lz4_unpack(&self.data)?,
            CompressionType::Zstd => zstd::decode_all(&self.data[..])
                .map_err(|e| Error::new(ErrorKind::Corruption, e.to_string()))?,
        };

        if out.len() != self.original_size {
            return Err(Error::corruption(format!(
                "Decompressed {} bytes, expected {}", out.len(), self.original_size
            )));
        }
        Ok(out)
    }
}

/// LZ4 block with the uncompressed size prepended (u32 LE).
pub fn lz4_pack(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

pub fn lz4_unpack(data: &[u8]) -> Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::new(ErrorKind::Corruption, format!("LZ4 body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_block_restores_input() {
        let input = b"backup backup backup backup".repeat(50);
        let block = CompressedBlock::compress(&input, CompressionType::Zstd).unwrap();
        assert!(block.data.len() < input.len());
        assert_eq!(block.decompress().unwrap(), input);
    }

    #[test]
    fn size_mismatch_is_corruption() {
        let mut block = CompressedBlock::compress(b"row data", CompressionType::Lz4).unwrap();
        block.original_size += 1;
        let err = block.decompress().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Corruption);
    }
}
