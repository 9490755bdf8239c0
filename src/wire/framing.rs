use std::fs;
use std::path::Path;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use crate::compression::compress::{lz4_pack, lz4_unpack};
use crate::core::config::NetworkConfig;
use crate::core::error::{Error, ErrorKind, Result};

pub const HEADER_LEN: usize = 5;

pub const FLAG_STRUCTURED: u8 = 0b001;
pub const FLAG_BINARY: u8 = 0b010;
pub const FLAG_COMPRESSED: u8 = 0b100;

/// `[flags][u32 LE body length]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: u8,
    pub length: u32,
}

impl FrameHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.flags;
        out[1..].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        FrameHeader {
            flags: bytes[0],
            length: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        }
    }

    pub fn is_structured(&self) -> bool {
        self.flags & FLAG_STRUCTURED != 0
    }

    pub fn is_binary(&self) -> bool {
        self.flags & FLAG_BINARY != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }
}

/// Encodes and decodes frames. The same envelope is used on the socket and
/// for persisted index files.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    compress_over: usize,
    log_over: usize,
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(&NetworkConfig::default())
    }
}

impl FrameCodec {
    pub fn new(config: &NetworkConfig) -> Self {
        FrameCodec {
            compress_over: config.compress_data_over,
            log_over: config.log_data_sizes_over,
            max_frame_size: config.max_frame_size,
        }
    }

    /// Always compress, whatever the size. Used for index files.
    pub fn compressing() -> Self {
        FrameCodec {
            compress_over: 0,
            ..FrameCodec::default()
        }
    }

    pub fn encode(&self, flags: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let mut flags = flags & !FLAG_COMPRESSED;
        let body = if payload.len() > self.compress_over {
            let packed = lz4_pack(payload);
            if payload.len() > self.log_over {
                debug!("compressing data over limit : {} -> {} bytes", payload.len(), packed.len());
            }
            flags |= FLAG_COMPRESSED;
            packed
        } else {
            if payload.len() > self.log_over {
                debug!("data size (bytes) = {}", payload.len());
            }
            payload.to_vec()
        };

        if body.len() > self.max_frame_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Frame body of {} bytes exceeds limit {}", body.len(), self.max_frame_size),
            ));
        }

        let header = FrameHeader { flags, length: body.len() as u32 };
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode one complete frame held in `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> Result<(FrameHeader, Vec<u8>)> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::corruption(format!("Frame of {} bytes has no header", bytes.len())));
        }
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&bytes[..HEADER_LEN]);
        let header = FrameHeader::from_bytes(&raw);

        let body = &bytes[HEADER_LEN..];
        if body.len() != header.length as usize {
            return Err(Error::corruption(format!(
                "Frame declares {} bytes but carries {}", header.length, body.len()
            )));
        }
        let payload = self.unpack(&header, body.to_vec())?;
        Ok((header, payload))
    }

    pub fn encode_message<T: Serialize>(&self, message: &T) -> Result<Vec<u8>> {
        let payload = bincode::serialize(message)?;
        self.encode(FLAG_STRUCTURED | FLAG_BINARY, &payload)
    }

    pub fn decode_message<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let (header, payload) = self.decode(bytes)?;
        parse_message(&header, &payload)
    }

    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Option<(FrameHeader, Vec<u8>)>>
    where
        R: AsyncRead + Unpin,
    {
        let mut raw = [0u8; HEADER_LEN];
        match reader.read_exact(&mut raw).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let header = FrameHeader::from_bytes(&raw);
        if header.length as usize > self.max_frame_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Frame of {} bytes exceeds limit {}", header.length, self.max_frame_size),
            ));
        }

        let mut body = vec![0u8; header.length as usize];
        reader.read_exact(&mut body).await?;
        let payload = self.unpack(&header, body)?;
        Ok(Some((header, payload)))
    }

    pub async fn read_message<R, T>(&self, reader: &mut R) -> Result<Option<T>>
    where
        R: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        match self.read_frame(reader).await? {
            Some((header, payload)) => parse_message(&header, &payload).map(Some),
            None => Ok(None),
        }
    }

    pub async fn write_message<W, T>(&self, writer: &mut W, message: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let frame = self.encode_message(message)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Write a framed file atomically (temp file + rename).
    pub fn write_file(&self, path: &Path, payload: &[u8]) -> Result<()> {
        let frame = self.encode(FLAG_STRUCTURED | FLAG_BINARY, payload)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &frame)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// `None` when the file does not exist.
    pub fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        let (_, payload) = self.decode(&bytes)
            .map_err(|e| Error::corruption(format!("{}: {}", path.display(), e.context)))?;
        Ok(Some(payload))
    }

    fn unpack(&self, header: &FrameHeader, body: Vec<u8>) -> Result<Vec<u8>> {
        if !header.is_compressed() {
            return Ok(body);
        }
        let payload = lz4_unpack(&body)?;
        if payload.len() > self.max_frame_size {
            return Err(Error::corruption(format!("Decompressed frame of {} bytes exceeds limit", payload.len())));
        }
        Ok(payload)
    }
}

fn parse_message<T: DeserializeOwned>(header: &FrameHeader, payload: &[u8]) -> Result<T> {
    if !header.is_structured() {
        return Err(Error::new(ErrorKind::Parse, "Raw frame where a message was expected".to_string()));
    }
    if header.is_binary() {
        Ok(bincode::deserialize(payload)?)
    } else {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        name: String,
        rows: Vec<u32>,
    }

    fn small_codec(compress_over: usize) -> FrameCodec {
        FrameCodec::new(&NetworkConfig {
            compress_data_over: compress_over,
            max_frame_size: 1 << 20,
            ..NetworkConfig::default()
        })
    }

    #[test]
    fn header_layout() {
        let codec = small_codec(1_000);
        let frame = codec.encode(FLAG_STRUCTURED | FLAG_BINARY, b"abc").unwrap();
        assert_eq!(frame[0], 3);
        assert_eq!(&frame[1..5], &3u32.to_le_bytes());
        assert_eq!(&frame[5..], b"abc");
    }

    #[test]
    fn large_bodies_are_compressed() {
        let codec = small_codec(16);
        let probe = Probe { name: "x".repeat(200), rows: (0..100).collect() };
        let frame = codec.encode_message(&probe).unwrap();
        assert_eq!(frame[0], 3 + 4);

        let decoded: Probe = codec.decode_message(&frame).unwrap();
        assert_eq!(decoded, probe);
    }

    #[test]
    fn text_encoded_frames_are_json() {
        let codec = small_codec(1_000);
        let json = br#"{"name":"v","rows":[1,2]}"#;
        let frame = codec.encode(FLAG_STRUCTURED, json).unwrap();
        let decoded: Probe = codec.decode_message(&frame).unwrap();
        assert_eq!(decoded.rows, vec![1, 2]);
    }

    #[test]
    fn truncated_frame_is_corruption() {
        let codec = small_codec(1_000);
        let frame = codec.encode(3, b"abcdef").unwrap();
        let err = codec.decode(&frame[..frame.len() - 1]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Corruption);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let codec = FrameCodec::new(&NetworkConfig {
            max_frame_size: 8,
            compress_data_over: usize::MAX,
            ..NetworkConfig::default()
        });
        assert!(codec.encode(3, &[0u8; 9]).is_err());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("col.idx");
        let codec = FrameCodec::compressing();

        assert!(codec.read_file(&path).unwrap().is_none());
        codec.write_file(&path, b"index payload").unwrap();
        assert_eq!(codec.read_file(&path).unwrap().unwrap(), b"index payload");
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn stream_round_trip() {
        let codec = small_codec(1_000);
        let (mut client, mut server) = tokio::io::duplex(4096);
        let probe = Probe { name: "ping".into(), rows: vec![9] };

        codec.write_message(&mut client, &probe).await.unwrap();
        drop(client);

        let received: Option<Probe> = codec.read_message(&mut server).await.unwrap();
        assert_eq!(received, Some(probe));
        let eof: Option<Probe> = codec.read_message(&mut server).await.unwrap();
        assert!(eof.is_none());
    }
}
