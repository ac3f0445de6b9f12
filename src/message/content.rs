//! 消息正文解压
//!
//! v4 数据库中较长的正文以 zstd 帧存储,以魔数开头即视为压缩数据。

use crate::error::{DecodeError, Result};
use std::borrow::Cow;

/// zstd 帧魔数
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDecompressor;

impl ContentDecompressor {
    pub fn is_compressed(raw: &[u8]) -> bool {
        raw.starts_with(&ZSTD_MAGIC)
    }

    /// 未压缩的数据原样借出
    pub fn decompress(raw: &[u8]) -> Result<Cow<'_, [u8]>> {
        if !Self::is_compressed(raw) {
            return Ok(Cow::Borrowed(raw));
        }

        let plain = zstd::stream::decode_all(raw)
            .map_err(|e| DecodeError::CorruptStream(format!("zstd 解压失败: {}", e)))?;
        log::trace!("正文解压: {} -> {} 字节", raw.len(), plain.len());
        Ok(Cow::Owned(plain))
    }

    /// 解压并按 UTF-8 解释,非法字节替换为 U+FFFD
    pub fn decompress_text(raw: &[u8]) -> Result<String> {
        let bytes = Self::decompress(raw)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_passthrough() {
        let out = ContentDecompressor::decompress(b"hello").unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, b"hello");
    }

    #[test]
    fn test_zstd_frame() {
        let text = "<msg><img md5=\"abc\"/></msg>".repeat(20);
        let packed = zstd::stream::encode_all(text.as_bytes(), 3).unwrap();
        assert!(ContentDecompressor::is_compressed(&packed));
        assert_eq!(ContentDecompressor::decompress_text(&packed).unwrap(), text);
    }

    #[test]
    fn test_corrupt_frame() {
        let mut raw = ZSTD_MAGIC.to_vec();
        raw.extend_from_slice(&[0xFF; 16]);
        assert!(matches!(
            ContentDecompressor::decompress(&raw),
            Err(DecodeError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_lossy_text() {
        assert_eq!(
            ContentDecompressor::decompress_text(&[b'a', 0xFF, b'b']).unwrap(),
            "a\u{FFFD}b"
        );
    }
}
