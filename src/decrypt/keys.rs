//! 会话密钥

use crate::error::{DecodeError, Result};
use std::fmt;

/// 一次转换会话所用的密钥材料
///
/// 构造后不可变,可以在多个线程之间自由共享。
/// `xor_key` 为 `None` 表示需要先扫描或手动提供 XOR 密钥。
#[derive(Clone, PartialEq, Eq)]
pub struct KeyStore {
    cipher_key: [u8; KeyStore::CIPHER_KEY_LEN],
    xor_key: Option<u8>,
}

impl KeyStore {
    /// AES-128 密钥长度
    pub const CIPHER_KEY_LEN: usize = 16;

    /// 从十六进制字符串构造
    ///
    /// # 参数
    ///
    /// * `hex_key` - 32 个十六进制字符,解码后必须正好 16 字节
    /// * `xor_key` - 可选的单字节 XOR 密钥
    pub fn new(hex_key: &str, xor_key: Option<u8>) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| DecodeError::InvalidKey(format!("十六进制解码失败: {}", e)))?;

        let cipher_key: [u8; Self::CIPHER_KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            DecodeError::InvalidKey(format!(
                "AES 密钥必须为 {} 字节,实际为 {} 字节",
                Self::CIPHER_KEY_LEN,
                bytes.len()
            ))
        })?;

        Ok(Self {
            cipher_key,
            xor_key,
        })
    }

    pub fn from_bytes(cipher_key: [u8; Self::CIPHER_KEY_LEN], xor_key: Option<u8>) -> Self {
        Self {
            cipher_key,
            xor_key,
        }
    }

    pub fn cipher_key(&self) -> &[u8; Self::CIPHER_KEY_LEN] {
        &self.cipher_key
    }

    pub fn xor_key(&self) -> Option<u8> {
        self.xor_key
    }

    /// 返回一个带有新 XOR 密钥的副本,原值保持不变
    pub fn with_xor_key(&self, xor_key: u8) -> Self {
        Self {
            cipher_key: self.cipher_key,
            xor_key: Some(xor_key),
        }
    }
}

// 不在日志里输出密钥本身
impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("cipher_key", &"<redacted>")
            .field("xor_key", &self.xor_key.map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_key() {
        let keys = KeyStore::new("32666261386464653536643364353161", Some(0x37)).unwrap();
        assert_eq!(keys.cipher_key(), b"2fba8dde56d3d51a");
        assert_eq!(keys.xor_key(), Some(0x37));
    }

    #[test]
    fn test_invalid_length() {
        let err = KeyStore::new("00112233", None).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidKey(_)));
    }

    #[test]
    fn test_invalid_hex() {
        let err = KeyStore::new("zz666261386464653536643364353161", None).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidKey(_)));
    }

    #[test]
    fn test_with_xor_key_leaves_original() {
        let keys = KeyStore::from_bytes([0u8; 16], None);
        let scanned = keys.with_xor_key(0xAF);
        assert_eq!(keys.xor_key(), None);
        assert_eq!(scanned.xor_key(), Some(0xAF));
        assert_eq!(scanned.cipher_key(), keys.cipher_key());
    }

    #[test]
    fn test_debug_redacts() {
        let keys = KeyStore::from_bytes(*b"0123456789abcdef", Some(1));
        let debug = format!("{:?}", keys);
        assert!(!debug.contains("0123456789abcdef"));
    }
}
