//! DAT v4 版本解密模块

use super::aes::AesHandler;
use super::v3::V3Decryptor;
use crate::error::{DecodeError, Result};

/// v4 版本文件头结构
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V4Header {
    /// 签名 (6 字节)
    pub signature: [u8; 6],
    /// AES 加密部分的明文大小
    pub aes_size: u32,
    /// 末尾 XOR 加密部分大小
    pub xor_size: u32,
}

impl V4Header {
    /// 文件头大小,最后一个字节保留未用
    pub const SIZE: usize = 15;

    /// 从字节数组解析文件头
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(DecodeError::MalformedContainer(format!(
                "v4 文件头不足 {} 字节",
                Self::SIZE
            )));
        }

        let mut signature = [0u8; 6];
        signature.copy_from_slice(&bytes[0..6]);

        let aes_size = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let xor_size = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);

        Ok(Self {
            signature,
            aes_size,
            xor_size,
        })
    }

    /// 返回末尾 XOR 段,长度不合法时返回 `None`
    pub fn xor_tail<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        let payload = data.get(Self::SIZE..)?;
        let xor_size = self.xor_size as usize;
        if xor_size == 0 || xor_size > payload.len() {
            return None;
        }
        Some(&payload[payload.len() - xor_size..])
    }
}

/// v4 版本解密器
///
/// 负载由三段组成: AES-ECB 加密段、原样保存的中间段、与 XOR 密钥异或的尾段。
pub struct V4Decryptor;

impl V4Decryptor {
    /// 解密内存中的 v4 容器
    ///
    /// # 参数
    ///
    /// * `data` - 完整容器字节,包括 15 字节文件头
    /// * `aes_key` - AES 密钥 (16 字节)
    /// * `xor_key` - XOR 密钥,仅当尾段非空时需要
    pub fn decrypt(data: &[u8], aes_key: &[u8], xor_key: Option<u8>) -> Result<Vec<u8>> {
        let header = V4Header::from_bytes(data)?;
        let payload = &data[V4Header::SIZE..];

        log::debug!(
            "解密 v4 DAT 数据,AES 大小: {}, XOR 大小: {}",
            header.aes_size,
            header.xor_size
        );

        let aes_size = header.aes_size as usize;
        let xor_size = header.xor_size as usize;
        let aes_size_aligned = AesHandler::align_size(aes_size).min(payload.len());

        if xor_size > payload.len() - aes_size_aligned {
            return Err(DecodeError::MalformedContainer(format!(
                "XOR 段大小 {} 超出剩余数据 {}",
                xor_size,
                payload.len() - aes_size_aligned
            )));
        }

        let mut result = AesHandler::decrypt_ecb(&payload[..aes_size_aligned], aes_key)?;
        result.truncate(aes_size);

        let xor_start = payload.len() - xor_size;
        result.extend_from_slice(&payload[aes_size_aligned..xor_start]);

        if xor_size > 0 {
            let key = xor_key.ok_or(DecodeError::KeyNotFound)?;
            result.extend(V3Decryptor::xor_decrypt(&payload[xor_start..], key));
        }

        log::debug!("v4 解密完成,总大小: {} 字节", result.len());

        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
    use aes::Aes128;

    /// 构造 v4 容器: 前 `aes_size` 字节 AES 加密,后 `xor_size` 字节异或
    pub(crate) fn build_v4(
        signature: &[u8],
        plain: &[u8],
        aes_size: usize,
        xor_size: usize,
        aes_key: &[u8],
        xor_key: u8,
    ) -> Vec<u8> {
        let cipher = Aes128::new_from_slice(aes_key).unwrap();
        let mut head = plain[..aes_size].to_vec();
        let pad = 16 - aes_size % 16;
        head.extend(std::iter::repeat(pad as u8).take(pad));
        for chunk in head.chunks_exact_mut(16) {
            cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        }

        let mut out = signature.to_vec();
        out.extend_from_slice(&(aes_size as u32).to_le_bytes());
        out.extend_from_slice(&(xor_size as u32).to_le_bytes());
        out.push(0);
        out.extend_from_slice(&head);
        let xor_start = plain.len() - xor_size;
        out.extend_from_slice(&plain[aes_size..xor_start]);
        out.extend(plain[xor_start..].iter().map(|b| b ^ xor_key));
        out
    }

    #[test]
    fn test_header_parse() {
        let mut bytes = b"\x07\x08V2\x08\x07".to_vec();
        bytes.extend_from_slice(&1024u32.to_le_bytes());
        bytes.extend_from_slice(&32u32.to_le_bytes());
        bytes.push(0);
        let header = V4Header::from_bytes(&bytes).unwrap();
        assert_eq!(header.aes_size, 1024);
        assert_eq!(header.xor_size, 32);
    }

    #[test]
    fn test_header_too_short() {
        let err = V4Header::from_bytes(b"\x07\x08V2").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedContainer(_)));
    }

    #[test]
    fn test_decrypt_three_sections() {
        let key = b"2fba8dde56d3d51a";
        let mut plain = b"\xFF\xD8\xFF\xE0".to_vec();
        plain.extend((0..200u32).map(|i| (i % 251) as u8));
        plain.extend_from_slice(b"\xFF\xD9");

        let data = build_v4(b"\x07\x08V2\x08\x07", &plain, 37, 20, key, 0x37);
        let out = V4Decryptor::decrypt(&data, key, Some(0x37)).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn test_decrypt_without_xor_tail() {
        let key = b"2fba8dde56d3d51a";
        let plain = b"\xFF\xD8\xFF\xE0 some jpeg body".to_vec();
        let data = build_v4(b"\x07\x08V2\x08\x07", &plain, 16, 0, key, 0);
        let out = V4Decryptor::decrypt(&data, key, None).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn test_decrypt_requires_xor_key_for_tail() {
        let key = b"2fba8dde56d3d51a";
        let plain = vec![0xAB; 64];
        let data = build_v4(b"\x07\x08V2\x08\x07", &plain, 16, 8, key, 0x11);
        let err = V4Decryptor::decrypt(&data, key, None).unwrap_err();
        assert_eq!(err, DecodeError::KeyNotFound);
    }

    #[test]
    fn test_xor_size_exceeds_payload() {
        let mut data = b"\x07\x08V2\x08\x07".to_vec();
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.push(0);
        data.extend_from_slice(&[0u8; 48]);
        let err = V4Decryptor::decrypt(&data, b"2fba8dde56d3d51a", Some(1)).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedContainer(_)));
    }

    #[test]
    fn test_xor_tail() {
        let key = b"2fba8dde56d3d51a";
        let plain = vec![0x42; 64];
        let data = build_v4(b"\x07\x08V1\x08\x07", &plain, 16, 4, key, 0x10);
        let header = V4Header::from_bytes(&data).unwrap();
        assert_eq!(header.xor_tail(&data), Some(&[0x52u8; 4][..]));
    }
}
