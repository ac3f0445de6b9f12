//! 微信 DAT 文件解密模块
//!
//! 该模块把一段不透明的字节还原成可识别的媒体数据。
//! - v3: 明文或单字节 XOR
//! - v4: AES-ECB + XOR 混合加密
//!
//! 所有变换都以数据形式排成固定顺序,依次尝试,第一个能匹配签名表的结果胜出。

pub mod aes;
pub mod keys;
pub mod media;
pub mod scanner;
pub mod signature;
pub mod v3;
pub mod v4;
pub mod version;

// 重新导出公共类型
pub use keys::KeyStore;
pub use media::DecodedMedia;
pub use scanner::XorKeyScanner;
pub use signature::{MediaKind, SignatureEntry, SignatureRegistry};
pub use v3::V3Decryptor;
pub use v4::{V4Decryptor, V4Header};
pub use version::{DatVersion, VersionDetector};

use crate::error::{DecodeError, Result};
use std::borrow::Cow;

/// 解码变换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// 数据本身就是明文
    Identity,
    /// 使用会话 XOR 密钥异或
    KeyedXor,
    /// v4 容器,AES + XOR
    Cipher,
    /// 旧版文件,从文件头推断逐文件的 XOR 密钥
    InferredXor,
}

/// 变换的尝试顺序
///
/// 客户端历史上先是明文,之后是 XOR,再之后才是 AES,
/// 同一份数据在多种变换下都可能"看起来"合法,因此必须按版本先后尝试。
pub const TRANSFORM_ORDER: [Transform; 4] = [
    Transform::Identity,
    Transform::KeyedXor,
    Transform::Cipher,
    Transform::InferredXor,
];

impl Transform {
    /// 应用变换,变换不适用时返回 `None`
    ///
    /// v4 容器只走 `Cipher`,其余变换只作用于旧版数据。
    fn apply<'a>(
        self,
        blob: &'a [u8],
        keys: &KeyStore,
        registry: &SignatureRegistry,
    ) -> Option<Cow<'a, [u8]>> {
        let version = VersionDetector::detect(blob);
        if self != Transform::Cipher && version != DatVersion::V3 {
            return None;
        }

        match self {
            Transform::Identity => Some(Cow::Borrowed(blob)),
            Transform::KeyedXor => keys
                .xor_key()
                .map(|key| Cow::Owned(V3Decryptor::xor_decrypt(blob, key))),
            Transform::Cipher => {
                let aes_key: &[u8] = match version {
                    DatVersion::V3 => return None,
                    DatVersion::V4V1 => VersionDetector::V4_V1_KEY,
                    DatVersion::V4V2 => keys.cipher_key(),
                };
                match V4Decryptor::decrypt(blob, aes_key, keys.xor_key()) {
                    Ok(plain) => Some(Cow::Owned(plain)),
                    Err(e) => {
                        log::debug!("v4 解密失败: {}", e);
                        None
                    }
                }
            }
            Transform::InferredXor => {
                let (key, _) = V3Decryptor::infer_key(blob, registry)?;
                log::debug!("推断出旧版 XOR 密钥 0x{:02X}", key);
                Some(Cow::Owned(V3Decryptor::xor_decrypt(blob, key)))
            }
        }
    }
}

/// DAT 容器解码器
///
/// 无内部状态,可在多个线程中并发使用。
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerDecoder {
    registry: SignatureRegistry,
}

impl ContainerDecoder {
    pub fn new(registry: SignatureRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    /// 解码一段数据
    ///
    /// 所有变换都无法得到已知签名时返回 `DecodeError::UnrecognizedFormat`。
    pub fn decode(&self, blob: &[u8], keys: &KeyStore) -> Result<DecodedMedia> {
        self.decode_with_transform(blob, keys)
            .map(|(media, _)| media)
    }

    /// 解码并返回生效的变换
    pub fn decode_with_transform(
        &self,
        blob: &[u8],
        keys: &KeyStore,
    ) -> Result<(DecodedMedia, Transform)> {
        for transform in TRANSFORM_ORDER {
            let Some(plain) = transform.apply(blob, keys, &self.registry) else {
                continue;
            };

            let kind = self.registry.classify(&plain);
            if kind == MediaKind::Unknown {
                continue;
            }

            log::debug!(
                "{:?} 变换识别为 {:?},大小: {} 字节",
                transform,
                kind,
                plain.len()
            );
            return Ok((DecodedMedia::new(plain.into_owned(), kind)?, transform));
        }

        Err(DecodeError::UnrecognizedFormat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decrypt::v4::tests::build_v4;

    const AES_KEY: &[u8; 16] = b"2fba8dde56d3d51a";

    fn keys(xor: Option<u8>) -> KeyStore {
        KeyStore::from_bytes(*AES_KEY, xor)
    }

    fn jpeg() -> Vec<u8> {
        let mut data = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00".to_vec();
        data.extend_from_slice(&[0x33; 64]);
        data.extend_from_slice(b"\xFF\xD9");
        data
    }

    #[test]
    fn test_identity_wins_for_plaintext() {
        let decoder = ContainerDecoder::default();
        let (media, transform) = decoder.decode_with_transform(&jpeg(), &keys(Some(0x37))).unwrap();
        assert_eq!(transform, Transform::Identity);
        assert_eq!(media.kind(), MediaKind::Jpeg);
        assert_eq!(media.bytes(), jpeg().as_slice());
    }

    #[test]
    fn test_decode_is_idempotent() {
        let decoder = ContainerDecoder::default();
        let once = decoder.decode(&V3Decryptor::xor_decrypt(&jpeg(), 0xAF), &keys(Some(0xAF))).unwrap();
        let twice = decoder.decode(once.bytes(), &keys(Some(0xAF))).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_keyed_xor() {
        let blob = V3Decryptor::xor_decrypt(b"GIF89a..........", 0xAF);
        let decoder = ContainerDecoder::default();
        let (media, transform) = decoder.decode_with_transform(&blob, &keys(Some(0xAF))).unwrap();
        assert_eq!(transform, Transform::KeyedXor);
        assert_eq!(media.kind(), MediaKind::Gif);
    }

    #[test]
    fn test_inferred_xor_without_session_key() {
        let blob = V3Decryptor::xor_decrypt(&jpeg(), 0x5E);
        let decoder = ContainerDecoder::default();
        let (media, transform) = decoder.decode_with_transform(&blob, &keys(None)).unwrap();
        assert_eq!(transform, Transform::InferredXor);
        assert_eq!(media.bytes(), jpeg().as_slice());
    }

    #[test]
    fn test_cipher_v2() {
        let plain = jpeg();
        let blob = build_v4(b"\x07\x08V2\x08\x07", &plain, 40, 10, AES_KEY, 0x37);
        let decoder = ContainerDecoder::default();
        let (media, transform) = decoder.decode_with_transform(&blob, &keys(Some(0x37))).unwrap();
        assert_eq!(transform, Transform::Cipher);
        assert_eq!(media.kind(), MediaKind::Jpeg);
        assert_eq!(media.bytes(), plain.as_slice());
    }

    #[test]
    fn test_cipher_v1_uses_builtin_key() {
        let plain = jpeg();
        let blob = build_v4(
            b"\x07\x08V1\x08\x07",
            &plain,
            16,
            0,
            VersionDetector::V4_V1_KEY,
            0,
        );
        let media = ContainerDecoder::default().decode(&blob, &keys(None)).unwrap();
        assert_eq!(media.bytes(), plain.as_slice());
    }

    #[test]
    fn test_cipher_with_wrong_key_is_unrecognized() {
        let blob = build_v4(b"\x07\x08V2\x08\x07", &jpeg(), 16, 0, AES_KEY, 0);
        let wrong = KeyStore::from_bytes(*b"0000000000000000", None);
        let err = ContainerDecoder::default().decode(&blob, &wrong).unwrap_err();
        assert_eq!(err, DecodeError::UnrecognizedFormat);
    }

    #[test]
    fn test_session_xor_skips_cipher_containers() {
        // 0x07 ^ 0x45 = 'B', 0x08 ^ 0x45 = 'M',异或后会被误认为 BMP
        let plain = jpeg();
        let blob = build_v4(b"\x07\x08V2\x08\x07", &plain, 40, 10, AES_KEY, 0x45);
        let decoder = ContainerDecoder::default();
        let (media, transform) = decoder.decode_with_transform(&blob, &keys(Some(0x45))).unwrap();
        assert_eq!(transform, Transform::Cipher);
        assert_eq!(media.kind(), MediaKind::Jpeg);
        assert_eq!(media.bytes(), plain.as_slice());
    }

    #[test]
    fn test_every_signature_under_identity_and_session_xor() {
        let decoder = ContainerDecoder::default();
        for entry in decoder.registry().entries() {
            let mut plain = entry.pattern.to_vec();
            plain.extend_from_slice(&[0xAA; 16]);

            let (media, transform) = decoder.decode_with_transform(&plain, &keys(None)).unwrap();
            assert_eq!((media.kind(), transform), (entry.kind, Transform::Identity));

            let blob = V3Decryptor::xor_decrypt(&plain, 0x6B);
            let (media, transform) = decoder.decode_with_transform(&blob, &keys(Some(0x6B))).unwrap();
            assert_eq!((media.kind(), transform), (entry.kind, Transform::KeyedXor), "{:?}", entry.kind);
            assert_eq!(media.bytes(), plain.as_slice());
        }
    }

    #[test]
    fn test_unrecognized() {
        let err = ContainerDecoder::default()
            .decode(&[0u8; 32], &keys(None))
            .unwrap_err();
        assert_eq!(err, DecodeError::UnrecognizedFormat);

        let err = ContainerDecoder::default().decode(&[], &keys(Some(1))).unwrap_err();
        assert_eq!(err, DecodeError::UnrecognizedFormat);
    }
}
