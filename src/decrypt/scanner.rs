//! XOR 密钥扫描
//!
//! 单个文件可能恰好在错误的密钥下也"像"某种格式,所以密钥要从一批样本中统计得出。

use super::signature::SignatureRegistry;
use super::v4::V4Header;
use super::version::{DatVersion, VersionDetector};
use crate::error::{DecodeError, Result};

/// JPEG 结束标记
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// XOR 密钥扫描器
#[derive(Debug, Clone, Copy, Default)]
pub struct XorKeyScanner {
    registry: SignatureRegistry,
    /// 需要匹配的最少样本数,`None` 表示全部样本
    quorum: Option<usize>,
}

impl XorKeyScanner {
    pub fn new(registry: SignatureRegistry) -> Self {
        Self {
            registry,
            quorum: None,
        }
    }

    /// 设置最少匹配样本数,至少为 1
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = Some(quorum.max(1));
        self
    }

    /// 从样本前缀中找出密钥
    ///
    /// 按 0..=255 依次尝试,返回第一个在足够多样本上还原出已知签名的值。
    /// 结果与样本顺序无关。
    pub fn scan<B: AsRef<[u8]>>(&self, samples: &[B]) -> Result<u8> {
        if samples.is_empty() {
            return Err(DecodeError::KeyNotFound);
        }

        let required = self.quorum.unwrap_or(samples.len());
        if required > samples.len() {
            log::warn!(
                "样本数 {} 少于要求的匹配数 {},无法扫描",
                samples.len(),
                required
            );
            return Err(DecodeError::KeyNotFound);
        }

        for key in 0..=u8::MAX {
            let hits = samples
                .iter()
                .filter(|sample| self.matches_any(sample.as_ref(), key))
                .count();

            if hits >= required {
                log::debug!("XOR 密钥 0x{:02X} 命中 {}/{} 个样本", key, hits, samples.len());
                return Ok(key);
            }
        }

        Err(DecodeError::KeyNotFound)
    }

    /// 从 v4 缩略图容器的尾段找出密钥
    ///
    /// 缩略图都是 JPEG,尾段最后两个字节必然是 `FF D9`,两者推出的密钥一致才接受。
    pub fn scan_container_tails<B: AsRef<[u8]>>(&self, samples: &[B]) -> Result<u8> {
        for sample in samples {
            let data = sample.as_ref();
            if VersionDetector::detect(data) == DatVersion::V3 {
                continue;
            }

            let Ok(header) = V4Header::from_bytes(data) else {
                continue;
            };
            let Some(tail) = header.xor_tail(data) else {
                continue;
            };
            let [.., a, b] = tail else {
                continue;
            };

            let (k1, k2) = (a ^ JPEG_EOI[0], b ^ JPEG_EOI[1]);
            if k1 == k2 {
                log::debug!("从容器尾段得到 XOR 密钥 0x{:02X}", k1);
                return Ok(k1);
            }
        }

        Err(DecodeError::KeyNotFound)
    }

    fn matches_any(&self, sample: &[u8], key: u8) -> bool {
        self.registry
            .key_anchors()
            .any(|entry| entry.matches_xor(sample, key))
    }
}
