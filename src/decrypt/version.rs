//! DAT 文件版本检测模块

/// DAT 文件版本
///
/// 微信 DAT 文件有三种形态:
/// - V3: 无签名,明文或仅使用 XOR 加密
/// - V4V1: 带 `\x07\x08V1\x08\x07` 签名,使用固定 AES + XOR 混合加密
/// - V4V2: 带 `\x07\x08V2\x08\x07` 签名,使用会话 AES + XOR 混合加密
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatVersion {
    V3,
    V4V1,
    V4V2,
}

/// 版本检测器
pub struct VersionDetector;

impl VersionDetector {
    /// v4 V1 签名 (固定 AES)
    pub const V4_V1_SIGNATURE: &'static [u8] = b"\x07\x08V1\x08\x07";
    /// v4 V2 签名 (会话 AES)
    pub const V4_V2_SIGNATURE: &'static [u8] = b"\x07\x08V2\x08\x07";

    /// V1 容器内置的 AES 密钥
    pub const V4_V1_KEY: &'static [u8; 16] = b"cfcd208495d565ef";

    /// 根据前导字节检测版本,长度不足或签名不匹配时视为 V3
    pub fn detect(data: &[u8]) -> DatVersion {
        if data.starts_with(Self::V4_V1_SIGNATURE) {
            DatVersion::V4V1
        } else if data.starts_with(Self::V4_V2_SIGNATURE) {
            DatVersion::V4V2
        } else {
            DatVersion::V3
        }
    }
}
