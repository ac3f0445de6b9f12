//! 解码结果

use super::signature::MediaKind;
use crate::error::{DecodeError, Result};
use base64::Engine;

/// 解码后的媒体数据
///
/// 成功解码的结果类型永远不是 `MediaKind::Unknown`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMedia {
    bytes: Vec<u8>,
    kind: MediaKind,
}

impl DecodedMedia {
    pub fn new(bytes: Vec<u8>, kind: MediaKind) -> Result<Self> {
        if kind == MediaKind::Unknown {
            return Err(DecodeError::UnrecognizedFormat);
        }
        Ok(Self { bytes, kind })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }

    /// 生成 `data:` URL,供前端直接展示
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}
