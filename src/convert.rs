//! .dat 文件转换
//!
//! 解码容器,若结果是 WXGF 则继续提取并转码,得到可直接保存的媒体数据。

use crate::decrypt::{ContainerDecoder, DecodedMedia, KeyStore, MediaKind};
use crate::error::{DecodeError, Result};
use crate::wxgf::{Transcoder, WxgfExtractor};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// 一次转换会话,持有不可变的密钥和转码器,可在线程间共享
#[derive(Clone)]
pub struct DatConverter {
    keys: KeyStore,
    decoder: ContainerDecoder,
    extractor: WxgfExtractor,
    transcoder: Arc<dyn Transcoder>,
}

impl DatConverter {
    pub fn new(keys: KeyStore, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            keys,
            decoder: ContainerDecoder::default(),
            extractor: WxgfExtractor::default(),
            transcoder,
        }
    }

    pub fn with_decoder(mut self, decoder: ContainerDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_extractor(mut self, extractor: WxgfExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// 转换内存中的数据
    pub fn convert(&self, blob: &[u8]) -> Result<DecodedMedia> {
        let decoded = self.decoder.decode(blob, &self.keys)?;
        if decoded.kind() != MediaKind::Wxgf {
            return Ok(decoded);
        }
        self.extractor.extract(&decoded, self.transcoder.as_ref())
    }

    /// 读取并转换文件
    pub fn convert_file(&self, path: &Path) -> Result<DecodedMedia> {
        let blob = fs::read(path)?;
        self.convert(&blob).inspect_err(DecodeError::log)
    }
}

impl std::fmt::Debug for DatConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatConverter")
            .field("keys", &self.keys)
            .field("decoder", &self.decoder)
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}
