//! 微信 WXGF 封装解析模块
//!
//! WXGF 由一个短文件头和若干分区组成,每个分区是一段以 4 字节大端长度开头的
//! HEVC Annex-B 码流。该模块定位码流分区并请求转码,转码失败时退回原始码流。

pub mod transcoder;

pub use transcoder::{
    DisabledTranscoder, FfmpegTranscoder, ImageFormat, TranscodeError, Transcoder,
};

use crate::decrypt::{DecodedMedia, MediaKind, SignatureRegistry};
use crate::error::{DecodeError, Result};
use serde::{Deserialize, Serialize};

/// 分区起始码,先找四字节形式,找不到再找三字节形式
const START_CODES: [&[u8]; 2] = [b"\x00\x00\x00\x01", b"\x00\x00\x01"];

/// 长度前缀字节数
const LENGTH_PREFIX: usize = 4;

/// 码流分区在缓冲区中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// 起始码所在偏移
    pub offset: usize,
    pub length: usize,
}

impl Partition {
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.length]
    }
}

/// WXGF 文件头
///
/// 解析得到的所有分区都保证位于缓冲区之内。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WxgfHeader {
    pub magic: [u8; 4],
    pub header_len: usize,
    pub version: u8,
    pub partitions: Vec<Partition>,
}

impl WxgfHeader {
    pub const MAGIC: &'static [u8; 4] = b"wxgf";

    /// 最短合法头: 魔数 + 头长度字节
    const MIN_HEADER_LEN: usize = 5;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_HEADER_LEN {
            return Err(DecodeError::MalformedContainer("数据过短".to_string()));
        }

        if &data[..4] != Self::MAGIC {
            return Err(DecodeError::MalformedContainer(format!(
                "魔数错误: {:02X?}",
                &data[..4]
            )));
        }

        let header_len = data[4] as usize;
        if header_len < Self::MIN_HEADER_LEN || header_len >= data.len() {
            return Err(DecodeError::MalformedContainer(format!(
                "头长度 {} 无效,数据大小 {}",
                header_len,
                data.len()
            )));
        }

        let version = if header_len > Self::MIN_HEADER_LEN {
            data[5]
        } else {
            0
        };

        let partitions = Self::find_partitions(data, header_len)?;

        log::debug!(
            "WXGF 头长度 {},版本 {},分区数 {}",
            header_len,
            version,
            partitions.len()
        );

        Ok(Self {
            magic: *Self::MAGIC,
            header_len,
            version,
            partitions,
        })
    }

    fn find_partitions(data: &[u8], header_len: usize) -> Result<Vec<Partition>> {
        for code in START_CODES {
            let mut partitions = Vec::new();
            let mut cursor = header_len;

            while let Some(idx) = find(&data[cursor..], code) {
                let offset = cursor + idx;
                if offset < header_len + LENGTH_PREFIX {
                    // 起始码前放不下长度前缀,跳过
                    cursor = offset + 1;
                    continue;
                }

                let prefix = &data[offset - LENGTH_PREFIX..offset];
                let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

                let end = offset.checked_add(length).filter(|&end| end <= data.len());
                let Some(end) = end.filter(|_| length > 0) else {
                    return Err(DecodeError::MalformedContainer(format!(
                        "分区 (偏移 {}, 长度 {}) 超出数据范围 {}",
                        offset,
                        length,
                        data.len()
                    )));
                };

                partitions.push(Partition { offset, length });

                if end >= data.len() {
                    break;
                }
                cursor = end;
            }

            if !partitions.is_empty() {
                return Ok(partitions);
            }
        }

        Err(DecodeError::MalformedContainer("未找到码流分区".to_string()))
    }

    /// 按策略选择码流分区
    pub fn select(&self, selection: PartitionSelection) -> Option<&Partition> {
        match selection {
            PartitionSelection::Last => self.partitions.last(),
            // 长度相同时取靠前的一个
            PartitionSelection::Largest => self
                .partitions
                .iter()
                .rev()
                .max_by_key(|partition| partition.length),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// 码流分区选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionSelection {
    /// 最后一个分区
    #[default]
    Last,
    /// 最大的分区,动图等多轨内容的主画面通常最大
    Largest,
}

/// WXGF 提取器
#[derive(Debug, Clone, Copy, Default)]
pub struct WxgfExtractor {
    selection: PartitionSelection,
    format: ImageFormat,
    registry: SignatureRegistry,
}

impl WxgfExtractor {
    pub fn new(selection: PartitionSelection, format: ImageFormat) -> Self {
        Self {
            selection,
            format,
            registry: SignatureRegistry::standard(),
        }
    }

    /// 从 WXGF 数据中取出码流并转码
    ///
    /// 结构错误返回 `MalformedContainer`。转码失败不是错误:
    /// 结果退化为 `MediaKind::RawCodecStream`,原始码流仍可被其他工具使用。
    pub fn extract(
        &self,
        decoded: &DecodedMedia,
        transcoder: &dyn Transcoder,
    ) -> Result<DecodedMedia> {
        let data = decoded.bytes();
        let header = WxgfHeader::parse(data)?;
        let partition = header
            .select(self.selection)
            .ok_or_else(|| DecodeError::MalformedContainer("未找到码流分区".to_string()))?;
        let stream = partition.slice(data);

        match transcoder.transcode(stream, self.format) {
            Ok(converted) => {
                let kind = self.registry.classify(&converted);
                if kind.is_image() {
                    log::debug!("WXGF 已转码为 {:?},输出大小: {} 字节", kind, converted.len());
                    return DecodedMedia::new(converted, kind);
                }
                log::warn!("转码输出无法识别为图片 ({:?}),保留原始码流", kind);
            }
            Err(e) => {
                log::warn!("WXGF 转码失败,保留原始码流: {}", e);
            }
        }

        DecodedMedia::new(stream.to_vec(), MediaKind::RawCodecStream)
    }
}
