//! PackedInfoData 解析
//!
//! 记录使用 protobuf 线格式: 每个字段是 `(tag << 3 | wire_type)` 变长整数加上值。
//! 嵌套记录保存为原始字节,只有调用方请求时才继续解析。

use crate::error::{DecodeError, Result};
use std::collections::BTreeMap;

/// 已知字段编号
pub mod tags {
    pub const TYPE: u32 = 1;
    pub const VERSION: u32 = 2;
    pub const IMAGE: u32 = 3;
    pub const VIDEO: u32 = 4;

    /// `image` 子记录中的文件 md5
    pub const IMAGE_MD5: u32 = 4;
    /// `video` 子记录中的文件 md5
    pub const VIDEO_MD5: u32 = 8;
}

/// varint 最长 10 字节
const MAX_VARINT_LEN: usize = 10;

/// 字段值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    /// 字符串、字节串或嵌套记录,由读取方决定如何解释
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_integer(&self) -> Option<u64> {
        match *self {
            FieldValue::Varint(v) | FieldValue::Fixed64(v) => Some(v),
            FieldValue::Fixed32(v) => Some(v as u64),
            FieldValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// 非 UTF-8 时返回 `None`
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// 按嵌套记录解析
    pub fn as_record(&self) -> Option<Result<PackedInfoRecord>> {
        self.as_bytes().map(PackedInfoRecord::parse)
    }
}

/// 解码后的记录,未知字段也会保留
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedInfoRecord {
    fields: BTreeMap<u32, Vec<FieldValue>>,
}

impl PackedInfoRecord {
    /// 解析一段线格式数据,空输入得到空记录
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(raw);
        let mut fields: BTreeMap<u32, Vec<FieldValue>> = BTreeMap::new();

        while !reader.is_empty() {
            let key = reader.varint()?;
            let tag = u32::try_from(key >> 3)
                .map_err(|_| DecodeError::MalformedRecord(format!("字段编号过大: {}", key >> 3)))?;
            if tag == 0 {
                return Err(DecodeError::MalformedRecord("字段编号不能为 0".to_string()));
            }

            let value = match key & 0x07 {
                0 => FieldValue::Varint(reader.varint()?),
                1 => FieldValue::Fixed64(u64::from_le_bytes(reader.fixed::<8>()?)),
                2 => {
                    let len = reader.varint()?;
                    FieldValue::Bytes(reader.take(len)?.to_vec())
                }
                5 => FieldValue::Fixed32(u32::from_le_bytes(reader.fixed::<4>()?)),
                wire => {
                    return Err(DecodeError::MalformedRecord(format!(
                        "字段 {} 使用了不支持的线类型 {}",
                        tag, wire
                    )))
                }
            };

            fields.entry(tag).or_default().push(value);
        }

        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields.keys().copied()
    }

    /// 重复字段取最后一个值
    pub fn get(&self, tag: u32) -> Option<&FieldValue> {
        self.fields.get(&tag).and_then(|values| values.last())
    }

    pub fn get_all(&self, tag: u32) -> &[FieldValue] {
        self.fields.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn integer(&self, tag: u32) -> Option<u64> {
        self.get(tag).and_then(FieldValue::as_integer)
    }

    pub fn string(&self, tag: u32) -> Option<&str> {
        self.get(tag).and_then(FieldValue::as_str)
    }

    /// 读取嵌套记录,此时才解析子记录
    pub fn record(&self, tag: u32) -> Result<Option<PackedInfoRecord>> {
        self.get(tag).and_then(FieldValue::as_record).transpose()
    }

    pub fn message_type(&self) -> Option<u64> {
        self.integer(tags::TYPE)
    }

    pub fn version(&self) -> Option<u64> {
        self.integer(tags::VERSION)
    }

    /// 图片文件 md5,空字符串视为缺失
    pub fn image_md5(&self) -> Result<Option<String>> {
        self.nested_string(tags::IMAGE, tags::IMAGE_MD5)
    }

    /// 视频文件 md5,空字符串视为缺失
    pub fn video_md5(&self) -> Result<Option<String>> {
        self.nested_string(tags::VIDEO, tags::VIDEO_MD5)
    }

    fn nested_string(&self, outer: u32, inner: u32) -> Result<Option<String>> {
        Ok(self.record(outer)?.and_then(|record| {
            record
                .string(inner)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }))
    }
}

/// 线格式读取游标
struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| DecodeError::MalformedRecord("varint 被截断".to_string()))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::MalformedRecord("varint 超过 10 字节".to_string()))
    }

    fn take(&mut self, len: u64) -> Result<&'a [u8]> {
        let remaining = self.data.len() - self.pos;
        let len = usize::try_from(len)
            .ok()
            .filter(|&len| len <= remaining)
            .ok_or_else(|| {
                DecodeError::MalformedRecord(format!("长度 {} 超出剩余数据 {}", len, remaining))
            })?;
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N as u64)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}
