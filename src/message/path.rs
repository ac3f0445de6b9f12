//! 媒体文件相对路径推导
//!
//! 目录约定:
//! - 图片: `msg/attach/<md5(talker)>/<YYYY-MM>/Img/<md5>.dat`,缩略图 `<md5>_t.dat`
//! - 视频: `msg/video/<YYYY-MM>/<md5>.mp4`,缩略图 `<md5>_thumb.jpg`
//! - 语音: `voice/<server_id>`
//!
//! 各段名称与日期粒度都由 [`PathPolicy`] 配置。

use super::model::{MediaRole, MessageType};
use super::packed_info::PackedInfoRecord;
use crate::error::{DecodeError, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// 会话目录的命名方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TalkerSegment {
    /// 会话 ID 的 md5 十六进制
    #[default]
    Md5,
    /// 会话 ID 原文
    Name,
}

/// 目录约定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathPolicy {
    pub attach_root: String,
    pub video_root: String,
    pub voice_root: String,
    pub image_dir: String,
    /// chrono 格式串,决定日期分桶粒度
    pub date_format: String,
    pub talker_segment: TalkerSegment,
    /// 分桶使用的时区偏移,单位秒
    pub utc_offset_secs: i32,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self {
            attach_root: "msg/attach".to_string(),
            video_root: "msg/video".to_string(),
            voice_root: "voice".to_string(),
            image_dir: "Img".to_string(),
            date_format: "%Y-%m".to_string(),
            talker_segment: TalkerSegment::Md5,
            utc_offset_secs: 0,
        }
    }
}

/// 路径推导所需的消息元数据
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub message_type: MessageType,
    pub talker: &'a str,
    /// Unix 秒
    pub timestamp: i64,
    pub server_id: Option<i64>,
}

/// 路径推导器,纯函数,无内部状态
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    policy: PathPolicy,
}

impl PathResolver {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// 推导媒体路径
    ///
    /// 角色集合只取决于消息类型: 图片 `{image}`,视频 `{video}`,语音 `{voice}`,其余为空。
    /// 缺少该类型必需字段时返回 `DecodeError::MissingField`。
    pub fn resolve(
        &self,
        record: &PackedInfoRecord,
        ctx: &ResolveContext<'_>,
    ) -> Result<BTreeMap<MediaRole, String>> {
        let mut paths = BTreeMap::new();

        match ctx.message_type {
            MessageType::Image => {
                let md5 = record.image_md5()?.ok_or(DecodeError::MissingField("image.md5"))?;
                paths.insert(MediaRole::Image, self.image_path(ctx, &md5, "")?);
            }
            MessageType::Video => {
                let md5 = record.video_md5()?.ok_or(DecodeError::MissingField("video.md5"))?;
                paths.insert(MediaRole::Video, self.video_path(ctx, &md5, ".mp4")?);
            }
            MessageType::Voice => {
                let server_id = ctx.server_id.ok_or(DecodeError::MissingField("server_id"))?;
                paths.insert(
                    MediaRole::Voice,
                    join(&[&self.policy.voice_root, &server_id.to_string()]),
                );
            }
            MessageType::Text | MessageType::Other => {}
        }

        Ok(paths)
    }

    /// 缩略图路径,只有图片和视频有缩略图
    pub fn thumbnail(
        &self,
        record: &PackedInfoRecord,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<String>> {
        match ctx.message_type {
            MessageType::Image => match record.image_md5()? {
                Some(md5) => self.image_path(ctx, &md5, "_t").map(Some),
                None => Ok(None),
            },
            MessageType::Video => match record.video_md5()? {
                Some(md5) => self.video_path(ctx, &md5, "_thumb.jpg").map(Some),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn image_path(&self, ctx: &ResolveContext<'_>, md5: &str, suffix: &str) -> Result<String> {
        let talker = match self.policy.talker_segment {
            TalkerSegment::Md5 => format!("{:x}", md5::compute(ctx.talker.as_bytes())),
            TalkerSegment::Name => ctx.talker.to_string(),
        };
        let bucket = self.date_bucket(ctx.timestamp)?;
        let file = format!("{}{}.dat", md5, suffix);
        Ok(join(&[
            &self.policy.attach_root,
            &talker,
            &bucket,
            &self.policy.image_dir,
            &file,
        ]))
    }

    fn video_path(&self, ctx: &ResolveContext<'_>, md5: &str, suffix: &str) -> Result<String> {
        let bucket = self.date_bucket(ctx.timestamp)?;
        let file = format!("{}{}", md5, suffix);
        Ok(join(&[&self.policy.video_root, &bucket, &file]))
    }

    fn date_bucket(&self, timestamp: i64) -> Result<String> {
        let offset = FixedOffset::east_opt(self.policy.utc_offset_secs).ok_or_else(|| {
            DecodeError::Config(format!("无效的时区偏移: {}", self.policy.utc_offset_secs))
        })?;
        let time = DateTime::<Utc>::from_timestamp(timestamp, 0)
            .ok_or_else(|| DecodeError::MalformedRecord(format!("时间戳超出范围: {}", timestamp)))?
            .with_timezone(&offset);

        let mut bucket = String::new();
        write!(bucket, "{}", time.format(&self.policy.date_format)).map_err(|_| {
            DecodeError::Config(format!("无效的日期格式: {}", self.policy.date_format))
        })?;
        Ok(bucket)
    }
}

/// 以 `/` 连接非空路径段
fn join(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
