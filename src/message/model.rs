//! 消息数据结构

use serde::Serialize;
use std::collections::BTreeMap;

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Voice,
    Video,
    Other,
}

impl MessageType {
    pub const CODE_TEXT: u32 = 1;
    pub const CODE_IMAGE: u32 = 3;
    pub const CODE_VOICE: u32 = 34;
    pub const CODE_VIDEO: u32 = 43;

    /// 未知类型码一律归为 `Other`
    pub fn from_code(code: u32) -> Self {
        match code {
            Self::CODE_TEXT => MessageType::Text,
            Self::CODE_IMAGE => MessageType::Image,
            Self::CODE_VOICE => MessageType::Voice,
            Self::CODE_VIDEO => MessageType::Video,
            _ => MessageType::Other,
        }
    }

    pub fn is_media(self) -> bool {
        matches!(
            self,
            MessageType::Image | MessageType::Voice | MessageType::Video
        )
    }

    /// 路径推导需要 PackedInfoData 的类型
    pub fn needs_packed_info(self) -> bool {
        matches!(self, MessageType::Image | MessageType::Video)
    }
}

/// v4 数据库中的 `local_type` 低 32 位是类型,高 32 位是子类型
pub fn split_local_type(local_type: i64) -> (u32, u32) {
    let raw = local_type as u64;
    ((raw & 0xFFFF_FFFF) as u32, (raw >> 32) as u32)
}

/// 媒体角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaRole {
    Image,
    Video,
    Voice,
}

impl MediaRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaRole::Image => "image",
            MediaRole::Video => "video",
            MediaRole::Voice => "voice",
        }
    }

    /// 拼接 HTTP 访问地址,图片和视频位于 `/data/` 之下
    pub fn url(self, host: &str, path: &str) -> String {
        match self {
            MediaRole::Image | MediaRole::Video => format!("http://{}/data/{}", host, path),
            MediaRole::Voice => format!("http://{}/{}", host, path),
        }
    }
}

/// 存储层提供的原始 v4 消息行
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub sort_seq: i64,
    /// 服务端消息 ID,语音文件以此命名
    pub server_id: i64,
    pub local_type: i64,
    pub user_name: String,
    /// Unix 秒
    pub create_time: i64,
    pub message_content: Vec<u8>,
    pub packed_info_data: Vec<u8>,
    pub status: i64,
}

/// 规范化后的消息,构造后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedMessage {
    pub(crate) seq: i64,
    pub(crate) message_type: MessageType,
    pub(crate) sub_type: u32,
    pub(crate) timestamp: i64,
    pub(crate) talker: String,
    pub(crate) sender: String,
    pub(crate) is_chat_room: bool,
    pub(crate) is_self: bool,
    pub(crate) body: String,
    pub(crate) media_paths: BTreeMap<MediaRole, String>,
    pub(crate) thumbnail: Option<String>,
}

impl NormalizedMessage {
    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn sub_type(&self) -> u32 {
        self.sub_type
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn talker(&self) -> &str {
        &self.talker
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn is_chat_room(&self) -> bool {
        self.is_chat_room
    }

    pub fn is_self(&self) -> bool {
        self.is_self
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn media_paths(&self) -> &BTreeMap<MediaRole, String> {
        &self.media_paths
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    /// 所有媒体的 HTTP 地址
    pub fn media_urls(&self, host: &str) -> BTreeMap<MediaRole, String> {
        self.media_paths
            .iter()
            .map(|(&role, path)| (role, role.url(host, path)))
            .collect()
    }
}
