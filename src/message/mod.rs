//! v4 消息解析
//!
//! 把数据库中的原始消息行整理为 [`NormalizedMessage`]:
//! 类型分派、PackedInfoData 解析、媒体路径推导与正文解压。

pub mod content;
pub mod model;
pub mod packed_info;
pub mod path;

pub use content::{ContentDecompressor, ZSTD_MAGIC};
pub use model::{split_local_type, MediaRole, MessageType, NormalizedMessage, RawMessage};
pub use packed_info::{FieldValue, PackedInfoRecord};
pub use path::{PathPolicy, PathResolver, ResolveContext, TalkerSegment};

use crate::error::{DecodeError, Result};
use std::collections::BTreeMap;

/// 群聊会话 ID 后缀
pub const CHAT_ROOM_SUFFIX: &str = "@chatroom";

/// 发送成功的自发消息状态
const STATUS_SENT: i64 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct UnwrapOptions {
    /// 为 true 时媒体字段缺失直接报错,否则保留消息并清空媒体路径
    pub strict_media: bool,
}

/// 消息解包器
#[derive(Debug, Clone, Default)]
pub struct MessageUnwrapper {
    resolver: PathResolver,
    options: UnwrapOptions,
}

impl MessageUnwrapper {
    pub fn new(resolver: PathResolver, options: UnwrapOptions) -> Self {
        Self { resolver, options }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// 整理一条消息
    ///
    /// `talker` 是该消息所在会话的 ID,`raw.user_name` 是实际发送者。
    /// 未知类型码得到 `MessageType::Other`,正文与媒体路径均为空。
    pub fn wrap(&self, raw: &RawMessage, talker: &str) -> Result<NormalizedMessage> {
        let (code, sub_type) = split_local_type(raw.local_type);
        let message_type = MessageType::from_code(code);
        let is_chat_room = talker.ends_with(CHAT_ROOM_SUFFIX);

        let mut sender = raw.user_name.clone();
        let is_self = raw.status == STATUS_SENT || (!is_chat_room && talker != raw.user_name);

        let body = match message_type {
            MessageType::Other => String::new(),
            _ => {
                let text = ContentDecompressor::decompress_text(&raw.message_content)?;
                match split_sender(&text).filter(|_| is_chat_room) {
                    Some((prefix, rest)) => {
                        sender = prefix.to_string();
                        rest.to_string()
                    }
                    None => text,
                }
            }
        };

        let (media_paths, thumbnail) = self.media(raw, message_type, talker)?;

        log::trace!(
            "消息 {} 类型 {:?} 媒体 {} 项",
            raw.sort_seq,
            message_type,
            media_paths.len()
        );

        Ok(NormalizedMessage {
            seq: raw.sort_seq,
            message_type,
            sub_type,
            timestamp: raw.create_time,
            talker: talker.to_string(),
            sender,
            is_chat_room,
            is_self,
            body,
            media_paths,
            thumbnail,
        })
    }

    fn media(
        &self,
        raw: &RawMessage,
        message_type: MessageType,
        talker: &str,
    ) -> Result<(BTreeMap<MediaRole, String>, Option<String>)> {
        if !message_type.is_media() {
            return Ok((BTreeMap::new(), None));
        }

        let record = if message_type.needs_packed_info() {
            PackedInfoRecord::parse(&raw.packed_info_data)?
        } else {
            PackedInfoRecord::default()
        };
        let ctx = ResolveContext {
            message_type,
            talker,
            timestamp: raw.create_time,
            server_id: Some(raw.server_id).filter(|&id| id != 0),
        };

        match self.resolver.resolve(&record, &ctx) {
            Ok(paths) => {
                let thumbnail = self.resolver.thumbnail(&record, &ctx)?;
                Ok((paths, thumbnail))
            }
            Err(DecodeError::MissingField(field)) if !self.options.strict_media => {
                log::warn!(
                    "消息 {} 缺少字段 {},媒体路径留空",
                    raw.sort_seq,
                    field
                );
                Ok((BTreeMap::new(), None))
            }
            Err(e) => Err(e),
        }
    }
}

/// 群聊正文形如 `wxid_xxx:\n内容`,以第一个 `:\n` 为界
fn split_sender(text: &str) -> Option<(&str, &str)> {
    text.split_once(":\n")
}
