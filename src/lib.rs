//! 微信 DAT 媒体解码与 v4 消息解析
//!
//! - [`decrypt`]: 容器解码,明文 / XOR / AES 依次尝试
//! - [`wxgf`]: WXGF 封装解析与 HEVC 转码
//! - [`message`]: PackedInfoData 解析、媒体路径推导、正文解压
//! - [`convert`] / [`batch`]: 单文件与目录级的转换入口

pub mod batch;
pub mod config;
pub mod convert;
pub mod decrypt;
pub mod error;
pub mod message;
pub mod wxgf;

pub use config::{Config, CONFIG_FILE};
pub use convert::DatConverter;
pub use decrypt::{ContainerDecoder, DecodedMedia, KeyStore, MediaKind, SignatureRegistry, XorKeyScanner};
pub use error::{DecodeError, ErrorResponse, Result};
pub use message::{
    MessageType, MessageUnwrapper, NormalizedMessage, PackedInfoRecord, PathResolver, RawMessage,
    UnwrapOptions,
};
pub use wxgf::{FfmpegTranscoder, PartitionSelection, Transcoder, WxgfExtractor};
