//! 统一的解码错误处理模块
//!
//! 该模块定义了容器解码与消息解析过程中所有可能的错误类型。
//! 每个错误对单次操作而言都是终结性的,内部不做任何重试。

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// 解码错误类型
///
/// 覆盖以下几类失败:
/// - 密钥校验与扫描
/// - 容器格式识别与 WXGF 结构解析
/// - PackedInfo 记录解析与媒体路径推导
/// - 消息正文解压
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    // ===== 密钥错误 =====
    #[error("无效的密钥: {0}")]
    InvalidKey(String),

    #[error("未能找到 XOR 密钥")]
    KeyNotFound,

    // ===== 容器错误 =====
    #[error("无法识别的文件格式")]
    UnrecognizedFormat,

    #[error("WXGF 容器结构无效: {0}")]
    MalformedContainer(String),

    // ===== 消息错误 =====
    #[error("PackedInfo 记录无效: {0}")]
    MalformedRecord(String),

    #[error("缺少必需字段: {0}")]
    MissingField(&'static str),

    #[error("压缩数据损坏: {0}")]
    CorruptStream(String),

    // ===== 边界错误 =====
    #[error("文件读写失败: {0}")]
    Io(String),

    #[error("配置错误: {0}")]
    Config(String),
}

/// 对外返回的结构化错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,
    /// 错误消息
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<DecodeError> for ErrorResponse {
    fn from(err: DecodeError) -> Self {
        let (code, message) = err.to_code_and_message();
        ErrorResponse::new(code, message)
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Config(err.to_string())
    }
}

impl DecodeError {
    /// 错误代码,稳定且可供调用方匹配
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::InvalidKey(_) => "INVALID_KEY",
            DecodeError::KeyNotFound => "KEY_NOT_FOUND",
            DecodeError::UnrecognizedFormat => "UNRECOGNIZED_FORMAT",
            DecodeError::MalformedContainer(_) => "MALFORMED_CONTAINER",
            DecodeError::MalformedRecord(_) => "MALFORMED_RECORD",
            DecodeError::MissingField(_) => "MISSING_FIELD",
            DecodeError::CorruptStream(_) => "CORRUPT_STREAM",
            DecodeError::Io(_) => "IO_ERROR",
            DecodeError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// 将错误转换为错误代码和消息
    pub fn to_code_and_message(&self) -> (String, String) {
        (self.code().to_string(), self.to_string())
    }

    /// 属于输入本身不匹配的常规结果,批处理中不应视为异常
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            DecodeError::UnrecognizedFormat | DecodeError::MalformedContainer(_)
        )
    }

    /// 记录错误到日志
    pub fn log(&self) {
        let (code, message) = self.to_code_and_message();
        if self.is_routine() {
            log::debug!("[{}] {}", code, message);
        } else {
            log::error!("[{}] {}", code, message);
        }
    }
}

impl From<DecodeError> for String {
    fn from(err: DecodeError) -> Self {
        let (code, message) = err.to_code_and_message();
        format!("[{}] {}", code, message)
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_and_message() {
        let err = DecodeError::MissingField("image.md5");
        let (code, message) = err.to_code_and_message();
        assert_eq!(code, "MISSING_FIELD");
        assert!(message.contains("image.md5"));
    }

    #[test]
    fn test_error_to_string() {
        let err = DecodeError::MalformedContainer("partition out of bounds".to_string());
        let err_str: String = err.into();
        assert!(err_str.starts_with("[MALFORMED_CONTAINER]"));
        assert!(err_str.contains("partition out of bounds"));
    }

    #[test]
    fn test_error_response_from_decode_error() {
        let response: ErrorResponse = DecodeError::UnrecognizedFormat.into();
        assert_eq!(response.code, "UNRECOGNIZED_FORMAT");
        assert_eq!(response.to_string(), "[UNRECOGNIZED_FORMAT] 无法识别的文件格式");
    }

    #[test]
    fn test_routine_errors() {
        assert!(DecodeError::UnrecognizedFormat.is_routine());
        assert!(DecodeError::MalformedContainer(String::new()).is_routine());
        assert!(!DecodeError::KeyNotFound.is_routine());
    }
}
