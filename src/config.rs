//! 配置文件读写

use crate::convert::DatConverter;
use crate::decrypt::KeyStore;
use crate::error::{DecodeError, Result};
use crate::message::{MessageUnwrapper, PathPolicy, PathResolver, UnwrapOptions};
use crate::wxgf::{FfmpegTranscoder, ImageFormat, PartitionSelection, Transcoder, WxgfExtractor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// 默认配置文件路径
pub const CONFIG_FILE: &str = "config.json";

// 配置结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// XOR 密钥,未知时留空
    pub xor: Option<u8>,
    /// AES 密钥: 32 位十六进制,或 16 个 ASCII 字符
    pub aes: String,
    /// ffmpeg 可执行文件或所在目录
    pub ffmpeg: Option<PathBuf>,
    pub transcode_timeout_secs: u64,
    pub partition: PartitionSelection,
    pub path_policy: PathPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xor: None,
            aes: String::new(),
            ffmpeg: None,
            transcode_timeout_secs: FfmpegTranscoder::DEFAULT_TIMEOUT.as_secs(),
            partition: PartitionSelection::default(),
            path_policy: PathPolicy::default(),
        }
    }
}

impl Config {
    // 读取配置文件
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| DecodeError::Config(format!("无法读取 {}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&content)?;
        log::debug!("已加载配置文件 {}", path.display());
        Ok(config)
    }

    // 保存配置文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// 构造会话密钥
    ///
    /// 未配置 AES 密钥时使用全零密钥,此时只有明文和 XOR 文件可以解码。
    pub fn key_store(&self) -> Result<KeyStore> {
        let aes = self.aes.trim();

        if aes.is_empty() {
            log::warn!("未配置 AES 密钥,v4 V2 容器将无法解密");
            return Ok(KeyStore::from_bytes([0; KeyStore::CIPHER_KEY_LEN], self.xor));
        }

        // 微信内存中取出的密钥常以 16 个字符的形式给出,直接作为字节使用
        if aes.len() == KeyStore::CIPHER_KEY_LEN {
            let mut key = [0u8; KeyStore::CIPHER_KEY_LEN];
            key.copy_from_slice(aes.as_bytes());
            return Ok(KeyStore::from_bytes(key, self.xor));
        }

        KeyStore::new(aes, self.xor)
    }

    pub fn transcoder(&self) -> Arc<dyn Transcoder> {
        let ffmpeg = match &self.ffmpeg {
            Some(path) => FfmpegTranscoder::new(FfmpegTranscoder::resolve_program(path.clone())),
            None => FfmpegTranscoder::from_env(),
        };
        Arc::new(ffmpeg.with_timeout(Duration::from_secs(self.transcode_timeout_secs)))
    }

    pub fn converter(&self) -> Result<DatConverter> {
        let extractor = WxgfExtractor::new(self.partition, ImageFormat::default());
        Ok(DatConverter::new(self.key_store()?, self.transcoder()).with_extractor(extractor))
    }

    pub fn unwrapper(&self, options: UnwrapOptions) -> MessageUnwrapper {
        MessageUnwrapper::new(PathResolver::new(self.path_policy.clone()), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TalkerSegment;

    #[test]
    fn test_defaults_from_partial_json() {
        let config: Config = serde_json::from_str(r#"{"xor": 175}"#).unwrap();
        assert_eq!(config.xor, Some(0xAF));
        assert_eq!(config.transcode_timeout_secs, 30);
        assert_eq!(config.partition, PartitionSelection::Last);
        assert_eq!(config.path_policy, PathPolicy::default());
    }

    #[test]
    fn test_full_json() {
        let json = r#"{
            "xor": 90,
            "aes": "30313233343536373839616263646566",
            "ffmpeg": "/opt/ffmpeg/bin",
            "transcode_timeout_secs": 5,
            "partition": "largest",
            "path_policy": { "talker_segment": "name", "date_format": "%Y" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.partition, PartitionSelection::Largest);
        assert_eq!(config.path_policy.talker_segment, TalkerSegment::Name);
        assert_eq!(config.path_policy.date_format, "%Y");
        assert_eq!(config.path_policy.attach_root, "msg/attach");
        assert_eq!(config.key_store().unwrap().cipher_key(), b"0123456789abcdef");
    }

    #[test]
    fn test_ascii_key() {
        let config = Config {
            aes: "0123456789abcdef".to_string(),
            ..Config::default()
        };
        assert_eq!(config.key_store().unwrap().cipher_key(), b"0123456789abcdef");
    }

    #[test]
    fn test_invalid_key() {
        let config = Config {
            aes: "zz".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.key_store(), Err(DecodeError::InvalidKey(_))));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("wxdat-config-{}.json", std::process::id()));
        let config = Config {
            xor: Some(0x12),
            aes: "0123456789abcdef".to_string(),
            partition: PartitionSelection::Largest,
            ..Config::default()
        };
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/config.json")),
            Err(DecodeError::Config(_))
        ));
    }
}
