//! HEVC 码流转码
//!
//! 该模块把 WXGF 中提取出的 HEVC 码流交给外部工具转换为标准图片格式(JPEG/GIF)。
//! 核心逻辑只依赖 [`Transcoder`] trait,具体实现由调用方注入。

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// 支持的目标图片格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Gif,
}

impl FromStr for ImageFormat {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "gif" => Ok(ImageFormat::Gif),
            other => Err(TranscodeError::Unsupported(format!("目标格式 {}", other))),
        }
    }
}

/// 转码错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    #[error("转码工具不存在: {0}")]
    NotFound(String),

    #[error("启动转码工具失败: {0}")]
    Spawn(String),

    #[error("转码工具退出码异常: {code:?}, {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("转码输出为空")]
    EmptyOutput,

    #[error("转码超时 ({0:?})")]
    Timeout(Duration),

    #[error("不支持的输入: {0}")]
    Unsupported(String),
}

/// 转码器
pub trait Transcoder: Send + Sync {
    /// 将 HEVC 码流转换为 `format` 格式的图片
    fn transcode(&self, stream: &[u8], format: ImageFormat) -> Result<Vec<u8>, TranscodeError>;
}

/// 不做任何转码,总是失败,提取器会退回原始码流
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTranscoder;

impl Transcoder for DisabledTranscoder {
    fn transcode(&self, _stream: &[u8], _format: ImageFormat) -> Result<Vec<u8>, TranscodeError> {
        Err(TranscodeError::Unsupported("转码已禁用".to_string()))
    }
}

/// 基于 ffmpeg 子进程的转码器
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    /// 环境变量,可以指向可执行文件或其所在目录
    pub const ENV_FFMPEG_PATH: &'static str = "FFMPEG_PATH";

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// stderr 只保留前若干字节用于报错
    const STDERR_LIMIT: usize = 200;

    const POLL_INTERVAL: Duration = Duration::from_millis(10);

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// 按 `FFMPEG_PATH` 定位 ffmpeg,未设置时使用 PATH 中的 `ffmpeg`
    pub fn from_env() -> Self {
        match std::env::var_os(Self::ENV_FFMPEG_PATH) {
            Some(path) => Self::new(Self::resolve_program(PathBuf::from(path))),
            None => Self::new("ffmpeg"),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 目录则拼接可执行文件名
    pub fn resolve_program(path: PathBuf) -> PathBuf {
        if path.is_dir() {
            let exe = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
            path.join(exe)
        } else {
            path
        }
    }

    fn args(format: ImageFormat) -> &'static [&'static str] {
        match format {
            ImageFormat::Jpeg => &[
                "-i", "-", "-vframes", "1", "-c:v", "mjpeg", "-q:v", "4", "-f", "image2", "-",
            ],
            ImageFormat::Gif => &["-i", "-", "-f", "gif", "-"],
        }
    }

    fn spawn(&self, format: ImageFormat) -> Result<Child, TranscodeError> {
        Command::new(&self.program)
            .args(Self::args(format))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    TranscodeError::NotFound(self.program.display().to_string())
                }
                _ => TranscodeError::Spawn(e.to_string()),
            })
    }

    fn kill(child: &mut Child) {
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, stream: &[u8], format: ImageFormat) -> Result<Vec<u8>, TranscodeError> {
        if stream.is_empty() {
            return Err(TranscodeError::Unsupported("输入码流为空".to_string()));
        }

        let mut child = self.spawn(format)?;

        log::debug!(
            "开始转码 HEVC 码流,大小: {} 字节,格式: {:?}",
            stream.len(),
            format
        );

        let (Some(mut stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            Self::kill(&mut child);
            return Err(TranscodeError::Spawn("无法获取子进程管道".to_string()));
        };

        // 三个管道分别由独立线程处理,避免任何一方缓冲区写满导致死锁
        let input = stream.to_vec();
        let writer = thread::spawn(move || {
            let _ = stdin.write_all(&input);
        });
        let stdout_reader = thread::spawn(move || {
            let mut out = Vec::new();
            stdout.read_to_end(&mut out).map(|_| out)
        });
        let stderr_reader = thread::spawn(move || {
            let mut err = Vec::new();
            let _ = stderr.read_to_end(&mut err);
            err
        });

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() > self.timeout => {
                    Self::kill(&mut child);
                    return Err(TranscodeError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(Self::POLL_INTERVAL),
                Err(e) => {
                    Self::kill(&mut child);
                    return Err(TranscodeError::Spawn(e.to_string()));
                }
            }
        };

        let _ = writer.join();
        let stdout = stdout_reader
            .join()
            .map_err(|_| TranscodeError::Spawn("读取输出线程异常".to_string()))?
            .map_err(|e| TranscodeError::Spawn(e.to_string()))?;
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            let end = stderr.len().min(Self::STDERR_LIMIT);
            return Err(TranscodeError::NonZeroExit {
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr[..end]).into_owned(),
            });
        }

        if stdout.is_empty() {
            return Err(TranscodeError::EmptyOutput);
        }

        log::debug!("转码成功,输出大小: {} 字节", stdout.len());

        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_str() {
        assert_eq!("jpeg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!("JPG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!("gif".parse::<ImageFormat>().unwrap(), ImageFormat::Gif);
        assert!(matches!(
            "webp".parse::<ImageFormat>(),
            Err(TranscodeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_missing_program() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/definitely-not-ffmpeg");
        let err = transcoder
            .transcode(b"\x00\x00\x00\x01\x40\x01", ImageFormat::Jpeg)
            .unwrap_err();
        assert!(matches!(err, TranscodeError::NotFound(_)));
    }

    #[test]
    fn test_empty_input() {
        let transcoder = FfmpegTranscoder::new("ffmpeg");
        let err = transcoder.transcode(&[], ImageFormat::Jpeg).unwrap_err();
        assert!(matches!(err, TranscodeError::Unsupported(_)));
    }

    #[test]
    fn test_disabled() {
        let err = DisabledTranscoder
            .transcode(b"\x00\x00\x00\x01", ImageFormat::Gif)
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Unsupported(_)));
    }

    /// 写一个只会睡眠的假 ffmpeg
    #[cfg(unix)]
    fn sleeping_program(name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("wxdat-{}-{}.sh", name, std::process::id()));
        std::fs::write(&path, "#!/bin/sh\nexec sleep 5\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let program = sleeping_program("timeout");
        let transcoder = FfmpegTranscoder::new(&program).with_timeout(Duration::from_millis(100));

        let start = Instant::now();
        let err = transcoder
            .transcode(b"\x00\x00\x00\x01\x40\x01", ImageFormat::Jpeg)
            .unwrap_err();
        let _ = std::fs::remove_file(&program);

        assert_eq!(err, TranscodeError::Timeout(Duration::from_millis(100)));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_falls_back_to_raw_stream() {
        use crate::decrypt::{DecodedMedia, MediaKind};
        use crate::wxgf::tests::{build_wxgf, hevc};
        use crate::wxgf::WxgfExtractor;

        let program = sleeping_program("extract");
        let transcoder = FfmpegTranscoder::new(&program).with_timeout(Duration::from_millis(100));
        let stream = hevc(48, 0x3E);
        let media = DecodedMedia::new(build_wxgf(&[&stream]), MediaKind::Wxgf).unwrap();

        let out = WxgfExtractor::default().extract(&media, &transcoder).unwrap();
        let _ = std::fs::remove_file(&program);

        assert_eq!(out.kind(), MediaKind::RawCodecStream);
        assert_eq!(out.bytes(), stream.as_slice());
    }

    #[test]
    fn test_resolve_program_keeps_file_path() {
        let path = PathBuf::from("/nonexistent/bin/ffmpeg");
        assert_eq!(FfmpegTranscoder::resolve_program(path.clone()), path);
    }
}
