//! 目录批量处理
//!
//! 单个文件失败只记录下来,不会中断整个批次。

use crate::convert::DatConverter;
use crate::decrypt::{DatVersion, MediaKind, VersionDetector, XorKeyScanner};
use crate::error::{DecodeError, ErrorResponse, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// 每批同时提交的任务数
const CHUNK_SIZE: usize = 64;

/// 扫描 XOR 密钥时最多读取的缩略图数量
const MAX_KEY_SAMPLES: usize = 32;

/// 单个文件的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub kind: Option<MediaKind>,
    pub error: Option<ErrorResponse>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// WXGF 转码失败、保留原始码流的文件数
    pub raw_streams: usize,
}

impl BatchSummary {
    pub fn of(outcomes: &[BatchOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let raw_streams = outcomes
            .iter()
            .filter(|o| o.kind == Some(MediaKind::RawCodecStream))
            .count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            raw_streams,
        }
    }
}

fn is_dat(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("dat"))
}

fn is_thumbnail(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_lowercase().ends_with("_t.dat"))
}

/// 递归收集目录下的 `.dat` 文件,按路径排序
pub fn collect_dat_files(dir: &Path) -> Result<Vec<PathBuf>> {
    fn walk(dir: &Path, files: &mut Vec<PathBuf>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("无法读取目录 {}: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(_) => continue,
            };

            let path = entry.path();
            if file_type.is_dir() {
                walk(&path, files);
            } else if file_type.is_file() && is_dat(&path) {
                files.push(path);
            }
        }
    }

    if !dir.is_dir() {
        return Err(DecodeError::Io(format!("不是目录: {}", dir.display())));
    }

    let mut files = Vec::new();
    walk(dir, &mut files);
    files.sort();
    Ok(files)
}

/// 输出路径: 保留相对目录结构,扩展名由识别结果决定
fn output_path(input_dir: &Path, output_dir: &Path, input: &Path, extension: &str) -> PathBuf {
    let relative = input.strip_prefix(input_dir).unwrap_or(input);
    let mut output = output_dir.join(relative);
    output.set_extension(extension);
    output
}

fn convert_one(
    converter: &DatConverter,
    input_dir: &Path,
    output_dir: &Path,
    input: PathBuf,
) -> BatchOutcome {
    let result = converter.convert_file(&input).and_then(|media| {
        let output = output_path(input_dir, output_dir, &input, media.extension());
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&output, media.bytes())?;
        Ok((output, media.kind()))
    });

    match result {
        Ok((output, kind)) => BatchOutcome {
            input,
            output: Some(output),
            kind: Some(kind),
            error: None,
        },
        Err(e) => BatchOutcome {
            input,
            output: None,
            kind: None,
            error: Some(e.into()),
        },
    }
}

/// 批量转换目录
///
/// 每个文件在 `spawn_blocking` 中解码,结果与输入一一对应。
pub async fn convert_dir(
    converter: &DatConverter,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<BatchOutcome>> {
    let files = collect_dat_files(input_dir)?;
    log::info!("共找到 {} 个 .dat 文件", files.len());

    let mut outcomes = Vec::with_capacity(files.len());

    for chunk in files.chunks(CHUNK_SIZE) {
        let mut tasks = Vec::with_capacity(chunk.len());

        for input in chunk {
            let converter = converter.clone();
            let input_dir = input_dir.to_path_buf();
            let output_dir = output_dir.to_path_buf();
            let path = input.clone();

            let task = tokio::task::spawn_blocking(move || {
                convert_one(&converter, &input_dir, &output_dir, path)
            });
            tasks.push((input.clone(), task));
        }

        // 等待本批任务完成
        for (input, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("转换任务异常 {}: {}", input.display(), e);
                    BatchOutcome {
                        input,
                        output: None,
                        kind: None,
                        error: Some(ErrorResponse::new("TASK_FAILED", e.to_string())),
                    }
                }
            };
            outcomes.push(outcome);
        }
    }

    let summary = BatchSummary::of(&outcomes);
    log::info!(
        "批量转换完成: 成功 {},失败 {},原始码流 {}",
        summary.succeeded,
        summary.failed,
        summary.raw_streams
    );

    Ok(outcomes)
}

/// 从目录中的缩略图推断 XOR 密钥
///
/// 先用 v4 容器尾段扫描,找不到时再对旧版文件做前缀扫描。
pub fn scan_xor_key(dir: &Path) -> Result<u8> {
    let samples: Vec<Vec<u8>> = collect_dat_files(dir)?
        .into_iter()
        .filter(|path| is_thumbnail(path))
        .take(MAX_KEY_SAMPLES)
        .filter_map(|path| match fs::read(&path) {
            Ok(data) => Some(data),
            Err(e) => {
                log::warn!("读取样本失败 {}: {}", path.display(), e);
                None
            }
        })
        .collect();

    if samples.is_empty() {
        log::warn!("{} 中没有找到缩略图样本", dir.display());
        return Err(DecodeError::KeyNotFound);
    }

    let scanner = XorKeyScanner::default();
    if let Ok(key) = scanner.scan_container_tails(&samples) {
        log::info!("XOR 密钥: 0x{:02X}", key);
        return Ok(key);
    }

    let legacy: Vec<&[u8]> = samples
        .iter()
        .map(Vec::as_slice)
        .filter(|data| VersionDetector::detect(data) == DatVersion::V3)
        .collect();
    let key = scanner.scan(&legacy)?;
    log::info!("XOR 密钥: 0x{:02X}", key);
    Ok(key)
}
