//! 文件头签名表
//!
//! 用前导字节识别解码结果的媒体类型。表中的签名彼此互不为前缀,
//! 因此匹配顺序只在表被错误扩展时才有意义,此时以先匹配者为准。

use serde::Serialize;

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Jpeg,
    Png,
    Gif,
    Tiff,
    Bmp,
    /// 微信自有的 WXGF 封装,内嵌 HEVC 码流
    Wxgf,
    /// 未转码的 HEVC Annex-B 码流
    RawCodecStream,
    Unknown,
}

impl MediaKind {
    /// 输出文件扩展名
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Jpeg => "jpg",
            MediaKind::Png => "png",
            MediaKind::Gif => "gif",
            MediaKind::Tiff => "tiff",
            MediaKind::Bmp => "bmp",
            MediaKind::Wxgf => "wxgf",
            MediaKind::RawCodecStream => "h265",
            MediaKind::Unknown => "bin",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            MediaKind::Jpeg => "image/jpeg",
            MediaKind::Png => "image/png",
            MediaKind::Gif => "image/gif",
            MediaKind::Tiff => "image/tiff",
            MediaKind::Bmp => "image/bmp",
            MediaKind::RawCodecStream => "video/h265",
            MediaKind::Wxgf | MediaKind::Unknown => "application/octet-stream",
        }
    }

    /// 是否为可直接查看的图片
    pub fn is_image(self) -> bool {
        matches!(
            self,
            MediaKind::Jpeg | MediaKind::Png | MediaKind::Gif | MediaKind::Tiff | MediaKind::Bmp
        )
    }
}

/// 签名条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureEntry {
    pub pattern: &'static [u8],
    pub offset: usize,
    pub kind: MediaKind,
}

impl SignatureEntry {
    pub const fn new(pattern: &'static [u8], kind: MediaKind) -> Self {
        Self {
            pattern,
            offset: 0,
            kind,
        }
    }

    /// 签名覆盖的前缀长度
    pub fn span(&self) -> usize {
        self.offset + self.pattern.len()
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        data.get(self.offset..self.span())
            .map_or(false, |window| window == self.pattern)
    }

    /// 以 `key` 异或后是否匹配,不分配新缓冲区
    pub fn matches_xor(&self, data: &[u8], key: u8) -> bool {
        match data.get(self.offset..self.span()) {
            Some(window) => window
                .iter()
                .zip(self.pattern)
                .all(|(&b, &p)| b ^ key == p),
            None => false,
        }
    }
}

const STANDARD_ENTRIES: &[SignatureEntry] = &[
    SignatureEntry::new(b"\xFF\xD8\xFF", MediaKind::Jpeg),
    SignatureEntry::new(b"\x89PNG", MediaKind::Png),
    SignatureEntry::new(b"GIF8", MediaKind::Gif),
    SignatureEntry::new(b"II*\x00", MediaKind::Tiff),
    SignatureEntry::new(b"BM", MediaKind::Bmp),
    SignatureEntry::new(b"wxgf", MediaKind::Wxgf),
    SignatureEntry::new(b"\x00\x00\x00\x01", MediaKind::RawCodecStream),
];

/// 签名表,静态只读
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureRegistry {
    entries: &'static [SignatureEntry],
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl SignatureRegistry {
    pub const fn standard() -> Self {
        Self {
            entries: STANDARD_ENTRIES,
        }
    }

    pub const fn with_entries(entries: &'static [SignatureEntry]) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &'static [SignatureEntry] {
        self.entries
    }

    /// 识别数据类型,无匹配时返回 `MediaKind::Unknown`
    pub fn classify(&self, data: &[u8]) -> MediaKind {
        self.entries
            .iter()
            .find(|entry| entry.matches(data))
            .map_or(MediaKind::Unknown, |entry| entry.kind)
    }

    /// 可用于推断 XOR 密钥的签名
    ///
    /// 起始码只有 `00 00 00 01` 四个字节且三字节相同,任何以三个相同字节开头的数据
    /// 都能"匹配"某个密钥,所以不参与扫描。
    pub fn key_anchors(&self) -> impl Iterator<Item = &'static SignatureEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.kind != MediaKind::RawCodecStream)
    }

    /// 仅图片类签名,用于旧版逐文件 XOR 推断
    pub fn image_entries(&self) -> impl Iterator<Item = &'static SignatureEntry> {
        self.entries.iter().filter(|entry| entry.kind.is_image())
    }
}
