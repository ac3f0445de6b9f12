//! DAT v3 版本 (XOR) 解密模块

use super::signature::{MediaKind, SignatureRegistry};

/// v3 版本解密器
pub struct V3Decryptor;

impl V3Decryptor {
    /// XOR 解密
    pub fn xor_decrypt(data: &[u8], key: u8) -> Vec<u8> {
        data.iter().map(|&b| b ^ key).collect()
    }

    /// 从单个文件的前导字节推断 XOR 密钥
    ///
    /// 对每种图片签名取 `data[0] ^ sig[0]` 作为候选,整段签名都吻合才接受。
    /// 旧版客户端每个文件使用同一个字节异或,但不同账号的字节不同。
    pub fn infer_key(data: &[u8], registry: &SignatureRegistry) -> Option<(u8, MediaKind)> {
        registry.image_entries().find_map(|entry| {
            let candidate = data.get(entry.offset)? ^ entry.pattern.first()?;
            entry
                .matches_xor(data, candidate)
                .then_some((candidate, entry.kind))
        })
    }
}
