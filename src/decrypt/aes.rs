//! AES 解密模块

use crate::error::{DecodeError, Result};

#[allow(deprecated)]
use aes::cipher::{generic_array::GenericArray, BlockDecrypt, KeyInit};
use aes::Aes128;

/// AES 解密处理器
///
/// v4 容器只使用 ECB 模式,没有初始向量,也没有块间链接。
pub struct AesHandler;

impl AesHandler {
    pub const BLOCK_SIZE: usize = 16;

    /// 按块解密,合法的 PKCS7 填充会被去除
    #[allow(deprecated)]
    pub fn decrypt_ecb(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes128::new_from_slice(key)
            .map_err(|_| DecodeError::InvalidKey("AES 密钥必须为 16 字节".to_string()))?;

        if data.len() % Self::BLOCK_SIZE != 0 {
            return Err(DecodeError::MalformedContainer(format!(
                "AES 数据长度 {} 不是 {} 的整数倍",
                data.len(),
                Self::BLOCK_SIZE
            )));
        }

        let mut result = data.to_vec();

        for chunk in result.chunks_exact_mut(Self::BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(chunk);
            cipher.decrypt_block(block);
        }

        // 填充无效时保留原样,调用方会按头部记录的长度截断
        if let Err(e) = Self::pkcs7_unpad(&mut result) {
            log::debug!("跳过 PKCS7 去填充: {}", e);
        }

        Ok(result)
    }

    pub fn pkcs7_unpad(data: &mut Vec<u8>) -> Result<()> {
        let Some(&last) = data.last() else {
            return Err(DecodeError::CorruptStream("数据为空".to_string()));
        };

        let padding_len = last as usize;

        if padding_len == 0 || padding_len > Self::BLOCK_SIZE || padding_len > data.len() {
            return Err(DecodeError::CorruptStream("无效的填充".to_string()));
        }

        let start = data.len() - padding_len;
        if !data[start..].iter().all(|&b| b == last) {
            return Err(DecodeError::CorruptStream("填充验证失败".to_string()));
        }

        data.truncate(start);
        Ok(())
    }

    /// 头部记录的明文长度对应的密文长度,总是多出一个填充块或补齐到整块
    pub fn align_size(size: usize) -> usize {
        size + (Self::BLOCK_SIZE - size % Self::BLOCK_SIZE)
    }
}
