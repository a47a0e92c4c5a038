//! 内容指纹 - 用于检测文件变化

use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// 流式读取的块大小
const CHUNK_SIZE: usize = 8192;

/// 指纹长度（十六进制字符数），16 字节足够检测变化
const DIGEST_HEX_LEN: usize = 32;

/// 计算内存数据的 hash（使用 BLAKE3）
pub fn calculate_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex()[..DIGEST_HEX_LEN].to_string()
}

/// 分块流式计算文件 hash
///
/// 读取中途文件被删除或不可读时返回 IO 错误，不会产生半截指纹。
pub async fn compute_file_hash(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().to_hex()[..DIGEST_HEX_LEN].to_string())
}
