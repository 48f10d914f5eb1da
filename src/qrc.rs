//! QQ 音乐加密歌词（QRC）的编解码。
//!
//! **警告**：
//! 这里的 DES 并非标准实现，而是结构类似 DES 的私有分组密码，
//! 仅用于歌词解密，不应用于任何安全目的。
//!
//! ## 致谢
//!
//! - Brad Conte 的原始 DES 实现。
//! - `LyricDecoder` 项目针对 QQ 音乐的改编。
//!
//! - Copyright (c) `SuJiKiNen` (`LyricDecoder` Project)
//! - Licensed under the MIT License.

use std::io::{Read, Write};
use std::sync::LazyLock;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tracing::warn;

use crate::error::{EdgeError, Result};

/// 歌词解密接口。
pub trait LyricDecryptor: Send + Sync {
    /// 解密十六进制密文，返回歌词文本。
    fn decrypt(&self, encrypted_hex: &str) -> Result<String>;
}

/// QRC 编解码器。
#[derive(Debug, Clone, Copy, Default)]
pub struct QrcCodec;

impl QrcCodec {
    /// 加密明文歌词，返回小写十六进制密文。
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(plaintext.as_bytes())
            .map_err(|e| EdgeError::Internal(format!("zlib 压缩失败: {e}")))?;
        let mut data = encoder
            .finish()
            .map_err(|e| EdgeError::Internal(format!("zlib 压缩失败: {e}")))?;

        let padded_len = data.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        data.resize(padded_len, 0);

        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            CIPHER.encrypt_block(chunk);
        }
        Ok(hex::encode(data))
    }
}

impl LyricDecryptor for QrcCodec {
    fn decrypt(&self, encrypted_hex: &str) -> Result<String> {
        let mut data = hex::decode(encrypted_hex.trim())
            .map_err(|e| EdgeError::Decryption(format!("无效的十六进制字符串: {e}")))?;

        if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
            return Err(EdgeError::Decryption(format!(
                "加密数据长度不是{BLOCK_SIZE}的倍数"
            )));
        }

        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            CIPHER.decrypt_block(chunk);
        }

        let mut inflated = Vec::new();
        ZlibDecoder::new(data.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|e| EdgeError::Decryption(format!("zlib 解压失败: {e}")))?;

        let text = inflated.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&inflated);
        String::from_utf8(text.to_vec())
            .map_err(|e| EdgeError::Decryption(format!("UTF-8 转换错误: {e}")))
    }
}

/// 处理歌词响应中的一个字段。
///
/// 空字段为空字符串；以 `[` 开头的已是明文；其余视为密文。
/// 解密失败时返回空字符串，解密结果为空时保留原文。
pub fn decode_lyric_field(decryptor: &dyn LyricDecryptor, content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    if content.starts_with('[') {
        return content.to_string();
    }

    match decryptor.decrypt(content) {
        Ok(text) if text.is_empty() => content.to_string(),
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "歌词解密失败，按空内容处理");
            String::new()
        }
    }
}

const BLOCK_SIZE: usize = 8;

const KEY_1: &[u8; 8] = b"!@#)(*$%";
const KEY_2: &[u8; 8] = b"123ZXC!@";
const KEY_3: &[u8; 8] = b"!@#)(NHL";

static CIPHER: LazyLock<TripleDes> = LazyLock::new(TripleDes::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Encrypt,
    Decrypt,
}

type RoundKeys = [u64; 16];

/// 三重 DES：加密为 K1 加密、K2 解密、K3 加密，解密反之。
struct TripleDes {
    encrypt: [RoundKeys; 3],
    decrypt: [RoundKeys; 3],
}

impl TripleDes {
    fn new() -> Self {
        Self {
            encrypt: [
                round_keys(KEY_1, Mode::Encrypt),
                round_keys(KEY_2, Mode::Decrypt),
                round_keys(KEY_3, Mode::Encrypt),
            ],
            decrypt: [
                round_keys(KEY_3, Mode::Decrypt),
                round_keys(KEY_2, Mode::Encrypt),
                round_keys(KEY_1, Mode::Decrypt),
            ],
        }
    }

    fn encrypt_block(&self, chunk: &mut [u8]) {
        Self::apply(&self.encrypt, chunk);
    }

    fn decrypt_block(&self, chunk: &mut [u8]) {
        Self::apply(&self.decrypt, chunk);
    }

    fn apply(stages: &[RoundKeys; 3], chunk: &mut [u8]) {
        let mut bytes = [0u8; BLOCK_SIZE];
        bytes.copy_from_slice(chunk);
        let block = stages
            .iter()
            .fold(u64::from_be_bytes(bytes), |block, keys| crypt_block(block, keys));
        chunk.copy_from_slice(&block.to_be_bytes());
    }
}

const KEY_SHIFTS: [u32; 16] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];

// 密钥置换表，取值为 0 起始的位序号（0 为最高位）。
const PC1_C: [u8; 28] = [
    56, 48, 40, 32, 24, 16, 8, 0, 57, 49, 41, 33, 25, 17, 9, 1, 58, 50, 42, 34, 26, 18, 10, 2, 59,
    51, 43, 35,
];
const PC1_D: [u8; 28] = [
    62, 54, 46, 38, 30, 22, 14, 6, 61, 53, 45, 37, 29, 21, 13, 5, 60, 52, 44, 36, 28, 20, 12, 4, 27,
    19, 11, 3,
];
const PC2: [u8; 48] = [
    13, 16, 10, 23, 0, 4, 2, 27, 14, 5, 20, 9, 22, 18, 11, 3, 25, 7, 15, 6, 26, 19, 12, 1, 40, 51,
    30, 36, 46, 54, 29, 39, 50, 44, 32, 47, 43, 48, 38, 55, 33, 52, 45, 41, 49, 35, 28, 31,
];

// 以下置换表取值为 1 起始的位序号。
const E_BOX: [u8; 48] = [
    32, 1, 2, 3, 4, 5, 4, 5, 6, 7, 8, 9, 8, 9, 10, 11, 12, 13, 12, 13, 14, 15, 16, 17, 16, 17, 18,
    19, 20, 21, 20, 21, 22, 23, 24, 25, 24, 25, 26, 27, 28, 29, 28, 29, 30, 31, 32, 1,
];
const P_BOX: [u8; 32] = [
    16, 7, 20, 21, 29, 12, 28, 17, 1, 15, 23, 26, 5, 18, 31, 10, 2, 8, 24, 14, 32, 27, 3, 9, 19, 13,
    30, 6, 22, 11, 4, 25,
];
const IP: [u8; 64] = [
    34, 42, 50, 58, 2, 10, 18, 26, 36, 44, 52, 60, 4, 12, 20, 28, 38, 46, 54, 62, 6, 14, 22, 30, 40,
    48, 56, 64, 8, 16, 24, 32, 33, 41, 49, 57, 1, 9, 17, 25, 35, 43, 51, 59, 3, 11, 19, 27, 37, 45,
    53, 61, 5, 13, 21, 29, 39, 47, 55, 63, 7, 15, 23, 31,
];
const INV_IP: [u8; 64] = [
    37, 5, 45, 13, 53, 21, 61, 29, 38, 6, 46, 14, 54, 22, 62, 30, 39, 7, 47, 15, 55, 23, 63, 31, 40,
    8, 48, 16, 56, 24, 64, 32, 33, 1, 41, 9, 49, 17, 57, 25, 34, 2, 42, 10, 50, 18, 58, 26, 35, 3,
    43, 11, 51, 19, 59, 27, 36, 4, 44, 12, 52, 20, 60, 28,
];

#[rustfmt::skip]
const S_BOXES: [[u8; 64]; 8] = [
    [14, 4, 13, 1, 2, 15, 11, 8, 3, 10, 6, 12, 5, 9, 0, 7, 0, 15, 7, 4, 14, 2, 13, 1, 10, 6, 12, 11, 9, 5, 3, 8,
     4, 1, 14, 8, 13, 6, 2, 11, 15, 12, 9, 7, 3, 10, 5, 0, 15, 12, 8, 2, 4, 9, 1, 7, 5, 11, 3, 14, 10, 0, 6, 13],
    [15, 1, 8, 14, 6, 11, 3, 4, 9, 7, 2, 13, 12, 0, 5, 10, 3, 13, 4, 7, 15, 2, 8, 15, 12, 0, 1, 10, 6, 9, 11, 5,
     0, 14, 7, 11, 10, 4, 13, 1, 5, 8, 12, 6, 9, 3, 2, 15, 13, 8, 10, 1, 3, 15, 4, 2, 11, 6, 7, 12, 0, 5, 14, 9],
    [10, 0, 9, 14, 6, 3, 15, 5, 1, 13, 12, 7, 11, 4, 2, 8, 13, 7, 0, 9, 3, 4, 6, 10, 2, 8, 5, 14, 12, 11, 15, 1,
     13, 6, 4, 9, 8, 15, 3, 0, 11, 1, 2, 12, 5, 10, 14, 7, 1, 10, 13, 0, 6, 9, 8, 7, 4, 15, 14, 3, 11, 5, 2, 12],
    [7, 13, 14, 3, 0, 6, 9, 10, 1, 2, 8, 5, 11, 12, 4, 15, 13, 8, 11, 5, 6, 15, 0, 3, 4, 7, 2, 12, 1, 10, 14, 9,
     10, 6, 9, 0, 12, 11, 7, 13, 15, 1, 3, 14, 5, 2, 8, 4, 3, 15, 0, 6, 10, 10, 13, 8, 9, 4, 5, 11, 12, 7, 2, 14],
    [2, 12, 4, 1, 7, 10, 11, 6, 8, 5, 3, 15, 13, 0, 14, 9, 14, 11, 2, 12, 4, 7, 13, 1, 5, 0, 15, 10, 3, 9, 8, 6,
     4, 2, 1, 11, 10, 13, 7, 8, 15, 9, 12, 5, 6, 3, 0, 14, 11, 8, 12, 7, 1, 14, 2, 13, 6, 15, 0, 9, 10, 4, 5, 3],
    [12, 1, 10, 15, 9, 2, 6, 8, 0, 13, 3, 4, 14, 7, 5, 11, 10, 15, 4, 2, 7, 12, 9, 5, 6, 1, 13, 14, 0, 11, 3, 8,
     9, 14, 15, 5, 2, 8, 12, 3, 7, 0, 4, 10, 1, 13, 11, 6, 4, 3, 2, 12, 9, 5, 15, 10, 11, 14, 1, 7, 6, 0, 8, 13],
    [4, 11, 2, 14, 15, 0, 8, 13, 3, 12, 9, 7, 5, 10, 6, 1, 13, 0, 11, 7, 4, 9, 1, 10, 14, 3, 5, 12, 2, 15, 8, 6,
     1, 4, 11, 13, 12, 3, 7, 14, 10, 15, 6, 8, 0, 5, 9, 2, 6, 11, 13, 8, 1, 4, 10, 7, 9, 5, 0, 15, 14, 2, 3, 12],
    [13, 2, 8, 4, 6, 15, 11, 1, 10, 9, 3, 14, 5, 0, 12, 7, 1, 15, 13, 8, 10, 3, 7, 4, 12, 5, 6, 11, 0, 14, 9, 2,
     7, 11, 4, 1, 9, 12, 14, 2, 0, 6, 10, 13, 15, 3, 5, 8, 2, 1, 14, 7, 4, 10, 8, 13, 15, 12, 9, 0, 3, 5, 6, 11],
];

/// 生成 16 个 48 位轮密钥，解密模式下顺序相反。
fn round_keys(key: &[u8; 8], mode: Mode) -> RoundKeys {
    // 密钥按两个小端序 32 位字读取
    let high = u32::from_le_bytes([key[0], key[1], key[2], key[3]]);
    let low = u32::from_le_bytes([key[4], key[5], key[6], key[7]]);
    let key64 = (u64::from(high) << 32) | u64::from(low);

    let select = |table: &[u8; 28]| -> u32 {
        table.iter().enumerate().fold(0u32, |acc, (i, &pos)| {
            acc | (((key64 >> (63 - pos)) & 1) as u32) << (27 - i)
        })
    };
    // 两半各占 u32 的高 28 位
    let mut c = select(&PC1_C) << 4;
    let mut d = select(&PC1_D) << 4;

    let mut keys = [0u64; 16];
    for (round, &shift) in KEY_SHIFTS.iter().enumerate() {
        c = rotate_half(c, shift);
        d = rotate_half(d, shift);

        let sub_key = PC2.iter().enumerate().fold(0u64, |acc, (i, &pos)| {
            let bit = if pos < 28 {
                (c >> (31 - pos)) & 1
            } else {
                (d >> (31 - (pos - 27))) & 1
            };
            acc | u64::from(bit) << (47 - i)
        });

        let slot = match mode {
            Mode::Encrypt => round,
            Mode::Decrypt => 15 - round,
        };
        keys[slot] = sub_key;
    }
    keys
}

const fn rotate_half(half: u32, shift: u32) -> u32 {
    ((half << shift) | (half >> (28 - shift))) & 0xFFFF_FFF0
}

fn permute64(input: u64, table: &[u8; 64]) -> u64 {
    table.iter().enumerate().fold(0u64, |acc, (i, &src)| {
        acc | ((input >> (64 - u32::from(src))) & 1) << (63 - i)
    })
}

fn feistel(half: u32, round_key: u64) -> u32 {
    let expanded = E_BOX.iter().enumerate().fold(0u64, |acc, (i, &src)| {
        acc | u64::from((half >> (32 - u32::from(src))) & 1) << (47 - i)
    });
    let mixed = expanded ^ round_key;

    let substituted = S_BOXES.iter().enumerate().fold(0u32, |acc, (j, sbox)| {
        let chunk = ((mixed >> (42 - 6 * j)) & 0x3F) as usize;
        // 行号取最高位与最低位，但最低位被放到第二位上
        let index = (chunk & 0x20) | ((chunk & 0x1F) >> 1) | ((chunk & 0x01) << 4);
        acc | u32::from(sbox[index]) << (28 - 4 * j)
    });

    P_BOX.iter().enumerate().fold(0u32, |acc, (i, &src)| {
        acc | ((substituted >> (32 - u32::from(src))) & 1) << (31 - i)
    })
}

fn crypt_block(block: u64, keys: &RoundKeys) -> u64 {
    let permuted = permute64(block, &IP);
    let mut left = (permuted >> 32) as u32;
    let mut right = permuted as u32;

    for &round_key in &keys[..15] {
        (left, right) = (right, left ^ feistel(right, round_key));
    }
    left ^= feistel(right, keys[15]);

    permute64((u64::from(left) << 32) | u64::from(right), &INV_IP)
}
