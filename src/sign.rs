//! QQ音乐请求签名算法的实现

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_ENGINE};
use sha1::{Digest, Sha1};

use crate::envelope::Envelope;
use crate::error::Result;

/// 第一段取样位置。40 超出摘要的十六进制长度，取样时被跳过。
const PART_1_INDEXES: [usize; 8] = [23, 14, 6, 36, 16, 40, 7, 19];
const PART_2_INDEXES: [usize; 8] = [16, 1, 32, 12, 19, 27, 8, 5];
const SCRAMBLE_VALUES: [u8; 20] = [
    89, 39, 179, 150, 218, 82, 58, 252, 177, 52, 186, 123, 120, 64, 242, 133, 143, 161, 121, 179,
];

/// 计算请求体的签名。
///
/// 签名只取决于传入的字节，调用方必须对发送出去的同一份字节签名。
#[must_use]
pub fn sign(payload: &[u8]) -> String {
    let digest = Sha1::digest(payload);
    let hash_hex = hex::encode_upper(digest);
    let hash_bytes = hash_hex.as_bytes();

    let pick = |indexes: &[usize]| -> String {
        indexes
            .iter()
            .filter_map(|&i| hash_bytes.get(i).map(|&b| char::from(b)))
            .collect()
    };
    let part1 = pick(&PART_1_INDEXES);
    let part2 = pick(&PART_2_INDEXES);

    let scrambled: Vec<u8> = digest
        .iter()
        .zip(SCRAMBLE_VALUES)
        .map(|(&byte, mask)| byte ^ mask)
        .collect();
    let block = BASE64_ENGINE
        .encode(scrambled)
        .replace(['\\', '/', '+', '='], "");

    format!("zzc{part1}{block}{part2}").to_lowercase()
}

/// 序列化信封并返回签名，便于调试。
pub fn sign_envelope(envelope: &Envelope) -> Result<String> {
    Ok(sign(&serde_json::to_vec(envelope)?))
}
