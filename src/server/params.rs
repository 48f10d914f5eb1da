//! 查询参数的解析与各接口用到的常量表。

use rand::Rng;

use crate::credential::parse_int_str;
use crate::error::{EdgeError, Result};

/// 取整数参数，缺失、无法解析或为 0 时使用默认值。
pub fn int_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(parse_int_str)
        .filter(|n| *n != 0)
        .unwrap_or(default)
}

/// 解析必须为整数的 ID 参数。
pub fn numeric_id(name: &str, raw: &str) -> Result<i64> {
    parse_int_str(raw)
        .ok_or_else(|| EdgeError::InvalidInput(format!("Invalid parameter: {name}={raw}")))
}

/// 布尔开关参数，接受 `1` 或 `true`。
pub fn flag(raw: Option<&str>) -> bool {
    matches!(raw, Some("1" | "true"))
}

/// 非空的字符串参数。
pub fn non_empty(raw: Option<&String>) -> Option<&str> {
    raw.map(String::as_str).filter(|s| !s.is_empty())
}

/// 搜索类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Song,
    Singer,
    Album,
    Playlist,
    Mv,
    Lyric,
    User,
}

impl SearchType {
    /// 按名称或数字编码解析，无法识别时按歌曲搜索。
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "singer" | "1" => Self::Singer,
            "album" | "2" => Self::Album,
            "playlist" | "songlist" | "3" => Self::Playlist,
            "mv" | "4" => Self::Mv,
            "lyric" | "7" => Self::Lyric,
            "user" | "8" => Self::User,
            _ => Self::Song,
        }
    }

    /// 上游使用的 `search_type` 编码。
    pub const fn code(self) -> i64 {
        match self {
            Self::Song => 0,
            Self::Singer => 1,
            Self::Album => 2,
            Self::Playlist => 3,
            Self::Mv => 4,
            Self::Lyric => 7,
            Self::User => 8,
        }
    }

    /// 搜索结果在响应 `body` 中的字段名。
    pub const fn result_key(self) -> &'static str {
        match self {
            Self::Song | Self::Lyric => "item_song",
            Self::Singer => "singer",
            Self::Album => "item_album",
            Self::Playlist => "item_songlist",
            Self::Mv => "item_mv",
            Self::User => "item_user",
        }
    }
}

/// 音质对应的文件名前缀与扩展名。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SongFileType {
    pub prefix: &'static str,
    pub ext: &'static str,
}

impl SongFileType {
    const fn new(prefix: &'static str, ext: &'static str) -> Self {
        Self { prefix, ext }
    }

    /// 按音质名称取文件类型，无法识别时使用 128kbps MP3。
    pub fn from_quality(quality: &str) -> Self {
        match quality.to_ascii_lowercase().as_str() {
            "master" => Self::new("AI00", ".flac"),
            "atmos" | "atmos2" => Self::new("Q000", ".flac"),
            "atmos51" => Self::new("Q001", ".flac"),
            "flac" => Self::new("F000", ".flac"),
            "ogg640" => Self::new("O801", ".ogg"),
            "ogg320" => Self::new("O800", ".ogg"),
            "ogg192" => Self::new("O600", ".ogg"),
            "ogg96" => Self::new("O400", ".ogg"),
            "320" | "mp3_320" => Self::new("M800", ".mp3"),
            "aac192" => Self::new("C600", ".m4a"),
            "aac96" => Self::new("C400", ".m4a"),
            "aac48" => Self::new("C200", ".m4a"),
            _ => Self::new("M500", ".mp3"),
        }
    }

    pub fn filename(self, mid: &str) -> String {
        format!("{}{mid}{mid}{}", self.prefix, self.ext)
    }
}

/// 生成搜索请求的 `searchid`。
pub fn search_id() -> String {
    let mut rng = rand::thread_rng();
    let e: u64 = rng.gen_range(1..=20);
    let n: u64 = rng.gen_range(0..=4_194_304);
    let t = chrono::Utc::now().timestamp_millis().rem_euclid(86_400_000) as u64;
    (e * 18_014_398_509_481_984 + n * 4_294_967_296 + t).to_string()
}

/// 生成 32 位十六进制的随机 GUID。
pub fn guid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
