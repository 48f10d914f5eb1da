//! `/api/*` 各接口的处理函数。

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::AppState;
use super::error::error_response;
use super::params::{self, SearchType, SongFileType};
use crate::envelope::{CommonParams, Envelope, ModuleCall};
use crate::error::{EdgeError, Result};
use crate::qrc::decode_lyric_field;

const STREAM_DOMAIN: &str = "https://isure.stream.qqmusic.qq.com/";
const MAX_URL_MIDS: usize = 100;
const CLIENT_VERSION: i64 = 13_020_508;

type ApiResult = Result<Json<Value>>;

fn ok(data: Value) -> Json<Value> {
    Json(json!({"code": 0, "data": data}))
}

fn missing(name: &str) -> EdgeError {
    EdgeError::InvalidInput(format!("Missing required parameter: {name}"))
}

/// 仅含 `mid`/`id` 的查询参数。
#[derive(Debug, Default, Deserialize)]
pub struct MidOrId {
    mid: Option<String>,
    id: Option<String>,
}

impl MidOrId {
    fn mid(&self) -> Option<&str> {
        params::non_empty(self.mid.as_ref())
    }

    fn id(&self) -> Option<&str> {
        params::non_empty(self.id.as_ref())
    }
}

#[instrument(skip_all)]
pub async fn credential(State(state): State<AppState>) -> Result<Response> {
    if !state.expose_credential {
        return Ok(error_response(
            StatusCode::FORBIDDEN,
            "Credential export is disabled",
        ));
    }

    match state.core.credential().await? {
        Some(credential) => Ok(Json(json!({ "credential": credential })).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "No credential found. Please set INITIAL_CREDENTIAL secret.",
                "credential": null,
            })),
        )
            .into_response()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    keyword: Option<String>,
    q: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    num: Option<String>,
    page: Option<String>,
    highlight: Option<String>,
}

#[instrument(skip_all)]
pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult {
    let keyword = params::non_empty(query.keyword.as_ref())
        .or_else(|| params::non_empty(query.q.as_ref()))
        .ok_or_else(|| missing("keyword"))?;
    let kind = params::non_empty(query.kind.as_ref()).unwrap_or("song");
    let num = params::int_or(query.num.as_deref(), 10);
    let page = params::int_or(query.page.as_deref(), 1);
    let highlight = query.highlight.as_deref() != Some("false");
    let search_type = SearchType::parse(kind);

    debug!(keyword, kind, num, page, "搜索");

    let credential = state.core.credential().await?;
    let data = state
        .core
        .call(
            "music.search.SearchCgiService",
            "DoSearchForQQMusicMobile",
            json!({
                "searchid": params::search_id(),
                "query": keyword,
                "search_type": search_type.code(),
                "num_per_page": num,
                "page_num": page,
                "highlight": i64::from(highlight),
                "grp": 1,
            }),
            credential.as_ref(),
        )
        .await?;

    let list = data
        .get("body")
        .and_then(|body| body.get(search_type.result_key()))
        .filter(|items| !items.is_null())
        .cloned()
        .unwrap_or_else(|| json!([]));
    let total = data
        .get("meta")
        .and_then(|meta| meta.get("sum"))
        .and_then(Value::as_i64)
        .filter(|sum| *sum != 0)
        .unwrap_or_else(|| list.as_array().map_or(0, |items| items.len() as i64));

    Ok(ok(json!({
        "keyword": keyword,
        "type": kind,
        "page": page,
        "num": num,
        "total": total,
        "list": list,
    })))
}

#[instrument(skip_all)]
pub async fn song_detail(State(state): State<AppState>, Query(query): Query<MidOrId>) -> ApiResult {
    let param = match (query.mid(), query.id()) {
        (Some(mid), _) => json!({"song_mid": mid}),
        (None, Some(id)) => json!({"song_id": params::numeric_id("id", id)?}),
        (None, None) => return Err(missing("mid or id")),
    };

    let credential = state.core.credential().await?;
    let data = state
        .core
        .call(
            "music.pf_song_detail_svr",
            "get_song_detail_yqq",
            param,
            credential.as_ref(),
        )
        .await?;
    Ok(ok(data))
}

#[derive(Debug, Default, Deserialize)]
pub struct SongUrlQuery {
    mid: Option<String>,
    quality: Option<String>,
}

#[instrument(skip_all)]
pub async fn song_url(State(state): State<AppState>, Query(query): Query<SongUrlQuery>) -> ApiResult {
    let raw_mids = params::non_empty(query.mid.as_ref()).ok_or_else(|| missing("mid"))?;
    let quality = params::non_empty(query.quality.as_ref()).unwrap_or("128");

    let mids: Vec<&str> = raw_mids
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .collect();
    if mids.is_empty() {
        return Err(EdgeError::InvalidInput("Invalid mid parameter".to_string()));
    }
    if mids.len() > MAX_URL_MIDS {
        return Err(EdgeError::InvalidInput(format!(
            "Too many mids: at most {MAX_URL_MIDS} per request"
        )));
    }

    let file_type = SongFileType::from_quality(quality);
    let credential = state.core.credential().await?;

    let filenames: Vec<String> = mids.iter().map(|mid| file_type.filename(mid)).collect();
    let call = ModuleCall::new(
        "music.vkey.GetVkey",
        "UrlGetVkey",
        json!({
            "filename": filenames,
            "guid": params::guid(),
            "songmid": &mids,
            "songtype": vec![0; mids.len()],
        }),
    );
    let envelope =
        Envelope::new(CommonParams::streaming(credential.as_ref())).with_call(call);

    let data = state
        .core
        .dispatch(&envelope, credential.as_ref())
        .await?
        .into_value();

    let mut urls = Map::new();
    let infos = data
        .get("midurlinfo")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for info in infos {
        let Some(songmid) = info.get("songmid").and_then(Value::as_str) else {
            continue;
        };
        let purl = ["purl", "wifiurl"]
            .iter()
            .filter_map(|field| info.get(*field).and_then(Value::as_str))
            .find(|url| !url.is_empty());
        let url = purl.map_or_else(String::new, |p| format!("{STREAM_DOMAIN}{p}"));
        urls.insert(songmid.to_string(), Value::String(url));
    }

    Ok(Json(json!({
        "code": 0,
        "data": urls,
        "quality": quality,
    })))
}

#[instrument(skip_all)]
pub async fn album(State(state): State<AppState>, Query(query): Query<MidOrId>) -> ApiResult {
    let param = match (query.mid(), query.id()) {
        (Some(mid), _) => json!({"albumMid": mid}),
        (None, Some(id)) => json!({"albumId": params::numeric_id("id", id)?}),
        (None, None) => return Err(missing("mid or id")),
    };

    let credential = state.core.credential().await?;
    let data = state
        .core
        .call(
            "music.musichallAlbum.AlbumInfoServer",
            "GetAlbumDetail",
            param,
            credential.as_ref(),
        )
        .await?;
    Ok(ok(data))
}

#[instrument(skip_all)]
pub async fn singer(State(state): State<AppState>, Query(query): Query<MidOrId>) -> ApiResult {
    let param = match (query.mid(), query.id()) {
        (Some(mid), _) => json!({"singer_mids": [mid]}),
        (None, Some(id)) => json!({"singer_ids": [params::numeric_id("id", id)?]}),
        (None, None) => return Err(missing("mid or id")),
    };

    let credential = state.core.credential().await?;
    let data = state
        .core
        .call(
            "music.musichallSinger.SingerInfoInter",
            "GetSingerDetail",
            param,
            credential.as_ref(),
        )
        .await?;
    Ok(ok(data))
}

#[derive(Debug, Default, Deserialize)]
pub struct IdNumQuery {
    id: Option<String>,
    num: Option<String>,
}

#[instrument(skip_all)]
pub async fn playlist(State(state): State<AppState>, Query(query): Query<IdNumQuery>) -> ApiResult {
    let id = params::non_empty(query.id.as_ref()).ok_or_else(|| missing("id"))?;
    let disstid = params::numeric_id("id", id)?;
    let num = params::int_or(query.num.as_deref(), 100);

    let credential = state.core.credential().await?;
    let data = state
        .core
        .call(
            "music.srfDissInfo.DissInfo",
            "CgiGetDiss",
            json!({"disstid": disstid, "song_num": num}),
            credential.as_ref(),
        )
        .await?;
    Ok(ok(data))
}

#[instrument(skip_all)]
pub async fn top(State(state): State<AppState>, Query(query): Query<IdNumQuery>) -> ApiResult {
    const MODULE: &str = "music.musichallToplist.ToplistInfoServer";

    let (method, param) = match params::non_empty(query.id.as_ref()) {
        Some(id) => (
            "GetDetail",
            json!({
                "topId": params::numeric_id("id", id)?,
                "offset": 0,
                "num": params::int_or(query.num.as_deref(), 100),
            }),
        ),
        None => ("GetAll", json!({})),
    };

    let credential = state.core.credential().await?;
    let data = state
        .core
        .call(MODULE, method, param, credential.as_ref())
        .await?;
    Ok(ok(data))
}

#[derive(Debug, Default, Deserialize)]
pub struct LyricQuery {
    mid: Option<String>,
    id: Option<String>,
    qrc: Option<String>,
    trans: Option<String>,
    roma: Option<String>,
}

#[instrument(skip_all)]
pub async fn lyric(State(state): State<AppState>, Query(query): Query<LyricQuery>) -> ApiResult {
    let mid = params::non_empty(query.mid.as_ref());
    let id = params::non_empty(query.id.as_ref());

    let switch = |raw: &Option<String>| i64::from(params::flag(raw.as_deref()));
    let mut param = json!({
        "crypt": 1,
        "ct": 11,
        "cv": CLIENT_VERSION,
        "lrc_t": 0,
        "qrc": switch(&query.qrc),
        "qrc_t": 0,
        "roma": switch(&query.roma),
        "roma_t": 0,
        "trans": switch(&query.trans),
        "trans_t": 0,
        "type": 1,
    });
    match (id, mid) {
        (Some(id), _) => param["songId"] = json!(params::numeric_id("id", id)?),
        (None, Some(mid)) => param["songMid"] = json!(mid),
        (None, None) => return Err(missing("mid or id")),
    }

    let credential = state.core.credential().await?;
    let data = state
        .core
        .call(
            "music.musichallSong.PlayLyricInfo",
            "GetPlayLyricInfo",
            param,
            credential.as_ref(),
        )
        .await?;

    let decryptor = state.decryptor.as_ref();
    let field = |name: &str| {
        let content = data.get(name).and_then(Value::as_str).unwrap_or_default();
        decode_lyric_field(decryptor, content)
    };

    let mut result = json!({
        "mid": mid.unwrap_or_default(),
        "id": id.unwrap_or_default(),
        "lyric": field("lyric"),
        "trans": field("trans"),
        "roma": field("roma"),
    });
    if data
        .get("qrc")
        .and_then(Value::as_str)
        .is_some_and(|qrc| !qrc.is_empty())
    {
        result["qrc"] = json!(field("qrc"));
    }

    Ok(ok(result))
}
