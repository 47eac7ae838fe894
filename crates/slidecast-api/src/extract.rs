//! `/convert` request extraction.
//!
//! The conversion endpoint accepts either multipart form data (binary `image`
//! and `audio` parts plus text fields) or a JSON / urlencoded body. Field
//! names have accumulated aliases across clients; each field is resolved by a
//! single normalization pass over an explicit, ordered alias list.

use std::path::PathBuf;

use axum::extract::{FromRequest, Multipart, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::Uri;
use axum::Form;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use slidecast_models::RawCaption;

use crate::assets::unique_token;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Accepted aliases per field, in precedence order.
pub const IMAGE_URL_ALIASES: [&str; 3] = ["imageUrl", "image_url", "image"];
pub const AUDIO_URL_ALIASES: [&str; 3] = ["audioUrl", "audio_url", "audio"];
pub const CAPTIONS_ALIASES: [&str; 3] = ["captions", "captionsJson", "captionsjson"];
pub const CAPTION_TEXT_ALIASES: [&str; 2] = ["captionText", "caption_text"];

/// A parsed conversion request, before asset resolution.
#[derive(Debug, Default)]
pub struct ConvertRequest {
    /// Spooled upload path for the image part, owned by the upload layer
    pub image_upload: Option<PathBuf>,
    /// Spooled upload path for the audio part, owned by the upload layer
    pub audio_upload: Option<PathBuf>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub captions: Vec<RawCaption>,
    pub caption_text: Option<String>,
}

/// Extract a conversion request from the HTTP request body.
///
/// A body that carries no fields falls back to the query string, where some
/// clients put the URL fields instead.
pub async fn extract_convert_request(
    req: Request,
    config: &ApiConfig,
) -> ApiResult<ConvertRequest> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let query = query_fields(req.uri());

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| ApiError::validation(format!("malformed multipart body: {}", e)))?;
        extract_multipart(multipart, config, query).await
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, &())
            .await
            .map_err(|e| ApiError::validation(format!("malformed form body: {}", e)))?;
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        from_fields(&body_or_query(fields, query))
    } else {
        // JSON is the default; an empty body behaves like an empty object.
        let bytes = axum::body::to_bytes(req.into_body(), config.max_body_size)
            .await
            .map_err(|e| ApiError::validation(format!("unreadable request body: {}", e)))?;
        let fields: Map<String, Value> = if bytes.is_empty() {
            Map::new()
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| ApiError::validation(format!("malformed JSON body: {}", e)))?
        };
        from_fields(&body_or_query(fields, query))
    }
}

/// Query-string fields as a flat field map.
fn query_fields(uri: &Uri) -> Map<String, Value> {
    Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| {
            pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn body_or_query(fields: Map<String, Value>, query: Map<String, Value>) -> Map<String, Value> {
    if fields.is_empty() {
        query
    } else {
        fields
    }
}

/// Walk multipart parts: binary `image`/`audio` parts are spooled to the
/// output directory; everything else is collected as a text field.
async fn extract_multipart(
    mut multipart: Multipart,
    config: &ApiConfig,
    query: Map<String, Value>,
) -> ApiResult<ConvertRequest> {
    let mut request = ConvertRequest::default();
    let mut fields: Map<String, Value> = Map::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        let is_binary = field.file_name().is_some();
        match (name.as_str(), is_binary) {
            ("image", true) | ("audio", true) => {
                let default_ext = if name == "image" { ".jpg" } else { ".mp3" };
                let ext = field
                    .file_name()
                    .map(|f| extension_for_filename(f, default_ext))
                    .unwrap_or_else(|| default_ext.to_string());
                let path = config
                    .output_dir
                    .join(format!("upload_{}_{}{}", name, unique_token(), ext));

                let mut file = tokio::fs::File::create(&path)
                    .await
                    .map_err(|e| ApiError::internal(format!("cannot spool upload: {}", e)))?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::validation(format!("upload read failed: {}", e)))?
                {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| ApiError::internal(format!("cannot spool upload: {}", e)))?;
                }
                file.flush()
                    .await
                    .map_err(|e| ApiError::internal(format!("cannot spool upload: {}", e)))?;

                if name == "image" {
                    request.image_upload = Some(path);
                } else {
                    request.audio_upload = Some(path);
                }
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("field read failed: {}", e)))?;
                fields.insert(name, Value::String(text));
            }
        }
    }

    let text_fields = from_fields(&body_or_query(fields, query))?;
    request.image_url = text_fields.image_url;
    request.audio_url = text_fields.audio_url;
    request.captions = text_fields.captions;
    request.caption_text = text_fields.caption_text;
    Ok(request)
}

/// Resolve the alias lists over a flat field map.
fn from_fields(fields: &Map<String, Value>) -> ApiResult<ConvertRequest> {
    let captions = match first_value(fields, &CAPTIONS_ALIASES) {
        Some(value) => parse_captions(value)?,
        None => Vec::new(),
    };

    Ok(ConvertRequest {
        image_upload: None,
        audio_upload: None,
        image_url: first_string(fields, &IMAGE_URL_ALIASES),
        audio_url: first_string(fields, &AUDIO_URL_ALIASES),
        captions,
        caption_text: first_string(fields, &CAPTION_TEXT_ALIASES),
    })
}

fn first_value<'a>(fields: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|name| fields.get(*name))
        .filter(|v| !v.is_null())
}

fn first_string(fields: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    first_value(fields, aliases)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the captions field, which may be a JSON array or a JSON-encoded
/// string. A string that fails to parse is ignored with a warning (the
/// request then renders without captions), matching long-standing client
/// behavior; an array with malformed entries is a validation error.
fn parse_captions(value: &Value) -> ApiResult<Vec<RawCaption>> {
    let array = match value {
        Value::Array(_) => value.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Array(_)) => parsed,
            Ok(_) | Err(_) => {
                warn!("Ignoring captions field that is not a JSON array");
                return Ok(Vec::new());
            }
        },
        _ => {
            warn!("Ignoring captions field of unsupported type");
            return Ok(Vec::new());
        }
    };

    serde_json::from_value(array)
        .map_err(|e| ApiError::validation(format!("captions must be an array of objects: {}", e)))
}

/// Infer an extension (with leading dot) from an uploaded file name.
fn extension_for_filename(filename: &str, default_ext: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| default_ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_alias_precedence() {
        let request = from_fields(&fields(json!({
            "image": "https://example.com/c.jpg",
            "imageUrl": "https://example.com/a.jpg",
            "image_url": "https://example.com/b.jpg",
        })))
        .unwrap();
        assert_eq!(request.image_url.as_deref(), Some("https://example.com/a.jpg"));

        let request = from_fields(&fields(json!({
            "audio": "https://example.com/c.mp3",
            "audio_url": "https://example.com/b.mp3",
        })))
        .unwrap();
        assert_eq!(request.audio_url.as_deref(), Some("https://example.com/b.mp3"));
    }

    #[test]
    fn test_captions_as_array() {
        let request = from_fields(&fields(json!({
            "captions": [{"start": 0, "end": 1, "text": "hi"}],
        })))
        .unwrap();
        assert_eq!(request.captions.len(), 1);
    }

    #[test]
    fn test_captions_as_json_string() {
        let request = from_fields(&fields(json!({
            "captionsJson": "[{\"start\": 0, \"end\": 1, \"word\": \"hi\"}]",
        })))
        .unwrap();
        assert_eq!(request.captions.len(), 1);
        assert_eq!(request.captions[0].resolved_text(), Some("hi"));
    }

    #[test]
    fn test_unparsable_captions_string_is_ignored() {
        let request = from_fields(&fields(json!({"captions": "not json"}))).unwrap();
        assert!(request.captions.is_empty());
    }

    #[test]
    fn test_malformed_caption_entries_rejected() {
        let err = from_fields(&fields(json!({"captions": [5]}))).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_blank_strings_treated_as_absent() {
        let request = from_fields(&fields(json!({
            "imageUrl": "  ",
            "captionText": "",
        })))
        .unwrap();
        assert!(request.image_url.is_none());
        assert!(request.caption_text.is_none());
    }

    #[test]
    fn test_extension_for_filename() {
        assert_eq!(extension_for_filename("photo.PNG", ".jpg"), ".PNG");
        assert_eq!(extension_for_filename("track", ".mp3"), ".mp3");
    }

    fn post(uri: &str, content_type: Option<&str>, body: axum::body::Body) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        builder.body(body).unwrap()
    }

    #[tokio::test]
    async fn test_empty_body_falls_back_to_query_fields() {
        let req = post(
            "/convert?imageUrl=https://example.com/a.jpg&audioUrl=https://example.com/a.mp3",
            None,
            axum::body::Body::empty(),
        );
        let request = extract_convert_request(req, &ApiConfig::default())
            .await
            .unwrap();
        assert_eq!(request.image_url.as_deref(), Some("https://example.com/a.jpg"));
        assert_eq!(request.audio_url.as_deref(), Some("https://example.com/a.mp3"));
    }

    #[tokio::test]
    async fn test_body_fields_shadow_query_fields() {
        let req = post(
            "/convert?imageUrl=https://example.com/query.jpg",
            Some("application/json"),
            axum::body::Body::from(r#"{"imageUrl": "https://example.com/body.jpg"}"#),
        );
        let request = extract_convert_request(req, &ApiConfig::default())
            .await
            .unwrap();
        assert_eq!(
            request.image_url.as_deref(),
            Some("https://example.com/body.jpg")
        );
    }
}
