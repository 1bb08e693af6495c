//! Telegram Bot API origin

use super::{Locator, Origin, stream_to_file};
use crate::config::OriginConfig;
use crate::error::{Error, FetchError, Result};
use crate::types::{CollectionMeta, CollectionName, ItemId, ItemMeta, SourceFormat};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

/// Bot API envelope: `{"ok": bool, "result": T, "description": ..., "error_code": ...}`
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct StickerSet {
    name: String,
    title: Option<String>,
    #[serde(default)]
    stickers: Vec<Sticker>,
}

#[derive(Debug, Deserialize)]
struct Sticker {
    file_id: String,
    file_unique_id: String,
    #[serde(default)]
    is_animated: bool,
    #[serde(default)]
    is_video: bool,
}

impl Sticker {
    fn format(&self) -> SourceFormat {
        if self.is_animated {
            SourceFormat::AnimatedVector
        } else if self.is_video {
            SourceFormat::Video
        } else {
            SourceFormat::StaticImage
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    file_path: Option<String>,
}

/// Origin backed by the Telegram Bot API (`getStickerSet`, `getFile`, file download)
pub struct BotApiOrigin {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl BotApiOrigin {
    /// Build the origin from configuration
    ///
    /// Fails when no token is configured or the base URL does not parse.
    pub fn new(config: &OriginConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config {
                message: "bot token is not configured".to_string(),
                key: Some("origin.token".to_string()),
            })?;

        url::Url::parse(&config.api_base).map_err(|e| Error::Config {
            message: format!("invalid API base URL '{}': {}", config.api_base, e),
            key: Some("origin.api_base".to_string()),
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }
}

/// Extension of a remote file path, if it has one
fn extension_of(file_path: &str) -> Option<&str> {
    let name = file_path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

#[async_trait]
impl Origin for BotApiOrigin {
    async fn collection(&self, name: &CollectionName) -> Result<Option<CollectionMeta>> {
        let response = self
            .client
            .post(self.method_url("getStickerSet"))
            .form(&[("name", name.as_str())])
            .send()
            .await
            .map_err(|e| Error::Network(e.without_url()))?;

        let body: ApiResponse<StickerSet> = response
            .json()
            .await
            .map_err(|e| Error::Network(e.without_url()))?;

        if !body.ok {
            // The Bot API answers 400 for unknown or malformed set names
            return match body.error_code {
                None | Some(400) | Some(404) => {
                    tracing::debug!(collection = %name, description = ?body.description, "collection not found at origin");
                    Ok(None)
                }
                Some(code) => Err(Error::Origin(format!(
                    "getStickerSet failed ({}): {}",
                    code,
                    body.description.unwrap_or_default()
                ))),
            };
        }

        let set = body
            .result
            .ok_or_else(|| Error::Origin("getStickerSet returned no result".to_string()))?;

        let items = set
            .stickers
            .into_iter()
            .map(|s| ItemMeta {
                format: s.format(),
                id: ItemId(s.file_unique_id),
                origin_ref: s.file_id,
            })
            .collect();

        let mut meta = CollectionMeta {
            name: CollectionName::parse(&set.name).unwrap_or_else(|_| name.clone()),
            title: set.title,
            items,
        };
        for duplicate in meta.dedup_items() {
            tracing::warn!(collection = %name, item = %duplicate.id, file_id = %duplicate.origin_ref, "duplicate item id at origin, keeping the first");
        }
        Ok(Some(meta))
    }

    async fn resolve(&self, item: &ItemMeta) -> std::result::Result<Locator, FetchError> {
        let response = self
            .client
            .post(self.method_url("getFile"))
            .form(&[("file_id", item.origin_ref.as_str())])
            .send()
            .await?;

        let body: ApiResponse<RemoteFile> = response.json().await?;
        if !body.ok {
            return Err(FetchError::Resolve {
                reference: item.origin_ref.clone(),
                reason: body
                    .description
                    .unwrap_or_else(|| "getFile failed".to_string()),
            });
        }

        let file_path = body
            .result
            .and_then(|f| f.file_path)
            .ok_or_else(|| FetchError::Resolve {
                reference: item.origin_ref.clone(),
                reason: "getFile returned no file_path".to_string(),
            })?;

        let extension = extension_of(&file_path)
            .unwrap_or(item.format.default_extension())
            .to_ascii_lowercase();

        Ok(Locator {
            url: self.file_url(&file_path),
            extension,
        })
    }

    async fn download(
        &self,
        locator: &Locator,
        dest: &Path,
    ) -> std::result::Result<u64, FetchError> {
        let response = self.client.get(&locator.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                // Keep the token out of error messages
                url: locator
                    .url
                    .rsplit_once(&self.token)
                    .map(|(_, path)| path.to_string())
                    .unwrap_or_default(),
            });
        }

        stream_to_file(response, dest).await
    }

    fn name(&self) -> &'static str {
        "bot-api"
    }
}
