use crate::domain::value_objects::MentionReference;
use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 未アップロードのメディア参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub blob_key: String,
    pub content_type: Option<String>,
    pub uploaded_url: Option<String>,
    #[serde(default)]
    pub upload_attempts: u32,
}

impl MediaReference {
    pub fn new(blob_key: impl Into<String>, content_type: Option<String>) -> Self {
        Self {
            blob_key: blob_key.into(),
            content_type,
            uploaded_url: None,
            upload_attempts: 0,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded_url.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPayload {
    body: Value,
    #[serde(default)]
    media: Vec<MediaReference>,
    #[serde(default)]
    mentions: Vec<MentionReference>,
}

impl OperationPayload {
    pub fn new(body: Value) -> Result<Self, String> {
        Self::validate(&body)?;
        Ok(Self {
            body,
            media: Vec::new(),
            mentions: Vec::new(),
        })
    }

    /// 任意のコンテンツから生成する。エンコードできない場合はキュー投入前に失敗する
    pub fn from_content<T: Serialize>(content: &T) -> Result<Self, AppError> {
        let body = serde_json::to_value(content)?;
        Self::new(body).map_err(AppError::Serialization)
    }

    pub fn text(content: &str) -> Self {
        Self {
            body: serde_json::json!({ "content": content }),
            media: Vec::new(),
            mentions: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: Vec<MediaReference>) -> Self {
        self.media = media;
        self
    }

    pub fn with_mentions(mut self, mentions: Vec<MentionReference>) -> Self {
        self.mentions = mentions;
        self
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn media(&self) -> &[MediaReference] {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut [MediaReference] {
        &mut self.media
    }

    pub fn mentions(&self) -> &[MentionReference] {
        &self.mentions
    }

    pub fn has_pending_media(&self) -> bool {
        self.media.iter().any(|media| !media.is_uploaded())
    }

    pub fn to_json_string(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let payload: Self = serde_json::from_str(json)?;
        Self::validate(&payload.body).map_err(AppError::Serialization)?;
        Ok(payload)
    }

    /// 表示用の本文（メディア URL とメンションを展開済み）
    pub fn display_body(&self) -> Value {
        let mut body = self.body.clone();
        if let Value::Object(map) = &mut body {
            if !self.media.is_empty() {
                let media: Vec<Value> = self
                    .media
                    .iter()
                    .map(|m| {
                        serde_json::json!({
                            "blobKey": m.blob_key,
                            "url": m.uploaded_url,
                        })
                    })
                    .collect();
                map.insert("media".to_string(), Value::Array(media));
            }
            if !self.mentions.is_empty() {
                let mentions: Vec<Value> = self
                    .mentions
                    .iter()
                    .map(|m| serde_json::json!({ "handle": m.handle, "profileId": m.profile_id }))
                    .collect();
                map.insert("mentions".to_string(), Value::Array(mentions));
            }
        }
        body
    }

    fn validate(value: &Value) -> Result<(), String> {
        if value.is_null() {
            return Err("Operation payload cannot be null".to_string());
        }
        Ok(())
    }
}
