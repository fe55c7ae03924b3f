use serde::{Deserialize, Serialize};

/// 本文中の "@name" を解決したプロフィール参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionReference {
    pub handle: String,
    pub profile_id: String,
    pub display_name: Option<String>,
}
