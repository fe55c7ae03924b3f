use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Queued,
    Submitting,
    Confirmed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Queued => "queued",
            OperationStatus::Submitting => "submitting",
            OperationStatus::Confirmed => "confirmed",
            OperationStatus::Failed => "failed",
        }
    }

    /// 確定していない操作（キャッシュ退避の対象外）
    pub fn is_unresolved(&self) -> bool {
        !matches!(self, OperationStatus::Confirmed)
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(OperationStatus::Queued),
            "submitting" => Ok(OperationStatus::Submitting),
            "confirmed" => Ok(OperationStatus::Confirmed),
            "failed" => Ok(OperationStatus::Failed),
            other => Err(format!("Unknown operation status: {other}")),
        }
    }
}
