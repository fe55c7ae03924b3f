use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub connectivity: Connectivity,
    pub last_transition_at: DateTime<Utc>,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        self.connectivity == Connectivity::Online
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityTransition {
    pub from: Connectivity,
    pub to: Connectivity,
    pub at: DateTime<Utc>,
}

impl ConnectivityTransition {
    pub fn is_reconnect(&self) -> bool {
        self.from == Connectivity::Offline && self.to == Connectivity::Online
    }
}
