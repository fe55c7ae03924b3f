use crate::domain::value_objects::MentionReference;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileReference {
    pub profile_id: String,
    pub handle: String,
    pub display_name: Option<String>,
}

impl ProfileReference {
    pub fn to_mention(&self) -> MentionReference {
        MentionReference {
            handle: format!("@{}", self.handle),
            profile_id: self.profile_id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}
