use async_trait::async_trait;
use offline_sync::{AppError, ProfileDirectory, ProfileReference};

#[derive(Clone, Default)]
pub struct MockProfileDirectory {
    profiles: Vec<ProfileReference>,
}

impl MockProfileDirectory {
    pub fn with_handles(handles: &[&str]) -> Self {
        Self {
            profiles: handles
                .iter()
                .map(|handle| ProfileReference {
                    profile_id: format!("profile-{handle}"),
                    handle: handle.to_string(),
                    display_name: Some(handle.to_uppercase()),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ProfileDirectory for MockProfileDirectory {
    async fn search(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<ProfileReference>, AppError> {
        let prefix = prefix.to_lowercase();
        Ok(self
            .profiles
            .iter()
            .filter(|profile| profile.handle.to_lowercase().starts_with(&prefix))
            .take(limit)
            .cloned()
            .collect())
    }
}
