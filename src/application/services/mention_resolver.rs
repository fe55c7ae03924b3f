use crate::application::ports::profile_directory::ProfileDirectory;
use crate::domain::value_objects::MentionReference;
use crate::shared::error::AppError;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Resolved(Vec<MentionReference>),
    /// 後続の入力で取り消された
    Superseded,
}

/// 入力中の "@name" をプロフィールへ解決する。新しい検索は前の検索を取り消す
pub struct MentionResolver {
    directory: Arc<dyn ProfileDirectory>,
    limit: usize,
    current: Mutex<CancellationToken>,
}

impl MentionResolver {
    pub fn new(directory: Arc<dyn ProfileDirectory>, limit: usize) -> Self {
        Self {
            directory,
            limit: limit.max(1),
            current: Mutex::new(CancellationToken::new()),
        }
    }

    /// 遅延実行の検索を作る。`resolve` を待つまで問い合わせは発生しない
    pub fn lookup(&self, fragment: &str) -> MentionLookup {
        let token = CancellationToken::new();
        let previous = {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *current, token.clone())
        };
        previous.cancel();

        MentionLookup {
            directory: Arc::clone(&self.directory),
            prefix: normalize_fragment(fragment),
            limit: self.limit,
            token,
        }
    }

    pub fn cancel_pending(&self) {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    /// 本文中のハンドルを完全一致で解決する（見つからないものは除外）
    pub async fn resolve_text(&self, text: &str) -> Result<Vec<MentionReference>, AppError> {
        let mut mentions = Vec::new();
        for handle in extract_handles(text) {
            let candidates = self.directory.search(&handle, self.limit).await?;
            if let Some(profile) = candidates
                .iter()
                .find(|profile| profile.handle.eq_ignore_ascii_case(&handle))
            {
                mentions.push(profile.to_mention());
            } else {
                tracing::debug!(target: "offline::mentions", handle = %handle, "mention did not resolve");
            }
        }
        Ok(mentions)
    }
}

/// 一度だけ解決できる検索
pub struct MentionLookup {
    directory: Arc<dyn ProfileDirectory>,
    prefix: String,
    limit: usize,
    token: CancellationToken,
}

impl MentionLookup {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn resolve(self) -> Result<LookupOutcome, AppError> {
        if self.token.is_cancelled() {
            return Ok(LookupOutcome::Superseded);
        }
        if self.prefix.is_empty() {
            return Ok(LookupOutcome::Resolved(Vec::new()));
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                tracing::trace!(target: "offline::mentions", prefix = %self.prefix, "lookup superseded");
                Ok(LookupOutcome::Superseded)
            }
            result = self.directory.search(&self.prefix, self.limit) => {
                let profiles = result?;
                Ok(LookupOutcome::Resolved(
                    profiles
                        .iter()
                        .take(self.limit)
                        .map(|profile| profile.to_mention())
                        .collect(),
                ))
            }
        }
    }
}

fn normalize_fragment(fragment: &str) -> String {
    fragment.trim().trim_start_matches('@').to_string()
}

fn is_handle_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
}

/// "@name" を出現順・重複なしで取り出す（"@" は含めない）
pub fn extract_handles(text: &str) -> Vec<String> {
    let mut handles: Vec<String> = Vec::new();
    let mut previous: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let at_boundary = previous.map_or(true, |p| p.is_whitespace() || p == '(');
        previous = Some(c);
        if c != '@' || !at_boundary {
            continue;
        }

        let start = idx + c.len_utf8();
        let mut end = start;
        while let Some(&(next_idx, next)) = chars.peek() {
            if !is_handle_char(next) {
                break;
            }
            end = next_idx + next.len_utf8();
            previous = Some(next);
            chars.next();
        }

        let handle = text[start..end].trim_end_matches(['.', '-']);
        if !handle.is_empty() && !handles.iter().any(|h| h == handle) {
            handles.push(handle.to_string());
        }
    }

    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ProfileReference;
    use async_trait::async_trait;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    mock! {
        pub Directory {}

        #[async_trait]
        impl ProfileDirectory for Directory {
            async fn search(&self, prefix: &str, limit: usize)
                -> Result<Vec<ProfileReference>, AppError>;
        }
    }

    fn profile(handle: &str) -> ProfileReference {
        ProfileReference {
            profile_id: format!("id-{handle}"),
            handle: handle.to_string(),
            display_name: None,
        }
    }

    /// 解放されるまで応答しないディレクトリ
    struct SlowDirectory {
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProfileDirectory for SlowDirectory {
        async fn search(
            &self,
            prefix: &str,
            _limit: usize,
        ) -> Result<Vec<ProfileReference>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(vec![profile(prefix)])
        }
    }

    #[test]
    fn extract_handles_finds_mentions_in_order() {
        let handles = extract_handles("hi @alice and @bob.smith, also @alice. mail a@b.c (@carol)");
        assert_eq!(handles, vec!["alice", "bob.smith", "carol"]);
    }

    #[test]
    fn extract_handles_ignores_bare_at_sign() {
        assert!(extract_handles("@ alone").is_empty());
    }

    #[tokio::test]
    async fn lookup_is_lazy_until_resolved() {
        let mut directory = MockDirectory::new();
        directory
            .expect_search()
            .withf(|prefix, limit| prefix.to_string() == "al" && *limit == 8)
            .times(1)
            .returning(|_, _| Ok(vec![profile("alice"), profile("alan")]));
        let resolver = MentionResolver::new(Arc::new(directory), 8);

        let lookup = resolver.lookup("@al");
        assert_eq!(lookup.prefix(), "al");

        match lookup.resolve().await.unwrap() {
            LookupOutcome::Resolved(mentions) => {
                assert_eq!(mentions.len(), 2);
                assert_eq!(mentions[0].handle, "@alice");
            }
            LookupOutcome::Superseded => panic!("lookup should resolve"),
        }
    }

    #[tokio::test]
    async fn newer_lookup_supersedes_pending_one() {
        let directory = Arc::new(SlowDirectory {
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let resolver = MentionResolver::new(directory.clone(), 8);

        let first = resolver.lookup("@a");
        let pending = tokio::spawn(first.resolve());
        tokio::time::timeout(Duration::from_secs(2), async {
            while directory.calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let second = resolver.lookup("@al");
        assert_eq!(
            pending.await.unwrap().unwrap(),
            LookupOutcome::Superseded
        );

        directory.release.notify_one();
        match second.resolve().await.unwrap() {
            LookupOutcome::Resolved(mentions) => assert_eq!(mentions[0].handle, "@al"),
            LookupOutcome::Superseded => panic!("latest lookup should resolve"),
        }
    }

    #[tokio::test]
    async fn lookup_created_before_newer_one_never_queries() {
        let mut directory = MockDirectory::new();
        directory.expect_search().times(0);
        let resolver = MentionResolver::new(Arc::new(directory), 8);

        let stale = resolver.lookup("@bo");
        resolver.cancel_pending();

        assert_eq!(stale.resolve().await.unwrap(), LookupOutcome::Superseded);
    }

    #[tokio::test]
    async fn resolve_text_keeps_exact_matches() {
        let mut directory = MockDirectory::new();
        directory
            .expect_search()
            .returning(|prefix, _| match prefix {
                "alice" => Ok(vec![profile("alice"), profile("alice2")]),
                _ => Ok(vec![profile("someone_else")]),
            });
        let resolver = MentionResolver::new(Arc::new(directory), 8);

        let mentions = resolver.resolve_text("ping @alice and @ghost").await.unwrap();

        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].profile_id, "id-alice");
    }
}
