use crate::{
    backend::BackendApi,
    error::{
        BackendError,
        FlowError,
    },
    model::TokenInfo,
    reveal::Reveal,
};
use futures::future::join_all;
use std::sync::{
    Arc,
    Mutex,
};
use tokio::task::JoinHandle;

/// Batch sizes requested to fill the reveal reels on craft.
const CRAFT_FILLER_BATCHES: [u8; 4] = [8, 8, 8, 4];
/// Batch sizes requested to fill one reel on a slot reroll.
const SLOT_FILLER_BATCHES: [u8; 3] = [8, 8, 4];

#[derive(Clone, Debug, PartialEq, Eq)]
struct CacheKey {
    user: String,
    category: String,
    num_coins: u8,
}

/// Outcome of a pre-purchase single slot reroll.
#[derive(Clone, Debug, PartialEq)]
pub struct RerolledSlot {
    pub index: usize,
    pub token: TokenInfo,
    /// Candidates to spin the slot's reel through before it lands.
    pub filler: Vec<TokenInfo>,
}

/// Decides which tokens are candidates before a purchase and which ones the
/// backend says were bought after it.
#[derive(Clone)]
pub struct TokenSelectionOrchestrator<B> {
    backend: B,
    /// Selection whose batch is cached or being cached. Cleared again when
    /// caching fails so the same selection is retried.
    last_cached: Arc<Mutex<Option<CacheKey>>>,
}

impl<B> TokenSelectionOrchestrator<B>
where
    B: BackendApi + Clone + Send + Sync + 'static,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            last_cached: Arc::new(Mutex::new(None)),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Asks the backend, in the background, to prepare a batch for the new
    /// selection. Returns `None` when there is no user or nothing changed.
    /// Failures are only logged, and the next call for the same selection
    /// tries again.
    pub fn on_selection_changed(
        &mut self,
        user: Option<&str>,
        category: &str,
        num_coins: u8,
    ) -> Option<JoinHandle<()>> {
        let user = user?;
        let key = CacheKey {
            user: user.to_string(),
            category: category.to_string(),
            num_coins,
        };
        {
            let Ok(mut last) = self.last_cached.lock() else {
                return None;
            };
            if last.as_ref() == Some(&key) {
                return None;
            }
            *last = Some(key.clone());
        }

        let backend = self.backend.clone();
        let last_cached = Arc::clone(&self.last_cached);
        Some(tokio::spawn(async move {
            match backend
                .cache_tokens(&key.user, &key.category, key.num_coins)
                .await
            {
                Ok(tokens) => tracing::info!(
                    category = %key.category,
                    num_coins = key.num_coins,
                    cached = tokens.len(),
                    "token batch cached"
                ),
                Err(err) => {
                    tracing::warn!(
                        category = %key.category,
                        num_coins = key.num_coins,
                        "background token caching failed: {err}"
                    );
                    if let Ok(mut last) = last_cached.lock() {
                        if last.as_ref() == Some(&key) {
                            *last = None;
                        }
                    }
                }
            }
        }))
    }

    /// The user's cached batch, caching a fresh one first if the backend has
    /// none.
    pub async fn fetch_cached(
        &self,
        user: &str,
        category: &str,
        num_coins: u8,
    ) -> Result<Vec<TokenInfo>, BackendError> {
        let cached = self.backend.cached_tokens(user, category, num_coins).await?;
        if !cached.tokens.is_empty() {
            tracing::info!(from_cache = cached.from_cache, "retrieved cached tokens");
            return Ok(cached.tokens);
        }
        self.recache(user, category, num_coins).await
    }

    /// Replaces the cached batch with a new random one.
    pub async fn recache(
        &self,
        user: &str,
        category: &str,
        num_coins: u8,
    ) -> Result<Vec<TokenInfo>, BackendError> {
        self.backend.cache_tokens(user, category, num_coins).await?;
        let cached = self.backend.cached_tokens(user, category, num_coins).await?;
        if cached.tokens.is_empty() {
            return Err(BackendError::Rejected("Failed to fetch tokens".to_string()));
        }
        Ok(cached.tokens)
    }

    /// Fetches the final picks and builds the reveal that leads to them.
    pub async fn craft(
        &self,
        user: &str,
        category: &str,
        num_coins: u8,
    ) -> Result<Reveal, BackendError> {
        let finals = self.fetch_cached(user, category, num_coins).await?;
        let pool = self.filler_pool(category, &CRAFT_FILLER_BATCHES).await;
        Ok(Reveal::new(&finals, &pool, &mut rand::rng()))
    }

    /// Random tokens for reel filler, requested concurrently. Failed batches
    /// are skipped.
    pub async fn filler_pool(&self, category: &str, batches: &[u8]) -> Vec<TokenInfo> {
        let requests = batches
            .iter()
            .map(|size| self.backend.random_tokens(*size, category));
        join_all(requests)
            .await
            .into_iter()
            .filter_map(|batch| match batch {
                Ok(tokens) => Some(tokens),
                Err(err) => {
                    tracing::warn!(%category, "filler batch failed: {err}");
                    None
                }
            })
            .flatten()
            .collect()
    }

    /// Asks for a replacement at `index` given the full current list, so the
    /// backend can avoid handing out a duplicate.
    pub async fn reroll_slot(
        &self,
        user: &str,
        category: &str,
        index: usize,
        current: &[TokenInfo],
    ) -> Result<RerolledSlot, FlowError> {
        if index >= current.len() {
            return Err(FlowError::validation(format!(
                "No token at position {}",
                index + 1
            )));
        }
        let filler = self.filler_pool(category, &SLOT_FILLER_BATCHES).await;
        let rerolled = self
            .backend
            .reroll_single_token(user, category, index, current)
            .await?;
        Ok(RerolledSlot {
            index,
            token: rerolled.token,
            filler,
        })
    }

    pub async fn preview(
        &self,
        category: &str,
        num_coins: u8,
    ) -> Result<Vec<TokenInfo>, BackendError> {
        self.backend.first_tokens(num_coins, category).await
    }

    /// The tokens the backend recorded for `purchase_id`, or `None` when it
    /// cannot say. Never fails.
    pub async fn reconcile_purchase(
        &self,
        user: &str,
        purchase_id: &str,
    ) -> Option<Vec<TokenInfo>> {
        let wallet = match self.backend.user_wallet(user).await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => {
                tracing::warn!(%purchase_id, "no wallet record to reconcile against");
                return None;
            }
            Err(err) => {
                tracing::warn!(%purchase_id, "failed to fetch purchased tokens: {err}");
                return None;
            }
        };
        let group = wallet
            .purchases
            .iter()
            .find(|group| group.purchase_id == purchase_id)
            .filter(|group| !group.tokens.is_empty());
        match group {
            Some(group) => {
                tracing::info!(%purchase_id, tokens = group.tokens.len(), "loaded purchased tokens");
                Some(group.tokens.iter().map(TokenInfo::from).collect())
            }
            None => {
                tracing::warn!(%purchase_id, "purchase not found or has no tokens");
                None
            }
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::WalletRecord,
        test_helpers::{
            CallLog,
            FakeBackend,
            purchase_group,
            purchase_token,
            tokens,
        },
    };

    fn orchestrator(log: &CallLog) -> (FakeBackend, TokenSelectionOrchestrator<FakeBackend>) {
        let backend = FakeBackend::new(log.clone()).with_batch(tokens(&["A", "B", "C", "D"]));
        (backend.clone(), TokenSelectionOrchestrator::new(backend))
    }

    #[tokio::test]
    async fn on_selection_changed__caches_once_per_distinct_selection() {
        // given
        let log = CallLog::default();
        let (backend, mut orchestrator) = orchestrator(&log);

        // when
        orchestrator
            .on_selection_changed(Some("user"), "pepe", 4)
            .unwrap()
            .await
            .unwrap();
        let repeat = orchestrator.on_selection_changed(Some("user"), "pepe", 4);
        orchestrator
            .on_selection_changed(Some("user"), "pepe", 6)
            .unwrap()
            .await
            .unwrap();

        // then
        assert!(repeat.is_none());
        assert_eq!(
            backend.state().cache_requests,
            vec![
                ("user".to_string(), "pepe".to_string(), 4),
                ("user".to_string(), "pepe".to_string(), 6),
            ]
        );
    }

    #[tokio::test]
    async fn on_selection_changed__without_user_does_nothing() {
        let log = CallLog::default();
        let (_, mut orchestrator) = orchestrator(&log);

        assert!(orchestrator.on_selection_changed(None, "pepe", 4).is_none());
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn on_selection_changed__swallows_backend_failure() {
        // given
        let log = CallLog::default();
        let (backend, mut orchestrator) = orchestrator(&log);
        backend.fail("cache_tokens", BackendError::Unreachable("refused".into()));

        // when
        let handle = orchestrator.on_selection_changed(Some("user"), "pepe", 4);

        // then
        assert!(handle.unwrap().await.is_ok());
    }

    #[tokio::test]
    async fn on_selection_changed__retries_same_selection_after_failure() {
        // given
        let log = CallLog::default();
        let (backend, mut orchestrator) = orchestrator(&log);
        backend.fail("cache_tokens", BackendError::Unreachable("refused".into()));
        orchestrator
            .on_selection_changed(Some("user"), "pepe", 4)
            .unwrap()
            .await
            .unwrap();
        backend.succeed("cache_tokens");

        // when
        let retry = orchestrator.on_selection_changed(Some("user"), "pepe", 4);
        retry.unwrap().await.unwrap();
        let repeat = orchestrator.on_selection_changed(Some("user"), "pepe", 4);

        // then
        assert!(repeat.is_none());
        assert_eq!(
            backend.state().cache_requests,
            vec![("user".to_string(), "pepe".to_string(), 4)]
        );
        assert_eq!(
            log.entries()
                .iter()
                .filter(|e| e.as_str() == "backend.cache_tokens")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn fetch_cached__caches_a_batch_when_none_exists() {
        // given
        let log = CallLog::default();
        let backend = FakeBackend::new(log.clone());
        let orchestrator = TokenSelectionOrchestrator::new(backend.clone());

        // when
        let err = orchestrator.fetch_cached("user", "pepe", 4).await.unwrap_err();

        // then
        assert_eq!(err, BackendError::Rejected("Failed to fetch tokens".into()));
        assert_eq!(
            log.entries(),
            vec![
                "backend.cached_tokens",
                "backend.cache_tokens",
                "backend.cached_tokens"
            ]
        );
    }

    #[tokio::test]
    async fn craft__reveal_lands_on_cached_batch() {
        // given
        let log = CallLog::default();
        let (_, orchestrator) = orchestrator(&log);

        // when
        let mut reveal = orchestrator.craft("user", "pepe", 4).await.unwrap();

        // then
        assert_eq!(reveal.finals(), tokens(&["A", "B", "C", "D"]));
        assert!(!reveal.can_confirm());
        reveal.settle_all();
        assert!(reveal.can_confirm());
        let random_calls = log
            .entries()
            .iter()
            .filter(|e| *e == "backend.random_tokens")
            .count();
        assert_eq!(random_calls, 4);
    }

    #[tokio::test]
    async fn filler_pool__skips_failed_batches() {
        // given
        let log = CallLog::default();
        let (backend, orchestrator) = orchestrator(&log);
        backend.fail("random_tokens", BackendError::Unreachable("down".into()));

        // when
        let pool = orchestrator.filler_pool("pepe", &[8, 4]).await;

        // then
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn reroll_slot__sends_current_list_and_returns_replacement() {
        // given
        let log = CallLog::default();
        let (backend, orchestrator) = orchestrator(&log);
        backend.state().replacements.push_back(tokens(&["Z"])[0].clone());
        let current = tokens(&["A", "B"]);

        // when
        let rerolled = orchestrator
            .reroll_slot("user", "pepe", 1, &current)
            .await
            .unwrap();

        // then
        assert_eq!(rerolled.index, 1);
        assert_eq!(rerolled.token.name, "Z");
        assert_eq!(backend.state().reroll_single_requests, vec![(1, current)]);
    }

    #[tokio::test]
    async fn reroll_slot__rejects_index_out_of_range_before_calling_backend() {
        let log = CallLog::default();
        let (_, orchestrator) = orchestrator(&log);

        let err = orchestrator
            .reroll_slot("user", "pepe", 2, &tokens(&["A", "B"]))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Validation(_)));
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn reconcile_purchase__returns_tokens_of_matching_group() {
        // given
        let log = CallLog::default();
        let (backend, orchestrator) = orchestrator(&log);
        backend.state().wallet = Some(WalletRecord {
            user_public_key: "user".into(),
            settlement_address: None,
            purchases: vec![
                purchase_group("other", vec![purchase_token("X", 1.0)]),
                purchase_group("p-1", vec![purchase_token("Bonk", 0.25)]),
            ],
        });

        // when
        let reconciled = orchestrator.reconcile_purchase("user", "p-1").await.unwrap();

        // then
        assert_eq!(reconciled.len(), 1);
        assert_eq!(reconciled[0].name, "Bonk");
        assert_eq!(reconciled[0].buy_amount_sol, Some(0.25));
    }

    #[tokio::test]
    async fn reconcile_purchase__yields_none_on_failure_or_empty_group() {
        // given
        let log = CallLog::default();
        let (backend, orchestrator) = orchestrator(&log);
        backend.state().wallet = Some(WalletRecord {
            purchases: vec![purchase_group("p-1", vec![])],
            ..WalletRecord::default()
        });

        // then
        assert!(orchestrator.reconcile_purchase("user", "p-1").await.is_none());
        backend.fail("user_wallet", BackendError::Unreachable("down".into()));
        assert!(orchestrator.reconcile_purchase("user", "p-1").await.is_none());
    }
}
