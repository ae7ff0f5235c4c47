use crate::{
    allocation::{
        MIN_PERCENT,
        contract_theme,
        random_percentages,
        settlement_lamports,
        spend_amounts,
    },
    backend::BackendApi,
    error::FlowError,
    model::{
        AllocationType,
        Category,
        CoinAllocation,
        CrateData,
        CreateCrateRequest,
        DEFAULT_CATEGORY,
        DEFAULT_INVESTMENT_AMOUNT,
        DEFAULT_NUM_COINS,
        FlowStep,
        PurchaseToken,
        SellResult,
        SignedSubmission,
        TokenInfo,
        VALID_COIN_COUNTS,
    },
    network::Network,
    reveal::Reveal,
    selection::{
        RerolledSlot,
        TokenSelectionOrchestrator,
    },
    signer::WalletSigner,
    submitter::TransactionSubmitter,
};
use solana_sdk::{
    pubkey::Pubkey,
    system_instruction,
};
use std::{
    str::FromStr,
    time::Duration,
};
use tokio::task::JoinHandle;


/// How long the rolling screen is shown before the purchase is reconciled.
pub const ROLLING_DISPLAY_DELAY: Duration = Duration::from_millis(3000);

/// Everything the user has chosen and where the current purchase stands.
#[derive(Clone, Debug, PartialEq)]
pub struct GameFlowState {
    pub current_step: FlowStep,
    pub investment_amount: f64,
    pub selected_theme: Option<String>,
    pub selected_contract_theme: Option<String>,
    pub num_coins: u8,
    pub allocation_type: AllocationType,
    pub coin_percentages: Option<Vec<f64>>,
    pub current_crate: Option<CrateData>,
    pub displayed_tokens: Vec<TokenInfo>,
    /// Accepted pre-purchase rerolls not yet paid for.
    pub reroll_count: u32,
    /// Fees reported by the backend for on-chain coin rerolls of the
    /// current crate.
    pub onchain_reroll_fees: f64,
    pub purchase_id: Option<String>,
    pub transaction_signature: Option<String>,
    pub is_processing: bool,
    pub error: Option<String>,
}

impl Default for GameFlowState {
    fn default() -> Self {
        Self {
            current_step: FlowStep::default(),
            investment_amount: DEFAULT_INVESTMENT_AMOUNT,
            selected_theme: None,
            selected_contract_theme: None,
            num_coins: DEFAULT_NUM_COINS,
            allocation_type: AllocationType::Equal,
            coin_percentages: None,
            current_crate: None,
            displayed_tokens: Vec::new(),
            reroll_count: 0,
            onchain_reroll_fees: 0.0,
            purchase_id: None,
            transaction_signature: None,
            is_processing: false,
            error: None,
        }
    }
}

impl GameFlowState {
    /// Theme identifier sent to the backend.
    pub fn backend_theme(&self) -> String {
        self.selected_contract_theme
            .clone()
            .or_else(|| self.selected_theme.clone())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }

    pub fn spend_amounts(&self) -> Vec<f64> {
        spend_amounts(
            self.investment_amount,
            self.num_coins,
            self.allocation_type,
            self.coin_percentages.as_deref(),
        )
    }

    /// Lamports the next settlement transfer will move, rent excluded.
    pub fn settlement_lamports(&self) -> u64 {
        settlement_lamports(self.investment_amount, self.reroll_count)
    }

    pub fn has_valid_coin_count(&self) -> bool {
        VALID_COIN_COUNTS.contains(&self.num_coins)
    }
}

struct PendingPurchase {
    user: String,
    purchase_id: String,
}

/// Owns [`GameFlowState`] and runs the money-moving actions against it.
///
/// Every action returns the failure kind to the caller and also records the
/// user-facing text, if the kind has any, in `state().error`.
pub struct GameFlowMachine<B, N, W> {
    state: GameFlowState,
    wallet: Option<W>,
    backend: B,
    selection: TokenSelectionOrchestrator<B>,
    submitter: TransactionSubmitter<N>,
    rolling_delay: Duration,
    pending: Option<PendingPurchase>,
}

impl<B, N, W> GameFlowMachine<B, N, W>
where
    B: BackendApi + Clone + Send + Sync + 'static,
    N: Network,
    W: WalletSigner,
{
    pub fn new(backend: B, network: N) -> Self {
        Self {
            state: GameFlowState::default(),
            wallet: None,
            selection: TokenSelectionOrchestrator::new(backend.clone()),
            backend,
            submitter: TransactionSubmitter::new(network),
            rolling_delay: ROLLING_DISPLAY_DELAY,
            pending: None,
        }
    }

    pub fn with_wallet(mut self, wallet: W) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn with_rolling_delay(mut self, delay: Duration) -> Self {
        self.rolling_delay = delay;
        self
    }

    pub fn state(&self) -> &GameFlowState {
        &self.state
    }

    pub fn wallet(&self) -> Option<&W> {
        self.wallet.as_ref()
    }

    pub fn user(&self) -> Option<String> {
        self.wallet.as_ref().map(|w| w.public_key().to_string())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn selection(&self) -> &TokenSelectionOrchestrator<B> {
        &self.selection
    }

    pub fn connect_wallet(&mut self, wallet: W) -> Option<JoinHandle<()>> {
        tracing::info!(user = %wallet.public_key(), "wallet connected");
        self.wallet = Some(wallet);
        self.refresh_token_cache()
    }

    pub fn disconnect_wallet(&mut self) {
        self.wallet = None;
    }

    fn refresh_token_cache(&mut self) -> Option<JoinHandle<()>> {
        if !self.state.has_valid_coin_count() {
            return None;
        }
        let user = self.user();
        let category = self.state.backend_theme();
        self.selection
            .on_selection_changed(user.as_deref(), &category, self.state.num_coins)
    }

    // selection

    pub fn set_investment_amount(&mut self, amount: f64) -> Result<(), FlowError> {
        if !amount.is_finite() || amount < 0.0 {
            return self.reject(FlowError::validation(
                "Please enter a valid investment amount",
            ));
        }
        self.state.investment_amount = amount;
        Ok(())
    }

    /// Selects a category by display name; the backend theme comes from the
    /// static name map.
    pub fn select_theme(&mut self, display_name: &str) -> Option<JoinHandle<()>> {
        self.state.selected_theme = Some(display_name.to_string());
        self.state.selected_contract_theme = Some(contract_theme(display_name));
        self.refresh_token_cache()
    }

    /// Selects a category listed by the backend, trusting its theme id.
    pub fn select_category(&mut self, category: &Category) -> Option<JoinHandle<()>> {
        let theme = if category.contract_theme.is_empty() {
            contract_theme(&category.display_name)
        } else {
            category.contract_theme.clone()
        };
        self.state.selected_theme = Some(category.display_name.clone());
        self.state.selected_contract_theme = Some(theme);
        self.refresh_token_cache()
    }

    /// Stores any count; an invalid one is rejected when purchasing.
    pub fn set_num_coins(&mut self, num_coins: u8) -> Option<JoinHandle<()>> {
        self.state.num_coins = num_coins;
        if self.state.allocation_type == AllocationType::Random {
            self.regenerate_percentages();
        }
        self.refresh_token_cache()
    }

    pub fn set_allocation_type(&mut self, allocation: AllocationType) {
        self.state.allocation_type = allocation;
        match allocation {
            AllocationType::Equal => self.state.coin_percentages = None,
            AllocationType::Random => self.regenerate_percentages(),
        }
    }

    pub fn regenerate_percentages(&mut self) {
        if self.state.allocation_type != AllocationType::Random {
            return;
        }
        let percentages =
            random_percentages(self.state.num_coins as usize, &mut rand::rng());
        tracing::debug!(?percentages, "generated random split");
        self.state.coin_percentages = Some(percentages);
    }

    /// Sets explicit shares. They must sum to 100 with each at least the
    /// floor; a length that does not match the coin count is kept and later
    /// falls back to an equal split.
    pub fn set_coin_percentages(
        &mut self,
        percentages: Option<Vec<f64>>,
    ) -> Result<(), FlowError> {
        if let Some(values) = &percentages {
            let sum: f64 = values.iter().sum();
            if (sum - 100.0).abs() > 0.1 || values.iter().any(|p| *p < MIN_PERCENT) {
                return self.reject(FlowError::validation(format!(
                    "Percentages must add up to 100 with at least {MIN_PERCENT}% each"
                )));
            }
        }
        self.state.coin_percentages = percentages;
        Ok(())
    }

    /// Takes the picks of a finished reveal as the tokens to buy.
    pub fn accept_reveal(&mut self, reveal: &Reveal) -> Result<(), FlowError> {
        if !reveal.can_confirm() {
            return self.reject(FlowError::validation(
                "Wait for every slot to land before confirming",
            ));
        }
        self.state.displayed_tokens = reveal.finals();
        Ok(())
    }

    // navigation

    /// Moves forward. The purchase steps are entered by `create_crate` only,
    /// and steps past it need a rolled purchase.
    pub fn advance_to(&mut self, step: FlowStep) -> Result<(), FlowError> {
        let current = self.state.current_step;
        let allowed = step > current
            && step != FlowStep::Rolling
            && (step.is_selection() || !current.is_selection())
            && (step.is_selection() || self.state.current_crate.is_some());
        if !allowed {
            return self.reject(FlowError::validation(format!(
                "Cannot move from {current} to {step}"
            )));
        }
        self.state.current_step = step;
        Ok(())
    }

    /// Goes back to an earlier selection step to change a choice.
    pub fn revise(&mut self, step: FlowStep) -> Result<(), FlowError> {
        let current = self.state.current_step;
        if !(current.is_selection() && step.is_selection() && step <= current) {
            return self.reject(FlowError::validation(format!(
                "Cannot go back from {current} to {step}"
            )));
        }
        self.state.current_step = step;
        Ok(())
    }

    /// Back to the entry point with default choices. Rerolls that were
    /// accepted but not paid for stay on the counter; a purchase still
    /// waiting on [`Self::finish_rolling`] is abandoned.
    pub fn reset_flow(&mut self) {
        self.pending = None;
        let reroll_count = self.state.reroll_count;
        self.state = GameFlowState {
            reroll_count,
            ..GameFlowState::default()
        };
    }

    pub fn clear_error(&mut self) {
        self.state.error = None;
    }

    // action plumbing

    fn connected_user(&self) -> Result<Pubkey, FlowError> {
        self.wallet
            .as_ref()
            .map(W::public_key)
            .ok_or(FlowError::WalletNotConnected)
    }

    fn reject<T>(&mut self, err: FlowError) -> Result<T, FlowError> {
        match err.surfaced_message() {
            Some(message) => {
                tracing::error!(%message, "flow action failed");
                self.state.error = Some(message);
            }
            None => tracing::info!("flow action stopped: {err:?}"),
        }
        Err(err)
    }

    fn begin(&mut self) {
        self.state.is_processing = true;
        self.state.error = None;
    }

    fn finish<T>(&mut self, result: Result<T, FlowError>) -> Result<T, FlowError> {
        self.state.is_processing = false;
        result.or_else(|err| self.reject(err))
    }

    fn current_crate_id(&self) -> Result<(Pubkey, &CrateData), FlowError> {
        let user = self.connected_user()?;
        let current = self
            .state
            .current_crate
            .as_ref()
            .ok_or_else(|| FlowError::validation("No crate available"))?;
        Ok((user, current))
    }

    // pre-purchase token selection

    /// Fetches the user's batch and the reveal that lands on it. The picks
    /// become the purchase candidates once the reveal is accepted.
    pub async fn craft(&mut self) -> Result<Reveal, FlowError> {
        let prepared = self.connected_user().and_then(|user| {
            if self.state.has_valid_coin_count() {
                Ok(user)
            } else {
                Err(FlowError::validation("Please select 2, 4, 6, or 8 coins"))
            }
        });
        let user = match prepared {
            Ok(user) => user.to_string(),
            Err(err) => return self.reject(err),
        };
        let category = self.state.backend_theme();
        let result = self
            .selection
            .craft(&user, &category, self.state.num_coins)
            .await
            .map_err(FlowError::from);
        result.or_else(|err| self.reject(err))
    }

    /// Replaces one candidate before purchase. No value moves; the reroll fee
    /// is added to the next settlement.
    pub async fn reroll_slot(&mut self, index: usize) -> Result<RerolledSlot, FlowError> {
        let user = match self.connected_user() {
            Ok(user) => user.to_string(),
            Err(err) => return self.reject(err),
        };
        let category = self.state.backend_theme();
        let rerolled = self
            .selection
            .reroll_slot(&user, &category, index, &self.state.displayed_tokens)
            .await;
        match rerolled {
            Ok(rerolled) => {
                self.state.displayed_tokens[rerolled.index] = rerolled.token.clone();
                self.state.reroll_count += 1;
                tracing::info!(
                    index,
                    token = %rerolled.token.name,
                    reroll_count = self.state.reroll_count,
                    "slot rerolled"
                );
                Ok(rerolled)
            }
            Err(err) => self.reject(err),
        }
    }

    /// Swaps the whole candidate set for a freshly cached batch.
    pub async fn reroll_all(&mut self) -> Result<(), FlowError> {
        let user = match self.connected_user() {
            Ok(user) => user.to_string(),
            Err(err) => return self.reject(err),
        };
        let category = self.state.backend_theme();
        match self
            .selection
            .recache(&user, &category, self.state.num_coins)
            .await
        {
            Ok(tokens) => {
                self.state.displayed_tokens = tokens;
                self.state.reroll_count += 1;
                Ok(())
            }
            Err(err) => self.reject(err.into()),
        }
    }

    // money-moving actions

    fn purchase_preconditions(&self) -> Result<Pubkey, FlowError> {
        let user = self.connected_user()?;
        let amount = self.state.investment_amount;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(FlowError::validation("Please enter a valid investment amount"));
        }
        if self.state.selected_theme.is_none() {
            return Err(FlowError::validation("Please select a category"));
        }
        if !self.state.has_valid_coin_count() {
            return Err(FlowError::validation("Please select 2, 4, 6, or 8 coins"));
        }
        if !self.state.current_step.is_selection() {
            return Err(FlowError::validation(
                "This crate has already been purchased. Start a new one first",
            ));
        }
        Ok(user)
    }

    /// Buys the selected tokens: records the purchase with the backend, funds
    /// the settlement address from the user's wallet and hands the signed
    /// transfer to the backend to relay. Ends on `ROLLING`; call
    /// [`Self::finish_rolling`] afterwards.
    pub async fn create_crate(&mut self) -> Result<(), FlowError> {
        let user = match self.purchase_preconditions() {
            Ok(user) => user,
            Err(err) => return self.reject(err),
        };
        self.begin();
        let result = self.settle_purchase(user).await;
        self.finish(result)
    }

    async fn settle_purchase(&mut self, user: Pubkey) -> Result<(), FlowError> {
        let user_key = user.to_string();
        let theme = self.state.backend_theme();
        let num_coins = self.state.num_coins;
        let investment = self.state.investment_amount;
        let split_type = self.state.allocation_type;

        let candidates = if self.state.displayed_tokens.len() == num_coins as usize {
            tracing::info!("using displayed tokens for purchase");
            self.state.displayed_tokens.clone()
        } else {
            tracing::info!(%theme, num_coins, "fetching cached tokens for purchase");
            let fetched = self
                .selection
                .fetch_cached(&user_key, &theme, num_coins)
                .await?;
            self.state.displayed_tokens = fetched.clone();
            fetched
        };

        let tokens: Vec<PurchaseToken> = candidates
            .iter()
            .zip(self.state.spend_amounts())
            .map(|(token, amount)| PurchaseToken {
                mint_address: token.address.clone(),
                token_name: token.name.clone(),
                token_image: token.image.clone(),
                buy_amount_sol: amount,
            })
            .collect();
        let request = CreateCrateRequest {
            investment_amount: investment,
            theme,
            num_coins,
            split_type,
            user_public_key: user_key.clone(),
            tokens,
        };

        let created = self.backend.create_crate(&request).await?;
        tracing::info!(
            purchase_id = %created.purchase_id,
            settlement = %created.settlement_address,
            "purchase recorded"
        );
        let confirmed = if created.tokens.is_empty() {
            &request.tokens
        } else {
            &created.tokens
        };
        self.state.displayed_tokens = confirmed.iter().map(TokenInfo::from).collect();

        let settlement = Pubkey::from_str(&created.settlement_address).map_err(|e| {
            FlowError::Transaction(format!(
                "invalid settlement address '{}': {e}",
                created.settlement_address
            ))
        })?;
        let reroll_count = self.state.reroll_count;
        let lamports = settlement_lamports(investment, reroll_count);
        let network = self.submitter.network();
        let mut instructions = Vec::with_capacity(2);
        if !network.account_exists(&settlement).await? {
            let rent = network.minimum_balance_for_rent_exemption(0).await?;
            tracing::info!(rent, "funding new settlement account");
            instructions.push(system_instruction::transfer(&user, &settlement, rent));
        }
        instructions.push(system_instruction::transfer(&user, &settlement, lamports));
        tracing::info!(lamports, reroll_count, "requesting settlement signature");

        let wallet = self.wallet.as_ref().ok_or(FlowError::WalletNotConnected)?;
        let relayed = self.submitter.sign_for_relay(wallet, &instructions).await?;

        let signature = self
            .backend
            .submit_signed_transaction(&SignedSubmission {
                signed_transaction: relayed.encoded,
                blockhash: relayed.blockhash.blockhash.to_string(),
                last_valid_block_height: relayed.blockhash.last_valid_block_height,
                purchase_id: created.purchase_id.clone(),
                reroll_count,
            })
            .await?;
        tracing::info!(%signature, "settlement accepted");
        // the transfer above carried the reroll fees
        self.state.reroll_count = 0;

        self.state.transaction_signature = Some(signature);
        self.state.current_crate = Some(CrateData {
            crate_id: 0,
            settlement_address: created.settlement_address,
            coins: request
                .tokens
                .iter()
                .enumerate()
                .map(|(idx, token)| CoinAllocation {
                    coin_id: idx as u32 + 1,
                    allocation: token.buy_amount_sol,
                })
                .collect(),
            investment_amount: investment,
            theme: self.state.selected_theme.clone().unwrap_or_default(),
            num_coins,
            split_type,
        });
        self.state.purchase_id = Some(created.purchase_id.clone());
        self.state.onchain_reroll_fees = 0.0;
        self.state.current_step = FlowStep::Rolling;
        self.pending = Some(PendingPurchase {
            user: user_key,
            purchase_id: created.purchase_id,
        });
        Ok(())
    }

    /// Completes a purchase left on `ROLLING`: waits out the rolling screen
    /// and loads the tokens the backend recorded.
    /// Does nothing when no purchase is pending.
    pub async fn finish_rolling(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        tokio::time::sleep(self.rolling_delay).await;
        if self.state.current_step == FlowStep::Rolling {
            self.state.current_step = FlowStep::RollingComplete;
        }
        if let Some(tokens) = self
            .selection
            .reconcile_purchase(&pending.user, &pending.purchase_id)
            .await
        {
            self.state.displayed_tokens = tokens;
        }
        tracing::info!(purchase_id = %pending.purchase_id, "purchase complete");
    }

    /// Replaces coins of the crate on chain and reloads its allocations.
    pub async fn reroll_coins(&mut self, slot_indices: &[usize]) -> Result<(), FlowError> {
        let (user, crate_id, settlement) = match self.current_crate_id() {
            Ok((user, current)) => (user, current.crate_id, current.settlement_address.clone()),
            Err(err) => return self.reject(err),
        };
        self.begin();
        let result = self
            .submit_coin_reroll(user, crate_id, &settlement, slot_indices)
            .await;
        self.finish(result)
    }

    async fn submit_coin_reroll(
        &mut self,
        user: Pubkey,
        crate_id: u64,
        settlement: &str,
        slot_indices: &[usize],
    ) -> Result<(), FlowError> {
        let quote = self
            .backend
            .reroll_coins(crate_id, slot_indices, &user.to_string())
            .await?;
        let wallet = self.wallet.as_ref().ok_or(FlowError::WalletNotConnected)?;
        let signature = self
            .submitter
            .submit(wallet, &quote.instruction, Vec::new(), None)
            .await?;
        tracing::info!(%signature, fee_paid = quote.fee_paid, "coins rerolled");
        self.state.transaction_signature = Some(signature.to_string());
        self.state.onchain_reroll_fees += quote.fee_paid;

        match self.backend.crate_details(settlement).await {
            Ok(details) => {
                if let Some(current) = self.state.current_crate.as_mut() {
                    current.coins = details.coins;
                }
            }
            Err(err) => tracing::warn!(%settlement, "failed to refresh crate: {err}"),
        }
        Ok(())
    }

    /// Confirms the crate on chain and moves to the portfolio.
    pub async fn confirm_crate(&mut self) -> Result<(), FlowError> {
        let (user, crate_id) = match self.current_crate_id() {
            Ok((user, current)) => (user, current.crate_id),
            Err(err) => return self.reject(err),
        };
        self.begin();
        let result = self.submit_confirmation(user, crate_id).await;
        self.finish(result)
    }

    async fn submit_confirmation(&mut self, user: Pubkey, crate_id: u64) -> Result<(), FlowError> {
        let descriptor = self
            .backend
            .confirm_crate(crate_id, &user.to_string())
            .await?;
        let wallet = self.wallet.as_ref().ok_or(FlowError::WalletNotConnected)?;
        let signature = self
            .submitter
            .submit(wallet, &descriptor, Vec::new(), None)
            .await?;
        self.state.transaction_signature = Some(signature.to_string());
        self.state.current_step = FlowStep::Portfolio;
        Ok(())
    }

    /// Sells `crate_id`, or the current crate when none is given. Zero is not
    /// a sellable id.
    pub async fn sell_crate(
        &mut self,
        expected_return: f64,
        crate_id: Option<u64>,
    ) -> Result<SellResult, FlowError> {
        let target = self.connected_user().and_then(|user| {
            crate_id
                .filter(|id| *id != 0)
                .or_else(|| self.state.current_crate.as_ref().map(|c| c.crate_id))
                .filter(|id| *id != 0)
                .map(|id| (user, id))
                .ok_or_else(|| FlowError::validation("No crate available"))
        });
        let (user, crate_id) = match target {
            Ok(target) => target,
            Err(err) => return self.reject(err),
        };
        self.begin();
        let result = self.submit_sale(user, crate_id, expected_return).await;
        self.finish(result)
    }

    async fn submit_sale(
        &mut self,
        user: Pubkey,
        crate_id: u64,
        expected_return: f64,
    ) -> Result<SellResult, FlowError> {
        let quote = self
            .backend
            .sell_crate(crate_id, expected_return, &user.to_string())
            .await?;
        let wallet = self.wallet.as_ref().ok_or(FlowError::WalletNotConnected)?;
        let signature = self
            .submitter
            .submit(wallet, &quote.instruction, Vec::new(), None)
            .await?
            .to_string();
        tracing::info!(%signature, crate_id, user_return = quote.user_return, "crate sold");
        self.state.transaction_signature = Some(signature.clone());
        Ok(SellResult {
            signature,
            user_return: quote.user_return,
            exit_fee: quote.exit_fee,
            roi: quote.roi,
            expected_return,
        })
    }
}
