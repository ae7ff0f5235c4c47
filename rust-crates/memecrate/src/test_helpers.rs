//! In-memory backend, network and wallet used by tests.

use crate::{
    backend::{
        BackendApi,
        BackendResult,
    },
    error::{
        BackendError,
        NetworkError,
        SignError,
    },
    model::{
        CachedTokens,
        CashoutReceipt,
        Category,
        CoinAllocation,
        CrateDetails,
        CreateCrateRequest,
        CreatedPurchase,
        GameStats,
        InstructionDescriptor,
        PortfolioSummary,
        PurchaseGroup,
        PurchaseToken,
        RerollQuote,
        RerolledToken,
        SellQuote,
        SignedSubmission,
        TokenInfo,
        TokenPnl,
        WalletRecord,
    },
    network::{
        LatestBlockhash,
        Network,
        NetworkResult,
    },
    signer::{
        WalletSigner,
        sign_with,
    },
};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{
        Keypair,
        Signature,
    },
    signer::Signer,
    system_instruction,
    transaction::Transaction,
};
use std::{
    collections::{
        HashMap,
        HashSet,
        VecDeque,
    },
    str::FromStr,
    sync::{
        Arc,
        Mutex,
    },
};

/// Ordered record of collaborator calls shared between fakes.
#[derive(Clone, Default, Debug)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

pub fn token(name: &str) -> TokenInfo {
    TokenInfo {
        name: name.to_string(),
        address: format!("Mint{name}"),
        image: Some(format!("{}.png", name.to_lowercase())),
        category: None,
        buy_amount_sol: None,
    }
}

pub fn tokens(names: &[&str]) -> Vec<TokenInfo> {
    names.iter().map(|n| token(n)).collect()
}

pub fn purchase_token(name: &str, amount: f64) -> PurchaseToken {
    PurchaseToken {
        mint_address: format!("Mint{name}"),
        token_name: name.to_string(),
        token_image: None,
        buy_amount_sol: amount,
    }
}

/// A system transfer signed by `user`, in descriptor form.
pub fn transfer_descriptor(user: &str, lamports: u64) -> InstructionDescriptor {
    let from = Pubkey::from_str(user).unwrap_or_else(|_| Pubkey::new_unique());
    let ix = system_instruction::transfer(&from, &Pubkey::new_unique(), lamports);
    InstructionDescriptor::from(&ix)
}

#[derive(Default)]
pub struct FakeBackendState {
    pub categories: Vec<Category>,
    pub stats: GameStats,
    pub batch: Vec<TokenInfo>,
    pub from_cache: bool,
    pub random_batches: VecDeque<Vec<TokenInfo>>,
    pub replacements: VecDeque<TokenInfo>,
    pub settlement_address: String,
    pub purchase_id: String,
    /// When unset, crate creation echoes the request tokens.
    pub created_tokens: Option<Vec<PurchaseToken>>,
    pub submit_signature: String,
    pub reroll_fee: f64,
    pub sell_quote: Option<SellQuote>,
    pub crate_coins: Vec<CoinAllocation>,
    pub wallet: Option<WalletRecord>,
    pub portfolio: PortfolioSummary,
    pub balance: f64,
    pub pnl: Vec<TokenPnl>,
    pub cashout: Option<CashoutReceipt>,
    pub sol_price: f64,
    pub failures: HashMap<&'static str, BackendError>,

    pub cache_requests: Vec<(String, String, u8)>,
    pub reroll_single_requests: Vec<(usize, Vec<TokenInfo>)>,
    pub create_requests: Vec<CreateCrateRequest>,
    pub submissions: Vec<SignedSubmission>,
    pub reroll_coins_requests: Vec<(u64, Vec<usize>)>,
    pub confirm_requests: Vec<u64>,
    pub sell_requests: Vec<(u64, f64)>,
    pub cashout_requests: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeBackendState>>,
    log: CallLog,
}

impl FakeBackend {
    pub fn new(log: CallLog) -> Self {
        let state = FakeBackendState {
            settlement_address: Pubkey::new_unique().to_string(),
            purchase_id: "purchase-1".to_string(),
            submit_signature: "relayed-signature".to_string(),
            sol_price: 150.0,
            ..FakeBackendState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            log,
        }
    }

    pub fn with_batch(self, batch: Vec<TokenInfo>) -> Self {
        self.state.lock().unwrap().batch = batch;
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeBackendState> {
        self.state.lock().unwrap()
    }

    pub fn fail(&self, op: &'static str, err: BackendError) {
        self.state().failures.insert(op, err);
    }

    pub fn succeed(&self, op: &'static str) {
        self.state().failures.remove(op);
    }

    fn record(&self, op: &'static str) -> BackendResult<()> {
        self.log.push(format!("backend.{op}"));
        match self.state().failures.get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl BackendApi for FakeBackend {
    async fn categories(&self) -> BackendResult<Vec<Category>> {
        self.record("categories")?;
        Ok(self.state().categories.clone())
    }

    async fn game_stats(&self) -> BackendResult<GameStats> {
        self.record("game_stats")?;
        Ok(self.state().stats.clone())
    }

    async fn cache_tokens(
        &self,
        user: &str,
        category: &str,
        num_coins: u8,
    ) -> BackendResult<Vec<TokenInfo>> {
        self.record("cache_tokens")?;
        let mut state = self.state();
        state
            .cache_requests
            .push((user.to_string(), category.to_string(), num_coins));
        Ok(state.batch.clone())
    }

    async fn cached_tokens(
        &self,
        _user: &str,
        _category: &str,
        _num_coins: u8,
    ) -> BackendResult<CachedTokens> {
        self.record("cached_tokens")?;
        let state = self.state();
        Ok(CachedTokens {
            tokens: state.batch.clone(),
            from_cache: state.from_cache,
        })
    }

    async fn random_tokens(
        &self,
        num_coins: u8,
        _category: &str,
    ) -> BackendResult<Vec<TokenInfo>> {
        self.record("random_tokens")?;
        let mut state = self.state();
        let scripted = state.random_batches.pop_front();
        Ok(match scripted {
            Some(batch) => batch,
            None => state
                .batch
                .iter()
                .take(num_coins as usize)
                .cloned()
                .collect(),
        })
    }

    async fn first_tokens(
        &self,
        num_coins: u8,
        _category: &str,
    ) -> BackendResult<Vec<TokenInfo>> {
        self.record("first_tokens")?;
        Ok(self
            .state()
            .batch
            .iter()
            .take(num_coins as usize)
            .cloned()
            .collect())
    }

    async fn reroll_single_token(
        &self,
        _user: &str,
        _category: &str,
        index: usize,
        current: &[TokenInfo],
    ) -> BackendResult<RerolledToken> {
        self.record("reroll_single_token")?;
        let mut state = self.state();
        state.reroll_single_requests.push((index, current.to_vec()));
        let token = state
            .replacements
            .pop_front()
            .ok_or_else(|| BackendError::Rejected("No replacement available".to_string()))?;
        Ok(RerolledToken { token, index })
    }

    async fn create_crate(&self, request: &CreateCrateRequest) -> BackendResult<CreatedPurchase> {
        self.record("create_crate")?;
        let mut state = self.state();
        state.create_requests.push(request.clone());
        Ok(CreatedPurchase {
            settlement_address: state.settlement_address.clone(),
            purchase_id: state.purchase_id.clone(),
            tokens: state
                .created_tokens
                .clone()
                .unwrap_or_else(|| request.tokens.clone()),
        })
    }

    async fn submit_signed_transaction(
        &self,
        submission: &SignedSubmission,
    ) -> BackendResult<String> {
        self.record("submit_signed_transaction")?;
        let mut state = self.state();
        state.submissions.push(submission.clone());
        Ok(state.submit_signature.clone())
    }

    async fn reroll_coins(
        &self,
        crate_id: u64,
        slot_indices: &[usize],
        user: &str,
    ) -> BackendResult<RerollQuote> {
        self.record("reroll_coins")?;
        let mut state = self.state();
        state
            .reroll_coins_requests
            .push((crate_id, slot_indices.to_vec()));
        Ok(RerollQuote {
            instruction: transfer_descriptor(user, 1_000),
            fee_paid: state.reroll_fee,
        })
    }

    async fn confirm_crate(
        &self,
        crate_id: u64,
        user: &str,
    ) -> BackendResult<InstructionDescriptor> {
        self.record("confirm_crate")?;
        self.state().confirm_requests.push(crate_id);
        Ok(transfer_descriptor(user, 1_000))
    }

    async fn sell_crate(
        &self,
        crate_id: u64,
        expected_return: f64,
        user: &str,
    ) -> BackendResult<SellQuote> {
        self.record("sell_crate")?;
        let mut state = self.state();
        state.sell_requests.push((crate_id, expected_return));
        Ok(state.sell_quote.clone().unwrap_or_else(|| SellQuote {
            instruction: transfer_descriptor(user, 1_000),
            user_return: expected_return * 0.99,
            exit_fee: expected_return * 0.01,
            roi: 0.0,
        }))
    }

    async fn crate_details(&self, _settlement_address: &str) -> BackendResult<CrateDetails> {
        self.record("crate_details")?;
        Ok(CrateDetails {
            coins: self.state().crate_coins.clone(),
        })
    }

    async fn user_wallet(&self, _user: &str) -> BackendResult<Option<WalletRecord>> {
        self.record("user_wallet")?;
        Ok(self.state().wallet.clone())
    }

    async fn portfolio(&self, _user: &str) -> BackendResult<PortfolioSummary> {
        self.record("portfolio")?;
        Ok(self.state().portfolio.clone())
    }

    async fn balance(&self, _user: &str) -> BackendResult<f64> {
        self.record("balance")?;
        Ok(self.state().balance)
    }

    async fn tokens_pnl(&self, _purchase_id: &str) -> BackendResult<Vec<TokenPnl>> {
        self.record("tokens_pnl")?;
        Ok(self.state().pnl.clone())
    }

    async fn cashout(&self, user: &str, purchase_id: &str) -> BackendResult<CashoutReceipt> {
        self.record("cashout")?;
        let mut state = self.state();
        state
            .cashout_requests
            .push((user.to_string(), purchase_id.to_string()));
        state
            .cashout
            .clone()
            .ok_or_else(|| BackendError::Rejected("Nothing to cash out".to_string()))
    }

    async fn sol_price(&self) -> BackendResult<f64> {
        self.record("sol_price")?;
        Ok(self.state().sol_price)
    }

    async fn sol_to_usd(&self, sol: f64) -> BackendResult<f64> {
        self.record("sol_to_usd")?;
        Ok(sol * self.state().sol_price)
    }
}

/// Builds a grouped purchase record for wallet responses.
pub fn purchase_group(purchase_id: &str, tokens: Vec<PurchaseToken>) -> PurchaseGroup {
    PurchaseGroup {
        purchase_id: purchase_id.to_string(),
        category: "pepe".to_string(),
        tokens,
        ..PurchaseGroup::default()
    }
}

pub struct FakeNetworkState {
    pub blockhash: LatestBlockhash,
    pub existing_accounts: HashSet<Pubkey>,
    pub rent_exempt_minimum: u64,
    pub sent: Vec<Transaction>,
    pub confirmations: Vec<(Signature, LatestBlockhash)>,
    pub send_error: Option<NetworkError>,
    pub confirm_error: Option<NetworkError>,
}

#[derive(Clone)]
pub struct FakeNetwork {
    state: Arc<Mutex<FakeNetworkState>>,
    log: CallLog,
}

impl FakeNetwork {
    pub fn new(log: CallLog) -> Self {
        let state = FakeNetworkState {
            blockhash: LatestBlockhash {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 1_000,
            },
            existing_accounts: HashSet::new(),
            rent_exempt_minimum: 890_880,
            sent: Vec::new(),
            confirmations: Vec::new(),
            send_error: None,
            confirm_error: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            log,
        }
    }

    pub fn current_blockhash(&self) -> LatestBlockhash {
        self.state.lock().unwrap().blockhash
    }

    pub fn rotate_blockhash(&self) -> LatestBlockhash {
        let mut state = self.state.lock().unwrap();
        state.blockhash = LatestBlockhash {
            blockhash: Hash::new_unique(),
            last_valid_block_height: state.blockhash.last_valid_block_height + 150,
        };
        state.blockhash
    }

    pub fn add_account(&self, address: Pubkey) {
        self.state.lock().unwrap().existing_accounts.insert(address);
    }

    pub fn rent_exempt_minimum(&self) -> u64 {
        self.state.lock().unwrap().rent_exempt_minimum
    }

    pub fn fail_confirmation(&self, err: NetworkError) {
        self.state.lock().unwrap().confirm_error = Some(err);
    }

    pub fn fail_send(&self, err: NetworkError) {
        self.state.lock().unwrap().send_error = Some(err);
    }

    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn confirmations(&self) -> Vec<(Signature, LatestBlockhash)> {
        self.state.lock().unwrap().confirmations.clone()
    }
}

impl Network for FakeNetwork {
    async fn latest_blockhash(&self) -> NetworkResult<LatestBlockhash> {
        self.log.push("network.latest_blockhash");
        Ok(self.state.lock().unwrap().blockhash)
    }

    async fn account_exists(&self, address: &Pubkey) -> NetworkResult<bool> {
        self.log.push("network.account_exists");
        Ok(self.state.lock().unwrap().existing_accounts.contains(address))
    }

    async fn minimum_balance_for_rent_exemption(&self, _data_len: usize) -> NetworkResult<u64> {
        self.log.push("network.rent_exemption");
        Ok(self.state.lock().unwrap().rent_exempt_minimum)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> NetworkResult<Signature> {
        self.log.push("network.send");
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.send_error.clone() {
            return Err(err);
        }
        state.sent.push(transaction.clone());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        blockhash: &LatestBlockhash,
    ) -> NetworkResult<()> {
        self.log.push("network.confirm");
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.confirm_error.clone() {
            return Err(err);
        }
        state.confirmations.push((*signature, *blockhash));
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub enum SignBehaviour {
    Approve,
    Reject(String),
    Fail(String),
}

/// Wallet whose answer to a signature prompt is scripted.
#[derive(Clone)]
pub struct FakeWallet {
    keypair: Arc<Keypair>,
    behaviour: Arc<Mutex<SignBehaviour>>,
    signed: Arc<Mutex<Vec<Transaction>>>,
    log: CallLog,
}

impl FakeWallet {
    pub fn approving(log: CallLog) -> Self {
        Self::with_behaviour(log, SignBehaviour::Approve)
    }

    pub fn rejecting(log: CallLog, message: &str) -> Self {
        Self::with_behaviour(log, SignBehaviour::Reject(message.to_string()))
    }

    pub fn failing(log: CallLog, message: &str) -> Self {
        Self::with_behaviour(log, SignBehaviour::Fail(message.to_string()))
    }

    fn with_behaviour(log: CallLog, behaviour: SignBehaviour) -> Self {
        Self {
            keypair: Arc::new(Keypair::new()),
            behaviour: Arc::new(Mutex::new(behaviour)),
            signed: Arc::new(Mutex::new(Vec::new())),
            log,
        }
    }

    pub fn set_behaviour(&self, behaviour: SignBehaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn signed_transactions(&self) -> Vec<Transaction> {
        self.signed.lock().unwrap().clone()
    }
}

impl WalletSigner for FakeWallet {
    fn public_key(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, SignError> {
        self.log.push("wallet.sign");
        let behaviour = self.behaviour.lock().unwrap().clone();
        match behaviour {
            SignBehaviour::Approve => {
                let signed = sign_with(&self.keypair, transaction)?;
                self.signed.lock().unwrap().push(signed.clone());
                Ok(signed)
            }
            SignBehaviour::Reject(msg) => Err(SignError::from_message(msg)),
            SignBehaviour::Fail(msg) => Err(SignError::Failed(msg)),
        }
    }
}
