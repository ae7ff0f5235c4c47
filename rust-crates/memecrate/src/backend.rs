use crate::{
    error::BackendError,
    model::{
        AccountKeyDescriptor,
        CachedTokens,
        CashoutReceipt,
        Category,
        CoinAllocation,
        CrateDetails,
        CreateCrateRequest,
        CreatedPurchase,
        DEFAULT_CATEGORY,
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
};
use chrono::DateTime;
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    de::DeserializeOwned,
};
use serde_json::Value;

#[cfg(test)]
mod tests;

pub type BackendResult<T> = Result<T, BackendError>;

/// The game backend. Every call is one request; nothing is retried here.
pub trait BackendApi {
    fn categories(&self) -> impl Future<Output = BackendResult<Vec<Category>>> + Send;

    fn game_stats(&self) -> impl Future<Output = BackendResult<GameStats>> + Send;

    /// Asks the backend to materialise and remember a random batch for the
    /// user, theme and coin count.
    fn cache_tokens(
        &self,
        user: &str,
        category: &str,
        num_coins: u8,
    ) -> impl Future<Output = BackendResult<Vec<TokenInfo>>> + Send;

    fn cached_tokens(
        &self,
        user: &str,
        category: &str,
        num_coins: u8,
    ) -> impl Future<Output = BackendResult<CachedTokens>> + Send;

    fn random_tokens(
        &self,
        num_coins: u8,
        category: &str,
    ) -> impl Future<Output = BackendResult<Vec<TokenInfo>>> + Send;

    fn first_tokens(
        &self,
        num_coins: u8,
        category: &str,
    ) -> impl Future<Output = BackendResult<Vec<TokenInfo>>> + Send;

    fn reroll_single_token(
        &self,
        user: &str,
        category: &str,
        index: usize,
        current: &[TokenInfo],
    ) -> impl Future<Output = BackendResult<RerolledToken>> + Send;

    fn create_crate(
        &self,
        request: &CreateCrateRequest,
    ) -> impl Future<Output = BackendResult<CreatedPurchase>> + Send;

    fn submit_signed_transaction(
        &self,
        submission: &SignedSubmission,
    ) -> impl Future<Output = BackendResult<String>> + Send;

    fn reroll_coins(
        &self,
        crate_id: u64,
        slot_indices: &[usize],
        user: &str,
    ) -> impl Future<Output = BackendResult<RerollQuote>> + Send;

    fn confirm_crate(
        &self,
        crate_id: u64,
        user: &str,
    ) -> impl Future<Output = BackendResult<InstructionDescriptor>> + Send;

    fn sell_crate(
        &self,
        crate_id: u64,
        expected_return: f64,
        user: &str,
    ) -> impl Future<Output = BackendResult<SellQuote>> + Send;

    fn crate_details(
        &self,
        settlement_address: &str,
    ) -> impl Future<Output = BackendResult<CrateDetails>> + Send;

    /// `None` when the backend has never seen this user.
    fn user_wallet(
        &self,
        user: &str,
    ) -> impl Future<Output = BackendResult<Option<WalletRecord>>> + Send;

    fn portfolio(
        &self,
        user: &str,
    ) -> impl Future<Output = BackendResult<PortfolioSummary>> + Send;

    fn balance(&self, user: &str) -> impl Future<Output = BackendResult<f64>> + Send;

    fn tokens_pnl(
        &self,
        purchase_id: &str,
    ) -> impl Future<Output = BackendResult<Vec<TokenPnl>>> + Send;

    fn cashout(
        &self,
        user: &str,
        purchase_id: &str,
    ) -> impl Future<Output = BackendResult<CashoutReceipt>> + Send;

    fn sol_price(&self) -> impl Future<Output = BackendResult<f64>> + Send;

    fn sol_to_usd(&self, sol: f64) -> impl Future<Output = BackendResult<f64>> + Send;
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> BackendResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/game{}", self.base_url, endpoint)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> BackendResult<T> {
        let url = self.url(endpoint);
        tracing::debug!(%url, "backend GET");
        let request = self.http.get(url).query(query);
        Self::exchange(request).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> BackendResult<T> {
        let url = self.url(endpoint);
        tracing::debug!(%url, "backend POST");
        let request = self.http.post(url).json(body);
        Self::exchange(request).await
    }

    /// Sends the request and unwraps the `{ success, error }` envelope.
    async fn exchange<T: DeserializeOwned>(
        request: reqwest::RequestBuilder,
    ) -> BackendResult<T> {
        let res = request
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        decode_envelope(status, &bytes)
    }
}

fn decode_envelope<T: DeserializeOwned>(status: StatusCode, bytes: &[u8]) -> BackendResult<T> {
    if !status.is_success() {
        return Err(BackendError::Http {
            status: status.as_u16(),
            body: String::from_utf8_lossy(bytes).into_owned(),
        });
    }
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(BackendError::Unreachable("empty response".to_string()));
    }
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    if !envelope.success {
        return Err(BackendError::Rejected(
            envelope.error.unwrap_or_else(|| "Request failed".to_string()),
        ));
    }
    serde_json::from_slice(bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

impl BackendApi for BackendClient {
    async fn categories(&self) -> BackendResult<Vec<Category>> {
        let dto: CategoriesDto = self.get("/categories", &[]).await?;
        Ok(dto.categories.into_iter().map(Into::into).collect())
    }

    async fn game_stats(&self) -> BackendResult<GameStats> {
        let dto: GameStatsDto = self.get("/stats", &[]).await?;
        Ok(dto.into())
    }

    async fn cache_tokens(
        &self,
        user: &str,
        category: &str,
        num_coins: u8,
    ) -> BackendResult<Vec<TokenInfo>> {
        let body = CacheTokensBody {
            user_public_key: user,
            category,
            num_coins,
        };
        let dto: TokensDto = self.post("/tokens/cache", &body).await?;
        Ok(dto.into_tokens())
    }

    async fn cached_tokens(
        &self,
        user: &str,
        category: &str,
        num_coins: u8,
    ) -> BackendResult<CachedTokens> {
        let query = [
            ("userPublicKey", user.to_string()),
            ("category", category.to_string()),
            ("numCoins", num_coins.to_string()),
        ];
        let dto: TokensDto = self.get("/tokens/cached", &query).await?;
        let from_cache = dto.from_cache;
        Ok(CachedTokens {
            tokens: dto.into_tokens(),
            from_cache,
        })
    }

    async fn random_tokens(
        &self,
        num_coins: u8,
        category: &str,
    ) -> BackendResult<Vec<TokenInfo>> {
        let body = RandomTokensBody {
            num_coins,
            category,
        };
        let dto: TokensDto = self.post("/tokens", &body).await?;
        Ok(dto.into_tokens())
    }

    async fn first_tokens(
        &self,
        num_coins: u8,
        category: &str,
    ) -> BackendResult<Vec<TokenInfo>> {
        let query = [
            ("category", category.to_string()),
            ("numCoins", num_coins.to_string()),
        ];
        let dto: TokensDto = self.get("/tokens/first", &query).await?;
        Ok(dto.into_tokens())
    }

    async fn reroll_single_token(
        &self,
        user: &str,
        category: &str,
        index: usize,
        current: &[TokenInfo],
    ) -> BackendResult<RerolledToken> {
        let body = RerollSingleBody {
            user_public_key: user,
            category,
            token_index: index,
            current_tokens: current.iter().map(TokenDto::from).collect(),
        };
        let dto: RerollSingleDto = self.post("/tokens/reroll-single", &body).await?;
        Ok(RerolledToken {
            token: dto.token.into(),
            index: dto.token_index.unwrap_or(index),
        })
    }

    async fn create_crate(
        &self,
        request: &CreateCrateRequest,
    ) -> BackendResult<CreatedPurchase> {
        let body = CreateCrateBody {
            investment_amount: request.investment_amount,
            theme: &request.theme,
            num_coins: request.num_coins,
            split_type: request.split_type.as_str(),
            user_public_key: &request.user_public_key,
            tokens: request.tokens.iter().map(PurchaseTokenDto::from).collect(),
        };
        let dto: CreateCrateDto = self.post("/create-crate", &body).await?;
        let (Some(settlement_address), Some(purchase_id)) =
            (dto.generated_wallet_public_key, dto.purchase_id)
        else {
            return Err(BackendError::Rejected(
                "Failed to create crate or get generated wallet from backend".to_string(),
            ));
        };
        Ok(CreatedPurchase {
            settlement_address,
            purchase_id,
            tokens: dto
                .tokens
                .unwrap_or_default()
                .into_iter()
                .map(Into::into)
                .collect(),
        })
    }

    async fn submit_signed_transaction(
        &self,
        submission: &SignedSubmission,
    ) -> BackendResult<String> {
        let body = SubmitSignedBody {
            signed_transaction: &submission.signed_transaction,
            blockhash: &submission.blockhash,
            last_valid_block_height: submission.last_valid_block_height,
            purchase_id: &submission.purchase_id,
            reroll_count: submission.reroll_count,
        };
        let dto: SignatureDto = self.post("/submit-signed-transaction", &body).await?;
        dto.signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                BackendError::Rejected("Failed to submit signed transaction".to_string())
            })
    }

    async fn reroll_coins(
        &self,
        crate_id: u64,
        slot_indices: &[usize],
        user: &str,
    ) -> BackendResult<RerollQuote> {
        let body = RerollCoinsBody {
            crate_id,
            slot_indices,
            user_public_key: user,
        };
        let dto: RerollCoinsDto = self.post("/reroll-coins", &body).await?;
        Ok(RerollQuote {
            instruction: dto.transaction_instruction.into(),
            fee_paid: dto.fee_paid.unwrap_or_default(),
        })
    }

    async fn confirm_crate(
        &self,
        crate_id: u64,
        user: &str,
    ) -> BackendResult<InstructionDescriptor> {
        let body = UserBody {
            user_public_key: user,
        };
        let endpoint = format!("/confirm-crate/{crate_id}");
        let dto: ConfirmCrateDto = self.post(&endpoint, &body).await?;
        Ok(dto.transaction_instruction.into())
    }

    async fn sell_crate(
        &self,
        crate_id: u64,
        expected_return: f64,
        user: &str,
    ) -> BackendResult<SellQuote> {
        let body = SellCrateBody {
            crate_id,
            expected_return,
            user_public_key: user,
        };
        let dto: SellCrateDto = self.post("/sell-crate", &body).await?;
        Ok(SellQuote {
            instruction: dto.transaction_instruction.into(),
            user_return: dto.user_return.unwrap_or_default(),
            exit_fee: dto.exit_fee.unwrap_or_default(),
            roi: dto.roi.unwrap_or_default(),
        })
    }

    async fn crate_details(&self, settlement_address: &str) -> BackendResult<CrateDetails> {
        let endpoint = format!("/crate/{settlement_address}");
        let dto: CrateDetailsDto = self.get(&endpoint, &[]).await?;
        Ok(CrateDetails {
            coins: dto.crate_.coins.into_iter().map(Into::into).collect(),
        })
    }

    async fn user_wallet(&self, user: &str) -> BackendResult<Option<WalletRecord>> {
        let endpoint = format!("/wallet/{user}");
        let dto: UserWalletDto = self.get(&endpoint, &[]).await?;
        Ok(dto.wallet.map(Into::into))
    }

    async fn portfolio(&self, user: &str) -> BackendResult<PortfolioSummary> {
        let endpoint = format!("/portfolio/{user}");
        let dto: PortfolioDto = self.get(&endpoint, &[]).await?;
        Ok(dto.into())
    }

    async fn balance(&self, user: &str) -> BackendResult<f64> {
        let endpoint = format!("/balance/{user}");
        let dto: BalanceDto = self.get(&endpoint, &[]).await?;
        Ok(dto.balance.unwrap_or_default())
    }

    async fn tokens_pnl(&self, purchase_id: &str) -> BackendResult<Vec<TokenPnl>> {
        let endpoint = format!("/tokens-pnl/{purchase_id}");
        let dto: TokensPnlDto = self.get(&endpoint, &[]).await?;
        Ok(dto.tokens.into_iter().map(Into::into).collect())
    }

    async fn cashout(&self, user: &str, purchase_id: &str) -> BackendResult<CashoutReceipt> {
        let body = CashoutBody {
            user_public_key: user,
            purchase_id,
        };
        let dto: CashoutDto = self.post("/cashout", &body).await?;
        Ok(dto.into())
    }

    async fn sol_price(&self) -> BackendResult<f64> {
        let dto: SolPriceDto = self.get("/sol-price", &[]).await?;
        dto.price
            .ok_or_else(|| BackendError::Decode("missing price".to_string()))
    }

    async fn sol_to_usd(&self, sol: f64) -> BackendResult<f64> {
        let body = SolToUsdBody { sol_amount: sol };
        let dto: SolToUsdDto = self.post("/sol-to-usd", &body).await?;
        dto.usd_amount
            .ok_or_else(|| BackendError::Decode("missing usdAmount".to_string()))
    }
}

/// Accepts a number, a numeric string, or null. Unparseable strings read as
/// absent rather than failing the whole payload.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

impl From<&TokenInfo> for TokenDto {
    fn from(token: &TokenInfo) -> Self {
        TokenDto {
            category: token.category.clone(),
            name: token.name.clone(),
            address: token.address.clone(),
            image: token.image.clone(),
        }
    }
}

impl From<TokenDto> for TokenInfo {
    fn from(dto: TokenDto) -> Self {
        TokenInfo {
            name: dto.name,
            address: dto.address,
            image: dto.image,
            category: dto.category,
            buy_amount_sol: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokensDto {
    #[serde(default)]
    tokens: Vec<TokenDto>,
    #[serde(default)]
    from_cache: bool,
}

impl TokensDto {
    fn into_tokens(self) -> Vec<TokenInfo> {
        self.tokens.into_iter().map(Into::into).collect()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryDto {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    contract_theme: Option<String>,
    #[serde(default)]
    pool_size: Option<u32>,
}

impl From<CategoryDto> for Category {
    fn from(dto: CategoryDto) -> Self {
        let contract_theme = dto
            .contract_theme
            .unwrap_or_else(|| dto.name.to_lowercase());
        Category {
            display_name: dto.display_name.unwrap_or_else(|| dto.name.clone()),
            name: dto.name,
            description: dto.description,
            image: dto.image,
            contract_theme,
            pool_size: dto.pool_size,
        }
    }
}

#[derive(Deserialize)]
struct CategoriesDto {
    #[serde(default)]
    categories: Vec<CategoryDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameStatsDto {
    #[serde(default)]
    total_crates_created: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_volume: Option<f64>,
    #[serde(default)]
    active_crates: u64,
}

impl From<GameStatsDto> for GameStats {
    fn from(dto: GameStatsDto) -> Self {
        GameStats {
            total_crates_created: dto.total_crates_created,
            total_volume: dto.total_volume.unwrap_or_default(),
            active_crates: dto.active_crates,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheTokensBody<'a> {
    user_public_key: &'a str,
    category: &'a str,
    num_coins: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RandomTokensBody<'a> {
    num_coins: u8,
    category: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RerollSingleBody<'a> {
    user_public_key: &'a str,
    category: &'a str,
    token_index: usize,
    current_tokens: Vec<TokenDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RerollSingleDto {
    token: TokenDto,
    #[serde(default)]
    token_index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseTokenDto {
    #[serde(default)]
    mint_address: String,
    #[serde(default)]
    token_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_image: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    buy_amount_sol: Option<f64>,
}

impl From<&PurchaseToken> for PurchaseTokenDto {
    fn from(token: &PurchaseToken) -> Self {
        PurchaseTokenDto {
            mint_address: token.mint_address.clone(),
            token_name: token.token_name.clone(),
            token_image: token.token_image.clone(),
            buy_amount_sol: Some(token.buy_amount_sol),
        }
    }
}

impl From<PurchaseTokenDto> for PurchaseToken {
    fn from(dto: PurchaseTokenDto) -> Self {
        PurchaseToken {
            mint_address: dto.mint_address,
            token_name: dto.token_name,
            token_image: dto.token_image,
            buy_amount_sol: dto.buy_amount_sol.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCrateBody<'a> {
    investment_amount: f64,
    theme: &'a str,
    num_coins: u8,
    split_type: &'a str,
    user_public_key: &'a str,
    tokens: Vec<PurchaseTokenDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCrateDto {
    #[serde(default)]
    generated_wallet_public_key: Option<String>,
    #[serde(default)]
    purchase_id: Option<String>,
    #[serde(default)]
    tokens: Option<Vec<PurchaseTokenDto>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitSignedBody<'a> {
    signed_transaction: &'a str,
    blockhash: &'a str,
    last_valid_block_height: u64,
    purchase_id: &'a str,
    reroll_count: u32,
}

#[derive(Deserialize)]
struct SignatureDto {
    #[serde(default)]
    signature: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountKeyDto {
    pubkey: String,
    #[serde(default)]
    is_signer: bool,
    #[serde(default)]
    is_writable: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstructionDto {
    program_id: String,
    #[serde(default)]
    keys: Vec<AccountKeyDto>,
    #[serde(default)]
    data: Vec<u8>,
}

impl From<InstructionDto> for InstructionDescriptor {
    fn from(dto: InstructionDto) -> Self {
        InstructionDescriptor {
            program_id: dto.program_id,
            keys: dto
                .keys
                .into_iter()
                .map(|k| AccountKeyDescriptor {
                    pubkey: k.pubkey,
                    is_signer: k.is_signer,
                    is_writable: k.is_writable,
                })
                .collect(),
            data: dto.data,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RerollCoinsBody<'a> {
    crate_id: u64,
    slot_indices: &'a [usize],
    user_public_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RerollCoinsDto {
    transaction_instruction: InstructionDto,
    #[serde(default, deserialize_with = "lenient_f64")]
    fee_paid: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserBody<'a> {
    user_public_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmCrateDto {
    transaction_instruction: InstructionDto,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SellCrateBody<'a> {
    crate_id: u64,
    expected_return: f64,
    user_public_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SellCrateDto {
    transaction_instruction: InstructionDto,
    #[serde(default, deserialize_with = "lenient_f64")]
    user_return: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    exit_fee: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    roi: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinDto {
    #[serde(default)]
    coin_id: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    allocation: Option<f64>,
}

impl From<CoinDto> for CoinAllocation {
    fn from(dto: CoinDto) -> Self {
        CoinAllocation {
            coin_id: dto.coin_id,
            allocation: dto.allocation.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize, Default)]
struct CrateDto {
    #[serde(default)]
    coins: Vec<CoinDto>,
}

#[derive(Deserialize)]
struct CrateDetailsDto {
    #[serde(rename = "crate", default)]
    crate_: CrateDto,
}

/// One entry of `wallet.tokenPurchases`. Newer backends send grouped
/// purchases with a `tokens` array; older ones send one flat entry per token.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseEntryDto {
    #[serde(default)]
    purchase_id: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    initial_investment: Option<f64>,
    #[serde(default)]
    tokens: Option<Vec<PurchaseTokenDto>>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_invested: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_current_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_pnl_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_pnl_percent: Option<f64>,
    #[serde(default)]
    is_positive: Option<bool>,
    #[serde(default, deserialize_with = "lenient_f64")]
    purchased_at: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    created_at: Option<f64>,
    #[serde(flatten)]
    legacy: PurchaseTokenDto,
}

impl From<PurchaseEntryDto> for PurchaseGroup {
    fn from(dto: PurchaseEntryDto) -> Self {
        let tokens = match dto.tokens {
            Some(tokens) => tokens.into_iter().map(Into::into).collect(),
            None if !dto.legacy.mint_address.is_empty() => vec![dto.legacy.into()],
            None => Vec::new(),
        };
        let purchased_at = dto
            .purchased_at
            .or(dto.created_at)
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64));
        PurchaseGroup {
            purchase_id: dto.purchase_id.unwrap_or_else(|| "unknown".to_string()),
            category: dto
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            initial_investment: dto.initial_investment,
            tokens,
            total_invested: dto.total_invested,
            total_current_value: dto.total_current_value,
            total_pnl_value: dto.total_pnl_value,
            total_pnl_percent: dto.total_pnl_percent,
            is_positive: dto.is_positive,
            purchased_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletDto {
    #[serde(default)]
    user_public_key: String,
    #[serde(default)]
    generated_wallet_public_key: Option<String>,
    #[serde(default)]
    token_purchases: Vec<PurchaseEntryDto>,
}

impl From<WalletDto> for WalletRecord {
    fn from(dto: WalletDto) -> Self {
        WalletRecord {
            user_public_key: dto.user_public_key,
            settlement_address: dto.generated_wallet_public_key,
            purchases: dto.token_purchases.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Deserialize)]
struct UserWalletDto {
    #[serde(default)]
    wallet: Option<WalletDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortfolioDto {
    #[serde(default)]
    crates: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_investment: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_value: Option<f64>,
    #[serde(default, rename = "totalROI", deserialize_with = "lenient_f64")]
    total_roi: Option<f64>,
}

impl From<PortfolioDto> for PortfolioSummary {
    fn from(dto: PortfolioDto) -> Self {
        PortfolioSummary {
            crate_count: dto.crates.len(),
            total_investment: dto.total_investment.unwrap_or_default(),
            total_value: dto.total_value.unwrap_or_default(),
            total_roi: dto.total_roi.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct BalanceDto {
    #[serde(default, deserialize_with = "lenient_f64")]
    balance: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPnlDto {
    #[serde(default)]
    token_name: Option<String>,
    #[serde(default)]
    mint_address: String,
    #[serde(default)]
    token_image: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    invested: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    current_value: Option<f64>,
    #[serde(default)]
    pnl: String,
    #[serde(default)]
    is_positive: bool,
}

impl From<TokenPnlDto> for TokenPnl {
    fn from(dto: TokenPnlDto) -> Self {
        TokenPnl {
            token_name: dto
                .token_name
                .unwrap_or_else(|| "Unknown Token".to_string()),
            mint_address: dto.mint_address,
            token_image: dto.token_image,
            invested: dto.invested.unwrap_or_default(),
            current_value: dto.current_value.unwrap_or_default(),
            pnl: dto.pnl,
            is_positive: dto.is_positive,
        }
    }
}

#[derive(Deserialize)]
struct TokensPnlDto {
    #[serde(default)]
    tokens: Vec<TokenPnlDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CashoutBody<'a> {
    user_public_key: &'a str,
    purchase_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashoutDto {
    #[serde(default)]
    signature: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_sol_received: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    fee_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    user_amount: Option<f64>,
}

impl From<CashoutDto> for CashoutReceipt {
    fn from(dto: CashoutDto) -> Self {
        CashoutReceipt {
            signature: dto.signature,
            total_sol_received: dto.total_sol_received.unwrap_or_default(),
            fee_amount: dto.fee_amount,
            user_amount: dto.user_amount,
        }
    }
}

#[derive(Deserialize)]
struct SolPriceDto {
    #[serde(default, deserialize_with = "lenient_f64")]
    price: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SolToUsdBody {
    sol_amount: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolToUsdDto {
    #[serde(default, deserialize_with = "lenient_f64")]
    usd_amount: Option<f64>,
}
