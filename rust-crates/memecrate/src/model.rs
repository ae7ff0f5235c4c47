use chrono::{
    DateTime,
    Utc,
};
use std::fmt;

/// Coin counts a crate can be built with.
pub const VALID_COIN_COUNTS: [u8; 4] = [2, 4, 6, 8];

pub const DEFAULT_INVESTMENT_AMOUNT: f64 = 0.5;
pub const DEFAULT_NUM_COINS: u8 = 4;
pub const DEFAULT_CATEGORY: &str = "celebrities";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlowStep {
    #[default]
    ChooseAmount,
    PickCategory,
    ChooseCoins,
    ChooseAllocation,
    ConfirmChoices,
    Rolling,
    RollingComplete,
    Reroll,
    Portfolio,
    CashOut,
    Success,
}

impl FlowStep {
    pub const ALL: [FlowStep; 11] = [
        FlowStep::ChooseAmount,
        FlowStep::PickCategory,
        FlowStep::ChooseCoins,
        FlowStep::ChooseAllocation,
        FlowStep::ConfirmChoices,
        FlowStep::Rolling,
        FlowStep::RollingComplete,
        FlowStep::Reroll,
        FlowStep::Portfolio,
        FlowStep::CashOut,
        FlowStep::Success,
    ];

    /// Steps the user configures before any value moves.
    pub fn is_selection(self) -> bool {
        self < FlowStep::Rolling
    }

    pub fn next(self) -> Option<FlowStep> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FlowStep::ChooseAmount => "CHOOSE_AMOUNT",
            FlowStep::PickCategory => "PICK_CATEGORY",
            FlowStep::ChooseCoins => "CHOOSE_COINS",
            FlowStep::ChooseAllocation => "CHOOSE_ALLOCATION",
            FlowStep::ConfirmChoices => "CONFIRM_CHOICES",
            FlowStep::Rolling => "ROLLING",
            FlowStep::RollingComplete => "ROLLING_COMPLETE",
            FlowStep::Reroll => "REROLL",
            FlowStep::Portfolio => "PORTFOLIO",
            FlowStep::CashOut => "CASH_OUT",
            FlowStep::Success => "SUCCESS",
        };
        write!(f, "{label}")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AllocationType {
    #[default]
    Equal,
    Random,
}

impl AllocationType {
    pub fn as_str(self) -> &'static str {
        match self {
            AllocationType::Equal => "equal",
            AllocationType::Random => "random",
        }
    }
}

/// A candidate or selected token as shown to the user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenInfo {
    pub name: String,
    pub address: String,
    pub image: Option<String>,
    pub category: Option<String>,
    /// Spend assigned to this token once a purchase has been created.
    pub buy_amount_sol: Option<f64>,
}

impl From<&PurchaseToken> for TokenInfo {
    fn from(token: &PurchaseToken) -> Self {
        TokenInfo {
            name: token.token_name.clone(),
            address: token.mint_address.clone(),
            image: token.token_image.clone(),
            category: None,
            buy_amount_sol: Some(token.buy_amount_sol),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub contract_theme: String,
    pub pool_size: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CachedTokens {
    pub tokens: Vec<TokenInfo>,
    pub from_cache: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RerolledToken {
    pub token: TokenInfo,
    pub index: usize,
}

/// One token line of a purchase: what is bought and how much is spent on it.
#[derive(Clone, Debug, PartialEq)]
pub struct PurchaseToken {
    pub mint_address: String,
    pub token_name: String,
    pub token_image: Option<String>,
    pub buy_amount_sol: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateCrateRequest {
    pub investment_amount: f64,
    pub theme: String,
    pub num_coins: u8,
    pub split_type: AllocationType,
    pub user_public_key: String,
    pub tokens: Vec<PurchaseToken>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreatedPurchase {
    pub settlement_address: String,
    pub purchase_id: String,
    pub tokens: Vec<PurchaseToken>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedSubmission {
    pub signed_transaction: String,
    pub blockhash: String,
    pub last_valid_block_height: u64,
    pub purchase_id: String,
    pub reroll_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountKeyDescriptor {
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// Backend issued instruction in string form, turned into a native
/// instruction by the submitter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionDescriptor {
    pub program_id: String,
    pub keys: Vec<AccountKeyDescriptor>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RerollQuote {
    pub instruction: InstructionDescriptor,
    pub fee_paid: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SellQuote {
    pub instruction: InstructionDescriptor,
    pub user_return: f64,
    pub exit_fee: f64,
    pub roi: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SellResult {
    pub signature: String,
    pub user_return: f64,
    pub exit_fee: f64,
    pub roi: f64,
    pub expected_return: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CoinAllocation {
    pub coin_id: u32,
    pub allocation: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CrateDetails {
    pub coins: Vec<CoinAllocation>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CrateData {
    /// Zero for crates created through a settlement transfer.
    pub crate_id: u64,
    pub settlement_address: String,
    pub coins: Vec<CoinAllocation>,
    pub investment_amount: f64,
    pub theme: String,
    pub num_coins: u8,
    pub split_type: AllocationType,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PurchaseGroup {
    pub purchase_id: String,
    pub category: String,
    pub initial_investment: Option<f64>,
    pub tokens: Vec<PurchaseToken>,
    pub total_invested: Option<f64>,
    pub total_current_value: Option<f64>,
    pub total_pnl_value: Option<f64>,
    pub total_pnl_percent: Option<f64>,
    pub is_positive: Option<bool>,
    pub purchased_at: Option<DateTime<Utc>>,
}

impl PurchaseGroup {
    pub fn total_spend(&self) -> f64 {
        self.tokens.iter().map(|t| t.buy_amount_sol).sum()
    }

    pub fn has_pnl(&self) -> bool {
        self.total_pnl_percent.is_some() && self.total_pnl_value.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WalletRecord {
    pub user_public_key: String,
    pub settlement_address: Option<String>,
    pub purchases: Vec<PurchaseGroup>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TokenPnl {
    pub token_name: String,
    pub mint_address: String,
    pub token_image: Option<String>,
    pub invested: f64,
    pub current_value: f64,
    pub pnl: String,
    pub is_positive: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CashoutReceipt {
    pub signature: Option<String>,
    pub total_sol_received: f64,
    pub fee_amount: Option<f64>,
    pub user_amount: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameStats {
    pub total_crates_created: u64,
    pub total_volume: f64,
    pub active_crates: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioSummary {
    pub crate_count: usize,
    pub total_investment: f64,
    pub total_value: f64,
    pub total_roi: f64,
}
