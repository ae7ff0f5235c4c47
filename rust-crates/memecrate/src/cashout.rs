//! Settlement figures for the "your crates" listing and the cash-out screen,
//! re-derived from the backend alone.

use crate::{
    backend::BackendApi,
    error::FlowError,
    model::{
        PurchaseGroup,
        PurchaseToken,
        TokenPnl,
    },
};

/// Share of the liquidated value kept as exit fee.
pub const EXIT_FEE_RATE: f64 = 0.01;

/// Where a preview's initial investment came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvestmentSource {
    /// The purchase group's own `initialInvestment`.
    Recorded,
    /// A total supplied by the screen that opened the cash-out.
    Hint,
    SpendSum,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreviewTotals {
    pub invested: f64,
    pub current_value: f64,
    pub pnl_value: f64,
    pub pnl_percent: f64,
}

impl PreviewTotals {
    fn from_rows(rows: &[TokenPnl]) -> Self {
        let invested: f64 = rows.iter().map(|r| r.invested).sum();
        let current_value: f64 = rows.iter().map(|r| r.current_value).sum();
        let pnl_value = current_value - invested;
        Self {
            invested,
            current_value,
            pnl_value,
            pnl_percent: percent_of(pnl_value, invested),
        }
    }

    pub fn is_positive(&self) -> bool {
        self.pnl_value >= 0.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CashOutPreview {
    pub purchase_id: String,
    pub category: Option<String>,
    pub initial_investment: f64,
    pub investment_source: InvestmentSource,
    pub rows: Vec<TokenPnl>,
    pub totals: PreviewTotals,
    /// False when the rows are spend amounts standing in for a failed PNL
    /// snapshot.
    pub live_pnl: bool,
}

/// What the success screen shows after a cash-out.
#[derive(Clone, Debug, PartialEq)]
pub struct Settlement {
    pub signature: Option<String>,
    pub initial_investment: f64,
    pub total_received: f64,
    pub exit_fee: f64,
    pub final_payout: f64,
    pub total_return: f64,
    pub total_return_percent: f64,
}

impl Settlement {
    /// All display figures follow from the total received `R` and the
    /// initial investment `I`: fee `0.01R`, payout `0.99R`, return
    /// `payout - I`, percent `return / I * 100` (0 when `I` is 0).
    pub fn derive(total_received: f64, initial_investment: f64, signature: Option<String>) -> Self {
        let exit_fee = total_received * EXIT_FEE_RATE;
        let final_payout = total_received - exit_fee;
        let total_return = final_payout - initial_investment;
        Self {
            signature,
            initial_investment,
            total_received,
            exit_fee,
            final_payout,
            total_return,
            total_return_percent: percent_of(total_return, initial_investment),
        }
    }
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// `+12.34%` style label.
pub fn signed_percent(value: f64) -> String {
    if value >= 0.0 {
        format!("+{value:.2}%")
    } else {
        format!("{value:.2}%")
    }
}

fn spend_row(token: &PurchaseToken) -> TokenPnl {
    TokenPnl {
        token_name: token.token_name.clone(),
        mint_address: token.mint_address.clone(),
        token_image: token.token_image.clone(),
        invested: token.buy_amount_sol,
        current_value: token.buy_amount_sol,
        pnl: signed_percent(0.0),
        is_positive: true,
    }
}

/// Joins the group's token identities with snapshot values, by mint first
/// and by name when the mint does not match. Snapshot rows that match no
/// token are appended as they are.
fn merge_rows(tokens: &[PurchaseToken], snapshot: Vec<TokenPnl>) -> Vec<TokenPnl> {
    let mut remaining = snapshot;
    let mut rows: Vec<TokenPnl> = tokens
        .iter()
        .map(|token| {
            let matched = remaining
                .iter()
                .position(|r| !r.mint_address.is_empty() && r.mint_address == token.mint_address)
                .or_else(|| remaining.iter().position(|r| r.token_name == token.token_name));
            match matched {
                Some(idx) => {
                    let snap = remaining.remove(idx);
                    TokenPnl {
                        token_name: token.token_name.clone(),
                        mint_address: token.mint_address.clone(),
                        token_image: token.token_image.clone().or(snap.token_image),
                        ..snap
                    }
                }
                None => spend_row(token),
            }
        })
        .collect();
    rows.extend(remaining);
    rows
}

pub struct CashOutReconciler<B> {
    backend: B,
}

impl<B: BackendApi> CashOutReconciler<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The user's purchases, newest backend order kept, empty groups dropped.
    pub async fn list_purchases(&self, user: &str) -> Result<Vec<PurchaseGroup>, FlowError> {
        let wallet = self.backend.user_wallet(user).await?;
        Ok(wallet
            .map(|w| w.purchases)
            .unwrap_or_default()
            .into_iter()
            .filter(|group| !group.tokens.is_empty())
            .collect())
    }

    /// Builds the preview for `purchase_id`. Neither fetch failing stops the
    /// preview; it falls back to what is known.
    pub async fn load(
        &self,
        user: &str,
        purchase_id: &str,
        investment_hint: Option<f64>,
    ) -> CashOutPreview {
        let group = match self.backend.user_wallet(user).await {
            Ok(wallet) => wallet.and_then(|w| {
                w.purchases
                    .into_iter()
                    .find(|group| group.purchase_id == purchase_id)
            }),
            Err(err) => {
                tracing::warn!(%purchase_id, "failed to load purchase group: {err}");
                None
            }
        };
        let snapshot = match self.backend.tokens_pnl(purchase_id).await {
            Ok(rows) => Some(rows),
            Err(err) => {
                tracing::warn!(%purchase_id, "failed to load token pnl: {err}");
                None
            }
        };

        let tokens = group.as_ref().map(|g| g.tokens.as_slice()).unwrap_or_default();
        let live_pnl = snapshot.is_some();
        let rows = match snapshot {
            Some(snapshot) => merge_rows(tokens, snapshot),
            None => tokens.iter().map(spend_row).collect(),
        };

        let spend_sum = if tokens.is_empty() {
            rows.iter().map(|r| r.invested).sum()
        } else {
            tokens.iter().map(|t| t.buy_amount_sol).sum()
        };
        let (initial_investment, investment_source) =
            match (group.as_ref().and_then(|g| g.initial_investment), investment_hint) {
                (Some(recorded), _) => (recorded, InvestmentSource::Recorded),
                (None, Some(hint)) => (hint, InvestmentSource::Hint),
                (None, None) => (spend_sum, InvestmentSource::SpendSum),
            };

        CashOutPreview {
            purchase_id: purchase_id.to_string(),
            category: group.map(|g| g.category),
            initial_investment,
            investment_source,
            totals: PreviewTotals::from_rows(&rows),
            rows,
            live_pnl,
        }
    }

    /// Liquidates the purchase and derives the settlement figures from the
    /// total received.
    pub async fn cash_out(
        &self,
        user: &str,
        purchase_id: &str,
        initial_investment: f64,
    ) -> Result<Settlement, FlowError> {
        let receipt = self.backend.cashout(user, purchase_id).await?;
        tracing::info!(
            %purchase_id,
            total_received = receipt.total_sol_received,
            "cash out complete"
        );
        Ok(Settlement::derive(
            receipt.total_sol_received,
            initial_investment,
            receipt.signature,
        ))
    }
}
