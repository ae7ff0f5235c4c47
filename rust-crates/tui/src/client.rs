use crate::{
    ui,
    wallets,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use memecrate::{
    BackendApi,
    BackendClient,
    CashOutReconciler,
    FlowError,
    GameFlowMachine,
    GameFlowState,
    Network,
    RpcNetwork,
    WalletSigner,
    allocation::lamports_to_sol,
    cashout::{
        CashOutPreview,
        Settlement,
    },
    error::{
        Presentation,
        SignError,
    },
    model::{
        AllocationType,
        Category,
        FlowStep,
        GameStats,
        PurchaseGroup,
        SellResult,
    },
    reveal::Reveal,
    selection::RerolledSlot,
    signer::sign_with,
};
use rand::rng;
use settings::Cluster;
use solana_sdk::{
    pubkey::Pubkey,
    signer::{
        Signer,
        keypair::Keypair,
    },
    system_instruction::SystemInstruction,
    system_program,
    transaction::Transaction,
};
use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{
    mpsc,
    oneshot,
};
use tracing::{
    error,
    info,
    warn,
};

/// What a declined approval prompt reports back to the flow.
pub const REJECTED_BY_USER: &str = "User rejected the request.";

const REROLL_FILLER_BATCHES: [u8; 3] = [8, 8, 4];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub cluster: Cluster,
    pub backend_url: String,
    pub rpc_url: String,
    pub wallet_dir: PathBuf,
    pub wallet: Option<String>,
}

/// A transaction waiting for the player to approve it.
#[derive(Debug)]
pub struct ApprovalRequest {
    pub summary: String,
    respond: oneshot::Sender<bool>,
}

impl ApprovalRequest {
    pub fn new(summary: impl Into<String>) -> (Self, oneshot::Receiver<bool>) {
        let (respond, answer) = oneshot::channel();
        let request = Self {
            summary: summary.into(),
            respond,
        };
        (request, answer)
    }

    pub fn answer(self, approved: bool) {
        if self.respond.send(approved).is_err() {
            warn!("approval answered after the signer stopped waiting");
        }
    }
}

/// Wallet backed by a local keypair that signs only once the player has
/// approved the transaction in the UI.
#[derive(Clone)]
pub struct ApprovalSigner {
    keypair: Arc<Keypair>,
    prompts: mpsc::UnboundedSender<FlowEvent>,
}

impl ApprovalSigner {
    pub fn new(keypair: Keypair, prompts: mpsc::UnboundedSender<FlowEvent>) -> Self {
        Self {
            keypair: Arc::new(keypair),
            prompts,
        }
    }
}

impl WalletSigner for ApprovalSigner {
    fn public_key(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, SignError> {
        let (request, answer) = ApprovalRequest::new(describe_transaction(&transaction));
        self.prompts
            .send(FlowEvent::Approval(request))
            .map_err(|_| SignError::Failed("wallet prompt is closed".to_string()))?;
        match answer.await {
            Ok(true) => sign_with(&self.keypair, transaction),
            Ok(false) => Err(SignError::from_message(REJECTED_BY_USER)),
            Err(_) => Err(SignError::Failed(
                "wallet prompt went away without an answer".to_string(),
            )),
        }
    }
}

/// One line the approval prompt shows: instruction count and the SOL moved by
/// plain system transfers.
pub fn describe_transaction(transaction: &Transaction) -> String {
    let message = &transaction.message;
    let lamports: u64 = message
        .instructions
        .iter()
        .filter(|ix| {
            message.account_keys.get(ix.program_id_index as usize) == Some(&system_program::id())
        })
        .filter_map(|ix| match bincode::deserialize::<SystemInstruction>(&ix.data) {
            Ok(SystemInstruction::Transfer { lamports }) => Some(lamports),
            _ => None,
        })
        .sum();
    let count = message.instructions.len();
    let noun = if count == 1 { "instruction" } else { "instructions" };
    if lamports > 0 {
        format!(
            "{count} {noun}, sending {:.4} SOL",
            lamports_to_sol(lamports)
        )
    } else {
        format!("{count} {noun}")
    }
}

/// Everything the UI renders, rebuilt by the worker after each command.
#[derive(Clone, Debug, Default)]
pub struct AppSnapshot {
    pub network: String,
    pub wallet: Option<String>,
    pub wallets: Vec<String>,
    pub balance: Option<f64>,
    pub sol_price: Option<f64>,
    pub stats: Option<GameStats>,
    pub categories: Vec<Category>,
    pub flow: GameFlowState,
    pub purchases: Vec<PurchaseGroup>,
    pub preview: Option<CashOutPreview>,
    pub settlement: Option<Settlement>,
    pub last_sale: Option<SellResult>,
    pub status: String,
    /// Failures of actions outside the purchase flow.
    pub notice: Option<String>,
    pub connect_prompt: bool,
    pub busy: bool,
}

impl AppSnapshot {
    /// Error text to show, the flow's own first.
    pub fn error(&self) -> Option<&str> {
        self.flow.error.as_deref().or(self.notice.as_deref())
    }

    pub fn is_busy(&self) -> bool {
        self.busy || self.flow.is_processing
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FlowCommand {
    Refresh,
    ConnectWallet(String),
    DisconnectWallet,
    ChooseAmount(f64),
    ChooseCategory(Category),
    ChooseTheme(String),
    ChooseCoins(u8),
    ChooseAllocation(AllocationType),
    RegeneratePercentages,
    ConfirmAllocation,
    Revise(FlowStep),
    Craft,
    RerollSlot(usize),
    RerollAll,
    AcceptReveal(Reveal),
    CreateCrate,
    RerollCoins(Vec<usize>),
    ConfirmCrate,
    SellCrate,
    LoadPurchases,
    OpenCashOut {
        purchase_id: String,
        investment_hint: Option<f64>,
    },
    CashOut,
    Reset,
    ClearError,
    Shutdown,
}

pub enum FlowEvent {
    Snapshot(AppSnapshot),
    Revealed(Reveal),
    SlotRerolled(RerolledSlot),
    Approval(ApprovalRequest),
}

pub struct AppController<B, N> {
    network_label: String,
    machine: GameFlowMachine<B, N, ApprovalSigner>,
    reconciler: CashOutReconciler<B>,
    events: mpsc::UnboundedSender<FlowEvent>,
    wallet_dir: PathBuf,
    wallets: Vec<String>,
    categories: Vec<Category>,
    stats: Option<GameStats>,
    sol_price: Option<f64>,
    balance: Option<f64>,
    purchases: Vec<PurchaseGroup>,
    preview: Option<CashOutPreview>,
    settlement: Option<Settlement>,
    last_sale: Option<SellResult>,
    status: String,
    notice: Option<String>,
    connect_prompt: bool,
    busy: bool,
}

impl AppController<BackendClient, RpcNetwork> {
    pub fn new(config: &AppConfig, events: mpsc::UnboundedSender<FlowEvent>) -> Result<Self> {
        let backend = BackendClient::new(config.backend_url.clone())
            .wrap_err_with(|| format!("invalid backend url {}", config.backend_url))?;
        let network = RpcNetwork::new(config.rpc_url.clone());
        Ok(Self::from_parts(
            config.cluster.to_string(),
            backend,
            network,
            config.wallet_dir.clone(),
            events,
        ))
    }
}

impl<B, N> AppController<B, N>
where
    B: BackendApi + Clone + Send + Sync + 'static,
    N: Network,
{
    pub fn from_parts(
        network_label: String,
        backend: B,
        network: N,
        wallet_dir: PathBuf,
        events: mpsc::UnboundedSender<FlowEvent>,
    ) -> Self {
        Self {
            network_label,
            reconciler: CashOutReconciler::new(backend.clone()),
            machine: GameFlowMachine::new(backend, network),
            events,
            wallet_dir,
            wallets: Vec::new(),
            categories: Vec::new(),
            stats: None,
            sol_price: None,
            balance: None,
            purchases: Vec::new(),
            preview: None,
            settlement: None,
            last_sale: None,
            status: "Ready".to_string(),
            notice: None,
            connect_prompt: false,
            busy: false,
        }
    }

    pub fn with_rolling_delay(mut self, delay: Duration) -> Self {
        self.machine = self.machine.with_rolling_delay(delay);
        self
    }

    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            network: self.network_label.clone(),
            wallet: self.machine.user(),
            wallets: self.wallets.clone(),
            balance: self.balance,
            sol_price: self.sol_price,
            stats: self.stats.clone(),
            categories: self.categories.clone(),
            flow: self.machine.state().clone(),
            purchases: self.purchases.clone(),
            preview: self.preview.clone(),
            settlement: self.settlement.clone(),
            last_sale: self.last_sale.clone(),
            status: self.status.clone(),
            notice: self.notice.clone(),
            connect_prompt: self.connect_prompt,
            busy: self.busy,
        }
    }

    fn emit(&self, event: FlowEvent) {
        if self.events.send(event).is_err() {
            warn!("ui dropped the flow event channel");
        }
    }

    fn publish(&self) {
        self.emit(FlowEvent::Snapshot(self.snapshot()));
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        info!(status = %self.status, "status updated");
    }

    /// Shows a publish-worthy status before a long running action.
    fn start_busy(&mut self, message: impl Into<String>) {
        self.busy = true;
        self.notice = None;
        self.connect_prompt = false;
        self.set_status(message);
        self.publish();
    }

    /// Failure handling shared by every action. Flow actions already put
    /// their text in the flow state; `inline` is set for the others.
    fn note_failure(&mut self, err: &FlowError, inline: bool) {
        match err.presentation() {
            Presentation::Silent => self.set_status("Cancelled"),
            Presentation::ConnectWalletPrompt => {
                self.connect_prompt = true;
                self.set_status("Connect a wallet to continue");
            }
            Presentation::Inline => {
                if inline {
                    self.notice = err.surfaced_message();
                }
                error!(%err, "action failed");
            }
        }
    }

    fn note_flow<T>(&mut self, result: Result<T, FlowError>) -> Option<T> {
        result.map_err(|err| self.note_failure(&err, false)).ok()
    }

    fn note_other<T>(&mut self, result: Result<T, FlowError>) -> Option<T> {
        result.map_err(|err| self.note_failure(&err, true)).ok()
    }

    fn user(&self) -> Result<String, FlowError> {
        self.machine.user().ok_or(FlowError::WalletNotConnected)
    }

    /// Moves on from `step` when the player is still on it.
    fn advance_from(&mut self, step: FlowStep) {
        if self.machine.state().current_step != step {
            return;
        }
        if let Some(next) = step.next() {
            let result = self.machine.advance_to(next);
            self.note_flow(result);
        }
    }

    pub async fn refresh(&mut self) {
        match wallets::list_wallets(&self.wallet_dir) {
            Ok(found) => self.wallets = found.into_iter().map(|w| w.name).collect(),
            Err(err) => warn!(?err, "listing wallets failed"),
        }
        let backend = self.machine.backend().clone();
        match backend.categories().await {
            Ok(categories) => self.categories = categories,
            Err(err) => warn!(%err, "category fetch failed"),
        }
        match backend.game_stats().await {
            Ok(stats) => self.stats = Some(stats),
            Err(err) => warn!(%err, "stats fetch failed"),
        }
        match backend.sol_price().await {
            Ok(price) => self.sol_price = Some(price),
            Err(err) => warn!(%err, "sol price fetch failed"),
        }
        self.refresh_balance().await;
    }

    async fn refresh_balance(&mut self) {
        let Some(user) = self.machine.user() else {
            self.balance = None;
            return;
        };
        match self.machine.backend().balance(&user).await {
            Ok(balance) => self.balance = Some(balance),
            Err(err) => warn!(%err, "balance fetch failed"),
        }
    }

    pub fn connect_signer(&mut self, signer: ApprovalSigner) {
        let _ = self.machine.connect_wallet(signer);
        self.connect_prompt = false;
    }

    pub async fn connect_wallet(&mut self, name: &str) -> Result<()> {
        let descriptor = wallets::find_wallet(&self.wallet_dir, name)?;
        let keypair = wallets::load_keypair(&descriptor)?;
        self.connect_signer(ApprovalSigner::new(keypair, self.events.clone()));
        self.set_status(format!("Connected wallet '{name}'"));
        self.refresh_balance().await;
        Ok(())
    }

    /// Runs one command. Returns false once the worker should stop.
    pub async fn handle(&mut self, command: FlowCommand) -> bool {
        match command {
            FlowCommand::Refresh => self.refresh().await,
            FlowCommand::ConnectWallet(name) => {
                if let Err(err) = self.connect_wallet(&name).await {
                    error!(?err, "wallet connection failed");
                    self.notice = Some(err.to_string());
                }
            }
            FlowCommand::DisconnectWallet => {
                self.machine.disconnect_wallet();
                self.balance = None;
                self.purchases.clear();
                self.preview = None;
                self.set_status("Wallet disconnected");
            }
            FlowCommand::ChooseAmount(amount) => {
                let result = self.machine.set_investment_amount(amount);
                if self.note_flow(result).is_some() {
                    self.advance_from(FlowStep::ChooseAmount);
                }
            }
            FlowCommand::ChooseCategory(category) => {
                let _ = self.machine.select_category(&category);
                self.advance_from(FlowStep::PickCategory);
            }
            FlowCommand::ChooseTheme(name) => {
                let _ = self.machine.select_theme(&name);
                self.advance_from(FlowStep::PickCategory);
            }
            FlowCommand::ChooseCoins(count) => {
                let _ = self.machine.set_num_coins(count);
                self.advance_from(FlowStep::ChooseCoins);
            }
            FlowCommand::ChooseAllocation(allocation) => {
                self.machine.set_allocation_type(allocation);
            }
            FlowCommand::RegeneratePercentages => self.machine.regenerate_percentages(),
            FlowCommand::ConfirmAllocation => self.advance_from(FlowStep::ChooseAllocation),
            FlowCommand::Revise(step) => {
                let result = self.machine.revise(step);
                self.note_flow(result);
            }
            FlowCommand::Craft => {
                self.set_status("Crafting crate...");
                let result = self.machine.craft().await;
                if let Some(reveal) = self.note_flow(result) {
                    self.set_status("Revealing tokens");
                    self.emit(FlowEvent::Revealed(reveal));
                }
            }
            FlowCommand::RerollSlot(index) => {
                let result = self.machine.reroll_slot(index).await;
                if let Some(slot) = self.note_flow(result) {
                    self.set_status(format!("Rerolled slot {} into {}", index + 1, slot.token.name));
                    self.emit(FlowEvent::SlotRerolled(slot));
                }
            }
            FlowCommand::RerollAll => self.reroll_all().await,
            FlowCommand::AcceptReveal(reveal) => {
                let result = self.machine.accept_reveal(&reveal);
                if self.note_flow(result).is_some() {
                    self.set_status("Tokens locked in");
                }
            }
            FlowCommand::CreateCrate => self.create_crate().await,
            FlowCommand::RerollCoins(indices) => {
                self.start_busy("Rerolling coins...");
                let result = self.machine.reroll_coins(&indices).await;
                self.busy = false;
                if self.note_flow(result).is_some() {
                    self.set_status("Coins rerolled");
                    self.refresh_balance().await;
                }
            }
            FlowCommand::ConfirmCrate => {
                self.start_busy("Confirming crate...");
                let result = self.machine.confirm_crate().await;
                self.busy = false;
                if self.note_flow(result).is_some() {
                    self.set_status("Crate confirmed");
                    self.load_purchases().await;
                }
            }
            FlowCommand::SellCrate => self.sell_crate().await,
            FlowCommand::LoadPurchases => {
                self.load_purchases().await;
                if !self.machine.state().current_step.is_selection()
                    && self.machine.state().current_step < FlowStep::Portfolio
                {
                    let result = self.machine.advance_to(FlowStep::Portfolio);
                    self.note_flow(result);
                }
            }
            FlowCommand::OpenCashOut {
                purchase_id,
                investment_hint,
            } => self.open_cash_out(&purchase_id, investment_hint).await,
            FlowCommand::CashOut => self.cash_out().await,
            FlowCommand::Reset => {
                self.machine.reset_flow();
                self.preview = None;
                self.settlement = None;
                self.last_sale = None;
                self.set_status("Ready");
            }
            FlowCommand::ClearError => {
                self.machine.clear_error();
                self.notice = None;
                self.connect_prompt = false;
            }
            FlowCommand::Shutdown => return false,
        }
        true
    }

    async fn reroll_all(&mut self) {
        let result = self.machine.reroll_all().await;
        if self.note_flow(result).is_none() {
            return;
        }
        let theme = self.machine.state().backend_theme();
        let pool = self
            .machine
            .selection()
            .filler_pool(&theme, &REROLL_FILLER_BATCHES)
            .await;
        let reveal = Reveal::new(&self.machine.state().displayed_tokens, &pool, &mut rng());
        self.set_status("Rerolled every slot");
        self.emit(FlowEvent::Revealed(reveal));
    }

    async fn create_crate(&mut self) {
        self.start_busy("Waiting for wallet approval...");
        let result = self.machine.create_crate().await;
        if self.note_flow(result).is_none() {
            self.busy = false;
            return;
        }
        self.set_status("Rolling...");
        self.publish();
        self.machine.finish_rolling().await;
        self.busy = false;
        self.set_status("Crate purchased");
        self.refresh_balance().await;
    }

    async fn sell_crate(&mut self) {
        let state = self.machine.state();
        let expected_return = self
            .preview
            .as_ref()
            .filter(|p| state.purchase_id.as_deref() == Some(p.purchase_id.as_str()))
            .map(|p| p.totals.current_value)
            .unwrap_or(state.investment_amount);
        self.start_busy("Selling crate...");
        let result = self.machine.sell_crate(expected_return, None).await;
        self.busy = false;
        if let Some(sale) = self.note_flow(result) {
            self.set_status(format!("Sold for {:.4} SOL", sale.user_return));
            self.last_sale = Some(sale);
            self.refresh_balance().await;
        }
    }

    async fn load_purchases(&mut self) {
        let result = match self.user() {
            Ok(user) => self.reconciler.list_purchases(&user).await,
            Err(err) => Err(err),
        };
        if let Some(purchases) = self.note_other(result) {
            self.set_status(format!("{} crates", purchases.len()));
            self.purchases = purchases;
        }
    }

    async fn open_cash_out(&mut self, purchase_id: &str, investment_hint: Option<f64>) {
        let user = match self.user() {
            Ok(user) => user,
            Err(err) => {
                self.note_failure(&err, true);
                return;
            }
        };
        self.set_status("Loading crate value...");
        let preview = self.reconciler.load(&user, purchase_id, investment_hint).await;
        self.preview = Some(preview);
        self.settlement = None;
        let step = self.machine.state().current_step;
        if !step.is_selection() && step < FlowStep::CashOut {
            let result = self.machine.advance_to(FlowStep::CashOut);
            self.note_flow(result);
        }
        self.set_status("Review your crate");
    }

    async fn cash_out(&mut self) {
        let Some(preview) = self.preview.clone() else {
            self.notice = Some("Pick a crate to cash out first".to_string());
            return;
        };
        let user = match self.user() {
            Ok(user) => user,
            Err(err) => {
                self.note_failure(&err, true);
                return;
            }
        };
        self.start_busy("Cashing out...");
        let result = self
            .reconciler
            .cash_out(&user, &preview.purchase_id, preview.initial_investment)
            .await;
        self.busy = false;
        let Some(settlement) = self.note_other(result) else {
            return;
        };
        self.set_status(format!("Received {:.4} SOL", settlement.final_payout));
        self.settlement = Some(settlement);
        if self.machine.state().current_step == FlowStep::CashOut {
            let result = self.machine.advance_to(FlowStep::Success);
            self.note_flow(result);
        }
        self.load_purchases().await;
        self.refresh_balance().await;
    }
}

pub fn init_tracing(log_dir: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{
        EnvFilter,
        fmt,
        prelude::*,
    };

    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(log_dir, "memecrate.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| eyre!("Failed to install tracing subscriber: {e}"))?;
    Ok(guard)
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let controller = AppController::new(&config, event_tx)?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    info!("UI ready");
    let res = run_loop(
        controller,
        config.wallet.clone(),
        event_rx,
        &mut ui_state,
        &mut input_events,
    )
    .await;
    ui::terminal_exit()?;
    res
}

async fn flow_worker<B, N>(
    mut controller: AppController<B, N>,
    mut cmd_rx: mpsc::UnboundedReceiver<FlowCommand>,
) where
    B: BackendApi + Clone + Send + Sync + 'static,
    N: Network,
{
    controller.refresh().await;
    controller.publish();
    while let Some(cmd) = cmd_rx.recv().await {
        if !controller.handle(cmd).await {
            break;
        }
        controller.publish();
    }
    info!("flow worker stopped");
}

async fn run_loop(
    controller: AppController<BackendClient, RpcNetwork>,
    initial_wallet: Option<String>,
    mut event_rx: mpsc::UnboundedReceiver<FlowEvent>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    info!("Running app loop");
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(flow_worker(controller, cmd_rx));
    if let Some(name) = initial_wallet {
        let _ = cmd_tx.send(FlowCommand::ConnectWallet(name));
    }
    let mut ticker = tokio::time::interval(ui::TICK_INTERVAL);

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(FlowEvent::Snapshot(snapshot)) => {
                        ui::draw(ui_state, &snapshot)
                            .wrap_err("draw after flow update failed")?;
                    }
                    Some(FlowEvent::Revealed(reveal)) => {
                        ui::show_reveal(ui_state, reveal);
                        ui::redraw(ui_state).wrap_err("draw after reveal failed")?;
                    }
                    Some(FlowEvent::SlotRerolled(slot)) => {
                        ui::restart_slot(ui_state, slot);
                        ui::redraw(ui_state).wrap_err("draw after slot reroll failed")?;
                    }
                    Some(FlowEvent::Approval(request)) => {
                        ui::ask_approval(ui_state, request);
                        ui::redraw(ui_state).wrap_err("draw of approval prompt failed")?;
                    }
                    None => {
                        warn!("flow worker channel closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if ui::tick(ui_state) {
                    ui::redraw(ui_state).wrap_err("draw after animation tick failed")?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = cmd_tx.send(FlowCommand::Shutdown);
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => {
                        let _ = cmd_tx.send(FlowCommand::Shutdown);
                        break;
                    }
                    ui::UserEvent::Redraw => {
                        ui::redraw(ui_state).wrap_err("redraw after input failed")?;
                    }
                    ui::UserEvent::Command(cmd) => {
                        info!(?cmd, "dispatching command");
                        if cmd_tx.send(cmd).is_err() {
                            warn!("flow worker is gone");
                            break;
                        }
                        ui::redraw(ui_state).wrap_err("redraw after command failed")?;
                    }
                }
            }
        }
    }
    // A purchase may still be waiting on a prompt that will never be answered.
    worker.abort();
    Ok(())
}
