use crate::client::{
    AppSnapshot,
    ApprovalRequest,
    FlowCommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use itertools::Itertools;
use memecrate::{
    allocation::{
        FEE_ALLOWANCE_LAMPORTS,
        THEME_MAP,
        lamports_to_sol,
    },
    cashout::{
        InvestmentSource,
        signed_percent,
    },
    model::{
        AllocationType,
        FlowStep,
        VALID_COIN_COUNTS,
    },
    reveal::Reveal,
    selection::RerolledSlot,
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::{
    io::stdout,
    time::Duration,
};
use tokio::sync::mpsc;
use unicode_width::{
    UnicodeWidthChar,
    UnicodeWidthStr,
};

/// How often reels and spinners advance.
pub const TICK_INTERVAL: Duration = Duration::from_millis(80);

const MAX_AMOUNT_CHARS: usize = 12;
const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

pub enum UserEvent {
    Quit,
    Redraw,
    Command(FlowCommand),
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    view: View,
    snapshot: AppSnapshot,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    amount_input: String,
    category_idx: usize,
    coin_idx: usize,
    reveal: Option<Reveal>,
    reveal_accepted: bool,
    coin_marks: Vec<usize>,
    crate_idx: usize,
    wallet_idx: usize,
    approval: Option<ApprovalRequest>,
    spinner: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
    WalletPicker,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum View {
    #[default]
    Flow,
    Crates,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

/// Reads terminal input on a dedicated thread; crossterm only offers a
/// blocking reader without its event-stream feature.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    match input_events.recv().await {
        Some(event) => event.wrap_err("reading terminal input failed"),
        None => Err(eyre!("terminal input closed")),
    }
}

/// Caches `snap` and renders it. Local screen state that no longer matches
/// the flow is dropped here.
pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    let step = snap.flow.current_step;
    if step != FlowStep::ConfirmChoices {
        state.reveal = None;
        state.reveal_accepted = false;
    }
    if step == FlowStep::ChooseAmount && state.snapshot.flow.current_step != FlowStep::ChooseAmount
    {
        state.amount_input.clear();
    }
    if step.is_selection() {
        state.coin_marks.clear();
    }
    state.crate_idx = state.crate_idx.min(snap.purchases.len().saturating_sub(1));
    state.wallet_idx = state.wallet_idx.min(snap.wallets.len().saturating_sub(1));
    state.snapshot = snap.clone();
    redraw(state)
}

pub fn redraw(state: &mut UiState) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        let drawn = term.draw(|f| ui(f, state)).map(|_| ());
        state.terminal = Some(term);
        drawn?;
    }
    Ok(())
}

/// Advances animations. Returns true when the screen changed.
pub fn tick(state: &mut UiState) -> bool {
    state.spinner = state.spinner.wrapping_add(1);
    if let Some(reveal) = state.reveal.as_mut().filter(|r| r.is_spinning()) {
        reveal.tick();
        return true;
    }
    state.snapshot.is_busy() || state.snapshot.flow.current_step == FlowStep::Rolling
}

pub fn show_reveal(state: &mut UiState, reveal: Reveal) {
    state.reveal = Some(reveal);
    state.reveal_accepted = false;
}

pub fn restart_slot(state: &mut UiState, slot: RerolledSlot) {
    if let Some(reveal) = state.reveal.as_mut() {
        reveal.restart_slot(slot.index, &slot.token, &slot.filler, &mut rand::rng());
    }
}

pub fn ask_approval(state: &mut UiState, request: ApprovalRequest) {
    // Only one prompt is shown at a time; a stale one counts as declined.
    if let Some(previous) = state.approval.replace(request) {
        previous.answer(false);
    }
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    // raw mode swallows SIGINT
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(UserEvent::Quit);
    }

    if let Some(request) = state.approval.take() {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => request.answer(true),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => request.answer(false),
            _ => {
                state.approval = Some(request);
                return None;
            }
        }
        return Some(UserEvent::Redraw);
    }

    match state.mode {
        Mode::QuitModal => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::WalletPicker => return wallet_picker_key(state, key.code),
        Mode::Normal => {}
    }

    match key.code {
        KeyCode::Char('q') => {
            state.mode = Mode::QuitModal;
            return Some(UserEvent::Redraw);
        }
        KeyCode::Char('w') => {
            state.mode = Mode::WalletPicker;
            return Some(UserEvent::Redraw);
        }
        KeyCode::F(5) => return command(FlowCommand::Refresh),
        KeyCode::Tab => {
            return match state.view {
                View::Flow => {
                    state.view = View::Crates;
                    command(FlowCommand::LoadPurchases)
                }
                View::Crates => {
                    state.view = View::Flow;
                    Some(UserEvent::Redraw)
                }
            };
        }
        KeyCode::Esc if state.snapshot.error().is_some() || state.snapshot.connect_prompt => {
            return command(FlowCommand::ClearError);
        }
        _ => {}
    }

    // one action at a time; nothing that moves value is queued behind another
    if state.snapshot.is_busy() {
        return None;
    }

    let step = state.snapshot.flow.current_step;
    match (state.view, step) {
        (View::Crates, _) => crates_key(state, key.code),
        (View::Flow, FlowStep::Portfolio | FlowStep::CashOut | FlowStep::Success) => {
            match key.code {
                KeyCode::Char('n') => command(FlowCommand::Reset),
                KeyCode::Enter if step == FlowStep::Success => command(FlowCommand::Reset),
                code => crates_key(state, code),
            }
        }
        (View::Flow, _) => flow_key(state, step, key.code),
    }
}

fn command(cmd: FlowCommand) -> Option<UserEvent> {
    Some(UserEvent::Command(cmd))
}

fn slot_index(c: char) -> Option<usize> {
    c.to_digit(10)
        .and_then(|d| (d as usize).checked_sub(1))
        .filter(|idx| *idx < 8)
}

fn wallet_picker_key(state: &mut UiState, code: KeyCode) -> Option<UserEvent> {
    let count = state.snapshot.wallets.len();
    match code {
        KeyCode::Esc => {
            state.mode = Mode::Normal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Up | KeyCode::Char('k') => {
            state.wallet_idx = state.wallet_idx.saturating_sub(1);
            Some(UserEvent::Redraw)
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.wallet_idx = (state.wallet_idx + 1).min(count.saturating_sub(1));
            Some(UserEvent::Redraw)
        }
        KeyCode::Enter => {
            let name = state.snapshot.wallets.get(state.wallet_idx)?.clone();
            state.mode = Mode::Normal;
            command(FlowCommand::ConnectWallet(name))
        }
        KeyCode::Char('d') => {
            state.mode = Mode::Normal;
            command(FlowCommand::DisconnectWallet)
        }
        _ => None,
    }
}

fn crates_key(state: &mut UiState, code: KeyCode) -> Option<UserEvent> {
    let count = state.snapshot.purchases.len();
    match code {
        KeyCode::Up | KeyCode::Char('k') => {
            state.crate_idx = state.crate_idx.saturating_sub(1);
            Some(UserEvent::Redraw)
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.crate_idx = (state.crate_idx + 1).min(count.saturating_sub(1));
            Some(UserEvent::Redraw)
        }
        KeyCode::Enter => {
            let group = state.snapshot.purchases.get(state.crate_idx)?;
            let flow = &state.snapshot.flow;
            let investment_hint = (flow.purchase_id.as_deref() == Some(group.purchase_id.as_str()))
                .then_some(flow.investment_amount);
            command(FlowCommand::OpenCashOut {
                purchase_id: group.purchase_id.clone(),
                investment_hint,
            })
        }
        KeyCode::Char('x') => {
            state.snapshot.preview.as_ref()?;
            if state.snapshot.settlement.is_some() {
                return None;
            }
            command(FlowCommand::CashOut)
        }
        KeyCode::Char('r') => command(FlowCommand::LoadPurchases),
        _ => None,
    }
}

fn category_names(snap: &AppSnapshot) -> Vec<String> {
    if snap.categories.is_empty() {
        THEME_MAP.iter().map(|(name, _)| name.to_string()).collect()
    } else {
        snap.categories
            .iter()
            .map(|c| c.display_name.clone())
            .collect()
    }
}

fn flow_key(state: &mut UiState, step: FlowStep, code: KeyCode) -> Option<UserEvent> {
    match step {
        FlowStep::ChooseAmount => match code {
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => {
                if state.amount_input.len() < MAX_AMOUNT_CHARS {
                    state.amount_input.push(c);
                }
                Some(UserEvent::Redraw)
            }
            KeyCode::Backspace => {
                state.amount_input.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let amount = if state.amount_input.is_empty() {
                    state.snapshot.flow.investment_amount
                } else {
                    state.amount_input.parse().unwrap_or(f64::NAN)
                };
                command(FlowCommand::ChooseAmount(amount))
            }
            _ => None,
        },
        FlowStep::PickCategory => {
            let names = category_names(&state.snapshot);
            match code {
                KeyCode::Up | KeyCode::Char('k') => {
                    state.category_idx = state.category_idx.saturating_sub(1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    state.category_idx =
                        (state.category_idx + 1).min(names.len().saturating_sub(1));
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => match state.snapshot.categories.get(state.category_idx) {
                    Some(category) => command(FlowCommand::ChooseCategory(category.clone())),
                    None => {
                        let name = names.get(state.category_idx)?.clone();
                        command(FlowCommand::ChooseTheme(name))
                    }
                },
                KeyCode::Backspace => command(FlowCommand::Revise(FlowStep::ChooseAmount)),
                _ => None,
            }
        }
        FlowStep::ChooseCoins => match code {
            KeyCode::Left | KeyCode::Char('h') => {
                state.coin_idx = state.coin_idx.saturating_sub(1);
                Some(UserEvent::Redraw)
            }
            KeyCode::Right | KeyCode::Char('l') => {
                state.coin_idx = (state.coin_idx + 1).min(VALID_COIN_COUNTS.len() - 1);
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let count = VALID_COIN_COUNTS.get(state.coin_idx).copied()?;
                command(FlowCommand::ChooseCoins(count))
            }
            KeyCode::Backspace => command(FlowCommand::Revise(FlowStep::PickCategory)),
            _ => None,
        },
        FlowStep::ChooseAllocation => match code {
            KeyCode::Char('e') => command(FlowCommand::ChooseAllocation(AllocationType::Equal)),
            KeyCode::Char('r') => command(FlowCommand::ChooseAllocation(AllocationType::Random)),
            KeyCode::Char('g') => command(FlowCommand::RegeneratePercentages),
            KeyCode::Enter => command(FlowCommand::ConfirmAllocation),
            KeyCode::Backspace => command(FlowCommand::Revise(FlowStep::ChooseCoins)),
            _ => None,
        },
        FlowStep::ConfirmChoices => confirm_key(state, code),
        FlowStep::RollingComplete | FlowStep::Reroll => purchased_key(state, code),
        _ => None,
    }
}

fn confirm_key(state: &mut UiState, code: KeyCode) -> Option<UserEvent> {
    match code {
        KeyCode::Char('c') => {
            state.reveal = None;
            state.reveal_accepted = false;
            command(FlowCommand::Craft)
        }
        KeyCode::Char(' ') => {
            let reveal = state.reveal.as_mut()?;
            reveal.settle_all();
            Some(UserEvent::Redraw)
        }
        KeyCode::Enter => {
            let reveal = state.reveal.as_ref()?;
            if !reveal.can_confirm() || state.reveal_accepted {
                return None;
            }
            let reveal = reveal.clone();
            state.reveal_accepted = true;
            command(FlowCommand::AcceptReveal(reveal))
        }
        KeyCode::Char(c) if c.is_ascii_digit() => {
            let index = slot_index(c)?;
            let reveal = state.reveal.as_ref()?;
            // rerolls replace accepted picks only
            if !state.reveal_accepted || !reveal.is_settled(index) {
                return None;
            }
            command(FlowCommand::RerollSlot(index))
        }
        KeyCode::Char('a') => command(FlowCommand::RerollAll),
        KeyCode::Char('b') => command(FlowCommand::CreateCrate),
        KeyCode::Backspace => command(FlowCommand::Revise(FlowStep::ChooseAllocation)),
        _ => None,
    }
}

fn purchased_key(state: &mut UiState, code: KeyCode) -> Option<UserEvent> {
    let flow = &state.snapshot.flow;
    match code {
        KeyCode::Char(c) if c.is_ascii_digit() => {
            let index = slot_index(c).filter(|idx| *idx < flow.displayed_tokens.len())?;
            match state.coin_marks.iter().position(|marked| *marked == index) {
                Some(pos) => {
                    state.coin_marks.remove(pos);
                }
                None => state.coin_marks.push(index),
            }
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('r') => {
            if state.coin_marks.is_empty() {
                return None;
            }
            let marks = state.coin_marks.drain(..).sorted().collect();
            command(FlowCommand::RerollCoins(marks))
        }
        KeyCode::Char('k') => command(FlowCommand::ConfirmCrate),
        KeyCode::Char('s') => command(FlowCommand::SellCrate),
        KeyCode::Char('c') => {
            let purchase_id = flow.purchase_id.clone()?;
            command(FlowCommand::OpenCashOut {
                purchase_id,
                investment_hint: Some(flow.investment_amount),
            })
        }
        KeyCode::Char('p') => command(FlowCommand::LoadPurchases),
        KeyCode::Char('n') => command(FlowCommand::Reset),
        _ => None,
    }
}

fn shows_crates(state: &UiState) -> bool {
    state.view == View::Crates
        || matches!(
            state.snapshot.flow.current_step,
            FlowStep::Portfolio | FlowStep::CashOut | FlowStep::Success
        )
}

fn ui(f: &mut Frame, state: &UiState) {
    let snap = &state.snapshot;
    // Clear the whole frame to avoid leftover fragments
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // wallet + network
            Constraint::Min(12),   // flow or crates
            Constraint::Length(4), // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_top(f, chunks[0], snap);
    if shows_crates(state) {
        draw_crates(f, chunks[1], state);
    } else {
        draw_flow(f, chunks[1], state);
    }
    draw_status(f, chunks[2], state);
    draw_help(f, chunks[3], state);
    draw_modals(f, state);
}

fn draw_top(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let wallet = snap
        .wallet
        .as_deref()
        .map(short_key)
        .unwrap_or_else(|| "not connected".to_string());
    let balance = match (snap.balance, snap.sol_price) {
        (Some(sol), Some(price)) => format!("{sol:.4} SOL (${:.2})", sol * price),
        (Some(sol), None) => format!("{sol:.4} SOL"),
        (None, _) => "-".to_string(),
    };
    let stats = snap
        .stats
        .as_ref()
        .map(|s| {
            format!(
                " | Crates: {} | Active: {} | Volume: {:.2} SOL",
                s.total_crates_created, s.active_crates, s.total_volume
            )
        })
        .unwrap_or_default();
    let text = format!(
        "Network: {} | Wallet: {} | Balance: {}{}",
        snap.network, wallet, balance, stats
    );
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("memecrate"));
    f.render_widget(widget, area);
}

fn step_label(step: FlowStep) -> &'static str {
    match step {
        FlowStep::ChooseAmount => "Amount",
        FlowStep::PickCategory => "Category",
        FlowStep::ChooseCoins => "Coins",
        FlowStep::ChooseAllocation => "Allocation",
        FlowStep::ConfirmChoices => "Confirm",
        FlowStep::Rolling => "Rolling",
        FlowStep::RollingComplete => "Your crate",
        FlowStep::Reroll => "Reroll",
        FlowStep::Portfolio => "Portfolio",
        FlowStep::CashOut => "Cash out",
        FlowStep::Success => "Done",
    }
}

fn draw_flow(f: &mut Frame, area: Rect, state: &UiState) {
    let snap = &state.snapshot;
    let current = snap.flow.current_step;
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(18), Constraint::Min(30)])
        .split(area);

    let steps: Vec<Line> = FlowStep::ALL
        .iter()
        .map(|step| {
            let (marker, style) = if *step == current {
                (
                    ">",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            } else if *step < current {
                (" ", Style::default().fg(Color::DarkGray))
            } else {
                (" ", Style::default())
            };
            Line::styled(format!("{marker} {}", step_label(*step)), style)
        })
        .collect();
    f.render_widget(
        Paragraph::new(steps).block(Block::default().borders(Borders::ALL).title("Steps")),
        cols[0],
    );

    let width = cols[1].width.saturating_sub(4) as usize;
    let lines = match current {
        FlowStep::ChooseAmount => amount_lines(state),
        FlowStep::PickCategory => category_lines(state, width),
        FlowStep::ChooseCoins => coin_lines(state),
        FlowStep::ChooseAllocation => allocation_lines(snap),
        FlowStep::ConfirmChoices => confirm_lines(state, width),
        FlowStep::Rolling => vec![
            Line::from(format!(
                "{} Rolling your crate...",
                SPINNER[state.spinner % SPINNER.len()]
            )),
            Line::from(""),
            Line::from(format!(
                "Transaction: {}",
                snap.flow.transaction_signature.as_deref().unwrap_or("-")
            )),
        ],
        _ => purchased_lines(state, width),
    };
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(step_label(current)));
    f.render_widget(widget, cols[1]);
}

fn amount_lines(state: &UiState) -> Vec<Line<'static>> {
    let input = if state.amount_input.is_empty() {
        Span::styled(
            format!("{}", state.snapshot.flow.investment_amount),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Span::raw(state.amount_input.clone())
    };
    vec![
        Line::from("How much SOL goes into this crate?"),
        Line::from(""),
        Line::from(vec![Span::raw("> "), input, Span::raw(" SOL")]),
        Line::from(""),
        Line::styled(
            format!(
                "A {} SOL fee allowance is added to the transfer.",
                lamports_to_sol(FEE_ALLOWANCE_LAMPORTS)
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ]
}

fn category_lines(state: &UiState, width: usize) -> Vec<Line<'static>> {
    let snap = &state.snapshot;
    let mut lines = vec![Line::from("Pick a category:"), Line::from("")];
    for (idx, name) in category_names(snap).into_iter().enumerate() {
        let detail = snap
            .categories
            .get(idx)
            .and_then(|c| c.description.clone())
            .map(|d| format!(" - {d}"))
            .unwrap_or_default();
        let selected = idx == state.category_idx;
        let cursor = if selected { ">" } else { " " };
        let style = if selected {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        lines.push(Line::styled(
            fit(&format!("{cursor} {name}{detail}"), width),
            style,
        ));
    }
    lines
}

fn coin_lines(state: &UiState) -> Vec<Line<'static>> {
    let spans: Vec<Span> = VALID_COIN_COUNTS
        .iter()
        .enumerate()
        .map(|(idx, count)| {
            if idx == state.coin_idx {
                Span::styled(
                    format!("[{count}] "),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                Span::raw(format!(" {count}  "))
            }
        })
        .collect();
    vec![
        Line::from("How many coins should the crate hold?"),
        Line::from(""),
        Line::from(spans),
        Line::from(""),
        Line::from(format!("Currently: {}", state.snapshot.flow.num_coins)),
    ]
}

fn allocation_lines(snap: &AppSnapshot) -> Vec<Line<'static>> {
    let flow = &snap.flow;
    let mut lines = vec![
        Line::from(format!("Split: {}", flow.allocation_type.as_str())),
        Line::from(""),
    ];
    if let Some(percentages) = &flow.coin_percentages {
        lines.push(Line::from(format!(
            "Shares: {}",
            percentages.iter().map(|p| format!("{p:.1}%")).join(", ")
        )));
    }
    lines.push(Line::from(format!(
        "Per coin: {}",
        flow.spend_amounts()
            .iter()
            .map(|a| format!("{a:.4}"))
            .join(" / ")
    )));
    lines
}

fn confirm_lines(state: &UiState, width: usize) -> Vec<Line<'static>> {
    let flow = &state.snapshot.flow;
    let mut lines = vec![
        Line::from(format!(
            "{} SOL into {} coins of {} ({} split)",
            flow.investment_amount,
            flow.num_coins,
            flow.selected_theme.as_deref().unwrap_or("no category"),
            flow.allocation_type.as_str()
        )),
        Line::from(format!(
            "Transfer: {:.4} SOL incl. fees, {} reroll(s)",
            lamports_to_sol(flow.settlement_lamports()),
            flow.reroll_count
        )),
        Line::from(""),
    ];
    match &state.reveal {
        Some(reveal) => {
            for (idx, slot) in reveal.slots().iter().enumerate() {
                let name = slot.visible().map(|t| t.name.as_str()).unwrap_or("?");
                let style = if slot.is_settled() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Cyan)
                };
                lines.push(Line::styled(fit(&format!("{}. {name}", idx + 1), width), style));
            }
            if state.reveal_accepted {
                lines.push(Line::from(""));
                lines.push(Line::styled(
                    "Locked in. Press a slot number to reroll it.",
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        None if flow.displayed_tokens.is_empty() => {
            lines.push(Line::from("Press c to craft your crate."));
        }
        None => {
            for (idx, token) in flow.displayed_tokens.iter().enumerate() {
                lines.push(Line::from(fit(&format!("{}. {}", idx + 1, token.name), width)));
            }
        }
    }
    lines
}

fn purchased_lines(state: &UiState, width: usize) -> Vec<Line<'static>> {
    let flow = &state.snapshot.flow;
    let mut lines = Vec::new();
    for (idx, token) in flow.displayed_tokens.iter().enumerate() {
        let mark = if state.coin_marks.contains(&idx) { "[x]" } else { "[ ]" };
        let spend = token
            .buy_amount_sol
            .map(|a| format!("{a:.4} SOL"))
            .unwrap_or_default();
        lines.push(Line::from(fit(
            &format!("{mark} {}. {} {spend}", idx + 1, token.name),
            width,
        )));
    }
    lines.push(Line::from(""));
    if let Some(current) = &flow.current_crate {
        lines.push(Line::from(fit(
            &format!("Settlement: {}", current.settlement_address),
            width,
        )));
    }
    if let Some(signature) = &flow.transaction_signature {
        lines.push(Line::from(fit(&format!("Transaction: {signature}"), width)));
    }
    if flow.onchain_reroll_fees > 0.0 {
        lines.push(Line::from(format!(
            "Reroll fees paid: {:.4} SOL",
            flow.onchain_reroll_fees
        )));
    }
    if let Some(sale) = &state.snapshot.last_sale {
        lines.push(Line::styled(
            format!(
                "Sold: {:.4} SOL back, {:.4} SOL fee, ROI {}",
                sale.user_return,
                sale.exit_fee,
                signed_percent(sale.roi)
            ),
            Style::default().fg(Color::Green),
        ));
    }
    lines
}

fn draw_crates(f: &mut Frame, area: Rect, state: &UiState) {
    let snap = &state.snapshot;
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let width = cols[0].width.saturating_sub(4) as usize;
    let mut lines: Vec<Line> = Vec::new();
    if snap.purchases.is_empty() {
        lines.push(Line::from("No crates yet"));
    }
    for (idx, group) in snap.purchases.iter().enumerate() {
        let cursor = if idx == state.crate_idx { ">" } else { " " };
        let date = group
            .purchased_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        let pnl = group
            .total_pnl_percent
            .filter(|_| group.has_pnl())
            .map(signed_percent)
            .unwrap_or_default();
        let style = match group.is_positive {
            Some(true) => Style::default().fg(Color::Green),
            Some(false) => Style::default().fg(Color::Red),
            None => Style::default(),
        };
        lines.push(Line::styled(
            fit(
                &format!(
                    "{cursor} {date} {} {:.3} SOL {pnl}",
                    group.category,
                    group.total_spend()
                ),
                width,
            ),
            style,
        ));
    }
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Crates")),
        cols[0],
    );

    if let Some(settlement) = &snap.settlement {
        let lines = vec![
            Line::from(format!("Invested:       {:.4} SOL", settlement.initial_investment)),
            Line::from(format!("Total received: {:.4} SOL", settlement.total_received)),
            Line::from(format!("Exit fee (1%):  {:.4} SOL", settlement.exit_fee)),
            Line::from(format!("Final payout:   {:.4} SOL", settlement.final_payout)),
            Line::styled(
                format!(
                    "Return:         {:+.4} SOL ({})",
                    settlement.total_return,
                    signed_percent(settlement.total_return_percent)
                ),
                pnl_style(settlement.total_return >= 0.0),
            ),
            Line::from(""),
            Line::from(format!(
                "Transaction: {}",
                settlement.signature.as_deref().unwrap_or("-")
            )),
        ];
        let widget = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Cashed out"));
        f.render_widget(widget, cols[1]);
        return;
    }

    let Some(preview) = &snap.preview else {
        let hint = Paragraph::new("Select a crate and press Enter to see its value.")
            .block(Block::default().borders(Borders::ALL).title("Cash out"));
        f.render_widget(hint, cols[1]);
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(5)])
        .split(cols[1]);
    let table_rows: Vec<Row> = preview
        .rows
        .iter()
        .map(|row| {
            Row::new(vec![
                Cell::from(fit(&row.token_name, 18)),
                Cell::from(format!("{:.4}", row.invested)),
                Cell::from(format!("{:.4}", row.current_value)),
                Cell::from(row.pnl.clone()),
            ])
            .style(pnl_style(row.is_positive))
        })
        .collect();
    let title = match &preview.category {
        Some(category) => format!("Cash out {category}"),
        None => "Cash out".to_string(),
    };
    let table = Table::new(
        table_rows,
        [
            Constraint::Percentage(40),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ],
    )
    .header(
        Row::new(vec!["Token", "Invested", "Value", "PNL"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, rows[0]);

    let source = match preview.investment_source {
        InvestmentSource::Recorded => "recorded",
        InvestmentSource::Hint => "this session",
        InvestmentSource::SpendSum => "sum of spends",
    };
    let totals = &preview.totals;
    let mut lines = vec![
        Line::from(format!(
            "Initial investment: {:.4} SOL ({source})",
            preview.initial_investment
        )),
        Line::styled(
            format!(
                "Value {:.4} SOL | PNL {:+.4} SOL ({})",
                totals.current_value,
                totals.pnl_value,
                signed_percent(totals.pnl_percent)
            ),
            pnl_style(totals.is_positive()),
        ),
    ];
    if !preview.live_pnl {
        lines.push(Line::styled(
            "Live prices unavailable; showing amounts spent.",
            Style::default().fg(Color::DarkGray),
        ));
    }
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Totals")),
        rows[1],
    );
}

fn pnl_style(positive: bool) -> Style {
    if positive {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Red)
    }
}

fn draw_status(f: &mut Frame, area: Rect, state: &UiState) {
    let snap = &state.snapshot;
    let widget = if let Some(error) = snap.error() {
        Paragraph::new(error.to_string())
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red))
    } else if snap.connect_prompt {
        Paragraph::new("Connect a wallet first: press w to pick one.")
            .block(Block::default().borders(Borders::ALL).title("Wallet"))
            .style(Style::default().fg(Color::Yellow))
    } else {
        let text = if snap.is_busy() {
            format!("{} {}", SPINNER[state.spinner % SPINNER.len()], snap.status)
        } else if snap.status.trim().is_empty() {
            "Ready".to_string()
        } else {
            snap.status.clone()
        };
        Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    };
    f.render_widget(widget.wrap(Wrap { trim: false }), area);
}

fn draw_help(f: &mut Frame, area: Rect, state: &UiState) {
    let context = if shows_crates(state) {
        "↑/↓ select | Enter value | x cash out | r reload"
    } else {
        match state.snapshot.flow.current_step {
            FlowStep::ChooseAmount => "digits type amount | Enter next",
            FlowStep::PickCategory => "↑/↓ select | Enter next | Backspace back",
            FlowStep::ChooseCoins => "←/→ select | Enter next | Backspace back",
            FlowStep::ChooseAllocation => "e equal | r random | g reshuffle | Enter next",
            FlowStep::ConfirmChoices => {
                "c craft | Space skip | Enter lock in | 1-8 reroll | a reroll all | b buy"
            }
            FlowStep::Rolling => "rolling...",
            _ => "1-8 mark | r reroll | s sell | c cash out | p crates | n new",
        }
    };
    let help = Paragraph::new(format!("{context} | Tab crates | w wallet | q quit"))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    if let Some(request) = &state.approval {
        let area = centered_rect(50, 30, f.area());
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Approve transaction");
        let p = Paragraph::new(format!("{}\n\ny approve | n reject", request.summary))
            .wrap(Wrap { trim: false });
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
        return;
    }
    match state.mode {
        Mode::QuitModal => {
            let area = centered_rect(30, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Quit");
            let p = Paragraph::new("Quit memecrate? y/n");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::WalletPicker => {
            let area = centered_rect(50, 50, f.area());
            let block = Block::default().borders(Borders::ALL).title("Wallets");
            let mut lines: Vec<Line> = Vec::new();
            if state.snapshot.wallets.is_empty() {
                lines.push(Line::from("No keypair files found"));
            }
            for (idx, name) in state.snapshot.wallets.iter().enumerate() {
                let cursor = if idx == state.wallet_idx { ">" } else { " " };
                lines.push(Line::from(format!("{cursor} {name}")));
            }
            lines.push(Line::from(""));
            lines.push(Line::from("Enter connect | d disconnect | Esc close"));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Truncates to `width` terminal columns, marking the cut with an ellipsis.
fn fit(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

fn short_key(key: &str) -> String {
    if key.len() <= 10 {
        return key.to_string();
    }
    format!("{}…{}", &key[..4], &key[key.len() - 4..])
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEvent;
    use memecrate::{
        model::CrateData,
        test_helpers::tokens,
    };
    use rand::{
        SeedableRng,
        rngs::StdRng,
    };

    fn press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn state_at(step: FlowStep) -> UiState {
        let mut state = UiState::default();
        state.snapshot.flow.current_step = step;
        state
    }

    fn expect_command(event: Option<UserEvent>) -> FlowCommand {
        match event {
            Some(UserEvent::Command(cmd)) => cmd,
            _ => panic!("expected a command"),
        }
    }

    fn settled_reveal() -> Reveal {
        let mut reveal = Reveal::new(
            &tokens(&["A", "B", "C", "D"]),
            &[],
            &mut StdRng::seed_from_u64(7),
        );
        reveal.settle_all();
        reveal
    }

    #[test]
    fn interpret_event__typed_amount_is_submitted_on_enter() {
        // given
        let mut state = state_at(FlowStep::ChooseAmount);
        for c in "1.25".chars() {
            interpret_event(&mut state, press(KeyCode::Char(c)));
        }

        // when
        let event = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        assert_eq!(expect_command(event), FlowCommand::ChooseAmount(1.25));
    }

    #[test]
    fn interpret_event__empty_amount_keeps_current_value() {
        // given
        let mut state = state_at(FlowStep::ChooseAmount);
        state.snapshot.flow.investment_amount = 0.75;

        // when
        let event = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        assert_eq!(expect_command(event), FlowCommand::ChooseAmount(0.75));
    }

    #[test]
    fn interpret_event__category_falls_back_to_static_names() {
        // given
        let mut state = state_at(FlowStep::PickCategory);
        interpret_event(&mut state, press(KeyCode::Down));

        // when
        let event = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        assert_eq!(
            expect_command(event),
            FlowCommand::ChooseTheme("Animals".to_string())
        );
    }

    #[test]
    fn interpret_event__buy_is_ignored_while_busy() {
        // given
        let mut state = state_at(FlowStep::ConfirmChoices);
        state.snapshot.busy = true;

        // when
        let event = interpret_event(&mut state, press(KeyCode::Char('b')));

        // then
        assert!(event.is_none());
    }

    #[test]
    fn interpret_event__buy_is_ignored_while_flow_is_processing() {
        // given
        let mut state = state_at(FlowStep::ConfirmChoices);
        state.snapshot.flow.is_processing = true;

        // when
        let event = interpret_event(&mut state, press(KeyCode::Char('b')));

        // then
        assert!(event.is_none());
    }

    #[test]
    fn interpret_event__settled_reveal_is_accepted_once() {
        // given
        let mut state = state_at(FlowStep::ConfirmChoices);
        show_reveal(&mut state, settled_reveal());

        // when
        let first = interpret_event(&mut state, press(KeyCode::Enter));
        let second = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        assert!(matches!(
            expect_command(first),
            FlowCommand::AcceptReveal(reveal) if reveal.finals().len() == 4
        ));
        assert!(second.is_none());
    }

    #[test]
    fn interpret_event__spinning_reveal_cannot_be_accepted_or_rerolled() {
        // given
        let mut state = state_at(FlowStep::ConfirmChoices);
        show_reveal(
            &mut state,
            Reveal::new(&tokens(&["A", "B"]), &[], &mut StdRng::seed_from_u64(1)),
        );

        // when
        let accept = interpret_event(&mut state, press(KeyCode::Enter));
        let reroll = interpret_event(&mut state, press(KeyCode::Char('1')));

        // then
        assert!(accept.is_none());
        assert!(reroll.is_none());
    }

    #[test]
    fn interpret_event__slot_reroll_needs_accepted_picks() {
        // given
        let mut state = state_at(FlowStep::ConfirmChoices);
        show_reveal(&mut state, settled_reveal());
        assert!(interpret_event(&mut state, press(KeyCode::Char('2'))).is_none());
        interpret_event(&mut state, press(KeyCode::Enter));

        // when
        let event = interpret_event(&mut state, press(KeyCode::Char('2')));

        // then
        assert_eq!(expect_command(event), FlowCommand::RerollSlot(1));
    }

    #[test]
    fn interpret_event__marked_coins_are_rerolled_in_order() {
        // given
        let mut state = state_at(FlowStep::RollingComplete);
        state.snapshot.flow.displayed_tokens = tokens(&["A", "B", "C", "D"]);
        for c in ['3', '1', '2', '2'] {
            interpret_event(&mut state, press(KeyCode::Char(c)));
        }

        // when
        let event = interpret_event(&mut state, press(KeyCode::Char('r')));

        // then
        assert_eq!(expect_command(event), FlowCommand::RerollCoins(vec![0, 2]));
        assert!(state.coin_marks.is_empty());
    }

    #[test]
    fn interpret_event__cash_out_of_current_purchase_carries_amount_hint() {
        // given
        let mut state = state_at(FlowStep::RollingComplete);
        state.snapshot.flow.purchase_id = Some("purchase-1".to_string());
        state.snapshot.flow.investment_amount = 0.5;
        state.snapshot.flow.current_crate = Some(CrateData {
            crate_id: 0,
            settlement_address: "settle".to_string(),
            coins: Vec::new(),
            investment_amount: 0.5,
            theme: "Pepe".to_string(),
            num_coins: 4,
            split_type: AllocationType::Equal,
        });

        // when
        let event = interpret_event(&mut state, press(KeyCode::Char('c')));

        // then
        assert_eq!(
            expect_command(event),
            FlowCommand::OpenCashOut {
                purchase_id: "purchase-1".to_string(),
                investment_hint: Some(0.5),
            }
        );
    }

    #[test]
    fn interpret_event__approval_prompt_takes_every_key_first() {
        // given
        let mut state = state_at(FlowStep::ConfirmChoices);
        let (request, mut answer) = ApprovalRequest::new("1 instruction");
        ask_approval(&mut state, request);

        // when
        let ignored = interpret_event(&mut state, press(KeyCode::Char('b')));
        let declined = interpret_event(&mut state, press(KeyCode::Char('n')));

        // then
        assert!(ignored.is_none());
        assert!(matches!(declined, Some(UserEvent::Redraw)));
        assert_eq!(answer.try_recv(), Ok(false));
        assert!(state.approval.is_none());
    }

    #[test]
    fn ask_approval__replacing_a_prompt_declines_the_old_one() {
        // given
        let mut state = UiState::default();
        let (first, mut first_answer) = ApprovalRequest::new("first");
        let (second, _second_answer) = ApprovalRequest::new("second");
        ask_approval(&mut state, first);

        // when
        ask_approval(&mut state, second);

        // then
        assert_eq!(first_answer.try_recv(), Ok(false));
    }

    #[test]
    fn interpret_event__ctrl_c_quits_from_anywhere() {
        // given
        let mut state = state_at(FlowStep::ChooseAmount);
        state.mode = Mode::WalletPicker;

        // when
        let event = interpret_event(
            &mut state,
            Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
        );

        // then
        assert!(matches!(event, Some(UserEvent::Quit)));
    }

    #[test]
    fn interpret_event__wallet_picker_connects_selected_wallet() {
        // given
        let mut state = state_at(FlowStep::ChooseAmount);
        state.snapshot.wallets = vec!["alice".to_string(), "bob".to_string()];
        interpret_event(&mut state, press(KeyCode::Char('w')));
        interpret_event(&mut state, press(KeyCode::Down));

        // when
        let event = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        assert_eq!(
            expect_command(event),
            FlowCommand::ConnectWallet("bob".to_string())
        );
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn tick__advances_spinning_reveal_until_settled() {
        // given
        let mut state = state_at(FlowStep::ConfirmChoices);
        show_reveal(
            &mut state,
            Reveal::new(&tokens(&["A", "B"]), &[], &mut StdRng::seed_from_u64(5)),
        );

        // when
        let mut ticks = 0;
        while tick(&mut state) && ticks < 1_000 {
            ticks += 1;
        }

        // then
        assert!(state.reveal.as_ref().unwrap().can_confirm());
        assert!(ticks < 1_000);
    }

    #[test]
    fn fit__truncates_by_display_width() {
        assert_eq!(fit("short", 10), "short");
        assert_eq!(fit("abcdefghij", 5), "abcd…");
    }
}
