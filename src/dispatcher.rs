//! # Dispatcher
//!
//! Interprets an encoded program against the token ledger: decodes it, funds and
//! invokes each hop's executor, answers "pay-me" callbacks, and reconciles the run.
//!
//! ## Run lifecycle
//!
//! ```text
//! Idle -> Unpacking -> PerHopExecuting -> (CallbackPending -> CallbackHandled) -> Reconciling -> Done
//!                                    \______________________ any failure ______________________/-> Reverted
//! ```
//!
//! A run is atomic: the ledger is snapshotted before anything moves and restored on
//! every failure. Only one run may be in flight per dispatcher; a nested submit
//! (from an executor re-entering) fails with [`DispatchError::RunInFlight`] before
//! touching any state.
//!
//! ## Accounting
//!
//! - the entry slot must be fully consumed
//! - a callback hop must be paid exactly its input before the hop returns
//! - the dispatcher ends the run holding exactly what it held before, in every token
//! - the output realized by the receiver must equal what executors reported and be at
//!   least the program's minimum
//! - cyclic programs track `consumed`/`realized` of the shared token separately from
//!   the balance checks; the returned amount `amount_in + net` is held against the
//!   minimum

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, I256, U256};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::chain::{ChainState, LedgerError};
use crate::encoder::EXECUTE_SELECTOR;
use crate::errors::DispatchError;
use crate::executor::{HopView, Settlement, SwapContext, VenueExecutor};
use crate::metrics;
use crate::models::{Transaction, TransferDirective, NATIVE_TOKEN};
use crate::program::{HopUnit, PleEntry, Program, ProgramBody, SplitUnit};
use crate::registry::{ExecutorRegistry, RegistryError};
use crate::strategy::Strategy;
use crate::utils::apply_u24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DispatchPhase {
    Idle,
    Unpacking,
    PerHopExecuting,
    CallbackPending,
    CallbackHandled,
    Reconciling,
    Done,
    Reverted,
}

/// Shared-token flows of a cyclic run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CyclicAccumulator {
    pub consumed: U256,
    pub realized: U256,
}

impl CyclicAccumulator {
    pub fn record(&mut self, shared: Address, token_in: Address, token_out: Address, amount_in: U256, amount_out: U256) {
        if token_in == shared {
            self.consumed = self.consumed.saturating_add(amount_in);
        }
        if token_out == shared {
            self.realized = self.realized.saturating_add(amount_out);
        }
    }

    /// `realized - consumed`, signed.
    pub fn net(&self) -> I256 {
        I256::from_raw(self.realized) - I256::from_raw(self.consumed)
    }

    /// What the run hands back for `amount_in`: `amount_in + net`, floored at zero.
    pub fn returned(&self, amount_in: U256) -> U256 {
        amount_in
            .saturating_add(self.realized)
            .saturating_sub(self.consumed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HopReport {
    pub index: usize,
    pub venue: &'static str,
    pub executor: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub transfer: TransferDirective,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub strategy: Strategy,
    pub receiver: Address,
    pub amount_in: U256,
    /// Output the receiver actually gained.
    pub amount_out: U256,
    pub min_amount_out: U256,
    pub hops: Vec<HopReport>,
    /// Present for cyclic runs.
    pub cyclic: Option<CyclicAccumulator>,
    pub block_number: u64,
    pub phases: Vec<DispatchPhase>,
}

impl RunReport {
    pub fn cyclic_net(&self) -> Option<I256> {
        self.cyclic.map(|acc| acc.net())
    }
}

#[derive(Debug, Clone)]
struct CallbackWindow {
    hop: usize,
    executor: Address,
    selector: [u8; 4],
    token: Address,
    transfer: TransferDirective,
    payer: Address,
    limit: U256,
    paid: U256,
}

#[derive(Debug)]
struct RunState {
    phase: DispatchPhase,
    window: Option<CallbackWindow>,
    trace: Vec<DispatchPhase>,
    /// Set once the header has decoded.
    strategy: Option<Strategy>,
}

impl RunState {
    fn enter(&mut self, phase: DispatchPhase) {
        self.phase = phase;
        if self.trace.last() != Some(&phase) {
            self.trace.push(phase);
        }
    }
}

/// Resets the in-flight flag when a run ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Dispatcher {
    address: Address,
    registry: Arc<ExecutorRegistry>,
    executors: HashMap<Address, Arc<dyn VenueExecutor>>,
    in_flight: AtomicBool,
    state: Mutex<RunState>,
}

impl Dispatcher {
    pub fn new(address: Address, registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            address,
            registry,
            executors: HashMap::new(),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(RunState {
                phase: DispatchPhase::Idle,
                window: None,
                trace: Vec::new(),
                strategy: None,
            }),
        }
    }

    /// Binds an executor implementation to its deployed address. Whether it may be
    /// called is still decided by the registry at every hop.
    pub fn with_executor(mut self, address: Address, executor: Arc<dyn VenueExecutor>) -> Self {
        self.executors.insert(address, executor);
        self
    }

    pub fn with_executors(mut self, executors: impl IntoIterator<Item = (Address, Arc<dyn VenueExecutor>)>) -> Self {
        self.executors.extend(executors);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn phase(&self) -> DispatchPhase {
        self.state().phase
    }

    /// Phases the last (or current) run went through.
    pub fn trace(&self) -> Vec<DispatchPhase> {
        self.state().trace.clone()
    }

    /// Strategy of the last (or current) run's program, if its header decoded.
    pub fn last_strategy(&self) -> Option<Strategy> {
        self.state().strategy
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Runs `program` for `caller`. `value` is the native currency sent along, which
    /// must equal `amount_in` for wrap-in programs and be zero otherwise.
    ///
    /// In deposit mode (no delegated pull, no wrap) the input must already be held by
    /// the dispatcher when the run starts.
    pub fn submit(
        &self,
        chain: &mut ChainState,
        caller: Address,
        program: &[u8],
        amount_in: U256,
        value: U256,
    ) -> Result<RunReport, DispatchError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DispatchError::RunInFlight);
        }
        let _in_flight = InFlight(&self.in_flight);

        let span = info_span!("dispatch", caller = ?caller, amount_in = %amount_in, block = chain.block_number());
        let _enter = span.enter();

        {
            let mut state = self.state();
            state.trace.clear();
            state.window = None;
            state.strategy = None;
            state.enter(DispatchPhase::Idle);
        }

        let snapshot = chain.snapshot();
        match self.run(chain, caller, program, amount_in, value) {
            Ok(report) => {
                let mut state = self.state();
                state.enter(DispatchPhase::Done);
                let report = RunReport {
                    phases: state.trace.clone(),
                    ..report
                };
                info!(
                    strategy = %report.strategy,
                    hops = report.hops.len(),
                    amount_out = %report.amount_out,
                    "run settled"
                );
                metrics::record_run(report.strategy.as_str(), "done");
                Ok(report)
            }
            Err(err) => {
                chain.restore(snapshot);
                let mut state = self.state();
                state.window = None;
                state.enter(DispatchPhase::Reverted);
                let strategy = state.strategy.map_or("unknown", Strategy::as_str);
                warn!(error = %err, kind = err.kind(), strategy, "run reverted");
                metrics::record_run(strategy, err.kind());
                Err(err)
            }
        }
    }

    /// Decodes an ABI `execute(uint256,bytes)` call addressed to this dispatcher
    /// and submits it.
    pub fn submit_call(&self, chain: &mut ChainState, caller: Address, tx: &Transaction) -> Result<RunReport, DispatchError> {
        if tx.to != self.address {
            return Err(DispatchError::InvalidRun(format!(
                "call addressed to {:?}, dispatcher is {:?}",
                tx.to, self.address
            )));
        }
        let (amount_in, program) = decode_execute_call(&tx.data)?;
        self.submit(chain, caller, &program, amount_in, tx.value)
    }

    /// Callback entry point. Valid only while the in-flight hop's callback window is
    /// open, from that hop's executor, with the venue's selector, for at most what
    /// the hop is still owed.
    pub fn handle_callback(
        &self,
        chain: &mut ChainState,
        caller: Address,
        pay_to: Address,
        selector: [u8; 4],
        amount: U256,
    ) -> Result<(), DispatchError> {
        let window = {
            let state = self.state();
            match (&state.window, state.phase) {
                (Some(window), DispatchPhase::CallbackPending) => window.clone(),
                _ => return Err(DispatchError::UnsolicitedCallback),
            }
        };
        if caller != window.executor {
            return Err(DispatchError::UnexpectedCallback {
                expected: window.executor,
                got: caller,
            });
        }
        self.registry.check(caller, chain.block_number())?;
        if selector != window.selector {
            return Err(DispatchError::CallbackSelectorMismatch {
                expected: window.selector,
                got: selector,
            });
        }
        let owed = window.limit.saturating_sub(window.paid);
        if amount > owed {
            return Err(DispatchError::CallbackOverdraw {
                requested: amount,
                limit: owed,
            });
        }

        self.fund(chain, window.payer, window.transfer, window.token, pay_to, amount)?;
        debug!(hop = window.hop, amount = %amount, "callback settled");

        let mut state = self.state();
        if let Some(open) = state.window.as_mut() {
            open.paid = open.paid.saturating_add(amount);
        }
        state.enter(DispatchPhase::CallbackHandled);
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, phase: DispatchPhase) {
        self.state().enter(phase);
    }

    fn run(
        &self,
        chain: &mut ChainState,
        caller: Address,
        bytes: &[u8],
        amount_in: U256,
        value: U256,
    ) -> Result<RunReport, DispatchError> {
        self.enter(DispatchPhase::Unpacking);
        if amount_in.is_zero() {
            return Err(DispatchError::InvalidRun("amount in is zero".to_string()));
        }
        let program = Program::decode(bytes)?;
        self.state().strategy = Some(program.header.strategy);
        let header = &program.header;
        let flags = header.flags;
        debug!(strategy = %header.strategy, hops = program.body.hop_count(), "program unpacked");

        if flags.wrap_in() {
            if header.token_in != chain.wrapped_native() {
                return Err(DispatchError::InvalidRun(
                    "wrap-in programs must start from the wrapped native token".to_string(),
                ));
            }
            if value != amount_in {
                return Err(DispatchError::InvalidRun(format!(
                    "wrap-in expects {} native, call carries {}",
                    amount_in, value
                )));
            }
        } else if !value.is_zero() {
            return Err(DispatchError::InvalidRun(format!("unexpected native value {}", value)));
        }
        if flags.unwrap_out() && header.token_out != chain.wrapped_native() {
            return Err(DispatchError::InvalidRun(
                "unwrap-out programs must end in the wrapped native token".to_string(),
            ));
        }

        // Balances the dispatcher must end the run with.
        let mut baselines: HashMap<Address, U256> = HashMap::new();
        for hop in program.body.hops() {
            for token in [hop.token_in, hop.token_out] {
                baselines
                    .entry(token)
                    .or_insert_with(|| chain.balance_of(token, self.address));
            }
        }
        baselines
            .entry(header.token_out)
            .or_insert_with(|| chain.balance_of(header.token_out, self.address));
        let held_in = chain.balance_of(header.token_in, self.address);

        let pulls = entry_hops(&program.body)
            .iter()
            .any(|hop| hop.directive.transfer == TransferDirective::DelegatedPull);
        let baseline_in = if flags.wrap_in() {
            chain.transfer(NATIVE_TOKEN, caller, self.address, value)?;
            chain.wrap(self.address, amount_in)?;
            held_in
        } else if pulls {
            held_in
        } else {
            if held_in < amount_in {
                return Err(DispatchError::InsufficientEntryFunds {
                    available: held_in,
                    required: amount_in,
                });
            }
            held_in - amount_in
        };
        baselines.insert(header.token_in, baseline_in);

        let final_token = if flags.unwrap_out() { NATIVE_TOKEN } else { header.token_out };
        let receiver_before = chain.balance_of(final_token, header.receiver);

        // Body
        let mut hops = Vec::with_capacity(program.body.hop_count());
        let mut accumulator = CyclicAccumulator::default();
        let shared = header.token_in;
        let reported_out = match &program.body {
            ProgramBody::Single(hop) => self.execute_hop(chain, caller, 0, hop, amount_in, &mut hops)?,
            ProgramBody::Sequential(entries) => {
                let mut amount = amount_in;
                for (index, hop) in entries.iter().filter_map(PleEntry::unit).enumerate() {
                    if amount.is_zero() {
                        return Err(DispatchError::ZeroAmountHop { hop: index });
                    }
                    amount = self.execute_hop(chain, caller, index, hop, amount, &mut hops)?;
                }
                amount
            }
            ProgramBody::Split(entries) | ProgramBody::Cyclic(entries) => {
                let slots = header.token_count as usize;
                let mut remaining = vec![U256::zero(); slots];
                remaining[0] = amount_in;
                for (index, unit) in entries.iter().filter_map(PleEntry::unit).enumerate() {
                    let input = unit.token_in_index as usize;
                    let output = unit.token_out_index as usize;
                    let amount = apply_u24(remaining[input], unit.split);
                    if amount.is_zero() {
                        return Err(DispatchError::ZeroAmountHop { hop: index });
                    }
                    remaining[input] -= amount;
                    let out = self.execute_hop(chain, caller, index, &unit.hop, amount, &mut hops)?;
                    remaining[output] = remaining[output].saturating_add(out);
                    if flags.cyclic() {
                        accumulator.record(shared, unit.hop.token_in, unit.hop.token_out, amount, out);
                    }
                }

                self.enter(DispatchPhase::Reconciling);
                if !remaining[0].is_zero() {
                    return Err(DispatchError::AmountConsumedMismatch {
                        consumed: amount_in - remaining[0],
                        expected: amount_in,
                    });
                }
                if let Some((slot, amount)) = remaining
                    .iter()
                    .enumerate()
                    .take(slots - 1)
                    .skip(1)
                    .find(|(_, amount)| !amount.is_zero())
                {
                    return Err(DispatchError::ResidualBalance {
                        token: slot_token(entries, slot),
                        amount: *amount,
                    });
                }
                if flags.cyclic() {
                    accumulator.returned(amount_in)
                } else {
                    remaining[slots - 1]
                }
            }
        };

        self.enter(DispatchPhase::Reconciling);

        // Forward what the dispatcher holds of the output.
        let out_baseline = if flags.cyclic() {
            baseline_in
        } else {
            baselines.get(&header.token_out).copied().unwrap_or_default()
        };
        let held_out = chain
            .balance_of(header.token_out, self.address)
            .saturating_sub(out_baseline);
        if !held_out.is_zero() {
            if flags.unwrap_out() {
                chain.unwrap(self.address, held_out)?;
                chain.transfer(NATIVE_TOKEN, self.address, header.receiver, held_out)?;
            } else {
                chain.transfer(header.token_out, self.address, header.receiver, held_out)?;
            }
        }

        for (token, expected) in &baselines {
            let now = chain.balance_of(*token, self.address);
            if now != *expected {
                let amount = if now > *expected { now - *expected } else { *expected - now };
                return Err(DispatchError::ResidualBalance { token: *token, amount });
            }
        }

        let realized = if flags.cyclic() {
            held_out
        } else {
            chain
                .balance_of(final_token, header.receiver)
                .saturating_sub(receiver_before)
        };
        if realized != reported_out {
            return Err(DispatchError::OutputMismatch {
                reported: reported_out,
                realized,
            });
        }
        if realized < header.min_amount_out {
            return Err(DispatchError::NegativeSlippage {
                realized,
                minimum: header.min_amount_out,
            });
        }

        Ok(RunReport {
            strategy: header.strategy,
            receiver: header.receiver,
            amount_in,
            amount_out: realized,
            min_amount_out: header.min_amount_out,
            hops,
            cyclic: flags.cyclic().then_some(accumulator),
            block_number: chain.block_number(),
            phases: Vec::new(),
        })
    }

    fn execute_hop(
        &self,
        chain: &mut ChainState,
        caller: Address,
        index: usize,
        hop: &HopUnit,
        amount_in: U256,
        reports: &mut Vec<HopReport>,
    ) -> Result<U256, DispatchError> {
        self.enter(DispatchPhase::PerHopExecuting);
        self.registry.check(hop.executor, chain.block_number())?;
        let executor = self
            .executors
            .get(&hop.executor)
            .cloned()
            .ok_or(RegistryError::UnknownExecutor(hop.executor))?;

        if hop.directive.approval_required {
            let spender = executor.approval_spender(&hop.params)?.ok_or_else(|| {
                DispatchError::InvalidRun(format!("hop {} requests an approval its venue does not use", index))
            })?;
            if chain.allowance(hop.token_in, self.address, spender).is_zero() {
                chain.approve(hop.token_in, self.address, spender, U256::MAX);
                debug!(hop = index, spender = ?spender, "approved venue");
            }
        }

        let settlement = executor.settlement();
        match settlement {
            Settlement::Upfront => {
                let target = executor.funding_target(&hop.params, self.address)?;
                self.fund(chain, caller, hop.directive.transfer, hop.token_in, target, amount_in)?;
            }
            Settlement::Callback { selector } => {
                let mut state = self.state();
                state.window = Some(CallbackWindow {
                    hop: index,
                    executor: hop.executor,
                    selector,
                    token: hop.token_in,
                    transfer: hop.directive.transfer,
                    payer: caller,
                    limit: amount_in,
                    paid: U256::zero(),
                });
                state.enter(DispatchPhase::CallbackPending);
            }
        }

        let view = HopView {
            index,
            executor: hop.executor,
            token_in: hop.token_in,
            token_out: hop.token_out,
            directive: hop.directive,
            amount_in,
            params: hop.params.clone(),
        };
        let amount_out = {
            let mut ctx = SwapContext::new(self, chain, view);
            executor.swap(&mut ctx, amount_in, &hop.params)?
        };

        if let Settlement::Callback { .. } = settlement {
            let window = self.state().window.take();
            let paid = window.map(|w| w.paid).unwrap_or_default();
            if paid.is_zero() {
                return Err(DispatchError::CallbackNotSettled { hop: index });
            }
            // pulled input never passes through the dispatcher, so the hop must
            // account for all of it here
            if paid != amount_in {
                return Err(DispatchError::AmountConsumedMismatch {
                    consumed: paid,
                    expected: amount_in,
                });
            }
        }

        debug!(
            hop = index,
            venue = executor.name(),
            amount_in = %amount_in,
            amount_out = %amount_out,
            "hop executed"
        );
        reports.push(HopReport {
            index,
            venue: executor.name(),
            executor: hop.executor,
            token_in: hop.token_in,
            token_out: hop.token_out,
            transfer: hop.directive.transfer,
            amount_in,
            amount_out,
        });
        Ok(amount_out)
    }

    /// Moves `amount` of `token` to `target` the way `transfer` says.
    fn fund(
        &self,
        chain: &mut ChainState,
        payer: Address,
        transfer: TransferDirective,
        token: Address,
        target: Address,
        amount: U256,
    ) -> Result<(), DispatchError> {
        match transfer {
            TransferDirective::PreFunded | TransferDirective::Resident => Ok(()),
            TransferDirective::DirectPush => {
                if target != self.address {
                    chain.transfer(token, self.address, target, amount)?;
                }
                Ok(())
            }
            TransferDirective::DelegatedPull => chain
                .transfer_from(token, self.address, payer, target, amount)
                .map_err(|err| match err {
                    LedgerError::InsufficientAllowance {
                        token,
                        owner,
                        needed,
                        available,
                        ..
                    } => DispatchError::InsufficientAuthorization {
                        token,
                        owner,
                        required: needed,
                        available,
                    },
                    other => DispatchError::Ledger(other),
                }),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("address", &self.address)
            .field("executors", &self.executors.len())
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

/// Hop units that draw from the entry slot.
fn entry_hops(body: &ProgramBody) -> Vec<&HopUnit> {
    match body {
        ProgramBody::Single(hop) => vec![hop],
        ProgramBody::Sequential(entries) => entries.iter().filter_map(PleEntry::unit).take(1).collect(),
        ProgramBody::Split(entries) | ProgramBody::Cyclic(entries) => entries
            .iter()
            .filter_map(PleEntry::unit)
            .filter(|unit| unit.token_in_index == 0)
            .map(|unit| &unit.hop)
            .collect(),
    }
}

/// Token bound to `slot`, as named by the first unit touching it.
fn slot_token(entries: &[PleEntry<SplitUnit>], slot: usize) -> Address {
    entries
        .iter()
        .filter_map(PleEntry::unit)
        .find_map(|unit| {
            if unit.token_out_index as usize == slot {
                Some(unit.hop.token_out)
            } else if unit.token_in_index as usize == slot {
                Some(unit.hop.token_in)
            } else {
                None
            }
        })
        .unwrap_or_default()
}

fn decode_execute_call(data: &[u8]) -> Result<(U256, Vec<u8>), DispatchError> {
    if data.len() < 4 || data[..4] != EXECUTE_SELECTOR[..] {
        return Err(DispatchError::InvalidRun("not an execute(uint256,bytes) call".to_string()));
    }
    let tokens = abi::decode(&[ParamType::Uint(256), ParamType::Bytes], &data[4..])
        .map_err(|e| DispatchError::InvalidRun(format!("undecodable call data: {}", e)))?;
    match tokens.as_slice() {
        [Token::Uint(amount_in), Token::Bytes(program)] => Ok((*amount_in, program.clone())),
        _ => Err(DispatchError::InvalidRun("unexpected execute arguments".to_string())),
    }
}
