//! # Transfer Optimizer
//!
//! Decides, per hop, how the hop's input reaches the venue ([`TransferDirective`]) and
//! where the hop delivers its output.
//!
//! Priority, first match wins:
//!
//! 1. Entry hop of a pull-authorized solution → `DelegatedPull`
//! 2. Chained hop whose previous venue can redirect output and whose own venue wants
//!    funds pushed before the swap → `PreFunded` (previous hop delivers straight to it)
//! 3. Approval-pull venue, or native input already held → `Resident`
//! 4. Anything else → `DirectPush`
//!
//! Approval-pull venues additionally get the `approval_required` marker the first
//! time a `(token, spender)` pair is seen without a sufficient grant.

use std::collections::HashMap;

use ethers::types::{Address, U256};
use log::{debug, trace};

use crate::errors::EncodingError;
use crate::models::{HopDirective, Solution, TransferDirective, NATIVE_TOKEN};
use crate::strategy::{ExecutionPlan, Strategy};
use crate::swap_encoder::{FundingModel, SwapEncoderRegistry};

/// Grants the dispatcher is known to have issued, keyed by `(token, spender)`.
///
/// Persist one across encodings to avoid re-approving on every program; a fresh
/// ledger makes every approval-pull hop carry the marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalLedger {
    grants: HashMap<(Address, Address), U256>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, token: Address, spender: Address, amount: U256) {
        self.grants.insert((token, spender), amount);
    }

    pub fn allowance(&self, token: Address, spender: Address) -> U256 {
        self.grants.get(&(token, spender)).copied().unwrap_or_default()
    }

    /// Whether a grant exists and covers `needed`. An unknown requirement only
    /// needs some grant to exist.
    pub fn covers(&self, token: Address, spender: Address, needed: Option<U256>) -> bool {
        match self.grants.get(&(token, spender)) {
            None => false,
            Some(granted) if granted.is_zero() => false,
            Some(granted) => needed.map_or(true, |needed| *granted >= needed),
        }
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// The optimizer's decision for one group of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopPlan {
    pub directive: HopDirective,
    /// Where the venue must deliver its output.
    pub receiver: Address,
}

pub struct TransferOptimizer<'a> {
    encoders: &'a SwapEncoderRegistry,
    router: Address,
}

impl<'a> TransferOptimizer<'a> {
    pub fn new(encoders: &'a SwapEncoderRegistry, router: Address) -> Self {
        Self { encoders, router }
    }

    pub fn optimize(
        &self,
        plan: &ExecutionPlan,
        solution: &Solution,
        approvals: &mut ApprovalLedger,
    ) -> Result<Vec<HopPlan>, EncodingError> {
        let chained = matches!(plan.strategy, Strategy::Single | Strategy::Sequential);
        let mut hops: Vec<HopPlan> = Vec::with_capacity(plan.groups.len());

        for (index, group) in plan.groups.iter().enumerate() {
            let encoder = self.encoders.get(&group.venue)?;
            let is_entry = if chained {
                index == 0
            } else {
                group.input_slot == 0
            };

            let mut transfer = if is_entry && solution.pull_authorized && !plan.wrap {
                TransferDirective::DelegatedPull
            } else if chained && index > 0 && self.can_prefund(plan, index)? {
                let funding = encoder.funding_address(group.lead())?;
                if let Some(previous) = hops.last_mut() {
                    previous.receiver = funding;
                }
                TransferDirective::PreFunded
            } else if encoder.funding() == FundingModel::PullByApproval || group.token_in == NATIVE_TOKEN {
                TransferDirective::Resident
            } else {
                TransferDirective::DirectPush
            };

            // native currency arrives with the call, it cannot be pulled
            if transfer == TransferDirective::DelegatedPull && group.token_in == NATIVE_TOKEN {
                transfer = TransferDirective::Resident;
            }

            let mut approval_required = false;
            if encoder.funding() == FundingModel::PullByApproval {
                if let Some(spender) = encoder.approval_spender(group.lead())? {
                    let needed = group.estimated_amount_in();
                    if !approvals.covers(group.token_in, spender, needed) {
                        approval_required = true;
                        approvals.grant(group.token_in, spender, U256::MAX);
                        trace!("hop {} requires approval of {:?} for {:?}", index, group.token_in, spender);
                    }
                }
            }

            hops.push(HopPlan {
                directive: HopDirective::new(transfer).with_approval(approval_required),
                receiver: self.router,
            });
        }

        if self.delivers_directly(plan, solution)? {
            if let Some(last) = hops.last_mut() {
                last.receiver = solution.receiver;
            }
        }

        let pushes = hops
            .iter()
            .filter(|hop| hop.directive.transfer == TransferDirective::DirectPush)
            .count();
        debug!(
            "optimized {} hops: {} direct pushes, {} pre-funded",
            hops.len(),
            pushes,
            hops.iter()
                .filter(|hop| hop.directive.transfer == TransferDirective::PreFunded)
                .count()
        );
        Ok(hops)
    }

    fn can_prefund(&self, plan: &ExecutionPlan, index: usize) -> Result<bool, EncodingError> {
        let previous = &plan.groups[index - 1];
        let current = &plan.groups[index];
        if previous.token_out != current.token_in {
            return Ok(false);
        }
        let previous_encoder = self.encoders.get(&previous.venue)?;
        let current_encoder = self.encoders.get(&current.venue)?;
        Ok(previous_encoder.supports_redirect() && current_encoder.funding() == FundingModel::PushBeforeSwap)
    }

    /// Chained programs whose last venue can redirect deliver straight to the
    /// receiver. Split and cyclic programs always settle through the dispatcher.
    fn delivers_directly(&self, plan: &ExecutionPlan, solution: &Solution) -> Result<bool, EncodingError> {
        if !matches!(plan.strategy, Strategy::Single | Strategy::Sequential) || plan.unwrap {
            return Ok(false);
        }
        if solution.receiver.is_zero() || solution.receiver == self.router {
            return Ok(false);
        }
        match plan.groups.last() {
            Some(last) => Ok(self.encoders.get(&last.venue)?.supports_redirect()),
            None => Ok(false),
        }
    }
}
