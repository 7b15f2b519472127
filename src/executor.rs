//! # Venue Executors
//!
//! Dispatcher-side half of a venue integration. An executor interprets the params its
//! swap encoder produced, moves tokens on the ledger, and reports the output amount.
//!
//! Executors run in the dispatcher's custody context ([`SwapContext`]): tokens they
//! receive are held by the dispatcher, and callback venues ask for payment through
//! [`SwapContext::request_payment`], which routes into the dispatcher's callback
//! handler with all of its checks.

use ethers::types::{Address, Bytes, U256};

use crate::chain::ChainState;
use crate::dispatcher::Dispatcher;
use crate::errors::{DispatchError, VenueError};
use crate::models::HopDirective;

/// When the venue expects to be paid relative to the swap call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Input is moved per the directive before the swap is invoked.
    Upfront,
    /// Input is paid from inside the swap, when the venue calls back with `selector`.
    Callback { selector: [u8; 4] },
}

/// Venue quote math. Kept outside the dispatcher; production integrations read
/// pool state, tests plug in fixed rates.
pub trait PricingCurve: Send + Sync {
    fn amount_out(
        &self,
        component: &[u8],
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256, VenueError>;
}

pub trait VenueExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    fn settlement(&self) -> Settlement {
        Settlement::Upfront
    }

    /// Address that must hold the input when the swap starts. `holder` is the
    /// dispatcher.
    fn funding_target(&self, params: &[u8], holder: Address) -> Result<Address, VenueError>;

    /// Spender to approve for approval-pull venues.
    fn approval_spender(&self, _params: &[u8]) -> Result<Option<Address>, VenueError> {
        Ok(None)
    }

    /// Executes the swap and returns the amount of `token_out` delivered.
    fn swap(&self, ctx: &mut SwapContext<'_>, amount_in: U256, params: &[u8]) -> Result<U256, DispatchError>;
}

/// The hop being executed, as the executor sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopView {
    pub index: usize,
    pub executor: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub directive: HopDirective,
    pub amount_in: U256,
    pub params: Bytes,
}

pub struct SwapContext<'a> {
    dispatcher: &'a Dispatcher,
    chain: &'a mut ChainState,
    hop: HopView,
}

impl<'a> SwapContext<'a> {
    pub(crate) fn new(dispatcher: &'a Dispatcher, chain: &'a mut ChainState, hop: HopView) -> Self {
        Self { dispatcher, chain, hop }
    }

    /// Account whose custody the swap runs in.
    pub fn holder(&self) -> Address {
        self.dispatcher.address()
    }

    pub fn hop(&self) -> &HopView {
        &self.hop
    }

    pub fn chain(&self) -> &ChainState {
        self.chain
    }

    pub fn chain_mut(&mut self) -> &mut ChainState {
        self.chain
    }

    pub fn dispatcher(&self) -> &'a Dispatcher {
        self.dispatcher
    }

    /// Calls back into the dispatcher asking it to pay `amount` of the hop input
    /// to `pay_to`.
    pub fn request_payment(&mut self, pay_to: Address, selector: [u8; 4], amount: U256) -> Result<(), DispatchError> {
        let executor = self.hop.executor;
        self.dispatcher
            .handle_callback(self.chain, executor, pay_to, selector, amount)
    }
}

/// Deterministic curve returning `amount_in * numerator / denominator`, for every
/// pair or for one pair only.
#[derive(Debug, Clone)]
pub struct FixedRateCurve {
    numerator: U256,
    denominator: U256,
    pair: Option<(Address, Address)>,
}

impl FixedRateCurve {
    pub fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator: U256::from(numerator),
            denominator: U256::from(denominator.max(1)),
            pair: None,
        }
    }

    pub fn for_pair(mut self, token_in: Address, token_out: Address) -> Self {
        self.pair = Some((token_in, token_out));
        self
    }
}

impl PricingCurve for FixedRateCurve {
    fn amount_out(
        &self,
        _component: &[u8],
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256, VenueError> {
        if let Some(pair) = self.pair {
            if pair != (token_in, token_out) {
                return Err(VenueError::NoLiquidity {
                    venue: "fixed_rate",
                    token_in,
                    token_out,
                });
            }
        }
        Ok(crate::utils::mul_div(amount_in, self.numerator, self.denominator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_rate_curve() {
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        let curve = FixedRateCurve::new(99, 100).for_pair(a, b);
        assert_eq!(curve.amount_out(&[], a, b, U256::from(1000u64)).unwrap(), U256::from(990u64));
        assert!(matches!(
            curve.amount_out(&[], b, a, U256::from(1000u64)),
            Err(VenueError::NoLiquidity { .. })
        ));
    }
}
