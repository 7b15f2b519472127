// Constant-product pairs: input is pushed to the pair before `swap`, output can be
// sent to any address.
//
// params: pool(20) | receiver(20)

use std::sync::Arc;

use ethers::types::{Address, U256};

use crate::errors::{DispatchError, EncodingError, VenueError};
use crate::executor::{PricingCurve, SwapContext, VenueExecutor};
use crate::models::Swap;
use crate::strategy::SwapGroup;
use crate::swap_encoder::{FundingModel, SwapEncoder};

pub const VENUE: &str = "uniswap_v2";

#[derive(Debug, Clone)]
pub struct UniswapV2Encoder {
    executor: Address,
}

impl UniswapV2Encoder {
    pub fn new(executor: Address) -> Self {
        Self { executor }
    }
}

impl SwapEncoder for UniswapV2Encoder {
    fn venue(&self) -> &'static str {
        VENUE
    }

    fn executor_address(&self) -> Address {
        self.executor
    }

    fn funding(&self) -> FundingModel {
        FundingModel::PushBeforeSwap
    }

    fn supports_redirect(&self) -> bool {
        true
    }

    fn funding_address(&self, swap: &Swap) -> Result<Address, EncodingError> {
        swap.component_address()
    }

    fn encode_swap(&self, group: &SwapGroup, receiver: Address) -> Result<Vec<u8>, EncodingError> {
        if group.legs.len() != 1 {
            return Err(EncodingError::invalid("legs", "uniswap_v2 encodes one pool per hop"));
        }
        let pool = group.lead().component_address()?;
        let mut out = Vec::with_capacity(40);
        out.extend_from_slice(pool.as_bytes());
        out.extend_from_slice(receiver.as_bytes());
        Ok(out)
    }
}

pub struct UniswapV2Executor {
    curve: Arc<dyn PricingCurve>,
}

impl UniswapV2Executor {
    pub fn new(curve: Arc<dyn PricingCurve>) -> Self {
        Self { curve }
    }

    fn decode(params: &[u8]) -> Result<(Address, Address), VenueError> {
        super::read_params(VENUE, params, |r| Ok((r.address()?, r.address()?)))
    }
}

impl VenueExecutor for UniswapV2Executor {
    fn name(&self) -> &'static str {
        VENUE
    }

    fn funding_target(&self, params: &[u8], _holder: Address) -> Result<Address, VenueError> {
        Ok(Self::decode(params)?.0)
    }

    fn swap(&self, ctx: &mut SwapContext<'_>, amount_in: U256, params: &[u8]) -> Result<U256, DispatchError> {
        let (pool, receiver) = Self::decode(params)?;
        let (token_in, token_out) = (ctx.hop().token_in, ctx.hop().token_out);
        let amount_out = self
            .curve
            .amount_out(pool.as_bytes(), token_in, token_out, amount_in)?;
        ctx.chain_mut().transfer(token_out, pool, receiver, amount_out)?;
        Ok(amount_out)
    }
}
