// Stable-swap pools: the pool pulls the input from the holder through an approval
// and always pays the output back to the caller.
//
// params: pool(20) | i(1) | j(1)

use std::sync::Arc;

use ethers::types::{Address, U256};

use crate::errors::{DispatchError, EncodingError, VenueError};
use crate::executor::{PricingCurve, SwapContext, VenueExecutor};
use crate::models::Swap;
use crate::strategy::SwapGroup;
use crate::swap_encoder::{FundingModel, SwapEncoder};

pub const VENUE: &str = "curve";

#[derive(Debug, Clone)]
pub struct CurveEncoder {
    executor: Address,
}

impl CurveEncoder {
    pub fn new(executor: Address) -> Self {
        Self { executor }
    }

    /// Coin indices `(i, j)` from the swap's user data.
    fn coin_indices(swap: &Swap) -> Result<(u8, u8), EncodingError> {
        match swap.user_data.as_deref() {
            Some([i, j]) if i != j => Ok((*i, *j)),
            Some([_, _]) => Err(EncodingError::invalid("user_data", "curve coin indices must differ")),
            _ => Err(EncodingError::invalid("user_data", "curve requires two coin index bytes")),
        }
    }
}

impl SwapEncoder for CurveEncoder {
    fn venue(&self) -> &'static str {
        VENUE
    }

    fn executor_address(&self) -> Address {
        self.executor
    }

    fn funding(&self) -> FundingModel {
        FundingModel::PullByApproval
    }

    fn supports_redirect(&self) -> bool {
        false
    }

    fn funding_address(&self, swap: &Swap) -> Result<Address, EncodingError> {
        swap.component_address()
    }

    fn approval_spender(&self, swap: &Swap) -> Result<Option<Address>, EncodingError> {
        swap.component_address().map(Some)
    }

    fn encode_swap(&self, group: &SwapGroup, _receiver: Address) -> Result<Vec<u8>, EncodingError> {
        if group.legs.len() != 1 {
            return Err(EncodingError::invalid("legs", "curve encodes one pool per hop"));
        }
        let swap = group.lead();
        let pool = swap.component_address()?;
        let (i, j) = Self::coin_indices(swap)?;
        let mut out = Vec::with_capacity(22);
        out.extend_from_slice(pool.as_bytes());
        out.push(i);
        out.push(j);
        Ok(out)
    }
}

pub struct CurveExecutor {
    curve: Arc<dyn PricingCurve>,
}

impl CurveExecutor {
    pub fn new(curve: Arc<dyn PricingCurve>) -> Self {
        Self { curve }
    }

    fn decode(params: &[u8]) -> Result<(Address, u8, u8), VenueError> {
        super::read_params(VENUE, params, |r| Ok((r.address()?, r.u8()?, r.u8()?)))
    }
}

impl VenueExecutor for CurveExecutor {
    fn name(&self) -> &'static str {
        VENUE
    }

    fn funding_target(&self, params: &[u8], holder: Address) -> Result<Address, VenueError> {
        Self::decode(params)?;
        Ok(holder)
    }

    fn approval_spender(&self, params: &[u8]) -> Result<Option<Address>, VenueError> {
        Ok(Some(Self::decode(params)?.0))
    }

    fn swap(&self, ctx: &mut SwapContext<'_>, amount_in: U256, params: &[u8]) -> Result<U256, DispatchError> {
        let (pool, _i, _j) = Self::decode(params)?;
        let holder = ctx.holder();
        let (token_in, token_out) = (ctx.hop().token_in, ctx.hop().token_out);
        let amount_out = self
            .curve
            .amount_out(pool.as_bytes(), token_in, token_out, amount_in)?;
        let chain = ctx.chain_mut();
        chain.transfer_from(token_in, pool, holder, pool, amount_in)?;
        chain.transfer(token_out, pool, holder, amount_out)?;
        Ok(amount_out)
    }
}
