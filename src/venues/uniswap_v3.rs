// Concentrated-liquidity pools: the pool pays out first, then calls back asking to
// be paid the input.
//
// params: pool(20) | receiver(20) | fee(3)

use std::sync::Arc;

use ethers::types::{Address, U256};
use ethers::utils::id;
use once_cell::sync::Lazy;

use crate::errors::{DispatchError, EncodingError, VenueError};
use crate::executor::{PricingCurve, Settlement, SwapContext, VenueExecutor};
use crate::models::Swap;
use crate::strategy::SwapGroup;
use crate::swap_encoder::{FundingModel, SwapEncoder};
use crate::utils::write_u24;

pub const VENUE: &str = "uniswap_v3";

/// Selector of `uniswapV3SwapCallback(int256,int256,bytes)`.
pub static CALLBACK_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| id("uniswapV3SwapCallback(int256,int256,bytes)"));

#[derive(Debug, Clone)]
pub struct UniswapV3Encoder {
    executor: Address,
}

impl UniswapV3Encoder {
    pub fn new(executor: Address) -> Self {
        Self { executor }
    }

    /// Fee tier carried in the swap's user data as a 3-byte big-endian value.
    fn fee(swap: &Swap) -> Result<u32, EncodingError> {
        match swap.user_data.as_deref() {
            Some([a, b, c]) => Ok(u32::from_be_bytes([0, *a, *b, *c])),
            Some(other) => Err(EncodingError::invalid(
                "user_data",
                format!("uniswap_v3 expects a 3-byte fee tier, got {} bytes", other.len()),
            )),
            None => Err(EncodingError::invalid("user_data", "uniswap_v3 requires the fee tier")),
        }
    }
}

impl SwapEncoder for UniswapV3Encoder {
    fn venue(&self) -> &'static str {
        VENUE
    }

    fn executor_address(&self) -> Address {
        self.executor
    }

    fn funding(&self) -> FundingModel {
        FundingModel::Callback
    }

    fn supports_redirect(&self) -> bool {
        true
    }

    fn funding_address(&self, swap: &Swap) -> Result<Address, EncodingError> {
        swap.component_address()
    }

    fn encode_swap(&self, group: &SwapGroup, receiver: Address) -> Result<Vec<u8>, EncodingError> {
        if group.legs.len() != 1 {
            return Err(EncodingError::invalid("legs", "uniswap_v3 encodes one pool per hop"));
        }
        let swap = group.lead();
        let pool = swap.component_address()?;
        let mut out = Vec::with_capacity(43);
        out.extend_from_slice(pool.as_bytes());
        out.extend_from_slice(receiver.as_bytes());
        write_u24(&mut out, Self::fee(swap)?)?;
        Ok(out)
    }
}

pub struct UniswapV3Executor {
    curve: Arc<dyn PricingCurve>,
}

impl UniswapV3Executor {
    pub fn new(curve: Arc<dyn PricingCurve>) -> Self {
        Self { curve }
    }

    fn decode(params: &[u8]) -> Result<(Address, Address, u32), VenueError> {
        super::read_params(VENUE, params, |r| Ok((r.address()?, r.address()?, r.u24()?)))
    }
}

impl VenueExecutor for UniswapV3Executor {
    fn name(&self) -> &'static str {
        VENUE
    }

    fn settlement(&self) -> Settlement {
        Settlement::Callback {
            selector: *CALLBACK_SELECTOR,
        }
    }

    fn funding_target(&self, params: &[u8], _holder: Address) -> Result<Address, VenueError> {
        Ok(Self::decode(params)?.0)
    }

    fn swap(&self, ctx: &mut SwapContext<'_>, amount_in: U256, params: &[u8]) -> Result<U256, DispatchError> {
        let (pool, receiver, _fee) = Self::decode(params)?;
        let (token_in, token_out) = (ctx.hop().token_in, ctx.hop().token_out);
        let amount_out = self
            .curve
            .amount_out(pool.as_bytes(), token_in, token_out, amount_in)?;
        ctx.chain_mut().transfer(token_out, pool, receiver, amount_out)?;
        ctx.request_payment(pool, *CALLBACK_SELECTOR, amount_in)?;
        Ok(amount_out)
    }
}
