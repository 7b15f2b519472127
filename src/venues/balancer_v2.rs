//! Balancer V2 vault swaps.
//!
//! All pools live behind one vault, which pulls the input from the holder through an
//! approval and can pay the output to any address. Several pools on the same token
//! pair are batched into one hop: each leg takes a u24 fraction of the amount still
//! unallocated, the last leg takes the rest.
//!
//! params: `receiver(20) | PLE[ share(3) | pool_id(32) ]`

use std::sync::Arc;

use ethers::types::{Address, H256, U256};

use crate::errors::{DispatchError, EncodingError, VenueError};
use crate::executor::{PricingCurve, SwapContext, VenueExecutor};
use crate::models::Swap;
use crate::ple;
use crate::strategy::SwapGroup;
use crate::swap_encoder::{FundingModel, SwapEncoder};
use crate::utils::{apply_u24, fraction_to_u24, write_u24, ByteReader};

pub const VENUE: &str = "balancer_v2";

const LEG_LEN: usize = 35;

#[derive(Debug, Clone)]
pub struct BalancerV2Encoder {
    executor: Address,
    vault: Address,
}

impl BalancerV2Encoder {
    pub fn new(executor: Address, vault: Address) -> Self {
        Self { executor, vault }
    }

    fn pool_id(swap: &Swap) -> Result<H256, EncodingError> {
        if swap.component.len() != 32 {
            return Err(EncodingError::invalid(
                "component",
                format!("balancer_v2 expects a 32-byte pool id, got {} bytes", swap.component.len()),
            ));
        }
        Ok(H256::from_slice(&swap.component))
    }
}

impl SwapEncoder for BalancerV2Encoder {
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
        true
    }

    fn supports_batching(&self) -> bool {
        true
    }

    fn funding_address(&self, _swap: &Swap) -> Result<Address, EncodingError> {
        Ok(self.vault)
    }

    fn approval_spender(&self, _swap: &Swap) -> Result<Option<Address>, EncodingError> {
        Ok(Some(self.vault))
    }

    fn encode_swap(&self, group: &SwapGroup, receiver: Address) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::with_capacity(20 + group.legs.len() * (LEG_LEN + ple::PREFIX_LEN));
        out.extend_from_slice(receiver.as_bytes());

        let mut unallocated = 1.0;
        let last = group.legs.len().saturating_sub(1);
        for (index, leg) in group.legs.iter().enumerate() {
            let share = if index == last {
                0
            } else {
                let fraction = if unallocated > 0.0 { leg.share / unallocated } else { 1.0 };
                unallocated -= leg.share;
                fraction_to_u24(fraction.min(1.0))
            };
            let mut element = Vec::with_capacity(LEG_LEN);
            write_u24(&mut element, share)?;
            element.extend_from_slice(Self::pool_id(&leg.swap)?.as_bytes());
            ple::push(&mut out, &element)?;
        }
        Ok(out)
    }
}

pub struct BalancerV2Executor {
    vault: Address,
    curve: Arc<dyn PricingCurve>,
}

impl BalancerV2Executor {
    pub fn new(vault: Address, curve: Arc<dyn PricingCurve>) -> Self {
        Self { vault, curve }
    }

    fn decode(params: &[u8]) -> Result<(Address, Vec<(u32, H256)>), VenueError> {
        let malformed = super::malformed(VENUE);
        let mut reader = ByteReader::new(params, VENUE);
        let receiver = reader.address().map_err(&malformed)?;
        let mut legs = Vec::new();
        for element in ple::decode(reader.rest()).map_err(&malformed)? {
            if element.is_empty() {
                continue;
            }
            let leg = super::read_params(VENUE, element, |r| {
                let share = r.u24()?;
                let pool_id = H256::from_slice(r.take(32)?);
                Ok((share, pool_id))
            })?;
            legs.push(leg);
        }
        if legs.is_empty() {
            return Err(VenueError::MalformedParams {
                venue: VENUE,
                reason: "no pools".to_string(),
            });
        }
        Ok((receiver, legs))
    }
}

impl VenueExecutor for BalancerV2Executor {
    fn name(&self) -> &'static str {
        VENUE
    }

    fn funding_target(&self, params: &[u8], holder: Address) -> Result<Address, VenueError> {
        Self::decode(params)?;
        Ok(holder)
    }

    fn approval_spender(&self, _params: &[u8]) -> Result<Option<Address>, VenueError> {
        Ok(Some(self.vault))
    }

    fn swap(&self, ctx: &mut SwapContext<'_>, amount_in: U256, params: &[u8]) -> Result<U256, DispatchError> {
        let (receiver, legs) = Self::decode(params)?;
        let holder = ctx.holder();
        let (token_in, token_out) = (ctx.hop().token_in, ctx.hop().token_out);

        let mut remaining = amount_in;
        let mut amount_out = U256::zero();
        let last = legs.len() - 1;
        for (index, (share, pool_id)) in legs.iter().enumerate() {
            let leg_in = if index == last || *share == 0 {
                remaining
            } else {
                apply_u24(remaining, *share)
            };
            if leg_in.is_zero() {
                continue;
            }
            remaining -= leg_in;
            amount_out += self
                .curve
                .amount_out(pool_id.as_bytes(), token_in, token_out, leg_in)?;
        }

        let chain = ctx.chain_mut();
        chain.transfer_from(token_in, self.vault, holder, self.vault, amount_in)?;
        chain.transfer(token_out, self.vault, receiver, amount_out)?;
        Ok(amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::GroupLeg;
    use crate::utils::U24_MAX;

    fn leg(id: u8, share: f64) -> GroupLeg {
        GroupLeg {
            swap: Swap::builder(VENUE, vec![id; 32], Address::zero(), Address::from_low_u64_be(1)).build(),
            share,
        }
    }

    #[test]
    fn test_legs_take_fractions_of_remaining() {
        let group = SwapGroup {
            venue: VENUE.to_string(),
            token_in: Address::zero(),
            token_out: Address::from_low_u64_be(1),
            share: 1.0,
            remaining_fraction: 0.0,
            input_slot: 0,
            output_slot: 0,
            legs: vec![leg(1, 0.5), leg(2, 0.25), leg(3, 0.25)],
        };
        let receiver = Address::from_low_u64_be(0xbeef);
        let params = BalancerV2Encoder::new(Address::zero(), Address::zero())
            .encode_swap(&group, receiver)
            .unwrap();
        let (decoded_receiver, legs) = BalancerV2Executor::decode(&params).unwrap();
        assert_eq!(decoded_receiver, receiver);
        assert_eq!(legs.len(), 3);
        // 0.5 of the whole, then 0.25 / 0.5 of what is left, then the rest
        assert_eq!(legs[0].0, fraction_to_u24(0.5));
        assert_eq!(legs[1].0, fraction_to_u24(0.5));
        assert_eq!(legs[2].0, 0);
        assert!(legs[0].0 <= U24_MAX);
        assert_eq!(legs[2].1, H256::repeat_byte(3));
    }

    #[test]
    fn test_pool_id_must_be_32_bytes() {
        let swap = Swap::builder(VENUE, vec![1u8; 20], Address::zero(), Address::zero()).build();
        assert!(BalancerV2Encoder::pool_id(&swap).is_err());
    }
}
