//! # Strategy Selector
//!
//! Classifies a [`Solution`] into one of four execution shapes and produces the
//! [`ExecutionPlan`] the transfer optimizer and the encoder work from.
//!
//! - **Single**: one hop (or one batched group) carrying the whole input
//! - **Sequential**: a chain where each hop consumes exactly what the previous produced
//! - **Split**: fractional allocation over parallel paths, addressed through a token
//!   slot table
//! - **Cyclic**: input token == output token; split layout with a separate return slot
//!
//! Hops on a batching venue that share the same `(token_in, token_out)` pair are merged
//! into one [`SwapGroup`] so the venue is invoked once per group. A hop producing the
//! group's input token closes it; later legs start a new group.

use std::collections::HashMap;

use ethers::types::{Address, U256};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::EncodingError;
use crate::models::{NativeAction, Solution, Swap, NATIVE_TOKEN};
use crate::swap_encoder::SwapEncoderRegistry;

/// Tolerance applied when checking that split fractions sum to one.
pub const SPLIT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Single,
    Sequential,
    Split,
    Cyclic,
}

impl Strategy {
    pub fn tag(self) -> u8 {
        match self {
            Strategy::Single => 0,
            Strategy::Sequential => 1,
            Strategy::Split => 2,
            Strategy::Cyclic => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, EncodingError> {
        match tag {
            0 => Ok(Strategy::Single),
            1 => Ok(Strategy::Sequential),
            2 => Ok(Strategy::Split),
            3 => Ok(Strategy::Cyclic),
            other => Err(EncodingError::InvalidTag {
                field: "strategy",
                value: other,
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Single => "single",
            Strategy::Sequential => "sequential",
            Strategy::Split => "split",
            Strategy::Cyclic => "cyclic",
        }
    }

    /// Whether the program body addresses tokens through a slot table.
    pub fn uses_slots(self) -> bool {
        matches!(self, Strategy::Split | Strategy::Cyclic)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of a group and its share of the group's input.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupLeg {
    pub swap: Swap,
    pub share: f64,
}

/// Hops executed by a single venue invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapGroup {
    pub venue: String,
    pub token_in: Address,
    pub token_out: Address,
    /// Share of the input slot's total routed through this group.
    pub share: f64,
    /// Fraction of what is *left* in the input slot when this group runs.
    /// 0 means "all remaining" and is used for the last consumer of a slot.
    pub remaining_fraction: f64,
    pub input_slot: u8,
    pub output_slot: u8,
    pub legs: Vec<GroupLeg>,
}

impl SwapGroup {
    fn single(swap: Swap) -> Self {
        Self {
            venue: swap.venue.clone(),
            token_in: swap.token_in,
            token_out: swap.token_out,
            share: 1.0,
            remaining_fraction: 0.0,
            input_slot: 0,
            output_slot: 0,
            legs: vec![GroupLeg { swap, share: 1.0 }],
        }
    }

    /// The leg the group is addressed by (its first swap).
    pub fn lead(&self) -> &Swap {
        &self.legs[0].swap
    }

    /// Sum of the legs' estimated inputs, when every leg provides one.
    pub fn estimated_amount_in(&self) -> Option<U256> {
        self.legs
            .iter()
            .map(|leg| leg.swap.estimated_amount_in)
            .try_fold(U256::zero(), |acc, amount| amount.map(|a| acc.saturating_add(a)))
    }
}

/// Output of the selector: the shape plus the ordered groups to encode.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub strategy: Strategy,
    /// Token the hops consume first (after wrapping).
    pub token_in: Address,
    /// Token the hops finally produce (before unwrapping).
    pub token_out: Address,
    pub wrap: bool,
    pub unwrap: bool,
    pub groups: Vec<SwapGroup>,
    /// Slot table for split layouts: input first, output last. Empty otherwise.
    pub tokens: Vec<Address>,
}

impl ExecutionPlan {
    pub fn hop_count(&self) -> usize {
        self.groups.len()
    }
}

/// Where a hop takes its input from / delivers its output to, before slots are
/// numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SlotKey {
    Entry,
    Token(Address),
    Return,
}

pub struct StrategySelector<'a> {
    encoders: &'a SwapEncoderRegistry,
    wrapped_native: Address,
}

impl<'a> StrategySelector<'a> {
    pub fn new(encoders: &'a SwapEncoderRegistry, wrapped_native: Address) -> Self {
        Self {
            encoders,
            wrapped_native,
        }
    }

    pub fn select(&self, solution: &Solution) -> Result<ExecutionPlan, EncodingError> {
        if solution.swaps.is_empty() {
            return Err(EncodingError::EmptySolution);
        }
        let (token_in, token_out, wrap, unwrap) = self.effective_tokens(solution)?;
        let cyclic = token_in == token_out;
        if cyclic != solution.cyclic {
            return Err(EncodingError::CyclicFlagMismatch {
                declared: solution.cyclic,
                actual: cyclic,
            });
        }
        if cyclic && unwrap {
            return Err(EncodingError::IncompatibleFlags(
                "a cyclic trade cannot pay native currency directly to the receiver".to_string(),
            ));
        }
        for (index, swap) in solution.swaps.iter().enumerate() {
            self.validate_swap(index, swap)?;
        }

        let keys = assign_slot_keys(&solution.swaps, token_in, token_out, cyclic)?;
        let shares = normalize_shares(&solution.swaps, &keys)?;

        if !cyclic && is_chain(&solution.swaps, &shares, token_in, token_out) {
            let strategy = if solution.swaps.len() == 1 {
                Strategy::Single
            } else {
                Strategy::Sequential
            };
            debug!(
                "selected {} strategy for {} swaps",
                strategy,
                solution.swaps.len()
            );
            return Ok(ExecutionPlan {
                strategy,
                token_in,
                token_out,
                wrap,
                unwrap,
                groups: solution.swaps.iter().cloned().map(SwapGroup::single).collect(),
                tokens: Vec::new(),
            });
        }

        let (mut groups, tokens) = self.group(&solution.swaps, &keys, &shares, token_in, token_out)?;
        validate_topology(&groups, &tokens, cyclic)?;

        if !cyclic && groups.len() == 1 && (groups[0].share - 1.0).abs() < SPLIT_TOLERANCE {
            debug!(
                "split collapses into one group of {} legs, downgrading to single",
                groups[0].legs.len()
            );
            let mut group = groups.remove(0);
            group.input_slot = 0;
            group.output_slot = 0;
            group.remaining_fraction = 0.0;
            return Ok(ExecutionPlan {
                strategy: Strategy::Single,
                token_in,
                token_out,
                wrap,
                unwrap,
                groups: vec![group],
                tokens: Vec::new(),
            });
        }

        assign_remaining_fractions(&mut groups);
        let strategy = if cyclic { Strategy::Cyclic } else { Strategy::Split };
        debug!(
            "selected {} strategy: {} groups over {} token slots",
            strategy,
            groups.len(),
            tokens.len()
        );
        Ok(ExecutionPlan {
            strategy,
            token_in,
            token_out,
            wrap,
            unwrap,
            groups,
            tokens,
        })
    }

    fn effective_tokens(&self, solution: &Solution) -> Result<(Address, Address, bool, bool), EncodingError> {
        let mut token_in = solution.given_token;
        let mut token_out = solution.checked_token;
        let mut wrap = false;
        let mut unwrap = false;
        match solution.native_action {
            Some(NativeAction::Wrap) => {
                if solution.given_token != NATIVE_TOKEN {
                    return Err(EncodingError::invalid(
                        "native_action",
                        "wrapping requires the native token as given token",
                    ));
                }
                token_in = self.wrapped_native;
                wrap = true;
            }
            Some(NativeAction::Unwrap) => {
                if solution.checked_token != NATIVE_TOKEN {
                    return Err(EncodingError::invalid(
                        "native_action",
                        "unwrapping requires the native token as checked token",
                    ));
                }
                token_out = self.wrapped_native;
                unwrap = true;
            }
            None => {}
        }
        Ok((token_in, token_out, wrap, unwrap))
    }

    fn validate_swap(&self, index: usize, swap: &Swap) -> Result<(), EncodingError> {
        self.encoders.get(&swap.venue)?;
        if swap.token_in == swap.token_out {
            return Err(EncodingError::invalid(
                format!("swaps[{}]", index),
                "token_in and token_out are identical",
            ));
        }
        if !swap.split.is_finite() || swap.split < 0.0 || swap.split > 1.0 {
            return Err(EncodingError::invalid(
                format!("swaps[{}].split", index),
                format!("{} is outside [0, 1]", swap.split),
            ));
        }
        Ok(())
    }

    fn group(
        &self,
        swaps: &[Swap],
        keys: &[(SlotKey, SlotKey)],
        shares: &[f64],
        token_in: Address,
        token_out: Address,
    ) -> Result<(Vec<SwapGroup>, Vec<Address>), EncodingError> {
        // slot 0 is the input, the last slot the output
        let mut intermediates: IndexMap<Address, ()> = IndexMap::new();
        for (input, output) in keys {
            for key in [input, output] {
                if let SlotKey::Token(token) = key {
                    intermediates.insert(*token, ());
                }
            }
        }
        let slot_count = intermediates.len() + 2;
        if slot_count > u8::MAX as usize {
            return Err(EncodingError::TooManyTokens(slot_count));
        }
        let slot_of = |key: &SlotKey| -> u8 {
            match key {
                SlotKey::Entry => 0,
                SlotKey::Return => (slot_count - 1) as u8,
                SlotKey::Token(token) => {
                    intermediates.get_index_of(token).map(|i| i + 1).unwrap_or(0) as u8
                }
            }
        };

        let mut groups: Vec<SwapGroup> = Vec::new();
        let mut open: HashMap<(String, SlotKey, SlotKey), usize> = HashMap::new();
        for ((swap, (input, output)), share) in swaps.iter().zip(keys).zip(shares) {
            let batching = self.encoders.get(&swap.venue)?.supports_batching();
            let key = (swap.venue.clone(), *input, *output);
            // a group runs at its first leg; producing its input closes it
            open.retain(|(_, open_input, _), _| open_input != output);
            if batching {
                if let Some(&index) = open.get(&key) {
                    let group = &mut groups[index];
                    group.share += share;
                    group.legs.push(GroupLeg {
                        swap: swap.clone(),
                        share: *share,
                    });
                    continue;
                }
                open.insert(key, groups.len());
            }
            groups.push(SwapGroup {
                venue: swap.venue.clone(),
                token_in: swap.token_in,
                token_out: swap.token_out,
                share: *share,
                remaining_fraction: 0.0,
                input_slot: slot_of(input),
                output_slot: slot_of(output),
                legs: vec![GroupLeg {
                    swap: swap.clone(),
                    share: *share,
                }],
            });
        }
        for group in &mut groups {
            let total = group.share;
            for leg in &mut group.legs {
                leg.share = if total > 0.0 { leg.share / total } else { 0.0 };
            }
        }

        let mut tokens = Vec::with_capacity(slot_count);
        tokens.push(token_in);
        tokens.extend(intermediates.keys().copied());
        tokens.push(token_out);
        Ok((groups, tokens))
    }
}

fn assign_slot_keys(
    swaps: &[Swap],
    token_in: Address,
    token_out: Address,
    cyclic: bool,
) -> Result<Vec<(SlotKey, SlotKey)>, EncodingError> {
    let mut keys = Vec::with_capacity(swaps.len());
    let mut shared_produced = false;
    for (index, swap) in swaps.iter().enumerate() {
        let input = if swap.token_in == token_in {
            if cyclic && shared_produced {
                SlotKey::Return
            } else {
                SlotKey::Entry
            }
        } else if swap.token_in == token_out {
            return Err(EncodingError::undecomposable(format!(
                "swaps[{}] consumes the output token",
                index
            )));
        } else {
            SlotKey::Token(swap.token_in)
        };
        let output = if swap.token_out == token_out {
            if cyclic {
                shared_produced = true;
            }
            SlotKey::Return
        } else if swap.token_out == token_in {
            return Err(EncodingError::undecomposable(format!(
                "swaps[{}] produces the input token mid-route",
                index
            )));
        } else {
            SlotKey::Token(swap.token_out)
        };
        keys.push((input, output));
    }
    Ok(keys)
}

/// Turns caller fractions into explicit shares of each input slot's total.
fn normalize_shares(swaps: &[Swap], keys: &[(SlotKey, SlotKey)]) -> Result<Vec<f64>, EncodingError> {
    let mut siblings: IndexMap<SlotKey, Vec<usize>> = IndexMap::new();
    for (index, (input, _)) in keys.iter().enumerate() {
        siblings.entry(*input).or_default().push(index);
    }

    let mut shares = vec![0.0; swaps.len()];
    for indices in siblings.values() {
        let Some((last, explicit)) = indices.split_last() else {
            continue;
        };
        let token = swaps[*last].token_in;
        if explicit.is_empty() {
            let split = swaps[*last].split;
            if split != 0.0 && (split - 1.0).abs() > SPLIT_TOLERANCE {
                return Err(EncodingError::InvalidSplit {
                    token,
                    reason: format!("the only consumer routes {} instead of all of it", split),
                });
            }
            shares[*last] = 1.0;
            continue;
        }

        let mut explicit_sum = 0.0;
        for &index in explicit {
            let split = swaps[index].split;
            if split <= 0.0 {
                return Err(EncodingError::InvalidSplit {
                    token,
                    reason: format!("swaps[{}] takes the remainder but is not the last consumer", index),
                });
            }
            explicit_sum += split;
            shares[index] = split;
        }

        let last_split = swaps[*last].split;
        if last_split == 0.0 {
            if explicit_sum >= 1.0 - SPLIT_TOLERANCE {
                return Err(EncodingError::InvalidSplit {
                    token,
                    reason: format!("explicit splits sum to {} leaving nothing for the remainder", explicit_sum),
                });
            }
            shares[*last] = 1.0 - explicit_sum;
        } else {
            let total = explicit_sum + last_split;
            if (total - 1.0).abs() > SPLIT_TOLERANCE {
                return Err(EncodingError::InvalidSplit {
                    token,
                    reason: format!("splits sum to {}", total),
                });
            }
            shares[*last] = last_split;
        }
    }
    Ok(shares)
}

fn is_chain(swaps: &[Swap], shares: &[f64], token_in: Address, token_out: Address) -> bool {
    if shares.iter().any(|share| (share - 1.0).abs() > SPLIT_TOLERANCE) {
        return false;
    }
    let (first, last) = match (swaps.first(), swaps.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return false,
    };
    first.token_in == token_in
        && last.token_out == token_out
        && swaps.windows(2).all(|pair| pair[0].token_out == pair[1].token_in)
}

fn validate_topology(groups: &[SwapGroup], tokens: &[Address], cyclic: bool) -> Result<(), EncodingError> {
    let return_slot = (tokens.len() - 1) as u8;
    let mut produced = vec![false; tokens.len()];
    let mut consumed = vec![false; tokens.len()];
    produced[0] = true;

    for (index, group) in groups.iter().enumerate() {
        let input = group.input_slot as usize;
        if !produced[input] {
            return Err(EncodingError::undecomposable(format!(
                "group {} consumes {:?} before any swap produces it",
                index, tokens[input]
            )));
        }
        if group.input_slot == return_slot && !cyclic {
            return Err(EncodingError::undecomposable("the output token is consumed"));
        }
        consumed[input] = true;
        produced[group.output_slot as usize] = true;
    }

    if !consumed[0] {
        return Err(EncodingError::undecomposable("no swap consumes the input token"));
    }
    if !produced[return_slot as usize] {
        return Err(EncodingError::undecomposable("no swap produces the output token"));
    }
    for slot in 1..return_slot as usize {
        if produced[slot] && !consumed[slot] {
            return Err(EncodingError::undecomposable(format!(
                "{:?} is produced but never consumed",
                tokens[slot]
            )));
        }
    }
    Ok(())
}

/// Converts shares of a slot's total into fractions of what the slot still holds
/// when each group runs. The last consumer of every slot takes the remainder.
fn assign_remaining_fractions(groups: &mut [SwapGroup]) {
    let mut last_consumer: HashMap<u8, usize> = HashMap::new();
    for (index, group) in groups.iter().enumerate() {
        last_consumer.insert(group.input_slot, index);
    }
    let mut remaining: HashMap<u8, f64> = HashMap::new();
    for index in 0..groups.len() {
        let slot = groups[index].input_slot;
        if last_consumer.get(&slot) == Some(&index) {
            groups[index].remaining_fraction = 0.0;
            continue;
        }
        let left = remaining.entry(slot).or_insert(1.0);
        let fraction = if *left > 0.0 { groups[index].share / *left } else { 1.0 };
        groups[index].remaining_fraction = fraction.min(1.0);
        *left -= groups[index].share;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::component_of;
    use crate::venues::testing::encoders;

    fn token(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn swap(venue: &str, pool: u64, a: u64, b: u64, split: f64) -> Swap {
        Swap::builder(venue, component_of(token(pool)), token(a), token(b))
            .split(split)
            .build()
    }

    fn select(solution: &Solution) -> Result<ExecutionPlan, EncodingError> {
        let registry = encoders();
        StrategySelector::new(&registry, token(0xeeee)).select(solution)
    }

    #[test]
    fn test_single_and_sequential() {
        let single = Solution::builder(token(1), token(2), U256::from(1000u64))
            .swap(swap("uniswap_v2", 100, 1, 2, 0.0))
            .build();
        assert_eq!(select(&single).unwrap().strategy, Strategy::Single);

        let chain = Solution::builder(token(1), token(3), U256::from(1000u64))
            .swap(swap("uniswap_v2", 100, 1, 2, 0.0))
            .swap(swap("uniswap_v3", 101, 2, 3, 0.0))
            .build();
        let plan = select(&chain).unwrap();
        assert_eq!(plan.strategy, Strategy::Sequential);
        assert!(plan.tokens.is_empty());
    }

    #[test]
    fn test_split_shares_and_slots() {
        let solution = Solution::builder(token(1), token(2), U256::from(1000u64))
            .swap(swap("uniswap_v2", 100, 1, 2, 0.6))
            .swap(swap("uniswap_v3", 101, 1, 2, 0.0))
            .build();
        let plan = select(&solution).unwrap();
        assert_eq!(plan.strategy, Strategy::Split);
        assert_eq!(plan.tokens, vec![token(1), token(2)]);
        assert!((plan.groups[0].share - 0.6).abs() < 1e-12);
        assert!((plan.groups[1].share - 0.4).abs() < 1e-12);
        assert!((plan.groups[0].remaining_fraction - 0.6).abs() < 1e-12);
        assert_eq!(plan.groups[1].remaining_fraction, 0.0);
        assert_eq!((plan.groups[1].input_slot, plan.groups[1].output_slot), (0, 1));
    }

    #[test]
    fn test_batching_venue_groups_and_downgrades() {
        let solution = Solution::builder(token(1), token(2), U256::from(1000u64))
            .swap(
                Swap::builder("balancer_v2", vec![0xaa; 32], token(1), token(2))
                    .split(0.5)
                    .build(),
            )
            .swap(
                Swap::builder("balancer_v2", vec![0xbb; 32], token(1), token(2))
                    .build(),
            )
            .build();
        let plan = select(&solution).unwrap();
        assert_eq!(plan.strategy, Strategy::Single);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].legs.len(), 2);
        assert!((plan.groups[0].legs[0].share - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_batching_group_closes_when_its_input_is_produced_again() {
        // 1 -> 3 -> 2 twice over, interleaved: the second balancer leg needs the
        // second 1 -> 3 output and cannot join the first group
        let solution = Solution::builder(token(1), token(2), U256::from(1000u64))
            .swap(swap("uniswap_v2", 100, 1, 3, 0.5))
            .swap(
                Swap::builder("balancer_v2", vec![0xaa; 32], token(3), token(2))
                    .split(0.5)
                    .build(),
            )
            .swap(swap("uniswap_v2", 101, 1, 3, 0.0))
            .swap(Swap::builder("balancer_v2", vec![0xbb; 32], token(3), token(2)).build())
            .build();
        let plan = select(&solution).unwrap();
        assert_eq!(plan.strategy, Strategy::Split);
        assert_eq!(plan.tokens, vec![token(1), token(3), token(2)]);
        assert_eq!(plan.groups.len(), 4);
        assert!(plan.groups.iter().all(|g| g.legs.len() == 1));
        let slots: Vec<(u8, u8)> = plan.groups.iter().map(|g| (g.input_slot, g.output_slot)).collect();
        assert_eq!(slots, vec![(0, 1), (1, 2), (0, 1), (1, 2)]);
        assert!((plan.groups[1].remaining_fraction - 0.5).abs() < 1e-12);
        assert_eq!(plan.groups[3].remaining_fraction, 0.0);
    }

    #[test]
    fn test_batching_group_absorbs_legs_after_unrelated_hops() {
        let solution = Solution::builder(token(1), token(2), U256::from(1000u64))
            .swap(
                Swap::builder("balancer_v2", vec![0xaa; 32], token(1), token(2))
                    .split(0.4)
                    .build(),
            )
            .swap(swap("uniswap_v2", 100, 1, 2, 0.2))
            .swap(Swap::builder("balancer_v2", vec![0xbb; 32], token(1), token(2)).build())
            .build();
        let plan = select(&solution).unwrap();
        assert_eq!(plan.groups.len(), 2);
        assert_eq!(plan.groups[0].legs.len(), 2);
        assert!((plan.groups[0].share - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_non_batching_venue_is_not_grouped() {
        let solution = Solution::builder(token(1), token(2), U256::from(1000u64))
            .swap(swap("uniswap_v2", 100, 1, 2, 0.5))
            .swap(swap("uniswap_v2", 101, 1, 2, 0.0))
            .build();
        let plan = select(&solution).unwrap();
        assert_eq!(plan.strategy, Strategy::Split);
        assert_eq!(plan.groups.len(), 2);
    }

    #[test]
    fn test_cyclic_flag_must_match() {
        let solution = Solution::builder(token(1), token(1), U256::from(1000u64))
            .swap(swap("uniswap_v2", 100, 1, 2, 0.0))
            .swap(swap("uniswap_v2", 101, 2, 1, 0.0))
            .build();
        assert_eq!(
            select(&solution),
            Err(EncodingError::CyclicFlagMismatch {
                declared: false,
                actual: true
            })
        );
        let flagged = Solution { cyclic: true, ..solution };
        let plan = select(&flagged).unwrap();
        assert_eq!(plan.strategy, Strategy::Cyclic);
        assert_eq!(plan.tokens, vec![token(1), token(2), token(1)]);
    }

    #[test]
    fn test_cyclic_return_slot_reuse() {
        // 1 -> 2 -> 1 -> 3 -> 1: the second consumption of token 1 uses the return slot
        let solution = Solution::builder(token(1), token(1), U256::from(1000u64))
            .cyclic(true)
            .swap(swap("uniswap_v2", 100, 1, 2, 0.0))
            .swap(swap("uniswap_v2", 101, 2, 1, 0.0))
            .swap(swap("uniswap_v2", 102, 1, 3, 0.0))
            .swap(swap("uniswap_v2", 103, 3, 1, 0.0))
            .build();
        let plan = select(&solution).unwrap();
        let slots: Vec<(u8, u8)> = plan.groups.iter().map(|g| (g.input_slot, g.output_slot)).collect();
        assert_eq!(slots, vec![(0, 1), (1, 3), (3, 2), (2, 3)]);
    }

    #[test]
    fn test_undecomposable_inputs() {
        assert_eq!(
            select(&Solution::builder(token(1), token(2), U256::one()).build()),
            Err(EncodingError::EmptySolution)
        );

        let dangling = Solution::builder(token(1), token(3), U256::one())
            .swap(swap("uniswap_v2", 100, 1, 2, 0.5))
            .swap(swap("uniswap_v2", 101, 1, 3, 0.0))
            .build();
        assert!(matches!(select(&dangling), Err(EncodingError::Undecomposable { .. })));

        let bad_split = Solution::builder(token(1), token(2), U256::one())
            .swap(swap("uniswap_v2", 100, 1, 2, 0.7))
            .swap(swap("uniswap_v3", 101, 1, 2, 0.7))
            .build();
        assert!(matches!(select(&bad_split), Err(EncodingError::InvalidSplit { .. })));

        let unknown = Solution::builder(token(1), token(2), U256::one())
            .swap(swap("sushiswap", 100, 1, 2, 0.0))
            .build();
        assert_eq!(select(&unknown), Err(EncodingError::UnknownVenue("sushiswap".into())));
    }

    #[test]
    fn test_cyclic_unwrap_rejected() {
        let solution = Solution::builder(token(0xeeee), NATIVE_TOKEN, U256::one())
            .cyclic(true)
            .native_action(NativeAction::Unwrap)
            .swap(swap("uniswap_v2", 100, 0xeeee, 2, 0.0))
            .swap(swap("uniswap_v2", 101, 2, 0xeeee, 0.0))
            .build();
        assert!(matches!(select(&solution), Err(EncodingError::IncompatibleFlags(_))));
    }
}
