//! # Program Encoder
//!
//! Entry point of the encoding engine: runs a [`Solution`] through the strategy
//! selector and the transfer optimizer, asks each venue's swap encoder for its params,
//! and serializes the result into the program wire format.
//!
//! Encoding is a pure function of the solution, the configured encoders and the
//! approval ledger: the same inputs always produce byte-identical programs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use swap_program_sdk::{ProgramEncoder, Settings, Solution, Swap};
//!
//! let settings = Settings::new()?;
//! let encoder = ProgramEncoder::from_settings(&settings)?;
//! # let (usdc, dai, pool, me) = Default::default();
//! let solution = Solution::builder(usdc, dai, 1_000u64.into())
//!     .receiver(me)
//!     .min_amount_out(990u64.into())
//!     .swap(Swap::builder("uniswap_v2", swap_program_sdk::models::component_of(pool), usdc, dai).build())
//!     .build();
//! let program = encoder.encode_solution(&solution)?;
//! let tx = encoder.encode_router_call(&program);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::sync::Arc;

use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use log::{debug, info};
use once_cell::sync::Lazy;
use rayon::prelude::*;

use crate::errors::EncodingError;
use crate::metrics;
use crate::models::{EncodedProgram, Solution, Transaction};
use crate::program::{HopUnit, PleEntry, Program, ProgramBody, ProgramFlags, ProgramHeader, SplitUnit};
use crate::settings::Settings;
use crate::strategy::{ExecutionPlan, Strategy, StrategySelector};
use crate::swap_encoder::{SwapEncoder, SwapEncoderRegistry};
use crate::transfer_optimizer::{ApprovalLedger, TransferOptimizer};
use crate::utils::fraction_to_u24;
use crate::venues;

/// Selector of the router's `execute(uint256,bytes)` entry point.
pub static EXECUTE_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| id("execute(uint256,bytes)"));

#[derive(Debug, Clone)]
pub struct ProgramEncoder {
    router: Address,
    wrapped_native: Address,
    encoders: SwapEncoderRegistry,
}

#[derive(Default)]
pub struct ProgramEncoderBuilder {
    router: Option<Address>,
    wrapped_native: Option<Address>,
    encoders: SwapEncoderRegistry,
}

impl ProgramEncoderBuilder {
    pub fn router_address(mut self, router: Address) -> Self {
        self.router = Some(router);
        self
    }

    pub fn wrapped_native(mut self, token: Address) -> Self {
        self.wrapped_native = Some(token);
        self
    }

    pub fn swap_encoder(mut self, encoder: Arc<dyn SwapEncoder>) -> Self {
        self.encoders.insert(encoder);
        self
    }

    pub fn swap_encoders(mut self, encoders: SwapEncoderRegistry) -> Self {
        self.encoders = encoders;
        self
    }

    pub fn build(self) -> Result<ProgramEncoder, EncodingError> {
        let router = self
            .router
            .filter(|a| !a.is_zero())
            .ok_or_else(|| EncodingError::Configuration("router address is required".to_string()))?;
        let wrapped_native = self
            .wrapped_native
            .filter(|a| !a.is_zero())
            .ok_or_else(|| EncodingError::Configuration("wrapped native token is required".to_string()))?;
        if self.encoders.is_empty() {
            return Err(EncodingError::Configuration("no swap encoders configured".to_string()));
        }
        Ok(ProgramEncoder {
            router,
            wrapped_native,
            encoders: self.encoders,
        })
    }
}

impl ProgramEncoder {
    pub fn builder() -> ProgramEncoderBuilder {
        ProgramEncoderBuilder::default()
    }

    /// Encoder for the router and the executors configured in `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, EncodingError> {
        Self::builder()
            .router_address(settings.router.address)
            .wrapped_native(settings.router.wrapped_native)
            .swap_encoders(venues::build_encoders(settings)?)
            .build()
    }

    pub fn router_address(&self) -> Address {
        self.router
    }

    pub fn wrapped_native(&self) -> Address {
        self.wrapped_native
    }

    pub fn encoders(&self) -> &SwapEncoderRegistry {
        &self.encoders
    }

    /// Structural checks without producing bytes. Returns the plan the solution
    /// would be encoded with.
    pub fn validate_solution(&self, solution: &Solution) -> Result<ExecutionPlan, EncodingError> {
        if solution.given_amount.is_zero() {
            return Err(EncodingError::invalid("given_amount", "must be positive"));
        }
        if solution.receiver.is_zero() {
            return Err(EncodingError::invalid("receiver", "zero address"));
        }
        StrategySelector::new(&self.encoders, self.wrapped_native).select(solution)
    }

    /// Encodes with a fresh approval ledger: every approval-pull hop carries the
    /// approval marker on first use within the program.
    pub fn encode_solution(&self, solution: &Solution) -> Result<EncodedProgram, EncodingError> {
        let mut approvals = ApprovalLedger::new();
        self.encode_solution_with_approvals(solution, &mut approvals)
    }

    pub fn encode_solution_with_approvals(
        &self,
        solution: &Solution,
        approvals: &mut ApprovalLedger,
    ) -> Result<EncodedProgram, EncodingError> {
        let plan = self.validate_solution(solution)?;
        let hop_plans = TransferOptimizer::new(&self.encoders, self.router).optimize(&plan, solution, approvals)?;

        let mut units = Vec::with_capacity(plan.groups.len());
        for (group, hop_plan) in plan.groups.iter().zip(&hop_plans) {
            let encoder = self.encoders.get(&group.venue)?;
            let params = encoder.encode_swap(group, hop_plan.receiver)?;
            units.push(HopUnit {
                executor: encoder.executor_address(),
                token_in: group.token_in,
                token_out: group.token_out,
                directive: hop_plan.directive,
                params: Bytes::from(params),
            });
        }

        let body = match plan.strategy {
            Strategy::Single => match units.pop() {
                Some(unit) if units.is_empty() => ProgramBody::Single(unit),
                _ => return Err(EncodingError::undecomposable("single strategy with several hops")),
            },
            Strategy::Sequential => ProgramBody::Sequential(units.into_iter().map(PleEntry::Unit).collect()),
            Strategy::Split | Strategy::Cyclic => {
                let entries = plan
                    .groups
                    .iter()
                    .zip(units)
                    .map(|(group, hop)| {
                        PleEntry::Unit(SplitUnit {
                            token_in_index: group.input_slot,
                            token_out_index: group.output_slot,
                            split: fraction_to_u24(group.remaining_fraction),
                            hop,
                        })
                    })
                    .collect();
                if plan.strategy == Strategy::Split {
                    ProgramBody::Split(entries)
                } else {
                    ProgramBody::Cyclic(entries)
                }
            }
        };

        let token_count = if plan.strategy.uses_slots() {
            u8::try_from(plan.tokens.len()).map_err(|_| EncodingError::TooManyTokens(plan.tokens.len()))?
        } else {
            0
        };
        let program = Program {
            header: ProgramHeader {
                receiver: solution.receiver,
                min_amount_out: solution.checked_amount,
                flags: ProgramFlags::new(plan.wrap, plan.unwrap, plan.strategy == Strategy::Cyclic),
                strategy: plan.strategy,
                token_in: plan.token_in,
                token_out: plan.token_out,
                token_count,
            },
            body,
        };
        let bytes = program.encode()?;

        debug!(
            "encoded {} program: {} hops, {} bytes",
            plan.strategy,
            plan.hop_count(),
            bytes.len()
        );
        metrics::record_program_encoded(plan.strategy.as_str(), bytes.len());

        Ok(EncodedProgram {
            bytes: Bytes::from(bytes),
            strategy: plan.strategy,
            hop_count: plan.hop_count(),
            value: if plan.wrap { solution.given_amount } else { U256::zero() },
            amount_in: solution.given_amount,
        })
    }

    /// Encodes independent solutions in parallel. Results keep the input order.
    pub fn encode_solutions(&self, solutions: &[Solution]) -> Vec<Result<EncodedProgram, EncodingError>> {
        let results: Vec<_> = solutions
            .par_iter()
            .map(|solution| self.encode_solution(solution))
            .collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        info!("encoded {} solutions ({} failed)", results.len(), failed);
        results
    }

    /// Wraps `program` into a router `execute(amount_in, program)` call.
    pub fn encode_router_call(&self, program: &EncodedProgram) -> Transaction {
        let mut data = EXECUTE_SELECTOR.to_vec();
        data.extend(abi::encode(&[
            Token::Uint(program.amount_in),
            Token::Bytes(program.bytes.to_vec()),
        ]));
        Transaction {
            to: self.router,
            value: program.value,
            data: Bytes::from(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{component_of, NativeAction, Swap};
    use crate::program::HEADER_LEN;
    use crate::venues::testing::{encoders, WRAPPED_NATIVE};

    fn token(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn encoder() -> ProgramEncoder {
        ProgramEncoder::builder()
            .router_address(token(0xd15))
            .wrapped_native(WRAPPED_NATIVE)
            .swap_encoders(encoders())
            .build()
            .unwrap()
    }

    fn single() -> Solution {
        Solution::builder(token(1), token(2), U256::from(1000u64))
            .receiver(token(0xbeef))
            .min_amount_out(U256::from(990u64))
            .swap(Swap::builder("uniswap_v2", component_of(token(100)), token(1), token(2)).build())
            .build()
    }

    #[test]
    fn test_builder_requires_router() {
        let err = ProgramEncoder::builder()
            .wrapped_native(WRAPPED_NATIVE)
            .swap_encoders(encoders())
            .build()
            .unwrap_err();
        assert!(matches!(err, EncodingError::Configuration(_)));
    }

    #[test]
    fn test_single_program_decodes_back() {
        let program = encoder().encode_solution(&single()).unwrap();
        assert_eq!(program.strategy, Strategy::Single);
        let decoded = Program::decode(&program.bytes).unwrap();
        assert_eq!(decoded.header.min_amount_out, U256::from(990u64));
        assert_eq!(decoded.header.receiver, token(0xbeef));
        assert_eq!(program.bytes.len(), HEADER_LEN + 61 + 40);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let e = encoder();
        let a = e.encode_solution(&single()).unwrap();
        let b = e.encode_solution(&single()).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_wrap_sets_value() {
        let solution = Solution::builder(crate::models::NATIVE_TOKEN, token(2), U256::from(1000u64))
            .receiver(token(0xbeef))
            .native_action(NativeAction::Wrap)
            .swap(Swap::builder("uniswap_v2", component_of(token(100)), WRAPPED_NATIVE, token(2)).build())
            .build();
        let program = encoder().encode_solution(&solution).unwrap();
        assert_eq!(program.value, U256::from(1000u64));
        let decoded = Program::decode(&program.bytes).unwrap();
        assert!(decoded.header.flags.wrap_in());
        assert_eq!(decoded.header.token_in, WRAPPED_NATIVE);
    }

    #[test]
    fn test_router_call_layout() {
        let e = encoder();
        let program = e.encode_solution(&single()).unwrap();
        let tx = e.encode_router_call(&program);
        assert_eq!(tx.to, token(0xd15));
        assert_eq!(&tx.data[..4], &EXECUTE_SELECTOR[..]);
        let tokens = abi::decode(
            &[abi::ParamType::Uint(256), abi::ParamType::Bytes],
            &tx.data[4..],
        )
        .unwrap();
        assert_eq!(tokens[0], Token::Uint(U256::from(1000u64)));
        assert_eq!(tokens[1], Token::Bytes(program.bytes.to_vec()));
    }

    #[test]
    fn test_validate_rejects_zero_receiver() {
        let solution = Solution {
            receiver: Address::zero(),
            ..single()
        };
        assert!(matches!(
            encoder().validate_solution(&solution),
            Err(EncodingError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let e = encoder();
        let solutions = vec![single(), single(), Solution { swaps: vec![], ..single() }];
        let results = e.encode_solutions(&solutions);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().bytes, e.encode_solution(&single()).unwrap().bytes);
        assert_eq!(results[2], Err(EncodingError::EmptySolution));
    }
}
