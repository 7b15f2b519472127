//! # Trade Graph Models
//!
//! Caller-facing data structures: a [`Solution`] (the trade graph) made of [`Swap`]s
//! (hops), the [`TransferDirective`] decided per hop, and the produced
//! [`EncodedProgram`].
//!
//! Swaps and solutions are built with builders and never mutated afterwards; the
//! strategy selector and the encoder only read them.

use ethers::types::{Address, Bytes, H160, U256};
use serde::{Deserialize, Serialize};

use crate::errors::EncodingError;
use crate::strategy::Strategy;

/// Placeholder address used for the chain's native currency.
pub const NATIVE_TOKEN: Address = H160([0u8; 20]);

/// Wraps a contract address as a swap component id.
pub fn component_of(address: Address) -> Bytes {
    Bytes::from(address.as_bytes().to_vec())
}

/// Side effect applied to native currency at the edges of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeAction {
    /// Caller pays native currency, the dispatcher wraps it before the first hop.
    Wrap,
    /// The dispatcher unwraps the output and pays native currency to the receiver.
    Unwrap,
}

/// One atomic trade leg against one liquidity venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swap {
    /// Venue identifier, e.g. `"uniswap_v2"`. Must match a registered swap encoder.
    pub venue: String,
    /// Venue component id: a pool address, or a 32-byte pool id for vault venues.
    pub component: Bytes,
    pub token_in: Address,
    pub token_out: Address,
    /// Fraction of the available `token_in` routed through this swap. `0.0` means
    /// "whatever remains", which is also the value for a swap on a single path.
    #[serde(default)]
    pub split: f64,
    /// Venue-specific side data (fee tier, coin indices, ...).
    #[serde(default)]
    pub user_data: Option<Bytes>,
    /// Expected input, used for approval sizing.
    #[serde(default)]
    pub estimated_amount_in: Option<U256>,
}

impl Swap {
    pub fn builder(
        venue: impl Into<String>,
        component: impl Into<Bytes>,
        token_in: Address,
        token_out: Address,
    ) -> SwapBuilder {
        SwapBuilder {
            swap: Swap {
                venue: venue.into(),
                component: component.into(),
                token_in,
                token_out,
                split: 0.0,
                user_data: None,
                estimated_amount_in: None,
            },
        }
    }

    /// Interprets the component id as a contract address.
    pub fn component_address(&self) -> Result<Address, EncodingError> {
        if self.component.len() != 20 {
            return Err(EncodingError::invalid(
                "component",
                format!(
                    "{} expects a 20-byte pool address, got {} bytes",
                    self.venue,
                    self.component.len()
                ),
            ));
        }
        Ok(Address::from_slice(&self.component))
    }
}

pub struct SwapBuilder {
    swap: Swap,
}

impl SwapBuilder {
    pub fn split(mut self, split: f64) -> Self {
        self.swap.split = split;
        self
    }

    pub fn user_data(mut self, data: impl Into<Bytes>) -> Self {
        self.swap.user_data = Some(data.into());
        self
    }

    pub fn estimated_amount_in(mut self, amount: U256) -> Self {
        self.swap.estimated_amount_in = Some(amount);
        self
    }

    pub fn build(self) -> Swap {
        self.swap
    }
}

/// A trade graph: what the caller wants to trade, through which hops, and the
/// guardrails the dispatcher must enforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Account paying the input (and granting delegated pulls).
    pub sender: Address,
    /// Account receiving the output.
    pub receiver: Address,
    pub given_token: Address,
    pub given_amount: U256,
    pub checked_token: Address,
    /// Minimum acceptable output.
    pub checked_amount: U256,
    /// Must be set when `given_token` and `checked_token` resolve to the same token.
    #[serde(default)]
    pub cyclic: bool,
    pub swaps: Vec<Swap>,
    #[serde(default)]
    pub native_action: Option<NativeAction>,
    /// The sender has authorized the dispatcher to pull the input on its behalf.
    #[serde(default)]
    pub pull_authorized: bool,
}

impl Solution {
    /// Entry point for the `build-graph(tokens, hops, minOutput)` boundary operation.
    pub fn builder(given_token: Address, checked_token: Address, given_amount: U256) -> SolutionBuilder {
        SolutionBuilder {
            solution: Solution {
                sender: Address::zero(),
                receiver: Address::zero(),
                given_token,
                given_amount,
                checked_token,
                checked_amount: U256::zero(),
                cyclic: false,
                swaps: Vec::new(),
                native_action: None,
                pull_authorized: false,
            },
        }
    }
}

pub struct SolutionBuilder {
    solution: Solution,
}

impl SolutionBuilder {
    pub fn sender(mut self, sender: Address) -> Self {
        self.solution.sender = sender;
        self
    }

    pub fn receiver(mut self, receiver: Address) -> Self {
        self.solution.receiver = receiver;
        self
    }

    pub fn min_amount_out(mut self, amount: U256) -> Self {
        self.solution.checked_amount = amount;
        self
    }

    pub fn cyclic(mut self, cyclic: bool) -> Self {
        self.solution.cyclic = cyclic;
        self
    }

    pub fn swap(mut self, swap: Swap) -> Self {
        self.solution.swaps.push(swap);
        self
    }

    pub fn swaps(mut self, swaps: impl IntoIterator<Item = Swap>) -> Self {
        self.solution.swaps.extend(swaps);
        self
    }

    pub fn native_action(mut self, action: NativeAction) -> Self {
        self.solution.native_action = Some(action);
        self
    }

    pub fn pull_authorized(mut self, authorized: bool) -> Self {
        self.solution.pull_authorized = authorized;
        self
    }

    pub fn build(self) -> Solution {
        self.solution
    }
}

/// How the input of a hop reaches the address that consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferDirective {
    /// The previous hop already delivered the exact amount to this venue.
    PreFunded,
    /// Pulled from the sender using its delegated authorization.
    DelegatedPull,
    /// Transferred by the dispatcher from its own holding.
    DirectPush,
    /// Already held where it is consumed; nothing moves.
    Resident,
}

impl TransferDirective {
    pub fn tag(self) -> u8 {
        match self {
            TransferDirective::PreFunded => 0,
            TransferDirective::DelegatedPull => 1,
            TransferDirective::DirectPush => 2,
            TransferDirective::Resident => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, EncodingError> {
        match tag {
            0 => Ok(TransferDirective::PreFunded),
            1 => Ok(TransferDirective::DelegatedPull),
            2 => Ok(TransferDirective::DirectPush),
            3 => Ok(TransferDirective::Resident),
            other => Err(EncodingError::InvalidTag {
                field: "transfer directive",
                value: other,
            }),
        }
    }
}

/// The directive attached to a hop plus the one-time approval marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HopDirective {
    pub transfer: TransferDirective,
    /// The dispatcher must grant the venue an unlimited approval before first use.
    pub approval_required: bool,
}

impl HopDirective {
    const APPROVAL_BIT: u8 = 0x80;
    const TAG_MASK: u8 = 0x03;

    pub fn new(transfer: TransferDirective) -> Self {
        Self {
            transfer,
            approval_required: false,
        }
    }

    pub fn with_approval(mut self, approval_required: bool) -> Self {
        self.approval_required = approval_required;
        self
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = self.transfer.tag();
        if self.approval_required {
            byte |= Self::APPROVAL_BIT;
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Result<Self, EncodingError> {
        if byte & !(Self::APPROVAL_BIT | Self::TAG_MASK) != 0 {
            return Err(EncodingError::InvalidTag {
                field: "transfer directive",
                value: byte,
            });
        }
        Ok(Self {
            transfer: TransferDirective::from_tag(byte & Self::TAG_MASK)?,
            approval_required: byte & Self::APPROVAL_BIT != 0,
        })
    }
}

/// The serialized program plus the facts a caller usually wants to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedProgram {
    pub bytes: Bytes,
    pub strategy: Strategy,
    pub hop_count: usize,
    /// Native currency the submitting transaction must carry.
    pub value: U256,
    pub amount_in: U256,
}

/// A ready-to-submit router call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_byte_round_trip() {
        for transfer in [
            TransferDirective::PreFunded,
            TransferDirective::DelegatedPull,
            TransferDirective::DirectPush,
            TransferDirective::Resident,
        ] {
            for approval in [false, true] {
                let directive = HopDirective::new(transfer).with_approval(approval);
                assert_eq!(HopDirective::from_byte(directive.to_byte()).unwrap(), directive);
            }
        }
    }

    #[test]
    fn test_directive_rejects_unknown_bits() {
        assert!(HopDirective::from_byte(0x04).is_err());
        assert!(HopDirective::from_byte(0x40).is_err());
    }

    #[test]
    fn test_solution_deserializes_with_defaults() {
        let json = r#"{
            "sender": "0x0000000000000000000000000000000000000001",
            "receiver": "0x0000000000000000000000000000000000000002",
            "given_token": "0x0000000000000000000000000000000000000010",
            "given_amount": "0x3e8",
            "checked_token": "0x0000000000000000000000000000000000000011",
            "checked_amount": "0x3de",
            "swaps": [{
                "venue": "uniswap_v2",
                "component": "0x00000000000000000000000000000000000000aa",
                "token_in": "0x0000000000000000000000000000000000000010",
                "token_out": "0x0000000000000000000000000000000000000011"
            }]
        }"#;
        let solution: Solution = serde_json::from_str(json).unwrap();
        assert_eq!(solution.given_amount, U256::from(1000u64));
        assert_eq!(solution.checked_amount, U256::from(990u64));
        assert!(!solution.cyclic);
        assert_eq!(solution.swaps[0].split, 0.0);
        assert!(solution.native_action.is_none());
    }
}
