//! # Swap Encoder Trait
//!
//! Per-venue serialization of hop parameters. Every venue the encoder can route
//! through implements [`SwapEncoder`]; the engine never special-cases a venue.
//!
//! ## Adding a New Venue
//!
//! 1. Implement [`SwapEncoder`] (param layout, funding model, capabilities)
//! 2. Implement [`crate::executor::VenueExecutor`] for the dispatcher side
//! 3. Register both: the encoder in a [`SwapEncoderRegistry`], the executor
//!    address in the [`crate::registry::ExecutorRegistry`]
//!
//! The transfer optimizer relies on the capability methods being truthful:
//! `supports_redirect` in particular decides whether a later hop may be marked
//! pre-funded.

use std::sync::Arc;

use ethers::types::Address;
use indexmap::IndexMap;

use crate::errors::EncodingError;
use crate::models::Swap;
use crate::strategy::SwapGroup;

/// Where a venue expects its input when the swap is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FundingModel {
    /// The input must already sit at the venue's address (constant-product pairs).
    PushBeforeSwap,
    /// The venue pulls the input from the dispatcher using an approval.
    PullByApproval,
    /// The venue requests payment through a callback while the swap runs.
    Callback,
}

/// Off-chain half of a venue integration.
pub trait SwapEncoder: Send + Sync {
    /// Venue identifier matched against [`Swap::venue`].
    fn venue(&self) -> &'static str;

    /// Address of the executor contract that interprets this venue's params.
    fn executor_address(&self) -> Address;

    fn funding(&self) -> FundingModel;

    /// Whether the executor can deliver its output to an arbitrary address.
    fn supports_redirect(&self) -> bool;

    /// Whether several legs on the same token pair can share one invocation.
    fn supports_batching(&self) -> bool {
        false
    }

    /// Address that receives pushed input for this swap.
    fn funding_address(&self, swap: &Swap) -> Result<Address, EncodingError>;

    /// Spender that must be approved by the dispatcher, for approval-pull venues.
    fn approval_spender(&self, _swap: &Swap) -> Result<Option<Address>, EncodingError> {
        Ok(None)
    }

    /// Serializes the venue params for a group of legs delivering to `receiver`.
    fn encode_swap(&self, group: &SwapGroup, receiver: Address) -> Result<Vec<u8>, EncodingError>;
}

/// Venue identifier -> encoder lookup. Iteration order is insertion order.
#[derive(Clone, Default)]
pub struct SwapEncoderRegistry {
    encoders: IndexMap<String, Arc<dyn SwapEncoder>>,
}

impl SwapEncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the encoder for its venue.
    pub fn insert(&mut self, encoder: Arc<dyn SwapEncoder>) {
        self.encoders.insert(encoder.venue().to_string(), encoder);
    }

    pub fn with(mut self, encoder: Arc<dyn SwapEncoder>) -> Self {
        self.insert(encoder);
        self
    }

    pub fn get(&self, venue: &str) -> Result<&Arc<dyn SwapEncoder>, EncodingError> {
        self.encoders
            .get(venue)
            .ok_or_else(|| EncodingError::UnknownVenue(venue.to_string()))
    }

    pub fn venues(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

impl std::fmt::Debug for SwapEncoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.encoders.keys()).finish()
    }
}
