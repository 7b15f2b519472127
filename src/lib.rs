//! # Swap Program SDK
//!
//! Encodes multi-venue token trades into compact, self-describing byte programs and
//! executes them atomically with verifiable accounting.
//!
//! ## Overview
//!
//! A caller describes a trade as a [`Solution`]: a graph of [`Swap`]s across venues,
//! possibly split over parallel paths or cycling back to the input token. The SDK:
//!
//! - **Selects a strategy**: single hop, sequential chain, fractional split, or cycle
//! - **Optimizes transfers**: decides per hop how input reaches the venue, skipping
//!   redundant pushes when the previous venue can deliver straight to the next one
//! - **Encodes** the plan into the program wire format (fixed header, PLE arrays)
//! - **Dispatches** a program against a token ledger: funds and invokes venue
//!   executors, answers payment callbacks, and reconciles balances before settling
//!
//! ## Architecture
//!
//! ### Encoding engine
//! [`strategy`] → [`transfer_optimizer`] → [`encoder`], with per-venue param layouts
//! behind the [`swap_encoder::SwapEncoder`] trait ([`venues`]).
//!
//! ### Dispatch
//! [`dispatcher`] interprets [`program`]s on a [`chain::ChainState`], calling
//! [`executor::VenueExecutor`]s that the [`registry`] has approved and activated.

// Encoding engine
/// Caller-facing trade graph types
pub mod models;
/// Strategy selection and venue grouping
pub mod strategy;
/// Per-hop transfer directives and approvals
pub mod transfer_optimizer;
/// Per-venue param serialization trait
pub mod swap_encoder;
/// Solution to program encoding
pub mod encoder;

// Wire format
/// Program header, hop units and body layouts
pub mod program;
/// Prefix-length-encoded arrays
pub mod ple;

// Dispatch
/// Program interpreter and accounting state machine
pub mod dispatcher;
/// Venue executor interface and swap context
pub mod executor;
/// Executor allow-list with activation delay
pub mod registry;
/// In-memory token ledger
pub mod chain;

// Venues
/// Uniswap V2/V3, Balancer V2 and Curve integrations
pub mod venues;

// Infrastructure
pub mod errors;
pub mod metrics;
pub mod settings;
pub mod utils;

pub use chain::ChainState;
pub use dispatcher::{Dispatcher, RunReport};
pub use encoder::ProgramEncoder;
pub use errors::{DispatchError, EncodingError, VenueError};
pub use models::{EncodedProgram, NativeAction, Solution, Swap, Transaction};
pub use registry::ExecutorRegistry;
pub use settings::Settings;
pub use strategy::Strategy;
