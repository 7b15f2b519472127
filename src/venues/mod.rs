// Venue integrations.
// Each venue module pairs a swap encoder (off-chain param layout) with the
// executor that interprets those params on the dispatcher side.

pub mod balancer_v2;
pub mod curve;
pub mod uniswap_v2;
pub mod uniswap_v3;

use std::sync::Arc;

use ethers::types::Address;

use crate::errors::{EncodingError, VenueError};
use crate::executor::{PricingCurve, VenueExecutor};
use crate::settings::Settings;
use crate::swap_encoder::{SwapEncoder, SwapEncoderRegistry};
use crate::utils::ByteReader;

pub use balancer_v2::{BalancerV2Encoder, BalancerV2Executor};
pub use curve::{CurveEncoder, CurveExecutor};
pub use uniswap_v2::{UniswapV2Encoder, UniswapV2Executor};
pub use uniswap_v3::{UniswapV3Encoder, UniswapV3Executor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VenueKind {
    UniswapV2,
    UniswapV3,
    BalancerV2,
    Curve,
}

impl VenueKind {
    pub const ALL: [VenueKind; 4] = [
        VenueKind::UniswapV2,
        VenueKind::UniswapV3,
        VenueKind::BalancerV2,
        VenueKind::Curve,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VenueKind::UniswapV2 => uniswap_v2::VENUE,
            VenueKind::UniswapV3 => uniswap_v3::VENUE,
            VenueKind::BalancerV2 => balancer_v2::VENUE,
            VenueKind::Curve => curve::VENUE,
        }
    }
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a venue identifier (as used in `Swap::venue` and the settings) to its kind.
pub fn map_venue(name: &str) -> Option<VenueKind> {
    match name {
        "uniswap_v2" => Some(VenueKind::UniswapV2),
        "uniswap_v3" => Some(VenueKind::UniswapV3),
        "balancer_v2" => Some(VenueKind::BalancerV2),
        "curve" => Some(VenueKind::Curve),
        _ => None,
    }
}

fn encoder_for(kind: VenueKind, executor: Address, settings: &Settings) -> Result<Arc<dyn SwapEncoder>, EncodingError> {
    Ok(match kind {
        VenueKind::UniswapV2 => Arc::new(UniswapV2Encoder::new(executor)),
        VenueKind::UniswapV3 => Arc::new(UniswapV3Encoder::new(executor)),
        VenueKind::BalancerV2 => {
            if settings.venues.balancer_vault.is_zero() {
                return Err(EncodingError::Configuration(
                    "venues.balancer_vault is required for balancer_v2".to_string(),
                ));
            }
            Arc::new(BalancerV2Encoder::new(executor, settings.venues.balancer_vault))
        }
        VenueKind::Curve => Arc::new(CurveEncoder::new(executor)),
    })
}

/// Swap encoders for every executor configured in `settings`.
pub fn build_encoders(settings: &Settings) -> Result<SwapEncoderRegistry, EncodingError> {
    let mut registry = SwapEncoderRegistry::new();
    for (venue, executor) in settings.sorted_executors() {
        let kind = map_venue(venue)
            .ok_or_else(|| EncodingError::Configuration(format!("unsupported venue '{}'", venue)))?;
        registry.insert(encoder_for(kind, executor, settings)?);
    }
    Ok(registry)
}

/// Dispatcher-side executors for every executor configured in `settings`, all
/// quoting through `curve`.
pub fn build_executors(
    settings: &Settings,
    curve: Arc<dyn PricingCurve>,
) -> Result<Vec<(Address, Arc<dyn VenueExecutor>)>, EncodingError> {
    let mut executors: Vec<(Address, Arc<dyn VenueExecutor>)> = Vec::new();
    for (venue, address) in settings.sorted_executors() {
        let kind = map_venue(venue)
            .ok_or_else(|| EncodingError::Configuration(format!("unsupported venue '{}'", venue)))?;
        let executor: Arc<dyn VenueExecutor> = match kind {
            VenueKind::UniswapV2 => Arc::new(UniswapV2Executor::new(curve.clone())),
            VenueKind::UniswapV3 => Arc::new(UniswapV3Executor::new(curve.clone())),
            VenueKind::BalancerV2 => Arc::new(BalancerV2Executor::new(settings.venues.balancer_vault, curve.clone())),
            VenueKind::Curve => Arc::new(CurveExecutor::new(curve.clone())),
        };
        executors.push((address, executor));
    }
    Ok(executors)
}

pub(crate) fn malformed(venue: &'static str) -> impl Fn(EncodingError) -> VenueError {
    move |e| VenueError::MalformedParams {
        venue,
        reason: e.to_string(),
    }
}

/// Reads a fixed-layout param blob, failing on missing or trailing bytes.
pub(crate) fn read_params<'a, T>(
    venue: &'static str,
    params: &'a [u8],
    read: impl FnOnce(&mut ByteReader<'a>) -> Result<T, EncodingError>,
) -> Result<T, VenueError> {
    let mut reader = ByteReader::new(params, venue);
    let value = read(&mut reader).map_err(malformed(venue))?;
    reader.finish().map_err(malformed(venue))?;
    Ok(value)
}
