//! # Encode and Dispatch Example
//!
//! Walks one trade through the whole SDK:
//! - Settings loaded from `Config.toml`
//! - Program encoder and venue executors built from those settings
//! - Executor registration and the activation delay
//! - Encoding a two-hop solution and submitting the router call
//!
//! The ledger is in-memory and quotes come from a fixed 0.3% fee curve, so the
//! example runs without any network access.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --example encode_and_dispatch
//! ```

use std::sync::Arc;

use anyhow::Result;
use ethers::types::{Address, U256};
use swap_program_sdk::{
    chain::ChainState,
    executor::FixedRateCurve,
    models::component_of,
    venues,
    Dispatcher, ExecutorRegistry, ProgramEncoder, Settings, Solution, Swap,
};

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();
    #[cfg(feature = "observability")]
    let _prometheus = swap_program_sdk::metrics::init_observability()?;

    println!("🚀 Initializing Swap Program SDK...");

    // 1. Load settings from config file and environment
    let settings = Settings::new()?;
    println!("✅ Settings loaded ({} executors)", settings.executors.len());

    // 2. Encoder and executors for the configured venues
    let encoder = ProgramEncoder::from_settings(&settings)?;
    let executors = venues::build_executors(&settings, Arc::new(FixedRateCurve::new(997, 1_000)))?;
    println!("✅ Encoder and executors created");

    // 3. Register executors; they become callable after the safety window
    let mut chain = ChainState::new(settings.router.wrapped_native);
    let registry = Arc::new(ExecutorRegistry::new(
        settings.registry.admin,
        settings.registry.safety_window_blocks,
    ));
    let addresses: Vec<Address> = executors.iter().map(|(address, _)| *address).collect();
    registry.register(settings.registry.admin, &addresses, chain.block_number())?;
    chain.advance_blocks(settings.registry.safety_window_blocks);
    println!("✅ {} executors active at block {}", addresses.len(), chain.block_number());

    let dispatcher = Dispatcher::new(settings.router.address, registry).with_executors(executors);

    // 4. Seed pools and the trader
    let usdc = Address::from_low_u64_be(0x1001);
    let weth = settings.router.wrapped_native;
    let dai = Address::from_low_u64_be(0x1003);
    let usdc_weth = Address::from_low_u64_be(0x2001);
    let weth_dai = Address::from_low_u64_be(0x2002);
    let trader = Address::from_low_u64_be(0x7777);

    chain.mint(weth, usdc_weth, U256::from(1_000_000u64))?;
    chain.mint(dai, weth_dai, U256::from(1_000_000u64))?;
    chain.mint(usdc, trader, U256::from(10_000u64))?;
    chain.approve(usdc, trader, dispatcher.address(), U256::from(10_000u64));

    // 5. USDC -> WETH on a constant-product pair, WETH -> DAI on a 0.05% pool
    let solution = Solution::builder(usdc, dai, U256::from(10_000u64))
        .sender(trader)
        .receiver(trader)
        .min_amount_out(U256::from(9_900u64))
        .pull_authorized(true)
        .swap(Swap::builder("uniswap_v2", component_of(usdc_weth), usdc, weth).build())
        .swap(
            Swap::builder("uniswap_v3", component_of(weth_dai), weth, dai)
                .user_data(vec![0x00, 0x01, 0xf4])
                .build(),
        )
        .build();

    let program = encoder.encode_solution(&solution)?;
    println!(
        "📦 {} program: {} hops, {} bytes",
        program.strategy,
        program.hop_count,
        program.bytes.len()
    );
    println!("   0x{}", hex::encode(&program.bytes));

    // 6. Submit through the router entry point
    let tx = encoder.encode_router_call(&program);
    let report = dispatcher.submit_call(&mut chain, trader, &tx)?;
    println!(
        "✅ Settled: {} in, {} out (minimum {})",
        report.amount_in, report.amount_out, report.min_amount_out
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
