//! Shared fixture for the integration tests: a token ledger, a registry with every
//! configured executor active, a dispatcher bound to those executors and the
//! matching program encoder.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ethers::types::{Address, H160, U256};
use swap_program_sdk::chain::ChainState;
use swap_program_sdk::errors::VenueError;
use swap_program_sdk::executor::{PricingCurve, VenueExecutor};
use swap_program_sdk::models::{component_of, Swap};
use swap_program_sdk::utils::mul_div;
use swap_program_sdk::venues;
use swap_program_sdk::{
    DispatchError, Dispatcher, EncodedProgram, ExecutorRegistry, ProgramEncoder, RunReport, Settings, Solution,
};

pub const ROUTER: Address = H160([0xd1; 20]);
pub const WRAPPED_NATIVE: Address = H160([0xee; 20]);
pub const BALANCER_VAULT: Address = H160([0xba; 20]);
pub const ADMIN: Address = H160([0xad; 20]);
pub const SENDER: Address = H160([0x5e; 20]);
pub const RECEIVER: Address = H160([0xbe; 20]);

pub const V2_EXECUTOR: Address = H160([0xe1; 20]);
pub const V3_EXECUTOR: Address = H160([0xe2; 20]);
pub const BALANCER_EXECUTOR: Address = H160([0xe3; 20]);
pub const CURVE_EXECUTOR: Address = H160([0xe4; 20]);

pub const SAFETY_WINDOW: u64 = 10;
pub const START_BLOCK: u64 = 1_000;

pub fn token(n: u64) -> Address {
    Address::from_low_u64_be(0x1000 + n)
}

pub fn pool(n: u64) -> Address {
    Address::from_low_u64_be(0x2000 + n)
}

pub fn amount(n: u64) -> U256 {
    U256::from(n)
}

pub fn settings_toml() -> String {
    format!(
        r#"
[router]
address = "{:?}"
wrapped_native = "{:?}"

[executors]
uniswap_v2 = "{:?}"
uniswap_v3 = "{:?}"
balancer_v2 = "{:?}"
curve = "{:?}"

[venues]
balancer_vault = "{:?}"

[registry]
admin = "{:?}"
safety_window_blocks = {}
"#,
        ROUTER,
        WRAPPED_NATIVE,
        V2_EXECUTOR,
        V3_EXECUTOR,
        BALANCER_EXECUTOR,
        CURVE_EXECUTOR,
        BALANCER_VAULT,
        ADMIN,
        SAFETY_WINDOW
    )
}

pub fn settings() -> Settings {
    Settings::from_toml_str(&settings_toml()).unwrap()
}

/// Quotes by component id. Components without a rate have no liquidity.
#[derive(Default)]
pub struct RateBook {
    rates: Mutex<HashMap<Vec<u8>, (U256, U256)>>,
}

impl RateBook {
    pub fn set(&self, component: &[u8], numerator: u64, denominator: u64) {
        self.rates
            .lock()
            .unwrap()
            .insert(component.to_vec(), (U256::from(numerator), U256::from(denominator)));
    }
}

impl PricingCurve for RateBook {
    fn amount_out(
        &self,
        component: &[u8],
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256, VenueError> {
        let rates = self.rates.lock().unwrap();
        let (numerator, denominator) = rates.get(component).ok_or(VenueError::NoLiquidity {
            venue: "rate_book",
            token_in,
            token_out,
        })?;
        Ok(mul_div(amount_in, *numerator, *denominator))
    }
}

pub struct Harness {
    pub settings: Settings,
    pub chain: ChainState,
    pub registry: Arc<ExecutorRegistry>,
    pub dispatcher: Dispatcher,
    pub encoder: ProgramEncoder,
    pub rates: Arc<RateBook>,
}

impl Harness {
    /// Every configured executor registered at `START_BLOCK` and already active.
    pub fn new() -> Self {
        let mut harness = Self::pending();
        harness.chain.set_block(START_BLOCK + SAFETY_WINDOW);
        harness
    }

    /// Executors registered at `START_BLOCK`, chain still at `START_BLOCK`.
    pub fn pending() -> Self {
        Self::with_extra_executors(Vec::new())
    }

    /// Like [`Harness::pending`], with additional executors bound and registered.
    pub fn with_extra_executors(extra: Vec<(Address, Arc<dyn VenueExecutor>)>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let settings = settings();
        let rates = Arc::new(RateBook::default());
        let registry = Arc::new(ExecutorRegistry::new(ADMIN, settings.registry.safety_window_blocks));

        let mut executors = venues::build_executors(&settings, rates.clone()).unwrap();
        executors.extend(extra);
        let addresses: Vec<Address> = executors.iter().map(|(address, _)| *address).collect();
        registry.register(ADMIN, &addresses, START_BLOCK).unwrap();

        let mut chain = ChainState::new(WRAPPED_NATIVE);
        chain.set_block(START_BLOCK);
        let dispatcher = Dispatcher::new(ROUTER, registry.clone()).with_executors(executors);
        let encoder = ProgramEncoder::from_settings(&settings).unwrap();

        Self {
            settings,
            chain,
            registry,
            dispatcher,
            encoder,
            rates,
        }
    }

    pub fn activate(mut self) -> Self {
        self.chain.set_block(START_BLOCK + SAFETY_WINDOW);
        self
    }

    /// Seeds `reserve` of `token_out` at `holder` and quotes `component` at
    /// `numerator / denominator`.
    pub fn liquidity(&mut self, component: &[u8], holder: Address, token_out: Address, reserve: u64, numerator: u64, denominator: u64) {
        self.chain.mint(token_out, holder, amount(reserve)).unwrap();
        self.rates.set(component, numerator, denominator);
    }

    /// Pool-addressed venues hold their own reserves.
    pub fn pool_liquidity(&mut self, pool: Address, token_out: Address, reserve: u64, numerator: u64, denominator: u64) {
        self.liquidity(pool.as_bytes(), pool, token_out, reserve, numerator, denominator);
    }

    /// Balancer pools quote by pool id and keep reserves in the vault.
    pub fn vault_liquidity(&mut self, pool_id: [u8; 32], token_out: Address, reserve: u64, numerator: u64, denominator: u64) {
        self.liquidity(&pool_id, BALANCER_VAULT, token_out, reserve, numerator, denominator);
    }

    /// Sender holds `value` and authorizes the dispatcher to pull it.
    pub fn authorize_pull(&mut self, token: Address, value: u64) {
        self.chain.mint(token, SENDER, amount(value)).unwrap();
        self.chain.approve(token, SENDER, ROUTER, amount(value));
    }

    /// Sender transfers `value` to the dispatcher ahead of the run.
    pub fn deposit(&mut self, token: Address, value: u64) {
        self.chain.mint(token, SENDER, amount(value)).unwrap();
        self.chain.transfer(token, SENDER, ROUTER, amount(value)).unwrap();
    }

    pub fn encode(&self, solution: &Solution) -> EncodedProgram {
        self.encoder.encode_solution(solution).unwrap()
    }

    pub fn submit(&mut self, program: &EncodedProgram) -> Result<RunReport, DispatchError> {
        self.dispatcher
            .submit(&mut self.chain, SENDER, &program.bytes, program.amount_in, program.value)
    }

    pub fn balance(&self, token: Address, holder: Address) -> U256 {
        self.chain.balance_of(token, holder)
    }
}

pub fn v2(pool: Address, token_in: Address, token_out: Address) -> Swap {
    Swap::builder("uniswap_v2", component_of(pool), token_in, token_out).build()
}

/// 0.3% fee tier.
pub fn v3(pool: Address, token_in: Address, token_out: Address) -> Swap {
    Swap::builder("uniswap_v3", component_of(pool), token_in, token_out)
        .user_data(vec![0x00, 0x0b, 0xb8])
        .build()
}

pub fn curve(pool: Address, token_in: Address, token_out: Address) -> Swap {
    Swap::builder("curve", component_of(pool), token_in, token_out)
        .user_data(vec![0u8, 1u8])
        .build()
}

pub fn balancer(pool_id: [u8; 32], token_in: Address, token_out: Address) -> Swap {
    Swap::builder("balancer_v2", pool_id.to_vec(), token_in, token_out).build()
}
