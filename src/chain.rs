//! # Token Ledger
//!
//! In-memory model of the chain state the dispatcher runs against: token balances,
//! allowances, native currency, wrapping, and the current block height.
//!
//! Native currency is tracked under [`NATIVE_TOKEN`]. Every mutation is checked, and
//! [`ChainState::snapshot`]/[`ChainState::restore`] give the all-or-nothing semantics
//! a reverted transaction has.

use std::collections::HashMap;

use ethers::types::{Address, U256};
use serde::Serialize;
use thiserror::Error;

use crate::models::NATIVE_TOKEN;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{holder:?} holds {available} of {token:?}, needs {needed}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        needed: U256,
        available: U256,
    },
    #[error("{spender:?} may spend {available} of {token:?} for {owner:?}, needs {needed}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        needed: U256,
        available: U256,
    },
    #[error("balance overflow crediting {token:?} to {holder:?}")]
    Overflow { token: Address, holder: Address },
}

/// Side effects observable after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LedgerEvent {
    Transfer {
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    },
    Approval {
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    },
    Wrap { holder: Address, amount: U256 },
    Unwrap { holder: Address, amount: U256 },
}

/// Opaque copy of a ledger taken before a run.
#[derive(Debug, Clone)]
pub struct ChainSnapshot(ChainState);

#[derive(Debug, Clone, Default)]
pub struct ChainState {
    block_number: u64,
    wrapped_native: Address,
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    events: Vec<LedgerEvent>,
}

impl ChainState {
    pub fn new(wrapped_native: Address) -> Self {
        Self {
            wrapped_native,
            ..Self::default()
        }
    }

    pub fn wrapped_native(&self) -> Address {
        self.wrapped_native
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn set_block(&mut self, block: u64) {
        self.block_number = block;
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.block_number = self.block_number.saturating_add(blocks);
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or_default()
    }

    pub fn native_balance(&self, holder: Address) -> U256 {
        self.balance_of(NATIVE_TOKEN, holder)
    }

    /// Credits `amount` out of thin air. Used to seed accounts and by venue
    /// executors paying out of pool reserves they model.
    pub fn mint(&mut self, token: Address, holder: Address, amount: U256) -> Result<(), LedgerError> {
        self.credit(token, holder, amount)
    }

    pub fn transfer(&mut self, token: Address, from: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        if from == to || amount.is_zero() {
            return Ok(());
        }
        self.debit(token, from, amount)?;
        self.credit(token, to, amount)?;
        self.events.push(LedgerEvent::Transfer {
            token,
            from,
            to,
            amount,
        });
        Ok(())
    }

    pub fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances.insert((token, owner, spender), amount);
        self.events.push(LedgerEvent::Approval {
            token,
            owner,
            spender,
            amount,
        });
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// Moves `amount` on behalf of `owner`. An unlimited (`U256::MAX`) allowance is
    /// never decremented.
    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        owner: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Ok(());
        }
        let allowed = self.allowance(token, owner, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                token,
                owner,
                spender,
                needed: amount,
                available: allowed,
            });
        }
        if allowed != U256::MAX {
            self.allowances.insert((token, owner, spender), allowed - amount);
        }
        self.transfer(token, owner, to, amount)
    }

    pub fn wrap(&mut self, holder: Address, amount: U256) -> Result<(), LedgerError> {
        self.debit(NATIVE_TOKEN, holder, amount)?;
        self.credit(self.wrapped_native, holder, amount)?;
        self.events.push(LedgerEvent::Wrap { holder, amount });
        Ok(())
    }

    pub fn unwrap(&mut self, holder: Address, amount: U256) -> Result<(), LedgerError> {
        self.debit(self.wrapped_native, holder, amount)?;
        self.credit(NATIVE_TOKEN, holder, amount)?;
        self.events.push(LedgerEvent::Unwrap { holder, amount });
        Ok(())
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Number of token transfers recorded so far.
    pub fn transfer_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, LedgerEvent::Transfer { .. }))
            .count()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot(self.clone())
    }

    pub fn restore(&mut self, snapshot: ChainSnapshot) {
        *self = snapshot.0;
    }

    fn debit(&mut self, token: Address, holder: Address, amount: U256) -> Result<(), LedgerError> {
        let available = self.balance_of(token, holder);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                token,
                holder,
                needed: amount,
                available,
            });
        }
        self.balances.insert((token, holder), available - amount);
        Ok(())
    }

    fn credit(&mut self, token: Address, holder: Address, amount: U256) -> Result<(), LedgerError> {
        let balance = self.balance_of(token, holder);
        let updated = balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { token, holder })?;
        self.balances.insert((token, holder), updated);
        Ok(())
    }
}
