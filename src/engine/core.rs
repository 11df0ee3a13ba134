// 8.0 engine/core.rs: main engine. holds markets, accounts, collateral config, the oracle
// store, the ledger and the hook registry. admin and account management live here.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::Account;
use crate::collateral::CollateralConfig;
use crate::config::{GlobalConfig, Settings};
use crate::events::{
    AccountCreatedEvent, CollateralConfiguredEvent, DelegateUpdatedEvent, Event, EventId, EventPayload,
    GlobalConfigUpdatedEvent, MarketConfigEvent,
};
use crate::hooks::{HookConfig, HookRegistry, SettlementHook};
use crate::ledger::{CollateralLedger, InMemoryLedger};
use crate::market::{MarketConfig, MarketState};
use crate::oracle::{OracleStore, PriceRecord, PriceUpdateData};
use crate::types::{AccountId, Address, CollateralId, HookId, MarketId, Timestamp};
use crate::utilization::InterestState;
use std::collections::{BTreeMap, BTreeSet};

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine<L: CollateralLedger = InMemoryLedger> {
    pub(super) config: EngineConfig,
    pub(super) global: GlobalConfig,
    pub(super) markets: BTreeMap<MarketId, MarketState>,
    pub(super) collaterals: BTreeMap<CollateralId, CollateralConfig>,
    pub(super) accounts: BTreeMap<AccountId, Account>,
    pub(super) flagged_accounts: BTreeSet<AccountId>,
    pub(super) interest: InterestState,
    pub(super) oracle: OracleStore,
    pub(super) ledger: L,
    pub(super) hooks: HookRegistry,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) next_order_id: u64,
    pub(super) next_account_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine<InMemoryLedger> {
    pub fn in_memory(config: EngineConfig, global: GlobalConfig) -> Self {
        Self::new(config, global, InMemoryLedger::new())
    }

    /// Build an engine from loaded settings, registering collaterals and markets as the admin.
    pub fn from_settings(settings: Settings) -> Result<Self, EngineError> {
        settings.validate()?;
        let admin = settings.engine.admin;
        let mut engine = Self::in_memory(settings.engine, settings.global);
        for collateral in settings.collaterals {
            engine.set_collateral_config(admin, collateral)?;
        }
        for market in settings.markets {
            engine.add_market(admin, market)?;
        }
        Ok(engine)
    }
}

impl<L: CollateralLedger> Engine<L> {
    pub fn new(config: EngineConfig, global: GlobalConfig, ledger: L) -> Self {
        let mut collaterals = BTreeMap::new();
        collaterals.insert(CollateralId::USD, CollateralConfig::usd());

        Self {
            config,
            oracle: OracleStore::new(global.staleness.clone()),
            global,
            markets: BTreeMap::new(),
            collaterals,
            accounts: BTreeMap::new(),
            flagged_accounts: BTreeSet::new(),
            interest: InterestState::new(Timestamp::from_secs(0)),
            ledger,
            hooks: HookRegistry::new(),
            events: Vec::new(),
            next_event_id: 1,
            next_order_id: 1,
            next_account_id: 1,
            current_time: Timestamp::from_secs(0),
        }
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: i64) {
        self.current_time = self.current_time.plus_secs(secs);
    }

    pub(super) fn require_admin(&self, caller: Address) -> Result<(), EngineError> {
        if caller != self.config.admin {
            return Err(EngineError::Unauthorized { caller });
        }
        Ok(())
    }

    pub fn add_market(&mut self, caller: Address, config: MarketConfig) -> Result<MarketId, EngineError> {
        self.require_admin(caller)?;
        config.validate()?;
        let market_id = config.id;
        if self.markets.contains_key(&market_id) {
            return Err(EngineError::MarketAlreadyExists(market_id));
        }

        let version = config.version;
        let state = MarketState::new(config, self.current_time);
        self.markets.insert(market_id, state);
        tracing::info!(market = market_id.0, "market created");
        self.emit_event(EventPayload::MarketCreated(MarketConfigEvent { market_id, version }));
        Ok(market_id)
    }

    // skew, size, funding and liquidation window carry over; only parameters change
    pub fn update_market_config(&mut self, caller: Address, config: MarketConfig) -> Result<u64, EngineError> {
        self.require_admin(caller)?;
        config.validate()?;
        let market_id = config.id;
        let market = self
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        market.replace_config(config);
        let version = market.config.version;

        tracing::info!(market = market_id.0, version, "market config updated");
        self.emit_event(EventPayload::MarketConfigUpdated(MarketConfigEvent { market_id, version }));
        Ok(version)
    }

    pub fn set_collateral_config(&mut self, caller: Address, config: CollateralConfig) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        let event = CollateralConfiguredEvent {
            collateral_id: config.id,
            symbol: config.symbol.clone(),
        };
        self.collaterals.insert(config.id, config);
        self.emit_event(EventPayload::CollateralConfigured(event));
        Ok(())
    }

    pub fn update_global_config(&mut self, caller: Address, mut config: GlobalConfig) -> Result<u64, EngineError> {
        self.require_admin(caller)?;
        config.validate()?;
        config.version = self.global.version + 1;
        self.oracle.set_staleness(config.staleness.clone());
        self.global = config;

        let version = self.global.version;
        tracing::info!(version, "global config updated");
        self.emit_event(EventPayload::GlobalConfigUpdated(GlobalConfigUpdatedEvent { version }));
        Ok(version)
    }

    pub fn register_hook(
        &mut self,
        caller: Address,
        hook_id: HookId,
        hook: Box<dyn SettlementHook>,
        config: HookConfig,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        self.hooks.register(hook_id, hook, config);
        Ok(())
    }

    pub fn deregister_hook(&mut self, caller: Address, hook_id: HookId) -> Result<bool, EngineError> {
        self.require_admin(caller)?;
        Ok(self.hooks.deregister(hook_id))
    }

    /// Accept a price from a keeper. Older-than-held updates are decoded but not stored.
    pub fn update_price(&mut self, data: &PriceUpdateData) -> Result<PriceRecord, EngineError> {
        let record = self.oracle.update(data)?;
        self.emit_event(EventPayload::PriceUpdated(record));
        Ok(record)
    }

    pub fn create_account(&mut self, owner: Address) -> AccountId {
        let id = AccountId(self.next_account_id);
        self.next_account_id += 1;
        self.accounts.insert(id, Account::new(id, owner, self.current_time));
        self.emit_event(EventPayload::AccountCreated(AccountCreatedEvent { account_id: id, owner }));
        id
    }

    pub fn set_delegate(
        &mut self,
        caller: Address,
        account_id: AccountId,
        delegate: Address,
        granted: bool,
    ) -> Result<(), EngineError> {
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;
        // only the owner hands out trading rights
        if caller != account.owner {
            return Err(EngineError::Unauthorized { caller });
        }
        if granted {
            account.delegates.insert(delegate);
        } else {
            account.delegates.remove(&delegate);
        }
        self.emit_event(EventPayload::DelegateUpdated(DelegateUpdatedEvent {
            account_id,
            delegate,
            granted,
        }));
        Ok(())
    }

    pub(super) fn authorized_account(&self, caller: Address, account_id: AccountId) -> Result<&Account, EngineError> {
        let account = self
            .accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;
        if !account.is_authorized(caller) {
            return Err(EngineError::Unauthorized { caller });
        }
        Ok(account)
    }

    pub(super) fn account(&self, account_id: AccountId) -> Result<&Account, EngineError> {
        self.accounts.get(&account_id).ok_or(EngineError::AccountNotFound(account_id))
    }

    pub(super) fn market(&self, market_id: MarketId) -> Result<&MarketState, EngineError> {
        self.markets.get(&market_id).ok_or(EngineError::MarketNotFound(market_id))
    }

    pub fn get_market(&self, market_id: MarketId) -> Option<&MarketState> {
        self.markets.get(&market_id)
    }

    pub fn get_account(&self, account_id: AccountId) -> Option<&Account> {
        self.accounts.get(&account_id)
    }

    pub fn accounts_iter(&self) -> impl Iterator<Item = (&AccountId, &Account)> {
        self.accounts.iter()
    }

    pub fn markets_iter(&self) -> impl Iterator<Item = (&MarketId, &MarketState)> {
        self.markets.iter()
    }

    pub fn collateral_config(&self, collateral_id: CollateralId) -> Option<&CollateralConfig> {
        self.collaterals.get(&collateral_id)
    }

    pub fn global_config(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn interest_state(&self) -> &InterestState {
        &self.interest
    }

    pub fn is_flagged(&self, account_id: AccountId) -> bool {
        self.flagged_accounts.contains(&account_id)
    }

    pub fn flagged_accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.flagged_accounts.iter()
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn oracle(&self) -> &OracleStore {
        &self.oracle
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        if self.config.trace_events {
            tracing::trace!(id = event.id.0, payload = ?event.payload, "event");
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
