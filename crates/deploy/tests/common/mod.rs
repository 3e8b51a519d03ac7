//! In-memory chain used by the pipeline integration tests.
//!
//! The chain enforces the account's nonce order, assigns contract addresses,
//! records every submission and confirmation in order, and can be told to
//! fail specific transactions.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use alloy_core::primitives::{Address, Bytes, TxHash, U256, address};
use townhall_deploy::{
    ArtifactStore, CallRequest, ChainClient, ClientError, DeploymentRequest, NetworkContext,
    NetworkRegistry, NetworkRule, Receipt,
};

pub const SENDER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
pub const TOKEN: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
pub const BUILDING: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
pub const TOWN_HALL: Address = address!("cccccccccccccccccccccccccccccccccccccccc");
/// Token address configured for mainnet in these tests.
pub const MAINNET_TOKEN: Address = address!("dddddddddddddddddddddddddddddddddddddddd");

pub const GAS_PRICE: u128 = 1_500_000_000;

/// Something the chain saw, in the order it saw it.
///
/// `label` is the artifact name for deployments and `call:<artifact>` for
/// calls into a deployed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Submitted { label: String, nonce: u64 },
    Confirmed { label: String },
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub label: String,
    pub nonce: u64,
    pub gas_price: u128,
    pub data: Bytes,
    pub to: Option<Address>,
    pub created: Option<Address>,
}

#[derive(Debug, Default)]
struct State {
    pending_nonce: u64,
    next_tx: u64,
    next_address: u8,
    transactions: HashMap<TxHash, Transaction>,
    events: Vec<Event>,
    addresses: HashMap<String, Address>,
    reject_send: HashSet<String>,
    reject_nonce: HashSet<String>,
    revert: HashSet<String>,
    timeout: HashSet<String>,
    interfere_after: HashSet<String>,
    nonce_unreadable: bool,
}

#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<State>,
}

impl MockChain {
    /// A chain where the sender has already sent `pending_nonce` transactions.
    pub fn new(pending_nonce: u64) -> Self {
        let chain = Self::default();
        chain.state().pending_nonce = pending_nonce;
        chain
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock chain state poisoned")
    }

    /// Deploy `label` at `address` instead of a generated one.
    pub fn with_address(self, label: &str, address: Address) -> Self {
        self.state().addresses.insert(label.to_string(), address);
        self
    }

    /// Fail the submission of `label` with a transport error.
    pub fn reject_send(self, label: &str) -> Self {
        self.state().reject_send.insert(label.to_string());
        self
    }

    /// Fail the submission of `label` as if its nonce had already been used.
    pub fn reject_nonce(self, label: &str) -> Self {
        self.state().reject_nonce.insert(label.to_string());
        self
    }

    /// Include `label` but report it as reverted.
    pub fn revert(self, label: &str) -> Self {
        self.state().revert.insert(label.to_string());
        self
    }

    /// Never confirm `label`.
    pub fn time_out(self, label: &str) -> Self {
        self.state().timeout.insert(label.to_string());
        self
    }

    /// Have another process send from the same account right after `label`.
    pub fn interfere_after(self, label: &str) -> Self {
        self.state().interfere_after.insert(label.to_string());
        self
    }

    /// Fail every transaction count read.
    pub fn nonce_unreadable(self) -> Self {
        self.state().nonce_unreadable = true;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Position of `event` in the event log.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.state().events.iter().position(|e| e == event)
    }

    pub fn submitted_labels(&self) -> Vec<String> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Submitted { label, .. } => Some(label.clone()),
                Event::Confirmed { .. } => None,
            })
            .collect()
    }

    /// The first transaction submitted for `label`.
    pub fn transaction(&self, label: &str) -> Option<Transaction> {
        self.state()
            .transactions
            .values()
            .find(|tx| tx.label == label)
            .cloned()
    }

    pub fn pending_nonce(&self) -> u64 {
        self.state().pending_nonce
    }

    fn submit(
        &self,
        label: String,
        nonce: u64,
        gas_price: u128,
        data: Bytes,
        to: Option<Address>,
    ) -> Result<TxHash, ClientError> {
        let mut state = self.state();

        if state.reject_send.contains(&label) {
            return Err(ClientError::Rpc(format!("connection reset while sending {label}")));
        }
        if state.reject_nonce.contains(&label) || nonce != state.pending_nonce {
            return Err(ClientError::NonceConflict(format!(
                "nonce too low: next nonce {}, tx nonce {nonce}",
                state.pending_nonce
            )));
        }

        state.next_tx += 1;
        let tx_hash = TxHash::from(U256::from(state.next_tx));

        let created = if to.is_some() {
            None
        } else if let Some(address) = state.addresses.get(&label).copied() {
            Some(address)
        } else {
            state.next_address += 1;
            Some(Address::repeat_byte(state.next_address))
        };

        state.pending_nonce += 1;
        if state.interfere_after.contains(&label) {
            state.pending_nonce += 1;
        }

        state.events.push(Event::Submitted {
            label: label.clone(),
            nonce,
        });
        state.transactions.insert(
            tx_hash,
            Transaction {
                label,
                nonce,
                gas_price,
                data,
                to,
                created,
            },
        );

        Ok(tx_hash)
    }
}

impl ChainClient for MockChain {
    async fn transaction_count(&self, account: Address) -> Result<u64, ClientError> {
        assert_eq!(account, SENDER, "unexpected account queried");
        let state = self.state();
        if state.nonce_unreadable {
            return Err(ClientError::Rpc("connection refused".to_string()));
        }
        Ok(state.pending_nonce)
    }

    async fn gas_price(&self) -> Result<u128, ClientError> {
        Ok(GAS_PRICE)
    }

    async fn send_deployment(&self, request: DeploymentRequest) -> Result<TxHash, ClientError> {
        self.submit(
            request.artifact,
            request.nonce,
            request.gas_price,
            request.init_code,
            None,
        )
    }

    async fn send_call(&self, request: CallRequest) -> Result<TxHash, ClientError> {
        let target = self
            .state()
            .transactions
            .values()
            .find(|tx| tx.created == Some(request.to))
            .map(|tx| tx.label.clone())
            .unwrap_or_else(|| request.to.to_string());

        self.submit(
            format!("call:{target}"),
            request.nonce,
            request.gas_price,
            request.data,
            Some(request.to),
        )
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt, ClientError> {
        let mut state = self.state();
        let tx = state
            .transactions
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| ClientError::Rpc(format!("unknown transaction {tx_hash}")))?;

        if state.timeout.contains(&tx.label) {
            return Err(ClientError::Timeout(tx_hash));
        }

        state.events.push(Event::Confirmed {
            label: tx.label.clone(),
        });

        let success = !state.revert.contains(&tx.label);
        Ok(Receipt {
            tx_hash,
            contract_address: tx.created.filter(|_| success),
            success,
            block_number: Some(tx.nonce + 1),
        })
    }
}

/// Bytecode for the mock token and the default plan's artifacts.
pub fn artifacts() -> ArtifactStore {
    let mut store = ArtifactStore::default();
    store
        .insert("MockToken", vec![0x60, 0x01])
        .insert("Building", vec![0x60, 0x02])
        .insert("TownHall", vec![0x60, 0x03])
        .insert("Grant", vec![0x60, 0x04])
        .insert("MintPad", vec![0x60, 0x05]);
    store
}

/// The literal scenario's chain: token, building and town hall at fixed addresses.
pub fn scripted_chain(pending_nonce: u64) -> MockChain {
    MockChain::new(pending_nonce)
        .with_address("MockToken", TOKEN)
        .with_address("Building", BUILDING)
        .with_address("TownHall", TOWN_HALL)
}

/// The built-in registry plus a fixed mainnet rule, as an operator would configure it.
pub fn registry() -> NetworkRegistry {
    NetworkRegistry::default().with_rule(
        "mainnet",
        NetworkRule::Fixed {
            address: MAINNET_TOKEN,
        },
    )
}

pub fn context(network: &str, chain: MockChain) -> NetworkContext<MockChain> {
    NetworkContext::new(network, SENDER, chain)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
