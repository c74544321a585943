//! Role wallets used to sign ledger transactions.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized
//! - A transaction is only ever signed by the wallet of the calling address

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use std::collections::HashMap;

use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::security::roles::Role;

/// Prefix of the per-role private key variables.
pub const PRIVATE_KEY_ENV_PREFIX: &str = "ORGAN_REGISTRY_KEY_";

/// Environment variable holding the key for `role`.
pub fn key_env_var(role: Role) -> String {
    format!("{}{}", PRIVATE_KEY_ENV_PREFIX, role.to_string().to_uppercase())
}

/// A local signer bound to one chain.
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string.
    ///
    /// # Arguments
    /// * `private_key_hex` - Hex string (with or without 0x prefix)
    /// * `chain_id` - Chain ID for EIP-155 replay protection
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> BlockchainResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let mut signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private key format: {}", e)))?;
        signer.set_chain_id(Some(chain_id));

        Ok(Self { signer, chain_id })
    }

    /// Load the wallet for `role`, if its variable is set.
    pub fn from_env(role: Role, chain_id: u64) -> BlockchainResult<Option<Self>> {
        match std::env::var(key_env_var(role)) {
            Ok(key) => Self::from_private_key(&key, chain_id).map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// A provider that fills nonce and gas and signs with this wallet.
    pub fn connect(&self, rpc_url: url::Url) -> DynProvider {
        ProviderBuilder::new()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .connect_http(rpc_url)
            .erased()
    }
}

/// Signing providers keyed by the address they sign for.
#[derive(Clone, Default)]
pub struct SignerSet {
    providers: HashMap<Address, DynProvider>,
}

impl SignerSet {
    /// Load every role wallet present in the environment.
    pub fn from_env(rpc_url: &url::Url, chain_id: u64) -> BlockchainResult<Self> {
        let mut set = Self::default();
        for role in [Role::Admin, Role::Hospital, Role::DonorIntake, Role::RecipientIntake] {
            if let Some(wallet) = Wallet::from_env(role, chain_id)? {
                tracing::info!(role = %role, address = %wallet.address(), "Ledger signer loaded");
                set.insert(&wallet, rpc_url.clone());
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, wallet: &Wallet, rpc_url: url::Url) {
        self.providers.insert(wallet.address(), wallet.connect(rpc_url));
    }

    /// The signing provider for `caller`.
    pub fn for_caller(&self, caller: Address) -> BlockchainResult<&DynProvider> {
        self.providers.get(&caller).ok_or(BlockchainError::NoSigner(caller))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for SignerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerSet")
            .field("addresses", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn test_wallet_from_private_key() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1337).unwrap();
        assert_eq!(wallet.address().to_string().to_lowercase(), TEST_ADDRESS);
        assert_eq!(wallet.chain_id(), 1337);
    }

    #[test]
    fn test_wallet_with_0x_prefix() {
        let wallet = Wallet::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY), 1).unwrap();
        assert_eq!(wallet.address().to_string().to_lowercase(), TEST_ADDRESS);
    }

    #[test]
    fn test_invalid_private_key() {
        let result = Wallet::from_private_key("invalid_key", 1);
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_key_env_var_names() {
        assert_eq!(key_env_var(Role::DonorIntake), "ORGAN_REGISTRY_KEY_DONOR_INTAKE");
        assert_eq!(key_env_var(Role::Admin), "ORGAN_REGISTRY_KEY_ADMIN");
    }

    #[test]
    fn test_signer_lookup_by_caller() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1337).unwrap();
        let mut set = SignerSet::default();
        set.insert(&wallet, "http://localhost:8545".parse().unwrap());
        assert!(set.for_caller(wallet.address()).is_ok());
        assert!(matches!(
            set.for_caller(Address::ZERO),
            Err(BlockchainError::NoSigner(a)) if a == Address::ZERO
        ));
    }
}
