//! Environment-driven chain configuration.

use std::{fmt, time::Duration};

use alloy_primitives::{Address, address};
use alloy_signer_local::PrivateKeySigner;
use url::Url;

use crate::{ChainError, ChainResult, N2nContract};

/// Default time to wait for a transaction receipt.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const SEPOLIA_INFURA: &str = "https://sepolia.infura.io/v3/";

/// Sepolia deployment of the single-contract `StrebacomCore`.
pub const DEFAULT_CORE_ADDRESS: Address = address!("313e42204c1423c40db24ce8447518d9f7b3a2e0");

/// Addresses of the stream consensus contracts.
///
/// These are deployed per experiment campaign, so there are no defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamAddresses {
    /// `ValidatorRegistry` contract.
    pub validator_registry: Option<Address>,
    /// `StreamProcessor` contract.
    pub stream_processor: Option<Address>,
    /// `RollingHash` commitment contract.
    pub rolling_hash: Option<Address>,
}

/// Addresses of the N2N routing contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct N2nAddresses {
    /// ABATL translation layer.
    pub abatl: Address,
    /// NIAS registry.
    pub nias_registry: Address,
    /// NID registry.
    pub nid_registry: Address,
    /// Sequence path router.
    pub sequence_router: Address,
    /// Clustering contract.
    pub clustering: Address,
}

impl Default for N2nAddresses {
    fn default() -> Self {
        Self {
            abatl: N2nContract::AbatlTranslation.default_address(),
            nias_registry: N2nContract::NiasRegistry.default_address(),
            nid_registry: N2nContract::NidRegistry.default_address(),
            sequence_router: N2nContract::SequencePathRouter.default_address(),
            clustering: N2nContract::Clustering.default_address(),
        }
    }
}

impl N2nAddresses {
    /// Returns the configured address of `contract`.
    pub const fn get(&self, contract: N2nContract) -> Address {
        match contract {
            N2nContract::AbatlTranslation => self.abatl,
            N2nContract::NiasRegistry => self.nias_registry,
            N2nContract::NidRegistry => self.nid_registry,
            N2nContract::SequencePathRouter => self.sequence_router,
            N2nContract::Clustering => self.clustering,
        }
    }

    fn set(&mut self, contract: N2nContract, address: Address) {
        match contract {
            N2nContract::AbatlTranslation => self.abatl = address,
            N2nContract::NiasRegistry => self.nias_registry = address,
            N2nContract::NidRegistry => self.nid_registry = address,
            N2nContract::SequencePathRouter => self.sequence_router = address,
            N2nContract::Clustering => self.clustering = address,
        }
    }
}

/// Everything needed to build a [`ChainClient`](crate::ChainClient).
#[derive(Clone)]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Account that signs every transaction.
    pub signer: PrivateKeySigner,
    /// Stream consensus contract addresses.
    pub stream: StreamAddresses,
    /// N2N contract addresses.
    pub n2n: N2nAddresses,
    /// `StrebacomCore` contract address.
    pub core: Address,
    /// Receipt wait deadline.
    pub receipt_timeout: Duration,
    /// Receipt poll interval.
    pub poll_interval: Duration,
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("signer", &self.signer.address())
            .field("stream", &self.stream)
            .field("n2n", &self.n2n)
            .field("core", &self.core)
            .field("receipt_timeout", &self.receipt_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl ChainConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> ChainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> ChainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rpc_url = match (get("ETHEREUM_PROVIDER_URL"), get("INFURA_PROJECT_ID")) {
            (Some(url), _) => url,
            (None, Some(project)) => format!("{SEPOLIA_INFURA}{project}"),
            (None, None) => {
                return Err(ChainError::Config(
                    "set ETHEREUM_PROVIDER_URL or INFURA_PROJECT_ID".to_string(),
                ));
            }
        };
        let rpc_url = rpc_url
            .parse::<Url>()
            .map_err(|e| ChainError::Config(format!("invalid provider url: {e}")))?;

        let raw_key = get("PRIVATE_KEY").or_else(|| get("ETHEREUM_PRIVATE_KEY")).ok_or_else(
            || ChainError::Config("PRIVATE_KEY not found in environment".to_string()),
        )?;
        let signer = parse_private_key(&raw_key)?;

        let address = |key: &str| -> ChainResult<Option<Address>> {
            get(key)
                .map(|v| {
                    v.parse::<Address>()
                        .map_err(|e| ChainError::Config(format!("{key} is not an address: {e}")))
                })
                .transpose()
        };

        let stream = StreamAddresses {
            validator_registry: address("VALIDATOR_REGISTRY_ADDRESS")?,
            stream_processor: address("STREAM_PROCESSOR_ADDRESS")?,
            rolling_hash: address("ROLLING_HASH_ADDRESS")?,
        };

        let mut n2n = N2nAddresses::default();
        for contract in N2nContract::ALL {
            if let Some(addr) = address(contract.env_var())? {
                n2n.set(contract, addr);
            }
        }

        let core = address("STREBACOM_CORE_ADDRESS")?.unwrap_or(DEFAULT_CORE_ADDRESS);

        let receipt_timeout = get("RECEIPT_TIMEOUT_SECS")
            .map(|v| {
                v.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ChainError::Config(format!("RECEIPT_TIMEOUT_SECS: {e}")))
            })
            .transpose()?
            .unwrap_or(DEFAULT_RECEIPT_TIMEOUT);

        Ok(Self {
            rpc_url,
            signer,
            stream,
            n2n,
            core,
            receipt_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }
}

/// Parses a hex private key, tolerating embedded whitespace and a missing `0x` prefix.
fn parse_private_key(raw: &str) -> ChainResult<PrivateKeySigner> {
    let key: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let key = if key.len() == 64 { format!("0x{key}") } else { key };
    // The parse error would echo the key material, so it is dropped.
    key.parse::<PrivateKeySigner>()
        .map_err(|_| ChainError::Config("PRIVATE_KEY is not a valid secp256k1 key".to_string()))
}

/// Strips the path so API keys embedded in provider URLs never reach the logs.
fn redact_url(url: &Url) -> String {
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    // Well-known anvil account #0.
    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const KEY_ADDRESS: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn provider_url_takes_precedence_over_infura() {
        let config = ChainConfig::from_lookup(lookup(&[
            ("ETHEREUM_PROVIDER_URL", "http://localhost:8545"),
            ("INFURA_PROJECT_ID", "abc"),
            ("PRIVATE_KEY", KEY),
        ]))
        .unwrap();

        assert_eq!(config.rpc_url.as_str(), "http://localhost:8545/");
        assert_eq!(config.signer.address(), KEY_ADDRESS);
    }

    #[test]
    fn infura_project_builds_sepolia_url() {
        let config = ChainConfig::from_lookup(lookup(&[
            ("INFURA_PROJECT_ID", "abc123"),
            ("ETHEREUM_PRIVATE_KEY", KEY),
        ]))
        .unwrap();

        assert_eq!(config.rpc_url.as_str(), "https://sepolia.infura.io/v3/abc123");
    }

    #[test]
    fn missing_endpoint_is_config_error() {
        let err = ChainConfig::from_lookup(lookup(&[("PRIVATE_KEY", KEY)])).unwrap_err();
        assert!(matches!(err, ChainError::Config(msg) if msg.contains("ETHEREUM_PROVIDER_URL")));
    }

    #[test]
    fn missing_key_is_config_error() {
        let err = ChainConfig::from_lookup(lookup(&[("INFURA_PROJECT_ID", "abc")])).unwrap_err();
        assert!(matches!(err, ChainError::Config(msg) if msg.contains("PRIVATE_KEY")));
    }

    #[test]
    fn private_key_whitespace_and_prefix_are_normalized() {
        let spaced = format!("  {}\n {} ", &KEY[..32], &KEY[32..]);
        assert_eq!(parse_private_key(&spaced).unwrap().address(), KEY_ADDRESS);
        assert_eq!(parse_private_key(&format!("0x{KEY}")).unwrap().address(), KEY_ADDRESS);
    }

    #[test]
    fn invalid_key_error_does_not_leak_material() {
        let err = parse_private_key("0xdeadbeef").unwrap_err();
        assert!(!err.to_string().contains("deadbeef"));
    }

    #[test]
    fn n2n_addresses_default_and_override() {
        let router = address!("00000000000000000000000000000000000000aa");
        let config = ChainConfig::from_lookup(lookup(&[
            ("INFURA_PROJECT_ID", "abc"),
            ("PRIVATE_KEY", KEY),
            ("SEQUENCE_ROUTER_ADDRESS", "0x00000000000000000000000000000000000000aa"),
        ]))
        .unwrap();

        assert_eq!(config.n2n.get(N2nContract::SequencePathRouter), router);
        assert_eq!(
            config.n2n.get(N2nContract::NiasRegistry),
            N2nContract::NiasRegistry.default_address()
        );
        assert_eq!(config.stream, StreamAddresses::default());
    }

    #[test]
    fn core_address_defaults_to_sepolia_deployment() {
        let base = [("INFURA_PROJECT_ID", "abc"), ("PRIVATE_KEY", KEY)];
        let config = ChainConfig::from_lookup(lookup(&base)).unwrap();
        assert_eq!(config.core, DEFAULT_CORE_ADDRESS);

        let config = ChainConfig::from_lookup(lookup(&[
            base[0],
            base[1],
            ("STREBACOM_CORE_ADDRESS", "0x00000000000000000000000000000000000000cc"),
        ]))
        .unwrap();
        assert_eq!(config.core, address!("00000000000000000000000000000000000000cc"));
    }

    #[test]
    fn bad_address_names_the_variable() {
        let err = ChainConfig::from_lookup(lookup(&[
            ("INFURA_PROJECT_ID", "abc"),
            ("PRIVATE_KEY", KEY),
            ("STREAM_PROCESSOR_ADDRESS", "not-an-address"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("STREAM_PROCESSOR_ADDRESS"));
    }

    #[test]
    fn debug_output_redacts_url_path() {
        let config = ChainConfig::from_lookup(lookup(&[
            ("INFURA_PROJECT_ID", "secret-project"),
            ("PRIVATE_KEY", KEY),
        ]))
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-project"));
        assert!(!debug.contains(KEY));
    }
}
