//! N2N routing registries.
//!
//! The experiments only check that these contracts are live, so the binding is limited to
//! the `Ownable` surface every one of them inherits.

use alloy_primitives::{Address, address};
use alloy_sol_types::sol;
use serde::Serialize;

use crate::{ChainClient, ChainResult};

sol! {
    /// OpenZeppelin `Ownable` view.
    #[sol(rpc)]
    interface Ownable {
        function owner() external view returns (address);
    }
}

/// The N2N contracts deployed on Sepolia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum N2nContract {
    /// Application-to-control-plane translation layer.
    AbatlTranslation,
    /// Registry of N2N autonomous-system identifiers.
    NiasRegistry,
    /// Registry of N2N device identifiers.
    NidRegistry,
    /// Precomputed sequence path router.
    SequencePathRouter,
    /// Node clustering contract.
    Clustering,
}

impl N2nContract {
    /// Every contract, in inspection order.
    pub const ALL: [Self; 5] = [
        Self::AbatlTranslation,
        Self::NiasRegistry,
        Self::NidRegistry,
        Self::SequencePathRouter,
        Self::Clustering,
    ];

    /// Human-readable contract name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::AbatlTranslation => "ABATLTranslation",
            Self::NiasRegistry => "NIASRegistry",
            Self::NidRegistry => "NIDRegistry",
            Self::SequencePathRouter => "SequencePathRouter",
            Self::Clustering => "ClusteringContract",
        }
    }

    /// Environment variable overriding the address.
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::AbatlTranslation => "ABATL_ADDRESS",
            Self::NiasRegistry => "NIAS_REGISTRY_ADDRESS",
            Self::NidRegistry => "NID_REGISTRY_ADDRESS",
            Self::SequencePathRouter => "SEQUENCE_ROUTER_ADDRESS",
            Self::Clustering => "CLUSTERING_ADDRESS",
        }
    }

    /// Sepolia deployment address.
    pub const fn default_address(self) -> Address {
        match self {
            Self::AbatlTranslation => address!("c6b5e094dc85792dd804eaa3669236d840434709"),
            Self::NiasRegistry => address!("5e8a8bf9cadf65f33ccf220bf5540390e73b26a5"),
            Self::NidRegistry => address!("3e8d9276a878b418b5169726ffa3de21d7376770"),
            Self::SequencePathRouter => address!("b0283be5775547dfacf1d41ab19d7d22e940505b"),
            Self::Clustering => address!("a7f137dd6868efe746a72e6e09dda73fac203a00"),
        }
    }
}

/// Outcome of checking one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContractStatus {
    /// Which contract was inspected.
    pub contract: N2nContract,
    /// Address inspected.
    pub address: Address,
    /// Whether bytecode exists at the address.
    pub deployed: bool,
    /// Result of `owner()`, if the call succeeded.
    pub owner: Option<Address>,
}

impl ContractStatus {
    /// A contract counts as accessible when it is deployed and answers `owner()`.
    pub const fn accessible(&self) -> bool {
        self.deployed && self.owner.is_some()
    }
}

/// Checks that `contract` is deployed at `address` and answers a view call.
///
/// Transport failures are errors; a failing `owner()` call is recorded as `owner: None`.
pub async fn inspect_contract(
    client: &ChainClient,
    contract: N2nContract,
    address: Address,
) -> ChainResult<ContractStatus> {
    let deployed = client.is_deployed(address).await?;

    let owner = if deployed {
        match Ownable::new(address, client.provider().clone()).owner().call().await {
            Ok(owner) => Some(owner),
            Err(e) => {
                tracing::warn!(contract = contract.name(), %address, error = %e, "owner() call failed");
                None
            }
        }
    } else {
        None
    };

    tracing::debug!(contract = contract.name(), %address, deployed, ?owner, "Inspected contract");

    Ok(ContractStatus { contract, address, deployed, owner })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn contract_metadata_is_unique() {
        let names: HashSet<_> = N2nContract::ALL.iter().map(|c| c.name()).collect();
        let vars: HashSet<_> = N2nContract::ALL.iter().map(|c| c.env_var()).collect();
        let addrs: HashSet<_> = N2nContract::ALL.iter().map(|c| c.default_address()).collect();

        assert_eq!(names.len(), N2nContract::ALL.len());
        assert_eq!(vars.len(), N2nContract::ALL.len());
        assert_eq!(addrs.len(), N2nContract::ALL.len());
    }

    #[test]
    fn accessibility_requires_owner() {
        let mut status = ContractStatus {
            contract: N2nContract::NidRegistry,
            address: N2nContract::NidRegistry.default_address(),
            deployed: true,
            owner: None,
        };
        assert!(!status.accessible());

        status.owner = Some(Address::ZERO);
        assert!(status.accessible());

        status.deployed = false;
        assert!(!status.accessible());
    }
}
