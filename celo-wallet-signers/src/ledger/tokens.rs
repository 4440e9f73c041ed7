//! Registry of token contracts the Ledger app can render natively.
//!
//! When a transaction touches one of these contracts (as destination or as
//! fee currency), the signer pre-loads the token metadata so the device
//! displays `10.5 cUSD` instead of raw calldata. Purely a UX affordance;
//! lookups that miss simply leave the device showing hex.

use celo_wallet_core::types::{Address, H160};
use semver::Version;

const MAINNET: u64 = 42220;
const ALFAJORES: u64 = 44787;

/// ERC-20 metadata as the device expects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenInfo {
    pub ticker: &'static str,
    pub contract_address: Address,
    pub chain_id: u64,
    pub decimals: u8,
}

// 0x471ece3750da237f93b8e339c536989b8978a438
const CELO_MAINNET: Address = H160([
    0x47, 0x1e, 0xce, 0x37, 0x50, 0xda, 0x23, 0x7f, 0x93, 0xb8, 0xe3, 0x39, 0xc5, 0x36, 0x98,
    0x9b, 0x89, 0x78, 0xa4, 0x38,
]);
// 0x765de816845861e75a25fca122bb6898b8b1282a
const CUSD_MAINNET: Address = H160([
    0x76, 0x5d, 0xe8, 0x16, 0x84, 0x58, 0x61, 0xe7, 0x5a, 0x25, 0xfc, 0xa1, 0x22, 0xbb, 0x68,
    0x98, 0xb8, 0xb1, 0x28, 0x2a,
]);
// 0xd8763cba276a3738e6de85b4b3bf5fded6d6ca73
const CEUR_MAINNET: Address = H160([
    0xd8, 0x76, 0x3c, 0xba, 0x27, 0x6a, 0x37, 0x38, 0xe6, 0xde, 0x85, 0xb4, 0xb3, 0xbf, 0x5f,
    0xde, 0xd6, 0xd6, 0xca, 0x73,
]);
// 0xf194afdf50b03e69bd7d057c1aa9e10c9954e4c9
const CELO_ALFAJORES: Address = H160([
    0xf1, 0x94, 0xaf, 0xdf, 0x50, 0xb0, 0x3e, 0x69, 0xbd, 0x7d, 0x05, 0x7c, 0x1a, 0xa9, 0xe1,
    0x0c, 0x99, 0x54, 0xe4, 0xc9,
]);
// 0x874069fa1eb16d44d622f2e0ca25eea172369bc1
const CUSD_ALFAJORES: Address = H160([
    0x87, 0x40, 0x69, 0xfa, 0x1e, 0xb1, 0x6d, 0x44, 0xd6, 0x22, 0xf2, 0xe0, 0xca, 0x25, 0xee,
    0xa1, 0x72, 0x36, 0x9b, 0xc1,
]);
// 0x10c892a6ec43a53e45d0b916b4b7d383b1b78c0f
const CEUR_ALFAJORES: Address = H160([
    0x10, 0xc8, 0x92, 0xa6, 0xec, 0x43, 0xa5, 0x3e, 0x45, 0xd0, 0xb9, 0x16, 0xb4, 0xb7, 0xd3,
    0x83, 0xb1, 0xb7, 0x8c, 0x0f,
]);

const KNOWN_TOKENS: [TokenInfo; 6] = [
    TokenInfo { ticker: "CELO", contract_address: CELO_MAINNET, chain_id: MAINNET, decimals: 18 },
    TokenInfo { ticker: "cUSD", contract_address: CUSD_MAINNET, chain_id: MAINNET, decimals: 18 },
    TokenInfo { ticker: "cEUR", contract_address: CEUR_MAINNET, chain_id: MAINNET, decimals: 18 },
    TokenInfo {
        ticker: "CELO",
        contract_address: CELO_ALFAJORES,
        chain_id: ALFAJORES,
        decimals: 18,
    },
    TokenInfo {
        ticker: "cUSD",
        contract_address: CUSD_ALFAJORES,
        chain_id: ALFAJORES,
        decimals: 18,
    },
    TokenInfo {
        ticker: "cEUR",
        contract_address: CEUR_ALFAJORES,
        chain_id: ALFAJORES,
        decimals: 18,
    },
];

/// Looks up a known token by contract address and chain id.
pub fn token_info_by_address_and_chain_id(
    address: Address,
    chain_id: u64,
) -> Option<&'static TokenInfo> {
    KNOWN_TOKENS
        .iter()
        .find(|token| token.contract_address == address && token.chain_id == chain_id)
}

/// The Celo app understands ERC-20 metadata starting with this release.
pub fn accepts_contract_data(app_version: &Version) -> bool {
    *app_version >= Version::new(1, 0, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_respects_chain_id() {
        let mainnet_cusd: Address =
            "765de816845861e75a25fca122bb6898b8b1282a".parse().unwrap();
        let token = token_info_by_address_and_chain_id(mainnet_cusd, MAINNET).unwrap();
        assert_eq!(token.ticker, "cUSD");

        // same address on the wrong chain misses
        assert!(token_info_by_address_and_chain_id(mainnet_cusd, ALFAJORES).is_none());
        assert!(token_info_by_address_and_chain_id(Address::zero(), MAINNET).is_none());
    }

    #[test]
    fn contract_data_version_gate() {
        assert!(!accepts_contract_data(&Version::new(0, 0, 0)));
        assert!(!accepts_contract_data(&Version::new(1, 0, 1)));
        assert!(accepts_contract_data(&Version::new(1, 0, 2)));
        assert!(accepts_contract_data(&Version::new(1, 2, 0)));
    }
}
