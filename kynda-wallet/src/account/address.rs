//! Address validation and formatting

use crate::error::{Error, Result};
use crate::network::ChainFamily;

/// Check whether an address is well-formed for a chain family
pub fn validate_address(address: &str, family: ChainFamily) -> Result<bool> {
    match family {
        ChainFamily::Evm => {
            // 0x followed by 20 bytes of hex
            let Some(body) = address.strip_prefix("0x") else {
                return Ok(false);
            };
            if body.len() != 40 {
                return Ok(false);
            }

            match hex::decode(body) {
                Ok(bytes) => Ok(bytes.len() == 20),
                Err(_) => Ok(false),
            }
        }
        ChainFamily::Solana => {
            // Base58 encoding of a 32-byte public key
            if address.len() < 32 || address.len() > 44 {
                return Ok(false);
            }

            match bs58::decode(address).into_vec() {
                Ok(bytes) => Ok(bytes.len() == 32),
                Err(_) => Ok(false),
            }
        }
    }
}

/// Check a recipient address, returning it trimmed
///
/// Only emptiness is rejected unless `family` is given, in which case the
/// address must also be well-formed for that family.
pub fn require_address(address: &str, family: Option<ChainFamily>) -> Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(Error::InvalidInput("recipient address is empty".to_string()));
    }
    if let Some(family) = family {
        if !validate_address(address, family)? {
            return Err(Error::InvalidInput(format!("{} is not a valid {:?} address", address, family)));
        }
    }
    Ok(address.to_string())
}

/// Shorten an address for display, e.g. `0x742d...f44e`
pub fn format_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ethereum_address() {
        // Valid Ethereum address
        assert!(validate_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e", ChainFamily::Evm).unwrap());

        // Invalid Ethereum addresses
        assert!(!validate_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44", ChainFamily::Evm).unwrap()); // Too short
        assert!(!validate_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e1", ChainFamily::Evm).unwrap()); // Too long
        assert!(!validate_address("742d35Cc6634C0532925a3b844Bc454e4438f44e", ChainFamily::Evm).unwrap()); // Missing 0x
        assert!(!validate_address("0xZZZd35Cc6634C0532925a3b844Bc454e4438f44e", ChainFamily::Evm).unwrap()); // Invalid hex
    }

    #[test]
    fn test_validate_solana_address() {
        assert!(validate_address("vines1vzrYbzLMRdu58ou5XTby4qAqVRLmqo36NKPTg", ChainFamily::Solana).unwrap());
        assert!(validate_address("11111111111111111111111111111111", ChainFamily::Solana).unwrap());

        assert!(!validate_address("vines1vzrYbzLMRdu58ou5XTby4qAqVRLmqo36NKP", ChainFamily::Solana).unwrap()); // Too short
        assert!(!validate_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e", ChainFamily::Solana).unwrap()); // Not base58
    }

    #[test]
    fn test_require_address() {
        assert_eq!(
            require_address("  0x742d35Cc6634C0532925a3b844Bc454e4438f44e ", Some(ChainFamily::Evm)).unwrap(),
            "0x742d35Cc6634C0532925a3b844Bc454e4438f44e"
        );
        assert!(matches!(require_address("   ", None), Err(Error::InvalidInput(_))));
        assert!(matches!(require_address("0xabc", Some(ChainFamily::Evm)), Err(Error::InvalidInput(_))));

        // Lenient mode leaves well-formedness to the wallet
        assert_eq!(require_address("0xabc", None).unwrap(), "0xabc");
    }

    #[test]
    fn test_format_address() {
        assert_eq!(format_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e"), "0x742d...f44e");
        assert_eq!(format_address("0xabc"), "0xabc");
    }
}
