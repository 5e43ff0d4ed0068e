//! Registry of the contracts a trade can be posted to, and the functions each
//! contract supports.

use crate::{constants::DEFAULT_CONTRACT, types::transaction::Function, IndError};

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, str::FromStr};

/// Contract registry file format.
///
/// ```toml
/// [[contract]]
/// name = "Trade"
///
/// [[contract.function]]
/// name = "updateData"
/// params = ["symmetricKeyIndex", "tradeDate", "product", "qty", "price"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct ContractsConfig {
    #[serde(rename = "contract", default)]
    pub contracts: Vec<ContractConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct ContractConfig {
    pub name: String,
    #[serde(rename = "function", default)]
    pub functions: Vec<FunctionConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct FunctionConfig {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        let function = |name: &str, params: &[&str]| FunctionConfig {
            name: name.to_string(),
            params: params.iter().map(|param| param.to_string()).collect(),
        };
        Self {
            contracts: vec![ContractConfig {
                name: DEFAULT_CONTRACT.to_string(),
                functions: vec![
                    function(
                        "updateData",
                        &["symmetricKeyIndex", "tradeDate", "product", "qty", "price"],
                    ),
                    function("updatePaymentInfo", &["symmetricKeyIndex", "paymentTerm"]),
                ],
            }],
        }
    }
}

impl ContractsConfig {
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self, IndError> {
        let config_string = std::fs::read_to_string(&config_path)?;
        Self::from_str(&config_string)
    }
}

impl FromStr for ContractsConfig {
    type Err = IndError;

    fn from_str(config_string: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(config_string)?)
    }
}

/// Lookup structure built from a [`ContractsConfig`].
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: HashMap<String, Vec<Function>>,
}

impl ContractRegistry {
    /// The function `function` of `contract`, with its parameters.
    pub fn function(&self, contract: &str, function: &str) -> Result<&Function, IndError> {
        let functions = self
            .contracts
            .get(contract)
            .ok_or_else(|| IndError::UnknownContract(contract.to_string()))?;
        functions
            .iter()
            .find(|known| known.name == function)
            .ok_or_else(|| IndError::UnsupportedOperation {
                contract: contract.to_string(),
                function: function.to_string(),
            })
    }

    pub fn contains(&self, contract: &str) -> bool {
        self.contracts.contains_key(contract)
    }
}

impl From<ContractsConfig> for ContractRegistry {
    fn from(config: ContractsConfig) -> Self {
        let contracts = config
            .contracts
            .into_iter()
            .map(|contract| {
                let functions = contract
                    .functions
                    .into_iter()
                    .map(|function| Function {
                        name: function.name,
                        params: function.params,
                    })
                    .collect();
                (contract.name, functions)
            })
            .collect();
        Self { contracts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_str() {
        let config_str = r#"
            [[contract]]
            name = "Trade"

            [[contract.function]]
            name = "updateData"
            params = ["symmetricKeyIndex", "price"]

            [[contract]]
            name = "Payment"
        "#;

        let config = ContractsConfig::from_str(config_str).unwrap();
        assert_eq!(config.contracts.len(), 2);
        assert_eq!(config.contracts[0].functions[0].params.len(), 2);
        assert!(config.contracts[1].functions.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let config_str = r#"
            [[contract]]
            name = "Trade"
            owner = "someone"
        "#;
        assert!(ContractsConfig::from_str(config_str).is_err());
    }

    #[test]
    fn default_registry_knows_the_trade_contract() {
        let registry = ContractRegistry::from(ContractsConfig::default());
        assert!(registry.contains("Trade"));
        assert_eq!(
            registry.function("Trade", "updatePaymentInfo").unwrap().params,
            vec!["symmetricKeyIndex", "paymentTerm"]
        );
        assert!(matches!(
            registry.function("Trade", "selfDestruct"),
            Err(IndError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            registry.function("Escrow", "updateData"),
            Err(IndError::UnknownContract(_))
        ));
    }
}
