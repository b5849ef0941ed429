//! HTTP custodian client
//!
//! JSON over HTTPS against the provider's REST API. Idempotency keys travel
//! in the `Idempotency-Key` header.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Balance, Custodian, CustodianError};
use crate::config::CustodianConfig;
use crate::core_types::AssetType;

pub struct HttpCustodian {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct CreateVaultBody<'a> {
    asset: &'a str,
}

#[derive(Deserialize)]
struct VaultResponse {
    address: String,
}

#[derive(Serialize)]
struct TransferBody<'a> {
    asset: &'a str,
    source: &'a str,
    destination: &'a str,
    amount: Decimal,
}

#[derive(Deserialize)]
struct TransferResponse {
    tx_id: String,
}

#[derive(Serialize)]
struct ValidateBody<'a> {
    asset: &'a str,
    address: &'a str,
}

#[derive(Deserialize)]
struct ValidateResponse {
    valid: bool,
}

impl HttpCustodian {
    pub fn new(config: &CustodianConfig) -> Result<Self, CustodianError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| CustodianError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, CustodianError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Custodian rejected request: {}", message);
            return Err(CustodianError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| CustodianError::Decode(e.to_string()))
    }
}

fn network(e: reqwest::Error) -> CustodianError {
    CustodianError::Network(e.to_string())
}

#[async_trait]
impl Custodian for HttpCustodian {
    async fn create_vault(
        &self,
        asset: AssetType,
        idempotency_key: &str,
    ) -> Result<String, CustodianError> {
        debug!(asset = %asset, key = idempotency_key, "Creating escrow vault");
        let response = self
            .client
            .post(self.url("/v1/vaults"))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(&CreateVaultBody {
                asset: asset.as_str(),
            })
            .send()
            .await
            .map_err(network)?;

        let vault: VaultResponse = Self::read(response).await?;
        Ok(vault.address)
    }

    async fn get_balance(&self, asset: AssetType, address: &str) -> Result<Balance, CustodianError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/vaults/{}/{}/balance", asset.as_str(), address)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(network)?;

        Self::read(response).await
    }

    async fn transfer(
        &self,
        asset: AssetType,
        source: &str,
        destination: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<String, CustodianError> {
        debug!(asset = %asset, key = idempotency_key, amount = %amount, "Submitting custodian transfer");
        let response = self
            .client
            .post(self.url("/v1/transfers"))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(&TransferBody {
                asset: asset.as_str(),
                source,
                destination,
                amount,
            })
            .send()
            .await
            .map_err(network)?;

        let transfer: TransferResponse = Self::read(response).await?;
        Ok(transfer.tx_id)
    }

    async fn validate_address(
        &self,
        asset: AssetType,
        address: &str,
    ) -> Result<bool, CustodianError> {
        let response = self
            .client
            .post(self.url("/v1/addresses/validate"))
            .bearer_auth(&self.api_key)
            .json(&ValidateBody {
                asset: asset.as_str(),
                address,
            })
            .send()
            .await
            .map_err(network)?;

        let result: ValidateResponse = Self::read(response).await?;
        Ok(result.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let custodian = HttpCustodian::new(&CustodianConfig {
            base_url: "https://custody.example/".into(),
            api_key: "k".into(),
            timeout_ms: 1_000,
        })
        .unwrap();
        assert_eq!(
            custodian.url("/v1/vaults"),
            "https://custody.example/v1/vaults"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let custodian = HttpCustodian::new(&CustodianConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: "k".into(),
            timeout_ms: 500,
        })
        .unwrap();
        let err = custodian
            .get_balance(AssetType::Btc, "bc1qxyz")
            .await
            .unwrap_err();
        assert!(matches!(err, CustodianError::Network(_)));
    }
}
