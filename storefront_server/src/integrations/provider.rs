//! REST client for the hosted payment provider.
//!
//! Implements [`PaymentProvider`] over the provider's payment-intent API: create an intent tagged with
//! `{order_id, buyer_id}` metadata, query an intent's authoritative status, and search intents by order metadata
//! for the reconciliation sweep. The API secret rides along as a bearer token on every call.
use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    StatusCode,
};
use serde::Deserialize;
use storefront_common::{Cents, STORE_CURRENCY_CODE_LOWER};
use storefront_engine::{
    db_types::OrderId,
    traits::{IntentStatus, PaymentIntent, PaymentProvider, ProviderError},
};

use crate::config::ProviderConfig;

#[derive(Clone)]
pub struct HostedCheckoutClient {
    config: ProviderConfig,
    client: Arc<Client>,
}

#[derive(Debug, Clone, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
    #[serde(default)]
    last_payment_error: Option<IntentError>,
}

#[derive(Debug, Clone, Deserialize)]
struct IntentError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IntentSearchResponse {
    #[serde(default)]
    data: Vec<IntentResponse>,
}

impl HostedCheckoutClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| ProviderError::Request(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client =
            Client::builder().default_headers(headers).build().map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    fn map_status(intent: &IntentResponse) -> IntentStatus {
        match intent.status.as_str() {
            "succeeded" => IntentStatus::Succeeded,
            "canceled" => IntentStatus::Failed { reason: "payment was canceled".to_string() },
            // a failed attempt drops the intent back to requires_payment_method with the error attached
            "requires_payment_method" if intent.last_payment_error.is_some() => {
                let reason = intent
                    .last_payment_error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .unwrap_or_else(|| "payment failed".to_string());
                IntentStatus::Failed { reason }
            },
            other => {
                trace!("💳️ Intent {} has non-terminal status {other}", intent.id);
                IntentStatus::Pending
            },
        }
    }
}

impl PaymentProvider for HostedCheckoutClient {
    async fn create_intent(
        &self,
        order_id: &OrderId,
        buyer_id: &str,
        amount: Cents,
    ) -> Result<PaymentIntent, ProviderError> {
        let body = serde_json::json!({
            "amount": amount.value(),
            "currency": STORE_CURRENCY_CODE_LOWER,
            "metadata": { "order_id": order_id.as_str(), "buyer_id": buyer_id },
        });
        let response = self
            .client
            .post(self.url("/v1/payment_intents"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!("intent creation returned {}", response.status())));
        }
        let intent: IntentResponse = response.json().await.map_err(|e| ProviderError::Decode(e.to_string()))?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| ProviderError::Decode("intent response carried no client secret".to_string()))?;
        debug!("💳️ Provider created intent {} for order {order_id}", intent.id);
        Ok(PaymentIntent { intent_id: intent.id, client_secret })
    }

    async fn fetch_intent(&self, intent_id: &str) -> Result<IntentStatus, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{intent_id}")))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::IntentNotFound(intent_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!("intent query returned {}", response.status())));
        }
        let intent: IntentResponse = response.json().await.map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(Self::map_status(&intent))
    }

    async fn find_intent_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<(String, IntentStatus)>, ProviderError> {
        let query = format!("metadata['order_id']:'{}'", order_id.as_str());
        let response = self
            .client
            .get(self.url("/v1/payment_intents/search"))
            .query(&[("query", query.as_str()), ("limit", "1")])
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!("intent search returned {}", response.status())));
        }
        let found: IntentSearchResponse = response.json().await.map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(found.data.first().map(|intent| (intent.id.clone(), Self::map_status(intent))))
    }
}
