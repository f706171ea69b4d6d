use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use storefront_common::Cents;
use storefront_engine::{
    db_types::OrderId,
    traits::{IntentStatus, PaymentIntent, PaymentProvider, ProviderError},
};

/// A programmable stand-in for the hosted payment provider.
#[derive(Clone, Default)]
pub struct MockProvider {
    intents: Arc<Mutex<HashMap<String, IntentStatus>>>,
    by_order: Arc<Mutex<HashMap<String, String>>>,
}

impl MockProvider {
    pub fn set_intent(&self, order_id: &OrderId, intent_id: &str, status: IntentStatus) {
        self.intents.lock().unwrap().insert(intent_id.to_string(), status);
        self.by_order.lock().unwrap().insert(order_id.as_str().to_string(), intent_id.to_string());
    }
}

impl PaymentProvider for MockProvider {
    async fn create_intent(
        &self,
        order_id: &OrderId,
        _buyer_id: &str,
        _amount: Cents,
    ) -> Result<PaymentIntent, ProviderError> {
        let intent_id = format!("pi_{}", rand::random::<u32>());
        self.set_intent(order_id, &intent_id, IntentStatus::Pending);
        Ok(PaymentIntent { intent_id: intent_id.clone(), client_secret: format!("{intent_id}_secret") })
    }

    async fn fetch_intent(&self, intent_id: &str) -> Result<IntentStatus, ProviderError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| ProviderError::IntentNotFound(intent_id.to_string()))
    }

    async fn find_intent_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<(String, IntentStatus)>, ProviderError> {
        let by_order = self.by_order.lock().unwrap();
        let Some(intent_id) = by_order.get(order_id.as_str()) else {
            return Ok(None);
        };
        let status = self.intents.lock().unwrap().get(intent_id).cloned();
        Ok(status.map(|s| (intent_id.clone(), s)))
    }
}
