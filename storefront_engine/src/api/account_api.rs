use log::*;

use crate::{
    api::errors::OrderFlowError,
    db_types::{Address, CartItem, CartItems, NewAddress},
    helpers::cart_key,
    traits::StorefrontDatabase,
};

/// Buyer-profile API: carts and shipping addresses. The cart is owned exclusively by its buyer; nothing here ever
/// touches another user's data.
pub struct AccountApi<B> {
    db: B,
}

impl<B> AccountApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> AccountApi<B>
where B: StorefrontDatabase
{
    pub async fn cart(&self, user_id: &str) -> Result<CartItems, OrderFlowError> {
        Ok(self.db.fetch_cart(user_id).await?)
    }

    /// Replaces the buyer's cart with the given items. Entries are re-keyed server-side from their product and
    /// variant, so a client cannot smuggle mismatched keys; quantity zero entries are kept (the buyer parked the
    /// item), per the storefront's cart semantics.
    pub async fn update_cart(&self, user_id: &str, items: Vec<CartItem>) -> Result<CartItems, OrderFlowError> {
        let mut cart = CartItems::new();
        for item in items {
            let key = cart_key(&item.product_id, item.selected_variant.as_ref());
            cart.insert(key, item);
        }
        self.db.put_cart(user_id, &cart).await?;
        debug!("🛒️ Cart for {user_id} now has {} entries", cart.len());
        Ok(cart)
    }

    pub async fn add_address(&self, user_id: &str, address: NewAddress) -> Result<Address, OrderFlowError> {
        if address.full_name.trim().is_empty() || address.phone.trim().is_empty() {
            return Err(OrderFlowError::Validation("address needs a recipient name and phone number".to_string()));
        }
        Ok(self.db.insert_address(user_id, address).await?)
    }

    pub async fn addresses(&self, user_id: &str) -> Result<Vec<Address>, OrderFlowError> {
        Ok(self.db.fetch_addresses_for_user(user_id).await?)
    }
}
