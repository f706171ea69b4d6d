mod pricing;

pub use pricing::{order_total, tax_on, within_tolerance, AMOUNT_TOLERANCE, TAX_RATE_PERCENT};

use crate::db_types::{ProductId, VariantChoice};

/// Builds the cart map key for a product and optional variant selection. The same product in two different variants
/// occupies two cart slots.
pub fn cart_key(product_id: &ProductId, variant: Option<&VariantChoice>) -> String {
    match variant {
        Some(v) => format!("{}::{}", product_id.as_str(), v.value),
        None => product_id.as_str().to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cart_keys_distinguish_variants() {
        let pid = ProductId::from("prd-1");
        let red = VariantChoice { name: "Color".into(), value: "red".into() };
        let blue = VariantChoice { name: "Color".into(), value: "blue".into() };
        assert_eq!(cart_key(&pid, None), "prd-1");
        assert_ne!(cart_key(&pid, Some(&red)), cart_key(&pid, Some(&blue)));
    }
}
