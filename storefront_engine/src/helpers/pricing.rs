use storefront_common::Cents;

/// Tax applied at checkout, as a percentage of the pre-tax sum.
pub const TAX_RATE_PERCENT: i64 = 2;

/// Client-estimated totals may diverge from the server-computed total by at most this many minor units.
pub const AMOUNT_TOLERANCE: i64 = 1;

/// Tax on a pre-tax subtotal, floored to an integer minor unit.
pub fn tax_on(subtotal: Cents) -> Cents {
    Cents::from(subtotal.value() * TAX_RATE_PERCENT / 100)
}

/// The total charge for a pre-tax subtotal.
pub fn order_total(subtotal: Cents) -> Cents {
    subtotal + tax_on(subtotal)
}

/// Whether a client-supplied estimate is close enough to the server-computed total to accept the checkout.
pub fn within_tolerance(server_amount: Cents, client_amount: Cents) -> bool {
    server_amount.diff(client_amount) <= AMOUNT_TOLERANCE
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tax_is_floored() {
        // 2% of 100 cents is exactly 2
        assert_eq!(tax_on(Cents::from(100)), Cents::from(2));
        // 2% of 99 is 1.98, floored to 1
        assert_eq!(tax_on(Cents::from(99)), Cents::from(1));
        // 2% of 49 is 0.98, floored to 0
        assert_eq!(tax_on(Cents::from(49)), Cents::from(0));
        assert_eq!(order_total(Cents::from(10_000)), Cents::from(10_200));
    }

    #[test]
    fn tolerance_is_one_unit() {
        let server = Cents::from(100);
        assert!(within_tolerance(server, Cents::from(100)));
        assert!(within_tolerance(server, Cents::from(101)));
        assert!(within_tolerance(server, Cents::from(99)));
        assert!(!within_tolerance(server, Cents::from(102)));
        assert!(!within_tolerance(server, Cents::from(105)));
    }
}
