mod hmac;
mod identity;

pub use hmac::HmacMiddlewareFactory;
pub use identity::VerifiedUser;

/// The header the payment provider carries its body signature in.
pub const PAYMENT_SIGNATURE_HEADER: &str = "X-Payment-Signature";
