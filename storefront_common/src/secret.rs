use std::{
    fmt,
    fmt::{Debug, Display},
};

/// A wrapper for credentials (API keys, webhook signing secrets) that redacts itself in Debug and Display output,
/// so a stray `{config:?}` in a log line never leaks a secret. Access to the inner value is explicit via
/// [`Secret::reveal`].
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn secrets_redact_themselves() {
        let secret = Secret::new("whsec_123".to_string());
        assert_eq!(format!("{secret}"), "****");
        assert_eq!(format!("{secret:?}"), "****");
        assert_eq!(secret.reveal(), "whsec_123");
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
