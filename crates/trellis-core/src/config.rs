use std::env;
use std::str::FromStr;

/// Tunables of a [`Reconciler`](crate::Reconciler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    max_pending_updates: usize,
    property_failure_limit: Option<usize>,
    retry_failed_writes: bool,
    validate_props: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_pending_updates: 100,
            property_failure_limit: None,
            retry_failed_writes: true,
            validate_props: false,
        }
    }
}

impl ReconcilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TRELLIS_MAX_PENDING_UPDATES`,
    /// `TRELLIS_PROPERTY_FAILURE_LIMIT` and `TRELLIS_VALIDATE_PROPS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(limit) = read_var(&lookup, "TRELLIS_MAX_PENDING_UPDATES") {
            config.max_pending_updates = limit;
        }
        if let Some(limit) = read_var(&lookup, "TRELLIS_PROPERTY_FAILURE_LIMIT") {
            config.property_failure_limit = Some(limit);
        }
        if let Some(validate) = read_var::<bool>(&lookup, "TRELLIS_VALIDATE_PROPS") {
            config.validate_props = validate;
        }
        config
    }

    /// Re-renders one component may trigger from its own lifecycle hooks
    /// before the cascade is aborted.
    pub fn with_max_pending_updates(mut self, limit: usize) -> Self {
        self.max_pending_updates = limit;
        self
    }

    /// Fail a property batch once more than `limit` writes are still
    /// rejected after the retry pass.
    pub fn with_property_failure_limit(mut self, limit: Option<usize>) -> Self {
        self.property_failure_limit = limit;
        self
    }

    pub fn with_retry_failed_writes(mut self, retry: bool) -> Self {
        self.retry_failed_writes = retry;
        self
    }

    pub fn with_validate_props(mut self, validate: bool) -> Self {
        self.validate_props = validate;
        self
    }

    pub fn max_pending_updates(&self) -> usize {
        self.max_pending_updates
    }

    pub fn property_failure_limit(&self) -> Option<usize> {
        self.property_failure_limit
    }

    pub fn retry_failed_writes(&self) -> bool {
        self.retry_failed_writes
    }

    pub fn validate_props(&self) -> bool {
        self.validate_props
    }
}

fn read_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {name}={raw:?}: not a valid value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = ReconcilerConfig::new()
            .with_max_pending_updates(3)
            .with_property_failure_limit(Some(0))
            .with_validate_props(true);
        assert_eq!(config.max_pending_updates(), 3);
        assert_eq!(config.property_failure_limit(), Some(0));
        assert!(config.retry_failed_writes());
        assert!(config.validate_props());
    }

    #[test]
    fn variables_override_defaults_and_bad_values_are_ignored() {
        let vars = [
            ("TRELLIS_MAX_PENDING_UPDATES", " 7 "),
            ("TRELLIS_VALIDATE_PROPS", "yes please"),
        ];
        let config = ReconcilerConfig::from_lookup(|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        });
        assert_eq!(config.max_pending_updates(), 7);
        assert!(!config.validate_props());
        assert_eq!(config.property_failure_limit(), None);
    }

    #[test]
    fn no_variables_means_defaults() {
        assert_eq!(ReconcilerConfig::from_lookup(|_| None), ReconcilerConfig::default());
    }
}
