use crate::error::RegistryError;

/// Environment variable that turns on leak mode in [`RegistryConfig::from_env`].
pub const LEAK_ENV_VAR: &str = "NDRT_BUFFER_LEAK";

/// Configuration of a [`HandleRegistry`](crate::HandleRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistryConfig {
    /// Number of entries the table reserves up front. Growth beyond it is
    /// amortized by the table.
    pub initial_capacity: usize,
    /// Keep surviving tensors alive at teardown so outstanding handles can be
    /// inspected instead of force-releasing them.
    pub leak_on_teardown: bool,
}

impl RegistryConfig {
    /// Default number of reserved entries.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] if `initial_capacity` is zero.
    pub fn new(initial_capacity: usize, leak_on_teardown: bool) -> Result<Self, RegistryError> {
        if initial_capacity == 0 {
            return Err(RegistryError::InvalidConfig(
                "initial_capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            initial_capacity,
            leak_on_teardown,
        })
    }

    /// Default configuration with leak mode taken from `NDRT_BUFFER_LEAK`.
    ///
    /// Any value of the variable enables leak mode.
    pub fn from_env() -> Self {
        Self {
            leak_on_teardown: std::env::var_os(LEAK_ENV_VAR).is_some(),
            ..Self::default()
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: Self::DEFAULT_CAPACITY,
            leak_on_teardown: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() -> Result<(), RegistryError> {
        let config = RegistryConfig::new(8, true)?;
        assert_eq!(config.initial_capacity, 8);
        assert!(config.leak_on_teardown);
        assert!(matches!(
            RegistryConfig::new(0, false),
            Err(RegistryError::InvalidConfig(_))
        ));
        assert_eq!(RegistryConfig::default().initial_capacity, 64);
        Ok(())
    }

    #[cfg(feature = "serde")]
    #[test]
    fn from_json() -> Result<(), Box<dyn std::error::Error>> {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"initial_capacity": 16, "leak_on_teardown": false}"#)?;
        assert_eq!(config, RegistryConfig::new(16, false)?);
        Ok(())
    }
}
