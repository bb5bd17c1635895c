use crate::error::{Error, Result};
use std::time::Duration;

const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Config {
    pub pool_name: String,
    pub pool_size: Option<usize>,
    pub max_idle_time: Duration,
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_name: "tidepool".to_string(),
            pool_size: None,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
            stack_size: None,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.pool_size {
            if n == 0 {
                return Err(Error::config("pool_size must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("pool_size too large (max 1024)"));
            }
        }

        if self.max_idle_time.is_zero() {
            return Err(Error::config("max_idle_time must be > 0"));
        }

        if self.pool_name.is_empty() {
            return Err(Error::config("pool_name must not be empty"));
        }

        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.pool_size.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn pool_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.pool_name = name.into();
        self
    }

    pub fn pool_size(mut self, n: usize) -> Self {
        self.config.pool_size = Some(n);
        self
    }

    pub fn max_idle_time(mut self, d: Duration) -> Self {
        self.config.max_idle_time = d;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_threads() >= 1);
        assert_eq!(config.max_idle_time, DEFAULT_MAX_IDLE_TIME);
    }

    #[test]
    fn test_rejects_zero_workers() {
        let result = Config::builder().pool_size(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_idle_time() {
        let result = Config::builder().max_idle_time(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .pool_name("p")
            .pool_size(4)
            .max_idle_time(Duration::from_millis(100))
            .build()
            .unwrap();

        assert_eq!(config.pool_name, "p");
        assert_eq!(config.worker_threads(), 4);
    }
}
