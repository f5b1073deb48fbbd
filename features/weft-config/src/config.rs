use std::{fmt::Display, str::FromStr, time::Duration};

use crate::errors::ConfigError;

/// Prefix of the environment variables read by [`ContainerConfiguration::from_env`]
pub const ENV_PREFIX: &str = "WEFT_";

/// Known configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ConcurrentDeployment,
    ExecutorThreads,
    PreloaderEnabled,
    StrictDiscovery,
    LazyConversationContext,
    ShutdownGracePeriodMs,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 6] = [
        ConfigKey::ConcurrentDeployment,
        ConfigKey::ExecutorThreads,
        ConfigKey::PreloaderEnabled,
        ConfigKey::StrictDiscovery,
        ConfigKey::LazyConversationContext,
        ConfigKey::ShutdownGracePeriodMs,
    ];

    /// Dotted key, e.g. `weft.executor_threads`
    pub fn key(&self) -> &'static str {
        match self {
            ConfigKey::ConcurrentDeployment => "weft.concurrent_deployment",
            ConfigKey::ExecutorThreads => "weft.executor_threads",
            ConfigKey::PreloaderEnabled => "weft.preloader_enabled",
            ConfigKey::StrictDiscovery => "weft.strict_discovery",
            ConfigKey::LazyConversationContext => "weft.lazy_conversation_context",
            ConfigKey::ShutdownGracePeriodMs => "weft.shutdown_grace_period_ms",
        }
    }

    /// Environment variable name, e.g. `WEFT_EXECUTOR_THREADS`
    pub fn env_var(&self) -> String {
        let suffix = self.key().trim_start_matches("weft.").to_ascii_uppercase();
        format!("{ENV_PREFIX}{suffix}")
    }

    pub fn from_key(key: &str) -> Option<ConfigKey> {
        Self::ALL.into_iter().find(|candidate| candidate.key() == key)
    }
}

/// Settings which drive the bootstrap and runtime of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfiguration {
    /// Run phase-local work on the executor pool instead of inline
    pub concurrent_deployment: bool,
    /// Size of the bootstrap worker pool
    pub executor_threads: usize,
    /// Speculatively warm observer resolution while classes are materialized
    pub preloader_enabled: bool,
    /// Treat classes which fail to load during discovery as fatal
    pub strict_discovery: bool,
    /// Initialize the conversation context on first access instead of on activation
    pub lazy_conversation_context: bool,
    /// Upper bound for waiting on outstanding tasks when the container shuts down
    pub shutdown_grace_period: Duration,
}

impl Default for ContainerConfiguration {
    fn default() -> Self {
        Self {
            concurrent_deployment: true,
            executor_threads: num_cpus::get().max(1),
            preloader_enabled: true,
            strict_discovery: false,
            lazy_conversation_context: true,
            shutdown_grace_period: Duration::from_secs(10),
        }
    }
}

impl ContainerConfiguration {
    /// Configuration with every parallel feature switched off
    pub fn sequential() -> Self {
        Self {
            concurrent_deployment: false,
            preloader_enabled: false,
            ..Self::default()
        }
    }

    /// Builds a configuration from the `WEFT_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let pairs = ConfigKey::ALL
            .iter()
            .filter_map(|key| std::env::var(key.env_var()).ok().map(|value| (key.key(), value)))
            .collect::<Vec<_>>();

        Self::from_pairs(pairs.iter().map(|(key, value)| (*key, value.as_str())))
    }

    /// Builds a configuration from dotted key/value pairs.
    ///
    /// Unknown keys are ignored with a warning, malformed values are rejected.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (key, value) in pairs {
            let Some(known) = ConfigKey::from_key(key) else {
                tracing::warn!("Ignoring unknown configuration key '{key}'");
                continue;
            };
            config.apply(known, value)?;
        }

        if config.executor_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: ConfigKey::ExecutorThreads.key().to_string(),
                value: "0".to_string(),
                reason: "the worker pool needs at least one thread".to_string(),
            });
        }

        Ok(config)
    }

    /// Applies a single key
    pub fn apply(&mut self, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
        match key {
            ConfigKey::ConcurrentDeployment => self.concurrent_deployment = parse(key, value)?,
            ConfigKey::ExecutorThreads => self.executor_threads = parse(key, value)?,
            ConfigKey::PreloaderEnabled => self.preloader_enabled = parse(key, value)?,
            ConfigKey::StrictDiscovery => self.strict_discovery = parse(key, value)?,
            ConfigKey::LazyConversationContext => {
                self.lazy_conversation_context = parse(key, value)?
            }
            ConfigKey::ShutdownGracePeriodMs => {
                self.shutdown_grace_period = Duration::from_millis(parse(key, value)?)
            }
        }
        Ok(())
    }

    /// Whether the executor pool should be created at all
    pub fn uses_executor(&self) -> bool {
        self.concurrent_deployment && self.executor_threads > 0
    }

    pub fn with_concurrent_deployment(mut self, enabled: bool) -> Self {
        self.concurrent_deployment = enabled;
        self
    }

    pub fn with_executor_threads(mut self, threads: usize) -> Self {
        self.executor_threads = threads.max(1);
        self
    }

    pub fn with_strict_discovery(mut self, strict: bool) -> Self {
        self.strict_discovery = strict;
        self
    }

    pub fn with_lazy_conversation_context(mut self, lazy: bool) -> Self {
        self.lazy_conversation_context = lazy;
        self
    }

    pub fn with_preloader(mut self, enabled: bool) -> Self {
        self.preloader_enabled = enabled;
        self
    }

    pub fn with_shutdown_grace_period(mut self, grace: Duration) -> Self {
        self.shutdown_grace_period = grace;
        self
    }
}

fn parse<T>(key: ConfigKey, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.key().to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_concurrent_and_lazy() {
        let config = ContainerConfiguration::default();
        assert!(config.concurrent_deployment);
        assert!(config.lazy_conversation_context);
        assert!(!config.strict_discovery);
        assert!(config.executor_threads >= 1);
    }

    #[test]
    fn pairs_override_defaults() {
        let config = ContainerConfiguration::from_pairs([
            ("weft.concurrent_deployment", "false"),
            ("weft.executor_threads", "3"),
            ("weft.shutdown_grace_period_ms", "250"),
            ("weft.unknown", "whatever"),
        ])
        .unwrap();

        assert!(!config.concurrent_deployment);
        assert_eq!(config.executor_threads, 3);
        assert_eq!(config.shutdown_grace_period, Duration::from_millis(250));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = ContainerConfiguration::from_pairs([("weft.strict_discovery", "maybe")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "weft.strict_discovery"));

        assert!(ContainerConfiguration::from_pairs([("weft.executor_threads", "0")]).is_err());
    }

    #[test]
    fn env_var_names_are_derived_from_keys() {
        assert_eq!(
            ConfigKey::LazyConversationContext.env_var(),
            "WEFT_LAZY_CONVERSATION_CONTEXT"
        );
    }
}
