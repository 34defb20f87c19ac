//! Simulator network configuration.
//!
//! A [`SimulatorConfig`] is built once, either explicitly or from
//! environment variables, and then handed to the network. Nothing reads the
//! environment after construction.

use std::{
    collections::BTreeMap,
    env::VarError,
    fmt::Display,
    str::FromStr,
    time::Duration,
};

use crate::types::{P2PError, P2PResult};

/// Per-link propagation delay in milliseconds for links created without
/// explicit conditions.
pub const DEFAULT_LATENCY_VAR: &str = "SIMULATOR_DEFAULT_LATENCY_MS";
/// Per-link drop probability for links created without explicit conditions.
pub const DEFAULT_PACKET_LOSS_VAR: &str = "SIMULATOR_DEFAULT_PACKET_LOSS";
/// Delay in milliseconds applied to every `discover` call.
pub const DISCOVERY_DELAY_VAR: &str = "SIMULATOR_DISCOVERY_DELAY_MS";
/// Upper bound in seconds for pending `accept`/`recv` calls.
pub const CONNECTION_TIMEOUT_VAR: &str = "SIMULATOR_CONNECTION_TIMEOUT_SECS";
/// Largest payload in bytes accepted by `send`.
pub const MAX_MESSAGE_SIZE_VAR: &str = "SIMULATOR_MAX_MESSAGE_SIZE";
/// Seed for the loss-sampling RNG.
pub const SEED_VAR: &str = "SIMULATOR_SEED";

/// Every variable [`SimulatorConfig::from_env`] reads.
pub const VARS: [&str; 6] = [
    DEFAULT_LATENCY_VAR,
    DEFAULT_PACKET_LOSS_VAR,
    DISCOVERY_DELAY_VAR,
    CONNECTION_TIMEOUT_VAR,
    MAX_MESSAGE_SIZE_VAR,
    SEED_VAR,
];

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub default_latency: Duration,
    pub default_packet_loss: f64,
    pub discovery_delay: Duration,
    pub connection_timeout: Duration,
    pub max_message_size: usize,
    /// `None` seeds the loss RNG from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            default_latency: Duration::from_millis(50),
            default_packet_loss: 0.01,
            discovery_delay: Duration::from_millis(100),
            connection_timeout: Duration::from_secs(30),
            max_message_size: 1024 * 1024,
            seed: None,
        }
    }
}

/// Collects the recognized variables through `lookup`. Nothing else in the
/// environment is touched.
fn lookup_vars(
    lookup: impl Fn(&str) -> Result<String, VarError>,
) -> P2PResult<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();

    for name in VARS {
        match lookup(name) {
            Ok(value) => {
                vars.insert(name.to_string(), value);
            }
            Err(VarError::NotPresent) => {}
            Err(VarError::NotUnicode(value)) => {
                return Err(P2PError::InvalidConfiguration(format!(
                    "{name}={value:?}: not valid unicode"
                )));
            }
        }
    }

    Ok(vars)
}

fn parse_var<T>(vars: &BTreeMap<String, String>, name: &str) -> P2PResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    vars.get(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| {
                P2PError::InvalidConfiguration(format!("{name}={value:?}: {e}"))
            })
        })
        .transpose()
}

impl SimulatorConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// * If any recognized variable is set to a malformed or out of range value
    /// * If any recognized variable is not valid unicode
    pub fn from_env() -> P2PResult<Self> {
        Self::from_vars(&lookup_vars(|name| std::env::var(name))?)
    }

    /// Builds the configuration from an explicit variable map, falling back
    /// to the defaults for absent variables.
    ///
    /// # Errors
    ///
    /// * If any recognized variable is set to a malformed or out of range value
    pub fn from_vars(vars: &BTreeMap<String, String>) -> P2PResult<Self> {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(vars, DEFAULT_LATENCY_VAR)? {
            config.default_latency = Duration::from_millis(ms);
        }
        if let Some(loss) = parse_var::<f64>(vars, DEFAULT_PACKET_LOSS_VAR)? {
            config.default_packet_loss = loss;
        }
        if let Some(ms) = parse_var::<u64>(vars, DISCOVERY_DELAY_VAR)? {
            config.discovery_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(vars, CONNECTION_TIMEOUT_VAR)? {
            config.connection_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var::<usize>(vars, MAX_MESSAGE_SIZE_VAR)? {
            config.max_message_size = size;
        }
        if let Some(seed) = parse_var::<u64>(vars, SEED_VAR)? {
            config.seed = Some(seed);
        }

        config.validate()?;

        log::debug!("from_vars: config={config:?}");

        Ok(config)
    }

    /// # Errors
    ///
    /// * If `default_packet_loss` is not a probability
    /// * If `max_message_size` is zero
    pub fn validate(&self) -> P2PResult<()> {
        validate_packet_loss(self.default_packet_loss)?;

        if self.max_message_size == 0 {
            return Err(P2PError::InvalidConfiguration(
                "max_message_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub const fn with_default_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    #[must_use]
    pub const fn with_default_packet_loss(mut self, packet_loss: f64) -> Self {
        self.default_packet_loss = packet_loss;
        self
    }

    #[must_use]
    pub const fn with_discovery_delay(mut self, delay: Duration) -> Self {
        self.discovery_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// # Errors
///
/// * If `packet_loss` is NaN or outside `0.0..=1.0`
pub fn validate_packet_loss(packet_loss: f64) -> P2PResult<()> {
    if (0.0..=1.0).contains(&packet_loss) {
        Ok(())
    } else {
        Err(P2PError::InvalidConfiguration(format!(
            "packet loss must be within 0.0..=1.0, got {packet_loss}"
        )))
    }
}
