use std::time::Duration;

#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
/// Config values for [`CoalescionService`](crate::CoalescionService).
pub struct CoalescionServiceConfig {
    /// How many operations are running (or lingering in their grace window) at once
    pub max_concurrent: Option<usize>,
    /// How long a finished operation keeps serving late joiners before it is evicted
    #[cfg_attr(
        feature = "serde",
        serde(rename = "grace_period_ms", deserialize_with = "from_millis")
    )]
    pub grace_period: Duration,
}

impl Default for CoalescionServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: Some(100),
            grace_period: Duration::from_millis(100),
        }
    }
}

#[cfg(feature = "serde")]
fn from_millis<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    use serde::Deserialize;

    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(feature = "serde")]
#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn load(source: &str) -> CoalescionServiceConfig {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn reads_toml() {
        let config = load("max_concurrent = 8\ngrace_period_ms = 250\n");

        assert_eq!(config.max_concurrent, Some(8));
        assert_eq!(config.grace_period, Duration::from_millis(250));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = load("grace_period_ms = 20\n");

        assert_eq!(config.max_concurrent, Some(100));
        assert_eq!(config.grace_period, Duration::from_millis(20));
    }
}
