use anyhow::{anyhow, ensure, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::variants::{builtin_variants, VariantProfile, FIGHTER_UAV_G};
use crate::workflow::types::TaskKind;

/// Main configuration structure for Redwing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RedwingConfig {
    /// Variant used when none is requested explicitly
    pub default_variant: String,
    /// Simulated latencies and countdown length
    pub timing: TimingConfig,
    /// Failure injection for the simulated tasks
    pub simulation: SimulationConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Aircraft variants keyed by name
    pub variants: BTreeMap<String, VariantProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimingConfig {
    pub connection_delay_ms: u64,
    pub checks_delay_ms: u64,
    pub upload_delay_ms: u64,
    pub countdown_tick_ms: u64,
    /// Countdown start value
    pub countdown_seconds: u32,
    pub post_launch_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connection_delay_ms: 2000,
            checks_delay_ms: 2000,
            upload_delay_ms: 2000,
            countdown_tick_ms: 1000,
            countdown_seconds: 10,
            post_launch_delay_ms: 2000,
        }
    }
}

impl TimingConfig {
    pub fn delay_for(&self, kind: TaskKind) -> Duration {
        let ms = match kind {
            TaskKind::Connection => self.connection_delay_ms,
            TaskKind::PreflightChecks => self.checks_delay_ms,
            TaskKind::MissionUpload => self.upload_delay_ms,
            TaskKind::CountdownTick => self.countdown_tick_ms,
            TaskKind::PostLaunch => self.post_launch_delay_ms,
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Probability that a fallible task fails, 0.0 reproduces the always-success scaffold
    pub failure_rate: f64,
    /// Seed for reproducible failure injection
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl Default for RedwingConfig {
    fn default() -> Self {
        Self {
            default_variant: FIGHTER_UAV_G.to_string(),
            timing: TimingConfig::default(),
            simulation: SimulationConfig::default(),
            observability: ObservabilityConfig::default(),
            variants: builtin_variants(),
        }
    }
}

impl RedwingConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (redwing.toml)
    /// 3. Environment variables (prefixed with REDWING_, `__` between sections)
    pub fn load() -> Result<Self> {
        let path = Path::new("redwing.toml");
        Self::load_from(path.exists().then_some(path))
    }

    /// Load defaults, then `path` if given, then the environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&RedwingConfig::default())
            .context("Failed to encode default configuration")?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("REDWING")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let redwing_config: RedwingConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        redwing_config.validate()?;
        Ok(redwing_config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.timing.countdown_seconds > 0,
            "timing.countdown_seconds must be greater than zero"
        );
        ensure!(
            self.timing.countdown_tick_ms > 0,
            "timing.countdown_tick_ms must be greater than zero"
        );
        ensure!(
            (0.0..=1.0).contains(&self.simulation.failure_rate),
            "simulation.failure_rate must be within 0.0..=1.0, got {}",
            self.simulation.failure_rate
        );
        ensure!(
            self.variants.contains_key(&self.default_variant),
            "default variant `{}` is not defined",
            self.default_variant
        );
        for (name, profile) in &self.variants {
            if let Some(problem) = profile.problem() {
                return Err(anyhow!("variant `{name}` is invalid: {problem}"));
            }
        }
        Ok(())
    }

    /// Look up a variant by name, falling back to the default variant
    pub fn variant(&self, name: Option<&str>) -> Result<(String, VariantProfile)> {
        let name = name.unwrap_or(&self.default_variant);
        self.variants
            .get(name)
            .map(|profile| (name.to_string(), profile.clone()))
            .ok_or_else(|| {
                let known: Vec<&str> = self.variants.keys().map(String::as_str).collect();
                anyhow!("unknown variant `{name}` (known: {})", known.join(", "))
            })
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::Stage;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = RedwingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.timing.delay_for(TaskKind::Connection), Duration::from_millis(2000));
        assert_eq!(config.timing.delay_for(TaskKind::CountdownTick), Duration::from_millis(1000));
        assert_eq!(config.timing.countdown_seconds, 10);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
default_variant = "survey-uav"

[timing]
connection_delay_ms = 500
countdown_seconds = 3
"#
        )
        .unwrap();

        let config = RedwingConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.default_variant, "survey-uav");
        assert_eq!(config.timing.connection_delay_ms, 500);
        assert_eq!(config.timing.countdown_seconds, 3);
        // Untouched values keep their defaults
        assert_eq!(config.timing.upload_delay_ms, 2000);
        assert_eq!(config.variants.len(), 2);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = RedwingConfig::default();
        config.timing.countdown_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = RedwingConfig::default();
        config.simulation.failure_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = RedwingConfig::default();
        config.default_variant = "missing".to_string();
        assert!(config.validate().is_err());

        let mut config = RedwingConfig::default();
        if let Some(fighter) = config.variants.get_mut(FIGHTER_UAV_G) {
            fighter.final_stage = Stage::Uploading;
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("left on a timer"));
    }

    #[test]
    fn test_variant_lookup() {
        let config = RedwingConfig::default();
        let (name, profile) = config.variant(None).unwrap();
        assert_eq!(name, FIGHTER_UAV_G);
        assert_eq!(profile.final_stage, Stage::FlightComplete);

        let err = config.variant(Some("glider")).unwrap_err();
        assert!(err.to_string().contains("unknown variant `glider`"));
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redwing.toml");

        let mut config = RedwingConfig::default();
        config.timing.post_launch_delay_ms = 750;
        config.save_to_file(&path).unwrap();

        let reloaded = RedwingConfig::load_from(Some(&path)).unwrap();
        assert_eq!(reloaded.timing.post_launch_delay_ms, 750);
        assert_eq!(reloaded.variants, config.variants);
    }
}
