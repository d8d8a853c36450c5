//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults. The defaults match the lab bench this service was
//! written for (a Franka arm with the usual frame names); deployments
//! override them through the environment.

use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Driver service endpoints
    pub drivers: DriverConfig,
    /// Frame names used for pose composition
    pub frames: FrameConfig,
    /// Transform lookup policy
    pub transforms: TransformConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Base URLs of the driver services this backend orchestrates
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Transform lookup service
    pub transform_url: String,
    /// Motion planning and execution service
    pub motion_url: String,
    /// Grasp detection and execution service
    pub grasp_url: String,
    /// Delay timer service
    pub delay_url: String,
    /// Timeout for ordinary driver requests (in seconds)
    pub request_timeout_secs: u64,
    /// Timeout for trajectory execution requests, which block until the
    /// motion physically completes (in seconds)
    pub execution_timeout_secs: u64,
}

/// Names of the coordinate frames the task pipeline composes poses against
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// The robot's fixed base frame
    pub base: String,
    /// Fiducial frame identifying the kettle on its stand
    pub kettle_tag: String,
    /// Frame at the rim of the pour target
    pub pot_top: String,
    /// End-effector frame, used as the spiral center during a pour
    pub end_effector: String,
}

/// Deadlines applied to transform lookups
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Bounded wait before a lookup is declared failed (in seconds)
    pub lookup_timeout_secs: u64,
    /// Maximum accepted transform age (in seconds)
    pub max_age_secs: u64,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            drivers: DriverConfig {
                transform_url: env::var("TRANSFORM_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:9091".to_string()),
                motion_url: env::var("MOTION_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:9092".to_string()),
                grasp_url: env::var("GRASP_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:9093".to_string()),
                delay_url: env::var("DELAY_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:9094".to_string()),
                request_timeout_secs: env::var("DRIVER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(10),
                execution_timeout_secs: env::var("EXECUTION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(120),
            },
            frames: FrameConfig {
                base: env::var("BASE_FRAME").unwrap_or_else(|_| "panda_link0".to_string()),
                kettle_tag: env::var("KETTLE_TAG_FRAME")
                    .unwrap_or_else(|_| "filtered_kettle_tag".to_string()),
                pot_top: env::var("POT_TOP_FRAME").unwrap_or_else(|_| "pot_top".to_string()),
                end_effector: env::var("END_EFFECTOR_FRAME")
                    .unwrap_or_else(|_| "panda_hand_tcp".to_string()),
            },
            transforms: TransformConfig {
                lookup_timeout_secs: env::var("TRANSFORM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(2),
                max_age_secs: env::var("TRANSFORM_MAX_AGE_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(10),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl TransformConfig {
    /// Bounded lookup deadline as a [`Duration`]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    /// Maximum accepted transform age as a [`Duration`]
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "PORT",
            "HOST",
            "TRANSFORM_URL",
            "MOTION_URL",
            "GRASP_URL",
            "DELAY_URL",
            "DRIVER_TIMEOUT_SECS",
            "EXECUTION_TIMEOUT_SECS",
            "BASE_FRAME",
            "KETTLE_TAG_FRAME",
            "POT_TOP_FRAME",
            "END_EFFECTOR_FRAME",
            "TRANSFORM_TIMEOUT_SECS",
            "TRANSFORM_MAX_AGE_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_environment() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.frames.base, "panda_link0");
        assert_eq!(config.frames.kettle_tag, "filtered_kettle_tag");
        assert_eq!(config.frames.end_effector, "panda_hand_tcp");
        assert_eq!(config.transforms.lookup_timeout(), Duration::from_secs(2));
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        clear_env();
        env::set_var("PORT", "9000");
        env::set_var("POT_TOP_FRAME", "mug_rim");
        env::set_var("TRANSFORM_TIMEOUT_SECS", "5");
        let config = Config::from_env();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.frames.pot_top, "mug_rim");
        assert_eq!(config.transforms.lookup_timeout(), Duration::from_secs(5));
        assert_eq!(config.server_addr(), "0.0.0.0:9000");
        clear_env();
    }

    #[test]
    #[serial]
    fn unparseable_numbers_fall_back_to_defaults() {
        clear_env();
        env::set_var("PORT", "not-a-port");
        let config = Config::from_env();
        assert_eq!(config.server.port, 8080);
        clear_env();
    }
}
