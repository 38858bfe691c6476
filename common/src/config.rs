use serde::{Deserialize, Serialize};

/// Tunables for the engine's locking contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bounded wait for the process-wide lock; acquisition past this
    /// deadline fails with `LockUnavailable`.
    pub lock_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 250,
        }
    }
}

impl EngineConfig {
    pub fn sanitize(&mut self) {
        if self.lock_timeout_ms == 0 {
            self.lock_timeout_ms = 250;
        }
        self.lock_timeout_ms = self.lock_timeout_ms.min(5_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
        }
    }
}

/// On-disk service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    /// Offset applied when callers supply UTC epochs; the clock itself
    /// always stores local wall time.
    pub utc_offset_seconds: i32,
    pub mqtt: MqttConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            utc_offset_seconds: 0,
            mqtt: MqttConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.engine.sanitize();
        // Real-world UTC offsets stay within +/-14h.
        self.utc_offset_seconds = self.utc_offset_seconds.clamp(-14 * 3600, 14 * 3600);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut config = RuntimeConfig {
            engine: EngineConfig { lock_timeout_ms: 0 },
            utc_offset_seconds: 100 * 3600,
            ..RuntimeConfig::default()
        };
        config.sanitize();

        assert_eq!(config.engine.lock_timeout_ms, 250);
        assert_eq!(config.utc_offset_seconds, 14 * 3600);
    }

    #[test]
    fn defaults_survive_a_json_round_trip() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: RuntimeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.engine.lock_timeout_ms, 250);
        assert_eq!(back.mqtt.port, 1883);
        assert_eq!(back.utc_offset_seconds, 0);
    }
}
