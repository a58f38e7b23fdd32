use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub realtime: RealtimeSettings,
    pub location: LocationSettings,
    pub pricing: PricingSettings,
    pub storage: StorageSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to, the secret used
/// to verify identity tokens presented by connecting participants and the
/// log level (overridden by `RUST_LOG` when set).
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub log_level: String,
}

/// Fan-out tuning: keep-alive cadence and per-session outbound limits.
#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeSettings {
    pub keepalive_secs: u64,
    pub outbox_capacity: usize,
    pub push_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocationSettings {
    pub staleness_secs: i64,
}

/// Tunables of the price and ETA calculation that are not part of the
/// fare tables.
#[derive(Debug, Deserialize, Clone)]
pub struct PricingSettings {
    pub free_waiting_minutes: u32,
    pub waiting_rate_per_minute: f64,
    pub average_speed_kmh: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub path: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub realtime: Option<PartialRealtimeSettings>,
    pub location: Option<PartialLocationSettings>,
    pub pricing: Option<PartialPricingSettings>,
    pub storage: Option<PartialStorageSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub jwt_secret: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialRealtimeSettings {
    pub keepalive_secs: Option<u64>,
    pub outbox_capacity: Option<usize>,
    pub push_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLocationSettings {
    pub staleness_secs: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialPricingSettings {
    pub free_waiting_minutes: Option<u32>,
    pub waiting_rate_per_minute: Option<f64>,
    pub average_speed_kmh: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialStorageSettings {
    pub path: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                jwt_secret: "change-me".to_string(),
                log_level: "info".to_string(),
            },
            realtime: RealtimeSettings {
                keepalive_secs: 30,
                outbox_capacity: 256,
                push_timeout_ms: 5000,
            },
            location: LocationSettings {
                staleness_secs: 300,
            },
            pricing: PricingSettings {
                free_waiting_minutes: 5,
                waiting_rate_per_minute: 50.0,
                average_speed_kmh: 30.0,
            },
            storage: StorageSettings {
                path: "livedispatch_db".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let realtime = self.realtime.unwrap_or_default();
        let location = self.location.unwrap_or_default();
        let pricing = self.pricing.unwrap_or_default();
        let storage = self.storage.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
                jwt_secret: server.jwt_secret.unwrap_or(default.server.jwt_secret),
                log_level: server.log_level.unwrap_or(default.server.log_level),
            },
            realtime: RealtimeSettings {
                keepalive_secs: realtime
                    .keepalive_secs
                    .unwrap_or(default.realtime.keepalive_secs),
                outbox_capacity: realtime
                    .outbox_capacity
                    .unwrap_or(default.realtime.outbox_capacity),
                push_timeout_ms: realtime
                    .push_timeout_ms
                    .unwrap_or(default.realtime.push_timeout_ms),
            },
            location: LocationSettings {
                staleness_secs: location
                    .staleness_secs
                    .unwrap_or(default.location.staleness_secs),
            },
            pricing: PricingSettings {
                free_waiting_minutes: pricing
                    .free_waiting_minutes
                    .unwrap_or(default.pricing.free_waiting_minutes),
                waiting_rate_per_minute: pricing
                    .waiting_rate_per_minute
                    .unwrap_or(default.pricing.waiting_rate_per_minute),
                average_speed_kmh: pricing
                    .average_speed_kmh
                    .unwrap_or(default.pricing.average_speed_kmh),
            },
            storage: StorageSettings {
                path: storage.path.unwrap_or(default.storage.path),
            },
        }
    }
}
