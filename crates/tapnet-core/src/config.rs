//! Centralized Configuration Management
//!
//! All tunables for the dispatch pipeline live here so the CLI can load them
//! from one TOML document and tests can start from one preset.

use crate::types::AddressFamily;
use crate::{TapnetError, TapnetResult};
use core::time::Duration;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Debounce Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Repeat notifications inside this window are dropped
    pub window_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window_ms: 200 }
    }
}

impl DebounceConfig {
    pub fn with_window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connect_timeout_ms: u64,
    pub receive_timeout_ms: u64,
    /// Bytes read from the socket per receive call
    pub chunk_size: usize,
    /// Sessions that may wait in the handoff queue
    pub handoff_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            receive_timeout_ms: 5_000,
            chunk_size: 512,
            handoff_capacity: 1,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn with_receive_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.receive_timeout_ms = timeout_ms;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

// ----------------------------------------------------------------------------
// Endpoint Configuration
// ----------------------------------------------------------------------------

/// Target of the GenericHttp action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub family: AddressFamily,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "example.com".to_string(),
            port: 80,
            path: "/".to_string(),
            family: AddressFamily::Ipv4,
        }
    }
}

impl HttpConfig {
    pub fn with_endpoint<H: Into<String>>(mut self, host: H, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_path<P: Into<String>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }
}

/// How the ProtoRequest body travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtoTransport {
    /// Body of an HTTP POST
    #[default]
    HttpPost,
    /// Length-prefixed frame written straight to the stream
    RawFramed,
}

/// Target of the ProtoRequest action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtoConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub family: AddressFamily,
    pub transport: ProtoTransport,
}

impl Default for ProtoConfig {
    fn default() -> Self {
        Self {
            host: "example.com".to_string(),
            port: 80,
            path: "/status".to_string(),
            family: AddressFamily::Ipv4,
            transport: ProtoTransport::HttpPost,
        }
    }
}

impl ProtoConfig {
    pub fn with_endpoint<H: Into<String>>(mut self, host: H, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_transport(mut self, transport: ProtoTransport) -> Self {
        self.transport = transport;
        self
    }
}

// ----------------------------------------------------------------------------
// Indicator and Storage Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub default_interval_ms: u32,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Settings file; `None` keeps settings in memory only
    pub path: Option<String>,
    pub boot_count_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            boot_count_key: "app/boot_count".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TapnetConfig {
    pub debounce: DebounceConfig,
    pub session: SessionConfig,
    pub http: HttpConfig,
    pub proto: ProtoConfig,
    pub indicator: IndicatorConfig,
    pub storage: StorageConfig,
}

impl TapnetConfig {
    /// Short timeouts and a narrow debounce window for tests
    pub fn testing() -> Self {
        Self {
            debounce: DebounceConfig { window_ms: 50 },
            session: SessionConfig {
                connect_timeout_ms: 500,
                receive_timeout_ms: 500,
                chunk_size: 64,
                handoff_capacity: 1,
            },
            http: HttpConfig::default().with_endpoint("127.0.0.1", 8080),
            proto: ProtoConfig::default().with_endpoint("127.0.0.1", 8080),
            indicator: IndicatorConfig {
                default_interval_ms: 20,
            },
            storage: StorageConfig::default(),
        }
    }

    pub fn validate(&self) -> TapnetResult<()> {
        if self.session.connect_timeout_ms == 0 {
            return Err(TapnetError::config_error("connect_timeout_ms must be non-zero"));
        }
        if self.session.receive_timeout_ms == 0 {
            return Err(TapnetError::config_error("receive_timeout_ms must be non-zero"));
        }
        if self.session.chunk_size == 0 {
            return Err(TapnetError::config_error("chunk_size must be non-zero"));
        }
        if self.session.handoff_capacity == 0 {
            return Err(TapnetError::config_error("handoff_capacity must be non-zero"));
        }
        if self.http.host.is_empty() || self.proto.host.is_empty() {
            return Err(TapnetError::config_error("endpoint host must not be empty"));
        }
        if self.indicator.default_interval_ms == 0 {
            return Err(TapnetError::config_error("default_interval_ms must be non-zero"));
        }
        Ok(())
    }
}
