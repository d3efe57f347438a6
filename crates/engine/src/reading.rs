use serde::{Deserialize, Serialize};

/// Metric families reported by lighting devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Power,
    Temperature,
    Luminosity,
    Voltage,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Power,
        Metric::Temperature,
        Metric::Luminosity,
        Metric::Voltage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Temperature => "temperature",
            Self::Luminosity => "luminosity",
            Self::Voltage => "voltage",
        }
    }

    /// Display unit used by presentation consumers.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Power => "W",
            Self::Temperature => "°C",
            Self::Luminosity => "lux",
            Self::Voltage => "V",
        }
    }
}

/// One sensor sample. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    pub metric: Metric,
    pub value: f64,
    pub timestamp_ms: i64,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, metric: Metric, value: f64, timestamp_ms: i64) -> Self {
        Self {
            device_id: device_id.into(),
            metric,
            value,
            timestamp_ms,
        }
    }
}
