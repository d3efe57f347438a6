use serde::{Deserialize, Serialize};

use crate::reading::Metric;

/// Lamp components the scorer tracks, with the metric families that
/// betray their degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    LedDriver,
    Ballast,
    PhotocellSensor,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::LedDriver,
        Component::Ballast,
        Component::PhotocellSensor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LedDriver => "led_driver",
            Self::Ballast => "ballast",
            Self::PhotocellSensor => "photocell_sensor",
        }
    }

    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            Self::LedDriver => &[Metric::Power, Metric::Voltage],
            Self::Ballast => &[Metric::Temperature],
            Self::PhotocellSensor => &[Metric::Luminosity],
        }
    }

    /// Representative metric, used when a prediction is promoted to an
    /// anomaly record.
    pub fn primary_metric(&self) -> Metric {
        match self {
            Self::LedDriver => Metric::Power,
            Self::Ballast => Metric::Temperature,
            Self::PhotocellSensor => Metric::Luminosity,
        }
    }
}
