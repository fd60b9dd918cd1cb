use serde::{Deserialize, Serialize};

use crate::eval::Value;

/// Driver-side simulation setup: grid dimensions, how long to run, where
/// agents start, and the ambient field readings. Every field has a
/// default, so a missing or partial config file still yields the stock
/// walkthrough arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_width")]
    pub width: usize,

    #[serde(default = "default_height")]
    pub height: usize,

    #[serde(default = "default_ticks")]
    pub ticks: u64,

    #[serde(default = "default_placements")]
    pub placements: Vec<PlacementConfig>,

    #[serde(default = "default_field_values")]
    pub field_values: Vec<FieldValueConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValueConfig {
    pub x: usize,
    pub y: usize,
    pub name: String,
    pub value: Value,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            ticks: default_ticks(),
            placements: default_placements(),
            field_values: default_field_values(),
        }
    }
}

fn default_width() -> usize {
    3
}

fn default_height() -> usize {
    3
}

fn default_ticks() -> u64 {
    4
}

fn default_placements() -> Vec<PlacementConfig> {
    vec![PlacementConfig { x: 1, y: 1 }]
}

fn default_field_values() -> Vec<FieldValueConfig> {
    vec![
        FieldValueConfig {
            x: 1,
            y: 1,
            name: "temperature".to_string(),
            value: Value::Integer(70),
        },
        FieldValueConfig {
            x: 1,
            y: 1,
            name: "light".to_string(),
            value: Value::Float(0.9),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_the_walkthrough_arena() {
        let config = SimulationConfig::default();
        assert_eq!((config.width, config.height), (3, 3));
        assert_eq!(config.ticks, 4);
        assert_eq!(config.placements.len(), 1);
        assert_eq!(config.field_values.len(), 2);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{"ticks": 10}"#).unwrap();
        assert_eq!(config.ticks, 10);
        assert_eq!(config.width, 3);
        assert_eq!(config.placements.len(), 1);
    }

    #[test]
    fn test_field_value_types_deserialize() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{
                "field_values": [
                    {"x": 0, "y": 0, "name": "temperature", "value": 70},
                    {"x": 0, "y": 0, "name": "light", "value": 0.9},
                    {"x": 0, "y": 0, "name": "label", "value": "warm"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.field_values[0].value, Value::Integer(70));
        assert_eq!(config.field_values[1].value, Value::Float(0.9));
        assert_eq!(config.field_values[2].value, Value::String("warm".to_string()));
    }
}
