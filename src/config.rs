//! Declarative configuration: combine-Joy-Cons policy, deadzone, motion and
//! mouse settings, and per-combination button maps. Parsed once at startup
//! with `serde` + `toml` and validated with a single fatal pass, matching
//! the teacher's `mapping::config::Config::validate()` shape.

use crate::buttons::switch_button_from_name;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamepadMode {
    X360,
    Ds4,
}

/// Where a Switch-button maps to: a named target button, a trigger (digital
/// on/off becomes 0 or 255), a D-pad direction (DS4 only), or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonTarget {
    Button(String),
    LeftTrigger,
    RightTrigger,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

impl<'de> Deserialize<'de> for ButtonTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "LT" => ButtonTarget::LeftTrigger,
            "RT" => ButtonTarget::RightTrigger,
            "UP" => ButtonTarget::DpadUp,
            "DOWN" => ButtonTarget::DpadDown,
            "LEFT" => ButtonTarget::DpadLeft,
            "RIGHT" => ButtonTarget::DpadRight,
            other => ButtonTarget::Button(other.to_string()),
        })
    }
}

impl Serialize for ButtonTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            ButtonTarget::Button(name) => name.as_str(),
            ButtonTarget::LeftTrigger => "LT",
            ButtonTarget::RightTrigger => "RT",
            ButtonTarget::DpadUp => "UP",
            ButtonTarget::DpadDown => "DOWN",
            ButtonTarget::DpadLeft => "LEFT",
            ButtonTarget::DpadRight => "RIGHT",
        };
        serializer.serialize_str(s)
    }
}

pub type ButtonMap = HashMap<String, Option<ButtonTarget>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ButtonMaps {
    pub dual_joycons: ButtonMap,
    pub single_joycon_l: ButtonMap,
    pub single_joycon_r: ButtonMap,
    pub procon: ButtonMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MouseButtonConfig {
    pub left_button: String,
    pub middle_button: String,
    pub right_button: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MouseSideConfig {
    pub left_joycon: MouseButtonConfig,
    pub right_joycon: MouseButtonConfig,
}

fn default_roughness_threshold() -> u16 {
    4000
}
fn default_distance_max() -> u16 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MouseConfig {
    pub enabled: bool,
    pub sensitivity: f32,
    pub scroll_sensitivity: f32,
    pub buttons: MouseSideConfig,
    /// Open Question (b): kept configurable rather than hardcoded.
    #[serde(default = "default_roughness_threshold")]
    pub roughness_threshold: u16,
    #[serde(default = "default_distance_max")]
    pub distance_max: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mode: GamepadMode,
    pub combine_joycons: bool,
    pub deadzone: i32,
    pub motion_controls: bool,
    pub mouse: MouseConfig,
    pub buttons: ButtonMaps,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deadzone < 0 {
            return Err(ConfigError::Invalid("deadzone must be >= 0".into()));
        }
        if self.mouse.sensitivity <= 0.0 {
            return Err(ConfigError::Invalid("mouse.sensitivity must be > 0".into()));
        }
        if self.mouse.scroll_sensitivity <= 0.0 {
            return Err(ConfigError::Invalid("mouse.scroll_sensitivity must be > 0".into()));
        }
        if self.mouse.distance_max == 0 {
            return Err(ConfigError::Invalid("mouse.distance_max must be > 0".into()));
        }
        for (name, map) in [
            ("dual_joycons", &self.buttons.dual_joycons),
            ("single_joycon_l", &self.buttons.single_joycon_l),
            ("single_joycon_r", &self.buttons.single_joycon_r),
            ("procon", &self.buttons.procon),
        ] {
            if map.is_empty() {
                return Err(ConfigError::Invalid(format!("buttons.{name} must not be empty")));
            }
            for key in map.keys() {
                if switch_button_from_name(key).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "unknown switch button name '{key}' in buttons.{name}"
                    )));
                }
            }
            for target in map.values().flatten() {
                self.validate_target(target)?;
            }
        }
        for side in [&self.mouse.buttons.left_joycon, &self.mouse.buttons.right_joycon] {
            for name in [&side.left_button, &side.middle_button, &side.right_button] {
                if switch_button_from_name(name).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "unknown switch button name '{name}' in mouse.buttons"
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_target(&self, target: &ButtonTarget) -> Result<(), ConfigError> {
        let ButtonTarget::Button(name) = target else {
            if matches!(
                target,
                ButtonTarget::DpadUp | ButtonTarget::DpadDown | ButtonTarget::DpadLeft | ButtonTarget::DpadRight
            ) && self.mode != GamepadMode::Ds4
            {
                return Err(ConfigError::Invalid(
                    "D-pad direction targets are only valid in ds4 mode".into(),
                ));
            }
            return Ok(());
        };
        let valid = match self.mode {
            GamepadMode::X360 => X360_TARGET_NAMES.contains(&name.as_str()),
            GamepadMode::Ds4 => DS4_TARGET_NAMES.contains(&name.as_str()),
        };
        if !valid {
            return Err(ConfigError::Invalid(format!(
                "unknown target button '{name}' for mode {:?}",
                self.mode
            )));
        }
        Ok(())
    }
}

const X360_TARGET_NAMES: &[&str] = &[
    "UP", "DOWN", "LEFT", "RIGHT", "START", "BACK", "L_STK", "R_STK", "LB", "RB", "GUIDE", "A",
    "B", "X", "Y",
];
const DS4_TARGET_NAMES: &[&str] = &[
    "START", "TOUCHPAD", "L_STK", "R_STK", "SHARE", "LB", "RB", "GUIDE", "A", "B", "X", "Y",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_map() -> ButtonMap {
        let mut map = HashMap::new();
        map.insert("A".to_string(), Some(ButtonTarget::Button("A".to_string())));
        map
    }

    fn minimal_config() -> Config {
        Config {
            mode: GamepadMode::X360,
            combine_joycons: true,
            deadzone: 150,
            motion_controls: true,
            mouse: MouseConfig {
                enabled: true,
                sensitivity: 1.0,
                scroll_sensitivity: 1.0,
                buttons: MouseSideConfig {
                    left_joycon: MouseButtonConfig {
                        left_button: "ZL".into(),
                        middle_button: "L".into(),
                        right_button: "CAPT".into(),
                    },
                    right_joycon: MouseButtonConfig {
                        left_button: "ZR".into(),
                        middle_button: "R".into(),
                        right_button: "HOME".into(),
                    },
                },
                roughness_threshold: 4000,
                distance_max: 1000,
            },
            buttons: ButtonMaps {
                dual_joycons: minimal_map(),
                single_joycon_l: minimal_map(),
                single_joycon_r: minimal_map(),
                procon: minimal_map(),
            },
        }
    }

    #[test]
    fn minimal_config_validates() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn rejects_negative_deadzone() {
        let mut config = minimal_config();
        config.deadzone = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_switch_button_key() {
        let mut config = minimal_config();
        config
            .buttons
            .dual_joycons
            .insert("NOT_A_SWITCH_BUTTON".to_string(), Some(ButtonTarget::Button("A".to_string())));
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_target_button() {
        let mut config = minimal_config();
        config
            .buttons
            .dual_joycons
            .insert("X".to_string(), Some(ButtonTarget::Button("NOT_A_BUTTON".to_string())));
        assert!(config.validate().is_err());
    }

    #[test]
    fn dpad_targets_require_ds4_mode() {
        let mut config = minimal_config();
        config.buttons.dual_joycons.insert("UP".to_string(), Some(ButtonTarget::DpadUp));
        assert!(config.validate().is_err());
        config.mode = GamepadMode::Ds4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn button_target_round_trips_through_toml_strings() {
        assert_eq!(
            toml::from_str::<Config>(
                &toml::to_string(&minimal_config()).unwrap()
            )
            .unwrap()
            .deadzone,
            minimal_config().deadzone
        );
    }
}
