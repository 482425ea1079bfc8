//! Climate entity: maps a unit's [`DeviceStatus`] to a `climate.*` entity
//! and climate service calls to [`DeviceCommand`]s.
//!
//! ## Services
//!
//! | Service | Data |
//! |---------|------|
//! | `turn_on` / `turn_off` | none |
//! | `set_hvac_mode` | `hvac_mode` |
//! | `set_temperature` | `temperature`, optional `hvac_mode` |
//! | `set_fan_mode` | `fan_mode` |
//! | `set_swing_mode` | `swing_mode` |
//! | `set_preset_mode` | `preset_mode` |
//! | `set_quiet_mode` | `quiet_mode` |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use gree_amber_domain::climate::{
    DeviceCommand, DeviceStatus, FanSpeed, HorizontalSwing, OperationMode, Quiet, VerticalSwing,
};
use gree_amber_domain::entity::{AttributeValue, Entity, EntityState};
use gree_amber_domain::error::{HubError, ValidationError};
use gree_amber_domain::id::{DeviceId, EntityId};

/// Target temperature granularity, in device units.
pub const TARGET_TEMPERATURE_STEP: i64 = 1;

macro_rules! option_enum {
    ($(#[doc = $doc:expr])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Every option, in display order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Option name as exposed in attributes and service data.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            fn names() -> Vec<&'static str> {
                Self::ALL.iter().map(|option| option.as_str()).collect()
            }
        }
    };
}

option_enum!(
    /// HVAC mode as presented to users; `off` stands for power off.
    HvacMode {
        Auto => "auto",
        Cool => "cool",
        Dry => "dry",
        FanOnly => "fan_only",
        Heat => "heat",
        Off => "off",
    }
);

option_enum!(
    /// Fan mode names.
    FanMode {
        Auto => "auto",
        Low => "low",
        MediumLow => "medium_low",
        Medium => "medium",
        MediumHigh => "medium_high",
        High => "high",
    }
);

option_enum!(
    /// Swing mode names, combining both louver axes.
    SwingMode {
        Off => "off",
        Vertical => "vertical",
        Horizontal => "horizontal",
        Both => "both",
    }
);

option_enum!(
    /// Preset names. `away` is the unit's 8 °C steady-heat mode.
    PresetMode {
        Eco => "eco",
        Away => "away",
        Boost => "boost",
        None => "none",
        Sleep => "sleep",
    }
);

option_enum!(
    /// Quiet mode names.
    QuietMode {
        Off => "off",
        Auto => "auto",
        On => "on",
    }
);

impl HvacMode {
    fn operation(self) -> Option<OperationMode> {
        match self {
            Self::Auto => Some(OperationMode::Auto),
            Self::Cool => Some(OperationMode::Cool),
            Self::Dry => Some(OperationMode::Dry),
            Self::FanOnly => Some(OperationMode::Fan),
            Self::Heat => Some(OperationMode::Heat),
            Self::Off => None,
        }
    }

    /// Read the HVAC mode off a status; `None` when powered with an unknown mode.
    #[must_use]
    pub fn from_status(status: &DeviceStatus) -> Option<Self> {
        if !status.power {
            return Some(Self::Off);
        }
        status.mode.map(|mode| match mode {
            OperationMode::Auto => Self::Auto,
            OperationMode::Cool => Self::Cool,
            OperationMode::Dry => Self::Dry,
            OperationMode::Fan => Self::FanOnly,
            OperationMode::Heat => Self::Heat,
        })
    }
}

impl From<FanMode> for FanSpeed {
    fn from(mode: FanMode) -> Self {
        match mode {
            FanMode::Auto => Self::Auto,
            FanMode::Low => Self::Low,
            FanMode::MediumLow => Self::MediumLow,
            FanMode::Medium => Self::Medium,
            FanMode::MediumHigh => Self::MediumHigh,
            FanMode::High => Self::High,
        }
    }
}

impl From<FanSpeed> for FanMode {
    fn from(speed: FanSpeed) -> Self {
        match speed {
            FanSpeed::Auto => Self::Auto,
            FanSpeed::Low => Self::Low,
            FanSpeed::MediumLow => Self::MediumLow,
            FanSpeed::Medium => Self::Medium,
            FanSpeed::MediumHigh => Self::MediumHigh,
            FanSpeed::High => Self::High,
        }
    }
}

impl From<QuietMode> for Quiet {
    fn from(mode: QuietMode) -> Self {
        match mode {
            QuietMode::Off => Self::Off,
            QuietMode::Auto => Self::Auto,
            QuietMode::On => Self::On,
        }
    }
}

impl From<Quiet> for QuietMode {
    fn from(quiet: Quiet) -> Self {
        match quiet {
            Quiet::Off => Self::Off,
            Quiet::Auto => Self::Auto,
            Quiet::On => Self::On,
        }
    }
}

impl SwingMode {
    /// Both axes at full swing is `both`; a single axis names that axis.
    #[must_use]
    pub fn from_status(status: &DeviceStatus) -> Self {
        let horizontal = status.horizontal_swing == Some(HorizontalSwing::FullSwing);
        let vertical = status.vertical_swing == Some(VerticalSwing::FullSwing);
        match (horizontal, vertical) {
            (true, true) => Self::Both,
            (true, false) => Self::Horizontal,
            (false, true) => Self::Vertical,
            (false, false) => Self::Off,
        }
    }

    fn command(self) -> DeviceCommand {
        let horizontal = if matches!(self, Self::Both | Self::Horizontal) {
            HorizontalSwing::FullSwing
        } else {
            HorizontalSwing::Center
        };
        let vertical = if matches!(self, Self::Both | Self::Vertical) {
            VerticalSwing::FullSwing
        } else {
            VerticalSwing::FixedMiddle
        };
        DeviceCommand::Swing {
            horizontal,
            vertical,
        }
    }
}

impl PresetMode {
    /// Steady heat wins over power save, then sleep, then turbo.
    #[must_use]
    pub fn from_status(status: &DeviceStatus) -> Self {
        if status.steady_heat {
            Self::Away
        } else if status.power_save {
            Self::Eco
        } else if status.sleep {
            Self::Sleep
        } else if status.turbo {
            Self::Boost
        } else {
            Self::None
        }
    }

    fn commands(self) -> [DeviceCommand; 4] {
        [
            DeviceCommand::SteadyHeat(self == Self::Away),
            DeviceCommand::PowerSave(self == Self::Eco),
            DeviceCommand::Turbo(self == Self::Boost),
            DeviceCommand::Sleep(self == Self::Sleep),
        ]
    }
}

/// A parsed climate service call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClimateCall {
    TurnOn,
    TurnOff,
    SetHvacMode(HvacMode),
    SetTemperature {
        temperature: f64,
        hvac_mode: Option<HvacMode>,
    },
    SetFanMode(FanMode),
    SetSwingMode(SwingMode),
    SetPresetMode(PresetMode),
    SetQuietMode(QuietMode),
}

#[derive(Deserialize)]
struct HvacModeData {
    hvac_mode: HvacMode,
}

#[derive(Deserialize)]
struct TemperatureData {
    temperature: f64,
    #[serde(default)]
    hvac_mode: Option<HvacMode>,
}

#[derive(Deserialize)]
struct FanModeData {
    fan_mode: FanMode,
}

#[derive(Deserialize)]
struct SwingModeData {
    swing_mode: SwingMode,
}

#[derive(Deserialize)]
struct PresetModeData {
    preset_mode: PresetMode,
}

#[derive(Deserialize)]
struct QuietModeData {
    quiet_mode: QuietMode,
}

fn parse_data<T: DeserializeOwned>(data: serde_json::Value) -> Result<T, HubError> {
    serde_json::from_value(data).map_err(|err| ValidationError::InvalidServiceData(err).into())
}

impl ClimateCall {
    /// Parse a service name and its JSON data.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownService`] for an unsupported service
    /// and [`ValidationError::InvalidServiceData`] for missing or unknown
    /// option values.
    pub fn parse(service: &str, data: serde_json::Value) -> Result<Self, HubError> {
        Ok(match service {
            "turn_on" => Self::TurnOn,
            "turn_off" => Self::TurnOff,
            "set_hvac_mode" => Self::SetHvacMode(parse_data::<HvacModeData>(data)?.hvac_mode),
            "set_temperature" => {
                let data: TemperatureData = parse_data(data)?;
                Self::SetTemperature {
                    temperature: data.temperature,
                    hvac_mode: data.hvac_mode,
                }
            }
            "set_fan_mode" => Self::SetFanMode(parse_data::<FanModeData>(data)?.fan_mode),
            "set_swing_mode" => Self::SetSwingMode(parse_data::<SwingModeData>(data)?.swing_mode),
            "set_preset_mode" => {
                Self::SetPresetMode(parse_data::<PresetModeData>(data)?.preset_mode)
            }
            "set_quiet_mode" => Self::SetQuietMode(parse_data::<QuietModeData>(data)?.quiet_mode),
            other => {
                return Err(ValidationError::UnknownService {
                    service: other.to_string(),
                }
                .into());
            }
        })
    }
}

/// The `climate.*` entity of one unit.
#[derive(Debug, Clone)]
pub struct ClimateEntity {
    id: EntityId,
    device_id: DeviceId,
    entity_id: String,
    friendly_name: String,
}

impl ClimateEntity {
    /// Describe the climate entity of the device with MAC-derived `slug`.
    #[must_use]
    pub fn new(device_id: DeviceId, slug: &str, friendly_name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            device_id,
            entity_id: format!("climate.gree_{slug}"),
            friendly_name: friendly_name.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Snapshot the entity for `status`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the builder fails.
    pub fn render(&self, status: &DeviceStatus, available: bool) -> Result<Entity, HubError> {
        let unit = status.temperature_unit;
        let state = if available {
            EntityState::from_flag(status.power)
        } else {
            EntityState::Unavailable
        };

        let mut builder = Entity::builder()
            .id(self.id)
            .device_id(self.device_id)
            .entity_id(&self.entity_id)
            .friendly_name(&self.friendly_name)
            .state(state)
            .attribute("hvac_modes", AttributeValue::from(HvacMode::names()))
            .attribute("fan_modes", AttributeValue::from(FanMode::names()))
            .attribute("swing_modes", AttributeValue::from(SwingMode::names()))
            .attribute("preset_modes", AttributeValue::from(PresetMode::names()))
            .attribute("quiet_modes", AttributeValue::from(QuietMode::names()))
            .attribute("temperature_unit", AttributeValue::from(unit.symbol()))
            .attribute("min_temp", AttributeValue::from(unit.min_target()))
            .attribute("max_temp", AttributeValue::from(unit.max_target()))
            .attribute("target_temp_step", AttributeValue::Int(TARGET_TEMPERATURE_STEP))
            .attribute(
                "swing_mode",
                AttributeValue::from(SwingMode::from_status(status).as_str()),
            )
            .attribute(
                "preset_mode",
                AttributeValue::from(PresetMode::from_status(status).as_str()),
            );

        if let Some(mode) = HvacMode::from_status(status) {
            builder = builder.attribute("hvac_mode", AttributeValue::from(mode.as_str()));
        }
        if let Some(target) = status.target_temperature {
            builder = builder.attribute("temperature", AttributeValue::from(target));
        }
        // falls back to the target when the unit has no room sensor reading
        if let Some(current) = status.current_temperature.or(status.target_temperature) {
            builder = builder.attribute("current_temperature", AttributeValue::from(current));
        }
        if let Some(speed) = status.fan_speed {
            builder = builder.attribute("fan_mode", AttributeValue::from(FanMode::from(speed).as_str()));
        }
        if let Some(quiet) = status.quiet {
            builder =
                builder.attribute("quiet_mode", AttributeValue::from(QuietMode::from(quiet).as_str()));
        }

        builder.build()
    }

    /// Translate a call into the commands to push, given the current status.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TemperatureOutOfRange`] when the requested
    /// target is outside the limits of the unit's temperature unit.
    pub fn commands(
        &self,
        call: ClimateCall,
        status: &DeviceStatus,
    ) -> Result<Vec<DeviceCommand>, HubError> {
        Ok(match call {
            ClimateCall::TurnOn => vec![DeviceCommand::Power(true)],
            ClimateCall::TurnOff => vec![DeviceCommand::Power(false)],
            ClimateCall::SetHvacMode(mode) => hvac_commands(mode, status),
            ClimateCall::SetTemperature {
                temperature,
                hvac_mode,
            } => {
                let target = checked_target(temperature, status)?;
                let mut commands = hvac_mode
                    .map(|mode| hvac_commands(mode, status))
                    .unwrap_or_default();
                commands.push(DeviceCommand::TargetTemperature(target));
                commands
            }
            ClimateCall::SetFanMode(mode) => vec![DeviceCommand::FanSpeed(mode.into())],
            ClimateCall::SetSwingMode(mode) => vec![mode.command()],
            ClimateCall::SetPresetMode(preset) => preset.commands().to_vec(),
            ClimateCall::SetQuietMode(mode) => vec![DeviceCommand::Quiet(mode.into())],
        })
    }
}

fn hvac_commands(mode: HvacMode, status: &DeviceStatus) -> Vec<DeviceCommand> {
    let Some(operation) = mode.operation() else {
        return vec![DeviceCommand::Power(false)];
    };
    let mut commands = Vec::with_capacity(2);
    if !status.power {
        commands.push(DeviceCommand::Power(true));
    }
    commands.push(DeviceCommand::Mode(operation));
    commands
}

#[allow(clippy::cast_possible_truncation)]
fn checked_target(temperature: f64, status: &DeviceStatus) -> Result<i32, HubError> {
    let unit = status.temperature_unit;
    let (min, max) = (unit.min_target(), unit.max_target());
    let rounded = temperature.round();
    if !rounded.is_finite() || rounded < f64::from(min) || rounded > f64::from(max) {
        return Err(ValidationError::TemperatureOutOfRange {
            value: rounded.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32,
            min,
            max,
        }
        .into());
    }
    Ok(rounded as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gree_amber_domain::climate::TemperatureUnit;
    use serde_json::json;

    fn entity() -> ClimateEntity {
        ClimateEntity::new(DeviceId::new(), "f4911e7aca59", "Bedroom AC")
    }

    fn cooling() -> DeviceStatus {
        DeviceStatus {
            power: true,
            mode: Some(OperationMode::Cool),
            target_temperature: Some(24),
            current_temperature: Some(27),
            fan_speed: Some(FanSpeed::Medium),
            quiet: Some(Quiet::Off),
            ..DeviceStatus::default()
        }
    }

    #[test]
    fn should_render_climate_attributes() {
        let rendered = entity().render(&cooling(), true).unwrap();
        assert_eq!(rendered.entity_id, "climate.gree_f4911e7aca59");
        assert_eq!(rendered.state, EntityState::On);
        assert_eq!(
            rendered.get_attribute("hvac_mode"),
            Some(&AttributeValue::from("cool"))
        );
        assert_eq!(rendered.get_attribute("temperature"), Some(&AttributeValue::Int(24)));
        assert_eq!(
            rendered.get_attribute("current_temperature"),
            Some(&AttributeValue::Int(27))
        );
        assert_eq!(
            rendered.get_attribute("fan_mode"),
            Some(&AttributeValue::from("medium"))
        );
        assert_eq!(rendered.get_attribute("min_temp"), Some(&AttributeValue::Int(8)));
    }

    #[test]
    fn should_render_off_when_powered_down() {
        let status = DeviceStatus {
            power: false,
            ..cooling()
        };
        let rendered = entity().render(&status, true).unwrap();
        assert_eq!(rendered.state, EntityState::Off);
        assert_eq!(
            rendered.get_attribute("hvac_mode"),
            Some(&AttributeValue::from("off"))
        );
    }

    #[test]
    fn should_render_unavailable() {
        let rendered = entity().render(&cooling(), false).unwrap();
        assert_eq!(rendered.state, EntityState::Unavailable);
    }

    #[test]
    fn should_switch_limits_for_fahrenheit() {
        let status = DeviceStatus {
            temperature_unit: TemperatureUnit::Fahrenheit,
            ..cooling()
        };
        let rendered = entity().render(&status, true).unwrap();
        assert_eq!(rendered.get_attribute("min_temp"), Some(&AttributeValue::Int(46)));
        assert_eq!(rendered.get_attribute("max_temp"), Some(&AttributeValue::Int(86)));
        assert_eq!(
            rendered.get_attribute("temperature_unit"),
            Some(&AttributeValue::from("\u{b0}F"))
        );
    }

    #[test]
    fn should_read_preset_with_steady_heat_first() {
        let status = DeviceStatus {
            steady_heat: true,
            turbo: true,
            ..cooling()
        };
        assert_eq!(PresetMode::from_status(&status), PresetMode::Away);
    }

    #[test]
    fn should_read_swing_per_axis() {
        let status = DeviceStatus {
            horizontal_swing: Some(HorizontalSwing::FullSwing),
            vertical_swing: Some(VerticalSwing::FixedMiddle),
            ..cooling()
        };
        assert_eq!(SwingMode::from_status(&status), SwingMode::Horizontal);
    }

    #[test]
    fn should_power_on_before_setting_mode() {
        let status = DeviceStatus {
            power: false,
            ..cooling()
        };
        let commands = entity()
            .commands(ClimateCall::SetHvacMode(HvacMode::Heat), &status)
            .unwrap();
        assert_eq!(
            commands,
            vec![
                DeviceCommand::Power(true),
                DeviceCommand::Mode(OperationMode::Heat)
            ]
        );
    }

    #[test]
    fn should_only_power_off_for_off_mode() {
        let commands = entity()
            .commands(ClimateCall::SetHvacMode(HvacMode::Off), &cooling())
            .unwrap();
        assert_eq!(commands, vec![DeviceCommand::Power(false)]);
    }

    #[test]
    fn should_set_mode_before_temperature() {
        let call = ClimateCall::parse(
            "set_temperature",
            json!({"temperature": 21.4, "hvac_mode": "heat"}),
        )
        .unwrap();
        let commands = entity().commands(call, &cooling()).unwrap();
        assert_eq!(
            commands,
            vec![
                DeviceCommand::Mode(OperationMode::Heat),
                DeviceCommand::TargetTemperature(21)
            ]
        );
    }

    #[test]
    fn should_reject_temperature_out_of_range() {
        let call = ClimateCall::SetTemperature {
            temperature: 31.0,
            hvac_mode: None,
        };
        let result = entity().commands(call, &cooling());
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::TemperatureOutOfRange {
                value: 31,
                min: 8,
                max: 30
            }))
        ));
    }

    #[test]
    fn should_accept_fahrenheit_target_in_fahrenheit_mode() {
        let status = DeviceStatus {
            temperature_unit: TemperatureUnit::Fahrenheit,
            ..cooling()
        };
        let call = ClimateCall::SetTemperature {
            temperature: 75.0,
            hvac_mode: None,
        };
        let commands = entity().commands(call, &status).unwrap();
        assert_eq!(commands, vec![DeviceCommand::TargetTemperature(75)]);
    }

    #[test]
    fn should_clear_other_presets() {
        let call = ClimateCall::parse("set_preset_mode", json!({"preset_mode": "eco"})).unwrap();
        let commands = entity().commands(call, &cooling()).unwrap();
        assert_eq!(
            commands,
            vec![
                DeviceCommand::SteadyHeat(false),
                DeviceCommand::PowerSave(true),
                DeviceCommand::Turbo(false),
                DeviceCommand::Sleep(false),
            ]
        );
    }

    #[test]
    fn should_center_horizontal_louver_for_vertical_swing() {
        let call = ClimateCall::parse("set_swing_mode", json!({"swing_mode": "vertical"})).unwrap();
        let commands = entity().commands(call, &cooling()).unwrap();
        assert_eq!(
            commands,
            vec![DeviceCommand::Swing {
                horizontal: HorizontalSwing::Center,
                vertical: VerticalSwing::FullSwing,
            }]
        );
    }

    #[test]
    fn should_map_fan_and_quiet_modes() {
        let fan = ClimateCall::parse("set_fan_mode", json!({"fan_mode": "medium_high"})).unwrap();
        let quiet = ClimateCall::parse("set_quiet_mode", json!({"quiet_mode": "auto"})).unwrap();
        assert_eq!(
            entity().commands(fan, &cooling()).unwrap(),
            vec![DeviceCommand::FanSpeed(FanSpeed::MediumHigh)]
        );
        assert_eq!(
            entity().commands(quiet, &cooling()).unwrap(),
            vec![DeviceCommand::Quiet(Quiet::Auto)]
        );
    }

    #[test]
    fn should_reject_unknown_service() {
        let result = ClimateCall::parse("set_humidity", json!({}));
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::UnknownService { .. }))
        ));
    }

    #[test]
    fn should_reject_unknown_option_value() {
        let result = ClimateCall::parse("set_fan_mode", json!({"fan_mode": "turbo"}));
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::InvalidServiceData(_)))
        ));
    }

    #[test]
    fn should_list_hvac_modes_with_off_last() {
        let rendered = entity().render(&cooling(), true).unwrap();
        assert_eq!(
            rendered.get_attribute("hvac_modes"),
            Some(&AttributeValue::from(vec![
                "auto", "cool", "dry", "fan_only", "heat", "off"
            ]))
        );
    }
}
