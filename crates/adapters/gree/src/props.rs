//! Device properties: the column names units speak, how a set of raw values
//! maps to a [`DeviceStatus`], and how [`DeviceCommand`]s become writes.

use std::collections::BTreeMap;

use gree_amber_domain::climate::{
    DeviceCommand, DeviceStatus, FanSpeed, HorizontalSwing, OperationMode, Quiet,
    TemperatureUnit, VerticalSwing,
};

use crate::error::GreeError;

pub const POWER: &str = "Pow";
pub const MODE: &str = "Mod";
pub const TEMP_SET: &str = "SetTem";
pub const TEMP_SENSOR: &str = "TemSen";
pub const TEMP_UNIT: &str = "TemUn";
pub const TEMP_BIT: &str = "TemRec";
pub const FAN_SPEED: &str = "WdSpd";
pub const FRESH_AIR: &str = "Air";
pub const XFAN: &str = "Blo";
pub const ANION: &str = "Health";
pub const SLEEP: &str = "SwhSlp";
pub const SLEEP_MODE: &str = "SlpMod";
pub const LIGHT: &str = "Lig";
pub const SWING_HORIZ: &str = "SwingLfRig";
pub const SWING_VERT: &str = "SwUpDn";
pub const QUIET: &str = "Quiet";
pub const TURBO: &str = "Tur";
pub const STEADY_HEAT: &str = "StHt";
pub const POWER_SAVE: &str = "SvSt";
pub const HEAT_COOL_TYPE: &str = "HeatCoolType";
/// Firmware identifier column, e.g. `362001000762+U-CS532AE(LT)V3.31.bin`.
pub const HID: &str = "hid";
/// Extra command column that silences the confirmation beep.
pub const BUZZER: &str = "Buzzer_ON_OFF";

/// Every column requested on a status read.
pub const STATUS_COLUMNS: &[&str] = &[
    POWER,
    MODE,
    "Dwet",
    "DwatSen",
    "Dfltr",
    "DwatFul",
    "Dmod",
    TEMP_SET,
    TEMP_SENSOR,
    TEMP_UNIT,
    TEMP_BIT,
    FAN_SPEED,
    FRESH_AIR,
    XFAN,
    ANION,
    SLEEP,
    SLEEP_MODE,
    LIGHT,
    SWING_HORIZ,
    SWING_VERT,
    QUIET,
    TURBO,
    STEADY_HEAT,
    POWER_SAVE,
    HEAT_COOL_TYPE,
];

/// Older firmware reports `TemSen` shifted by this amount.
const TEMP_OFFSET: i64 = 40;
const TEMP_MIN_C: i64 = 8;
const TEMP_MAX_C: i64 = 30;
const TEMP_MIN_TABLE: i64 = -60;
const TEMP_MAX_TABLE: i64 = 60;
const TEMP_MIN_TABLE_F: i32 = -76;
const TEMP_MAX_TABLE_F: i32 = 140;

/// One row of the Fahrenheit table: the device encodes °F as a rounded
/// Celsius value plus a bit saying the exact value was above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FahrenheitRecord {
    fahrenheit: i32,
    tem_set: i64,
    tem_rec: i64,
}

#[allow(clippy::cast_possible_truncation)]
fn fahrenheit_record(fahrenheit: i32) -> FahrenheitRecord {
    let celsius = (f64::from(fahrenheit) - 32.0) * 5.0 / 9.0;
    let tem_set = celsius.round();
    FahrenheitRecord {
        fahrenheit,
        tem_set: tem_set as i64,
        tem_rec: i64::from(celsius - tem_set > 0.0),
    }
}

/// Fahrenheit value for a `SetTem`/`TemRec` pair.
fn fahrenheit_for(tem_set: i64, tem_rec: Option<i64>) -> Option<i32> {
    if !(TEMP_MIN_TABLE..=TEMP_MAX_TABLE).contains(&tem_set) {
        return None;
    }
    let mut first = None;
    for record in (TEMP_MIN_TABLE_F..=TEMP_MAX_TABLE_F).map(fahrenheit_record) {
        if record.tem_set != tem_set {
            continue;
        }
        if Some(record.tem_rec) == tem_rec {
            return Some(record.fahrenheit);
        }
        first.get_or_insert(record.fahrenheit);
    }
    first
}

/// Version from a firmware identifier: `...V3.31.bin` gives `3.31`.
#[must_use]
pub fn parse_version(hid: &str) -> Option<String> {
    let stem = hid.strip_suffix(".bin")?;
    let start = stem.rfind(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (prefix, version) = stem.split_at(start + 1);
    if !prefix.ends_with('V') || version.is_empty() {
        return None;
    }
    Some(version.to_string())
}

/// Raw property values last acknowledged by a unit.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    values: BTreeMap<String, i64>,
    hid: Option<String>,
    version: Option<String>,
    version_checked: bool,
}

/// Property writes staged from commands but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWrites {
    writes: Vec<(&'static str, i64)>,
    next: BTreeMap<String, i64>,
}

impl StagedWrites {
    /// Whether nothing changed and no request is needed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// The `(column, value)` pairs to send.
    #[must_use]
    pub fn writes(&self) -> &[(&'static str, i64)] {
        &self.writes
    }
}

impl PropertyMap {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    /// Firmware version, from `hid` or inferred from the sensor offset.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Columns to request on the next status read.
    #[must_use]
    pub fn status_columns(&self) -> Vec<&'static str> {
        let mut cols = STATUS_COLUMNS.to_vec();
        if self.hid.is_none() {
            cols.push(HID);
        }
        cols
    }

    /// Merge a status reply.
    pub fn absorb(&mut self, cols: &[String], dat: &[serde_json::Value]) {
        for (col, value) in cols.iter().zip(dat) {
            if col == HID {
                if let Some(hid) = value.as_str() {
                    self.version = parse_version(hid);
                    tracing::info!(hid, version = ?self.version, "firmware identified");
                    self.hid = Some(hid.to_string());
                }
                continue;
            }
            match value.as_i64() {
                Some(raw) => {
                    self.values.insert(col.clone(), raw);
                }
                None => tracing::trace!(column = %col, ?value, "ignoring non-numeric column"),
            }
        }

        if !self.version_checked && cols.iter().any(|col| col == TEMP_SENSOR) {
            self.version_checked = true;
            let sensor = self.get(TEMP_SENSOR).unwrap_or_default();
            if sensor != 0 && sensor < TEMP_OFFSET {
                tracing::info!(sensor, "sensor reads without offset, assuming firmware 4.x");
                self.version = Some("4.0".to_string());
            }
        }
    }

    fn unit(&self) -> TemperatureUnit {
        self.get(TEMP_UNIT)
            .and_then(TemperatureUnit::from_code)
            .unwrap_or_default()
    }

    fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| value != 0)
    }

    fn to_unit(&self, celsius: i64) -> Option<i32> {
        match self.unit() {
            TemperatureUnit::Celsius => i32::try_from(celsius).ok(),
            TemperatureUnit::Fahrenheit => fahrenheit_for(celsius, self.get(TEMP_BIT)),
        }
    }

    fn target_temperature(&self) -> Option<i32> {
        self.to_unit(self.get(TEMP_SET)?)
    }

    fn current_temperature(&self) -> Option<i32> {
        let raw = self.get(TEMP_SENSOR)?;
        let major = self
            .version
            .as_deref()
            .and_then(|version| version.split('.').next())
            .and_then(|major| major.parse::<u32>().ok());
        let celsius = if major == Some(4) {
            raw
        } else if raw != 0 {
            raw - TEMP_OFFSET
        } else {
            return None;
        };
        let converted = self.to_unit(celsius);
        if converted.is_none() {
            tracing::warn!(raw, "unexpected sensor temperature");
        }
        converted
    }

    /// Decode the mirrored [`DeviceStatus`].
    #[must_use]
    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            power: self.flag(POWER),
            mode: self.get(MODE).and_then(OperationMode::from_code),
            target_temperature: self.target_temperature(),
            current_temperature: self.current_temperature(),
            temperature_unit: self.unit(),
            fan_speed: self.get(FAN_SPEED).and_then(FanSpeed::from_code),
            horizontal_swing: self.get(SWING_HORIZ).and_then(HorizontalSwing::from_code),
            vertical_swing: self.get(SWING_VERT).and_then(VerticalSwing::from_code),
            quiet: self.get(QUIET).and_then(Quiet::from_code),
            turbo: self.flag(TURBO),
            sleep: self.flag(SLEEP),
            steady_heat: self.flag(STEADY_HEAT),
            power_save: self.flag(POWER_SAVE),
            light: self.flag(LIGHT),
            fresh_air: self.flag(FRESH_AIR),
            xfan: self.flag(XFAN),
            anion: self.flag(ANION),
        }
    }

    /// Turn `commands` into the writes a unit needs, skipping values it
    /// already holds. A target temperature also carries `TemRec` and `TemUn`.
    /// With `suppress_beep`, [`BUZZER`] is appended.
    ///
    /// # Errors
    ///
    /// Returns [`GreeError::InvalidTemperature`] when a target has no
    /// encoding within the unit's limits.
    pub fn stage(
        &self,
        commands: &[DeviceCommand],
        suppress_beep: bool,
    ) -> Result<StagedWrites, GreeError> {
        let mut next = self.values.clone();
        let mut dirty: Vec<&'static str> = Vec::new();

        for command in commands {
            for (name, value) in self.command_props(*command)? {
                if next.get(name) != Some(&value) {
                    next.insert(name.to_string(), value);
                    if !dirty.contains(&name) {
                        dirty.push(name);
                    }
                }
            }
        }

        if dirty.is_empty() {
            return Ok(StagedWrites {
                writes: Vec::new(),
                next,
            });
        }

        let mut writes: Vec<(&'static str, i64)> = Vec::with_capacity(dirty.len() + 3);
        let mut push = |name: &'static str| {
            if let Some(&value) = next.get(name) {
                if !writes.iter().any(|(written, _)| *written == name) {
                    writes.push((name, value));
                }
            }
        };
        for name in dirty {
            push(name);
            if name == TEMP_SET {
                push(TEMP_BIT);
                push(TEMP_UNIT);
            }
        }
        if suppress_beep {
            writes.push((BUZZER, 1));
        }
        Ok(StagedWrites { writes, next })
    }

    /// Adopt staged values once the unit acknowledged them.
    pub fn commit(&mut self, staged: StagedWrites) {
        self.values = staged.next;
    }

    fn command_props(
        &self,
        command: DeviceCommand,
    ) -> Result<Vec<(&'static str, i64)>, GreeError> {
        Ok(match command {
            DeviceCommand::Power(on) => vec![(POWER, i64::from(on))],
            DeviceCommand::Mode(mode) => vec![(MODE, mode.code())],
            DeviceCommand::TargetTemperature(value) => self.temperature_props(value)?,
            DeviceCommand::FanSpeed(speed) => vec![(FAN_SPEED, speed.code())],
            DeviceCommand::Swing {
                horizontal,
                vertical,
            } => vec![
                (SWING_HORIZ, horizontal.code()),
                (SWING_VERT, vertical.code()),
            ],
            DeviceCommand::Quiet(quiet) => vec![(QUIET, quiet.code())],
            DeviceCommand::Turbo(on) => vec![(TURBO, i64::from(on))],
            DeviceCommand::Sleep(on) => vec![(SLEEP, i64::from(on)), (SLEEP_MODE, i64::from(on))],
            DeviceCommand::SteadyHeat(on) => vec![(STEADY_HEAT, i64::from(on))],
            DeviceCommand::PowerSave(on) => vec![(POWER_SAVE, i64::from(on))],
            DeviceCommand::Light(on) => vec![(LIGHT, i64::from(on))],
            DeviceCommand::FreshAir(on) => vec![(FRESH_AIR, i64::from(on))],
            DeviceCommand::XFan(on) => vec![(XFAN, i64::from(on))],
            DeviceCommand::Anion(on) => vec![(ANION, i64::from(on))],
        })
    }

    fn temperature_props(&self, value: i32) -> Result<Vec<(&'static str, i64)>, GreeError> {
        let (tem_set, tem_rec) = match self.unit() {
            TemperatureUnit::Celsius => (i64::from(value), None),
            TemperatureUnit::Fahrenheit => {
                let record = fahrenheit_record(value);
                (record.tem_set, Some(record.tem_rec))
            }
        };
        if !(TEMP_MIN_C..=TEMP_MAX_C).contains(&tem_set) {
            return Err(GreeError::InvalidTemperature { value });
        }
        let mut props = vec![(TEMP_SET, tem_set)];
        if let Some(tem_rec) = tem_rec {
            props.push((TEMP_BIT, tem_rec));
        }
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn absorbed(pairs: &[(&str, serde_json::Value)]) -> PropertyMap {
        let mut map = PropertyMap::default();
        let cols: Vec<String> = pairs.iter().map(|(col, _)| (*col).to_string()).collect();
        let dat: Vec<serde_json::Value> = pairs.iter().map(|(_, value)| value.clone()).collect();
        map.absorb(&cols, &dat);
        map
    }

    #[test]
    fn should_encode_fahrenheit_targets() {
        assert_eq!(
            fahrenheit_record(75),
            FahrenheitRecord {
                fahrenheit: 75,
                tem_set: 24,
                tem_rec: 0
            }
        );
        assert_eq!(fahrenheit_record(76).tem_set, 24);
        assert_eq!(fahrenheit_record(76).tem_rec, 1);
        assert_eq!(fahrenheit_record(46).tem_set, 8);
        assert_eq!(fahrenheit_record(86).tem_set, 30);
    }

    #[test]
    fn should_decode_fahrenheit_from_pair() {
        assert_eq!(fahrenheit_for(24, Some(0)), Some(75));
        assert_eq!(fahrenheit_for(24, Some(1)), Some(76));
        assert_eq!(fahrenheit_for(99, Some(0)), None);
    }

    #[test]
    fn should_parse_version_from_hid() {
        assert_eq!(
            parse_version("362001000762+U-CS532AE(LT)V3.31.bin").as_deref(),
            Some("3.31")
        );
        assert_eq!(parse_version("362001000762+U-CS532AE(LT).bin"), None);
        assert_eq!(parse_version("V3.31"), None);
    }

    #[test]
    fn should_request_hid_until_known() {
        let mut map = PropertyMap::default();
        assert!(map.status_columns().contains(&HID));
        map.absorb(
            &["hid".to_string()],
            &[json!("362001000762+U-CS532AE(LT)V3.31.bin")],
        );
        assert!(!map.status_columns().contains(&HID));
        assert_eq!(map.version(), Some("3.31"));
    }

    #[test]
    fn should_remove_sensor_offset() {
        let map = absorbed(&[("TemSen", json!(66)), ("SetTem", json!(24))]);
        assert_eq!(map.status().current_temperature, Some(26));
    }

    #[test]
    fn should_detect_firmware_without_sensor_offset() {
        let map = absorbed(&[("TemSen", json!(23)), ("SetTem", json!(24))]);
        assert_eq!(map.version(), Some("4.0"));
        assert_eq!(map.status().current_temperature, Some(23));
    }

    #[test]
    fn should_only_check_offset_on_first_reading() {
        let mut map = absorbed(&[("TemSen", json!(66))]);
        map.absorb(&["TemSen".to_string()], &[json!(30)]);
        assert_eq!(map.version(), None);
    }

    #[test]
    fn should_leave_current_temperature_empty_for_zero_sensor() {
        let map = absorbed(&[("TemSen", json!(0)), ("SetTem", json!(24))]);
        assert_eq!(map.status().current_temperature, None);
        assert_eq!(map.status().target_temperature, Some(24));
    }

    #[test]
    fn should_decode_status() {
        let map = absorbed(&[
            ("Pow", json!(1)),
            ("Mod", json!(4)),
            ("WdSpd", json!(5)),
            ("SwingLfRig", json!(1)),
            ("SwUpDn", json!(4)),
            ("Quiet", json!(2)),
            ("StHt", json!(1)),
            ("Health", json!(1)),
            ("TemUn", json!(0)),
        ]);
        let status = map.status();
        assert!(status.power);
        assert_eq!(status.mode, Some(OperationMode::Heat));
        assert_eq!(status.fan_speed, Some(FanSpeed::High));
        assert_eq!(status.horizontal_swing, Some(HorizontalSwing::FullSwing));
        assert_eq!(status.vertical_swing, Some(VerticalSwing::FixedMiddle));
        assert_eq!(status.quiet, Some(Quiet::On));
        assert!(status.steady_heat);
        assert!(status.anion);
        assert!(!status.turbo);
    }

    #[test]
    fn should_read_fahrenheit_target() {
        let map = absorbed(&[("TemUn", json!(1)), ("SetTem", json!(24)), ("TemRec", json!(1))]);
        let status = map.status();
        assert_eq!(status.temperature_unit, TemperatureUnit::Fahrenheit);
        assert_eq!(status.target_temperature, Some(76));
    }

    #[test]
    fn should_only_send_changed_properties() {
        let map = absorbed(&[("Pow", json!(1)), ("Mod", json!(1))]);
        let staged = map
            .stage(
                &[DeviceCommand::Power(true), DeviceCommand::Mode(OperationMode::Heat)],
                false,
            )
            .unwrap();
        assert_eq!(staged.writes(), &[(MODE, 4)]);
    }

    #[test]
    fn should_skip_request_when_nothing_changed() {
        let map = absorbed(&[("Pow", json!(1))]);
        let staged = map.stage(&[DeviceCommand::Power(true)], true).unwrap();
        assert!(staged.is_empty());
    }

    #[test]
    fn should_append_buzzer_when_beep_suppressed() {
        let map = absorbed(&[("Pow", json!(0))]);
        let staged = map.stage(&[DeviceCommand::Power(true)], true).unwrap();
        assert_eq!(staged.writes(), &[(POWER, 1), (BUZZER, 1)]);
    }

    #[test]
    fn should_send_unit_and_bit_with_target_temperature() {
        let map = absorbed(&[("SetTem", json!(20)), ("TemUn", json!(0)), ("TemRec", json!(0))]);
        let staged = map
            .stage(&[DeviceCommand::TargetTemperature(24)], false)
            .unwrap();
        assert_eq!(staged.writes(), &[(TEMP_SET, 24), (TEMP_BIT, 0), (TEMP_UNIT, 0)]);
    }

    #[test]
    fn should_encode_fahrenheit_target_write() {
        let map = absorbed(&[("SetTem", json!(20)), ("TemUn", json!(1)), ("TemRec", json!(0))]);
        let staged = map
            .stage(&[DeviceCommand::TargetTemperature(76)], false)
            .unwrap();
        assert_eq!(staged.writes(), &[(TEMP_SET, 24), (TEMP_BIT, 1), (TEMP_UNIT, 1)]);
    }

    #[test]
    fn should_reject_unencodable_target() {
        let map = absorbed(&[("TemUn", json!(0))]);
        let result = map.stage(&[DeviceCommand::TargetTemperature(35)], false);
        assert!(matches!(
            result,
            Err(GreeError::InvalidTemperature { value: 35 })
        ));
    }

    #[test]
    fn should_write_sleep_mode_with_sleep() {
        let map = PropertyMap::default();
        let staged = map.stage(&[DeviceCommand::Sleep(true)], false).unwrap();
        assert_eq!(staged.writes(), &[(SLEEP, 1), (SLEEP_MODE, 1)]);
    }

    #[test]
    fn should_not_change_values_until_committed() {
        let mut map = absorbed(&[("Lig", json!(0))]);
        let staged = map.stage(&[DeviceCommand::Light(true)], true).unwrap();
        assert!(!map.status().light);
        map.commit(staged);
        assert!(map.status().light);
    }
}
