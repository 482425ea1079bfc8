//! Climate value objects — what an air conditioner reports and accepts.
//!
//! [`DeviceStatus`] mirrors the last successful read from a unit.
//! [`DeviceCommand`] is a single property write; an entity operation is
//! expressed as a list of commands pushed to the unit in one request.

use serde::{Deserialize, Serialize};

/// Lowest accepted Celsius target.
pub const TEMP_MIN_C: i32 = 8;
/// Highest accepted Celsius target.
pub const TEMP_MAX_C: i32 = 30;
/// Lowest accepted Fahrenheit target.
pub const TEMP_MIN_F: i32 = 46;
/// Highest accepted Fahrenheit target.
pub const TEMP_MAX_F: i32 = 86;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Integer value used on the wire.
            #[must_use]
            pub fn code(self) -> i64 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            /// Parse an integer wire value.
            #[must_use]
            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum!(
    /// Operating mode of the unit while powered.
    OperationMode {
        Auto = 0,
        Cool = 1,
        Dry = 2,
        Fan = 3,
        Heat = 4,
    }
);

wire_enum!(
    /// Fan speed step.
    FanSpeed {
        Auto = 0,
        Low = 1,
        MediumLow = 2,
        Medium = 3,
        MediumHigh = 4,
        High = 5,
    }
);

wire_enum!(
    /// Horizontal louver position.
    HorizontalSwing {
        Default = 0,
        FullSwing = 1,
        Left = 2,
        LeftCenter = 3,
        Center = 4,
        RightCenter = 5,
        Right = 6,
    }
);

wire_enum!(
    /// Vertical louver position.
    VerticalSwing {
        Default = 0,
        FullSwing = 1,
        FixedUpper = 2,
        FixedUpperMiddle = 3,
        FixedMiddle = 4,
        FixedLowerMiddle = 5,
        FixedLower = 6,
        SwingUpper = 7,
        SwingUpperMiddle = 8,
        SwingMiddle = 9,
        SwingLowerMiddle = 10,
        SwingLower = 11,
    }
);

wire_enum!(
    /// Quiet level.
    Quiet {
        Off = 0,
        Auto = 1,
        On = 2,
    }
);

wire_enum!(
    /// Unit the device displays and reports temperatures in.
    #[derive(Default)]
    TemperatureUnit {
        #[default]
        Celsius = 0,
        Fahrenheit = 1,
    }
);

impl TemperatureUnit {
    /// Lowest target temperature accepted in this unit.
    #[must_use]
    pub fn min_target(self) -> i32 {
        match self {
            Self::Celsius => TEMP_MIN_C,
            Self::Fahrenheit => TEMP_MIN_F,
        }
    }

    /// Highest target temperature accepted in this unit.
    #[must_use]
    pub fn max_target(self) -> i32 {
        match self {
            Self::Celsius => TEMP_MAX_C,
            Self::Fahrenheit => TEMP_MAX_F,
        }
    }

    /// Display symbol (`°C` / `°F`).
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "\u{b0}C",
            Self::Fahrenheit => "\u{b0}F",
        }
    }
}

/// Mirror of a unit's state as of the last successful read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub power: bool,
    pub mode: Option<OperationMode>,
    /// Target temperature in [`temperature_unit`](Self::temperature_unit).
    pub target_temperature: Option<i32>,
    /// Room temperature in [`temperature_unit`](Self::temperature_unit).
    pub current_temperature: Option<i32>,
    pub temperature_unit: TemperatureUnit,
    pub fan_speed: Option<FanSpeed>,
    pub horizontal_swing: Option<HorizontalSwing>,
    pub vertical_swing: Option<VerticalSwing>,
    pub quiet: Option<Quiet>,
    pub turbo: bool,
    pub sleep: bool,
    pub steady_heat: bool,
    pub power_save: bool,
    pub light: bool,
    pub fresh_air: bool,
    pub xfan: bool,
    pub anion: bool,
}

/// A single property write sent to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    Power(bool),
    Mode(OperationMode),
    /// Target in the unit's current temperature unit.
    TargetTemperature(i32),
    FanSpeed(FanSpeed),
    Swing {
        horizontal: HorizontalSwing,
        vertical: VerticalSwing,
    },
    Quiet(Quiet),
    Turbo(bool),
    Sleep(bool),
    SteadyHeat(bool),
    PowerSave(bool),
    Light(bool),
    FreshAir(bool),
    XFan(bool),
    Anion(bool),
}

impl DeviceStatus {
    /// Fold a command into this status, as the unit would after accepting it.
    pub fn apply(&mut self, command: &DeviceCommand) {
        match *command {
            DeviceCommand::Power(on) => self.power = on,
            DeviceCommand::Mode(mode) => self.mode = Some(mode),
            DeviceCommand::TargetTemperature(value) => self.target_temperature = Some(value),
            DeviceCommand::FanSpeed(speed) => self.fan_speed = Some(speed),
            DeviceCommand::Swing {
                horizontal,
                vertical,
            } => {
                self.horizontal_swing = Some(horizontal);
                self.vertical_swing = Some(vertical);
            }
            DeviceCommand::Quiet(quiet) => self.quiet = Some(quiet),
            DeviceCommand::Turbo(on) => self.turbo = on,
            DeviceCommand::Sleep(on) => self.sleep = on,
            DeviceCommand::SteadyHeat(on) => self.steady_heat = on,
            DeviceCommand::PowerSave(on) => self.power_save = on,
            DeviceCommand::Light(on) => self.light = on,
            DeviceCommand::FreshAir(on) => self.fresh_air = on,
            DeviceCommand::XFan(on) => self.xfan = on,
            DeviceCommand::Anion(on) => self.anion = on,
        }
    }

    /// Return a copy with every command applied in order.
    #[must_use]
    pub fn applied(&self, commands: &[DeviceCommand]) -> Self {
        let mut next = self.clone();
        for command in commands {
            next.apply(command);
        }
        next
    }
}
