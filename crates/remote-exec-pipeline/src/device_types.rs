//! Supported device types and the primitives each exposes.

use remote_exec_core::{ExternalLibrary, LanguageConfig, Variant};

/// A device primitive callable from user programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalFunction {
    pub name: &'static str,
    /// Number of arguments the primitive takes.
    pub arity: u8,
}

const fn f(name: &'static str, arity: u8) -> InternalFunction {
    InternalFunction { name, arity }
}

/// Static description of a device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceType {
    /// Registry key, lowercase.
    pub id: &'static str,
    pub name: &'static str,
    pub chapter: u8,
    pub variant: Variant,
    pub library: ExternalLibrary,
    /// Primitives in call-index order.
    pub internal_functions: &'static [InternalFunction],
}

impl DeviceType {
    /// Language configuration a workspace is reset to for this device.
    #[must_use]
    pub fn language_config(&self) -> LanguageConfig {
        LanguageConfig {
            chapter: self.chapter,
            variant: self.variant,
            library: self.library,
            symbols: self
                .internal_functions
                .iter()
                .map(|f| f.name.to_string())
                .collect(),
            globals: Vec::new(),
        }
    }

    /// Call index and signature of a primitive.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<(usize, &'static InternalFunction)> {
        self.internal_functions
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
    }
}

const EV3_FUNCTIONS: &[InternalFunction] = &[
    f("ev3_pause", 1),
    f("ev3_connected", 1),
    f("ev3_motorA", 0),
    f("ev3_motorB", 0),
    f("ev3_motorC", 0),
    f("ev3_motorD", 0),
    f("ev3_motorGetSpeed", 1),
    f("ev3_motorSetSpeed", 2),
    f("ev3_motorStart", 1),
    f("ev3_motorStop", 1),
    f("ev3_motorSetStopAction", 2),
    f("ev3_motorGetPosition", 1),
    f("ev3_runForTime", 3),
    f("ev3_runToAbsolutePosition", 3),
    f("ev3_runToRelativePosition", 3),
    f("ev3_colorSensor", 0),
    f("ev3_colorSensorRed", 1),
    f("ev3_colorSensorGreen", 1),
    f("ev3_colorSensorBlue", 1),
    f("ev3_reflectedLightIntensity", 1),
    f("ev3_ambientLightIntensity", 1),
    f("ev3_colorSensorGetColor", 1),
    f("ev3_ultrasonicSensor", 0),
    f("ev3_ultrasonicSensorDistance", 1),
    f("ev3_gyroSensor", 0),
    f("ev3_gyroSensorAngle", 1),
    f("ev3_gyroSensorRate", 1),
    f("ev3_touchSensor1", 0),
    f("ev3_touchSensor2", 0),
    f("ev3_touchSensor3", 0),
    f("ev3_touchSensor4", 0),
    f("ev3_touchSensorPressed", 1),
    f("ev3_hello", 0),
    f("ev3_waitForButtonPress", 0),
    f("ev3_speak", 1),
    f("ev3_playSequence", 1),
];

/// All supported device types.
pub const DEVICE_TYPES: &[DeviceType] = &[DeviceType {
    id: "ev3",
    name: "Lego Mindstorms EV3",
    chapter: 3,
    variant: Variant::Default,
    library: ExternalLibrary::Ev3,
    internal_functions: EV3_FUNCTIONS,
}];

/// Look up a device type by registry key, ignoring case.
#[must_use]
pub fn lookup(device_type: &str) -> Option<&'static DeviceType> {
    DEVICE_TYPES
        .iter()
        .find(|t| t.id.eq_ignore_ascii_case(device_type))
}
