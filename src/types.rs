use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Temperature in the vendor's fixed-point unit: tenths of a degree Fahrenheit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Temperature(i32);

/// The frost-protection setpoint is fixed at 44.6°F.
pub const FROST_PROTECTION: Temperature = Temperature::from_raw(446);

impl Temperature {
    pub const fn from_raw(tenths_f: i32) -> Self {
        Self(tenths_f)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f * 10.0).round() as i32)
    }

    pub fn from_celsius(c: f64) -> Self {
        Self::from_fahrenheit(c * (9.0 / 5.0) + 32.0)
    }

    /// Parse a raw vendor field ("215", " 215 ", "215.0").
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(v) = raw.parse::<i32>() {
            return Some(Self(v));
        }
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| Self(v.round() as i32))
    }

    pub fn raw(&self) -> i32 {
        self.0
    }

    /// Raw value as the API expects it in form payloads.
    pub fn raw_string(&self) -> String {
        self.0.to_string()
    }

    pub fn fahrenheit(&self) -> f64 {
        f64::from(self.0) / 10.0
    }

    pub fn celsius(&self) -> f64 {
        (self.fahrenheit() - 32.0) * (5.0 / 9.0)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}F", self.fahrenheit())
    }
}

/// Operating mode (`gv_mode`) of a thermostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Comfort,
    Off,
    FrostProtection,
    Eco,
    Boost,
    Program,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Comfort,
        Mode::Off,
        Mode::FrostProtection,
        Mode::Eco,
        Mode::Boost,
        Mode::Program,
    ];

    pub fn as_code(&self) -> &'static str {
        match self {
            Mode::Comfort => "0",
            Mode::Off => "1",
            Mode::FrostProtection => "2",
            Mode::Eco => "3",
            Mode::Boost => "4",
            Mode::Program => "11",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "0" => Some(Mode::Comfort),
            "1" => Some(Mode::Off),
            "2" => Some(Mode::FrostProtection),
            "3" => Some(Mode::Eco),
            "4" => Some(Mode::Boost),
            "11" => Some(Mode::Program),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Comfort => "Comfort",
            Mode::Off => "Off",
            Mode::FrostProtection => "Frost Protection",
            Mode::Eco => "Eco",
            Mode::Boost => "Boost",
            Mode::Program => "Program",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Mode::ALL.into_iter().find(|m| m.label() == label)
    }

    /// Device field holding this mode's target temperature. `None` when off.
    pub fn setpoint_field(&self) -> Option<&'static str> {
        match self {
            Mode::Comfort => Some("consigne_confort"),
            Mode::Off => None,
            Mode::FrostProtection => Some("consigne_hg"),
            Mode::Eco => Some("consigne_eco"),
            Mode::Boost => Some("consigne_boost"),
            Mode::Program => Some("consigne_manuel"),
        }
    }

    /// Setpoint fields written when switching to this mode with `value`.
    /// Off and frost protection ignore `value`.
    pub fn setpoints(&self, value: Temperature) -> Vec<(&'static str, String)> {
        let v = value.raw_string();
        match self {
            Mode::Comfort => vec![("consigne_confort", v.clone()), ("consigne_manuel", v)],
            Mode::Off => vec![("consigne_manuel", "0".to_string())],
            Mode::FrostProtection => {
                let frost = FROST_PROTECTION.raw_string();
                vec![("consigne_hg", frost.clone()), ("consigne_manuel", frost)]
            }
            Mode::Eco => vec![("consigne_eco", v.clone()), ("consigne_manuel", v)],
            Mode::Boost => vec![("consigne_boost", v.clone()), ("consigne_manuel", v)],
            Mode::Program => vec![("consigne_manuel", v)],
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacMode {
    Heat,
    Cool,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacAction {
    Off,
    Idle,
    Heating,
    Cooling,
}

/// A single thermostat as cached from the API. Scalars stay in the vendor's
/// string form; unknown keys are kept in `extra` so the record round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_device: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gv_mode: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nv_mode: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub temperature_air: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub consigne_confort: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub consigne_hg: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub consigne_eco: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub consigne_boost: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub consigne_manuel: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub min_set_point: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub max_set_point: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub heating_up: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub heat_cool: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error_code: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    pub fn mode(&self) -> Option<Mode> {
        Mode::from_code(&self.gv_mode)
    }

    pub fn air_temperature(&self) -> Option<Temperature> {
        Temperature::parse(&self.temperature_air)
    }

    pub fn setpoint(&self, mode: Mode) -> Option<Temperature> {
        mode.setpoint_field()
            .and_then(|field| self.field(field))
            .and_then(Temperature::parse)
    }

    /// Target of the active mode; `None` when off or the mode is unknown.
    pub fn target_temperature(&self) -> Option<Temperature> {
        self.mode().and_then(|m| self.setpoint(m))
    }

    pub fn min_temperature(&self) -> Option<Temperature> {
        match self.mode() {
            Some(Mode::FrostProtection) => Some(FROST_PROTECTION),
            _ => Temperature::parse(&self.min_set_point),
        }
    }

    pub fn max_temperature(&self) -> Option<Temperature> {
        match self.mode() {
            Some(Mode::FrostProtection) => Some(FROST_PROTECTION),
            _ => Temperature::parse(&self.max_set_point),
        }
    }

    pub fn is_heating(&self) -> bool {
        !self.heating_up.is_empty() && self.heating_up != "0"
    }

    pub fn is_cooling_mode(&self) -> bool {
        self.heat_cool == "1"
    }

    /// `None` for a mode code this crate does not know.
    pub fn hvac_mode(&self) -> Option<HvacMode> {
        match self.mode()? {
            Mode::Off => Some(HvacMode::Off),
            _ if self.is_cooling_mode() => Some(HvacMode::Cool),
            _ => Some(HvacMode::Heat),
        }
    }

    pub fn hvac_action(&self) -> HvacAction {
        match (self.is_heating(), self.mode()) {
            (false, Some(Mode::Off)) => HvacAction::Off,
            (false, _) => HvacAction::Idle,
            (true, _) if self.is_cooling_mode() => HvacAction::Cooling,
            (true, _) => HvacAction::Heating,
        }
    }

    /// Identifier the push endpoint expects for this device.
    pub fn push_id(&self) -> &str {
        if self.id_device.is_empty() {
            &self.id
        } else {
            &self.id_device
        }
    }

    /// Write the state a successful push of `mode`/`value` will produce.
    pub fn apply(&mut self, mode: Mode, value: Temperature) {
        self.gv_mode = mode.as_code().to_string();
        self.nv_mode = mode.as_code().to_string();
        for (name, v) in mode.setpoints(value) {
            if let Some(slot) = self.field_mut(name) {
                *slot = v;
            }
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        let v = match name {
            "consigne_confort" => &self.consigne_confort,
            "consigne_hg" => &self.consigne_hg,
            "consigne_eco" => &self.consigne_eco,
            "consigne_boost" => &self.consigne_boost,
            "consigne_manuel" => &self.consigne_manuel,
            _ => return None,
        };
        Some(v.as_str())
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut String> {
        match name {
            "consigne_confort" => Some(&mut self.consigne_confort),
            "consigne_hg" => Some(&mut self.consigne_hg),
            "consigne_eco" => Some(&mut self.consigne_eco),
            "consigne_boost" => Some(&mut self.consigne_boost),
            "consigne_manuel" => Some(&mut self.consigne_manuel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default, deserialize_with = "lenient_string")]
    pub zone_label: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub devices: Vec<Device>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartHome {
    #[serde(deserialize_with = "lenient_string")]
    pub smarthome_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub zones: Vec<Zone>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SmartHome {
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.zones.iter().flat_map(|z| z.devices.iter())
    }
}

/// Time since a smart home's hub last reached the cloud.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LastCommunication {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub days: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub hours: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub minutes: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub seconds: u64,
}

impl LastCommunication {
    /// Total elapsed time, saturating at `u64::MAX` seconds.
    pub fn as_duration(&self) -> Duration {
        let secs = self
            .days
            .saturating_mul(86_400)
            .saturating_add(self.hours.saturating_mul(3_600))
            .saturating_add(self.minutes.saturating_mul(60))
            .saturating_add(self.seconds);
        Duration::from_secs(secs)
    }
}

impl fmt::Display for LastCommunication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} days, {} hours, {} minutes and {} seconds.",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Events emitted when a load or reload changes cached devices.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DeviceAdded { smarthome_id: String, device_id: String },
    DeviceRemoved { smarthome_id: String, device_id: String },
    ModeChanged { smarthome_id: String, device_id: String, mode: Option<Mode> },
    TemperatureChanged { smarthome_id: String, device_id: String, temp: Temperature },
    HeatingChanged { smarthome_id: String, device_id: String, heating: bool },
    DeviceField { smarthome_id: String, device_id: String, field: String, value: Value },
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if b { "1" } else { "0" }.to_string()),
        other => Err(de::Error::custom(format!("expected a scalar, got {other}"))),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| de::Error::custom(format!("expected a non-negative integer, got {n}"))),
        Value::String(s) => s.trim().parse().map_err(de::Error::custom),
        Value::Null => Ok(0),
        other => Err(de::Error::custom(format!("expected an integer, got {other}"))),
    }
}

fn null_as_empty<'de, D, T>(d: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}
