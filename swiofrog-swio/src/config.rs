// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Runtime settings
//!
//! [`Settings`] holds everything the host can change at runtime.  It is
//! exchanged as JSON over the command protocol (`#g` and `#j;<json>`).
//!
//! Changes are applied with [`Settings::apply()`], which tells a
//! [`ConfigObserver`] about each group of settings that changed, so the
//! owner can react - for example, by disconnecting the terminal or passing
//! the new timing coefficient to the link.

use alloc::string::String;
use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::protocol::MIN_T1COEFF;

/// Firmware version reported in the settings, as version * 100.
pub const SW_VERSION: u32 = 70;

/// Default GPIO used for SWIO.
pub const DEFAULT_SWIO_PIN: u8 = 10;

/// Default bit timing coefficient.
pub const DEFAULT_T1COEFF: u32 = 7;

/// Default terminal flush interval.
pub const DEFAULT_POLL_DELAY_MS: u32 = 1000;

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Use the host UART for the terminal, instead of the SWIO mailbox
    pub uart: bool,

    /// GPIO connected to the target's SWIO pin
    pub swio_pin: u8,

    /// GPIO switching the target's power, if any.  `-1` in JSON for none.
    #[serde(
        serialize_with = "serialize_pin",
        deserialize_with = "deserialize_pin"
    )]
    pub power_pin: Option<u8>,

    /// Bit timing coefficient, in delay units.  Never less than
    /// [`MIN_T1COEFF`].
    pub t1coeff: u32,

    /// Interval at which buffered terminal output is sent to the host
    pub poll_delay_ms: u32,

    /// Send the programming mode entry sequence when initializing the link
    pub wake_sequence: bool,

    /// Firmware version.  Read only.
    pub sw_version: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            uart: false,
            swio_pin: DEFAULT_SWIO_PIN,
            power_pin: None,
            t1coeff: DEFAULT_T1COEFF,
            poll_delay_ms: DEFAULT_POLL_DELAY_MS,
            wake_sequence: false,
            sw_version: SW_VERSION,
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uart: {}, swio pin: {}, power pin: {:?}, t1coeff: {}, poll delay: {}ms, wake: {}",
            self.uart,
            self.swio_pin,
            self.power_pin,
            self.t1coeff,
            self.poll_delay_ms,
            self.wake_sequence
        )
    }
}

fn serialize_pin<S>(pin: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match pin {
        Some(pin) => serializer.serialize_i32(*pin as i32),
        None => serializer.serialize_i32(-1),
    }
}

fn deserialize_pin<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let pin = Option::<i32>::deserialize(deserializer)?;
    match pin {
        None => Ok(None),
        Some(pin) if pin < 0 => Ok(None),
        Some(pin) => u8::try_from(pin)
            .map(Some)
            .map_err(|_| serde::de::Error::custom("pin out of range")),
    }
}

/// Notified by [`Settings::apply()`] of changed settings.
pub trait ConfigObserver {
    /// The terminal has switched between UART and SWIO.
    fn on_uart_changed(&mut self, uart: bool);

    /// The SWIO or power pin has changed.
    fn on_pin_changed(&mut self, swio_pin: u8, power_pin: Option<u8>);

    /// The bit timing coefficient has changed.
    fn on_timing_changed(&mut self, t1coeff: u32);
}

impl Settings {
    /// Serializes the settings as JSON.
    pub fn to_json(&self) -> String {
        // Serializing a plain struct into a string can't fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Returns these settings with `json` merged over them.  Only the
    /// fields present in `json` change.
    ///
    /// Arguments:
    /// - `json`: A JSON object containing some or all of the settings.
    ///
    /// Returns:
    /// - `Ok(Settings)`: the merged settings.
    /// - `Err(serde_json::Error)`: if `json` isn't an object, or a field has
    ///   the wrong type.
    pub fn merged(&self, json: &str) -> Result<Settings, serde_json::Error> {
        let mut base = serde_json::to_value(self)?;
        let patch: Value = serde_json::from_str(json)?;
        match (&mut base, patch) {
            (Value::Object(base), Value::Object(patch)) => {
                for (key, value) in patch {
                    base.insert(key, value);
                }
            }
            _ => {
                return Err(serde::de::Error::custom("settings must be a JSON object"));
            }
        }
        serde_json::from_value(base)
    }

    /// Replaces these settings with `new`, telling `observer` what changed.
    ///
    /// The version is kept, and the timing coefficient is clamped to its
    /// minimum.
    pub fn apply(&mut self, new: Settings, observer: &mut impl ConfigObserver) {
        let mut new = new;
        new.sw_version = self.sw_version;
        new.t1coeff = new.t1coeff.max(MIN_T1COEFF);

        let old = core::mem::replace(self, new);
        debug!("Info:  Settings now {self}");

        if old.uart != self.uart {
            debug!("Note:  Terminal UART mode now {}", self.uart);
            observer.on_uart_changed(self.uart);
        }
        if old.swio_pin != self.swio_pin || old.power_pin != self.power_pin {
            debug!("Note:  Pins changed");
            observer.on_pin_changed(self.swio_pin, self.power_pin);
        }
        if old.t1coeff != self.t1coeff {
            debug!("Note:  t1coeff now {}", self.t1coeff);
            observer.on_timing_changed(self.t1coeff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        uart: Option<bool>,
        pins: Option<(u8, Option<u8>)>,
        t1coeff: Option<u32>,
    }

    impl ConfigObserver for Recorder {
        fn on_uart_changed(&mut self, uart: bool) {
            self.uart = Some(uart);
        }

        fn on_pin_changed(&mut self, swio_pin: u8, power_pin: Option<u8>) {
            self.pins = Some((swio_pin, power_pin));
        }

        fn on_timing_changed(&mut self, t1coeff: u32) {
            self.t1coeff = Some(t1coeff);
        }
    }

    #[test]
    fn defaults_and_legacy_power_pin() {
        let settings = Settings::default();
        assert_eq!(settings.swio_pin, 10);
        assert_eq!(settings.t1coeff, 7);
        assert_eq!(settings.sw_version, 70);

        let json = settings.to_json();
        assert!(json.contains(r#""power_pin":-1"#));

        let settings = settings.merged(r#"{"power_pin": 4}"#).unwrap();
        assert_eq!(settings.power_pin, Some(4));
        let settings = settings.merged(r#"{"power_pin": -1}"#).unwrap();
        assert_eq!(settings.power_pin, None);
        assert!(settings.merged(r#"{"power_pin": 300}"#).is_err());
    }

    #[test]
    fn merge_only_changes_given_fields() {
        let base = Settings {
            poll_delay_ms: 250,
            ..Settings::default()
        };
        let merged = base.merged(r#"{"t1coeff": 12}"#).unwrap();
        assert_eq!(merged.t1coeff, 12);
        assert_eq!(merged.poll_delay_ms, 250);

        assert!(base.merged("[1, 2]").is_err());
        assert!(base.merged(r#"{"uart": "yes"}"#).is_err());
    }

    #[test]
    fn apply_notifies_changes_only() {
        let mut settings = Settings::default();
        let mut recorder = Recorder::default();

        let new = settings
            .merged(r#"{"uart": true, "t1coeff": 1, "sw_version": 99}"#)
            .unwrap();
        settings.apply(new, &mut recorder);

        assert_eq!(recorder.uart, Some(true));
        assert_eq!(recorder.pins, None);
        assert_eq!(recorder.t1coeff, Some(MIN_T1COEFF));
        assert_eq!(settings.t1coeff, MIN_T1COEFF);
        assert_eq!(settings.sw_version, SW_VERSION);

        let mut recorder = Recorder::default();
        let new = settings.merged(r#"{"swio_pin": 3}"#).unwrap();
        settings.apply(new, &mut recorder);
        assert_eq!(recorder.pins, Some((3, None)));
        assert_eq!(recorder.uart, None);
        assert_eq!(recorder.t1coeff, None);
    }
}
