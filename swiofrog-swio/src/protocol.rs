// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! WCH SWIO Wire Protocol Implementation
//!
//! This module implements the single wire SWIO protocol used to talk to the
//! debug module of WCH RISC-V MCUs such as the CH32V003.  It provides the
//! [`SwioProtocol`] struct for the bit level operations, and the
//! [`SwioLink`] trait, which is the interface the rest of this crate uses to
//! reach the debug module.
//!
//! The line is open-drain with a pull-up.  Every bit starts with the host
//! pulling the line low:
//!
//! ```text
//!          ___     ____________            _____
//!  1 bit:     |___|                 0 bit:      |______________|
//!             <t1><t1>                          <   4 x t1     ><t1>
//! ```
//!
//! To read a bit, the host pulls the line low for t1 and releases it.  The
//! target holds the line low for a while longer to signal a 0, or leaves it
//! to be pulled high to signal a 1.

use core::result::Result;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::SwioError;

/// Maximum number of times the line is polled, waiting for the target to
/// release it, when reading a bit.
pub const MAX_IN_TIMEOUT: u32 = 1000;

/// Smallest usable timing coefficient.  Below this the target cannot tell
/// a 1 from a 0.
pub const MIN_T1COEFF: u32 = 2;

// Time to leave the line idle after every frame.  2us is sometimes too
// short.
const POST_FRAME_DELAY_US: u32 = 8;

// Programming mode entry.  Pairs of (low, high) times, in units of t1.
const WAKE_PAIRS_1: [(u16, u16); 3] = [(32, 12), (36, 12), (392, 366)];
const WAKE_PAIRS_1_REPEATS: u32 = 1;
const WAKE_PAIRS_2: [(u16, u16); 4] = [(15, 12), (32, 12), (36, 12), (392, 366)];
const WAKE_PAIRS_2_REPEATS: u32 = 199;
const WAKE_PAIRS_3: [(u16, u16); 19] = [
    (15, 807),
    (24, 8),
    (32, 8),
    (24, 10),
    (20, 8),
    (239, 8),
    (32, 20),
    (8, 32),
    (24, 8),
    (32, 8),
    (26, 7),
    (20, 8),
    (239, 8),
    (32, 20),
    (8, 22),
    (24, 8),
    (24, 8),
    (31, 6),
    (25, 307),
];
const WAKE_PAIRS_3_REPEATS: u32 = 10;
const WAKE_LOW_US: u32 = 2000;

/// An open-drain GPIO, with a pull-up, connected to the target's SWIO pin.
///
/// Implemented by the firmware for its GPIO, and by test doubles.
pub trait SwioPin {
    /// Enables the output and drives the line high.
    fn set_high(&mut self);

    /// Enables the output and drives the line low.
    fn set_low(&mut self);

    /// Disables the output, leaving the line to the pull-up and the target.
    fn release_to_input(&mut self);

    /// Returns the current level of the line.
    fn read_level(&mut self) -> bool;
}

/// Busy-wait delays, used for bit timing.
pub trait PreciseDelay {
    /// Busy-waits for `n` timing ticks.  Bit timings are multiples of the
    /// link's t1 coefficient in these units.
    fn delay_cycles(&mut self, n: u32);

    /// Busy-waits for `us` microseconds.
    fn delay_us(&mut self, us: u32);
}

/// The register level interface to the target's debug module.
///
/// [`SwioProtocol`] implements this over a real wire.  Everything above the
/// frame layer - [`crate::SwioInterface`] and [`crate::DebugInterface`] -
/// only uses this trait, so it can be driven by a simulated target in tests.
pub trait SwioLink {
    /// Writes a 32-bit value to a debug module register.
    fn write_reg(&mut self, reg: u8, value: u32);

    /// Reads a 32-bit value from a debug module register.
    ///
    /// Returns:
    /// - `Ok(value)` - the value read
    /// - `Err(SwioError::BusFault)` - a bit of the frame timed out
    fn read_reg(&mut self, reg: u8) -> Result<u32, SwioError>;

    /// Busy-waits for `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Changes the bit timing coefficient.
    fn set_t1coeff(&mut self, t1coeff: u32);

    /// Sends the programming mode entry sequence.
    ///
    /// Returns:
    /// - `Ok(bool)` - whether the target appeared to respond.  This is not
    ///   reliable, and must only be used for logging.
    /// - `Err(SwioError)` - the line was held low
    fn enter_programming_mode(&mut self) -> Result<bool, SwioError>;

    /// Switches the target's power on or off.
    ///
    /// Returns:
    /// - `Err(SwioError::Unsupported)` if there is no power control pin
    fn set_power(&mut self, on: bool) -> Result<(), SwioError>;

    /// Whether the target's power can be switched.
    fn has_power_control(&self) -> bool;
}

/// SWIO Protocol object
///
/// This is used by [`crate::SwioInterface`] to communicate with the target.
/// It is not expected to be used directly by applications.
///
/// Create using `SwioProtocol::new()`, passing in the pin, the delay
/// provider and the timing coefficient.  Add a power control pin with
/// [`SwioProtocol::with_power_pin()`].
#[derive(Debug)]
pub struct SwioProtocol<P: SwioPin, D: PreciseDelay> {
    pin: P,
    delay: D,
    t1coeff: u32,
    power: Option<P>,
}

impl<P: SwioPin, D: PreciseDelay> SwioProtocol<P, D> {
    /// Create a new SWIO protocol instance.
    ///
    /// Arguments:
    /// - `pin`: The open-drain SWIO pin.
    /// - `delay`: Delay provider used for bit timing.
    /// - `t1coeff`: Length of the shortest pulse, in `delay` ticks.  Clamped
    ///   to [`MIN_T1COEFF`].
    ///
    /// Returns:
    /// - A new `SwioProtocol` instance, with the line idling high.
    pub fn new(mut pin: P, delay: D, t1coeff: u32) -> Self {
        pin.set_high();
        let t1coeff = t1coeff.max(MIN_T1COEFF);
        debug!("SWIO interface created, line high, t1coeff {t1coeff}");
        Self {
            pin,
            delay,
            t1coeff,
            power: None,
        }
    }

    /// Adds a pin that controls the target's power supply.  Power is
    /// switched on.
    pub fn with_power_pin(mut self, mut power: P) -> Self {
        power.set_high();
        self.power = Some(power);
        self
    }

    pub fn t1coeff(&self) -> u32 {
        self.t1coeff
    }

    #[inline]
    fn send_bit(&mut self, bit: bool) {
        let low = if bit { self.t1coeff } else { self.t1coeff * 4 };
        self.pin.set_low();
        self.delay.delay_cycles(low);
        self.pin.set_high();
        self.delay.delay_cycles(self.t1coeff);
    }

    #[inline]
    fn send_bits(&mut self, count: u32, data: u32) {
        for ii in (0..count).rev() {
            self.send_bit((data >> ii) & 1 == 1);
        }
    }

    // Clock out a bit slot and sample what the target does with it.
    #[inline]
    fn read_bit(&mut self) -> Result<bool, SwioError> {
        self.pin.set_low();
        self.delay.delay_cycles(self.t1coeff);
        self.pin.release_to_input();
        self.delay.delay_cycles(self.t1coeff * 2);
        let bit = self.pin.read_level();

        for _ in 0..MAX_IN_TIMEOUT {
            if self.pin.read_level() {
                self.pin.set_high();
                self.delay.delay_cycles(self.t1coeff / 2);
                return Ok(bit);
            }
        }

        // Drive high anyway, so we can carry on
        self.pin.set_high();
        Err(SwioError::BitTimeout)
    }

    #[inline]
    fn send_header(&mut self, reg: u8, write: bool) {
        self.send_bit(true);
        self.send_bits(7, reg as u32);
        self.send_bit(write);
    }

    fn execute_time_pairs(&mut self, pairs: &[(u16, u16)], repeats: u32) {
        for _ in 0..repeats {
            for &(low, high) in pairs {
                self.pin.set_low();
                self.delay
                    .delay_cycles((self.t1coeff * low as u32).saturating_sub(1));
                self.pin.set_high();
                self.delay
                    .delay_cycles((self.t1coeff * high as u32).saturating_sub(1));
            }
        }
    }
}

impl<P: SwioPin, D: PreciseDelay> SwioLink for SwioProtocol<P, D> {
    fn write_reg(&mut self, reg: u8, value: u32) {
        trace!("Exec:  Write reg 0x{reg:02X} <- 0x{value:08X}");
        critical_section::with(|_| {
            self.pin.set_high();
            self.send_header(reg, true);
            self.send_bits(32, value);
        });
        self.delay.delay_us(POST_FRAME_DELAY_US);
    }

    fn read_reg(&mut self, reg: u8) -> Result<u32, SwioError> {
        let result: Result<u32, SwioError> = critical_section::with(|_| {
            self.pin.set_high();
            self.send_header(reg, false);
            let mut value = 0u32;
            for _ in 0..32 {
                value <<= 1;
                if self.read_bit()? {
                    value |= 1;
                }
            }
            Ok(value)
        });

        match result {
            Ok(value) => {
                self.delay.delay_us(POST_FRAME_DELAY_US);
                trace!("Value: Read reg 0x{reg:02X} -> 0x{value:08X}");
                Ok(value)
            }
            Err(e) => {
                trace!("Error: Read reg 0x{reg:02X} failed: {e}");
                Err(SwioError::BusFault)
            }
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    fn set_t1coeff(&mut self, t1coeff: u32) {
        self.t1coeff = t1coeff.max(MIN_T1COEFF);
        debug!("SWIO t1coeff set to {}", self.t1coeff);
    }

    fn enter_programming_mode(&mut self) -> Result<bool, SwioError> {
        debug!("Exec:  Programming mode entry sequence");
        let result = critical_section::with(|_| {
            self.pin.set_high();
            self.execute_time_pairs(&WAKE_PAIRS_1, WAKE_PAIRS_1_REPEATS);
            self.execute_time_pairs(&WAKE_PAIRS_2, WAKE_PAIRS_2_REPEATS);
            self.execute_time_pairs(&WAKE_PAIRS_3, WAKE_PAIRS_3_REPEATS);

            // The target holds the line low here if it heard us, but this
            // isn't a reliable indication
            let bit = self.read_bit();

            self.pin.set_low();
            self.delay.delay_us(WAKE_LOW_US);
            self.pin.set_high();
            bit
        });
        self.delay.delay_us(1);

        let present = !result?;
        debug!("Info:  Programming mode entry, target present: {present}");
        Ok(present)
    }

    fn set_power(&mut self, on: bool) -> Result<(), SwioError> {
        match self.power.as_mut() {
            Some(pin) => {
                if on {
                    pin.set_high();
                } else {
                    pin.set_low();
                }
                debug!("Exec:  Target power {}", if on { "on" } else { "off" });
                Ok(())
            }
            None => Err(SwioError::Unsupported),
        }
    }

    fn has_power_control(&self) -> bool {
        self.power.is_some()
    }
}
