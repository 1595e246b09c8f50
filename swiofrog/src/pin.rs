// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - GPIO and delay drivers for the SWIO link

use esp_hal::delay::Delay;
use esp_hal::gpio::{DriveMode, Flex, InputConfig, InputPin, OutputConfig, OutputPin, Pull};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swiofrog_swio::protocol::{PreciseDelay, SwioPin};

/// A GPIO driving one of the target's lines.
///
/// The SWIO line is open-drain with a pull-up, so releasing it lets the
/// target drive it.  The power gate is push-pull.
#[derive(Debug)]
pub struct GpioPin<'d> {
    pin: Flex<'d>,
}

impl<'d> GpioPin<'d> {
    /// Creates the SWIO pin.
    ///
    /// Arguments:
    /// - `pin`: The pin connected to the target's SWIO pin.
    ///
    /// Returns:
    /// - A new `GpioPin`, with the line released high.
    pub fn swio(pin: impl InputPin + OutputPin + 'd) -> Self {
        let mut pin = Flex::new(pin);
        let input_config = InputConfig::default().with_pull(Pull::Up);
        pin.apply_input_config(&input_config);
        pin.set_input_enable(true);

        let output_config = OutputConfig::default()
            .with_drive_mode(DriveMode::OpenDrain)
            .with_pull(Pull::Up);
        pin.apply_output_config(&output_config);
        pin.set_high();
        pin.set_output_enable(true);

        debug!("SWIO pin created, open-drain with pull-up");
        Self { pin }
    }

    /// Creates the target power gate pin.  Power starts off - the link
    /// switches it on.
    pub fn power(pin: impl InputPin + OutputPin + 'd) -> Self {
        let mut pin = Flex::new(pin);
        let output_config = OutputConfig::default().with_drive_mode(DriveMode::PushPull);
        pin.apply_output_config(&output_config);
        pin.set_low();
        pin.set_output_enable(true);

        debug!("Power gate pin created, push-pull");
        Self { pin }
    }
}

impl SwioPin for GpioPin<'_> {
    #[inline]
    fn set_high(&mut self) {
        self.pin.set_high();
        self.pin.set_output_enable(true);
    }

    #[inline]
    fn set_low(&mut self) {
        self.pin.set_low();
        self.pin.set_output_enable(true);
    }

    #[inline]
    fn release_to_input(&mut self) {
        self.pin.set_output_enable(false);
    }

    #[inline]
    fn read_level(&mut self) -> bool {
        self.pin.is_high()
    }
}

/// Bit timing delays.  One tick is one CPU cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleDelay {
    delay: Delay,
}

impl Default for CycleDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleDelay {
    pub fn new() -> Self {
        Self {
            delay: Delay::new(),
        }
    }
}

impl PreciseDelay for CycleDelay {
    #[inline]
    fn delay_cycles(&mut self, n: u32) {
        riscv::asm::delay(n);
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_micros(us);
    }
}
