// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - Information about the ESP32-C3 running the firmware.

use alloc::format;
use alloc::string::{String, ToString};
use esp_hal::chip;
use esp_hal::clock::Clocks;
use esp_hal::system::Cpu;
use esp_hal::timer::systimer::{SystemTimer, Unit};

/// This swiofrog device.
pub struct Device;

impl Device {
    pub fn chip() -> String {
        chip!().to_string().to_ascii_uppercase()
    }

    pub fn uptime_secs() -> u64 {
        let uptime_ticks = SystemTimer::unit_value(Unit::Unit0);
        uptime_ticks / SystemTimer::ticks_per_second()
    }

    pub fn clock_speed_mhz() -> u32 {
        Clocks::get().cpu_clock.as_mhz()
    }

    pub fn heap_used() -> usize {
        esp_alloc::HEAP.used()
    }

    pub fn reset_reason() -> String {
        let cpu = Cpu::current();
        match esp_hal::rtc_cntl::reset_reason(cpu) {
            Some(reason) => format!("{reason:?}"),
            None => "Unknown".to_string(),
        }
    }
}
