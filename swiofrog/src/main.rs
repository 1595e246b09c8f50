// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - Default Firmware
//!
//! Programs and debugs CH32V003 targets over their single wire SWIO
//! interface, and provides a terminal to them.  The host talks to swiofrog
//! over the ESP32-C3's built-in USB serial port.
//!
//! Features can be set when building to enable/disable functionality:
//! - `power-gate`: The target's 3V3 is switched by GPIO3, allowing the
//!   target to be power cycled to unbrick it.
//!
//! Pins:
//! - GPIO10 - target SWIO.
//! - GPIO3 - target power gate (`power-gate`).
//! - GPIO5/GPIO6 - target UART RX/TX, for the UART terminal.
//!
//! To change other configuration:
//! - `HEAP_SIZE`: Size of the heap used by the application.
//! - `target::REQUEST_CHANNEL_SIZE` is the number of outstanding requests
//!   that can be sent to the Target task.  This is set in `target/mod.rs`.
//! - `transport::LINE_MAX` is the longest request line accepted from the
//!   host.
//! - `uart::UART_BAUD` is the target's UART baud rate.

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![feature(type_alias_impl_trait)]
#![feature(impl_trait_in_assoc_type)]

extern crate alloc;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::uart::{Config as UartConfig, Uart};
use esp_hal::usb_serial_jtag::UsbSerialJtag;
use esp_hal::{clock::CpuClock, timer::timg::TimerGroup};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use static_cell::make_static;

use swiofrog_swio::config::Settings;

mod device;
mod error;
mod macros;
mod pin;
mod target;
mod transport;
mod uart;

use device::Device;
pub(crate) use error::SwiofrogError;
use pin::GpioPin;

include!(concat!(env!("OUT_DIR"), "/built.rs"));
pub const SWIOFROG_BUILD_TIME: &str = env!("SWIOFROG_BUILD_TIME");
pub const SWIOFROG_BUILD_DATE: &str = env!("SWIOFROG_BUILD_DATE");
pub const AUTHOR: &str = "Piers Finlayson";
pub const AUTHOR_EMAIL: &str = "piers@piers.rocks";

// Creates app-descriptor required by the esp-idf bootloader.  We specify
// custom values rather than using the default (), so we get the build time
// and date from the build environment variables.  Otherwise we get the build
// time and date of esp-bootloader-esp-idf.
esp_bootloader_esp_idf::esp_app_desc!(
    PKG_VERSION,
    PKG_NAME,
    SWIOFROG_BUILD_TIME,
    SWIOFROG_BUILD_DATE,
    esp_bootloader_esp_idf::ESP_IDF_COMPATIBLE_VERSION,
    esp_bootloader_esp_idf::MMU_PAGE_SIZE,
    0,
    u16::MAX
);

// Heap size for the application.  Holds an uploaded binary while it is
// flashed.
pub const HEAP_SIZE: usize = 64 * 1024;

// GPIO switching the target's power
#[cfg(feature = "power-gate")]
const POWER_GPIO: Option<u8> = Some(3);
#[cfg(not(feature = "power-gate"))]
const POWER_GPIO: Option<u8> = None;

// How often main logs that swiofrog is alive
const HEARTBEAT_DURATION: Duration = Duration::from_secs(60);

// Swiofrog default firmware's main function.
//
// This is kept nice and clean to make it easy to see the overall structure,
// which is:
// - Set up the HAL and the heap
// - Set up the SWIO link (`Target`) and start the Target task
// - Start the host transport tasks
// - Start the target UART tasks
// - Loop forever to prevent main from exiting.
#[esp_hal_embassy::main]
async fn main(spawner: Spawner) -> ! {
    // Set up the logger
    esp_println::logger::init_logger_from_env();

    info!("*** swiofrog v{PKG_VERSION} ***");
    info!("Value: Built {SWIOFROG_BUILD_DATE} {SWIOFROG_BUILD_TIME}");

    // Set up the HAL
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    info!(
        "Value: {} running at {}MHz, reset reason {}",
        Device::chip(),
        Device::clock_speed_mhz(),
        Device::reset_reason(),
    );

    // Set up the heap allocator
    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    // Initialize embassy
    let timg1 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timg1.timer0);

    // Set up the SWIO link and start the Target task
    let settings = Settings {
        power_pin: POWER_GPIO,
        ..Settings::default()
    };
    let swio_pin = GpioPin::swio(peripherals.GPIO10);
    #[cfg(feature = "power-gate")]
    let power_pin = Some(GpioPin::power(peripherals.GPIO3));
    #[cfg(not(feature = "power-gate"))]
    let power_pin = None;
    let target = target::Target::new(settings, swio_pin, power_pin);

    // Get the sender to send requests to the Target task.
    let target_request_sender = target.request_sender();
    let target = make_static!(target);
    spawner.must_spawn(target::task(target));

    // Start the host transport
    let usb = UsbSerialJtag::new(peripherals.USB_DEVICE).into_async();
    let (usb_rx, usb_tx) = usb.split();
    spawner.must_spawn(transport::rx_task(usb_rx, target_request_sender));
    spawner.must_spawn(transport::tx_task(usb_tx));

    // Start the target UART.  The terminal still works over SWIO without
    // it.
    let uart_config = UartConfig::default().with_baudrate(uart::UART_BAUD);
    match Uart::new(peripherals.UART1, uart_config) {
        Ok(uart) => {
            let uart = uart
                .with_rx(peripherals.GPIO5)
                .with_tx(peripherals.GPIO6)
                .into_async();
            let (uart_rx, uart_tx) = uart.split();
            spawner.must_spawn(uart::rx_task(uart_rx, target_request_sender));
            spawner.must_spawn(uart::tx_task(uart_tx));
        }
        Err(e) => error!("Error: Failed to set up target UART: {e:?}"),
    }

    info!("OK:    swiofrog ready");

    loop {
        Timer::after(HEARTBEAT_DURATION).await;
        debug!(
            "Info:  Uptime {}s, heap used {}",
            Device::uptime_secs(),
            Device::heap_used()
        );
    }
}
