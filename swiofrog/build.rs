// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! build.rs for swiofrog firmware
//!
//! Stamps the build time into the app descriptor, writes `built.rs` for the
//! version banner, and adds the esp-hal linker script.

use jiff::Timestamp;
use std::env;
use std::process::exit;

fn main() {
    // Re-invoked by the linker when a symbol can't be resolved
    if let Some(symbol) = undefined_symbol() {
        explain_undefined(&symbol);
    }

    println!("cargo:rerun-if-env-changed=ESP_LOG");
    println!("cargo:rerun-if-changed=build.rs");

    // Same format as esp-bootloader-esp-idf, as esp_app_desc! consumes them
    let now = Timestamp::now();
    println!(
        "cargo::rustc-env=SWIOFROG_BUILD_TIME={}",
        now.strftime("%H:%M:%S")
    );
    println!(
        "cargo::rustc-env=SWIOFROG_BUILD_DATE={}",
        now.strftime("%Y-%m-%d")
    );

    if let Ok(script) = env::current_exe() {
        println!(
            "cargo:rustc-link-arg=--error-handling-script={}",
            script.display()
        );
    }
    // Must be the last linker script
    println!("cargo:rustc-link-arg=-Tlinkall.x");

    if let Err(e) = built::write_built_file() {
        panic!("Failed to write build information: {e}");
    }
}

/// The linker calls the error handling script as `<kind> <what>`.
fn undefined_symbol() -> Option<String> {
    let mut args = env::args().skip(1);
    let kind = args.next()?;
    let what = args.next();
    match (kind.as_str(), what) {
        ("undefined-symbol", Some(symbol)) => Some(symbol),
        _ => exit(1),
    }
}

fn explain_undefined(symbol: &str) -> ! {
    if symbol == "_stack_start" {
        eprintln!("\n💡 Is the linker script `linkall.x` missing?\n");
    }
    exit(0)
}
