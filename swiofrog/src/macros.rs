// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - Macros

// Macro to handle transport timeouts
#[macro_export]
macro_rules! with_timeout {
    ($timeout:expr, $future:expr) => {
        match embassy_time::with_timeout($timeout, $future).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Error: Timeout occurred");
                return Err(SwiofrogError::Timeout);
            }
        }
    };
}
