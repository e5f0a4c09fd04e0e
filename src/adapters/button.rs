//! Debounced manual-override button.
//!
//! Active-low momentary switch (GPIO0 "BOOT" on most boards).  The level
//! is sampled from the main loop; it must read low continuously for
//! [`DEBOUNCE_MS`] before the override counts as asserted, and a single
//! high sample releases it.
//!
//! Generic over `embedded_hal::digital::InputPin`, so the device binary
//! hands in an `esp_idf_hal::gpio::PinDriver` and tests a scripted pin.

use std::time::Instant;

use embedded_hal::digital::InputPin;
use log::{info, warn};

pub const DEBOUNCE_MS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressState {
    Released,
    Settling { since_ms: u32 },
    Held,
}

pub struct OverrideButton<P: InputPin> {
    pin: P,
    state: PressState,
    epoch: Instant,
    read_failed: bool,
}

impl<P: InputPin> OverrideButton<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            state: PressState::Released,
            epoch: Instant::now(),
            read_failed: false,
        }
    }

    /// Sample against the wall clock.
    pub fn poll(&mut self) -> bool {
        let now_ms = u32::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u32::MAX);
        self.sample(now_ms)
    }

    /// Sample the pin at `now_ms` (monotonic) and report whether the
    /// override is asserted after debouncing.
    pub fn sample(&mut self, now_ms: u32) -> bool {
        let low = match self.pin.is_low() {
            Ok(low) => {
                self.read_failed = false;
                low
            }
            Err(_) => {
                if !self.read_failed {
                    warn!("Button: pin read failed, treating as released");
                    self.read_failed = true;
                }
                false
            }
        };

        self.state = match (self.state, low) {
            (_, false) => PressState::Released,
            (PressState::Released, true) => PressState::Settling { since_ms: now_ms },
            (PressState::Settling { since_ms }, true) => {
                if now_ms.wrapping_sub(since_ms) >= DEBOUNCE_MS {
                    info!("Button: manual override asserted");
                    PressState::Held
                } else {
                    PressState::Settling { since_ms }
                }
            }
            (PressState::Held, true) => PressState::Held,
        };

        self.state == PressState::Held
    }

    pub fn is_held(&self) -> bool {
        self.state == PressState::Held
    }
}
