//! Timer and tick-source utilities for the DALI driver.
//!
//! The engine needs a tick every half-bit period Te (~417 µs, i.e. 2400
//! ticks per second at 1200 baud). Two integrations are supported: a
//! hardware timer interrupt fanning out through
//! [`isr::IsrRegistry`] (feature `timer-isr`), or a blocking
//! delay loop via [`run_tick_loop`] for firmware that cannot spare an
//! interrupt.
//!
//! The OCR helpers compute the compare value for a CTC-mode timer from the
//! CPU clock and prescaler:
//!
//! | F_CPU  | PRESCALER | OCR for Te |
//! |--------|-----------|------------|
//! |  8 MHz |         1 |       3336 |
//! |  8 MHz |         8 |        417 |
//! | 16 MHz |         8 |        834 |
//! | 16 MHz |        64 |        104 |

use crate::consts::{DALI_BAUD, TE_US};
use libm::round;

mod delay;
pub use delay::*;

#[cfg(feature = "timer-isr")]
pub mod isr;

/// Half-bit periods per second (2400 at 1200 baud).
pub const TE_PER_SECOND: u32 = 2 * DALI_BAUD;

/// Computes the OCR value for a CTC-mode timer firing every Te.
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 1, 8, 64, 256)
///
/// # Returns
/// The compare value for OCRnA, rounded to the nearest integer.
pub fn compute_ocr_value(f_cpu: u32, prescaler: u32) -> u16 {
    let ticks_per_second = f_cpu as f64 / prescaler as f64;
    round(ticks_per_second * (TE_US as f64) / 1_000_000.0) as u16
}

/// Compile-time OCR value for a CTC-mode timer firing every Te.
///
/// Same contract as [`compute_ocr_value`], usable in const context.
pub const fn const_ocr_value(f_cpu: u32, prescaler: u32) -> u16 {
    // round-to-nearest without floating point
    let ticks = (f_cpu / prescaler) as u64;
    ((ticks * TE_US as u64 + 500_000) / 1_000_000) as u16
}
