//! # dali-master
//!
//! A portable, no_std Rust master driver for the DALI (IEC 62386) two-wire
//! lighting control bus, suitable for bit-banged bus interfaces built from a
//! pair of GPIOs and an optocoupler stage.
//!
//! This driver implements the master side of the protocol in software using:
//! - `embedded-hal` traits for the bus drive/read pins
//! - a timer tick at the half-bit period (Te, ~417 µs) driving the
//!   transmitter state machine
//! - bus-edge timestamps driving the receiver's bi-phase decoder
//! - interrupt-safe engine access with `critical-section`
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support (host-side tools and tests) |
//! | `timer-isr` (default) | Interrupt integration: [`timer::isr::IsrRegistry`] and shared engine access |
//! | `log`                 | Uses `log` logging in the polling-context layers |
//! | `defmt-0-3`           | Uses `defmt` formatting for public types |
//!
//! ## Software features
//!
//! - **Transmitter and receiver** in pure software (no UART peripheral)
//! - Bi-phase line coding with start/stop framing, collision detection and
//!   inter-frame spacing per IEC 62386-101
//! - Blocking command layer: forward frame out, backward frame in, with
//!   deadline-bounded busy-wait polling
//! - **Commissioning**: randomise/compare binary search over the 24-bit
//!   address space, assigning unique short addresses to every device
//!
//! ## Usage
//!
//! The engine needs three capabilities, passed in by construction: an output
//! pin that asserts the bus (drives it low), an input pin that reads the bus
//! level, and a monotonic microsecond clock.
//!
//! ```rust,ignore
//! use dali_master::driver::DaliDriver;
//! use dali_master::master::{DaliMaster, OwnedDriver};
//! use dali_master::control::DaliCommands;
//! use dali_master::commissioning::{Commissioning, CommissionScope};
//!
//! let driver = DaliDriver::new(tx_pin, rx_pin, || timer.now_us());
//! let mut master = DaliMaster::new(OwnedDriver::new(driver, delay));
//!
//! master.set_level(128, dali_master::consts::BROADCAST_ADDRESS)?;
//! let assigned = master.commission(CommissionScope::Unaddressed)?;
//! ```
//!
//! With the `timer-isr` feature the driver instead lives in a static
//! [`timer::isr::IsrRegistry`] that the timer and pin-change interrupt
//! handlers fan out to; see [`master::SharedDriver`].
//!
//! ## Integration notes
//!
//! - `tick()` must be called every Te (417 µs); timing precision directly
//!   limits decode reliability, so a hardware timer is recommended.
//! - `pin_change()` should be wired to a pin-change interrupt on the bus
//!   read pin. Platforms without one can fall back to
//!   [`driver::DaliDriver::poll_edges`] sampling at Te/4.
//! - The bus idles high (non-asserted); a transmission holds off until the
//!   bus has been idle for 22 Te.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "timer-isr")]
pub use critical_section;

pub use heapless;

pub mod clock;
pub mod commands;
pub mod commissioning;
pub mod consts;
pub mod control;
pub mod driver;
pub mod error;
pub mod master;
pub mod timer;
