//! Interrupt fan-out: a registration table for bus engines.
//!
//! Interrupt handlers are free functions, so the engines they advance have
//! to be reachable from static storage. Instead of ad-hoc process-wide
//! mutable hook variables, the platform adaptation layer owns an explicit
//! [`IsrRegistry`]: a fixed-size, `critical-section`-protected table that
//! engines are registered into, returning a slot handle for the polling
//! side.
//!
//! ```rust,ignore
//! use dali_master::driver::DaliDriver;
//! use dali_master::timer::isr::IsrRegistry;
//!
//! static DALI: IsrRegistry<DaliDriver<TxPin, RxPin, Clock>, 2> = IsrRegistry::new();
//!
//! #[interrupt]
//! fn TIMER1_COMPA() {
//!     DALI.timer_tick(); // every Te
//! }
//!
//! #[interrupt]
//! fn PCINT0() {
//!     DALI.pin_change(); // on bus edges
//! }
//! ```
//!
//! The polling side reaches a registered engine through
//! [`with_engine`](IsrRegistry::with_engine), or wholesale through
//! [`crate::master::SharedDriver`].

use crate::driver::BusEngine;
use core::cell::RefCell;
use core::fmt;
use critical_section::Mutex;
use heapless::Vec;

/// A fixed-size table of bus engines shared between interrupt handlers and
/// the polling context.
///
/// `N` is the maximum number of engines (bus interfaces) the firmware
/// drives; one is the common case.
pub struct IsrRegistry<D, const N: usize> {
    slots: Mutex<RefCell<Vec<D, N>>>,
}

impl<D: BusEngine, const N: usize> IsrRegistry<D, N> {
    /// Creates an empty registry, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Registers an engine, returning its slot index.
    ///
    /// Fails with the engine handed back when all `N` slots are taken.
    /// Slots are never vacated, so a returned index stays valid.
    pub fn register(&self, engine: D) -> Result<usize, D> {
        critical_section::with(|cs| {
            let mut slots = self.slots.borrow_ref_mut(cs);
            slots.push(engine)?;
            Ok(slots.len() - 1)
        })
    }

    /// Advances every registered engine by one half-bit period.
    ///
    /// Call from the Te-rate timer interrupt.
    pub fn timer_tick(&self) {
        critical_section::with(|cs| {
            for engine in self.slots.borrow_ref_mut(cs).iter_mut() {
                engine.tick();
            }
        });
    }

    /// Notifies every registered engine of a bus level change.
    ///
    /// Call from the pin-change interrupt. Engines whose bus did not
    /// actually change level ignore the call.
    pub fn pin_change(&self) {
        critical_section::with(|cs| {
            for engine in self.slots.borrow_ref_mut(cs).iter_mut() {
                engine.pin_change();
            }
        });
    }

    /// Runs `f` with exclusive access to the engine in `index`.
    ///
    /// Returns `None` for an unoccupied slot. The closure runs inside the
    /// critical section, so keep it short.
    pub fn with_engine<R>(&self, index: usize, f: impl FnOnce(&mut D) -> R) -> Option<R> {
        critical_section::with(|cs| {
            self.slots
                .borrow_ref_mut(cs)
                .get_mut(index)
                .map(|engine| f(engine))
        })
    }
}

impl<D, const N: usize> fmt::Debug for IsrRegistry<D, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsrRegistry").finish_non_exhaustive()
    }
}
