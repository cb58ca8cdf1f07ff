//! Blocking master transport: deadline-bounded send and command exchange.
//!
//! The transceiver ([`crate::driver`]) runs in interrupt context and never
//! blocks; this module is the polling side. [`DaliMaster`] busy-waits with
//! explicit deadlines against the driver's microsecond clock — there is no
//! asynchronous completion signal to wait on, so every blocking call is a
//! poll loop with a timeout and nothing blocks indefinitely.
//!
//! How the polling side reaches the driver depends on the integration, and
//! is abstracted by [`DriverAccess`]:
//!
//! - [`OwnedDriver`]: the master owns the driver and pumps it itself from a
//!   delay provider (tick every Te, edge sampling at Te/4). No interrupts
//!   required; right for simple firmware and for host-side tests.
//! - [`SharedDriver`] (feature `timer-isr`): the driver lives in a static
//!   [`IsrRegistry`](crate::timer::isr::IsrRegistry) advanced by the timer
//!   and pin-change interrupt handlers; the master takes the critical
//!   section only for the brief state inspections between delays.
//!
//! Either way, [`DaliMaster`] implements [`CommandLink`], so the whole
//! [`DaliCommands`](crate::control::DaliCommands) and
//! [`Commissioning`](crate::commissioning::Commissioning) surface is
//! available on it.

use crate::clock::MicrosClock;
use crate::consts::{
    DEFAULT_TX_TIMEOUT_MS, REPLY_COMPLETE_TIMEOUT_MS, REPLY_START_TIMEOUT_MS, TE_US,
};
use crate::control::CommandLink;
use crate::driver::{DaliDriver, TxStatus};
use crate::error::{DaliError, DaliResult};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

#[cfg(feature = "timer-isr")]
use crate::timer::isr::IsrRegistry;

/// How the polling context reaches the bus engine.
///
/// `with` runs a closure against the driver (taking whatever lock the
/// integration needs); `relax` burns one half-bit period of wall time,
/// advancing the engine if no interrupt source does.
pub trait DriverAccess {
    /// Bus drive pin type.
    type Tx: OutputPin;
    /// Bus read pin type.
    type Rx: InputPin;
    /// Microsecond clock type.
    type Clk: MicrosClock;

    /// Runs `f` with exclusive access to the driver.
    fn with<R>(&mut self, f: impl FnOnce(&mut DaliDriver<Self::Tx, Self::Rx, Self::Clk>) -> R)
    -> R;

    /// Waits roughly one Te between polls.
    fn relax(&mut self);
}

/// Delay-loop access: the master owns and pumps the driver.
///
/// Each [`relax`](DriverAccess::relax) samples the bus four times at Te/4
/// (synthesizing edges for the decoder) and advances the transmitter by one
/// tick. Use this when no timer/pin-change interrupts are wired up.
#[derive(Debug)]
pub struct OwnedDriver<TX, RX, CLK, D>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    /// The bus engine.
    pub driver: DaliDriver<TX, RX, CLK>,
    delay: D,
}

impl<TX, RX, CLK, D> OwnedDriver<TX, RX, CLK, D>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    /// Wraps a driver and a delay provider.
    pub fn new(driver: DaliDriver<TX, RX, CLK>, delay: D) -> Self {
        Self { driver, delay }
    }

    /// Consumes the wrapper and returns its parts.
    pub fn release(self) -> (DaliDriver<TX, RX, CLK>, D) {
        (self.driver, self.delay)
    }
}

impl<TX, RX, CLK, D> DriverAccess for OwnedDriver<TX, RX, CLK, D>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    type Tx = TX;
    type Rx = RX;
    type Clk = CLK;

    fn with<R>(&mut self, f: impl FnOnce(&mut DaliDriver<TX, RX, CLK>) -> R) -> R {
        f(&mut self.driver)
    }

    fn relax(&mut self) {
        for _ in 0..4 {
            self.delay.delay_us(TE_US / 4);
            self.driver.poll_edges();
        }
        self.driver.tick();
    }
}

/// Interrupt-mode access: the driver lives in an [`IsrRegistry`].
///
/// The timer and pin-change ISRs advance the engine; `relax` only delays,
/// and every inspection takes the registry's critical section.
#[cfg(feature = "timer-isr")]
#[derive(Debug)]
pub struct SharedDriver<TX, RX, CLK, D, const N: usize>
where
    TX: OutputPin + 'static,
    RX: InputPin + 'static,
    CLK: MicrosClock + 'static,
    D: DelayNs,
{
    registry: &'static IsrRegistry<DaliDriver<TX, RX, CLK>, N>,
    index: usize,
    delay: D,
}

#[cfg(feature = "timer-isr")]
impl<TX, RX, CLK, D, const N: usize> SharedDriver<TX, RX, CLK, D, N>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    /// Registers `driver` in `registry` and returns access bound to its
    /// slot.
    ///
    /// Fails with the driver handed back when the registry is full.
    pub fn new(
        registry: &'static IsrRegistry<DaliDriver<TX, RX, CLK>, N>,
        driver: DaliDriver<TX, RX, CLK>,
        delay: D,
    ) -> Result<Self, DaliDriver<TX, RX, CLK>> {
        let index = registry.register(driver)?;
        Ok(Self {
            registry,
            index,
            delay,
        })
    }
}

#[cfg(feature = "timer-isr")]
impl<TX, RX, CLK, D, const N: usize> DriverAccess for SharedDriver<TX, RX, CLK, D, N>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    type Tx = TX;
    type Rx = RX;
    type Clk = CLK;

    fn with<R>(&mut self, f: impl FnOnce(&mut DaliDriver<TX, RX, CLK>) -> R) -> R {
        // the slot is valid by construction and never vacated
        self.registry
            .with_engine(self.index, f)
            .expect("registered engine slot")
    }

    fn relax(&mut self) {
        self.delay.delay_us(TE_US);
    }
}

/// Blocking DALI master.
///
/// Owns the polling logic: waiting for the bus, retrying collided
/// transmissions, and classifying the backward-frame window. All waits are
/// bounded; the per-exchange deadline used by the [`CommandLink`] impl is
/// [`tx_timeout_ms`](Self::tx_timeout_ms).
#[derive(Debug)]
pub struct DaliMaster<A: DriverAccess> {
    access: A,
    /// Deadline applied to each exchange started through [`CommandLink`].
    pub tx_timeout_ms: u16,
}

impl<A: DriverAccess> DaliMaster<A> {
    /// Creates a master over the given driver access.
    pub fn new(access: A) -> Self {
        Self {
            access,
            tx_timeout_ms: DEFAULT_TX_TIMEOUT_MS,
        }
    }

    /// Borrows the underlying access (e.g. to reach the driver directly).
    pub fn access_mut(&mut self) -> &mut A {
        &mut self.access
    }

    /// Consumes the master and returns the access.
    pub fn into_access(self) -> A {
        self.access
    }

    fn elapsed_us(&mut self, since: u32) -> u32 {
        self.access.with(|d| d.now_us()).wrapping_sub(since)
    }

    /// Transmits a frame, waiting for the bus and retrying on collision
    /// until `timeout_ms` expires.
    ///
    /// # Errors
    /// - [`DaliError::FrameTooLong`] for invalid frames (checked up front).
    /// - [`DaliError::Timeout`] when the deadline expires waiting for the
    ///   bus, for completion, or across collision retries.
    pub fn send_blocking(&mut self, data: &[u8], bit_len: u8, timeout_ms: u16) -> DaliResult<()> {
        let start = self.access.with(|d| d.now_us());
        let budget_us = u32::from(timeout_ms) * 1000;
        loop {
            match self.access.with(|d| d.send(data, bit_len)) {
                Ok(()) => loop {
                    match self.access.with(|d| d.tx_status()) {
                        TxStatus::Idle => return Ok(()),
                        TxStatus::Collision => {
                            #[cfg(feature = "log")]
                            log::trace!("collision during transmit, retrying");
                            break;
                        }
                        TxStatus::Transmitting => {
                            if self.elapsed_us(start) > budget_us {
                                return Err(DaliError::Timeout);
                            }
                            self.access.relax();
                        }
                    }
                },
                Err(DaliError::BusNotIdle) => {}
                Err(e) => return Err(e),
            }
            if self.elapsed_us(start) > budget_us {
                return Err(DaliError::Timeout);
            }
            self.access.relax();
        }
    }

    /// Transmits a 2-byte forward frame and waits out the reply window.
    ///
    /// A backward frame must start within
    /// [`REPLY_START_TIMEOUT_MS`]; once any bus activity is
    /// seen the window stretches to [`REPLY_COMPLETE_TIMEOUT_MS`] so the
    /// frame can finish.
    ///
    /// Returns the reply byte, or `None` for a quiet window (the normal
    /// outcome for commands without a reply).
    ///
    /// # Errors
    /// - [`DaliError::InvalidReply`] for a frame of any length but one.
    /// - [`DaliError::Collision`] when the window saw activity that never
    ///   became a decodable frame (e.g. superimposed replies).
    /// - Transmit-side errors from [`send_blocking`](Self::send_blocking).
    pub fn transmit_command(
        &mut self,
        cmd0: u8,
        cmd1: u8,
        timeout_ms: u16,
    ) -> DaliResult<Option<u8>> {
        self.send_blocking(&[cmd0, cmd1], 16, timeout_ms)?;

        let start = self.access.with(|d| d.now_us());
        let mut window_us = u32::from(REPLY_START_TIMEOUT_MS) * 1000;
        loop {
            let (frame, active) = self.access.with(|d| (d.take_frame(), d.rx_active()));
            if let Some(frame) = frame {
                return match frame.as_slice() {
                    [reply] => Ok(Some(*reply)),
                    _ => Err(DaliError::InvalidReply),
                };
            }
            if active {
                window_us = u32::from(REPLY_COMPLETE_TIMEOUT_MS) * 1000;
            }
            if self.elapsed_us(start) > window_us {
                // activity that never decoded is a garbled (collided) reply
                return if active {
                    Err(DaliError::Collision)
                } else {
                    Ok(None)
                };
            }
            self.access.relax();
        }
    }
}

impl<A: DriverAccess> CommandLink for DaliMaster<A> {
    fn transact(&mut self, cmd0: u8, cmd1: u8) -> DaliResult<Option<u8>> {
        let timeout = self.tx_timeout_ms;
        self.transmit_command(cmd0, cmd1, timeout)
    }
}
