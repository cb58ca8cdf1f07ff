//! Bit-level DALI bus transceiver.
//!
//! This module provides the [`DaliDriver`] struct, the timer- and
//! edge-driven engine that puts bi-phase encoded frames on the bus and
//! decodes the frames other transmitters put there. It is the half of the
//! crate that runs in interrupt context; everything above it polls.
//!
//! Two entry points advance the engine:
//!
//! - [`tick()`](DaliDriver::tick) must be called every half-bit period
//!   (Te, ~417 µs). It drives the transmitter state machine and detects the
//!   end of a received frame (two stop bits of idle bus).
//! - [`pin_change()`](DaliDriver::pin_change) must be called whenever the
//!   bus electrical level changes. It timestamps the edge, classifies the
//!   delta since the previous edge as one or two half-bit periods, and
//!   shifts decoded bits into the receive buffer. It is also where a
//!   transmit collision is caught: if we are driving the bus high and an
//!   edge reports it low, someone else is asserting it.
//!
//! Platforms without a pin-change interrupt can call
//! [`poll_edges()`](DaliDriver::poll_edges) at a rate of at least four
//! samples per Te instead; the classification tolerance absorbs the
//! sampling jitter.
//!
//! ## Framing
//!
//! Every frame is one start bit, 8/16/24 data bits MSB-first, and two stop
//! bits. A data bit occupies two Te: logical 1 is low-then-high, logical 0
//! is high-then-low, and the start bit is encoded like a logical 1. The
//! stop bits are simply 4 Te of released (high) bus.
//!
//! ## Design notes
//!
//! This module does **not** know what the bytes mean — command encoding,
//! reply classification and timeouts live in [`crate::control`] and
//! [`crate::master`].

use crate::clock::MicrosClock;
use crate::consts::{
    IDLE_TE_BEFORE_TX, MAX_FRAME_BITS, RX_BUF_LEN, RX_STOP_IDLE_TE, TE_MAX_US, TE_MIN_US,
    TX_BUF_LEN,
};
use crate::error::{DaliError, DaliResult};
use embedded_hal::digital::{InputPin, OutputPin};
use heapless::Vec;

/// Callback invoked from [`DaliDriver::tick`] when a frame completes.
///
/// Receives the decoded bytes of the frame. Runs in interrupt context, so
/// implementations must be short and must not block.
pub type FrameHandler = fn(&[u8]);

/// Result of polling the transmitter, as seen by the sending side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TxStatus {
    /// No transmission in progress.
    Idle,
    /// A frame is being clocked out (or waiting for its idle timeslot).
    Transmitting,
    /// The last transmission was aborted by a bus collision.
    ///
    /// Reading this status clears the condition.
    Collision,
}

/// Transmitter progress, one state per half-bit period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    Start,
    StartX,
    Bit,
    BitX,
    Stop1,
    Stop1X,
    Stop2,
    Stop2X,
    Stop3,
}

/// Receiver progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    Start,
    Bit,
}

const fn is_te(dt: u32) -> bool {
    TE_MIN_US <= dt && dt <= TE_MAX_US
}

const fn is_2te(dt: u32) -> bool {
    2 * TE_MIN_US <= dt && dt <= 2 * TE_MAX_US
}

/// Dispatch surface for interrupt fan-out.
///
/// The platform adaptation layer (see [`crate::timer::isr`]) only needs the
/// two interrupt-context entry points, so registries and hooks are written
/// against this trait rather than the full driver type.
pub trait BusEngine {
    /// Advance the engine by one half-bit period.
    fn tick(&mut self);
    /// Notify the engine of a bus level change.
    fn pin_change(&mut self);
}

/// A software DALI bus transceiver over two GPIOs and a microsecond clock.
///
/// ## Type parameters
///
/// - `TX`: an [`OutputPin`] driving the bus; `set_low` asserts the bus.
/// - `RX`: an [`InputPin`] reading the bus level back, including our own
///   transmissions (required for collision detection).
/// - `CLK`: a [`MicrosClock`]; a `FnMut() -> u32` closure works.
///
/// ## Ownership
///
/// All mutable state lives here and is written only by the interrupt-side
/// entry points; the polling side reads and clears it through
/// [`take_frame`](Self::take_frame) and [`tx_status`](Self::tx_status).
/// When interrupts are in play, wrap the driver in a
/// [`crate::timer::isr::IsrRegistry`] so both sides go through a critical
/// section.
///
/// ## Example
///
/// ```rust
/// # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
/// use dali_master::driver::DaliDriver;
///
/// # let tx_pin = Pin::new(&[PinTransaction::set(PinState::High)]);
/// # let rx_pin = Pin::new(&[]);
/// let mut driver = DaliDriver::new(tx_pin, rx_pin, || 0u32);
/// driver.tick(); // called every Te by a timer interrupt or delay loop
/// # let (mut tx_pin, mut rx_pin, _) = driver.release();
/// # tx_pin.done();
/// # rx_pin.done();
/// ```
#[derive(Debug)]
pub struct DaliDriver<TX, RX, CLK>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
{
    tx: TX,
    rx: RX,
    clock: CLK,

    tx_state: TxState,
    /// Frame being transmitted, MSB of byte 0 first.
    tx_msg: [u8; TX_BUF_LEN],
    /// Number of data bits to transmit.
    tx_len: u8,
    /// Current bit position within `tx_msg`.
    tx_pos: u8,
    /// Level we believe we are driving; low means asserted.
    tx_bus_low: bool,
    tx_collision: bool,

    rx_state: RxState,
    rx_msg: [u8; RX_BUF_LEN],
    /// Byte length of the last completed frame; 0 = none.
    rx_len: u8,
    /// Half-bits received since the start bit; -1 until the first push.
    rx_halfbits: i8,
    rx_last_low: bool,
    rx_last_ts: u32,
    /// Any edge seen while not transmitting, since the last transmission.
    rx_activity: bool,
    rx_malformed: u16,
    /// Level seen by the last `poll_edges` sample.
    rx_sampled_low: bool,

    /// Half-bit periods since the last bus edge, saturating.
    bus_idle_te: u8,

    handler: Option<FrameHandler>,
}

impl<TX, RX, CLK> DaliDriver<TX, RX, CLK>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
{
    /// Creates a new driver and releases the bus (drives the TX pin high).
    ///
    /// # Arguments
    /// - `tx`: output pin asserting the bus (low = asserted).
    /// - `rx`: input pin reading the bus level.
    /// - `clock`: free-running microsecond counter.
    pub fn new(tx: TX, rx: RX, clock: CLK) -> Self {
        #[allow(unused_mut)]
        let mut tx = tx;
        let _ = tx.set_high(); // bus idles non-asserted
        Self {
            tx,
            rx,
            clock,
            tx_state: TxState::Idle,
            tx_msg: [0; TX_BUF_LEN],
            tx_len: 0,
            tx_pos: 0,
            tx_bus_low: false,
            tx_collision: false,
            rx_state: RxState::Idle,
            rx_msg: [0; RX_BUF_LEN],
            rx_len: 0,
            rx_halfbits: -1,
            rx_last_low: false,
            rx_last_ts: 0,
            rx_activity: false,
            rx_malformed: 0,
            rx_sampled_low: false,
            bus_idle_te: 0,
            handler: None,
        }
    }

    /// Registers (or clears) the unsolicited-receive callback.
    ///
    /// The handler fires for *every* completed frame, including backward
    /// frames a blocking exchange is waiting for, and runs in interrupt
    /// context.
    pub fn set_frame_handler(&mut self, handler: Option<FrameHandler>) {
        self.handler = handler;
    }

    /// Current clock reading, for deadline bookkeeping in the layers above.
    pub fn now_us(&mut self) -> u32 {
        self.clock.now_us()
    }

    fn drive_low(&mut self) {
        let _ = self.tx.set_low();
        self.tx_bus_low = true;
    }

    fn drive_high(&mut self) {
        let _ = self.tx.set_high();
        self.tx_bus_low = false;
    }

    fn current_bit(&self) -> bool {
        let pos = usize::from(self.tx_pos >> 3);
        let mask = 1u8 << (7 - (self.tx_pos & 0x7));
        self.tx_msg[pos] & mask != 0
    }

    /// Advances the engine by one half-bit period.
    ///
    /// Must be called every Te (417 µs), from a timer interrupt or a delay
    /// loop. Drives the transmitter through start, data and stop phases,
    /// and finalizes a receive once the bus has idled for more than
    /// [`RX_STOP_IDLE_TE`] periods.
    pub fn tick(&mut self) {
        if self.bus_idle_te != u8::MAX {
            self.bus_idle_te += 1;
        }

        // send start bit, data bits, 2 stop bits
        match self.tx_state {
            TxState::Idle => {}
            TxState::Start => {
                // wait for the inter-frame timeslot, then assert the start bit
                if self.bus_idle_te >= IDLE_TE_BEFORE_TX {
                    self.drive_low();
                    self.tx_state = TxState::StartX;
                }
            }
            TxState::StartX => {
                self.drive_high();
                self.tx_pos = 0;
                self.tx_state = TxState::Bit;
            }
            TxState::Bit => {
                if self.current_bit() {
                    self.drive_low();
                } else {
                    self.drive_high();
                }
                self.tx_state = TxState::BitX;
            }
            TxState::BitX => {
                if self.current_bit() {
                    self.drive_high();
                } else {
                    self.drive_low();
                }
                self.tx_pos += 1;
                self.tx_state = if self.tx_pos < self.tx_len {
                    TxState::Bit
                } else {
                    TxState::Stop1
                };
            }
            TxState::Stop1 => {
                self.drive_high();
                self.tx_state = TxState::Stop1X;
            }
            TxState::Stop1X => self.tx_state = TxState::Stop2,
            TxState::Stop2 => self.tx_state = TxState::Stop2X,
            TxState::Stop2X => self.tx_state = TxState::Stop3,
            TxState::Stop3 => {
                // frame done; open a clean reply window
                self.bus_idle_te = 0;
                self.tx_state = TxState::Idle;
                self.rx_state = RxState::Idle;
                self.rx_len = 0;
                self.rx_activity = false;
                self.rx_last_low = false;
            }
        }

        // receiver stop-bit detection
        if self.rx_state == RxState::Bit && self.bus_idle_te > RX_STOP_IDLE_TE {
            self.rx_state = RxState::Idle;
            let bits = ((i16::from(self.rx_halfbits) + 1) >> 1) as u8;
            let bytes = bits >> 3;
            if bits != 0 && bits & 0x7 == 0 && usize::from(bytes) <= RX_BUF_LEN {
                self.rx_len = bytes;
                if let Some(handler) = self.handler {
                    handler(&self.rx_msg[..usize::from(bytes)]);
                }
            } else {
                // partial byte or overlong burst
                self.rx_malformed = self.rx_malformed.saturating_add(1);
            }
        }
    }

    /// Notifies the engine that the bus level changed.
    ///
    /// Wire this to a pin-change interrupt on the RX pin. Reads the new
    /// level and the clock, then feeds the edge to the decoder (or to the
    /// transmit collision check while a transmission is in flight).
    pub fn pin_change(&mut self) {
        let bus_low = self.rx.is_low().unwrap_or(false);
        self.rx_sampled_low = bus_low;
        self.handle_edge(bus_low);
    }

    /// Samples the bus and synthesizes a `pin_change` on a level change.
    ///
    /// Fallback for platforms without a pin-change interrupt: call at four
    /// or more samples per Te. The ±25% classification window absorbs the
    /// quantization this introduces.
    pub fn poll_edges(&mut self) {
        let bus_low = self.rx.is_low().unwrap_or(false);
        if bus_low != self.rx_sampled_low {
            self.rx_sampled_low = bus_low;
            self.handle_edge(bus_low);
        }
    }

    fn handle_edge(&mut self, bus_low: bool) {
        let ts = self.clock.now_us();
        self.bus_idle_te = 0;

        if self.tx_state != TxState::Idle {
            // transmitting high but the bus reads low: someone else is
            // asserting it
            if bus_low && !self.tx_bus_low {
                self.tx_state = TxState::Idle;
                self.tx_collision = true;
            }
            return;
        }

        self.rx_activity = true;

        if bus_low == self.rx_last_low {
            return;
        }
        let dt = ts.wrapping_sub(self.rx_last_ts);
        self.rx_last_ts = ts;
        self.rx_last_low = bus_low;

        match self.rx_state {
            RxState::Idle => {
                if bus_low {
                    self.rx_state = RxState::Start;
                }
            }
            RxState::Start => {
                if bus_low || !is_te(dt) {
                    self.rx_state = RxState::Idle;
                } else {
                    self.rx_halfbits = -1;
                    self.rx_msg = [0; RX_BUF_LEN];
                    self.rx_state = RxState::Bit;
                }
            }
            RxState::Bit => {
                if is_te(dt) {
                    self.push_halfbit(bus_low);
                } else if is_2te(dt) {
                    self.push_halfbit(bus_low);
                    self.push_halfbit(bus_low);
                } else {
                    // delta matches neither class: drop the frame
                    self.rx_state = RxState::Idle;
                    self.rx_malformed = self.rx_malformed.saturating_add(1);
                }
            }
        }
    }

    /// Shifts one half-bit into the receive buffer.
    ///
    /// Only the first half-bit of each bit cell carries the decoded value;
    /// the logical bit is the inverse of the electrical level because the
    /// bus idles high.
    fn push_halfbit(&mut self, bus_low: bool) {
        let bit = u8::from(!bus_low);
        if self.rx_halfbits & 1 == 0 {
            let pos = (self.rx_halfbits >> 4) as usize;
            if pos < RX_BUF_LEN {
                self.rx_msg[pos] = (self.rx_msg[pos] << 1) | bit;
            }
        }
        if self.rx_halfbits != i8::MAX {
            self.rx_halfbits += 1;
        }
    }

    /// Queues a frame for transmission. Non-blocking.
    ///
    /// The transmission starts at the next tick once the bus has idled for
    /// [`IDLE_TE_BEFORE_TX`] periods.
    ///
    /// # Arguments
    /// - `data`: frame bytes, sent MSB-first starting at `data[0]`.
    /// - `bit_len`: number of data bits to send, `1..=32`.
    ///
    /// # Errors
    /// - [`DaliError::FrameTooLong`] if `bit_len` is 0, exceeds
    ///   [`MAX_FRAME_BITS`], or exceeds the bits available in `data`.
    /// - [`DaliError::BusNotIdle`] if a transmission is already in flight.
    pub fn send(&mut self, data: &[u8], bit_len: u8) -> DaliResult<()> {
        if bit_len == 0 || bit_len > MAX_FRAME_BITS || usize::from(bit_len) > data.len() * 8 {
            return Err(DaliError::FrameTooLong);
        }
        if self.tx_state != TxState::Idle {
            return Err(DaliError::BusNotIdle);
        }
        let bytes = usize::from(bit_len.div_ceil(8));
        self.tx_msg = [0; TX_BUF_LEN];
        self.tx_msg[..bytes].copy_from_slice(&data[..bytes]);
        self.tx_len = bit_len;
        self.tx_pos = 0;
        self.tx_collision = false;
        self.tx_state = TxState::Start;
        Ok(())
    }

    /// Reports the transmitter state.
    ///
    /// A latched collision is reported once and then cleared, so the caller
    /// must act on [`TxStatus::Collision`] when it sees it.
    pub fn tx_status(&mut self) -> TxStatus {
        if self.tx_collision {
            self.tx_collision = false;
            return TxStatus::Collision;
        }
        if self.tx_state != TxState::Idle {
            return TxStatus::Transmitting;
        }
        TxStatus::Idle
    }

    /// Polls for transmit completion in `nb` style.
    ///
    /// Returns `WouldBlock` while the frame is still being clocked out, an
    /// error if the transmission collided, and `Ok(())` once the bus is
    /// back to idle.
    pub fn poll_send_done(&mut self) -> nb::Result<(), DaliError> {
        match self.tx_status() {
            TxStatus::Transmitting => Err(nb::Error::WouldBlock),
            TxStatus::Collision => Err(nb::Error::Other(DaliError::Collision)),
            TxStatus::Idle => Ok(()),
        }
    }

    /// Takes the completed received frame, if any.
    ///
    /// Clears the buffer so the next frame can land; until then the frame
    /// is frozen.
    pub fn take_frame(&mut self) -> Option<Vec<u8, RX_BUF_LEN>> {
        if self.rx_len == 0 {
            return None;
        }
        let mut frame = Vec::new();
        let _ = frame.extend_from_slice(&self.rx_msg[..usize::from(self.rx_len)]);
        self.rx_len = 0;
        Some(frame)
    }

    /// Whether any bus activity has been seen since our last transmission.
    ///
    /// The blocking layer uses this to tell an empty reply window apart
    /// from a garbled one.
    pub fn rx_active(&self) -> bool {
        self.rx_activity || self.rx_state != RxState::Idle
    }

    /// Count of frames dropped for malformed timing or framing, saturating.
    pub fn malformed_frames(&self) -> u16 {
        self.rx_malformed
    }

    /// Consumes the driver and returns its pins and clock.
    pub fn release(self) -> (TX, RX, CLK) {
        (self.tx, self.rx, self.clock)
    }
}

impl<TX, RX, CLK> BusEngine for DaliDriver<TX, RX, CLK>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
{
    fn tick(&mut self) {
        DaliDriver::tick(self);
    }

    fn pin_change(&mut self) {
        DaliDriver::pin_change(self);
    }
}
