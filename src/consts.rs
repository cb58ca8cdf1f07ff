//! Constants used across the DALI protocol implementation.
//!
//! This module defines the protocol-wide timing and sizing constants used
//! for bit-level transmission, edge classification, frame limits, and the
//! command layer's deadline budgets.
//!
//! These values follow IEC 62386-101 signal timing as exercised by common
//! control gear: a 1200 baud bit clock, bi-phase encoding at the half-bit
//! period Te, 2-byte forward frames and 1-byte backward frames.
//!
//! ## Key concepts
//!
//! - **Te**: the half-bit period, the shortest electrical pulse on the bus.
//!   One data bit occupies two Te under bi-phase encoding.
//! - **Tolerance window**: received edge-to-edge deltas are classified as
//!   1 Te or 2 Te within ±25%; anything else is a framing error.
//! - **Inter-frame spacing**: a transmission waits for 22 Te of idle bus,
//!   and a receive finalizes after more than 4 Te without edges (two stop
//!   bits plus margin).
//! - **Reply windows**: a backward frame must start within 10 ms of the
//!   forward frame; once bus activity is seen the window stretches to 25 ms
//!   to let the frame complete.

/// DALI bit rate in bits per second.
pub const DALI_BAUD: u32 = 1200;

/// Half-bit period Te in microseconds (~417 µs at 1200 baud).
///
/// Rounded to the nearest microsecond; one data bit spans `2 * TE_US`.
pub const TE_US: u32 = (1_000_000 + DALI_BAUD) / (2 * DALI_BAUD);

/// Shortest edge delta accepted as one Te (−25%).
pub const TE_MIN_US: u32 = (75 * TE_US) / 100;

/// Longest edge delta accepted as one Te (+25%).
///
/// The window must stay clear of `2 * TE_MIN_US` so that the 1 Te and 2 Te
/// classes never overlap.
pub const TE_MAX_US: u32 = (125 * TE_US) / 100;

/// Maximum number of data bits in one transmitted frame.
pub const MAX_FRAME_BITS: u8 = 32;

/// Transmit buffer size in bytes (`MAX_FRAME_BITS / 8`).
pub const TX_BUF_LEN: usize = 4;

/// Receive buffer size in bytes.
///
/// Backward frames are 1 byte; 3 bytes of headroom covers anything a
/// misbehaving or colliding transmitter can produce before the length check
/// rejects it.
pub const RX_BUF_LEN: usize = 3;

/// Idle periods (in Te) required on the bus before a transmission starts.
///
/// Enforces the inter-frame spacing of the standard: the transmitter state
/// machine stays in its start state until this much idle has accumulated.
pub const IDLE_TE_BEFORE_TX: u8 = 22;

/// Idle periods (in Te) after which an in-progress receive is finalized.
///
/// Two stop bits are 4 Te of non-asserted bus; more than that without an
/// edge means the frame is over.
pub const RX_STOP_IDLE_TE: u8 = 4;

/// Broadcast address byte (all devices).
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Highest assignable short address.
pub const SHORT_ADDRESS_MAX: u8 = 63;

/// Largest valid 24-bit random/search address.
pub const SEARCH_ADDRESS_MAX: u32 = 0x00FF_FFFF;

/// Default deadline for a blocking send, in milliseconds.
pub const DEFAULT_TX_TIMEOUT_MS: u16 = 500;

/// Time allowed for a backward frame to start after a forward frame, in
/// milliseconds.
pub const REPLY_START_TIMEOUT_MS: u16 = 10;

/// Total time allowed for a backward frame to complete once bus activity
/// has been seen, in milliseconds.
pub const REPLY_COMPLETE_TIMEOUT_MS: u16 = 25;

/// Number of COMPARE attempts before "no reply" is accepted as definitive.
///
/// Reply loss during commissioning is more often a sampling miss than a
/// true negative, so a compare is re-issued this many times.
pub const COMPARE_RETRIES: u8 = 2;

/// Number of attempts when staging a value into a data transfer register.
pub const DTR_RETRIES: u8 = 3;
