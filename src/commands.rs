//! DALI command words and forward-frame encoding.
//!
//! A command is carried in this crate as a 16-bit word: the low byte is the
//! opcode (or, for special commands, the literal first frame byte), bit 8
//! marks a *special* command and bit 9 marks a command the standard
//! requires to be transmitted twice within 100 ms.
//!
//! Encoding a command plus its argument into the two physical frame bytes
//! depends on the addressing convention:
//!
//! - **Regular commands** (`YAAAAAAS` addressing): the argument is the
//!   target address byte and must match one of the reserved address
//!   patterns — short address `0AAAAAA`, group address `100AAAA`, or
//!   broadcast `1111111` (with `0111111` as the unaddressed variant).
//!   The frame is `(arg << 1 | 1, opcode)`.
//! - **Special commands** (`101CCCC1`/`110CCCC1` patterns): the command
//!   byte must *not* collide with an address pattern; the frame is
//!   `(command as u8, arg)`.
//!
//! Violations are rejected locally with
//! [`InvalidCommand`](crate::error::DaliError::InvalidCommand) — nothing
//! reaches the bus.
//!
//! The opcode catalog below covers the commands this crate itself exercises
//! plus the common lamp-control and query set; the semantic meaning of each
//! opcode lives in IEC 62386-102, not here.

use crate::error::{DaliError, DaliResult};

/// Command-word flag: the low byte is a special-command frame byte.
pub const SPECIAL: u16 = 0x0100;

/// Command-word flag: transmit the frame twice within 100 ms.
pub const REPEAT: u16 = 0x0200;

/// Tests a byte against the reserved `YAAAAAA` addressing patterns.
///
/// True for short addresses (`0x00..=0x3F`), group addresses
/// (`0x40..=0x4F`), and the two broadcast patterns (`0x7F`, `0xFF`).
///
/// ```rust
/// use dali_master::commands::address_pattern_valid;
///
/// assert!(address_pattern_valid(0x05));
/// assert!(address_pattern_valid(0xFF));
/// assert!(!address_pattern_valid(0x50));
/// ```
pub const fn address_pattern_valid(byte: u8) -> bool {
    byte <= 0b0100_1111 || byte == 0b0111_1111 || byte == 0b1111_1111
}

/// Encodes a command word and argument into the two forward-frame bytes.
///
/// # Errors
/// [`DaliError::InvalidCommand`] if a special command's byte collides with
/// an address pattern, or a regular command's argument is not a valid
/// address pattern.
pub fn encode_command(command: u16, arg: u8) -> DaliResult<(u8, u8)> {
    if command & SPECIAL != 0 {
        // special commands must not look like an address
        let cmd0 = command as u8;
        if address_pattern_valid(cmd0 >> 1) {
            return Err(DaliError::InvalidCommand);
        }
        Ok((cmd0, arg))
    } else {
        // regular commands address a device; the argument is the address
        if !address_pattern_valid(arg) {
            return Err(DaliError::InvalidCommand);
        }
        Ok((arg << 1 | 1, command as u8))
    }
}

// --- arc power control (no reply) --------------------------------------

/// Turn the lamp off without fading.
pub const OFF: u16 = 0;
/// Dim up for 200 ms at the configured fade rate.
pub const UP: u16 = 1;
/// Dim down for 200 ms at the configured fade rate.
pub const DOWN: u16 = 2;
/// One step up, no fade.
pub const STEP_UP: u16 = 3;
/// One step down, no fade.
pub const STEP_DOWN: u16 = 4;
/// Jump to the maximum level.
pub const RECALL_MAX_LEVEL: u16 = 5;
/// Jump to the minimum level.
pub const RECALL_MIN_LEVEL: u16 = 6;
/// One step down; off when already at the minimum.
pub const STEP_DOWN_AND_OFF: u16 = 7;
/// One step up; ignite first when off.
pub const ON_AND_STEP_UP: u16 = 8;

// --- configuration (transmitted twice) ---------------------------------

/// Reset all parameters to defaults.
pub const RESET: u16 = REPEAT | 32;
/// Store the current level into DTR0.
pub const STORE_ACTUAL_LEVEL_IN_DTR0: u16 = REPEAT | 33;
/// DTR0 becomes the operating mode.
pub const SET_OPERATING_MODE: u16 = REPEAT | 35;
/// DTR0 becomes the maximum level.
pub const SET_MAX_LEVEL: u16 = REPEAT | 42;
/// DTR0 becomes the minimum level.
pub const SET_MIN_LEVEL: u16 = REPEAT | 43;
/// DTR0 becomes the system failure level.
pub const SET_SYSTEM_FAILURE_LEVEL: u16 = REPEAT | 44;
/// DTR0 becomes the power-on level.
pub const SET_POWER_ON_LEVEL: u16 = REPEAT | 45;
/// DTR0 becomes the fade time.
pub const SET_FADE_TIME: u16 = REPEAT | 46;
/// DTR0 becomes the fade rate.
pub const SET_FADE_RATE: u16 = REPEAT | 47;
/// DTR0 becomes the short address.
pub const SET_SHORT_ADDRESS: u16 = REPEAT | 128;
/// Allow writing to the selected memory bank.
pub const ENABLE_WRITE_MEMORY: u16 = REPEAT | 129;

// --- queries (1-byte reply) --------------------------------------------

/// Status byte of the addressed gear.
pub const QUERY_STATUS: u16 = 144;
/// Is a control gear present at this address?
pub const QUERY_CONTROL_GEAR_PRESENT: u16 = 145;
/// Lamp failure flag.
pub const QUERY_LAMP_FAILURE: u16 = 146;
/// Lamp power-on flag.
pub const QUERY_LAMP_POWER_ON: u16 = 147;
/// Does the gear lack a short address?
pub const QUERY_MISSING_SHORT_ADDRESS: u16 = 150;
/// Content of DTR0.
pub const QUERY_CONTENT_DTR0: u16 = 152;
/// Device type byte.
pub const QUERY_DEVICE_TYPE: u16 = 153;
/// Hardware minimum level.
pub const QUERY_PHYSICAL_MINIMUM_LEVEL: u16 = 154;
/// Content of DTR1.
pub const QUERY_CONTENT_DTR1: u16 = 156;
/// Content of DTR2.
pub const QUERY_CONTENT_DTR2: u16 = 157;
/// Operating mode byte.
pub const QUERY_OPERATING_MODE: u16 = 158;
/// Current arc power level.
pub const QUERY_ACTUAL_LEVEL: u16 = 160;
/// Configured maximum level.
pub const QUERY_MAX_LEVEL: u16 = 161;
/// Configured minimum level.
pub const QUERY_MIN_LEVEL: u16 = 162;
/// Configured power-on level.
pub const QUERY_POWER_ON_LEVEL: u16 = 163;
/// Configured system failure level.
pub const QUERY_SYSTEM_FAILURE_LEVEL: u16 = 164;
/// High byte of the random address.
pub const QUERY_RANDOM_ADDRESS_H: u16 = 194;
/// Middle byte of the random address.
pub const QUERY_RANDOM_ADDRESS_M: u16 = 195;
/// Low byte of the random address.
pub const QUERY_RANDOM_ADDRESS_L: u16 = 196;
/// Read one byte from the selected memory bank location.
pub const READ_MEMORY_LOCATION: u16 = 197;

// --- special commands ---------------------------------------------------

/// Leave the INITIALISE state.
pub const TERMINATE: u16 = SPECIAL | 0xA1;
/// Store the argument into DTR0.
pub const DATA_TRANSFER_REGISTER0: u16 = SPECIAL | 0xA3;
/// Enter the INITIALISE state for 15 minutes (argument selects scope).
pub const INITIALISE: u16 = REPEAT | SPECIAL | 0xA5;
/// Pick a fresh 24-bit random address.
pub const RANDOMISE: u16 = REPEAT | SPECIAL | 0xA7;
/// Is the random address less than or equal to the search address?
pub const COMPARE: u16 = SPECIAL | 0xA9;
/// Remove the selected device from the compare process.
pub const WITHDRAW: u16 = SPECIAL | 0xAB;
/// Set the high byte of the search address.
pub const SEARCHADDRH: u16 = SPECIAL | 0xB1;
/// Set the middle byte of the search address.
pub const SEARCHADDRM: u16 = SPECIAL | 0xB3;
/// Set the low byte of the search address.
pub const SEARCHADDRL: u16 = SPECIAL | 0xB5;
/// Program the argument as the selected device's short address.
pub const PROGRAM_SHORT_ADDRESS: u16 = SPECIAL | 0xB7;
/// Is the short address equal to the argument?
pub const VERIFY_SHORT_ADDRESS: u16 = SPECIAL | 0xB9;
/// Short address of the selected device.
pub const QUERY_SHORT_ADDRESS: u16 = SPECIAL | 0xBB;
/// Store the argument into DTR1.
pub const DATA_TRANSFER_REGISTER1: u16 = SPECIAL | 0xC3;
/// Store the argument into DTR2.
pub const DATA_TRANSFER_REGISTER2: u16 = SPECIAL | 0xC5;
/// Write DTR-addressed memory location (with reply).
pub const WRITE_MEMORY_LOCATION: u16 = SPECIAL | 0xC7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_pattern_matches_reference_ranges() {
        for byte in 0u8..=255 {
            let expected = byte <= 0b0100_1111 || byte == 0b0111_1111 || byte == 0b1111_1111;
            assert_eq!(address_pattern_valid(byte), expected, "byte {byte:#04x}");
        }
    }

    #[test]
    fn regular_command_shifts_address() {
        // "set level 128" semantics at short address 5
        assert_eq!(encode_command(0x0080, 5), Ok((0x0B, 0x80)));
    }

    #[test]
    fn regular_command_rejects_bad_address() {
        assert_eq!(
            encode_command(QUERY_STATUS, 0x51),
            Err(DaliError::InvalidCommand)
        );
    }

    #[test]
    fn special_command_passes_through() {
        assert_eq!(encode_command(INITIALISE, 0xFF), Ok((0xA5, 0xFF)));
        assert_eq!(encode_command(SEARCHADDRH, 0x12), Ok((0xB1, 0x12)));
    }

    #[test]
    fn special_command_rejects_address_shaped_bytes() {
        // 0x02 >> 1 == 0x01, a valid short address pattern
        assert_eq!(
            encode_command(SPECIAL | 0x02, 0),
            Err(DaliError::InvalidCommand)
        );
    }

    #[test]
    fn commissioning_opcodes_match_the_standard() {
        assert_eq!(INITIALISE & 0xFF, 0xA5);
        assert_eq!(RANDOMISE & 0xFF, 0xA7);
        assert_eq!(COMPARE, SPECIAL | 0xA9);
        assert_eq!(WITHDRAW, SPECIAL | 0xAB);
        assert!(INITIALISE & REPEAT != 0);
        assert!(RANDOMISE & REPEAT != 0);
        assert!(COMPARE & REPEAT == 0);
    }
}
