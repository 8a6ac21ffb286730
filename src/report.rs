/// DualSense output report encoder: rumble + adaptive-trigger effects → raw HID bytes.
///
/// Report formats:
///
/// USB: Report ID 0x02, 48 bytes
///   Byte 0:      report ID (0x02)
///   Byte 1:      valid flag 0 (0x01 compatible vibration, 0x02 haptics select,
///                0x04 right trigger, 0x08 left trigger)
///   Byte 3:      weak (right) rumble motor
///   Byte 4:      strong (left) rumble motor
///   Byte 11:     right trigger (R2) mode
///   Byte 12-21:  right trigger parameters
///   Byte 22:     left trigger (L2) mode
///   Byte 23-32:  left trigger parameters
///
/// Bluetooth: Report ID 0x31, 78 bytes
///   Byte 0:  report ID (0x31)
///   Byte 1:  fixed data tag (0x02)
///   Then same layout as USB offset by +1
///   Last 4 bytes: CRC-32 (seed 0xA2)
///
/// Trigger parameter block (10 bytes):
///   Byte 0-1: zone activation mask, little-endian, bit n = zone n
///   Byte 2-5: per-zone force, little-endian, 3 bits per zone at bit 3n
///   Byte 8:   frequency in Hz (vibration only)

use crate::crc32;
use crate::hid::ConnectionType;
use crate::rumble::RumbleEffect;
use crate::trigger::{MAX_FORCE, TriggerEffect, ZONE_COUNT};

pub const USB_REPORT_ID: u8 = 0x02;
pub const USB_REPORT_LEN: usize = 48;
pub const BT_REPORT_ID: u8 = 0x31;
pub const BT_REPORT_LEN: usize = 78;
const BT_DATA_TAG: u8 = 0x02;

pub const FLAG_COMPATIBLE_VIBRATION: u8 = 0x01;
pub const FLAG_HAPTICS_SELECT: u8 = 0x02;
pub const FLAG_RIGHT_TRIGGER: u8 = 0x04;
pub const FLAG_LEFT_TRIGGER: u8 = 0x08;
pub const FLAGS_ALL: u8 =
    FLAG_COMPATIBLE_VIBRATION | FLAG_HAPTICS_SELECT | FLAG_RIGHT_TRIGGER | FLAG_LEFT_TRIGGER;

pub const MODE_OFF: u8 = 0x05;
pub const MODE_FEEDBACK: u8 = 0x21;
pub const MODE_VIBRATION: u8 = 0x26;

// USB offsets; Bluetooth adds 1.
const OFF_VALID_FLAG0: usize = 1;
const OFF_MOTOR_WEAK: usize = 3;
const OFF_MOTOR_STRONG: usize = 4;
const OFF_RIGHT_MODE: usize = 11;
const OFF_LEFT_MODE: usize = 22;

pub const PARAM_LEN: usize = 10;
const PARAM_FREQUENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSide {
    Left,
    Right,
}

/// Bits `start..=9` set.
pub fn zone_mask(start_zone: u8) -> u16 {
    let start = start_zone.min(ZONE_COUNT - 1);
    (0x3FF_u16 << start) & 0x3FF
}

/// The same 3-bit level (`force - 1`) in every zone from `start_zone` to 9.
pub fn force_field(start_zone: u8, force: u8) -> u32 {
    let bits = (force.saturating_sub(1) & 0x07) as u32;
    (start_zone.min(ZONE_COUNT - 1)..ZONE_COUNT).fold(0, |acc, zone| acc | bits << (3 * zone as u32))
}

/// Write mask and force field into a zeroed parameter block.
/// A force of 0 leaves the block zeroed.
fn encode_zones(param: &mut [u8], start_zone: u8, force: u8) {
    param.fill(0);
    let force = force.min(MAX_FORCE);
    if force == 0 {
        return;
    }
    param[0..2].copy_from_slice(&zone_mask(start_zone).to_le_bytes());
    param[2..6].copy_from_slice(&force_field(start_zone, force).to_le_bytes());
}

/// Reusable output report buffer. Allocated once per connection; every
/// [`HapticReport::encode`] rewrites it completely.
pub struct HapticReport {
    buf: Vec<u8>,
    connection: ConnectionType,
}

impl HapticReport {
    pub fn new(connection: ConnectionType) -> Self {
        let len = match connection {
            ConnectionType::Usb => USB_REPORT_LEN,
            ConnectionType::Bluetooth => BT_REPORT_LEN,
        };
        Self {
            buf: vec![0u8; len],
            connection,
        }
    }

    fn base(&self) -> usize {
        match self.connection {
            ConnectionType::Usb => 0,
            ConnectionType::Bluetooth => 1,
        }
    }

    /// Zero everything, then write the header with all four capabilities valid.
    pub fn clear(&mut self) {
        self.buf.fill(0);
        match self.connection {
            ConnectionType::Usb => self.buf[0] = USB_REPORT_ID,
            ConnectionType::Bluetooth => {
                self.buf[0] = BT_REPORT_ID;
                self.buf[1] = BT_DATA_TAG;
            }
        }
        let base = self.base();
        self.buf[base + OFF_VALID_FLAG0] = FLAGS_ALL;
    }

    pub fn set_rumble(&mut self, rumble: RumbleEffect) {
        let (strong, weak) = rumble.to_bytes();
        let base = self.base();
        self.buf[base + OFF_MOTOR_WEAK] = weak;
        self.buf[base + OFF_MOTOR_STRONG] = strong;
    }

    pub fn set_trigger(&mut self, side: TriggerSide, effect: &TriggerEffect) {
        let mode_offset = self.base()
            + match side {
                TriggerSide::Right => OFF_RIGHT_MODE,
                TriggerSide::Left => OFF_LEFT_MODE,
            };
        let params_offset = mode_offset + 1;
        let params = &mut self.buf[params_offset..params_offset + PARAM_LEN];

        let mode = match *effect {
            TriggerEffect::Off => {
                params.fill(0);
                MODE_OFF
            }
            TriggerEffect::Feedback { start_zone, strength } => {
                encode_zones(params, start_zone, strength);
                MODE_FEEDBACK
            }
            TriggerEffect::Vibration { start_zone, amplitude, frequency_hz } => {
                encode_zones(params, start_zone, amplitude);
                if amplitude.min(MAX_FORCE) > 0 {
                    params[PARAM_FREQUENCY] = frequency_hz;
                }
                MODE_VIBRATION
            }
        };
        self.buf[mode_offset] = mode;
    }

    /// Rewrite the whole report for one tick and return the bytes to send.
    pub fn encode(
        &mut self,
        left: &TriggerEffect,
        right: &TriggerEffect,
        rumble: RumbleEffect,
    ) -> &[u8] {
        self.clear();
        self.set_rumble(rumble);
        self.set_trigger(TriggerSide::Right, right);
        self.set_trigger(TriggerSide::Left, left);
        if self.connection == ConnectionType::Bluetooth {
            let crc_offset = self.buf.len() - 4;
            crc32::stamp(crc32::SEED_OUTPUT, &mut self.buf, crc_offset);
        }
        &self.buf
    }

    /// Motors stopped, both triggers released.
    pub fn encode_safe_state(&mut self) -> &[u8] {
        self.encode(&TriggerEffect::Off, &TriggerEffect::Off, RumbleEffect::NONE)
    }

    #[cfg(test)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
