//! Decoding of the BLE Heart Rate Measurement characteristic (GATT 0x2A37).
//!
//! The payload is a flags byte followed by variable-length little-endian
//! fields whose presence and width are controlled by the flags. Only the
//! fields actually flagged end up populated on the [`Reading`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flag bit 0: BPM field is u16 instead of u8.
const FLAG_BPM_U16: u8 = 0x01;
/// Flag bit 1: sensor contact detected.
const FLAG_SENSOR_CONTACT: u8 = 0x02;
/// Flag bit 3: Energy Expended field present.
const FLAG_ENERGY_EXPENDED: u8 = 0x08;
/// Flag bit 4: RR-Interval data present.
const FLAG_RR_INTERVALS: u8 = 0x10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed payload: need at least {needed} bytes, got {got}")]
    MalformedPayload { needed: usize, got: usize },
}

/// One decoded heart-rate sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Beats per minute.
    pub bpm: u16,
    /// Capture time in milliseconds since the Unix epoch, stamped at decode
    /// time. The device does not transmit a timestamp.
    pub timestamp: u64,
    /// Skin-contact bit. Taken directly from flag bit 1; the separate
    /// "contact supported" bit is not consulted, so "no contact" and
    /// "feature not supported" are indistinguishable here.
    pub sensor_contact: Option<bool>,
    /// Cumulative energy expended in kilojoules.
    pub energy_expended: Option<u16>,
    /// Beat-to-beat intervals in milliseconds.
    pub rr_intervals: Option<Vec<f32>>,
}

/// Decode one characteristic payload, stamping the current wall clock.
pub fn decode(data: &[u8]) -> Result<Reading, DecodeError> {
    decode_at(data, unix_millis())
}

/// Decode one characteristic payload with an explicit capture timestamp.
pub fn decode_at(data: &[u8], timestamp: u64) -> Result<Reading, DecodeError> {
    if data.len() < 2 {
        return Err(DecodeError::MalformedPayload {
            needed: 2,
            got: data.len(),
        });
    }

    let flags = data[0];
    let mut offset = 1usize;

    let bpm = if flags & FLAG_BPM_U16 != 0 {
        let raw = read_u16(data, offset)?;
        offset += 2;
        raw
    } else {
        let raw = data[offset];
        offset += 1;
        raw as u16
    };

    let sensor_contact = Some(flags & FLAG_SENSOR_CONTACT != 0);

    let energy_expended = if flags & FLAG_ENERGY_EXPENDED != 0 {
        let raw = read_u16(data, offset)?;
        offset += 2;
        Some(raw)
    } else {
        None
    };

    let rr_intervals = if flags & FLAG_RR_INTERVALS != 0 {
        let mut intervals = Vec::new();
        // Consume the rest of the buffer in u16 groups; a trailing odd byte
        // is ignored rather than rejected.
        while offset + 2 <= data.len() {
            let raw = u16::from_le_bytes([data[offset], data[offset + 1]]);
            // Device units are 1/1024 s.
            intervals.push(raw as f32 * 1000.0 / 1024.0);
            offset += 2;
        }
        Some(intervals)
    } else {
        None
    };

    Ok(Reading {
        bpm,
        timestamp,
        sensor_contact,
        energy_expended,
        rr_intervals,
    })
}

/// Current wall clock in milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, DecodeError> {
    match data.get(offset..offset + 2) {
        Some(bytes) => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        None => Err(DecodeError::MalformedPayload {
            needed: offset + 2,
            got: data.len(),
        }),
    }
}
