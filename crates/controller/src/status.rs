// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decodes the two hex status blobs (`sc_11`, `sc_12`) the grill returns
//! from `PB.GetState` into a typed [`Status`]. Every read is defensive: a blob shorter than a field demands
//! yields that field's defined default rather than an index panic.

use crate::codec::decode_hex;

/// Temperature unit, read from `sc_12` byte 27: `2` means Celsius, any
/// other value (including a byte absent from a short blob) means
/// Fahrenheit, which is the defensive default for this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Unit {
    Fahrenheit,
    Celsius,
}

impl Default for Unit {
    fn default() -> Self {
        Unit::Fahrenheit
    }
}

/// A decoded probe/target reading: either a value in the status's native
/// unit, or the sentinel meaning "no probe attached or reading invalid".
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Temp {
    Value(i32),
    Disconnected,
}

impl Temp {
    pub fn value(self) -> Option<i32> {
        match self {
            Temp::Value(v) => Some(v),
            Temp::Disconnected => None,
        }
    }

    pub fn is_disconnected(self) -> bool {
        matches!(self, Temp::Disconnected)
    }
}

/// Bitset over the grill's hardware error lines (`sc_11` bytes 26..34).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorFlags {
    pub error_1: bool,
    pub error_2: bool,
    pub error_3: bool,
    pub high_temp: bool,
    pub fan: bool,
    pub hot: bool,
    pub motor: bool,
    pub no_pellets: bool,
    pub erl: bool,
}

impl ErrorFlags {
    pub fn any(&self) -> bool {
        self.error_1
            || self.error_2
            || self.error_3
            || self.high_temp
            || self.fan
            || self.hot
            || self.motor
            || self.no_pellets
            || self.erl
    }
}

/// A recipe's elapsed-time readout (`sc_11` bytes 42..44).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RecipeTime {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

/// A fully decoded grill status snapshot.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Status {
    pub unit: Unit,
    pub grill_temp: Temp,
    pub set_temp: Temp,
    pub smoker_temp: Temp,
    pub p1: Temp,
    pub p2: Temp,
    pub p3: Temp,
    pub p4: Temp,
    pub p1_target: Temp,
    pub module_on: bool,
    pub motor_state: bool,
    pub hot_state: bool,
    pub fan_state: bool,
    pub light_state: bool,
    pub prime_state: bool,
    pub errors: ErrorFlags,
    pub recipe_step: Option<u8>,
    pub recipe_time: Option<RecipeTime>,
}

impl Default for Temp {
    fn default() -> Self {
        Temp::Disconnected
    }
}

/// Reads the byte at 1-based position `pos` from `bytes`, or `0` when the
/// blob is too short to contain it.
fn byte_at(bytes: &[u8], pos: usize) -> u8 {
    bytes.get(pos - 1).copied().unwrap_or(0)
}

fn bit_at(bytes: &[u8], pos: usize) -> bool {
    byte_at(bytes, pos) != 0
}

/// Reads the `(H, T, U)` triple at 1-based `offset` and converts it to a
/// [`Temp`], applying the disconnected-sentinel rules.
pub fn convert_temperature(bytes: &[u8], offset: usize) -> Temp {
    let h = byte_at(bytes, offset);
    let t = byte_at(bytes, offset + 1);
    let u = byte_at(bytes, offset + 2);

    if matches!((h, t, u), (0, 9, 6) | (0, 0, 0) | (255, 255, 255)) {
        return Temp::Disconnected;
    }
    let computed = 100 * h as i32 + 10 * t as i32 + u as i32;
    if computed == 960 {
        return Temp::Disconnected;
    }
    Temp::Value(computed)
}

/// Decodes the two hex status blobs into a [`Status`].
pub fn parse_status(sc_11: &str, sc_12: &str) -> Status {
    let b11 = decode_hex(sc_11);
    let b12 = decode_hex(sc_12);

    let unit = if byte_at(&b12, 27) == 2 { Unit::Celsius } else { Unit::Fahrenheit };

    Status {
        unit,
        p1_target: convert_temperature(&b12, 3),
        p1: convert_temperature(&b12, 6),
        p2: convert_temperature(&b12, 9),
        p3: convert_temperature(&b12, 12),
        p4: convert_temperature(&b12, 15),
        set_temp: convert_temperature(&b12, 21),
        grill_temp: convert_temperature(&b12, 24),
        smoker_temp: convert_temperature(&b11, 21),
        module_on: bit_at(&b11, 25),
        errors: ErrorFlags {
            error_1: bit_at(&b11, 26),
            error_2: bit_at(&b11, 27),
            error_3: bit_at(&b11, 28),
            high_temp: bit_at(&b11, 29),
            fan: bit_at(&b11, 30),
            hot: bit_at(&b11, 31),
            motor: bit_at(&b11, 32),
            no_pellets: bit_at(&b11, 33),
            erl: bit_at(&b11, 34),
        },
        fan_state: bit_at(&b11, 35),
        hot_state: bit_at(&b11, 36),
        motor_state: bit_at(&b11, 37),
        light_state: bit_at(&b11, 38),
        prime_state: bit_at(&b11, 39),
        recipe_step: b11.get(40).copied(),
        recipe_time: b11.get(41).map(|&hours| RecipeTime {
            hours,
            minutes: byte_at(&b11, 43),
            seconds: byte_at(&b11, 44),
        }),
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
