use std::fmt;

use chrono::Duration;

use crate::error::{Error, Result};
use crate::types::Timestamp;

/// One of the two independent single-shot alarm match registers on the
/// clock peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmSlot {
    One,
    Two,
}

impl fmt::Display for AlarmSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmSlot::One => write!(f, "1"),
            AlarmSlot::Two => write!(f, "2"),
        }
    }
}

/// Which timestamp fields the hardware compares when a slot is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmMatch {
    /// Fire when hour and minute match; seconds are ignored, so the alarm
    /// recurs daily at the given wall-clock time.
    HourMinute,
    /// Fire when day-of-month, hour and minute match.
    DayHourMinute,
}

/// Capability contract for the real-time clock peripheral.
///
/// Every method is a single bus transaction. Implementations do not need to
/// be thread-safe; the engine serializes access behind its own lock.
pub trait TimeSource {
    /// Current wall-clock reading; the invalid [`Timestamp`] signals a
    /// failed read.
    fn now(&mut self) -> Timestamp;

    fn set_time(&mut self, t: &Timestamp) -> Result<()>;

    fn temperature_celsius(&mut self) -> Result<f32>;

    fn set_alarm(&mut self, slot: AlarmSlot, at: &Timestamp, policy: AlarmMatch) -> Result<()>;

    /// Whether the slot's fired flag is latched; stays set until cleared.
    fn alarm_fired(&mut self, slot: AlarmSlot) -> Result<bool>;

    fn clear_alarm(&mut self, slot: AlarmSlot) -> Result<()>;
}

fn slot_index(slot: AlarmSlot) -> usize {
    match slot {
        AlarmSlot::One => 0,
        AlarmSlot::Two => 1,
    }
}

/// Deterministic clock for tests: register-level behavior of the hardware
/// without an I2C bus. Time only moves when the test moves it.
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Timestamp,
    temperature_c: f32,
    alarms: [Option<(Timestamp, AlarmMatch)>; 2],
    fired: [bool; 2],
    fail_bus: bool,
}

impl FakeClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now,
            temperature_c: 22.25,
            ..Self::default()
        }
    }

    pub fn set_now(&mut self, now: Timestamp) {
        self.now = now;
    }

    pub fn advance(&mut self, delta: Duration) {
        self.now = self.now + delta;
    }

    pub fn set_temperature(&mut self, celsius: f32) {
        self.temperature_c = celsius;
    }

    /// Latches the slot's fired flag, as the hardware would on a match.
    pub fn trip_alarm(&mut self, slot: AlarmSlot) {
        self.fired[slot_index(slot)] = true;
    }

    pub fn armed(&self, slot: AlarmSlot) -> Option<(Timestamp, AlarmMatch)> {
        self.alarms[slot_index(slot)]
    }

    /// Makes every subsequent bus transaction fail.
    pub fn fail_bus(&mut self, fail: bool) {
        self.fail_bus = fail;
    }

    fn bus(&self) -> Result<()> {
        if self.fail_bus {
            return Err(Error::Hardware("simulated bus failure".into()));
        }
        Ok(())
    }
}

impl TimeSource for FakeClock {
    fn now(&mut self) -> Timestamp {
        if self.fail_bus {
            return Timestamp::INVALID;
        }
        self.now
    }

    fn set_time(&mut self, t: &Timestamp) -> Result<()> {
        self.bus()?;
        self.now = *t;
        Ok(())
    }

    fn temperature_celsius(&mut self) -> Result<f32> {
        self.bus()?;
        Ok(self.temperature_c)
    }

    fn set_alarm(&mut self, slot: AlarmSlot, at: &Timestamp, policy: AlarmMatch) -> Result<()> {
        self.bus()?;
        let index = slot_index(slot);
        self.alarms[index] = Some((*at, policy));
        self.fired[index] = false;
        Ok(())
    }

    fn alarm_fired(&mut self, slot: AlarmSlot) -> Result<bool> {
        self.bus()?;
        Ok(self.fired[slot_index(slot)])
    }

    fn clear_alarm(&mut self, slot: AlarmSlot) -> Result<()> {
        self.bus()?;
        self.fired[slot_index(slot)] = false;
        Ok(())
    }
}
