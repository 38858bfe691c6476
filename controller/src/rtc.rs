use chrono::{Duration, Local};

use aquatimer_common::{AlarmMatch, AlarmSlot, Error, Result, TimeSource, Timestamp};

/// Simulated battery-backed RTC for host runs.
///
/// Time is the OS wall clock plus an adjustable offset, so `set_time`
/// behaves like writing the hardware time registers while the "crystal"
/// keeps ticking underneath. The two alarm registers latch their fired
/// flag on a minute match, as the real part does.
///
/// Hardware integration point: replace this module with an I2C DS3231
/// driver implementing the same trait on the embedded target.
pub struct SoftRtc {
    offset: Duration,
    alarms: [Option<(Timestamp, AlarmMatch)>; 2],
    fired: [bool; 2],
    /// Minute already latched per slot, so clearing the flag inside the
    /// matching minute does not immediately re-latch it.
    matched_minute: [Option<i64>; 2],
    temperature_c: f32,
}

impl SoftRtc {
    pub fn new() -> Self {
        Self {
            offset: Duration::zero(),
            alarms: [None; 2],
            fired: [false; 2],
            matched_minute: [None; 2],
            temperature_c: 22.25,
        }
    }

    fn wall_now(&self) -> Timestamp {
        let local = Local::now().naive_local() + self.offset;
        Timestamp::from_unix(local.and_utc().timestamp())
    }

    fn latch_matches(&mut self) {
        let now = self.wall_now();
        if !now.is_valid() {
            return;
        }
        let minute_key = now.unix_time() / 60;

        for index in 0..2 {
            let Some((at, policy)) = self.alarms[index] else {
                continue;
            };
            if alarm_matches(&at, policy, &now) && self.matched_minute[index] != Some(minute_key) {
                self.fired[index] = true;
                self.matched_minute[index] = Some(minute_key);
            }
        }
    }
}

impl Default for SoftRtc {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SoftRtc {
    fn now(&mut self) -> Timestamp {
        self.wall_now()
    }

    fn set_time(&mut self, t: &Timestamp) -> Result<()> {
        let Some(target) = t.as_naive() else {
            return Err(Error::InvalidArgument("cannot set an invalid time"));
        };
        self.offset = target - Local::now().naive_local();
        Ok(())
    }

    fn temperature_celsius(&mut self) -> Result<f32> {
        Ok(self.temperature_c)
    }

    fn set_alarm(&mut self, slot: AlarmSlot, at: &Timestamp, policy: AlarmMatch) -> Result<()> {
        let index = slot_index(slot);
        self.alarms[index] = Some((*at, policy));
        self.fired[index] = false;
        self.matched_minute[index] = None;
        Ok(())
    }

    fn alarm_fired(&mut self, slot: AlarmSlot) -> Result<bool> {
        self.latch_matches();
        Ok(self.fired[slot_index(slot)])
    }

    fn clear_alarm(&mut self, slot: AlarmSlot) -> Result<()> {
        self.fired[slot_index(slot)] = false;
        Ok(())
    }
}

fn slot_index(slot: AlarmSlot) -> usize {
    match slot {
        AlarmSlot::One => 0,
        AlarmSlot::Two => 1,
    }
}

fn alarm_matches(at: &Timestamp, policy: AlarmMatch, now: &Timestamp) -> bool {
    let hour_minute = now.hour() == at.hour() && now.minute() == at.minute();
    match policy {
        AlarmMatch::HourMinute => hour_minute,
        AlarmMatch::DayHourMinute => hour_minute && now.day() == at.day(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_time_shifts_the_wall_clock() {
        let mut rtc = SoftRtc::new();
        let target = Timestamp::from_ymd_hms(2026, 1, 5, 6, 30, 0);

        rtc.set_time(&target).unwrap();
        let now = rtc.now();

        assert!(now.is_valid());
        // The crystal keeps ticking; allow a second of slack.
        assert!((now.unix_time() - target.unix_time()).abs() <= 1);

        assert!(rtc.set_time(&Timestamp::INVALID).is_err());
    }

    #[test]
    fn alarm_latches_on_minute_match_until_cleared() {
        let mut rtc = SoftRtc::new();
        let base = Timestamp::from_ymd_hms(2026, 1, 5, 10, 30, 0);
        rtc.set_time(&base).unwrap();

        rtc.set_alarm(AlarmSlot::One, &base, AlarmMatch::HourMinute)
            .unwrap();
        assert!(rtc.alarm_fired(AlarmSlot::One).unwrap());
        assert!(!rtc.alarm_fired(AlarmSlot::Two).unwrap());

        // Clearing inside the matching minute must not immediately re-latch.
        rtc.clear_alarm(AlarmSlot::One).unwrap();
        assert!(!rtc.alarm_fired(AlarmSlot::One).unwrap());
    }

    #[test]
    fn day_match_policy_requires_the_day() {
        let mut rtc = SoftRtc::new();
        rtc.set_time(&Timestamp::from_ymd_hms(2026, 1, 5, 10, 30, 0))
            .unwrap();

        let other_day = Timestamp::from_ymd_hms(2026, 1, 6, 10, 30, 0);
        rtc.set_alarm(AlarmSlot::Two, &other_day, AlarmMatch::DayHourMinute)
            .unwrap();
        assert!(!rtc.alarm_fired(AlarmSlot::Two).unwrap());
    }
}
