use crate::types::Timestamp;
use crate::vacation::VacationPolicy;

/// Monthly pump-exercise trigger that keeps the circulation pump from
/// seizing during long idle stretches.
///
/// The match is minute-granular equality rather than `>=`: the trigger
/// cannot re-fire for the rest of the matching minute, and a caller that
/// polls at least once per minute cannot miss a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    pub enabled: bool,
    /// 1..=31.
    pub day_of_month: u8,
    pub hour: u8,
    pub minute: u8,
    /// How long the pump runs once triggered.
    pub duration_seconds: u16,
    /// Invalid until the first completed run.
    pub last_run: Timestamp,
}

impl Default for MaintenanceSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            day_of_month: 1,
            hour: 3,
            minute: 0,
            duration_seconds: 300,
            last_run: Timestamp::INVALID,
        }
    }
}

impl MaintenanceSchedule {
    /// Reconfigures the trigger; the last-run latch is kept so a
    /// reconfiguration cannot cause a second run in the same month.
    pub fn set(&mut self, enabled: bool, day_of_month: u8, hour: u8, minute: u8, duration_seconds: u16) {
        self.enabled = enabled;
        self.day_of_month = day_of_month;
        self.hour = hour;
        self.minute = minute;
        self.duration_seconds = duration_seconds;
    }

    /// True at most once per (year, month): during the configured minute,
    /// unless the last run already happened in this calendar month or an
    /// active vacation forbids maintenance.
    pub fn is_due(&self, now: &Timestamp, vacation: &VacationPolicy) -> bool {
        if !self.enabled || !now.is_valid() {
            return false;
        }
        if vacation.is_active(now) && !vacation.run_maintenance_during_vacation {
            return false;
        }
        if now.day() != u32::from(self.day_of_month)
            || now.hour() != u32::from(self.hour)
            || now.minute() != u32::from(self.minute)
        {
            return false;
        }
        if self.last_run.is_valid()
            && self.last_run.year() == now.year()
            && self.last_run.month() == now.month()
        {
            return false;
        }
        true
    }

    /// Records a completed run. The caller performs the physical action
    /// first; this only arms the once-per-month latch.
    pub fn mark_complete(&mut self, now: &Timestamp) {
        self.last_run = *now;
    }
}
