use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{DayMask, Timestamp};

/// Maximum number of live schedules.
pub const MAX_SCHEDULES: usize = 10;

/// Largest assignable schedule id. The id space (1..=254) is deliberately
/// wider than the capacity: an id is a stable handle, not a slot index.
pub const MAX_SCHEDULE_ID: u8 = 254;

/// A daily on-window, repeated on the days selected by the mask.
///
/// Time fields are trusted to be in range (hours 0-23, minutes 0-59);
/// feeding out-of-range values is a caller contract violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// 1..=254; 0 asks the set to assign the lowest free id.
    pub id: u8,
    /// Display name, e.g. "Morning Shower"; 31 bytes survive persistence.
    pub name: String,
    #[serde(rename = "dayMask")]
    pub day_mask: DayMask,
    #[serde(rename = "startHour")]
    pub start_hour: u8,
    #[serde(rename = "startMinute")]
    pub start_minute: u8,
    #[serde(rename = "endHour")]
    pub end_hour: u8,
    #[serde(rename = "endMinute")]
    pub end_minute: u8,
    pub enabled: bool,
}

impl Schedule {
    pub fn start_minutes(&self) -> u16 {
        u16::from(self.start_hour) * 60 + u16::from(self.start_minute)
    }

    pub fn end_minutes(&self) -> u16 {
        u16::from(self.end_hour) * 60 + u16::from(self.end_minute)
    }

    /// A window whose end precedes its start runs through midnight.
    pub fn spans_midnight(&self) -> bool {
        self.start_minutes() > self.end_minutes()
    }

    /// Window membership: `[start, end)` on the same day, or the wrapped
    /// equivalent for midnight-spanning windows. A window with equal start
    /// and end is empty, never active.
    pub fn is_active_at(&self, now: &Timestamp) -> bool {
        if !self.enabled || !now.is_valid() {
            return false;
        }
        if !self.day_mask.contains(now.day_of_week()) {
            return false;
        }

        let current = now.minutes_of_day();
        let start = self.start_minutes();
        let end = self.end_minutes();

        if start <= end {
            current >= start && current < end
        } else {
            current >= start || current < end
        }
    }

    /// Earliest start instant strictly after `from`.
    ///
    /// Scans forward one day at a time, bounded to 8 days so the search
    /// terminates even when a single weekday is enabled.
    pub fn next_occurrence(&self, from: &Timestamp) -> Option<Timestamp> {
        if !self.enabled || self.day_mask.is_empty() || !from.is_valid() {
            return None;
        }

        // Skip the current minute so a start equal to `from` is not returned.
        let mut probe = *from + Duration::minutes(1);

        for _ in 0..8 {
            if !probe.is_valid() {
                return None;
            }
            if self.day_mask.contains(probe.day_of_week()) {
                let candidate = probe.at_time(
                    u32::from(self.start_hour),
                    u32::from(self.start_minute),
                    0,
                );
                if candidate > *from {
                    return Some(candidate);
                }
            }
            probe = probe + Duration::days(1);
        }

        None
    }

    /// End of the window relative to `now`'s date; midnight-spanning windows
    /// end on the next calendar day.
    pub fn end_of_window(&self, now: &Timestamp) -> Timestamp {
        let mut end = now.at_time(u32::from(self.end_hour), u32::from(self.end_minute), 0);
        if self.spans_midnight() {
            end = end + Duration::days(1);
        }
        end
    }
}

/// Insertion-ordered collection of schedules with id-based lookup.
///
/// Capacity is small enough that linear scans beat any indexed structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSet {
    entries: Vec<Schedule>,
}

impl ScheduleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a schedule, assigning the lowest free id when `id` is 0.
    pub fn add(&mut self, mut schedule: Schedule) -> Result<u8> {
        if self.entries.len() >= MAX_SCHEDULES {
            return Err(Error::CapacityExceeded);
        }
        if schedule.id == 0 {
            schedule.id = self.next_free_id().ok_or(Error::CapacityExceeded)?;
        }
        let id = schedule.id;
        self.entries.push(schedule);
        Ok(id)
    }

    /// Replaces the schedule with the given id; the stored id wins over
    /// whatever the caller left in the struct.
    pub fn update(&mut self, id: u8, schedule: Schedule) -> Result<()> {
        let slot = self
            .entries
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(Error::NotFound(id))?;
        *slot = schedule;
        slot.id = id;
        Ok(())
    }

    pub fn remove(&mut self, id: u8) -> Result<()> {
        let before = self.entries.len();
        self.entries.retain(|s| s.id != id);
        if self.entries.len() == before {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }

    pub fn get(&self, id: u8) -> Option<&Schedule> {
        self.entries.iter().find(|s| s.id == id)
    }

    /// All schedules in insertion order.
    pub fn schedules(&self) -> &[Schedule] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pushes a decoded schedule verbatim, bypassing id auto-assignment.
    pub(crate) fn restore(&mut self, schedule: Schedule) {
        self.entries.push(schedule);
    }

    fn next_free_id(&self) -> Option<u8> {
        (1..=MAX_SCHEDULE_ID).find(|id| self.entries.iter().all(|s| s.id != *id))
    }

    /// First active schedule in insertion order. Overlaps have no priority
    /// model; first match wins and that is the documented tie-break.
    pub fn first_active_at(&self, now: &Timestamp) -> Option<&Schedule> {
        self.entries.iter().find(|s| s.is_active_at(now))
    }

    pub fn any_active_at(&self, now: &Timestamp) -> bool {
        self.first_active_at(now).is_some()
    }

    /// Earliest upcoming start across all enabled schedules.
    pub fn next_start_after(&self, now: &Timestamp) -> Option<Timestamp> {
        self.entries
            .iter()
            .filter(|s| s.enabled)
            .filter_map(|s| s.next_occurrence(now))
            .min()
    }

    /// Earliest end across the schedules whose window contains `now`.
    pub fn next_end_after(&self, now: &Timestamp) -> Option<Timestamp> {
        self.entries
            .iter()
            .filter(|s| s.is_active_at(now))
            .map(|s| s.end_of_window(now))
            .filter(Timestamp::is_valid)
            .min()
    }
}
