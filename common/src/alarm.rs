use crate::clock::{AlarmMatch, AlarmSlot, TimeSource};
use crate::error::{Error, Result};
use crate::schedule::ScheduleSet;
use crate::types::Timestamp;

/// Arms hardware alarm slot 1 for the next scheduled start, hour/minute
/// match (the hardware wakes us at minute granularity; seconds are noise
/// for relay switching).
///
/// Slot 2 is never touched here: it stays reserved for direct caller use so
/// planned schedule alarms and ad-hoc alarms cannot collide.
///
/// Returns the instant the alarm was armed for. `NoUpcomingEvent` means no
/// enabled schedule has a future start; that is not a fault, just nothing
/// to arm.
pub fn plan_next_alarm<C: TimeSource>(
    schedules: &ScheduleSet,
    clock: &mut C,
    now: &Timestamp,
) -> Result<Timestamp> {
    let next = schedules
        .next_start_after(now)
        .ok_or(Error::NoUpcomingEvent)?;
    clock.set_alarm(AlarmSlot::One, &next, AlarmMatch::HourMinute)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::schedule::Schedule;
    use crate::types::DayMask;

    fn ts(day: u32, hour: u32, minute: u32) -> Timestamp {
        Timestamp::from_ymd_hms(2026, 1, day, hour, minute, 0)
    }

    #[test]
    fn arms_slot_one_for_next_start() {
        let mut set = ScheduleSet::new();
        set.add(Schedule {
            id: 0,
            name: "Morning".to_string(),
            day_mask: DayMask::ALL,
            start_hour: 6,
            start_minute: 30,
            end_hour: 8,
            end_minute: 0,
            enabled: true,
        })
        .unwrap();

        let mut clock = FakeClock::new(ts(7, 5, 0));
        let now = ts(7, 5, 0);

        let armed = plan_next_alarm(&set, &mut clock, &now).unwrap();
        assert_eq!(armed, ts(7, 6, 30));
        assert_eq!(
            clock.armed(AlarmSlot::One),
            Some((ts(7, 6, 30), AlarmMatch::HourMinute))
        );
        assert_eq!(clock.armed(AlarmSlot::Two), None);
    }

    #[test]
    fn empty_set_has_nothing_to_arm() {
        let set = ScheduleSet::new();
        let mut clock = FakeClock::new(ts(7, 5, 0));
        let now = ts(7, 5, 0);

        assert_eq!(
            plan_next_alarm(&set, &mut clock, &now),
            Err(Error::NoUpcomingEvent)
        );
        assert_eq!(clock.armed(AlarmSlot::One), None);
    }
}
