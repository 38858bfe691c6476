use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::ReentrantMutex;
use tracing::{debug, info, warn};

use crate::alarm;
use crate::clock::{AlarmMatch, AlarmSlot, TimeSource};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::maintenance::MaintenanceSchedule;
use crate::persist;
use crate::schedule::{Schedule, ScheduleSet};
use crate::types::{SchedulerStatus, TemperatureReading, Timestamp};
use crate::vacation::VacationPolicy;

/// Sentinel for `seconds_until_next_event` when nothing is scheduled or the
/// engine is not initialized.
pub const NO_EVENT: u32 = u32::MAX;

/// 2000-01-01T00:00:00Z; the clock hardware cannot represent anything older.
pub const EPOCH_2000_UTC: u32 = 946_684_800;

const TIME_PLACEHOLDER: &str = "--:--:--";
const DATE_PLACEHOLDER: &str = "----/--/--";

pub type TimeChangeCallback = Box<dyn Fn(&Timestamp) + Send>;
pub type AlarmCallback = Box<dyn Fn(AlarmSlot) + Send>;
pub type ScheduleEventCallback = Box<dyn Fn(&Schedule, bool) + Send>;

/// Facade over the clock peripheral and the schedule, vacation and
/// maintenance policies.
///
/// Every public operation acquires one process-wide reentrant lock for its
/// full duration with a bounded wait; acquisition failure surfaces as the
/// recoverable `LockUnavailable`. Operations that mutate state or touch the
/// clock are additionally gated on a successful [`begin`](Self::begin) and
/// fail fast with `NotInitialized` before any hardware access.
///
/// Callbacks run while the lock is held; observer code must not call back
/// into the engine.
pub struct SchedulerEngine<C: TimeSource> {
    lock_timeout: Duration,
    initialized: AtomicBool,
    inner: ReentrantMutex<RefCell<Inner<C>>>,
}

struct Inner<C> {
    clock: C,
    schedules: ScheduleSet,
    vacation: VacationPolicy,
    maintenance: MaintenanceSchedule,
    /// Active schedule seen by the last transition poll.
    last_active_id: Option<u8>,
    on_time_change: Option<TimeChangeCallback>,
    on_alarm: Option<AlarmCallback>,
    on_schedule_event: Option<ScheduleEventCallback>,
}

impl<C: TimeSource> SchedulerEngine<C> {
    pub fn new(clock: C, mut config: EngineConfig) -> Self {
        config.sanitize();
        Self {
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            initialized: AtomicBool::new(false),
            inner: ReentrantMutex::new(RefCell::new(Inner {
                clock,
                schedules: ScheduleSet::new(),
                vacation: VacationPolicy::default(),
                maintenance: MaintenanceSchedule::default(),
                last_active_id: None,
                on_time_change: None,
                on_alarm: None,
                on_schedule_event: None,
            })),
        }
    }

    /// Brings the clock peripheral up: clears stale alarm flags and verifies
    /// the clock returns a valid time. Idempotent; a failed attempt may be
    /// retried later.
    pub fn begin(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            debug!("already initialized - skipping begin()");
            return Ok(());
        }

        self.locked(|state| {
            state.clock.clear_alarm(AlarmSlot::One)?;
            state.clock.clear_alarm(AlarmSlot::Two)?;

            let now = state.clock.now();
            if !now.is_valid() {
                return Err(Error::Hardware("clock did not return a valid time".into()));
            }

            self.initialized.store(true, Ordering::Release);
            info!("rtc scheduler initialized, current time {now}");
            Ok(())
        })
    }

    /// Whether the clock oscillator is running and readable.
    pub fn is_running(&self) -> bool {
        if self.gate().is_err() {
            return false;
        }
        self.locked(|state| Ok(state.clock.now().is_valid()))
            .unwrap_or(false)
    }

    // --- time management ---

    pub fn now(&self) -> Result<Timestamp> {
        self.gate()?;
        self.locked(|state| Ok(state.clock.now()))
    }

    pub fn set_time(&self, t: &Timestamp) -> Result<()> {
        self.gate()?;
        if !t.is_valid() {
            return Err(Error::InvalidArgument("cannot set an invalid time"));
        }
        self.locked(|state| {
            state.clock.set_time(t)?;
            debug!("clock set to {t}");
            if let Some(callback) = &state.on_time_change {
                callback(t);
            }
            Ok(())
        })
    }

    /// Sets the clock from a UTC epoch plus an explicit offset; the hardware
    /// has no timezone concept and always stores local wall time.
    pub fn set_time_from_utc(&self, utc_epoch: u32, offset_seconds: i32) -> Result<()> {
        self.gate()?;
        if utc_epoch < EPOCH_2000_UTC {
            return Err(Error::InvalidEpoch(utc_epoch));
        }

        let local_epoch = i64::from(utc_epoch) + i64::from(offset_seconds);
        let local = Timestamp::from_unix(local_epoch);
        if !local.is_valid() || !(2000..=2100).contains(&local.year()) {
            return Err(Error::InvalidConversion(local.year()));
        }

        // Reentrant: set_time re-acquires the lock on this same thread.
        self.set_time(&local)
    }

    /// Local wall time converted back to a UTC epoch. No validation; only
    /// meaningful after the clock has been set.
    pub fn now_utc(&self, offset_seconds: i32) -> Result<u32> {
        self.gate()?;
        self.locked(|state| {
            let local = state.clock.now();
            Ok((local.unix_time() - i64::from(offset_seconds)) as u32)
        })
    }

    pub fn temperature(&self) -> Result<TemperatureReading> {
        self.gate()?;
        self.locked(|state| {
            let celsius = state.clock.temperature_celsius()?;
            Ok(TemperatureReading {
                celsius,
                fahrenheit: celsius * 9.0 / 5.0 + 32.0,
                timestamp: state.clock.now(),
            })
        })
    }

    // --- schedule management ---

    /// Adds a schedule (id 0 auto-assigns the lowest free id) and re-arms
    /// the hardware alarm for the next start.
    pub fn add_schedule(&self, schedule: Schedule) -> Result<u8> {
        self.gate()?;
        self.locked(|state| {
            let id = state.schedules.add(schedule)?;
            if let Some(s) = state.schedules.get(id) {
                info!(
                    "added schedule {id} '{}': {:02}:{:02}-{:02}:{:02}, days={}",
                    s.name, s.start_hour, s.start_minute, s.end_hour, s.end_minute, s.day_mask
                );
            }
            state.replan_alarm();
            Ok(id)
        })
    }

    /// Replaces the schedule with the given id; the id itself is immutable.
    pub fn update_schedule(&self, id: u8, schedule: Schedule) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            state.schedules.update(id, schedule)?;
            info!("updated schedule {id}");
            state.replan_alarm();
            Ok(())
        })
    }

    pub fn remove_schedule(&self, id: u8) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            state.schedules.remove(id)?;
            info!("removed schedule {id}");
            state.replan_alarm();
            Ok(())
        })
    }

    pub fn schedule(&self, id: u8) -> Result<Option<Schedule>> {
        self.gate()?;
        self.locked(|state| Ok(state.schedules.get(id).cloned()))
    }

    /// All schedules in insertion order.
    pub fn schedules(&self) -> Result<Vec<Schedule>> {
        self.gate()?;
        self.locked(|state| Ok(state.schedules.schedules().to_vec()))
    }

    /// Drops every schedule. Deliberately does not re-arm the alarm; callers
    /// that want the slot cleared do so themselves.
    pub fn clear_schedules(&self) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            state.schedules.clear();
            info!("all schedules cleared");
            Ok(())
        })
    }

    // --- schedule queries ---

    /// Whether any schedule window is open right now. An active vacation
    /// suppresses every schedule.
    pub fn within_any_schedule(&self) -> Result<bool> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            if state.vacation.is_active(&now) {
                debug!("vacation mode active, schedules suppressed");
                return Ok(false);
            }
            Ok(state.schedules.any_active_at(&now))
        })
    }

    /// Whether the given schedule's window is open right now, ignoring
    /// vacation. Unknown ids are simply not active.
    pub fn within_schedule(&self, id: u8) -> Result<bool> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            Ok(state
                .schedules
                .get(id)
                .is_some_and(|s| s.is_active_at(&now)))
        })
    }

    /// First schedule (insertion order) whose window contains now, ignoring
    /// vacation.
    pub fn current_active_schedule(&self) -> Result<Option<Schedule>> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            Ok(state.schedules.first_active_at(&now).cloned())
        })
    }

    pub fn next_scheduled_start(&self) -> Result<Option<Timestamp>> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            Ok(state.schedules.next_start_after(&now))
        })
    }

    pub fn next_scheduled_end(&self) -> Result<Option<Timestamp>> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            Ok(state.schedules.next_end_after(&now))
        })
    }

    /// Seconds to the sooner of the next start or end; [`NO_EVENT`] when
    /// neither exists or the engine is not ready. Informational, never errors.
    pub fn seconds_until_next_event(&self) -> u32 {
        if self.gate().is_err() {
            return NO_EVENT;
        }
        self.locked(|state| {
            let now = state.clock.now();
            Ok(state.seconds_until_next_event(&now))
        })
        .unwrap_or(NO_EVENT)
    }

    // --- vacation mode ---

    pub fn set_vacation(
        &self,
        enabled: bool,
        start: Timestamp,
        end: Timestamp,
        run_maintenance: bool,
    ) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            state.vacation.set(enabled, start, end, run_maintenance);
            if enabled {
                info!(
                    "vacation mode enabled: {} to {}",
                    state.vacation.start_date, state.vacation.end_date
                );
            } else {
                info!("vacation mode disabled");
            }
            Ok(())
        })
    }

    pub fn vacation(&self) -> Result<VacationPolicy> {
        self.gate()?;
        self.locked(|state| Ok(state.vacation))
    }

    pub fn vacation_active(&self) -> Result<bool> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            Ok(state.vacation.is_active(&now))
        })
    }

    // --- pump exercise ---

    pub fn set_maintenance(
        &self,
        enabled: bool,
        day_of_month: u8,
        hour: u8,
        minute: u8,
        duration_seconds: u16,
    ) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            state
                .maintenance
                .set(enabled, day_of_month, hour, minute, duration_seconds);
            info!(
                "pump exercise {}: day {day_of_month} at {hour:02}:{minute:02} for {duration_seconds}s",
                if enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        })
    }

    pub fn maintenance(&self) -> Result<MaintenanceSchedule> {
        self.gate()?;
        self.locked(|state| Ok(state.maintenance))
    }

    /// Whether the pump exercise should run this minute.
    pub fn maintenance_due(&self) -> Result<bool> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            Ok(state.maintenance.is_due(&now, &state.vacation))
        })
    }

    /// Records a completed pump run; call after the pump actually ran.
    pub fn mark_maintenance_complete(&self) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            state.maintenance.mark_complete(&now);
            info!("pump exercise completed at {now}");
            Ok(())
        })
    }

    // --- alarms ---

    /// Arms alarm slot 1 for the next scheduled start. Also invoked
    /// automatically after every schedule mutation.
    pub fn plan_next_alarm(&self) -> Result<Timestamp> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            let at = alarm::plan_next_alarm(&state.schedules, &mut state.clock, &now)?;
            info!("alarm 1 armed for {at}");
            Ok(at)
        })
    }

    /// Arms alarm slot 2 for direct caller use; automatic replanning never
    /// touches this slot.
    pub fn set_alarm2(&self, at: &Timestamp) -> Result<()> {
        self.gate()?;
        if !at.is_valid() {
            return Err(Error::InvalidArgument("cannot arm an alarm at an invalid time"));
        }
        self.locked(|state| {
            state
                .clock
                .set_alarm(AlarmSlot::Two, at, AlarmMatch::HourMinute)?;
            info!("alarm 2 armed for {:02}:{:02}", at.hour(), at.minute());
            Ok(())
        })
    }

    pub fn alarm_fired(&self, slot: AlarmSlot) -> Result<bool> {
        self.gate()?;
        self.locked(|state| state.clock.alarm_fired(slot))
    }

    pub fn clear_alarm(&self, slot: AlarmSlot) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            state.clock.clear_alarm(slot)?;
            debug!("cleared alarm {slot}");
            Ok(())
        })
    }

    /// Clears the fired flag and notifies the alarm observer.
    pub fn acknowledge_alarm(&self, slot: AlarmSlot) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            state.clock.clear_alarm(slot)?;
            if let Some(callback) = &state.on_alarm {
                callback(slot);
            }
            debug!("acknowledged alarm {slot}");
            Ok(())
        })
    }

    // --- observers (single slot per event; last registration wins) ---

    pub fn on_time_change(&self, callback: impl Fn(&Timestamp) + Send + 'static) -> Result<()> {
        self.locked(|state| {
            state.on_time_change = Some(Box::new(callback));
            Ok(())
        })
    }

    pub fn on_alarm(&self, callback: impl Fn(AlarmSlot) + Send + 'static) -> Result<()> {
        self.locked(|state| {
            state.on_alarm = Some(Box::new(callback));
            Ok(())
        })
    }

    pub fn on_schedule_event(
        &self,
        callback: impl Fn(&Schedule, bool) + Send + 'static,
    ) -> Result<()> {
        self.locked(|state| {
            state.on_schedule_event = Some(Box::new(callback));
            Ok(())
        })
    }

    /// Re-evaluates which schedule is active (vacation included) and fires
    /// the schedule-event observer on transitions. The engine runs no timer
    /// of its own; callers poll this from their loop.
    pub fn poll_schedule_events(&self) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            let now = state.clock.now();
            let active_id = if state.vacation.is_active(&now) {
                None
            } else {
                state.schedules.first_active_at(&now).map(|s| s.id)
            };

            if active_id == state.last_active_id {
                return Ok(());
            }
            let previous = state.last_active_id;
            state.last_active_id = active_id;

            if let Some(id) = previous {
                if let Some(s) = state.schedules.get(id) {
                    info!("schedule {id} '{}' window ended", s.name);
                    if let Some(callback) = &state.on_schedule_event {
                        callback(s, false);
                    }
                }
            }
            if let Some(id) = active_id {
                if let Some(s) = state.schedules.get(id) {
                    info!("schedule {id} '{}' window started", s.name);
                    if let Some(callback) = &state.on_schedule_event {
                        callback(s, true);
                    }
                }
            }
            Ok(())
        })
    }

    // --- diagnostics (informational; degrade instead of erroring) ---

    pub fn formatted_time(&self) -> String {
        if self.gate().is_err() {
            return TIME_PLACEHOLDER.to_string();
        }
        match self.locked(|state| Ok(state.clock.now())) {
            Ok(now) if now.is_valid() => {
                format!("{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second())
            }
            _ => TIME_PLACEHOLDER.to_string(),
        }
    }

    pub fn formatted_date(&self) -> String {
        if self.gate().is_err() {
            return DATE_PLACEHOLDER.to_string();
        }
        match self.locked(|state| Ok(state.clock.now())) {
            Ok(now) if now.is_valid() => {
                format!("{:04}-{:02}-{:02}", now.year(), now.month(), now.day())
            }
            _ => DATE_PLACEHOLDER.to_string(),
        }
    }

    /// One-line human-readable summary of the schedule state.
    pub fn schedule_status(&self) -> String {
        if self.gate().is_err() {
            return "Not Initialized".to_string();
        }
        self.locked(|state| {
            let now = state.clock.now();
            Ok(state.status_line(&now))
        })
        .unwrap_or_else(|_| "Status Unavailable".to_string())
    }

    /// Full status snapshot for publishing; sentinel values when the engine
    /// is not ready.
    pub fn status(&self) -> SchedulerStatus {
        if self.gate().is_err() {
            return placeholder_status();
        }
        self.locked(|state| Ok(state.build_status()))
            .unwrap_or_else(|_| placeholder_status())
    }

    pub fn log_diagnostics(&self) {
        if self.gate().is_err() {
            warn!("diagnostics requested before initialization");
            return;
        }
        let result = self.locked(|state| {
            let now = state.clock.now();
            let temperature = state.clock.temperature_celsius();

            info!("=== rtc scheduler diagnostics ===");
            info!("current time: {now}");
            match temperature {
                Ok(celsius) => info!("temperature: {celsius:.2}C"),
                Err(err) => warn!("temperature read failed: {err}"),
            }
            info!("total schedules: {}", state.schedules.len());
            for s in state.schedules.schedules() {
                info!(
                    "  schedule {} '{}': {}, {:02}:{:02}-{:02}:{:02}, days={}",
                    s.id,
                    s.name,
                    if s.enabled { "ON" } else { "OFF" },
                    s.start_hour,
                    s.start_minute,
                    s.end_hour,
                    s.end_minute,
                    s.day_mask
                );
            }
            info!(
                "vacation mode: {}",
                if state.vacation.enabled { "ON" } else { "OFF" }
            );
            info!(
                "pump exercise: {}",
                if state.maintenance.enabled { "ON" } else { "OFF" }
            );
            info!("current status: {}", state.status_line(&now));
            Ok(())
        });
        if let Err(err) = result {
            warn!("diagnostics unavailable: {err}");
        }
    }

    // --- persistence ---

    /// Size of the blob [`serialize_state`](Self::serialize_state) returns,
    /// computable in advance for storage sizing.
    pub fn persisted_len(&self) -> Result<usize> {
        self.gate()?;
        self.locked(|state| Ok(persist::encoded_len(state.schedules.len())))
    }

    pub fn serialize_state(&self) -> Result<Vec<u8>> {
        self.gate()?;
        self.locked(|state| {
            Ok(persist::encode(
                &state.schedules,
                &state.vacation,
                &state.maintenance,
            ))
        })
    }

    /// Restores schedules, vacation and maintenance state from a persisted
    /// blob, then re-arms the alarm to match the restored schedules.
    pub fn deserialize_state(&self, buf: &[u8]) -> Result<()> {
        self.gate()?;
        self.locked(|state| {
            persist::decode(
                buf,
                &mut state.schedules,
                &mut state.vacation,
                &mut state.maintenance,
            )?;
            info!("restored {} schedules from persisted state", state.schedules.len());
            state.replan_alarm();
            Ok(())
        })
    }

    // --- internals ---

    fn gate(&self) -> Result<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    fn locked<T>(&self, op: impl FnOnce(&mut Inner<C>) -> Result<T>) -> Result<T> {
        let guard = self
            .inner
            .try_lock_for(self.lock_timeout)
            .ok_or(Error::LockUnavailable)?;
        let mut state = guard.borrow_mut();
        op(&mut state)
    }

    #[cfg(test)]
    fn with_clock<T>(&self, f: impl FnOnce(&mut C) -> T) -> T {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        f(&mut state.clock)
    }
}

impl<C: TimeSource> Inner<C> {
    /// Best-effort re-arm after a schedule mutation; failures are logged,
    /// never propagated into the CRUD result.
    fn replan_alarm(&mut self) {
        let now = self.clock.now();
        match alarm::plan_next_alarm(&self.schedules, &mut self.clock, &now) {
            Ok(at) => debug!("alarm 1 armed for {at}"),
            Err(Error::NoUpcomingEvent) => debug!("no upcoming schedule start to arm"),
            Err(err) => warn!("alarm replanning failed: {err}"),
        }
    }

    fn seconds_until_next_event(&self, now: &Timestamp) -> u32 {
        if !now.is_valid() {
            return NO_EVENT;
        }
        let now_epoch = now.unix_time();
        let mut best = NO_EVENT;
        let candidates = [
            self.schedules.next_start_after(now),
            self.schedules.next_end_after(now),
        ];
        for t in candidates.into_iter().flatten() {
            if t > *now {
                let delta = (t.unix_time() - now_epoch).clamp(0, i64::from(u32::MAX)) as u32;
                best = best.min(delta);
            }
        }
        best
    }

    fn status_line(&self, now: &Timestamp) -> String {
        if self.vacation.is_active(now) {
            return "Vacation Mode Active".to_string();
        }
        if let Some(active) = self.schedules.first_active_at(now) {
            return format!("Active: {}", active.name);
        }
        if let Some(next) = self.schedules.next_start_after(now) {
            return format!(
                "Next: {:02}:{:02}:{:02}",
                next.hour(),
                next.minute(),
                next.second()
            );
        }
        "No Active Schedules".to_string()
    }

    fn build_status(&mut self) -> SchedulerStatus {
        let now = self.clock.now();
        let vacation_active = self.vacation.is_active(&now);
        let active = if vacation_active {
            None
        } else {
            self.schedules.first_active_at(&now).cloned()
        };
        let next_start = self.schedules.next_start_after(&now);
        let seconds = self.seconds_until_next_event(&now);
        let maintenance_due = self.maintenance.is_due(&now, &self.vacation);
        let temperature_c = self.clock.temperature_celsius().ok();
        let status_line = self.status_line(&now);

        SchedulerStatus {
            initialized: true,
            time: if now.is_valid() {
                format!("{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second())
            } else {
                TIME_PLACEHOLDER.to_string()
            },
            date: if now.is_valid() {
                format!("{:04}-{:02}-{:02}", now.year(), now.month(), now.day())
            } else {
                DATE_PLACEHOLDER.to_string()
            },
            schedule_count: self.schedules.len(),
            heat_active: active.is_some(),
            active_schedule_id: active.as_ref().map(|s| s.id),
            active_schedule_name: active.as_ref().map(|s| s.name.clone()),
            next_start_epoch: next_start.map(|t| t.unix_time()),
            seconds_until_next_event: seconds,
            vacation_active,
            maintenance_due,
            temperature_c,
            status_line,
        }
    }
}

fn placeholder_status() -> SchedulerStatus {
    SchedulerStatus {
        initialized: false,
        time: TIME_PLACEHOLDER.to_string(),
        date: DATE_PLACEHOLDER.to_string(),
        schedule_count: 0,
        heat_active: false,
        active_schedule_id: None,
        active_schedule_name: None,
        next_start_epoch: None,
        seconds_until_next_event: NO_EVENT,
        vacation_active: false,
        maintenance_due: false,
        temperature_c: None,
        status_line: "Not Initialized".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::types::DayMask;
    use std::sync::{Arc, Mutex};

    fn ts(day: u32, hour: u32, minute: u32) -> Timestamp {
        // January 2026: the 5th is a Monday, the 7th a Wednesday.
        Timestamp::from_ymd_hms(2026, 1, day, hour, minute, 0)
    }

    fn morning(start: (u8, u8), end: (u8, u8), mask: DayMask) -> Schedule {
        Schedule {
            id: 0,
            name: "Morning Shower".to_string(),
            day_mask: mask,
            start_hour: start.0,
            start_minute: start.1,
            end_hour: end.0,
            end_minute: end.1,
            enabled: true,
        }
    }

    fn engine_at(now: Timestamp) -> SchedulerEngine<FakeClock> {
        let engine = SchedulerEngine::new(FakeClock::new(now), EngineConfig::default());
        engine.begin().unwrap();
        engine
    }

    #[test]
    fn operations_fail_fast_before_begin() {
        let engine = SchedulerEngine::new(
            FakeClock::new(ts(7, 12, 0)),
            EngineConfig::default(),
        );

        assert_eq!(engine.now(), Err(Error::NotInitialized));
        assert_eq!(
            engine.add_schedule(morning((6, 0), (8, 0), DayMask::ALL)),
            Err(Error::NotInitialized)
        );
        assert_eq!(engine.seconds_until_next_event(), NO_EVENT);
        assert_eq!(engine.formatted_time(), "--:--:--");
        assert_eq!(engine.formatted_date(), "----/--/--");
        assert_eq!(engine.schedule_status(), "Not Initialized");
        assert!(!engine.status().initialized);
        assert!(!engine.is_running());
    }

    #[test]
    fn begin_is_idempotent_and_retryable_after_hardware_failure() {
        let mut clock = FakeClock::new(ts(7, 12, 0));
        clock.fail_bus(true);
        let engine = SchedulerEngine::new(clock, EngineConfig::default());

        assert!(matches!(engine.begin(), Err(Error::Hardware(_))));
        assert_eq!(engine.now(), Err(Error::NotInitialized));

        engine.with_clock(|clock| clock.fail_bus(false));
        engine.begin().unwrap();
        engine.begin().unwrap();
        assert!(engine.is_running());
    }

    #[test]
    fn auto_ids_run_one_through_ten_then_capacity() {
        let engine = engine_at(ts(7, 12, 0));

        let ids: Vec<u8> = (0..10)
            .map(|_| engine.add_schedule(morning((6, 0), (8, 0), DayMask::ALL)).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);

        assert_eq!(
            engine.add_schedule(morning((6, 0), (8, 0), DayMask::ALL)),
            Err(Error::CapacityExceeded)
        );

        engine.clear_schedules().unwrap();
        assert!(engine.schedules().unwrap().is_empty());
    }

    #[test]
    fn next_start_and_end_queries() {
        let engine = engine_at(ts(7, 7, 0));
        let id = engine
            .add_schedule(morning((6, 0), (8, 0), DayMask::WEEKDAYS))
            .unwrap();

        assert!(engine.within_schedule(id).unwrap());
        assert!(!engine.within_schedule(99).unwrap());

        // Wednesday 07:00 sits inside today's window, so the next start is
        // Thursday 06:00 and the next end is today 08:00.
        assert_eq!(engine.next_scheduled_start().unwrap(), Some(ts(8, 6, 0)));
        assert_eq!(engine.next_scheduled_end().unwrap(), Some(ts(7, 8, 0)));
    }

    #[test]
    fn temperature_reading_converts_to_fahrenheit() {
        let engine = engine_at(ts(7, 12, 0));

        let reading = engine.temperature().unwrap();
        assert_eq!(reading.celsius, 22.25);
        assert_eq!(reading.fahrenheit, 22.25 * 9.0 / 5.0 + 32.0);
        assert!(reading.timestamp.is_valid());
    }

    #[test]
    fn schedule_mutations_rearm_alarm_slot_one_only() {
        let engine = engine_at(ts(7, 5, 0));

        let caller_alarm = ts(7, 21, 15);
        engine.set_alarm2(&caller_alarm).unwrap();

        let id = engine
            .add_schedule(morning((6, 0), (8, 0), DayMask::WEEKDAYS))
            .unwrap();
        assert_eq!(
            engine.with_clock(|clock| clock.armed(AlarmSlot::One)),
            Some((ts(7, 6, 0), AlarmMatch::HourMinute))
        );
        assert_eq!(
            engine.with_clock(|clock| clock.armed(AlarmSlot::Two)),
            Some((caller_alarm, AlarmMatch::HourMinute))
        );

        let mut later = morning((9, 30), (10, 0), DayMask::WEEKDAYS);
        later.id = id;
        engine.update_schedule(id, later).unwrap();
        assert_eq!(
            engine.with_clock(|clock| clock.armed(AlarmSlot::One)),
            Some((ts(7, 9, 30), AlarmMatch::HourMinute))
        );
    }

    #[test]
    fn plan_next_alarm_reports_nothing_to_arm() {
        let engine = engine_at(ts(7, 5, 0));
        assert_eq!(engine.plan_next_alarm(), Err(Error::NoUpcomingEvent));
    }

    #[test]
    fn vacation_suppresses_any_active_but_not_the_raw_query() {
        let engine = engine_at(ts(7, 7, 0));
        engine
            .add_schedule(morning((6, 0), (8, 0), DayMask::ALL))
            .unwrap();

        assert!(engine.within_any_schedule().unwrap());

        engine
            .set_vacation(true, ts(1, 0, 0), ts(31, 23, 59), false)
            .unwrap();
        assert!(engine.vacation_active().unwrap());
        assert!(!engine.within_any_schedule().unwrap());
        // The per-schedule query deliberately ignores vacation.
        assert!(engine.current_active_schedule().unwrap().is_some());
        assert_eq!(engine.schedule_status(), "Vacation Mode Active");
    }

    #[test]
    fn utc_epoch_validation() {
        let engine = engine_at(ts(7, 12, 0));

        assert_eq!(
            engine.set_time_from_utc(EPOCH_2000_UTC - 1, 0),
            Err(Error::InvalidEpoch(EPOCH_2000_UTC - 1))
        );

        engine.set_time_from_utc(EPOCH_2000_UTC, 0).unwrap();
        let now = engine.now().unwrap();
        assert_eq!((now.year(), now.month(), now.day()), (2000, 1, 1));

        // 2101-01-01T00:00:00Z lands outside the supported year range.
        assert_eq!(
            engine.set_time_from_utc(4_133_980_800, 0),
            Err(Error::InvalidConversion(2101))
        );

        // A negative offset can also push the local year out of range.
        assert_eq!(
            engine.set_time_from_utc(EPOCH_2000_UTC, -3600),
            Err(Error::InvalidConversion(1999))
        );
    }

    #[test]
    fn now_utc_inverts_the_offset() {
        let engine = engine_at(ts(7, 12, 0));
        let offset = 7200;

        engine.set_time_from_utc(1_700_000_000, offset).unwrap();
        assert_eq!(engine.now_utc(offset).unwrap(), 1_700_000_000);
    }

    #[test]
    fn time_change_callback_fires_on_set() {
        let engine = engine_at(ts(7, 12, 0));
        let observed: Arc<Mutex<Option<Timestamp>>> = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&observed);
        engine
            .on_time_change(move |t| {
                *sink.lock().unwrap() = Some(*t);
            })
            .unwrap();

        let target = ts(8, 6, 30);
        engine.set_time(&target).unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(target));

        assert_eq!(
            engine.set_time(&Timestamp::INVALID),
            Err(Error::InvalidArgument("cannot set an invalid time"))
        );
    }

    #[test]
    fn acknowledge_clears_the_flag_and_notifies() {
        let engine = engine_at(ts(7, 5, 0));
        let fired: Arc<Mutex<Vec<AlarmSlot>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&fired);
        engine
            .on_alarm(move |slot| sink.lock().unwrap().push(slot))
            .unwrap();

        engine.with_clock(|clock| clock.trip_alarm(AlarmSlot::One));
        assert!(engine.alarm_fired(AlarmSlot::One).unwrap());

        engine.acknowledge_alarm(AlarmSlot::One).unwrap();
        assert!(!engine.alarm_fired(AlarmSlot::One).unwrap());
        assert_eq!(*fired.lock().unwrap(), vec![AlarmSlot::One]);
    }

    #[test]
    fn transition_polling_fires_start_and_end_events() {
        let engine = engine_at(ts(7, 5, 0));
        let id = engine
            .add_schedule(morning((6, 0), (8, 0), DayMask::ALL))
            .unwrap();

        let events: Arc<Mutex<Vec<(u8, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        engine
            .on_schedule_event(move |schedule, is_start| {
                sink.lock().unwrap().push((schedule.id, is_start));
            })
            .unwrap();

        engine.poll_schedule_events().unwrap();
        assert!(events.lock().unwrap().is_empty());

        engine.with_clock(|clock| clock.set_now(ts(7, 6, 30)));
        engine.poll_schedule_events().unwrap();
        engine.poll_schedule_events().unwrap();
        assert_eq!(*events.lock().unwrap(), vec![(id, true)]);

        engine.with_clock(|clock| clock.set_now(ts(7, 8, 30)));
        engine.poll_schedule_events().unwrap();
        assert_eq!(*events.lock().unwrap(), vec![(id, true), (id, false)]);
    }

    #[test]
    fn vacation_forces_an_end_transition() {
        let engine = engine_at(ts(7, 6, 30));
        let id = engine
            .add_schedule(morning((6, 0), (8, 0), DayMask::ALL))
            .unwrap();

        let events: Arc<Mutex<Vec<(u8, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        engine
            .on_schedule_event(move |schedule, is_start| {
                sink.lock().unwrap().push((schedule.id, is_start));
            })
            .unwrap();

        engine.poll_schedule_events().unwrap();
        assert_eq!(*events.lock().unwrap(), vec![(id, true)]);

        engine
            .set_vacation(true, ts(1, 0, 0), ts(31, 23, 59), false)
            .unwrap();
        engine.poll_schedule_events().unwrap();
        assert_eq!(*events.lock().unwrap(), vec![(id, true), (id, false)]);
    }

    #[test]
    fn seconds_until_next_event_prefers_the_sooner_edge() {
        let engine = engine_at(ts(7, 5, 0));
        engine
            .add_schedule(morning((6, 0), (8, 0), DayMask::ALL))
            .unwrap();

        // One hour to the 06:00 start.
        assert_eq!(engine.seconds_until_next_event(), 3_600);

        // Inside the window the 08:00 end is closer than tomorrow's start.
        engine.with_clock(|clock| clock.set_now(ts(7, 6, 30)));
        assert_eq!(engine.seconds_until_next_event(), 5_400);
    }

    #[test]
    fn maintenance_runs_once_per_month_through_the_engine() {
        let engine = engine_at(ts(7, 2, 59));
        engine.set_maintenance(true, 7, 3, 0, 300).unwrap();

        assert!(!engine.maintenance_due().unwrap());

        engine.with_clock(|clock| clock.set_now(ts(7, 3, 0)));
        assert!(engine.maintenance_due().unwrap());

        engine.mark_maintenance_complete().unwrap();
        assert!(!engine.maintenance_due().unwrap());

        // Same trigger next month fires again.
        engine.with_clock(|clock| {
            clock.set_now(Timestamp::from_ymd_hms(2026, 2, 7, 3, 0, 0))
        });
        assert!(engine.maintenance_due().unwrap());
    }

    #[test]
    fn persisted_state_survives_a_power_cycle() {
        let engine = engine_at(ts(7, 5, 0));
        engine
            .add_schedule(morning((6, 0), (8, 0), DayMask::WEEKDAYS))
            .unwrap();
        engine
            .set_vacation(true, ts(10, 0, 0), ts(20, 23, 59), true)
            .unwrap();
        engine.set_maintenance(true, 15, 3, 30, 600).unwrap();

        let blob = engine.serialize_state().unwrap();
        assert_eq!(blob.len(), engine.persisted_len().unwrap());

        let replacement = engine_at(ts(7, 5, 0));
        replacement.deserialize_state(&blob).unwrap();

        assert_eq!(replacement.schedules().unwrap(), engine.schedules().unwrap());
        assert_eq!(replacement.vacation().unwrap(), engine.vacation().unwrap());
        assert_eq!(
            replacement.maintenance().unwrap(),
            engine.maintenance().unwrap()
        );
        // Restoring re-arms the alarm for the restored schedules.
        assert_eq!(
            replacement.with_clock(|clock| clock.armed(AlarmSlot::One)),
            Some((ts(7, 6, 0), AlarmMatch::HourMinute))
        );
    }

    #[test]
    fn status_reflects_the_active_window() {
        let engine = engine_at(ts(7, 6, 30));
        let id = engine
            .add_schedule(morning((6, 0), (8, 0), DayMask::ALL))
            .unwrap();

        let status = engine.status();
        assert!(status.initialized);
        assert!(status.heat_active);
        assert_eq!(status.active_schedule_id, Some(id));
        assert_eq!(status.time, "06:30:00");
        assert_eq!(status.date, "2026-01-07");
        assert_eq!(status.status_line, "Active: Morning Shower");
        assert_eq!(status.temperature_c, Some(22.25));
    }
}
