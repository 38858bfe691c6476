pub mod alarm;
pub mod clock;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod persist;
pub mod schedule;
pub mod scheduler;
pub mod topics;
pub mod types;
pub mod vacation;

pub use clock::{AlarmMatch, AlarmSlot, FakeClock, TimeSource};
pub use config::{EngineConfig, MqttConfig, RuntimeConfig};
pub use error::{Error, Result};
pub use maintenance::MaintenanceSchedule;
pub use schedule::{Schedule, ScheduleSet, MAX_SCHEDULES, MAX_SCHEDULE_ID};
pub use scheduler::{SchedulerEngine, EPOCH_2000_UTC, NO_EVENT};
pub use topics::*;
pub use types::{
    day_of_week_from_str, day_of_week_str, DayMask, SchedulerStatus, TemperatureReading,
    Timestamp, DAY_OF_WEEK_INVALID,
};
pub use vacation::VacationPolicy;
