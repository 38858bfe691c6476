//! Binary persistence of scheduler state for non-volatile storage.
//!
//! Version 1 layout, little-endian, byte-packed:
//!
//! ```text
//! [0]=0xD3 [1]=0x23 [2]=version [3]=schedule count
//! count x 39-byte schedule records:
//!   id, day mask, start hour, start minute, end hour, end minute,
//!   enabled, name[32] (<=31 bytes + mandatory NUL, zero padded)
//! 10-byte vacation record:
//!   enabled, start epoch u32, end epoch u32, run-maintenance flag
//! 10-byte maintenance record:
//!   enabled, day of month, hour, minute, duration u16, last-run epoch u32
//! ```
//!
//! Epochs are UTC-naive seconds; 0 encodes the invalid timestamp. Buffers
//! that end after the schedule records decode fine: the trailing records
//! are optional and prior in-memory values stay untouched.

use crate::error::{Error, Result};
use crate::maintenance::MaintenanceSchedule;
use crate::schedule::{Schedule, ScheduleSet, MAX_SCHEDULES};
use crate::types::{DayMask, Timestamp};
use crate::vacation::VacationPolicy;

pub const MAGIC: [u8; 2] = [0xd3, 0x23];
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 4;
const SCHEDULE_RECORD_LEN: usize = 39;
const NAME_FIELD_LEN: usize = 32;
const VACATION_RECORD_LEN: usize = 10;
const MAINTENANCE_RECORD_LEN: usize = 10;

/// Exact encoded size for a set holding `count` schedules; callers size
/// their storage region with this before encoding.
pub fn encoded_len(count: usize) -> usize {
    HEADER_LEN + count * SCHEDULE_RECORD_LEN + VACATION_RECORD_LEN + MAINTENANCE_RECORD_LEN
}

pub fn encode(
    schedules: &ScheduleSet,
    vacation: &VacationPolicy,
    maintenance: &MaintenanceSchedule,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(schedules.len()));

    buf.extend_from_slice(&MAGIC);
    buf.push(FORMAT_VERSION);
    buf.push(schedules.len() as u8);

    for s in schedules.schedules() {
        buf.push(s.id);
        buf.push(s.day_mask.bits());
        buf.push(s.start_hour);
        buf.push(s.start_minute);
        buf.push(s.end_hour);
        buf.push(s.end_minute);
        buf.push(u8::from(s.enabled));
        buf.extend_from_slice(&encode_name(&s.name));
    }

    buf.push(u8::from(vacation.enabled));
    buf.extend_from_slice(&encode_epoch(&vacation.start_date));
    buf.extend_from_slice(&encode_epoch(&vacation.end_date));
    buf.push(u8::from(vacation.run_maintenance_during_vacation));

    buf.push(u8::from(maintenance.enabled));
    buf.push(maintenance.day_of_month);
    buf.push(maintenance.hour);
    buf.push(maintenance.minute);
    buf.extend_from_slice(&maintenance.duration_seconds.to_le_bytes());
    buf.extend_from_slice(&encode_epoch(&maintenance.last_run));

    buf
}

/// Decodes a buffer produced by [`encode`] into the given components.
///
/// Schedules are cleared only after the header and the schedule-record
/// region validate; a failed decode leaves all prior state intact.
pub fn decode(
    buf: &[u8],
    schedules: &mut ScheduleSet,
    vacation: &mut VacationPolicy,
    maintenance: &mut MaintenanceSchedule,
) -> Result<()> {
    if buf.len() < HEADER_LEN {
        return Err(Error::InvalidArgument("buffer shorter than header"));
    }
    if buf[0..2] != MAGIC {
        return Err(Error::BadMagic);
    }
    if buf[2] != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(buf[2]));
    }
    let count = usize::from(buf[3]);
    if count > MAX_SCHEDULES {
        return Err(Error::TooManySchedules(buf[3]));
    }
    if buf.len() < HEADER_LEN + count * SCHEDULE_RECORD_LEN {
        return Err(Error::InvalidArgument("buffer truncated mid-record"));
    }

    schedules.clear();
    let mut offset = HEADER_LEN;

    for _ in 0..count {
        let record = &buf[offset..offset + SCHEDULE_RECORD_LEN];
        schedules.restore(Schedule {
            id: record[0],
            day_mask: DayMask(record[1]),
            start_hour: record[2],
            start_minute: record[3],
            end_hour: record[4],
            end_minute: record[5],
            enabled: record[6] != 0,
            name: decode_name(&record[7..7 + NAME_FIELD_LEN]),
        });
        offset += SCHEDULE_RECORD_LEN;
    }

    // Trailing sections are optional: an older, shorter blob keeps whatever
    // vacation and maintenance state was already in memory.
    if buf.len() < offset + VACATION_RECORD_LEN {
        return Ok(());
    }
    let record = &buf[offset..offset + VACATION_RECORD_LEN];
    vacation.enabled = record[0] != 0;
    vacation.start_date = decode_epoch(read_u32_le(record, 1));
    vacation.end_date = decode_epoch(read_u32_le(record, 5));
    vacation.run_maintenance_during_vacation = record[9] != 0;
    offset += VACATION_RECORD_LEN;

    if buf.len() < offset + MAINTENANCE_RECORD_LEN {
        return Ok(());
    }
    let record = &buf[offset..offset + MAINTENANCE_RECORD_LEN];
    maintenance.enabled = record[0] != 0;
    maintenance.day_of_month = record[1];
    maintenance.hour = record[2];
    maintenance.minute = record[3];
    maintenance.duration_seconds = u16::from_le_bytes([record[4], record[5]]);
    maintenance.last_run = decode_epoch(read_u32_le(record, 6));

    Ok(())
}

fn encode_name(name: &str) -> [u8; NAME_FIELD_LEN] {
    let mut field = [0u8; NAME_FIELD_LEN];
    let mut len = name.len().min(NAME_FIELD_LEN - 1);
    while !name.is_char_boundary(len) {
        len -= 1;
    }
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

fn decode_name(field: &[u8]) -> String {
    let len = field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(NAME_FIELD_LEN - 1);
    String::from_utf8_lossy(&field[..len]).into_owned()
}

fn encode_epoch(t: &Timestamp) -> [u8; 4] {
    let epoch = if t.is_valid() {
        u32::try_from(t.unix_time()).unwrap_or(0)
    } else {
        0
    };
    epoch.to_le_bytes()
}

fn decode_epoch(epoch: u32) -> Timestamp {
    if epoch == 0 {
        Timestamp::INVALID
    } else {
        Timestamp::from_unix(i64::from(epoch))
    }
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_schedule(id: u8, name: &str) -> Schedule {
        Schedule {
            id,
            name: name.to_string(),
            day_mask: DayMask::WEEKDAYS,
            start_hour: 6,
            start_minute: 30,
            end_hour: 8,
            end_minute: 0,
            enabled: true,
        }
    }

    fn sample_state() -> (ScheduleSet, VacationPolicy, MaintenanceSchedule) {
        let mut set = ScheduleSet::new();
        set.add(sample_schedule(0, "Morning Shower")).unwrap();
        set.add(sample_schedule(0, "Evening Bath")).unwrap();

        let mut vacation = VacationPolicy::default();
        vacation.set(
            true,
            Timestamp::from_ymd_hms(2026, 7, 10, 0, 0, 0),
            Timestamp::from_ymd_hms(2026, 7, 20, 23, 59, 59),
            true,
        );

        let mut maintenance = MaintenanceSchedule::default();
        maintenance.set(true, 15, 3, 30, 600);
        maintenance.mark_complete(&Timestamp::from_ymd_hms(2026, 6, 15, 3, 30, 0));

        (set, vacation, maintenance)
    }

    #[test]
    fn round_trip_preserves_everything() {
        let (set, vacation, maintenance) = sample_state();
        let blob = encode(&set, &vacation, &maintenance);
        assert_eq!(blob.len(), encoded_len(set.len()));

        let mut set2 = ScheduleSet::new();
        let mut vacation2 = VacationPolicy::default();
        let mut maintenance2 = MaintenanceSchedule::default();
        decode(&blob, &mut set2, &mut vacation2, &mut maintenance2).unwrap();

        assert_eq!(set2, set);
        assert_eq!(vacation2, vacation);
        assert_eq!(maintenance2, maintenance);
    }

    #[test]
    fn empty_set_round_trips() {
        let set = ScheduleSet::new();
        let vacation = VacationPolicy::default();
        let maintenance = MaintenanceSchedule::default();

        let blob = encode(&set, &vacation, &maintenance);
        assert_eq!(blob[..4], [0xd3, 0x23, 0x01, 0x00]);
        assert_eq!(blob.len(), encoded_len(0));

        let mut set2 = ScheduleSet::new();
        set2.add(sample_schedule(0, "stale")).unwrap();
        let mut vacation2 = VacationPolicy::default();
        let mut maintenance2 = MaintenanceSchedule::default();
        decode(&blob, &mut set2, &mut vacation2, &mut maintenance2).unwrap();

        assert!(set2.is_empty());
    }

    #[test]
    fn decode_rejects_bad_header() {
        let mut set = ScheduleSet::new();
        let mut vacation = VacationPolicy::default();
        let mut maintenance = MaintenanceSchedule::default();

        assert_eq!(
            decode(&[0xd3], &mut set, &mut vacation, &mut maintenance),
            Err(Error::InvalidArgument("buffer shorter than header"))
        );
        assert_eq!(
            decode(&[0xaa, 0x23, 0x01, 0x00], &mut set, &mut vacation, &mut maintenance),
            Err(Error::BadMagic)
        );
        assert_eq!(
            decode(&[0xd3, 0x23, 0x02, 0x00], &mut set, &mut vacation, &mut maintenance),
            Err(Error::UnsupportedVersion(2))
        );
        assert_eq!(
            decode(&[0xd3, 0x23, 0x01, 0x0b], &mut set, &mut vacation, &mut maintenance),
            Err(Error::TooManySchedules(11))
        );
    }

    #[test]
    fn failed_decode_keeps_prior_schedules() {
        let mut set = ScheduleSet::new();
        set.add(sample_schedule(0, "keep me")).unwrap();
        let mut vacation = VacationPolicy::default();
        let mut maintenance = MaintenanceSchedule::default();

        // Header claims one record but the record bytes are missing.
        let err = decode(
            &[0xd3, 0x23, 0x01, 0x01],
            &mut set,
            &mut vacation,
            &mut maintenance,
        )
        .unwrap_err();
        assert_eq!(err, Error::InvalidArgument("buffer truncated mid-record"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn short_buffer_skips_trailing_records() {
        let (set, vacation, maintenance) = sample_state();
        let blob = encode(&set, &vacation, &maintenance);

        // Chop off both trailing records; prior vacation/maintenance state
        // must survive the decode.
        let truncated = &blob[..blob.len() - VACATION_RECORD_LEN - MAINTENANCE_RECORD_LEN];

        let mut set2 = ScheduleSet::new();
        let mut vacation2 = VacationPolicy::default();
        vacation2.set(
            true,
            Timestamp::from_ymd_hms(2026, 1, 1, 0, 0, 0),
            Timestamp::from_ymd_hms(2026, 1, 2, 0, 0, 0),
            false,
        );
        let prior_vacation = vacation2;
        let mut maintenance2 = MaintenanceSchedule::default();
        maintenance2.set(true, 7, 4, 15, 120);
        let prior_maintenance = maintenance2;

        decode(truncated, &mut set2, &mut vacation2, &mut maintenance2).unwrap();

        assert_eq!(set2, set);
        assert_eq!(vacation2, prior_vacation);
        assert_eq!(maintenance2, prior_maintenance);
    }

    #[test]
    fn vacation_without_maintenance_decodes() {
        let (set, vacation, maintenance) = sample_state();
        let blob = encode(&set, &vacation, &maintenance);
        let truncated = &blob[..blob.len() - MAINTENANCE_RECORD_LEN];

        let mut set2 = ScheduleSet::new();
        let mut vacation2 = VacationPolicy::default();
        let mut maintenance2 = MaintenanceSchedule::default();
        let prior_maintenance = maintenance2;

        decode(truncated, &mut set2, &mut vacation2, &mut maintenance2).unwrap();

        assert_eq!(vacation2, vacation);
        assert_eq!(maintenance2, prior_maintenance);
    }

    #[test]
    fn long_names_truncate_at_31_bytes_with_nul() {
        let mut set = ScheduleSet::new();
        let long = "a very long schedule name that will not fit";
        set.add(sample_schedule(0, long)).unwrap();

        let blob = encode(&set, &VacationPolicy::default(), &MaintenanceSchedule::default());
        let name_field = &blob[HEADER_LEN + 7..HEADER_LEN + 7 + NAME_FIELD_LEN];
        assert_eq!(name_field[31], 0);

        let mut set2 = ScheduleSet::new();
        let mut vacation2 = VacationPolicy::default();
        let mut maintenance2 = MaintenanceSchedule::default();
        decode(&blob, &mut set2, &mut vacation2, &mut maintenance2).unwrap();

        let decoded = &set2.schedules()[0].name;
        assert_eq!(decoded.as_bytes(), &long.as_bytes()[..31]);
    }

    #[test]
    fn invalid_timestamps_encode_as_zero_epoch() {
        let set = ScheduleSet::new();
        let vacation = VacationPolicy::default();
        let maintenance = MaintenanceSchedule::default();

        let blob = encode(&set, &vacation, &maintenance);

        let mut set2 = ScheduleSet::new();
        let mut vacation2 = VacationPolicy::default();
        vacation2.set(
            true,
            Timestamp::from_ymd_hms(2026, 1, 1, 0, 0, 0),
            Timestamp::from_ymd_hms(2026, 1, 2, 0, 0, 0),
            true,
        );
        let mut maintenance2 = MaintenanceSchedule::default();
        maintenance2.mark_complete(&Timestamp::from_ymd_hms(2026, 1, 1, 0, 0, 0));

        decode(&blob, &mut set2, &mut vacation2, &mut maintenance2).unwrap();

        assert!(!vacation2.start_date.is_valid());
        assert!(!vacation2.end_date.is_valid());
        assert!(!maintenance2.last_run.is_valid());
    }
}
