use crate::types::{FlightDataPoint, FlightMillis, FlightRecord};
use core::fmt::Write;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use portable_atomic::{AtomicU32, Ordering};

// A safe upper bound for any single CSV row (Tag + Timestamp + Data + Newline)
pub const MAX_LOG_LINE_LEN: usize = 256;

/// The external flight-data sink (trace buffer + flight history storage).
///
/// Calls are fire-and-forget: the flight controller never waits on, or
/// reacts to, the outcome of a write.
pub trait FlightLogger {
    /// Reduced-rate trace point. `is_trigger_point` marks the flight-start
    /// sample so the sink can keep the pre-launch window around it.
    fn log_sample(&mut self, point: &FlightDataPoint, is_trigger_point: bool);

    /// Hands off the finished flight. Called exactly once, at landing.
    fn finalize(&mut self, record: &FlightRecord, flight_index: u32);

    /// Index to use for the flight about to be armed.
    fn next_flight_index(&mut self) -> u32;

    /// Drops any trace data buffered for the previous flight.
    fn clear_buffer(&mut self) {}

    /// Phase change and safety events, for the flight history.
    fn log_event(&mut self, _timestamp_ms: FlightMillis, _msg: &'static str) {}
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogEntry {
    Sample {
        point: FlightDataPoint,
        is_trigger_point: bool,
    },
    Record {
        record: FlightRecord,
        flight_index: u32,
    },
    Event {
        timestamp_ms: FlightMillis,
        msg: &'static str,
    },
}

impl LogEntry {
    pub fn write_schema<const SIZE: usize>(cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        writeln!(cursor, "# SCHEMA DEFINITION")?;
        writeln!(cursor, "# METADATA,time_unit,ms")?;
        writeln!(
            cursor,
            "# {},timestamp,{}",
            FlightDataPoint::TAG,
            FlightDataPoint::CSV_HEADER
        )?;
        writeln!(
            cursor,
            "# {},timestamp,{}",
            TRIGGER_TAG,
            FlightDataPoint::CSV_HEADER
        )?;
        writeln!(
            cursor,
            "# {},timestamp,flight_index,{}",
            FlightRecord::TAG,
            FlightRecord::CSV_HEADER
        )?;
        writeln!(cursor, "# {},timestamp,event_msg", <&'static str as Loggable>::TAG)?;
        Ok(())
    }

    pub fn format_to<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        match self {
            LogEntry::Sample {
                point,
                is_trigger_point,
            } => {
                let tag = if *is_trigger_point {
                    TRIGGER_TAG
                } else {
                    FlightDataPoint::TAG
                };
                write!(cursor, "{},{},", tag, point.timestamp_ms)?;
                point.format_payload(cursor)?;
                writeln!(cursor)
            }
            LogEntry::Record {
                record,
                flight_index,
            } => {
                write!(cursor, "{},{},{},", FlightRecord::TAG, 0, flight_index)?;
                record.format_payload(cursor)?;
                writeln!(cursor)
            }
            LogEntry::Event { timestamp_ms, msg } => self.write_line(*timestamp_ms, msg, cursor),
        }
    }

    // This is the "Contract" - it forces the format: TAG, TIMESTAMP, PAYLOAD... \n
    fn write_line<T: Loggable, const SIZE: usize>(
        &self,
        ts: FlightMillis,
        data: &T,
        cursor: &mut LogBuffer<SIZE>,
    ) -> core::fmt::Result {
        write!(cursor, "{},{},", T::TAG, ts)?;
        data.format_payload(cursor)?;
        writeln!(cursor)
    }
}

/// Row tag for the flight-start sample.
pub const TRIGGER_TAG: &str = "T";

// A trait for types that can be logged
pub trait Loggable {
    /// The 'Tag' that identifies this row (e.g., 'S', 'R', 'E')
    const TAG: &'static str;

    /// Only write the fields and commas. Do NOT write the tag, timestamp, or \n.
    fn format_payload<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result;
}

impl Loggable for FlightDataPoint {
    const TAG: &'static str = "S";
    fn format_payload<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        write!(cursor, "{:.2},{:.2}", self.altitude, self.acceleration)
    }
}

impl Loggable for FlightRecord {
    const TAG: &'static str = "R";
    fn format_payload<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        write!(
            cursor,
            "{:.2},{},{:.2},{:.2},{:.2},",
            self.apogee,
            self.apogee_time_ms,
            self.main_ejection_altitude,
            self.drogue_ejection_altitude,
            self.burnout_altitude
        )?;
        write_optional(cursor, self.burnout_time_ms)?;
        cursor.write_char(',')?;
        write_optional(cursor, self.acceleration_trigger_time_ms)?;
        cursor.write_char(',')?;
        write_optional(cursor, self.altitude_trigger_time_ms)?;
        write!(cursor, ",{:.2}", self.max_acceleration)
    }
}

impl Loggable for &'static str {
    const TAG: &'static str = "E";
    fn format_payload<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        // Just write the string directly
        cursor.write_str(self)
    }
}

// Unset times are written as empty cells.
fn write_optional<const SIZE: usize>(
    cursor: &mut LogBuffer<SIZE>,
    value: Option<FlightMillis>,
) -> core::fmt::Result {
    match value {
        Some(v) => write!(cursor, "{}", v),
        None => Ok(()),
    }
}

// Helper for formatting into a buffer
#[repr(align(4))]
pub struct LogBuffer<const SIZE: usize> {
    buf: [u8; SIZE],
    pub pos: usize,
}

impl<const SIZE: usize> core::fmt::Write for LogBuffer<SIZE> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remainder = self.buf.len() - self.pos;
        if remainder < bytes.len() {
            return Err(core::fmt::Error);
        }

        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}

impl<const SIZE: usize> Default for LogBuffer<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> LogBuffer<SIZE> {
    pub fn new() -> Self {
        Self {
            buf: [0u8; SIZE],
            pos: 0,
        }
    }
    /// Attempts to format a LogEntry into the buffer.
    /// Returns the number of bytes written, or an error if it doesn't fit.
    /// A row that does not fit is rolled back, never left half written.
    pub fn write_entry(&mut self, entry: &LogEntry) -> Result<usize, core::fmt::Error> {
        let start_pos = self.pos;

        if let Err(e) = entry.format_to(self) {
            self.pos = start_pos;
            return Err(e);
        }

        // Calculate how much we just added
        Ok(self.pos - start_pos)
    }

    pub fn space_remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
    pub fn get_active_buffer(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

/// Channel carrying flight data from the tick to the storage task.
pub type LogChannel<const N: usize> = Channel<CriticalSectionRawMutex, LogEntry, N>;

/// [`FlightLogger`] that queues entries on a channel drained by the storage
/// side. A full channel drops the entry and counts it; the tick never blocks.
pub struct ChannelLogger<'a, const N: usize> {
    channel: &'a LogChannel<N>,
    next_index: u32,
    dropped: AtomicU32,
}

impl<'a, const N: usize> ChannelLogger<'a, N> {
    /// `first_index` is the index the next armed flight will get.
    pub fn new(channel: &'a LogChannel<N>, first_index: u32) -> Self {
        Self {
            channel,
            next_index: first_index,
            dropped: AtomicU32::new(0),
        }
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push(&mut self, entry: LogEntry) {
        if self.channel.try_send(entry).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<const N: usize> FlightLogger for ChannelLogger<'_, N> {
    fn log_sample(&mut self, point: &FlightDataPoint, is_trigger_point: bool) {
        self.push(LogEntry::Sample {
            point: *point,
            is_trigger_point,
        });
    }

    fn finalize(&mut self, record: &FlightRecord, flight_index: u32) {
        self.push(LogEntry::Record {
            record: *record,
            flight_index,
        });
    }

    fn next_flight_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        index
    }

    fn clear_buffer(&mut self) {
        self.channel.clear();
    }

    fn log_event(&mut self, timestamp_ms: FlightMillis, msg: &'static str) {
        self.push(LogEntry::Event { timestamp_ms, msg });
    }
}
