use crate::error::RosterError;
use crate::roster::CellValue;
use crate::spreadsheet::reference::index_to_reference;
use chrono::NaiveDate;
use chrono::TimeDelta;
use iso8601_duration::Duration as IsoDuration;

const MILLISECONDS_PER_DAY: f64 = 86_400_000f64;

/// Types of cell data found in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as "1"/"0"
    Boolean,
    Number,
    /// Date/time values stored as serial numbers from the 1900 epoch
    NumberDateTime1900,
    NumberDate1900,
    NumberTime1900,
    /// Date/time values stored as serial numbers from the 1904 epoch
    NumberDateTime1904,
    NumberDate1904,
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// ISO 8601 duration strings
    IsoDuration,
    /// Literal text
    InlineString,
    /// Error literal such as `#DIV/0!`
    Error,
}

impl CellType {
    /// Maps built-in Excel number format ids to date/time cell types.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Detects date and time tokens in a custom number format code.
    /// Quoted literals, escaped characters and bracketed sections are ignored.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// A single cell with position, type and raw value.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    /// Raw value as stored in the file
    pub(crate) value: String,
}

impl Cell {
    /// Returns the A1-style reference of this cell
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Converts the raw value to a roster value.
    ///
    /// Plain numbers stay numeric; dates, times, booleans and durations are rendered as text.
    pub(crate) fn to_value(&self) -> Result<CellValue, RosterError> {
        let value = match self.kind {
            CellType::Empty => CellValue::Empty,
            CellType::Boolean => {
                let truthy = self.value == "1" || self.value.eq_ignore_ascii_case("true");
                CellValue::Text(if truthy { "TRUE" } else { "FALSE" }.to_owned())
            }
            CellType::Number => match self.value.trim().parse::<f64>() {
                Ok(number) if number.is_finite() => CellValue::Number(number),
                _ => CellValue::Text(self.value.to_owned()),
            },
            CellType::NumberDateTime1900 => self.date_value(|serial| to_datetime_string(serial, false))?,
            CellType::NumberDateTime1904 => self.date_value(|serial| to_datetime_string(serial, true))?,
            CellType::NumberDate1900 => self.date_value(|serial| to_date_string(serial, false))?,
            CellType::NumberDate1904 => self.date_value(|serial| to_date_string(serial, true))?,
            CellType::NumberTime1900 | CellType::NumberTime1904 => CellValue::Text(to_time_string(self.serial()?)),
            CellType::IsoDateTime => CellValue::Text(self.value.replace('T', " ")),
            CellType::IsoDuration => CellValue::Text(to_duration_string(&self.value)),
            CellType::InlineString | CellType::Error => CellValue::Text(self.value.to_owned()),
        };
        Ok(value)
    }

    fn serial(&self) -> Result<f64, RosterError> {
        Ok(self.value.trim().parse::<f64>()?)
    }

    /// Renders a date-styled serial, keeping it numeric when it falls outside the calendar.
    fn date_value(&self, render: impl Fn(f64) -> Option<String>) -> Result<CellValue, RosterError> {
        let serial = self.serial()?;
        Ok(match render(serial) {
            Some(text) => CellValue::Text(text),
            None if serial.is_finite() => CellValue::Number(serial),
            None => CellValue::Text(self.value.to_owned()),
        })
    }
}

/// Splits a serial date number into whole days and milliseconds within the day.
/// Rounding to the millisecond may carry into the next day.
fn split_serial(serial: f64) -> (i64, i64) {
    // Saturates for serials beyond the i64 range
    let total = (serial * MILLISECONDS_PER_DAY).round() as i64;
    let per_day = MILLISECONDS_PER_DAY as i64;
    (total.div_euclid(per_day), total.rem_euclid(per_day))
}

/// Converts a serial day number to an ISO date, `None` past the supported calendar.
/// The 1900 system counts the phantom 1900-02-29, so serials below 60 shift by one day.
fn to_date(days: i64, is_1904: bool) -> Option<NaiveDate> {
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(TimeDelta::try_days(days.checked_add(offset)?)?)
}

fn format_time(milliseconds: i64) -> String {
    let mut rest = milliseconds;
    let millis = rest % 1_000; rest /= 1_000;
    let seconds = rest % 60; rest /= 60;
    let minutes = rest % 60; rest /= 60;
    if millis > 0 {
        format!("{rest:02}:{minutes:02}:{seconds:02}.{millis:03}")
    } else {
        format!("{rest:02}:{minutes:02}:{seconds:02}")
    }
}

pub(crate) fn to_date_string(serial: f64, is_1904: bool) -> Option<String> {
    let (days, _) = split_serial(serial);
    Some(to_date(days, is_1904)?.format("%Y-%m-%d").to_string())
}

pub(crate) fn to_time_string(serial: f64) -> String {
    let (_, milliseconds) = split_serial(serial);
    format_time(milliseconds)
}

pub(crate) fn to_datetime_string(serial: f64, is_1904: bool) -> Option<String> {
    let (days, milliseconds) = split_serial(serial);
    Some(format!("{} {}", to_date(days, is_1904)?.format("%Y-%m-%d"), format_time(milliseconds)))
}

/// Renders an ISO 8601 duration such as `PT13H05M00S` as `13:05:00`.
/// Unparseable durations are returned unchanged.
pub(crate) fn to_duration_string(value: &str) -> String {
    match value.parse::<IsoDuration>() {
        Ok(duration) => {
            let hours = duration.day as i64 * 24 + duration.hour as i64;
            let milliseconds = (hours * 3_600 + duration.minute as i64 * 60) * 1_000
                + (duration.second as f64 * 1_000f64).round() as i64;
            format_time(milliseconds)
        }
        Err(_) => value.to_owned(),
    }
}

/// Maps a binary error code to its literal.
pub(crate) fn to_error_value(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// Decodes an RK number: a 30-bit integer or the high 30 bits of a double,
/// optionally divided by 100.
pub(crate) fn rk_to_string(raw: u32) -> String {
    let is_percentage = (raw & 0x01) != 0;
    let is_integer = (raw & 0x02) != 0;
    let mut value = if is_integer {
        ((raw as i32) >> 2) as f64
    } else {
        f64::from_bits(((raw & !0x03) as u64) << 32)
    };
    if is_percentage {
        value /= 100.0;
    }
    if is_integer && !is_percentage {
        (value.trunc() as i64).to_string()
    } else {
        value.to_string()
    }
}
