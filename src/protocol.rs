//! Encoders and decoders for the controller's positional text formats.
//!
//! The device answers every request with a flat string whose fields are
//! identified only by their position. Layouts are described by [`Layout`]
//! tables so that a firmware offset change is a one-line edit. Widths count
//! characters, not bytes.
//!
//! All functions here are pure; `crate::client` wires them to HTTP.

use chrono::NaiveDateTime;

use crate::client::BmrClientError;
use crate::models::bmr::{Assignments, CircuitId, CircuitStatus, LowMode};

/// `strftime` pattern of the 15-character datetime blocks used by low mode.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d%H:%M";
pub const DATETIME_WIDTH: usize = 15;

/// Body sent to endpoints that take no argument.
pub const NO_PARAM: &str = " ";

const MODE_NAME_WIDTH: usize = 13;
const MODE_ID_BIAS: i32 = 32;
/// Tail of `/saveAssignmentModes`; the remaining slots are always reset.
const UNUSED_MODE_SLOTS: &str = "-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub width: usize,
}

impl Field {
    pub const fn new(name: &'static str, width: usize) -> Self {
        Field { name, width }
    }
}

/// Contiguous fixed-width fields, in wire order.
#[derive(Debug, Clone, Copy)]
pub struct Layout<const N: usize> {
    pub fields: [Field; N],
}

impl<const N: usize> Layout<N> {
    pub const fn width(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < N {
            total += self.fields[i].width;
            i += 1;
        }
        total
    }

    /// Cut `text` into one slice per field. Characters past the layout are
    /// ignored; `None` when `text` is too short.
    pub fn split<'a>(&self, text: &'a str) -> Option<[&'a str; N]> {
        let mut out = [""; N];
        let mut rest = text;
        for (slot, field) in out.iter_mut().zip(self.fields.iter()) {
            let end = char_boundary(rest, field.width)?;
            let (head, tail) = rest.split_at(end);
            *slot = head;
            rest = tail;
        }
        Some(out)
    }
}

/// Byte offset just past the first `chars` characters of `s`.
fn char_boundary(s: &str, chars: usize) -> Option<usize> {
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .nth(chars)
}

/// Response of `/wholeRoom`.
pub const WHOLE_ROOM: Layout<14> = Layout {
    fields: [
        Field::new("enabled", 1),
        Field::new("name", 13),
        Field::new("temperature", 5),
        Field::new("target_temperature_str", 3),
        Field::new("target_temperature", 5),
        Field::new("user_offset", 5),
        Field::new("max_offset", 4),
        Field::new("heating", 1),
        Field::new("window_heating", 1),
        Field::new("card", 1),
        Field::new("warning", 3),
        Field::new("low_mode", 1),
        Field::new("summer_mode", 1),
        Field::new("cooling", 1),
    ],
};

/// Response of `/loadLows` and payload of `/lowSave`. Both datetime blocks
/// may be missing from responses.
pub const LOW_MODE: Layout<3> = Layout {
    fields: [
        Field::new("temperature", 3),
        Field::new("start_datetime", DATETIME_WIDTH),
        Field::new("end_datetime", DATETIME_WIDTH),
    ],
};

/// Response of `/roomSettings`; only the mode id is decoded.
pub const ROOM_SETTINGS: Layout<2> = Layout {
    fields: [Field::new("circuit", 2), Field::new("mode_id", 2)],
};

fn malformed(text: &str) -> BmrClientError {
    BmrClientError::MalformedResponse(text.to_string())
}

/// Numeric field the device sometimes fills with garbage such as
/// `"00\0\0\0"` or `"-1-1-"`.
fn lenient_float(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn flag(field: &str, text: &str) -> Result<bool, BmrClientError> {
    int::<i32>(field, text).map(|v| v != 0)
}

fn int<T: std::str::FromStr>(field: &str, text: &str) -> Result<T, BmrClientError> {
    field.trim().parse::<T>().map_err(|_| malformed(text))
}

pub fn parse_num_circuits(text: &str) -> Result<u8, BmrClientError> {
    int(text, text)
}

pub fn parse_circuit(id: CircuitId, text: &str) -> Result<CircuitStatus, BmrClientError> {
    let [
        enabled,
        name,
        temperature,
        _target_temperature_str,
        target_temperature,
        user_offset,
        max_offset,
        heating,
        _window_heating,
        _card,
        warning,
        low_mode,
        summer_mode,
        cooling,
    ] = WHOLE_ROOM.split(text).ok_or_else(|| malformed(text))?;

    Ok(CircuitStatus {
        id,
        enabled: flag(enabled, text)?,
        name: name.trim_end().to_string(),
        temperature: lenient_float(temperature),
        target_temperature: lenient_float(target_temperature),
        user_offset: lenient_float(user_offset),
        max_offset: lenient_float(max_offset),
        heating: flag(heating, text)?,
        cooling: flag(cooling, text)?,
        low_mode: flag(low_mode, text)?,
        summer_mode: flag(summer_mode, text)?,
        warning: int(warning, text)?,
    })
}

/// One character per circuit; any digit other than `0` counts as assigned.
pub fn parse_assignments(text: &str) -> Result<Assignments, BmrClientError> {
    text.chars()
        .map(|c| c.to_digit(10).map(|d| d != 0).ok_or_else(|| malformed(text)))
        .collect::<Result<Vec<_>, _>>()
        .map(Assignments)
}

pub fn encode_assignments(assignments: &Assignments) -> String {
    assignments.0.iter().map(|v| if *v { '1' } else { '0' }).collect()
}

/// Set `circuits` to `value` in `assignments`, leaving the rest untouched.
pub fn apply_assignments(
    assignments: &mut Assignments,
    circuits: &[CircuitId],
    value: bool,
) -> Result<(), BmrClientError> {
    let count = assignments.len();
    for &circuit in circuits {
        let slot = assignments
            .0
            .get_mut(usize::from(circuit))
            .ok_or(BmrClientError::UnknownCircuit { circuit, count })?;
        *slot = value;
    }
    Ok(())
}

fn is_datetime_block(block: &str) -> bool {
    block.len() == DATETIME_WIDTH
        && block.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            12 => b == b':',
            _ => b.is_ascii_digit(),
        })
}

pub fn parse_low_mode(text: &str) -> Result<LowMode, BmrClientError> {
    let [temperature_width, block_width, _] = LOW_MODE.fields.map(|f| f.width);

    let digits = char_boundary(text, temperature_width)
        .map(|end| &text[..end])
        .filter(|t| t.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| malformed(text))?;
    let temperature: u16 = int(digits, text)?;

    // The end block only counts when it follows a start block.
    let mut rest = &text[digits.len()..];
    let mut next_block = || -> Result<Option<NaiveDateTime>, BmrClientError> {
        let Some(end) = char_boundary(rest, block_width) else {
            return Ok(None);
        };
        let block = &rest[..end];
        if !is_datetime_block(block) {
            return Ok(None);
        }
        rest = &rest[end..];
        NaiveDateTime::parse_from_str(block, DATETIME_FORMAT)
            .map(Some)
            .map_err(|_| malformed(text))
    };

    let start_date = next_block()?;
    let end_date = match start_date {
        Some(_) => next_block()?,
        None => None,
    };

    Ok(LowMode {
        enabled: start_date.is_some(),
        temperature,
        start_date,
        end_date,
    })
}

/// Payload of `/lowSave`. Blocks are blanked when disabling or when the bound
/// is missing.
pub fn encode_low_mode(
    enabled: bool,
    temperature: u16,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> String {
    let block = |dt: Option<NaiveDateTime>| match dt {
        Some(dt) if enabled => dt.format(DATETIME_FORMAT).to_string(),
        _ => " ".repeat(DATETIME_WIDTH),
    };
    format!("{:03}{}{}", temperature, block(start), block(end))
}

/// Value of the `modeSettings` field of `/saveMode`. Spaces and the colon
/// become `+` and `%3A` once form-encoded.
pub fn encode_mode_settings(order: u8, mode_name: &str, temperature: f64) -> String {
    let name: String = mode_name.chars().take(MODE_NAME_WIDTH).collect();
    format!(
        "{:02}{:<width$}00:00{:03}",
        order,
        name,
        temperature.trunc() as i64,
        width = MODE_NAME_WIDTH
    )
}

/// Value of the `roomSettings` field of `/saveAssignmentModes`.
pub fn encode_room_settings(circuit: CircuitId, mode_id: u8) -> String {
    format!("{:02}01{:02}{}", circuit, mode_id, UNUSED_MODE_SLOTS)
}

/// Mode id assigned to a circuit, `None` when the device returns garbage.
/// A body cut short inside the mode id field still yields what is there.
pub fn parse_mode_id(text: &str) -> Option<i32> {
    let [circuit, mode_id] = ROOM_SETTINGS.fields.map(|f| f.width);
    let field: String = text.chars().skip(circuit).take(mode_id).collect();
    field.trim().parse::<i32>().ok().map(|v| v - MODE_ID_BIAS)
}

/// `application/x-www-form-urlencoded` body.
pub fn encode_form(fields: &[(&str, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const ROOM: &str = "1Pokoj 202 v  021.7+12012.0000.000.0000000000";

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(h, min, 0))
            .unwrap()
    }

    #[test]
    fn whole_room_layout_is_contiguous() {
        assert_eq!(WHOLE_ROOM.width(), 45);
        assert_eq!(ROOM.len(), WHOLE_ROOM.width());
        assert!(WHOLE_ROOM.split(&ROOM[..44]).is_none());
    }

    #[test]
    fn parses_circuit() {
        let c = parse_circuit(3, ROOM).unwrap();
        assert_eq!(c.id, 3);
        assert!(c.enabled);
        assert_eq!(c.name, "Pokoj 202 v");
        assert_eq!(c.temperature, Some(21.7));
        assert_eq!(c.target_temperature, Some(12.0));
        assert_eq!(c.user_offset, Some(0.0));
        assert_eq!(c.max_offset, Some(0.0));
        assert!(!c.heating);
        assert!(!c.cooling);
        assert!(!c.low_mode);
        assert!(!c.summer_mode);
        assert_eq!(c.warning, 0);
    }

    #[test]
    fn corrupted_temperature_is_absent() {
        let text = "1Pokoj 202 v  00\0\0\0+12012.0000.0-1-1100003110";
        let c = parse_circuit(0, text).unwrap();
        assert_eq!(c.temperature, None);
        assert_eq!(c.target_temperature, Some(12.0));
        assert_eq!(c.user_offset, Some(0.0));
        assert_eq!(c.max_offset, None);
        assert!(c.heating);
        assert_eq!(c.warning, 3);
        assert!(c.low_mode);
        assert!(c.summer_mode);
        assert!(!c.cooling);
    }

    #[test]
    fn name_counts_characters_not_bytes() {
        let text = "0Ložnice      019.5+21021.0001.502.0100000001";
        let c = parse_circuit(1, text).unwrap();
        assert!(!c.enabled);
        assert_eq!(c.name, "Ložnice");
        assert_eq!(c.temperature, Some(19.5));
        assert_eq!(c.target_temperature, Some(21.0));
        assert_eq!(c.user_offset, Some(1.5));
        assert_eq!(c.max_offset, Some(2.0));
        assert!(c.heating);
        assert!(c.cooling);
    }

    #[test]
    fn negative_warning_is_kept() {
        let text = format!("{}-01000", &ROOM[..39]);
        let c = parse_circuit(0, &text).unwrap();
        assert_eq!(c.warning, -1);
        assert_eq!(c.temperature, Some(21.7));
        assert_eq!(c.name, "Pokoj 202 v");
    }

    #[test]
    fn short_or_bad_flags_are_malformed() {
        assert!(matches!(
            parse_circuit(0, "1Pokoj"),
            Err(BmrClientError::MalformedResponse(t)) if t == "1Pokoj"
        ));
        let bad_flag = ROOM.replacen('1', "x", 1);
        assert!(parse_circuit(0, &bad_flag).is_err());
    }

    #[test]
    fn parses_assignments() {
        let a = parse_assignments("0101").unwrap();
        assert_eq!(a.0, vec![false, true, false, true]);
        assert!(parse_assignments("01x1").is_err());
        assert!(parse_assignments("").unwrap().is_empty());
    }

    #[test]
    fn applying_assignments_flips_only_listed_circuits() {
        let mut a = parse_assignments("0100").unwrap();
        apply_assignments(&mut a, &[2], true).unwrap();
        assert_eq!(encode_assignments(&a), "0110");

        let err = apply_assignments(&mut a, &[4], false).unwrap_err();
        assert!(matches!(err, BmrClientError::UnknownCircuit { circuit: 4, count: 4 }));
    }

    #[test]
    fn low_mode_temperature_only() {
        let low = parse_low_mode("018").unwrap();
        assert!(!low.enabled);
        assert_eq!(low.temperature, 18);
        assert_eq!(low.start_date, None);
        assert_eq!(low.end_date, None);

        let blank = format!("018{}", " ".repeat(30));
        assert_eq!(parse_low_mode(&blank).unwrap(), low);
    }

    #[test]
    fn low_mode_with_bounds() {
        let low = parse_low_mode("0162024-01-1508:302024-01-2017:00").unwrap();
        assert!(low.enabled);
        assert_eq!(low.temperature, 16);
        assert_eq!(low.start_date, Some(at(2024, 1, 15, 8, 30)));
        assert_eq!(low.end_date, Some(at(2024, 1, 20, 17, 0)));

        let open_ended = parse_low_mode(&format!("0162024-01-1508:30{}", " ".repeat(15))).unwrap();
        assert!(open_ended.enabled);
        assert_eq!(open_ended.end_date, None);
    }

    #[test]
    fn low_mode_rejects_bad_temperature_and_dates() {
        assert!(parse_low_mode("1a5").is_err());
        assert!(parse_low_mode("15").is_err());
        assert!(parse_low_mode("0162024-13-4508:30").is_err());
    }

    #[test]
    fn low_mode_temperature_round_trips() {
        let payload = encode_low_mode(false, 215, None, None);
        assert_eq!(&payload[..3], "215");
        assert_eq!(parse_low_mode(&payload).unwrap().temperature, 215);
    }

    #[test]
    fn encodes_low_mode_blocks() {
        let start = at(2024, 1, 15, 8, 30);
        let end = at(2024, 1, 20, 17, 0);
        assert_eq!(
            encode_low_mode(true, 16, Some(start), Some(end)),
            "0162024-01-1508:302024-01-2017:00"
        );
        assert_eq!(
            encode_low_mode(true, 16, Some(start), None),
            format!("0162024-01-1508:30{}", " ".repeat(15))
        );
        assert_eq!(
            encode_low_mode(false, 16, Some(start), Some(end)),
            format!("016{}", " ".repeat(30))
        );
    }

    #[test]
    fn encodes_mode_settings() {
        assert_eq!(encode_mode_settings(1, "Comfort", 21.9), "01Comfort      00:00021");
        assert_eq!(
            encode_mode_settings(12, "A very long mode name", 5.0),
            "12A very long m00:00005"
        );
    }

    #[test]
    fn mode_settings_form_matches_device_traffic() {
        let body = encode_form(&[("modeSettings", encode_mode_settings(1, "Comfort", 21.0))]);
        assert_eq!(body, "modeSettings=01Comfort++++++00%3A00021");
        assert_eq!(encode_form(&[("param", NO_PARAM.to_string())]), "param=+");
    }

    #[test]
    fn encodes_room_settings() {
        assert_eq!(
            encode_room_settings(23, 10),
            "230110-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1"
        );
        assert_eq!(
            encode_form(&[("roomSettings", encode_room_settings(3, 9))]),
            "roomSettings=030109-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1-1"
        );
    }

    #[test]
    fn parses_mode_id() {
        assert_eq!(parse_mode_id("0342rest-of-settings"), Some(10));
        assert_eq!(parse_mode_id("03--"), None);
        assert_eq!(parse_mode_id("03"), None);
        assert_eq!(parse_mode_id("024"), Some(-28));
    }
}
