//! NMEA 0183 sentence parsing.
//!
//! Only the two sentences that carry a position are understood: `GGA` (fix data)
//! and `RMC` (recommended minimum). Any talker id is accepted (`GP`, `GN`, `GL`, ...).
//! Other sentence types parse to `Ok(None)`.

use time::{Date, Month, OffsetDateTime, Time};

use geotrack_types::Position;

use crate::error::{Error, Result};

/// Parse one NMEA line into a position, if it carries a valid fix.
///
/// # Examples
///
/// ```
/// use geotrack_core::nmea::parse_sentence;
///
/// let fix = parse_sentence("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,")
///     .unwrap()
///     .unwrap();
/// assert!((fix.latitude - 48.1173).abs() < 1e-4);
/// assert!((fix.longitude - 11.516_667).abs() < 1e-4);
/// ```
pub fn parse_sentence(line: &str) -> Result<Option<Position>> {
    let line = line.trim();
    let Some(body) = line.strip_prefix('$') else {
        return Err(invalid(line, "missing '$'"));
    };

    let body = match body.split_once('*') {
        Some((payload, checksum)) => {
            verify_checksum(payload, checksum).map_err(|reason| invalid(line, &reason))?;
            payload
        }
        None => body,
    };

    let fields: Vec<&str> = body.split(',').collect();
    let kind = fields[0];
    if !kind.is_ascii() || kind.len() < 5 {
        return Err(invalid(line, "short sentence id"));
    }

    let position = match &kind[kind.len() - 3..] {
        "GGA" => parse_gga(&fields),
        "RMC" => parse_rmc(&fields),
        _ => return Ok(None),
    };

    let Some(position) = position.map_err(|reason| invalid(line, &reason))? else {
        return Ok(None);
    };
    position
        .validate()
        .map_err(|e| invalid(line, &e.to_string()))?;
    Ok(Some(position))
}

/// Compute the XOR checksum of a sentence payload (the text between `$` and `*`).
pub fn checksum(payload: &str) -> u8 {
    payload.bytes().fold(0, |acc, b| acc ^ b)
}

fn verify_checksum(payload: &str, expected: &str) -> std::result::Result<(), String> {
    let expected = u8::from_str_radix(expected.trim(), 16)
        .map_err(|_| format!("bad checksum field '{expected}'"))?;
    let actual = checksum(payload);
    if actual == expected {
        Ok(())
    } else {
        Err(format!(
            "checksum mismatch: expected {expected:02X}, computed {actual:02X}"
        ))
    }
}

// $--GGA,time,lat,N/S,lon,E/W,quality,...
fn parse_gga(fields: &[&str]) -> std::result::Result<Option<Position>, String> {
    if fields.len() < 7 {
        return Err("GGA needs at least 7 fields".to_string());
    }
    let quality = field(fields, 6);
    if quality.is_empty() || quality == "0" {
        return Ok(None);
    }
    let Some((latitude, longitude)) = parse_coordinates(fields, 2)? else {
        return Ok(None);
    };
    Ok(Some(Position::new(latitude, longitude)))
}

// $--RMC,time,status,lat,N/S,lon,E/W,speed,course,date,...
fn parse_rmc(fields: &[&str]) -> std::result::Result<Option<Position>, String> {
    if fields.len() < 10 {
        return Err("RMC needs at least 10 fields".to_string());
    }
    if field(fields, 2) != "A" {
        return Ok(None);
    }
    let Some((latitude, longitude)) = parse_coordinates(fields, 3)? else {
        return Ok(None);
    };
    let mut position = Position::new(latitude, longitude);
    if let Some(captured_at) = parse_timestamp(field(fields, 9), field(fields, 1)) {
        position = position.with_captured_at(captured_at);
    }
    Ok(Some(position))
}

fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

/// Parse the four fields starting at `start`: lat, N/S, lon, E/W.
fn parse_coordinates(
    fields: &[&str],
    start: usize,
) -> std::result::Result<Option<(f64, f64)>, String> {
    let lat = field(fields, start);
    let lon = field(fields, start + 2);
    if lat.is_empty() || lon.is_empty() {
        return Ok(None);
    }
    let mut latitude = parse_degrees_minutes(lat)?;
    let mut longitude = parse_degrees_minutes(lon)?;
    match field(fields, start + 1) {
        "N" => {}
        "S" => latitude = -latitude,
        other => return Err(format!("bad latitude hemisphere '{other}'")),
    }
    match field(fields, start + 3) {
        "E" => {}
        "W" => longitude = -longitude,
        other => return Err(format!("bad longitude hemisphere '{other}'")),
    }
    Ok(Some((latitude, longitude)))
}

/// `ddmm.mmmm` or `dddmm.mmmm` to decimal degrees.
fn parse_degrees_minutes(raw: &str) -> std::result::Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("bad coordinate '{raw}'"))?;
    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    if !(0.0..60.0).contains(&minutes) {
        return Err(format!("bad minutes in '{raw}'"));
    }
    Ok(degrees + minutes / 60.0)
}

/// `ddmmyy` + `hhmmss[.sss]` to a UTC timestamp.
fn parse_timestamp(date: &str, time: &str) -> Option<OffsetDateTime> {
    if date.len() != 6 || time.len() < 6 || !date.is_ascii() || !time.is_ascii() {
        return None;
    }
    let day: u8 = date[0..2].parse().ok()?;
    let month: u8 = date[2..4].parse().ok()?;
    let year: i32 = date[4..6].parse().ok()?;
    let hour: u8 = time[0..2].parse().ok()?;
    let minute: u8 = time[2..4].parse().ok()?;
    let second: u8 = time[4..6].parse().ok()?;

    let date = Date::from_calendar_date(2000 + year, Month::try_from(month).ok()?, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(date.with_time(time).assume_utc())
}

fn invalid(line: &str, reason: &str) -> Error {
    Error::InvalidSentence(format!("{reason}: {line}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::datetime;

    fn sentence(payload: &str) -> String {
        format!("${payload}*{:02X}", checksum(payload))
    }

    #[test]
    fn test_parse_gga() {
        let line = sentence("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        let fix = parse_sentence(&line).unwrap().unwrap();
        assert!((fix.latitude - 48.1173).abs() < 1e-6);
        assert!((fix.longitude - 11.516_666_666).abs() < 1e-6);
        assert_eq!(fix.captured_at, None);
    }

    #[test]
    fn test_parse_gga_southern_western_hemisphere() {
        let line = sentence("GNGGA,010203,0436.000,S,07405.000,W,2,10,1.0,2600.0,M,0.0,M,,");
        let fix = parse_sentence(&line).unwrap().unwrap();
        assert!((fix.latitude + 4.6).abs() < 1e-9);
        assert!((fix.longitude + 74.083_333_333).abs() < 1e-6);
    }

    #[test]
    fn test_parse_gga_without_fix() {
        let line = sentence("GPGGA,123519,,,,,0,00,,,M,,M,,");
        assert_eq!(parse_sentence(&line).unwrap(), None);
    }

    #[test]
    fn test_parse_rmc_with_timestamp() {
        let line = sentence("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W");
        let fix = parse_sentence(&line).unwrap().unwrap();
        assert!((fix.latitude - 48.1173).abs() < 1e-6);
        assert_eq!(fix.captured_at, Some(datetime!(2094-03-23 12:35:19 UTC)));
    }

    #[test]
    fn test_parse_rmc_void_status() {
        let line = sentence("GPRMC,123519,V,,,,,,,230394,,");
        assert_eq!(parse_sentence(&line).unwrap(), None);
    }

    #[test]
    fn test_other_sentences_are_ignored() {
        let line = sentence("GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00");
        assert_eq!(parse_sentence(&line).unwrap(), None);
    }

    #[test]
    fn test_checksum_mismatch() {
        let err = parse_sentence("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*00")
            .unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_missing_dollar() {
        assert!(parse_sentence("GPGGA,1,2,3").is_err());
    }

    #[test]
    fn test_bad_hemisphere() {
        let line = sentence("GPGGA,123519,4807.038,X,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        assert!(parse_sentence(&line).is_err());
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let line = sentence("GPGGA,123519,9107.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        assert!(parse_sentence(&line).is_err());
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(line in "\\PC*") {
            let _ = parse_sentence(&line);
        }

        #[test]
        fn prop_parse_never_panics_on_dollar_lines(body in "[A-Z]{0,6}(,[0-9A-Z.]{0,10}){0,14}") {
            let _ = parse_sentence(&format!("${body}"));
            let _ = parse_sentence(&sentence(&body));
        }
    }
}
