//
// value_repr.rs
// dicom-deident
//
// Checks a textual replacement against the value representation of the attribute it overwrites.
//

use chrono::{NaiveDate, NaiveTime};
use dicom::core::{PrimitiveValue, VR};

/// Coerce `raw` into a value of representation `vr`, or explain why it does not fit.
pub fn coerce(vr: VR, raw: &str) -> Result<PrimitiveValue, String> {
    match vr {
        VR::DA => check_date(raw).map(|_| text(raw)),
        VR::TM => check_time(raw).map(|_| text(raw)),
        VR::DT => check_datetime(raw).map(|_| text(raw)),
        VR::IS => check_integer_string(raw).map(|_| text(raw)),
        VR::DS => check_decimal_string(raw).map(|_| text(raw)),
        VR::AS => check_age(raw).map(|_| text(raw)),
        VR::UI => check_uid(raw).map(|_| text(raw)),
        VR::CS => check_code_string(raw).map(|_| text(raw)),
        VR::AE | VR::SH => check_short_text(raw, 16).map(|_| text(raw)),
        VR::LO => check_short_text(raw, 64).map(|_| text(raw)),
        VR::PN => check_person_name(raw).map(|_| text(raw)),
        VR::LT => check_long_text(raw, Some(10240)).map(|_| text(raw)),
        VR::ST => check_long_text(raw, Some(1024)).map(|_| text(raw)),
        VR::UT | VR::UC | VR::UR => check_long_text(raw, None).map(|_| text(raw)),
        VR::US => number::<u16>(raw).map(PrimitiveValue::from),
        VR::SS => number::<i16>(raw).map(PrimitiveValue::from),
        VR::UL => number::<u32>(raw).map(PrimitiveValue::from),
        VR::SL => number::<i32>(raw).map(PrimitiveValue::from),
        VR::FL => number::<f32>(raw).map(PrimitiveValue::from),
        VR::FD => number::<f64>(raw).map(PrimitiveValue::from),
        other => Err(format!("{other:?} attributes cannot take a text replacement")),
    }
}

fn text(raw: &str) -> PrimitiveValue {
    PrimitiveValue::from(raw)
}

fn number<T: std::str::FromStr>(raw: &str) -> Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{raw:?} is not a valid {}", std::any::type_name::<T>()))
}

fn check_date(raw: &str) -> Result<(), String> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{raw:?} is not YYYYMMDD"));
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|_| ())
        .map_err(|_| format!("{raw:?} is not a calendar date"))
}

fn check_time(raw: &str) -> Result<(), String> {
    let (clock, fraction) = match raw.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (raw, None),
    };
    let shape_ok = matches!(clock.len(), 2 | 4 | 6)
        && clock.bytes().all(|b| b.is_ascii_digit())
        && fraction.map_or(true, |f| {
            clock.len() == 6 && (1..=6).contains(&f.len()) && f.bytes().all(|b| b.is_ascii_digit())
        });
    if !shape_ok {
        return Err(format!("{raw:?} is not HH[MM[SS[.FFFFFF]]]"));
    }

    let padded = format!("{clock:0<6}");
    // Leap second 60 is legal in TM.
    let seconds_fixed = if &padded[4..6] == "60" {
        format!("{}59", &padded[..4])
    } else {
        padded
    };
    NaiveTime::parse_from_str(&seconds_fixed, "%H%M%S")
        .map(|_| ())
        .map_err(|_| format!("{raw:?} is out of range"))
}

fn check_datetime(raw: &str) -> Result<(), String> {
    if !raw.is_ascii() {
        return Err(format!("{raw:?} contains non-ASCII characters"));
    }
    let (stamp, offset) = match raw.find(|c: char| c == '+' || c == '-') {
        Some(at) => (&raw[..at], Some(&raw[at + 1..])),
        None => (raw, None),
    };
    if let Some(offset) = offset {
        if offset.len() != 4 || !offset.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("{raw:?} has a malformed UTC offset"));
        }
    }
    if stamp.len() < 4 || !stamp[..4].bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{raw:?} does not start with a year"));
    }
    let (date, time) = stamp.split_at(stamp.len().min(8));
    if date.len() == 8 {
        check_date(date)?;
    } else if !date.bytes().all(|b| b.is_ascii_digit()) || date.len() % 2 != 0 {
        return Err(format!("{raw:?} has a malformed date part"));
    }
    if !time.is_empty() {
        check_time(time)?;
    }
    Ok(())
}

fn check_integer_string(raw: &str) -> Result<(), String> {
    let value = raw.trim();
    if value.len() > 12 {
        return Err(format!("{raw:?} is longer than 12 characters"));
    }
    value
        .parse::<i32>()
        .map(|_| ())
        .map_err(|_| format!("{raw:?} is not an integer string"))
}

fn check_decimal_string(raw: &str) -> Result<(), String> {
    let value = raw.trim();
    if value.len() > 16 {
        return Err(format!("{raw:?} is longer than 16 characters"));
    }
    let allowed = value
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    match value.parse::<f64>() {
        Ok(v) if allowed && v.is_finite() => Ok(()),
        _ => Err(format!("{raw:?} is not a decimal string")),
    }
}

fn check_age(raw: &str) -> Result<(), String> {
    let bytes = raw.as_bytes();
    let ok = bytes.len() == 4
        && bytes[..3].iter().all(u8::is_ascii_digit)
        && matches!(bytes[3], b'D' | b'W' | b'M' | b'Y');
    if ok {
        Ok(())
    } else {
        Err(format!("{raw:?} is not nnnD/W/M/Y"))
    }
}

fn check_uid(raw: &str) -> Result<(), String> {
    let ok = !raw.is_empty()
        && raw.len() <= 64
        && raw.split('.').all(|component| {
            !component.is_empty()
                && component.bytes().all(|b| b.is_ascii_digit())
                && (component == "0" || !component.starts_with('0'))
        });
    if ok {
        Ok(())
    } else {
        Err(format!("{raw:?} is not a UID"))
    }
}

fn check_code_string(raw: &str) -> Result<(), String> {
    if raw.len() > 16 {
        return Err(format!("{raw:?} is longer than 16 characters"));
    }
    if raw
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b' ' || b == b'_')
    {
        Ok(())
    } else {
        Err(format!("{raw:?} contains characters not allowed in CS"))
    }
}

fn check_short_text(raw: &str, max: usize) -> Result<(), String> {
    if raw.chars().count() > max {
        return Err(format!("{raw:?} is longer than {max} characters"));
    }
    if raw.chars().any(char::is_control) || raw.contains('\\') {
        return Err(format!("{raw:?} contains control characters or a backslash"));
    }
    Ok(())
}

fn check_person_name(raw: &str) -> Result<(), String> {
    if raw.split('=').count() > 3 {
        return Err(format!("{raw:?} has more than three component groups"));
    }
    for group in raw.split('=') {
        check_short_text(group, 64)?;
        if group.split('^').count() > 5 {
            return Err(format!("{raw:?} has more than five name components"));
        }
    }
    Ok(())
}

fn check_long_text(raw: &str, max: Option<usize>) -> Result<(), String> {
    if let Some(max) = max {
        if raw.chars().count() > max {
            return Err(format!("replacement is longer than {max} characters"));
        }
    }
    if raw
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\r' | '\n' | '\t' | '\x0c'))
    {
        return Err("replacement contains control characters".to_string());
    }
    Ok(())
}
