use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rand::Rng;
use serde_json::Value;

use crate::{ServiceError, ServiceResult};

const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%&*";

pub const TEMPORARY_PASSWORD_LENGTH: usize = 10;

/// Generate a random temporary password
pub fn generate_temporary_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}

/// Hyphenated RFC 4122 UUID of version 1 through 5.
pub fn is_uuid(value: &str) -> bool {
    if value.len() != 36 {
        return false;
    }
    match uuid::Uuid::try_parse(value) {
        Ok(id) => {
            matches!(id.get_version_num(), 1..=5) && id.get_variant() == uuid::Variant::RFC4122
        }
        Err(_) => false,
    }
}

/// Validate email format (basic validation)
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let labels_ok = domain
        .rsplit_once('.')
        .map(|(host, tld)| !host.is_empty() && !host.starts_with('.') && !tld.is_empty())
        .unwrap_or(false);
    !local.is_empty() && !domain.contains('@') && !email.chars().any(char::is_whitespace) && labels_ok
}

/// Coerce a loosely typed JSON value into a finite number, defaulting to zero.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(0.0)
            }
        }
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Coerce a movement quantity: non-negative and finite, defaulting to zero.
pub fn coerce_quantity(value: Option<&Value>) -> f64 {
    let n = coerce_number(value);
    if n > 0.0 {
        n
    } else {
        0.0
    }
}

/// Parse a calendar day from `YYYY-MM-DD`, an RFC 3339 timestamp or a naive date-time.
pub fn parse_day(raw: &str) -> ServiceResult<NaiveDate> {
    parse_timestamp(raw)
        .map(|ts| ts.date_naive())
        .ok_or_else(|| ServiceError::Validation(format!("Data inválida: \"{}\".", raw)))
}

/// Parse a timestamp as stored by the backend, interpreting naive values as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres renders timestamptz with a short offset, e.g. `+00`.
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// Minimal HTML escaping for user-supplied text placed in email bodies.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace characters that are unsafe in a download file name.
pub fn sanitize_filename(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            c if c.is_whitespace() => '_',
            '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// ASCII form of a file name: Portuguese accents folded, anything else
/// outside ASCII replaced by `_`.
pub fn ascii_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            c if c.is_ascii() => c,
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            'ñ' => 'n',
            'Ñ' => 'N',
            _ => '_',
        })
        .collect()
}

/// Treat empty or whitespace-only strings as absent.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
