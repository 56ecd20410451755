//! Parsing of history window lengths such as `4h`, `90m` or `1h30m`

use std::time::Duration;

/// Parse a sequence of `<number><unit>` pairs, units `d`, `h`, `m`, `s`
pub fn parse(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }

        let unit_secs = match ch {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            other => return Err(format!("unknown unit '{}' in \"{}\" (use d, h, m or s)", other, input)),
        };
        if digits.is_empty() {
            return Err(format!("missing number before '{}' in \"{}\"", ch, input));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("number too large in \"{}\"", input))?;
        total = value
            .checked_mul(unit_secs)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration \"{}\" is too long", input))?;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(format!("missing unit after {} in \"{}\" (e.g. 4h)", digits, input));
    }
    if total == 0 {
        return Err("duration must be longer than zero".to_string());
    }
    Ok(Duration::from_secs(total))
}
