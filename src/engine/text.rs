/// Trim and cap to `max` characters.
pub fn clamp(s: &str, max: usize) -> String {
    s.trim().chars().take(max).collect::<String>().trim_end().to_string()
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive name match, Unicode-aware.
pub fn same_name(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Lowercase ASCII slug: `"Alex P."` → `"alex-p"`.
pub fn slug(s: &str) -> Option<String> {
    let mut out = String::new();
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    (!out.is_empty()).then_some(out)
}

/// Pick `base`, `base-2`, `base-3`, … the first not taken.
pub fn unique_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Normalize a phone number to E.164, or `None` if it cannot be one.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let plus = raw.starts_with('+');
    let mut digits = String::new();
    for c in raw.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' | '+' => {}
            _ => return None,
        }
    }
    if plus {
        return (8..=15).contains(&digits.len()).then(|| format!("+{digits}"));
    }
    match digits.len() {
        10 => Some(format!("+1{digits}")),
        11 if digits.starts_with('1') => Some(format!("+{digits}")),
        _ => None,
    }
}

pub fn display_phone(e164: &str) -> String {
    match e164.strip_prefix("+1") {
        Some(rest) if rest.len() == 10 && rest.bytes().all(|b| b.is_ascii_digit()) => {
            format!("({}) {}-{}", &rest[..3], &rest[3..6], &rest[6..])
        }
        _ => e164.to_string(),
    }
}

/// Uppercase and trim a code reference (`" appt-3"` → `"APPT-3"`).
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Numeric suffix of a `PREFIX-n` code.
pub fn code_number(code: &str, prefix: &str) -> Option<u64> {
    code.strip_prefix(prefix)?.strip_prefix('-')?.parse().ok()
}

/// Next `PREFIX-n` code after the maximum existing suffix.
pub fn next_code<'a>(prefix: &str, existing: impl Iterator<Item = &'a str>) -> String {
    let max = existing.filter_map(|c| code_number(c, prefix)).max().unwrap_or(0);
    format!("{prefix}-{}", max + 1)
}
