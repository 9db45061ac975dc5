/// Parse an abbreviated engagement count as rendered on profile pages.
///
/// `"1.2K"` → 1200, `"3.4M"` → 3_400_000, `"12,345"` → 12345. Anything that
/// doesn't parse is 0.
pub fn parse_metric_count(text: &str) -> u64 {
    let cleaned: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.is_empty() {
        return 0;
    }

    let (number, multiplier) = if let Some(n) = cleaned.strip_suffix('k') {
        (n, 1_000.0)
    } else if let Some(n) = cleaned.strip_suffix('m') {
        (n, 1_000_000.0)
    } else {
        return leading_integer(&cleaned);
    };

    match number.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => (v * multiplier).round() as u64,
        _ => 0,
    }
}

fn leading_integer(s: &str) -> u64 {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}
