/// Loosely typed user input for amounts: numbers or text such as `"$5"`.
pub trait IntoAmount {
    fn into_amount(self) -> Option<f64>;
}

impl IntoAmount for f64 {
    fn into_amount(self) -> Option<f64> {
        Some(self)
    }
}

impl IntoAmount for u32 {
    fn into_amount(self) -> Option<f64> {
        Some(self as f64)
    }
}

impl IntoAmount for i32 {
    fn into_amount(self) -> Option<f64> {
        Some(self as f64)
    }
}

impl IntoAmount for u64 {
    fn into_amount(self) -> Option<f64> {
        Some(self as f64)
    }
}

impl IntoAmount for &str {
    fn into_amount(self) -> Option<f64> {
        parse_amount(self)
    }
}

impl IntoAmount for String {
    fn into_amount(self) -> Option<f64> {
        parse_amount(&self)
    }
}

/// Keeps digits, `.` and `-`, then parses what is left.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_currency_noise() {
        assert_eq!(parse_amount("$5"), Some(5.0));
        assert_eq!(parse_amount(" 12.50 USD"), Some(12.5));
        assert_eq!(parse_amount("-3"), Some(-3.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("1.2.3"), None);
        assert_eq!("7".into_amount(), Some(7.0));
    }
}
