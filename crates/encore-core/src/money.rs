//! Money Helpers
//!
//! All amounts in this system are integer minor units (US cents) to keep
//! arithmetic exact. Formatting to dollars happens only at display edges
//! (receipts, emails).

/// Amount in US cents
pub type Cents = i64;

/// Format a cent amount as a dollar string, e.g. `2091` -> `"$20.91"`
pub fn format_usd(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(0), "$0.00");
        assert_eq!(format_usd(5), "$0.05");
        assert_eq!(format_usd(2091), "$20.91");
        assert_eq!(format_usd(100_000), "$1000.00");
    }

    #[test]
    fn test_format_usd_negative() {
        // Corrections can go negative even though normal flow never does
        assert_eq!(format_usd(-150), "-$1.50");
    }
}
