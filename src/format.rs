use num_format::{Locale, ToFormattedString as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueFormat {
    #[default]
    Number,
    Currency,
    Percentage,
    Decimal,
    Weight,
}

impl ValueFormat {
    /// Unrecognized format codes fall back to `Number`.
    pub fn parse(code: &str) -> ValueFormat {
        match code {
            "currency" => ValueFormat::Currency,
            "percentage" => ValueFormat::Percentage,
            "decimal" => ValueFormat::Decimal,
            "weight" => ValueFormat::Weight,
            _ => ValueFormat::Number,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ValueFormat::Number => "number",
            ValueFormat::Currency => "currency",
            ValueFormat::Percentage => "percentage",
            ValueFormat::Decimal => "decimal",
            ValueFormat::Weight => "weight",
        }
    }

    pub fn render(self, value: f64) -> String {
        match self {
            // Halves round away from zero, as currency formatting does.
            ValueFormat::Currency => {
                let rounded = value.round() as i64;
                if rounded < 0 {
                    format!("-${}", rounded.unsigned_abs().to_formatted_string(&Locale::en))
                } else {
                    format!("${}", rounded.to_formatted_string(&Locale::en))
                }
            }
            ValueFormat::Percentage => format!("{}%", fixed_two(value)),
            ValueFormat::Decimal => fixed_two(value),
            ValueFormat::Weight => format!("{} lbs", fixed_two(value)),
            // Halves round up, so -2.5 becomes -2.
            ValueFormat::Number => {
                let rounded = (value + 0.5).floor() as i64;
                rounded.to_formatted_string(&Locale::en)
            }
        }
    }
}

/// Two decimal places with exact halves rounded away from zero.
///
/// A double sits exactly halfway between two hundredths only when it is an odd
/// multiple of 1/8, so those are rounded by hand before formatting.
fn fixed_two(value: f64) -> String {
    let eighths = value * 8.0;
    let value = if eighths.fract() == 0.0 && eighths % 2.0 != 0.0 {
        (value * 100.0).abs().ceil().copysign(value) / 100.0
    } else if value == 0.0 {
        0.0
    } else {
        value
    };
    format!("{value:.2}")
}

pub fn format_value(value: f64, format: &str) -> String {
    ValueFormat::parse(format).render(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_rounds_to_whole_dollars() {
        assert_eq!(format_value(1234.5, "currency"), "$1,235");
        assert_eq!(format_value(0.0, "currency"), "$0");
        assert_eq!(format_value(-1999.6, "currency"), "-$2,000");
    }

    #[test]
    fn fixed_point_formats() {
        assert_eq!(format_value(12.345, "percentage"), "12.35%");
        assert_eq!(format_value(3.0, "decimal"), "3.00");
        assert_eq!(format_value(1250.456, "weight"), "1250.46 lbs");
    }

    #[test]
    fn fixed_point_halves_round_away_from_zero() {
        assert_eq!(format_value(0.125, "decimal"), "0.13");
        assert_eq!(format_value(0.375, "decimal"), "0.38");
        assert_eq!(format_value(2.625, "weight"), "2.63 lbs");
        assert_eq!(format_value(-0.125, "percentage"), "-0.13%");
        assert_eq!(format_value(1.005, "decimal"), "1.00");
    }

    #[test]
    fn negative_zero_renders_unsigned() {
        assert_eq!(format_value(-0.0, "decimal"), "0.00");
        assert_eq!(format_value(0.0 * -3.0, "weight"), "0.00 lbs");
        assert_eq!(format_value(-0.0, "percentage"), "0.00%");
    }

    #[test]
    fn number_groups_rounded_integers() {
        assert_eq!(format_value(1234567.4, "number"), "1,234,567");
        assert_eq!(format_value(2.5, "number"), "3");
        assert_eq!(format_value(-2.5, "number"), "-2");
    }

    #[test]
    fn unknown_codes_fall_back_to_number() {
        assert_eq!(format_value(298.0, "sparkline"), "298");
        assert_eq!(format_value(298.0, ""), "298");
        assert_eq!(ValueFormat::parse("weight").code(), "weight");
    }
}
