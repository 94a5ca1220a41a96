use serde::Serialize;

/// Unit system from the %MO command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Millimeters,
    Inches,
}

/// Which zeros the file leaves out of coordinate fields (`FSLA` / `FSTA`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Omission {
    /// Leading zeros omitted: pad on the left.
    #[default]
    Front,
    /// Trailing zeros omitted: pad on the right.
    Back,
}

/// Fixed-point layout of coordinate fields, from the %FS command.
///
/// Example: `%FSLAX24Y24*%` means leading-zero omission, 2 integer digits and
/// 4 decimal digits. Until a file declares one, 3.3 with front omission applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateResolution {
    pub integer_digits: u8,
    pub decimal_digits: u8,
    pub omission: Omission,
}

impl Default for CoordinateResolution {
    fn default() -> Self {
        Self {
            integer_digits: 3,
            decimal_digits: 3,
            omission: Omission::Front,
        }
    }
}

impl CoordinateResolution {
    pub fn total_digits(&self) -> usize {
        self.integer_digits as usize + self.decimal_digits as usize
    }

    /// Decode one coordinate field (digits with an optional leading sign) into a number.
    ///
    /// The digits are zero-padded to the full width on the omitted side, then the
    /// decimal point is placed after `integer_digits` digits. Fields longer than the
    /// declared width keep their extra digits in the fraction.
    pub fn decode(&self, field: &str) -> f64 {
        let (negative, digits) = match field.as_bytes().first() {
            Some(b'-') => (true, &field[1..]),
            Some(b'+') => (false, &field[1..]),
            _ => (false, field),
        };

        let padding = self.total_digits().saturating_sub(digits.len());
        let mut padded = String::with_capacity(digits.len() + padding);
        match self.omission {
            Omission::Front => {
                padded.extend(std::iter::repeat('0').take(padding));
                padded.push_str(digits);
            }
            Omission::Back => {
                padded.push_str(digits);
                padded.extend(std::iter::repeat('0').take(padding));
            }
        }

        let split = (self.integer_digits as usize).min(padded.len());
        let (int_part, frac_part) = padded.split_at(split);
        let value = format!("{int_part}.{frac_part}").parse::<f64>().unwrap_or(0.0);
        if negative {
            -value
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn resolution(integer_digits: u8, decimal_digits: u8, omission: Omission) -> CoordinateResolution {
        CoordinateResolution {
            integer_digits,
            decimal_digits,
            omission,
        }
    }

    /// Inverse of `decode`: the shortest field that decodes back to `value`.
    fn encode(res: &CoordinateResolution, value: f64) -> String {
        let scaled = (value.abs() * 10f64.powi(res.decimal_digits as i32)).round() as u64;
        let full = format!("{scaled:0width$}", width = res.total_digits());
        let trimmed = match res.omission {
            Omission::Front => full.trim_start_matches('0'),
            Omission::Back => full.trim_end_matches('0'),
        };
        let digits = if trimmed.is_empty() { "0" } else { trimmed };
        if value < 0.0 {
            format!("-{digits}")
        } else {
            digits.to_string()
        }
    }

    #[test]
    fn test_default_resolution() {
        let res = CoordinateResolution::default();
        assert_eq!(res.total_digits(), 6);
        assert_eq!(res.omission, Omission::Front);
    }

    #[test]
    fn test_front_omission() {
        let res = resolution(2, 4, Omission::Front);
        assert_abs_diff_eq!(res.decode("10000"), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(res.decode("123456"), 12.3456, epsilon = 1e-12);
        assert_abs_diff_eq!(res.decode("5"), 0.0005, epsilon = 1e-12);
    }

    #[test]
    fn test_back_omission() {
        let res = resolution(2, 4, Omission::Back);
        assert_abs_diff_eq!(res.decode("1"), 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(res.decode("015"), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_signs() {
        let res = resolution(3, 3, Omission::Front);
        assert_abs_diff_eq!(res.decode("-2500"), -2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(res.decode("+2500"), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_field_is_zero() {
        let res = CoordinateResolution::default();
        assert_eq!(res.decode(""), 0.0);
        assert_eq!(res.decode("-"), 0.0);
    }

    #[test]
    fn test_overlong_field_keeps_extra_fraction() {
        let res = resolution(2, 2, Omission::Front);
        assert_abs_diff_eq!(res.decode("123456"), 12.3456, epsilon = 1e-12);
    }

    #[test]
    fn test_decode_encode_round_trip_sweep() {
        // Deterministic pseudo-random digit strings (LCG), both omission modes.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            state >> 33
        };

        for omission in [Omission::Front, Omission::Back] {
            for (int_digits, dec_digits) in [(2u8, 4u8), (3, 3), (3, 5), (4, 6), (1, 1)] {
                let res = resolution(int_digits, dec_digits, omission);
                for _ in 0..500 {
                    let len = 1 + (next() as usize) % res.total_digits();
                    let mut field: String =
                        (0..len).map(|_| char::from(b'0' + (next() % 10) as u8)).collect();
                    if next() % 2 == 0 {
                        field.insert(0, '-');
                    }
                    let value = res.decode(&field);
                    let reencoded = encode(&res, value);
                    assert_eq!(
                        res.decode(&reencoded),
                        value,
                        "field {field} -> {value} -> {reencoded} under {res:?}"
                    );
                }
            }
        }
    }
}
