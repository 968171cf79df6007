use unicode_normalization::UnicodeNormalization;

use super::{Error, Result};

// RFC 3492 parameters.
const BASE: u32 = 36;
const T_MIN: u32 = 1;
const T_MAX: u32 = 26;
const SKEW: u32 = 38;
const DAMP: u32 = 700;
const INITIAL_BIAS: u32 = 72;
const INITIAL_N: u32 = 0x80;
const MAX_INT: u32 = 0x7FFF_FFFF;

/// Lowercase, NFC-normalize, map ideographic dot separators to U+002E, then
/// Punycode-encode each non-ASCII label with the `xn--` prefix.
pub(crate) fn domain_to_ascii(domain: &str) -> Result<String> {
    let mapped = domain
        .to_lowercase()
        .nfc()
        .map(|ch| match ch {
            '\u{3002}' | '\u{FF0E}' | '\u{FF61}' => '.',
            other => other,
        })
        .collect::<String>();

    let mut labels = Vec::new();
    for label in mapped.split('.') {
        if label.is_ascii() {
            labels.push(label.to_string());
        } else {
            let encoded =
                encode_label(label).ok_or_else(|| Error::InvalidHost(domain.to_string()))?;
            labels.push(format!("xn--{encoded}"));
        }
    }
    Ok(labels.join("."))
}

fn adapt(mut delta: u32, num_points: u32, first_time: bool) -> u32 {
    delta /= if first_time { DAMP } else { 2 };
    delta += delta / num_points;
    let mut k = 0;
    while delta > ((BASE - T_MIN) * T_MAX) / 2 {
        delta /= BASE - T_MIN;
        k += BASE;
    }
    k + (((BASE - T_MIN + 1) * delta) / (delta + SKEW))
}

fn value_to_digit(value: u32) -> char {
    match value {
        0..=25 => (value as u8 + b'a') as char,
        26..=35 => (value as u8 - 26 + b'0') as char,
        _ => unreachable!(),
    }
}

// None when a delta would exceed the RFC 3492 overflow bound.
fn encode_label(label: &str) -> Option<String> {
    let code_points = label.chars().collect::<Vec<_>>();
    let mut output = String::with_capacity(label.len());

    let mut basic_length = 0u32;
    for &ch in &code_points {
        if ch.is_ascii() {
            output.push(ch);
            basic_length += 1;
        }
    }
    if basic_length > 0 {
        output.push('-');
    }

    let input_length = code_points.len() as u32;
    let mut n = INITIAL_N;
    let mut delta = 0u32;
    let mut bias = INITIAL_BIAS;
    let mut handled = basic_length;

    while handled < input_length {
        let m = code_points
            .iter()
            .map(|&ch| ch as u32)
            .filter(|&code| code >= n)
            .min()?;
        if m - n > (MAX_INT - delta) / (handled + 1) {
            return None;
        }
        delta += (m - n) * (handled + 1);
        n = m;

        for &ch in &code_points {
            let code = ch as u32;
            if code < n {
                delta += 1;
                if delta > MAX_INT {
                    return None;
                }
            }
            if code == n {
                let mut q = delta;
                let mut k = BASE;
                loop {
                    let t = if k <= bias {
                        T_MIN
                    } else if k >= bias + T_MAX {
                        T_MAX
                    } else {
                        k - bias
                    };
                    if q < t {
                        break;
                    }
                    output.push(value_to_digit(t + (q - t) % (BASE - t)));
                    q = (q - t) / (BASE - t);
                    k += BASE;
                }
                output.push(value_to_digit(q));
                bias = adapt(delta, handled + 1, handled == basic_length);
                delta = 0;
                handled += 1;
            }
        }
        delta += 1;
        n += 1;
    }

    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_domains_pass_through_case_folded() {
        assert_eq!(domain_to_ascii("Example.COM").unwrap(), "example.com");
        assert_eq!(domain_to_ascii("a..b").unwrap(), "a..b");
    }

    #[test]
    fn non_ascii_labels_get_ace_prefix() {
        assert_eq!(domain_to_ascii("bücher.example").unwrap(), "xn--bcher-kva.example");
        assert_eq!(domain_to_ascii("München").unwrap(), "xn--mnchen-3ya");
        assert_eq!(domain_to_ascii("mañana.com").unwrap(), "xn--maana-pta.com");
    }

    #[test]
    fn ideographic_dots_separate_labels() {
        assert_eq!(domain_to_ascii("a\u{3002}b\u{FF0E}c\u{FF61}d").unwrap(), "a.b.c.d");
    }

    #[test]
    fn nfc_applies_before_encoding() {
        // U+0065 U+0301 composes to U+00E9.
        assert_eq!(domain_to_ascii("cafe\u{301}.fr").unwrap(), "xn--caf-dma.fr");
    }

    #[test]
    fn astral_code_points_encode() {
        assert_eq!(domain_to_ascii("💩.la").unwrap(), "xn--ls8h.la");
    }

    #[test]
    fn encode_label_matches_known_ace_forms() {
        assert_eq!(encode_label("bücher").as_deref(), Some("bcher-kva"));
        assert_eq!(encode_label("mañana").as_deref(), Some("maana-pta"));
    }
}
