use super::percent::{EncodeSet, percent_encode};
use super::punycode::domain_to_ascii;
use super::{Error, Result};

/// A parsed URL host. Special schemes carry structured hosts; non-special
/// schemes carry an uninterpreted opaque string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ipv4(u32),
    Ipv6([u16; 8]),
    Domain(String),
    Opaque(String),
}

impl Host {
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Self::Domain(name) => name.is_empty(),
            Self::Opaque(name) => name.is_empty(),
            Self::Ipv4(_) | Self::Ipv6(_) => false,
        }
    }
}

enum Ipv4Outcome {
    Address(u32),
    NotIpv4,
    Invalid,
}

fn is_forbidden_host_code_point(ch: char) -> bool {
    matches!(
        ch,
        '\0' | '\t'
            | '\n'
            | '\r'
            | ' '
            | '#'
            | '/'
            | ':'
            | '<'
            | '>'
            | '?'
            | '@'
            | '['
            | '\\'
            | ']'
            | '^'
            | '|'
    )
}

pub(crate) fn parse_host(input: &str, is_special: bool) -> Result<Host> {
    if let Some(rest) = input.strip_prefix('[') {
        let Some(interior) = rest.strip_suffix(']') else {
            return Err(Error::InvalidHost(input.to_string()));
        };
        let pieces = parse_ipv6(interior).ok_or_else(|| Error::InvalidHost(input.to_string()))?;
        return Ok(Host::Ipv6(pieces));
    }

    if !is_special {
        if input.chars().any(is_forbidden_host_code_point) {
            return Err(Error::InvalidHost(input.to_string()));
        }
        return Ok(Host::Opaque(percent_encode(input, EncodeSet::C0Control)));
    }

    let ascii = domain_to_ascii(input)?;
    if ascii
        .chars()
        .any(|ch| ch == '%' || is_forbidden_host_code_point(ch))
    {
        return Err(Error::InvalidHost(input.to_string()));
    }
    match parse_ipv4(&ascii) {
        Ipv4Outcome::Address(address) => Ok(Host::Ipv4(address)),
        Ipv4Outcome::NotIpv4 => Ok(Host::Domain(ascii)),
        Ipv4Outcome::Invalid => Err(Error::InvalidHost(input.to_string())),
    }
}

// A part that fails numeric syntax makes the whole input a domain; a numeric
// part out of range makes the input an invalid host.
fn parse_ipv4(input: &str) -> Ipv4Outcome {
    let mut parts = input.split('.').collect::<Vec<_>>();
    if parts.last() == Some(&"") {
        parts.pop();
    }
    if parts.is_empty() || parts.len() > 4 {
        return Ipv4Outcome::NotIpv4;
    }

    let mut numbers = Vec::with_capacity(parts.len());
    for part in &parts {
        if part.is_empty() {
            return Ipv4Outcome::NotIpv4;
        }
        let (digits, radix) = if let Some(hex) = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
            (hex, 16)
        } else if part.len() > 1 && part.starts_with('0') {
            (&part[1..], 8)
        } else {
            (*part, 10)
        };
        if digits.is_empty() {
            // "0x" alone denotes zero.
            numbers.push(0u64);
            continue;
        }
        let valid = match radix {
            16 => digits.bytes().all(|b| b.is_ascii_hexdigit()),
            8 => digits.bytes().all(|b| (b'0'..=b'7').contains(&b)),
            _ => digits.bytes().all(|b| b.is_ascii_digit()),
        };
        if !valid {
            return Ipv4Outcome::NotIpv4;
        }
        match u64::from_str_radix(digits, radix) {
            Ok(number) if number <= 0xFFFF_FFFF => numbers.push(number),
            _ => return Ipv4Outcome::Invalid,
        }
    }

    let count = numbers.len();
    for (index, &number) in numbers.iter().enumerate() {
        if index == count - 1 {
            if number >= 256u64.pow(5 - count as u32) {
                return Ipv4Outcome::Invalid;
            }
        } else if number > 255 {
            return Ipv4Outcome::Invalid;
        }
    }

    let mut address = numbers[count - 1];
    for (index, &number) in numbers[..count - 1].iter().enumerate() {
        address += number * 256u64.pow(3 - index as u32);
    }
    Ipv4Outcome::Address(address as u32)
}

// Interior of a bracketed IPv6 literal: at most one `::` compression, optional
// trailing embedded IPv4 dotted-quad.
fn parse_ipv6(input: &str) -> Option<[u16; 8]> {
    let chars = input.chars().collect::<Vec<_>>();
    let mut address = [0u16; 8];
    let mut piece_index = 0usize;
    let mut compress: Option<usize> = None;
    let mut i = 0usize;

    if chars.first() == Some(&':') {
        if chars.get(1) != Some(&':') {
            return None;
        }
        i = 2;
        piece_index = 1;
        compress = Some(piece_index);
    }

    while i < chars.len() {
        if piece_index == 8 {
            return None;
        }
        if chars[i] == ':' {
            if compress.is_some() {
                return None;
            }
            i += 1;
            piece_index += 1;
            compress = Some(piece_index);
            continue;
        }

        let mut value = 0u16;
        let mut length = 0usize;
        while length < 4 {
            let Some(digit) = chars.get(i).and_then(|ch| ch.to_digit(16)) else {
                break;
            };
            value = value * 16 + digit as u16;
            i += 1;
            length += 1;
        }

        match chars.get(i) {
            Some('.') => {
                if length == 0 {
                    return None;
                }
                i -= length;
                if piece_index > 6 {
                    return None;
                }
                let mut numbers_seen = 0usize;
                while i < chars.len() {
                    if numbers_seen > 0 {
                        if chars[i] == '.' && numbers_seen < 4 {
                            i += 1;
                        } else {
                            return None;
                        }
                    }
                    if !chars.get(i).is_some_and(char::is_ascii_digit) {
                        return None;
                    }
                    let mut ipv4_piece: Option<u16> = None;
                    while let Some(digit) = chars.get(i).and_then(|ch| ch.to_digit(10)) {
                        ipv4_piece = match ipv4_piece {
                            None => Some(digit as u16),
                            Some(0) => return None,
                            Some(current) => Some(current * 10 + digit as u16),
                        };
                        if ipv4_piece > Some(255) {
                            return None;
                        }
                        i += 1;
                    }
                    address[piece_index] = address[piece_index] * 256 + ipv4_piece?;
                    numbers_seen += 1;
                    if numbers_seen == 2 || numbers_seen == 4 {
                        piece_index += 1;
                    }
                }
                if numbers_seen != 4 {
                    return None;
                }
                return finish_ipv6(address, piece_index, compress);
            }
            Some(':') => {
                i += 1;
                if i == chars.len() {
                    return None;
                }
            }
            Some(_) => return None,
            None => {}
        }
        address[piece_index] = value;
        piece_index += 1;
    }

    finish_ipv6(address, piece_index, compress)
}

fn finish_ipv6(
    mut address: [u16; 8],
    piece_index: usize,
    compress: Option<usize>,
) -> Option<[u16; 8]> {
    match compress {
        Some(compress) => {
            // Shift the pieces after the compression to the tail.
            let mut swaps = piece_index - compress;
            let mut index = 7usize;
            while index != 0 && swaps > 0 {
                address.swap(compress + swaps - 1, index);
                index -= 1;
                swaps -= 1;
            }
            Some(address)
        }
        None if piece_index == 8 => Some(address),
        None => None,
    }
}

pub(crate) fn serialize_host(host: &Host) -> String {
    match host {
        Host::Ipv4(address) => {
            let mut octets = [0u32; 4];
            let mut value = *address;
            for slot in octets.iter_mut().rev() {
                *slot = value % 256;
                value /= 256;
            }
            octets.map(|octet| octet.to_string()).join(".")
        }
        Host::Ipv6(pieces) => {
            let mut out = String::from("[");
            let compress = longest_zero_run(pieces);
            let mut in_run = false;
            for index in 0..8 {
                if in_run && pieces[index] == 0 {
                    continue;
                }
                in_run = false;
                if compress == Some(index) {
                    out.push_str(if index == 0 { "::" } else { ":" });
                    in_run = true;
                } else {
                    out.push_str(&format!("{:x}", pieces[index]));
                    if index != 7 {
                        out.push(':');
                    }
                }
            }
            out.push(']');
            out
        }
        Host::Domain(name) => name.clone(),
        Host::Opaque(name) => name.clone(),
    }
}

// Start of the first-found longest run of zero pieces, ignoring runs shorter
// than two. The strict comparison keeps the first run on length ties.
fn longest_zero_run(pieces: &[u16; 8]) -> Option<usize> {
    let mut best_start = None;
    let mut best_length = 1usize;
    let mut current_start: Option<usize> = None;
    let mut current_length = 0usize;
    for (index, &piece) in pieces.iter().enumerate() {
        if piece != 0 {
            current_start = None;
            current_length = 0;
            continue;
        }
        if current_start.is_none() {
            current_start = Some(index);
        }
        current_length += 1;
        if current_length > best_length {
            best_start = current_start;
            best_length = current_length;
        }
    }
    best_start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn special(input: &str) -> Result<Host> {
        parse_host(input, true)
    }

    #[test]
    fn domain_hosts_normalize() {
        assert_eq!(special("Example.COM").unwrap(), Host::Domain("example.com".into()));
        assert_eq!(
            special("bücher.example").unwrap(),
            Host::Domain("xn--bcher-kva.example".into())
        );
    }

    #[test]
    fn ipv4_radix_forms_are_equivalent() {
        let canonical = special("1.1.1.1").unwrap();
        assert_eq!(special("0x1.1.1.1").unwrap(), canonical);
        assert_eq!(special("0x1.0x1.0x1.0x1").unwrap(), canonical);
        assert_eq!(special("01.1.1.1").unwrap(), canonical);
    }

    #[test]
    fn ipv4_positional_weighting() {
        assert_eq!(special("1.2.3.4").unwrap(), Host::Ipv4(0x0102_0304));
        assert_eq!(special("127.1").unwrap(), Host::Ipv4(0x7F00_0001));
        assert_eq!(special("0x7F000001").unwrap(), Host::Ipv4(0x7F00_0001));
        assert_eq!(special("1.2.3.4.").unwrap(), Host::Ipv4(0x0102_0304));
    }

    #[test]
    fn ipv4_out_of_range_is_invalid_not_domain() {
        assert!(special("1.2.3.256").is_err());
        assert!(special("256.1.1.1").is_err());
        assert!(special("0x100000000").is_err());
    }

    #[test]
    fn non_numeric_dotted_input_is_a_domain() {
        assert_eq!(special("1.2.3.x").unwrap(), Host::Domain("1.2.3.x".into()));
        assert_eq!(
            special("1.2.3.4.5").unwrap(),
            Host::Domain("1.2.3.4.5".into())
        );
    }

    #[test]
    fn ipv4_serialization_is_dotted_decimal() {
        assert_eq!(serialize_host(&Host::Ipv4(0x0102_0304)), "1.2.3.4");
        assert_eq!(serialize_host(&special("0x7F.0.0.1").unwrap()), "127.0.0.1");
    }

    #[test]
    fn ipv6_basic_forms() {
        assert_eq!(
            special("[1:2:3:4:5:6:7:8]").unwrap(),
            Host::Ipv6([1, 2, 3, 4, 5, 6, 7, 8])
        );
        assert_eq!(
            special("[1::8]").unwrap(),
            Host::Ipv6([1, 0, 0, 0, 0, 0, 0, 8])
        );
        assert_eq!(special("[::]").unwrap(), Host::Ipv6([0; 8]));
        assert_eq!(
            special("[::ffff:1.2.3.4]").unwrap(),
            Host::Ipv6([0, 0, 0, 0, 0, 0xFFFF, 0x0102, 0x0304])
        );
    }

    #[test]
    fn ipv6_rejects_malformed_literals() {
        assert!(special("[1::2::3]").is_err());
        assert!(special("[1:2:3:4:5:6:7]").is_err());
        assert!(special("[1:2:3:4:5:6:7:8:9]").is_err());
        assert!(special("[12345::]").is_err());
        assert!(special("[::1.2.3]").is_err());
        assert!(special("[::1.2.3.256]").is_err());
        assert!(special("[::invalid").is_err());
        assert!(special("[zz::]").is_err());
    }

    #[test]
    fn ipv6_serialization_compresses_first_longest_zero_run() {
        assert_eq!(
            serialize_host(&special("[1:0:0:0:0:0:0:1]").unwrap()),
            "[1::1]"
        );
        assert_eq!(serialize_host(&Host::Ipv6([0; 8])), "[::]");
        // Two equal-length runs: the first one compresses.
        assert_eq!(
            serialize_host(&Host::Ipv6([1, 0, 0, 2, 3, 0, 0, 4])),
            "[1::2:3:0:0:4]"
        );
        // A single zero piece never compresses.
        assert_eq!(
            serialize_host(&Host::Ipv6([1, 0, 2, 3, 4, 5, 6, 7])),
            "[1:0:2:3:4:5:6:7]"
        );
        assert_eq!(
            serialize_host(&Host::Ipv6([0, 0, 0, 0, 0, 0xFFFF, 0x0102, 0x0304])),
            "[::ffff:102:304]"
        );
    }

    #[test]
    fn opaque_hosts_reject_forbidden_code_points() {
        assert!(parse_host("bar baz", false).is_err());
        assert!(parse_host("bar<baz", false).is_err());
        assert_eq!(
            parse_host("bar%20baz", false).unwrap(),
            Host::Opaque("bar%20baz".into())
        );
        assert_eq!(
            parse_host("héllo", false).unwrap(),
            Host::Opaque("h%C3%A9llo".into())
        );
    }

    #[test]
    fn special_hosts_reject_percent() {
        assert!(special("ex%41mple.com").is_err());
    }
}
