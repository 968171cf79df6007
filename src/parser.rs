use super::host::{Host, parse_host};
use super::percent::{EncodeSet, push_percent_encoded};
use super::record::{
    UrlRecord, default_port, is_special_scheme, is_windows_drive_letter,
    starts_with_windows_drive_letter,
};
use super::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    SchemeStart,
    Scheme,
    NoScheme,
    SpecialRelativeOrAuthority,
    PathOrAuthority,
    Relative,
    RelativeSlash,
    SpecialAuthoritySlashes,
    SpecialAuthorityIgnoreSlashes,
    Authority,
    Host,
    Hostname,
    Port,
    File,
    FileSlash,
    FileHost,
    PathStart,
    Path,
    CannotBeABaseUrlPath,
    Query,
    Fragment,
}

fn is_c0_control_or_space(ch: char) -> bool {
    ch <= '\u{0020}'
}

fn is_single_dot(buffer: &str) -> bool {
    buffer == "." || buffer.eq_ignore_ascii_case("%2e")
}

fn is_double_dot(buffer: &str) -> bool {
    matches!(
        buffer.to_ascii_lowercase().as_str(),
        ".." | ".%2e" | "%2e." | "%2e%2e"
    )
}

// Runs the state machine over `input`, mutating `record` in place. A fresh
// parse starts in SchemeStart; property setters re-enter through
// `state_override` and terminate once their component is committed.
pub(crate) fn parse_url(
    record: &mut UrlRecord,
    input: &str,
    state_override: Option<State>,
    base: Option<&UrlRecord>,
) -> Result<()> {
    let trimmed = if state_override.is_none() {
        input.trim_matches(is_c0_control_or_space)
    } else {
        input
    };
    let source = trimmed
        .chars()
        .filter(|&ch| !matches!(ch, '\t' | '\n' | '\r'))
        .collect::<String>();
    let chars = source.chars().collect::<Vec<_>>();

    let mut state = state_override.unwrap_or(State::SchemeStart);
    let mut buffer = String::new();
    let mut seen_at = false;
    let mut seen_bracket = false;
    let mut seen_password_token = false;
    let mut i = 0usize;

    while i <= chars.len() {
        let ch = chars.get(i).copied();
        match state {
            State::SchemeStart => {
                if let Some(c) = ch.filter(char::is_ascii_alphabetic) {
                    buffer.push(c.to_ascii_lowercase());
                    state = State::Scheme;
                } else if state_override.is_none() {
                    state = State::NoScheme;
                    continue;
                } else {
                    return Err(Error::InvalidScheme(source));
                }
            }

            State::Scheme => {
                if let Some(c) =
                    ch.filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                {
                    buffer.push(c.to_ascii_lowercase());
                } else if ch == Some(':') {
                    if state_override.is_some() {
                        // A setter may not move a URL across the
                        // special/non-special boundary, into `file` while
                        // credentials or a port exist, or out of a hostless
                        // `file` URL; each is a silent no-op.
                        if record.is_special() != is_special_scheme(&buffer) {
                            return Ok(());
                        }
                        if buffer == "file"
                            && (record.includes_credentials() || record.port.is_some())
                        {
                            return Ok(());
                        }
                        if record.scheme == "file" && record.host_is_empty_or_absent() {
                            return Ok(());
                        }
                    }
                    record.scheme = std::mem::take(&mut buffer);
                    if state_override.is_some() {
                        if record.is_special() && default_port(&record.scheme) == record.port {
                            record.port = None;
                        }
                        return Ok(());
                    }
                    if record.scheme == "file" {
                        state = State::File;
                    } else if record.is_special()
                        && base.is_some_and(|base| base.scheme == record.scheme)
                    {
                        state = State::SpecialRelativeOrAuthority;
                    } else if record.is_special() {
                        state = State::SpecialAuthoritySlashes;
                    } else if chars.get(i + 1) == Some(&'/') {
                        state = State::PathOrAuthority;
                        i += 1;
                    } else {
                        record.cannot_be_a_base = true;
                        record.path.push(String::new());
                        state = State::CannotBeABaseUrlPath;
                    }
                } else if state_override.is_none() {
                    // Not a scheme after all; reparse everything as schemeless.
                    buffer.clear();
                    state = State::NoScheme;
                    i = 0;
                    continue;
                } else {
                    return Err(Error::InvalidScheme(source));
                }
            }

            State::NoScheme => {
                let Some(base) = base else {
                    return Err(Error::InvalidScheme(source));
                };
                if base.cannot_be_a_base {
                    if ch != Some('#') {
                        return Err(Error::InvalidScheme(source));
                    }
                    record.scheme = base.scheme.clone();
                    record.path = base.path.clone();
                    record.query = base.query.clone();
                    record.fragment = Some(String::new());
                    record.cannot_be_a_base = true;
                    state = State::Fragment;
                } else if base.scheme == "file" {
                    state = State::File;
                    continue;
                } else {
                    state = State::Relative;
                    continue;
                }
            }

            State::SpecialRelativeOrAuthority => {
                if ch == Some('/') && chars.get(i + 1) == Some(&'/') {
                    state = State::SpecialAuthorityIgnoreSlashes;
                    i += 1;
                } else {
                    state = State::Relative;
                    continue;
                }
            }

            State::PathOrAuthority => {
                if ch == Some('/') {
                    state = State::Authority;
                } else {
                    state = State::Path;
                    continue;
                }
            }

            State::Relative => {
                let Some(base) = base else {
                    return Err(Error::InvalidScheme(source));
                };
                record.scheme = base.scheme.clone();
                match ch {
                    None => {
                        record.username = base.username.clone();
                        record.password = base.password.clone();
                        record.host = base.host.clone();
                        record.port = base.port;
                        record.path = base.path.clone();
                        record.query = base.query.clone();
                    }
                    Some('/') => state = State::RelativeSlash,
                    Some('\\') if record.is_special() => state = State::RelativeSlash,
                    Some('?') => {
                        record.username = base.username.clone();
                        record.password = base.password.clone();
                        record.host = base.host.clone();
                        record.port = base.port;
                        record.path = base.path.clone();
                        record.query = Some(String::new());
                        state = State::Query;
                    }
                    Some('#') => {
                        record.username = base.username.clone();
                        record.password = base.password.clone();
                        record.host = base.host.clone();
                        record.port = base.port;
                        record.path = base.path.clone();
                        record.query = base.query.clone();
                        record.fragment = Some(String::new());
                        state = State::Fragment;
                    }
                    Some(_) => {
                        record.username = base.username.clone();
                        record.password = base.password.clone();
                        record.host = base.host.clone();
                        record.port = base.port;
                        record.path = base.path.clone();
                        record.path.pop();
                        state = State::Path;
                        continue;
                    }
                }
            }

            State::RelativeSlash => {
                let Some(base) = base else {
                    return Err(Error::InvalidScheme(source));
                };
                if record.is_special() && matches!(ch, Some('/') | Some('\\')) {
                    state = State::SpecialAuthorityIgnoreSlashes;
                } else if ch == Some('/') {
                    state = State::Authority;
                } else {
                    record.username = base.username.clone();
                    record.password = base.password.clone();
                    record.host = base.host.clone();
                    record.port = base.port;
                    state = State::Path;
                    continue;
                }
            }

            State::SpecialAuthoritySlashes => {
                state = State::SpecialAuthorityIgnoreSlashes;
                if ch != Some('/') || chars.get(i + 1) != Some(&'/') {
                    continue;
                }
                i += 1;
            }

            State::SpecialAuthorityIgnoreSlashes => {
                if !matches!(ch, Some('/') | Some('\\')) {
                    state = State::Authority;
                    continue;
                }
            }

            State::Authority => {
                if ch == Some('@') {
                    if seen_at {
                        buffer.insert_str(0, "%40");
                    }
                    seen_at = true;
                    for code_point in buffer.chars() {
                        if code_point == ':' && !seen_password_token {
                            seen_password_token = true;
                            continue;
                        }
                        let target = if seen_password_token {
                            &mut record.password
                        } else {
                            &mut record.username
                        };
                        push_percent_encoded(target, code_point, EncodeSet::Userinfo);
                    }
                    buffer.clear();
                } else if ch.is_none()
                    || matches!(ch, Some('/') | Some('?') | Some('#'))
                    || (ch == Some('\\') && record.is_special())
                {
                    if seen_at && buffer.is_empty() {
                        return Err(Error::InvalidAuthority(source));
                    }
                    // Rewind to the first buffered code point and reparse it
                    // as a host.
                    i -= buffer.chars().count();
                    buffer.clear();
                    state = State::Host;
                    continue;
                } else if let Some(c) = ch {
                    buffer.push(c);
                }
            }

            State::Host | State::Hostname => {
                if state_override.is_some() && record.scheme == "file" {
                    state = State::FileHost;
                    continue;
                }
                if ch == Some(':') && !seen_bracket {
                    if buffer.is_empty() {
                        return Err(Error::InvalidHost(source));
                    }
                    record.host = Some(parse_host(&buffer, record.is_special())?);
                    buffer.clear();
                    state = State::Port;
                    if state_override == Some(State::Hostname) {
                        return Ok(());
                    }
                } else if ch.is_none()
                    || matches!(ch, Some('/') | Some('?') | Some('#'))
                    || (ch == Some('\\') && record.is_special())
                {
                    if record.is_special() && buffer.is_empty() {
                        return Err(Error::InvalidHost(source));
                    }
                    if state_override.is_some()
                        && buffer.is_empty()
                        && (record.includes_credentials() || record.port.is_some())
                    {
                        return Ok(());
                    }
                    record.host = Some(parse_host(&buffer, record.is_special())?);
                    buffer.clear();
                    state = State::PathStart;
                    if state_override.is_some() {
                        return Ok(());
                    }
                    continue;
                } else {
                    if ch == Some('[') {
                        seen_bracket = true;
                    } else if ch == Some(']') {
                        seen_bracket = false;
                    }
                    if let Some(c) = ch {
                        buffer.push(c);
                    }
                }
            }

            State::Port => {
                if let Some(c) = ch.filter(char::is_ascii_digit) {
                    buffer.push(c);
                } else if ch.is_none()
                    || matches!(ch, Some('/') | Some('?') | Some('#'))
                    || (ch == Some('\\') && record.is_special())
                    || state_override.is_some()
                {
                    if !buffer.is_empty() {
                        let digits = buffer.trim_start_matches('0');
                        let port = if digits.is_empty() {
                            0u32
                        } else {
                            digits
                                .parse::<u32>()
                                .ok()
                                .filter(|&port| port <= 0xFFFF)
                                .ok_or_else(|| Error::InvalidPort(buffer.clone()))?
                        };
                        let port = port as u16;
                        record.port = if record.is_special()
                            && default_port(&record.scheme) == Some(port)
                        {
                            None
                        } else {
                            Some(port)
                        };
                        buffer.clear();
                    }
                    if state_override.is_some() {
                        return Ok(());
                    }
                    state = State::PathStart;
                    continue;
                } else {
                    return Err(Error::InvalidPort(source));
                }
            }

            State::File => {
                record.scheme = "file".to_string();
                if matches!(ch, Some('/') | Some('\\')) {
                    state = State::FileSlash;
                } else if let Some(base) = base.filter(|base| base.scheme == "file") {
                    match ch {
                        None => {
                            record.host = base.host.clone();
                            record.path = base.path.clone();
                            record.query = base.query.clone();
                        }
                        Some('?') => {
                            record.host = base.host.clone();
                            record.path = base.path.clone();
                            record.query = Some(String::new());
                            state = State::Query;
                        }
                        Some('#') => {
                            record.host = base.host.clone();
                            record.path = base.path.clone();
                            record.query = base.query.clone();
                            record.fragment = Some(String::new());
                            state = State::Fragment;
                        }
                        Some(_) => {
                            if !starts_with_windows_drive_letter(&chars[i..]) {
                                record.host = base.host.clone();
                                record.path = base.path.clone();
                                record.shorten_path();
                            }
                            state = State::Path;
                            continue;
                        }
                    }
                } else {
                    state = State::Path;
                    continue;
                }
            }

            State::FileSlash => {
                if matches!(ch, Some('/') | Some('\\')) {
                    state = State::FileHost;
                } else {
                    if let Some(base) = base.filter(|base| base.scheme == "file") {
                        if !starts_with_windows_drive_letter(&chars[i..]) {
                            if let Some(first) = base
                                .path
                                .first()
                                .filter(|segment| is_windows_drive_letter(segment.as_str(), true))
                            {
                                record.path.push(first.clone());
                            } else {
                                record.host = base.host.clone();
                            }
                        }
                    }
                    state = State::Path;
                    continue;
                }
            }

            State::FileHost => {
                if ch.is_none() || matches!(ch, Some('/') | Some('\\') | Some('?') | Some('#')) {
                    if state_override.is_none() && is_windows_drive_letter(&buffer, false) {
                        // A drive letter is a path segment, not a host; the
                        // buffer carries over into the path state.
                        state = State::Path;
                    } else if buffer.is_empty() {
                        record.host = Some(Host::Domain(String::new()));
                        if state_override.is_some() {
                            return Ok(());
                        }
                        state = State::PathStart;
                    } else {
                        let host = parse_host(&buffer, record.is_special())?;
                        record.host = Some(
                            if matches!(&host, Host::Domain(name) if name == "localhost") {
                                Host::Domain(String::new())
                            } else {
                                host
                            },
                        );
                        if state_override.is_some() {
                            return Ok(());
                        }
                        buffer.clear();
                        state = State::PathStart;
                    }
                    continue;
                } else if let Some(c) = ch {
                    buffer.push(c);
                }
            }

            State::PathStart => {
                if record.is_special() {
                    state = State::Path;
                    if !matches!(ch, Some('/') | Some('\\')) {
                        continue;
                    }
                } else if state_override.is_none() && ch == Some('?') {
                    record.query = Some(String::new());
                    state = State::Query;
                } else if state_override.is_none() && ch == Some('#') {
                    record.fragment = Some(String::new());
                    state = State::Fragment;
                } else if ch.is_some() {
                    state = State::Path;
                    if ch != Some('/') {
                        continue;
                    }
                }
            }

            State::Path => {
                if ch.is_none()
                    || ch == Some('/')
                    || (ch == Some('\\') && record.is_special())
                    || (state_override.is_none() && matches!(ch, Some('?') | Some('#')))
                {
                    if is_double_dot(&buffer) {
                        record.shorten_path();
                        if ch != Some('/') && !(ch == Some('\\') && record.is_special()) {
                            record.path.push(String::new());
                        }
                    } else if is_single_dot(&buffer) {
                        if ch != Some('/') && !(ch == Some('\\') && record.is_special()) {
                            record.path.push(String::new());
                        }
                    } else {
                        if record.scheme == "file"
                            && record.path.is_empty()
                            && is_windows_drive_letter(&buffer, false)
                        {
                            if !record.host_is_empty_or_absent() {
                                record.host = Some(Host::Domain(String::new()));
                            }
                            buffer.truncate(1);
                            buffer.push(':');
                        }
                        record.path.push(std::mem::take(&mut buffer));
                    }
                    buffer.clear();
                    if record.scheme == "file"
                        && (ch.is_none() || matches!(ch, Some('?') | Some('#')))
                    {
                        while record.path.len() > 1 && record.path[0].is_empty() {
                            record.path.remove(0);
                        }
                    }
                    if ch == Some('?') {
                        record.query = Some(String::new());
                        state = State::Query;
                    } else if ch == Some('#') {
                        record.fragment = Some(String::new());
                        state = State::Fragment;
                    }
                } else if let Some(c) = ch {
                    push_percent_encoded(&mut buffer, c, EncodeSet::Path);
                }
            }

            State::CannotBeABaseUrlPath => {
                if ch == Some('?') {
                    record.query = Some(String::new());
                    state = State::Query;
                } else if ch == Some('#') {
                    record.fragment = Some(String::new());
                    state = State::Fragment;
                } else if let Some(c) = ch {
                    if let Some(opaque) = record.path.first_mut() {
                        push_percent_encoded(opaque, c, EncodeSet::C0Control);
                    }
                }
            }

            State::Query => {
                if state_override.is_none() && ch == Some('#') {
                    record.fragment = Some(String::new());
                    state = State::Fragment;
                } else if let Some(c) = ch {
                    let query = record.query.get_or_insert_with(String::new);
                    if c == '\'' && is_special_scheme(&record.scheme) {
                        query.push_str("%27");
                    } else if c == '#' {
                        query.push_str("%23");
                    } else {
                        push_percent_encoded(query, c, EncodeSet::C0Control);
                    }
                }
            }

            State::Fragment => {
                if let Some(c) = ch {
                    let fragment = record.fragment.get_or_insert_with(String::new);
                    push_percent_encoded(fragment, c, EncodeSet::Fragment);
                }
            }
        }
        i += 1;
    }

    Ok(())
}
