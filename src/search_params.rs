use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use super::percent::{from_hex_digit, to_hex_upper};
use super::record::UrlRecord;

/// Append-ordered multi-map of query name/value pairs. Handles obtained from
/// [`crate::Url::search_params`] re-serialize into the owning URL's query
/// string on every mutation.
pub struct UrlSearchParams {
    inner: Rc<RefCell<ParamsInner>>,
}

struct ParamsInner {
    pairs: Vec<(String, String)>,
    // Non-owning link back to the bound URL record, present only for handles
    // obtained through Url::search_params.
    url: Option<Weak<RefCell<UrlRecord>>>,
}

impl UrlSearchParams {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ParamsInner {
                pairs: Vec::new(),
                url: None,
            })),
        }
    }

    /// Parses an `application/x-www-form-urlencoded` string; one leading `?`
    /// is ignored.
    pub fn from_query(query: &str) -> Self {
        let params = Self::new();
        params.inner.borrow_mut().pairs = parse_pairs(query);
        params
    }

    pub fn append(&mut self, name: &str, value: &str) {
        self.inner
            .borrow_mut()
            .pairs
            .push((name.to_string(), value.to_string()));
        self.update_url();
    }

    /// Replaces the first entry named `name` in place, drops any later ones,
    /// or appends when none exists.
    pub fn set(&mut self, name: &str, value: &str) {
        {
            let mut inner = self.inner.borrow_mut();
            let mut found = false;
            inner.pairs.retain_mut(|pair| {
                if pair.0 != name {
                    return true;
                }
                if found {
                    return false;
                }
                found = true;
                pair.1 = value.to_string();
                true
            });
            if !found {
                inner.pairs.push((name.to_string(), value.to_string()));
            }
        }
        self.update_url();
    }

    pub fn delete(&mut self, name: &str, value: Option<&str>) {
        self.inner
            .borrow_mut()
            .pairs
            .retain(|(k, v)| k != name || value.is_some_and(|value| v != value));
        self.update_url();
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.inner
            .borrow()
            .pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    pub fn get_all(&self, name: &str) -> Vec<String> {
        self.inner
            .borrow()
            .pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn has(&self, name: &str, value: Option<&str>) -> bool {
        self.inner
            .borrow()
            .pairs
            .iter()
            .any(|(k, v)| k == name && value.is_none_or(|value| v == value))
    }

    /// Stable sort by name in UTF-16 code-unit order, not code-point order.
    pub fn sort(&mut self) {
        self.inner
            .borrow_mut()
            .pairs
            .sort_by(|a, b| a.0.encode_utf16().cmp(b.0.encode_utf16()));
        self.update_url();
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().pairs.is_empty()
    }

    pub fn iter(&self) -> Iter {
        Iter {
            inner: Rc::clone(&self.inner),
            index: 0,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = String> {
        self.iter().map(|(name, _)| name)
    }

    pub fn values(&self) -> impl Iterator<Item = String> {
        self.iter().map(|(_, value)| value)
    }

    pub fn to_query(&self) -> String {
        serialize_pairs(&self.inner.borrow().pairs)
    }

    pub(crate) fn share(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }

    pub(crate) fn bind_url(&self, url: Weak<RefCell<UrlRecord>>) {
        self.inner.borrow_mut().url = Some(url);
    }

    pub(crate) fn update_from_query(&self, query: &str) {
        self.inner.borrow_mut().pairs = parse_pairs(query);
    }

    fn update_url(&self) {
        let inner = self.inner.borrow();
        let Some(weak) = &inner.url else {
            return;
        };
        let Some(record) = weak.upgrade() else {
            return;
        };
        let serialized = serialize_pairs(&inner.pairs);
        record.borrow_mut().query = if serialized.is_empty() {
            None
        } else {
            Some(serialized)
        };
    }
}

impl Default for UrlSearchParams {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for UrlSearchParams {
    // Deep copy of the entries, not bound to any URL.
    fn clone(&self) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ParamsInner {
                pairs: self.inner.borrow().pairs.clone(),
                url: None,
            })),
        }
    }
}

impl FromStr for UrlSearchParams {
    type Err = std::convert::Infallible;

    fn from_str(query: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_query(query))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for UrlSearchParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(pairs: I) -> Self {
        let params = Self::new();
        params.inner.borrow_mut().pairs = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        params
    }
}

impl fmt::Display for UrlSearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

impl fmt::Debug for UrlSearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.borrow().pairs.iter()).finish()
    }
}

impl IntoIterator for &UrlSearchParams {
    type Item = (String, String);
    type IntoIter = Iter;

    fn into_iter(self) -> Iter {
        self.iter()
    }
}

/// Entry iterator. Indexes into the live list on every step, so mutations
/// during iteration are visible.
pub struct Iter {
    inner: Rc<RefCell<ParamsInner>>,
    index: usize,
}

impl Iterator for Iter {
    type Item = (String, String);

    fn next(&mut self) -> Option<Self::Item> {
        let inner = self.inner.borrow();
        let pair = inner.pairs.get(self.index).cloned();
        if pair.is_some() {
            self.index += 1;
        }
        pair
    }
}

fn serialize_pairs(pairs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (name, value) in pairs {
        if !out.is_empty() {
            out.push('&');
        }
        push_form_encoded(&mut out, name);
        out.push('=');
        push_form_encoded(&mut out, value);
    }
    out
}

fn push_form_encoded(out: &mut String, src: &str) {
    for &byte in src.as_bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'*' | b'-' | b'.' | b'_') {
            out.push(byte as char);
        } else if byte == b' ' {
            out.push('+');
        } else {
            out.push('%');
            out.push(to_hex_upper(byte >> 4));
            out.push(to_hex_upper(byte & 0x0F));
        }
    }
}

// `+` becomes space, valid `%XX` triplets become bytes, stray `%` passes
// through, malformed UTF-8 decodes to U+FFFD per sequence.
fn decode_form_component(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (from_hex_digit(bytes[i + 1]), from_hex_digit(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_pairs(query: &str) -> Vec<(String, String)> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut pairs = Vec::new();
    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (raw_name, raw_value) = part.split_once('=').unwrap_or((part, ""));
        pairs.push((
            decode_form_component(raw_name),
            decode_form_component(raw_value),
        ));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_preserved() {
        let params = UrlSearchParams::from_query("b=2&a=1&a=3");
        assert_eq!(params.to_string(), "b=2&a=1&a=3");
        assert_eq!(params.get("a").as_deref(), Some("1"));
        assert_eq!(params.get_all("a"), vec!["1".to_string(), "3".to_string()]);
    }

    #[test]
    fn sort_is_stable_on_equal_keys() {
        let mut params = UrlSearchParams::from_query("b=2&a=1&a=3");
        params.sort();
        assert_eq!(params.to_string(), "a=1&a=3&b=2");
    }

    #[test]
    fn sort_uses_utf16_code_unit_order() {
        // U+1D306 (surrogate pair, leading unit 0xD834) sorts after U+FB00 in
        // code-point order but before it in UTF-16 code-unit order.
        let mut params = UrlSearchParams::from_query("%EF%AC%80=b&%F0%9D%8C%86=a");
        params.sort();
        assert_eq!(params.to_string(), "%F0%9D%8C%86=a&%EF%AC%80=b");
    }

    #[test]
    fn set_replaces_first_and_drops_rest() {
        let mut params = UrlSearchParams::from_query("a=1&b=2&a=3");
        params.set("a", "9");
        assert_eq!(params.to_string(), "a=9&b=2");
        params.set("c", "4");
        assert_eq!(params.to_string(), "a=9&b=2&c=4");
    }

    #[test]
    fn append_never_deduplicates() {
        let mut params = UrlSearchParams::new();
        params.append("a", "1");
        params.append("a", "1");
        assert_eq!(params.to_string(), "a=1&a=1");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn delete_with_and_without_value() {
        let mut params = UrlSearchParams::from_query("a=1&a=2&b=3");
        params.delete("a", Some("2"));
        assert_eq!(params.to_string(), "a=1&b=3");
        params.delete("a", None);
        assert_eq!(params.to_string(), "b=3");
    }

    #[test]
    fn has_with_value_overload() {
        let params = UrlSearchParams::from_query("a=1&a=2");
        assert!(params.has("a", None));
        assert!(params.has("a", Some("2")));
        assert!(!params.has("a", Some("3")));
        assert!(!params.has("b", None));
    }

    #[test]
    fn leading_question_mark_is_tolerated() {
        assert_eq!(UrlSearchParams::from_query("?a=1").to_string(), "a=1");
        // Only one.
        assert_eq!(
            UrlSearchParams::from_query("??a=1").get_all("?a"),
            vec!["1".to_string()]
        );
    }

    #[test]
    fn empty_parts_are_skipped() {
        let params = UrlSearchParams::from_query("a=1&&b=2&");
        assert_eq!(params.to_string(), "a=1&b=2");
        assert!(UrlSearchParams::from_query("").is_empty());
    }

    #[test]
    fn missing_equals_means_empty_value() {
        let params = UrlSearchParams::from_query("flag&x=1");
        assert_eq!(params.get("flag").as_deref(), Some(""));
        assert_eq!(params.to_string(), "flag=&x=1");
    }

    #[test]
    fn plus_round_trips_as_space() {
        let params = UrlSearchParams::from_query("q=a+b");
        assert_eq!(params.get("q").as_deref(), Some("a b"));
        assert_eq!(params.to_string(), "q=a+b");
    }

    #[test]
    fn reserved_characters_use_fixed_escapes() {
        let mut params = UrlSearchParams::new();
        params.append("k", "!'()~ *");
        assert_eq!(params.to_string(), "k=%21%27%28%29%7E+*");
    }

    #[test]
    fn decoding_is_lenient() {
        let params = UrlSearchParams::from_query("a=100%&b=%zz&c=%4");
        assert_eq!(params.get("a").as_deref(), Some("100%"));
        assert_eq!(params.get("b").as_deref(), Some("%zz"));
        assert_eq!(params.get("c").as_deref(), Some("%4"));
    }

    #[test]
    fn malformed_utf8_decodes_to_replacement() {
        let params = UrlSearchParams::from_query("a=%E6%97");
        assert_eq!(params.get("a").as_deref(), Some("\u{FFFD}"));
    }

    #[test]
    fn unicode_round_trips() {
        let mut params = UrlSearchParams::new();
        params.append("名", "日本語 text");
        let serialized = params.to_string();
        assert_eq!(serialized, "%E5%90%8D=%E6%97%A5%E6%9C%AC%E8%AA%9E+text");
        let reparsed = UrlSearchParams::from_query(&serialized);
        assert_eq!(reparsed.get("名").as_deref(), Some("日本語 text"));
    }

    #[test]
    fn from_iterator_and_clone_detach() {
        let params = [("a", "1"), ("b", "2")]
            .into_iter()
            .collect::<UrlSearchParams>();
        assert_eq!(params.to_string(), "a=1&b=2");

        let mut copy = params.clone();
        copy.append("c", "3");
        assert_eq!(params.len(), 2);
        assert_eq!(copy.len(), 3);
    }

    #[test]
    fn iteration_yields_entries_in_order() {
        let params = UrlSearchParams::from_query("a=1&b=2");
        let entries = params.iter().collect::<Vec<_>>();
        assert_eq!(
            entries,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.values().collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn unbound_params_never_touch_a_url() {
        let mut params = UrlSearchParams::from_query("a=1");
        params.append("b", "2");
        params.sort();
        assert_eq!(params.to_string(), "a=1&b=2");
    }
}
