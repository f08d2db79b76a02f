//! Header and trailer access over a shared [`HeaderMap`] namespace.
//!
//! Trailers have no container of their own: a trailer named `n` is stored as
//! an ordinary header entry named [`TRAILER_PREFIX`]` + n`. Plain header
//! enumeration must never surface prefixed entries, and trailer enumeration
//! must only surface them, with the prefix stripped. The same rules apply to
//! the request and the response container; callers pass whichever map the
//! operation targets.
//!
//! [`HeaderMap`] iteration order is unspecified, so every enumeration here
//! sorts its result before returning it.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::HostError;

/// Reserved name prefix marking a header entry as a trailer.
///
/// The prefix is part of the adapter contract: a guest must not use it for
/// plain headers. It is a valid header-name fragment so prefixed entries can
/// live in the ordinary container.
pub const TRAILER_PREFIX: &str = "x-trailer-";

/// Distinct plain header names, canonicalized (lowercase), sorted.
///
/// Trailer-prefixed entries are excluded. Returns an empty `Vec` when nothing
/// qualifies; "no headers" is a valid state, not an error.
pub fn header_names(map: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = map
        .keys()
        .filter(|name| !name.as_str().starts_with(TRAILER_PREFIX))
        .map(|name| name.as_str().to_owned())
        .collect();
    names.sort_unstable();
    names
}

/// All values stored under `name`, in storage order.
///
/// The lookup is case-insensitive. An unknown or syntactically invalid name
/// yields an empty `Vec`; lookups never fail.
pub fn header_values(map: &HeaderMap, name: &str) -> Vec<String> {
    match HeaderName::from_bytes(name.as_bytes()) {
        Ok(name) => map.get_all(&name).iter().map(value_to_string).collect(),
        Err(_) => Vec::new(),
    }
}

/// Replaces all values stored under `name` with the single `value`.
pub fn set_header(map: &mut HeaderMap, name: &str, value: &str) -> Result<(), HostError> {
    let (name, value) = parse_entry(name, value)?;
    map.insert(name, value);
    Ok(())
}

/// Appends `value` to the values stored under `name`.
pub fn add_header(map: &mut HeaderMap, name: &str, value: &str) -> Result<(), HostError> {
    let (name, value) = parse_entry(name, value)?;
    map.append(name, value);
    Ok(())
}

/// Deletes all values stored under `name`. Unknown names are a no-op.
pub fn remove_header(map: &mut HeaderMap, name: &str) {
    if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
        map.remove(name);
    }
}

/// Logical trailer names present in `map`, prefix stripped, sorted.
///
/// Returns an empty `Vec` when no prefixed entry exists.
pub fn trailer_names(map: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = map
        .keys()
        .filter_map(|name| name.as_str().strip_prefix(TRAILER_PREFIX))
        .map(str::to_owned)
        .collect();
    names.sort_unstable();
    names
}

/// All values stored under the trailer `name`.
pub fn trailer_values(map: &HeaderMap, name: &str) -> Vec<String> {
    match prefixed(name) {
        Ok(name) => map.get_all(&name).iter().map(value_to_string).collect(),
        Err(_) => Vec::new(),
    }
}

/// Replaces all values stored under the trailer `name` with `value`.
pub fn set_trailer(map: &mut HeaderMap, name: &str, value: &str) -> Result<(), HostError> {
    let name = prefixed(name)?;
    let value = parse_value(value)?;
    map.insert(name, value);
    Ok(())
}

/// Stores `value` under the trailer `name`.
///
/// Unlike [`add_header`], this replaces existing values instead of appending:
/// trailers have no accumulation semantics distinct from set. Preserved as a
/// documented limitation of the adapter contract.
pub fn add_trailer(map: &mut HeaderMap, name: &str, value: &str) -> Result<(), HostError> {
    set_trailer(map, name, value)
}

/// Deletes the trailer `name`. Unknown names are a no-op.
pub fn remove_trailer(map: &mut HeaderMap, name: &str) {
    if let Ok(name) = prefixed(name) {
        map.remove(name);
    }
}

/// Drains every trailer-prefixed entry out of `map` and returns them as a
/// standalone map keyed by the stripped names.
///
/// Used at finalize time to emit trailers after the body. Prefixed entries
/// whose remainder is not a valid header name are dropped from `map` as well;
/// they can only appear through direct map manipulation outside the codec.
pub fn split_trailers(map: &mut HeaderMap) -> HeaderMap {
    let prefixed: Vec<HeaderName> =
        map.keys().filter(|name| name.as_str().starts_with(TRAILER_PREFIX)).cloned().collect();

    let mut trailers = HeaderMap::new();
    for name in prefixed {
        let values: Vec<HeaderValue> = map.get_all(&name).iter().cloned().collect();
        map.remove(&name);

        let stripped = &name.as_str().as_bytes()[TRAILER_PREFIX.len()..];
        if let Ok(stripped) = HeaderName::from_bytes(stripped) {
            for value in values {
                trailers.append(stripped.clone(), value);
            }
        }
    }
    trailers
}

fn prefixed(name: &str) -> Result<HeaderName, HostError> {
    HeaderName::from_bytes(format!("{TRAILER_PREFIX}{name}").as_bytes()).map_err(HostError::invalid_header)
}

fn parse_entry(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HostError> {
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(HostError::invalid_header)?;
    Ok((name, parse_value(value)?))
}

fn parse_value(value: &str) -> Result<HeaderValue, HostError> {
    HeaderValue::from_str(value).map_err(HostError::invalid_header)
}

fn value_to_string(value: &HeaderValue) -> String {
    String::from_utf8_lossy(value.as_bytes()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_is_case_insensitive() {
        let mut map = HeaderMap::new();
        set_header(&mut map, "X-Custom", "one").unwrap();

        assert_eq!(header_values(&map, "x-custom"), vec!["one"]);
        assert_eq!(header_values(&map, "X-CUSTOM"), vec!["one"]);
    }

    #[test]
    fn set_replaces_add_appends() {
        let mut map = HeaderMap::new();
        add_header(&mut map, "accept", "text/html").unwrap();
        add_header(&mut map, "accept", "application/json").unwrap();
        assert_eq!(header_values(&map, "accept"), vec!["text/html", "application/json"]);

        set_header(&mut map, "accept", "*/*").unwrap();
        assert_eq!(header_values(&map, "accept"), vec!["*/*"]);

        remove_header(&mut map, "Accept");
        assert!(header_values(&map, "accept").is_empty());
    }

    #[test]
    fn header_names_are_sorted_and_exclude_trailers() {
        let mut map = HeaderMap::new();
        set_header(&mut map, "b-second", "2").unwrap();
        set_header(&mut map, "a-first", "1").unwrap();
        set_trailer(&mut map, "grpc-status", "0").unwrap();

        assert_eq!(header_names(&map), vec!["a-first", "b-second"]);
    }

    #[test]
    fn trailer_names_exclude_plain_headers() {
        let mut map = HeaderMap::new();
        set_header(&mut map, "content-type", "text/plain").unwrap();
        assert!(trailer_names(&map).is_empty());

        set_trailer(&mut map, "b-sum", "abc").unwrap();
        set_trailer(&mut map, "a-len", "3").unwrap();
        assert_eq!(trailer_names(&map), vec!["a-len", "b-sum"]);
    }

    #[test]
    fn trailer_round_trip() {
        let mut map = HeaderMap::new();
        set_trailer(&mut map, "Grpc-Status", "0").unwrap();

        assert!(trailer_names(&map).contains(&"grpc-status".to_owned()));
        assert_eq!(trailer_values(&map, "grpc-status"), vec!["0"]);

        // The prefixed entry never leaks into plain enumeration.
        assert!(header_names(&map).is_empty());
    }

    #[test]
    fn add_trailer_behaves_as_set() {
        let mut map = HeaderMap::new();
        add_trailer(&mut map, "checksum", "v1").unwrap();
        set_trailer(&mut map, "checksum", "v2").unwrap();
        assert_eq!(trailer_values(&map, "checksum"), vec!["v2"]);

        add_trailer(&mut map, "checksum", "v3").unwrap();
        assert_eq!(trailer_values(&map, "checksum"), vec!["v3"]);
    }

    #[test]
    fn remove_trailer_keeps_plain_headers() {
        let mut map = HeaderMap::new();
        set_header(&mut map, "checksum", "plain").unwrap();
        set_trailer(&mut map, "checksum", "trailing").unwrap();

        remove_trailer(&mut map, "checksum");
        assert!(trailer_values(&map, "checksum").is_empty());
        assert_eq!(header_values(&map, "checksum"), vec!["plain"]);
    }

    #[test]
    fn split_trailers_drains_prefixed_entries() {
        let mut map = HeaderMap::new();
        set_header(&mut map, "content-type", "text/plain").unwrap();
        set_trailer(&mut map, "grpc-status", "0").unwrap();

        let trailers = split_trailers(&mut map);
        assert_eq!(trailers.get("grpc-status").unwrap(), "0");
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("content-type"));
    }

    #[test]
    fn invalid_names_fail_fast_on_write_and_miss_on_read() {
        let mut map = HeaderMap::new();
        let err = set_header(&mut map, "bad name", "v").unwrap_err();
        assert!(err.is_caller_error());

        let err = set_trailer(&mut map, "bad name", "v").unwrap_err();
        assert!(err.is_caller_error());

        assert!(header_values(&map, "bad name").is_empty());
        assert!(trailer_values(&map, "bad name").is_empty());
    }
}
