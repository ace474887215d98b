use alloc::collections::BTreeMap;

use super::{HeaderName, HeaderValue};

/// A set of NATS headers
///
/// Unlike the wire protocol's control tokens, header names here are compared
/// byte-exact (case-sensitive). When the same name is inserted or appended more
/// than once, only the most recently written value is observable on read:
/// [`HeaderMap`] keeps a single value per key, not a multimap.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderMap {
    headers: BTreeMap<HeaderName, HeaderValue>,
}

impl HeaderMap {
    /// Create an empty `HeaderMap`
    ///
    /// The map will be created without any capacity. This function will not allocate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headers: BTreeMap::new(),
        }
    }

    /// Insert a header, replacing any previous value stored under `name`
    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Write a header, replacing any previous value stored under `name`
    ///
    /// Kept distinct from [`HeaderMap::insert`] to mirror the wire's distinction
    /// between a single assignment and a repeated one; both observe last-wins.
    pub fn append(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Look up the value stored for `name`, if any
    #[must_use]
    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn remove(&mut self, name: &HeaderName) {
        self.headers.remove(name);
    }

    /// Returns the number of keys stored in the map
    #[must_use]
    pub fn keys_len(&self) -> usize {
        self.headers.len()
    }

    /// Returns the number of headers stored in the map
    ///
    /// Equal to [`HeaderMap::keys_len`]: a key never stores more than one value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if the map contains no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Clear the map, removing all key-value pairs. Keeps the allocated memory for reuse
    pub fn clear(&mut self) {
        self.headers.clear();
    }

    #[cfg(test)]
    fn keys(&self) -> impl Iterator<Item = &'_ HeaderName> {
        self.headers.keys()
    }

    pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = (&'_ HeaderName, &'_ HeaderValue)> {
        self.headers.iter()
    }
}

impl FromIterator<(HeaderName, HeaderValue)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: I) -> Self {
        let mut this = Self::new();
        this.extend(iter);
        this
    }
}

impl Extend<(HeaderName, HeaderValue)> for HeaderMap {
    fn extend<T: IntoIterator<Item = (HeaderName, HeaderValue)>>(&mut self, iter: T) {
        iter.into_iter().for_each(|(name, value)| {
            self.insert(name, value);
        });
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use crate::headers::{HeaderName, HeaderValue};

    use super::HeaderMap;

    #[test]
    fn last_wins() {
        let mut headers = HeaderMap::new();
        headers.append(
            HeaderName::from_static("Nats-Message-Id"),
            HeaderValue::from_static("abcd"),
        );
        headers.append(
            HeaderName::from_static("Nats-Sequence"),
            HeaderValue::from_static("1"),
        );
        headers.append(
            HeaderName::from_static("Nats-Message-Id"),
            HeaderValue::from_static("1234"),
        );
        headers.append(
            HeaderName::from_static("Nats-Time-Stamp"),
            HeaderValue::from_static("0"),
        );
        headers.remove(&HeaderName::from_static("Nats-Time-Stamp"));

        assert_eq!(
            Some(&HeaderValue::from_static("1234")),
            headers.get(&HeaderName::from_static("Nats-Message-Id"))
        );
        verify_header_map(&headers);
    }

    #[test]
    fn collect() {
        let headers = [
            (
                HeaderName::from_static("Nats-Message-Id"),
                HeaderValue::from_static("abcd"),
            ),
            (
                HeaderName::from_static("Nats-Sequence"),
                HeaderValue::from_static("1"),
            ),
            (
                HeaderName::from_static("Nats-Message-Id"),
                HeaderValue::from_static("1234"),
            ),
        ]
        .into_iter()
        .collect::<HeaderMap>();

        verify_header_map(&headers);
    }

    fn verify_header_map(headers: &HeaderMap) {
        assert_eq!(
            [
                HeaderName::from_static("Nats-Message-Id"),
                HeaderName::from_static("Nats-Sequence")
            ]
            .as_slice(),
            headers.keys().cloned().collect::<Vec<_>>().as_slice()
        );

        let raw_headers = headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            [
                (
                    HeaderName::from_static("Nats-Message-Id"),
                    HeaderValue::from_static("1234")
                ),
                (
                    HeaderName::from_static("Nats-Sequence"),
                    HeaderValue::from_static("1")
                ),
            ]
            .as_slice(),
            raw_headers.as_slice(),
        );
    }
}
