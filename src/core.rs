use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::future::Future;
use std::pin::Pin;

use serde::{Serialize, Serializer};
use url::form_urlencoded;

/// Future produced by loaders, actions and lazy modules. Everything runs on a
/// single thread, so none of these need to be `Send`.
pub(crate) type LocalFuture<T> = Pin<Box<dyn Future<Output = T> + 'static>>;

/// Named pattern variables captured while matching a path, keyed by name.
pub type Params = BTreeMap<String, String>;

/// A 32-byte BLAKE3 hash used for fingerprinting.
///
/// In `keiro`, this serves two purposes:
/// 1. It identifies the arguments of the last accepted [`Task`](crate::Task)
///    run, so a repeated call with equal arguments is answered from cache.
/// 2. It is the content hash of a [`RouteNode`](crate::RouteNode), which the
///    rendering layer compares to detect meaningful tree changes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    /// Hashes the canonical JSON form of `value`. Object keys are emitted in
    /// sorted order, so two maps with the same entries hash the same no
    /// matter how they were built.
    pub fn hash_json<T>(value: &T) -> serde_json::Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        Ok(Self::hash(serde_json::to_vec(&value)?))
    }

    pub fn to_hex(self) -> String {
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            // writing into a String cannot fail
            let _ = write!(&mut acc, "{byte:02x}");
        }

        acc
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Decoded query string of the current location.
///
/// Pairs keep their insertion order, but equality, serialization and
/// [`to_query`](Self::to_query) use the canonical form: pairs stably sorted
/// by key, so `?b=2&a=1` and `?a=1&b=2` are the same search.
#[derive(Clone, Debug, Default)]
pub struct SearchParams {
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a query string, with or without the leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);

        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// Returns the first value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn sorted(&self) -> Vec<&(String, String)> {
        let mut sorted: Vec<_> = self.pairs.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted
    }

    /// Canonical, url-encoded query string without the leading `?`.
    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.sorted() {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

impl PartialEq for SearchParams {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl Eq for SearchParams {}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

impl Serialize for SearchParams {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_query())
    }
}

impl<K, V> FromIterator<(K, V)> for SearchParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
