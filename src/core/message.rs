use std::fmt;
use std::sync::Arc;

/// An opaque, immutable text payload.
///
/// Cloning is cheap: the text is shared, so the same message can sit in a
/// queue and in a pending journal record at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Message(Arc<str>);

impl Message {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interprets the payload as a `scheme:locator` indirection, if it is one.
    ///
    /// The queue engine never calls this; it is for the request layer that
    /// resolves blobs at read time.
    pub fn reference(&self) -> PayloadRef<'_> {
        PayloadRef::parse(self.as_str())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Message {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(text.into())
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(text.into())
    }
}

impl PartialEq<str> for Message {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Message {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// A payload that points at an external blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadRef<'a> {
    /// `file:<path>`, relative to the configured base directory.
    File(&'a str),
    /// `mysql:<table>/<id>`; the locator is kept unparsed.
    Record(&'a str),
    /// Anything else, including unknown schemes.
    Plain,
}

impl<'a> PayloadRef<'a> {
    pub fn parse(payload: &'a str) -> Self {
        match payload.split_once(':') {
            Some(("file", path)) => PayloadRef::File(path),
            Some(("mysql", locator)) => PayloadRef::Record(locator),
            _ => PayloadRef::Plain,
        }
    }
}
