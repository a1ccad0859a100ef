//! Fixed-capacity names for profilers and tracks
//!
//! Names live inline in the profiler structures so naming a track never
//! touches the heap. Input longer than the buffer is cut at the last UTF-8
//! character boundary that fits and a warning is emitted.

use serde::{Serialize, Serializer};
use std::fmt;

/// Inline UTF-8 name of at most `N` bytes
#[derive(Clone, Copy)]
pub struct FixedName<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> FixedName<N> {
    /// An empty name
    pub const fn empty() -> Self {
        FixedName {
            bytes: [0; N],
            len: 0,
        }
    }

    /// Build a name, truncating if needed
    pub fn new(name: &str) -> Self {
        let mut fixed = Self::empty();
        fixed.set(name);
        fixed
    }

    /// Byte capacity
    pub const fn capacity() -> usize {
        N
    }

    /// Replace the name. Returns `true` when the input was truncated.
    pub fn set(&mut self, name: &str) -> bool {
        self.len = 0;
        let truncated = self.push_truncating(name);
        if truncated {
            tracing::warn!(
                original = name,
                stored = self.as_str(),
                capacity = N,
                "name truncated to fit fixed buffer"
            );
        }
        truncated
    }

    /// Replace the name with formatted output, e.g.
    /// `name.set_fmt(format_args!("worker-{}", id))`.
    /// Returns `true` when the output was truncated.
    pub fn set_fmt(&mut self, args: fmt::Arguments<'_>) -> bool {
        self.len = 0;
        let mut writer = TruncatingWriter {
            name: self,
            truncated: false,
        };
        // TruncatingWriter never fails; an Err can only come from a Display impl
        if fmt::Write::write_fmt(&mut writer, args).is_err() {
            tracing::warn!("formatting error while setting name");
        }
        let truncated = writer.truncated;
        if truncated {
            tracing::warn!(
                stored = self.as_str(),
                capacity = N,
                "formatted name truncated to fit fixed buffer"
            );
        }
        truncated
    }

    /// Forget the name
    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_str(&self) -> &str {
        // Only whole characters are ever copied in, so this cannot fail
        self.bytes
            .get(..self.len)
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append as much of `s` as fits. Returns `true` if something was cut.
    fn push_truncating(&mut self, s: &str) -> bool {
        let room = N - self.len;
        let mut end = s.len().min(room);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        if let (Some(dst), Some(src)) = (
            self.bytes.get_mut(self.len..self.len + end),
            s.as_bytes().get(..end),
        ) {
            dst.copy_from_slice(src);
            self.len += end;
        }
        end < s.len()
    }
}

struct TruncatingWriter<'a, const N: usize> {
    name: &'a mut FixedName<N>,
    truncated: bool,
}

impl<const N: usize> fmt::Write for TruncatingWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        self.truncated = self.name.push_truncating(s);
        Ok(())
    }
}

impl<const N: usize> Default for FixedName<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> fmt::Display for FixedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> fmt::Debug for FixedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> PartialEq for FixedName<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<const N: usize> Eq for FixedName<N> {}

impl<const N: usize> std::hash::Hash for FixedName<N> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl<const N: usize> PartialEq<str> for FixedName<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<const N: usize> PartialEq<&str> for FixedName<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl<const N: usize> Serialize for FixedName<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
