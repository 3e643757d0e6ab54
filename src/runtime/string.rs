//! JavaScript string representations
//!
//! Strings are sequences of UTF-16 code units stored in one of three layouts:
//! - flat: a contiguous buffer, Latin-1 compressed when every unit fits a byte
//! - sliced: a window into a flat parent
//! - tree: a lazy concatenation (rope) that must be flattened before indexed access
//!
//! Indexed reads on flat and sliced strings are O(1). Tree strings walk their
//! children, which is the slow path the inliner refuses to specialize.

use std::fmt;
use std::rc::Rc;

/// Slices shorter than this are copied into a fresh flat string
pub const MIN_SLICED_LENGTH: usize = 13;
/// Concatenations shorter than this are flattened eagerly
pub const MIN_TREE_LENGTH: usize = 13;

/// Storage of a flat string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatUnits {
    /// Every code unit is <= 0xFF
    Compressed(Vec<u8>),
    Utf16(Vec<u16>),
}

/// A contiguous string buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatString {
    units: FlatUnits,
}

impl FlatString {
    pub fn from_units(units: Vec<u16>) -> Self {
        if units.iter().all(|&u| u <= 0xFF) {
            FlatString {
                units: FlatUnits::Compressed(units.into_iter().map(|u| u as u8).collect()),
            }
        } else {
            FlatString {
                units: FlatUnits::Utf16(units),
            }
        }
    }

    pub fn len(&self) -> usize {
        match &self.units {
            FlatUnits::Compressed(bytes) => bytes.len(),
            FlatUnits::Utf16(units) => units.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.units, FlatUnits::Compressed(_))
    }

    #[inline]
    pub fn code_unit(&self, index: usize) -> Option<u16> {
        match &self.units {
            FlatUnits::Compressed(bytes) => bytes.get(index).map(|&b| b as u16),
            FlatUnits::Utf16(units) => units.get(index).copied(),
        }
    }

    fn push_units(&self, start: usize, len: usize, out: &mut Vec<u16>) {
        match &self.units {
            FlatUnits::Compressed(bytes) => {
                out.extend(bytes[start..start + len].iter().map(|&b| b as u16))
            }
            FlatUnits::Utf16(units) => out.extend_from_slice(&units[start..start + len]),
        }
    }
}

/// Concatenation node of a tree string
#[derive(Debug)]
pub struct TreeString {
    left: JsString,
    right: JsString,
    len: usize,
}

/// Layout of a string, as seen by profiling and guards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringRepr {
    Flat,
    Sliced,
    Tree,
}

/// An immutable JavaScript string value
#[derive(Clone)]
pub enum JsString {
    Flat(Rc<FlatString>),
    Sliced {
        parent: Rc<FlatString>,
        start: usize,
        len: usize,
    },
    Tree(Rc<TreeString>),
}

impl JsString {
    pub fn new(s: &str) -> Self {
        Self::from_code_units(s.encode_utf16().collect())
    }

    pub fn from_code_units(units: Vec<u16>) -> Self {
        JsString::Flat(Rc::new(FlatString::from_units(units)))
    }

    pub fn empty() -> Self {
        Self::from_code_units(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            JsString::Flat(flat) => flat.len(),
            JsString::Sliced { len, .. } => *len,
            JsString::Tree(tree) => tree.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn repr(&self) -> StringRepr {
        match self {
            JsString::Flat(_) => StringRepr::Flat,
            JsString::Sliced { .. } => StringRepr::Sliced,
            JsString::Tree(_) => StringRepr::Tree,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, JsString::Tree(_))
    }

    /// Whether the backing buffer is Latin-1 compressed (trees report false)
    pub fn is_compressed(&self) -> bool {
        match self {
            JsString::Flat(flat) => flat.is_compressed(),
            JsString::Sliced { parent, .. } => parent.is_compressed(),
            JsString::Tree(_) => false,
        }
    }

    /// Direct code unit read; `None` for tree strings and out-of-range indices
    #[inline]
    pub fn direct_code_unit(&self, index: usize) -> Option<u16> {
        match self {
            JsString::Flat(flat) => flat.code_unit(index),
            JsString::Sliced { parent, start, len } => {
                if index < *len {
                    parent.code_unit(start + index)
                } else {
                    None
                }
            }
            JsString::Tree(_) => None,
        }
    }

    /// Code unit at `index` for any representation
    pub fn code_unit_at(&self, index: usize) -> Option<u16> {
        match self {
            JsString::Tree(tree) => {
                if index >= tree.len {
                    None
                } else if index < tree.left.len() {
                    tree.left.code_unit_at(index)
                } else {
                    tree.right.code_unit_at(index - tree.left.len())
                }
            }
            _ => self.direct_code_unit(index),
        }
    }

    pub fn to_code_units(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity(self.len());
        self.collect_units(&mut out);
        out
    }

    fn collect_units(&self, out: &mut Vec<u16>) {
        match self {
            JsString::Flat(flat) => flat.push_units(0, flat.len(), out),
            JsString::Sliced { parent, start, len } => parent.push_units(*start, *len, out),
            JsString::Tree(tree) => {
                tree.left.collect_units(out);
                tree.right.collect_units(out);
            }
        }
    }

    /// A flat copy of this string (cheap for flat strings)
    pub fn flatten(&self) -> JsString {
        match self {
            JsString::Flat(_) => self.clone(),
            _ => Self::from_code_units(self.to_code_units()),
        }
    }

    /// Substring `[start, end)`, clamped to the string length
    pub fn slice(&self, start: usize, end: usize) -> JsString {
        let end = end.min(self.len());
        let start = start.min(end);
        let len = end - start;
        match self {
            JsString::Flat(parent) if len >= MIN_SLICED_LENGTH => JsString::Sliced {
                parent: parent.clone(),
                start,
                len,
            },
            JsString::Sliced {
                parent,
                start: base,
                ..
            } if len >= MIN_SLICED_LENGTH => JsString::Sliced {
                parent: parent.clone(),
                start: base + start,
                len,
            },
            _ => {
                let units = self.to_code_units();
                Self::from_code_units(units[start..end].to_vec())
            }
        }
    }

    /// Concatenation; long results become tree strings
    pub fn concat(&self, other: &JsString) -> JsString {
        let len = self.len() + other.len();
        if len >= MIN_TREE_LENGTH && !self.is_empty() && !other.is_empty() {
            JsString::Tree(Rc::new(TreeString {
                left: self.clone(),
                right: other.clone(),
                len,
            }))
        } else {
            let mut units = self.to_code_units();
            other.collect_units(&mut units);
            Self::from_code_units(units)
        }
    }

    pub fn to_rust_string(&self) -> String {
        String::from_utf16_lossy(&self.to_code_units())
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.to_code_units() == other.to_code_units()
    }
}

impl Eq for JsString {}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rust_string())
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})", self.repr(), self.to_rust_string())
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        JsString::new(s)
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        JsString::new(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_compression() {
        assert!(JsString::new("abc").is_compressed());
        assert!(!JsString::new("a\u{3b1}").is_compressed());
        assert_eq!(JsString::new("a\u{3b1}").code_unit_at(1), Some(0x3b1));
    }

    #[test]
    fn test_short_slice_is_flat() {
        let s = JsString::new("hello world");
        let sub = s.slice(0, 5);
        assert_eq!(sub.repr(), StringRepr::Flat);
        assert_eq!(sub.to_rust_string(), "hello");
    }

    #[test]
    fn test_long_slice_shares_parent() {
        let s = JsString::new("abcdefghijklmnopqrstuvwxyz");
        let sub = s.slice(2, 20);
        assert_eq!(sub.repr(), StringRepr::Sliced);
        assert_eq!(sub.len(), 18);
        assert_eq!(sub.direct_code_unit(0), Some('c' as u16));
        assert_eq!(sub.direct_code_unit(18), None);
        let nested = sub.slice(1, 16);
        assert_eq!(nested.repr(), StringRepr::Sliced);
        assert_eq!(nested.code_unit_at(0), Some('d' as u16));
    }

    #[test]
    fn test_concat_builds_tree() {
        let left = JsString::new("abcdefgh");
        let right = JsString::new("ijklmnop");
        let tree = left.concat(&right);
        assert_eq!(tree.repr(), StringRepr::Tree);
        assert_eq!(tree.direct_code_unit(0), None);
        assert_eq!(tree.code_unit_at(9), Some('j' as u16));
        assert_eq!(tree.flatten().repr(), StringRepr::Flat);
        assert_eq!(tree, JsString::new("abcdefghijklmnop"));
    }

    #[test]
    fn test_short_concat_is_flat() {
        let s = JsString::new("ab").concat(&JsString::new("cd"));
        assert_eq!(s.repr(), StringRepr::Flat);
        assert_eq!(s.to_rust_string(), "abcd");
    }
}
