//! Paths into the state tree.
//!
//! A [`Path`] is a structural reference, never a pointer: it is re-resolved
//! against the live store on every read (§3.1, §4.2).

use std::fmt;

/// One step of a [`Path`]: either a keyed field or an index into a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A string key, e.g. a record id or a field name.
    Key(String),
    /// A non-negative integer index.
    Index(i64),
}

impl Segment {
    /// Parse `s` as an integer segment when it is all-ASCII-digits with no
    /// leading zero (other than the literal `"0"`); otherwise keep it as a
    /// string key. This is the numeric-string coercion rule of §4.2, and
    /// is what makes `root["3"]` and `root[3]` record identical paths
    /// (§8 invariant 8).
    pub fn from_str_or_index(s: &str) -> Segment {
        let is_plain_digits = !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        let no_leading_zero = s == "0" || !s.starts_with('0');
        if is_plain_digits && no_leading_zero {
            if let Ok(n) = s.parse::<i64>() {
                return Segment::Index(n);
            }
        }
        Segment::Key(s.to_string())
    }
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Segment::from_str_or_index(s)
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment::from_str_or_index(&s)
    }
}

impl From<i64> for Segment {
    fn from(n: i64) -> Self {
        Segment::Index(n)
    }
}

impl From<usize> for Segment {
    fn from(n: usize) -> Self {
        Segment::Index(n as i64)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{k}"),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// An ordered sequence of [`Segment`]s addressing a location in the state
/// tree. The empty path denotes the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Vec<Segment>);

impl Path {
    /// The store root, `[]`.
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Build a path from segments.
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
        Path(segments.into_iter().collect())
    }

    /// A single-segment path, the common case of addressing one record or field.
    pub fn of(segment: impl Into<Segment>) -> Self {
        Path(vec![segment.into()])
    }

    /// Append a segment, returning the extended path.
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }

    /// `true` for the store root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The first segment, if any. Used by the bus as its bucket key.
    pub fn first(&self) -> Option<&Segment> {
        self.0.first()
    }

    /// The path's segments.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// The prefix-of relation used for subscriber overlap (§4.1): `self` is
    /// a prefix of `other` (including equality).
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Two paths overlap iff one is a prefix of the other.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Path(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_string_coercion() {
        assert_eq!(Segment::from("3"), Segment::Index(3));
        assert_eq!(Segment::from(3i64), Segment::Index(3));
        assert_eq!(Path::of("3"), Path::of(3i64));
    }

    #[test]
    fn leading_zero_stays_a_key() {
        assert_eq!(Segment::from("03"), Segment::Key("03".to_string()));
        assert_eq!(Segment::from("0"), Segment::Index(0));
    }

    #[test]
    fn non_digit_string_stays_a_key() {
        assert_eq!(Segment::from("u1"), Segment::Key("u1".to_string()));
    }

    #[test]
    fn root_overlaps_everything() {
        let root = Path::root();
        let deep = Path::of("u1").child("name");
        assert!(root.overlaps(&deep));
        assert!(deep.overlaps(&root));
    }

    #[test]
    fn prefix_overlap() {
        let p1 = Path::of("u1");
        let p2 = Path::of("u1").child("name");
        let p3 = Path::of("u2");
        assert!(p1.overlaps(&p2));
        assert!(!p1.overlaps(&p3));
    }

    #[test]
    fn sibling_fields_do_not_overlap() {
        let name = Path::of("u1").child("name");
        let email = Path::of("u1").child("email");
        assert!(!name.overlaps(&email));
    }
}
