use indexmap::map::Iter;
use indexmap::IndexMap;

/**
An ordered mapping from spectrum native ID to the byte offset of its
`<spectrum>` element in an indexedmzML document.

Built by the writer while streaming spectra out, and by the reader when it
reaches the trailing `<indexList>`.
*/
#[derive(Default, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OffsetIndex {
    /// The `name` attribute of the `<index>` element, `spectrum` for spectra
    pub name: String,

    #[cfg_attr(feature = "serde", serde(with = "indexmap::map::serde_seq"))]
    pub offsets: IndexMap<Box<str>, u64>,

    /// Whether an index was actually read or built, as opposed to being
    /// absent from the source document.
    pub init: bool,
}

impl OffsetIndex {
    pub fn new<S: Into<String>>(name: S) -> OffsetIndex {
        OffsetIndex {
            name: name.into(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).copied()
    }

    /// Get the key and offset at a position in the index
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<(&str, u64)> {
        self.offsets
            .get_index(index)
            .map(|(key, offset)| (key.as_ref(), *offset))
    }

    #[inline]
    pub fn insert<T: Into<Box<str>>>(&mut self, key: T, offset: u64) -> Option<u64> {
        self.offsets.insert(key.into(), offset)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Box<str>, u64> {
        self.offsets.iter()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.offsets.contains_key(key)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ordering() {
        let mut index = OffsetIndex::new("spectrum");
        index.insert("scan=2", 400);
        index.insert("scan=1", 900);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get_index(0), Some(("scan=2", 400)));
        assert_eq!(index.get("scan=1"), Some(900));
        assert!(!index.contains_key("scan=3"));
        assert_eq!(index.insert("scan=2", 401), Some(400));
        assert_eq!(index.len(), 2);
    }
}
