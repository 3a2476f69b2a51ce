use std::sync::Arc;

/// A reference-counted, sliceable byte buffer.
///
/// Request and response payloads are held this way so that an outbound
/// message can be re-queued after a session reset without copying, and so
/// that fragment slicing is zero-copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedBytes {
    data: Arc<[u8]>,
    start: usize,
    len: usize,
}

impl SharedBytes {
    /// Takes ownership of a Vec.
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let data: Arc<[u8]> = Arc::from(vec.into_boxed_slice());
        let len = data.len();
        Self { data, start: 0, len }
    }

    /// Total length of this view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The view as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.start + self.len]
    }

    /// A sub-view of `len` bytes starting at `start`, clamped to the end of
    /// this view. Out-of-range starts yield an empty view.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        let start = start.min(self.len);
        let len = len.min(self.len - start);
        Self { data: self.data.clone(), start: self.start + start, len }
    }

    /// The byte range carried by fragment `index` when the payload is split
    /// into `fragment_size`-byte pieces. The final fragment runs short.
    pub fn fragment(&self, index: u32, fragment_size: usize) -> Self {
        self.slice(index as usize * fragment_size, fragment_size)
    }
}

impl From<Vec<u8>> for SharedBytes {
    fn from(vec: Vec<u8>) -> Self {
        Self::from_vec(vec)
    }
}

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
