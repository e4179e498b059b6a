use crate::{error::error_corruption, Error, PAGE_SIZE};

/// A page sized (or a multiple of it) zero initialized byte buffer.
///
/// Pages handed to and returned from a [crate::PageStore] span exactly one page.
/// Nodes under construction use 2 pages worth of buffer so they can temporarily overflow
/// before being split.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Page {
    #[debug("{}", raw_data.len())]
    raw_data: Box<[u8]>,
}

impl Page {
    pub fn new(span: usize) -> Self {
        assert!(span > 0);
        Self {
            raw_data: vec![0; span * PAGE_SIZE].into_boxed_slice(),
        }
    }

    /// Wraps bytes that came from storage, which must be exactly one page long.
    pub fn from_bytes(raw_data: impl Into<Box<[u8]>>) -> Result<Self, Error> {
        let raw_data = raw_data.into();
        if raw_data.len() != PAGE_SIZE {
            return Err(error_corruption!(
                "Bad page len {}, expected {PAGE_SIZE}",
                raw_data.len()
            ));
        }
        Ok(Self { raw_data })
    }

    #[inline]
    pub fn span(&self) -> usize {
        debug_assert!(self.raw_data.len() % PAGE_SIZE == 0);
        self.raw_data.len() / PAGE_SIZE
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.raw_data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.raw_data
    }

    /// Drops everything past the first page. The caller guarantees the tail is unused.
    pub(crate) fn shrink_to_page(&mut self) {
        if self.span() > 1 {
            let mut raw_data = std::mem::take(&mut self.raw_data).into_vec();
            raw_data.truncate(PAGE_SIZE);
            self.raw_data = raw_data.into_boxed_slice();
        }
    }

    pub fn into_bytes(self) -> Box<[u8]> {
        self.raw_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_checks_len() {
        assert!(Page::from_bytes(vec![0; PAGE_SIZE]).is_ok());
        for len in [0, 1, PAGE_SIZE - 1, PAGE_SIZE + 1, 2 * PAGE_SIZE] {
            let err = Page::from_bytes(vec![0; len]).unwrap_err();
            assert!(err.is_corruption(), "{err}");
        }
    }

    #[test]
    fn shrink_keeps_prefix() {
        let mut page = Page::new(2);
        assert_eq!(page.span(), 2);
        page.data_mut()[PAGE_SIZE - 1] = 7;
        page.data_mut()[PAGE_SIZE] = 9;
        page.shrink_to_page();
        assert_eq!(page.span(), 1);
        assert_eq!(page.data().len(), PAGE_SIZE);
        assert_eq!(page.data()[PAGE_SIZE - 1], 7);
    }

    #[test]
    fn into_bytes_round_trip() {
        let mut page = Page::new(2);
        page.data_mut()[0] = 3;
        page.shrink_to_page();
        let bytes = page.into_bytes();
        assert_eq!(bytes.len(), PAGE_SIZE);
        assert_eq!(bytes[0], 3);
        let page = Page::from_bytes(bytes).unwrap();
        assert_eq!(page.data()[0], 3);
    }
}
