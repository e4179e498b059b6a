use crate::{
    error::{error_corruption, error_validation},
    page::Page,
    repr::PageId,
    Error, HashMap, NULL_PAGE, PAGE_SIZE,
};

/// Storage for immutable pages.
///
/// Page ids are opaque to the tree, they don't need to be sequential and freed ids may or may
/// not be handed out again. A store must never return [NULL_PAGE] from `allocate`.
pub trait PageStore {
    /// Returns the contents of a live page.
    fn read(&self, id: PageId) -> Result<Page, Error>;

    /// Stores a new page, `data` is exactly [PAGE_SIZE] bytes long.
    fn allocate(&mut self, data: &[u8]) -> Result<PageId, Error>;

    /// Releases a page. The tree never reads a page after freeing it.
    fn free(&mut self, id: PageId) -> Result<(), Error>;
}

impl<S: PageStore + ?Sized> PageStore for &mut S {
    #[inline]
    fn read(&self, id: PageId) -> Result<Page, Error> {
        (**self).read(id)
    }

    #[inline]
    fn allocate(&mut self, data: &[u8]) -> Result<PageId, Error> {
        (**self).allocate(data)
    }

    #[inline]
    fn free(&mut self, id: PageId) -> Result<(), Error> {
        (**self).free(id)
    }
}

/// In memory [PageStore], freed ids are reused.
#[derive(Debug)]
pub struct MemPageStore {
    #[debug(skip)]
    pages: HashMap<PageId, Box<[u8]>>,
    freed: Vec<PageId>,
    next_id: PageId,
}

impl Default for MemPageStore {
    fn default() -> Self {
        Self {
            pages: Default::default(),
            freed: Default::default(),
            next_id: NULL_PAGE + 1,
        }
    }
}

impl MemPageStore {
    /// Number of live pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.pages.contains_key(&id)
    }

    /// Mutable access to a live page's bytes, for corruption tests.
    #[cfg(any(fuzzing, test))]
    pub fn page_mut(&mut self, id: PageId) -> Option<&mut [u8]> {
        self.pages.get_mut(&id).map(|p| &mut p[..])
    }
}

impl PageStore for MemPageStore {
    fn read(&self, id: PageId) -> Result<Page, Error> {
        match self.pages.get(&id) {
            Some(data) => Page::from_bytes(data.clone()),
            None => Err(error_corruption!("Page {id} not found")),
        }
    }

    fn allocate(&mut self, data: &[u8]) -> Result<PageId, Error> {
        if data.len() != PAGE_SIZE {
            return Err(error_validation!(
                "Page len {} must be {PAGE_SIZE}",
                data.len()
            ));
        }
        let id = match self.freed.pop() {
            Some(id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        debug_assert_ne!(id, NULL_PAGE);
        self.pages.insert(id, data.into());
        Ok(id)
    }

    fn free(&mut self, id: PageId) -> Result<(), Error> {
        if self.pages.remove(&id).is_none() {
            return Err(error_corruption!("Freeing page {id} which isn't allocated"));
        }
        self.freed.push(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_read_free() {
        let mut store = MemPageStore::default();
        let mut data = vec![0u8; PAGE_SIZE];
        data[10] = 42;
        let a = store.allocate(&data).unwrap();
        let b = store.allocate(&[0; PAGE_SIZE]).unwrap();
        assert_ne!(a, NULL_PAGE);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.read(a).unwrap().data(), &data[..]);

        store.free(a).unwrap();
        assert!(!store.contains(a));
        assert!(store.read(a).unwrap_err().is_corruption());
        assert!(store.free(a).unwrap_err().is_corruption());
        // freed ids are handed out again
        assert_eq!(store.allocate(&data).unwrap(), a);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn allocate_rejects_bad_len() {
        let mut store = MemPageStore::default();
        assert!(matches!(
            store.allocate(&[0; 10]),
            Err(Error::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn read_checks_len() {
        let mut store = MemPageStore::default();
        let id = store.allocate(&[0; PAGE_SIZE]).unwrap();
        store.pages.insert(id, vec![0; 100].into());
        assert!(store.read(id).unwrap_err().is_corruption());
    }
}
