//! Pagination contract shared by every repository.
//!
//! Pages are 1-based. A page past the end of the collection is empty, never
//! an error.

use crate::RecordError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self, RecordError> {
        if page < 1 || page_size < 1 {
            return Err(RecordError::InvalidPage { page, page_size });
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of records preceding this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Slice an already ordered collection down to this page.
    pub fn paginate<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let len = items.len() as u64;
        let start = self.offset().min(len) as usize;
        let end = (self.offset() + u64::from(self.page_size)).min(len) as usize;
        &items[start..end]
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_zero_page() {
        assert_eq!(
            PageRequest::new(0, 10),
            Err(RecordError::InvalidPage {
                page: 0,
                page_size: 10
            })
        );
        assert!(PageRequest::new(1, 0).is_err());
    }

    #[test]
    fn test_offset() {
        assert_eq!(PageRequest::new(1, 10).unwrap().offset(), 0);
        assert_eq!(PageRequest::new(3, 10).unwrap().offset(), 20);
    }

    #[test]
    fn test_pages_over_twenty_five_items() {
        let items: Vec<u32> = (0..25).collect();
        let page = |n| PageRequest::new(n, 10).unwrap().paginate(&items).to_vec();
        assert_eq!(page(1), (0..10).collect::<Vec<_>>());
        assert_eq!(page(3), (20..25).collect::<Vec<_>>());
        assert!(page(4).is_empty());
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let items = [1, 2, 3];
        let req = PageRequest::new(u32::MAX, u32::MAX).unwrap();
        assert!(req.paginate(&items).is_empty());
    }

    proptest! {
        #[test]
        fn pages_partition_the_collection(len in 0usize..200, page_size in 1u32..40) {
            let items: Vec<usize> = (0..len).collect();
            let mut seen = Vec::new();
            let mut page = 1;
            loop {
                let chunk = PageRequest::new(page, page_size).unwrap().paginate(&items);
                if chunk.is_empty() {
                    break;
                }
                prop_assert!(chunk.len() <= page_size as usize);
                seen.extend_from_slice(chunk);
                page += 1;
            }
            prop_assert_eq!(seen, items);
        }
    }
}
