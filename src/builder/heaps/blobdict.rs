//! Content-addressed lookup from blob bytes to their `#Blob` heap handle.

use crate::{metadata::handles::BlobHandle, utils::fnv1a};

const INITIAL_SLOTS: usize = 64;

struct Entry {
    hash: u32,
    content: Box<[u8]>,
    handle: BlobHandle,
}

/// Open-addressing table keyed by FNV-1a content hash.
///
/// Collisions are resolved by walking the slots with the full-period sequence
/// `slot = slot * 5 + 1 (mod capacity)`. The first entry with identical bytes wins, so equal
/// content always maps to the handle assigned on its first insertion.
pub(crate) struct BlobDictionary {
    slots: Vec<Option<Entry>>,
    len: usize,
}

impl BlobDictionary {
    pub(crate) fn new() -> Self {
        BlobDictionary {
            slots: std::iter::repeat_with(|| None).take(INITIAL_SLOTS).collect(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    fn probe(&self, hash: u32, content: &[u8]) -> (usize, Option<BlobHandle>) {
        let mask = self.mask();
        let mut slot = hash as usize & mask;
        loop {
            match &self.slots[slot] {
                None => return (slot, None),
                Some(entry) if entry.hash == hash && *entry.content == *content => {
                    return (slot, Some(entry.handle))
                }
                Some(_) => slot = (slot.wrapping_mul(5).wrapping_add(1)) & mask,
            }
        }
    }

    /// The handle previously stored for `content`.
    pub(crate) fn get(&self, content: &[u8]) -> Option<BlobHandle> {
        self.probe(fnv1a(content), content).1
    }

    /// Return the handle stored for `content`, or store the handle produced by `assign`.
    ///
    /// `assign` runs only for new content; its error leaves the dictionary unchanged.
    pub(crate) fn get_or_insert_with<E>(
        &mut self,
        content: &[u8],
        assign: impl FnOnce() -> Result<BlobHandle, E>,
    ) -> Result<BlobHandle, E> {
        let hash = fnv1a(content);
        let (slot, found) = self.probe(hash, content);
        if let Some(handle) = found {
            return Ok(handle);
        }

        let handle = assign()?;
        self.slots[slot] = Some(Entry {
            hash,
            content: content.into(),
            handle,
        });
        self.len += 1;

        if self.len * 2 > self.slots.len() {
            self.grow();
        }
        Ok(handle)
    }

    fn grow(&mut self) {
        let capacity = self.slots.len() * 2;
        let old = std::mem::replace(
            &mut self.slots,
            std::iter::repeat_with(|| None).take(capacity).collect(),
        );

        for entry in old.into_iter().flatten() {
            let (slot, _) = self.probe(entry.hash, &entry.content);
            self.slots[slot] = Some(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(dict: &mut BlobDictionary, content: &[u8], offset: u32) -> BlobHandle {
        dict.get_or_insert_with::<()>(content, || Ok(BlobHandle::from_offset(offset)))
            .unwrap()
    }

    #[test]
    fn first_match_wins() {
        let mut dict = BlobDictionary::new();
        let first = insert(&mut dict, &[1, 2, 3], 1);
        let second = insert(&mut dict, &[1, 2, 3], 99);

        assert_eq!(first, second);
        assert_eq!(second.offset(), Some(1));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn distinct_content() {
        let mut dict = BlobDictionary::new();
        insert(&mut dict, &[1], 1);
        insert(&mut dict, &[2], 3);

        assert_eq!(dict.get(&[1]).unwrap().offset(), Some(1));
        assert_eq!(dict.get(&[2]).unwrap().offset(), Some(3));
        assert!(dict.get(&[3]).is_none());
    }

    #[test]
    fn survives_growth() {
        let mut dict = BlobDictionary::new();
        for value in 0u32..1000 {
            insert(&mut dict, &value.to_le_bytes(), value + 1);
        }

        assert_eq!(dict.len(), 1000);
        for value in 0u32..1000 {
            assert_eq!(
                dict.get(&value.to_le_bytes()).unwrap().offset(),
                Some(value + 1)
            );
        }
    }

    #[test]
    fn failed_assignment() {
        let mut dict = BlobDictionary::new();
        assert!(dict.get_or_insert_with(&[7], || Err("full")).is_err());
        assert!(dict.get(&[7]).is_none());
        assert_eq!(dict.len(), 0);
    }
}
