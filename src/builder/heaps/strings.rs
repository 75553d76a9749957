//! `#Strings` heap serialization with suffix folding.
//!
//! All interned strings are known when the heap is written, so any string that is a suffix of
//! another one can share that string's bytes. Sorting by reversed content places every suffix
//! right after the longest string ending in it:
//!
//! ```text
//! "BarFoo", "Foo", "oo"   ->   00 'B' 'a' 'r' 'F' 'o' 'o' 00
//!                                 ^BarFoo     ^Foo ^oo
//! ```

use std::cmp::Ordering;

use crate::{blob::BlobBuilder, utils::to_u32, Result};

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

/// Compare by code units from the end; a string sorts before its own suffixes.
fn suffix_order(x: &[u16], y: &[u16]) -> Ordering {
    for (a, b) in x.iter().rev().zip(y.iter().rev()) {
        match a.cmp(b) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
    }
    y.len().cmp(&x.len())
}

/// Write the `#Strings` heap for `strings`, whose virtual index is their position plus one.
///
/// Returns the heap offset of every string, indexed by virtual index. Entry 0 is the empty
/// string at offset 0.
pub(crate) fn serialize_string_heap(strings: &[String], heap: &mut BlobBuilder) -> Result<Vec<u32>> {
    let mut sorted: Vec<(usize, Vec<u16>)> = strings
        .iter()
        .enumerate()
        .map(|(index, text)| (index + 1, text.encode_utf16().collect()))
        .collect();
    sorted.sort_by(|(_, x), (_, y)| x.cmp(y));
    sorted.sort_by(|(_, x), (_, y)| suffix_order(x, y));

    let mut offsets = vec![0u32; strings.len() + 1];
    let mut folded = 0usize;
    let start = heap.count();

    heap.write_u8(0)?;

    let mut previous: &[u16] = &[];
    for (index, units) in &sorted {
        let position = heap.count() - start;
        let text = &strings[index - 1];

        if previous.ends_with(units) && !units.first().copied().is_some_and(is_low_surrogate) {
            offsets[*index] = to_u32(position - (text.len() + 1))?;
            folded += 1;
        } else {
            offsets[*index] = to_u32(position)?;
            heap.write_utf8(text)?;
            heap.write_u8(0)?;
        }
        previous = units;
    }

    tracing::debug!(
        strings = strings.len(),
        folded,
        heap_size = heap.count() - start,
        "serialized string heap"
    );

    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(strings: &[&str]) -> (Vec<u8>, Vec<u32>) {
        let strings: Vec<String> = strings.iter().map(|s| s.to_string()).collect();
        let mut heap = BlobBuilder::new();
        let offsets = serialize_string_heap(&strings, &mut heap).unwrap();
        (heap.to_vec().unwrap(), offsets)
    }

    #[test]
    fn folds_suffix() {
        let (heap, offsets) = serialize(&["Foo", "BarFoo"]);
        assert_eq!(heap, b"\0BarFoo\0");
        assert_eq!(offsets, [0, 4, 1]);
    }

    #[test]
    fn folds_chain() {
        let (heap, offsets) = serialize(&["oo", "BarFoo", "Foo"]);
        assert_eq!(heap, b"\0BarFoo\0");
        assert_eq!(offsets, [0, 5, 1, 4]);
    }

    #[test]
    fn unrelated_strings() {
        let (heap, offsets) = serialize(&["b", "a"]);
        assert_eq!(heap, b"\0a\0b\0");
        assert_eq!(offsets, [0, 3, 1]);
    }

    #[test]
    fn multibyte_suffix() {
        let (heap, offsets) = serialize(&["ä", "Bä"]);
        assert_eq!(heap, "\0Bä\0".as_bytes());
        assert_eq!(offsets, [0, 2, 1]);
    }

    #[test]
    fn empty_heap() {
        let (heap, offsets) = serialize(&[]);
        assert_eq!(heap, [0]);
        assert_eq!(offsets, [0]);
    }

    #[test]
    fn suffix_order_puts_longer_first() {
        let foo: Vec<u16> = "Foo".encode_utf16().collect();
        let bar_foo: Vec<u16> = "BarFoo".encode_utf16().collect();
        assert_eq!(suffix_order(&bar_foo, &foo), Ordering::Less);
        assert_eq!(suffix_order(&foo, &bar_foo), Ordering::Greater);
        assert_eq!(suffix_order(&foo, &foo), Ordering::Equal);
    }
}
