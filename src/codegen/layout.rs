//! Linear memory layout of global arrays
//!
//! Arrays are packed back to back in declaration order with no padding.
//! Int elements take 4 bytes and float elements 8.

use crate::hir::{ArrayIndex, HirArray};
use crate::types::Type;
use serde::Serialize;

/// Size of one WebAssembly memory page
pub const PAGE_SIZE: u64 = 65536;

/// Placement of one array in linear memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArraySlot {
    pub name: String,
    pub elem: Type,
    pub len: u32,
    /// Byte offset of element 0
    pub offset: u32,
    pub byte_len: u64,
}

/// Placement of every array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryLayout {
    pub arrays: Vec<ArraySlot>,
    pub total_bytes: u64,
}

impl MemoryLayout {
    /// Lay out `arrays` in the order given.
    /// The resolver has already bounded the total by the 32-bit address space.
    pub fn new(arrays: &[HirArray]) -> Self {
        let mut layout = MemoryLayout::default();
        for array in arrays {
            let byte_len = array.byte_len();
            layout.arrays.push(ArraySlot {
                name: array.name.clone(),
                elem: array.elem,
                len: array.len,
                offset: layout.total_bytes as u32,
                byte_len,
            });
            layout.total_bytes += byte_len;
        }
        layout
    }

    /// Pages needed to hold every array
    pub fn pages(&self) -> u64 {
        self.total_bytes.div_ceil(PAGE_SIZE)
    }

    pub fn slot(&self, array: ArrayIndex) -> &ArraySlot {
        &self.arrays[array.0 as usize]
    }

    pub fn find(&self, name: &str) -> Option<&ArraySlot> {
        self.arrays.iter().find(|slot| slot.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(name: &str, elem: Type, len: u32) -> HirArray {
        HirArray {
            name: name.to_string(),
            elem,
            len,
        }
    }

    #[test]
    fn test_offsets_are_running_byte_totals() {
        let layout = MemoryLayout::new(&[
            array("A", Type::Int, 3),
            array("B", Type::Float, 2),
            array("C", Type::Int, 1),
        ]);
        let offsets: Vec<_> = layout.arrays.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 28]);
        assert_eq!(layout.total_bytes, 32);
        assert_eq!(layout.pages(), 1);
    }

    #[test]
    fn test_no_arrays_needs_no_pages() {
        let layout = MemoryLayout::new(&[]);
        assert_eq!(layout.pages(), 0);
        assert!(layout.is_empty());
    }

    #[test]
    fn test_page_boundary() {
        let layout = MemoryLayout::new(&[array("A", Type::Int, 16384)]);
        assert_eq!(layout.pages(), 1);
        let layout = MemoryLayout::new(&[array("A", Type::Int, 16385)]);
        assert_eq!(layout.pages(), 2);
    }
}
