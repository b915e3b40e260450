//! Aligned field packing for single-buffer kernel I/O.
//!
//! Each compute kernel binds one input and one output storage buffer; all
//! named particle arrays for a pass live side by side in that buffer. The
//! layout assigns every field a byte offset that respects its alignment, in
//! declaration order, so the CPU writes and the shader's word-offset reads
//! agree on where each array starts.

use crate::SimError;

/// Round `value` up to the next multiple of `alignment` (a power of two).
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    element_size: u64,
    alignment: u64,
    count: u64,
    offset: u64,
}

impl Field {
    /// Bytes the field occupies: elements are padded to their alignment.
    fn stride(&self) -> u64 {
        self.count * align_up(self.element_size, self.alignment)
    }
}

/// Ordered collection of named, aligned fields within one buffer.
///
/// Fields are appended with [`add_field`](Self::add_field), then
/// [`finalize`](Self::finalize) fixes every offset. Offsets and the total
/// size are only queryable after finalization, and no field may be added
/// after it.
#[derive(Debug, Clone, Default)]
pub struct BufferLayout {
    fields: Vec<Field>,
    finalized: bool,
    total: u64,
}

impl BufferLayout {
    /// Empty, unfinalized layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field of `count` elements of `element_size` bytes, each
    /// aligned to `alignment`. An alignment that is not a nonzero power of
    /// two is rejected with [`SimError::InvalidAlignment`].
    pub fn add_field(
        &mut self,
        element_size: u64,
        alignment: u64,
        count: u64,
        name: &str,
    ) -> Result<(), SimError> {
        if self.finalized {
            return Err(SimError::LayoutFinalized);
        }
        if !alignment.is_power_of_two() {
            return Err(SimError::InvalidAlignment {
                name: name.to_owned(),
                alignment,
            });
        }
        self.fields.push(Field {
            name: name.to_owned(),
            element_size,
            alignment,
            count,
            offset: 0,
        });
        Ok(())
    }

    /// Fix every field's byte offset. Callable exactly once.
    pub fn finalize(&mut self) -> Result<(), SimError> {
        if self.finalized {
            return Err(SimError::LayoutFinalized);
        }
        let mut cursor = 0u64;
        for field in &mut self.fields {
            cursor = align_up(cursor, field.alignment);
            field.offset = cursor;
            cursor += field.stride();
        }
        self.total = cursor;
        self.finalized = true;
        Ok(())
    }

    /// True once [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Byte offset of a named field.
    pub fn offset_of(&self, name: &str) -> Result<u64, SimError> {
        if !self.finalized {
            return Err(SimError::LayoutNotFinalized);
        }
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.offset)
            .ok_or_else(|| SimError::FieldNotFound(name.to_owned()))
    }

    /// Total buffer size in bytes.
    pub fn total_size(&self) -> Result<u64, SimError> {
        if !self.finalized {
            return Err(SimError::LayoutNotFinalized);
        }
        Ok(self.total)
    }
}
