//! Native memory layout of type descriptors
//!
//! Sizes and alignments follow the platform C ABI. Primitive alignments are
//! taken from the corresponding Rust types, which match C on every target
//! Rust supports (e.g. `u64` is 4-aligned on i686 Linux, as in C).

use std::mem::{align_of, size_of};

use crate::encoding::TypeDescriptor;

/// Size and alignment of a native type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Size in bytes (a multiple of `align`)
    pub size: usize,
    /// Alignment in bytes
    pub align: usize,
}

impl Layout {
    const fn of<T>() -> Self {
        Layout {
            size: size_of::<T>(),
            align: align_of::<T>(),
        }
    }
}

/// Struct layout: per-field offsets plus the overall layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    /// Byte offset of each field
    pub offsets: Vec<usize>,
    /// Layout of the whole struct, including tail padding
    pub layout: Layout,
}

/// Reported for types whose size does not fit in `usize`. Parsed
/// signatures never contain one.
const OVERSIZED: Layout = Layout {
    size: usize::MAX,
    align: 1,
};

fn align_up(offset: usize, align: usize) -> Option<usize> {
    Some(offset.checked_add(align - 1)? & !(align - 1))
}

impl TypeDescriptor {
    /// Layout of a value of this type stored in memory.
    ///
    /// Saturates to `usize::MAX` bytes for hand-built descriptors too large
    /// to exist; see `checked_layout`.
    pub fn layout(&self) -> Layout {
        self.checked_layout().unwrap_or(OVERSIZED)
    }

    /// Layout of this type, or `None` if its size overflows `usize`
    pub fn checked_layout(&self) -> Option<Layout> {
        let layout = match self {
            TypeDescriptor::Void => Layout { size: 0, align: 1 },
            TypeDescriptor::Bool => Layout::of::<u8>(),
            TypeDescriptor::Int { bits: 8, .. } => Layout::of::<u8>(),
            TypeDescriptor::Int { bits: 16, .. } => Layout::of::<u16>(),
            TypeDescriptor::Int { bits: 32, .. } => Layout::of::<u32>(),
            TypeDescriptor::Int { .. } => Layout::of::<u64>(),
            TypeDescriptor::Float { bits: 32 } => Layout::of::<f32>(),
            TypeDescriptor::Float { .. } => Layout::of::<f64>(),
            TypeDescriptor::Pointer(_) | TypeDescriptor::Object(_) | TypeDescriptor::CString => {
                Layout::of::<*const u8>()
            }
            TypeDescriptor::Struct { fields, .. } => checked_struct_layout(fields)?.layout,
            TypeDescriptor::Array { element, count } => {
                let elem = element.checked_layout()?;
                Layout {
                    size: elem.size.checked_mul(*count)?,
                    align: elem.align,
                }
            }
        };
        Some(layout)
    }
}

/// Lay out struct fields in order with C padding rules.
///
/// Offsets saturate like `TypeDescriptor::layout` when the struct is too
/// large to exist.
pub fn struct_layout(fields: &[TypeDescriptor]) -> StructLayout {
    checked_struct_layout(fields).unwrap_or_else(|| StructLayout {
        offsets: vec![usize::MAX; fields.len()],
        layout: OVERSIZED,
    })
}

/// Struct layout, or `None` if an offset or the total size overflows
pub fn checked_struct_layout(fields: &[TypeDescriptor]) -> Option<StructLayout> {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut offset: usize = 0;
    let mut align = 1;

    for field in fields {
        let field_layout = field.checked_layout()?;
        offset = align_up(offset, field_layout.align)?;
        offsets.push(offset);
        offset = offset.checked_add(field_layout.size)?;
        align = align.max(field_layout.align);
    }

    Some(StructLayout {
        offsets,
        layout: Layout {
            size: align_up(offset, align)?,
            align,
        },
    })
}
