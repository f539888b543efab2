//! Block-literal ABI
//!
//! Native interfaces that take callbacks as block objects expect the
//! `{isa, flags, reserved, invoke, descriptor}` layout. A trampoline whose
//! first argument is the block itself (`@?`) can be exposed this way, and
//! the signature of any block carrying one can be read back.

use std::ffi::{c_void, CStr};
use std::mem::size_of;
use std::os::raw::{c_char, c_int, c_ulong};
use std::ptr;

/// Descriptor has copy/dispose helpers
pub const BLOCK_HAS_COPY_DISPOSE: c_int = 1 << 25;
/// Block lives in static storage and is never copied
pub const BLOCK_IS_GLOBAL: c_int = 1 << 28;
/// Descriptor carries a type-signature string
pub const BLOCK_HAS_SIGNATURE: c_int = 1 << 30;

/// Block descriptor without copy/dispose helpers.
#[repr(C)]
#[derive(Debug)]
pub struct BlockDescriptor {
    /// Always zero
    pub reserved: c_ulong,
    /// Size of the block literal
    pub size: c_ulong,
    /// NUL-terminated type encoding
    pub signature: *const c_char,
}

/// Block literal header.
#[repr(C)]
#[derive(Debug)]
pub struct BlockLiteral {
    /// Class pointer. Null unless the host runtime installs one.
    pub isa: *const c_void,
    /// `BLOCK_*` flags
    pub flags: c_int,
    /// Always zero
    pub reserved: c_int,
    /// Entry point; receives the literal as its first argument
    pub invoke: *const c_void,
    /// Descriptor, including the signature
    pub descriptor: *const BlockDescriptor,
}

impl BlockDescriptor {
    /// Descriptor advertising `signature`
    pub fn new(signature: &CStr) -> Self {
        Self {
            reserved: 0,
            size: size_of::<BlockLiteral>() as c_ulong,
            signature: signature.as_ptr(),
        }
    }
}

impl BlockLiteral {
    /// Global block with a signature, invoking `invoke`
    pub fn new(invoke: *const c_void, descriptor: *const BlockDescriptor) -> Self {
        Self {
            isa: ptr::null(),
            flags: BLOCK_HAS_SIGNATURE | BLOCK_IS_GLOBAL,
            reserved: 0,
            invoke,
            descriptor,
        }
    }

    /// Raw pointer to hand to native code
    pub fn as_ptr(&self) -> *const c_void {
        self as *const BlockLiteral as *const c_void
    }
}

/// Type encoding stored in a block's descriptor, if it has one.
///
/// # Safety
///
/// `block` must be null or point to a valid block literal whose descriptor
/// (and signature string, when flagged) are readable.
pub unsafe fn signature_for_block<'a>(block: *const c_void) -> Option<&'a CStr> {
    if block.is_null() {
        return None;
    }
    let literal = &*(block as *const BlockLiteral);
    if literal.flags & BLOCK_HAS_SIGNATURE == 0 || literal.descriptor.is_null() {
        return None;
    }

    // reserved, size, [copy, dispose], signature
    let mut offset = 2 * size_of::<c_ulong>();
    if literal.flags & BLOCK_HAS_COPY_DISPOSE != 0 {
        offset += 2 * size_of::<*const c_void>();
    }
    let slot = (literal.descriptor as *const u8).add(offset) as *const *const c_char;
    let signature = ptr::read(slot);
    if signature.is_null() {
        None
    } else {
        Some(CStr::from_ptr(signature))
    }
}
