//! Invocation marshaller
//!
//! Converts native arguments to script values, calls the script function,
//! and writes the converted result into the native return slot.
//!
//! Failures never reach the native caller. The return slot receives the zero
//! value of the declared kind and the error goes to the `Reporter`.
//!
//! C strings written into a return value are owned by the target. They stay
//! valid until the same bridge next returns on the same thread, or until the
//! bridge is dropped; callers that keep them longer must copy.

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::mem::size_of;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use libffi::raw::{ffi_arg, ffi_sarg};
use parking_lot::Mutex;
use scriptblock_sdk::{
    FromScript, HandleKind, MarshalError, MarshalResult, ScriptError, ScriptFunctionHandle,
    ScriptValue, ToScript,
};
use tracing::{trace, warn};

use crate::encoding::{ObjectKind, TypeDescriptor, TypeSignature};
use crate::error::InvocationError;
use crate::handles::HandleTable;
use crate::layout::struct_layout;
use crate::report::{InvocationReport, Reporter};

/// Everything a trampoline needs at call time.
///
/// Shared between the trampoline (as closure userdata) and the bridge.
pub struct InvocationTarget {
    signature: Arc<TypeSignature>,
    function: ScriptFunctionHandle,
    handles: Arc<HandleTable>,
    reporter: Reporter,
    /// C strings from the latest return on each thread
    strings: Mutex<HashMap<ThreadId, Vec<CString>>>,
    trace: bool,
}

impl InvocationTarget {
    /// Create a target for one bridge
    pub fn new(
        signature: Arc<TypeSignature>,
        function: ScriptFunctionHandle,
        handles: Arc<HandleTable>,
        reporter: Reporter,
    ) -> Self {
        Self {
            signature,
            function,
            handles,
            reporter,
            strings: Mutex::new(HashMap::new()),
            trace: false,
        }
    }

    /// Emit a trace event per invocation
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    /// Signature this target marshals for
    pub fn signature(&self) -> &Arc<TypeSignature> {
        &self.signature
    }

    /// Script function this target calls
    pub fn function(&self) -> &ScriptFunctionHandle {
        &self.function
    }

    /// Handle table used for pointer arguments and returns
    pub fn handles(&self) -> &Arc<HandleTable> {
        &self.handles
    }

    /// Number of returned C strings currently kept alive
    pub fn retained_strings(&self) -> usize {
        self.strings.lock().values().map(Vec::len).sum()
    }

    /// Generic entry point called by the trampoline.
    ///
    /// Always leaves a value of the declared return kind in `ret`.
    ///
    /// # Safety
    ///
    /// `args` must hold one valid pointer per native argument, each pointing
    /// at a value of the declared type. `ret` must point to writable storage
    /// large enough for the return type (widened to `ffi_arg` for integers).
    pub unsafe fn dispatch(&self, args: &[*const c_void], ret: *mut c_void) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_invoke(args, ret)));
        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => ScriptError::Panicked(panic_message(payload.as_ref())).into(),
        };

        self.write_default(ret);
        warn!(
            target: "scriptblock::invoke",
            encoding = self.signature.encoding(),
            kind = error.kind(),
            error = %error,
            "invocation failed; returning zero value"
        );
        self.reporter.publish(InvocationReport {
            encoding: self.signature.encoding().to_string(),
            error,
        });
    }

    /// Marshal, call and write back, returning the first error.
    ///
    /// Unlike `dispatch`, `ret` is left as is on failure, possibly partly
    /// written.
    ///
    /// # Safety
    ///
    /// Same contract as `dispatch`.
    pub unsafe fn try_invoke(
        &self,
        args: &[*const c_void],
        ret: *mut c_void,
    ) -> Result<(), InvocationError> {
        let script_args = self.read_arguments(args)?;
        let result = self.call_script(&script_args)?;
        self.write_return(&result, ret)?;
        Ok(())
    }

    /// Convert native arguments to script values, dropping receiver slots.
    ///
    /// # Safety
    ///
    /// Same contract as `dispatch` for `args`.
    pub unsafe fn read_arguments(&self, args: &[*const c_void]) -> MarshalResult<Vec<ScriptValue>> {
        let expected = self.signature.argument_count();
        if args.len() != expected {
            return Err(MarshalError::ArityMismatch {
                expected,
                got: args.len(),
            });
        }

        let skip = self.signature.implicit_arguments();
        Ok(self
            .signature
            .arguments()
            .iter()
            .zip(args)
            .skip(skip)
            .map(|(ty, &arg)| self.read_argument(ty, arg as *const u8))
            .collect())
    }

    /// Call the script function, containing panics.
    pub fn call_script(&self, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        if self.trace {
            trace!(
                target: "scriptblock::invoke",
                encoding = self.signature.encoding(),
                function = self.function.name().unwrap_or("<anonymous>"),
                args = args.len(),
                "invoking script function"
            );
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.function.call(args))) {
            Ok(result) => result,
            Err(payload) => Err(ScriptError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Top-level arguments: arrays arrive decayed to a pointer.
    unsafe fn read_argument(&self, ty: &TypeDescriptor, ptr: *const u8) -> ScriptValue {
        match ty {
            TypeDescriptor::Array { .. } => {
                self.pointer_value(ptr::read_unaligned(ptr as *const usize), HandleKind::Pointer)
            }
            _ => self.read_value(ty, ptr),
        }
    }

    /// Read one value of type `ty` stored in memory at `ptr`.
    unsafe fn read_value(&self, ty: &TypeDescriptor, ptr: *const u8) -> ScriptValue {
        match ty {
            TypeDescriptor::Void => ScriptValue::Undefined,
            TypeDescriptor::Bool => ScriptValue::Bool(ptr::read_unaligned(ptr) != 0),
            TypeDescriptor::Int { bits, signed } => match (bits, signed) {
                (8, true) => ptr::read_unaligned(ptr as *const i8).to_script(),
                (8, false) => ptr::read_unaligned(ptr).to_script(),
                (16, true) => ptr::read_unaligned(ptr as *const i16).to_script(),
                (16, false) => ptr::read_unaligned(ptr as *const u16).to_script(),
                (32, true) => ptr::read_unaligned(ptr as *const i32).to_script(),
                (32, false) => ptr::read_unaligned(ptr as *const u32).to_script(),
                (_, true) => ptr::read_unaligned(ptr as *const i64).to_script(),
                (_, false) => ptr::read_unaligned(ptr as *const u64).to_script(),
            },
            TypeDescriptor::Float { bits: 32 } => ptr::read_unaligned(ptr as *const f32).to_script(),
            TypeDescriptor::Float { .. } => ptr::read_unaligned(ptr as *const f64).to_script(),
            TypeDescriptor::Pointer(_) => {
                self.pointer_value(ptr::read_unaligned(ptr as *const usize), HandleKind::Pointer)
            }
            TypeDescriptor::Object(kind) => {
                self.pointer_value(ptr::read_unaligned(ptr as *const usize), handle_kind(*kind))
            }
            TypeDescriptor::CString => {
                let s = ptr::read_unaligned(ptr as *const *const std::os::raw::c_char);
                if s.is_null() {
                    ScriptValue::Null
                } else {
                    ScriptValue::String(CStr::from_ptr(s).to_string_lossy().into_owned())
                }
            }
            TypeDescriptor::Struct { fields, .. } => {
                let layout = struct_layout(fields);
                ScriptValue::Array(
                    fields
                        .iter()
                        .zip(&layout.offsets)
                        .map(|(field, &offset)| self.read_value(field, ptr.add(offset)))
                        .collect(),
                )
            }
            TypeDescriptor::Array { element, count } => {
                let stride = element.layout().size;
                ScriptValue::Array(
                    (0..*count)
                        .map(|i| self.read_value(element, ptr.add(i * stride)))
                        .collect(),
                )
            }
        }
    }

    fn pointer_value(&self, address: usize, kind: HandleKind) -> ScriptValue {
        if address == 0 {
            ScriptValue::Null
        } else {
            ScriptValue::Handle(self.handles.intern(address, kind))
        }
    }

    /// Write the script result into the return slot.
    ///
    /// Integral returns narrower than a register are widened to
    /// `ffi_arg`/`ffi_sarg`, as libffi closures require.
    ///
    /// # Safety
    ///
    /// `ret` must satisfy the `dispatch` contract.
    pub unsafe fn write_return(&self, value: &ScriptValue, ret: *mut c_void) -> MarshalResult<()> {
        let ty = self.signature.return_type();
        let ret = ret as *mut u8;
        match ty {
            TypeDescriptor::Void => Ok(()),
            TypeDescriptor::Bool => {
                write_widened(ret, bool::from_script(value)? as ffi_arg);
                Ok(())
            }
            TypeDescriptor::Int { bits, signed } if (*bits as usize) < 8 * size_of::<ffi_arg>() => {
                match (bits, signed) {
                    (8, true) => write_widened(ret, i8::from_script(value)? as ffi_sarg),
                    (8, false) => write_widened(ret, u8::from_script(value)? as ffi_arg),
                    (16, true) => write_widened(ret, i16::from_script(value)? as ffi_sarg),
                    (16, false) => write_widened(ret, u16::from_script(value)? as ffi_arg),
                    (_, true) => write_widened(ret, i32::from_script(value)? as ffi_sarg),
                    (_, false) => write_widened(ret, u32::from_script(value)? as ffi_arg),
                }
                Ok(())
            }
            _ => {
                let mut strings = Vec::new();
                self.write_value(ty, value, ret, &mut strings)?;
                self.retain_strings(strings);
                Ok(())
            }
        }
    }

    /// Replace this thread's strings from the previous return.
    fn retain_strings(&self, strings: Vec<CString>) {
        let thread = thread::current().id();
        let mut retained = self.strings.lock();
        if strings.is_empty() {
            retained.remove(&thread);
        } else {
            retained.insert(thread, strings);
        }
    }

    /// Write `value` as a `ty` stored in memory at `ptr` (no widening).
    unsafe fn write_value(
        &self,
        ty: &TypeDescriptor,
        value: &ScriptValue,
        ptr: *mut u8,
        strings: &mut Vec<CString>,
    ) -> MarshalResult<()> {
        match ty {
            TypeDescriptor::Void => {}
            TypeDescriptor::Bool => ptr::write_unaligned(ptr, bool::from_script(value)? as u8),
            TypeDescriptor::Int { bits, signed } => match (bits, signed) {
                (8, true) => ptr::write_unaligned(ptr as *mut i8, i8::from_script(value)?),
                (8, false) => ptr::write_unaligned(ptr, u8::from_script(value)?),
                (16, true) => ptr::write_unaligned(ptr as *mut i16, i16::from_script(value)?),
                (16, false) => ptr::write_unaligned(ptr as *mut u16, u16::from_script(value)?),
                (32, true) => ptr::write_unaligned(ptr as *mut i32, i32::from_script(value)?),
                (32, false) => ptr::write_unaligned(ptr as *mut u32, u32::from_script(value)?),
                (_, true) => ptr::write_unaligned(ptr as *mut i64, i64::from_script(value)?),
                (_, false) => ptr::write_unaligned(ptr as *mut u64, u64::from_script(value)?),
            },
            TypeDescriptor::Float { bits: 32 } => {
                ptr::write_unaligned(ptr as *mut f32, f32::from_script(value)?)
            }
            TypeDescriptor::Float { .. } => {
                ptr::write_unaligned(ptr as *mut f64, f64::from_script(value)?)
            }
            TypeDescriptor::Pointer(_) | TypeDescriptor::Object(_) => {
                let address = self.address_of(ty, value)?;
                ptr::write_unaligned(ptr as *mut usize, address);
            }
            TypeDescriptor::CString => {
                let address = self.c_string_address(value, strings)?;
                ptr::write_unaligned(ptr as *mut usize, address);
            }
            TypeDescriptor::Struct { fields, .. } => {
                let items = aggregate_items(ty, value, fields.len())?;
                let layout = struct_layout(fields);
                for ((field, item), &offset) in fields.iter().zip(items).zip(&layout.offsets) {
                    self.write_value(field, item, ptr.add(offset), strings)?;
                }
            }
            TypeDescriptor::Array { element, count } => {
                let items = aggregate_items(ty, value, *count)?;
                let stride = element.layout().size;
                for (i, item) in items.iter().enumerate() {
                    self.write_value(element, item, ptr.add(i * stride), strings)?;
                }
            }
        }
        Ok(())
    }

    fn address_of(&self, ty: &TypeDescriptor, value: &ScriptValue) -> MarshalResult<usize> {
        match value {
            ScriptValue::Null | ScriptValue::Undefined => Ok(0),
            ScriptValue::Handle(handle) => self.handles.resolve(*handle),
            other => Err(MarshalError::IncompatibleReturn {
                expected: ty.to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }

    fn c_string_address(
        &self,
        value: &ScriptValue,
        strings: &mut Vec<CString>,
    ) -> MarshalResult<usize> {
        let s = match value {
            ScriptValue::String(s) => s,
            other => return self.address_of(&TypeDescriptor::CString, other),
        };

        let owned = CString::new(s.as_str()).map_err(|_| MarshalError::InteriorNul)?;
        // The heap buffer does not move when the CString does
        let address = owned.as_ptr() as usize;
        strings.push(owned);
        Ok(address)
    }

    /// Fill the return slot with the zero value of the declared kind.
    ///
    /// # Safety
    ///
    /// `ret` must satisfy the `dispatch` contract.
    pub unsafe fn write_default(&self, ret: *mut c_void) {
        let ty = self.signature.return_type();
        let size = match ty {
            TypeDescriptor::Void => 0,
            TypeDescriptor::Bool | TypeDescriptor::Int { .. } => {
                ty.layout().size.max(size_of::<ffi_arg>())
            }
            _ => ty.layout().size,
        };
        ptr::write_bytes(ret as *mut u8, 0, size);
    }
}

impl std::fmt::Debug for InvocationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationTarget")
            .field("encoding", &self.signature.encoding())
            .field("function", &self.function)
            .finish()
    }
}

unsafe fn write_widened<T>(ret: *mut u8, value: T) {
    ptr::write_unaligned(ret as *mut T, value);
}

fn handle_kind(kind: ObjectKind) -> HandleKind {
    match kind {
        ObjectKind::Object => HandleKind::Object,
        ObjectKind::Block => HandleKind::Block,
        ObjectKind::Class => HandleKind::Class,
        ObjectKind::Selector => HandleKind::Selector,
    }
}

fn aggregate_items<'v>(
    ty: &TypeDescriptor,
    value: &'v ScriptValue,
    expected: usize,
) -> MarshalResult<&'v [ScriptValue]> {
    let items = value.as_array().ok_or_else(|| MarshalError::IncompatibleReturn {
        expected: ty.to_string(),
        got: value.type_name().to_string(),
    })?;
    if items.len() != expected {
        return Err(MarshalError::ArityMismatch {
            expected,
            got: items.len(),
        });
    }
    Ok(items)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
