//! Trampoline builder
//!
//! Turns a `TypeSignature` into a libffi closure: an executable entry point
//! with exactly the declared native calling convention. Every trampoline
//! shares one generic `extern "C"` body, `dispatch_entry`, which receives
//! its `InvocationTarget` as closure userdata.

use std::ffi::{c_void, CString};
use std::sync::Arc;

use libffi::low::{self, CodePtr};
use libffi::middle::{Cif, Type};
use libffi::raw::{self, ffi_cif, ffi_closure};
use tracing::debug;

use crate::block::{BlockDescriptor, BlockLiteral};
use crate::encoding::{ObjectKind, TypeDescriptor};
use crate::error::{SignatureError, SignatureResult};
use crate::marshal::InvocationTarget;
use crate::options::BridgeOptions;

/// A native-callable entry point bound to one `InvocationTarget`.
///
/// The closure, its call interface and the block literal are all freed when
/// the trampoline is dropped; native code must not call it afterwards.
pub struct Trampoline {
    closure: *mut ffi_closure,
    code: CodePtr,
    cif: Box<Cif>,
    target: Arc<InvocationTarget>,
    block: Option<BlockParts>,
}

struct BlockParts {
    literal: Box<BlockLiteral>,
    // Referenced by `literal`
    _descriptor: Box<BlockDescriptor>,
    _encoding: CString,
}

// SAFETY: the closure and CIF are immutable after `build`, and the block
// literal only points at data owned by this struct. Invocation goes through
// `InvocationTarget`, which is `Send + Sync`.
unsafe impl Send for Trampoline {}
unsafe impl Sync for Trampoline {}

impl Trampoline {
    /// Build a trampoline for `target`'s signature.
    pub fn build(target: Arc<InvocationTarget>, options: &BridgeOptions) -> SignatureResult<Self> {
        let signature = Arc::clone(target.signature());

        if signature.is_variadic() {
            return Err(SignatureError::Variadic);
        }
        let limit = options.argument_limit();
        if signature.argument_count() > limit {
            return Err(SignatureError::TooManyArguments {
                count: signature.argument_count(),
                limit,
            });
        }
        if let TypeDescriptor::Array { .. } = signature.return_type() {
            return Err(SignatureError::Unsupported {
                detail: "array return type".to_string(),
            });
        }
        for argument in signature.arguments() {
            reject_void(argument)?;
        }
        if let TypeDescriptor::Struct { fields, .. } = signature.return_type() {
            fields.iter().try_for_each(reject_void)?;
        }

        let arguments: Vec<Type> = signature.arguments().iter().map(argument_type).collect();
        let cif = Box::new(Cif::new(arguments, return_type(signature.return_type())));

        let (closure, code) = low::closure_alloc();
        if closure.is_null() {
            return Err(SignatureError::Closure {
                detail: "closure allocation failed".to_string(),
            });
        }

        // SAFETY: `cif` is boxed and `target` is reference counted; both are
        // owned by the returned trampoline and outlive the closure.
        let prepared = unsafe {
            low::prep_closure(
                closure,
                cif.as_raw_ptr(),
                dispatch_entry,
                Arc::as_ptr(&target),
                code,
            )
        };
        if let Err(err) = prepared {
            unsafe { low::closure_free(closure) };
            return Err(SignatureError::Closure {
                detail: format!("{err:?}"),
            });
        }

        let mut trampoline = Self {
            closure,
            code,
            cif,
            target,
            block: None,
        };
        if let Some(TypeDescriptor::Object(ObjectKind::Block)) = signature.arguments().first() {
            trampoline.block = Some(BlockParts::new(signature.encoding(), trampoline.code_ptr())?);
        }

        debug!(
            target: "scriptblock::trampoline",
            encoding = signature.encoding(),
            arguments = signature.argument_count(),
            block = trampoline.block.is_some(),
            "built trampoline"
        );
        Ok(trampoline)
    }

    /// Executable entry point
    pub fn code_ptr(&self) -> *const c_void {
        self.code.as_ptr() as *const c_void
    }

    /// Reinterpret the entry point as a typed function pointer.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C" fn` type matching the signature exactly,
    /// and must not be called after the trampoline is dropped.
    pub unsafe fn as_fn<F: Copy>(&self) -> F {
        debug_assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*const c_void>(),
            "function pointer type expected"
        );
        std::mem::transmute_copy(&self.code_ptr())
    }

    /// Block literal wrapping this trampoline.
    ///
    /// Only available when the first argument is the block itself (`@?`).
    pub fn block(&self) -> Option<&BlockLiteral> {
        self.block.as_ref().map(|parts| &*parts.literal)
    }

    /// The target invoked by this trampoline
    pub fn target(&self) -> &Arc<InvocationTarget> {
        &self.target
    }

    /// Call the trampoline through its own call interface.
    ///
    /// # Safety
    ///
    /// `args` must hold one pointer per native argument, each pointing at a
    /// value of the declared type. `ret` must be large enough for the return
    /// type (at least `ffi_arg` for integers).
    pub unsafe fn call_raw(&self, args: &mut [*mut c_void], ret: *mut c_void) {
        debug_assert_eq!(args.len(), self.target.signature().argument_count());
        raw::ffi_call(
            self.cif.as_raw_ptr(),
            Some(*self.code.as_safe_fun()),
            ret,
            args.as_mut_ptr(),
        );
    }
}

impl Drop for Trampoline {
    fn drop(&mut self) {
        // SAFETY: allocated by `closure_alloc` in `build` and freed only here.
        unsafe { low::closure_free(self.closure) };
    }
}

impl std::fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trampoline")
            .field("encoding", &self.target.signature().encoding())
            .field("code", &self.code_ptr())
            .field("block", &self.block.is_some())
            .finish()
    }
}

impl BlockParts {
    fn new(encoding: &str, invoke: *const c_void) -> SignatureResult<Self> {
        let encoding = CString::new(encoding).map_err(|_| SignatureError::Unsupported {
            detail: "encoding contains a NUL byte".to_string(),
        })?;
        let descriptor = Box::new(BlockDescriptor::new(&encoding));
        let literal = Box::new(BlockLiteral::new(invoke, &*descriptor));
        Ok(Self {
            literal,
            _descriptor: descriptor,
            _encoding: encoding,
        })
    }
}

unsafe extern "C" fn dispatch_entry(
    cif: &ffi_cif,
    result: &mut c_void,
    args: *const *const c_void,
    target: &InvocationTarget,
) {
    let count = cif.nargs as usize;
    let args = if count == 0 || args.is_null() {
        &[][..]
    } else {
        std::slice::from_raw_parts(args, count)
    };
    target.dispatch(args, result as *mut c_void);
}

/// `void` only makes sense as a return type or behind a pointer.
fn reject_void(ty: &TypeDescriptor) -> SignatureResult<()> {
    match ty {
        TypeDescriptor::Void => Err(SignatureError::Unsupported {
            detail: "void argument or field".to_string(),
        }),
        TypeDescriptor::Struct { fields, .. } => fields.iter().try_for_each(reject_void),
        TypeDescriptor::Array { element, .. } => reject_void(element),
        _ => Ok(()),
    }
}

/// libffi type for a value stored in memory (struct fields, array elements)
fn field_type(ty: &TypeDescriptor) -> Type {
    match ty {
        TypeDescriptor::Void => Type::void(),
        TypeDescriptor::Bool => Type::u8(),
        TypeDescriptor::Int { bits, signed } => match (bits, signed) {
            (8, true) => Type::i8(),
            (8, false) => Type::u8(),
            (16, true) => Type::i16(),
            (16, false) => Type::u16(),
            (32, true) => Type::i32(),
            (32, false) => Type::u32(),
            (_, true) => Type::i64(),
            (_, false) => Type::u64(),
        },
        TypeDescriptor::Float { bits: 32 } => Type::f32(),
        TypeDescriptor::Float { .. } => Type::f64(),
        TypeDescriptor::Pointer(_) | TypeDescriptor::Object(_) | TypeDescriptor::CString => {
            Type::pointer()
        }
        TypeDescriptor::Struct { fields, .. } => {
            let mut members = Vec::with_capacity(fields.len());
            for field in fields {
                match field {
                    TypeDescriptor::Array { element, count } => {
                        let element = field_type(element);
                        members.extend(std::iter::repeat(element).take(*count));
                    }
                    other => members.push(field_type(other)),
                }
            }
            Type::structure(members)
        }
        // Only reachable for arrays nested in arrays; flatten the same way
        TypeDescriptor::Array { element, count } => {
            Type::structure(std::iter::repeat(field_type(element)).take(*count).collect::<Vec<_>>())
        }
    }
}

/// Top-level argument: arrays decay to pointers
fn argument_type(ty: &TypeDescriptor) -> Type {
    match ty {
        TypeDescriptor::Array { .. } => Type::pointer(),
        other => field_type(other),
    }
}

fn return_type(ty: &TypeDescriptor) -> Type {
    field_type(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::parse;
    use crate::handles::HandleTable;
    use crate::report::Reporter;
    use scriptblock_sdk::{ScriptFunctionHandle, ScriptValue};

    fn build(encoding: &str, options: &BridgeOptions) -> SignatureResult<Trampoline> {
        let target = InvocationTarget::new(
            Arc::new(parse(encoding).unwrap()),
            ScriptFunctionHandle::from_fn(|args| {
                let sum: f64 = args.iter().filter_map(ScriptValue::as_number).sum();
                Ok(ScriptValue::Number(sum))
            }),
            Arc::new(HandleTable::new()),
            Reporter::new(4),
        );
        Trampoline::build(Arc::new(target), options)
    }

    #[test]
    fn test_call_through_fn_pointer() {
        let trampoline = build("q@?qq", &BridgeOptions::default()).unwrap();
        let f: extern "C" fn(*const c_void, i64, i64) -> i64 = unsafe { trampoline.as_fn() };
        assert_eq!(f(std::ptr::null(), 40, 2), 42);
    }

    #[test]
    fn test_call_raw() {
        let trampoline = build("did", &BridgeOptions::default()).unwrap();
        let mut a: i32 = 3;
        let mut b: f64 = 0.25;
        let mut args = [
            &mut a as *mut i32 as *mut c_void,
            &mut b as *mut f64 as *mut c_void,
        ];
        let mut ret: f64 = 0.0;
        unsafe { trampoline.call_raw(&mut args, &mut ret as *mut f64 as *mut c_void) };
        assert_eq!(ret, 3.25);
    }

    #[test]
    fn test_rejects_variadic_and_array_return() {
        let options = BridgeOptions::default();
        assert!(matches!(build("i*...", &options), Err(SignatureError::Variadic)));
        assert!(matches!(
            build("[4i]@?", &options),
            Err(SignatureError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_argument_limit() {
        let encoding = format!("v{}", "i".repeat(65));
        assert!(matches!(
            build(&encoding, &BridgeOptions::default()),
            Err(SignatureError::TooManyArguments {
                count: 65,
                limit: 64
            })
        ));

        let options = BridgeOptions::default().max_arguments(2);
        assert!(build("vii", &options).is_ok());
        assert!(matches!(
            build("viii", &options),
            Err(SignatureError::TooManyArguments { count: 3, limit: 2 })
        ));
    }

    #[test]
    fn test_zero_arguments() {
        let trampoline = build("i", &BridgeOptions::default()).unwrap();
        let f: extern "C" fn() -> i32 = unsafe { trampoline.as_fn() };
        assert_eq!(f(), 0);
    }

    #[test]
    fn test_block_only_for_block_signatures() {
        let options = BridgeOptions::default();
        let block = build("v@?i", &options).unwrap();
        let literal = block.block().unwrap();
        assert_eq!(literal.invoke, block.code_ptr());

        let method = build("v@:i", &options).unwrap();
        assert!(method.block().is_none());
    }

    #[test]
    fn test_struct_with_nested_array_builds() {
        let options = BridgeOptions::default();
        assert!(build("{S=c[3i]}@?{S=c[3i]}[2d]", &options).is_ok());
    }

    #[test]
    fn test_rejects_void_arguments() {
        let options = BridgeOptions::default();
        assert!(matches!(build("iv", &options), Err(SignatureError::Unsupported { .. })));
        assert!(matches!(
            build("{S=iv}", &options),
            Err(SignatureError::Unsupported { .. })
        ));
        assert!(build("v^v", &options).is_ok());
    }
}
