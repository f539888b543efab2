//! ScriptValue: the engine-side value model seen by the marshaller
//!
//! The scripting engine owns its real value representation. Everything the
//! bridge hands to a script function, or receives back from it, is expressed
//! in this small closed set of kinds:
//!
//! ```text
//! Undefined / Null     absent values; null pointers map here
//! Bool                 native booleans
//! Number               every native integer and float width (f64, like JS)
//! String               C strings, copied by content
//! Handle               opaque identity-preserving native pointers
//! Array                struct fields and nested fixed-size arrays
//! Object               engine-owned values the bridge never converts
//! ```

use std::fmt;

/// What a native handle points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Raw data pointer (`^T`, `^?`, decayed arrays)
    Pointer,
    /// Object reference (`@`)
    Object,
    /// Block reference (`@?`)
    Block,
    /// Class reference (`#`)
    Class,
    /// Selector (`:`)
    Selector,
}

impl HandleKind {
    /// Lowercase name used in diagnostics
    pub const fn name(&self) -> &'static str {
        match self {
            HandleKind::Pointer => "pointer",
            HandleKind::Object => "object",
            HandleKind::Block => "block",
            HandleKind::Class => "class",
            HandleKind::Selector => "selector",
        }
    }
}

/// Opaque script-side stand-in for a native pointer.
///
/// Handles are issued by the bridge's handle table. Two handles compare equal
/// iff they stand for the same native address. `kind` records how the
/// pointer was declared where this handle was produced and takes no part in
/// equality or hashing.
#[derive(Debug, Clone, Copy)]
pub struct NativeHandle {
    id: u64,
    kind: HandleKind,
}

impl PartialEq for NativeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NativeHandle {}

impl std::hash::Hash for NativeHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl NativeHandle {
    /// Create a handle from a table-issued id (the native address)
    pub const fn new(id: u64, kind: HandleKind) -> Self {
        Self { id, kind }
    }

    /// Table id
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Pointee kind
    pub const fn kind(&self) -> HandleKind {
        self.kind
    }
}

/// Reference to an engine-owned value (plain script objects, functions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub u64);

/// A value in the script engine's domain.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// String value (owned copy)
    String(String),
    /// Opaque native pointer
    Handle(NativeHandle),
    /// Ordered list of values
    Array(Vec<ScriptValue>),
    /// Engine-owned object
    Object(ObjectRef),
}

impl ScriptValue {
    /// Check for `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Null | ScriptValue::Undefined)
    }

    /// Extract a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow string contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract a native handle
    pub fn as_handle(&self) -> Option<NativeHandle> {
        match self {
            ScriptValue::Handle(h) => Some(*h),
            _ => None,
        }
    }

    /// Borrow array elements
    pub fn as_array(&self) -> Option<&[ScriptValue]> {
        match self {
            ScriptValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Handle(_) => "handle",
            ScriptValue::Array(_) => "array",
            ScriptValue::Object(_) => "object",
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => write!(f, "undefined"),
            ScriptValue::Null => write!(f, "null"),
            ScriptValue::Bool(b) => write!(f, "{}", b),
            ScriptValue::Number(n) => write!(f, "{}", n),
            ScriptValue::String(s) => write!(f, "\"{}\"", s),
            ScriptValue::Handle(h) => write!(f, "Handle({}, {})", h.kind().name(), h.id()),
            ScriptValue::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            ScriptValue::Object(obj) => write!(f, "Object({})", obj.0),
        }
    }
}
