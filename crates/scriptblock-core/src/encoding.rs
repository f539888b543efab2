//! Type-signature encoding parser
//!
//! Parses the compact block/method type encoding used by the host runtime:
//! one character (or bracketed group) per type, return type first.
//!
//! ```text
//! "i@:i"            int (id self, SEL _cmd, int)
//! "v@?*"            void (^)(const char *)
//! "{CGPoint=dd}@?"  CGPoint (^)(void)
//! "v@?^{S=i[4c]}"   void (^)(struct S *)
//! ```
//!
//! Qualifiers (`r n N o O R V A`) are skipped, as are the frame offsets the
//! runtime appends after each top-level type (`i16@0:8i12`). Unions,
//! bitfields and `long double` are rejected instead of being guessed at, as
//! are types nested deeper than `MAX_NESTING_DEPTH` or larger than
//! `MAX_TYPE_SIZE` bytes.

use std::fmt;

use serde::Serialize;

use crate::error::{SignatureError, SignatureResult};

/// Deepest pointer/struct/array nesting a signature may use
pub const MAX_NESTING_DEPTH: usize = 64;

/// Largest struct or array, in bytes, a signature may describe
pub const MAX_TYPE_SIZE: usize = 64 * 1024;

/// Flavor of an object-reference token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// `@`
    Object,
    /// `@?`
    Block,
    /// `#`
    Class,
    /// `:`
    Selector,
}

/// One native type in a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDescriptor {
    /// No value
    Void,
    /// C99 `_Bool`
    Bool,
    /// Fixed-width integer
    Int {
        /// Width in bits (8, 16, 32, 64)
        bits: u8,
        /// Signedness
        signed: bool,
    },
    /// IEEE float
    Float {
        /// Width in bits (32, 64)
        bits: u8,
    },
    /// Data pointer; `None` when the pointee is unknown (`^?`)
    Pointer(Option<Box<TypeDescriptor>>),
    /// Object, block, class or selector reference
    Object(ObjectKind),
    /// NUL-terminated `char *`
    CString,
    /// Struct with ordered fields
    Struct {
        /// Tag name, if not anonymous
        name: Option<String>,
        /// Field types in declaration order
        fields: Vec<TypeDescriptor>,
    },
    /// Fixed-size array
    Array {
        /// Element type
        element: Box<TypeDescriptor>,
        /// Element count
        count: usize,
    },
}

impl TypeDescriptor {
    /// Signed integer of the given width
    pub const fn int(bits: u8) -> Self {
        TypeDescriptor::Int { bits, signed: true }
    }

    /// Unsigned integer of the given width
    pub const fn uint(bits: u8) -> Self {
        TypeDescriptor::Int { bits, signed: false }
    }

    /// Whether this type is void
    pub fn is_void(&self) -> bool {
        matches!(self, TypeDescriptor::Void)
    }

    /// Whether this is a struct or array
    pub fn is_aggregate(&self) -> bool {
        matches!(self, TypeDescriptor::Struct { .. } | TypeDescriptor::Array { .. })
    }

    /// Canonical encoding of this type.
    ///
    /// Re-parsing the result yields an equal descriptor. `l`/`L` come back
    /// as `i`/`I` since they describe the same 32-bit kind.
    pub fn to_encoding(&self) -> String {
        let mut out = String::new();
        self.write_encoding(&mut out);
        out
    }

    fn write_encoding(&self, out: &mut String) {
        match self {
            TypeDescriptor::Void => out.push('v'),
            TypeDescriptor::Bool => out.push('B'),
            TypeDescriptor::Int { bits, signed } => out.push(match (bits, signed) {
                (8, true) => 'c',
                (8, false) => 'C',
                (16, true) => 's',
                (16, false) => 'S',
                (32, true) => 'i',
                (32, false) => 'I',
                (_, true) => 'q',
                (_, false) => 'Q',
            }),
            TypeDescriptor::Float { bits } => out.push(if *bits == 32 { 'f' } else { 'd' }),
            TypeDescriptor::Pointer(None) => out.push_str("^?"),
            TypeDescriptor::Pointer(Some(inner)) => {
                out.push('^');
                inner.write_encoding(out);
            }
            TypeDescriptor::Object(kind) => out.push_str(match kind {
                ObjectKind::Object => "@",
                ObjectKind::Block => "@?",
                ObjectKind::Class => "#",
                ObjectKind::Selector => ":",
            }),
            TypeDescriptor::CString => out.push('*'),
            TypeDescriptor::Struct { name, fields } => {
                out.push('{');
                out.push_str(name.as_deref().unwrap_or("?"));
                out.push('=');
                for field in fields {
                    field.write_encoding(out);
                }
                out.push('}');
            }
            TypeDescriptor::Array { element, count } => {
                out.push('[');
                out.push_str(&count.to_string());
                element.write_encoding(out);
                out.push(']');
            }
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Void => write!(f, "void"),
            TypeDescriptor::Bool => write!(f, "bool"),
            TypeDescriptor::Int { bits, signed: true } => write!(f, "int{bits}_t"),
            TypeDescriptor::Int { bits, signed: false } => write!(f, "uint{bits}_t"),
            TypeDescriptor::Float { bits: 32 } => write!(f, "float"),
            TypeDescriptor::Float { .. } => write!(f, "double"),
            TypeDescriptor::Pointer(None) => write!(f, "void*"),
            TypeDescriptor::Pointer(Some(inner)) => write!(f, "{inner}*"),
            TypeDescriptor::Object(ObjectKind::Object) => write!(f, "id"),
            TypeDescriptor::Object(ObjectKind::Block) => write!(f, "block"),
            TypeDescriptor::Object(ObjectKind::Class) => write!(f, "Class"),
            TypeDescriptor::Object(ObjectKind::Selector) => write!(f, "SEL"),
            TypeDescriptor::CString => write!(f, "char*"),
            TypeDescriptor::Struct { name, fields } => {
                write!(f, "struct {} {{", name.as_deref().unwrap_or("?"))?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {field}")?;
                }
                write!(f, " }}")
            }
            TypeDescriptor::Array { element, count } => write!(f, "{element}[{count}]"),
        }
    }
}

/// Parsed, immutable calling signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeSignature {
    encoding: String,
    descriptors: Vec<TypeDescriptor>,
    variadic: bool,
    implicit_arguments: usize,
}

impl TypeSignature {
    /// Parse an encoding string (uncached; see `SignatureCache`)
    pub fn parse(encoding: &str) -> SignatureResult<Self> {
        parse(encoding)
    }

    /// The exact encoding this signature was parsed from
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// All descriptors, return type first
    pub fn descriptors(&self) -> &[TypeDescriptor] {
        &self.descriptors
    }

    /// Return type
    pub fn return_type(&self) -> &TypeDescriptor {
        &self.descriptors[0]
    }

    /// Argument types in call order (including implicit receiver slots)
    pub fn arguments(&self) -> &[TypeDescriptor] {
        &self.descriptors[1..]
    }

    /// Number of native arguments
    pub fn argument_count(&self) -> usize {
        self.descriptors.len() - 1
    }

    /// Leading receiver arguments that are not forwarded to the script
    pub fn implicit_arguments(&self) -> usize {
        self.implicit_arguments
    }

    /// Arguments that are forwarded to the script
    pub fn script_arguments(&self) -> &[TypeDescriptor] {
        &self.arguments()[self.implicit_arguments..]
    }

    /// Whether the encoding ended with the variadic marker
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Canonical re-derivation of the encoding (no offsets, no qualifiers)
    pub fn canonical_encoding(&self) -> String {
        let mut out: String = self.descriptors.iter().map(TypeDescriptor::to_encoding).collect();
        if self.variadic {
            out.push_str("...");
        }
        out
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.return_type())?;
        for (i, arg) in self.arguments().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        if self.variadic {
            if self.argument_count() > 0 {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

/// Parse an encoding string into a signature.
pub fn parse(encoding: &str) -> SignatureResult<TypeSignature> {
    if encoding.is_empty() {
        return Err(SignatureError::Empty);
    }

    let mut parser = Parser::new(encoding);
    let mut descriptors = Vec::new();
    let mut variadic = false;

    while !parser.at_end() {
        if parser.rest().starts_with("...") {
            parser.pos += 3;
            if !parser.at_end() {
                return Err(parser.unknown_token(parser.pos));
            }
            variadic = true;
            break;
        }
        descriptors.push(parser.parse_type()?);
        parser.skip_frame_offset();
    }

    if descriptors.is_empty() {
        return Err(SignatureError::Empty);
    }

    let implicit_arguments = implicit_argument_count(&descriptors[1..]);

    Ok(TypeSignature {
        encoding: encoding.to_string(),
        descriptors,
        variadic,
        implicit_arguments,
    })
}

/// Count leading receiver slots: block self (`@?`) or receiver + selector (`@:`).
fn implicit_argument_count(args: &[TypeDescriptor]) -> usize {
    match args {
        [TypeDescriptor::Object(ObjectKind::Block), ..] => 1,
        [TypeDescriptor::Object(ObjectKind::Object), TypeDescriptor::Object(ObjectKind::Selector), ..] => 2,
        _ => 0,
    }
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn unknown_token(&self, position: usize) -> SignatureError {
        let token = self.src[position..]
            .chars()
            .next()
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        SignatureError::UnknownToken { token, position }
    }

    fn unbalanced(detail: impl Into<String>, position: usize) -> SignatureError {
        SignatureError::Unbalanced {
            detail: detail.into(),
            position,
        }
    }

    fn unsupported(detail: impl Into<String>) -> SignatureError {
        SignatureError::Unsupported {
            detail: detail.into(),
        }
    }

    fn skip_qualifiers(&mut self) {
        while let Some(b'r' | b'n' | b'N' | b'o' | b'O' | b'R' | b'V' | b'A') = self.peek() {
            self.pos += 1;
        }
    }

    /// Frame offsets follow each top-level type in method encodings.
    fn skip_frame_offset(&mut self) {
        if self.peek() == Some(b'-')
            && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit)
        {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    /// Skip a `"..."` run (class annotations, struct field names).
    fn skip_quoted(&mut self) -> SignatureResult<()> {
        let start = self.pos;
        self.pos += 1;
        while let Some(b) = self.bump() {
            if b == b'"' {
                return Ok(());
            }
        }
        Err(Self::unbalanced("unterminated quoted name", start))
    }

    fn parse_type(&mut self) -> SignatureResult<TypeDescriptor> {
        if self.depth == MAX_NESTING_DEPTH {
            return Err(Self::unsupported(format!(
                "type nested deeper than {MAX_NESTING_DEPTH} levels at position {}",
                self.pos
            )));
        }
        self.depth += 1;
        let ty = self.parse_single_type();
        self.depth -= 1;
        ty
    }

    fn parse_single_type(&mut self) -> SignatureResult<TypeDescriptor> {
        self.skip_qualifiers();
        let start = self.pos;
        let Some(b) = self.bump() else {
            return Err(Self::unbalanced("expected a type", start));
        };

        let ty = match b {
            b'v' => TypeDescriptor::Void,
            b'B' => TypeDescriptor::Bool,
            b'c' => TypeDescriptor::int(8),
            b'C' => TypeDescriptor::uint(8),
            b's' => TypeDescriptor::int(16),
            b'S' => TypeDescriptor::uint(16),
            b'i' | b'l' => TypeDescriptor::int(32),
            b'I' | b'L' => TypeDescriptor::uint(32),
            b'q' => TypeDescriptor::int(64),
            b'Q' => TypeDescriptor::uint(64),
            b'f' => TypeDescriptor::Float { bits: 32 },
            b'd' => TypeDescriptor::Float { bits: 64 },
            b'*' => TypeDescriptor::CString,
            b'#' => TypeDescriptor::Object(ObjectKind::Class),
            b':' => TypeDescriptor::Object(ObjectKind::Selector),
            b'@' => match self.peek() {
                Some(b'?') => {
                    self.pos += 1;
                    TypeDescriptor::Object(ObjectKind::Block)
                }
                Some(b'"') => {
                    self.skip_quoted()?;
                    TypeDescriptor::Object(ObjectKind::Object)
                }
                _ => TypeDescriptor::Object(ObjectKind::Object),
            },
            b'^' => {
                if self.peek() == Some(b'?') {
                    self.pos += 1;
                    TypeDescriptor::Pointer(None)
                } else {
                    TypeDescriptor::Pointer(Some(Box::new(self.parse_type()?)))
                }
            }
            b'{' => self.parse_struct(start).and_then(|ty| Self::check_size(ty, start))?,
            b'[' => self.parse_array(start).and_then(|ty| Self::check_size(ty, start))?,
            b'}' | b']' | b')' => {
                return Err(Self::unbalanced(
                    format!("unexpected '{}'", b as char),
                    start,
                ))
            }
            b'D' => return Err(Self::unsupported("long double ('D')")),
            b'(' => return Err(Self::unsupported("unions ('(')")),
            b'b' => return Err(Self::unsupported("bitfields ('b')")),
            b'?' => return Err(Self::unsupported("unknown type ('?')")),
            _ => return Err(self.unknown_token(start)),
        };

        Ok(ty)
    }

    /// Aggregates must have a representable size within `MAX_TYPE_SIZE`.
    fn check_size(ty: TypeDescriptor, start: usize) -> SignatureResult<TypeDescriptor> {
        match ty.checked_layout() {
            Some(layout) if layout.size <= MAX_TYPE_SIZE => Ok(ty),
            _ => Err(Self::unsupported(format!(
                "aggregate at position {start} is larger than {MAX_TYPE_SIZE} bytes"
            ))),
        }
    }

    /// `{name=fields}`; the opening brace is already consumed.
    fn parse_struct(&mut self, start: usize) -> SignatureResult<TypeDescriptor> {
        let name_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(Self::unbalanced("unterminated struct", start)),
                Some(b'=') | Some(b'}') => break,
                Some(b'{') | Some(b'[') | Some(b'(') => {
                    return Err(Self::unbalanced("expected '=' after struct name", start))
                }
                Some(_) => self.pos += 1,
            }
        }
        let name = match &self.src[name_start..self.pos] {
            "" | "?" => None,
            other => Some(other.to_string()),
        };

        if self.bump() == Some(b'}') {
            return Err(Self::unsupported(format!(
                "opaque struct '{}' has no field list",
                name.as_deref().unwrap_or("?")
            )));
        }

        let mut fields = Vec::new();
        loop {
            match self.peek() {
                None => return Err(Self::unbalanced("unterminated struct", start)),
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(b'"') => self.skip_quoted()?,
                Some(_) => fields.push(self.parse_type()?),
            }
        }

        if fields.is_empty() {
            return Err(Self::unsupported(format!(
                "struct '{}' has no fields",
                name.as_deref().unwrap_or("?")
            )));
        }

        Ok(TypeDescriptor::Struct { name, fields })
    }

    /// `[countType]`; the opening bracket is already consumed.
    fn parse_array(&mut self, start: usize) -> SignatureResult<TypeDescriptor> {
        let digits_start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(Self::unbalanced("array without element count", start));
        }
        let count: usize = self.src[digits_start..self.pos]
            .parse()
            .map_err(|_| Self::unsupported("array element count overflows"))?;
        if count == 0 {
            return Err(Self::unsupported("zero-length array"));
        }

        if self.at_end() {
            return Err(Self::unbalanced("unterminated array", start));
        }
        let element = self.parse_type()?;

        match self.bump() {
            Some(b']') => Ok(TypeDescriptor::Array {
                element: Box::new(element),
                count,
            }),
            _ => Err(Self::unbalanced("unterminated array", start)),
        }
    }
}
