//! The dynamic value model the graph codec reconstructs into.
//!
//! With no reflection in the language, decode cannot allocate arbitrary
//! user structs; it rebuilds a dynamic [`Value`] tree instead, and host
//! instantiation maps values onto live objects outside the core. Object
//! instances are `Rc`-shared so a deduplicated or pointer-referenced
//! instance resolves to the same underlying allocation everywhere it
//! appears.

use std::cell::RefCell;
use std::rc::Rc;

/// A dynamically typed value produced by encode input or decode output.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Not (yet) set. Fields whose type name cannot be resolved, or whose
    /// backing category was masked out, stay unset.
    Unset,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw byte buffer.
    Bytes(Vec<u8>),
    /// Ordered collection of values.
    List(Vec<Value>),
    /// A shared class instance.
    Object(Rc<RefCell<Instance>>),
}

impl Value {
    /// Whether the value is still unset.
    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset)
    }

    /// Wraps an instance into a shared object value.
    pub fn object(instance: Instance) -> Self {
        Value::Object(Rc::new(RefCell::new(instance)))
    }

    /// The inner instance handle, if this is an object.
    pub fn as_object(&self) -> Option<&Rc<RefCell<Instance>>> {
        match self {
            Value::Object(rc) => Some(rc),
            _ => None,
        }
    }

    /// The inner i32, if that is what this holds.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// The inner string slice, if that is what this holds.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// The inner list, if that is what this holds.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Unset
    }
}

/// A class instance: a qualified type name plus named field slots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instance {
    /// Qualified type name used to resolve the descriptor at decode time.
    pub type_name: String,
    /// Stable external identity (e.g. an asset path) enabling shared-
    /// object deduplication. `None` for plain by-value instances.
    pub identity: Option<String>,
    /// Named fields in declaration order.
    pub fields: Vec<(String, Value)>,
}

impl Instance {
    /// Creates an empty instance of `type_name`.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            identity: None,
            fields: Vec::new(),
        }
    }

    /// Attaches a dedup identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Adds or overwrites a field by name.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style field setter.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}
