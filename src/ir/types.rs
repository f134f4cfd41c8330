//! Types carried by values in the circuit graph.

/// A named field of a struct type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

/// The type of a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// A bit vector of the given width.
    Bits(u32),
    /// A mutable storage handle (wire, register, or local variable). Reads
    /// of storage produce the inner type; assignments drive it.
    Storage(Box<Type>),
    /// An aggregate with named fields.
    Struct(Vec<StructField>),
}

impl Type {
    pub fn storage_of(inner: Type) -> Type {
        Type::Storage(Box::new(inner))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Type::Storage(_))
    }

    /// The type produced by reading this storage handle.
    pub fn storage_inner(&self) -> Option<&Type> {
        match self {
            Type::Storage(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn struct_fields(&self) -> Option<&[StructField]> {
        match self {
            Type::Struct(fields) => Some(fields),
            _ => None,
        }
    }
}
