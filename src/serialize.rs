//! Object to bytes conversion for cache payloads and binary result sets.
//!
//! Values are encoded with bincode using a big-endian, fixed-width integer
//! configuration so the wire representation is stable across client builds.
//! The receiving side names the type it expects, either statically through
//! the generic functions or dynamically through a [`TypeRegistry`] keyed by
//! a stable wire type name.

use std::{any::Any, collections::HashMap};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
};

use crate::error::ClientError;

pub(crate) fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

pub fn to_bytes<T: Encode>(value: &T) -> Result<Vec<u8>, ClientError> {
    bincode::encode_to_vec(value, wire_config())
        .map_err(|e| ClientError::Serialization(e.to_string()))
}

pub fn from_bytes<T: Decode<()>>(bytes: &[u8]) -> Result<T, ClientError> {
    bincode::decode_from_slice(bytes, wire_config())
        .map(|(value, _)| value)
        .map_err(|e| ClientError::Deserialization(e.to_string()))
}

/// Decodes or falls back to the type's default value.
///
/// The generic database binary path swallows decode failures this way;
/// cache get/search paths must use [`from_bytes`] and propagate instead.
pub fn from_bytes_or_default<T: Decode<()> + Default>(bytes: &[u8]) -> T {
    from_bytes(bytes).unwrap_or_default()
}

type DecodeFn = fn(&[u8]) -> Result<Box<dyn Any + Send>, ClientError>;

/// Caller-injected mapping from wire type names to local decoders.
///
/// Replaces runtime type-name resolution: a payload tagged with a type name
/// (by convention, the cache collection name) is decoded by whichever
/// constructor the caller registered under that name.
#[derive(Default)]
pub struct TypeRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `name`. A later registration for the same name
    /// replaces the earlier one.
    pub fn register<T>(&mut self, name: impl Into<String>)
    where
        T: Decode<()> + Any + Send,
    {
        self.decoders.insert(name.into(), decode_erased::<T>);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    /// Decodes `bytes` as the type registered under `name`.
    pub fn decode(&self, name: &str, bytes: &[u8]) -> Result<Box<dyn Any + Send>, ClientError> {
        let decode = self.decoders.get(name).ok_or_else(|| {
            ClientError::Deserialization(format!("no type registered for '{name}'"))
        })?;
        decode(bytes)
    }
}

fn decode_erased<T>(bytes: &[u8]) -> Result<Box<dyn Any + Send>, ClientError>
where
    T: Decode<()> + Any + Send,
{
    Ok(Box::new(from_bytes::<T>(bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Encode, Decode, PartialEq, Eq, Default, Clone)]
    struct Person {
        name: String,
        age: u32,
    }

    #[test]
    fn round_trip() {
        let person = Person {
            name: "ada".into(),
            age: 36,
        };
        let bytes = to_bytes(&person).unwrap();
        assert_eq!(from_bytes::<Person>(&bytes).unwrap(), person);
    }

    #[test]
    fn decode_failure_propagates() {
        let err = from_bytes::<Person>(&[0xff; 3]).unwrap_err();
        assert!(matches!(err, ClientError::Deserialization(_)));
    }

    #[test]
    fn decode_failure_defaults_on_lenient_path() {
        let person: Person = from_bytes_or_default(&[0xff; 3]);
        assert_eq!(person, Person::default());
    }

    #[test]
    fn registry_decodes_by_name() {
        let mut registry = TypeRegistry::new();
        registry.register::<Person>("Person");
        assert!(registry.contains("Person"));

        let person = Person {
            name: "grace".into(),
            age: 45,
        };
        let bytes = to_bytes(&person).unwrap();

        let decoded = registry.decode("Person", &bytes).unwrap();
        assert_eq!(decoded.downcast_ref::<Person>().unwrap(), &person);
    }

    #[test]
    fn registry_rejects_unknown_names() {
        let registry = TypeRegistry::new();
        let err = registry.decode("Ghost", &[]).unwrap_err();
        assert!(matches!(err, ClientError::Deserialization(_)));
    }
}
