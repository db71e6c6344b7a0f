//! # Value Entity
//!
//! Purpose: The tagged sum type every key in a `Database` maps to, per
//! distilled spec §3/§9 ("the value entity is a tagged sum {String,
//! Hash, List, Set, ZSet}. Every command begins by pattern-matching the
//! tag and returning TypeError on mismatch. There is no inheritance.").

use std::collections::{HashMap, HashSet, VecDeque};

use kvault_common::KvError;

use crate::zset::SortedSet;

pub type Bytes = Vec<u8>;

/// The discriminated value kinds a key can hold.
#[derive(Debug, Clone)]
pub enum Value {
    Str(Bytes),
    Hash(HashMap<Bytes, Bytes>),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    ZSet(SortedSet),
}

/// Name used in `TYPE` replies and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Hash,
    List,
    Set,
    ZSet,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Str => "string",
            ValueKind::Hash => "hash",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::ZSet => "zset",
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Str(_) => ValueKind::Str,
            Value::Hash(_) => ValueKind::Hash,
            Value::List(_) => ValueKind::List,
            Value::Set(_) => ValueKind::Set,
            Value::ZSet(_) => ValueKind::ZSet,
        }
    }

    /// Cardinality operation every value entity exposes (distilled §3).
    pub fn cardinality(&self) -> usize {
        match self {
            Value::Str(bytes) => bytes.len(),
            Value::Hash(map) => map.len(),
            Value::List(list) => list.len(),
            Value::Set(set) => set.len(),
            Value::ZSet(zset) => zset.len(),
        }
    }

    /// Rough byte footprint used for memory accounting (key bytes are
    /// added by the caller; this covers only the value payload).
    pub fn approx_bytes(&self) -> usize {
        match self {
            Value::Str(bytes) => bytes.len(),
            Value::Hash(map) => map.iter().map(|(k, v)| k.len() + v.len()).sum(),
            Value::List(list) => list.iter().map(|v| v.len()).sum(),
            Value::Set(set) => set.iter().map(|v| v.len()).sum(),
            Value::ZSet(zset) => zset.iter().map(|(m, _)| m.len() + 8).sum(),
        }
    }

    pub fn as_str(&self) -> Result<&Bytes, KvError> {
        match self {
            Value::Str(bytes) => Ok(bytes),
            _ => Err(KvError::WrongType),
        }
    }

    pub fn as_str_mut(&mut self) -> Result<&mut Bytes, KvError> {
        match self {
            Value::Str(bytes) => Ok(bytes),
            _ => Err(KvError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<Bytes, Bytes>, KvError> {
        match self {
            Value::Hash(map) => Ok(map),
            _ => Err(KvError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<Bytes, Bytes>, KvError> {
        match self {
            Value::Hash(map) => Ok(map),
            _ => Err(KvError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, KvError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(KvError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, KvError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(KvError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&HashSet<Bytes>, KvError> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(KvError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut HashSet<Bytes>, KvError> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(KvError::WrongType),
        }
    }

    pub fn as_zset(&self) -> Result<&SortedSet, KvError> {
        match self {
            Value::ZSet(zset) => Ok(zset),
            _ => Err(KvError::WrongType),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut SortedSet, KvError> {
        match self {
            Value::ZSet(zset) => Ok(zset),
            _ => Err(KvError::WrongType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_type_access_errors() {
        let value = Value::Str(b"hi".to_vec());
        assert_eq!(value.as_hash().unwrap_err(), KvError::WrongType);
    }

    #[test]
    fn cardinality_matches_kind() {
        let mut set = HashSet::new();
        set.insert(b"a".to_vec());
        set.insert(b"b".to_vec());
        let value = Value::Set(set);
        assert_eq!(value.cardinality(), 2);
    }
}
