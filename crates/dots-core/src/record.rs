//! Data record capability contract
//!
//! Every piece of data exchanged between calculation services is a *data
//! class*: a concrete Rust type with a canonical name, a canonical main topic
//! and a binary codec. The core never inspects record contents; it only needs
//! the contract below.
//!
//! Two views exist:
//!
//! - [`DataClass`] is the static contract implemented by concrete types.
//! - [`Record`] is its object-safe counterpart, used wherever records of
//!   different classes share a container (the inventory's received table,
//!   calculation outputs). Concrete values are recovered with
//!   [`downcast_ref`](trait.Record.html#method.downcast_ref).
//!
//! [`ClassDescriptor`] is the registration entry a calculation module lists
//! for each input it waits on. It carries the decode function so the
//! inventory can materialize records without knowing their types.

use crate::errors::{DotsError, DotsResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Static contract implemented by concrete data classes
pub trait DataClass: Any + Send + Sync + fmt::Debug + Sized {
    /// Canonical class name, also the last segment of its data topic
    const NAME: &'static str;

    /// Canonical main topic, e.g. `/data/input_service/model`
    const MAIN_TOPIC: &'static str;

    /// Encode this record into a binary payload
    fn encode(&self) -> DotsResult<Vec<u8>>;

    /// Decode a record from a non-empty binary payload
    fn decode(payload: &[u8]) -> DotsResult<Self>;

    /// Human readable description of the record's variables
    fn variable_description() -> &'static str {
        ""
    }
}

/// Object-safe view of a data record
pub trait Record: Any + Send + Sync + fmt::Debug {
    /// Canonical class name
    fn class_name(&self) -> &'static str;

    /// Canonical main topic
    fn main_topic(&self) -> &'static str;

    /// Encode into a binary payload
    fn to_payload(&self) -> DotsResult<Vec<u8>>;

    /// Access as `Any` for downcasting
    fn as_any(&self) -> &dyn Any;
}

impl<T: DataClass> Record for T {
    fn class_name(&self) -> &'static str {
        T::NAME
    }

    fn main_topic(&self) -> &'static str {
        T::MAIN_TOPIC
    }

    fn to_payload(&self) -> DotsResult<Vec<u8>> {
        self.encode()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Record {
    /// Downcast to a concrete data class
    pub fn downcast_ref<T: DataClass>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Check whether this record is of class `T`
    pub fn is<T: DataClass>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

type DecodeFn = fn(&[u8]) -> DotsResult<Arc<dyn Record>>;

/// Registration entry describing one input class of a calculation
#[derive(Clone, Copy)]
pub struct ClassDescriptor {
    name: &'static str,
    main_topic: &'static str,
    decode: DecodeFn,
}

impl ClassDescriptor {
    /// Describe data class `T`
    ///
    /// An empty payload materializes `T::default()` without decoding.
    pub fn of<T: DataClass + Default>() -> Self {
        Self {
            name: T::NAME,
            main_topic: T::MAIN_TOPIC,
            decode: decode_record::<T>,
        }
    }

    /// Canonical class name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Canonical main topic
    pub fn main_topic(&self) -> &'static str {
        self.main_topic
    }

    /// Materialize a record from a payload
    pub fn instantiate(&self, payload: &[u8]) -> DotsResult<Arc<dyn Record>> {
        (self.decode)(payload)
    }

    /// Check whether this descriptor describes class `T`
    pub fn describes<T: DataClass>(&self) -> bool {
        self.name == T::NAME && self.main_topic == T::MAIN_TOPIC
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("main_topic", &self.main_topic)
            .finish()
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.main_topic == other.main_topic
    }
}

impl Eq for ClassDescriptor {}

fn decode_record<T: DataClass + Default>(payload: &[u8]) -> DotsResult<Arc<dyn Record>> {
    if payload.is_empty() {
        return Ok(Arc::new(T::default()));
    }
    Ok(Arc::new(T::decode(payload)?))
}

/// Encode a serializable value as a JSON payload
pub fn encode_json<T: Serialize>(class: &str, value: &T) -> DotsResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| DotsError::codec(class, e))
}

/// Decode a JSON payload
pub fn decode_json<T: DeserializeOwned>(class: &str, payload: &[u8]) -> DotsResult<T> {
    serde_json::from_slice(payload).map_err(|e| DotsError::codec(class, e))
}
