//! The persistable entity protocol.

use std::any::Any;
use std::fmt;

use crate::error::{DecodeError, Result, StoreError};

/// Type-erasure helpers every [`KvObject`] gets for free.
///
/// Call these on `&dyn KvObject` / `&mut dyn KvObject`, never on a
/// `Box<dyn KvObject>` (the box itself is `Any` too); use [`AsAny::into_any`]
/// to unwrap a box.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A record the [`ObjectStore`](crate::ObjectStore) can persist without
/// knowing its concrete type.
pub trait KvObject: AsAny + fmt::Debug {
    /// Stable name of the record kind, used in diagnostics.
    fn kind(&self) -> &'static str;

    /// Key components of this instance (kind prefix + identifier).
    fn key(&self) -> Vec<String>;

    /// Key components shared by every instance of this kind.
    fn key_prefix(&self) -> Vec<String>;

    /// Serialize the full state of the record.
    fn value(&self) -> Result<Vec<u8>>;

    /// Replace the state of the record with a decoded payload.
    fn set_value(&mut self, value: &[u8]) -> std::result::Result<(), DecodeError>;

    /// Version stamp of the last read or write.
    fn index(&self) -> u64;

    /// Record a new version stamp. Also marks the record as persisted.
    fn set_index(&mut self, index: u64);

    /// True once the record has been written (or read) at least once.
    fn exists(&self) -> bool;

    /// Opt out of persistence entirely.
    fn skip(&self) -> bool {
        false
    }

    /// Zero value of the same kind.
    fn new_object(&self) -> Box<dyn KvObject>;

    /// Deep-assign this record onto `other`, which must be of the same kind.
    fn copy_to(&self, other: &mut dyn KvObject) -> Result<()>;
}

/// Implementation of [`KvObject::copy_to`] for cloneable records.
pub fn assign<T>(src: &T, dst: &mut dyn KvObject) -> Result<()>
where
    T: KvObject + Clone,
{
    let actual = dst.kind();
    match dst.as_any_mut().downcast_mut::<T>() {
        Some(target) => {
            *target = src.clone();
            Ok(())
        }
        None => Err(StoreError::KindMismatch {
            expected: src.kind(),
            actual,
        }),
    }
}

/// Hand out a private copy of `obj` built through `new_object` + `copy_to`.
pub fn private_copy<T: KvObject>(obj: &T) -> Result<T> {
    let mut copy = obj.new_object();
    obj.copy_to(copy.as_mut())?;
    let actual = copy.kind();
    copy.into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| StoreError::KindMismatch {
            expected: obj.kind(),
            actual,
        })
}

/// Downcast a type-erased object back into its concrete record type.
pub fn downcast<T: KvObject>(obj: Box<dyn KvObject>, expected: &'static str) -> Result<T> {
    let actual = obj.kind();
    obj.into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| StoreError::KindMismatch { expected, actual })
}
