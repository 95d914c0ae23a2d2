//! Persistent field store.
//!
//! Every persisted value is its own named field so a mutation rewrites only
//! what changed. Records are postcard-encoded serde structs; floats are kept
//! as raw IEEE-754 bytes and therefore round-trip exactly.

mod flash;

pub use flash::{FlashStore, RamFlash, RamFlashError, SLOT_SIZE};

use core::fmt;

use serde::{de::DeserializeOwned, Serialize};

use crate::config::{MAX_LOCATIONS, MAX_WAYPOINTS};

/// Largest encoded record a field may hold.
pub const RECORD_CAPACITY: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Field {
    Home,
    Mode,
    ActiveWaypoint,
    Consumption,
    Location(u8),
    Waypoint(u8),
}

impl Field {
    pub const COUNT: usize = 4 + MAX_LOCATIONS + MAX_WAYPOINTS;

    pub const fn index(self) -> usize {
        match self {
            Field::Home => 0,
            Field::Mode => 1,
            Field::ActiveWaypoint => 2,
            Field::Consumption => 3,
            Field::Location(slot) => 4 + slot as usize,
            Field::Waypoint(slot) => 4 + MAX_LOCATIONS + slot as usize,
        }
    }

    pub const fn from_index(index: usize) -> Option<Field> {
        match index {
            0 => Some(Field::Home),
            1 => Some(Field::Mode),
            2 => Some(Field::ActiveWaypoint),
            3 => Some(Field::Consumption),
            i if i < 4 + MAX_LOCATIONS => Some(Field::Location((i - 4) as u8)),
            i if i < Field::COUNT => Some(Field::Waypoint((i - 4 - MAX_LOCATIONS) as u8)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Field was never written.
    NotFound,
    /// Stored bytes failed the checksum or did not decode.
    Corrupt,
    /// Record larger than a field slot.
    TooLarge,
    /// The medium rejected the operation.
    Io,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "field not found"),
            StorageError::Corrupt => write!(f, "stored field is corrupt"),
            StorageError::TooLarge => write!(f, "record too large"),
            StorageError::Io => write!(f, "storage i/o failure"),
        }
    }
}

/// Persistent store collaborator.
pub trait Store {
    /// Copy the field into `buf`, returning the filled part.
    fn read<'a>(&mut self, field: Field, buf: &'a mut [u8]) -> Result<&'a [u8], StorageError>;
    fn write(&mut self, field: Field, bytes: &[u8]) -> Result<(), StorageError>;
    fn flush(&mut self) -> Result<(), StorageError>;
}

pub fn save<S: Store, T: Serialize>(store: &mut S, field: Field, value: &T) -> Result<(), StorageError> {
    let mut buf = [0u8; RECORD_CAPACITY];
    let bytes = postcard::to_slice(value, &mut buf).map_err(|_| StorageError::TooLarge)?;
    store.write(field, bytes)
}

pub fn load<S: Store, T: DeserializeOwned>(store: &mut S, field: Field) -> Result<T, StorageError> {
    let mut buf = [0u8; RECORD_CAPACITY];
    let bytes = store.read(field, &mut buf)?;
    postcard::from_bytes(bytes).map_err(|_| StorageError::Corrupt)
}

/// Load a field, substituting `default` when it is missing, unreadable or
/// fails `is_valid`.
pub fn load_validated<S, T, V>(store: &mut S, field: Field, default: T, is_valid: V) -> T
where
    S: Store,
    T: DeserializeOwned,
    V: FnOnce(&T) -> bool,
{
    match load::<S, T>(store, field) {
        Ok(value) => {
            if is_valid(&value) {
                value
            } else {
                log_warn!("{:?} out of range, using default", field);
                default
            }
        }
        Err(StorageError::NotFound) => default,
        Err(e) => {
            log_warn!("{:?} unreadable ({:?}), using default", field, e);
            default
        }
    }
}

/// Fields whose in-memory value has not reached the store yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyFields(u32);

impl DirtyFields {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn mark(&mut self, field: Field) {
        self.0 |= 1 << field.index();
    }

    pub fn clear(&mut self, field: Field) {
        self.0 &= !(1 << field.index());
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0 & (1 << field.index()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        (0..Field::COUNT)
            .filter_map(Field::from_index)
            .filter(move |field| self.contains(*field))
    }
}
