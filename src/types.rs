//! Element type descriptor, storage layout, and selection kind (spec §3).

use num_enum::TryFromPrimitive;

use crate::error::{BypassError, Result};

/// The class of a library element type.
///
/// Only `Integer` is ever bypassable (spec §4.1 step 3); the rest exist so
/// the decision machine can reject them by name instead of by absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Class {
    Integer = 0,
    Float = 1,
    String = 2,
    Other = 3,
}

/// Byte order of a library element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum ByteOrder {
    Little = 0,
    Big = 1,
    Vax = 2,
    Mixed = 3,
    None = 4,
}

/// Sign representation of a library element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Sign {
    TwosComplement = 0,
    None = 1,
    /// Not applicable (e.g. the type isn't an integer at all).
    NotApplicable = 2,
}

/// A full element type descriptor: class, size, byte order, and sign.
///
/// Two descriptors are equivalent iff all four fields match (spec §3);
/// that's exactly `PartialEq`, so memory-type vs. file-type comparison in
/// the decision machine (§4.1 step 7) is just `!=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementType {
    pub class: Class,
    pub size: usize,
    pub order: ByteOrder,
    pub sign: Sign,
}

impl ElementType {
    pub fn new(class: Class, size: usize, order: ByteOrder, sign: Sign) -> Self {
        Self {
            class,
            size,
            order,
            sign,
        }
    }

    /// True iff this descriptor is an integer of the given native size with
    /// two's-complement sign (spec §4.1 steps 3-5 collapsed into one check
    /// for convenience at call sites that don't need the per-step detail).
    pub fn is_native_signed_int(&self, native_int_size: usize) -> bool {
        self.class == Class::Integer
            && self.size == native_int_size
            && self.sign == Sign::TwosComplement
    }

    /// Build a descriptor from the raw class/order/sign codes a host
    /// reports (e.g. an `H5Tget_class`/`H5Tget_order`/`H5Tget_sign`-style
    /// integer triple). An unrecognized code is a classification failure
    /// for that dataset, not a panic.
    pub fn from_raw(dataset: &str, class: u8, size: usize, order: u8, sign: u8) -> Result<Self> {
        let class = Class::try_from(class).map_err(|_| BypassError::Classification {
            dataset: dataset.to_string(),
            reason: format!("unrecognized element class code {class}"),
        })?;
        let order = ByteOrder::try_from(order).map_err(|_| BypassError::Classification {
            dataset: dataset.to_string(),
            reason: format!("unrecognized byte order code {order}"),
        })?;
        let sign = Sign::try_from(sign).map_err(|_| BypassError::Classification {
            dataset: dataset.to_string(),
            reason: format!("unrecognized sign code {sign}"),
        })?;
        Ok(Self::new(class, size, order, sign))
    }
}

/// Dataset storage layout (spec §3). Only `Contiguous` and `Chunked` can be
/// bypassed; the rest always fall back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    Contiguous,
    Chunked,
    Compact,
    Virtual,
    Error,
}

impl Layout {
    pub fn is_bypassable(&self) -> bool {
        matches!(self, Layout::Contiguous | Layout::Chunked)
    }
}

/// Selection kind for a file- or memory-space (spec §3). Only `All` and
/// `Hyperslab` can be bypassed; `None` means "no-op, skip silently";
/// `Points` and `Error` always fall back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    All,
    Hyperslab,
    Points,
    None,
    Error,
}

impl SelectionKind {
    pub fn is_bypassable(&self) -> bool {
        matches!(self, SelectionKind::All | SelectionKind::Hyperslab)
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, SelectionKind::None)
    }
}

/// Storage allocation status of a dataset (spec §4.1 step 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageStatus {
    Allocated,
    NotAllocated,
    PartAllocated,
}
