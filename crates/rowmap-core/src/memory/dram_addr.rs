use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

use super::{DramLayout, PhysAddr};
use crate::util::{gather_bits, scatter_bits};

/// A DRAM address field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DramField {
    /// Bank
    Bank,
    /// Row
    Row,
    /// Column
    Column,
}

impl Display for DramField {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            DramField::Bank => write!(f, "bank"),
            DramField::Row => write!(f, "row"),
            DramField::Column => write!(f, "column"),
        }
    }
}

/// A field value that does not fit into the bits its mask provides.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("{field} value {value} does not fit into {width} bits")]
pub struct RangeError {
    /// Offending field
    pub field: DramField,
    /// Offending value
    pub value: usize,
    /// Popcount of the field's mask
    pub width: u32,
}

/// DRAM address with bank, row, and column components.
///
/// Represents the physical organization of a memory address in DRAM,
/// decoded from a physical address using a [`DramLayout`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DRAMAddr {
    /// Bank number
    pub bank: usize,
    /// Row number
    pub row: usize,
    /// Column number
    pub col: usize,
}

impl Display for DRAMAddr {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "({}, {}, {})", self.bank, self.row, self.col)
    }
}

/// Distributes `value` over the bits of `mask`, rejecting values wider than the mask.
fn scatter_checked(field: DramField, value: usize, mask: u64) -> Result<u64, RangeError> {
    let width = mask.count_ones();
    if width < usize::BITS && value >> width != 0 {
        return Err(RangeError {
            field,
            value,
            width,
        });
    }
    Ok(scatter_bits(value as u64, mask))
}

impl DRAMAddr {
    /// Creates a new DRAM address.
    ///
    /// # Arguments
    ///
    /// * `bank` - Bank number
    /// * `row` - Row number
    /// * `col` - Column number
    pub fn new(bank: usize, row: usize, col: usize) -> Self {
        DRAMAddr { bank, row, col }
    }

    /// Decodes a physical address into DRAM components.
    ///
    /// Each field gathers the address bits selected by its mask, lowest mask bit first. Fields
    /// with an empty mask decode to zero.
    pub fn from_phys(phys: PhysAddr, layout: &DramLayout) -> DRAMAddr {
        let p = phys.as_u64();
        DRAMAddr {
            bank: gather_bits(p, layout.bank_mask()) as usize,
            row: gather_bits(p, layout.row_mask()) as usize,
            col: gather_bits(p, layout.col_mask()) as usize,
        }
    }

    /// The physical address bits contributed by the column.
    ///
    /// The result is meant to be OR-ed with the bank and row contributions.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if the column does not fit the column mask.
    pub fn col_to_phys(&self, layout: &DramLayout) -> Result<PhysAddr, RangeError> {
        scatter_checked(DramField::Column, self.col, layout.col_mask())
            .map(|bits| PhysAddr::new(bits as usize))
    }

    /// The physical address bits contributed by the bank.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if the bank does not fit the bank mask.
    pub fn bank_to_phys(&self, layout: &DramLayout) -> Result<PhysAddr, RangeError> {
        scatter_checked(DramField::Bank, self.bank, layout.bank_mask())
            .map(|bits| PhysAddr::new(bits as usize))
    }

    /// The physical address bits contributed by the row.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if the row does not fit the row mask.
    pub fn row_to_phys(&self, layout: &DramLayout) -> Result<PhysAddr, RangeError> {
        scatter_checked(DramField::Row, self.row, layout.row_mask())
            .map(|bits| PhysAddr::new(bits as usize))
    }

    /// Encodes all fields into a physical address.
    ///
    /// Bits outside the three masks are zero.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] for the first field that does not fit its mask.
    pub fn to_phys(&self, layout: &DramLayout) -> Result<PhysAddr, RangeError> {
        Ok(self.bank_to_phys(layout)? | self.row_to_phys(layout)? | self.col_to_phys(layout)?)
    }
}

impl DramLayout {
    /// Shorthand for [`DRAMAddr::from_phys`].
    pub fn phys_to_dram(&self, phys: PhysAddr) -> DRAMAddr {
        DRAMAddr::from_phys(phys, self)
    }

    /// Shorthand for [`DRAMAddr::to_phys`].
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] for the first field that does not fit its mask.
    pub fn dram_to_phys(&self, addr: &DRAMAddr) -> Result<PhysAddr, RangeError> {
        addr.to_phys(self)
    }
}
