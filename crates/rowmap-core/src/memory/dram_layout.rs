use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{bit_positions, bit_string, int_to_bin};

/// Errors that can occur when building, loading or storing a [`DramLayout`].
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Two fields claim the same physical address bits
    #[error("{first} and {second} masks overlap in bits {bits:#x}")]
    Overlap {
        /// Name of the first field
        first: &'static str,
        /// Name of the second field
        second: &'static str,
        /// Shared bits
        bits: u64,
    },
    /// A bit position outside a 64-bit address
    #[error("bit position {0} exceeds 63")]
    InvalidBit(u32),
    /// A binary record of the wrong length
    #[error("layout record has {0} bytes, expected {expected}", expected = DramLayout::RECORD_SIZE)]
    RecordSize(usize),
    #[allow(missing_docs)]
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[allow(missing_docs)]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for layout operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Physical address bits selecting bank, row and column.
///
/// Masks are arbitrary, possibly non-contiguous 64-bit sets and must be pairwise disjoint. A
/// field's width is the popcount of its mask; a zero mask means the field is not modelled.
/// The layout is immutable once constructed.
///
/// Serialized as JSON with explicit bit positions:
///
/// ```json
/// { "bank_bits": [6, 14, 15, 16], "row_bits": [17, 18, 19], "col_bits": [0, 1, 2, 3, 4, 5, 7] }
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LayoutBits", into = "LayoutBits")]
pub struct DramLayout {
    bank_mask: u64,
    row_mask: u64,
    col_mask: u64,
}

#[derive(Serialize, Deserialize)]
struct LayoutBits {
    #[serde(default)]
    bank_bits: Vec<u32>,
    #[serde(default)]
    row_bits: Vec<u32>,
    #[serde(default)]
    col_bits: Vec<u32>,
}

impl TryFrom<LayoutBits> for DramLayout {
    type Error = LayoutError;

    fn try_from(bits: LayoutBits) -> Result<Self> {
        DramLayout::from_bit_positions(&bits.bank_bits, &bits.row_bits, &bits.col_bits)
    }
}

impl From<DramLayout> for LayoutBits {
    fn from(layout: DramLayout) -> Self {
        LayoutBits {
            bank_bits: bit_positions(layout.bank_mask).collect(),
            row_bits: bit_positions(layout.row_mask).collect(),
            col_bits: bit_positions(layout.col_mask).collect(),
        }
    }
}

impl DramLayout {
    /// Size of the binary record written by [`DramLayout::to_record`].
    pub const RECORD_SIZE: usize = 24;

    /// Creates a layout from bank, row and column masks.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Overlap`] if any two masks share a bit.
    pub fn new(bank_mask: u64, row_mask: u64, col_mask: u64) -> Result<Self> {
        for (first, a, second, b) in [
            ("bank", bank_mask, "row", row_mask),
            ("bank", bank_mask, "column", col_mask),
            ("row", row_mask, "column", col_mask),
        ] {
            if a & b != 0 {
                return Err(LayoutError::Overlap {
                    first,
                    second,
                    bits: a & b,
                });
            }
        }
        Ok(DramLayout {
            bank_mask,
            row_mask,
            col_mask,
        })
    }

    /// A layout that only models the column field.
    pub fn columns_only(col_mask: u64) -> Self {
        DramLayout {
            bank_mask: 0,
            row_mask: 0,
            col_mask,
        }
    }

    /// Creates a layout from lists of physical address bit positions.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidBit`] for positions above 63 and
    /// [`LayoutError::Overlap`] if a bit is assigned to two fields.
    pub fn from_bit_positions(bank: &[u32], row: &[u32], col: &[u32]) -> Result<Self> {
        let mask = |bits: &[u32]| -> Result<u64> {
            bits.iter().try_fold(0u64, |acc, &bit| {
                if bit >= u64::BITS {
                    Err(LayoutError::InvalidBit(bit))
                } else {
                    Ok(acc | 1 << bit)
                }
            })
        };
        Self::new(mask(bank)?, mask(row)?, mask(col)?)
    }

    /// Mask of the bank bits.
    pub fn bank_mask(&self) -> u64 {
        self.bank_mask
    }

    /// Mask of the row bits.
    pub fn row_mask(&self) -> u64 {
        self.row_mask
    }

    /// Mask of the column bits.
    pub fn col_mask(&self) -> u64 {
        self.col_mask
    }

    /// Number of bank bits.
    pub fn bank_width(&self) -> u32 {
        self.bank_mask.count_ones()
    }

    /// Number of row bits.
    pub fn row_width(&self) -> u32 {
        self.row_mask.count_ones()
    }

    /// Number of column bits.
    pub fn col_width(&self) -> u32 {
        self.col_mask.count_ones()
    }

    /// Returns the number of banks in this layout.
    pub fn bank_count(&self) -> u64 {
        1 << self.bank_width()
    }

    /// Returns the number of rows in this layout.
    pub fn row_count(&self) -> u64 {
        1 << self.row_width()
    }

    /// Serializes the masks as three little-endian `u64`: bank, row, column.
    pub fn to_record(&self) -> [u8; Self::RECORD_SIZE] {
        let mut record = [0u8; Self::RECORD_SIZE];
        for (chunk, mask) in record
            .chunks_exact_mut(8)
            .zip([self.bank_mask, self.row_mask, self.col_mask])
        {
            chunk.copy_from_slice(&mask.to_le_bytes());
        }
        record
    }

    /// Parses a record written by [`DramLayout::to_record`].
    ///
    /// # Errors
    ///
    /// Fails on a record of the wrong length or with overlapping masks.
    pub fn from_record(record: &[u8]) -> Result<Self> {
        if record.len() != Self::RECORD_SIZE {
            return Err(LayoutError::RecordSize(record.len()));
        }
        let mut masks = record.chunks_exact(8).map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            u64::from_le_bytes(raw)
        });
        let (bank, row, col) = (
            masks.next().unwrap_or_default(),
            masks.next().unwrap_or_default(),
            masks.next().unwrap_or_default(),
        );
        Self::new(bank, row, col)
    }

    /// Writes the binary record to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&self.to_record())?;
        writer.flush()?;
        debug!("Stored DRAM layout to {}", path.display());
        Ok(())
    }

    /// Reads a binary record from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds an invalid record.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut record = vec![];
        File::open(path)?.read_to_end(&mut record)?;
        let layout = Self::from_record(&record)?;
        debug!(
            "Loaded DRAM layout from {}: {} (column mask {})",
            path.display(),
            layout,
            int_to_bin(layout.col_mask)
        );
        Ok(layout)
    }

    /// Loads a layout from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_jsonfile(path: impl AsRef<Path>) -> Result<Self> {
        let mut contents = String::new();
        File::open(path.as_ref())?.read_to_string(&mut contents)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes the layout as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn to_jsonfile(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

impl Display for DramLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bank: [{}], row: [{}], col: [{}]",
            bit_string(self.bank_mask),
            bit_string(self.row_mask),
            bit_string(self.col_mask)
        )
    }
}
