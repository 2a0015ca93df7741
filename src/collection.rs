//! Columnar host collections.
//!
//! A [`PortableCollection`] stores a fixed set of columns for `len`
//! elements, structure-of-arrays style. It crosses a channel as a trivial
//! copy product:
//!
//! ```text
//! parameters: element count u32
//! region 0:   column block, each column padded to the layout alignment
//! region 1:   scalar block, element count u32
//! ```
//!
//! Two layouts with the same column widths and alignment are wire compatible.

use crate::channel::TrivialValue;
use crate::error::{Error, Result};
use crate::link::MAX_FRAME_PAYLOAD;
use crate::product::TrivialCopy;
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::marker::PhantomData;

/// One column of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: &'static str,
    /// Bytes per element.
    pub width: usize,
}

impl Column {
    /// Describe a column.
    pub const fn new(name: &'static str, width: usize) -> Self {
        Self { name, width }
    }
}

/// Static description of a collection's columns.
///
/// # Example
///
/// ```rust
/// use parallax_bridge::collection::{Column, PortableCollection, SoaLayout};
///
/// struct RecHits;
///
/// impl SoaLayout for RecHits {
///     const COLUMNS: &'static [Column] = &[
///         Column::new("det_id", 4),
///         Column::new("energy", 4),
///     ];
/// }
///
/// let mut hits = PortableCollection::<RecHits>::new(2).unwrap();
/// hits.set(1, 0, 7.5f32).unwrap();
/// assert_eq!(hits.get::<f32>(1, 0), Some(7.5));
/// ```
pub trait SoaLayout: Send + Sync + 'static {
    /// Columns in storage order.
    const COLUMNS: &'static [Column];

    /// Alignment of each column within the column block.
    const ALIGNMENT: usize = 128;
}

fn align_up(size: usize, alignment: usize) -> usize {
    size.div_ceil(alignment) * alignment
}

/// A structure-of-arrays collection with layout `L`.
pub struct PortableCollection<L: SoaLayout> {
    len: usize,
    columns: Vec<u8>,
    scalars: [u8; 4],
    _layout: PhantomData<L>,
}

impl<L: SoaLayout> PortableCollection<L> {
    /// Allocate a zeroed collection of `len` elements.
    pub fn new(len: usize) -> Result<Self> {
        let count = u32::try_from(len)
            .map_err(|_| Error::Configuration(format!("collection of {len} elements is too large")))?;
        let mut collection = Self::zeroed(len);
        collection.scalars = count.to_le_bytes();
        Ok(collection)
    }

    fn zeroed(len: usize) -> Self {
        Self {
            len,
            columns: vec![0u8; Self::block_size(len)],
            scalars: [0; 4],
            _layout: PhantomData,
        }
    }

    /// Size of the column block for `len` elements.
    pub fn block_size(len: usize) -> usize {
        L::COLUMNS
            .iter()
            .map(|column| align_up(column.width * len, L::ALIGNMENT))
            .sum()
    }

    fn column_range(&self, index: usize) -> Option<std::ops::Range<usize>> {
        let column = L::COLUMNS.get(index)?;
        let start: usize = L::COLUMNS[..index]
            .iter()
            .map(|c| align_up(c.width * self.len, L::ALIGNMENT))
            .sum();
        Some(start..start + column.width * self.len)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the collection has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        L::COLUMNS.iter().position(|column| column.name == name)
    }

    /// Raw bytes of column `index`.
    pub fn column(&self, index: usize) -> Option<&[u8]> {
        let range = self.column_range(index)?;
        Some(&self.columns[range])
    }

    /// Mutable raw bytes of column `index`.
    pub fn column_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let range = self.column_range(index)?;
        Some(&mut self.columns[range])
    }

    /// Read element `element` of column `column`.
    ///
    /// Returns `None` if either index is out of range or `T` does not have
    /// the column's width.
    pub fn get<T: TrivialValue>(&self, column: usize, element: usize) -> Option<T> {
        let width = L::COLUMNS.get(column)?.width;
        if width != T::SIZE || element >= self.len {
            return None;
        }
        let bytes = self.column(column)?;
        Some(T::from_le_slice(&bytes[element * width..(element + 1) * width]))
    }

    /// Write element `element` of column `column`.
    pub fn set<T: TrivialValue>(&mut self, column: usize, element: usize, value: T) -> Result<()> {
        let len = self.len;
        let col = L::COLUMNS
            .get(column)
            .ok_or_else(|| Error::Configuration(format!("no column {column}")))?;
        if col.width != T::SIZE {
            return Err(Error::Configuration(format!(
                "column '{}' is {} bytes wide, value is {}",
                col.name,
                col.width,
                T::SIZE
            )));
        }
        if element >= len {
            return Err(Error::Configuration(format!(
                "element {element} out of range for {len} elements"
            )));
        }
        let width = col.width;
        let bytes = self
            .column_mut(column)
            .ok_or_else(|| Error::Configuration(format!("no column {column}")))?;
        bytes[element * width..(element + 1) * width].copy_from_slice(&value.to_le_vec());
        Ok(())
    }
}

impl<L: SoaLayout> TrivialCopy for PortableCollection<L> {
    const REQUIRES_PARAMETERS: bool = true;

    fn parameters(&self) -> Vec<u8> {
        self.scalars.to_vec()
    }

    fn regions(&self) -> SmallVec<[&[u8]; 2]> {
        smallvec![self.columns.as_slice(), self.scalars.as_slice()]
    }

    fn allocate(parameters: Option<&[u8]>) -> Result<Self> {
        let raw: [u8; 4] = parameters
            .and_then(|p| p.try_into().ok())
            .ok_or_else(|| Error::Protocol("collection parameters must be a 4-byte element count".into()))?;
        let len = u32::from_le_bytes(raw) as usize;
        if len > MAX_FRAME_PAYLOAD || Self::block_size(len) > MAX_FRAME_PAYLOAD {
            return Err(Error::Protocol(format!(
                "collection of {len} elements exceeds the message limit"
            )));
        }
        Ok(Self::zeroed(len))
    }

    fn regions_mut(&mut self) -> SmallVec<[&mut [u8]; 2]> {
        smallvec![self.columns.as_mut_slice(), self.scalars.as_mut_slice()]
    }

    fn finalize(&mut self) -> Result<()> {
        let count = u32::from_le_bytes(self.scalars) as usize;
        if count != self.len {
            return Err(Error::Protocol(format!(
                "collection announced {} elements but carries {count}",
                self.len
            )));
        }
        Ok(())
    }
}

impl<L: SoaLayout> fmt::Debug for PortableCollection<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortableCollection")
            .field("len", &self.len)
            .field("columns", &L::COLUMNS.len())
            .field("bytes", &self.columns.len())
            .finish()
    }
}

impl<L: SoaLayout> Clone for PortableCollection<L> {
    fn clone(&self) -> Self {
        Self {
            len: self.len,
            columns: self.columns.clone(),
            scalars: self.scalars,
            _layout: PhantomData,
        }
    }
}

impl<L: SoaLayout> PartialEq for PortableCollection<L> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.columns == other.columns && self.scalars == other.scalars
    }
}
