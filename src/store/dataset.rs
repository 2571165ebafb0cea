//! Dataset - a named, typed 2-D array persisted as a single `.npy` file
//!
//! A dataset's backing content is always a dense homogeneous array; shape
//! lives in the npy header, not in the index. All reads materialize the
//! whole array and widen to `f64`; all writes cast to the declared element
//! type, so a round trip yields the original array cast to that type.
//! There is no streaming I/O at this layer; the indexed partial write is a
//! full read-modify-write.

use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::{s, Array1, Array2};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Declared element type of a dataset's backing array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit signed integer
    I16,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit signed integer
    I32,
    /// 32-bit unsigned integer
    U32,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl ElementType {
    /// Lowercase name as it appears in the index document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

/// Cast and write a whole array as the declared element type.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn write_array(path: &Path, data: &Array2<f64>, element_type: ElementType) -> Result<()> {
    let file = File::create(path)?;
    match element_type {
        ElementType::I8 => data.mapv(|v| v as i8).write_npy(file)?,
        ElementType::U8 => data.mapv(|v| v as u8).write_npy(file)?,
        ElementType::I16 => data.mapv(|v| v as i16).write_npy(file)?,
        ElementType::U16 => data.mapv(|v| v as u16).write_npy(file)?,
        ElementType::I32 => data.mapv(|v| v as i32).write_npy(file)?,
        ElementType::U32 => data.mapv(|v| v as u32).write_npy(file)?,
        ElementType::F32 => data.mapv(|v| v as f32).write_npy(file)?,
        ElementType::F64 => data.write_npy(file)?,
    }
    Ok(())
}

/// Read a whole array of the declared element type, widened to `f64`.
pub(crate) fn read_array(path: &Path, element_type: ElementType) -> Result<Array2<f64>> {
    let file = File::open(path)?;
    let data = match element_type {
        ElementType::I8 => Array2::<i8>::read_npy(file)?.mapv(f64::from),
        ElementType::U8 => Array2::<u8>::read_npy(file)?.mapv(f64::from),
        ElementType::I16 => Array2::<i16>::read_npy(file)?.mapv(f64::from),
        ElementType::U16 => Array2::<u16>::read_npy(file)?.mapv(f64::from),
        ElementType::I32 => Array2::<i32>::read_npy(file)?.mapv(f64::from),
        ElementType::U32 => Array2::<u32>::read_npy(file)?.mapv(f64::from),
        ElementType::F32 => Array2::<f32>::read_npy(file)?.mapv(f64::from),
        ElementType::F64 => Array2::<f64>::read_npy(file)?,
    };
    Ok(data)
}

/// A named, typed array persisted as a single file under its experiment's
/// directory.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    path: PathBuf,
    element_type: ElementType,
}

impl Dataset {
    pub(crate) fn new(name: String, path: PathBuf, element_type: ElementType) -> Self {
        Self {
            name,
            path,
            element_type,
        }
    }

    /// Dataset name (unique within its experiment, case-folded).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the backing array file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared element type of the backing array.
    #[must_use]
    pub const fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Read the whole backing array, widened to `f64`.
    ///
    /// # Errors
    ///
    /// Returns an error if the array file cannot be read or parsed.
    pub fn read_all(&self) -> Result<Array2<f64>> {
        read_array(&self.path, self.element_type)
    }

    /// Read a contiguous range of rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the range exceeds the stored row
    /// count, or an error if the array file cannot be read.
    pub fn read_rows(&self, rows: Range<usize>) -> Result<Array2<f64>> {
        let data = self.read_all()?;
        if rows.end > data.nrows() {
            return Err(Error::InvalidInput(format!(
                "row range {}..{} out of bounds for dataset '{}' with {} rows",
                rows.start,
                rows.end,
                self.name,
                data.nrows()
            )));
        }
        Ok(data.slice(s![rows, ..]).to_owned())
    }

    /// Read a single row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the row index is out of bounds,
    /// or an error if the array file cannot be read.
    pub fn read_row(&self, row: usize) -> Result<Array1<f64>> {
        let data = self.read_all()?;
        if row >= data.nrows() {
            return Err(Error::InvalidInput(format!(
                "row {} out of bounds for dataset '{}' with {} rows",
                row,
                self.name,
                data.nrows()
            )));
        }
        Ok(data.row(row).to_owned())
    }

    /// Replace the backing array wholesale.
    ///
    /// # Errors
    ///
    /// Returns an error if the array file cannot be written.
    pub fn overwrite(&self, data: &Array2<f64>) -> Result<()> {
        write_array(&self.path, data, self.element_type)
    }

    /// Overwrite a contiguous block of rows starting at `start`.
    ///
    /// Full read-modify-write: the entire array is materialized, the block
    /// assigned, and the entire array written back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the block does not fit the stored
    /// shape, or an error if the array file cannot be read or written.
    pub fn write_rows(&self, start: usize, rows: &Array2<f64>) -> Result<()> {
        let mut data = self.read_all()?;
        let end = start + rows.nrows();
        if end > data.nrows() || rows.ncols() != data.ncols() {
            return Err(Error::InvalidInput(format!(
                "block of shape {}x{} at row {} does not fit dataset '{}' of shape {}x{}",
                rows.nrows(),
                rows.ncols(),
                start,
                self.name,
                data.nrows(),
                data.ncols()
            )));
        }
        data.slice_mut(s![start..end, ..]).assign(rows);
        self.overwrite(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn dataset(dir: &Path, ty: ElementType) -> Dataset {
        Dataset::new("t".to_string(), dir.join("t.npy"), ty)
    }

    #[test]
    fn test_round_trip_casts_to_declared_type() {
        let dir = tempdir().unwrap();
        let ds = dataset(dir.path(), ElementType::I16);
        let data = array![[1.9, -2.0], [300.0, 4.0]];
        ds.overwrite(&data).unwrap();

        // 1.9 truncates to 1 under the i16 cast
        let back = ds.read_all().unwrap();
        assert_eq!(back, array![[1.0, -2.0], [300.0, 4.0]]);
    }

    #[test]
    fn test_round_trip_f64_is_exact() {
        let dir = tempdir().unwrap();
        let ds = dataset(dir.path(), ElementType::F64);
        let data = array![[0.25, -1.5], [1e-9, 3.125]];
        ds.overwrite(&data).unwrap();
        assert_eq!(ds.read_all().unwrap(), data);
    }

    #[test]
    fn test_read_rows_and_row() {
        let dir = tempdir().unwrap();
        let ds = dataset(dir.path(), ElementType::F64);
        ds.overwrite(&array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]])
            .unwrap();

        assert_eq!(ds.read_rows(1..3).unwrap(), array![[3.0, 4.0], [5.0, 6.0]]);
        assert_eq!(ds.read_row(0).unwrap(), array![1.0, 2.0]);
        assert!(ds.read_rows(2..4).is_err());
        assert!(ds.read_row(3).is_err());
    }

    #[test]
    fn test_write_rows_is_read_modify_write() {
        let dir = tempdir().unwrap();
        let ds = dataset(dir.path(), ElementType::F64);
        ds.overwrite(&Array2::zeros((3, 2))).unwrap();

        ds.write_rows(1, &array![[7.0, 8.0]]).unwrap();
        assert_eq!(
            ds.read_all().unwrap(),
            array![[0.0, 0.0], [7.0, 8.0], [0.0, 0.0]]
        );

        // a block that does not fit leaves the file untouched
        assert!(ds.write_rows(2, &array![[1.0, 1.0], [2.0, 2.0]]).is_err());
        assert_eq!(ds.read_all().unwrap().nrows(), 3);
    }
}
