use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};

/// Identifier of an execution backend (e.g. `CpuRef`, `GpuAcc`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BackendId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for BackendId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifier naming one tensor memory representation.
///
/// Ids are compared by value and must be unique within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactoryId(String);

impl FactoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FactoryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FactoryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for FactoryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Element types a tensor handle can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum DataType {
    Float32,
    Float16,
    BFloat16,
    Signed32,
    QAsymmU8,
    QSymmS8,
    Boolean,
}

impl DataType {
    /// Size of a single element in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::Float32 | DataType::Signed32 => 4,
            DataType::Float16 | DataType::BFloat16 => 2,
            DataType::QAsymmU8 | DataType::QSymmS8 | DataType::Boolean => 1,
        }
    }
}

/// Row-major tensor shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Element count, saturating at `usize::MAX`
    pub fn num_elements(&self) -> usize {
        self.checked_num_elements().unwrap_or(usize::MAX)
    }

    /// Element count, or `None` if it does not fit in `usize`
    pub fn checked_num_elements(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Element strides for a dense row-major layout
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.0.len()];
        for i in (0..self.0.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.0[i + 1];
        }
        strides
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}

/// Shape and element type of a tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub shape: TensorShape,
    pub data_type: DataType,
}

impl TensorInfo {
    pub fn new(shape: impl Into<TensorShape>, data_type: DataType) -> Self {
        Self {
            shape: shape.into(),
            data_type,
        }
    }

    /// Number of bytes needed to store the tensor densely, saturating at `usize::MAX`
    pub fn num_bytes(&self) -> usize {
        self.checked_num_bytes().unwrap_or(usize::MAX)
    }

    pub fn checked_num_bytes(&self) -> Option<usize> {
        self.shape
            .checked_num_elements()?
            .checked_mul(self.data_type.size_in_bytes())
    }

    /// Check that the description can back a tensor
    pub fn validate(&self) -> Result<()> {
        if self.shape.rank() == 0 {
            return Err(Error::InvalidTensor("tensor shape has no dimensions".to_string()));
        }

        if let Some(axis) = self.shape.dims().iter().position(|&d| d == 0) {
            return Err(Error::InvalidTensor(format!(
                "dimension {} of shape {} is zero",
                axis, self.shape
            )));
        }

        if self.checked_num_bytes().is_none() {
            return Err(Error::InvalidTensor(format!(
                "shape {} of {} elements does not fit in addressable memory",
                self.shape, self.data_type
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_strides() {
        let shape = TensorShape::new(vec![2, 3, 4]);
        assert_eq!(shape.strides(), vec![12, 4, 1]);
        assert_eq!(shape.num_elements(), 24);
    }

    #[test]
    fn test_tensor_info_validation() {
        assert!(TensorInfo::new(vec![1, 8], DataType::Float32).validate().is_ok());
        assert!(TensorInfo::new(Vec::<usize>::new(), DataType::Float32).validate().is_err());
        assert!(TensorInfo::new(vec![4, 0], DataType::Float16).validate().is_err());
    }

    #[test]
    fn test_oversized_tensor_is_invalid() {
        let elements_overflow = TensorInfo::new(vec![usize::MAX / 2, 4], DataType::Float32);
        assert_eq!(elements_overflow.shape.checked_num_elements(), None);
        assert!(matches!(elements_overflow.validate(), Err(Error::InvalidTensor(_))));

        // Element count fits, byte count does not
        let bytes_overflow = TensorInfo::new(vec![usize::MAX / 2], DataType::Float32);
        assert!(bytes_overflow.shape.checked_num_elements().is_some());
        assert_eq!(bytes_overflow.checked_num_bytes(), None);
        assert_eq!(bytes_overflow.num_bytes(), usize::MAX);
        assert!(matches!(bytes_overflow.validate(), Err(Error::InvalidTensor(_))));
    }

    #[test]
    fn test_data_type_names() {
        assert_eq!(DataType::QAsymmU8.to_string(), "QAsymmU8");
        assert_eq!("Float16".parse::<DataType>().unwrap(), DataType::Float16);
        assert_eq!(TensorInfo::new(vec![2, 2], DataType::Float16).num_bytes(), 8);
    }
}
