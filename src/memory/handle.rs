use std::any::Any;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, Weak};

use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::memory::manager::MemoryManager;
use crate::types::{TensorInfo, TensorShape};

/// A created, backend-specific reference to a tensor's backing memory
pub trait TensorHandle: Send + Sync + Debug {
    /// Shape and element type of the tensor this handle refers to
    fn tensor_info(&self) -> &TensorInfo;

    /// Whether this handle aliases a region of a parent tensor
    fn is_sub_tensor(&self) -> bool;

    /// Copy the tensor contents out of the handle
    fn read(&self) -> Result<Vec<u8>>;

    /// Overwrite the tensor contents
    fn write(&self, data: &[u8]) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Backing buffer shared between a host handle and its sub-tensor views
#[derive(Debug)]
struct HostStorage {
    bytes: Mutex<BytesMut>,
    manager: Option<Weak<dyn MemoryManager>>,
}

impl Drop for HostStorage {
    fn drop(&mut self) {
        let manager = match self.manager.as_ref().and_then(Weak::upgrade) {
            Some(manager) => manager,
            None => return,
        };

        if let Ok(bytes) = self.bytes.get_mut() {
            manager.recycle(std::mem::take(bytes));
        }
    }
}

/// Tensor handle backed by host memory
#[derive(Debug, Clone)]
pub struct HostTensorHandle {
    info: TensorInfo,
    storage: Arc<HostStorage>,
    byte_offset: usize,
    byte_len: usize,
    sub_tensor: bool,
}

impl HostTensorHandle {
    /// Create a handle owning `bytes`; the buffer goes back to `manager` on drop
    pub fn new(info: TensorInfo, bytes: BytesMut, manager: Option<Weak<dyn MemoryManager>>) -> Result<Self> {
        info.validate()?;

        let byte_len = info.num_bytes();
        if bytes.len() != byte_len {
            return Err(Error::InvalidTensor(format!(
                "buffer of {} bytes cannot back a tensor of {} bytes",
                bytes.len(),
                byte_len
            )));
        }

        Ok(Self {
            info,
            storage: Arc::new(HostStorage {
                bytes: Mutex::new(bytes),
                manager,
            }),
            byte_offset: 0,
            byte_len,
            sub_tensor: false,
        })
    }

    /// Create a view aliasing a region of `parent`.
    ///
    /// Returns `None` if the region lies outside the parent or is not
    /// contiguous in the parent's row-major layout.
    pub fn sub_tensor(parent: &HostTensorHandle, sub_shape: &TensorShape, origin: &[usize]) -> Option<Self> {
        let parent_dims = parent.info.shape.dims();
        let sub_dims = sub_shape.dims();

        if sub_dims.len() != parent_dims.len() || origin.len() != parent_dims.len() {
            return None;
        }

        let in_bounds = sub_dims
            .iter()
            .zip(origin)
            .zip(parent_dims)
            .all(|((&sub, &start), &full)| sub > 0 && start.checked_add(sub).map_or(false, |end| end <= full));
        if !in_bounds {
            return None;
        }

        // Every axis after the first non-unit axis must be taken whole
        let first_wide = sub_dims.iter().position(|&d| d > 1).unwrap_or(sub_dims.len() - 1);
        let contiguous = (first_wide + 1..sub_dims.len())
            .all(|axis| sub_dims[axis] == parent_dims[axis] && origin[axis] == 0);
        if !contiguous {
            return None;
        }

        let element_size = parent.info.data_type.size_in_bytes();
        let element_offset = parent
            .info
            .shape
            .strides()
            .iter()
            .zip(origin)
            .try_fold(0usize, |acc, (stride, start)| acc.checked_add(stride.checked_mul(*start)?))?;
        let byte_offset = element_offset
            .checked_mul(element_size)?
            .checked_add(parent.byte_offset)?;

        let info = TensorInfo::new(sub_shape.clone(), parent.info.data_type);
        let byte_len = info.checked_num_bytes()?;

        Some(Self {
            info,
            storage: Arc::clone(&parent.storage),
            byte_offset,
            byte_len,
            sub_tensor: true,
        })
    }

    /// Offset of this view into the shared buffer
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Whether two handles share the same backing buffer
    pub fn shares_storage_with(&self, other: &HostTensorHandle) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

impl TensorHandle for HostTensorHandle {
    fn tensor_info(&self) -> &TensorInfo {
        &self.info
    }

    fn is_sub_tensor(&self) -> bool {
        self.sub_tensor
    }

    fn read(&self) -> Result<Vec<u8>> {
        let bytes = self
            .storage
            .bytes
            .lock()
            .map_err(|_| Error::InternalInvariant("host tensor storage lock poisoned".to_string()))?;
        Ok(bytes[self.byte_offset..self.byte_offset + self.byte_len].to_vec())
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.byte_len {
            return Err(Error::InvalidTensor(format!(
                "expected {} bytes, got {}",
                self.byte_len,
                data.len()
            )));
        }

        let mut bytes = self
            .storage
            .bytes
            .lock()
            .map_err(|_| Error::InternalInvariant("host tensor storage lock poisoned".to_string()))?;
        bytes[self.byte_offset..self.byte_offset + self.byte_len].copy_from_slice(data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::manager::HostMemoryManager;
    use crate::types::DataType;

    fn parent_handle(dims: Vec<usize>) -> HostTensorHandle {
        let info = TensorInfo::new(dims, DataType::QAsymmU8);
        let bytes = BytesMut::zeroed(info.num_bytes());
        HostTensorHandle::new(info, bytes, None).unwrap()
    }

    #[test]
    fn test_sub_tensor_aliases_parent() {
        let parent = parent_handle(vec![4, 3]);
        let view = HostTensorHandle::sub_tensor(&parent, &TensorShape::new(vec![2, 3]), &[1, 0]).unwrap();

        assert!(view.is_sub_tensor());
        assert!(view.shares_storage_with(&parent));
        assert_eq!(view.byte_offset(), 3);

        view.write(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(parent.read().unwrap(), vec![0, 0, 0, 1, 2, 3, 4, 5, 6, 0, 0, 0]);
    }

    #[test]
    fn test_non_contiguous_region_is_rejected() {
        let parent = parent_handle(vec![2, 4]);
        assert!(HostTensorHandle::sub_tensor(&parent, &TensorShape::new(vec![2, 2]), &[0, 0]).is_none());
        assert!(HostTensorHandle::sub_tensor(&parent, &TensorShape::new(vec![1, 2]), &[1, 2]).is_some());
        assert!(HostTensorHandle::sub_tensor(&parent, &TensorShape::new(vec![1, 4]), &[2, 0]).is_none());
    }

    #[test]
    fn test_out_of_range_origin_is_rejected() {
        let parent = parent_handle(vec![4, 2]);
        let sub_shape = TensorShape::new(vec![2, 2]);

        assert!(HostTensorHandle::sub_tensor(&parent, &sub_shape, &[usize::MAX, 0]).is_none());
        assert!(HostTensorHandle::sub_tensor(&parent, &sub_shape, &[3, 0]).is_none());
        assert!(HostTensorHandle::sub_tensor(&parent, &TensorShape::new(vec![1, 2]), &[0, usize::MAX]).is_none());
    }

    #[test]
    fn test_write_length_mismatch() {
        let handle = parent_handle(vec![2, 2]);
        assert!(matches!(handle.write(&[1, 2, 3]), Err(Error::InvalidTensor(_))));
    }

    #[test]
    fn test_buffer_returns_to_manager_on_drop() {
        let host = Arc::new(HostMemoryManager::new());
        host.acquire();
        let weak: Weak<dyn MemoryManager> = Arc::downgrade(&(Arc::clone(&host) as Arc<dyn MemoryManager>));

        let info = TensorInfo::new(vec![8], DataType::Float32);
        let handle = HostTensorHandle::new(info.clone(), host.allocate(info.num_bytes()), Some(weak)).unwrap();
        let view = HostTensorHandle::sub_tensor(&handle, &TensorShape::new(vec![4]), &[4]).unwrap();

        drop(handle);
        assert_eq!(host.pooled_buffers(), 0);
        drop(view);
        assert_eq!(host.pooled_buffers(), 1);
    }
}
