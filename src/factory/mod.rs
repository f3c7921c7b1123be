pub mod registry;

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use crate::error::Result;
use crate::memory::{HostTensorHandle, MemoryManager, TensorHandle};
use crate::types::{FactoryId, TensorInfo, TensorShape};

pub use registry::{DuplicateFactoryPolicy, TensorHandleFactoryRegistry};

/// Capability producing tensor handles for one memory representation
pub trait TensorHandleFactory: Send + Sync + Debug {
    /// Identifier of the representation this factory materializes
    fn id(&self) -> &FactoryId;

    /// Create a handle owning memory for `info`
    fn create_tensor_handle(&self, info: &TensorInfo) -> Result<Box<dyn TensorHandle>>;

    /// Create a handle aliasing a region of `parent` without copying.
    ///
    /// `None` is not an error: the caller falls back to a full copy.
    fn create_sub_tensor_handle(
        &self,
        parent: &dyn TensorHandle,
        sub_shape: &TensorShape,
        origin: &[usize],
    ) -> Option<Box<dyn TensorHandle>>;

    /// Whether `create_sub_tensor_handle` can ever succeed
    fn supports_sub_tensors(&self) -> bool;

    /// The memory manager backing this factory, if it is still alive
    fn memory_manager(&self) -> Option<Arc<dyn MemoryManager>> {
        None
    }
}

/// Factory creating host-memory tensor handles through a shared memory manager
#[derive(Debug)]
pub struct HostTensorHandleFactory {
    id: FactoryId,
    memory_manager: Weak<dyn MemoryManager>,
    sub_tensors: bool,
}

impl HostTensorHandleFactory {
    /// Create a new host factory
    pub fn new(id: impl Into<FactoryId>, memory_manager: &Arc<dyn MemoryManager>, sub_tensors: bool) -> Self {
        Self {
            id: id.into(),
            memory_manager: Arc::downgrade(memory_manager),
            sub_tensors,
        }
    }
}

impl TensorHandleFactory for HostTensorHandleFactory {
    fn id(&self) -> &FactoryId {
        &self.id
    }

    fn create_tensor_handle(&self, info: &TensorInfo) -> Result<Box<dyn TensorHandle>> {
        info.validate()?;

        let bytes = match self.memory_manager.upgrade() {
            Some(manager) => manager.allocate(info.num_bytes()),
            None => bytes::BytesMut::zeroed(info.num_bytes()),
        };

        let handle = HostTensorHandle::new(info.clone(), bytes, Some(self.memory_manager.clone()))?;
        Ok(Box::new(handle))
    }

    fn create_sub_tensor_handle(
        &self,
        parent: &dyn TensorHandle,
        sub_shape: &TensorShape,
        origin: &[usize],
    ) -> Option<Box<dyn TensorHandle>> {
        if !self.sub_tensors {
            return None;
        }

        let parent = parent.as_any().downcast_ref::<HostTensorHandle>()?;
        let view = HostTensorHandle::sub_tensor(parent, sub_shape, origin)?;
        Some(Box::new(view))
    }

    fn supports_sub_tensors(&self) -> bool {
        self.sub_tensors
    }

    fn memory_manager(&self) -> Option<Arc<dyn MemoryManager>> {
        self.memory_manager.upgrade()
    }
}
