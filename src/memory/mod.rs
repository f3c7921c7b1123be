pub mod handle;
pub mod manager;

pub use handle::{HostTensorHandle, TensorHandle};
pub use manager::{HostMemoryManager, MemoryManager};
