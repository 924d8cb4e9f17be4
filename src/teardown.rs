use vulkanalia::vk;

/// Device-lifetime objects, released when the context is destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceObject {
    CommandPool(vk::CommandPool),
    RenderPass(vk::RenderPass),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    Buffer(vk::Buffer),
    Memory(vk::DeviceMemory),
}

/// Objects recorded in creation order and released in exact reverse order.
#[derive(Debug)]
pub struct TeardownList<T> {
    entries: Vec<T>,
}

impl<T> Default for TeardownList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> TeardownList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: T) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Yields newest first, leaving the list empty.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.entries.drain(..).rev()
    }
}
