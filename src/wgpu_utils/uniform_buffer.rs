// src/wgpu_utils/uniform_buffer.rs
use std::marker::PhantomData;

fn short_type_name<T>() -> &'static str {
    let type_name = std::any::type_name::<T>();
    match type_name.rfind(':') {
        Some(pos) => &type_name[(pos + 1)..],
        None => type_name,
    }
}

/// Typed uniform buffer wrapper
pub struct UniformBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    previous_content: Vec<u8>,
}

impl<Content: bytemuck::Pod> UniformBuffer<Content> {
    /// Create a new uniform buffer
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("UniformBuffer: {}", short_type_name::<Content>())),
            size: std::mem::size_of::<Content>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        UniformBuffer {
            buffer,
            content_type: PhantomData,
            previous_content: Vec::new(),
        }
    }

    /// Create buffer with initial data
    pub fn new_with_data(device: &wgpu::Device, initial_content: &Content) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("UniformBuffer: {}", short_type_name::<Content>())),
            size: std::mem::size_of::<Content>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: true,
        });

        buffer
            .slice(..)
            .get_mapped_range_mut()
            .clone_from_slice(bytemuck::bytes_of(initial_content));
        buffer.unmap();

        UniformBuffer {
            buffer,
            content_type: PhantomData,
            previous_content: bytemuck::bytes_of(initial_content).to_vec(),
        }
    }

    /// Update buffer content (skips the write when nothing changed)
    pub fn update_content(&mut self, queue: &wgpu::Queue, content: Content) {
        let new_content = bytemuck::bytes_of(&content);
        if self.previous_content == new_content {
            return;
        }
        queue.write_buffer(&self.buffer, 0, new_content);
        self.previous_content = new_content.to_vec();
    }

    /// Overwrites one field of the content in place.
    ///
    /// `offset` must come from `std::mem::offset_of!` on `Content`, so the
    /// camera can push projection and view independently.
    pub fn update_field<Field: bytemuck::Pod>(
        &mut self,
        queue: &wgpu::Queue,
        offset: usize,
        field: &Field,
    ) {
        let bytes = bytemuck::bytes_of(field);
        debug_assert!(offset + bytes.len() <= std::mem::size_of::<Content>());

        if self.previous_content.len() == std::mem::size_of::<Content>() {
            if &self.previous_content[offset..offset + bytes.len()] == bytes {
                return;
            }
            self.previous_content[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        queue.write_buffer(&self.buffer, offset as u64, bytes);
    }

    /// Get binding resource
    pub fn binding_resource(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// Growable vertex-rate buffer holding per-instance data for one frame.
///
/// Every draw batch of the frame writes a disjoint range, so the whole buffer
/// is uploaded once before the first pass that reads it.
pub struct InstanceBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    capacity: usize,
    len: usize,
}

impl<Content: bytemuck::Pod> InstanceBuffer<Content> {
    pub fn new(device: &wgpu::Device, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        InstanceBuffer {
            buffer: Self::allocate(device, capacity),
            content_type: PhantomData,
            capacity,
            len: 0,
        }
    }

    fn allocate(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("InstanceBuffer<{}>", short_type_name::<Content>())),
            size: (capacity * std::mem::size_of::<Content>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Replaces the contents, growing to the next power of two when needed
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[Content]) {
        if data.len() > self.capacity {
            self.capacity = data.len().next_power_of_two();
            self.buffer.destroy();
            self.buffer = Self::allocate(device, self.capacity);
            log::debug!(
                "Grew InstanceBuffer<{}> to {} entries",
                short_type_name::<Content>(),
                self.capacity
            );
        }
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        }
        self.len = data.len();
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn destroy(&self) {
        self.buffer.destroy();
    }
}
