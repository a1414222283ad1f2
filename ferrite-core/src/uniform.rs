use crate::device::{Buffer, BufferDescriptor, BufferUsage, Device, DeviceLimits};
use crate::memory::{align_up, flush_range, MemoryLocation};
use crate::{FerriteError, FerriteResult};

/// A column-major 4x4 model transform.
pub type Transform = [f32; 16];

pub const IDENTITY: Transform = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

pub const TRANSFORM_SIZE: u64 = std::mem::size_of::<Transform>() as u64;

/// Distance between consecutive transforms so every dynamic offset honors the device's
/// minimum uniform offset alignment.
pub fn uniform_stride(min_alignment: u64) -> u64 {
    align_up(TRANSFORM_SIZE, min_alignment)
}

/// One persistently mapped uniform buffer holding a transform slot per mesh, repeated
/// once per frame in flight. A frame only writes its own region, and only after its
/// fence shows the previous use of that region has finished, so transform updates
/// never reach a frame the GPU is still reading.
pub struct UniformArena<D: Device> {
    buffer: D::Buffer,
    stride: u64,
    capacity: u32,
    frames: u32,
    atom_size: u64,
}

impl<D: Device> UniformArena<D> {
    pub fn new(device: &D, limits: DeviceLimits, capacity: u32, frames: u32) -> FerriteResult<Self> {
        let stride = uniform_stride(limits.min_uniform_buffer_offset_alignment);
        let frames = frames.max(1);
        let buffer = device.create_buffer(&BufferDescriptor {
            label: "mesh transforms",
            size: stride * capacity.max(1) as u64 * frames as u64,
            usage: BufferUsage::UNIFORM,
            location: MemoryLocation::CpuToGpu,
        })?;

        log::debug!(
            "Uniform arena: {} slots x {} frames, stride {} bytes",
            capacity, frames, stride
        );

        Ok(Self {
            buffer,
            stride,
            capacity,
            frames,
            atom_size: limits.non_coherent_atom_size,
        })
    }

    /// Byte offset of `slot` inside the region of frame `frame`.
    pub fn offset(&self, frame: u32, slot: u32) -> FerriteResult<u32> {
        if slot >= self.capacity {
            return Err(FerriteError::DescriptorPoolExhausted { capacity: self.capacity });
        }
        if frame >= self.frames {
            return Err(FerriteError::BackendError(format!(
                "Frame region {} out of range ({} regions)",
                frame, self.frames
            )));
        }
        let index = frame as u64 * self.capacity as u64 + slot as u64;
        u32::try_from(self.stride * index).map_err(|_| {
            FerriteError::ResourceCreationFailed(format!("Uniform offset for slot {} overflows", slot))
        })
    }

    pub fn write(&self, frame: u32, slot: u32, transform: &Transform) -> FerriteResult<()> {
        let offset = self.offset(frame, slot)? as u64;
        self.buffer.write_data(offset, bytemuck::cast_slice(transform))?;
        let (start, size) = flush_range(offset, TRANSFORM_SIZE, self.atom_size);
        self.buffer.flush(start, size)
    }

    pub fn read(&self, frame: u32, slot: u32) -> FerriteResult<Transform> {
        let offset = self.offset(frame, slot)? as u64;
        let mut transform = [0.0f32; 16];
        self.buffer
            .read_data(offset, bytemuck::cast_slice_mut(&mut transform))?;
        Ok(transform)
    }

    pub fn buffer(&self) -> &D::Buffer {
        &self.buffer
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDevice, MockSettings};

    #[test]
    fn offsets_are_aligned_and_disjoint() {
        for alignment in [1u64, 16, 64, 256] {
            let device = MockDevice::new(MockSettings {
                min_uniform_alignment: alignment,
                ..MockSettings::default()
            });
            let arena = UniformArena::new(&device, device.limits(), 8, 3).unwrap();

            let mut ranges = Vec::new();
            for frame in 0..3 {
                for slot in 0..8 {
                    let offset = arena.offset(frame, slot).unwrap() as u64;
                    assert_eq!(offset % alignment, 0);
                    ranges.push(offset..offset + TRANSFORM_SIZE);
                }
            }
            for (i, a) in ranges.iter().enumerate() {
                for b in &ranges[i + 1..] {
                    assert!(a.end <= b.start, "{:?} overlaps {:?} at alignment {}", a, b, alignment);
                }
            }
            assert!(ranges.last().unwrap().end <= arena.buffer().size());
        }
    }

    #[test]
    fn writes_land_in_their_own_slot() {
        let device = MockDevice::new(MockSettings::default());
        let arena = UniformArena::new(&device, device.limits(), 4, 2).unwrap();

        let mut scaled = IDENTITY;
        scaled[0] = 2.0;
        arena.write(0, 0, &IDENTITY).unwrap();
        arena.write(0, 1, &scaled).unwrap();

        assert_eq!(arena.read(0, 0).unwrap(), IDENTITY);
        assert_eq!(arena.read(0, 1).unwrap(), scaled);
        assert_eq!(arena.read(0, 2).unwrap(), [0.0; 16]);
        assert_eq!(arena.read(1, 1).unwrap(), [0.0; 16]);
    }

    #[test]
    fn frame_regions_are_independent() {
        let device = MockDevice::new(MockSettings::default());
        let arena = UniformArena::new(&device, device.limits(), 2, 2).unwrap();

        let mut moved = IDENTITY;
        moved[12] = 1.5;
        arena.write(0, 1, &IDENTITY).unwrap();
        arena.write(1, 1, &moved).unwrap();

        assert_eq!(arena.read(0, 1).unwrap(), IDENTITY);
        assert_eq!(arena.read(1, 1).unwrap(), moved);
        assert_eq!(arena.offset(1, 0).unwrap() as u64, 2 * arena.stride());
        assert!(arena.offset(2, 0).is_err());
    }

    #[test]
    fn slots_past_capacity_are_rejected() {
        let device = MockDevice::new(MockSettings::default());
        let arena = UniformArena::new(&device, device.limits(), 2, 1).unwrap();
        assert!(matches!(
            arena.write(0, 2, &IDENTITY),
            Err(FerriteError::DescriptorPoolExhausted { capacity: 2 })
        ));
    }
}
