use crate::{FerriteError, FerriteResult};

/// Memory property bits. Values match `VkMemoryPropertyFlagBits` so backends can pass
/// the raw mask through unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct MemoryPropertyFlags(pub u32);

impl MemoryPropertyFlags {
    pub const DEVICE_LOCAL: Self = Self(1 << 0);
    pub const HOST_VISIBLE: Self = Self(1 << 1);
    pub const HOST_COHERENT: Self = Self(1 << 2);
    pub const HOST_CACHED: Self = Self(1 << 3);
    pub const LAZILY_ALLOCATED: Self = Self(1 << 4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MemoryPropertyFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Where a resource should live.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemoryLocation {
    /// Device-local, not mappable. Filled through the staging pipeline.
    GpuOnly,
    /// Host-visible and persistently mapped.
    CpuToGpu,
}

impl MemoryLocation {
    pub fn required_flags(self) -> MemoryPropertyFlags {
        match self {
            MemoryLocation::GpuOnly => MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryLocation::CpuToGpu => MemoryPropertyFlags::HOST_VISIBLE,
        }
    }
}

/// Returns the lowest memory type index allowed by `type_bits` that carries every
/// `required` property.
pub fn find_memory_type(
    memory_types: &[MemoryPropertyFlags],
    type_bits: u32,
    required: MemoryPropertyFlags,
) -> FerriteResult<u32> {
    memory_types
        .iter()
        .enumerate()
        .take(32)
        .find(|(index, flags)| type_bits & (1 << index) != 0 && flags.contains(required))
        .map(|(index, _)| index as u32)
        .ok_or(FerriteError::NoMatchingMemoryType { type_bits, required: required.0 })
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value - value % alignment
}

/// Expands `[offset, offset + len)` so both ends land on `atom` boundaries.
/// Returns `(offset, size)` suitable for a mapped-range flush.
pub fn flush_range(offset: u64, len: u64, atom: u64) -> (u64, u64) {
    let start = align_down(offset, atom);
    let end = align_up(offset + len, atom);
    (start, end - start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_allowed_type_with_required_flags() {
        let types = [
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryPropertyFlags::DEVICE_LOCAL | MemoryPropertyFlags::HOST_VISIBLE,
        ];

        assert_eq!(find_memory_type(&types, 0b111, MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 1);
        assert_eq!(find_memory_type(&types, 0b101, MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 2);
        assert_eq!(find_memory_type(&types, 0b111, MemoryPropertyFlags::HOST_VISIBLE).unwrap(), 0);
    }

    #[test]
    fn reports_missing_memory_type() {
        let types = [MemoryPropertyFlags::HOST_VISIBLE];
        let err = find_memory_type(&types, 0b1, MemoryPropertyFlags::DEVICE_LOCAL).unwrap_err();
        assert!(matches!(err, FerriteError::NoMatchingMemoryType { type_bits: 1, required: 1 }));
    }

    #[test]
    fn type_bits_outside_the_table_are_ignored() {
        let types = [MemoryPropertyFlags::DEVICE_LOCAL];
        assert!(find_memory_type(&types, 0b10, MemoryPropertyFlags::DEVICE_LOCAL).is_err());
    }

    #[test]
    fn flush_range_never_under_flushes() {
        assert_eq!(flush_range(0, 1, 64), (0, 64));
        assert_eq!(flush_range(0, 64, 64), (0, 64));
        assert_eq!(flush_range(0, 65, 64), (0, 128));
        assert_eq!(flush_range(100, 10, 64), (64, 64));
        assert_eq!(flush_range(120, 10, 64), (64, 128));
        assert_eq!(flush_range(7, 13, 1), (7, 13));
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(64, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_down(511, 256), 256);
        assert_eq!(align_up(13, 0), 13);
    }
}
