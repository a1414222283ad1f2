use crate::{FerriteError, FerriteResult};

/// Queue capability bits. Values match `VkQueueFlagBits`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct QueueCapabilities(pub u32);

impl QueueCapabilities {
    pub const GRAPHICS: Self = Self(1 << 0);
    pub const COMPUTE: Self = Self(1 << 1);
    pub const TRANSFER: Self = Self(1 << 2);
    pub const SPARSE_BINDING: Self = Self(1 << 3);

    /// Bits that define what a family is "for". Sparse binding and vendor bits do not
    /// make a transfer family any less dedicated.
    const ROLE_MASK: u32 = Self::GRAPHICS.0 | Self::COMPUTE.0 | Self::TRANSFER.0;

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn role_bits(self) -> u32 {
        self.0 & Self::ROLE_MASK
    }
}

impl std::ops::BitOr for QueueCapabilities {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum QueueRole {
    Present,
    Graphics,
    Transfer,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub capabilities: QueueCapabilities,
    pub queue_count: u32,
    pub supports_present: bool,
}

impl QueueFamilyInfo {
    /// Graphics and compute families accept transfer commands even when they do not
    /// advertise the transfer bit.
    pub fn supports(&self, capability: QueueCapabilities) -> bool {
        if self.queue_count == 0 {
            return false;
        }
        if self.capabilities.contains(capability) {
            return true;
        }
        capability == QueueCapabilities::TRANSFER
            && (self.capabilities.contains(QueueCapabilities::GRAPHICS)
                || self.capabilities.contains(QueueCapabilities::COMPUTE))
    }

    fn is_dedicated_to(&self, capability: QueueCapabilities) -> bool {
        self.queue_count > 0 && self.capabilities.role_bits() == capability.0
    }
}

#[derive(Clone, Debug)]
pub struct PhysicalDeviceInfo {
    pub name: String,
    pub queue_families: Vec<QueueFamilyInfo>,
    /// Whether the device exposes the swap chain extension.
    pub supports_swapchain: bool,
}

impl PhysicalDeviceInfo {
    /// Needs swap chain support, a graphics family and a family that can present to
    /// the surface.
    pub fn is_eligible(&self) -> bool {
        if !self.supports_swapchain {
            return false;
        }

        let graphics = self
            .queue_families
            .iter()
            .any(|f| f.supports(QueueCapabilities::GRAPHICS));
        let present = self
            .queue_families
            .iter()
            .any(|f| f.supports_present && f.queue_count > 0);
        graphics && present
    }
}

/// Picks the caller's preferred device when it is eligible, otherwise the first
/// eligible device in enumeration order.
pub fn select_physical_device(
    devices: &[PhysicalDeviceInfo],
    preferred: Option<usize>,
) -> FerriteResult<usize> {
    if let Some(index) = preferred {
        match devices.get(index) {
            Some(device) if device.is_eligible() => return Ok(index),
            Some(device) => log::warn!(
                "Preferred device {} ({}) cannot render to the surface, scanning for another",
                index,
                device.name
            ),
            None => log::warn!(
                "Preferred device {} does not exist ({} devices found)",
                index,
                devices.len()
            ),
        }
    }

    devices
        .iter()
        .position(PhysicalDeviceInfo::is_eligible)
        .ok_or(FerriteError::NoEligibleDevice)
}

/// The present-capable family with the most queues; ties keep the lowest index.
pub fn select_present_queue(families: &[QueueFamilyInfo]) -> Option<u32> {
    let mut best: Option<&QueueFamilyInfo> = None;
    for family in families.iter().filter(|f| f.supports_present && f.queue_count > 0) {
        if best.is_none_or(|b| family.queue_count > b.queue_count) {
            best = Some(family);
        }
    }
    best.map(|f| f.index)
}

/// Selects a family for `capability`:
/// 1. a family dedicated to exactly that capability,
/// 2. the present family if it is compatible,
/// 3. the compatible family with the most queues that is not in `taken`,
///    falling back to any compatible family.
pub fn select_preferred_queue(
    families: &[QueueFamilyInfo],
    capability: QueueCapabilities,
    present_family: u32,
    taken: &[u32],
) -> Option<u32> {
    if let Some(dedicated) = families.iter().find(|f| f.is_dedicated_to(capability)) {
        return Some(dedicated.index);
    }

    if let Some(present) = families.iter().find(|f| f.index == present_family) {
        if present.supports(capability) {
            return Some(present.index);
        }
    }

    let most_queues = |candidates: &mut dyn Iterator<Item = &QueueFamilyInfo>| {
        let mut best: Option<&QueueFamilyInfo> = None;
        for family in candidates {
            if best.is_none_or(|b| family.queue_count > b.queue_count) {
                best = Some(family);
            }
        }
        best.map(|f| f.index)
    };

    most_queues(
        &mut families
            .iter()
            .filter(|f| f.supports(capability) && !taken.contains(&f.index)),
    )
    .or_else(|| most_queues(&mut families.iter().filter(|f| f.supports(capability))))
}

/// Queue family chosen for each role.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QueueAssignment {
    pub present: u32,
    pub graphics: u32,
    pub transfer: u32,
}

impl QueueAssignment {
    pub fn family(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Present => self.present,
            QueueRole::Graphics => self.graphics,
            QueueRole::Transfer => self.transfer,
        }
    }

    /// Distinct family indices in ascending order; a family serving several roles
    /// appears once.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = vec![self.present, self.graphics, self.transfer];
        families.sort_unstable();
        families.dedup();
        families
    }

    /// Uploads need a release/acquire ownership hand-off.
    pub fn has_split_transfer(&self) -> bool {
        self.transfer != self.graphics
    }

    pub fn has_split_present(&self) -> bool {
        self.present != self.graphics
    }
}

pub fn assign_queue_families(families: &[QueueFamilyInfo]) -> FerriteResult<QueueAssignment> {
    let present = select_present_queue(families).ok_or(FerriteError::NoEligibleDevice)?;
    let graphics = select_preferred_queue(families, QueueCapabilities::GRAPHICS, present, &[])
        .ok_or(FerriteError::NoEligibleDevice)?;
    let transfer = select_preferred_queue(families, QueueCapabilities::TRANSFER, present, &[graphics])
        .ok_or(FerriteError::NoEligibleDevice)?;

    Ok(QueueAssignment { present, graphics, transfer })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(index: u32, capabilities: QueueCapabilities, queue_count: u32, supports_present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo { index, capabilities, queue_count, supports_present }
    }

    const G: QueueCapabilities = QueueCapabilities::GRAPHICS;
    const C: QueueCapabilities = QueueCapabilities::COMPUTE;
    const T: QueueCapabilities = QueueCapabilities::TRANSFER;

    #[test]
    fn single_shared_family_serves_every_role() {
        let families = [family(0, G | C | T, 2, true)];
        let assignment = assign_queue_families(&families).unwrap();

        assert_eq!(assignment, QueueAssignment { present: 0, graphics: 0, transfer: 0 });
        assert_eq!(assignment.unique_families(), vec![0]);
        assert!(!assignment.has_split_transfer());
    }

    #[test]
    fn dedicated_transfer_family_is_preferred() {
        let families = [
            family(0, G | C | T, 16, true),
            family(1, C | T, 2, false),
            family(2, T | QueueCapabilities::SPARSE_BINDING, 1, false),
        ];
        let assignment = assign_queue_families(&families).unwrap();

        assert_eq!(assignment.present, 0);
        assert_eq!(assignment.graphics, 0);
        assert_eq!(assignment.transfer, 2);
        assert!(assignment.has_split_transfer());
        assert_eq!(assignment.unique_families(), vec![0, 2]);
    }

    #[test]
    fn present_prefers_most_queues_and_lowest_index_on_ties() {
        let families = [
            family(0, G, 1, true),
            family(1, C, 4, true),
            family(2, T, 4, true),
        ];
        assert_eq!(select_present_queue(&families), Some(1));
    }

    #[test]
    fn falls_back_to_family_with_most_queues() {
        // Present-only family, two graphics families with no dedicated graphics queue.
        let families = [
            family(0, QueueCapabilities(0), 1, true),
            family(1, G | C, 1, false),
            family(2, G | C | T, 8, false),
        ];
        assert_eq!(select_preferred_queue(&families, G, 0, &[]), Some(2));
        assert_eq!(select_preferred_queue(&families, G, 0, &[2]), Some(1));
    }

    #[test]
    fn preferred_queue_always_supports_the_capability() {
        let flag_sets = [
            QueueCapabilities(0),
            G,
            C,
            T,
            G | C,
            G | T,
            C | T,
            G | C | T,
            T | QueueCapabilities::SPARSE_BINDING,
        ];

        for a in flag_sets {
            for b in flag_sets {
                for c in flag_sets {
                    for counts in [[1, 1, 1], [0, 2, 1], [3, 0, 2]] {
                        let families = [
                            family(0, a, counts[0], true),
                            family(1, b, counts[1], false),
                            family(2, c, counts[2], true),
                        ];
                        for capability in [G, C, T] {
                            for present in 0..3 {
                                if let Some(index) = select_preferred_queue(&families, capability, present, &[]) {
                                    let chosen = &families[index as usize];
                                    assert!(
                                        chosen.supports(capability),
                                        "family {:?} lacks {:?}",
                                        chosen,
                                        capability
                                    );
                                } else {
                                    assert!(!families.iter().any(|f| f.supports(capability)));
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn device_selection_honors_eligible_preference() {
        let headless = PhysicalDeviceInfo {
            name: "compute".into(),
            queue_families: vec![family(0, C | T, 1, false)],
            supports_swapchain: true,
        };
        let integrated = PhysicalDeviceInfo {
            name: "integrated".into(),
            queue_families: vec![family(0, G | C | T, 1, true)],
            supports_swapchain: true,
        };
        let discrete = PhysicalDeviceInfo {
            name: "discrete".into(),
            queue_families: vec![family(0, G | C | T, 16, false), family(1, T, 1, true)],
            supports_swapchain: true,
        };
        let devices = vec![headless, integrated, discrete];

        assert_eq!(select_physical_device(&devices, None).unwrap(), 1);
        assert_eq!(select_physical_device(&devices, Some(2)).unwrap(), 2);
        assert_eq!(select_physical_device(&devices, Some(0)).unwrap(), 1);
        assert_eq!(select_physical_device(&devices, Some(9)).unwrap(), 1);
    }

    #[test]
    fn devices_without_swapchain_support_are_skipped() {
        let offscreen = PhysicalDeviceInfo {
            name: "offscreen".into(),
            queue_families: vec![family(0, G | C | T, 16, true)],
            supports_swapchain: false,
        };
        let integrated = PhysicalDeviceInfo {
            name: "integrated".into(),
            queue_families: vec![family(0, G | C | T, 1, true)],
            supports_swapchain: true,
        };
        assert!(!offscreen.is_eligible());

        let devices = vec![offscreen, integrated];
        assert_eq!(select_physical_device(&devices, Some(0)).unwrap(), 1);
        assert!(matches!(
            select_physical_device(&devices[..1], None),
            Err(FerriteError::NoEligibleDevice)
        ));
    }

    #[test]
    fn no_eligible_device_is_an_error() {
        let devices = vec![PhysicalDeviceInfo {
            name: "compute".into(),
            queue_families: vec![family(0, C | T, 1, true)],
            supports_swapchain: true,
        }];
        assert!(matches!(
            select_physical_device(&devices, None),
            Err(FerriteError::NoEligibleDevice)
        ));
    }
}
