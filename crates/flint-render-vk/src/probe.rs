// SPDX-License-Identifier: CEPL-1.0
//! Physical device and queue family selection.

use crate::error::{RenderResult, VkCall, VkError};
use crate::support::SwapchainSupport;
use ash::khr::{surface, swapchain};
use ash::vk;
use std::ffi::{CStr, CString};
use tracing::{debug, info, warn};

pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

/// Queue family index per role. The three are always distinct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
}

impl QueueFamilies {
    pub fn indices(&self) -> [u32; 3] {
        [self.graphics, self.present, self.transfer]
    }
}

/// What the prober needs to know about the machine's devices.
pub trait DeviceQuery {
    type Device: Copy;

    fn devices(&self) -> RenderResult<Vec<Self::Device>>;
    fn device_name(&self, device: Self::Device) -> String;
    fn extension_names(&self, device: Self::Device) -> RenderResult<Vec<CString>>;
    fn swapchain_support(&self, device: Self::Device) -> RenderResult<SwapchainSupport>;
    fn queue_families(&self, device: Self::Device) -> Vec<vk::QueueFamilyProperties>;
    fn supports_present(&self, device: Self::Device, family: u32) -> RenderResult<bool>;
}

#[derive(Clone, Debug)]
pub struct Selection<D> {
    pub device: D,
    pub families: QueueFamilies,
    pub support: SwapchainSupport,
}

/// Single scan over the families; each family fills at most one role.
///
/// A graphics-capable family is claimed for graphics first, so a family that
/// can do both graphics and transfer never becomes the transfer family.
pub fn select_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> RenderResult<QueueFamilies>
where
    F: FnMut(u32) -> RenderResult<bool>,
{
    let mut graphics = None;
    let mut transfer = None;
    let mut present = None;

    for (index, props) in families.iter().enumerate() {
        let index = index as u32;
        let flags = props.queue_flags;

        if flags.contains(vk::QueueFlags::GRAPHICS) && graphics.is_none() {
            graphics = Some(index);
            continue;
        }
        if flags.contains(vk::QueueFlags::TRANSFER)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
            && transfer.is_none()
        {
            transfer = Some(index);
            continue;
        }
        if present.is_none() && supports_present(index)? {
            present = Some(index);
        }
        if graphics.is_some() && transfer.is_some() && present.is_some() {
            break;
        }
    }

    match (graphics, present, transfer) {
        (Some(graphics), Some(present), Some(transfer)) => Ok(QueueFamilies {
            graphics,
            present,
            transfer,
        }),
        _ => Err(VkError::NoQueueFamilies),
    }
}

/// First device that has the required extensions, an adequate surface and
/// three distinct queue families. Devices are not ranked.
pub fn select_physical_device<Q: DeviceQuery>(query: &Q) -> RenderResult<Selection<Q::Device>> {
    for device in query.devices()? {
        match probe_device(query, device) {
            Ok(Some(selection)) => {
                info!(
                    "device: {} (graphics={}, present={}, transfer={})",
                    query.device_name(device),
                    selection.families.graphics,
                    selection.families.present,
                    selection.families.transfer
                );
                return Ok(selection);
            }
            Ok(None) => {}
            Err(err) => warn!("skipping {}: {err}", query.device_name(device)),
        }
    }
    Err(VkError::NoSuitableDevice)
}

fn probe_device<Q: DeviceQuery>(
    query: &Q,
    device: Q::Device,
) -> RenderResult<Option<Selection<Q::Device>>> {
    let name = query.device_name(device);

    let extensions = query.extension_names(device)?;
    if let Some(missing) = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .find(|req| !extensions.iter().any(|e| e.as_c_str() == **req))
    {
        debug!("{name}: missing {missing:?}");
        return Ok(None);
    }

    let support = query.swapchain_support(device)?;
    if !support.is_adequate() {
        debug!("{name}: no surface formats or present modes");
        return Ok(None);
    }

    let props = query.queue_families(device);
    match select_queue_families(&props, |family| query.supports_present(device, family)) {
        Ok(families) => Ok(Some(Selection {
            device,
            families,
            support,
        })),
        Err(VkError::NoQueueFamilies) => {
            debug!("{name}: no distinct graphics/present/transfer families");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Live queries against an instance and one surface.
pub(crate) struct SurfaceQuery<'a> {
    pub instance: &'a ash::Instance,
    pub surface_loader: &'a surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl DeviceQuery for SurfaceQuery<'_> {
    type Device = vk::PhysicalDevice;

    fn devices(&self) -> RenderResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }.call("vkEnumeratePhysicalDevices")
    }

    fn device_name(&self, device: vk::PhysicalDevice) -> String {
        let props = unsafe { self.instance.get_physical_device_properties(device) };
        unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn extension_names(&self, device: vk::PhysicalDevice) -> RenderResult<Vec<CString>> {
        let props = unsafe { self.instance.enumerate_device_extension_properties(device) }
            .call("vkEnumerateDeviceExtensionProperties")?;
        Ok(props
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_owned())
            .collect())
    }

    fn swapchain_support(&self, device: vk::PhysicalDevice) -> RenderResult<SwapchainSupport> {
        unsafe { SwapchainSupport::query(self.surface_loader, device, self.surface) }
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(device)
        }
    }

    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> RenderResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, family, self.surface)
        }
        .call("vkGetPhysicalDeviceSurfaceSupportKHR")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tests::caps;
    use crate::support::PREFERRED_FORMAT;

    const G: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
    const T: vk::QueueFlags = vk::QueueFlags::TRANSFER;
    const C: vk::QueueFlags = vk::QueueFlags::COMPUTE;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[derive(Clone)]
    struct FakeGpu {
        name: &'static str,
        extensions: Vec<&'static CStr>,
        support: SwapchainSupport,
        families: Vec<vk::QueueFlags>,
        present: Vec<u32>,
        broken: bool,
    }

    impl FakeGpu {
        fn good(name: &'static str) -> Self {
            Self {
                name,
                extensions: vec![swapchain::NAME],
                support: SwapchainSupport::from_parts(
                    caps((800, 600), 2),
                    vec![PREFERRED_FORMAT],
                    vec![vk::PresentModeKHR::FIFO],
                ),
                families: vec![G | C | T, T, C],
                present: vec![0, 2],
                broken: false,
            }
        }
    }

    struct FakeMachine(Vec<FakeGpu>);

    impl DeviceQuery for FakeMachine {
        type Device = usize;

        fn devices(&self) -> RenderResult<Vec<usize>> {
            Ok((0..self.0.len()).collect())
        }

        fn device_name(&self, device: usize) -> String {
            self.0[device].name.to_owned()
        }

        fn extension_names(&self, device: usize) -> RenderResult<Vec<CString>> {
            if self.0[device].broken {
                return Err(VkError::Api {
                    call: "vkEnumerateDeviceExtensionProperties",
                    result: vk::Result::ERROR_INITIALIZATION_FAILED,
                });
            }
            Ok(self.0[device]
                .extensions
                .iter()
                .map(|e| (*e).to_owned())
                .collect())
        }

        fn swapchain_support(&self, device: usize) -> RenderResult<SwapchainSupport> {
            Ok(self.0[device].support.clone())
        }

        fn queue_families(&self, device: usize) -> Vec<vk::QueueFamilyProperties> {
            self.0[device].families.iter().map(|f| family(*f)).collect()
        }

        fn supports_present(&self, device: usize, family: u32) -> RenderResult<bool> {
            Ok(self.0[device].present.contains(&family))
        }
    }

    #[test]
    fn first_suitable_device_is_selected() {
        let mut no_ext = FakeGpu::good("no-ext");
        no_ext.extensions.clear();
        let machine = FakeMachine(vec![no_ext, FakeGpu::good("a"), FakeGpu::good("b")]);

        let sel = select_physical_device(&machine).unwrap();
        assert_eq!(sel.device, 1);
        assert_eq!(
            sel.families,
            QueueFamilies {
                graphics: 0,
                present: 2,
                transfer: 1
            }
        );
        assert_eq!(sel.support.formats, vec![PREFERRED_FORMAT]);
    }

    #[test]
    fn unsuitable_devices_report_no_suitable_device() {
        let mut no_formats = FakeGpu::good("no-formats");
        no_formats.support.formats.clear();
        let mut no_modes = FakeGpu::good("no-modes");
        no_modes.support.present_modes.clear();
        // Present only on the graphics family, which is already claimed.
        let mut shared = FakeGpu::good("shared-present");
        shared.present = vec![0];
        let mut broken = FakeGpu::good("broken");
        broken.broken = true;

        let machine = FakeMachine(vec![no_formats, no_modes, shared, broken]);
        assert!(matches!(
            select_physical_device(&machine),
            Err(VkError::NoSuitableDevice)
        ));
        assert!(matches!(
            select_physical_device(&FakeMachine(Vec::new())),
            Err(VkError::NoSuitableDevice)
        ));
    }

    #[test]
    fn combined_graphics_transfer_family_is_claimed_for_graphics() {
        let props = [family(G | T), family(G | T), family(T)];
        let families = select_queue_families(&props, |_| Ok(true)).unwrap();
        assert_eq!(
            families,
            QueueFamilies {
                graphics: 0,
                present: 1,
                transfer: 2
            }
        );

        // No transfer-only family: the scan does not fall back to a graphics one.
        let props = [family(G | T), family(G | T), family(C)];
        assert!(matches!(
            select_queue_families(&props, |_| Ok(true)),
            Err(VkError::NoQueueFamilies)
        ));
    }

    #[test]
    fn present_query_errors_propagate() {
        let props = [family(G), family(T), family(C)];
        let err = select_queue_families(&props, |_| {
            Err(VkError::Api {
                call: "vkGetPhysicalDeviceSurfaceSupportKHR",
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
            })
        })
        .unwrap_err();
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_SURFACE_LOST_KHR));
    }

    #[test]
    fn roles_are_always_distinct() {
        let choices = [
            vk::QueueFlags::empty(),
            G,
            T,
            C,
            G | T,
            T | C,
            G | C | T,
        ];
        let n = choices.len();
        for combo in 0..n.pow(4) {
            let props: Vec<_> = (0..4)
                .map(|slot| family(choices[combo / n.pow(slot) % n]))
                .collect();
            for present_mask in 0u32..16 {
                let result = select_queue_families(&props, |i| Ok(present_mask & (1 << i) != 0));
                let Ok(f) = result else { continue };

                assert_ne!(f.graphics, f.present);
                assert_ne!(f.graphics, f.transfer);
                assert_ne!(f.present, f.transfer);
                assert!(props[f.graphics as usize].queue_flags.contains(G));
                let t = props[f.transfer as usize].queue_flags;
                assert!(t.contains(T) && !t.contains(G));
                assert!(present_mask & (1 << f.present) != 0);
            }
        }
    }
}
