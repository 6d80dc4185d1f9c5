// SPDX-License-Identifier: CEPL-1.0
use crate::error::{RenderResult, VkCall};
use crate::probe::{QueueFamilies, REQUIRED_DEVICE_EXTENSIONS};
use ash::vk;
use std::ffi::c_char;

#[derive(Clone, Copy, Debug)]
pub struct TaggedQueue {
    pub family: u32,
    pub queue: vk::Queue,
}

/// Physical + logical device and the three role queues.
///
/// Created once after device selection; never mutated by the frame loop.
pub struct DeviceContext {
    pub physical: vk::PhysicalDevice,
    pub device: ash::Device,
    pub graphics: TaggedQueue,
    pub present: TaggedQueue,
    pub transfer: TaggedQueue,
    pub memory: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceContext {
    /// # Safety
    /// `physical` must come from `instance`, and `families` must be three
    /// distinct valid family indices of it.
    pub(crate) unsafe fn create(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        families: QueueFamilies,
    ) -> RenderResult<Self> {
        let priorities = [1.0_f32];
        let queue_infos = families.indices().map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        });

        let extensions: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|e| e.as_ptr())
            .collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };

        let device = unsafe { instance.create_device(physical, &info, None) }
            .call("vkCreateDevice")?;

        let tag = |family: u32| TaggedQueue {
            family,
            queue: unsafe { device.get_device_queue(family, 0) },
        };
        let graphics = tag(families.graphics);
        let present = tag(families.present);
        let transfer = tag(families.transfer);
        let memory = unsafe { instance.get_physical_device_memory_properties(physical) };

        Ok(Self {
            physical,
            device,
            graphics,
            present,
            transfer,
            memory,
        })
    }

    pub fn families(&self) -> QueueFamilies {
        QueueFamilies {
            graphics: self.graphics.family,
            present: self.present.family,
            transfer: self.transfer.family,
        }
    }

    /// # Safety
    /// Every object created from this device must already be destroyed.
    pub(crate) unsafe fn destroy(&self) {
        unsafe { self.device.destroy_device(None) };
    }
}
