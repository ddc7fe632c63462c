// Vulkan Device - GPU selection and logical device
//
// Responsibilities:
// - Physical device selection (prefer discrete GPU, else the first one)
// - Required extension check (swapchain)
// - Graphics / present queue family resolution
// - Logical device + queue creation

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;
use std::ffi::{c_char, CStr};

use super::context::VulkanContext;
use super::error::{BringupError, BringupResult, VkResultExt};

/// Device extensions we cannot run without.
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [SwapchainLoader::name()]
}

/// Queue family roles as discovered by a scan; either may still be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan every family in index order.
    ///
    /// The scan never stops early: a later graphics-capable family replaces
    /// an earlier one, and the same goes for presentation support. Which
    /// queue the triangle goes through depends on this, so keep it.
    pub fn scan<F>(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: F,
    ) -> BringupResult<Self>
    where
        F: FnMut(u32) -> BringupResult<bool>,
    {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if supports_present(index)? {
                indices.present = Some(index);
            }
        }

        Ok(indices)
    }

    pub fn resolve(self) -> BringupResult<QueueFamilies> {
        let graphics = self.graphics.ok_or(BringupError::NoGraphicsQueueFamily)?;
        let present = self.present.ok_or(BringupError::NoPresentQueueFamily)?;
        Ok(QueueFamilies { graphics, present })
    }
}

/// Resolved queue families. Both roles may point at the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Families that need a queue-create entry; the API rejects duplicates.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Index of the first discrete GPU, or 0 when there is none.
pub fn pick_device_index(device_types: &[vk::PhysicalDeviceType]) -> BringupResult<usize> {
    if device_types.is_empty() {
        return Err(BringupError::NoPhysicalDevice);
    }

    Ok(device_types
        .iter()
        .position(|&ty| ty == vk::PhysicalDeviceType::DISCRETE_GPU)
        .unwrap_or(0))
}

pub fn check_required_extensions(
    available: &[vk::ExtensionProperties],
    required: &[&CStr],
) -> BringupResult<()> {
    for &name in required {
        let found = available.iter().any(|props| extension_name(props) == name);
        if !found {
            return Err(BringupError::MissingExtension(name.to_string_lossy().into_owned()));
        }
    }
    Ok(())
}

fn extension_name(props: &vk::ExtensionProperties) -> &CStr {
    // Vulkan guarantees a NUL terminated name inside the fixed array
    unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }
}

/// Logical device plus the handles derived directly from it.
pub struct VulkanDevice {
    pub device: ash::Device,
    pub swapchain_loader: SwapchainLoader,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl VulkanDevice {
    pub fn new(context: &VulkanContext) -> BringupResult<Self> {
        let instance = &context.instance;

        // Step 1: Pick physical device (GPU)
        let (physical_device, properties) = Self::pick_physical_device(instance)?;

        log::info!(
            "Selected GPU: {} ({:?})",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
            properties.device_type
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        // Step 2: Extensions. No other device is tried if this one lacks them.
        let required = required_device_extensions();
        let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .rejected_by("vkEnumerateDeviceExtensionProperties")?;
        check_required_extensions(&available, &required)?;

        // Step 3: Queue families
        let queue_families = Self::find_queue_families(context, physical_device)?;
        log::info!(
            "Queue families: graphics = {}, present = {}",
            queue_families.graphics,
            queue_families.present
        );

        // Step 4: Logical device
        let device =
            Self::create_logical_device(instance, physical_device, queue_families, &required)?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            swapchain_loader,
            physical_device,
            queue_families,
            graphics_queue,
            present_queue,
        })
    }

    fn pick_physical_device(
        instance: &ash::Instance,
    ) -> BringupResult<(vk::PhysicalDevice, vk::PhysicalDeviceProperties)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .rejected_by("vkEnumeratePhysicalDevices")?;

        let properties: Vec<_> = devices
            .iter()
            .map(|&device| unsafe { instance.get_physical_device_properties(device) })
            .collect();
        let types: Vec<_> = properties.iter().map(|props| props.device_type).collect();

        let index = pick_device_index(&types)?;
        if types[index] != vk::PhysicalDeviceType::DISCRETE_GPU {
            log::info!("Discrete GPU not found, falling back to the first enumerated device");
        }

        Ok((devices[index], properties[index]))
    }

    fn find_queue_families(
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> BringupResult<QueueFamilies> {
        let families = unsafe {
            context
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        QueueFamilyIndices::scan(&families, |index| {
            unsafe {
                context.surface_loader.get_physical_device_surface_support(
                    physical_device,
                    index,
                    context.surface,
                )
            }
            .rejected_by("vkGetPhysicalDeviceSurfaceSupportKHR")
        })?
        .resolve()
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilies,
        extensions: &[&CStr],
    ) -> BringupResult<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extension_names: Vec<*const c_char> =
            extensions.iter().map(|name| name.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .rejected_by("vkCreateDevice")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> BringupResult<()> {
        unsafe { self.device.device_wait_idle() }.rejected_by("vkDeviceWaitIdle")
    }
}

/// The owner must have waited for the device to go idle already.
impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        unsafe {
            self.device.destroy_device(None);
        }
    }
}
