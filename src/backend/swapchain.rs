// Swapchain - Window presentation
//
// Negotiates format / present mode / extent / image count with the surface,
// creates the chain of presentable images and one view per image.

use ash::vk;

use super::context::VulkanContext;
use super::device::{QueueFamilies, VulkanDevice};
use super::error::{BringupError, BringupResult, VkResultExt};

/// Everything the surface reports about what it can present.
///
/// Queried right before the swapchain is built and dropped right after.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> BringupResult<Self> {
        let loader = &context.surface_loader;
        let surface = context.surface;

        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .rejected_by("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .rejected_by("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .rejected_by("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
            })
        }
    }

    /// Pick the swapchain parameters for a window of `requested` size.
    pub fn negotiate(&self, requested: vk::Extent2D) -> BringupResult<SwapchainConfig> {
        let surface_format = choose_surface_format(&self.formats);
        let present_mode = choose_present_mode(&self.present_modes);

        let (Some(surface_format), Some(present_mode)) = (surface_format, present_mode) else {
            return Err(BringupError::NoSwapchainConfiguration {
                formats: self.formats.len(),
                present_modes: self.present_modes.len(),
            });
        };

        Ok(SwapchainConfig {
            surface_format,
            present_mode,
            extent: choose_extent(&self.capabilities, requested),
            image_count: choose_image_count(&self.capabilities),
            pre_transform: self.capabilities.current_transform,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// BGRA8 with the standard non-linear colour space if offered, otherwise
/// whatever comes first. `None` only for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX (triple buffering) when available, otherwise FIFO, which every
/// implementation must support. `None` only for an empty list.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> Option<vk::PresentModeKHR> {
    if present_modes.is_empty() {
        return None;
    }

    Some(
        present_modes
            .iter()
            .copied()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO),
    )
}

/// The surface dictates the extent unless it reports the `u32::MAX` sentinel,
/// in which case the requested size is clamped into the supported range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: requested
            .width
            .max(caps.min_image_extent.width)
            .min(caps.max_image_extent.width),
        height: requested
            .height
            .max(caps.min_image_extent.height)
            .min(caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 = no maximum).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// How swapchain images are shared between the graphics and present queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSharing {
    pub mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
}

impl ImageSharing {
    /// Concurrent sharing across both families when they differ, so no
    /// ownership transfer barriers are needed. Exclusive otherwise.
    pub fn for_families(families: QueueFamilies) -> Self {
        if families.is_shared() {
            Self {
                mode: vk::SharingMode::EXCLUSIVE,
                queue_family_indices: Vec::new(),
            }
        } else {
            Self {
                mode: vk::SharingMode::CONCURRENT,
                queue_family_indices: vec![families.graphics, families.present],
            }
        }
    }
}

/// Swapchain handle with its images and views.
///
/// `images` belong to the presentation engine; `image_views` are ours.
#[derive(Debug, Default)]
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create the swapchain and read back its images.
    ///
    /// Views are made separately by [`create_image_views`].
    pub fn create(
        context: &VulkanContext,
        device: &VulkanDevice,
        config: &SwapchainConfig,
    ) -> BringupResult<Self> {
        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images requested",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.present_mode,
            config.image_count
        );

        let sharing = ImageSharing::for_families(device.queue_families);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing.mode)
            .queue_family_indices(&sharing.queue_family_indices)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);

        let loader = &device.swapchain_loader;
        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .rejected_by("vkCreateSwapchainKHR")?;

        // The implementation may hand back more images than we asked for
        let images = match unsafe { loader.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(result) => {
                unsafe { loader.destroy_swapchain(handle, None) };
                return Err(BringupError::Rejected {
                    call: "vkGetSwapchainImagesKHR",
                    result,
                });
            }
        };

        log::info!("Created swapchain with {} images", images.len());

        Ok(Self {
            handle,
            images,
            image_views: Vec::new(),
            format: config.surface_format.format,
            extent: config.extent,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// One colour view per swapchain image, in image order.
pub fn create_image_views(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> BringupResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        match unsafe { device.create_image_view(&create_info, None) } {
            Ok(view) => views.push(view),
            Err(result) => {
                for view in views {
                    unsafe { device.destroy_image_view(view, None) };
                }
                return Err(BringupError::Rejected {
                    call: "vkCreateImageView",
                    result,
                });
            }
        }
    }

    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUESTED: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn caps(min_images: u32, max_images: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_images,
            max_image_count: max_images,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn prefers_bgra_srgb_nonlinear() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn format_falls_back_to_first_entry() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            // Right format, wrong colour space
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), Some(vk::PresentModeKHR::MAILBOX));
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), Some(vk::PresentModeKHR::FIFO));
    }

    #[test]
    fn extent_uses_current_when_defined() {
        let mut caps = caps(2, 0);
        caps.current_extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };

        assert_eq!(
            choose_extent(&caps, REQUESTED),
            vk::Extent2D {
                width: 1920,
                height: 1080,
            }
        );
    }

    #[test]
    fn extent_keeps_request_inside_bounds() {
        assert_eq!(choose_extent(&caps(2, 0), REQUESTED), REQUESTED);
    }

    #[test]
    fn extent_is_clamped_into_bounds() {
        let mut caps = caps(2, 0);
        caps.min_image_extent = vk::Extent2D {
            width: 1024,
            height: 16,
        };
        caps.max_image_extent = vk::Extent2D {
            width: 2048,
            height: 480,
        };

        let extent = choose_extent(&caps, REQUESTED);
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 480);
        assert!(extent.width >= caps.min_image_extent.width);
        assert!(extent.width <= caps.max_image_extent.width);
        assert!(extent.height >= caps.min_image_extent.height);
        assert!(extent.height <= caps.max_image_extent.height);
    }

    #[test]
    fn image_count_respects_maximum() {
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
    }

    #[test]
    fn image_count_unbounded_when_max_is_zero() {
        assert_eq!(choose_image_count(&caps(1, 0)), 2);
    }

    #[test]
    fn negotiate_rejects_empty_lists() {
        let details = SwapchainSupportDetails {
            capabilities: caps(2, 0),
            formats: Vec::new(),
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            details.negotiate(REQUESTED),
            Err(BringupError::NoSwapchainConfiguration { formats: 0, present_modes: 1 })
        ));

        let details = SwapchainSupportDetails {
            capabilities: caps(2, 0),
            formats: vec![format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: Vec::new(),
        };
        assert!(details.negotiate(REQUESTED).is_err());
    }

    #[test]
    fn negotiate_combines_choices() {
        let details = SwapchainSupportDetails {
            capabilities: caps(2, 3),
            formats: vec![format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let config = details.negotiate(REQUESTED).unwrap();
        assert_eq!(config.surface_format.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(config.extent, REQUESTED);
        assert_eq!(config.image_count, 3);
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn shared_family_uses_exclusive_sharing() {
        let sharing = ImageSharing::for_families(QueueFamilies {
            graphics: 0,
            present: 0,
        });
        assert_eq!(sharing.mode, vk::SharingMode::EXCLUSIVE);
        assert!(sharing.queue_family_indices.is_empty());
    }

    #[test]
    fn distinct_families_use_concurrent_sharing() {
        let sharing = ImageSharing::for_families(QueueFamilies {
            graphics: 0,
            present: 2,
        });
        assert_eq!(sharing.mode, vk::SharingMode::CONCURRENT);
        assert_eq!(sharing.queue_family_indices, vec![0, 2]);
    }
}
