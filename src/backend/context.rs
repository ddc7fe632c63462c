// Vulkan context - instance and presentation surface
//
// Responsibilities:
// - Load the Vulkan library and create the instance with the extensions the
//   windowing layer needs for presentation
// - Optional validation layer + debug messenger routed into `log`
// - Surface bound to the platform window

use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{c_char, CStr};

use super::error::{BringupError, BringupResult, VkResultExt};

pub const APP_NAME: &CStr = c"Hello Triangle";
const ENGINE_NAME: &CStr = c"No Engine";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance-level state. Destroys surface, messenger and instance on drop, so
/// it must outlive every device-level object.
pub struct VulkanContext {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: Surface,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    _entry: Entry,
}

impl VulkanContext {
    /// Create the instance and a surface for `window`.
    ///
    /// Validation is best effort: if the Khronos layer is not installed we log
    /// and carry on without it.
    pub fn new<W>(window: &W, enable_validation: bool) -> BringupResult<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let entry = unsafe { Entry::load() }?;

        let display_handle = window.raw_display_handle();
        let validation = enable_validation && Self::validation_layer_available(&entry);

        let instance = Self::create_instance(&entry, display_handle, validation)?;

        let debug_utils = if validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface = match unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display_handle,
                window.raw_window_handle(),
                None,
            )
        } {
            Ok(surface) => surface,
            Err(result) => {
                unsafe {
                    if let Some((debug_utils, messenger)) = debug_utils {
                        debug_utils.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(BringupError::SurfaceUnavailable(result));
            }
        };
        let surface_loader = Surface::new(&entry, &instance);

        log::info!("Created Vulkan instance and surface (validation: {})", validation);

        Ok(Self {
            surface,
            surface_loader,
            debug_utils,
            instance,
            _entry: entry,
        })
    }

    fn create_instance(
        entry: &Entry,
        display_handle: raw_window_handle::RawDisplayHandle,
        validation: bool,
    ) -> BringupResult<ash::Instance> {
        let app_info = vk::ApplicationInfo::builder()
            .application_name(APP_NAME)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Whatever the platform needs to present (VK_KHR_surface + the
        // platform specific surface extension)
        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display_handle)
                .rejected_by("vkEnumerateInstanceExtensionProperties")?
                .to_vec();

        let mut layers = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        unsafe { entry.create_instance(&create_info, None) }.rejected_by("vkCreateInstance")
    }

    /// Never fatal: any problem just means running without validation.
    fn validation_layer_available(entry: &Entry) -> bool {
        #[allow(unused_unsafe)]
        let layers = unsafe { entry.enumerate_instance_layer_properties() }
            .rejected_by("vkEnumerateInstanceLayerProperties");

        let available = match layers {
            Ok(layers) => has_layer(&layers, VALIDATION_LAYER),
            Err(e) => {
                log::warn!("{}; continuing without validation", e);
                return false;
            }
        };
        if !available {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        available
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> BringupResult<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .rejected_by("vkCreateDebugUtilsMessengerEXT")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::info!("Destroying surface and instance...");

        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

fn has_layer(layers: &[vk::LayerProperties], name: &CStr) -> bool {
    layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == name)
}
