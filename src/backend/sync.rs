// Synchronization primitives
//
// The two binary semaphores ordering acquire -> render -> present.
// Good for exactly one frame: a render loop would need a pair per image (or
// a fence per frame in flight) so a semaphore is never reused while pending.

use ash::vk;

use super::error::{BringupResult, VkResultExt};

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> BringupResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        unsafe {
            let image_available = device
                .create_semaphore(&semaphore_info, None)
                .rejected_by("vkCreateSemaphore")?;

            let render_finished = match device
                .create_semaphore(&semaphore_info, None)
                .rejected_by("vkCreateSemaphore")
            {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(e);
                }
            };

            Ok(Self {
                image_available,
                render_finished,
            })
        }
    }
}
