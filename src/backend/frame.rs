// Frame submission
//
// One acquire -> submit -> present cycle. There is no fence: nothing on the
// CPU waits for the GPU here. Teardown does a device-idle wait instead.

use ash::vk;

use super::device::VulkanDevice;
use super::error::{BringupError, BringupResult, VkResultExt};
use super::swapchain::Swapchain;
use super::sync::FrameSync;

/// Where the single frame is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Nothing submitted yet.
    Idle,
    /// Submitted and presented. The semaphores are spent.
    Presented { image_index: u32 },
}

#[derive(Debug)]
pub struct FrameSubmitter {
    state: FrameState,
    wait_stages: [vk::PipelineStageFlags; 1],
}

impl Default for FrameSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSubmitter {
    pub fn new() -> Self {
        Self {
            state: FrameState::Idle,
            // The acquire semaphore only has to gate colour output
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Acquire, submit and present one frame. Returns the image index used.
    ///
    /// The acquire wait is unbounded. The present result is logged but not
    /// acted on: with a single frame there is nothing to recreate for.
    pub fn submit_frame(
        &mut self,
        device: &VulkanDevice,
        sync: &FrameSync,
        swapchain: &Swapchain,
        command_buffers: &[vk::CommandBuffer],
    ) -> BringupResult<u32> {
        self.ensure_idle()?;

        // STEP 1: Acquire next swapchain image
        let (image_index, suboptimal) = unsafe {
            device.swapchain_loader.acquire_next_image(
                swapchain.handle,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        }
        .rejected_by("vkAcquireNextImageKHR")?;

        if suboptimal {
            log::debug!("Acquired image {} from a suboptimal swapchain", image_index);
        }

        let cmd = command_buffer_for(command_buffers, image_index)?;

        // STEP 2: Submit the pre-recorded commands for that image
        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let submit_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&submit_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info.build()],
                vk::Fence::null(),
            )
        }
        .rejected_by("vkQueueSubmit")?;

        // STEP 3: Present once rendering has finished
        let swapchains = [swapchain.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe {
            device
                .swapchain_loader
                .queue_present(device.present_queue, &present_info)
        } {
            Ok(false) => {}
            Ok(true) => log::debug!("Presented to a suboptimal swapchain"),
            Err(result) => log::warn!("vkQueuePresentKHR returned {}", result),
        }

        self.mark_presented(image_index);
        log::info!("Presented frame on swapchain image {}", image_index);

        Ok(image_index)
    }

    /// Once present has been issued the semaphore pair is spent, whatever
    /// present returned.
    fn mark_presented(&mut self, image_index: u32) {
        self.state = FrameState::Presented { image_index };
    }

    /// The semaphore pair covers one submission only.
    fn ensure_idle(&self) -> BringupResult<()> {
        match self.state {
            FrameState::Idle => Ok(()),
            _ => Err(BringupError::FrameSyncReused),
        }
    }
}

fn command_buffer_for(
    command_buffers: &[vk::CommandBuffer],
    image_index: u32,
) -> BringupResult<vk::CommandBuffer> {
    command_buffers
        .get(image_index as usize)
        .copied()
        .ok_or(BringupError::ImageIndexOutOfRange {
            index: image_index,
            count: command_buffers.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn starts_idle() {
        let submitter = FrameSubmitter::new();
        assert_eq!(submitter.state(), FrameState::Idle);
        assert!(submitter.ensure_idle().is_ok());
    }

    #[test]
    fn refuses_second_frame() {
        let mut submitter = FrameSubmitter::new();

        submitter.mark_presented(1);
        assert_eq!(submitter.state(), FrameState::Presented { image_index: 1 });
        assert!(matches!(
            submitter.ensure_idle(),
            Err(BringupError::FrameSyncReused)
        ));
    }

    #[test]
    fn acquired_index_selects_matching_buffer() {
        let buffers: Vec<_> = (0..3).map(|i| vk::CommandBuffer::from_raw(50 + i)).collect();

        for index in 0..3u32 {
            let cmd = command_buffer_for(&buffers, index).unwrap();
            assert_eq!(cmd.as_raw(), 50 + index as u64);
        }
    }

    #[test]
    fn out_of_range_index_is_an_invariant_failure() {
        let buffers = [vk::CommandBuffer::from_raw(1)];
        assert!(matches!(
            command_buffer_for(&buffers, 1),
            Err(BringupError::ImageIndexOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn waits_on_color_output_stage() {
        let submitter = FrameSubmitter::new();
        assert_eq!(
            submitter.wait_stages,
            [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT]
        );
    }
}
