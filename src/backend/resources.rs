// Owned GPU objects and their teardown
//
// Everything created from the logical device lives here as plain handles.
// Teardown drains the handles in reverse dependency order and leaves null
// handles / empty vectors behind, so draining twice releases nothing twice.

use ash::vk;

use super::commands::CommandBuffers;
use super::device::VulkanDevice;
use super::pipeline::PipelineState;
use super::swapchain::Swapchain;
use super::sync::FrameSync;

/// Device-level objects for one swapchain's worth of rendering.
///
/// `swapchain.images`, `swapchain.image_views`, `framebuffers` and
/// `commands.buffers` are parallel: index i is the same presentable image.
#[derive(Debug, Default)]
pub struct GpuResources {
    pub swapchain: Swapchain,
    pub pipeline: PipelineState,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub commands: CommandBuffers,
    pub sync: FrameSync,
}

/// A single object to destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceObject {
    Semaphore(vk::Semaphore),
    CommandPool(vk::CommandPool),
    Framebuffer(vk::Framebuffer),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    RenderPass(vk::RenderPass),
    ImageView(vk::ImageView),
    Swapchain(vk::SwapchainKHR),
}

fn take_handle<T>(handle: &mut T) -> Option<T>
where
    T: vk::Handle + Copy + Default + PartialEq,
{
    let taken = std::mem::take(handle);
    (taken != T::default()).then_some(taken)
}

impl GpuResources {
    /// Take every live handle out, users before the things they use.
    ///
    /// Command buffers are not listed: destroying the pool frees them.
    /// Swapchain images are owned by the swapchain and just forgotten.
    pub fn drain_for_teardown(&mut self) -> Vec<DeviceObject> {
        let mut objects = Vec::new();

        objects.extend(take_handle(&mut self.sync.render_finished).map(DeviceObject::Semaphore));
        objects.extend(take_handle(&mut self.sync.image_available).map(DeviceObject::Semaphore));

        self.commands.buffers.clear();
        objects.extend(take_handle(&mut self.commands.pool).map(DeviceObject::CommandPool));

        objects.extend(
            std::mem::take(&mut self.framebuffers)
                .into_iter()
                .map(DeviceObject::Framebuffer),
        );

        objects.extend(take_handle(&mut self.pipeline.pipeline).map(DeviceObject::Pipeline));
        objects.extend(take_handle(&mut self.pipeline.layout).map(DeviceObject::PipelineLayout));
        objects.extend(take_handle(&mut self.pipeline.render_pass).map(DeviceObject::RenderPass));

        objects.extend(
            std::mem::take(&mut self.swapchain.image_views)
                .into_iter()
                .map(DeviceObject::ImageView),
        );

        self.swapchain.images.clear();
        objects.extend(take_handle(&mut self.swapchain.handle).map(DeviceObject::Swapchain));

        objects
    }

    /// Destroy everything still held. Safe to call more than once.
    ///
    /// The caller must make sure the GPU is no longer using any of it.
    pub fn destroy(&mut self, device: &VulkanDevice) {
        let objects = self.drain_for_teardown();
        if objects.is_empty() {
            return;
        }

        log::debug!("Destroying {} device objects", objects.len());

        let raw = &device.device;
        for object in objects {
            unsafe {
                match object {
                    DeviceObject::Semaphore(s) => raw.destroy_semaphore(s, None),
                    DeviceObject::CommandPool(p) => raw.destroy_command_pool(p, None),
                    DeviceObject::Framebuffer(f) => raw.destroy_framebuffer(f, None),
                    DeviceObject::Pipeline(p) => raw.destroy_pipeline(p, None),
                    DeviceObject::PipelineLayout(l) => raw.destroy_pipeline_layout(l, None),
                    DeviceObject::RenderPass(r) => raw.destroy_render_pass(r, None),
                    DeviceObject::ImageView(v) => raw.destroy_image_view(v, None),
                    DeviceObject::Swapchain(s) => device.swapchain_loader.destroy_swapchain(s, None),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::collections::HashSet;

    /// Fully populated resources with distinct fake handles.
    fn populated(image_count: u64) -> GpuResources {
        let range = |base: u64| base..base + image_count;

        GpuResources {
            swapchain: Swapchain {
                handle: vk::SwapchainKHR::from_raw(1),
                images: range(100).map(vk::Image::from_raw).collect(),
                image_views: range(200).map(vk::ImageView::from_raw).collect(),
                format: vk::Format::B8G8R8A8_UNORM,
                extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
            },
            pipeline: PipelineState {
                render_pass: vk::RenderPass::from_raw(2),
                layout: vk::PipelineLayout::from_raw(3),
                pipeline: vk::Pipeline::from_raw(4),
            },
            framebuffers: range(300).map(vk::Framebuffer::from_raw).collect(),
            commands: CommandBuffers {
                pool: vk::CommandPool::from_raw(5),
                buffers: range(400).map(vk::CommandBuffer::from_raw).collect(),
            },
            sync: FrameSync {
                image_available: vk::Semaphore::from_raw(6),
                render_finished: vk::Semaphore::from_raw(7),
            },
        }
    }

    fn position(objects: &[DeviceObject], pred: impl Fn(&DeviceObject) -> bool) -> Vec<usize> {
        objects
            .iter()
            .enumerate()
            .filter(|(_, o)| pred(o))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn releases_every_object_once_for_any_image_count() {
        for image_count in 1..=3u64 {
            let mut resources = populated(image_count);
            let objects = resources.drain_for_teardown();

            // 2 semaphores, pool, pipeline, layout, render pass, swapchain
            // plus a framebuffer and a view per image
            assert_eq!(objects.len(), 7 + 2 * image_count as usize);

            let unique: HashSet<_> = objects.iter().copied().collect();
            assert_eq!(unique.len(), objects.len(), "double release");
        }
    }

    #[test]
    fn releases_in_reverse_dependency_order() {
        let mut resources = populated(3);
        let objects = resources.drain_for_teardown();

        let framebuffers = position(&objects, |o| matches!(o, DeviceObject::Framebuffer(_)));
        let views = position(&objects, |o| matches!(o, DeviceObject::ImageView(_)));
        let render_pass = position(&objects, |o| matches!(o, DeviceObject::RenderPass(_)))[0];
        let pipeline = position(&objects, |o| matches!(o, DeviceObject::Pipeline(_)))[0];
        let layout = position(&objects, |o| matches!(o, DeviceObject::PipelineLayout(_)))[0];
        let pool = position(&objects, |o| matches!(o, DeviceObject::CommandPool(_)))[0];
        let semaphores = position(&objects, |o| matches!(o, DeviceObject::Semaphore(_)));
        let swapchain = position(&objects, |o| matches!(o, DeviceObject::Swapchain(_)))[0];

        // Command buffers reference framebuffers and the pipeline
        assert!(framebuffers.iter().all(|&f| pool < f));
        assert!(pool < pipeline);
        // Framebuffers reference the render pass and the views
        assert!(framebuffers.iter().all(|&f| f < render_pass));
        assert!(framebuffers.iter().all(|&f| views.iter().all(|&v| f < v)));
        assert!(pipeline < layout && pipeline < render_pass);
        // Views reference swapchain images
        assert!(views.iter().all(|&v| v < swapchain));
        assert!(semaphores.iter().all(|&s| s < swapchain));
        assert_eq!(swapchain, objects.len() - 1);
    }

    #[test]
    fn second_drain_releases_nothing() {
        for image_count in 1..=3u64 {
            let mut resources = populated(image_count);
            assert!(!resources.drain_for_teardown().is_empty());

            assert!(resources.drain_for_teardown().is_empty());
            assert!(resources.swapchain.images.is_empty());
            assert!(resources.commands.buffers.is_empty());
        }
    }

    #[test]
    fn partially_built_resources_release_only_what_exists() {
        let mut resources = GpuResources::default();
        resources.swapchain.handle = vk::SwapchainKHR::from_raw(9);
        resources.swapchain.image_views = vec![vk::ImageView::from_raw(10)];
        resources.pipeline.render_pass = vk::RenderPass::from_raw(11);

        let objects = resources.drain_for_teardown();
        assert_eq!(
            objects,
            vec![
                DeviceObject::RenderPass(vk::RenderPass::from_raw(11)),
                DeviceObject::ImageView(vk::ImageView::from_raw(10)),
                DeviceObject::Swapchain(vk::SwapchainKHR::from_raw(9)),
            ]
        );
    }

    #[test]
    fn empty_resources_release_nothing() {
        assert!(GpuResources::default().drain_for_teardown().is_empty());
    }
}
