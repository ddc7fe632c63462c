// =============================================================================
// TRIANGLE RENDERER - explicit owner of every Vulkan object
// =============================================================================
//
// BRING-UP ORDER (data only flows forward):
// 1. Context   - instance + surface
// 2. Device    - physical device, queue families, logical device
// 3. Swapchain - negotiated config, images, views
// 4. Pipeline  - render pass, graphics pipeline, framebuffers
// 5. Commands  - one pre-recorded buffer per image
// 6. Frame     - semaphores + one acquire/submit/present
//
// Teardown runs the other way round, after a device-idle wait.
// =============================================================================

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::backend::commands::{self, CommandBuffers};
use crate::backend::frame::{FrameState, FrameSubmitter};
use crate::backend::pipeline::{self, PipelineState};
use crate::backend::resources::GpuResources;
use crate::backend::swapchain::{self, Swapchain, SwapchainSupportDetails};
use crate::backend::sync::FrameSync;
use crate::backend::{BringupResult, ShaderBinaries, VulkanContext, VulkanDevice};

/// Owns the whole presentation pipeline.
///
/// IMPORTANT: Field order matters for Drop! `resources` are destroyed in
/// `Drop::drop`, then `device` drops before `context` (surface + instance).
pub struct TriangleRenderer {
    resources: GpuResources,
    submitter: FrameSubmitter,
    device: VulkanDevice,
    context: VulkanContext,
}

impl TriangleRenderer {
    /// Bring up everything needed to present the triangle in `window`.
    ///
    /// `requested` is only used when the surface leaves the extent up to us.
    /// On failure whatever was already created is torn down before returning.
    pub fn new<W>(
        window: &W,
        requested: vk::Extent2D,
        shaders: &ShaderBinaries,
        enable_validation: bool,
    ) -> BringupResult<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        log::info!("Initializing Vulkan...");

        let context = VulkanContext::new(window, enable_validation)?;
        let device = VulkanDevice::new(&context)?;

        let mut renderer = Self {
            resources: GpuResources::default(),
            submitter: FrameSubmitter::new(),
            device,
            context,
        };
        renderer.build_resources(requested, shaders)?;

        log::info!("Vulkan initialized successfully!");
        Ok(renderer)
    }

    fn build_resources(
        &mut self,
        requested: vk::Extent2D,
        shaders: &ShaderBinaries,
    ) -> BringupResult<()> {
        let device = &self.device;
        let raw = &device.device;
        let resources = &mut self.resources;

        // ─────────────────────────────────────────────────────────────────
        // Swapchain: support details are only needed for negotiation
        // ─────────────────────────────────────────────────────────────────
        let config = SwapchainSupportDetails::query(&self.context, device.physical_device)?
            .negotiate(requested)?;

        resources.swapchain = Swapchain::create(&self.context, device, &config)?;
        resources.swapchain.image_views = swapchain::create_image_views(
            raw,
            &resources.swapchain.images,
            resources.swapchain.format,
        )?;

        let format = resources.swapchain.format;
        let extent = resources.swapchain.extent;

        // ─────────────────────────────────────────────────────────────────
        // Pipeline + framebuffers
        // ─────────────────────────────────────────────────────────────────
        resources.pipeline = PipelineState {
            render_pass: pipeline::create_render_pass(raw, format)?,
            ..PipelineState::default()
        };

        let (graphics_pipeline, layout) = pipeline::create_graphics_pipeline(
            raw,
            resources.pipeline.render_pass,
            extent,
            shaders,
        )?;
        resources.pipeline.pipeline = graphics_pipeline;
        resources.pipeline.layout = layout;

        resources.framebuffers = pipeline::create_framebuffers(
            raw,
            &resources.swapchain.image_views,
            resources.pipeline.render_pass,
            extent,
        )?;

        // ─────────────────────────────────────────────────────────────────
        // Commands, recorded once per swapchain image
        // ─────────────────────────────────────────────────────────────────
        resources.commands = CommandBuffers {
            pool: commands::create_command_pool(raw, device.queue_families.graphics)?,
            buffers: Vec::new(),
        };
        resources.commands.buffers = commands::allocate_command_buffers(
            raw,
            resources.commands.pool,
            resources.swapchain.image_count(),
        )?;

        commands::record_triangle_draws(
            raw,
            &resources.commands.buffers,
            &resources.framebuffers,
            resources.pipeline.render_pass,
            resources.pipeline.pipeline,
            extent,
        )?;

        log::info!(
            "Created {} pre-recorded command buffers",
            resources.commands.buffers.len()
        );

        // ─────────────────────────────────────────────────────────────────
        // Synchronization
        // ─────────────────────────────────────────────────────────────────
        resources.sync = FrameSync::new(raw)?;

        Ok(())
    }

    /// Render and present the triangle. Only valid once.
    pub fn draw_frame(&mut self) -> BringupResult<u32> {
        self.submitter.submit_frame(
            &self.device,
            &self.resources.sync,
            &self.resources.swapchain,
            &self.resources.commands.buffers,
        )
    }

    pub fn frame_state(&self) -> FrameState {
        self.submitter.state()
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for TriangleRenderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before destroying anything: the submitted
        // frame may still be executing or waiting to be presented.
        if let Err(e) = self.device.wait_idle() {
            log::warn!("{}", e);
        }

        self.resources.destroy(&self.device);

        // device, then context, are dropped automatically (field order)
        log::info!("Cleanup complete");
    }
}
