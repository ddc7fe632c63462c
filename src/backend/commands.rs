// Command recording
//
// One primary command buffer per swapchain image, recorded exactly once:
// clear to grey, bind the pipeline, draw the three shader-generated vertices.

use ash::prelude::VkResult;
use ash::vk;

use super::error::{BringupError, BringupResult, VkResultExt};

/// Clear colour for the render pass (RGBA, 0-1 range)
pub const CLEAR_COLOR: [f32; 4] = [0.3, 0.3, 0.3, 1.0];

pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

/// Pool + the buffers allocated from it, indexed like the swapchain images.
#[derive(Debug, Default)]
pub struct CommandBuffers {
    pub pool: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
}

/// The handful of recording calls the triangle needs.
///
/// Implemented for `ash::Device`; tests substitute a recorder.
pub trait CommandEncoder {
    /// # Safety
    /// `cmd` must be a valid, not yet recorded command buffer of this device.
    unsafe fn begin(&self, cmd: vk::CommandBuffer, info: &vk::CommandBufferBeginInfo)
        -> VkResult<()>;

    /// # Safety
    /// Every handle in `info` must belong to this device.
    unsafe fn begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo);

    /// # Safety
    /// `pipeline` must be compatible with the active render pass.
    unsafe fn bind_graphics_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);

    /// # Safety
    /// Must be called inside a render pass with a pipeline bound.
    unsafe fn draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    /// # Safety
    /// Must close a render pass opened on `cmd`.
    unsafe fn end_render_pass(&self, cmd: vk::CommandBuffer);

    /// # Safety
    /// `cmd` must be in the recording state.
    unsafe fn end(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
}

impl CommandEncoder for ash::Device {
    unsafe fn begin(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo,
    ) -> VkResult<()> {
        self.begin_command_buffer(cmd, info)
    }

    unsafe fn begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        self.cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE);
    }

    unsafe fn bind_graphics_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
    }

    unsafe fn draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance);
    }

    unsafe fn end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.cmd_end_render_pass(cmd);
    }

    unsafe fn end(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.end_command_buffer(cmd)
    }
}

/// Command pool on the graphics family. No flags: buffers are never reset.
pub fn create_command_pool(
    device: &ash::Device,
    graphics_family: u32,
) -> BringupResult<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(graphics_family)
        .flags(vk::CommandPoolCreateFlags::empty());

    unsafe { device.create_command_pool(&pool_info, None) }.rejected_by("vkCreateCommandPool")
}

/// Allocate one primary command buffer per swapchain image.
pub fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: usize,
) -> BringupResult<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32);

    unsafe { device.allocate_command_buffers(&alloc_info) }.rejected_by("vkAllocateCommandBuffers")
}

/// Record the triangle draw into every buffer; buffer `i` renders into
/// framebuffer `i`.
pub fn record_triangle_draws<E: CommandEncoder>(
    encoder: &E,
    command_buffers: &[vk::CommandBuffer],
    framebuffers: &[vk::Framebuffer],
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    extent: vk::Extent2D,
) -> BringupResult<()> {
    if command_buffers.len() != framebuffers.len() {
        return Err(BringupError::ImageCountMismatch {
            buffers: command_buffers.len(),
            framebuffers: framebuffers.len(),
        });
    }

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    }];
    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };

    for (&cmd, &framebuffer) in command_buffers.iter().zip(framebuffers) {
        // Recorded once and submitted once: no usage flags
        let begin_info = vk::CommandBufferBeginInfo::builder();

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            encoder
                .begin(cmd, &begin_info)
                .rejected_by("vkBeginCommandBuffer")?;

            encoder.begin_render_pass(cmd, &render_pass_info);
            encoder.bind_graphics_pipeline(cmd, pipeline);
            encoder.draw(cmd, TRIANGLE_VERTEX_COUNT, 1, 0, 0);
            encoder.end_render_pass(cmd);

            encoder.end(cmd).rejected_by("vkEndCommandBuffer")?;
        }
    }

    log::debug!("Recorded {} command buffers", command_buffers.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Begin(u64),
        BeginRenderPass {
            cmd: u64,
            framebuffer: u64,
            render_pass: u64,
            clear: [f32; 4],
            extent: (u32, u32),
        },
        BindPipeline(u64, u64),
        Draw(u64, u32, u32, u32, u32),
        EndRenderPass(u64),
        End(u64),
    }

    #[derive(Default)]
    struct RecordingEncoder {
        calls: RefCell<Vec<Call>>,
        fail_end_for: Option<u64>,
    }

    impl CommandEncoder for RecordingEncoder {
        unsafe fn begin(
            &self,
            cmd: vk::CommandBuffer,
            _info: &vk::CommandBufferBeginInfo,
        ) -> VkResult<()> {
            self.calls.borrow_mut().push(Call::Begin(cmd.as_raw()));
            Ok(())
        }

        unsafe fn begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
            assert_eq!(info.clear_value_count, 1);
            let clear = (*info.p_clear_values).color.float32;
            self.calls.borrow_mut().push(Call::BeginRenderPass {
                cmd: cmd.as_raw(),
                framebuffer: info.framebuffer.as_raw(),
                render_pass: info.render_pass.as_raw(),
                clear,
                extent: (info.render_area.extent.width, info.render_area.extent.height),
            });
        }

        unsafe fn bind_graphics_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
            self.calls
                .borrow_mut()
                .push(Call::BindPipeline(cmd.as_raw(), pipeline.as_raw()));
        }

        unsafe fn draw(
            &self,
            cmd: vk::CommandBuffer,
            vertex_count: u32,
            instance_count: u32,
            first_vertex: u32,
            first_instance: u32,
        ) {
            self.calls.borrow_mut().push(Call::Draw(
                cmd.as_raw(),
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            ));
        }

        unsafe fn end_render_pass(&self, cmd: vk::CommandBuffer) {
            self.calls.borrow_mut().push(Call::EndRenderPass(cmd.as_raw()));
        }

        unsafe fn end(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
            self.calls.borrow_mut().push(Call::End(cmd.as_raw()));
            if self.fail_end_for == Some(cmd.as_raw()) {
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            Ok(())
        }
    }

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn handles<T: Handle>(base: u64, count: u64) -> Vec<T> {
        (0..count).map(|i| T::from_raw(base + i)).collect()
    }

    #[test]
    fn records_fixed_sequence_per_buffer() {
        let encoder = RecordingEncoder::default();
        let buffers = handles::<vk::CommandBuffer>(10, 1);
        let framebuffers = handles::<vk::Framebuffer>(20, 1);

        record_triangle_draws(
            &encoder,
            &buffers,
            &framebuffers,
            vk::RenderPass::from_raw(30),
            vk::Pipeline::from_raw(40),
            EXTENT,
        )
        .unwrap();

        assert_eq!(
            encoder.calls.into_inner(),
            vec![
                Call::Begin(10),
                Call::BeginRenderPass {
                    cmd: 10,
                    framebuffer: 20,
                    render_pass: 30,
                    clear: CLEAR_COLOR,
                    extent: (800, 600),
                },
                Call::BindPipeline(10, 40),
                Call::Draw(10, 3, 1, 0, 0),
                Call::EndRenderPass(10),
                Call::End(10),
            ]
        );
    }

    #[test]
    fn buffer_i_targets_framebuffer_i_only() {
        for image_count in 1..=3 {
            let encoder = RecordingEncoder::default();
            let buffers = handles::<vk::CommandBuffer>(100, image_count);
            let framebuffers = handles::<vk::Framebuffer>(200, image_count);

            record_triangle_draws(
                &encoder,
                &buffers,
                &framebuffers,
                vk::RenderPass::from_raw(1),
                vk::Pipeline::from_raw(2),
                EXTENT,
            )
            .unwrap();

            let targets: Vec<(u64, u64)> = encoder
                .calls
                .borrow()
                .iter()
                .filter_map(|call| match call {
                    Call::BeginRenderPass {
                        cmd, framebuffer, ..
                    } => Some((*cmd, *framebuffer)),
                    _ => None,
                })
                .collect();

            let expected: Vec<(u64, u64)> =
                (0..image_count).map(|i| (100 + i, 200 + i)).collect();
            assert_eq!(targets, expected);
        }
    }

    #[test]
    fn mismatched_lengths_are_rejected_before_recording() {
        let encoder = RecordingEncoder::default();
        let err = record_triangle_draws(
            &encoder,
            &handles::<vk::CommandBuffer>(1, 3),
            &handles::<vk::Framebuffer>(10, 2),
            vk::RenderPass::from_raw(1),
            vk::Pipeline::from_raw(2),
            EXTENT,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            BringupError::ImageCountMismatch {
                buffers: 3,
                framebuffers: 2
            }
        ));
        assert!(encoder.calls.borrow().is_empty());
    }

    #[test]
    fn end_failure_stops_recording() {
        let encoder = RecordingEncoder {
            fail_end_for: Some(1),
            ..Default::default()
        };

        let err = record_triangle_draws(
            &encoder,
            &handles::<vk::CommandBuffer>(0, 3),
            &handles::<vk::Framebuffer>(10, 3),
            vk::RenderPass::from_raw(1),
            vk::Pipeline::from_raw(2),
            EXTENT,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            BringupError::Rejected {
                call: "vkEndCommandBuffer",
                ..
            }
        ));
        // Buffer 2 was never started
        assert!(!encoder.calls.borrow().contains(&Call::Begin(2)));
    }
}
