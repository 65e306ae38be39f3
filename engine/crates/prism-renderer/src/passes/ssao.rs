use ash::vk;
use glam::Vec4;
use prism_gfx::{
    gfx::Gfx,
    resources::{
        image::{GfxImage, GfxImageCreateInfo},
        sampler::GfxSamplerDesc,
    },
};
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    bindless::{BindlessDescriptorTable, BindlessHandle, StorageBufferBinding},
    resource_registry::{BufferHandle, BufferSpecs, GraphicsPipelineHandle, ImageHandle, MemoryDomain, ResourceRegistry},
};
use rand::Rng;

use crate::{
    passes::{
        PassContext, create_fullscreen_pipeline, draw_fullscreen, push,
        push_constants::{BlurPushConstants, SsaoPushConstants},
    },
    render_targets::{RgNames, SSAO_FORMAT},
};

pub const SSAO_KERNEL_SIZE: usize = 32;
pub const SSAO_NOISE_SIZE: u32 = 4;

/// 切线空间 +Z 半球内的采样点，越靠近原点的样本越密集
pub fn generate_kernel(rng: &mut impl Rng) -> Vec<Vec4> {
    (0..SSAO_KERNEL_SIZE)
        .map(|i| {
            let sample = glam::Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(0.0..1.0))
                .try_normalize()
                .unwrap_or(glam::Vec3::Z)
                * rng.gen_range(0.0..1.0_f32);

            let t = i as f32 / SSAO_KERNEL_SIZE as f32;
            let scale = 0.1 + 0.9 * t * t;
            (sample * scale).extend(0.0)
        })
        .collect()
}

/// 4×4 的随机旋转向量，位于切线平面内
pub fn generate_noise(rng: &mut impl Rng) -> Vec<Vec4> {
    (0..SSAO_NOISE_SIZE * SSAO_NOISE_SIZE)
        .map(|_| Vec4::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 0.0, 0.0))
        .collect()
}

/// SSAO 需要的常驻资源：采样核与噪声纹理，与分辨率无关
pub struct SsaoResources {
    _kernel_buffer: BufferHandle,
    kernel_handle: BindlessHandle,
    _noise_image: ImageHandle,
    noise_handle: BindlessHandle,
}
impl SsaoResources {
    pub fn new(
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &mut BindlessDescriptorTable,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("SsaoResources::new");
        let mut rng = rand::thread_rng();

        let kernel = generate_kernel(&mut rng);
        let kernel_buffer = registry.create_buffer(
            gfx,
            &BufferSpecs {
                name: "ssao-kernel".to_string(),
                size: size_of_val(kernel.as_slice()) as vk::DeviceSize,
                usage: vk::BufferUsageFlags::STORAGE_BUFFER,
                memory: MemoryDomain::HostVisible,
            },
        )?;
        let kernel_handle = {
            let buffer = registry.buffer(kernel_buffer)?;
            buffer.transfer_data_by_mmap(0, &kernel)?;
            bindless.register_buffer(buffer.vk_buffer(), 0, buffer.size(), StorageBufferBinding::SsaoKernel)?
        };

        let noise = generate_noise(&mut rng);
        let noise_image = GfxImage::new(
            gfx,
            &GfxImageCreateInfo::new_image_2d_info(
                vk::Extent2D {
                    width: SSAO_NOISE_SIZE,
                    height: SSAO_NOISE_SIZE,
                },
                vk::Format::R32G32B32A32_SFLOAT,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ),
            "ssao-noise",
        )?;
        noise_image.upload_sync(gfx, bytemuck::cast_slice(&noise))?;
        let sampler = registry.create_sampler(&GfxSamplerDesc::nearest_repeat())?;
        let noise_handle = bindless.register_image(noise_image.default_view(), sampler)?;

        Ok(Self {
            _kernel_buffer: kernel_buffer,
            kernel_handle,
            _noise_image: registry.register_image(noise_image),
            noise_handle,
        })
    }
}

#[derive(Copy, Clone)]
pub struct SsaoPassData {
    pub normal_handle: BindlessHandle,
    pub depth_handle: BindlessHandle,
    pub ssao_handle: BindlessHandle,
    pub radius: f32,
    pub bias: f32,
    pub extent: vk::Extent2D,
}

pub struct SsaoPass {
    ssao_pipeline: GraphicsPipelineHandle,
    blur_pipeline: GraphicsPipelineHandle,
    resources: SsaoResources,
}
// new & init
impl SsaoPass {
    pub fn new(
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &mut BindlessDescriptorTable,
    ) -> anyhow::Result<Self> {
        let ssao_pipeline =
            create_fullscreen_pipeline::<SsaoPushConstants>(gfx, registry, "ssao", "ssao.frag", SSAO_FORMAT)?;
        let blur_pipeline =
            create_fullscreen_pipeline::<BlurPushConstants>(gfx, registry, "ssao-blur", "ssao_blur.frag", SSAO_FORMAT)?;
        let resources = SsaoResources::new(gfx, registry, bindless)?;
        Ok(Self {
            ssao_pipeline,
            blur_pipeline,
            resources,
        })
    }
}
// graph
impl SsaoPass {
    pub fn add_to_graph<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: SsaoPassData) {
        let desc = RgPassDesc::raster("SSAOPass")
            .read(RgNames::NORMAL)
            .read(RgNames::DEPTH)
            .write(RgNames::SSAO)
            .clear_outputs(true);
        graph.add_pass(desc, move |cmd| {
            let pipeline = ctx.bind_graphics(cmd, self.ssao_pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &SsaoPushConstants {
                    normal_handle: data.normal_handle.index(),
                    depth_handle: data.depth_handle.index(),
                    noise_handle: self.resources.noise_handle.index(),
                    kernel_handle: self.resources.kernel_handle.index(),
                    radius: data.radius,
                    bias: data.bias,
                },
            );
            draw_fullscreen(cmd, data.extent);
            Ok(())
        });

        let desc = RgPassDesc::raster("SSAOBlurPass")
            .read(RgNames::SSAO)
            .write(RgNames::SSAO_BLUR)
            .clear_outputs(true);
        graph.add_pass(desc, move |cmd| {
            let pipeline = ctx.bind_graphics(cmd, self.blur_pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &BlurPushConstants {
                    input_handle: data.ssao_handle.index(),
                    mode: 0,
                },
            );
            draw_fullscreen(cmd, data.extent);
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn kernel_lies_in_upper_unit_hemisphere() {
        let mut rng = StdRng::seed_from_u64(7);
        let kernel = generate_kernel(&mut rng);
        assert_eq!(kernel.len(), SSAO_KERNEL_SIZE);
        for sample in &kernel {
            assert!(sample.z >= 0.0);
            assert!(sample.truncate().length() <= 1.0 + 1e-5);
            assert_eq!(sample.w, 0.0);
        }
    }

    #[test]
    fn noise_rotates_around_z() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = generate_noise(&mut rng);
        assert_eq!(noise.len(), 16);
        assert!(noise.iter().all(|n| n.z == 0.0 && n.w == 0.0));
        assert!(noise.iter().all(|n| n.x.abs() <= 1.0 && n.y.abs() <= 1.0));
    }
}
