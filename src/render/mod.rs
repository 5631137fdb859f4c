//! GPU presentation of the video surface.

mod presenter;

pub use presenter::Presenter;

use bytemuck::{Pod, Zeroable};

use crate::video::TexCoords;

/// Uniform block read by the quad shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct QuadUniform {
    pub uv_max: [f32; 2],
    pub _pad: [f32; 2],
}

impl From<TexCoords> for QuadUniform {
    fn from(coords: TexCoords) -> Self {
        Self {
            uv_max: [coords.u_max, coords.v_max],
            _pad: [0.0; 2],
        }
    }
}

/// Texture format for frame uploads; matches the surface's sRGB-ness so
/// core pixels reach the screen unmodified.
pub(crate) fn frame_texture_format(surface: wgpu::TextureFormat) -> wgpu::TextureFormat {
    if surface.is_srgb() {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

pub(crate) const SHADER: &str = r#"
struct Quad {
    uv_max: vec2<f32>,
    _pad: vec2<f32>,
}

@group(0) @binding(0)
var<uniform> quad: Quad;

@group(0) @binding(1)
var frame_texture: texture_2d<f32>;

@group(0) @binding(2)
var frame_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

// Four-vertex strip covering the viewport; corner (0,0) is the top-left texel.
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let corner = vec2<f32>(f32(index & 1u), f32(index >> 1u));
    var out: VertexOutput;
    out.position = vec4<f32>(corner.x * 2.0 - 1.0, 1.0 - corner.y * 2.0, 0.0, 1.0);
    out.uv = corner * quad.uv_max;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(textureSample(frame_texture, frame_sampler, input.uv).rgb, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_carries_clip_extent() {
        let uniform = QuadUniform::from(TexCoords {
            u_max: 0.5,
            v_max: 0.25,
        });
        assert_eq!(uniform.uv_max, [0.5, 0.25]);
        assert_eq!(std::mem::size_of::<QuadUniform>(), 16);
    }

    #[test]
    fn frame_texture_follows_surface_encoding() {
        assert_eq!(
            frame_texture_format(wgpu::TextureFormat::Bgra8UnormSrgb),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
        assert_eq!(
            frame_texture_format(wgpu::TextureFormat::Bgra8Unorm),
            wgpu::TextureFormat::Rgba8Unorm
        );
    }
}
