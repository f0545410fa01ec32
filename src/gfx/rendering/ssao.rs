//! Screen-space ambient occlusion inputs
//!
//! The kernel is a set of hemisphere samples (+Z up in tangent space)
//! clustered toward the origin; the noise tile rotates the kernel per pixel
//! and is removed again by the blur pass.

use cgmath::{InnerSpace, Vector3};
use rand::Rng;

use crate::config::MAX_SSAO_KERNEL_SIZE;

/// Side length of the tiled rotation noise texture
pub const SSAO_NOISE_SIZE: u32 = 4;

pub fn generate_kernel(rng: &mut impl Rng, size: usize) -> Vec<[f32; 4]> {
    let size = size.min(MAX_SSAO_KERNEL_SIZE);
    (0..size)
        .map(|i| {
            let direction = Vector3::new(
                rng.random::<f32>() * 2.0 - 1.0,
                rng.random::<f32>() * 2.0 - 1.0,
                rng.random::<f32>(),
            );
            let direction = if direction.magnitude2() > 1e-8 {
                direction.normalize()
            } else {
                Vector3::unit_z()
            };
            let t = i as f32 / size as f32;
            let scale = 0.1 + 0.9 * t * t;
            let sample = direction * rng.random::<f32>() * scale;
            [sample.x, sample.y, sample.z, 0.0]
        })
        .collect()
}

/// Random rotation vectors around the surface normal (z = 0)
pub fn generate_noise(rng: &mut impl Rng) -> Vec<[f32; 4]> {
    (0..SSAO_NOISE_SIZE * SSAO_NOISE_SIZE)
        .map(|_| {
            [
                rng.random::<f32>() * 2.0 - 1.0,
                rng.random::<f32>() * 2.0 - 1.0,
                0.0,
                0.0,
            ]
        })
        .collect()
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SsaoUniform {
    pub samples: [[f32; 4]; MAX_SSAO_KERNEL_SIZE],
    /// Kernel size, radius, bias, unused
    pub params: [f32; 4],
    /// Screen size divided by the noise tile size; zw unused
    pub noise_scale: [f32; 4],
}

impl SsaoUniform {
    pub fn new(kernel: &[[f32; 4]], radius: f32, bias: f32, width: u32, height: u32) -> Self {
        let mut samples = [[0.0; 4]; MAX_SSAO_KERNEL_SIZE];
        let count = kernel.len().min(MAX_SSAO_KERNEL_SIZE);
        samples[..count].copy_from_slice(&kernel[..count]);
        Self {
            samples,
            params: [count as f32, radius, bias, 0.0],
            noise_scale: [
                width as f32 / SSAO_NOISE_SIZE as f32,
                height as f32 / SSAO_NOISE_SIZE as f32,
                0.0,
                0.0,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn kernel_stays_in_unit_hemisphere() {
        let mut rng = StdRng::seed_from_u64(7);
        let kernel = generate_kernel(&mut rng, 64);
        assert_eq!(kernel.len(), 64);
        for sample in &kernel {
            let v = Vector3::new(sample[0], sample[1], sample[2]);
            assert!(v.z >= 0.0);
            assert!(v.magnitude() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn kernel_size_is_capped() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(generate_kernel(&mut rng, 500).len(), MAX_SSAO_KERNEL_SIZE);
    }

    #[test]
    fn noise_lies_in_tangent_plane() {
        let mut rng = StdRng::seed_from_u64(3);
        let noise = generate_noise(&mut rng);
        assert_eq!(noise.len(), 16);
        assert!(noise.iter().all(|n| n[2] == 0.0 && n[0].abs() <= 1.0 && n[1].abs() <= 1.0));
    }

    #[test]
    fn uniform_records_kernel_size_and_noise_scale() {
        let kernel = vec![[0.0, 0.0, 0.5, 0.0]; 16];
        let uniform = SsaoUniform::new(&kernel, 0.5, 0.025, 1280, 720);
        assert_eq!(uniform.params[0], 16.0);
        assert_eq!(uniform.noise_scale[0], 320.0);
        assert_eq!(uniform.noise_scale[1], 180.0);
    }
}
