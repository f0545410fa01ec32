//! # Vertex Data Structures
//!
//! GPU-compatible vertex and per-instance layouts shared by every mesh pass.

use cgmath::{Matrix, Matrix3, Matrix4, SquareMatrix};

/// A mesh vertex with everything the G-buffer shaders need for normal mapping.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3D {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
    /// xyz tangent, w handedness of the bitangent
    pub tangent: [f32; 4],
}

impl Vertex3D {
    const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Float32x4,
    ];

    /// Returns the vertex buffer layout (shader locations 0..=3)
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex3D>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Per-instance world transform plus its normal matrix
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceData {
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the model's upper 3x3, columns padded to vec4
    pub normal: [[f32; 4]; 3],
}

impl InstanceData {
    const ATTRIBUTES: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
        4 => Float32x4,
        5 => Float32x4,
        6 => Float32x4,
        7 => Float32x4,
        8 => Float32x4,
        9 => Float32x4,
        10 => Float32x4,
    ];

    pub fn from_matrix(model: Matrix4<f32>) -> Self {
        let upper = Matrix3::from_cols(model.x.truncate(), model.y.truncate(), model.z.truncate());
        let normal = upper
            .invert()
            .map(|inv| inv.transpose())
            .unwrap_or(upper);

        Self {
            model: model.into(),
            normal: [
                normal.x.extend(0.0).into(),
                normal.y.extend(0.0).into(),
                normal.z.extend(0.0).into(),
            ],
        }
    }

    /// Returns the instance buffer layout (shader locations 4..=10)
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceData>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let data = InstanceData::from_matrix(Matrix4::from_nonuniform_scale(2.0, 1.0, 4.0));
        assert_eq!(data.normal[0][0], 0.5);
        assert_eq!(data.normal[1][1], 1.0);
        assert_eq!(data.normal[2][2], 0.25);
    }

    #[test]
    fn translation_lands_in_last_column() {
        let data = InstanceData::from_matrix(Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(data.model[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
