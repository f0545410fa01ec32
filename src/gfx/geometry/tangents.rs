use mikktspace::{generate_tangents, Geometry};

/// Per-vertex MikkTSpace tangents for an indexed triangle list
pub fn generate_tangents_for_mesh(
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
    indices: &[u32],
) -> Result<Vec<[f32; 4]>, &'static str> {
    if positions.len() != normals.len() || positions.len() != uvs.len() {
        return Err("positions, normals and uvs must have equal length");
    }
    if indices.is_empty() || positions.is_empty() {
        return Err("mesh has no triangles");
    }
    if indices.len() % 3 != 0 {
        return Err("index count is not a multiple of 3");
    }
    if indices.iter().any(|&i| i as usize >= positions.len()) {
        return Err("index out of range");
    }

    struct MeshGeometry<'a> {
        positions: &'a [[f32; 3]],
        normals: &'a [[f32; 3]],
        uvs: &'a [[f32; 2]],
        indices: &'a [u32],
        tangents: &'a mut [[f32; 4]],
    }

    impl MeshGeometry<'_> {
        fn index(&self, face: usize, vert: usize) -> usize {
            self.indices[face * 3 + vert] as usize
        }
    }

    impl Geometry for MeshGeometry<'_> {
        fn num_faces(&self) -> usize {
            self.indices.len() / 3
        }

        fn num_vertices_of_face(&self, _face: usize) -> usize {
            3
        }

        fn position(&self, face: usize, vert: usize) -> [f32; 3] {
            self.positions[self.index(face, vert)]
        }

        fn normal(&self, face: usize, vert: usize) -> [f32; 3] {
            self.normals[self.index(face, vert)]
        }

        fn tex_coord(&self, face: usize, vert: usize) -> [f32; 2] {
            self.uvs[self.index(face, vert)]
        }

        fn set_tangent_encoded(&mut self, tangent: [f32; 4], face: usize, vert: usize) {
            let idx = self.index(face, vert);
            self.tangents[idx] = tangent;
        }
    }

    let mut tangents = vec![[0.0; 4]; positions.len()];
    let mut geometry = MeshGeometry {
        positions,
        normals,
        uvs,
        indices,
        tangents: tangents.as_mut_slice(),
    };

    if !generate_tangents(&mut geometry) {
        return Err("mikktspace rejected the mesh");
    }
    Ok(tangents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_streams() {
        let result = generate_tangents_for_mesh(&[[0.0; 3]; 3], &[[0.0, 1.0, 0.0]; 2], &[[0.0; 2]; 3], &[0, 1, 2]);
        assert!(result.is_err());
    }

    #[test]
    fn empty_mesh_is_rejected_before_mikktspace() {
        assert!(generate_tangents_for_mesh(&[], &[], &[], &[]).is_err());
        let line = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let result = generate_tangents_for_mesh(&line, &[[0.0, 1.0, 0.0]; 2], &[[0.0; 2]; 2], &[]);
        assert!(result.is_err());
    }

    #[test]
    fn tangent_follows_u_direction() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = [[0.0, 0.0, 1.0]; 3];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let tangents = generate_tangents_for_mesh(&positions, &normals, &uvs, &[0, 1, 2]).unwrap();
        assert!((tangents[0][0] - 1.0).abs() < 1e-4);
    }
}
