use base64::Engine;
use glam::{Mat4, Vec3, Vec4};
use std::path::Path;
use vk_gltf_framework::framework::scene::{FileLoadingFlags, NodeId, SceneGraph, MAX_NUM_JOINTS};

fn buffer_bytes() -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let indices: [u16; 4] = [0, 1, 2, 0];
    let colors: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
    let times: [f32; 2] = [0.0, 1.0];
    let translations: [f32; 6] = [0.0, 0.0, 0.0, 2.0, 0.0, 0.0];

    let mut bytes = vec![];
    bytes.extend_from_slice(bytemuck::cast_slice(&positions));
    bytes.extend_from_slice(bytemuck::cast_slice(&indices));
    bytes.extend_from_slice(bytemuck::cast_slice(&colors));
    bytes.extend_from_slice(bytemuck::cast_slice(&times));
    bytes.extend_from_slice(bytemuck::cast_slice(&translations));
    assert_eq!(bytes.len(), 112);
    bytes
}

/// 親ノード(平行移動5,0,0)と、三角形一つを持つ子ノード(0,2,0)。<br />
/// 親の平行移動は0秒から1秒で(0,0,0)から(2,0,0)へ動く。<br />
/// A parent node at (5,0,0) and a child at (0,2,0) holding one triangle.<br />
/// The parent's translation animates from (0,0,0) to (2,0,0) over one second.
fn document_json(with_indices: bool) -> String {
    let uri = format!(
        "data:application/octet-stream;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(buffer_bytes())
    );
    let indices = if with_indices { r#", "indices": 1"# } else { "" };
    format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [ {{ "nodes": [0] }} ],
  "nodes": [
    {{ "name": "root", "translation": [5.0, 0.0, 0.0], "children": [1] }},
    {{ "name": "child", "translation": [0.0, 2.0, 0.0], "mesh": 0 }}
  ],
  "meshes": [
    {{ "name": "triangle", "primitives": [ {{ "attributes": {{ "POSITION": 0, "COLOR_0": 2 }}, "material": 0{indices} }} ] }}
  ],
  "materials": [
    {{ "pbrMetallicRoughness": {{ "baseColorFactor": [0.5, 0.5, 0.5, 0.5] }} }}
  ],
  "animations": [
    {{
      "channels": [ {{ "sampler": 0, "target": {{ "node": 0, "path": "translation" }} }} ],
      "samplers": [ {{ "input": 3, "output": 4, "interpolation": "LINEAR" }} ]
    }}
  ],
  "buffers": [ {{ "byteLength": 112, "uri": "{uri}" }} ],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }},
    {{ "buffer": 0, "byteOffset": 44, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 80, "byteLength": 8 }},
    {{ "buffer": 0, "byteOffset": 88, "byteLength": 24 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }},
    {{ "bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC3" }},
    {{ "bufferView": 3, "componentType": 5126, "count": 2, "type": "SCALAR", "min": [0.0], "max": [1.0] }},
    {{ "bufferView": 4, "componentType": 5126, "count": 2, "type": "VEC3" }}
  ]
}}"#
    )
}

fn load(flags: FileLoadingFlags, scale: f32, with_indices: bool) -> anyhow::Result<SceneGraph> {
    let (document, buffers, _) = gltf::import_slice(document_json(with_indices).as_bytes())?;
    SceneGraph::from_gltf(&document, &buffers, Path::new("."), flags, scale)
}

fn child_id(scene: &SceneGraph) -> NodeId {
    scene.node_from_index(1).expect("child node")
}

#[test]
fn imports_geometry_into_shared_buffers() {
    let scene = load(FileLoadingFlags::NONE, 1.0, true).expect("scene loads");
    assert_eq!(scene.vertices.len(), 3);
    assert_eq!(scene.indices, vec![0, 1, 2]);
    assert!(scene
        .indices
        .iter()
        .all(|index| (*index as usize) < scene.vertices.len()));

    // The document's material plus the trailing default one.
    assert_eq!(scene.materials.len(), 2);
    assert_eq!(scene.materials[1].base_color_factor, Vec4::ONE);

    assert_eq!(scene.vertices[0].color, Vec4::new(1.0, 0.0, 0.0, 1.0));
    assert_eq!(scene.vertices[2].color, Vec4::new(0.0, 0.0, 1.0, 1.0));
    assert_eq!(scene.vertices[1].joint0, Vec4::ZERO);
    assert_eq!(scene.vertices[1].tangent, Vec4::ZERO);
    assert_eq!(scene.roots, vec![NodeId(0)]);
    assert!(scene.metallic_roughness_workflow);
}

#[test]
fn world_matrix_accumulates_ancestors() {
    let scene = load(FileLoadingFlags::NONE, 1.0, true).expect("scene loads");
    let child = child_id(&scene);
    let world = scene.world_matrix(child);
    assert!(world.abs_diff_eq(Mat4::from_translation(Vec3::new(5.0, 2.0, 0.0)), 1e-6));

    let mesh = scene.node(child).mesh.as_ref().expect("mesh");
    assert!(mesh.uniform_block.matrix.abs_diff_eq(world, 1e-6));
    assert_eq!(mesh.uniform_block.joint_count, 0.0);
}

#[test]
fn animation_interpolates_and_is_idempotent() {
    let mut scene = load(FileLoadingFlags::NONE, 1.0, true).expect("scene loads");
    let animation = &scene.animations[0];
    assert_eq!(animation.name, "0");
    assert_eq!((animation.start, animation.end), (0.0, 1.0));

    scene.update_animation(0, 0.5).expect("update");
    assert!(scene.nodes[0]
        .translation
        .abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
    let child = child_id(&scene);
    let first = scene.node(child).mesh.as_ref().expect("mesh").uniform_block.matrix;
    assert!(first.abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 2.0, 0.0)), 1e-6));

    scene.update_animation(0, 0.5).expect("update");
    let second = scene.node(child).mesh.as_ref().expect("mesh").uniform_block.matrix;
    assert_eq!(first, second);
}

#[test]
fn time_outside_the_keyframes_leaves_the_pose() {
    let mut scene = load(FileLoadingFlags::NONE, 1.0, true).expect("scene loads");
    scene.update_animation(0, 2.0).expect("update");
    assert_eq!(scene.nodes[0].translation, Vec3::new(5.0, 0.0, 0.0));

    scene.update_animation(7, 0.5).expect("missing animation is ignored");
    assert_eq!(scene.nodes[0].translation, Vec3::new(5.0, 0.0, 0.0));
}

#[test]
fn dimensions_contain_every_transformed_vertex() {
    let scene = load(FileLoadingFlags::NONE, 1.0, true).expect("scene loads");
    let dimensions = scene.dimensions;
    assert!(dimensions.min.abs_diff_eq(Vec3::new(5.0, 2.0, 0.0), 1e-6));
    assert!(dimensions.max.abs_diff_eq(Vec3::new(6.0, 3.0, 0.0), 1e-6));

    let world = scene.world_matrix(child_id(&scene));
    for vertex in scene.vertices.iter() {
        let p = world.transform_point3(vertex.pos);
        assert!(p.cmpge(dimensions.min - Vec3::splat(1e-5)).all());
        assert!(p.cmple(dimensions.max + Vec3::splat(1e-5)).all());
    }
    assert!(dimensions.center.abs_diff_eq(Vec3::new(5.5, 2.5, 0.0), 1e-6));
}

#[test]
fn post_processing_applies_transform_flip_and_color() {
    let flags = FileLoadingFlags::PRE_TRANSFORM_VERTICES
        | FileLoadingFlags::FLIP_Y
        | FileLoadingFlags::PRE_MULTIPLY_VERTEX_COLORS;
    let scene = load(flags, 1.0, true).expect("scene loads");
    assert!(scene.vertices[1]
        .pos
        .abs_diff_eq(Vec3::new(6.0, -2.0, 0.0), 1e-6));
    assert!(scene.vertices[1]
        .color
        .abs_diff_eq(Vec4::new(0.0, 0.5, 0.0, 0.5), 1e-6));
}

#[test]
fn global_scale_scales_the_whole_tree() {
    let scene = load(FileLoadingFlags::NONE, 2.0, true).expect("scene loads");
    let world = scene.world_matrix(child_id(&scene));
    let origin = world.transform_point3(Vec3::ZERO);
    assert!(origin.abs_diff_eq(Vec3::new(10.0, 4.0, 0.0), 1e-5));
    let corner = world.transform_point3(Vec3::X);
    assert!(corner.abs_diff_eq(Vec3::new(12.0, 4.0, 0.0), 1e-5));
}

#[test]
fn primitives_without_indices_are_skipped() {
    let result = load(FileLoadingFlags::NONE, 1.0, false);
    assert!(result.is_err());
}

fn skinned_buffer_bytes() -> Vec<u8> {
    let first_positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let first_colors: [f32; 12] = [
        0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 0.25, 0.75,
    ];
    let first_indices: [u8; 4] = [0, 1, 2, 0];
    let second_positions: [f32; 12] = [
        0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0,
    ];
    let second_indices: [u32; 6] = [0, 1, 2, 2, 1, 3];
    let inverse_bind_matrices: [f32; 32] = [
        1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, -3.0, 0.0, 1.0, //
        1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
    ];

    let mut bytes = vec![];
    bytes.extend_from_slice(bytemuck::cast_slice(&first_positions));
    bytes.extend_from_slice(bytemuck::cast_slice(&first_colors));
    bytes.extend_from_slice(&first_indices);
    bytes.extend_from_slice(bytemuck::cast_slice(&second_positions));
    bytes.extend_from_slice(bytemuck::cast_slice(&second_indices));
    bytes.extend_from_slice(bytemuck::cast_slice(&inverse_bind_matrices));
    assert_eq!(bytes.len(), 288);
    bytes
}

/// スキンを持つメッシュノード(1,0,0)と、二つの関節ノード(0,3,0)と(2,3,0)。<br />
/// メッシュは二つのプリミティブを持つ。一つ目はU8のインデックスと四要素の頂点色、二つ目はU32のインデックス。<br />
/// A skinned mesh node at (1,0,0) and two joints at (0,3,0) and (2,3,0).<br />
/// The mesh has two primitives: U8 indices with four-component colors, then U32 indices.
fn skinned_document_json() -> String {
    let uri = format!(
        "data:application/octet-stream;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(skinned_buffer_bytes())
    );
    format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [ {{ "nodes": [0, 1] }} ],
  "nodes": [
    {{ "name": "body", "translation": [1.0, 0.0, 0.0], "mesh": 0, "skin": 0 }},
    {{ "name": "hip", "translation": [0.0, 3.0, 0.0], "children": [2] }},
    {{ "name": "knee", "translation": [2.0, 0.0, 0.0] }}
  ],
  "meshes": [
    {{
      "name": "body",
      "primitives": [
        {{ "attributes": {{ "POSITION": 0, "COLOR_0": 1 }}, "indices": 2 }},
        {{ "attributes": {{ "POSITION": 3 }}, "indices": 4 }}
      ]
    }}
  ],
  "skins": [ {{ "joints": [1, 2], "inverseBindMatrices": 5 }} ],
  "buffers": [ {{ "byteLength": 288, "uri": "{uri}" }} ],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 48 }},
    {{ "buffer": 0, "byteOffset": 84, "byteLength": 3 }},
    {{ "buffer": 0, "byteOffset": 88, "byteLength": 48 }},
    {{ "buffer": 0, "byteOffset": 136, "byteLength": 24 }},
    {{ "buffer": 0, "byteOffset": 160, "byteLength": 128 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC4" }},
    {{ "bufferView": 2, "componentType": 5121, "count": 3, "type": "SCALAR" }},
    {{ "bufferView": 3, "componentType": 5126, "count": 4, "type": "VEC3", "min": [0.0, 0.0, 1.0], "max": [1.0, 1.0, 1.0] }},
    {{ "bufferView": 4, "componentType": 5125, "count": 6, "type": "SCALAR" }},
    {{ "bufferView": 5, "componentType": 5126, "count": 2, "type": "MAT4" }}
  ]
}}"#
    )
}

fn load_skinned() -> SceneGraph {
    let (document, buffers, _) =
        gltf::import_slice(skinned_document_json().as_bytes()).expect("document parses");
    SceneGraph::from_gltf(&document, &buffers, Path::new("."), FileLoadingFlags::NONE, 1.0)
        .expect("scene loads")
}

#[test]
fn indices_are_offset_into_each_primitives_vertex_range() {
    let scene = load_skinned();
    assert_eq!(scene.vertices.len(), 7);
    assert_eq!(scene.indices, vec![0, 1, 2, 3, 4, 5, 5, 4, 6]);

    let body = scene.node_from_index(0).expect("body node");
    let mesh = scene.node(body).mesh.as_ref().expect("mesh");
    assert_eq!(mesh.primitives.len(), 2);
    assert_eq!(mesh.primitives[1].first_vertex, 3);
    assert_eq!(mesh.primitives[1].first_index, 3);
    for primitive in mesh.primitives.iter() {
        let first = primitive.first_index as usize;
        let range = primitive.first_vertex..primitive.first_vertex + primitive.vertex_count;
        for index in scene.indices[first..first + primitive.index_count as usize].iter() {
            assert!(range.contains(index), "{} outside {:?}", index, range);
        }
    }
}

#[test]
fn four_component_colors_are_kept() {
    let scene = load_skinned();
    assert_eq!(scene.vertices[0].color, Vec4::new(0.1, 0.2, 0.3, 0.4));
    assert_eq!(scene.vertices[1].color, Vec4::new(0.5, 0.6, 0.7, 0.8));
    assert_eq!(scene.vertices[2].color, Vec4::new(0.9, 1.0, 0.25, 0.75));
    // The second primitive has no colors.
    assert_eq!(scene.vertices[3].color, Vec4::ONE);
}

#[test]
fn joint_matrices_are_relative_to_the_skinned_node() {
    let scene = load_skinned();
    let body = scene.node_from_index(0).expect("body node");
    let block = &scene.node(body).mesh.as_ref().expect("mesh").uniform_block;

    assert!(block
        .matrix
        .abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)), 1e-6));
    assert_eq!(block.joint_count, 2.0);
    // inverse(body) * hip * inverse_bind(0,-3,0)
    assert!(block.joint_matrix[0].abs_diff_eq(Mat4::from_translation(Vec3::new(-1.0, 0.0, 0.0)), 1e-6));
    // inverse(body) * knee * identity
    assert!(block.joint_matrix[1].abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 3.0, 0.0)), 1e-6));
    assert_eq!(block.joint_matrix[2], Mat4::IDENTITY);
}

#[test]
fn joint_count_is_capped_at_the_uniform_capacity() {
    let mut scene = load_skinned();
    let hip = scene.node_from_index(1).expect("hip node");
    scene.skins[0].joints = vec![hip; MAX_NUM_JOINTS + 6];

    let body = scene.node_from_index(0).expect("body node");
    scene.update_node(body).expect("update");
    let block = &scene.node(body).mesh.as_ref().expect("mesh").uniform_block;
    assert_eq!(block.joint_count, MAX_NUM_JOINTS as f32);
    assert!(block.joint_matrix[MAX_NUM_JOINTS - 1]
        .abs_diff_eq(Mat4::from_translation(Vec3::new(-1.0, 3.0, 0.0)), 1e-6));
}
