use anyhow::Context;
use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
use gltf::animation::util::ReadOutputs;
use gltf::animation::Property;
use std::path::{Path, PathBuf};

use crate::framework::scene::{
    Animation, AnimationChannel, AnimationSampler, ChannelValue, Dimensions, FileLoadingFlags,
    InterpolationType, Material, Mesh, Node, NodeId, PathType, Primitive, Skin, SourceImage,
    Vertex, MAX_NUM_JOINTS,
};

const SPECULAR_GLOSSINESS_EXTENSION: &str = "KHR_materials_pbrSpecularGlossiness";

/// GPUに依存しないシーングラフ。ノードは配列に置かれ、`NodeId`で互いを参照する。<br />
/// 頂点とインデックスは全プリミティブで共有する一つの配列にまとめられる。<br />
/// GPU-independent scene graph. Nodes live in an arena and refer to each other through `NodeId`.<br />
/// Vertices and indices of every primitive are packed into one shared array each.
pub struct SceneGraph {
    /// 読み込んだ全ノード。配列の順序がそのまま線形リストになる。<br />
    /// Every imported node. The arena order doubles as the linear node list.
    pub nodes: Vec<Node>,
    pub roots: Vec<NodeId>,
    pub skins: Vec<Skin>,
    pub animations: Vec<Animation>,
    /// 最後の要素はマテリアルを持たないプリミティブ用の既定のマテリアル。<br />
    /// The last entry is the default material used by primitives without one.
    pub materials: Vec<Material>,
    pub images: Vec<SourceImage>,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub dimensions: Dimensions,
    pub metallic_roughness_workflow: bool,
    pub base_dir: PathBuf,
}

impl SceneGraph {
    /// glTFファイルを読み込む。外部のバッファと画像はファイルのディレクトリから解決する。<br />
    /// Loads a glTF file. External buffers and images are resolved from the file's directory.
    pub fn load_from_file<P: AsRef<Path>>(
        file_name: P,
        flags: FileLoadingFlags,
        scale: f32,
    ) -> anyhow::Result<Self> {
        let path = file_name.as_ref();
        log::info!("Loading glTF scene from {}...", path.display());
        let gltf::Gltf { document, blob } = gltf::Gltf::open(path)
            .with_context(|| format!("Failed to open glTF file {}.", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let buffers = gltf::import_buffers(&document, Some(base_dir), blob)
            .with_context(|| format!("Failed to load buffers of {}.", path.display()))?;
        Self::from_gltf(&document, &buffers, base_dir, flags, scale)
    }

    pub fn from_gltf(
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
        base_dir: &Path,
        flags: FileLoadingFlags,
        scale: f32,
    ) -> anyhow::Result<Self> {
        let mut scene = SceneGraph {
            nodes: vec![],
            roots: vec![],
            skins: vec![],
            animations: vec![],
            materials: vec![],
            images: vec![],
            vertices: vec![],
            indices: vec![],
            dimensions: Dimensions::default(),
            metallic_roughness_workflow: !document
                .extensions_used()
                .any(|ext| ext == SPECULAR_GLOSSINESS_EXTENSION),
            base_dir: base_dir.to_path_buf(),
        };

        if !flags.contains(FileLoadingFlags::DONT_LOAD_IMAGES) {
            for image in document.images() {
                scene
                    .images
                    .push(SourceImage::from_gltf(&image, buffers, base_dir)?);
            }
        }
        scene.load_materials(document);

        let gltf_scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .with_context(|| "The glTF document contains no scene.")?;
        for node in gltf_scene.nodes() {
            let id = scene.load_node(None, &node, buffers)?;
            scene.roots.push(id);
        }
        scene.apply_global_scale(scale);

        scene.load_animations(document, buffers);
        scene.load_skins(document, buffers);
        let skin_count = scene.skins.len();
        for node in scene.nodes.iter_mut() {
            node.skin = node.skin_index.filter(|index| *index < skin_count);
        }
        for root in scene.roots.clone() {
            scene.update_node(root)?;
        }

        scene.post_process(flags);
        scene.dimensions = scene.compute_dimensions();

        if scene.vertices.is_empty() || scene.indices.is_empty() {
            return Err(anyhow::anyhow!(
                "The scene has no geometry ({} vertices, {} indices).",
                scene.vertices.len(),
                scene.indices.len()
            ));
        }

        log::info!(
            "Scene loaded: {} nodes, {} materials, {} skins, {} animations, {} vertices, {} indices.",
            scene.nodes.len(),
            scene.materials.len(),
            scene.skins.len(),
            scene.animations.len(),
            scene.vertices.len(),
            scene.indices.len()
        );
        Ok(scene)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// glTFのインデックスからノードを探す。<br />
    /// Finds a node by its glTF index.
    pub fn node_from_index(&self, index: usize) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.index == index)
            .map(NodeId)
    }

    /// 根までの祖先のローカル行列を掛け合わせる。<br />
    /// Accumulates the local matrices of all ancestors up to the root.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut node = self.node(id);
        let mut matrix = node.local_matrix();
        while let Some(parent) = node.parent {
            node = self.node(parent);
            matrix = node.local_matrix() * matrix;
        }
        matrix
    }

    /// ノードとその子孫のユニフォームブロックを更新する。<br />
    /// Refreshes the uniform blocks of a node and its descendants.
    pub fn update_node(&mut self, id: NodeId) -> anyhow::Result<()> {
        if self.node(id).mesh.is_some() {
            let world = self.world_matrix(id);
            let joint_matrices = self.node(id).skin.map(|skin_index| {
                let skin = &self.skins[skin_index];
                let inverse_transform = world.inverse();
                skin.joints
                    .iter()
                    .take(MAX_NUM_JOINTS)
                    .enumerate()
                    .map(|(i, joint)| {
                        inverse_transform * self.world_matrix(*joint) * skin.inverse_bind_matrix(i)
                    })
                    .collect::<Vec<_>>()
            });

            if let Some(mesh) = self.nodes[id.0].mesh.as_mut() {
                mesh.uniform_block.matrix = world;
                match joint_matrices {
                    Some(joint_matrices) => {
                        for (slot, matrix) in mesh
                            .uniform_block
                            .joint_matrix
                            .iter_mut()
                            .zip(joint_matrices.iter())
                        {
                            *slot = *matrix;
                        }
                        mesh.uniform_block.joint_count = joint_matrices.len() as f32;
                        mesh.write_uniform_block()?;
                    }
                    None => mesh.write_matrix()?,
                }
            }
        }

        for child in self.node(id).children.clone() {
            self.update_node(child)?;
        }
        Ok(())
    }

    /// アニメーションを`time`の時点まで進める。範囲外のインデックスは無視する。<br />
    /// Poses the scene at `time` in the given animation. Out-of-range indices are ignored.
    pub fn update_animation(&mut self, index: usize, time: f32) -> anyhow::Result<()> {
        let animation = match self.animations.get(index) {
            Some(animation) => animation,
            None => {
                log::warn!("No animation with index {}.", index);
                return Ok(());
            }
        };

        let mut updated = false;
        for channel in animation.channels.iter() {
            let sampler = match animation.samplers.get(channel.sampler_index) {
                Some(sampler) => sampler,
                None => continue,
            };
            let node = &mut self.nodes[channel.node.0];
            for value in sampler.sample(channel.path, time) {
                match value {
                    ChannelValue::Translation(translation) => node.translation = translation,
                    ChannelValue::Rotation(rotation) => node.rotation = rotation,
                    ChannelValue::Scale(scale) => node.scale = scale,
                }
                updated = true;
            }
        }

        if updated {
            for root in self.roots.clone() {
                self.update_node(root)?;
            }
        }
        Ok(())
    }

    /// 各プリミティブの境界ボックスの八隅をワールド空間に移し、シーン全体を囲む箱を求める。<br />
    /// Moves the eight corners of each primitive's bounding box to world space and bounds the whole scene.
    pub fn compute_dimensions(&self) -> Dimensions {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(-f32::MAX);
        let mut found = false;
        for (i, node) in self.nodes.iter().enumerate() {
            let mesh = match node.mesh.as_ref() {
                Some(mesh) => mesh,
                None => continue,
            };
            let world = self.world_matrix(NodeId(i));
            for primitive in mesh.primitives.iter() {
                let bounds = primitive.dimensions;
                for corner in 0..8 {
                    let local = Vec3::new(
                        if corner & 1 == 0 { bounds.min.x } else { bounds.max.x },
                        if corner & 2 == 0 { bounds.min.y } else { bounds.max.y },
                        if corner & 4 == 0 { bounds.min.z } else { bounds.max.z },
                    );
                    let point = world.transform_point3(local);
                    min = min.min(point);
                    max = max.max(point);
                    found = true;
                }
            }
        }
        if found {
            Dimensions::new(min, max)
        } else {
            Dimensions::default()
        }
    }

    fn load_materials(&mut self, document: &gltf::Document) {
        let image_count = self.images.len();
        for material in document.materials() {
            let mut material = Material::from_gltf(&material);
            for texture in [
                &mut material.base_color_texture,
                &mut material.metallic_roughness_texture,
                &mut material.normal_texture,
                &mut material.occlusion_texture,
                &mut material.emissive_texture,
            ] {
                *texture = texture.filter(|index| *index < image_count);
            }
            self.materials.push(material);
        }
        self.materials.push(Material::default());
    }

    fn load_node(
        &mut self,
        parent: Option<NodeId>,
        gltf_node: &gltf::Node,
        buffers: &[gltf::buffer::Data],
    ) -> anyhow::Result<NodeId> {
        let name = gltf_node.name().unwrap_or_default().to_string();
        let mut node = Node::new(gltf_node.index(), name, parent);
        match gltf_node.transform() {
            gltf::scene::Transform::Matrix { matrix } => {
                node.matrix = Mat4::from_cols_array_2d(&matrix);
            }
            gltf::scene::Transform::Decomposed {
                translation,
                rotation,
                scale,
            } => {
                node.translation = Vec3::from(translation);
                node.rotation = Quat::from_array(rotation);
                node.scale = Vec3::from(scale);
            }
        }
        node.skin_index = gltf_node.skin().map(|skin| skin.index());

        let id = NodeId(self.nodes.len());
        self.nodes.push(node);

        let mut children = vec![];
        for child in gltf_node.children() {
            children.push(self.load_node(Some(id), &child, buffers)?);
        }
        self.nodes[id.0].children = children;

        if let Some(gltf_mesh) = gltf_node.mesh() {
            let name = gltf_mesh.name().unwrap_or_default().to_string();
            let mut mesh = Mesh::new(name, self.nodes[id.0].matrix);
            for primitive in gltf_mesh.primitives() {
                if let Some(primitive) = self.load_primitive(&primitive, buffers)? {
                    mesh.primitives.push(primitive);
                }
            }
            self.nodes[id.0].mesh = Some(mesh);
        }
        Ok(id)
    }

    fn load_primitive(
        &mut self,
        primitive: &gltf::Primitive,
        buffers: &[gltf::buffer::Data],
    ) -> anyhow::Result<Option<Primitive>> {
        let index_accessor = match primitive.indices() {
            Some(accessor) => accessor,
            None => {
                log::warn!("Skipping primitive {} without indices.", primitive.index());
                return Ok(None);
            }
        };
        match index_accessor.data_type() {
            gltf::accessor::DataType::U8
            | gltf::accessor::DataType::U16
            | gltf::accessor::DataType::U32 => (),
            other => {
                log::error!("Index component type {:?} not supported!", other);
                return Ok(None);
            }
        }

        let reader = primitive
            .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
        let positions = reader
            .read_positions()
            .with_context(|| "Primitive is missing the POSITION attribute.")?
            .collect::<Vec<_>>();
        let normals = reader.read_normals().map(|n| n.collect::<Vec<_>>());
        let uvs = reader
            .read_tex_coords(0)
            .map(|t| t.into_f32().collect::<Vec<_>>());
        let colors = reader
            .read_colors(0)
            .map(|c| c.into_rgba_f32().collect::<Vec<_>>());
        let tangents = reader.read_tangents().map(|t| t.collect::<Vec<_>>());
        let skinning = match (reader.read_joints(0), reader.read_weights(0)) {
            (Some(joints), Some(weights)) => Some((
                joints.into_u16().collect::<Vec<_>>(),
                weights.into_f32().collect::<Vec<_>>(),
            )),
            _ => None,
        };

        let vertex_start = self.vertices.len() as u32;
        let index_start = self.indices.len() as u32;
        for (v, position) in positions.iter().enumerate() {
            let normal = normals
                .as_ref()
                .and_then(|n| n.get(v))
                .map(|n| Vec3::from(*n).normalize_or_zero())
                .unwrap_or(Vec3::ZERO);
            let mut vertex = Vertex {
                pos: Vec3::from(*position),
                normal,
                uv: uvs
                    .as_ref()
                    .and_then(|t| t.get(v))
                    .map(|t| Vec2::from(*t))
                    .unwrap_or(Vec2::ZERO),
                color: colors
                    .as_ref()
                    .and_then(|c| c.get(v))
                    .map(|c| Vec4::from(*c))
                    .unwrap_or(Vec4::ONE),
                joint0: Vec4::ZERO,
                weight0: Vec4::ZERO,
                tangent: tangents
                    .as_ref()
                    .and_then(|t| t.get(v))
                    .map(|t| Vec4::from(*t))
                    .unwrap_or(Vec4::ZERO),
            };
            if let Some((joints, weights)) = skinning.as_ref() {
                if let (Some(joint), Some(weight)) = (joints.get(v), weights.get(v)) {
                    vertex.joint0 = Vec4::new(
                        joint[0] as f32,
                        joint[1] as f32,
                        joint[2] as f32,
                        joint[3] as f32,
                    );
                    vertex.weight0 = Vec4::from(*weight);
                }
            }
            self.vertices.push(vertex);
        }

        let indices = reader
            .read_indices()
            .with_context(|| "Failed to read primitive indices.")?
            .into_u32()
            .map(|index| index + vertex_start)
            .collect::<Vec<_>>();
        let index_count = indices.len() as u32;
        self.indices.extend(indices);

        let bounds = primitive.bounding_box();
        let material = primitive
            .material()
            .index()
            .unwrap_or(self.materials.len() - 1);
        Ok(Some(Primitive {
            first_index: index_start,
            index_count,
            first_vertex: vertex_start,
            vertex_count: positions.len() as u32,
            material,
            dimensions: Dimensions::new(Vec3::from(bounds.min), Vec3::from(bounds.max)),
        }))
    }

    /// 全体のスケールを根のノードに掛ける。一様なスケールは回転と可換なので、平行移動とスケールを拡大すれば足りる。<br />
    /// Applies the global scale to the root nodes. A uniform scale commutes with rotation, so scaling translation and scale suffices.
    fn apply_global_scale(&mut self, scale: f32) {
        if (scale - 1.0).abs() <= f32::EPSILON {
            return;
        }
        for root in self.roots.iter() {
            let node = &mut self.nodes[root.0];
            if node.matrix != Mat4::IDENTITY {
                node.matrix = Mat4::from_scale(Vec3::splat(scale)) * node.matrix;
            } else {
                node.translation *= scale;
                node.scale *= scale;
            }
        }
    }

    fn load_animations(&mut self, document: &gltf::Document, buffers: &[gltf::buffer::Data]) {
        for gltf_animation in document.animations() {
            let name = gltf_animation
                .name()
                .map(|n| n.to_string())
                .unwrap_or_else(|| gltf_animation.index().to_string());
            let mut animation = Animation::new(name);
            animation.samplers = gltf_animation
                .samplers()
                .map(|sampler| AnimationSampler {
                    interpolation: InterpolationType::from(sampler.interpolation()),
                    inputs: vec![],
                    outputs: vec![],
                })
                .collect();

            for channel in gltf_animation.channels() {
                let path = match channel.target().property() {
                    Property::Translation => PathType::Translation,
                    Property::Rotation => PathType::Rotation,
                    Property::Scale => PathType::Scale,
                    Property::MorphTargetWeights => {
                        log::warn!("Weights not yet supported, skipping channel.");
                        continue;
                    }
                };
                let node = match self.node_from_index(channel.target().node().index()) {
                    Some(node) => node,
                    None => {
                        log::warn!(
                            "Animation {} targets missing node {}, skipping channel.",
                            animation.name,
                            channel.target().node().index()
                        );
                        continue;
                    }
                };
                let sampler_index = channel.sampler().index();

                if let Some(sampler) = animation.samplers.get_mut(sampler_index) {
                    if sampler.inputs.is_empty() {
                        let reader = channel
                            .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
                        sampler.inputs = reader
                            .read_inputs()
                            .map(|inputs| inputs.collect())
                            .unwrap_or_default();
                        sampler.outputs = match reader.read_outputs() {
                            Some(ReadOutputs::Translations(translations)) => {
                                translations.map(|t| Vec3::from(t).extend(0.0)).collect()
                            }
                            Some(ReadOutputs::Scales(scales)) => {
                                scales.map(|s| Vec3::from(s).extend(0.0)).collect()
                            }
                            Some(ReadOutputs::Rotations(rotations)) => {
                                rotations.into_f32().map(Vec4::from).collect()
                            }
                            _ => vec![],
                        };
                    }
                }

                animation.channels.push(AnimationChannel {
                    path,
                    node,
                    sampler_index,
                });
            }

            let inputs = animation
                .samplers
                .iter()
                .flat_map(|sampler| sampler.inputs.iter().copied())
                .collect::<Vec<_>>();
            animation.include_inputs(&inputs);
            log::info!(
                "Animation {} loaded: {} channels, {:.2}s to {:.2}s.",
                animation.name,
                animation.channels.len(),
                animation.start,
                animation.end
            );
            self.animations.push(animation);
        }
    }

    fn load_skins(&mut self, document: &gltf::Document, buffers: &[gltf::buffer::Data]) {
        for gltf_skin in document.skins() {
            let name = gltf_skin.name().unwrap_or_default().to_string();
            let skeleton_root = gltf_skin
                .skeleton()
                .and_then(|node| self.node_from_index(node.index()));
            let joints = gltf_skin
                .joints()
                .filter_map(|joint| self.node_from_index(joint.index()))
                .collect::<Vec<_>>();
            if joints.len() > MAX_NUM_JOINTS {
                log::warn!(
                    "Skin {} has {} joints, only the first {} are used.",
                    name,
                    joints.len(),
                    MAX_NUM_JOINTS
                );
            }
            let reader = gltf_skin
                .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let inverse_bind_matrices = reader
                .read_inverse_bind_matrices()
                .map(|matrices| matrices.map(|m| Mat4::from_cols_array_2d(&m)).collect())
                .unwrap_or_default();
            self.skins.push(Skin {
                name,
                skeleton_root,
                joints,
                inverse_bind_matrices,
            });
        }
    }

    /// 指定された後処理を、ワールド変換、Y反転、頂点色の乗算の順に適用する。<br />
    /// Applies the requested post-processing in order: world transform, Y flip, vertex color multiply.
    fn post_process(&mut self, flags: FileLoadingFlags) {
        if !flags.needs_post_process() {
            return;
        }
        let pre_transform = flags.contains(FileLoadingFlags::PRE_TRANSFORM_VERTICES);
        let flip_y = flags.contains(FileLoadingFlags::FLIP_Y);
        let pre_multiply = flags.contains(FileLoadingFlags::PRE_MULTIPLY_VERTEX_COLORS);

        for i in 0..self.nodes.len() {
            let mesh = match self.nodes[i].mesh.as_ref() {
                Some(mesh) => mesh,
                None => continue,
            };
            let world = self.world_matrix(NodeId(i));
            let normal_matrix = Mat3::from_mat4(world);
            for primitive in mesh.primitives.iter() {
                let base_color = self
                    .materials
                    .get(primitive.material)
                    .map(|m| m.base_color_factor)
                    .unwrap_or(Vec4::ONE);
                let start = primitive.first_vertex as usize;
                let end = start + primitive.vertex_count as usize;
                for vertex in self.vertices[start..end].iter_mut() {
                    if pre_transform {
                        vertex.pos = world.transform_point3(vertex.pos);
                        vertex.normal = (normal_matrix * vertex.normal).normalize_or_zero();
                    }
                    if flip_y {
                        vertex.pos.y *= -1.0;
                        vertex.normal.y *= -1.0;
                    }
                    if pre_multiply {
                        vertex.color = base_color * vertex.color;
                    }
                }
            }
        }
    }
}
