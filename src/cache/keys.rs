//! Cache Keys
//!
//! One [`CacheKey`] per device object kind. Keys hold everything the
//! object is built from, so two equal keys always produce interchangeable
//! objects.
//!
//! | Key | Resource | Dependencies |
//! |---|---|---|
//! | [`TextureKey`] | [`Texture`] | - |
//! | [`SamplerKey`] | [`Sampler`] | - |
//! | [`ShaderModuleKey`] | [`ShaderModule`] | - |
//! | [`ShaderProgramKey`] | [`ShaderProgram`] | shader modules |
//! | [`RenderStateKey`] | [`RenderState`] | shader program, pass table |
//! | [`ComputeStateKey`] | [`ComputeState`] | shader program |
//! | [`GeometryKey`] | [`GeometryBuffers`] | - |
//! | [`AtlasKey`] | [`AtlasResource`] | - |

use std::f32::consts::PI;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use glam::{Vec2, Vec3};
use smallvec::SmallVec;

use super::{CacheKey, Handle};
use crate::binding::{
    BindingInput, CompiledBindings, ComputeShaderType, ParticlePass, ShaderOptions, build_bindings,
    pipeline_state,
};
use crate::context::GraphicsDeviceContext;
use crate::errors::{Result, RhiError};
use crate::hash::{ShaderPermutation, compute_shader_path, content_hash, remap_shader_path};
use crate::material::{FieldDecl, RendererClass, RendererDescriptor, ToggledFeature};
use crate::rhi::{
    Buffer, BufferDesc, BufferKind, ComputeState, ComputeStateDesc, ConstantBinding, ConstantSet,
    ConstantSetLayout, IndexSize, MeshData, PipelineState, RenderApi, RenderState,
    RenderStateDesc, Sampler, SamplerDesc, ShaderModule, ShaderProgram, ShaderStage, Texture,
    TextureDesc,
};

// ============================================================================
// Textures and samplers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub path: String,
    pub srgb: bool,
}

impl TextureKey {
    #[must_use]
    pub fn new(path: impl Into<String>, srgb: bool) -> Self {
        Self {
            path: path.into(),
            srgb,
        }
    }
}

impl CacheKey for TextureKey {
    type Resource = Texture;
    type Deps = ();
    type Args<'a> = ();
    const KIND: &'static str = "texture";

    fn label(&self) -> String {
        self.path.clone()
    }

    fn prepare(&mut self, _ctx: &GraphicsDeviceContext, _args: ()) -> Result<()> {
        if self.path.is_empty() {
            return Err(RhiError::ResourceNotFound("<empty texture path>".into()));
        }
        Ok(())
    }

    fn create(&self, _deps: &(), ctx: &GraphicsDeviceContext) -> Result<Arc<Texture>> {
        let data = ctx
            .provider()
            .load_texture(&self.path, self.srgb)
            .ok_or_else(|| RhiError::ResourceNotFound(self.path.clone()))?;
        ctx.api().create_texture(
            &TextureDesc {
                name: self.path.clone(),
                size: [data.width, data.height],
                format: data.format,
                srgb: self.srgb,
                mip_count: 1,
            },
            &data.pixels,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub desc: SamplerDesc,
}

impl CacheKey for SamplerKey {
    type Resource = Sampler;
    type Deps = ();
    type Args<'a> = ();
    const KIND: &'static str = "sampler";

    fn label(&self) -> String {
        format!("{:?}/{:?}", self.desc.min_filter, self.desc.address_mode[0])
    }

    fn prepare(&mut self, _ctx: &GraphicsDeviceContext, _args: ()) -> Result<()> {
        Ok(())
    }

    fn create(&self, _deps: &(), ctx: &GraphicsDeviceContext) -> Result<Arc<Sampler>> {
        ctx.api().create_sampler("Particle Sampler", &self.desc)
    }
}

// ============================================================================
// Shaders
// ============================================================================

/// Compiled shader file, path without the API extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderModuleKey {
    pub path: String,
    pub stage: ShaderStage,
}

impl CacheKey for ShaderModuleKey {
    type Resource = ShaderModule;
    type Deps = ();
    type Args<'a> = ();
    const KIND: &'static str = "shader module";

    fn label(&self) -> String {
        self.path.clone()
    }

    fn prepare(&mut self, _ctx: &GraphicsDeviceContext, _args: ()) -> Result<()> {
        if self.path.is_empty() {
            return Err(RhiError::ResourceNotFound(format!(
                "<empty {} shader path>",
                self.stage.name()
            )));
        }
        Ok(())
    }

    fn create(&self, _deps: &(), ctx: &GraphicsDeviceContext) -> Result<Arc<ShaderModule>> {
        let path = format!("{}{}", self.path, ctx.caps().graphics_api.shader_extension());
        log::info!("Loading shader {path}");
        let bytes = ctx
            .provider()
            .load_shader(&path)
            .ok_or_else(|| RhiError::ResourceNotFound(path.clone()))?;
        ctx.api().create_shader_module(&path, self.stage, &bytes)
    }
}

/// Ordered stage modules of one program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderProgramKey {
    pub modules: SmallVec<[ShaderModuleKey; 3]>,
}

impl ShaderProgramKey {
    /// Modules of a graphics permutation. The geometry stage is named after
    /// the vertex source, the fragment stage after the material's fragment
    /// source.
    #[must_use]
    pub fn graphics(
        root: &str,
        shaders: &MaterialShaders,
        class: RendererClass,
        options: ShaderOptions,
        features: &[ToggledFeature],
        pass: ParticlePass,
    ) -> Self {
        let modules = options
            .stage_pipeline()
            .stages()
            .iter()
            .map(|&stage| {
                let source_path = match stage {
                    ShaderStage::Fragment => shaders.fragment_path.as_str(),
                    _ => shaders.vertex_path.as_str(),
                };
                let permutation = ShaderPermutation {
                    source_path,
                    material: &shaders.material_name,
                    stage,
                    class,
                    options,
                    features,
                    pass,
                };
                ShaderModuleKey {
                    path: remap_shader_path(root, &permutation),
                    stage,
                }
            })
            .collect();
        Self { modules }
    }

    /// Single compute module, named after its binding layout.
    pub fn compute(root: &str, ty: ComputeShaderType) -> Result<Self> {
        let mut modules = SmallVec::new();
        modules.push(ShaderModuleKey {
            path: compute_shader_path(root, ty)?,
            stage: ShaderStage::Compute,
        });
        Ok(Self { modules })
    }
}

impl CacheKey for ShaderProgramKey {
    type Resource = ShaderProgram;
    type Deps = SmallVec<[Handle<ShaderModuleKey>; 3]>;
    type Args<'a> = ();
    const KIND: &'static str = "shader program";

    fn label(&self) -> String {
        self.modules
            .iter()
            .map(|m| m.path.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    }

    fn prepare(&mut self, ctx: &GraphicsDeviceContext, _args: ()) -> Result<Self::Deps> {
        let mut handles = SmallVec::new();
        for module in &self.modules {
            match ctx.shader_modules.acquire(ctx, module.clone(), ()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.release_dependencies(&handles, ctx);
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    fn create(&self, deps: &Self::Deps, ctx: &GraphicsDeviceContext) -> Result<Arc<ShaderProgram>> {
        let modules = deps
            .iter()
            .zip(&self.modules)
            .map(|(&handle, key)| {
                ctx.shader_modules
                    .resolve(ctx, handle)
                    .ok_or_else(|| RhiError::NotReady(key.path.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        ctx.api().create_shader_program(&self.label(), modules)
    }

    fn release_dependencies(&self, deps: &Self::Deps, ctx: &GraphicsDeviceContext) {
        for &handle in deps {
            ctx.shader_modules.release(ctx, handle);
        }
    }
}

// ============================================================================
// Render and compute states
// ============================================================================

/// Shader sources of a material, with the fragment path already defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MaterialShaders {
    pub material_name: String,
    pub vertex_path: String,
    pub fragment_path: String,
}

impl MaterialShaders {
    #[must_use]
    pub fn of(renderer: &RendererDescriptor) -> Self {
        Self {
            material_name: renderer.material.material_name.clone(),
            vertex_path: renderer.material.vertex_shader_path.clone(),
            fragment_path: renderer.material.fragment_path(),
        }
    }
}

/// What a render or compute state key prepared.
#[derive(Debug)]
pub struct StateDeps {
    pub program: Handle<ShaderProgramKey>,
    pub bindings: CompiledBindings,
}

/// One (options, pass) permutation of a renderer.
///
/// Only enabled features are kept: renderers that differ by disabled
/// features or by property values share the same state. Equality and
/// hashing go through `content_hash` in place of the feature list, so two
/// feature sets with the same digest land on the same entry.
#[derive(Debug, Clone)]
pub struct RenderStateKey {
    pub content_hash: u64,
    pub class: RendererClass,
    pub options: ShaderOptions,
    pub pass: ParticlePass,
    pub shaders: MaterialShaders,
    pub features: Vec<ToggledFeature>,
    pub fields: Vec<FieldDecl>,
    pub pipeline: PipelineState,
}

impl RenderStateKey {
    #[must_use]
    pub fn new(renderer: &RendererDescriptor, options: ShaderOptions, pass: ParticlePass) -> Self {
        let features: Vec<ToggledFeature> = renderer
            .toggled_features()
            .into_iter()
            .filter(|t| t.enabled)
            .collect();
        Self {
            content_hash: content_hash(options, renderer.class, &features),
            class: renderer.class,
            options,
            pass,
            shaders: MaterialShaders::of(renderer),
            features,
            fields: renderer.fields.clone(),
            pipeline: pipeline_state(renderer, options, pass),
        }
    }
}

impl PartialEq for RenderStateKey {
    fn eq(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash
            && self.class == other.class
            && self.options == other.options
            && self.pass == other.pass
            && self.shaders == other.shaders
            && self.fields == other.fields
            && self.pipeline == other.pipeline
    }
}

impl Eq for RenderStateKey {}

impl Hash for RenderStateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.content_hash.hash(state);
        self.class.hash(state);
        self.options.hash(state);
        self.pass.hash(state);
        self.shaders.hash(state);
        self.fields.hash(state);
        self.pipeline.hash(state);
    }
}

impl CacheKey for RenderStateKey {
    type Resource = RenderState;
    type Deps = StateDeps;
    type Args<'a> = ();
    const KIND: &'static str = "render state";

    fn label(&self) -> String {
        format!(
            "{} {} {}",
            self.shaders.material_name,
            self.pass.name(),
            self.options.shader_name(ShaderStage::Vertex)
        )
    }

    fn prepare(&mut self, ctx: &GraphicsDeviceContext, _args: ()) -> Result<StateDeps> {
        let bindings = build_bindings(&BindingInput::new(
            self.class,
            self.options,
            &self.features,
            &self.fields,
        ))?;
        let program_key = ShaderProgramKey::graphics(
            ctx.shader_root(),
            &self.shaders,
            self.class,
            self.options,
            &self.features,
            self.pass,
        );
        let program = ctx.shader_programs.acquire(ctx, program_key, ())?;
        Ok(StateDeps { program, bindings })
    }

    fn create(&self, deps: &StateDeps, ctx: &GraphicsDeviceContext) -> Result<Arc<RenderState>> {
        let program = ctx
            .shader_programs
            .resolve(ctx, deps.program)
            .ok_or_else(|| RhiError::NotReady(format!("shader program of '{}'", self.label())))?;
        let pass = ctx
            .pass_description(self.pass)
            .ok_or(RhiError::PassNotAvailable(self.pass.name()))?;
        ctx.api().create_render_state(RenderStateDesc {
            name: self.label(),
            bindings: deps.bindings.bindings.clone(),
            pipeline: self.pipeline,
            program,
            render_pass: pass.render_pass,
            sub_pass: pass.sub_pass,
        })
    }

    fn release_dependencies(&self, deps: &StateDeps, ctx: &GraphicsDeviceContext) {
        ctx.shader_programs.release(ctx, deps.program);
    }

    fn collides(&self, existing: &StateDeps, prepared: &StateDeps) -> bool {
        existing.bindings != prepared.bindings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputeStateKey {
    pub ty: ComputeShaderType,
}

impl CacheKey for ComputeStateKey {
    type Resource = ComputeState;
    type Deps = StateDeps;
    type Args<'a> = ();
    const KIND: &'static str = "compute state";

    fn label(&self) -> String {
        self.ty.stem().to_owned()
    }

    fn prepare(&mut self, ctx: &GraphicsDeviceContext, _args: ()) -> Result<StateDeps> {
        let bindings = self.ty.bindings()?;
        let program_key = ShaderProgramKey::compute(ctx.shader_root(), self.ty)?;
        let program = ctx.shader_programs.acquire(ctx, program_key, ())?;
        Ok(StateDeps { program, bindings })
    }

    fn create(&self, deps: &StateDeps, ctx: &GraphicsDeviceContext) -> Result<Arc<ComputeState>> {
        let program = ctx
            .shader_programs
            .resolve(ctx, deps.program)
            .ok_or_else(|| RhiError::NotReady(format!("shader program of '{}'", self.label())))?;
        ctx.api().create_compute_state(ComputeStateDesc {
            name: self.label(),
            bindings: deps.bindings.bindings.clone(),
            program,
        })
    }

    fn release_dependencies(&self, deps: &StateDeps, ctx: &GraphicsDeviceContext) {
        ctx.shader_programs.release(ctx, deps.program);
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Subdivisions of the light sphere.
const SPHERE_SUBDIVS: u32 = 30;

/// Extra geometry drawn per particle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeometryKey {
    /// Mesh loaded through the resource provider.
    Mesh(String),
    /// Unit light sphere.
    Sphere,
    /// Unit decal box, `[-1, 1]` on every axis.
    Cube,
}

/// GPU buffers of one geometry: positions, then normals and UVs when the
/// source has them.
#[derive(Debug)]
pub struct GeometryBuffers {
    pub vertex_buffers: Vec<Arc<Buffer>>,
    pub index_buffer: Arc<Buffer>,
    pub index_size: IndexSize,
    pub index_count: u32,
    pub vertex_count: u32,
}

impl GeometryBuffers {
    /// Creates and fills the buffers of a mesh.
    pub fn upload(api: &dyn RenderApi, name: &str, mesh: &MeshData) -> Result<Self> {
        if mesh.is_empty() {
            return Err(RhiError::creation("geometry", name, "empty mesh"));
        }

        let mut vertex_buffers = Vec::with_capacity(3);
        vertex_buffers.push(upload_buffer(
            api,
            &format!("{name} Positions"),
            BufferKind::Vertex,
            bytemuck::cast_slice(&mesh.positions),
        )?);
        if !mesh.normals.is_empty() {
            vertex_buffers.push(upload_buffer(
                api,
                &format!("{name} Normals"),
                BufferKind::Vertex,
                bytemuck::cast_slice(&mesh.normals),
            )?);
        }
        if !mesh.uvs.is_empty() {
            vertex_buffers.push(upload_buffer(
                api,
                &format!("{name} UVs"),
                BufferKind::Vertex,
                bytemuck::cast_slice(&mesh.uvs),
            )?);
        }
        let index_buffer = upload_buffer(
            api,
            &format!("{name} Indices"),
            BufferKind::Index,
            bytemuck::cast_slice(&mesh.indices),
        )?;

        Ok(Self {
            vertex_buffers,
            index_buffer,
            index_size: IndexSize::U32,
            index_count: mesh.indices.len() as u32,
            vertex_count: mesh.positions.len() as u32,
        })
    }
}

fn upload_buffer(api: &dyn RenderApi, name: &str, kind: BufferKind, bytes: &[u8]) -> Result<Arc<Buffer>> {
    let buffer = api.create_buffer(&BufferDesc::new(name, kind, bytes.len() as u64))?;
    api.map_write(&buffer, 0, bytes)?;
    Ok(buffer)
}

impl CacheKey for GeometryKey {
    type Resource = GeometryBuffers;
    type Deps = ();
    type Args<'a> = ();
    const KIND: &'static str = "geometry";

    fn label(&self) -> String {
        match self {
            Self::Mesh(path) => path.clone(),
            Self::Sphere => "Sphere".to_owned(),
            Self::Cube => "Cube".to_owned(),
        }
    }

    fn prepare(&mut self, _ctx: &GraphicsDeviceContext, _args: ()) -> Result<()> {
        if let Self::Mesh(path) = self
            && path.is_empty()
        {
            return Err(RhiError::ResourceNotFound("<empty mesh path>".into()));
        }
        Ok(())
    }

    fn create(&self, _deps: &(), ctx: &GraphicsDeviceContext) -> Result<Arc<GeometryBuffers>> {
        let mesh = match self {
            Self::Mesh(path) => ctx
                .provider()
                .load_mesh(path)
                .filter(|m| !m.is_empty())
                .ok_or_else(|| RhiError::ResourceNotFound(path.clone()))?,
            Self::Sphere => procedural_sphere(SPHERE_SUBDIVS),
            Self::Cube => procedural_cube(),
        };
        GeometryBuffers::upload(ctx.api(), &self.label(), &mesh).map(Arc::new)
    }
}

/// Box spanning `[-1, 1]` on every axis, 24 vertices with face normals.
#[must_use]
pub fn procedural_cube() -> MeshData {
    let mut mesh = MeshData::default();
    for axis in 0..3 {
        for sign in [1.0f32, -1.0] {
            let mut normal = Vec3::ZERO;
            normal[axis] = sign;
            let u_axis = Vec3::AXES[(axis + 1) % 3];
            let v_axis = Vec3::AXES[(axis + 2) % 3];
            let base = mesh.positions.len() as u32;
            for (u, v) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                mesh.positions.push(normal + u_axis * u * sign + v_axis * v);
                mesh.normals.push(normal);
                mesh.uvs.push(Vec2::new((u + 1.0) * 0.5, (v + 1.0) * 0.5));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }
    mesh
}

/// Latitude/longitude sphere scaled so its facets enclose the unit sphere.
#[must_use]
pub fn procedural_sphere(subdivs: u32) -> MeshData {
    let subdivs = subdivs.max(3);
    let radius = 1.0 / (PI / subdivs as f32).cos();
    let rings = subdivs / 2;
    let mut mesh = MeshData::default();

    for ring in 0..=rings {
        let theta = PI * ring as f32 / rings as f32;
        for segment in 0..=subdivs {
            let phi = 2.0 * PI * segment as f32 / subdivs as f32;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            mesh.positions.push(normal * radius);
            mesh.normals.push(normal);
            mesh.uvs
                .push(Vec2::new(segment as f32 / subdivs as f32, ring as f32 / rings as f32));
        }
    }

    let stride = subdivs + 1;
    for ring in 0..rings {
        for segment in 0..subdivs {
            let a = ring * stride + segment;
            let b = a + stride;
            mesh.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    mesh
}

// ============================================================================
// Atlas
// ============================================================================

/// Path prefix of atlases generated from a subdivision count.
pub const PROCEDURAL_ATLAS_PREFIX: &str = "$_ProceduralAtlas_$/";

/// Atlas rectangles, either from a definition file or procedural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtlasKey {
    pub path: String,
}

impl AtlasKey {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Regular grid of `x` by `y` sub-images.
    #[must_use]
    pub fn procedural(x: u32, y: u32) -> Self {
        Self::new(format!("{PROCEDURAL_ATLAS_PREFIX}{x}.{y}"))
    }

    fn subdivisions(&self) -> Option<(u32, u32)> {
        let (x, y) = self.path.strip_prefix(PROCEDURAL_ATLAS_PREFIX)?.split_once('.')?;
        let (x, y) = (x.parse().ok()?, y.parse().ok()?);
        (x > 0 && y > 0).then_some((x, y))
    }
}

/// Rects of a `x` by `y` grid, row-major, as `[scale_u, scale_v, offset_u, offset_v]`.
#[must_use]
pub fn grid_atlas_rects(x: u32, y: u32) -> Vec<[f32; 4]> {
    let (sx, sy) = (1.0 / x as f32, 1.0 / y as f32);
    (0..y)
        .flat_map(|row| (0..x).map(move |col| [sx, sy, col as f32 * sx, row as f32 * sy]))
        .collect()
}

/// Raw atlas buffer and the constant set exposing it.
#[derive(Debug)]
pub struct AtlasResource {
    pub constant_set: Arc<ConstantSet>,
    pub buffer: Arc<Buffer>,
    pub rect_count: u32,
}

impl AtlasResource {
    /// Uploads `u32 count` followed by one `Float4` per rect.
    pub fn upload(api: &dyn RenderApi, layout: &ConstantSetLayout, rects: &[[f32; 4]]) -> Result<Self> {
        let rect_count = rects.len() as u32;
        let mut bytes = Vec::with_capacity(4 + rects.len() * 16);
        bytes.extend_from_slice(&rect_count.to_le_bytes());
        bytes.extend_from_slice(bytemuck::cast_slice(rects));

        let buffer = upload_buffer(api, "Atlas Buffer", BufferKind::Raw, &bytes)?;
        let constant_set = api.create_constant_set(
            "Atlas Constant Set",
            layout,
            vec![ConstantBinding::Buffer(Arc::clone(&buffer))],
        )?;
        Ok(Self {
            constant_set,
            buffer,
            rect_count,
        })
    }
}

impl CacheKey for AtlasKey {
    type Resource = AtlasResource;
    /// Rects loaded on the update side.
    type Deps = Vec<[f32; 4]>;
    type Args<'a> = ();
    const KIND: &'static str = "atlas";

    fn label(&self) -> String {
        self.path.clone()
    }

    fn prepare(&mut self, ctx: &GraphicsDeviceContext, _args: ()) -> Result<Vec<[f32; 4]>> {
        let rects = match self.subdivisions() {
            Some((x, y)) => grid_atlas_rects(x, y),
            None => ctx
                .provider()
                .load_atlas(&self.path)
                .ok_or_else(|| RhiError::ResourceNotFound(self.path.clone()))?,
        };
        if rects.is_empty() {
            return Err(RhiError::InvalidField(format!("atlas '{}' has no rects", self.path)));
        }
        Ok(rects)
    }

    fn create(&self, rects: &Vec<[f32; 4]>, ctx: &GraphicsDeviceContext) -> Result<Arc<AtlasResource>> {
        AtlasResource::upload(ctx.api(), &ctx.layouts().atlas, rects).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedural_atlas_path() {
        let key = AtlasKey::procedural(4, 2);
        assert_eq!(key.path, "$_ProceduralAtlas_$/4.2");
        assert_eq!(key.subdivisions(), Some((4, 2)));
        assert_eq!(AtlasKey::new("Atlases/fire.pkat").subdivisions(), None);
        assert_eq!(AtlasKey::procedural(0, 2).subdivisions(), None);

        let rects = grid_atlas_rects(4, 2);
        assert_eq!(rects.len(), 8);
        assert_eq!(rects[0], [0.25, 0.5, 0.0, 0.0]);
        assert_eq!(rects[5], [0.25, 0.5, 0.25, 0.5]);
    }

    #[test]
    fn test_procedural_geometry() {
        let cube = procedural_cube();
        assert_eq!(cube.positions.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.positions.iter().all(|p| p.abs().max_element() <= 1.0 + f32::EPSILON));

        let sphere = procedural_sphere(SPHERE_SUBDIVS);
        assert!(!sphere.is_empty());
        assert!(sphere.indices.iter().all(|&i| (i as usize) < sphere.positions.len()));
        assert!(sphere.positions.iter().all(|p| p.length() >= 1.0));
    }
}
