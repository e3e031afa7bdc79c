use std::borrow::Cow;
use std::collections::HashMap;
use std::num::NonZeroU64;

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};
use wgpu::naga;
use wgpu::util::DeviceExt;

use crate::program::{
    AttributeLocation, BuildError, DrawError, ProgramBackend, ProgramBindings, Stage,
    SurfaceSize, UniformLocation, POSITION_ATTRIBUTE,
};

use super::context::GpuContext;

/// Size of the single `FrameParams` block: `vec2 resolution; float time;`
/// rounded up to std140 alignment.
const UNIFORM_BLOCK_SIZE: usize = 16;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
}

const QUAD: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
    },
];

pub struct WgpuShader {
    stage: Stage,
    module: wgpu::ShaderModule,
    reflection: naga::Module,
}

pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
    attributes: HashMap<String, u32>,
    uniforms: HashMap<String, u32>,
}

/// [`ProgramBackend`] on top of wgpu.
///
/// GLSL is parsed and validated through naga before wgpu sees it, and module
/// and pipeline creation run inside validation error scopes so that a bad
/// program turns into a [`BuildError`] instead of a device-level panic.
pub struct WgpuBackend {
    context: GpuContext,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_data: [u8; UNIFORM_BLOCK_SIZE],
    quad: wgpu::Buffer,
    viewport: SurfaceSize,
}

impl WgpuBackend {
    pub fn new<W>(window: W, size: SurfaceSize) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let context = GpuContext::new(window, size)?;
        let device = &context.device;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(UNIFORM_BLOCK_SIZE as u64),
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ribbon pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame uniforms"),
            size: UNIFORM_BLOCK_SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame uniform bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fullscreen quad"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let viewport = context.size;
        Ok(Self {
            context,
            pipeline_layout,
            uniform_buffer,
            uniform_bind_group,
            uniform_data: [0; UNIFORM_BLOCK_SIZE],
            quad,
            viewport,
        })
    }

    /// Size the swapchain is currently configured with.
    fn write_uniform(&mut self, location: UniformLocation, bytes: &[u8]) {
        let start = location.0 as usize;
        match self.uniform_data.get_mut(start..start + bytes.len()) {
            Some(slot) => slot.copy_from_slice(bytes),
            None => warn!(
                offset = location.0,
                len = bytes.len(),
                "uniform write outside the frame block ignored"
            ),
        }
    }
}

fn naga_stage(stage: Stage) -> naga::ShaderStage {
    match stage {
        Stage::Vertex => naga::ShaderStage::Vertex,
        Stage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parses and validates GLSL the same way wgpu will.
pub(crate) fn parse_glsl(stage: Stage, source: &str) -> Result<naga::Module, BuildError> {
    let module = naga::front::glsl::Frontend::default()
        .parse(&naga::front::glsl::Options::from(naga_stage(stage)), source)
        .map_err(|errors| BuildError::Compile {
            stage,
            log: errors.emit_to_string(source),
        })?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|err| BuildError::Compile {
        stage,
        log: err.emit_to_string(source),
    })?;
    Ok(module)
}

/// Vertex inputs of the vertex entry point, keyed by name.
///
/// When the stage declares exactly one input it is also reachable as
/// `position`, whatever the source calls it.
pub(crate) fn reflect_attributes(
    module: &naga::Module,
) -> Result<HashMap<String, u32>, BuildError> {
    let entry = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == naga::ShaderStage::Vertex)
        .ok_or_else(|| BuildError::Link("vertex stage has no entry point".into()))?;

    let mut attributes = HashMap::new();
    let mut inputs = Vec::new();
    for argument in &entry.function.arguments {
        let Some(naga::Binding::Location { location, .. }) = argument.binding else {
            continue;
        };
        let is_vec2 = matches!(
            module.types[argument.ty].inner,
            naga::TypeInner::Vector {
                size: naga::VectorSize::Bi,
                scalar: naga::Scalar::F32,
            }
        );
        inputs.push((location, is_vec2));
        if let Some(name) = &argument.name {
            attributes.insert(name.clone(), location);
        }
    }

    if let [(location, _)] = inputs.as_slice() {
        attributes
            .entry(POSITION_ATTRIBUTE.to_string())
            .or_insert(*location);
    }
    if let Some(position) = attributes.get(POSITION_ATTRIBUTE) {
        let is_vec2 = inputs
            .iter()
            .any(|(location, is_vec2)| location == position && *is_vec2);
        if !is_vec2 {
            return Err(BuildError::Link(format!(
                "`{POSITION_ATTRIBUTE}` must be a vec2 input"
            )));
        }
    }
    Ok(attributes)
}

/// Member offsets of the frame uniform block (set 0, binding 0).
pub(crate) fn reflect_uniforms(module: &naga::Module) -> Result<HashMap<String, u32>, BuildError> {
    let mut uniforms = HashMap::new();
    for (_, variable) in module.global_variables.iter() {
        match variable.space {
            naga::AddressSpace::Uniform => {}
            naga::AddressSpace::Handle
            | naga::AddressSpace::Storage { .. }
            | naga::AddressSpace::PushConstant => {
                return Err(BuildError::Link(format!(
                    "unsupported resource `{}`; only the frame uniform block is bound",
                    variable.name.as_deref().unwrap_or("<unnamed>")
                )));
            }
            _ => continue,
        }

        match &variable.binding {
            Some(naga::ResourceBinding {
                group: 0,
                binding: 0,
            }) => {}
            other => {
                return Err(BuildError::Link(format!(
                    "uniform block bound at {other:?}; expected set 0, binding 0"
                )));
            }
        }

        match &module.types[variable.ty].inner {
            naga::TypeInner::Struct { members, span } => {
                if *span as usize > UNIFORM_BLOCK_SIZE {
                    return Err(BuildError::Link(format!(
                        "uniform block is {span} bytes; at most {UNIFORM_BLOCK_SIZE} are provided"
                    )));
                }
                for member in members {
                    if let Some(name) = &member.name {
                        uniforms.insert(name.clone(), member.offset);
                    }
                }
            }
            _ => {
                if let Some(name) = &variable.name {
                    uniforms.insert(name.clone(), 0);
                }
            }
        }
    }
    Ok(uniforms)
}

impl ProgramBackend for WgpuBackend {
    type Shader = WgpuShader;
    type Program = WgpuProgram;

    fn compile_shader(&mut self, stage: Stage, source: &str) -> Result<WgpuShader, BuildError> {
        let reflection = parse_glsl(stage, source)?;

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(match stage {
                Stage::Vertex => "ribbon vertex",
                Stage::Fragment => "ribbon fragment",
            }),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source.to_string()),
                stage: naga_stage(stage),
                defines: &[],
            },
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(BuildError::Compile {
                stage,
                log: err.to_string(),
            });
        }

        debug!(?stage, bytes = source.len(), "compiled shader module");
        Ok(WgpuShader {
            stage,
            module,
            reflection,
        })
    }

    fn link(
        &mut self,
        vertex: &WgpuShader,
        fragment: &WgpuShader,
    ) -> Result<WgpuProgram, BuildError> {
        if vertex.stage != Stage::Vertex || fragment.stage != Stage::Fragment {
            return Err(BuildError::Link("shader stages passed in the wrong order".into()));
        }

        let attributes = reflect_attributes(&vertex.reflection)?;
        let mut uniforms = reflect_uniforms(&vertex.reflection)?;
        uniforms.extend(reflect_uniforms(&fragment.reflection)?);

        let vertex_attributes = attributes
            .get(POSITION_ATTRIBUTE)
            .map(|&location| {
                [wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 0,
                    shader_location: location,
                }]
            });
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = vertex_attributes
            .iter()
            .map(|attributes| wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("ribbon pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex.module,
                entry_point: Some("main"),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment.module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.context.format(),
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(BuildError::Link(err.to_string()));
        }

        Ok(WgpuProgram {
            pipeline,
            attributes,
            uniforms,
        })
    }

    fn attribute_location(&self, program: &WgpuProgram, name: &str) -> Option<AttributeLocation> {
        program.attributes.get(name).copied().map(AttributeLocation)
    }

    fn uniform_location(&self, program: &WgpuProgram, name: &str) -> Option<UniformLocation> {
        program.uniforms.get(name).copied().map(UniformLocation)
    }

    fn release_program(&mut self, program: WgpuProgram) {
        drop(program);
    }

    fn set_viewport(&mut self, size: SurfaceSize) -> SurfaceSize {
        self.viewport = self.context.resize(size);
        self.viewport
    }

    fn set_uniform_vec2(
        &mut self,
        _program: &WgpuProgram,
        location: UniformLocation,
        value: [f32; 2],
    ) {
        self.write_uniform(location, bytemuck::bytes_of(&value));
    }

    fn set_uniform_f32(&mut self, _program: &WgpuProgram, location: UniformLocation, value: f32) {
        self.write_uniform(location, bytemuck::bytes_of(&value));
    }

    fn draw(
        &mut self,
        program: &WgpuProgram,
        _bindings: &ProgramBindings,
    ) -> Result<(), DrawError> {
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return Err(DrawError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::Timeout) => return Err(DrawError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(DrawError::OutOfMemory),
            Err(other) => return Err(DrawError::Backend(other.to_string())),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, &self.uniform_data);

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ribbon frame"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ribbon pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_viewport(
                0.0,
                0.0,
                self.viewport.width as f32,
                self.viewport.height as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.quad.slice(..));
            render_pass.draw(0..QUAD.len() as u32, 0..1);
        }

        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ribbonconfig::ParameterSet;

    fn generated() -> (naga::Module, naga::Module) {
        let shader = shadergen::generate(&ParameterSet::default()).unwrap();
        (
            parse_glsl(Stage::Vertex, shader.vertex).unwrap(),
            parse_glsl(Stage::Fragment, &shader.fragment).unwrap(),
        )
    }

    #[test]
    fn reflects_generated_bindings() {
        let (vertex, fragment) = generated();
        let attributes = reflect_attributes(&vertex).unwrap();
        assert_eq!(attributes.get(POSITION_ATTRIBUTE), Some(&0));

        let uniforms = reflect_uniforms(&fragment).unwrap();
        assert_eq!(uniforms.get("resolution"), Some(&0));
        assert_eq!(uniforms.get("time"), Some(&8));
    }

    #[test]
    fn sole_input_is_treated_as_position() {
        let source = "#version 450\nlayout(location = 2) in vec2 corner;\nvoid main() {\n    gl_Position = vec4(corner, 0.0, 1.0);\n}\n";
        let module = parse_glsl(Stage::Vertex, source).unwrap();
        let attributes = reflect_attributes(&module).unwrap();
        assert_eq!(attributes.get(POSITION_ATTRIBUTE), Some(&2));
    }

    #[test]
    fn rejects_non_vec2_position() {
        let source = "#version 450\nlayout(location = 0) in vec3 position;\nvoid main() {\n    gl_Position = vec4(position, 1.0);\n}\n";
        let module = parse_glsl(Stage::Vertex, source).unwrap();
        assert!(matches!(
            reflect_attributes(&module),
            Err(BuildError::Link(_))
        ));
    }

    #[test]
    fn rejects_oversized_uniform_block() {
        let source = "#version 450\nlayout(location = 0) out vec4 color;\nlayout(std140, set = 0, binding = 0) uniform Big {\n    vec4 a;\n    vec4 b;\n} big;\nvoid main() {\n    color = big.a + big.b;\n}\n";
        let module = parse_glsl(Stage::Fragment, source).unwrap();
        assert!(matches!(reflect_uniforms(&module), Err(BuildError::Link(_))));
    }

    #[test]
    fn syntax_errors_carry_diagnostics() {
        let err = parse_glsl(Stage::Fragment, "#version 450\nvoid main() { nope }\n").unwrap_err();
        match err {
            BuildError::Compile { stage, log } => {
                assert_eq!(stage, Stage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
