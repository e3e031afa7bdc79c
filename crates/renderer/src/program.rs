//! Backend-agnostic program lifecycle with hot-swap-or-rollback semantics.
//!
//! [`ProgramManager`] only ever replaces its active program after a brand-new
//! one has compiled, linked and had its bindings resolved. A failed build
//! leaves the active handle, its bindings and the last presented frame
//! untouched.

use scheduler::DrawTarget;
use tracing::{debug, error, info, warn};

/// Name of the vertex attribute carrying quad corners.
pub const POSITION_ATTRIBUTE: &str = "position";
/// Name of the `vec2` uniform carrying the backing-store size in pixels.
pub const RESOLUTION_UNIFORM: &str = "resolution";
/// Name of the `float` uniform carrying the loop phase in `[0, 1)`.
pub const TIME_UNIFORM: &str = "time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Backing-store dimensions in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn as_vec2(self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{stage:?} shader failed to compile:\n{log}")]
    Compile { stage: Stage, log: String },
    #[error("program failed to link: {0}")]
    Link(String),
    #[error("program does not expose the `{0}` attribute")]
    MissingAttribute(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    #[error("no program is active")]
    NoProgram,
    #[error("surface lost or outdated")]
    SurfaceLost,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("GPU is out of memory")]
    OutOfMemory,
    #[error("{0}")]
    Backend(String),
}

/// Resolved locations for the fixed uniform and attribute contract.
///
/// Uniform locations are optional: a stage that never reads `time` may have it
/// eliminated, and writes to a missing location are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramBindings {
    pub position: AttributeLocation,
    pub resolution: Option<UniformLocation>,
    pub time: Option<UniformLocation>,
}

#[derive(Debug)]
pub struct CompiledProgram<P> {
    pub handle: P,
    pub bindings: ProgramBindings,
}

/// The GPU operations the manager needs. Implemented by
/// [`crate::WgpuBackend`] and by in-memory fakes in tests.
pub trait ProgramBackend {
    type Shader;
    type Program;

    fn compile_shader(&mut self, stage: Stage, source: &str) -> Result<Self::Shader, BuildError>;

    fn link(
        &mut self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program, BuildError>;

    fn attribute_location(&self, program: &Self::Program, name: &str) -> Option<AttributeLocation>;

    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<UniformLocation>;

    fn release_program(&mut self, program: Self::Program);

    /// Sizes the render target and returns the size actually in effect,
    /// which may be smaller than requested when the device caps it.
    fn set_viewport(&mut self, size: SurfaceSize) -> SurfaceSize;

    fn set_uniform_vec2(
        &mut self,
        program: &Self::Program,
        location: UniformLocation,
        value: [f32; 2],
    );

    fn set_uniform_f32(&mut self, program: &Self::Program, location: UniformLocation, value: f32);

    fn draw(&mut self, program: &Self::Program, bindings: &ProgramBindings)
        -> Result<(), DrawError>;
}

fn compile_program<B: ProgramBackend>(
    backend: &mut B,
    vertex: &str,
    fragment: &str,
) -> Result<CompiledProgram<B::Program>, BuildError> {
    let vertex = backend.compile_shader(Stage::Vertex, vertex)?;
    let fragment = backend.compile_shader(Stage::Fragment, fragment)?;
    let program = backend.link(&vertex, &fragment)?;

    let Some(position) = backend.attribute_location(&program, POSITION_ATTRIBUTE) else {
        backend.release_program(program);
        return Err(BuildError::MissingAttribute(POSITION_ATTRIBUTE));
    };
    let resolution = backend.uniform_location(&program, RESOLUTION_UNIFORM);
    let time = backend.uniform_location(&program, TIME_UNIFORM);
    if resolution.is_none() || time.is_none() {
        debug!(?resolution, ?time, "program does not read every frame uniform");
    }

    Ok(CompiledProgram {
        handle: program,
        bindings: ProgramBindings {
            position,
            resolution,
            time,
        },
    })
}

pub struct ProgramManager<B: ProgramBackend> {
    backend: B,
    vertex_source: String,
    active: Option<CompiledProgram<B::Program>>,
    requested: SurfaceSize,
    size: SurfaceSize,
}

impl<B: ProgramBackend> ProgramManager<B> {
    pub fn new(backend: B, vertex_source: impl Into<String>, size: SurfaceSize) -> Self {
        Self {
            backend,
            vertex_source: vertex_source.into(),
            active: None,
            requested: size,
            size,
        }
    }

    /// Builds a standalone program. Failures are logged with the backend's
    /// diagnostic and reported as `None`.
    pub fn build(&mut self, vertex: &str, fragment: &str) -> Option<CompiledProgram<B::Program>> {
        match compile_program(&mut self.backend, vertex, fragment) {
            Ok(program) => Some(program),
            Err(err) => {
                error!("shader program build failed: {err}");
                None
            }
        }
    }

    /// Replaces the active program with one built from `fragment`.
    ///
    /// Returns `false`, with nothing changed, when the build fails.
    pub fn hot_swap(&mut self, fragment: &str) -> bool {
        let program = match compile_program(&mut self.backend, &self.vertex_source, fragment) {
            Ok(program) => program,
            Err(err) => {
                error!("shader program build failed; keeping the active program: {err}");
                return false;
            }
        };

        if let Some(previous) = self.active.replace(program) {
            self.backend.release_program(previous.handle);
        }
        self.apply_surface();
        info!(
            width = self.size.width,
            height = self.size.height,
            "activated shader program"
        );
        true
    }

    pub fn resize(&mut self, size: SurfaceSize) {
        if size == self.requested {
            return;
        }
        self.requested = size;
        self.apply_surface();
    }

    /// The resolution uniform always mirrors the size the backend settled on.
    fn apply_surface(&mut self) {
        self.size = self.backend.set_viewport(self.requested);
        if let Some(active) = &self.active {
            if let Some(location) = active.bindings.resolution {
                self.backend
                    .set_uniform_vec2(&active.handle, location, self.size.as_vec2());
            }
        }
    }

    pub fn draw(&mut self, phase: f32) -> Result<(), DrawError> {
        let Some(active) = &self.active else {
            return Err(DrawError::NoProgram);
        };
        if let Some(location) = active.bindings.time {
            self.backend.set_uniform_f32(&active.handle, location, phase);
        }
        self.backend.draw(&active.handle, &active.bindings)
    }

    pub fn active(&self) -> Option<&CompiledProgram<B::Program>> {
        self.active.as_ref()
    }

    /// Effective backing-store size.
    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: ProgramBackend> Drop for ProgramManager<B> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            self.backend.release_program(active.handle);
        }
    }
}

impl<B: ProgramBackend> DrawTarget for ProgramManager<B> {
    type Error = DrawError;

    fn draw_frame(&mut self, phase: f32) -> Result<(), DrawError> {
        match self.draw(phase) {
            Err(DrawError::NoProgram) => {
                warn!("frame skipped: no active program");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Records every call. Sources containing `#error` fail to compile and
    /// fragments containing `#nolink` fail to link.
    #[derive(Default)]
    struct FakeBackend {
        next_id: u32,
        live: HashSet<u32>,
        released: Vec<u32>,
        viewport: Option<SurfaceSize>,
        max_dimension: Option<u32>,
        vec2_writes: Vec<(u32, UniformLocation, [f32; 2])>,
        f32_writes: Vec<(u32, UniformLocation, f32)>,
        draws: Vec<u32>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct FakeProgram {
        id: u32,
        reads_time: bool,
        has_position: bool,
    }

    impl ProgramBackend for FakeBackend {
        type Shader = String;
        type Program = FakeProgram;

        fn compile_shader(&mut self, stage: Stage, source: &str) -> Result<String, BuildError> {
            if source.contains("#error") {
                return Err(BuildError::Compile {
                    stage,
                    log: "ERROR: 0:1: syntax error".into(),
                });
            }
            Ok(source.to_string())
        }

        fn link(&mut self, vertex: &String, fragment: &String) -> Result<FakeProgram, BuildError> {
            if fragment.contains("#nolink") {
                return Err(BuildError::Link("varying mismatch".into()));
            }
            self.next_id += 1;
            self.live.insert(self.next_id);
            Ok(FakeProgram {
                id: self.next_id,
                reads_time: fragment.contains("time"),
                has_position: vertex.contains(POSITION_ATTRIBUTE),
            })
        }

        fn attribute_location(&self, program: &FakeProgram, name: &str) -> Option<AttributeLocation> {
            (name == POSITION_ATTRIBUTE && program.has_position).then_some(AttributeLocation(0))
        }

        fn uniform_location(&self, program: &FakeProgram, name: &str) -> Option<UniformLocation> {
            match name {
                RESOLUTION_UNIFORM => Some(UniformLocation(0)),
                TIME_UNIFORM if program.reads_time => Some(UniformLocation(8)),
                _ => None,
            }
        }

        fn release_program(&mut self, program: FakeProgram) {
            self.live.remove(&program.id);
            self.released.push(program.id);
        }

        fn set_viewport(&mut self, size: SurfaceSize) -> SurfaceSize {
            let size = match self.max_dimension {
                Some(max) => SurfaceSize::new(size.width.min(max), size.height.min(max)),
                None => size,
            };
            self.viewport = Some(size);
            size
        }

        fn set_uniform_vec2(&mut self, program: &FakeProgram, location: UniformLocation, value: [f32; 2]) {
            self.vec2_writes.push((program.id, location, value));
        }

        fn set_uniform_f32(&mut self, program: &FakeProgram, location: UniformLocation, value: f32) {
            self.f32_writes.push((program.id, location, value));
        }

        fn draw(&mut self, program: &FakeProgram, _bindings: &ProgramBindings) -> Result<(), DrawError> {
            self.draws.push(program.id);
            Ok(())
        }
    }

    const VERTEX: &str = "in vec2 position;";

    fn manager() -> ProgramManager<FakeBackend> {
        ProgramManager::new(FakeBackend::default(), VERTEX, SurfaceSize::new(640, 200))
    }

    #[test]
    fn first_swap_activates_and_applies_surface() {
        let mut manager = manager();
        assert!(manager.hot_swap("uniform time;"));
        let active = manager.active().expect("active program");
        assert_eq!(active.handle.id, 1);
        assert_eq!(active.bindings.time, Some(UniformLocation(8)));
        let backend = manager.backend();
        assert_eq!(backend.viewport, Some(SurfaceSize::new(640, 200)));
        assert_eq!(backend.vec2_writes, vec![(1, UniformLocation(0), [640.0, 200.0])]);
    }

    #[test]
    fn failed_swap_keeps_program_and_bindings_identical() {
        let mut manager = manager();
        assert!(manager.hot_swap("uniform time;"));
        let before = manager.active().map(|p| (p.handle.clone(), p.bindings));

        assert!(!manager.hot_swap("#error uniform time;"));
        assert!(!manager.hot_swap("#nolink uniform time;"));
        let after = manager.active().map(|p| (p.handle.clone(), p.bindings));
        assert_eq!(before, after);
        assert!(manager.backend().released.is_empty());

        manager.draw(0.5).unwrap();
        assert_eq!(manager.backend().draws, vec![1]);
    }

    #[test]
    fn successful_swap_releases_previous_handle() {
        let mut manager = manager();
        assert!(manager.hot_swap("uniform time;"));
        assert!(manager.hot_swap("uniform time; // v2"));
        let backend = manager.backend();
        assert_eq!(backend.released, vec![1]);
        assert_eq!(backend.live.len(), 1);
        assert_eq!(backend.vec2_writes.len(), 2);
        assert_eq!(manager.active().unwrap().handle.id, 2);
    }

    #[test]
    fn missing_position_attribute_fails_and_releases_the_candidate() {
        let mut manager = ProgramManager::new(
            FakeBackend::default(),
            "in vec2 corner;",
            SurfaceSize::new(10, 10),
        );
        assert!(!manager.hot_swap("uniform time;"));
        assert!(manager.active().is_none());
        assert_eq!(manager.backend().released, vec![1]);
        assert!(manager.backend().live.is_empty());
    }

    #[test]
    fn build_returns_none_on_failure() {
        let mut manager = manager();
        assert!(manager.build(VERTEX, "#error").is_none());
        let program = manager.build(VERTEX, "uniform time;").expect("program");
        assert_eq!(program.bindings.position, AttributeLocation(0));
        assert!(manager.active().is_none());
    }

    #[test]
    fn resize_reapplies_viewport_and_resolution() {
        let mut manager = manager();
        manager.hot_swap("uniform time;");
        manager.resize(SurfaceSize::new(1280, 400));
        let backend = manager.backend();
        assert_eq!(backend.viewport, Some(SurfaceSize::new(1280, 400)));
        assert_eq!(
            backend.vec2_writes.last(),
            Some(&(1, UniformLocation(0), [1280.0, 400.0]))
        );
    }

    #[test]
    fn resolution_follows_the_size_the_backend_accepts() {
        let mut manager = manager();
        manager.backend_mut().max_dimension = Some(2048);
        manager.hot_swap("uniform time;");
        manager.resize(SurfaceSize::new(4096, 400));
        assert_eq!(manager.size(), SurfaceSize::new(2048, 400));
        let backend = manager.backend();
        assert_eq!(backend.viewport, Some(SurfaceSize::new(2048, 400)));
        assert_eq!(
            backend.vec2_writes.last(),
            Some(&(1, UniformLocation(0), [2048.0, 400.0]))
        );

        let writes = manager.backend().vec2_writes.len();
        manager.resize(SurfaceSize::new(4096, 400));
        assert_eq!(manager.backend().vec2_writes.len(), writes);
    }

    #[test]
    fn draw_submits_phase_only_when_time_is_read() {
        let mut manager = manager();
        assert!(matches!(manager.draw(0.1), Err(DrawError::NoProgram)));
        assert!(manager.draw_frame(0.1).is_ok());

        manager.hot_swap("uniform time;");
        manager.draw_frame(0.25).unwrap();
        assert_eq!(manager.backend().f32_writes, vec![(1, UniformLocation(8), 0.25)]);

        manager.hot_swap("static");
        manager.draw_frame(0.5).unwrap();
        assert_eq!(manager.backend().f32_writes.len(), 1);
        assert_eq!(manager.backend().draws, vec![1, 2]);
    }

    #[test]
    fn zero_sized_surfaces_are_clamped() {
        assert_eq!(SurfaceSize::new(0, 0), SurfaceSize::new(1, 1));
    }
}
