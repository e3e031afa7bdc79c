//! The single owner of the live configuration.
//!
//! [`Engine`] wires Control Sync, the generator, the program manager, the
//! scheduler and both persistence stores together. Every mutation of the
//! live [`ParameterSet`] goes through it; the event loop only forwards
//! window events, console commands and the clock.

use std::fmt::Write as _;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use renderer::{backing_store_size, DrawError, ProgramBackend, ProgramManager, SurfaceSize};
use ribbonconfig::{
    ColorPalette, FieldId, FieldKind, FieldValue, ParameterSet, TunerSettings,
};
use ribbonstore::{ConfigRemote, ProfileStorage, ProfileStore};
use scheduler::{AnimationScheduler, MotionSettings};
use shadergen::format::round_literal;
use shadergen::VERTEX_SHADER;
use tracing::{error, info, warn};

use crate::console::{parse_flag, ConsoleCommand, HELP};
use crate::sync::{Control, ControlSync, Interaction, Widget};

/// Logical size of the preview surface plus its device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalSurface {
    pub width: f64,
    pub height: f64,
    pub scale_factor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Quit,
}

/// Starting configuration: schema defaults, the site palette from the
/// settings file, then whatever the remote store has published.
pub fn seed_params(
    remote: Option<&dyn ConfigRemote>,
    colors: Option<&ColorPalette>,
) -> ParameterSet {
    let mut params = ParameterSet::default();
    if let Some(colors) = colors {
        params.colors = colors.clone();
    }
    let Some(remote) = remote else {
        return params;
    };
    match remote.get() {
        Ok(Some(published)) => {
            params.apply_published(published);
            info!("seeded configuration from the remote store");
        }
        Ok(None) => info!("remote store has nothing published; using defaults"),
        Err(err) => warn!("failed to fetch the published configuration; using defaults: {err}"),
    }
    params
}

pub fn format_value(value: FieldValue) -> String {
    match value {
        FieldValue::Bool(true) => "on".into(),
        FieldValue::Bool(false) => "off".into(),
        FieldValue::Number(number) => format!("{}", round_literal(number)),
        FieldValue::Integer(number) => number.to_string(),
    }
}

/// Widget state for `show <field>`; toggles add nothing beyond the value.
fn describe_widget(control: &Control) -> Option<String> {
    let descriptor = control.descriptor();
    match control.widget() {
        Widget::Toggle(_) => None,
        Widget::Continuous { slider, field } => Some(format!(
            "slider {}, field \"{field}\", range {}..{}",
            round_literal(*slider),
            round_literal(descriptor.min),
            round_literal(descriptor.max)
        )),
        Widget::Integer(text) => Some(format!(
            "field \"{text}\", range {}..{}",
            descriptor.min, descriptor.max
        )),
    }
}

fn lookup(field: &str) -> Result<FieldId> {
    FieldId::from_path(field).ok_or_else(|| anyhow!("unknown field '{field}'; try 'show'"))
}

pub struct Engine<B: ProgramBackend, S: ProfileStorage> {
    params: ParameterSet,
    sync: ControlSync,
    programs: ProgramManager<B>,
    scheduler: AnimationScheduler,
    profiles: ProfileStore<S>,
    remote: Option<Box<dyn ConfigRemote>>,
    surface: LogicalSurface,
    visible: bool,
}

impl<B: ProgramBackend, S: ProfileStorage> Engine<B, S> {
    /// Seeds the live configuration and activates the first program.
    pub fn new(
        backend: B,
        profiles: ProfileStore<S>,
        remote: Option<Box<dyn ConfigRemote>>,
        settings: &TunerSettings,
        surface: LogicalSurface,
    ) -> Self {
        let params = seed_params(remote.as_deref(), settings.colors.as_ref());
        let size = Self::backing_size_for(&params, surface);
        let mut engine = Self {
            sync: ControlSync::new(&params, settings.debounce),
            programs: ProgramManager::new(backend, VERTEX_SHADER, size),
            scheduler: AnimationScheduler::new(MotionSettings::from_params(&params)),
            profiles,
            remote,
            surface,
            params,
            visible: true,
        };
        if !engine.rebuild() {
            warn!("initial shader build failed; the preview stays blank until an edit succeeds");
        }
        engine
    }

    fn backing_size_for(params: &ParameterSet, surface: LogicalSurface) -> SurfaceSize {
        backing_store_size(
            surface.width,
            surface.height,
            surface.scale_factor,
            &params.performance,
        )
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Regenerates the shader from the live configuration and hot-swaps it.
    pub fn rebuild(&mut self) -> bool {
        self.scheduler.set_motion(MotionSettings::from_params(&self.params));
        self.programs.resize(Self::backing_size_for(&self.params, self.surface));
        match shadergen::generate(&self.params) {
            Ok(shader) => self.programs.hot_swap(&shader.fragment),
            Err(err) => {
                error!("shader generation failed; keeping the active program: {err}");
                false
            }
        }
    }

    pub fn start(&mut self) {
        self.scheduler.start();
    }

    pub fn set_surface(&mut self, surface: LogicalSurface) {
        self.surface = surface;
        self.programs.resize(Self::backing_size_for(&self.params, surface));
    }

    pub fn pointer_enter(&mut self) {
        self.scheduler.pointer_enter();
    }

    pub fn pointer_leave(&mut self) {
        self.scheduler.pointer_leave();
    }

    /// Halts per-frame work while hidden when `pauseWhenHidden` is set.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.apply_visibility();
    }

    fn apply_visibility(&mut self) {
        if self.visible || !self.params.performance.pause_when_hidden {
            self.scheduler.start();
        } else {
            self.scheduler.stop();
        }
    }

    pub fn frame(&mut self, now: Instant) -> Result<bool, DrawError> {
        self.scheduler.frame(now, &mut self.programs)
    }

    /// Rebuilds once the debounce window after the last edit has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.sync.poll(now) {
            self.rebuild();
            true
        } else {
            false
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.sync.deadline()
    }

    pub fn load_profile(&mut self, name: &str) -> Result<String> {
        let report = self.profiles.load(name, &mut self.params)?;
        self.sync.refresh_from(&self.params);
        self.apply_visibility();
        self.rebuild();
        Ok(format!(
            "loaded profile '{}' ({} fields applied, {} skipped)",
            name.trim(),
            report.applied,
            report.skipped
        ))
    }

    fn edit(&mut self, id: FieldId, interaction: Interaction, now: Instant) -> Result<Reply> {
        self.sync.interact(id, interaction, &mut self.params, now)?;
        self.scheduler.set_motion(MotionSettings::from_params(&self.params));
        self.apply_visibility();
        Ok(Reply::Text(format!(
            "{} = {}",
            id.path(),
            format_value(self.params.get(id))
        )))
    }

    fn show(&self, field: Option<&str>) -> Result<String> {
        if let Some(field) = field {
            let id = lookup(field)?;
            let mut out = format!("{} = {}", id.path(), format_value(self.params.get(id)));
            if let Some(widget) = self.sync.control(id).and_then(describe_widget) {
                let _ = write!(out, "  ({widget})");
            }
            return Ok(out);
        }
        let mut out = String::new();
        for control in self.sync.controls() {
            let descriptor = control.descriptor();
            let _ = writeln!(
                out,
                "{:<34} {}",
                descriptor.path,
                format_value(self.params.get(descriptor.id))
            );
        }
        Ok(out.trim_end().to_string())
    }

    fn publish(&self) -> Result<String> {
        let Some(remote) = self.remote.as_deref() else {
            bail!("publishing is disabled: no remote store configured");
        };
        match remote.set(&self.params.published()) {
            Ok(()) => {
                info!("published configuration to the remote store");
                Ok("published".into())
            }
            Err(err) => {
                warn!("publish failed: {err}");
                Ok(format!("publish failed: {err}"))
            }
        }
    }

    fn list_profiles(&self) -> String {
        if self.profiles.profiles().is_empty() {
            return "no profiles stored".into();
        }
        let mut out = String::new();
        for profile in self.profiles.profiles() {
            let saved = profile
                .saved_at_local()
                .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown time".into());
            let _ = writeln!(out, "{:<24} saved {saved}", profile.name);
        }
        out.trim_end().to_string()
    }

    /// Runs one console command. Failures come back as text for the console.
    pub fn execute(&mut self, command: ConsoleCommand, now: Instant) -> Reply {
        match self.dispatch(command, now) {
            Ok(reply) => reply,
            Err(err) => Reply::Text(format!("error: {err:#}")),
        }
    }

    fn dispatch(&mut self, command: ConsoleCommand, now: Instant) -> Result<Reply> {
        let text = match command {
            ConsoleCommand::Set { field, value } => {
                let id = lookup(&field)?;
                let interaction = match id.descriptor().kind {
                    FieldKind::Boolean => Interaction::Toggle(
                        parse_flag(&value).ok_or_else(|| anyhow!("'{value}' is not on/off"))?,
                    ),
                    FieldKind::Continuous | FieldKind::Integer => Interaction::Type(value),
                };
                return self.edit(id, interaction, now);
            }
            ConsoleCommand::Slide { field, value } => {
                return self.edit(lookup(&field)?, Interaction::Slide(value), now);
            }
            ConsoleCommand::Toggle { field, value } => {
                let id = lookup(&field)?;
                let Some(current) = self.params.get(id).as_bool() else {
                    bail!("{} is not a toggle", id.path());
                };
                return self.edit(id, Interaction::Toggle(value.unwrap_or(!current)), now);
            }
            ConsoleCommand::Show(field) => self.show(field.as_deref())?,
            ConsoleCommand::Publish => self.publish()?,
            ConsoleCommand::Save(name) => {
                let profile = self.profiles.save(&name, &self.params)?;
                format!("saved profile '{}'", profile.name)
            }
            ConsoleCommand::Load(name) => self.load_profile(&name)?,
            ConsoleCommand::Rename { from, to } => {
                self.profiles.rename(&from, &to)?;
                format!("renamed profile '{from}' to '{to}'")
            }
            ConsoleCommand::Delete(name) => {
                let removed = self.profiles.delete(&name)?;
                format!("deleted profile '{}'", removed.name)
            }
            ConsoleCommand::Profiles => self.list_profiles(),
            ConsoleCommand::Source => shadergen::generate(&self.params)?.fragment,
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => return Ok(Reply::Quit),
        };
        Ok(Reply::Text(text))
    }
}

#[cfg(test)]
impl<B: ProgramBackend, S: ProfileStorage> Engine<B, S> {
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn sync(&self) -> &ControlSync {
        &self.sync
    }

    pub fn programs(&self) -> &ProgramManager<B> {
        &self.programs
    }

    pub fn scheduler(&self) -> &AnimationScheduler {
        &self.scheduler
    }

    pub fn profiles(&self) -> &ProfileStore<S> {
        &self.profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::{AttributeLocation, BuildError, ProgramBindings, Stage, UniformLocation};
    use ribbonconfig::{PublishedConfig, FIELDS};
    use ribbonstore::{MemoryStorage, RemoteError};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeBackend {
        next_id: u32,
        links: u32,
        released: Vec<u32>,
        fail: bool,
        viewport: Option<SurfaceSize>,
        resolution: Option<[f32; 2]>,
        draws: Vec<(u32, f32)>,
        last_time: f32,
    }

    impl ProgramBackend for FakeBackend {
        type Shader = String;
        type Program = u32;

        fn compile_shader(&mut self, stage: Stage, source: &str) -> Result<String, BuildError> {
            if self.fail && stage == Stage::Fragment {
                return Err(BuildError::Compile {
                    stage,
                    log: "forced failure".into(),
                });
            }
            Ok(source.to_string())
        }

        fn link(&mut self, _vertex: &String, _fragment: &String) -> Result<u32, BuildError> {
            self.next_id += 1;
            self.links += 1;
            Ok(self.next_id)
        }

        fn attribute_location(&self, _program: &u32, name: &str) -> Option<AttributeLocation> {
            (name == "position").then_some(AttributeLocation(0))
        }

        fn uniform_location(&self, _program: &u32, name: &str) -> Option<UniformLocation> {
            match name {
                "resolution" => Some(UniformLocation(0)),
                "time" => Some(UniformLocation(8)),
                _ => None,
            }
        }

        fn release_program(&mut self, program: u32) {
            self.released.push(program);
        }

        fn set_viewport(&mut self, size: SurfaceSize) -> SurfaceSize {
            self.viewport = Some(size);
            size
        }

        fn set_uniform_vec2(&mut self, _program: &u32, _location: UniformLocation, value: [f32; 2]) {
            self.resolution = Some(value);
        }

        fn set_uniform_f32(&mut self, _program: &u32, _location: UniformLocation, value: f32) {
            self.last_time = value;
        }

        fn draw(&mut self, program: &u32, _bindings: &ProgramBindings) -> Result<(), DrawError> {
            self.draws.push((*program, self.last_time));
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeRemote {
        published: Option<PublishedConfig>,
        fail_get: bool,
        fail_set: bool,
        sent: Rc<RefCell<Vec<PublishedConfig>>>,
    }

    impl ConfigRemote for FakeRemote {
        fn get(&self) -> Result<Option<PublishedConfig>, RemoteError> {
            if self.fail_get {
                return Err(RemoteError::Rejected("offline".into()));
            }
            Ok(self.published.clone())
        }

        fn set(&self, config: &PublishedConfig) -> Result<(), RemoteError> {
            if self.fail_set {
                return Err(RemoteError::Rejected("bad credential".into()));
            }
            self.sent.borrow_mut().push(config.clone());
            Ok(())
        }
    }

    const SURFACE: LogicalSurface = LogicalSurface {
        width: 800.0,
        height: 200.0,
        scale_factor: 2.0,
    };

    fn engine_with(remote: Option<FakeRemote>) -> Engine<FakeBackend, MemoryStorage> {
        Engine::new(
            FakeBackend::default(),
            ProfileStore::open(MemoryStorage::new()),
            remote.map(|remote| Box::new(remote) as Box<dyn ConfigRemote>),
            &TunerSettings::default(),
            SURFACE,
        )
    }

    fn text(reply: Reply) -> String {
        match reply {
            Reply::Text(text) => text,
            Reply::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn starts_with_an_active_program_at_backing_store_size() {
        let engine = engine_with(None);
        assert_eq!(engine.params(), &ParameterSet::default());
        assert!(engine.programs().active().is_some());
        let backend = engine.programs().backend();
        assert_eq!(backend.links, 1);
        assert_eq!(backend.viewport, Some(SurfaceSize::new(1600, 400)));
        assert_eq!(backend.resolution, Some([1600.0, 400.0]));
    }

    #[test]
    fn seeds_from_the_remote_store_but_keeps_local_colours() {
        let mut source = ParameterSet::default();
        source.wave.main_speed = 3.0;
        source.twist.enabled = true;
        let remote = FakeRemote {
            published: Some(source.published()),
            ..FakeRemote::default()
        };
        let engine = engine_with(Some(remote));
        assert_eq!(engine.params().wave.main_speed, 3.0);
        assert!(engine.params().twist.enabled);
        assert_eq!(engine.params().colors, ParameterSet::default().colors);
        assert_eq!(
            engine.sync().control(FieldId::TwistEnabled).unwrap().read(),
            FieldValue::Bool(true)
        );
    }

    #[test]
    fn remote_failure_falls_back_to_defaults() {
        let remote = FakeRemote {
            fail_get: true,
            ..FakeRemote::default()
        };
        let engine = engine_with(Some(remote));
        assert_eq!(engine.params(), &ParameterSet::default());
        assert!(engine.programs().active().is_some());
    }

    #[test]
    fn edits_rebuild_once_after_the_debounce() {
        let mut engine = engine_with(None);
        let start = Instant::now();
        for (step, value) in ["2", "3", "4"].into_iter().enumerate() {
            let now = start + Duration::from_millis(step as u64 * 30);
            let reply = engine.execute(
                ConsoleCommand::Set {
                    field: "wave.mainSpeed".into(),
                    value: value.into(),
                },
                now,
            );
            assert_eq!(text(reply), format!("wave.mainSpeed = {value}"));
            assert!(!engine.poll(now));
        }
        assert_eq!(engine.programs().backend().links, 1);
        let deadline = engine.next_deadline().expect("rebuild pending");
        assert!(engine.poll(deadline));
        assert_eq!(engine.programs().backend().links, 2);
        assert_eq!(engine.programs().backend().released, vec![1]);
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn failed_rebuild_keeps_the_active_program() {
        let mut engine = engine_with(None);
        let before = engine.programs().active().map(|program| program.handle);
        engine.programs.backend_mut().fail = true;
        let now = Instant::now();
        engine.execute(
            ConsoleCommand::Toggle {
                field: "appearance.plastic".into(),
                value: None,
            },
            now,
        );
        let deadline = engine.next_deadline().expect("rebuild pending");
        assert!(engine.poll(deadline));
        assert_eq!(engine.programs().active().map(|program| program.handle), before);
        assert!(engine.params().appearance.plastic);
    }

    #[test]
    fn oversized_values_never_reach_the_backend() {
        let mut engine = engine_with(None);
        let before = engine.programs().active().map(|program| program.handle);
        let now = Instant::now();
        engine.execute(
            ConsoleCommand::Set {
                field: "wave.mainAmplitude".into(),
                value: "1e39".into(),
            },
            now,
        );
        let deadline = engine.next_deadline().expect("rebuild pending");
        assert!(engine.poll(deadline));
        assert_eq!(engine.programs().backend().links, 1);
        assert_eq!(engine.programs().active().map(|program| program.handle), before);
    }

    #[test]
    fn motion_edits_apply_without_waiting_for_a_rebuild() {
        let mut engine = engine_with(None);
        engine.execute(
            ConsoleCommand::Slide {
                field: "interaction.hoverSlowdown".into(),
                value: 0.5,
            },
            Instant::now(),
        );
        assert_eq!(engine.scheduler().motion().hover_slowdown, 0.5);
    }

    #[test]
    fn unknown_fields_and_bad_values_report_errors() {
        let mut engine = engine_with(None);
        let now = Instant::now();
        let reply = text(engine.execute(
            ConsoleCommand::Set {
                field: "wave.loudness".into(),
                value: "1".into(),
            },
            now,
        ));
        assert!(reply.starts_with("error: unknown field"));
        let reply = text(engine.execute(
            ConsoleCommand::Toggle {
                field: "wave.blend".into(),
                value: None,
            },
            now,
        ));
        assert!(reply.contains("not a toggle"));
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn publish_reports_inline_and_sends_the_subset() {
        let mut engine = engine_with(None);
        let now = Instant::now();
        assert!(text(engine.execute(ConsoleCommand::Publish, now)).contains("disabled"));

        let remote = FakeRemote::default();
        let sent = remote.sent.clone();
        let mut engine = engine_with(Some(remote));
        engine.execute(
            ConsoleCommand::Set {
                field: "wave.blend".into(),
                value: "0.3".into(),
            },
            now,
        );
        assert_eq!(text(engine.execute(ConsoleCommand::Publish, now)), "published");
        assert_eq!(sent.borrow().len(), 1);
        assert_eq!(sent.borrow()[0].wave.blend, 0.3);

        let failing = FakeRemote {
            fail_set: true,
            ..FakeRemote::default()
        };
        let mut engine = engine_with(Some(failing));
        let links = engine.programs().backend().links;
        let reply = text(engine.execute(ConsoleCommand::Publish, now));
        assert!(reply.starts_with("publish failed"));
        assert_eq!(engine.programs().backend().links, links);
    }

    #[test]
    fn profiles_round_trip_through_the_console() {
        let mut engine = engine_with(None);
        let now = Instant::now();
        engine.execute(
            ConsoleCommand::Set {
                field: "positioning.bandCount".into(),
                value: "8".into(),
            },
            now,
        );
        let saved = engine.params().clone();
        assert_eq!(
            text(engine.execute(ConsoleCommand::Save("wide".into()), now)),
            "saved profile 'wide'"
        );
        engine.execute(
            ConsoleCommand::Set {
                field: "positioning.bandCount".into(),
                value: "3".into(),
            },
            now,
        );
        let links = engine.programs().backend().links;
        let reply = text(engine.execute(ConsoleCommand::Load("wide".into()), now));
        assert!(reply.starts_with("loaded profile 'wide'"));
        assert_eq!(engine.params(), &saved);
        assert_eq!(engine.programs().backend().links, links + 1);
        assert_eq!(
            engine.sync().control(FieldId::PositioningBandCount).unwrap().read(),
            FieldValue::Integer(8)
        );

        engine.execute(
            ConsoleCommand::Rename {
                from: "wide".into(),
                to: "broad".into(),
            },
            now,
        );
        assert!(text(engine.execute(ConsoleCommand::Profiles, now)).starts_with("broad"));
        assert_eq!(
            text(engine.execute(ConsoleCommand::Delete("broad".into()), now)),
            "deleted profile 'broad'"
        );
        assert_eq!(
            text(engine.execute(ConsoleCommand::Profiles, now)),
            "no profiles stored"
        );
        assert!(text(engine.execute(ConsoleCommand::Load("broad".into()), now))
            .starts_with("error:"));
    }

    #[test]
    fn hover_slows_and_recovers_within_two_seconds() {
        let mut engine = engine_with(None);
        engine.start();
        let step = Duration::from_millis(16);
        let mut now = Instant::now();
        engine.frame(now).unwrap();

        engine.pointer_enter();
        for _ in 0..125 {
            now += step;
            engine.frame(now).unwrap();
        }
        let speed = engine.scheduler().state().current_speed;
        assert!((speed - 0.1).abs() <= 0.1 * 0.02, "speed {speed}");

        engine.pointer_leave();
        for _ in 0..125 {
            now += step;
            engine.frame(now).unwrap();
        }
        let speed = engine.scheduler().state().current_speed;
        assert!((speed - 1.0).abs() <= 0.02, "speed {speed}");
        let draws = &engine.programs().backend().draws;
        assert_eq!(draws.len(), 251);
        assert!(draws.iter().all(|(_, phase)| (0.0..1.0).contains(phase)));
    }

    #[test]
    fn hidden_preview_stops_drawing() {
        let mut engine = engine_with(None);
        engine.start();
        let now = Instant::now();
        engine.set_visible(false);
        assert!(!engine.frame(now).unwrap());
        engine.set_visible(true);
        assert!(engine.frame(now).unwrap());

        engine.execute(
            ConsoleCommand::Toggle {
                field: "performance.pauseWhenHidden".into(),
                value: Some(false),
            },
            now,
        );
        engine.set_visible(false);
        assert!(engine.is_running());
    }

    #[test]
    fn source_and_show_render_text() {
        let mut engine = engine_with(None);
        let now = Instant::now();
        let source = text(engine.execute(ConsoleCommand::Source, now));
        assert!(source.starts_with("#version 450"));
        let all = text(engine.execute(ConsoleCommand::Show(None), now));
        assert_eq!(all.lines().count(), FIELDS.len());
        assert_eq!(
            text(engine.execute(ConsoleCommand::Show(Some("twist.enabled".into())), now)),
            "twist.enabled = off"
        );
        engine.execute(
            ConsoleCommand::Set {
                field: "wave.blend".into(),
                value: "0.4275".into(),
            },
            now,
        );
        assert_eq!(
            text(engine.execute(ConsoleCommand::Show(Some("wave.blend".into())), now)),
            "wave.blend = 0.4275  (slider 0.43, field \"0.4275\", range 0..1)"
        );
        assert_eq!(engine.execute(ConsoleCommand::Quit, now), Reply::Quit);
    }
}
