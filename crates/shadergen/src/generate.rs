use ribbonconfig::{ParameterSet, PALETTE_SIZE};
use tracing::debug;

use crate::ir::{
    call, float, ident, int, vec3, Constant, Expr, Function, Module, Stmt, Ty,
};
use crate::GenerateError;

/// Upper bound on the number of rendered bands.
pub const MAX_BANDS: i64 = 12;

const AA_CEILING: f64 = 0.35;
const MIN_THICKNESS: f64 = 1e-4;
const TWIST_SCALE: f64 = 0.35;
const BOUND_MARGIN: f64 = 0.01;

/// Pass-through vertex stage for the full-screen quad.
pub const VERTEX_SHADER: &str = r#"#version 450

layout(location = 0) in vec2 position;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = position * 0.5 + 0.5;
    gl_Position = vec4(position, 0.0, 1.0);
}
"#;

const FRAGMENT_HEADER: &str = r#"#version 450

layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform FrameParams {
    vec2 resolution;
    float time;
} frame;
"#;

const FRAGMENT_GLOBALS: &[&str] = &["v_uv", "out_color", "frame"];

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedShader {
    pub vertex: &'static str,
    pub fragment: String,
    /// Band count after clamping.
    pub bands: i64,
}

/// Values derived from a sanitised parameter set. Every periodic speed is
/// rounded so that `sin(k * TAU * phase + s)` matches at `phase = 0` and
/// `phase -> 1`.
struct Plan<'a> {
    params: &'a ParameterSet,
    main_speed: f64,
    secondary_speed: f64,
    drift_speed: f64,
    stretch_speed: f64,
    twist_speed: f64,
    bands: i64,
    aa_fallback: f64,
    aa_sharpness: f64,
}

impl<'a> Plan<'a> {
    fn new(params: &'a ParameterSet) -> Self {
        let appearance = &params.appearance;
        Self {
            params,
            main_speed: params.wave.main_speed.round(),
            secondary_speed: params.wave.secondary_speed.round(),
            drift_speed: params.wave.drift_speed.round(),
            stretch_speed: params.thickness.stretch_speed.round(),
            twist_speed: params.twist.intensity.round(),
            bands: params.positioning.band_count.clamp(1, MAX_BANDS),
            aa_fallback: appearance.aa_fallback.clamp(MIN_THICKNESS, AA_CEILING),
            aa_sharpness: appearance.aa_sharpness.max(0.01),
        }
    }

    fn phase_term(speed: f64) -> Expr {
        float(speed) * ident("TAU") * ident("phase")
    }

    /// Horizontal coordinate after drift, in terms of `px`.
    fn drift(&self) -> Expr {
        let wave = &self.params.wave;
        ident("px") + float(wave.drift_amount) * call("sin", [Self::phase_term(self.drift_speed)])
    }

    /// Ribbon centre line, in terms of the drifted `x`.
    fn center(&self) -> Expr {
        let wave = &self.params.wave;
        let main = float(wave.main_amplitude)
            * call(
                "sin",
                [float(wave.main_frequency) * ident("x") + Self::phase_term(self.main_speed)],
            );
        let secondary = float(wave.secondary_amplitude)
            * call(
                "sin",
                [float(wave.secondary_frequency) * ident("x")
                    - Self::phase_term(self.secondary_speed)],
            );
        float(self.params.positioning.vertical_offset) + main + float(wave.blend) * secondary
    }

    fn thickness(&self) -> Expr {
        let thickness = &self.params.thickness;
        let stretch = call(
            "sin",
            [float(thickness.stretch_frequency) * ident("x") + Self::phase_term(self.stretch_speed)],
        );
        call(
            "max",
            [
                float(thickness.base) * (float(1.0) + float(thickness.stretch) * stretch),
                float(MIN_THICKNESS),
            ],
        )
    }

    fn twist_angle(&self) -> Option<Expr> {
        let twist = &self.params.twist;
        twist.enabled.then(|| {
            float(twist.intensity * TWIST_SCALE)
                * call("sin", [Self::phase_term(self.twist_speed)])
        })
    }

    /// Half-height of a box that contains the ribbon for every phase.
    fn vertical_bound(&self) -> f64 {
        let wave = &self.params.wave;
        let thickness = &self.params.thickness;
        let amplitudes =
            wave.main_amplitude.abs() + wave.secondary_amplitude.abs() * wave.blend.abs().max(1.0);
        let widest = (thickness.base.abs() * (1.0 + thickness.stretch.abs())).max(MIN_THICKNESS);
        amplitudes + widest + BOUND_MARGIN
    }

    fn band_color_function(&self) -> Function {
        let palette = &self.params.colors.bands;
        let color = |index: i64| vec3(palette[index as usize % PALETTE_SIZE].unit());
        let mut body = Vec::with_capacity(self.bands as usize);
        for index in 0..self.bands - 1 {
            body.push(Stmt::when(
                ident("index").lt(int(index + 1)),
                vec![Stmt::Return(Some(color(index)))],
            ));
        }
        body.push(Stmt::Return(Some(color(self.bands - 1))));
        Function {
            ret: Ty::Vec3,
            name: "band_color",
            params: vec![(Ty::Int, "index")],
            body,
        }
    }

    fn main_function(&self) -> Function {
        let params = self.params;
        let bands = self.bands as f64;
        let last = bands - 1.0;
        let background = vec3(params.colors.background.unit());

        let mut body = vec![
            Stmt::let_(Ty::Float, "phase", ident("frame").field("time")),
            Stmt::let_(
                Ty::Float,
                "aspect",
                ident("frame").field("resolution").field("x")
                    / call("max", [ident("frame").field("resolution").field("y"), float(1.0)]),
            ),
            Stmt::let_(
                Ty::Vec2,
                "p",
                call(
                    "vec2",
                    [
                        (ident("v_uv").field("x") - float(0.5)) * ident("aspect"),
                        ident("v_uv").field("y") - float(0.5),
                    ],
                ),
            ),
            Stmt::let_(Ty::Vec3, "bg", background),
        ];

        match self.twist_angle() {
            Some(angle) => {
                body.push(Stmt::Comment("twist"));
                body.push(Stmt::let_(Ty::Float, "angle", angle));
                body.push(Stmt::let_(Ty::Float, "ca", call("cos", [ident("angle")])));
                body.push(Stmt::let_(Ty::Float, "sa", call("sin", [ident("angle")])));
                let px = ident("p").field("x");
                let py = ident("p").field("y");
                body.push(Stmt::assign(
                    "p",
                    call(
                        "vec2",
                        [
                            ident("ca") * px.clone() - ident("sa") * py.clone(),
                            ident("sa") * px + ident("ca") * py,
                        ],
                    ),
                ));
            }
            None => {
                let outside = if params.performance.debug {
                    call(
                        "vec4",
                        [
                            call("mix", [ident("bg"), vec3([1.0, 0.0, 0.0]), float(0.25)]),
                            float(1.0),
                        ],
                    )
                } else {
                    call("vec4", [ident("bg"), float(1.0)])
                };
                body.push(Stmt::Comment("outside the ribbon's bounding box"));
                body.push(Stmt::when(
                    call(
                        "abs",
                        [ident("p").field("y") - float(params.positioning.vertical_offset)],
                    )
                    .gt(float(self.vertical_bound())),
                    vec![Stmt::assign("out_color", outside), Stmt::Return(None)],
                ));
            }
        }

        body.extend([
            Stmt::let_(Ty::Float, "px", ident("p").field("x")),
            Stmt::let_(Ty::Float, "x", self.drift()),
            Stmt::let_(Ty::Float, "center", self.center()),
            Stmt::let_(Ty::Float, "thickness", self.thickness()),
            Stmt::let_(
                Ty::Float,
                "v",
                call(
                    "clamp",
                    [
                        (ident("p").field("y") - ident("center")) / ident("thickness")
                            + float(0.5),
                        float(-4.0),
                        float(5.0),
                    ],
                ),
            ),
            Stmt::let_(
                Ty::Float,
                "band",
                call(
                    "clamp",
                    [ident("v") * float(bands), float(-1.0), float(bands + 1.0)],
                ),
            ),
            Stmt::let_(
                Ty::Float,
                "aa",
                call(
                    "clamp",
                    [
                        call("fwidth", [ident("band")]) / float(self.aa_sharpness),
                        float(self.aa_fallback),
                        float(AA_CEILING),
                    ],
                ),
            ),
            Stmt::let_(Ty::Float, "cell", call("floor", [ident("band")])),
            Stmt::let_(Ty::Float, "f", ident("band") - ident("cell")),
        ]);

        let index = |offset: f64| {
            call(
                "int",
                [call(
                    "clamp",
                    [ident("cell") + float(offset), float(0.0), float(last)],
                )],
            )
        };
        body.extend([
            Stmt::let_(Ty::Int, "index", index(0.0)),
            Stmt::let_(Ty::Int, "prev_index", index(-1.0)),
            Stmt::let_(Ty::Int, "next_index", index(1.0)),
            Stmt::let_(Ty::Vec3, "col", call("band_color", [ident("index")])),
            Stmt::assign(
                "col",
                call(
                    "mix",
                    [
                        call("band_color", [ident("prev_index")]),
                        ident("col"),
                        call("smoothstep", [-ident("aa"), ident("aa"), ident("f")]),
                    ],
                ),
            ),
            Stmt::assign(
                "col",
                call(
                    "mix",
                    [
                        ident("col"),
                        call("band_color", [ident("next_index")]),
                        call(
                            "smoothstep",
                            [-ident("aa"), ident("aa"), ident("f") - float(1.0)],
                        ),
                    ],
                ),
            ),
            Stmt::let_(
                Ty::Float,
                "edge",
                call("min", [ident("v"), float(1.0) - ident("v")]),
            ),
            Stmt::let_(
                Ty::Float,
                "coverage",
                call(
                    "smoothstep",
                    [
                        -ident("aa") / float(bands),
                        ident("aa") / float(bands),
                        ident("edge"),
                    ],
                ),
            ),
        ]);

        if params.appearance.plastic {
            body.push(Stmt::Comment("plastic shading"));
            body.extend(self.plastic_block());
        }

        body.extend([
            Stmt::assign(
                "col",
                ident("col") * float(params.appearance.brightness),
            ),
            Stmt::assign(
                "out_color",
                call(
                    "vec4",
                    [
                        call("mix", [ident("bg"), ident("col"), ident("coverage")]),
                        float(1.0),
                    ],
                ),
            ),
        ]);

        Function {
            ret: Ty::Void,
            name: "main",
            params: Vec::new(),
            body,
        }
    }

    fn plastic_block(&self) -> Vec<Stmt> {
        let appearance = &self.params.appearance;
        vec![
            Stmt::let_(
                Ty::Float,
                "across",
                call(
                    "clamp",
                    [ident("v") * float(2.0) - float(1.0), float(-1.0), float(1.0)],
                ),
            ),
            Stmt::let_(
                Ty::Vec3,
                "normal",
                call(
                    "normalize",
                    [call(
                        "vec3",
                        [
                            float(0.0),
                            ident("across"),
                            call(
                                "sqrt",
                                [call(
                                    "max",
                                    [
                                        float(1.0) - ident("across") * ident("across"),
                                        float(0.0),
                                    ],
                                )],
                            ),
                        ],
                    )],
                ),
            ),
            Stmt::let_(
                Ty::Vec3,
                "light",
                call("normalize", [vec3([-0.35, 0.55, 0.75])]),
            ),
            Stmt::let_(
                Ty::Float,
                "diffuse",
                call(
                    "max",
                    [call("dot", [ident("normal"), ident("light")]), float(0.0)],
                ),
            ),
            Stmt::assign(
                "col",
                ident("col")
                    * call(
                        "mix",
                        [ident("diffuse"), float(1.0), float(appearance.softness)],
                    ),
            ),
            Stmt::let_(
                Ty::Vec3,
                "halfway",
                call("normalize", [ident("light") + vec3([0.0, 0.0, 1.0])]),
            ),
            Stmt::let_(
                Ty::Float,
                "spec",
                call(
                    "pow",
                    [
                        call(
                            "max",
                            [call("dot", [ident("normal"), ident("halfway")]), float(0.0)],
                        ),
                        float(appearance.specular_power.max(1.0)),
                    ],
                ) * float(appearance.specular_intensity),
            ),
            Stmt::assign("col", ident("col") + call("vec3", [ident("spec")])),
            Stmt::let_(
                Ty::Float,
                "shadow",
                float(1.0)
                    - float(appearance.edge_shadow_strength)
                        * (float(1.0)
                            - call(
                                "smoothstep",
                                [
                                    float(0.0),
                                    float(appearance.edge_shadow_width.max(MIN_THICKNESS)),
                                    ident("edge"),
                                ],
                            )),
            ),
            Stmt::assign("col", ident("col") * ident("shadow")),
        ]
    }

    fn module(&self) -> Module {
        Module {
            header: FRAGMENT_HEADER,
            header_globals: FRAGMENT_GLOBALS,
            constants: vec![Constant {
                ty: Ty::Float,
                name: "TAU",
                value: float(std::f64::consts::TAU),
            }],
            functions: vec![self.band_color_function(), self.main_function()],
        }
    }
}

/// Builds the fragment program for `params`.
///
/// Non-finite numbers are replaced by their defaults first, so the result is
/// identical for identical (sanitised) input.
pub fn generate(params: &ParameterSet) -> Result<GeneratedShader, GenerateError> {
    let clean = params.sanitized();
    let plan = Plan::new(&clean);
    let module = plan.module();
    module.validate()?;
    let fragment = module.to_glsl();
    debug!(
        bands = plan.bands,
        twist = clean.twist.enabled,
        plastic = clean.appearance.plastic,
        bytes = fragment.len(),
        "generated fragment shader"
    );
    Ok(GeneratedShader {
        vertex: VERTEX_SHADER,
        fragment,
        bands: plan.bands,
    })
}

/// Drifted horizontal coordinate as emitted into the shader. Free variables:
/// `px`, `phase`, `TAU`.
pub fn drift_expr(params: &ParameterSet) -> Expr {
    Plan::new(&params.sanitized()).drift()
}

/// Ribbon centre line. Free variables: `x` (drifted), `phase`, `TAU`.
pub fn center_expr(params: &ParameterSet) -> Expr {
    Plan::new(&params.sanitized()).center()
}

/// Stretched ribbon thickness. Free variables: `x`, `phase`, `TAU`.
pub fn thickness_expr(params: &ParameterSet) -> Expr {
    Plan::new(&params.sanitized()).thickness()
}

/// Rotation angle, or `None` while twist is disabled.
pub fn twist_angle_expr(params: &ParameterSet) -> Option<Expr> {
    Plan::new(&params.sanitized()).twist_angle()
}
