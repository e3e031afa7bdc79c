//! Statically typed descriptor table for every tunable field.
//!
//! The table is generated by [`schema!`] so that the enum, the descriptor
//! list and the accessors on [`ParameterSet`] can never drift apart.

use crate::params::ParameterSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    Continuous,
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Integer(i64),
}

impl FieldValue {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(value),
            FieldValue::Integer(value) => Some(value as f64),
            FieldValue::Bool(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(value),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Conversion used by the generated setters. Returns `false` when the value
/// has the wrong shape for the slot, leaving it untouched.
trait AssignField {
    fn assign(&mut self, value: FieldValue) -> bool;
}

impl AssignField for f64 {
    fn assign(&mut self, value: FieldValue) -> bool {
        match value.as_f64() {
            Some(number) => {
                *self = number;
                true
            }
            None => false,
        }
    }
}

impl AssignField for i64 {
    fn assign(&mut self, value: FieldValue) -> bool {
        match value {
            FieldValue::Integer(number) => *self = number,
            FieldValue::Number(number) if number.is_finite() => *self = number.round() as i64,
            _ => return false,
        }
        true
    }
}

impl AssignField for bool {
    fn assign(&mut self, value: FieldValue) -> bool {
        match value {
            FieldValue::Bool(flag) => {
                *self = flag;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub id: FieldId,
    /// Dotted label such as `wave.mainSpeed`.
    pub path: &'static str,
    pub kind: FieldKind,
    /// Slider range; numeric fields may be typed outside of it.
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl FieldDescriptor {
    pub fn default_value(&self) -> FieldValue {
        ParameterSet::default().get(self.id)
    }
}

macro_rules! schema {
    ($( $id:ident => $path:literal, $kind:ident, [$min:expr, $max:expr, $step:expr], $($field:ident).+ ; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum FieldId {
            $($id,)*
        }

        pub const FIELDS: &[FieldDescriptor] = &[
            $(FieldDescriptor {
                id: FieldId::$id,
                path: $path,
                kind: FieldKind::$kind,
                min: $min,
                max: $max,
                step: $step,
            },)*
        ];

        impl ParameterSet {
            pub fn get(&self, id: FieldId) -> FieldValue {
                match id {
                    $(FieldId::$id => FieldValue::from(self.$($field).+),)*
                }
            }

            /// Writes `value` into the field; returns `false` on a shape mismatch.
            pub fn set(&mut self, id: FieldId, value: FieldValue) -> bool {
                match id {
                    $(FieldId::$id => self.$($field).+.assign(value),)*
                }
            }
        }
    };
}

schema! {
    ThicknessBase => "thickness.base", Continuous, [0.02, 1.0, 0.01], thickness.base;
    ThicknessStretch => "thickness.stretch", Continuous, [0.0, 0.9, 0.01], thickness.stretch;
    ThicknessStretchFrequency => "thickness.stretchFrequency", Continuous, [0.0, 8.0, 0.05], thickness.stretch_frequency;
    ThicknessStretchSpeed => "thickness.stretchSpeed", Continuous, [-4.0, 4.0, 1.0], thickness.stretch_speed;
    WaveMainAmplitude => "wave.mainAmplitude", Continuous, [0.0, 0.5, 0.005], wave.main_amplitude;
    WaveMainFrequency => "wave.mainFrequency", Continuous, [0.0, 10.0, 0.05], wave.main_frequency;
    WaveMainSpeed => "wave.mainSpeed", Continuous, [-4.0, 4.0, 1.0], wave.main_speed;
    WaveSecondaryAmplitude => "wave.secondaryAmplitude", Continuous, [0.0, 0.3, 0.005], wave.secondary_amplitude;
    WaveSecondaryFrequency => "wave.secondaryFrequency", Continuous, [0.0, 16.0, 0.05], wave.secondary_frequency;
    WaveSecondarySpeed => "wave.secondarySpeed", Continuous, [-6.0, 6.0, 1.0], wave.secondary_speed;
    WaveDriftAmount => "wave.driftAmount", Continuous, [0.0, 1.0, 0.01], wave.drift_amount;
    WaveDriftSpeed => "wave.driftSpeed", Continuous, [-3.0, 3.0, 1.0], wave.drift_speed;
    WaveBlend => "wave.blend", Continuous, [0.0, 1.0, 0.01], wave.blend;
    TwistEnabled => "twist.enabled", Boolean, [0.0, 1.0, 1.0], twist.enabled;
    TwistIntensity => "twist.intensity", Continuous, [0.0, 3.0, 0.05], twist.intensity;
    AppearanceBrightness => "appearance.brightness", Continuous, [0.0, 2.0, 0.01], appearance.brightness;
    AppearancePlastic => "appearance.plastic", Boolean, [0.0, 1.0, 1.0], appearance.plastic;
    AppearanceSoftness => "appearance.softness", Continuous, [0.0, 1.0, 0.01], appearance.softness;
    AppearanceSpecularPower => "appearance.specularPower", Continuous, [1.0, 128.0, 1.0], appearance.specular_power;
    AppearanceSpecularIntensity => "appearance.specularIntensity", Continuous, [0.0, 2.0, 0.01], appearance.specular_intensity;
    AppearanceEdgeShadowStrength => "appearance.edgeShadowStrength", Continuous, [0.0, 1.0, 0.01], appearance.edge_shadow_strength;
    AppearanceEdgeShadowWidth => "appearance.edgeShadowWidth", Continuous, [0.01, 0.5, 0.01], appearance.edge_shadow_width;
    AppearanceAaSharpness => "appearance.aaSharpness", Continuous, [0.1, 4.0, 0.05], appearance.aa_sharpness;
    AppearanceAaFallback => "appearance.aaFallback", Continuous, [0.0001, 0.05, 0.0001], appearance.aa_fallback;
    PositioningVerticalOffset => "positioning.verticalOffset", Continuous, [-0.5, 0.5, 0.005], positioning.vertical_offset;
    PositioningBandCount => "positioning.bandCount", Integer, [1.0, 12.0, 1.0], positioning.band_count;
    InteractionHoverSlowdown => "interaction.hoverSlowdown", Continuous, [0.0, 1.0, 0.01], interaction.hover_slowdown;
    InteractionSmoothTime => "interaction.smoothTime", Continuous, [0.0, 2.0, 0.01], interaction.smooth_time;
    PerformanceSupersampleMobile => "performance.supersampleMobile", Continuous, [0.25, 2.0, 0.05], performance.supersample_mobile;
    PerformanceSupersampleTablet => "performance.supersampleTablet", Continuous, [0.25, 2.0, 0.05], performance.supersample_tablet;
    PerformanceSupersampleDesktop => "performance.supersampleDesktop", Continuous, [0.25, 2.0, 0.05], performance.supersample_desktop;
    PerformanceBreakpointMobile => "performance.breakpointMobile", Continuous, [0.0, 2000.0, 1.0], performance.breakpoint_mobile;
    PerformanceBreakpointTablet => "performance.breakpointTablet", Continuous, [0.0, 4000.0, 1.0], performance.breakpoint_tablet;
    PerformanceRespectDpr => "performance.respectDpr", Boolean, [0.0, 1.0, 1.0], performance.respect_dpr;
    PerformancePauseWhenHidden => "performance.pauseWhenHidden", Boolean, [0.0, 1.0, 1.0], performance.pause_when_hidden;
    PerformanceMaxDeltaTime => "performance.maxDeltaTime", Continuous, [0.005, 1.0, 0.005], performance.max_delta_time;
    PerformanceDebug => "performance.debug", Boolean, [0.0, 1.0, 1.0], performance.debug;
}

impl FieldId {
    pub fn descriptor(self) -> &'static FieldDescriptor {
        FIELDS
            .iter()
            .find(|descriptor| descriptor.id == self)
            .unwrap_or(&FIELDS[0])
    }

    pub fn path(self) -> &'static str {
        self.descriptor().path
    }

    /// Looks a field up by its dotted label, ignoring ASCII case.
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim();
        FIELDS
            .iter()
            .find(|descriptor| descriptor.path.eq_ignore_ascii_case(trimmed))
            .map(|descriptor| descriptor.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn paths_are_unique_and_resolve() {
        let mut seen = HashSet::new();
        for descriptor in FIELDS {
            assert!(seen.insert(descriptor.path), "duplicate {}", descriptor.path);
            assert_eq!(FieldId::from_path(descriptor.path), Some(descriptor.id));
            assert_eq!(descriptor.id.path(), descriptor.path);
            assert!(descriptor.min <= descriptor.max, "{}", descriptor.path);
        }
        assert_eq!(
            FieldId::from_path("WAVE.MAINSPEED"),
            Some(FieldId::WaveMainSpeed)
        );
        assert_eq!(FieldId::from_path("wave.nothing"), None);
    }

    #[test]
    fn descriptor_kinds_match_value_shapes() {
        let params = ParameterSet::default();
        for descriptor in FIELDS {
            let value = params.get(descriptor.id);
            let matches = matches!(
                (descriptor.kind, value),
                (FieldKind::Boolean, FieldValue::Bool(_))
                    | (FieldKind::Continuous, FieldValue::Number(_))
                    | (FieldKind::Integer, FieldValue::Integer(_))
            );
            assert!(matches, "{} has {value:?}", descriptor.path);
        }
    }

    #[test]
    fn paths_match_serialized_json_keys() {
        let json = serde_json::to_value(ParameterSet::default()).unwrap();
        for descriptor in FIELDS {
            let mut cursor = &json;
            for segment in descriptor.path.split('.') {
                cursor = cursor
                    .get(segment)
                    .unwrap_or_else(|| panic!("{} missing in JSON", descriptor.path));
            }
        }
    }

    #[test]
    fn set_writes_through_and_rejects_wrong_shapes() {
        let mut params = ParameterSet::default();
        assert!(params.set(FieldId::WaveMainSpeed, FieldValue::Number(2.5)));
        assert_eq!(params.wave.main_speed, 2.5);
        assert!(params.set(FieldId::PositioningBandCount, FieldValue::Number(6.6)));
        assert_eq!(params.positioning.band_count, 7);
        assert!(!params.set(FieldId::TwistEnabled, FieldValue::Number(1.0)));
        assert!(!params.twist.enabled);
        assert!(params.set(FieldId::TwistEnabled, FieldValue::Bool(true)));
        assert!(params.twist.enabled);
    }

    #[test]
    fn default_values_come_from_fresh_defaults() {
        let descriptor = FieldId::InteractionSmoothTime.descriptor();
        assert_eq!(descriptor.default_value(), FieldValue::Number(0.25));
    }
}
