use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::schema::{FieldKind, FIELDS};

/// Number of palette entries available to the ribbon bands.
pub const PALETTE_SIZE: usize = 5;

/// An sRGB colour stored as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Channels normalised to `[0, 1]`.
    pub fn unit(self) -> [f64; 3] {
        let [r, g, b] = self.0;
        [r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let hex = raw.trim().trim_start_matches('#');
        let expanded = match hex.len() {
            3 => hex.chars().flat_map(|ch| [ch, ch]).collect::<String>(),
            6 => hex.to_string(),
            _ => return Err(format!("invalid colour '{raw}'; expected #rgb or #rrggbb")),
        };
        let channel = |index: usize| {
            u8::from_str_radix(&expanded[index * 2..index * 2 + 2], 16)
                .map_err(|_| format!("invalid colour '{raw}'; expected hexadecimal digits"))
        };
        Ok(Self([channel(0)?, channel(1)?, channel(2)?]))
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColorPalette {
    pub bands: [Rgb; PALETTE_SIZE],
    pub background: Rgb,
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self {
            bands: [
                Rgb::new(0xff, 0x5f, 0x6d),
                Rgb::new(0xff, 0xc3, 0x71),
                Rgb::new(0x47, 0xca, 0xcc),
                Rgb::new(0x6a, 0x67, 0xce),
                Rgb::new(0x1f, 0xab, 0x89),
            ],
            background: Rgb::new(0x0e, 0x0f, 0x1a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Thickness {
    pub base: f64,
    pub stretch: f64,
    pub stretch_frequency: f64,
    pub stretch_speed: f64,
}

impl Default for Thickness {
    fn default() -> Self {
        Self {
            base: 0.34,
            stretch: 0.25,
            stretch_frequency: 1.6,
            stretch_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Wave {
    pub main_amplitude: f64,
    pub main_frequency: f64,
    pub main_speed: f64,
    pub secondary_amplitude: f64,
    pub secondary_frequency: f64,
    pub secondary_speed: f64,
    pub drift_amount: f64,
    pub drift_speed: f64,
    pub blend: f64,
}

impl Default for Wave {
    fn default() -> Self {
        Self {
            main_amplitude: 0.16,
            main_frequency: 1.4,
            main_speed: 1.0,
            secondary_amplitude: 0.05,
            secondary_frequency: 3.2,
            secondary_speed: 2.0,
            drift_amount: 0.12,
            drift_speed: 1.0,
            blend: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Twist {
    pub enabled: bool,
    /// Rotation strength; its rounded value doubles as the angular speed.
    pub intensity: f64,
}

impl Default for Twist {
    fn default() -> Self {
        Self {
            enabled: false,
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Appearance {
    pub brightness: f64,
    pub plastic: bool,
    pub softness: f64,
    pub specular_power: f64,
    pub specular_intensity: f64,
    pub edge_shadow_strength: f64,
    pub edge_shadow_width: f64,
    pub aa_sharpness: f64,
    pub aa_fallback: f64,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            plastic: false,
            softness: 0.45,
            specular_power: 28.0,
            specular_intensity: 0.35,
            edge_shadow_strength: 0.3,
            edge_shadow_width: 0.22,
            aa_sharpness: 1.0,
            aa_fallback: 0.002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Positioning {
    pub vertical_offset: f64,
    pub band_count: i64,
}

impl Default for Positioning {
    fn default() -> Self {
        Self {
            vertical_offset: 0.0,
            band_count: PALETTE_SIZE as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Interaction {
    /// Playback speed while the pointer hovers the preview.
    pub hover_slowdown: f64,
    /// Smoothing time constant (seconds) for speed changes.
    pub smooth_time: f64,
}

impl Default for Interaction {
    fn default() -> Self {
        Self {
            hover_slowdown: 0.1,
            smooth_time: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Performance {
    pub supersample_mobile: f64,
    pub supersample_tablet: f64,
    pub supersample_desktop: f64,
    /// CSS widths below this use the mobile factor.
    pub breakpoint_mobile: f64,
    /// CSS widths below this (and above mobile) use the tablet factor.
    pub breakpoint_tablet: f64,
    pub respect_dpr: bool,
    pub pause_when_hidden: bool,
    /// Upper bound (seconds) on a single frame step.
    pub max_delta_time: f64,
    pub debug: bool,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            supersample_mobile: 1.0,
            supersample_tablet: 1.0,
            supersample_desktop: 1.0,
            breakpoint_mobile: 640.0,
            breakpoint_tablet: 1024.0,
            respect_dpr: true,
            pause_when_hidden: true,
            max_delta_time: 0.1,
            debug: false,
        }
    }
}

impl Performance {
    /// Supersampling factor for a surface of the given CSS width.
    pub fn supersample_for(&self, css_width: f64) -> f64 {
        if css_width < self.breakpoint_mobile {
            self.supersample_mobile
        } else if css_width < self.breakpoint_tablet {
            self.supersample_tablet
        } else {
            self.supersample_desktop
        }
    }
}

/// The full set of tunable ribbon parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    pub colors: ColorPalette,
    pub thickness: Thickness,
    pub wave: Wave,
    pub twist: Twist,
    pub appearance: Appearance,
    pub positioning: Positioning,
    pub interaction: Interaction,
    pub performance: Performance,
}

/// The remotely published subset: everything except the palette, which is
/// maintained site-wide.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishedConfig {
    pub thickness: Thickness,
    pub wave: Wave,
    pub twist: Twist,
    pub appearance: Appearance,
    pub positioning: Positioning,
    pub interaction: Interaction,
    pub performance: Performance,
}

/// Outcome of [`ParameterSet::merge_json`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub applied: usize,
    pub skipped: usize,
}

impl ParameterSet {
    pub fn from_json_str(input: &str) -> Result<Self, crate::ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn published(&self) -> PublishedConfig {
        PublishedConfig {
            thickness: self.thickness.clone(),
            wave: self.wave.clone(),
            twist: self.twist.clone(),
            appearance: self.appearance.clone(),
            positioning: self.positioning.clone(),
            interaction: self.interaction.clone(),
            performance: self.performance.clone(),
        }
    }

    /// Replaces every published group, leaving the palette untouched.
    pub fn apply_published(&mut self, published: PublishedConfig) {
        let PublishedConfig {
            thickness,
            wave,
            twist,
            appearance,
            positioning,
            interaction,
            performance,
        } = published;
        self.thickness = thickness;
        self.wave = wave;
        self.twist = twist;
        self.appearance = appearance;
        self.positioning = positioning;
        self.interaction = interaction;
        self.performance = performance;
    }

    /// Copy with every non-finite continuous field replaced by its default.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let mut clean = self.clone();
        for descriptor in FIELDS {
            if descriptor.kind != FieldKind::Continuous {
                continue;
            }
            let finite = clean
                .get(descriptor.id)
                .as_f64()
                .is_some_and(|value| value.is_finite());
            if !finite {
                clean.set(descriptor.id, defaults.get(descriptor.id));
            }
        }
        clean
    }

    /// Overlays `snapshot` onto this set field by field.
    ///
    /// Only keys that exist in the schema are considered, and a value is
    /// applied only when its JSON kind matches the current one. Groups or
    /// fields missing from the snapshot keep their live values.
    pub fn merge_json(&mut self, snapshot: &Value) -> MergeReport {
        let mut report = MergeReport::default();
        let Ok(mut live) = serde_json::to_value(&*self) else {
            return report;
        };
        merge_value(&mut live, snapshot, &mut report);
        match serde_json::from_value::<ParameterSet>(live) {
            Ok(merged) => *self = merged,
            Err(_) => {
                report.skipped += report.applied;
                report.applied = 0;
            }
        }
        report
    }
}

fn merge_value(live: &mut Value, incoming: &Value, report: &mut MergeReport) {
    if let (Value::Object(live_map), Value::Object(incoming_map)) = (&mut *live, incoming) {
        for (key, incoming_value) in incoming_map {
            match live_map.get_mut(key) {
                Some(slot) => merge_value(slot, incoming_value, report),
                None => report.skipped += 1,
            }
        }
        return;
    }

    let compatible = match (&*live, incoming) {
        (Value::Array(current), Value::Array(items)) => {
            current.len() == items.len() && current.iter().zip(items).all(|(a, b)| same_kind(a, b))
        }
        (current, value) => same_kind(current, value) && !value.is_object(),
    };
    if compatible {
        *live = incoming.clone();
        report.applied += 1;
    } else {
        report.skipped += 1;
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            // integer fields must stay integral
            !(x.is_i64() || x.is_u64()) || y.is_i64() || y.is_u64()
        }
        (Value::Bool(_), Value::Bool(_)) | (Value::String(_), Value::String(_)) => true,
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let params = ParameterSet::from_json_str(r#"{"wave": {"mainSpeed": 3}}"#).unwrap();
        assert_eq!(params.wave.main_speed, 3.0);
        assert_eq!(params.wave.main_amplitude, Wave::default().main_amplitude);
        assert_eq!(params.colors, ColorPalette::default());
        assert_eq!(params.performance, Performance::default());
    }

    #[test]
    fn colours_round_trip_as_hex() {
        let rgb: Rgb = "#0a0B0c".parse().unwrap();
        assert_eq!(rgb, Rgb::new(10, 11, 12));
        assert_eq!(rgb.to_string(), "#0a0b0c");
        assert_eq!("#fff".parse::<Rgb>().unwrap(), Rgb::new(255, 255, 255));
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("zzzzzz".parse::<Rgb>().is_err());
    }

    #[test]
    fn published_subset_excludes_colours() {
        let params = ParameterSet::default();
        let value = serde_json::to_value(params.published()).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert!(!keys.iter().any(|key| key == "colors"));
        for key in [
            "thickness",
            "wave",
            "twist",
            "appearance",
            "positioning",
            "interaction",
            "performance",
        ] {
            assert!(keys.iter().any(|k| k == key), "missing {key}");
        }
    }

    #[test]
    fn apply_published_keeps_palette() {
        let mut params = ParameterSet::default();
        params.colors.background = Rgb::new(1, 2, 3);
        let mut published = PublishedConfig::default();
        published.wave.blend = 0.9;
        params.apply_published(published);
        assert_eq!(params.wave.blend, 0.9);
        assert_eq!(params.colors.background, Rgb::new(1, 2, 3));
    }

    #[test]
    fn merge_applies_known_fields_and_skips_mismatches() {
        let mut params = ParameterSet::default();
        params.colors.background = Rgb::new(9, 9, 9);
        let report = params.merge_json(&json!({
            "wave": { "mainSpeed": 4.0, "bogus": 1 },
            "twist": { "enabled": "yes" },
            "positioning": { "bandCount": 3.5 },
            "unknownGroup": {}
        }));
        assert_eq!(params.wave.main_speed, 4.0);
        assert!(!params.twist.enabled);
        assert_eq!(params.positioning.band_count, 5);
        assert_eq!(params.colors.background, Rgb::new(9, 9, 9));
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 4);
    }

    #[test]
    fn merge_replaces_colours_when_present() {
        let mut params = ParameterSet::default();
        params.merge_json(&json!({
            "colors": {
                "bands": ["#000000", "#111111", "#222222", "#333333", "#444444"],
                "background": "#ffffff"
            }
        }));
        assert_eq!(params.colors.bands[3], Rgb::new(0x33, 0x33, 0x33));
        assert_eq!(params.colors.background, Rgb::new(255, 255, 255));
    }

    #[test]
    fn merge_rejects_malformed_colour_without_corrupting() {
        let mut params = ParameterSet::default();
        let before = params.clone();
        let report = params.merge_json(&json!({ "colors": { "background": "not-a-colour" } }));
        assert_eq!(params, before);
        assert_eq!(report.applied, 0);
    }

    #[test]
    fn sanitized_replaces_non_finite_numbers() {
        let mut params = ParameterSet::default();
        params.wave.main_amplitude = f64::NAN;
        params.thickness.base = f64::INFINITY;
        let clean = params.sanitized();
        assert_eq!(clean.wave.main_amplitude, Wave::default().main_amplitude);
        assert_eq!(clean.thickness.base, Thickness::default().base);
    }

    #[test]
    fn supersample_follows_breakpoints() {
        let perf = Performance {
            supersample_mobile: 0.5,
            supersample_tablet: 0.75,
            supersample_desktop: 1.5,
            ..Performance::default()
        };
        assert_eq!(perf.supersample_for(320.0), 0.5);
        assert_eq!(perf.supersample_for(800.0), 0.75);
        assert_eq!(perf.supersample_for(1920.0), 1.5);
    }
}
