//! Two-way binding between the parameter schema and the tuner's widgets.
//!
//! Every interaction re-reads all widgets into the live [`ParameterSet`] and
//! restarts a trailing-edge [`Debouncer`]; the event loop rebuilds the shader
//! once the debouncer fires.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use ribbonconfig::{FieldDescriptor, FieldId, FieldKind, FieldValue, ParameterSet, FIELDS};
use shadergen::format::round_literal;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    Toggle(bool),
    /// Coarse slider paired with a precise text field; editing either
    /// updates the other straight away.
    Continuous { slider: f64, field: String },
    Integer(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Toggle(bool),
    Slide(f64),
    Type(String),
}

#[derive(Debug, Clone)]
pub struct Control {
    descriptor: &'static FieldDescriptor,
    widget: Widget,
}

/// Shortest text that parses back to exactly `value`.
fn number_text(value: f64) -> String {
    if value == 0.0 {
        "0".into()
    } else {
        value.to_string()
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Snaps `value` onto the slider's step grid inside its range.
fn slider_position(descriptor: &FieldDescriptor, value: f64) -> f64 {
    let FieldDescriptor { min, max, step, .. } = *descriptor;
    let snapped = if step > 0.0 {
        min + ((value - min) / step).round() * step
    } else {
        value
    };
    round_literal(snapped.clamp(min, max))
}

impl Control {
    fn new(descriptor: &'static FieldDescriptor, value: FieldValue) -> Self {
        let widget = match descriptor.kind {
            FieldKind::Boolean => Widget::Toggle(false),
            FieldKind::Continuous => Widget::Continuous {
                slider: descriptor.min,
                field: String::new(),
            },
            FieldKind::Integer => Widget::Integer(String::new()),
        };
        let mut control = Self { descriptor, widget };
        control.show(value);
        control
    }

    pub fn descriptor(&self) -> &'static FieldDescriptor {
        self.descriptor
    }

    pub fn widget(&self) -> &Widget {
        &self.widget
    }

    fn show(&mut self, value: FieldValue) {
        let descriptor = self.descriptor;
        match (&mut self.widget, value) {
            (Widget::Toggle(checked), FieldValue::Bool(flag)) => *checked = flag,
            (Widget::Continuous { slider, field }, value) => {
                if let Some(number) = value.as_f64() {
                    *slider = slider_position(descriptor, number);
                    *field = number_text(number);
                }
            }
            (Widget::Integer(text), FieldValue::Integer(number)) => *text = number.to_string(),
            (widget, value) => trace!(?widget, ?value, "value does not fit widget"),
        }
    }

    fn interact(&mut self, interaction: Interaction) -> Result<()> {
        let descriptor = self.descriptor;
        let path = descriptor.path;
        match (&mut self.widget, interaction) {
            (Widget::Toggle(checked), Interaction::Toggle(flag)) => *checked = flag,
            (Widget::Continuous { slider, field }, Interaction::Slide(value)) => {
                if !value.is_finite() {
                    bail!("{path}: slider position must be a finite number");
                }
                *slider = slider_position(descriptor, value);
                *field = number_text(*slider);
            }
            (Widget::Continuous { slider, field }, Interaction::Type(text)) => {
                if let Some(number) = parse_number(&text) {
                    *slider = slider_position(descriptor, number);
                }
                *field = text;
            }
            (Widget::Integer(field), Interaction::Type(text)) => *field = text,
            (Widget::Toggle(_), _) => bail!("{path} is a toggle"),
            (Widget::Integer(_), _) => bail!("{path} takes a typed integer"),
            (Widget::Continuous { .. }, Interaction::Toggle(_)) => {
                bail!("{path} is a number, not a toggle")
            }
        }
        Ok(())
    }

    /// Current widget value; unparsable text reads as the schema default.
    pub fn read(&self) -> FieldValue {
        let value = match &self.widget {
            Widget::Toggle(checked) => Some(FieldValue::Bool(*checked)),
            Widget::Continuous { field, .. } => parse_number(field).map(FieldValue::Number),
            Widget::Integer(text) => {
                let trimmed = text.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| parse_number(trimmed).map(|number| number.round() as i64))
                    .map(FieldValue::Integer)
            }
        };
        value.unwrap_or_else(|| {
            debug!(field = self.descriptor.path, "unparsable widget value; using default");
            self.descriptor.default_value()
        })
    }
}

/// Trailing-edge timer: every `schedule` pushes the deadline out again.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` exactly once per burst, when the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlSync {
    controls: Vec<Control>,
    debouncer: Debouncer,
}

impl ControlSync {
    pub fn new(params: &ParameterSet, delay: Duration) -> Self {
        let controls = FIELDS
            .iter()
            .map(|descriptor| Control::new(descriptor, params.get(descriptor.id)))
            .collect();
        Self {
            controls,
            debouncer: Debouncer::new(delay),
        }
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn control(&self, id: FieldId) -> Option<&Control> {
        self.controls
            .iter()
            .find(|control| control.descriptor.id == id)
    }

    /// Shows `params` in every widget without scheduling a rebuild.
    pub fn refresh_from(&mut self, params: &ParameterSet) {
        for control in &mut self.controls {
            control.show(params.get(control.descriptor.id));
        }
    }

    /// Applies one widget interaction, writes every widget into `params` and
    /// restarts the debounce timer.
    pub fn interact(
        &mut self,
        id: FieldId,
        interaction: Interaction,
        params: &mut ParameterSet,
        now: Instant,
    ) -> Result<()> {
        let Some(control) = self
            .controls
            .iter_mut()
            .find(|control| control.descriptor.id == id)
        else {
            bail!("no widget bound to {}", id.path());
        };
        control.interact(interaction)?;
        self.read_into(params);
        self.debouncer.schedule(now);
        Ok(())
    }

    pub fn read_into(&self, params: &mut ParameterSet) {
        for control in &self.controls {
            params.set(control.descriptor.id, control.read());
        }
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        self.debouncer.poll(now)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }
}
