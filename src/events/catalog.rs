//! Step catalog
//!
//! The fixed, ordered list of quiz steps with stable names. Every derived
//! per-step metric is laid out against this catalog.

use serde::Serialize;

/// Terminal step of the reference flow
pub const DEFAULT_TERMINAL_STEP: u32 = 18;

/// Label carried by `quiz_complete` events
pub const QUIZ_COMPLETE_NAME: &str = "Quiz Complete";

const REFERENCE_STEPS: [&str; 19] = [
    "Intro",
    "Cuantos kilos perder",
    "Clasificacion cuerpo",
    "Zona reducir grasa",
    "Nombre",
    "Feliz con apariencia",
    "Obstaculos perder peso",
    "Como afecta peso vida",
    "Beneficios deseados",
    "Protocol Intro",
    "Testimonials",
    "Peso actual",
    "Estatura",
    "Peso objetivo",
    "Ingesta agua",
    "Loading",
    "Result",
    "Sales Page",
    "Video Page",
];

/// A single catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDef {
    pub step: u32,
    pub name: String,
}

/// Ordered step catalog (indices 0..=N)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCatalog {
    steps: Vec<StepDef>,
    terminal_step: u32,
}

impl StepCatalog {
    /// Build a catalog from ordered names; index i gets `names[i]`.
    ///
    /// An empty list yields a single generic step 0.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<StepDef> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| StepDef {
                step: i as u32,
                name: name.into(),
            })
            .collect();

        if steps.is_empty() {
            steps.push(StepDef {
                step: 0,
                name: generic_name(0),
            });
        }

        let terminal_step = steps.len() as u32 - 1;
        Self {
            steps,
            terminal_step,
        }
    }

    /// The 19-step reference flow (0..=18)
    pub fn reference() -> Self {
        Self::new(REFERENCE_STEPS)
    }

    /// Builder: override the terminal step used for abandonment
    pub fn terminal(mut self, step: u32) -> Self {
        self.terminal_step = step;
        self
    }

    /// Terminal step; sessions whose furthest step is below it are abandoned
    pub fn terminal_step(&self) -> u32 {
        self.terminal_step
    }

    /// Catalog entries in step order
    pub fn steps(&self) -> &[StepDef] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn contains(&self, step: u32) -> bool {
        (step as usize) < self.steps.len()
    }

    /// Label for a step, falling back to a generic one for unknown steps
    pub fn name_for(&self, step: u32) -> String {
        self.steps
            .get(step as usize)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| generic_name(step))
    }
}

impl Default for StepCatalog {
    fn default() -> Self {
        Self::reference()
    }
}

fn generic_name(step: u32) -> String {
    format!("Step {}", step)
}
