/// Sampling temperature per stage. Each stage runs cooler than the last.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTemperatures {
    pub review: f32,
    pub rewrite: f32,
    pub polish: f32,
}

impl Default for StageTemperatures {
    fn default() -> Self {
        Self {
            review: 0.3,
            rewrite: 0.2,
            polish: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub temperatures: StageTemperatures,
    /// Matched case-insensitively against the polished text. Advisory only.
    pub banned_phrases: Vec<String>,
}

const DEFAULT_BANNED_PHRASES: &[&str] = &[
    "u današnjem brzom svijetu",
    "nije tajna da",
    "važno je napomenuti",
    "u konačnici",
    "zaronimo u",
    "kao jezični model",
    "as an ai language model",
    "in today's fast-paced world",
    "it is important to note",
    "delve into",
];

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            temperatures: StageTemperatures::default(),
            banned_phrases: DEFAULT_BANNED_PHRASES
                .iter()
                .map(|phrase| (*phrase).to_string())
                .collect(),
        }
    }
}
