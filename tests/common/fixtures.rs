//! Shared review fixture: two jurors commenting on lighting and acoustics.

#![allow(dead_code)]

use juryscope::config::AnalysisConfig;
use juryscope::models::{AnalysisInput, Stance};

use super::builders::{AxisBuilder, InputBuilder};

const LIGHT: [f32; 4] = [1.0, 0.0, 0.0, 0.0];
const SOUND: [f32; 4] = [0.0, 1.0, 0.0, 0.0];

fn near(base: [f32; 4], a: f32, b: f32) -> [f32; 4] {
    [base[0] + a, base[1] + a * 0.5, base[2] + b, base[3] + b * 0.5]
}

/// Ten sentences, two jurors, two well-separated topics.
///
/// Ana: three on lighting, two on acoustics. Ben: the reverse.
pub fn studio_review() -> AnalysisInput {
    InputBuilder::new()
        .stanced("Ana", "The lighting in the studio is too dim for model work.", Stance::Critique, &near(LIGHT, 0.05, 0.02))
        .stanced("Ana", "Daylight from the north windows is lovely.", Stance::Praise, &near(LIGHT, 0.02, 0.08))
        .stanced("Ana", "The hall echoes badly during reviews.", Stance::Critique, &near(SOUND, 0.04, 0.03))
        .stanced("Ana", "Add task lighting above the drafting tables.", Stance::Suggestion, &near(LIGHT, 0.07, 0.01))
        .stanced("Ana", "Acoustic panels would calm the crit room.", Stance::Suggestion, &near(SOUND, 0.01, 0.06))
        .stanced("Ben", "Reverberation makes the presentations hard to follow.", Stance::Critique, &near(SOUND, 0.06, 0.02))
        .stanced("Ben", "Noise from the workshop carries into the studio.", Stance::Critique, &near(SOUND, 0.03, 0.05))
        .stanced("Ben", "The lighting scheme feels harsh at night.", Stance::Critique, &near(LIGHT, 0.03, 0.04))
        .stanced("Ben", "Soft ceilings would absorb the noise.", Stance::Suggestion, &near(SOUND, 0.08, 0.01))
        .stanced("Ben", "Warm lighting in the foyer works well.", Stance::Praise, &near(LIGHT, 0.06, 0.06))
        .term("bright", &[1.0, 0.1, 0.0, 0.0])
        .term("sunlit", &[0.9, 0.0, 0.1, 0.0])
        .term("quiet", &[0.0, 1.0, 0.0, 0.1])
        .term("hushed", &[0.1, 0.9, 0.0, 0.0])
        .axis(
            AxisBuilder::new("light-sound", "Light vs sound")
                .negative("Sound", &["quiet", "hushed"])
                .positive("Light", &["bright", "sunlit"])
                .build(),
        )
        .build()
}

/// Defaults with a fixed k=2.
pub fn studio_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.clustering.k_concepts = 2;
    config
}
