use serde_json::Number;

use crate::error::ValidationErrors;
use crate::store::ImageDraft;

pub(crate) const CFG_RANGE: std::ops::RangeInclusive<f64> = 1.0..=30.0;
pub(crate) const STEPS_RANGE: std::ops::RangeInclusive<u64> = 1..=150;

/// Draft fields that passed validation, narrowed to the record's types.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidDraft {
    pub seed: u64,
    pub steps: u32,
    pub lora: Option<String>,
    pub tags: Vec<String>,
}

/// Check every constraint on `draft`, collecting all failures.
pub(crate) fn validate_draft(draft: &ImageDraft) -> Result<ValidDraft, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    require(
        &mut errors,
        "positivePrompt",
        &draft.positive_prompt,
        "Positive prompt is required",
    );
    let seed = whole_number(&draft.seed);
    if seed.is_none() {
        errors.push("seed", "Seed must be a non-negative integer");
    }
    require(&mut errors, "model", &draft.model, "Model is required");
    if !draft.cfg.is_finite() || !CFG_RANGE.contains(&draft.cfg) {
        errors.push("cfg", "CFG scale must be between 1 and 30");
    }
    let steps = whole_number(&draft.steps)
        .filter(|steps| STEPS_RANGE.contains(steps))
        .and_then(|steps| u32::try_from(steps).ok());
    if steps.is_none() {
        errors.push("steps", "Steps must be between 1 and 150");
    }
    require(&mut errors, "sampler", &draft.sampler, "Sampler is required");
    require(&mut errors, "scheduler", &draft.scheduler, "Scheduler is required");
    require(
        &mut errors,
        "imageDimensions",
        &draft.image_dimensions,
        "Image size is required",
    );

    match (seed, steps) {
        (Some(seed), Some(steps)) if errors.is_empty() => Ok(ValidDraft {
            seed,
            steps,
            lora: draft
                .lora
                .as_deref()
                .map(str::trim)
                .filter(|lora| !lora.is_empty())
                .map(str::to_string),
            tags: normalize_tags(&draft.tags),
        }),
        _ => Err(errors),
    }
}

/// Non-negative integer value of `number`. Integral floats such as `20.0`
/// count; fractions, negatives and values beyond `u64` do not.
fn whole_number(number: &Number) -> Option<u64> {
    number.as_u64().or_else(|| {
        number
            .as_f64()
            .filter(|value| value.fract() == 0.0 && *value >= 0.0 && *value < u64::MAX as f64)
            .map(|value| value as u64)
    })
}

fn require(errors: &mut ValidationErrors, field: &'static str, value: &str, message: &str) {
    if value.trim().is_empty() {
        errors.push(field, message);
    }
}

/// Trim, drop blanks and keep the first occurrence of each tag.
pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !normalized.iter().any(|seen| seen == tag) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::tests::draft;

    #[test]
    fn test_steps_boundaries() {
        for steps in [0, 151, -1] {
            let mut input = draft("a.png", &[]);
            input.steps = Number::from(steps);
            let errors = validate_draft(&input).unwrap_err();
            assert_eq!(errors.get("steps"), Some("Steps must be between 1 and 150"));
        }
        for steps in [1u32, 150] {
            let mut input = draft("a.png", &[]);
            input.steps = Number::from(steps);
            assert_eq!(validate_draft(&input).unwrap().steps, steps);
        }
    }

    #[test]
    fn test_steps_must_be_whole() {
        let mut input = draft("a.png", &[]);
        input.steps = Number::from_f64(20.5).unwrap();
        let errors = validate_draft(&input).unwrap_err();
        assert_eq!(errors.get("steps"), Some("Steps must be between 1 and 150"));

        input.steps = Number::from_f64(20.0).unwrap();
        assert_eq!(validate_draft(&input).unwrap().steps, 20);
    }

    #[test]
    fn test_cfg_boundaries() {
        for cfg in [0.99, 30.01, f64::NAN, f64::INFINITY] {
            let mut input = draft("a.png", &[]);
            input.cfg = cfg;
            assert!(validate_draft(&input).unwrap_err().get("cfg").is_some(), "cfg {cfg}");
        }
        for cfg in [1.0, 7.5, 30.0] {
            let mut input = draft("a.png", &[]);
            input.cfg = cfg;
            assert!(validate_draft(&input).is_ok(), "cfg {cfg}");
        }
    }

    #[test]
    fn test_seed_must_not_be_negative() {
        let mut input = draft("a.png", &[]);
        input.seed = Number::from(-1);
        assert!(validate_draft(&input).unwrap_err().get("seed").is_some());
        input.seed = Number::from_f64(1.5).unwrap();
        assert_eq!(
            validate_draft(&input).unwrap_err().get("seed"),
            Some("Seed must be a non-negative integer")
        );
        input.seed = Number::from_f64(1e30).unwrap();
        assert!(validate_draft(&input).unwrap_err().get("seed").is_some());
        input.seed = Number::from(0u64);
        assert_eq!(validate_draft(&input).unwrap().seed, 0);
    }

    #[test]
    fn test_seed_covers_full_u64_range() {
        let mut input = draft("a.png", &[]);
        input.seed = Number::from(u64::MAX);
        assert_eq!(validate_draft(&input).unwrap().seed, u64::MAX);

        let parsed: Number = serde_json::from_str("18446744073709551615").unwrap();
        input.seed = parsed;
        assert_eq!(validate_draft(&input).unwrap().seed, u64::MAX);
    }

    #[test]
    fn test_collects_every_failing_field() {
        let mut input = draft("a.png", &[]);
        input.positive_prompt = "   ".to_string();
        input.model = String::new();
        input.sampler = String::new();
        input.scheduler = String::new();
        input.image_dimensions = String::new();
        input.steps = Number::from(0u64);

        let errors = validate_draft(&input).unwrap_err();
        let fields: Vec<_> = errors.fields().iter().map(|error| error.field).collect();
        assert_eq!(
            fields,
            ["positivePrompt", "model", "steps", "sampler", "scheduler", "imageDimensions"]
        );
        assert_eq!(errors.get("positivePrompt"), Some("Positive prompt is required"));
        assert_eq!(errors.get("imageDimensions"), Some("Image size is required"));
    }

    #[test]
    fn test_negative_prompt_may_be_empty() {
        let mut input = draft("a.png", &[]);
        input.negative_prompt = String::new();
        assert!(validate_draft(&input).is_ok());
    }

    #[test]
    fn test_tags_and_lora_are_normalized() {
        let mut input = draft("a.png", &[" x ", "y", "x", "", "  "]);
        input.lora = Some("  ".to_string());
        let valid = validate_draft(&input).unwrap();
        assert_eq!(valid.tags, ["x", "y"]);
        assert_eq!(valid.lora, None);
    }
}
