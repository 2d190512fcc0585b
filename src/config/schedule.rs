use crate::foundation::core::StepsRemaining;
use crate::foundation::error::{DiscoError, DiscoResult};

/// One constant piece of a [`StepSchedule`]: `value` held for `span` units of the horizon.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScheduleSegment {
    /// Value held over the segment.
    pub value: f64,
    /// Length of the segment in horizon units.
    pub span: u32,
}

/// Piecewise-constant value over the course of a run, earliest (noisiest) step first.
///
/// Segment spans are relative: a schedule written as `[12]*400+[4]*600` spends the first 40% of
/// the steps at 12 and the rest at 4, whatever the actual step count. Text form is parsed by
/// [`std::str::FromStr`]; JSON accepts either that text or a list of segments.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "ScheduleRepr", into = "ScheduleRepr")]
pub struct StepSchedule {
    segments: Vec<ScheduleSegment>,
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
enum ScheduleRepr {
    Text(String),
    Segments(Vec<ScheduleSegment>),
}

impl TryFrom<ScheduleRepr> for StepSchedule {
    type Error = DiscoError;

    fn try_from(repr: ScheduleRepr) -> Result<Self, Self::Error> {
        match repr {
            ScheduleRepr::Text(s) => s.parse(),
            ScheduleRepr::Segments(segments) => Self::new(segments),
        }
    }
}

impl From<StepSchedule> for ScheduleRepr {
    fn from(s: StepSchedule) -> Self {
        Self::Segments(s.segments)
    }
}

impl StepSchedule {
    /// Build a schedule from segments.
    pub fn new(segments: Vec<ScheduleSegment>) -> DiscoResult<Self> {
        if segments.is_empty() {
            return Err(DiscoError::config("schedule must have at least one segment"));
        }
        for seg in &segments {
            if seg.span == 0 {
                return Err(DiscoError::config("schedule segment span must be > 0"));
            }
            if !seg.value.is_finite() {
                return Err(DiscoError::config("schedule segment value must be finite"));
            }
        }
        Ok(Self { segments })
    }

    /// Schedule holding a single value for the whole run.
    pub fn constant(value: f64) -> DiscoResult<Self> {
        Self::new(vec![ScheduleSegment { value, span: 1 }])
    }

    /// Borrow the segments.
    pub fn segments(&self) -> &[ScheduleSegment] {
        &self.segments
    }

    /// Sum of all segment spans.
    pub fn horizon(&self) -> u64 {
        self.segments.iter().map(|s| u64::from(s.span)).sum()
    }

    /// Expand to exactly `steps` values, earliest step first.
    pub fn resolve(&self, steps: usize) -> DiscoResult<Vec<f64>> {
        if steps == 0 {
            return Err(DiscoError::config("cannot resolve a schedule for 0 steps"));
        }
        let horizon = self.horizon();
        let mut out = Vec::with_capacity(steps);
        let mut seg_idx = 0usize;
        let mut seg_end = u64::from(self.segments[0].span);
        for i in 0..steps {
            let pos = (i as u64) * horizon / (steps as u64);
            while pos >= seg_end {
                seg_idx += 1;
                seg_end += u64::from(self.segments[seg_idx].span);
            }
            out.push(self.segments[seg_idx].value);
        }
        Ok(out)
    }
}

impl std::str::FromStr for StepSchedule {
    type Err = DiscoError;

    /// Parse `term (+ term)*` where a term is `[value]*span`, `value*span`, `[value]` or `value`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for term in s.split('+') {
            let term = term.trim();
            if term.is_empty() {
                return Err(DiscoError::config(format!("schedule '{s}': empty term")));
            }
            let (value_part, span_part) = match term.split_once('*') {
                Some((v, n)) => (v.trim(), Some(n.trim())),
                None => (term, None),
            };
            let value_part = value_part
                .strip_prefix('[')
                .and_then(|v| v.strip_suffix(']'))
                .unwrap_or(value_part)
                .trim();
            let value = value_part.parse::<f64>().map_err(|e| {
                DiscoError::config(format!("schedule '{s}': bad value '{value_part}': {e}"))
            })?;
            let span = match span_part {
                Some(n) => n.parse::<u32>().map_err(|e| {
                    DiscoError::config(format!("schedule '{s}': bad span '{n}': {e}"))
                })?,
                None => 1,
            };
            segments.push(ScheduleSegment { value, span });
        }
        Self::new(segments)
    }
}

impl std::fmt::Display for StepSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "[{}]*{}", seg.value, seg.span)?;
        }
        Ok(())
    }
}

/// Cutout counts in effect for one reverse step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CutoutParams {
    /// Whole-image views.
    pub overview: usize,
    /// Random inner crops.
    pub innercut: usize,
    /// Fraction of inner crops converted to grayscale.
    pub ic_gray_p: f64,
}

impl CutoutParams {
    /// Views produced per image.
    pub fn total(&self) -> usize {
        self.overview.saturating_add(self.innercut)
    }
}

/// Upper bound on either cutout count at a single step.
pub const MAX_CUTOUTS_PER_STEP: usize = 1024;

/// The three cutout schedules of a run, as configured.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CutoutSchedule {
    /// Overview views per step.
    #[serde(rename = "cut_overview")]
    pub overview: StepSchedule,
    /// Inner crops per step.
    #[serde(rename = "cut_innercut")]
    pub innercut: StepSchedule,
    /// Grayscale fraction of inner crops per step.
    #[serde(rename = "cut_icgray_p")]
    pub ic_gray_p: StepSchedule,
}

impl Default for CutoutSchedule {
    fn default() -> Self {
        let seg = |value, span| ScheduleSegment { value, span };
        Self {
            overview: StepSchedule {
                segments: vec![seg(12.0, 400), seg(4.0, 600)],
            },
            innercut: StepSchedule {
                segments: vec![seg(4.0, 400), seg(12.0, 600)],
            },
            ic_gray_p: StepSchedule {
                segments: vec![seg(0.2, 400), seg(0.0, 600)],
            },
        }
    }
}

impl CutoutSchedule {
    /// Expand all three schedules to `steps` entries and validate them.
    pub fn resolve(&self, steps: usize) -> DiscoResult<ResolvedCutoutSchedule> {
        let overview = counts(&self.overview, steps, "cut_overview")?;
        let innercut = counts(&self.innercut, steps, "cut_innercut")?;
        let ic_gray_p = self.ic_gray_p.resolve(steps)?;
        if ic_gray_p.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(DiscoError::config("cut_icgray_p values must be within [0, 1]"));
        }
        if let Some(i) = (0..steps).find(|&i| overview[i].saturating_add(innercut[i]) == 0) {
            return Err(DiscoError::config(format!(
                "cutout schedule yields no cutouts at step {i}"
            )));
        }
        Ok(ResolvedCutoutSchedule {
            overview,
            innercut,
            ic_gray_p,
        })
    }
}

fn counts(schedule: &StepSchedule, steps: usize, name: &str) -> DiscoResult<Vec<usize>> {
    schedule
        .resolve(steps)?
        .into_iter()
        .map(|v| {
            if !v.is_finite() || v < 0.0 || v.fract() != 0.0 {
                Err(DiscoError::config(format!(
                    "{name} values must be non-negative integers (got {v})"
                )))
            } else if v > MAX_CUTOUTS_PER_STEP as f64 {
                Err(DiscoError::config(format!(
                    "{name} values must be at most {MAX_CUTOUTS_PER_STEP} (got {v})"
                )))
            } else {
                Ok(v as usize)
            }
        })
        .collect()
}

/// Per-step cutout parameters, exactly one entry per diffusion step.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCutoutSchedule {
    overview: Vec<usize>,
    innercut: Vec<usize>,
    ic_gray_p: Vec<f64>,
}

impl ResolvedCutoutSchedule {
    /// Number of steps covered (equal to the run's step count).
    pub fn len(&self) -> usize {
        self.overview.len()
    }

    /// Always `false`; resolution rejects empty schedules.
    pub fn is_empty(&self) -> bool {
        self.overview.is_empty()
    }

    /// Parameters for the step with `remaining` steps left. Out-of-range countdowns saturate to
    /// the first step.
    pub fn at(&self, remaining: StepsRemaining) -> CutoutParams {
        let last = self.len() - 1;
        let idx = last - remaining.0.min(last);
        CutoutParams {
            overview: self.overview[idx],
            innercut: self.innercut[idx],
            ic_gray_p: self.ic_gray_p[idx],
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/schedule.rs"]
mod tests;
