use serde::Serialize;

use crate::errors::{AppError, AppResult};

/// The four quantities the slope form works with. A field left at
/// `None` (or holding a non-finite number) counts as not supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlopeInputs {
    pub higher_elevation: Option<f64>,
    pub lower_elevation: Option<f64>,
    pub distance: Option<f64>,
    pub slope_percent: Option<f64>,
}

impl SlopeInputs {
    fn higher(&self) -> Option<f64> {
        finite(self.higher_elevation)
    }

    fn lower(&self) -> Option<f64> {
        finite(self.lower_elevation)
    }

    fn distance(&self) -> Option<f64> {
        finite(self.distance)
    }

    fn slope(&self) -> Option<f64> {
        finite(self.slope_percent)
    }

    fn supplied_count(&self) -> usize {
        [self.higher(), self.lower(), self.distance(), self.slope()]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeField {
    HigherElevation,
    LowerElevation,
    Distance,
    SlopePercent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlopeOutcome {
    /// The missing field, solved from the other three and rounded for
    /// display.
    Solved { field: SlopeField, value: f64 },
    /// All four fields were already supplied; nothing is recomputed.
    AlreadyComplete,
}

/// Solves the single missing field of the slope quadruple.
///
/// `slope = (higher - lower) / distance * 100`, rearranged per branch.
/// Branches are checked in fixed priority order: slope, distance,
/// higher elevation, lower elevation.
pub fn solve_slope(inputs: &SlopeInputs) -> AppResult<SlopeOutcome> {
    if inputs.supplied_count() < 3 {
        return Err(AppError::InsufficientInputs);
    }
    if inputs.supplied_count() == 4 {
        return Ok(SlopeOutcome::AlreadyComplete);
    }

    type Solver = fn(&SlopeInputs) -> Option<f64>;
    let branches: [(SlopeField, Solver); 4] = [
        (SlopeField::SlopePercent, |i| {
            Some((i.higher()? - i.lower()?) / i.distance()? * 100.0)
        }),
        (SlopeField::Distance, |i| {
            Some((i.higher()? - i.lower()?) / (i.slope()? / 100.0))
        }),
        (SlopeField::HigherElevation, |i| {
            Some(i.lower()? + i.distance()? * (i.slope()? / 100.0))
        }),
        (SlopeField::LowerElevation, |i| {
            Some(i.higher()? - i.distance()? * (i.slope()? / 100.0))
        }),
    ];

    for (field, solve) in branches {
        if let Some(value) = solve(inputs) {
            if !value.is_finite() {
                return Err(AppError::DegenerateInput(
                    "slope solution is not a finite number".into(),
                ));
            }
            return Ok(SlopeOutcome::Solved {
                field,
                value: round3(value),
            });
        }
    }

    // Exactly one field is missing at this point, so one branch above
    // always fires.
    Err(AppError::InsufficientInputs)
}

/// One grade representation; the other two are derived. When several
/// fields are supplied the first recognized one wins: percent, then
/// rise:run, then angle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionInput {
    pub percent: Option<f64>,
    pub rise: Option<f64>,
    pub run: Option<f64>,
    pub angle_degrees: Option<f64>,
}

impl ConversionInput {
    fn percent(&self) -> Option<f64> {
        finite(self.percent)
    }

    fn ratio(&self) -> Option<(f64, f64)> {
        Some((finite(self.rise)?, finite(self.run)?))
    }

    fn angle(&self) -> Option<f64> {
        finite(self.angle_degrees)
    }
}

/// A grade expressed in all three representations, rounded to the 3
/// decimal places the result panel displays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Conversion {
    pub percent: f64,
    /// The `x` in a normalized `1:x` rise:run ratio.
    pub ratio_denominator: f64,
    pub angle_degrees: f64,
}

pub fn convert(input: &ConversionInput) -> AppResult<Conversion> {
    type Branch = (
        fn(&ConversionInput) -> bool,
        fn(&ConversionInput) -> AppResult<Conversion>,
    );
    let branches: [Branch; 3] = [
        (|i| i.percent().is_some(), convert_from_percent),
        (|i| i.ratio().is_some(), convert_from_ratio),
        (|i| i.angle().is_some(), convert_from_angle),
    ];

    for (matches, handler) in branches {
        if matches(input) {
            return handler(input);
        }
    }
    Err(AppError::NoInputProvided)
}

fn convert_from_percent(input: &ConversionInput) -> AppResult<Conversion> {
    let percent = input.percent().ok_or(AppError::NoInputProvided)?;
    if percent == 0.0 {
        return Err(AppError::DegenerateInput(
            "a 0% grade has no rise:run ratio".into(),
        ));
    }
    let angle = (percent / 100.0).atan().to_degrees();
    Ok(Conversion {
        percent: round3(percent),
        ratio_denominator: round3(100.0 / percent),
        angle_degrees: round3(angle),
    })
}

fn convert_from_ratio(input: &ConversionInput) -> AppResult<Conversion> {
    let (rise, run) = input.ratio().ok_or(AppError::NoInputProvided)?;
    if run == 0.0 {
        return Err(AppError::DegenerateInput("ratio run must be non-zero".into()));
    }
    let percent = rise / run * 100.0;
    if percent == 0.0 {
        return Err(AppError::DegenerateInput(
            "a flat ratio has no rise:run denominator".into(),
        ));
    }
    let angle = (rise / run).atan().to_degrees();
    Ok(Conversion {
        percent: round3(percent),
        ratio_denominator: round3(100.0 / percent),
        angle_degrees: round3(angle),
    })
}

fn convert_from_angle(input: &ConversionInput) -> AppResult<Conversion> {
    let angle = input.angle().ok_or(AppError::NoInputProvided)?;
    let percent = angle.to_radians().tan() * 100.0;
    if percent == 0.0 || !percent.is_finite() {
        return Err(AppError::DegenerateInput(
            "angle has no usable percent grade".into(),
        ));
    }
    Ok(Conversion {
        percent: round3(percent),
        ratio_denominator: round3(100.0 / percent),
        angle_degrees: round3(angle),
    })
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
