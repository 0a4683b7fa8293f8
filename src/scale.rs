use crate::constants::named_coefficient;
use crate::raster::{Raster, is_sentinel};
use log::warn;
use serde::{Deserialize, Serialize};

/// Dimensionless multiplier converting one quantity or unit into another.
///
/// The justification is carried for reporting only. In configuration files a coefficient
/// is a bare number, `{ "value": ..., "justification": "..." }`, or the name of one of the
/// documented fractions in [`crate::constants`] such as `"carbon_fraction_of_biomass"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CoefficientHelper")]
pub struct ScalarCoefficient {
    pub value: f64,
    pub justification: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoefficientHelper {
    Bare(f64),
    Named(String),
    Documented {
        value: f64,
        justification: Option<String>,
    },
}

impl TryFrom<CoefficientHelper> for ScalarCoefficient {
    type Error = String;

    fn try_from(helper: CoefficientHelper) -> Result<Self, Self::Error> {
        match helper {
            CoefficientHelper::Bare(value) => Ok(ScalarCoefficient::new(value)),
            CoefficientHelper::Named(name) => {
                named_coefficient(&name).ok_or_else(|| format!("unknown coefficient '{}'", name))
            }
            CoefficientHelper::Documented {
                value,
                justification,
            } => Ok(ScalarCoefficient {
                value,
                justification,
            }),
        }
    }
}

impl ScalarCoefficient {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            justification: None,
        }
    }

    pub fn with_justification(value: f64, justification: impl Into<String>) -> Self {
        Self {
            value,
            justification: Some(justification.into()),
        }
    }

    pub fn identity() -> Self {
        Self::new(1.0)
    }

    pub fn is_identity(&self) -> bool {
        self.value == 1.0
    }
}

/// Multiplies every valid cell by `coefficient`; sentinel cells are copied untouched.
///
/// Products outside the `f32` range become the sentinel and are counted in a warning.
pub fn scale(raster: &Raster, coefficient: &ScalarCoefficient) -> Raster {
    let factor = coefficient.value;
    if !(factor.is_finite() && factor > 0.0) {
        warn!(
            "Scaling by non-positive or non-finite coefficient {}, results are the caller's responsibility",
            factor
        );
    }

    let nodata = raster.nodata();
    let mut overflowed = 0_usize;
    let data = raster.data().mapv(|v| {
        if is_sentinel(v, nodata) {
            return v;
        }
        finite_product(v, factor).unwrap_or_else(|| {
            overflowed += 1;
            nodata
        })
    });

    if overflowed > 0 {
        warn!(
            "{} cell(s) overflowed when scaling by {} and were set to no-data",
            overflowed, factor
        );
    }

    Raster::from_parts(data, nodata, raster.grid().clone())
}

/// `value * factor` computed in f64, or `None` when it does not fit a finite `f32`.
pub(crate) fn finite_product(value: f32, factor: f64) -> Option<f32> {
    let product = (value as f64 * factor) as f32;
    product.is_finite().then_some(product)
}
