//! Biomass to carbon conversion coefficients
//!
//! Above-ground biomass maps report dry matter; the carbon maps this crate produces
//! report the carbon held in it. The coefficients below are the share of dry biomass
//! that is carbon.

use crate::scale::ScalarCoefficient;

/// Carbon fraction of dry wood measured with a CNS analyser (46.53%).
///
/// Djomo et al. (2011), as summarised by Vashum & Jayakumar (2012), "Methods to Estimate
/// Above-Ground Biomass and Carbon Stock in Natural Forests - A Review".
pub const CARBON_FRACTION_OF_BIOMASS: f64 = 0.4653;

/// Commonly assumed carbon fraction of biomass (50%), used by Saatchi et al.
pub const COMMON_CARBON_FRACTION: f64 = 0.5;

/// Sentinel written to output rasters when none is configured.
pub const DEFAULT_NODATA: f32 = -9999.0;

const CARBON_FRACTION_JUSTIFICATION: &str = "Forest carbon stocks are widely estimated from \
allometric equations for biomass, with the carbon concentration of a tree usually assumed to be \
50% or 45% of its biomass. Losi et al. estimated about 48% for dry bole samples, and Djomo et al. \
measured a mean of 46.53% with a CNS analyser.";

/// Coefficient converting above-ground biomass density into carbon density.
pub fn biomass_to_carbon() -> ScalarCoefficient {
    ScalarCoefficient::with_justification(CARBON_FRACTION_OF_BIOMASS, CARBON_FRACTION_JUSTIFICATION)
}

pub fn common_carbon_fraction() -> ScalarCoefficient {
    ScalarCoefficient::with_justification(
        COMMON_CARBON_FRACTION,
        "Carbon assumed to be 50% of dry biomass, as in Saatchi et al.",
    )
}

/// Looks up a documented coefficient by the name used in configuration files.
pub fn named_coefficient(name: &str) -> Option<ScalarCoefficient> {
    match name.trim().to_lowercase().as_str() {
        "carbon_fraction_of_biomass" => Some(biomass_to_carbon()),
        "common_carbon_fraction" => Some(common_carbon_fraction()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_biomass_to_carbon_is_documented() {
        let coefficient = biomass_to_carbon();
        assert_eq!(coefficient.value, 0.4653);
        assert!(coefficient.justification.unwrap().contains("46.53%"));
    }

    #[test]
    fn test_named_coefficient_lookup() {
        assert_eq!(
            named_coefficient("Carbon_Fraction_Of_Biomass"),
            Some(biomass_to_carbon())
        );
        assert_eq!(named_coefficient("common_carbon_fraction").unwrap().value, 0.5);
        assert!(named_coefficient("unknown").is_none());
    }

    #[test]
    fn test_fractions_are_proportions() {
        for fraction in [CARBON_FRACTION_OF_BIOMASS, COMMON_CARBON_FRACTION] {
            assert!(fraction > 0.0 && fraction < 1.0);
        }
    }
}
