//! Columns derived from raw claim amounts at request time. These must stay in
//! lockstep with the notebook that produced the training frame.

use std::collections::HashMap;

/// Upper clip bound per amount column, as computed on the training set.
pub type ClipStats = HashMap<String, f64>;

pub const AMOUNT_COLUMNS: [&str; 6] = [
    "CLAIMED_AMOUNT",
    "SYSTEM_CLAIMED_AMOUNT",
    "PATIENT_SHARE",
    "BILLED_TAX",
    "ACCEPTED_TAX",
    "GROSS_CLAIMED_AMOUNT",
];

const EPS: f64 = 1e-9;

const RATIOS: [(&str, &str, &str, f64); 3] = [
    ("PATIENT_SHARE_PCT", "PATIENT_SHARE", "CLAIMED_AMOUNT", 5.0),
    ("TAX_ACCEPT_RATIO", "ACCEPTED_TAX", "BILLED_TAX", 2.0),
    ("SYSTEM_TO_CLAIMED_RATIO", "SYSTEM_CLAIMED_AMOUNT", "CLAIMED_AMOUNT", 5.0),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    Ratio {
        numerator: &'static str,
        denominator: &'static str,
        cap: f64,
    },
    Clip { source: &'static str },
    Log1p { source: &'static str },
    NegFlag { source: &'static str },
    ZeroFlag { source: &'static str },
}

impl Derivation {
    /// Recognise an engineered column by name. Raw columns return `None`.
    pub fn for_feature(name: &str) -> Option<Self> {
        if let Some(&(_, numerator, denominator, cap)) =
            RATIOS.iter().find(|(ratio, ..)| *ratio == name)
        {
            return Some(Derivation::Ratio {
                numerator,
                denominator,
                cap,
            });
        }

        AMOUNT_COLUMNS.iter().find_map(|&source| {
            let suffix = name.strip_prefix(source)?.strip_prefix('_')?;
            match suffix {
                "CLIP" => Some(Derivation::Clip { source }),
                "LOG1P" => Some(Derivation::Log1p { source }),
                "NEG_FLAG" => Some(Derivation::NegFlag { source }),
                "ZERO_FLAG" => Some(Derivation::ZeroFlag { source }),
                _ => None,
            }
        })
    }

    pub fn sources(&self) -> Vec<&'static str> {
        match *self {
            Derivation::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator, denominator],
            Derivation::Clip { source }
            | Derivation::Log1p { source }
            | Derivation::NegFlag { source }
            | Derivation::ZeroFlag { source } => vec![source],
        }
    }

    /// `value_of` must return the raw amount for every name in [`sources`](Self::sources).
    pub fn compute(&self, value_of: impl Fn(&str) -> f64, clip_stats: Option<&ClipStats>) -> f64 {
        let upper = |source: &str| clip_stats.and_then(|stats| stats.get(source)).copied();

        match *self {
            Derivation::Ratio {
                numerator,
                denominator,
                cap,
            } => {
                let ratio = value_of(numerator) / (value_of(denominator) + EPS);
                // 0/0 stays NaN so the trees take their missing-value branch
                if ratio.is_nan() {
                    ratio
                } else {
                    ratio.max(0.0).min(cap)
                }
            }
            Derivation::Clip { source } => {
                let v = value_of(source);
                match upper(source) {
                    Some(hi) => v.min(hi),
                    None => v,
                }
            }
            Derivation::Log1p { source } => {
                let v = value_of(source).max(0.0);
                match upper(source) {
                    Some(hi) => v.min(hi).ln_1p(),
                    None => v.ln_1p(),
                }
            }
            Derivation::NegFlag { source } => flag(value_of(source) < 0.0),
            Derivation::ZeroFlag { source } => flag(value_of(source) == 0.0),
        }
    }
}

fn flag(set: bool) -> f64 {
    if set {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amounts(pairs: &[(&str, f64)]) -> impl Fn(&str) -> f64 {
        let map: HashMap<String, f64> = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        move |name| map[name]
    }

    #[test]
    fn recognises_engineered_names() {
        assert_eq!(
            Derivation::for_feature("TAX_ACCEPT_RATIO"),
            Some(Derivation::Ratio {
                numerator: "ACCEPTED_TAX",
                denominator: "BILLED_TAX",
                cap: 2.0
            })
        );
        assert_eq!(
            Derivation::for_feature("GROSS_CLAIMED_AMOUNT_LOG1P"),
            Some(Derivation::Log1p {
                source: "GROSS_CLAIMED_AMOUNT"
            })
        );
        assert_eq!(
            Derivation::for_feature("PATIENT_SHARE_ZERO_FLAG"),
            Some(Derivation::ZeroFlag {
                source: "PATIENT_SHARE"
            })
        );
        assert_eq!(Derivation::for_feature("CLAIMED_AMOUNT"), None);
        assert_eq!(Derivation::for_feature("COUNTRY"), None);
        assert_eq!(Derivation::for_feature("CLAIMED_AMOUNT_SQRT"), None);
    }

    #[test]
    fn ratios_are_clipped_to_their_cap() {
        let values = amounts(&[("SYSTEM_CLAIMED_AMOUNT", 540.0), ("CLAIMED_AMOUNT", 560.0)]);
        let ratio = Derivation::for_feature("SYSTEM_TO_CLAIMED_RATIO").unwrap();
        assert!((ratio.compute(&values, None) - 540.0 / 560.0).abs() < 1e-9);

        let values = amounts(&[("SYSTEM_CLAIMED_AMOUNT", 9000.0), ("CLAIMED_AMOUNT", 10.0)]);
        assert_eq!(ratio.compute(&values, None), 5.0);

        let values = amounts(&[("SYSTEM_CLAIMED_AMOUNT", -50.0), ("CLAIMED_AMOUNT", 10.0)]);
        assert_eq!(ratio.compute(&values, None), 0.0);
    }

    #[test]
    fn zero_denominator_saturates() {
        let values = amounts(&[("ACCEPTED_TAX", 3.0), ("BILLED_TAX", 0.0)]);
        let ratio = Derivation::for_feature("TAX_ACCEPT_RATIO").unwrap();
        assert_eq!(ratio.compute(&values, None), 2.0);
    }

    #[test]
    fn zero_over_zero_ratio_stays_missing() {
        let values = amounts(&[("PATIENT_SHARE", 0.0), ("CLAIMED_AMOUNT", -1e-9)]);
        let ratio = Derivation::for_feature("PATIENT_SHARE_PCT").unwrap();
        assert!(ratio.compute(&values, None).is_nan());
    }

    #[test]
    fn clip_stats_bound_clip_and_log_features() {
        let stats: ClipStats = [("CLAIMED_AMOUNT".to_string(), 1000.0)].into_iter().collect();
        let values = amounts(&[("CLAIMED_AMOUNT", 5000.0)]);

        let clip = Derivation::for_feature("CLAIMED_AMOUNT_CLIP").unwrap();
        assert_eq!(clip.compute(&values, Some(&stats)), 1000.0);
        assert_eq!(clip.compute(&values, None), 5000.0);

        let log = Derivation::for_feature("CLAIMED_AMOUNT_LOG1P").unwrap();
        assert!((log.compute(&values, Some(&stats)) - 1000f64.ln_1p()).abs() < 1e-12);
        assert!((log.compute(&values, None) - 5000f64.ln_1p()).abs() < 1e-12);
    }

    #[test]
    fn negative_amounts_set_the_flag_and_log_from_zero() {
        let values = amounts(&[("PATIENT_SHARE", -20.0)]);
        let neg = Derivation::for_feature("PATIENT_SHARE_NEG_FLAG").unwrap();
        let zero = Derivation::for_feature("PATIENT_SHARE_ZERO_FLAG").unwrap();
        let log = Derivation::for_feature("PATIENT_SHARE_LOG1P").unwrap();
        assert_eq!(neg.compute(&values, None), 1.0);
        assert_eq!(zero.compute(&values, None), 0.0);
        assert_eq!(log.compute(&values, None), 0.0);
    }
}
