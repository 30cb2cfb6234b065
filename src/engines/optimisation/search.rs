use crate::functions::strategy::Strategy;
use crate::types::{ParamSpec, ParamValue, ParameterSet};

/// Explicit list of candidate parameter sets, deduplicated and kept in
/// canonical-string order so "lexicographically first" is simply index 0.
#[derive(Debug, Clone, Default)]
pub struct ParameterSpace {
    candidates: Vec<ParameterSet>,
}

impl ParameterSpace {
    pub fn new(candidates: Vec<ParameterSet>) -> Self {
        let mut keyed: Vec<(String, ParameterSet)> = candidates
            .into_iter()
            .map(|p| (p.canonical_string(), p))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);

        Self {
            candidates: keyed.into_iter().map(|(_, p)| p).collect(),
        }
    }

    pub fn single(params: ParameterSet) -> Self {
        Self::new(vec![params])
    }

    /// Cartesian neighbourhood of `center`.
    ///
    /// Every tunable numeric parameter takes `value * m` for each multiplier
    /// (integers rounded, clamped to the spec's bounds); everything else in
    /// `center` stays fixed.
    pub fn around(center: &ParameterSet, specs: &[ParamSpec], variations: &[f64]) -> Self {
        let mut axes: Vec<(String, Vec<ParamValue>)> = Vec::new();

        for (name, value) in center.iter() {
            let spec = specs.iter().find(|s| &s.name == name);
            let values = match (spec, value) {
                (Some(spec), ParamValue::Int(v)) if spec.tunable => {
                    let mut out: Vec<i64> = variations
                        .iter()
                        .map(|m| clamp(*v as f64 * m, spec).round() as i64)
                        .collect();
                    out.sort_unstable();
                    out.dedup();
                    out.into_iter().map(ParamValue::Int).collect()
                }
                (Some(spec), ParamValue::Float(v)) if spec.tunable => {
                    let mut out: Vec<f64> = variations
                        .iter()
                        .map(|m| round6(clamp(v * m, spec)))
                        .collect();
                    out.sort_by(|a, b| a.total_cmp(b));
                    out.dedup();
                    out.into_iter().map(ParamValue::Float).collect()
                }
                _ => vec![value.clone()],
            };
            axes.push((name.clone(), values));
        }

        let mut candidates = vec![ParameterSet::new()];
        for (name, values) in &axes {
            let mut next = Vec::with_capacity(candidates.len() * values.len());
            for base in &candidates {
                for value in values {
                    let mut set = base.clone();
                    set.insert(name.clone(), value.clone());
                    next.push(set);
                }
            }
            candidates = next;
        }

        Self::new(candidates)
    }

    /// Drop candidates the strategy considers inconsistent
    pub fn retain_valid(mut self, strategy: &dyn Strategy) -> Self {
        self.candidates.retain(|p| strategy.validate_parameters(p));
        self
    }

    pub fn candidates(&self) -> &[ParameterSet] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, params: &ParameterSet) -> bool {
        self.candidates.iter().any(|p| p == params)
    }
}

fn clamp(value: f64, spec: &ParamSpec) -> f64 {
    let lo = spec.min.unwrap_or(f64::NEG_INFINITY);
    let hi = spec.max.unwrap_or(f64::INFINITY);
    value.max(lo).min(hi)
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::strategies::FixedSma;

    #[test]
    fn test_around_builds_clamped_grid() {
        let specs = vec![
            ParamSpec::int("n_fast", 10, 2, 11),
            ParamSpec::float("width", 2.0, 0.5, 4.0),
            ParamSpec::int("fixed", 5, 1, 10).fixed(),
        ];
        let center = ParameterSet::new()
            .with("n_fast", ParamValue::Int(10))
            .with("width", ParamValue::Float(2.0))
            .with("fixed", ParamValue::Int(5))
            .with("trend_filter", ParamValue::Flag(true));

        let space = ParameterSpace::around(&center, &specs, &[0.8, 1.0, 1.2]);
        // n_fast: 8, 10, 11 (12 clamped); width: 1.6, 2.0, 2.4
        assert_eq!(space.len(), 9);
        assert!(space.contains(&center));
        for candidate in space.candidates() {
            assert_eq!(candidate.get("fixed"), Some(&ParamValue::Int(5)));
            assert_eq!(candidate.get("trend_filter"), Some(&ParamValue::Flag(true)));
            assert!(candidate.get_usize("n_fast", 0) <= 11);
        }
    }

    #[test]
    fn test_candidates_sorted_and_deduplicated() {
        let a = ParameterSet::new().with("p", ParamValue::Int(2));
        let b = ParameterSet::new().with("p", ParamValue::Int(1));
        let space = ParameterSpace::new(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(space.candidates(), &[b, a]);
    }

    #[test]
    fn test_retain_valid_drops_inverted_periods() {
        let center = ParameterSet::new()
            .with("n_fast", ParamValue::Int(10))
            .with("n_slow", ParamValue::Int(11));
        let space = ParameterSpace::around(&center, &FixedSma.parameter_specs(), &[0.8, 1.0, 1.2])
            .retain_valid(&FixedSma);
        for candidate in space.candidates() {
            assert!(candidate.get_usize("n_fast", 0) < candidate.get_usize("n_slow", 0));
        }
        assert!(space.contains(&center));
    }
}
