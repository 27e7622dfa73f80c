use std::slice;

use log::warn;

use super::element::Element;
use super::formula::ElementalFormula;

/// Multiply two polynomials over the nominal mass offset, keeping the first `limit` terms
fn convolve(left: &[f64], right: &[f64], limit: usize) -> Vec<f64> {
    let size = (left.len() + right.len()).saturating_sub(1).min(limit);
    let mut result = vec![0.0; size];
    for (i, a) in left.iter().enumerate() {
        if i >= size {
            break;
        }
        if *a == 0.0 {
            continue;
        }
        for (j, b) in right.iter().enumerate() {
            let k = i + j;
            if k >= size {
                break;
            }
            result[k] += a * b;
        }
    }
    result
}

/// The isotope pattern of one atom of `element` on a unit grid starting at its lightest isotope
fn element_pattern(element: Element, limit: usize) -> Vec<f64> {
    let isotopes = element.isotopes();
    let lightest = isotopes[0].mass_number;
    let span = (isotopes[isotopes.len() - 1].mass_number - lightest) as usize + 1;
    let mut pattern = vec![0.0; span.min(limit)];
    for isotope in isotopes {
        let offset = (isotope.mass_number - lightest) as usize;
        if offset < pattern.len() {
            pattern[offset] += isotope.abundance;
        }
    }
    pattern
}

/// Raise `pattern` to the `count`-th power by repeated squaring
fn pattern_power(pattern: &[f64], mut count: u32, limit: usize) -> Vec<f64> {
    let mut result = vec![1.0];
    let mut base = pattern.to_vec();
    while count > 0 {
        if count & 1 == 1 {
            result = convolve(&result, &base, limit);
        }
        count >>= 1;
        if count > 0 {
            base = convolve(&base, &base, limit);
        }
    }
    result
}

/**
The coarse isotope pattern of a formula: the probability of each nominal mass, starting
from the combination of the lightest isotope of every atom.

```
use mzkit::chemistry::ElementalFormula;

let formula: ElementalFormula = "C6H12O6".parse().unwrap();
let dist = formula.isotope_distribution(3);
assert_eq!(dist.len(), 3);
assert_eq!(dist.peaks()[0].0, 180);
assert!(dist.peaks()[0].1 > dist.peaks()[1].1);
```
*/
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsotopeDistribution {
    peaks: Vec<(u64, f64)>,
}

impl IsotopeDistribution {
    /// Compute the first `n` peaks of the isotope pattern of `formula`.
    ///
    /// The result always holds exactly `n` peaks with consecutive nominal masses,
    /// trailing peaks may have zero probability. Probabilities are not renormalized,
    /// so they sum to at most one. The charge of the formula is ignored and elements
    /// with a negative count are skipped.
    pub fn from_formula(formula: &ElementalFormula, n: usize) -> Self {
        if n == 0 {
            return Self::default();
        }
        let mut probabilities = vec![1.0];
        let mut start: u64 = 0;
        for (element, count) in formula.iter() {
            if count < 0 {
                warn!("Skipping {element} with negative count {count} in isotope pattern of {formula}");
                continue;
            }
            let count = count as u32;
            start += element.lightest_isotope().mass_number as u64 * count as u64;
            let pattern = element_pattern(element, n);
            let powered = pattern_power(&pattern, count, n);
            probabilities = convolve(&probabilities, &powered, n);
        }
        probabilities.resize(n, 0.0);
        let peaks = probabilities
            .into_iter()
            .enumerate()
            .map(|(i, p)| (start + i as u64, p))
            .collect();
        Self { peaks }
    }

    /// The `(nominal mass, probability)` pairs in increasing mass order
    pub fn peaks(&self) -> &[(u64, f64)] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, (u64, f64)> {
        self.peaks.iter()
    }

    pub fn total_probability(&self) -> f64 {
        self.peaks.iter().map(|(_, p)| p).sum()
    }

    /// The most probable peak, the lightest one on ties
    pub fn most_abundant(&self) -> Option<(u64, f64)> {
        self.peaks
            .iter()
            .copied()
            .reduce(|best, peak| if peak.1 > best.1 { peak } else { best })
    }

    /// Scale the probabilities to sum to one
    pub fn renormalized(&self) -> Self {
        let total = self.total_probability();
        if total <= 0.0 {
            return self.clone();
        }
        Self {
            peaks: self.peaks.iter().map(|(m, p)| (*m, p / total)).collect(),
        }
    }

    /// Drop the trailing peaks whose probability is below `threshold`
    pub fn trimmed(&self, threshold: f64) -> Self {
        let keep = self
            .peaks
            .iter()
            .rposition(|(_, p)| *p >= threshold)
            .map(|i| i + 1)
            .unwrap_or(0);
        Self {
            peaks: self.peaks[..keep].to_vec(),
        }
    }

    /// The probability weighted nominal mass
    pub fn average_mass(&self) -> f64 {
        let total = self.total_probability();
        if total <= 0.0 {
            return 0.0;
        }
        self.peaks
            .iter()
            .map(|(m, p)| *m as f64 * p)
            .sum::<f64>()
            / total
    }
}

impl<'a> IntoIterator for &'a IsotopeDistribution {
    type Item = &'a (u64, f64);
    type IntoIter = slice::Iter<'a, (u64, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chemistry::FormulaError;

    #[test_log::test]
    fn test_single_carbon() {
        let formula = ElementalFormula::from_counts(&[(Element::C, 1)]);
        let dist = formula.isotope_distribution(4);
        assert_eq!(
            dist.peaks(),
            &[(12, 0.9893), (13, 0.0107), (14, 0.0), (15, 0.0)]
        );
    }

    #[test_log::test]
    fn test_exact_length_and_spacing() -> Result<(), FormulaError> {
        let formula: ElementalFormula = "C44H67N13O15".parse()?;
        for n in [1, 2, 5, 20, 60] {
            let dist = formula.isotope_distribution(n);
            assert_eq!(dist.len(), n);
            assert_eq!(dist.peaks()[0].0, 12 * 44 + 67 + 14 * 13 + 16 * 15);
            assert!(dist.peaks().windows(2).all(|w| w[1].0 == w[0].0 + 1));
            assert!(dist.total_probability() <= 1.0 + 1e-12);
        }
        assert!(formula.isotope_distribution(0).is_empty());

        let short = formula.isotope_distribution(3);
        let long = formula.isotope_distribution(10);
        for (a, b) in short.iter().zip(long.iter()) {
            assert!((a.1 - b.1).abs() < 1e-15);
        }
        assert!(long.total_probability() > 0.999);
        assert!(long.total_probability() > short.total_probability());
        Ok(())
    }

    #[test_log::test]
    fn test_known_pattern() -> Result<(), FormulaError> {
        let formula: ElementalFormula = "C44H67N13O15".parse()?;
        let dist = formula.isotope_distribution(3).renormalized();
        let mono = dist.peaks()[0].1;
        assert!((mono - 0.5851).abs() < 1e-3, "{mono}");
        assert_eq!(dist.most_abundant().unwrap().0, 1017);

        let bromine = ElementalFormula::from_counts(&[(Element::Br, 2)]);
        let dist = bromine.isotope_distribution(5);
        assert_eq!(dist.most_abundant().unwrap().0, 160);
        assert!(dist.peaks()[1].1 == 0.0);
        Ok(())
    }

    #[test_log::test]
    fn test_negative_counts_skipped() -> Result<(), FormulaError> {
        let formula: ElementalFormula = "C2H-1".parse()?;
        let dist = formula.isotope_distribution(2);
        assert_eq!(dist.peaks()[0].0, 24);

        let charged: ElementalFormula = "C2+2".parse()?;
        assert_eq!(
            charged.isotope_distribution(3),
            ElementalFormula::from_counts(&[(Element::C, 2)]).isotope_distribution(3)
        );
        Ok(())
    }

    #[test_log::test]
    fn test_huge_counts() -> Result<(), FormulaError> {
        let formula: ElementalFormula = "C400000000".parse()?;
        let dist = formula.isotope_distribution(2);
        assert_eq!(dist.len(), 2);
        assert_eq!(dist.peaks()[0].0, 4_800_000_000);
        assert_eq!(dist.peaks()[1].0, 4_800_000_001);
        assert!(dist.iter().all(|(_, p)| p.is_finite() && *p >= 0.0));

        let formula = ElementalFormula::from_counts(&[(Element::I, i32::MAX), (Element::C, i32::MAX)]);
        let dist = formula.isotope_distribution(3);
        assert_eq!(dist.peaks()[0].0, (127 + 12) * i32::MAX as u64);
        Ok(())
    }

    #[test_log::test]
    fn test_helpers() {
        let formula = ElementalFormula::from_counts(&[(Element::C, 10)]);
        let dist = formula.isotope_distribution(8);
        let trimmed = dist.trimmed(1e-6);
        assert!(trimmed.len() < dist.len());
        assert!(trimmed.len() >= 3);
        assert!((dist.renormalized().total_probability() - 1.0).abs() < 1e-12);
        let average = dist.average_mass();
        assert!(average > 120.0 && average < 121.0, "{average}");
        assert!(IsotopeDistribution::default().most_abundant().is_none());
    }
}
