use std::collections::btree_map::{self, BTreeMap};
use std::fmt::Display;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use super::element::Element;
use super::isotopes::IsotopeDistribution;
use super::FormulaError;
use crate::utils::{mass_charge_ratio, PROTON};

fn element_token() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([A-Z][a-z]?)(-?\d+)?").unwrap())
}

fn charge_suffix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([+-])(\d*)$").unwrap())
}

/**
An elemental composition with signed element counts and a charge, expressed as a number
of added protons.

Formulas are written in Hill notation, carbon and hydrogen first and everything else in
alphabetical order, with the charge as a signed suffix:

```
use mzkit::chemistry::ElementalFormula;

let water: ElementalFormula = "H2O".parse().unwrap();
let glucose: ElementalFormula = "C6H12O6".parse().unwrap();
assert_eq!((glucose - water.clone()).to_string(), "C6H10O5");

let ion: ElementalFormula = "H2O+2".parse().unwrap();
assert_eq!(ion.charge(), 2);
assert!((ion.mz() - (water.monoisotopic_mass() + 2.0 * 1.00727646677) / 2.0).abs() < 1e-9);
```

A negative number directly after an element symbol is that element's count, so `H2O-1` is
`H2` minus one oxygen. To write a negative charge after a single atom, give the count
explicitly, as in `H2O1-1`, which is also how such formulas are displayed.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementalFormula {
    composition: BTreeMap<Element, i32>,
    charge: i32,
}

impl ElementalFormula {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: &[(Element, i32)]) -> Self {
        let mut inst = Self::new();
        for (element, count) in counts {
            inst.add_element(*element, *count);
        }
        inst
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = charge;
        self
    }

    /// The number of protons added to the neutral composition
    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn set_charge(&mut self, charge: i32) {
        self.charge = charge;
    }

    /// Add `count` atoms of `element`, dropping the element when its count reaches zero
    pub fn add_element(&mut self, element: Element, count: i32) {
        if count == 0 {
            return;
        }
        let entry = self.composition.entry(element).or_insert(0);
        *entry = entry.saturating_add(count);
        if *entry == 0 {
            self.composition.remove(&element);
        }
    }

    pub fn count(&self, element: Element) -> i32 {
        self.composition.get(&element).copied().unwrap_or_default()
    }

    /// Whether there are no elements, regardless of the charge
    pub fn is_empty(&self) -> bool {
        self.composition.is_empty()
    }

    /// The number of distinct elements
    pub fn len(&self) -> usize {
        self.composition.len()
    }

    /// Iterate over the elements and their counts in Hill order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.composition.iter(),
        }
    }

    fn neutral_monoisotopic_mass(&self) -> f64 {
        self.iter()
            .map(|(element, count)| element.monoisotopic_mass() * count as f64)
            .sum()
    }

    /// The sum of the most abundant isotope masses of every atom plus the mass of the
    /// added protons
    pub fn monoisotopic_mass(&self) -> f64 {
        self.neutral_monoisotopic_mass() + self.charge as f64 * PROTON
    }

    pub fn average_mass(&self) -> f64 {
        self.iter()
            .map(|(element, count)| element.average_mass() * count as f64)
            .sum::<f64>()
            + self.charge as f64 * PROTON
    }

    /// The monoisotopic mass over the charge, or the mass itself when uncharged
    pub fn mz(&self) -> f64 {
        let mass = self.neutral_monoisotopic_mass();
        if self.charge == 0 {
            mass
        } else {
            mass_charge_ratio(mass, self.charge)
        }
    }

    /// The first `n` peaks of the isotope pattern, see [`IsotopeDistribution::from_formula`]
    pub fn isotope_distribution(&self, n: usize) -> IsotopeDistribution {
        IsotopeDistribution::from_formula(self, n)
    }
}

pub struct Iter<'a> {
    inner: btree_map::Iter<'a, Element, i32>,
}

impl Iterator for Iter<'_> {
    type Item = (Element, i32);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(e, c)| (*e, *c))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a> IntoIterator for &'a ElementalFormula {
    type Item = (Element, i32);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<(Element, i32)> for ElementalFormula {
    fn from_iter<T: IntoIterator<Item = (Element, i32)>>(iter: T) -> Self {
        let mut inst = Self::new();
        for (element, count) in iter {
            inst.add_element(element, count);
        }
        inst
    }
}

impl FromStr for ElementalFormula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let mut formula = Self::new();
        let mut position = 0;
        for caps in element_token().captures_iter(text) {
            let Some(token) = caps.get(0) else { continue };
            if token.start() != position {
                break;
            }
            let element: Element = caps[1].parse()?;
            let count = match caps.get(2) {
                Some(count) => count.as_str().parse::<i32>().map_err(|_| {
                    FormulaError::Malformed {
                        text: text.to_string(),
                        position: count.start(),
                    }
                })?,
                None => 1,
            };
            if formula.count(element).checked_add(count).is_none() {
                return Err(FormulaError::Malformed {
                    text: text.to_string(),
                    position: token.start(),
                });
            }
            formula.add_element(element, count);
            position = token.end();
        }

        let rest = &text[position..];
        if !rest.is_empty() {
            let malformed = || FormulaError::Malformed {
                text: text.to_string(),
                position,
            };
            let caps = charge_suffix().captures(rest).ok_or_else(malformed)?;
            let magnitude = if caps[2].is_empty() {
                1
            } else {
                caps[2].parse::<i32>().map_err(|_| malformed())?
            };
            formula.charge = if &caps[1] == "-" { -magnitude } else { magnitude };
        }
        Ok(formula)
    }
}

impl Display for ElementalFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last = self.composition.len().saturating_sub(1);
        for (i, (element, count)) in self.iter().enumerate() {
            f.write_str(element.symbol())?;
            if count != 1 || (i == last && self.charge < 0) {
                write!(f, "{count}")?;
            }
        }
        if self.charge != 0 {
            write!(f, "{:+}", self.charge)?;
        }
        Ok(())
    }
}

impl AddAssign<&ElementalFormula> for ElementalFormula {
    fn add_assign(&mut self, rhs: &ElementalFormula) {
        for (element, count) in rhs.iter() {
            self.add_element(element, count);
        }
        self.charge = self.charge.saturating_add(rhs.charge);
    }
}

impl AddAssign for ElementalFormula {
    fn add_assign(&mut self, rhs: ElementalFormula) {
        *self += &rhs;
    }
}

impl SubAssign<&ElementalFormula> for ElementalFormula {
    fn sub_assign(&mut self, rhs: &ElementalFormula) {
        for (element, count) in rhs.iter() {
            self.add_element(element, count.saturating_neg());
        }
        self.charge = self.charge.saturating_sub(rhs.charge);
    }
}

impl SubAssign for ElementalFormula {
    fn sub_assign(&mut self, rhs: ElementalFormula) {
        *self -= &rhs;
    }
}

impl Add<&ElementalFormula> for ElementalFormula {
    type Output = ElementalFormula;

    fn add(mut self, rhs: &ElementalFormula) -> Self::Output {
        self += rhs;
        self
    }
}

impl Add for ElementalFormula {
    type Output = ElementalFormula;

    fn add(mut self, rhs: ElementalFormula) -> Self::Output {
        self += &rhs;
        self
    }
}

impl Sub<&ElementalFormula> for ElementalFormula {
    type Output = ElementalFormula;

    fn sub(mut self, rhs: &ElementalFormula) -> Self::Output {
        self -= rhs;
        self
    }
}

impl Sub for ElementalFormula {
    type Output = ElementalFormula;

    fn sub(mut self, rhs: ElementalFormula) -> Self::Output {
        self -= &rhs;
        self
    }
}

impl Mul<i32> for ElementalFormula {
    type Output = ElementalFormula;

    fn mul(self, rhs: i32) -> Self::Output {
        if rhs == 0 {
            return Self::new();
        }
        Self {
            composition: self
                .composition
                .into_iter()
                .map(|(e, c)| (e, c.saturating_mul(rhs)))
                .collect(),
            charge: self.charge.saturating_mul(rhs),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() -> Result<(), FormulaError> {
        let glucose: ElementalFormula = "C6H12O6".parse()?;
        assert_eq!(glucose.count(Element::C), 6);
        assert_eq!(glucose.count(Element::H), 12);
        assert_eq!(glucose.count(Element::N), 0);
        assert_eq!(glucose.len(), 3);

        let ethanol: ElementalFormula = "C2H5OH".parse()?;
        assert_eq!(ethanol.count(Element::H), 6);
        assert_eq!(ethanol.to_string(), "C2H6O");

        let delta: ElementalFormula = "H-1N-1O1".parse()?;
        assert_eq!(delta.count(Element::H), -1);
        assert_eq!(delta.count(Element::O), 1);
        assert_eq!(delta.to_string(), "H-1N-1O");

        let selenium: ElementalFormula = "C3H5NOSe".parse()?;
        assert_eq!(selenium.count(Element::Se), 1);
        assert_eq!(selenium.count(Element::S), 0);

        assert!(ElementalFormula::from_str("")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_charge_suffix() -> Result<(), FormulaError> {
        let ion: ElementalFormula = "C6H12O6+".parse()?;
        assert_eq!(ion.charge(), 1);
        assert_eq!(ion.to_string(), "C6H12O6+1");
        let ion: ElementalFormula = "C6H12O6+2".parse()?;
        assert_eq!(ion.charge(), 2);
        let ion: ElementalFormula = "C6H12O6-1".parse()?;
        assert_eq!(ion.charge(), -1);
        assert_eq!(ion.count(Element::O), 6);

        let water = ElementalFormula::from_counts(&[(Element::H, 2), (Element::O, 1)]).with_charge(-1);
        assert_eq!(water.to_string(), "H2O1-1");
        assert_eq!(water.to_string().parse::<ElementalFormula>()?, water);
        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "C6Xx2".parse::<ElementalFormula>(),
            Err(FormulaError::UnknownElement(_))
        ));
        assert!(matches!(
            "C6H12O6?".parse::<ElementalFormula>(),
            Err(FormulaError::Malformed { position: 7, .. })
        ));
        assert!(matches!(
            "h2o".parse::<ElementalFormula>(),
            Err(FormulaError::Malformed { position: 0, .. })
        ));
        assert!(matches!(
            "C6H12O6+2+".parse::<ElementalFormula>(),
            Err(FormulaError::Malformed { .. })
        ));
    }

    #[test]
    fn test_arithmetic() -> Result<(), FormulaError> {
        let water: ElementalFormula = "H2O".parse()?;
        let glucose: ElementalFormula = "C6H12O6".parse()?;
        let residue = glucose.clone() - &water;
        assert_eq!(residue.to_string(), "C6H10O5");
        assert_eq!(residue.clone() + water.clone(), glucose);

        let mut acc = ElementalFormula::new();
        acc += &water;
        acc -= water.clone();
        assert!(acc.is_empty());
        assert_eq!(acc.len(), 0);

        assert_eq!((water.clone() * 3).to_string(), "H6O3");
        assert!((water.clone() * 0).is_empty());
        Ok(())
    }

    #[test]
    fn test_count_overflow() {
        assert!(matches!(
            "C2147483647C1".parse::<ElementalFormula>(),
            Err(FormulaError::Malformed { position: 11, .. })
        ));
        assert!(matches!(
            "C2147483648".parse::<ElementalFormula>(),
            Err(FormulaError::Malformed { .. })
        ));

        let mut formula = ElementalFormula::from_counts(&[(Element::C, i32::MAX)]);
        formula.add_element(Element::C, 5);
        assert_eq!(formula.count(Element::C), i32::MAX);
        let scaled = ElementalFormula::from_counts(&[(Element::H, 2)]) * i32::MAX;
        assert_eq!(scaled.count(Element::H), i32::MAX);
    }

    #[test]
    fn test_masses() -> Result<(), FormulaError> {
        let water: ElementalFormula = "H2O".parse()?;
        assert!((water.monoisotopic_mass() - 18.0105646837).abs() < 1e-6);
        assert!((water.average_mass() - 18.01528).abs() < 1e-3);
        assert_eq!(water.mz(), water.monoisotopic_mass());

        let peptide: ElementalFormula = "C44H67N13O15+2".parse()?;
        assert!((peptide.monoisotopic_mass() - (1017.48796 + 2.0 * PROTON)).abs() < 1e-4);
        assert!((peptide.mz() - 509.75126).abs() < 1e-4);
        Ok(())
    }
}
