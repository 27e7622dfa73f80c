use std::fmt::Display;
use std::slice;
use std::str::FromStr;

use super::element::Element::{self, C, H, N, O};
use super::formula::ElementalFormula;
use super::isotopes::IsotopeDistribution;
use super::modification::Modification;
use super::residue::AminoAcid;
use super::{ModificationError, SequenceError};

/// The kinds of (sub)sequence a formula can be computed for, each adding a different
/// terminal group to the sum of its residues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FragmentType {
    /// The intact molecule with both termini
    #[default]
    Full,
    /// The residues alone
    Internal,
    NTerminal,
    CTerminal,
    AIon,
    BIon,
    CIon,
    XIon,
    YIon,
    ZIon,
}

impl FragmentType {
    pub const ALL: [FragmentType; 10] = [
        Self::Full,
        Self::Internal,
        Self::NTerminal,
        Self::CTerminal,
        Self::AIon,
        Self::BIon,
        Self::CIon,
        Self::XIon,
        Self::YIon,
        Self::ZIon,
    ];

    const fn composition(&self) -> &'static [(Element, i32)] {
        match self {
            Self::Full => &[(H, 2), (O, 1)],
            Self::Internal => &[],
            Self::NTerminal => &[(H, 1)],
            Self::CTerminal => &[(O, 1), (H, 1)],
            Self::AIon => &[(C, -1), (O, -1)],
            Self::BIon => &[],
            Self::CIon => &[(H, 3), (N, 1)],
            Self::XIon => &[(C, 1), (O, 2)],
            Self::YIon => &[(H, 2), (O, 1)],
            Self::ZIon => &[(H, -1), (N, -1), (O, 1)],
        }
    }

    /// The neutral terminal group added to the residue sum
    pub fn delta(&self) -> ElementalFormula {
        ElementalFormula::from_counts(self.composition())
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Internal => "internal",
            Self::NTerminal => "n-terminal",
            Self::CTerminal => "c-terminal",
            Self::AIon => "a",
            Self::BIon => "b",
            Self::CIon => "c",
            Self::XIon => "x",
            Self::YIon => "y",
            Self::ZIon => "z",
        }
    }
}

impl Display for FragmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FragmentType {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == lowered)
            .ok_or_else(|| SequenceError::UnknownFragmentType(s.to_string()))
    }
}

/// A residue of a sequence and the modification placed on it, if any
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencePosition {
    pub residue: AminoAcid,
    pub modification: Option<&'static Modification>,
}

impl SequencePosition {
    pub fn new(residue: AminoAcid) -> Self {
        Self {
            residue,
            modification: None,
        }
    }

    pub fn formula(&self) -> ElementalFormula {
        let mut formula = self.residue.formula();
        if let Some(modification) = self.modification {
            formula += modification.delta();
        }
        formula
    }
}

/**
A peptide: an ordered list of residues, each optionally modified, and optional
modifications on either terminus.

Sequences are written with one letter residue codes, a modification name in parentheses
after the residue it modifies, and terminal modifications set off by a period:

```
use mzkit::chemistry::{FragmentType, PeptideSequence};

let peptide: PeptideSequence = ".(Acetyl)DFPIAM(Oxidation)GER".parse().unwrap();
assert_eq!(peptide.len(), 9);
assert_eq!(peptide.to_string(), ".(Acetyl)DFPIAM(Oxidation)GER");

let y3 = peptide.suffix(3).unwrap();
assert_eq!(y3.to_string(), "GER");
let mz = y3.mz(FragmentType::YIon, 1);
assert!((mz - 361.18301).abs() < 1e-4);
```
*/
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeptideSequence {
    positions: Vec<SequencePosition>,
    n_terminal_modification: Option<&'static Modification>,
    c_terminal_modification: Option<&'static Modification>,
}

fn read_modification_name<'a>(
    text: &'a str,
    open: usize,
) -> Result<(&'a str, usize), SequenceError> {
    let body = &text[open + 1..];
    match body.find(')') {
        Some(close) if close > 0 => Ok((&body[..close], open + 1 + close + 1)),
        _ => Err(SequenceError::Malformed {
            text: text.to_string(),
            position: open,
        }),
    }
}

impl PeptideSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an unmodified sequence from residues
    pub fn from_residues<I: IntoIterator<Item = AminoAcid>>(residues: I) -> Self {
        Self {
            positions: residues.into_iter().map(SequencePosition::new).collect(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, SequencePosition> {
        self.positions.iter()
    }

    pub fn residue(&self, index: usize) -> Option<AminoAcid> {
        self.positions.get(index).map(|p| p.residue)
    }

    pub fn modification(&self, index: usize) -> Option<&'static Modification> {
        self.positions.get(index).and_then(|p| p.modification)
    }

    pub fn n_terminal_modification(&self) -> Option<&'static Modification> {
        self.n_terminal_modification
    }

    pub fn c_terminal_modification(&self) -> Option<&'static Modification> {
        self.c_terminal_modification
    }

    /// Whether any residue or terminus carries a modification
    pub fn is_modified(&self) -> bool {
        self.n_terminal_modification.is_some()
            || self.c_terminal_modification.is_some()
            || self.positions.iter().any(|p| p.modification.is_some())
    }

    fn check_position(&self, position: usize) -> Result<(), SequenceError> {
        if position >= self.len() {
            Err(SequenceError::OutOfRange {
                start: position,
                end: position + 1,
                len: self.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Place the modification `name` on the residue at `position`, replacing any
    /// modification already there. The sequence is unchanged when this fails.
    pub fn set_modification(&mut self, position: usize, name: &str) -> Result<(), SequenceError> {
        let modification = Modification::lookup(name)?;
        self.check_position(position)?;
        let residue = self.positions[position].residue;
        if !modification.allows_residue(residue, position == 0) {
            return Err(ModificationError::SiteNotAllowed {
                name: modification.name.to_string(),
                site: residue.to_string(),
            }
            .into());
        }
        self.positions[position].modification = Some(modification);
        Ok(())
    }

    /// Remove and return the modification of the residue at `position`
    pub fn clear_modification(
        &mut self,
        position: usize,
    ) -> Result<Option<&'static Modification>, SequenceError> {
        self.check_position(position)?;
        Ok(self.positions[position].modification.take())
    }

    pub fn set_n_terminal_modification(&mut self, name: &str) -> Result<(), SequenceError> {
        let modification = Modification::lookup(name)?;
        if !modification.allows_n_terminus() {
            return Err(ModificationError::SiteNotAllowed {
                name: modification.name.to_string(),
                site: "N-term".to_string(),
            }
            .into());
        }
        self.n_terminal_modification = Some(modification);
        Ok(())
    }

    pub fn set_c_terminal_modification(&mut self, name: &str) -> Result<(), SequenceError> {
        let modification = Modification::lookup(name)?;
        if !modification.allows_c_terminus() {
            return Err(ModificationError::SiteNotAllowed {
                name: modification.name.to_string(),
                site: "C-term".to_string(),
            }
            .into());
        }
        self.c_terminal_modification = Some(modification);
        Ok(())
    }

    pub fn clear_n_terminal_modification(&mut self) -> Option<&'static Modification> {
        self.n_terminal_modification.take()
    }

    pub fn clear_c_terminal_modification(&mut self) -> Option<&'static Modification> {
        self.c_terminal_modification.take()
    }

    /// Copy the residues in `start..end` into a new sequence.
    ///
    /// Residue modifications inside the range are kept. The N-terminal modification is kept
    /// only when `start` is zero and the C-terminal one only when `end` is the length of
    /// the sequence.
    pub fn subsequence(&self, start: usize, end: usize) -> Result<Self, SequenceError> {
        if start > end || end > self.len() {
            return Err(SequenceError::OutOfRange {
                start,
                end,
                len: self.len(),
            });
        }
        Ok(Self {
            positions: self.positions[start..end].to_vec(),
            n_terminal_modification: if start == 0 {
                self.n_terminal_modification
            } else {
                None
            },
            c_terminal_modification: if end == self.len() {
                self.c_terminal_modification
            } else {
                None
            },
        })
    }

    /// The first `size` residues
    pub fn prefix(&self, size: usize) -> Result<Self, SequenceError> {
        self.subsequence(0, size)
    }

    /// The last `size` residues
    pub fn suffix(&self, size: usize) -> Result<Self, SequenceError> {
        let start = self
            .len()
            .checked_sub(size)
            .ok_or(SequenceError::OutOfRange {
                start: 0,
                end: size,
                len: self.len(),
            })?;
        self.subsequence(start, self.len())
    }

    /// The elemental formula of this sequence as `fragment` carrying `charge` extra protons
    pub fn formula(&self, fragment: FragmentType, charge: i32) -> ElementalFormula {
        let mut formula = fragment.delta();
        for position in self.positions.iter() {
            formula += position.formula();
        }
        if let Some(modification) = self.n_terminal_modification {
            formula += modification.delta();
        }
        if let Some(modification) = self.c_terminal_modification {
            formula += modification.delta();
        }
        formula.set_charge(charge);
        formula
    }

    pub fn monoisotopic_mass(&self, fragment: FragmentType, charge: i32) -> f64 {
        self.formula(fragment, charge).monoisotopic_mass()
    }

    pub fn average_mass(&self, fragment: FragmentType, charge: i32) -> f64 {
        self.formula(fragment, charge).average_mass()
    }

    pub fn mz(&self, fragment: FragmentType, charge: i32) -> f64 {
        self.formula(fragment, charge).mz()
    }

    /// The isotope pattern of the intact, neutral sequence
    pub fn isotope_distribution(&self, n: usize) -> IsotopeDistribution {
        self.formula(FragmentType::Full, 0).isotope_distribution(n)
    }
}

impl FromStr for PeptideSequence {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let malformed = |position: usize| SequenceError::Malformed {
            text: text.to_string(),
            position,
        };
        let mut sequence = Self::new();
        let mut position = 0;

        if text.starts_with(".(") {
            let (name, next) = read_modification_name(text, 1)?;
            sequence.set_n_terminal_modification(name)?;
            position = next;
        }

        let bytes = text.as_bytes();
        while position < text.len() {
            match bytes[position] {
                b'(' => {
                    let Some(last) = sequence.len().checked_sub(1) else {
                        return Err(malformed(position));
                    };
                    if sequence.positions[last].modification.is_some() {
                        return Err(malformed(position));
                    }
                    let (name, next) = read_modification_name(text, position)?;
                    sequence.set_modification(last, name)?;
                    position = next;
                }
                b'.' => {
                    if bytes.get(position + 1) != Some(&b'(') {
                        return Err(malformed(position));
                    }
                    let (name, next) = read_modification_name(text, position + 1)?;
                    if next != text.len() {
                        return Err(malformed(next));
                    }
                    sequence.set_c_terminal_modification(name)?;
                    position = next;
                }
                _ => {
                    let Some(code) = text[position..].chars().next() else {
                        return Err(malformed(position));
                    };
                    let residue = AminoAcid::from_code(code).ok_or(
                        SequenceError::UnknownResidue {
                            residue: code,
                            position,
                        },
                    )?;
                    sequence.positions.push(SequencePosition::new(residue));
                    position += code.len_utf8();
                }
            }
        }
        Ok(sequence)
    }
}

impl Display for PeptideSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(modification) = self.n_terminal_modification {
            write!(f, ".({modification})")?;
        }
        for position in self.positions.iter() {
            write!(f, "{}", position.residue)?;
            if let Some(modification) = position.modification {
                write!(f, "({modification})")?;
            }
        }
        if let Some(modification) = self.c_terminal_modification {
            write!(f, ".({modification})")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a PeptideSequence {
    type Item = &'a SequencePosition;
    type IntoIter = slice::Iter<'a, SequencePosition>;

    fn into_iter(self) -> Self::IntoIter {
        self.positions.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::PROTON;

    #[test]
    fn test_full_formula_and_mass() -> Result<(), SequenceError> {
        let peptide: PeptideSequence = "DFPIANGER".parse()?;
        let formula = peptide.formula(FragmentType::Full, 0);
        assert_eq!(formula.to_string(), "C44H67N13O15");
        assert!((peptide.monoisotopic_mass(FragmentType::Full, 0) - 1017.48796).abs() < 1e-4);
        assert!((peptide.mz(FragmentType::Full, 2) - 509.75126).abs() < 1e-4);
        assert!((peptide.mz(FragmentType::BIon, 1) - 1000.48467).abs() < 1e-4);
        assert!(peptide.average_mass(FragmentType::Full, 0) > 1017.48796);

        let peptide: PeptideSequence = "PEPTIDE".parse()?;
        assert_eq!(
            peptide.formula(FragmentType::Full, 0).to_string(),
            "C34H53N7O15"
        );
        assert!((peptide.monoisotopic_mass(FragmentType::Full, 0) - 799.35996).abs() < 1e-4);

        let glycine: PeptideSequence = "G".parse()?;
        assert!((glycine.monoisotopic_mass(FragmentType::Full, 0) - 75.03203).abs() < 1e-4);
        let lysine: PeptideSequence = "K".parse()?;
        assert!((lysine.monoisotopic_mass(FragmentType::Full, 0) - 146.10553).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_charge_adds_protons() -> Result<(), SequenceError> {
        let peptide: PeptideSequence = ".(Acetyl)PEPTM(Oxidation)IDEK".parse()?;
        for fragment in FragmentType::ALL {
            for charge in 0..4 {
                let delta = peptide.monoisotopic_mass(fragment, charge + 1)
                    - peptide.monoisotopic_mass(fragment, charge);
                assert!((delta - PROTON).abs() < 1e-9, "{fragment} {charge}");
            }
            assert_eq!(peptide.formula(fragment, 3).charge(), 3);
        }
        Ok(())
    }

    #[test]
    fn test_fragment_deltas() -> Result<(), SequenceError> {
        let peptide: PeptideSequence = "SAMPLER".parse()?;
        let residues = peptide.monoisotopic_mass(FragmentType::Internal, 0);
        let b = peptide.monoisotopic_mass(FragmentType::BIon, 0);
        let a = peptide.monoisotopic_mass(FragmentType::AIon, 0);
        let y = peptide.monoisotopic_mass(FragmentType::YIon, 0);
        let full = peptide.monoisotopic_mass(FragmentType::Full, 0);
        assert_eq!(b, residues);
        assert!((b - a - 27.994915).abs() < 1e-5);
        assert_eq!(y, full);
        assert!((peptide.monoisotopic_mass(FragmentType::CIon, 0) - b - 17.026549).abs() < 1e-5);
        assert!(
            (peptide.monoisotopic_mass(FragmentType::NTerminal, 0)
                + peptide.monoisotopic_mass(FragmentType::CTerminal, 0)
                - 2.0 * residues
                - 18.010565)
                .abs()
                < 1e-5
        );

        let arg: PeptideSequence = "R".parse()?;
        assert!((arg.mz(FragmentType::YIon, 1) - 175.11895).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_oxidation_increases_mass() -> Result<(), SequenceError> {
        let plain: PeptideSequence = "PEPTIDEM".parse()?;
        let mut oxidized = plain.clone();
        oxidized.set_modification(7, "Oxidation")?;
        assert!(oxidized.is_modified());
        assert!(!plain.is_modified());
        for fragment in FragmentType::ALL {
            let shift = oxidized.monoisotopic_mass(fragment, 1) - plain.monoisotopic_mass(fragment, 1);
            assert!((shift - 15.994915).abs() < 1e-5);

            let before = plain.formula(fragment, 1);
            let after = oxidized.formula(fragment, 1);
            assert_eq!(after.count(O), before.count(O) + 1);
            for element in Element::ALL.into_iter().filter(|e| *e != O) {
                assert_eq!(after.count(element), before.count(element), "{fragment} {element}");
            }
            assert_eq!(after.clone() - before.clone(), ElementalFormula::from_counts(&[(O, 1)]));
        }
        assert_eq!(oxidized.to_string(), "PEPTIDEM(Oxidation)");
        assert_eq!(
            oxidized.clear_modification(7)?.map(|m| m.name),
            Some("Oxidation")
        );
        assert_eq!(oxidized, plain);
        Ok(())
    }

    #[test]
    fn test_rejected_modifications_leave_sequence_unchanged() -> Result<(), SequenceError> {
        let mut peptide: PeptideSequence = "PEPTIDEM".parse()?;
        let before = peptide.clone();
        assert_eq!(
            peptide.set_modification(7, "Oxydation"),
            Err(SequenceError::ModificationError(ModificationError::Unknown(
                "Oxydation".into()
            )))
        );
        assert!(matches!(
            peptide.set_modification(1, "Oxidation"),
            Err(SequenceError::ModificationError(ModificationError::SiteNotAllowed { .. }))
        ));
        assert!(matches!(
            peptide.set_modification(8, "Oxidation"),
            Err(SequenceError::OutOfRange { .. })
        ));
        assert!(peptide.set_n_terminal_modification("Amidated").is_err());
        assert!(peptide.set_c_terminal_modification("Acetyl").is_err());
        assert_eq!(peptide, before);

        let mut pyro: PeptideSequence = "QPEPTIDEQ".parse()?;
        pyro.set_modification(0, "Gln->pyro-Glu")?;
        assert!(pyro.set_modification(8, "Gln->pyro-Glu").is_err());
        Ok(())
    }

    #[test]
    fn test_subsequence() -> Result<(), SequenceError> {
        let peptide: PeptideSequence = ".(Acetyl)PEPTK(Acetyl)IDEK.(Amidated)".parse()?;
        assert_eq!(peptide.len(), 9);

        let middle = peptide.subsequence(2, 6)?;
        assert_eq!(middle.to_string(), "PTK(Acetyl)I");
        assert!(middle.n_terminal_modification().is_none());
        assert!(middle.c_terminal_modification().is_none());

        let head = peptide.prefix(3)?;
        assert_eq!(head.to_string(), ".(Acetyl)PEP");
        let tail = peptide.suffix(4)?;
        assert_eq!(tail.to_string(), "IDEK.(Amidated)");
        assert_eq!(peptide.subsequence(0, peptide.len())?, peptide);
        assert!(peptide.subsequence(4, 4)?.is_empty());

        // The internal pieces add up to the whole
        let split = peptide.prefix(5)?.formula(FragmentType::Internal, 0)
            + peptide.subsequence(5, 9)?.formula(FragmentType::Internal, 0);
        assert_eq!(split, peptide.formula(FragmentType::Internal, 0));

        assert!(matches!(
            peptide.subsequence(5, 3),
            Err(SequenceError::OutOfRange { start: 5, end: 3, len: 9 })
        ));
        assert!(peptide.subsequence(0, 10).is_err());
        assert!(peptide.suffix(10).is_err());

        let mut copy = peptide.subsequence(0, 5)?;
        copy.clear_modification(4)?;
        assert!(peptide.modification(4).is_some());
        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "PEPXTIDE".parse::<PeptideSequence>(),
            Err(SequenceError::UnknownResidue {
                residue: 'X',
                position: 3
            })
        );
        assert!(matches!(
            "PEPM(Foo)".parse::<PeptideSequence>(),
            Err(SequenceError::ModificationError(ModificationError::Unknown(_)))
        ));
        assert!(matches!(
            "(Oxidation)M".parse::<PeptideSequence>(),
            Err(SequenceError::Malformed { position: 0, .. })
        ));
        assert!(matches!(
            "PEPM(Oxidation".parse::<PeptideSequence>(),
            Err(SequenceError::Malformed { .. })
        ));
        assert!(matches!(
            "PEPM(Oxidation)(Oxidation)".parse::<PeptideSequence>(),
            Err(SequenceError::Malformed { .. })
        ));
        assert!(matches!(
            "PEP.(Amidated)K".parse::<PeptideSequence>(),
            Err(SequenceError::Malformed { .. })
        ));
        assert!(matches!(
            "pep".parse::<PeptideSequence>(),
            Err(SequenceError::UnknownResidue { residue: 'p', .. })
        ));
        assert!("".parse::<PeptideSequence>().unwrap().is_empty());
    }

    #[test]
    fn test_fragment_type_names() {
        for fragment in FragmentType::ALL {
            assert_eq!(fragment.name().parse::<FragmentType>().unwrap(), fragment);
        }
        assert_eq!("Y".parse::<FragmentType>().unwrap(), FragmentType::YIon);
        assert!("q".parse::<FragmentType>().is_err());
    }
}
