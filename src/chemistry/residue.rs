use std::fmt::Display;

use super::element::Element::{self, C, H, N, O, S, Se};
use super::formula::ElementalFormula;

/// The proteinogenic amino acids, including selenocysteine and pyrrolysine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AminoAcid {
    Alanine,
    Arginine,
    Asparagine,
    AsparticAcid,
    Cysteine,
    GlutamicAcid,
    Glutamine,
    Glycine,
    Histidine,
    Isoleucine,
    Leucine,
    Lysine,
    Methionine,
    Phenylalanine,
    Proline,
    Serine,
    Threonine,
    Tryptophan,
    Tyrosine,
    Valine,
    Selenocysteine,
    Pyrrolysine,
}

impl AminoAcid {
    pub const ALL: [AminoAcid; 22] = [
        Self::Alanine,
        Self::Arginine,
        Self::Asparagine,
        Self::AsparticAcid,
        Self::Cysteine,
        Self::GlutamicAcid,
        Self::Glutamine,
        Self::Glycine,
        Self::Histidine,
        Self::Isoleucine,
        Self::Leucine,
        Self::Lysine,
        Self::Methionine,
        Self::Phenylalanine,
        Self::Proline,
        Self::Serine,
        Self::Threonine,
        Self::Tryptophan,
        Self::Tyrosine,
        Self::Valine,
        Self::Selenocysteine,
        Self::Pyrrolysine,
    ];

    pub const fn one_letter_code(&self) -> char {
        match self {
            Self::Alanine => 'A',
            Self::Arginine => 'R',
            Self::Asparagine => 'N',
            Self::AsparticAcid => 'D',
            Self::Cysteine => 'C',
            Self::GlutamicAcid => 'E',
            Self::Glutamine => 'Q',
            Self::Glycine => 'G',
            Self::Histidine => 'H',
            Self::Isoleucine => 'I',
            Self::Leucine => 'L',
            Self::Lysine => 'K',
            Self::Methionine => 'M',
            Self::Phenylalanine => 'F',
            Self::Proline => 'P',
            Self::Serine => 'S',
            Self::Threonine => 'T',
            Self::Tryptophan => 'W',
            Self::Tyrosine => 'Y',
            Self::Valine => 'V',
            Self::Selenocysteine => 'U',
            Self::Pyrrolysine => 'O',
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Alanine => "Alanine",
            Self::Arginine => "Arginine",
            Self::Asparagine => "Asparagine",
            Self::AsparticAcid => "Aspartic acid",
            Self::Cysteine => "Cysteine",
            Self::GlutamicAcid => "Glutamic acid",
            Self::Glutamine => "Glutamine",
            Self::Glycine => "Glycine",
            Self::Histidine => "Histidine",
            Self::Isoleucine => "Isoleucine",
            Self::Leucine => "Leucine",
            Self::Lysine => "Lysine",
            Self::Methionine => "Methionine",
            Self::Phenylalanine => "Phenylalanine",
            Self::Proline => "Proline",
            Self::Serine => "Serine",
            Self::Threonine => "Threonine",
            Self::Tryptophan => "Tryptophan",
            Self::Tyrosine => "Tyrosine",
            Self::Valine => "Valine",
            Self::Selenocysteine => "Selenocysteine",
            Self::Pyrrolysine => "Pyrrolysine",
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|aa| aa.one_letter_code() == code)
    }

    /// The composition of the residue inside a chain, the free amino acid minus water
    pub const fn composition(&self) -> &'static [(Element, i32)] {
        match self {
            Self::Alanine => &[(C, 3), (H, 5), (N, 1), (O, 1)],
            Self::Arginine => &[(C, 6), (H, 12), (N, 4), (O, 1)],
            Self::Asparagine => &[(C, 4), (H, 6), (N, 2), (O, 2)],
            Self::AsparticAcid => &[(C, 4), (H, 5), (N, 1), (O, 3)],
            Self::Cysteine => &[(C, 3), (H, 5), (N, 1), (O, 1), (S, 1)],
            Self::GlutamicAcid => &[(C, 5), (H, 7), (N, 1), (O, 3)],
            Self::Glutamine => &[(C, 5), (H, 8), (N, 2), (O, 2)],
            Self::Glycine => &[(C, 2), (H, 3), (N, 1), (O, 1)],
            Self::Histidine => &[(C, 6), (H, 7), (N, 3), (O, 1)],
            Self::Isoleucine | Self::Leucine => &[(C, 6), (H, 11), (N, 1), (O, 1)],
            Self::Lysine => &[(C, 6), (H, 12), (N, 2), (O, 1)],
            Self::Methionine => &[(C, 5), (H, 9), (N, 1), (O, 1), (S, 1)],
            Self::Phenylalanine => &[(C, 9), (H, 9), (N, 1), (O, 1)],
            Self::Proline => &[(C, 5), (H, 7), (N, 1), (O, 1)],
            Self::Serine => &[(C, 3), (H, 5), (N, 1), (O, 2)],
            Self::Threonine => &[(C, 4), (H, 7), (N, 1), (O, 2)],
            Self::Tryptophan => &[(C, 11), (H, 10), (N, 2), (O, 1)],
            Self::Tyrosine => &[(C, 9), (H, 9), (N, 1), (O, 2)],
            Self::Valine => &[(C, 5), (H, 9), (N, 1), (O, 1)],
            Self::Selenocysteine => &[(C, 3), (H, 5), (N, 1), (O, 1), (Se, 1)],
            Self::Pyrrolysine => &[(C, 12), (H, 19), (N, 3), (O, 2)],
        }
    }

    pub fn formula(&self) -> ElementalFormula {
        ElementalFormula::from_counts(self.composition())
    }

    pub fn monoisotopic_mass(&self) -> f64 {
        self.formula().monoisotopic_mass()
    }
}

impl Display for AminoAcid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.one_letter_code())
    }
}

impl TryFrom<char> for AminoAcid {
    type Error = char;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        Self::from_code(value).ok_or(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_codes() {
        for aa in AminoAcid::ALL {
            assert_eq!(AminoAcid::from_code(aa.one_letter_code()), Some(aa));
        }
        assert_eq!(AminoAcid::try_from('X'), Err('X'));
        assert_eq!(AminoAcid::try_from('W'), Ok(AminoAcid::Tryptophan));
        assert_eq!(AminoAcid::AsparticAcid.name(), "Aspartic acid");
    }

    #[test]
    fn test_residue_masses() {
        let expected = [
            ('G', 57.02146),
            ('A', 71.03711),
            ('S', 87.03203),
            ('P', 97.05276),
            ('K', 128.09496),
            ('M', 131.04049),
            ('W', 186.07931),
            ('R', 156.10111),
        ];
        for (code, mass) in expected {
            let aa = AminoAcid::from_code(code).unwrap();
            assert!((aa.monoisotopic_mass() - mass).abs() < 1e-4, "{code}");
        }
        assert_eq!(
            AminoAcid::Leucine.formula(),
            AminoAcid::Isoleucine.formula()
        );
    }
}
