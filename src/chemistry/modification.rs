use std::fmt::Display;

use super::element::Element::{self, C, H, N, Na, O, P, S};
use super::formula::ElementalFormula;
use super::residue::AminoAcid::{self, *};
use super::ModificationError;

/// A position a modification may be placed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationSite {
    /// Any residue of this kind
    Residue(AminoAcid),
    /// This residue when it is the first of the peptide
    NTermResidue(AminoAcid),
    /// The peptide N-terminus
    NTerm,
    /// The peptide C-terminus
    CTerm,
    ProteinNTerm,
    ProteinCTerm,
}

impl Display for ModificationSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Residue(aa) => write!(f, "{aa}"),
            Self::NTermResidue(aa) => write!(f, "N-term {aa}"),
            Self::NTerm => f.write_str("N-term"),
            Self::CTerm => f.write_str("C-term"),
            Self::ProteinNTerm => f.write_str("Protein N-term"),
            Self::ProteinCTerm => f.write_str("Protein C-term"),
        }
    }
}

/// A named chemical modification from the Unimod database
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modification {
    pub name: &'static str,
    pub accession: u32,
    delta: &'static [(Element, i32)],
    pub sites: &'static [ModificationSite],
}

use ModificationSite::{CTerm, NTerm, NTermResidue, ProteinCTerm, ProteinNTerm, Residue};

const fn modification(
    name: &'static str,
    accession: u32,
    delta: &'static [(Element, i32)],
    sites: &'static [ModificationSite],
) -> Modification {
    Modification {
        name,
        accession,
        delta,
        sites,
    }
}

/// The modifications that can be placed on a sequence
pub const MODIFICATIONS: [Modification; 21] = [
    modification(
        "Oxidation",
        35,
        &[(O, 1)],
        &[
            Residue(Methionine),
            Residue(Tryptophan),
            Residue(Histidine),
            Residue(Cysteine),
            Residue(Phenylalanine),
            Residue(Tyrosine),
            Residue(Proline),
        ],
    ),
    modification(
        "Dioxidation",
        425,
        &[(O, 2)],
        &[
            Residue(Methionine),
            Residue(Tryptophan),
            Residue(Cysteine),
            Residue(Phenylalanine),
            Residue(Tyrosine),
            Residue(Proline),
        ],
    ),
    modification(
        "Carbamidomethyl",
        4,
        &[(C, 2), (H, 3), (N, 1), (O, 1)],
        &[
            Residue(Cysteine),
            Residue(Lysine),
            Residue(Histidine),
            Residue(AsparticAcid),
            Residue(GlutamicAcid),
            NTerm,
        ],
    ),
    modification(
        "Carbamyl",
        5,
        &[(C, 1), (H, 1), (N, 1), (O, 1)],
        &[
            Residue(Lysine),
            Residue(Arginine),
            Residue(Cysteine),
            Residue(Methionine),
            NTerm,
        ],
    ),
    modification(
        "Phospho",
        21,
        &[(H, 1), (O, 3), (P, 1)],
        &[
            Residue(Serine),
            Residue(Threonine),
            Residue(Tyrosine),
            Residue(Histidine),
        ],
    ),
    modification(
        "Acetyl",
        1,
        &[(C, 2), (H, 2), (O, 1)],
        &[
            Residue(Lysine),
            Residue(Serine),
            Residue(Threonine),
            Residue(Tyrosine),
            Residue(Cysteine),
            Residue(Histidine),
            NTerm,
            ProteinNTerm,
        ],
    ),
    modification(
        "Amidated",
        2,
        &[(H, 1), (N, 1), (O, -1)],
        &[CTerm, ProteinCTerm],
    ),
    modification(
        "Deamidated",
        7,
        &[(H, -1), (N, -1), (O, 1)],
        &[Residue(Asparagine), Residue(Glutamine), Residue(Arginine)],
    ),
    modification(
        "Methyl",
        34,
        &[(C, 1), (H, 2)],
        &[
            Residue(Lysine),
            Residue(Arginine),
            Residue(Histidine),
            Residue(GlutamicAcid),
            Residue(AsparticAcid),
            Residue(Cysteine),
            Residue(Asparagine),
            Residue(Glutamine),
            Residue(Serine),
            Residue(Threonine),
            NTerm,
            CTerm,
        ],
    ),
    modification(
        "Dimethyl",
        36,
        &[(C, 2), (H, 4)],
        &[
            Residue(Lysine),
            Residue(Arginine),
            Residue(Asparagine),
            Residue(Proline),
            NTerm,
        ],
    ),
    modification(
        "Trimethyl",
        37,
        &[(C, 3), (H, 6)],
        &[Residue(Lysine), Residue(Arginine)],
    ),
    modification(
        "Formyl",
        122,
        &[(C, 1), (O, 1)],
        &[
            Residue(Lysine),
            Residue(Serine),
            Residue(Threonine),
            NTerm,
        ],
    ),
    modification(
        "GlyGly",
        121,
        &[(C, 4), (H, 6), (N, 2), (O, 2)],
        &[
            Residue(Lysine),
            Residue(Serine),
            Residue(Threonine),
            Residue(Cysteine),
        ],
    ),
    modification(
        "Nitro",
        354,
        &[(H, -1), (N, 1), (O, 2)],
        &[Residue(Tyrosine), Residue(Tryptophan)],
    ),
    modification(
        "Sulfo",
        40,
        &[(O, 3), (S, 1)],
        &[Residue(Serine), Residue(Threonine), Residue(Tyrosine)],
    ),
    modification(
        "Gln->pyro-Glu",
        28,
        &[(H, -3), (N, -1)],
        &[NTermResidue(Glutamine)],
    ),
    modification(
        "Glu->pyro-Glu",
        27,
        &[(H, -2), (O, -1)],
        &[NTermResidue(GlutamicAcid)],
    ),
    modification(
        "Ammonia-loss",
        385,
        &[(H, -3), (N, -1)],
        &[NTermResidue(Cysteine), Residue(Asparagine)],
    ),
    modification(
        "Dehydrated",
        23,
        &[(H, -2), (O, -1)],
        &[
            Residue(AsparticAcid),
            Residue(Serine),
            Residue(Threonine),
            Residue(Tyrosine),
            CTerm,
        ],
    ),
    modification(
        "Propionamide",
        24,
        &[(C, 3), (H, 5), (N, 1), (O, 1)],
        &[Residue(Cysteine), Residue(Lysine), NTerm],
    ),
    modification(
        "Cation:Na",
        30,
        &[(H, -1), (Na, 1)],
        &[Residue(AsparticAcid), Residue(GlutamicAcid), CTerm],
    ),
];

impl Modification {
    /// Find a modification by its exact name, like `Oxidation`, or its accession, like `UNIMOD:35`
    pub fn lookup(name: &str) -> Result<&'static Modification, ModificationError> {
        let found = match name.strip_prefix("UNIMOD:") {
            Some(accession) => accession
                .parse::<u32>()
                .ok()
                .and_then(|acc| MODIFICATIONS.iter().find(|m| m.accession == acc)),
            None => MODIFICATIONS.iter().find(|m| m.name == name),
        };
        found.ok_or_else(|| ModificationError::Unknown(name.to_string()))
    }

    /// The composition this modification adds to the site it is placed on
    pub fn delta(&self) -> ElementalFormula {
        ElementalFormula::from_counts(self.delta)
    }

    pub fn monoisotopic_mass(&self) -> f64 {
        self.delta().monoisotopic_mass()
    }

    pub fn accession_string(&self) -> String {
        format!("UNIMOD:{}", self.accession)
    }

    /// Whether this modification may be placed on `residue`, `first` telling whether the
    /// residue starts the peptide
    pub fn allows_residue(&self, residue: AminoAcid, first: bool) -> bool {
        self.sites.iter().any(|site| match site {
            ModificationSite::Residue(aa) => *aa == residue,
            ModificationSite::NTermResidue(aa) => first && *aa == residue,
            _ => false,
        })
    }

    /// Whether this modification may be placed on the peptide N-terminus
    pub fn allows_n_terminus(&self) -> bool {
        self.sites
            .iter()
            .any(|site| matches!(site, ModificationSite::NTerm | ModificationSite::ProteinNTerm))
    }

    pub fn allows_c_terminus(&self) -> bool {
        self.sites
            .iter()
            .any(|site| matches!(site, ModificationSite::CTerm | ModificationSite::ProteinCTerm))
    }
}

impl Display for Modification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lookup() {
        let oxidation = Modification::lookup("Oxidation").unwrap();
        assert_eq!(oxidation.accession, 35);
        assert_eq!(Modification::lookup("UNIMOD:35").unwrap(), oxidation);
        assert!((oxidation.monoisotopic_mass() - 15.994915).abs() < 1e-6);
        assert_eq!(oxidation.accession_string(), "UNIMOD:35");

        assert_eq!(
            Modification::lookup("oxidation"),
            Err(ModificationError::Unknown("oxidation".into()))
        );
        assert!(Modification::lookup("UNIMOD:999999").is_err());
        assert!(Modification::lookup("UNIMOD:abc").is_err());
        assert!(Modification::lookup("Gln->pyro-Glu").is_ok());
        assert!(Modification::lookup("Cation:Na").is_ok());
    }

    #[test]
    fn test_masses() {
        let expected = [
            ("Carbamidomethyl", 57.021464),
            ("Phospho", 79.966331),
            ("Acetyl", 42.010565),
            ("Amidated", -0.984016),
            ("Deamidated", 0.984016),
            ("GlyGly", 114.042927),
            ("Gln->pyro-Glu", -17.026549),
            ("Cation:Na", 21.981943),
        ];
        for (name, mass) in expected {
            let m = Modification::lookup(name).unwrap();
            assert!((m.monoisotopic_mass() - mass).abs() < 1e-5, "{name}");
        }
    }

    #[test]
    fn test_table_is_unique() {
        for (i, a) in MODIFICATIONS.iter().enumerate() {
            for b in MODIFICATIONS[i + 1..].iter() {
                assert_ne!(a.name, b.name);
                assert_ne!(a.accession, b.accession);
            }
        }
    }

    #[test]
    fn test_sites() {
        let oxidation = Modification::lookup("Oxidation").unwrap();
        assert!(oxidation.allows_residue(AminoAcid::Methionine, false));
        assert!(!oxidation.allows_residue(AminoAcid::Glycine, false));
        assert!(!oxidation.allows_n_terminus());

        let pyro = Modification::lookup("Gln->pyro-Glu").unwrap();
        assert!(pyro.allows_residue(AminoAcid::Glutamine, true));
        assert!(!pyro.allows_residue(AminoAcid::Glutamine, false));

        assert!(Modification::lookup("Acetyl").unwrap().allows_n_terminus());
        assert!(Modification::lookup("Amidated").unwrap().allows_c_terminus());
    }
}
