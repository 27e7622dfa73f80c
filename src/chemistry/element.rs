use std::fmt::Display;
use std::str::FromStr;

use super::FormulaError;

/// One naturally occurring isotope of an element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Isotope {
    pub mass_number: u16,
    /// The exact mass in daltons
    pub mass: f64,
    /// The natural abundance as a fraction
    pub abundance: f64,
}

const fn iso(mass_number: u16, mass: f64, abundance: f64) -> Isotope {
    Isotope {
        mass_number,
        mass,
        abundance,
    }
}

/// The chemical elements a formula may hold.
///
/// Variants are declared in Hill order, carbon and hydrogen first then the rest
/// alphabetically, so the derived ordering is the order formulas are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Element {
    C,
    H,
    Br,
    Ca,
    Cl,
    Cu,
    F,
    Fe,
    I,
    K,
    Li,
    Mg,
    N,
    Na,
    O,
    P,
    S,
    Se,
    Zn,
}

const H_ISOTOPES: [Isotope; 2] = [iso(1, 1.00782503207, 0.999885), iso(2, 2.0141017778, 0.000115)];
const C_ISOTOPES: [Isotope; 2] = [iso(12, 12.0, 0.9893), iso(13, 13.0033548378, 0.0107)];
const N_ISOTOPES: [Isotope; 2] = [iso(14, 14.0030740048, 0.99636), iso(15, 15.0001088982, 0.00364)];
const O_ISOTOPES: [Isotope; 3] = [
    iso(16, 15.99491461956, 0.99757),
    iso(17, 16.99913170, 0.00038),
    iso(18, 17.9991610, 0.00205),
];
const P_ISOTOPES: [Isotope; 1] = [iso(31, 30.97376163, 1.0)];
const S_ISOTOPES: [Isotope; 4] = [
    iso(32, 31.97207100, 0.9499),
    iso(33, 32.97145876, 0.0075),
    iso(34, 33.96786690, 0.0425),
    iso(36, 35.96708076, 0.0001),
];
const SE_ISOTOPES: [Isotope; 6] = [
    iso(74, 73.9224764, 0.0089),
    iso(76, 75.9192136, 0.0937),
    iso(77, 76.9199140, 0.0763),
    iso(78, 77.9173091, 0.2377),
    iso(80, 79.9165213, 0.4961),
    iso(82, 81.9166994, 0.0873),
];
const NA_ISOTOPES: [Isotope; 1] = [iso(23, 22.9897692809, 1.0)];
const K_ISOTOPES: [Isotope; 3] = [
    iso(39, 38.96370668, 0.932581),
    iso(40, 39.96399848, 0.000117),
    iso(41, 40.96182576, 0.067302),
];
const CL_ISOTOPES: [Isotope; 2] = [iso(35, 34.96885268, 0.7576), iso(37, 36.96590259, 0.2424)];
const BR_ISOTOPES: [Isotope; 2] = [iso(79, 78.9183371, 0.5069), iso(81, 80.9162906, 0.4931)];
const F_ISOTOPES: [Isotope; 1] = [iso(19, 18.99840322, 1.0)];
const I_ISOTOPES: [Isotope; 1] = [iso(127, 126.904473, 1.0)];
const LI_ISOTOPES: [Isotope; 2] = [iso(6, 6.015122795, 0.0759), iso(7, 7.01600455, 0.9241)];
const CA_ISOTOPES: [Isotope; 6] = [
    iso(40, 39.96259098, 0.96941),
    iso(42, 41.95861801, 0.00647),
    iso(43, 42.9587666, 0.00135),
    iso(44, 43.9554818, 0.02086),
    iso(46, 45.9536926, 0.00004),
    iso(48, 47.952534, 0.00187),
];
const MG_ISOTOPES: [Isotope; 3] = [
    iso(24, 23.985041700, 0.7899),
    iso(25, 24.98583692, 0.1000),
    iso(26, 25.982592929, 0.1101),
];
const FE_ISOTOPES: [Isotope; 4] = [
    iso(54, 53.9396105, 0.05845),
    iso(56, 55.9349375, 0.91754),
    iso(57, 56.9353940, 0.02119),
    iso(58, 57.9332756, 0.00282),
];
const ZN_ISOTOPES: [Isotope; 5] = [
    iso(64, 63.9291422, 0.48268),
    iso(66, 65.9260334, 0.27975),
    iso(67, 66.9271273, 0.04102),
    iso(68, 67.9248442, 0.19024),
    iso(70, 69.9253193, 0.00631),
];
const CU_ISOTOPES: [Isotope; 2] = [iso(63, 62.9295975, 0.6915), iso(65, 64.9277895, 0.3085)];

impl Element {
    pub const ALL: [Element; 19] = [
        Self::C,
        Self::H,
        Self::Br,
        Self::Ca,
        Self::Cl,
        Self::Cu,
        Self::F,
        Self::Fe,
        Self::I,
        Self::K,
        Self::Li,
        Self::Mg,
        Self::N,
        Self::Na,
        Self::O,
        Self::P,
        Self::S,
        Self::Se,
        Self::Zn,
    ];

    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::C => "C",
            Self::H => "H",
            Self::Br => "Br",
            Self::Ca => "Ca",
            Self::Cl => "Cl",
            Self::Cu => "Cu",
            Self::F => "F",
            Self::Fe => "Fe",
            Self::I => "I",
            Self::K => "K",
            Self::Li => "Li",
            Self::Mg => "Mg",
            Self::N => "N",
            Self::Na => "Na",
            Self::O => "O",
            Self::P => "P",
            Self::S => "S",
            Self::Se => "Se",
            Self::Zn => "Zn",
        }
    }

    /// The natural isotopes of this element, lightest first
    pub const fn isotopes(&self) -> &'static [Isotope] {
        match self {
            Self::C => &C_ISOTOPES,
            Self::H => &H_ISOTOPES,
            Self::Br => &BR_ISOTOPES,
            Self::Ca => &CA_ISOTOPES,
            Self::Cl => &CL_ISOTOPES,
            Self::Cu => &CU_ISOTOPES,
            Self::F => &F_ISOTOPES,
            Self::Fe => &FE_ISOTOPES,
            Self::I => &I_ISOTOPES,
            Self::K => &K_ISOTOPES,
            Self::Li => &LI_ISOTOPES,
            Self::Mg => &MG_ISOTOPES,
            Self::N => &N_ISOTOPES,
            Self::Na => &NA_ISOTOPES,
            Self::O => &O_ISOTOPES,
            Self::P => &P_ISOTOPES,
            Self::S => &S_ISOTOPES,
            Self::Se => &SE_ISOTOPES,
            Self::Zn => &ZN_ISOTOPES,
        }
    }

    /// The isotope with the highest natural abundance
    pub fn most_abundant_isotope(&self) -> &'static Isotope {
        let isotopes = self.isotopes();
        let mut best = &isotopes[0];
        for isotope in &isotopes[1..] {
            if isotope.abundance > best.abundance {
                best = isotope;
            }
        }
        best
    }

    pub fn lightest_isotope(&self) -> &'static Isotope {
        &self.isotopes()[0]
    }

    /// The mass of the most abundant isotope
    pub fn monoisotopic_mass(&self) -> f64 {
        self.most_abundant_isotope().mass
    }

    /// The abundance weighted mass of all isotopes
    pub fn average_mass(&self) -> f64 {
        self.isotopes().iter().map(|i| i.mass * i.abundance).sum()
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Element {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|e| e.symbol() == s)
            .copied()
            .ok_or_else(|| FormulaError::UnknownElement(s.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!("Se".parse::<Element>().unwrap(), Element::Se);
        assert_eq!("C".parse::<Element>().unwrap(), Element::C);
        assert!(matches!(
            "Xx".parse::<Element>(),
            Err(FormulaError::UnknownElement(_))
        ));
        for element in Element::ALL {
            assert_eq!(element.symbol().parse::<Element>().unwrap(), element);
        }
    }

    #[test]
    fn test_masses() {
        assert_eq!(Element::C.monoisotopic_mass(), 12.0);
        assert!((Element::C.average_mass() - 12.0107).abs() < 1e-3);
        assert!((Element::H.average_mass() - 1.00794).abs() < 1e-4);
        assert_eq!(Element::Se.most_abundant_isotope().mass_number, 80);
        assert_eq!(Element::Se.lightest_isotope().mass_number, 74);
        assert!((Element::Cl.average_mass() - 35.453).abs() < 1e-2);
    }

    #[test]
    fn test_abundances_sum_to_one() {
        for element in Element::ALL {
            let total: f64 = element.isotopes().iter().map(|i| i.abundance).sum();
            assert!((total - 1.0).abs() < 1e-3, "{element} {total}");
            assert!(element
                .isotopes()
                .windows(2)
                .all(|w| w[0].mass_number < w[1].mass_number));
        }
    }

    #[test]
    fn test_hill_order() {
        let mut elements = vec![Element::O, Element::N, Element::H, Element::C, Element::Br];
        elements.sort();
        assert_eq!(
            elements,
            vec![Element::C, Element::H, Element::Br, Element::N, Element::O]
        );
    }
}
