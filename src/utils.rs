/// The mass of a proton, in daltons
pub const PROTON: f64 = 1.00727646677;

#[inline]
pub fn mass_charge_ratio(mass: f64, z: i32) -> f64 {
    (mass + z as f64 * PROTON) / (z.abs() as f64)
}

#[inline]
pub fn neutral_mass(mz: f64, z: i32) -> f64 {
    (mz * z.abs() as f64) - z as f64 * PROTON
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mass_conversion() {
        let mass = 1017.48796;
        let mz = mass_charge_ratio(mass, 2);
        assert!((mz - 509.75125646677).abs() < 1e-6);
        assert!((neutral_mass(mz, 2) - mass).abs() < 1e-9);
    }
}
