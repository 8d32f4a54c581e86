use phf::phf_map;

/// Tabulated data for one element, indexed by atomic number in [`ELEMENTS`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementData {
    pub symbol: &'static str,
    /// Mass number of the most abundant (or longest-lived) isotope
    pub mass_number: u16,
    pub standard_atomic_weight: f64,
    /// Single-bond covalent radius in Angstrom
    pub covalent_radius: f64,
}

const fn element(
    symbol: &'static str,
    mass_number: u16,
    standard_atomic_weight: f64,
    covalent_radius: f64,
) -> ElementData {
    ElementData {
        symbol,
        mass_number,
        standard_atomic_weight,
        covalent_radius,
    }
}

// Index 0 is the dummy atom used for placeholders, it has no mass.
pub static ELEMENTS: [ElementData; 119] = [
    element("*", 0, 0.0, 0.0),
    element("H", 1, 1.008, 0.31),
    element("He", 4, 4.0026, 0.28),
    element("Li", 7, 6.94, 1.28),
    element("Be", 9, 9.0122, 0.96),
    element("B", 11, 10.81, 0.84),
    element("C", 12, 12.011, 0.76),
    element("N", 14, 14.007, 0.71),
    element("O", 16, 15.999, 0.66),
    element("F", 19, 18.998, 0.57),
    element("Ne", 20, 20.180, 0.58),
    element("Na", 23, 22.990, 1.66),
    element("Mg", 24, 24.305, 1.41),
    element("Al", 27, 26.982, 1.21),
    element("Si", 28, 28.085, 1.11),
    element("P", 31, 30.974, 1.07),
    element("S", 32, 32.06, 1.05),
    element("Cl", 35, 35.45, 1.02),
    element("Ar", 40, 39.948, 1.06),
    element("K", 39, 39.098, 2.03),
    element("Ca", 40, 40.078, 1.76),
    element("Sc", 45, 44.956, 1.70),
    element("Ti", 48, 47.867, 1.60),
    element("V", 51, 50.942, 1.53),
    element("Cr", 52, 51.996, 1.39),
    element("Mn", 55, 54.938, 1.39),
    element("Fe", 56, 55.845, 1.32),
    element("Co", 59, 58.933, 1.26),
    element("Ni", 58, 58.693, 1.24),
    element("Cu", 63, 63.546, 1.32),
    element("Zn", 64, 65.38, 1.22),
    element("Ga", 69, 69.723, 1.22),
    element("Ge", 74, 72.630, 1.20),
    element("As", 75, 74.922, 1.19),
    element("Se", 80, 78.971, 1.20),
    element("Br", 79, 79.904, 1.20),
    element("Kr", 84, 83.798, 1.16),
    element("Rb", 85, 85.468, 2.20),
    element("Sr", 88, 87.62, 1.95),
    element("Y", 89, 88.906, 1.90),
    element("Zr", 90, 91.224, 1.75),
    element("Nb", 93, 92.906, 1.64),
    element("Mo", 98, 95.95, 1.54),
    element("Tc", 98, 97.907, 1.47),
    element("Ru", 102, 101.07, 1.46),
    element("Rh", 103, 102.91, 1.42),
    element("Pd", 106, 106.42, 1.39),
    element("Ag", 107, 107.87, 1.45),
    element("Cd", 114, 112.41, 1.44),
    element("In", 115, 114.82, 1.42),
    element("Sn", 120, 118.71, 1.39),
    element("Sb", 121, 121.76, 1.39),
    element("Te", 130, 127.60, 1.38),
    element("I", 127, 126.90, 1.39),
    element("Xe", 132, 131.29, 1.40),
    element("Cs", 133, 132.91, 2.44),
    element("Ba", 138, 137.33, 2.15),
    element("La", 139, 138.91, 2.07),
    element("Ce", 140, 140.12, 2.04),
    element("Pr", 141, 140.91, 2.03),
    element("Nd", 142, 144.24, 2.01),
    element("Pm", 145, 144.91, 1.99),
    element("Sm", 152, 150.36, 1.98),
    element("Eu", 153, 151.96, 1.98),
    element("Gd", 158, 157.25, 1.96),
    element("Tb", 159, 158.93, 1.94),
    element("Dy", 164, 162.50, 1.92),
    element("Ho", 165, 164.93, 1.92),
    element("Er", 166, 167.26, 1.89),
    element("Tm", 169, 168.93, 1.90),
    element("Yb", 174, 173.05, 1.87),
    element("Lu", 175, 174.97, 1.87),
    element("Hf", 180, 178.49, 1.75),
    element("Ta", 181, 180.95, 1.70),
    element("W", 184, 183.84, 1.62),
    element("Re", 187, 186.21, 1.51),
    element("Os", 192, 190.23, 1.44),
    element("Ir", 193, 192.22, 1.41),
    element("Pt", 195, 195.08, 1.36),
    element("Au", 197, 196.97, 1.36),
    element("Hg", 202, 200.59, 1.32),
    element("Tl", 205, 204.38, 1.45),
    element("Pb", 208, 207.2, 1.46),
    element("Bi", 209, 208.98, 1.48),
    element("Po", 209, 208.98, 1.40),
    element("At", 210, 209.99, 1.50),
    element("Rn", 222, 222.02, 1.50),
    element("Fr", 223, 223.02, 2.60),
    element("Ra", 226, 226.03, 2.21),
    element("Ac", 227, 227.03, 2.15),
    element("Th", 232, 232.04, 2.06),
    element("Pa", 231, 231.04, 2.00),
    element("U", 238, 238.03, 1.96),
    element("Np", 237, 237.05, 1.90),
    element("Pu", 244, 244.06, 1.87),
    element("Am", 243, 243.06, 1.80),
    element("Cm", 247, 247.07, 1.69),
    element("Bk", 247, 247.07, 1.68),
    element("Cf", 251, 251.08, 1.68),
    element("Es", 252, 252.08, 1.65),
    element("Fm", 257, 257.10, 1.67),
    element("Md", 258, 258.10, 1.73),
    element("No", 259, 259.10, 1.76),
    element("Lr", 266, 266.12, 1.61),
    element("Rf", 267, 267.12, 1.57),
    element("Db", 268, 268.13, 1.49),
    element("Sg", 269, 269.13, 1.43),
    element("Bh", 270, 270.13, 1.41),
    element("Hs", 277, 277.15, 1.34),
    element("Mt", 278, 278.16, 1.29),
    element("Ds", 281, 281.17, 1.28),
    element("Rg", 282, 282.17, 1.21),
    element("Cn", 285, 285.18, 1.22),
    element("Nh", 286, 286.18, 1.36),
    element("Fl", 289, 289.19, 1.43),
    element("Mc", 290, 290.20, 1.62),
    element("Lv", 293, 293.20, 1.75),
    element("Ts", 294, 294.21, 1.65),
    element("Og", 294, 294.21, 1.57),
];

pub static ATOMIC_NUMBERS: phf::Map<&'static str, u8> = phf_map! {
    "*" => 0,
    "H" => 1,
    "He" => 2,
    "Li" => 3,
    "Be" => 4,
    "B" => 5,
    "C" => 6,
    "N" => 7,
    "O" => 8,
    "F" => 9,
    "Ne" => 10,
    "Na" => 11,
    "Mg" => 12,
    "Al" => 13,
    "Si" => 14,
    "P" => 15,
    "S" => 16,
    "Cl" => 17,
    "Ar" => 18,
    "K" => 19,
    "Ca" => 20,
    "Sc" => 21,
    "Ti" => 22,
    "V" => 23,
    "Cr" => 24,
    "Mn" => 25,
    "Fe" => 26,
    "Co" => 27,
    "Ni" => 28,
    "Cu" => 29,
    "Zn" => 30,
    "Ga" => 31,
    "Ge" => 32,
    "As" => 33,
    "Se" => 34,
    "Br" => 35,
    "Kr" => 36,
    "Rb" => 37,
    "Sr" => 38,
    "Y" => 39,
    "Zr" => 40,
    "Nb" => 41,
    "Mo" => 42,
    "Tc" => 43,
    "Ru" => 44,
    "Rh" => 45,
    "Pd" => 46,
    "Ag" => 47,
    "Cd" => 48,
    "In" => 49,
    "Sn" => 50,
    "Sb" => 51,
    "Te" => 52,
    "I" => 53,
    "Xe" => 54,
    "Cs" => 55,
    "Ba" => 56,
    "La" => 57,
    "Ce" => 58,
    "Pr" => 59,
    "Nd" => 60,
    "Pm" => 61,
    "Sm" => 62,
    "Eu" => 63,
    "Gd" => 64,
    "Tb" => 65,
    "Dy" => 66,
    "Ho" => 67,
    "Er" => 68,
    "Tm" => 69,
    "Yb" => 70,
    "Lu" => 71,
    "Hf" => 72,
    "Ta" => 73,
    "W" => 74,
    "Re" => 75,
    "Os" => 76,
    "Ir" => 77,
    "Pt" => 78,
    "Au" => 79,
    "Hg" => 80,
    "Tl" => 81,
    "Pb" => 82,
    "Bi" => 83,
    "Po" => 84,
    "At" => 85,
    "Rn" => 86,
    "Fr" => 87,
    "Ra" => 88,
    "Ac" => 89,
    "Th" => 90,
    "Pa" => 91,
    "U" => 92,
    "Np" => 93,
    "Pu" => 94,
    "Am" => 95,
    "Cm" => 96,
    "Bk" => 97,
    "Cf" => 98,
    "Es" => 99,
    "Fm" => 100,
    "Md" => 101,
    "No" => 102,
    "Lr" => 103,
    "Rf" => 104,
    "Db" => 105,
    "Sg" => 106,
    "Bh" => 107,
    "Hs" => 108,
    "Mt" => 109,
    "Ds" => 110,
    "Rg" => 111,
    "Cn" => 112,
    "Nh" => 113,
    "Fl" => 114,
    "Mc" => 115,
    "Lv" => 116,
    "Ts" => 117,
    "Og" => 118,
};
/// Elements that never occur in the structures we fragment. They stand in for
/// attachment-point classes when fragments are handed to the canonical identifier.
pub static SYNTHETIC_ELEMENT_POOL: [u8; 30] = [
    104, 105, 106, 107, 108, 109, 110, 111, 112, 113, 114, 115, 116, 117, 118, 89, 90, 91, 92,
    93, 94, 95, 96, 97, 98, 99, 100, 101, 102, 103,
];

pub trait ElementProperties {
    fn atomic_number(&self) -> Option<u8>;

    fn data(&self) -> Option<&'static ElementData> {
        ELEMENTS.get(self.atomic_number()? as usize)
    }

    fn atomic_symbol(&self) -> Option<&'static str> {
        self.data().map(|data| data.symbol)
    }

    fn mass_number(&self) -> Option<u16> {
        self.data().map(|data| data.mass_number)
    }

    fn standard_atomic_weight(&self) -> Option<f64> {
        self.data().map(|data| data.standard_atomic_weight)
    }

    fn covalent_radius(&self) -> Option<f64> {
        self.data()
            .map(|data| data.covalent_radius)
            .filter(|&radius| radius > 0.0)
    }

    /// Alkali, alkaline-earth, transition, post-transition metals, lanthanides and actinides.
    fn is_metal(&self) -> bool {
        matches!(
            self.atomic_number(),
            Some(3 | 4 | 11 | 12 | 13 | 19..=31 | 37..=50 | 55..=84 | 87..=116)
        )
    }
}

impl ElementProperties for u8 {
    fn atomic_number(&self) -> Option<u8> {
        if (*self as usize) < ELEMENTS.len() {
            Some(*self)
        } else {
            None
        }
    }
}

impl ElementProperties for &str {
    /// Looks the symbol up as written, then with element capitalization ("CL" -> "Cl").
    fn atomic_number(&self) -> Option<u8> {
        if let Some(&number) = ATOMIC_NUMBERS.get(*self) {
            return Some(number);
        }
        let mut chars = self.chars();
        let first = chars.next()?;
        let normalized: String = first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect();
        ATOMIC_NUMBERS.get(normalized.as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_round_trip_through_atomic_numbers() {
        for (number, data) in ELEMENTS.iter().enumerate() {
            assert_eq!(data.symbol.atomic_number(), Some(number as u8));
        }
    }

    #[test]
    fn symbol_lookup_normalizes_case() {
        assert_eq!("CL".atomic_number(), Some(17));
        assert_eq!("fe".atomic_number(), Some(26));
        assert_eq!("Xx".atomic_number(), None);
    }

    #[test]
    fn metals() {
        assert!(26u8.is_metal());
        assert!(3u8.is_metal());
        assert!(!6u8.is_metal());
        assert!(!0u8.is_metal());
        assert!("Pt".is_metal());
    }

    #[test]
    fn dummy_atom_has_no_mass() {
        assert_eq!(0u8.mass_number(), Some(0));
        assert_eq!(0u8.covalent_radius(), None);
        assert_eq!(6u8.mass_number(), Some(12));
    }

    #[test]
    fn synthetic_pool_has_no_common_elements() {
        assert!(SYNTHETIC_ELEMENT_POOL.iter().all(|&z| z >= 89));
    }
}
