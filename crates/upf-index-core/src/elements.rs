//! Periodic table whitelist for element identity validation.
//!
//! Every identity candidate, whether parsed from file content or inferred
//! from a filename, must normalize to one of these 118 symbols or it is
//! rejected outright.

/// All valid element symbols, H through Og.
pub const VALID_ELEMENTS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", //
    "Na", "Mg", "Al", "Si", "P", "S", "Cl", "Ar", "K", "Ca", //
    "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", //
    "Ga", "Ge", "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", //
    "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In", "Sn", //
    "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", //
    "Pm", "Sm", "Eu", "Gd", "Tb", "Dy", "Ho", "Er", "Tm", "Yb", //
    "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", //
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", //
    "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk", "Cf", "Es", "Fm", //
    "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", //
    "Rg", "Cn", "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Normalize a raw 1–2 letter candidate to title case and validate it
/// against the periodic table.
///
/// Returns the canonical symbol (`"be"` -> `"Be"`, `"B"` -> `"B"`) or `None`
/// for anything that is not a real element.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > 2 || !raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut chars = raw.chars();
    let first = chars.next()?.to_ascii_uppercase();
    let rest: String = chars.map(|c| c.to_ascii_lowercase()).collect();
    let symbol = format!("{}{}", first, rest);

    VALID_ELEMENTS
        .iter()
        .find(|&&e| e == symbol)
        .map(|_| symbol)
}
