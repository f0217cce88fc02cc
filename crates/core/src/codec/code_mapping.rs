//! Static code tables between storage codes and engine display text.
//!
//! The request table stores compact codes (`"BV"`, `"080"`, `"PN16"`);
//! the engine only understands the display strings it shows in its own
//! drop-downs. Each table maps every code to exactly one display string.
//! Several codes may share a display string (legacy aliases); the reverse
//! lookup returns the first code in table order.
//!
//! Lookups never fail: unknown codes and unknown display text pass
//! through unchanged so that values added on the engine side keep
//! flowing into storage.

/// Valve body styles.
const VALVE_TYPES: &[(&str, &str)] = &[
    ("BV", "Ball valve"),
    ("B", "Ball valve"),
    ("GL", "Globe valve"),
    ("BF", "Butterfly valve"),
    ("PL", "Plug valve"),
    ("AN", "Angle valve"),
];

/// Process fluid state at the valve inlet.
const FLUID_PHASES: &[(&str, &str)] = &[("L", "Liquid"), ("G", "Gas"), ("V", "Vapor")];

/// Nominal pipe sizes, stored as millimetre-style codes.
const NOMINAL_SIZES: &[(&str, &str)] = &[
    ("015", "1/2\""),
    ("020", "3/4\""),
    ("025", "1\""),
    ("040", "1 1/2\""),
    ("050", "2\""),
    ("080", "3\""),
    ("100", "4\""),
    ("150", "6\""),
    ("200", "8\""),
    ("250", "10\""),
    ("300", "12\""),
];

/// Flange pressure ratings.
const PRESSURE_CLASSES: &[(&str, &str)] = &[
    ("150", "ASME 150"),
    ("300", "ASME 300"),
    ("600", "ASME 600"),
    ("900", "ASME 900"),
    ("1500", "ASME 1500"),
    ("PN16", "PN 16"),
    ("PN40", "PN 40"),
];

/// Storage code of the gas phase in [`CodeTable::FluidPhase`].
pub const PHASE_GAS: &str = "G";

/// The enumerations the codec knows how to translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeTable {
    ValveType,
    FluidPhase,
    NominalSize,
    PressureClass,
}

impl CodeTable {
    /// All tables, for invariant checks.
    pub const ALL: [CodeTable; 4] = [
        CodeTable::ValveType,
        CodeTable::FluidPhase,
        CodeTable::NominalSize,
        CodeTable::PressureClass,
    ];

    /// The `(code, display)` pairs in lookup order.
    pub fn entries(self) -> &'static [(&'static str, &'static str)] {
        match self {
            CodeTable::ValveType => VALVE_TYPES,
            CodeTable::FluidPhase => FLUID_PHASES,
            CodeTable::NominalSize => NOMINAL_SIZES,
            CodeTable::PressureClass => PRESSURE_CLASSES,
        }
    }

    /// Display text for a storage code, if the code is known.
    pub fn display_for(self, code: &str) -> Option<&'static str> {
        let code = code.trim();
        self.entries()
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, display)| *display)
    }

    /// First storage code whose display text matches, if any.
    pub fn code_for(self, display: &str) -> Option<&'static str> {
        let display = display.trim();
        self.entries()
            .iter()
            .find(|(_, d)| *d == display)
            .map(|(code, _)| *code)
    }

    /// Forward translation with pass-through for unknown codes.
    pub fn to_display(self, code: &str) -> String {
        self.display_for(code)
            .map(str::to_string)
            .unwrap_or_else(|| code.trim().to_string())
    }

    /// Reverse translation with pass-through for unknown display text.
    pub fn to_code(self, display: &str) -> String {
        self.code_for(display)
            .map(str::to_string)
            .unwrap_or_else(|| display.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
