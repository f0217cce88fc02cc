//! Parameter codec between stored sizing rows and engine parameters.
//!
//! [`encode`] turns a sparse request row into the ordered
//! [`ParameterSet`] pushed into an engine session; [`decode`] turns one
//! value read from the engine back into a `(column, value)` pair.
//! Neither ever fails: a field that is absent, blank or cannot be
//! coerced is left out and the engine keeps its own default.

pub mod code_mapping;
pub mod fields;
pub mod value;

use serde::Serialize;

pub use code_mapping::CodeTable;
pub use fields::{FieldGroup, FieldSpec, FIELD_LIST_VERSION, INPUT_FIELDS, OUTPUT_FIELDS};
pub use value::{EngineValue, ParamKind, SparseRow, StoredValue};

use code_mapping::PHASE_GAS;
use fields::{COL_FLOW_IS_MASS, COL_FLUID_PHASE, COL_PRESSURE_IS_GAUGE, COL_USES_DENSITY};

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Sub-group selection derived from a request row.
///
/// Each flag picks one half of a mutually exclusive pair of field groups.
/// Absent flags fall back to the volumetric / differential / molecular
/// weight halves, and an absent phase counts as liquid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Modes {
    pub mass_flow: bool,
    pub gauge_pressure: bool,
    pub uses_density: bool,
    pub gas_phase: bool,
}

impl Modes {
    pub fn from_row(row: &SparseRow) -> Self {
        let flag = |col: &str| row.get(col).and_then(StoredValue::as_flag).unwrap_or(false);
        // Rows may hold the display text instead of the code.
        let gas_phase = row
            .get(COL_FLUID_PHASE)
            .and_then(StoredValue::as_text)
            .map(|phase| CodeTable::FluidPhase.to_code(&phase))
            .is_some_and(|code| code.eq_ignore_ascii_case(PHASE_GAS));

        Self {
            mass_flow: flag(COL_FLOW_IS_MASS),
            gauge_pressure: flag(COL_PRESSURE_IS_GAUGE),
            uses_density: flag(COL_USES_DENSITY),
            gas_phase,
        }
    }

    /// Whether fields of `group` participate under these modes.
    pub fn selects(&self, group: FieldGroup) -> bool {
        match group {
            FieldGroup::Always => true,
            FieldGroup::MassFlow => self.mass_flow,
            FieldGroup::VolumeFlow => !self.mass_flow,
            FieldGroup::GaugePressure => self.gauge_pressure,
            FieldGroup::DifferentialPressure => !self.gauge_pressure,
            FieldGroup::Density => self.uses_density,
            FieldGroup::MolecularWeight => !self.uses_density,
            FieldGroup::GasOutput => self.gas_phase,
            FieldGroup::LiquidOutput => !self.gas_phase,
        }
    }
}

// ---------------------------------------------------------------------------
// ParameterSet / ResultSet
// ---------------------------------------------------------------------------

/// One encoded input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: &'static str,
    pub value: EngineValue,
}

/// Encoded inputs in push order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSet {
    pub modes: Modes,
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&EngineValue> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Decoded outputs keyed by storage column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet(SparseRow);

impl ResultSet {
    pub fn insert(&mut self, column: impl Into<String>, value: StoredValue) {
        self.0.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&StoredValue> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_row(&self) -> &SparseRow {
        &self.0
    }

    pub fn into_row(self) -> SparseRow {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Build the parameter set for a request row.
pub fn encode(row: &SparseRow) -> ParameterSet {
    let modes = Modes::from_row(row);
    let params = INPUT_FIELDS
        .iter()
        .filter(|spec| modes.selects(spec.group))
        .filter_map(|spec| {
            let stored = row.get(spec.column).filter(|v| !v.is_blank())?;
            let value = encode_value(spec, stored)?;
            Some(Parameter {
                name: spec.engine_name,
                value,
            })
        })
        .collect();

    ParameterSet { modes, params }
}

/// Coerce one stored value to the engine kind of `spec`.
pub fn encode_value(spec: &FieldSpec, stored: &StoredValue) -> Option<EngineValue> {
    match spec.kind {
        ParamKind::Flag => stored.as_flag().map(EngineValue::Flag),
        ParamKind::Number => stored.as_decimal().map(EngineValue::Number),
        ParamKind::Unit => stored.as_text().map(EngineValue::Unit),
        ParamKind::Text => {
            let text = stored.as_text()?;
            Some(EngineValue::Text(match spec.table {
                Some(table) => table.to_display(&text),
                None => text,
            }))
        }
    }
}

/// Map one engine value back to its storage column.
///
/// Returns `None` for unknown names, for a `kind` that does not match the
/// field list, and for values that cannot be coerced.
pub fn decode(
    engine_name: &str,
    kind: ParamKind,
    raw: &EngineValue,
) -> Option<(String, StoredValue)> {
    let spec = fields::by_engine_name(engine_name)?;
    if spec.kind != kind {
        return None;
    }

    let value = match (kind, raw) {
        (ParamKind::Flag, EngineValue::Flag(b)) => StoredValue::Flag(*b),
        (ParamKind::Flag, EngineValue::Number(x)) => StoredValue::Flag(*x != 0.0),
        (ParamKind::Number, EngineValue::Number(x)) if x.is_finite() => StoredValue::Decimal(*x),
        (ParamKind::Number, EngineValue::Text(s)) => {
            StoredValue::Decimal(StoredValue::Text(s.clone()).as_decimal()?)
        }
        (ParamKind::Unit, EngineValue::Unit(s) | EngineValue::Text(s)) => {
            StoredValue::Text(s.trim().to_string())
        }
        (ParamKind::Text, EngineValue::Text(s)) => StoredValue::Text(match spec.table {
            Some(table) => table.to_code(s),
            None => s.trim().to_string(),
        }),
        _ => return None,
    };

    Some((spec.column.to_string(), value))
}

/// The outputs to read back for a request, honouring the phase groups.
pub fn result_fields(modes: &Modes) -> impl Iterator<Item = &'static FieldSpec> + '_ {
    OUTPUT_FIELDS
        .iter()
        .filter(move |spec| modes.selects(spec.group))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
