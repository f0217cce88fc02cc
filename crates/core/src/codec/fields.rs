//! The versioned list of fields exchanged with the engine.
//!
//! Every entry ties a storage column to an engine parameter name and a
//! parameter kind. Entries outside [`FieldGroup::Always`] belong to one
//! half of a mutually exclusive pair and only participate when the
//! request's [`Modes`] select that half.
//!
//! Order matters: the input list is pushed into a session top to bottom,
//! and the engine must see enumerations and mode flags before the
//! quantities whose meaning depends on them.

use super::code_mapping::CodeTable;
use super::value::ParamKind;

/// Bump when an entry is added, removed or renamed.
pub const FIELD_LIST_VERSION: u32 = 1;

/// Storage column holding the fluid-phase code.
pub const COL_FLUID_PHASE: &str = "fluid_phase";
/// Storage flag: flow rates are given as mass flow (else volumetric).
pub const COL_FLOW_IS_MASS: &str = "flow_is_mass";
/// Storage flag: outlet conditions are gauge pressures (else a pressure drop).
pub const COL_PRESSURE_IS_GAUGE: &str = "pressure_is_gauge";
/// Storage flag: fluid is described by density (else molecular weight).
pub const COL_USES_DENSITY: &str = "uses_density";

/// Which sub-group a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    Always,
    MassFlow,
    VolumeFlow,
    GaugePressure,
    DifferentialPressure,
    Density,
    MolecularWeight,
    /// Outputs read only when the fluid is a gas.
    GasOutput,
    /// Outputs read only when the fluid is a liquid or vapor.
    LiquidOutput,
}

/// One `(storage-field, engine-name, kind)` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub column: &'static str,
    pub engine_name: &'static str,
    pub kind: ParamKind,
    /// Code table for `Text` fields that carry enumeration codes.
    pub table: Option<CodeTable>,
    pub group: FieldGroup,
}

const fn field(
    column: &'static str,
    engine_name: &'static str,
    kind: ParamKind,
    group: FieldGroup,
) -> FieldSpec {
    FieldSpec {
        column,
        engine_name,
        kind,
        table: None,
        group,
    }
}

const fn coded(column: &'static str, engine_name: &'static str, table: CodeTable) -> FieldSpec {
    FieldSpec {
        column,
        engine_name,
        kind: ParamKind::Text,
        table: Some(table),
        group: FieldGroup::Always,
    }
}

use FieldGroup::*;
use ParamKind::{Flag, Number, Text, Unit};

/// Inputs pushed into a session, in push order.
pub const INPUT_FIELDS: &[FieldSpec] = &[
    coded("valve_type", "Valve Type", CodeTable::ValveType),
    coded(COL_FLUID_PHASE, "Fluid State", CodeTable::FluidPhase),
    coded("nominal_size", "Nominal Size", CodeTable::NominalSize),
    coded("pressure_class", "Pressure Class", CodeTable::PressureClass),
    field("fluid_name", "Fluid Name", Text, Always),
    field(COL_FLOW_IS_MASS, "Mass Flow Input", Flag, Always),
    field(COL_PRESSURE_IS_GAUGE, "Gauge Pressure Input", Flag, Always),
    field(COL_USES_DENSITY, "Density Input", Flag, Always),
    field("inlet_temperature", "Inlet Temperature", Number, Always),
    field("inlet_temperature_unit", "Inlet Temperature Unit", Unit, Always),
    field("inlet_pressure_max", "Inlet Pressure Max", Number, Always),
    field("inlet_pressure_normal", "Inlet Pressure Normal", Number, Always),
    field("inlet_pressure_min", "Inlet Pressure Min", Number, Always),
    field("inlet_pressure_unit", "Inlet Pressure Unit", Unit, Always),
    field("viscosity", "Viscosity", Number, Always),
    field("viscosity_unit", "Viscosity Unit", Unit, Always),
    // -- flow basis --
    field("mass_flow_max", "Mass Flow Max", Number, MassFlow),
    field("mass_flow_normal", "Mass Flow Normal", Number, MassFlow),
    field("mass_flow_min", "Mass Flow Min", Number, MassFlow),
    field("mass_flow_unit", "Mass Flow Unit", Unit, MassFlow),
    field("volume_flow_max", "Volumetric Flow Max", Number, VolumeFlow),
    field("volume_flow_normal", "Volumetric Flow Normal", Number, VolumeFlow),
    field("volume_flow_min", "Volumetric Flow Min", Number, VolumeFlow),
    field("volume_flow_unit", "Volumetric Flow Unit", Unit, VolumeFlow),
    // -- pressure basis --
    field("outlet_pressure_max", "Outlet Pressure Max", Number, GaugePressure),
    field("outlet_pressure_normal", "Outlet Pressure Normal", Number, GaugePressure),
    field("outlet_pressure_min", "Outlet Pressure Min", Number, GaugePressure),
    field("outlet_pressure_unit", "Outlet Pressure Unit", Unit, GaugePressure),
    field("pressure_drop_max", "Pressure Drop Max", Number, DifferentialPressure),
    field("pressure_drop_normal", "Pressure Drop Normal", Number, DifferentialPressure),
    field("pressure_drop_min", "Pressure Drop Min", Number, DifferentialPressure),
    field("pressure_drop_unit", "Pressure Drop Unit", Unit, DifferentialPressure),
    // -- fluid property basis --
    field("density", "Density", Number, Density),
    field("density_unit", "Density Unit", Unit, Density),
    field("molecular_weight", "Molecular Weight", Number, MolecularWeight),
    field("compressibility", "Compressibility Factor", Number, MolecularWeight),
];

/// Outputs read back after a calculation.
pub const OUTPUT_FIELDS: &[FieldSpec] = &[
    field("cv_max", "Calculated Cv Max", Number, Always),
    field("cv_normal", "Calculated Cv Normal", Number, Always),
    field("cv_min", "Calculated Cv Min", Number, Always),
    field("opening_max", "Valve Opening Max", Number, Always),
    field("opening_normal", "Valve Opening Normal", Number, Always),
    field("opening_min", "Valve Opening Min", Number, Always),
    field("noise_level", "Predicted Noise", Number, Always),
    field("noise_level_unit", "Predicted Noise Unit", Unit, Always),
    field("outlet_velocity", "Outlet Velocity", Number, Always),
    field("outlet_velocity_unit", "Outlet Velocity Unit", Unit, Always),
    field("flow_choked", "Choked Flow", Flag, Always),
    field("sizing_warning", "Sizing Warning", Text, Always),
    // -- group A: gas --
    field("std_volume_flow_max", "Standard Volumetric Flow Max", Number, GasOutput),
    field("std_volume_flow_normal", "Standard Volumetric Flow Normal", Number, GasOutput),
    field("std_volume_flow_min", "Standard Volumetric Flow Min", Number, GasOutput),
    field("std_volume_flow_unit", "Standard Volumetric Flow Unit", Unit, GasOutput),
    // -- group B: liquid / vapor --
    field("calc_mass_flow_max", "Calculated Mass Flow Max", Number, LiquidOutput),
    field("calc_mass_flow_normal", "Calculated Mass Flow Normal", Number, LiquidOutput),
    field("calc_mass_flow_min", "Calculated Mass Flow Min", Number, LiquidOutput),
    field("calc_mass_flow_unit", "Calculated Mass Flow Unit", Unit, LiquidOutput),
];

/// Find the entry for an engine parameter name in either list.
pub fn by_engine_name(engine_name: &str) -> Option<&'static FieldSpec> {
    INPUT_FIELDS
        .iter()
        .chain(OUTPUT_FIELDS.iter())
        .find(|f| f.engine_name == engine_name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
