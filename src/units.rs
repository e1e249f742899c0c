//! Physical unit conversions shared by the energy engine and the
//! statistics module (`stats.rs`). Values and factors match the constants
//! the original solver threads through `StatisticsRoutines.c` and the
//! acceptance-probability calculation.

/// Boltzmann constant in eV/K.
pub const BOLTZMANN_EV_PER_K: f64 = 8.617_333_262_145e-5;

/// Elementary charge in Coulomb.
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;

/// Angstrom to meter.
pub const ANGSTROM_TO_METER: f64 = 1e-10;

/// Cubic angstrom to cubic meter.
pub const ANGSTROM3_TO_METER3: f64 = 1e-30;

/// Converts an energy expressed in units of kT at the given temperature
/// (Kelvin) into electron-volts.
pub fn kt_to_ev(value_kt: f64, temperature_kelvin: f64) -> f64 {
    value_kt * BOLTZMANN_EV_PER_K * temperature_kelvin
}

/// Converts an energy expressed in electron-volts into units of kT at the
/// given temperature.
pub fn ev_to_kt(value_ev: f64, temperature_kelvin: f64) -> f64 {
    value_ev / (BOLTZMANN_EV_PER_K * temperature_kelvin)
}

/// Converts a length in Angstrom to meters.
pub fn angstrom_to_meter(value: f64) -> f64 {
    value * ANGSTROM_TO_METER
}

/// Converts a volume in cubic Angstrom to cubic meters.
pub fn angstrom3_to_meter3(value: f64) -> f64 {
    value * ANGSTROM3_TO_METER3
}
