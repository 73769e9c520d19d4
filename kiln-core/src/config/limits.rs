//! Compile-time sizing and safety constants
//!
//! These fix array sizes throughout the crate. Boards with fewer heaters or
//! drives leave the surplus channels unconnected.

/// Number of heaters; heater 0 is the bed
pub const HEATERS: usize = 6;

/// Number of Cartesian axes (X, Y, Z)
pub const AXES: usize = 3;

/// Number of stepper drives (axes followed by extruders)
pub const DRIVES: usize = 8;

/// Drives below this index use the main digipot, the rest the expansion one
pub const MAIN_POT_DRIVES: usize = 4;

/// Samples averaged per thermistor reading (power of two)
pub const THERMISTOR_AVERAGE: usize = 32;

/// Samples averaged per Z-probe reading (power of two)
pub const Z_PROBE_AVERAGE: usize = 8;

/// Highest real ADC reading (12-bit converter)
pub const AD_RANGE_REAL: u16 = 4095;

/// Highest ADC reading after any oversampling
pub const AD_RANGE_VIRTUAL: u16 = 4095;

/// Raw reading at or above which a thermistor is considered disconnected
pub const AD_DISCONNECTED_REAL: u16 = AD_RANGE_REAL - 3;

/// Corrected reading at or above which a thermistor is considered disconnected
pub const AD_DISCONNECTED_VIRTUAL: u16 = AD_RANGE_VIRTUAL - 3;

/// Absolute zero in °C; also the "no valid reading" temperature
pub const ABS_ZERO: f32 = -273.15;

/// Temperature above which the acquisition interrupt cuts a heater (°C)
pub const BAD_HIGH_TEMPERATURE: f32 = 300.0;

/// Reported for a shorted thermistor (°C)
pub const SHORTED_TEMPERATURE: f32 = 2000.0;

/// Number of buffered file slots
pub const MAX_FILES: usize = 10;

/// Per-file buffer size in bytes
pub const FILE_BUF_LEN: usize = 256;

/// Longest path handled by the file store
pub const MAX_PATH_LENGTH: usize = 100;

/// Serial line input ring size
pub const LINE_IN_BUF: usize = 256;

/// Serial line output ring size
pub const LINE_OUT_BUF: usize = 1024;

/// Longest single formatted message
pub const MESSAGE_LENGTH: usize = 256;

/// Acquisition tick period while idle (seconds)
pub const STANDBY_INTERRUPT_RATE: f32 = 2.0e-4;

/// Tacho pulses counted between fan speed readings
pub const FAN_MAX_INTERRUPT_COUNT: u32 = 32;

/// Fan speed readings older than this are reported as 0 RPM (microseconds)
pub const FAN_READING_TIMEOUT_US: u32 = 3_000_000;

/// Seconds between "Class Platform spinning." reports in debug mode
pub const LONG_TIME: f32 = 300.0;
