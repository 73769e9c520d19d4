//! Platform façade
//!
//! One object the motion, heating and G-code layers talk to for everything
//! machine-dependent: temperatures, the Z probe, heaters, steppers, the fan,
//! motor currents, persisted settings, user messages and files.
//!
//! Everything is injected at construction through [`PlatformParts`]. The
//! interrupt-side pieces ([`SensorShared`], [`HeaterOutputs`], [`FanTacho`])
//! are borrowed so the board can hand the same references to its interrupt
//! handlers.

pub mod diagnostics;
pub mod drives;
pub mod fan;
pub mod heaters;
pub mod motor;

use core::fmt::{self, Write as _};

use embassy_time::{Duration, Instant};
use embedded_hal::pwm::SetDutyCycle;
use heapless::String;
use kiln_hal::{
    CharIo, FileSystem, FlashStorage, InputPin, OpenMode, OutputPin, SystemControl, TickTimer,
};

use crate::config::limits::{
    ABS_ZERO, AXES, BAD_HIGH_TEMPERATURE, DRIVES, HEATERS, LINE_IN_BUF, LINE_OUT_BUF, LONG_TIME,
    MAX_FILES, MESSAGE_LENGTH, STANDBY_INTERRUPT_RATE, THERMISTOR_AVERAGE, Z_PROBE_AVERAGE,
};
use crate::config::{
    Compatibility, ConfigError, NvConfigStore, PidParameters, ZProbeParameters, ZProbeType,
};
use crate::fmt::{debug, info, warn};
use crate::sensing::{probe, EndStopHit, SensorShared};
use crate::storage::{FileId, MassStorage, StorageError};
use crate::traits::{DigitalPot, HeaterPwm, ReplyMode, ReplySink};
use crate::transport::{Line, MessageType};

pub use diagnostics::{reset_reason, DiagnosticTest};
pub use drives::{DriveIo, DrivePolarity, Drives};
pub use fan::{CoolingFan, FanTacho};
pub use heaters::HeaterOutputs;
pub use motor::{CurrentSense, MotorCurrents};

/// Minimum time between "spinning" reports in debug mode
const CLASS_REPORT_INTERVAL: Duration = Duration::from_secs(LONG_TIME as u64);

/// Peripheral types of one controller board
pub trait Board {
    /// Flash backend of the configuration record
    type Storage: FlashStorage;
    /// Host serial interface (USB)
    type Host: CharIo;
    /// Auxiliary serial interface (PanelDue UART)
    type Aux: CharIo;
    /// Removable-media filesystem
    type Fs: FileSystem;
    /// Heater PWM bank
    type Heaters: HeaterPwm;
    /// Web reply collector
    type Reply: ReplySink;
    /// Chip-level control
    type System: SystemControl;
    /// Acquisition tick timer
    type Timer: TickTimer;
    /// Cooling fan PWM channel
    type Fan: SetDutyCycle;
    /// Stepper current digipot
    type Pot: DigitalPot;
    /// Digital output
    type Pin: OutputPin;
    /// Endstop input
    type Endstop: InputPin;
}

/// Wiring options that are fixed per board rather than persisted
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardConfig {
    /// Stepper pin polarities
    pub drives: DrivePolarity,
    /// Digipot wiring for motor currents
    pub current_sense: CurrentSense,
    /// Whether a low fan output runs the fan
    pub fan_inverted: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            drives: DrivePolarity::default(),
            current_sense: CurrentSense::default(),
            fan_inverted: true,
        }
    }
}

/// Everything a [`Platform`] is built from
pub struct PlatformParts<'a, B: Board> {
    /// Loaded configuration
    pub config: NvConfigStore<B::Storage>,
    /// Host serial interface
    pub host: B::Host,
    /// Auxiliary serial interface
    pub aux: B::Aux,
    /// Filesystem driver
    pub fs: B::Fs,
    /// State shared with the acquisition interrupt
    pub shared: &'a SensorShared,
    /// Heater outputs, shared with the acquisition interrupt
    pub heaters: &'a HeaterOutputs<B::Heaters>,
    /// Tachometer fed by the fan interrupt
    pub fan_tacho: &'a FanTacho,
    /// Stepper pins per drive
    pub drives: [DriveIo<B::Pin, B::Endstop>; DRIVES],
    /// Cooling fan PWM
    pub fan: B::Fan,
    /// Main board digipot
    pub main_pot: B::Pot,
    /// Expansion board digipot
    pub expansion_pot: B::Pot,
    /// ATX power supply control
    pub atx_power: B::Pin,
    /// Web reply collector
    pub reply: B::Reply,
    /// Acquisition tick timer
    pub timer: B::Timer,
    /// Chip-level control
    pub system: B::System,
    /// Fixed wiring options
    pub board: BoardConfig,
}

/// The machine-dependent façade
pub struct Platform<'a, B: Board> {
    config: NvConfigStore<B::Storage>,
    line: Line<B::Host, LINE_IN_BUF, LINE_OUT_BUF>,
    aux: Line<B::Aux, LINE_IN_BUF, LINE_OUT_BUF>,
    storage: MassStorage<B::Fs, MAX_FILES>,
    shared: &'a SensorShared,
    heaters: &'a HeaterOutputs<B::Heaters>,
    fan_tacho: &'a FanTacho,
    drives: Drives<B::Pin, B::Endstop>,
    fan: CoolingFan<B::Fan>,
    motors: MotorCurrents<B::Pot>,
    atx_power: B::Pin,
    reply: B::Reply,
    timer: B::Timer,
    system: B::System,
    message_indent: u8,
    active: bool,
    debug: bool,
    debug_code: Option<DiagnosticTest>,
    started: Instant,
    last_class_report: Instant,
}

impl<'a, B: Board> Platform<'a, B> {
    /// Assemble the façade; nothing touches the hardware until [`Platform::init`]
    pub fn new(parts: PlatformParts<'a, B>) -> Self {
        let now = Instant::now();
        Self {
            config: parts.config,
            line: Line::new(parts.host),
            aux: Line::new(parts.aux),
            storage: MassStorage::new(parts.fs),
            shared: parts.shared,
            heaters: parts.heaters,
            fan_tacho: parts.fan_tacho,
            drives: Drives::new(parts.drives, parts.board.drives),
            fan: CoolingFan::new(parts.fan, parts.board.fan_inverted),
            motors: MotorCurrents::new(
                parts.main_pot,
                parts.expansion_pot,
                parts.board.current_sense,
            ),
            atx_power: parts.atx_power,
            reply: parts.reply,
            timer: parts.timer,
            system: parts.system,
            message_indent: 0,
            active: false,
            debug: false,
            debug_code: None,
            started: now,
            last_class_report: now,
        }
    }

    /// Put every output in its safe state and start acquisition
    ///
    /// Drives are disabled, heaters and fan are off, the ATX supply is off,
    /// overheat thresholds are computed from the stored thermistor models,
    /// the Z probe is re-initialised and the tick runs at the standby rate.
    pub fn init(&mut self) {
        self.atx_power.set_low();
        self.line.init();
        self.aux.init();
        self.message_indent = 0;

        if let Err(e) = self.storage.init() {
            self.report_storage_error(&e);
        }

        self.drives.disable_all();
        self.heaters.all_off();
        for heater in 0..HEATERS {
            self.update_overheat_sum(heater);
        }
        self.cooling_fan(0.0);

        let probe = self.config.data().z_probe_type;
        self.shared.request_probe_reinit(probe);
        self.set_interrupt(STANDBY_INTERRUPT_RATE);

        self.active = true;
        self.shared.set_active(true);
        info!("platform initialised");
    }

    /// Foreground housekeeping, called every pass of the main loop
    pub fn spin(&mut self) {
        if !self.active {
            return;
        }
        if self.debug_code == Some(DiagnosticTest::SpinLockup) {
            // Never returns: the watchdog resets the board
            loop {
                core::hint::spin_loop();
            }
        }

        self.line.spin();
        self.aux.spin();
        self.class_report();
    }

    fn class_report(&mut self) {
        if !self.debug {
            return;
        }
        let now = Instant::now();
        if now - self.last_class_report < CLASS_REPORT_INTERVAL {
            return;
        }
        self.last_class_report = now;
        self.message(MessageType::Host, "Class Platform spinning.\n");
    }

    /// Stop the foreground and tick processing
    pub fn exit(&mut self) {
        self.message(MessageType::Both, "Platform class exited.\n");
        self.active = false;
        self.shared.set_active(false);
    }

    /// Whether [`Platform::init`] ran and [`Platform::exit`] did not
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable debug reporting
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Time since construction
    pub fn uptime(&self) -> Duration {
        Instant::now() - self.started
    }

    /// Set the acquisition tick period in seconds
    ///
    /// A non-positive period is reported and replaced by the standby rate.
    pub fn set_interrupt(&mut self, seconds: f32) {
        let seconds = if seconds > 0.0 {
            seconds
        } else {
            self.message(MessageType::BothError, "Negative interrupt!\n");
            STANDBY_INTERRUPT_RATE
        };
        self.timer.set_period_us((seconds * 1.0e6) as u32);
    }

    // Sensors

    /// Averaged raw ADC reading of a heater's thermistor
    pub fn get_raw_temperature(&self, heater: usize) -> u32 {
        if heater >= HEATERS {
            return 0;
        }
        self.shared.thermistor(heater).sum() / THERMISTOR_AVERAGE as u32
    }

    /// Temperature of a heater in °C
    ///
    /// A disconnected thermistor reads [`ABS_ZERO`], a shorted one 2000.
    pub fn get_temperature(&self, heater: usize) -> f32 {
        if heater >= HEATERS {
            return ABS_ZERO;
        }
        let raw = self.get_raw_temperature(heater);
        self.config.data().pid_params[heater].temperature_from_raw(raw)
    }

    /// Z-probe reading on the 10-bit scale, 0 while the filters fill
    pub fn z_probe(&self) -> i32 {
        probe::z_probe_value(
            self.config.data().z_probe_type,
            self.shared.z_probe_on(),
            self.shared.z_probe_off(),
        )
    }

    /// Extra probe readings: count and the emitter-on value
    pub fn z_probe_secondary_values(&self) -> (usize, i32) {
        let on = self.shared.z_probe_on();
        if !(on.is_valid() && self.shared.z_probe_off().is_valid()) {
            return (0, 0);
        }
        probe::z_probe_secondary_values(self.config.data().z_probe_type, on)
    }

    /// Averaged emitter-on probe ADC value, 0 for a switch probe
    pub fn raw_z_height(&self) -> u32 {
        if self.config.data().z_probe_type == ZProbeType::Switch {
            return 0;
        }
        self.shared.z_probe_on().sum() / Z_PROBE_AVERAGE as u32
    }

    /// Probe trigger height corrected for the bed temperature
    pub fn z_probe_stop_height(&self) -> f32 {
        self.config
            .data()
            .z_probe_parameters()
            .stop_height(self.get_temperature(0))
    }

    /// Whether X and Y must be homed before Z (a bed probe is fitted)
    pub fn must_home_xy_before_z(&self) -> bool {
        self.config.data().z_probe_type != ZProbeType::Switch
    }

    /// Endstop state of `drive`, using the probe for probed axes
    pub fn stopped(&self, drive: usize) -> EndStopHit {
        let data = self.config.data();
        if data.z_probe_type != ZProbeType::Switch && drive < AXES && data.z_probe_axes[drive] {
            return probe::z_probe_endstop(self.z_probe(), data.z_probe_parameters().adc_value);
        }
        self.drives.endstop(drive)
    }

    /// Whether the acquisition interrupt cut `heater`
    pub fn heater_fault(&self, heater: usize) -> bool {
        self.shared.heater_fault(heater)
    }

    /// Clear a latched heater fault
    pub fn clear_heater_fault(&mut self, heater: usize) {
        self.shared.clear_heater_fault(heater);
    }

    /// Accumulated error bits
    pub fn error_bits(&self) -> u32 {
        self.shared.error_bits()
    }

    /// Clear the accumulated error bits
    pub fn clear_error_bits(&mut self) {
        self.shared.clear_error_bits();
    }

    // Actuators

    /// Set heater power as a fraction in `[0, 1]`
    pub fn set_heater(&mut self, heater: usize, power: f32) {
        self.heaters.set_power(heater, power);
    }

    /// Set the direction of `drive`
    pub fn set_direction(&mut self, drive: usize, forwards: bool) {
        self.drives.set_direction(drive, forwards);
    }

    /// Step `drive` once, enabling it if needed
    pub fn step(&mut self, drive: usize) {
        self.drives.step(drive);
    }

    /// Disable the driver of `drive`
    pub fn disable(&mut self, drive: usize) {
        self.drives.disable(drive);
    }

    /// Set the cooling fan speed as a fraction or a legacy 0-255 value
    pub fn cooling_fan(&mut self, speed: f32) {
        if self.fan.set_speed(speed).is_err() {
            warn!("fan PWM write failed");
        }
    }

    /// Cooling fan speed in RPM
    pub fn fan_rpm(&self) -> f32 {
        self.fan_tacho.rpm(Instant::now().as_micros() as u32)
    }

    /// Set the motor current of `drive` in mA
    pub fn set_motor_current(&mut self, drive: usize, current: f32) {
        if drive >= DRIVES {
            return;
        }
        if self.motors.set(drive, current).is_err() {
            warn!("digipot write failed for drive {}", drive);
            self.message(MessageType::BothError, "Failed to set motor current.\n");
        }
    }

    /// Motor current of `drive` in mA, 0 if the digipot cannot be read
    pub fn motor_current(&mut self, drive: usize) -> f32 {
        if drive >= DRIVES {
            return 0.0;
        }
        self.motors.get(drive).unwrap_or(0.0)
    }

    /// Switch the ATX power supply
    pub fn set_atx_power(&mut self, on: bool) {
        self.atx_power.set_level(on);
    }

    // Persisted settings

    /// Loaded configuration store
    pub fn config(&self) -> &NvConfigStore<B::Storage> {
        &self.config
    }

    /// Firmware dialect being emulated
    pub fn emulating(&self) -> Compatibility {
        self.config.data().compatibility
    }

    /// Select the firmware dialect to emulate
    ///
    /// Unsupported dialects are reported and ignored.
    pub async fn set_emulating(&mut self, compatibility: Compatibility) {
        if !compatibility.is_supported() {
            self.message(MessageType::BothError, "Attempt to emulate unsupported firmware.\n");
            return;
        }
        let result = self.config.set_compatibility(compatibility).await;
        self.report_config(result);
    }

    /// IPv4 address
    pub fn ip_address(&self) -> [u8; 4] {
        self.config.data().ip_address
    }

    /// Set the IPv4 address
    pub async fn set_ip_address(&mut self, ip: [u8; 4]) {
        let result = self.config.set_ip_address(ip).await;
        self.report_config(result);
    }

    /// IPv4 netmask
    pub fn net_mask(&self) -> [u8; 4] {
        self.config.data().net_mask
    }

    /// Set the IPv4 netmask
    pub async fn set_net_mask(&mut self, mask: [u8; 4]) {
        let result = self.config.set_net_mask(mask).await;
        self.report_config(result);
    }

    /// IPv4 gateway
    pub fn gateway(&self) -> [u8; 4] {
        self.config.data().gateway
    }

    /// Set the IPv4 gateway
    pub async fn set_gateway(&mut self, gateway: [u8; 4]) {
        let result = self.config.set_gateway(gateway).await;
        self.report_config(result);
    }

    /// MAC address
    pub fn mac_address(&self) -> [u8; 6] {
        self.config.data().mac_address
    }

    /// Set the MAC address
    pub async fn set_mac_address(&mut self, mac: [u8; 6]) {
        let result = self.config.set_mac_address(mac).await;
        self.report_config(result);
    }

    /// Current Z-probe type
    pub fn z_probe_type(&self) -> ZProbeType {
        self.config.data().z_probe_type
    }

    /// Select the Z-probe type by number
    ///
    /// Numbers outside 0-3 select the switch. The probe is re-initialised
    /// even if the type did not change.
    pub async fn set_z_probe_type(&mut self, probe_type: i32) {
        let probe = u8::try_from(probe_type)
            .map(ZProbeType::from_u8)
            .unwrap_or(ZProbeType::Switch);
        let result = self.config.set_z_probe_type(probe).await;
        self.report_config(result);
        self.shared.request_probe_reinit(probe);
    }

    /// Axes homed with the probe
    pub fn z_probe_axes(&self) -> [bool; AXES] {
        self.config.data().z_probe_axes
    }

    /// Select the axes homed with the probe
    pub async fn set_z_probe_axes(&mut self, axes: [bool; AXES]) {
        let result = self.config.set_z_probe_axes(axes).await;
        self.report_config(result);
    }

    /// Parameters of the current probe type
    pub fn z_probe_parameters(&self) -> ZProbeParameters {
        *self.config.data().z_probe_parameters()
    }

    /// Replace the parameters of the current probe type
    pub async fn set_z_probe_parameters(&mut self, params: ZProbeParameters) {
        let result = self.config.set_z_probe_parameters(params).await;
        self.report_config(result);
    }

    /// PID and thermistor parameters of `heater`
    pub fn pid_parameters(&self, heater: usize) -> Option<&PidParameters> {
        self.config.data().pid_params.get(heater)
    }

    /// Replace the PID and thermistor parameters of `heater`
    ///
    /// The overheat threshold follows the new thermistor model.
    pub async fn set_pid_parameters(&mut self, heater: usize, params: PidParameters) {
        let result = self.config.set_pid_parameters(heater, params).await;
        self.report_config(result);
        if heater < HEATERS {
            self.update_overheat_sum(heater);
        }
    }

    fn update_overheat_sum(&mut self, heater: usize) {
        let sum = self.config.data().pid_params[heater]
            .overheat_sum(BAD_HIGH_TEMPERATURE, THERMISTOR_AVERAGE);
        debug!("heater {} overheat sum {}", heater, sum);
        self.shared.set_overheat_sum(heater, sum);
    }

    fn report_config(&mut self, result: Result<bool, ConfigError>) {
        let Err(e) = result else {
            return;
        };
        warn!("config update failed: {}", e);
        let text = match e {
            ConfigError::InvalidHeater => "Invalid heater number.\n",
            ConfigError::UnsupportedCompatibility => "Attempt to emulate unsupported firmware.\n",
            _ => "Failed to save settings to flash.\n",
        };
        self.message(MessageType::BothError, text);
    }

    // Messages

    /// Indent applied to serial messages that start a line
    pub fn set_message_indent(&mut self, indent: u8) {
        self.message_indent = indent;
    }

    /// Send `text` to the destinations of `kind`
    ///
    /// `mode` decides whether web text replaces or extends the pending
    /// reply; the serial line is unaffected by it.
    pub fn emit(&mut self, kind: MessageType, mode: ReplyMode, text: &str) {
        let route = kind.route();
        if let Some(line) = route.line {
            if self.line.output_column() == 0 {
                for _ in 0..self.message_indent {
                    self.line.write(b' ', line.blocking);
                }
            }
            self.line.write_str(text, line.blocking);
        }
        if let Some(web) = route.web {
            self.reply.deliver(text, web.error, mode);
        }
    }

    /// Start a new message
    pub fn message(&mut self, kind: MessageType, text: &str) {
        self.emit(kind, ReplyMode::Replace, text);
    }

    /// Continue the current message
    pub fn append_message(&mut self, kind: MessageType, text: &str) {
        self.emit(kind, ReplyMode::Append, text);
    }

    /// Start a new formatted message
    ///
    /// Text beyond [`MESSAGE_LENGTH`] bytes is dropped.
    pub fn message_fmt(&mut self, kind: MessageType, args: fmt::Arguments<'_>) {
        let text = format_message(args);
        self.emit(kind, ReplyMode::Replace, &text);
    }

    /// Continue the current message with formatted text
    pub fn append_message_fmt(&mut self, kind: MessageType, args: fmt::Arguments<'_>) {
        let text = format_message(args);
        self.emit(kind, ReplyMode::Append, &text);
    }

    /// Host serial line
    pub fn line_mut(&mut self) -> &mut Line<B::Host, LINE_IN_BUF, LINE_OUT_BUF> {
        &mut self.line
    }

    /// Auxiliary serial line
    pub fn aux_mut(&mut self) -> &mut Line<B::Aux, LINE_IN_BUF, LINE_OUT_BUF> {
        &mut self.aux
    }

    // Files

    /// Open a file in a free slot, reporting failures
    pub fn get_file_store(
        &mut self,
        directory: Option<&str>,
        file_name: &str,
        write: bool,
    ) -> Option<FileId> {
        let mode = if write { OpenMode::Write } else { OpenMode::Read };
        let result = self.storage.open_file(directory, file_name, mode);
        self.report_storage(result)
    }

    /// Run a file operation, reporting any failure
    pub fn with_storage<T>(
        &mut self,
        op: impl FnOnce(&mut MassStorage<B::Fs, MAX_FILES>) -> Result<T, StorageError>,
    ) -> Option<T> {
        let result = op(&mut self.storage);
        self.report_storage(result)
    }

    /// File pool, for operations whose failures the caller handles
    pub fn mass_storage_mut(&mut self) -> &mut MassStorage<B::Fs, MAX_FILES> {
        &mut self.storage
    }

    fn report_storage<T>(&mut self, result: Result<T, StorageError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.report_storage_error(&e);
                None
            }
        }
    }

    fn report_storage_error(&mut self, e: &StorageError) {
        warn!("storage: {}", e);
        self.message_fmt(e.message_type(), format_args!("{}\n", e));
    }
}

fn format_message(args: fmt::Arguments<'_>) -> String<MESSAGE_LENGTH> {
    let mut text = String::new();
    // Overflow keeps what fitted
    let _ = text.write_fmt(args);
    text
}
