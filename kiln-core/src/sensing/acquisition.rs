//! Periodic ADC acquisition state machine
//!
//! Called from the tick interrupt. Each tick harvests the conversion started
//! on the previous tick and starts the next one, interleaving thermistors
//! with the Z probe in a four-tick cycle:
//!
//! ```text
//! Idle ─► ThermistorA ─► ZProbeOn ─► ThermistorB ─► ZProbeOff ─┐
//!              ▲                                               │
//!              └───────────────────────────────────────────────┘
//! ```
//!
//! State names say what the conversion in flight is. A modulated IR probe
//! has its emitter switched on when a cycle starts and off after the
//! emitter-on sample, so the two Z-probe filters see the lit and dark
//! signal respectively.
//!
//! The handler does no floating point and never blocks. It is the last line
//! of defence against thermal runaway: a thermistor reading past the
//! overheat threshold or at the disconnect level cuts that heater.

use kiln_hal::{AdcConverter, OutputPin};

use super::filter::AveragingFilter;
use super::shared::SensorShared;
use crate::config::limits::{AD_DISCONNECTED_REAL, HEATERS, THERMISTOR_AVERAGE, Z_PROBE_AVERAGE};
use crate::config::ZProbeType;
use crate::platform::heaters::HeaterOutputs;
use crate::traits::HeaterPwm;

/// Filter sum at or above which a thermistor counts as disconnected
const DISCONNECTED_SUM: u32 = AD_DISCONNECTED_REAL as u32 * THERMISTOR_AVERAGE as u32;

/// Conversion in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickState {
    /// Nothing started yet
    Idle,
    /// Thermistor, first half of the cycle
    ThermistorA,
    /// Z probe with the emitter on
    ZProbeOn,
    /// Thermistor, second half of the cycle
    ThermistorB,
    /// Z probe with the emitter off (modulated probes)
    ZProbeOff,
}

/// Interrupt-side acquisition engine
///
/// Owns the ADC, the probe modulation pin and the filters; publishes filter
/// state into [`SensorShared`] for the foreground.
pub struct Acquisition<'a, A: AdcConverter, P, H> {
    shared: &'a SensorShared,
    heaters: &'a HeaterOutputs<H>,
    adc: A,
    heater_channels: [A::Channel; HEATERS],
    z_probe_channel: A::Channel,
    modulation: P,
    thermistors: [AveragingFilter<THERMISTOR_AVERAGE>; HEATERS],
    z_probe_on: AveragingFilter<Z_PROBE_AVERAGE>,
    z_probe_off: AveragingFilter<Z_PROBE_AVERAGE>,
    state: TickState,
    current_heater: usize,
}

impl<'a, A, P, H> Acquisition<'a, A, P, H>
where
    A: AdcConverter,
    P: OutputPin,
    H: HeaterPwm,
{
    /// Create the engine
    ///
    /// Each thermistor filter is pre-filled with one blocking reading so
    /// temperatures are meaningful before the first full cycle. The Z probe
    /// is initialised for the probe type currently in `shared`.
    ///
    /// # Arguments
    /// * `shared` - State shared with the foreground
    /// * `heaters` - Heater outputs, for the safety cutoff
    /// * `adc` - Converter sampling thermistors and the probe
    /// * `heater_channels` - ADC channel of each heater's thermistor
    /// * `z_probe_channel` - ADC channel of the Z probe
    /// * `modulation` - Probe emitter/modulation output
    pub fn new(
        shared: &'a SensorShared,
        heaters: &'a HeaterOutputs<H>,
        mut adc: A,
        heater_channels: [A::Channel; HEATERS],
        z_probe_channel: A::Channel,
        modulation: P,
    ) -> Self {
        let mut thermistors: [AveragingFilter<THERMISTOR_AVERAGE>; HEATERS] =
            core::array::from_fn(|_| AveragingFilter::new());
        for (filter, &channel) in thermistors.iter_mut().zip(heater_channels.iter()) {
            filter.init(adc.read_blocking(channel));
        }
        for (heater, filter) in thermistors.iter().enumerate() {
            shared.thermistor(heater).publish(filter);
        }

        let mut acquisition = Self {
            shared,
            heaters,
            adc,
            heater_channels,
            z_probe_channel,
            modulation,
            thermistors,
            z_probe_on: AveragingFilter::new(),
            z_probe_off: AveragingFilter::new(),
            state: TickState::Idle,
            current_heater: 0,
        };
        acquisition.init_z_probe();
        acquisition
    }

    /// Reset the probe filters and put the emitter in its idle state
    fn init_z_probe(&mut self) {
        self.z_probe_on.init(0);
        self.z_probe_off.init(0);
        self.shared.z_probe_on().publish(&self.z_probe_on);
        self.shared.z_probe_off().publish(&self.z_probe_off);

        match self.shared.z_probe_type() {
            ZProbeType::Simple | ZProbeType::Modulated => self.modulation.set_high(),
            ZProbeType::Alternate => self.modulation.set_low(),
            ZProbeType::Switch => {}
        }
    }

    /// Process one tick
    pub fn tick(&mut self) {
        if !self.shared.is_active() {
            return;
        }
        if self.shared.take_probe_reinit() {
            self.init_z_probe();
        }

        match self.state {
            TickState::ThermistorA | TickState::ThermistorB => {
                self.harvest_thermistor();
                self.state = if self.state == TickState::ThermistorA {
                    TickState::ZProbeOn
                } else {
                    TickState::ZProbeOff
                };
            }
            TickState::ZProbeOn => {
                let reading = self.adc.read_result(self.z_probe_channel);
                self.z_probe_on.process_reading(reading);
                self.shared.z_probe_on().publish(&self.z_probe_on);
                self.adc
                    .start_conversion(self.heater_channels[self.current_heater]);
                if self.shared.z_probe_type() == ZProbeType::Modulated {
                    self.modulation.set_low();
                }
                self.state = TickState::ThermistorB;
            }
            TickState::ZProbeOff => {
                let reading = self.adc.read_result(self.z_probe_channel);
                self.z_probe_off.process_reading(reading);
                self.shared.z_probe_off().publish(&self.z_probe_off);
                self.start_cycle();
            }
            TickState::Idle => self.start_cycle(),
        }
    }

    fn start_cycle(&mut self) {
        self.adc
            .start_conversion(self.heater_channels[self.current_heater]);
        if self.shared.z_probe_type() == ZProbeType::Modulated {
            self.modulation.set_high();
        }
        self.state = TickState::ThermistorA;
    }

    fn harvest_thermistor(&mut self) {
        let heater = self.current_heater;
        let reading = self.adc.read_result(self.heater_channels[heater]);
        let filter = &mut self.thermistors[heater];
        filter.process_reading(reading);
        self.shared.thermistor(heater).publish(filter);
        self.adc.start_conversion(self.z_probe_channel);

        if filter.is_valid() {
            let sum = filter.sum();
            if sum < self.shared.overheat_sum(heater) || sum >= DISCONNECTED_SUM {
                self.heaters.cut(heater);
                self.shared.flag_heater_fault(heater);
            }
        }

        self.current_heater = (heater + 1) % HEATERS;
    }

    /// Conversion currently in flight
    pub fn state(&self) -> TickState {
        self.state
    }

    /// Heater whose thermistor is sampled next
    pub fn current_heater(&self) -> usize {
        self.current_heater
    }

    /// The ADC
    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }

    /// The probe modulation pin
    pub fn modulation(&self) -> &P {
        &self.modulation
    }
}
