// /src/co_alarm.rs
//! CO alarm escalation: confirm, broadcast, sound until clear.

use embedded_hal_async::delay::DelayNs;

use crate::constants::{
    CO_ALARM_POLL_INTERVAL_MS, CO_CALIBRATION_INTERVAL_MS, CO_CALIBRATION_SAMPLES,
    CO_DEBOUNCE_MS, MQ9_CLEAN_AIR_FACTOR_X10,
};
use crate::peripherals::{Buzzer, CoSensor, Display, GasSampler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmState {
    Idle,
    Confirming,
    Alerting,
    SoundingAlarm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmOutcome {
    /// Threshold not asserted
    Quiet,
    /// Asserted, but cleared before the debounce re-check
    Transient,
    /// Alert broadcast and alarm sounded until the threshold cleared
    Alarmed { notified: usize },
}

/// Receiver of the all-contacts alert.
#[allow(async_fn_in_trait)]
pub trait AlertSink {
    /// Sends the alert to every stored contact, returning how many succeeded.
    async fn broadcast_alert(&mut self) -> usize;
}

pub struct CoAlarm {
    state: AlarmState,
}

impl CoAlarm {
    pub const fn new() -> Self {
        Self {
            state: AlarmState::Idle,
        }
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Runs one pass of the sequence from `Idle`.
    ///
    /// Blocks the caller for the debounce delay when the threshold is
    /// asserted, and for as long as the alarm sounds.
    pub async fn run<S, B, D, A>(
        &mut self,
        sensor: &mut S,
        buzzer: &mut B,
        delay: &mut D,
        sink: &mut A,
    ) -> AlarmOutcome
    where
        S: CoSensor,
        B: Buzzer,
        D: DelayNs,
        A: AlertSink,
    {
        if !sensor.threshold_exceeded() {
            return AlarmOutcome::Quiet;
        }

        self.enter(AlarmState::Confirming);
        delay.delay_ms(CO_DEBOUNCE_MS).await;
        if !sensor.threshold_exceeded() {
            info!("CO spike cleared during debounce");
            self.enter(AlarmState::Idle);
            return AlarmOutcome::Transient;
        }

        self.enter(AlarmState::Alerting);
        let notified = sink.broadcast_alert().await;

        self.enter(AlarmState::SoundingAlarm);
        buzzer.on();
        while sensor.threshold_exceeded() {
            delay.delay_ms(CO_ALARM_POLL_INTERVAL_MS).await;
        }
        buzzer.off();

        self.enter(AlarmState::Idle);
        AlarmOutcome::Alarmed { notified }
    }

    fn enter(&mut self, state: AlarmState) {
        if state != AlarmState::Idle {
            warn!("CO alarm: {} -> {}", self.state, state);
        } else {
            info!("CO alarm: {} -> {}", self.state, state);
        }
        self.state = state;
    }
}

impl Default for CoAlarm {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the sensor's base resistance R0 from clean-air samples taken right
/// after power-up, showing progress on the display.
pub async fn calibrate_clean_air<G, Dp, D>(sampler: &mut G, display: &mut Dp, delay: &mut D) -> u32
where
    G: GasSampler,
    Dp: Display,
    D: DelayNs,
{
    display.clear();
    display.write_at(0, 0, "Calibrating MQ");

    let mut sum: u32 = 0;
    for _ in 0..CO_CALIBRATION_SAMPLES {
        sum = sum.saturating_add(sampler.sample_resistance().await);
        delay.delay_ms(CO_CALIBRATION_INTERVAL_MS).await;
    }
    let clean_air = (sum / CO_CALIBRATION_SAMPLES * 10 / MQ9_CLEAN_AIR_FACTOR_X10).max(1);
    info!("MQ-9 calibrated, R0 = {}", clean_air);

    display.clear();
    display.write_at(0, 0, "Calibration Done !");
    clean_air
}
