//! Per-sensor signal processing: debounce for digital inputs, median/EMA
//! filtering for analog ones, and hysteretic state classification.

use std::collections::{HashMap, VecDeque};

use serde::Deserialize;

use crate::wire::{State, Thresholds};

/// Sampling mode of a sensor. Digital inputs are debounced; analog inputs
/// are filtered and classified against thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Digital,
    Analog,
}

/// Suppresses contact chatter on a digital input.
///
/// The first sample is emitted immediately as the stable value. After that a
/// changed sample only restarts the debounce clock; the new value becomes
/// stable (and is emitted once) when it has been observed unchanged for the
/// full debounce interval.
#[derive(Debug)]
pub struct Debouncer {
    debounce_seconds: f64,
    last_raw: Option<i64>,
    last_change: Option<f64>,
    stable: Option<i64>,
}

impl Debouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_seconds: debounce_ms as f64 / 1000.0,
            last_raw: None,
            last_change: None,
            stable: None,
        }
    }

    /// `now` is monotonic seconds. Returns the new stable value when one is
    /// established, `None` while the input is settling.
    pub fn update(&mut self, value: i64, now: f64) -> Option<i64> {
        let Some(stable) = self.stable else {
            self.stable = Some(value);
            self.last_raw = Some(value);
            self.last_change = Some(now);
            return Some(value);
        };

        if self.last_raw != Some(value) {
            self.last_raw = Some(value);
            self.last_change = Some(now);
            return None;
        }

        if stable != value {
            if let Some(changed) = self.last_change {
                if now - changed >= self.debounce_seconds {
                    self.stable = Some(value);
                    return Some(value);
                }
            }
        }
        None
    }
}

/// Sliding-window median. For even window sizes the upper middle of the
/// sorted window is returned.
#[derive(Debug)]
pub struct MedianFilter {
    window: VecDeque<f64>,
    capacity: usize,
}

impl MedianFilter {
    pub fn new(window_size: usize) -> Self {
        let capacity = window_size.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
        let mut ordered: Vec<f64> = self.window.iter().copied().collect();
        ordered.sort_by(f64::total_cmp);
        ordered[ordered.len() / 2]
    }
}

/// Exponential moving average, seeded with the first sample.
#[derive(Debug)]
pub struct EmaFilter {
    alpha: f64,
    value: Option<f64>,
}

impl EmaFilter {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        let next = match self.value {
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
            None => value,
        };
        self.value = Some(next);
        next
    }
}

/// Hysteretic low/ok classification.
///
/// Inside the `[low, ok)` band the state holds; with no history a value in
/// the band classifies as `low`, so under-stocked bins alert on first
/// observation. Absent or inverted thresholds carry the last state.
pub fn evaluate_threshold(
    value: f64,
    thresholds: &Thresholds,
    last_state: Option<&State>,
) -> State {
    let (Some(low), Some(ok)) = (thresholds.low, thresholds.ok) else {
        return last_state.cloned().unwrap_or(State::Ok);
    };
    if low >= ok {
        return last_state.cloned().unwrap_or(State::Ok);
    }

    match last_state {
        Some(State::Low) if value >= ok => State::Ok,
        Some(State::Ok) if value < low => State::Low,
        _ if value < low => State::Low,
        _ if value >= ok => State::Ok,
        _ => last_state.cloned().unwrap_or(State::Low),
    }
}

/// A classified reading produced by a [`SensorProcessor`], not yet assigned
/// a sequence id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub sensor_id: String,
    pub ts: String,
    pub raw_value: Option<f64>,
    pub normalized_value: Option<f64>,
    pub state: State,
}

/// Stateful per-sensor pipeline turning raw samples into reportable
/// readings.
pub struct SensorProcessor {
    sensor_id: String,
    mode: Mode,
    thresholds: Option<Thresholds>,
    state_map: Option<HashMap<String, String>>,
    report_on_change_only: bool,
    last_state: Option<State>,
    last_reported_state: Option<State>,
    debouncer: Option<Debouncer>,
    filter: Option<MedianFilter>,
}

impl SensorProcessor {
    pub fn new(
        sensor_id: &str,
        mode: Mode,
        debounce_ms: u64,
        thresholds: Option<Thresholds>,
        state_map: Option<HashMap<String, String>>,
        report_on_change_only: bool,
    ) -> Self {
        Self {
            sensor_id: sensor_id.to_owned(),
            mode,
            thresholds,
            state_map,
            report_on_change_only,
            last_state: None,
            last_reported_state: None,
            debouncer: (mode == Mode::Digital).then(|| Debouncer::new(debounce_ms)),
            filter: (mode == Mode::Analog).then(|| MedianFilter::new(5)),
        }
    }

    /// Feeds one sample through the pipeline. Returns a reading to enqueue,
    /// or `None` when the sample is suppressed (settling debounce, or an
    /// unchanged state under report-on-change).
    pub fn process(
        &mut self,
        raw_value: f64,
        mut normalized_value: f64,
        now: f64,
        ts_iso: &str,
    ) -> Option<NewReading> {
        let state = match self.mode {
            Mode::Digital => {
                let debouncer = self.debouncer.as_mut()?;
                let stable = debouncer.update(normalized_value as i64, now)?;
                normalized_value = stable as f64;
                self.state_from_digital(stable)
            }
            Mode::Analog => {
                if let Some(filter) = self.filter.as_mut() {
                    normalized_value = filter.update(normalized_value);
                }
                self.state_from_thresholds(normalized_value)
            }
        };

        self.last_state = Some(state.clone());
        if self.report_on_change_only && self.last_reported_state.as_ref() == Some(&state) {
            return None;
        }

        self.last_reported_state = Some(state.clone());
        Some(NewReading {
            sensor_id: self.sensor_id.clone(),
            ts: ts_iso.to_owned(),
            raw_value: Some(raw_value),
            normalized_value: Some(normalized_value),
            state,
        })
    }

    fn state_from_digital(&self, stable: i64) -> State {
        let key = if stable != 0 { "on" } else { "off" };
        match self.state_map.as_ref().and_then(|map| map.get(key)) {
            Some(label) => State::from(label.as_str()),
            None if stable != 0 => State::Ok,
            None => State::Out,
        }
    }

    fn state_from_thresholds(&self, value: f64) -> State {
        match &self.thresholds {
            Some(thresholds) => evaluate_threshold(value, thresholds, self.last_state.as_ref()),
            None => self.last_state.clone().unwrap_or(State::Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(low: f64, ok: f64) -> Thresholds {
        Thresholds {
            low: Some(low),
            ok: Some(ok),
        }
    }

    #[test]
    fn debouncer_emits_first_sample_then_settled_changes() {
        let mut debouncer = Debouncer::new(100);

        assert_eq!(debouncer.update(1, 0.0), Some(1));
        assert_eq!(debouncer.update(1, 0.02), None);
        assert_eq!(debouncer.update(0, 0.05), None);
        assert_eq!(debouncer.update(0, 0.15), None);
        assert_eq!(debouncer.update(0, 0.21), Some(0));
    }

    #[test]
    fn debouncer_ignores_a_lone_transient() {
        let mut debouncer = Debouncer::new(100);

        assert_eq!(debouncer.update(1, 0.0), Some(1));
        assert_eq!(debouncer.update(0, 0.01), None);
        assert_eq!(debouncer.update(1, 0.02), None);
        assert_eq!(debouncer.update(1, 0.30), None);
    }

    #[test]
    fn median_even_window_uses_upper_middle() {
        let mut median = MedianFilter::new(5);

        assert_eq!(median.update(10.0), 10.0);
        assert_eq!(median.update(1.0), 10.0);
        assert_eq!(median.update(7.0), 7.0);
    }

    #[test]
    fn median_zero_window_behaves_as_one() {
        let mut median = MedianFilter::new(0);

        assert_eq!(median.update(9.0), 9.0);
        assert_eq!(median.update(3.0), 3.0);
    }

    #[test]
    fn ema_smooths_toward_new_samples() {
        let mut ema = EmaFilter::new(0.5);

        assert_eq!(ema.update(10.0), 10.0);
        assert!((ema.update(20.0) - 15.0).abs() < 1e-9);
        assert!((ema.update(16.0) - 15.5).abs() < 1e-9);
    }

    #[test]
    fn missing_thresholds_carry_last_state() {
        assert_eq!(
            evaluate_threshold(5.0, &Thresholds::default(), None),
            State::Ok
        );
        let partial = Thresholds {
            low: Some(10.0),
            ok: None,
        };
        assert_eq!(
            evaluate_threshold(5.0, &partial, Some(&State::Low)),
            State::Low
        );
    }

    #[test]
    fn inverted_thresholds_carry_last_state() {
        let inverted = thresholds(10.0, 10.0);
        assert_eq!(evaluate_threshold(5.0, &inverted, None), State::Ok);
        assert_eq!(
            evaluate_threshold(5.0, &inverted, Some(&State::Low)),
            State::Low
        );
    }

    #[test]
    fn hysteresis_band_and_boundaries() {
        let t = thresholds(10.0, 20.0);

        assert_eq!(evaluate_threshold(5.0, &t, None), State::Low);
        assert_eq!(evaluate_threshold(15.0, &t, None), State::Low);
        assert_eq!(evaluate_threshold(15.0, &t, Some(&State::Ok)), State::Ok);
        assert_eq!(evaluate_threshold(15.0, &t, Some(&State::Low)), State::Low);
        assert_eq!(evaluate_threshold(25.0, &t, Some(&State::Low)), State::Ok);
    }

    #[test]
    fn hysteresis_walk_from_no_history() {
        let t = thresholds(10.0, 20.0);
        let mut last: Option<State> = None;
        let mut states = Vec::new();
        for value in [5.0, 15.0, 25.0, 15.0, 5.0] {
            let state = evaluate_threshold(value, &t, last.as_ref());
            states.push(state.clone());
            last = Some(state);
        }
        assert_eq!(
            states,
            vec![State::Low, State::Low, State::Ok, State::Ok, State::Low]
        );
    }

    #[test]
    fn feeding_band_values_after_ok_never_transitions() {
        let t = thresholds(10.0, 20.0);
        let mut last = State::Ok;
        for _ in 0..50 {
            last = evaluate_threshold(15.0, &t, Some(&last));
            assert_eq!(last, State::Ok);
        }
    }

    #[test]
    fn digital_processor_applies_debounce_and_state_map() {
        let state_map = HashMap::from([
            ("on".to_owned(), "open".to_owned()),
            ("off".to_owned(), "closed".to_owned()),
        ]);
        let mut processor =
            SensorProcessor::new("door-1", Mode::Digital, 100, None, Some(state_map), true);

        let first = processor
            .process(1.0, 1.0, 0.0, "2026-01-17T00:00:00Z")
            .unwrap();
        assert_eq!(first.state, State::Other("open".into()));
        assert_eq!(first.normalized_value, Some(1.0));

        assert!(processor
            .process(1.0, 1.0, 0.02, "2026-01-17T00:00:01Z")
            .is_none());
        assert!(processor
            .process(0.0, 0.0, 0.05, "2026-01-17T00:00:02Z")
            .is_none());

        let second = processor
            .process(0.0, 0.0, 0.16, "2026-01-17T00:00:03Z")
            .unwrap();
        assert_eq!(second.state, State::Other("closed".into()));
        assert_eq!(second.ts, "2026-01-17T00:00:03Z");
    }

    #[test]
    fn analog_processor_reports_on_change_only() {
        let mut processor = SensorProcessor::new(
            "bin-1",
            Mode::Analog,
            0,
            Some(thresholds(10.0, 20.0)),
            None,
            true,
        );

        let first = processor
            .process(5.0, 5.0, 0.0, "2026-01-17T00:00:10Z")
            .unwrap();
        assert_eq!(first.state, State::Low);

        let second = processor
            .process(50.0, 50.0, 1.0, "2026-01-17T00:00:11Z")
            .unwrap();
        assert_eq!(second.state, State::Ok);

        // Classifier yields ok again (band holds), which equals the last
        // reported state, so the sample is suppressed.
        assert!(processor
            .process(15.0, 15.0, 2.0, "2026-01-17T00:00:12Z")
            .is_none());
    }

    #[test]
    fn analog_processor_reports_every_sample_when_configured() {
        let mut processor = SensorProcessor::new(
            "bin-2",
            Mode::Analog,
            0,
            Some(thresholds(10.0, 20.0)),
            None,
            false,
        );

        let first = processor
            .process(12.0, 12.0, 0.0, "2026-01-17T00:01:00Z")
            .unwrap();
        assert_eq!(first.state, State::Low);

        let second = processor
            .process(13.0, 13.0, 1.0, "2026-01-17T00:01:01Z")
            .unwrap();
        assert_eq!(second.state, State::Low);
    }
}
