//! Time-caching adapter logic: these buffer more than one pushed value so
//! they can synthesize an answer at an arbitrary requested time
//! (interpolation, windowed averaging/summation) or deliberately answer
//! from a stale value to break a dependency cycle (delay) (spec.md §4.6).

use std::collections::VecDeque;

use crate::envelope::Envelope;
use crate::error::{ErrorContext, FinamError, Result};
use crate::info::Info;
use crate::payload::Payload;
use crate::time::{Time, TimeSpan};
use crate::units::Units;

use super::AdapterLogic;

fn time_regress(what: &str) -> FinamError {
    FinamError::data(
        ErrorContext::new(),
        format!("TimeRegress: {what} requires strictly increasing pushes"),
    )
}

/// Interpolates linearly between the two buffered points bracketing the
/// requested time.
#[derive(Debug, Default)]
pub struct LinearTimeInterpolation {
    buffer: VecDeque<Envelope>,
}

impl LinearTimeInterpolation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdapterLogic for LinearTimeInterpolation {
    fn push(&mut self, env: Envelope) -> Result<()> {
        if let Some(last) = self.buffer.back() {
            if env.time() <= last.time() {
                return Err(time_regress("linear time interpolation"));
            }
        }
        self.buffer.push_back(env);
        Ok(())
    }

    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope> {
        if self.buffer.is_empty() {
            self.buffer.push_back(pull_upstream(time)?);
        }
        let idx = self
            .buffer
            .iter()
            .rposition(|e| e.time() <= time)
            .ok_or_else(|| FinamError::no_data(ErrorContext::new()))?;
        if idx + 1 >= self.buffer.len() {
            let only = &self.buffer[idx];
            return if only.time() == time {
                Ok(only.clone())
            } else {
                Err(FinamError::no_data(ErrorContext::new()))
            };
        }
        let t0 = self.buffer[idx].clone();
        let t1 = self.buffer[idx + 1].clone();
        let span = t1.time() - t0.time();
        let frac = (time - t0.time()).fraction_of(span);
        let interpolated = t0
            .payload()
            .zip_with(t1.payload(), |a, b| a + (b - a) * frac);
        self.buffer.drain(0..idx);
        Ok(t0.with_payload(interpolated).with_time(time))
    }
}

/// Zero-order hold between the two buffered points bracketing the
/// requested time, switching from the earlier to the later value once
/// the interval fraction passes `position` (0.0 = always the earlier
/// value / step-left, 1.0 = always the later value / step-right).
#[derive(Debug)]
pub struct StepInterpolation {
    position: f64,
    buffer: VecDeque<Envelope>,
}

impl StepInterpolation {
    pub fn new(position: f64) -> Self {
        StepInterpolation {
            position: position.clamp(0.0, 1.0),
            buffer: VecDeque::new(),
        }
    }
}

impl AdapterLogic for StepInterpolation {
    fn push(&mut self, env: Envelope) -> Result<()> {
        if let Some(last) = self.buffer.back() {
            if env.time() <= last.time() {
                return Err(time_regress("step interpolation"));
            }
        }
        self.buffer.push_back(env);
        Ok(())
    }

    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope> {
        if self.buffer.is_empty() {
            self.buffer.push_back(pull_upstream(time)?);
        }
        let idx = self
            .buffer
            .iter()
            .rposition(|e| e.time() <= time)
            .ok_or_else(|| FinamError::no_data(ErrorContext::new()))?;
        let chosen = if idx + 1 >= self.buffer.len() {
            self.buffer[idx].clone()
        } else {
            let t0 = &self.buffer[idx];
            let t1 = &self.buffer[idx + 1];
            let span = t1.time() - t0.time();
            let frac = (time - t0.time()).fraction_of(span);
            if frac <= self.position {
                t0.clone()
            } else {
                t1.clone()
            }
        };
        self.buffer.drain(0..idx);
        Ok(chosen.with_time(time))
    }
}

/// Computes the zero-order-hold weighted contribution of every buffered
/// value over `[window_start, window_end)`, shared by [`TimeAveraging`]
/// and [`SumOverTime`]. Returns the summed payload and the total window
/// length in days (the weight denominator an average divides by).
fn windowed_sum(
    buffer: &VecDeque<Envelope>,
    window_start: Time,
    window_end: Time,
) -> Result<(Payload, f64)> {
    let mut acc: Option<Payload> = None;
    let mut weight_sum = 0.0;
    for i in 0..buffer.len() {
        let seg_start = buffer[i].time().max(window_start);
        let seg_end = if i + 1 < buffer.len() {
            buffer[i + 1].time()
        } else {
            window_end
        }
        .min(window_end);
        if seg_end <= seg_start {
            continue;
        }
        let weight = (seg_end - seg_start).as_days_f64();
        let contribution = buffer[i].payload().scale(weight);
        acc = Some(match acc {
            Some(a) => a.zip_with(&contribution, |x, y| x + y),
            None => contribution,
        });
        weight_sum += weight;
    }
    let acc = acc.ok_or_else(|| FinamError::no_data(ErrorContext::new()))?;
    Ok((acc, weight_sum))
}

/// Time-weighted average of the buffered (zero-order-hold) signal over
/// the step between the previous and current requested time.
#[derive(Debug, Default)]
pub struct TimeAveraging {
    buffer: VecDeque<Envelope>,
    window_start: Option<Time>,
}

impl TimeAveraging {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdapterLogic for TimeAveraging {
    fn push(&mut self, env: Envelope) -> Result<()> {
        if let Some(last) = self.buffer.back() {
            if env.time() <= last.time() {
                return Err(time_regress("time averaging"));
            }
        }
        self.buffer.push_back(env);
        Ok(())
    }

    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope> {
        if self.buffer.is_empty() {
            self.buffer.push_back(pull_upstream(time)?);
        }
        let window_start = self
            .window_start
            .unwrap_or_else(|| self.buffer.front().unwrap().time());
        if time <= window_start {
            return Err(FinamError::data(
                ErrorContext::new(),
                "time averaging requires a strictly advancing target step",
            ));
        }
        let (summed, weight) = windowed_sum(&self.buffer, window_start, time)?;
        let averaged = summed.scale(1.0 / weight);
        let carry = self.buffer.back().unwrap().clone();
        let result = carry.with_payload(averaged).with_time(time);
        self.buffer.clear();
        self.buffer.push_back(carry);
        self.window_start = Some(time);
        Ok(result)
    }
}

/// Time-weighted sum of the buffered (zero-order-hold) signal over the
/// step between the previous and current requested time, rewriting a
/// rate's units into an amount (e.g. `mm/d` -> dimensionless over a
/// one-day step) per the configured output units.
#[derive(Debug)]
pub struct SumOverTime {
    buffer: VecDeque<Envelope>,
    window_start: Option<Time>,
    output_units: Units,
}

impl SumOverTime {
    pub fn new(output_units: Units) -> Self {
        SumOverTime {
            buffer: VecDeque::new(),
            window_start: None,
            output_units,
        }
    }
}

impl AdapterLogic for SumOverTime {
    fn push(&mut self, env: Envelope) -> Result<()> {
        if let Some(last) = self.buffer.back() {
            if env.time() <= last.time() {
                return Err(time_regress("sum over time"));
            }
        }
        self.buffer.push_back(env);
        Ok(())
    }

    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope> {
        if self.buffer.is_empty() {
            self.buffer.push_back(pull_upstream(time)?);
        }
        let window_start = self
            .window_start
            .unwrap_or_else(|| self.buffer.front().unwrap().time());
        if time <= window_start {
            return Err(FinamError::data(
                ErrorContext::new(),
                "sum over time requires a strictly advancing target step",
            ));
        }
        let (summed, _weight) = windowed_sum(&self.buffer, window_start, time)?;
        let carry = self.buffer.back().unwrap().clone();
        let result = carry
            .with_payload(summed)
            .with_time(time)
            .with_units(self.output_units.clone());
        self.buffer.clear();
        self.buffer.push_back(carry);
        self.window_start = Some(time);
        Ok(result)
    }

    fn get_info(&self, info: Info) -> Info {
        info.with_units(self.output_units.clone())
    }
}

/// Buffers pushed values and answers a pull at `time` with the value at
/// `time - delay`, falling back to an upstream pull shifted the same way.
/// Used to cut a dependency cycle: the scheduler can treat this link as
/// satisfiable from a strictly past value (spec.md §5 P5).
#[derive(Debug)]
pub struct Delay {
    delay: TimeSpan,
    buffer: VecDeque<Envelope>,
}

impl Delay {
    pub fn new(delay: TimeSpan) -> Self {
        Delay {
            delay,
            buffer: VecDeque::new(),
        }
    }
}

impl AdapterLogic for Delay {
    fn push(&mut self, env: Envelope) -> Result<()> {
        if let Some(last) = self.buffer.back() {
            if env.time() <= last.time() {
                return Err(time_regress("delay"));
            }
        }
        self.buffer.push_back(env);
        Ok(())
    }

    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope> {
        let shifted = time - self.delay;
        let idx = self.buffer.iter().rposition(|e| e.time() <= shifted);
        let source = match idx {
            Some(i) => {
                let env = self.buffer[i].clone();
                self.buffer.drain(0..i);
                env
            }
            None => pull_upstream(shifted)?,
        };
        Ok(source.with_time(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::prepare;
    use crate::grid::GridSpec;
    use crate::info::Info;

    fn info() -> Info {
        Info::new()
            .with_grid(GridSpec::NoGrid { ndims: 0 })
            .with_units(Units::dimensionless())
    }

    fn day(d: u32) -> Time {
        Time::from_ymd_hms(2023, 1, d, 0, 0, 0)
    }

    #[test]
    fn linear_interpolation_at_exact_sample_is_identity() {
        let mut logic = LinearTimeInterpolation::new();
        for d in 14..=17 {
            let env = prepare(Payload::scalar(d as f64), &info(), day(d)).unwrap();
            logic.push(env).unwrap();
        }
        let out = logic.get(day(16), &mut |_| unreachable!()).unwrap();
        assert_eq!(out.payload().as_scalar(), Some(16.0));
    }

    #[test]
    fn linear_interpolation_midpoint() {
        let mut logic = LinearTimeInterpolation::new();
        logic
            .push(prepare(Payload::scalar(10.0), &info(), day(1)).unwrap())
            .unwrap();
        logic
            .push(prepare(Payload::scalar(20.0), &info(), day(2)).unwrap())
            .unwrap();
        let noon = day(1) + TimeSpan::seconds(12 * 3600);
        let out = logic.get(noon, &mut |_| unreachable!()).unwrap();
        assert!((out.payload().as_scalar().unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn sum_over_time_of_constant_rate_over_one_day() {
        let mut logic = SumOverTime::new(Units::dimensionless());
        logic
            .push(prepare(Payload::scalar(20.0), &info(), day(1)).unwrap())
            .unwrap();
        let out = logic.get(day(2), &mut |_| unreachable!()).unwrap();
        assert!((out.payload().as_scalar().unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(out.units(), &Units::dimensionless());
    }

    #[test]
    fn delay_answers_from_past_buffer() {
        let mut logic = Delay::new(TimeSpan::days(1));
        logic
            .push(prepare(Payload::scalar(1.0), &info(), day(1)).unwrap())
            .unwrap();
        logic
            .push(prepare(Payload::scalar(2.0), &info(), day(2)).unwrap())
            .unwrap();
        let out = logic.get(day(3), &mut |_| unreachable!()).unwrap();
        assert_eq!(out.payload().as_scalar(), Some(2.0));
        assert_eq!(out.time(), day(3));
    }
}
