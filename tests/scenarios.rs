//! Integration scenarios exercising a full Composition run: coupled
//! time-stepping components wired with `>>`, driven through Connect and
//! the Scheduler end to end.

use std::cell::RefCell;
use std::rc::Rc;

use finam::adapter::caching::{Delay, LinearTimeInterpolation, SumOverTime};
use finam::adapter::stateless::UnitConversion;
use finam::adapter::Adapter;
use finam::composition::Composition;
use finam::config::CompositionConfig;
use finam::connector::Connector;
use finam::envelope::prepare;
use finam::grid::GridSpec;
use finam::info::Info;
use finam::payload::Payload;
use finam::slot::{Input, InputSlot, Output, OutputSlot};
use finam::testkit::ClosureComponent;
use finam::time::{Time, TimeSpan};
use finam::units::{LinearUnitSystem, Units};

fn day(d: u32) -> Time {
    Time::from_ymd_hms(2023, 1, d, 0, 0, 0)
}

fn plain_info() -> Info {
    Info::new()
        .with_grid(GridSpec::NoGrid { ndims: 0 })
        .with_units(Units::dimensionless())
}

/// S1: two equal-step time-stepping components coupled directly; the
/// consumer must see every daily value from day 2 through day 31.
#[test]
fn s1_equal_step_two_model_run() {
    let step = TimeSpan::days(1);
    let start = day(1);

    let producer_out: Rc<RefCell<OutputSlot>> = Rc::new(RefCell::new(OutputSlot::new("value")));
    producer_out
        .borrow_mut()
        .push(prepare(Payload::scalar(1.0), &plain_info(), start).unwrap())
        .unwrap();
    let producer_out_init = producer_out.clone();
    let producer_out_update = producer_out.clone();

    let producer = ClosureComponent::time_stepping(
        "producer",
        start,
        start + step,
        move |connector: &mut Connector| {
            let slot: Rc<RefCell<dyn Output>> = producer_out_init.clone();
            connector.add_output("value", slot, plain_info(), None);
            Ok(())
        },
        move |t| {
            let next = t + step;
            let env = prepare(
                Payload::scalar(next.day_of_year() as f64),
                &plain_info(),
                next,
            )
            .unwrap();
            producer_out_update.borrow_mut().push(env)?;
            producer_out_update.borrow().notify_targets(next)?;
            Ok((next, Some(next + step)))
        },
    );

    let received = Rc::new(RefCell::new(Vec::new()));
    let received_update = received.clone();
    let consumer_in: Rc<RefCell<InputSlot>> = Rc::new(RefCell::new(InputSlot::new("value")));
    let consumer_in_init = consumer_in.clone();
    let consumer_in_update = consumer_in.clone();

    let consumer = ClosureComponent::time_stepping(
        "consumer",
        start,
        start + step,
        move |connector: &mut Connector| {
            let slot: Rc<RefCell<dyn Input>> = consumer_in_init.clone();
            connector.add_input("value", slot, plain_info(), Some(start));
            Ok(())
        },
        move |t| {
            let next = t + step;
            let env = consumer_in_update.borrow_mut().pull(next)?;
            received_update
                .borrow_mut()
                .push(env.payload().as_scalar().unwrap());
            Ok((next, Some(next + step)))
        },
    );

    let mut composition = Composition::new(CompositionConfig::default());
    let producer_idx = composition.add_component(Box::new(producer)).unwrap();
    let consumer_idx = composition.add_component(Box::new(consumer)).unwrap();
    (composition.output(producer_idx, "value") >> composition.input(consumer_idx, "value").unwrap())
        .unwrap();

    composition.run(day(31)).unwrap();

    let values = received.borrow();
    assert_eq!(values.len(), 30);
    assert_eq!(values[0], 2.0);
    assert_eq!(*values.last().unwrap(), 31.0);
}

/// S2: a linear time interpolation adapter answers an off-step pull with
/// the exact sample when the request lands on a pushed time.
#[test]
fn s2_linear_interpolation_exact_sample() {
    let producer_out: Rc<RefCell<OutputSlot>> = Rc::new(RefCell::new(OutputSlot::new("value")));
    for d in 14..=17 {
        producer_out
            .borrow_mut()
            .push(prepare(Payload::scalar(d as f64), &plain_info(), day(d)).unwrap())
            .unwrap();
    }
    let producer_out_init = producer_out.clone();
    let producer = ClosureComponent::stateless("producer", move |connector: &mut Connector| {
        let slot: Rc<RefCell<dyn Output>> = producer_out_init.clone();
        connector.add_output("value", slot, plain_info(), None);
        Ok(())
    });

    let consumer_in: Rc<RefCell<InputSlot>> = Rc::new(RefCell::new(InputSlot::new("value")));
    let consumer_in_init = consumer_in.clone();
    let consumer = ClosureComponent::stateless("consumer", move |connector: &mut Connector| {
        let slot: Rc<RefCell<dyn Input>> = consumer_in_init.clone();
        connector.add_input("value", slot, plain_info(), None);
        Ok(())
    });

    let mut composition = Composition::new(CompositionConfig::default());
    let producer_idx = composition.add_component(Box::new(producer)).unwrap();
    let consumer_idx = composition.add_component(Box::new(consumer)).unwrap();

    let interp = composition.adapter(Adapter::new("interp", Box::new(LinearTimeInterpolation::new())));
    (composition.output(producer_idx, "value") >> interp >> composition.input(consumer_idx, "value").unwrap())
        .unwrap();

    composition.run(day(18)).unwrap();

    let value = consumer_in.borrow_mut().pull(day(16)).unwrap();
    assert_eq!(value.payload().as_scalar(), Some(16.0));
}

/// S3: a circular coupling is safe when one of its two edges goes through
/// a delay adapter, since the cycle check only cares about non-delay
/// edges (spec.md §8 P5).
#[test]
fn s3_circular_coupling_with_delay_adapter_runs() {
    let step = TimeSpan::days(1);
    let start = day(1);

    let a_out: Rc<RefCell<OutputSlot>> = Rc::new(RefCell::new(OutputSlot::new("a_out")));
    a_out
        .borrow_mut()
        .push(prepare(Payload::scalar(1.0), &plain_info(), start).unwrap())
        .unwrap();
    let a_in: Rc<RefCell<InputSlot>> = Rc::new(RefCell::new(InputSlot::new("a_in")));
    let (a_out_init, a_out_update) = (a_out.clone(), a_out.clone());
    let (a_in_init, a_in_update) = (a_in.clone(), a_in.clone());

    let a = ClosureComponent::time_stepping(
        "a",
        start,
        start + step,
        move |connector: &mut Connector| {
            let out: Rc<RefCell<dyn Output>> = a_out_init.clone();
            let inp: Rc<RefCell<dyn Input>> = a_in_init.clone();
            connector.add_output("a_out", out, plain_info(), None);
            connector.add_input("a_in", inp, plain_info(), None);
            Ok(())
        },
        move |t| {
            let next = t + step;
            let upstream = a_in_update.borrow_mut().pull(t).unwrap_or_else(|_| {
                prepare(Payload::scalar(0.0), &plain_info(), t).unwrap()
            });
            let value = upstream.payload().as_scalar().unwrap() + 1.0;
            let env = prepare(Payload::scalar(value), &plain_info(), next).unwrap();
            a_out_update.borrow_mut().push(env)?;
            a_out_update.borrow().notify_targets(next)?;
            Ok((next, Some(next + step)))
        },
    );

    let b_out: Rc<RefCell<OutputSlot>> = Rc::new(RefCell::new(OutputSlot::new("b_out")));
    b_out
        .borrow_mut()
        .push(prepare(Payload::scalar(10.0), &plain_info(), start).unwrap())
        .unwrap();
    let b_in: Rc<RefCell<InputSlot>> = Rc::new(RefCell::new(InputSlot::new("b_in")));
    let (b_out_init, b_out_update) = (b_out.clone(), b_out.clone());
    let (b_in_init, b_in_update) = (b_in.clone(), b_in.clone());

    let b = ClosureComponent::time_stepping(
        "b",
        start,
        start + step,
        move |connector: &mut Connector| {
            let out: Rc<RefCell<dyn Output>> = b_out_init.clone();
            let inp: Rc<RefCell<dyn Input>> = b_in_init.clone();
            connector.add_output("b_out", out, plain_info(), None);
            connector.add_input("b_in", inp, plain_info(), None);
            Ok(())
        },
        move |t| {
            let next = t + step;
            let upstream = b_in_update.borrow_mut().pull(t).unwrap_or_else(|_| {
                prepare(Payload::scalar(0.0), &plain_info(), t).unwrap()
            });
            let value = upstream.payload().as_scalar().unwrap();
            let env = prepare(Payload::scalar(value), &plain_info(), next).unwrap();
            b_out_update.borrow_mut().push(env)?;
            b_out_update.borrow().notify_targets(next)?;
            Ok((next, Some(next + step)))
        },
    );

    let mut composition = Composition::new(CompositionConfig::default());
    let a_idx = composition.add_component(Box::new(a)).unwrap();
    let b_idx = composition.add_component(Box::new(b)).unwrap();

    let delay = composition.adapter(Adapter::new("delay", Box::new(Delay::new(step))).as_delay());
    (composition.output(a_idx, "a_out") >> delay >> composition.input(b_idx, "b_in").unwrap()).unwrap();
    (composition.output(b_idx, "b_out") >> composition.input(a_idx, "a_in").unwrap()).unwrap();

    composition.run(day(10)).unwrap();
}

/// S4: a link whose upstream only answers pulls and whose downstream only
/// reacts to pushes never carries data; the scheduler must reject it
/// before running instead of silently doing nothing.
#[test]
fn s4_dead_link_is_rejected() {
    use finam::slot::{CallbackInput, CallbackOutput};

    let producer = ClosureComponent::stateless("producer", move |connector: &mut Connector| {
        let slot: Rc<RefCell<dyn Output>> = Rc::new(RefCell::new(CallbackOutput::new(
            "value",
            |t| prepare(Payload::scalar(1.0), &plain_info(), t),
        )));
        connector.add_output("value", slot, plain_info(), None);
        Ok(())
    });
    let consumer = ClosureComponent::stateless("consumer", move |connector: &mut Connector| {
        let slot: Rc<RefCell<dyn Input>> = Rc::new(RefCell::new(CallbackInput::new(
            "value",
            |_env| Ok(()),
        )));
        connector.add_input("value", slot, plain_info(), None);
        Ok(())
    });

    let mut composition = Composition::new(CompositionConfig::default());
    let producer_idx = composition.add_component(Box::new(producer)).unwrap();
    let consumer_idx = composition.add_component(Box::new(consumer)).unwrap();

    let interp = composition.adapter(Adapter::new("interp", Box::new(LinearTimeInterpolation::new())));
    (composition.output(producer_idx, "value") >> interp >> composition.input(consumer_idx, "value").unwrap())
        .unwrap();

    let err = composition.run(day(2)).unwrap_err();
    assert!(format!("{err}").contains("DeadLink"));
}

/// S5: a unit-conversion adapter rescales m/s to km/h by exactly 3.6.
#[test]
fn s5_unit_conversion_mps_to_kmh() {
    let info_mps = Info::new()
        .with_grid(GridSpec::NoGrid { ndims: 0 })
        .with_units(Units::new("m/s"));

    let producer_out: Rc<RefCell<OutputSlot>> = Rc::new(RefCell::new(OutputSlot::new("speed")));
    producer_out
        .borrow_mut()
        .push(prepare(Payload::scalar(10.0), &info_mps, day(1)).unwrap())
        .unwrap();
    let producer_out_init = producer_out.clone();
    let producer = ClosureComponent::stateless("producer", move |connector: &mut Connector| {
        let slot: Rc<RefCell<dyn Output>> = producer_out_init.clone();
        connector.add_output("speed", slot, info_mps.clone(), None);
        Ok(())
    });

    let consumer_in: Rc<RefCell<InputSlot>> = Rc::new(RefCell::new(InputSlot::new("speed")));
    let consumer_in_init = consumer_in.clone();
    let consumer = ClosureComponent::stateless("consumer", move |connector: &mut Connector| {
        let slot: Rc<RefCell<dyn Input>> = consumer_in_init.clone();
        let desired = Info::new().with_units(Units::new("km/h"));
        connector.add_input("speed", slot, desired, None);
        Ok(())
    });

    let mut composition = Composition::new(CompositionConfig::default());
    let producer_idx = composition.add_component(Box::new(producer)).unwrap();
    let consumer_idx = composition.add_component(Box::new(consumer)).unwrap();

    let conv = composition.adapter(Adapter::new(
        "mps_to_kmh",
        Box::new(UnitConversion::new(Units::new("km/h"), LinearUnitSystem::new())),
    ));
    (composition.output(producer_idx, "speed") >> conv >> composition.input(consumer_idx, "speed").unwrap())
        .unwrap();

    composition.run(day(2)).unwrap();

    let value = consumer_in.borrow_mut().pull(day(1)).unwrap();
    assert!((value.payload().as_scalar().unwrap() - 36.0).abs() < 1e-9);
}

/// S6: a sum-over-time adapter turns a constant rate into an exact
/// amount over a one-day window, rewriting the unit label.
#[test]
fn s6_sum_over_time_constant_rate() {
    let producer_out: Rc<RefCell<OutputSlot>> = Rc::new(RefCell::new(OutputSlot::new("rate")));
    producer_out
        .borrow_mut()
        .push(prepare(Payload::scalar(20.0), &plain_info(), day(1)).unwrap())
        .unwrap();
    let producer_out_init = producer_out.clone();
    let producer = ClosureComponent::stateless("producer", move |connector: &mut Connector| {
        let slot: Rc<RefCell<dyn Output>> = producer_out_init.clone();
        connector.add_output("rate", slot, plain_info(), None);
        Ok(())
    });

    let consumer_in: Rc<RefCell<InputSlot>> = Rc::new(RefCell::new(InputSlot::new("rate")));
    let consumer_in_init = consumer_in.clone();
    let consumer = ClosureComponent::stateless("consumer", move |connector: &mut Connector| {
        let slot: Rc<RefCell<dyn Input>> = consumer_in_init.clone();
        connector.add_input("rate", slot, plain_info(), None);
        Ok(())
    });

    let mut composition = Composition::new(CompositionConfig::default());
    let producer_idx = composition.add_component(Box::new(producer)).unwrap();
    let consumer_idx = composition.add_component(Box::new(consumer)).unwrap();

    let sum = composition.adapter(Adapter::new(
        "sum_over_time",
        Box::new(SumOverTime::new(Units::dimensionless())),
    ));
    (composition.output(producer_idx, "rate") >> sum >> composition.input(consumer_idx, "rate").unwrap())
        .unwrap();

    composition.run(day(2)).unwrap();

    let value = consumer_in.borrow_mut().pull(day(2)).unwrap();
    assert!((value.payload().as_scalar().unwrap() - 20.0).abs() < 1e-9);
    assert_eq!(value.units(), &Units::dimensionless());
}
