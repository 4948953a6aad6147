mod common;

use common::{ActuatorCall, MockDispatcher, network, two_phase_item};
use signal_core::controller::{
    AdvanceMode, CONTROLLER_POKE_PRIORITY, ControllerConfig, ControllerError, DispatchError,
    IntersectionState, PokeEvent, PretimedController,
};
use signal_core::telemetry::{ScheduleTransition, TransitionRecorder};

fn cycling(ids: &[u64]) -> PretimedController {
    PretimedController::new(
        2,
        ControllerConfig::default().with_mode(AdvanceMode::FullCycling),
        ids.iter().copied(),
    )
    .with_listener(TransitionRecorder::new())
}

#[test]
fn every_poke_rearms_one_step_later() {
    let mut controller = cycling(&[1]);
    controller.assign_schedule(1, two_phase_item(0.0));
    let mut dispatcher = MockDispatcher::at(0.0);
    let mut net = network(&[1]);

    controller.register_with_dispatcher(&mut dispatcher).unwrap();
    controller.initialize(0.0, &mut net);
    for step in 1..=3_u32 {
        let now = f64::from(step) * 2.0;
        dispatcher.now = now;
        controller.poke(&mut dispatcher, &mut net, now).unwrap();
    }

    let times: Vec<f64> = dispatcher.events.iter().map(|event| event.time).collect();
    assert_eq!(times, vec![2.0, 4.0, 6.0, 8.0]);
    assert!(
        dispatcher
            .events
            .iter()
            .all(|event| event.priority == CONTROLLER_POKE_PRIORITY && event.target == 2)
    );
}

#[test]
fn custom_step_moves_registration() {
    let controller: PretimedController =
        PretimedController::new(5, ControllerConfig::default().with_step(0.5), [1]);
    let mut dispatcher = MockDispatcher::at(10.0);

    controller.register_with_dispatcher(&mut dispatcher).unwrap();

    assert_eq!(dispatcher.events.as_slice(), &[PokeEvent::new(5, 10.5)]);
}

#[test]
fn rejected_registration_is_fatal() {
    let controller: PretimedController =
        PretimedController::new(5, ControllerConfig::default().with_step(-2.0), [1]);
    let mut dispatcher = MockDispatcher::at(10.0);

    assert_eq!(
        controller.register_with_dispatcher(&mut dispatcher),
        Err(ControllerError::InvalidStep(-2.0))
    );

    let mut controller: PretimedController =
        PretimedController::new(5, ControllerConfig::default(), [1]);
    controller.assign_schedule_durations(1, &[10.0]);
    let mut net = network(&[1]);
    controller.initialize(0.0, &mut net);
    dispatcher.now = 50.0;

    let result = controller.poke(&mut dispatcher, &mut net, 10.0);

    assert_eq!(
        result,
        Err(ControllerError::Dispatch(DispatchError::PastTime {
            requested: 12.0,
            now: 50.0,
        }))
    );
}

#[test]
fn later_item_takes_over_with_one_transition() {
    let mut controller = cycling(&[1]);
    controller.assign_schedule(1, two_phase_item(0.0));
    controller.assign_schedule(1, two_phase_item(100.0));
    let mut dispatcher = MockDispatcher::at(0.0);
    let mut net = network(&[1]);
    controller.initialize(0.0, &mut net);

    controller.poke(&mut dispatcher, &mut net, 98.0).unwrap();
    assert_eq!(controller.current_schedule_item_index(), Some(0));

    controller.poke(&mut dispatcher, &mut net, 100.0).unwrap();
    controller.poke(&mut dispatcher, &mut net, 102.0).unwrap();

    assert_eq!(controller.state(), IntersectionState::Active(1));
    let recorder = controller.listener().unwrap();
    let transitions: Vec<ScheduleTransition> = recorder
        .oldest_first()
        .map(|record| record.transition)
        .collect();
    assert_eq!(
        transitions,
        vec![
            ScheduleTransition::new(0.0, 2, Some(0)),
            ScheduleTransition::new(100.0, 2, Some(1)),
        ]
    );
    let elapsed = recorder.latest().unwrap().elapsed_since_previous.unwrap();
    assert!((elapsed - 100.0).abs() < 1e-9);
}

#[test]
fn stage_commands_follow_cycle_position() {
    let mut controller = cycling(&[1]);
    controller.assign_schedule(1, two_phase_item(0.0));
    let mut net = network(&[1]);
    controller.initialize(0.0, &mut net);

    for now in [10.0, 30.0, 45.0, 60.0, 61.0] {
        controller.update_controller(&mut net, now);
    }

    assert_eq!(net[&1].stages(), vec![vec![1], vec![2], vec![1]]);
}

#[test]
fn strict_mode_pins_first_stage_across_pokes() {
    let mut controller: PretimedController =
        PretimedController::new(2, ControllerConfig::default(), [1]);
    controller.assign_schedule(1, two_phase_item(0.0));
    controller.assign_schedule(1, two_phase_item(100.0));
    let mut dispatcher = MockDispatcher::at(0.0);
    let mut net = network(&[1]);
    controller.initialize(0.0, &mut net);

    for step in 1..=20_u32 {
        let now = f64::from(step) * 10.0;
        controller.poke(&mut dispatcher, &mut net, now).unwrap();
    }

    assert_eq!(controller.current_schedule_item_index(), Some(0));
    assert_eq!(net[&1].stages(), vec![vec![1]]);
    assert_eq!(controller.listener().unwrap().len(), 1);
}

#[test]
fn no_listener_means_no_emission() {
    let mut controller: PretimedController = PretimedController::new(
        2,
        ControllerConfig::default().with_mode(AdvanceMode::FullCycling),
        [1],
    );
    controller.assign_schedule(1, two_phase_item(0.0));
    controller.assign_schedule(1, two_phase_item(50.0));
    let mut net = network(&[1]);

    controller.initialize(0.0, &mut net);
    controller.update_controller(&mut net, 50.0);

    assert!(controller.listener().is_none());
    assert_eq!(controller.current_schedule_item_index(), Some(1));
}

#[test]
fn listener_can_be_swapped_at_runtime() {
    let mut controller = cycling(&[1]);
    controller.assign_schedule(1, two_phase_item(0.0));
    controller.assign_schedule(1, two_phase_item(50.0));
    let mut net = network(&[1]);
    controller.initialize(0.0, &mut net);

    let first = controller.take_listener().unwrap();
    assert_eq!(first.len(), 1);
    controller.update_controller(&mut net, 50.0);
    controller.set_listener(TransitionRecorder::new());
    assert!(controller.listener().unwrap().is_empty());
}

#[test]
fn dark_until_first_start_then_commands_all() {
    let mut controller = cycling(&[1, 2]);
    controller.assign_schedule(1, two_phase_item(20.0));
    controller.assign_schedule(2, two_phase_item(20.0));
    let mut net = network(&[1, 2]);

    controller.initialize(0.0, &mut net);
    assert!(controller.get_command_for(1).is_none());

    controller.update_controller(&mut net, 20.0);

    for actuator in net.values() {
        assert_eq!(
            actuator.calls,
            vec![
                ActuatorCall::TurnOff(0.0),
                ActuatorCall::Command(Some(0)),
                ActuatorCall::Stage(vec![1]),
            ]
        );
    }
    assert_eq!(controller.listener().unwrap().len(), 1);
}
