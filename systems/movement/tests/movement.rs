use std::time::Duration;

use wave_defence_core::{MonsterId, Motion, Navigation, NavigationError, UnitMotion, Vec2};
use wave_defence_system_movement::StraightLineNavigator;

const STEP: Duration = Duration::from_millis(100);

fn brisk() -> Motion {
    Motion {
        speed: 5.0,
        acceleration: 50.0,
    }
}

fn run_until_arrival(navigator: &mut StraightLineNavigator, max_steps: usize) -> Vec<UnitMotion> {
    let mut history = Vec::new();
    for _ in 0..max_steps {
        let mut motions = Vec::new();
        navigator.advance(STEP, &mut motions);
        let done = motions.iter().any(|motion| motion.arrived);
        history.extend(motions);
        if done {
            break;
        }
    }
    history
}

#[test]
fn walks_toward_destination_and_reports_arrival_once() {
    let mut navigator = StraightLineNavigator::new();
    let unit = MonsterId::new(0);
    navigator
        .set_destination(unit, Vec2::ZERO, Vec2::new(3.0, 4.0), brisk())
        .expect("destination accepted");

    let history = run_until_arrival(&mut navigator, 100);
    let last = history.last().expect("unit moved");

    assert!(last.arrived);
    assert_eq!(last.position, Vec2::new(3.0, 4.0));
    assert_eq!(history.iter().filter(|motion| motion.arrived).count(), 1);

    let mut after = Vec::new();
    navigator.advance(STEP, &mut after);
    assert!(after.is_empty(), "arrived units are not reported again");
}

#[test]
fn positions_progress_monotonically_along_the_segment() {
    let mut navigator = StraightLineNavigator::new();
    let unit = MonsterId::new(7);
    navigator
        .set_destination(unit, Vec2::ZERO, Vec2::new(10.0, 0.0), brisk())
        .expect("destination accepted");

    let history = run_until_arrival(&mut navigator, 100);
    for pair in history.windows(2) {
        assert!(pair[1].position.x >= pair[0].position.x);
        assert_eq!(pair[1].position.y, 0.0);
    }
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut navigator = StraightLineNavigator::new();
    let unit = MonsterId::new(1);
    navigator
        .set_destination(unit, Vec2::ZERO, Vec2::X, brisk())
        .expect("first registration");

    assert_eq!(
        navigator.set_destination(unit, Vec2::ZERO, Vec2::X, brisk()),
        Err(NavigationError::AlreadyNavigating(unit))
    );
}

#[test]
fn non_finite_destination_is_unreachable() {
    let mut navigator = StraightLineNavigator::new();
    let unit = MonsterId::new(2);

    assert_eq!(
        navigator.set_destination(unit, Vec2::ZERO, Vec2::new(f32::NAN, 0.0), brisk()),
        Err(NavigationError::Unreachable(unit))
    );
    assert_eq!(navigator.tracked(), 0);
}

#[test]
fn released_units_stop_reporting() {
    let mut navigator = StraightLineNavigator::new();
    let kept = MonsterId::new(3);
    let released = MonsterId::new(4);
    for unit in [kept, released] {
        navigator
            .set_destination(unit, Vec2::ZERO, Vec2::new(50.0, 0.0), brisk())
            .expect("destination accepted");
    }

    navigator.release(released);
    let mut motions = Vec::new();
    navigator.advance(STEP, &mut motions);

    assert_eq!(motions.len(), 1);
    assert_eq!(motions[0].unit, kept);
}

#[test]
fn wider_arrival_tolerance_snaps_sooner() {
    let unit = MonsterId::new(5);
    let goal = Vec2::new(1.4, 0.0);

    let mut strict = StraightLineNavigator::new();
    let mut lenient = StraightLineNavigator::with_arrival_tolerance(1.0);
    for navigator in [&mut strict, &mut lenient] {
        navigator
            .set_destination(unit, Vec2::ZERO, goal, brisk())
            .expect("destination accepted");
    }

    let mut motions = Vec::new();
    strict.advance(STEP, &mut motions);
    assert!(!motions[0].arrived);

    motions.clear();
    lenient.advance(STEP, &mut motions);
    assert!(motions[0].arrived);
    assert_eq!(motions[0].position, goal);
}
