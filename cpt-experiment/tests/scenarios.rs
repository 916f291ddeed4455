use cpt_core::{Outcome, Phase, ResponseRecord, RunResult, RunState, Symbol};
use cpt_experiment::{
    Battery, Collaborators, Directive, Passive, RESTART_MESSAGE, ReplayDriver, RunConfig,
    RunController, RunEvent, Screen, Sequence, Wake,
};
use cpt_timing::{ManualTimer, Timer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Calls {
    recorded: Vec<(String, RunResult, Duration)>,
    advanced: Vec<Duration>,
}

fn recording(timer: &ManualTimer, calls: &Arc<Mutex<Calls>>) -> Collaborators {
    let (t1, c1) = (timer.clone(), calls.clone());
    let (t2, c2) = (timer.clone(), calls.clone());
    Collaborators::new(
        move |id: &str, result: &RunResult| -> anyhow::Result<()> {
            let at = Duration::from_nanos(t1.now());
            c1.lock().unwrap().recorded.push((id.to_string(), result.clone(), at));
            Ok(())
        },
        move || {
            let at = Duration::from_nanos(t2.now());
            c2.lock().unwrap().advanced.push(at);
        },
    )
}

fn build(
    id: &str,
    phase: Phase,
    config: RunConfig,
    seed: u64,
) -> (RunController<ManualTimer, StdRng>, ManualTimer, Arc<Mutex<Calls>>) {
    let timer = ManualTimer::new();
    let calls = Arc::new(Mutex::new(Calls::default()));
    let controller = RunController::new(
        Battery::standard().get(id).unwrap().clone(),
        phase,
        config,
        timer.clone(),
        StdRng::seed_from_u64(seed),
        recording(&timer, &calls),
    )
    .unwrap();
    (controller, timer, calls)
}

fn syms(names: &[&str]) -> Vec<Symbol> {
    names.iter().map(|n| Symbol::new(n)).collect()
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn reaction_time_is_measured_from_the_painted_stimulus() {
    let (controller, timer, _) = build("test1", Phase::Real, RunConfig::default(), 1);
    let sequence = Sequence::provided(syms(&[
        "circle", "star", "triangle", "circle", "triangle", "star", "triangle", "circle",
        "triangle", "star", "triangle", "circle", "triangle", "star", "triangle", "circle",
        "triangle", "star", "circle", "star",
    ]));
    let controller = controller.with_sequence(sequence).unwrap();
    let mut driver = ReplayDriver::new(controller, timer).with_paint_latency(ms(16));
    // round 3 is advanced at 8000 ms and painted 16 ms later
    driver.press_at(ms(8016 + 240));
    let report = driver.run(&mut Passive, ms(8500));

    assert_eq!(report.record.hits, 1);
    assert_eq!(report.record.hit_reaction_times.get(&3), Some(&240));
    assert_eq!(report.record.commission_misses, 0);
}

#[test]
fn three_commission_misses_restart_the_trial() {
    let config = RunConfig {
        trial_success_hits: 100,
        ..RunConfig::default()
    };
    let (mut c, _, calls) = build("test1", Phase::Trial, config, 9);
    let before = c.sequence().clone();

    c.handle_event(RunEvent::Mount);
    while c.state() != RunState::Running {
        let epoch = c.epoch();
        c.handle_event(RunEvent::Wake {
            wake: Wake::Countdown,
            epoch,
        });
    }

    let mut commissions = 0;
    let restart_directives = loop {
        let out = c.handle_event(RunEvent::KeyPress);
        match c.last_outcome() {
            Some(Outcome::CommissionMiss) => commissions += 1,
            Some(Outcome::Hit) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
        if c.state() == RunState::Restarting {
            break out;
        }
        let epoch = c.epoch();
        c.handle_event(RunEvent::Tick { epoch });
    };

    assert_eq!(commissions, 3);
    assert!(restart_directives.contains(&Directive::StopClock));
    assert!(restart_directives.contains(&Directive::Show(Screen::Message(
        RESTART_MESSAGE.to_string()
    ))));
    assert_eq!(c.record(), &ResponseRecord::default());
    assert_eq!(c.round(), 1);
    assert_eq!(c.restarts(), 1);
    assert_ne!(c.sequence(), &before);

    // a tick from the old clock must not leak into the new run
    assert!(c.handle_event(RunEvent::Tick { epoch: 0 }).is_empty());

    let epoch = c.epoch();
    let out = c.handle_event(RunEvent::Wake {
        wake: Wake::Restart,
        epoch,
    });
    assert_eq!(c.state(), RunState::Countdown(cpt_core::CountdownStep::LeadIn));
    assert_eq!(
        out[0],
        Directive::Show(Screen::Message("Trial starting...".into()))
    );
    assert!(calls.lock().unwrap().advanced.is_empty());
}

#[test]
fn real_run_completes_on_the_tick_after_the_last_round() {
    let (controller, timer, calls) = build("test1", Phase::Real, RunConfig::default(), 4);
    let targets = controller.sequence().count_of(&Symbol::new("triangle"));
    let mut driver = ReplayDriver::new(controller, timer);
    let report = driver.run(&mut Passive, Duration::from_secs(120));

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(driver.stimuli().len(), 20);
    assert_eq!(driver.stimuli().last().map(|(r, _)| *r), Some(20));
    assert_eq!(report.record.omission_misses as usize, targets);
    assert_eq!(targets, 8);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.recorded.len(), 1);
    let (id, result, recorded_at) = &calls.recorded[0];
    assert_eq!(id, "test1");
    assert_eq!(result, &report.record);
    // countdown 5000 ms, then round 21's tick at 20 * 1500 ms
    assert_eq!(*recorded_at, ms(35_000));
    assert_eq!(calls.advanced, vec![ms(37_000)]);

    let done = driver
        .transcript()
        .iter()
        .find(|e| e.screen == Screen::Message("Test is done!".into()))
        .unwrap();
    assert_eq!(done.at, ms(35_000));
}

#[test]
fn final_round_stays_scoreable_until_completion() {
    let (controller, timer, calls) = build("test2", Phase::Real, RunConfig::default(), 8);
    let last_is_target = controller.sequence().get(20) == Some(&Symbol::new("star"));
    let mut driver = ReplayDriver::new(controller, timer);
    // round 20 is shown at 5000 + 19 * 1500 ms
    driver.press_at(ms(33_500 + 700));
    let report = driver.run(&mut Passive, Duration::from_secs(120));

    if last_is_target {
        assert_eq!(report.record.hit_reaction_times.get(&20), Some(&700));
    } else {
        assert_eq!(report.record.commission_misses, 1);
    }
    assert_eq!(calls.lock().unwrap().recorded.len(), 1);
}

#[test]
fn no_go_presses_score_inverted() {
    let (controller, timer, _) = build("test6", Phase::Real, RunConfig::default(), 2);
    let circles = controller.sequence().count_of(&Symbol::new("circle"));
    let mut driver = ReplayDriver::new(controller, timer);
    let mut always = |_: u32, _: &Symbol| Some(ms(350));
    let report = driver.run(&mut always, Duration::from_secs(120));

    assert_eq!(circles, 5);
    assert_eq!(report.record.commission_misses, 5);
    assert_eq!(report.record.hits, 15);
    assert_eq!(report.record.omission_misses, 0);
    assert!(report.record.hit_reaction_times.values().all(|&rt| rt == 350));
}

#[test]
fn third_hit_ends_the_trial_early() {
    let (controller, timer, calls) = build("test4", Phase::Trial, RunConfig::default(), 6);
    let mut driver = ReplayDriver::new(controller, timer);
    let mut hits_seen = 0;
    let mut on_target = |_: u32, s: &Symbol| {
        if s.as_str() == "1" {
            hits_seen += 1;
            Some(ms(400))
        } else {
            None
        }
    };
    let report = driver.run(&mut on_target, Duration::from_secs(600));

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.record.hits, 3);
    assert_eq!(hits_seen, 3);
    assert_eq!(report.restarts, 0);
    let last_round = driver.stimuli().last().map(|(r, _)| *r).unwrap();
    assert_eq!(
        driver.controller().sequence().get(last_round),
        Some(&Symbol::new("1"))
    );
    assert!(
        driver
            .transcript()
            .iter()
            .any(|e| e.screen == Screen::Message("Trial finished!".into()))
    );
    let calls = calls.lock().unwrap();
    assert!(calls.recorded.is_empty());
    assert_eq!(calls.advanced.len(), 1);
}

#[test]
fn omissions_alone_can_restart_a_trial() {
    let (controller, timer, calls) = build("test3", Phase::Trial, RunConfig::default(), 12);
    let mut driver = ReplayDriver::new(controller, timer);
    driver.abort_at(Duration::from_secs(60));
    let report = driver.run(&mut Passive, Duration::from_secs(120));

    assert_eq!(report.state, RunState::Aborted);
    assert!(report.restarts >= 1);
    assert!(driver.transcript().iter().any(|e| e.screen
        == Screen::Message(RESTART_MESSAGE.to_string())));
    assert!(calls.lock().unwrap().advanced.is_empty());
}
