use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Table};
use cpt_core::{Phase, RunState};
use cpt_experiment::{
    Battery, Collaborators, ReplayDriver, RunController, SequenceGenerator, Session, Settings,
    SharedMetrics, TestSpec,
};
use cpt_timing::{HighPrecisionTimer, ManualTimer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::participant::SimulatedParticipant;
use crate::report::SessionRecord;
use crate::terminal::{Bell, Keyboard, TerminalDisplay};

/// Virtual-time cap per simulated run, so a participant stuck in trial
/// restarts cannot spin forever.
const SIMULATION_LIMIT: Duration = Duration::from_secs(30 * 60);

pub struct App {
    settings: Settings,
    battery: Battery,
}

impl App {
    pub fn load(config: Option<&Path>) -> Result<Self> {
        let settings = match config {
            Some(path) => Settings::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Settings::default(),
        };
        let battery = settings.battery();
        Ok(Self { settings, battery })
    }

    pub fn battery(&self) -> Result<()> {
        let mut table = Table::new();
        table.set_header(vec!["Test", "Alphabet", "Target", "Polarity", "Quota"]);
        for t in &self.battery.tests {
            let alphabet: Vec<&str> = t.alphabet.symbols().iter().map(|s| s.as_str()).collect();
            let plan = t.plan(self.settings.run.real_round_count as usize)?;
            let quota = t
                .alphabet
                .symbols()
                .iter()
                .filter_map(|s| plan.quota(s).map(|q| format!("{s}={q}")))
                .collect::<Vec<_>>()
                .join(" ");
            table.add_row(vec![
                Cell::new(&t.id),
                Cell::new(alphabet.join(", ")),
                Cell::new(&t.target),
                Cell::new(t.polarity),
                Cell::new(quota),
            ]);
        }
        println!("{table}");
        println!("{} tests", self.battery.tests.len());
        Ok(())
    }

    pub fn sequence(&self, test: &str, phase: Phase, seed: Option<u64>, json: bool) -> Result<()> {
        let spec = self.battery.get(test)?;
        let run = &self.settings.run;
        let mut generator = SequenceGenerator::new(spec.alphabet.clone(), rng(seed))
            .with_sampling_attempts(run.sampling_attempts)
            .with_best_effort(run.allow_best_effort);
        let sequence = match phase {
            Phase::Trial => generator.trial(run.trial_initial_length),
            Phase::Real => generator.real(&spec.plan(run.real_round_count as usize)?)?,
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&sequence)?);
            return Ok(());
        }
        let line: Vec<&str> = sequence.symbols().iter().map(|s| s.as_str()).collect();
        println!("{}", line.join(" "));
        println!(
            "{} rounds, target '{}' x{}, strategy {:?}",
            sequence.len(),
            spec.target,
            sequence.count_of(&spec.target),
            sequence.strategy()
        );
        Ok(())
    }

    pub fn simulate(
        &self,
        tests: Option<&str>,
        seed: Option<u64>,
        accuracy: f64,
        mean_rt_ms: u64,
        output: Option<PathBuf>,
        json: bool,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&accuracy) {
            bail!("accuracy must be within 0..=1, got {accuracy}");
        }
        let selected = self.select(tests)?;
        let mut master = rng(seed);
        let metrics = SharedMetrics::new();
        let advances = Arc::new(AtomicUsize::new(0));

        for spec in selected {
            let mut next = Some(Phase::Trial);
            while let Some(phase) = next {
                next = phase.next();
                let timer = ManualTimer::new();
                let controller = RunController::new(
                    spec.clone(),
                    phase,
                    self.settings.run.clone(),
                    timer.clone(),
                    StdRng::seed_from_u64(master.random()),
                    self.collaborators(&metrics, &advances),
                )?;
                let mut participant = SimulatedParticipant::new(
                    spec,
                    accuracy,
                    mean_rt_ms,
                    self.settings.run.round_interval(),
                    StdRng::seed_from_u64(master.random()),
                );
                let report = ReplayDriver::new(controller, timer)
                    .run(&mut participant, SIMULATION_LIMIT);
                info!(
                    test = %spec.id,
                    %phase,
                    state = ?report.state,
                    restarts = report.restarts,
                    elapsed_s = report.elapsed.as_secs(),
                    "simulated"
                );
                if phase.is_trial() && report.state != RunState::Completed {
                    warn!(test = %spec.id, "trial never passed, skipping real run");
                    break;
                }
            }
        }

        let record = SessionRecord::new(metrics.snapshot());
        if json {
            println!("{}", record.to_json_pretty()?);
        } else {
            println!("{}", record.summary_table());
            println!("{} runs completed", advances.load(Ordering::SeqCst));
        }
        if let Some(path) = output {
            record.write(&path)?;
            eprintln!("Session record: {}", path.display());
        }
        Ok(())
    }

    pub async fn run(
        &self,
        tests: Option<&str>,
        skip_trial: bool,
        quiet: bool,
        seed: Option<u64>,
        output: Option<PathBuf>,
    ) -> Result<()> {
        let selected = self.select(tests)?;
        let mut master = rng(seed);
        let metrics = SharedMetrics::new();
        let advances = Arc::new(AtomicUsize::new(0));
        let keyboard = Keyboard::spawn();
        let mut display = TerminalDisplay::stdout();

        let first = if skip_trial { Phase::Real } else { Phase::Trial };

        'battery: for spec in selected {
            display.announce(spec)?;
            let mut next = Some(first);
            while let Some(phase) = next {
                next = phase.next();
                let mut collaborators = self.collaborators(&metrics, &advances);
                if !quiet {
                    collaborators = collaborators.with_audio(Bell::stdout());
                }
                let controller = RunController::new(
                    spec.clone(),
                    phase,
                    self.settings.run.clone(),
                    HighPrecisionTimer::new(),
                    StdRng::seed_from_u64(master.random()),
                    collaborators,
                )?;
                let mut session = Session::new(controller);
                keyboard.attach(session.keys());
                let outcome = session.run(&mut display).await?;
                keyboard.detach();

                if outcome.state == RunState::Aborted {
                    warn!(test = %spec.id, %phase, "session aborted");
                    break 'battery;
                }
            }
        }

        let record = SessionRecord::new(metrics.snapshot());
        println!("{}", record.summary_table());
        if let Some(path) = output {
            record.write(&path)?;
            println!("Session record: {}", path.display());
        }
        Ok(())
    }

    fn select(&self, tests: Option<&str>) -> Result<Vec<&TestSpec>> {
        match tests {
            None => Ok(self.battery.tests.iter().collect()),
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| self.battery.get(id).map_err(anyhow::Error::from))
                .collect(),
        }
    }

    fn collaborators(&self, metrics: &SharedMetrics, advances: &Arc<AtomicUsize>) -> Collaborators {
        let advances = advances.clone();
        Collaborators::new(metrics.clone(), move || {
            advances.fetch_add(1, Ordering::SeqCst);
        })
    }
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
