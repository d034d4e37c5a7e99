//! Build an application from a scenario and drive its aggregators.
//!
//! Everything runs on the calling thread: after each step the runner lets
//! every aggregator process its queued changes until nothing moves any more.

use std::collections::{BTreeMap, HashMap};

use pv_core::{DataValidity, PvResult, path};
use pv_modules::{Status, StatusAggregator, StatusOutput, StatusWithMessage};
use pv_runtime::{Application, Decl, Module, ReadAnyGroup};
use serde::Serialize;
use termtree::Tree;

use crate::schema::{Scenario, SetDef, SourceDef};
use crate::ScenarioResult;

enum Source {
    Plain(StatusOutput),
    WithMessage(StatusWithMessage),
}

impl Source {
    fn set(&self, id: &str, status: Status, message: Option<&str>) -> PvResult<()> {
        match self {
            Source::Plain(output) => {
                output.write(status);
                Ok(())
            }
            Source::WithMessage(output) if status == Status::Ok => {
                output.write_ok();
                Ok(())
            }
            Source::WithMessage(output) => {
                let message = match message {
                    Some(message) => message.to_string(),
                    None => format!("{id} switched to {status}"),
                };
                output.write(status, message)
            }
        }
    }
}

struct Stage {
    aggregator: StatusAggregator,
    group: ReadAnyGroup,
    started: bool,
}

impl Stage {
    /// Returns true if anything was read or published.
    fn settle(&mut self) -> PvResult<bool> {
        if self.started {
            let mut progress = false;
            while let Some(change) = self.group.read_any_non_blocking() {
                self.aggregator.process(change)?;
                progress = true;
            }
            return Ok(progress);
        }

        // values are taken as they come in; the first summary waits for all
        let mut progress = false;
        while self.group.read_any_non_blocking().is_some() {
            progress = true;
        }
        if self.aggregator.inputs_ready() {
            self.aggregator.update()?;
            self.started = true;
            progress = true;
        }
        Ok(progress)
    }
}

/// State of one aggregator output after a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateState {
    pub path: String,
    pub status: Status,
    pub message: String,
    pub validity: DataValidity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub description: String,
    pub aggregates: Vec<AggregateState>,
}

pub struct ScenarioRunner {
    app: Application,
    sources: BTreeMap<String, Source>,
    stages: Vec<Stage>,
    steps: Vec<crate::schema::StepDef>,
    next_step: usize,
}

impl ScenarioRunner {
    /// Declare and connect the scenario's module tree and publish the initial
    /// source values.
    pub fn new(scenario: &Scenario) -> ScenarioResult<Self> {
        crate::validate_scenario(scenario)?;
        let app = Application::new(&scenario.name);
        let mut modules: HashMap<String, Module> = HashMap::new();
        modules.insert("/".to_string(), app.root());

        for group in &scenario.groups {
            ensure_group(&mut modules, &group.path)?;
        }

        let mut sources = BTreeMap::new();
        for def in &scenario.sources {
            let source = build_source(&mut modules, def)?;
            sources.insert(def.id.clone(), source);
        }

        let mut aggregators = Vec::new();
        for def in &scenario.aggregators {
            let owner = ensure_group(&mut modules, &def.owner)?;
            let aggregator = StatusAggregator::new(&owner, def.config.clone())?;
            aggregators.push(aggregator);
        }

        let networks = app.connect()?;
        tracing::debug!(
            scenario = %scenario.name,
            networks = networks.len(),
            "scenario connected"
        );

        let stages = aggregators
            .into_iter()
            .map(|aggregator| {
                let group = aggregator.read_any_group()?;
                Ok(Stage {
                    aggregator,
                    group,
                    started: false,
                })
            })
            .collect::<PvResult<Vec<_>>>()?;

        for def in &scenario.sources {
            if let Some(source) = sources.get(&def.id) {
                source.set(&def.id, def.initial, None)?;
            }
        }

        Ok(Self {
            app,
            sources,
            stages,
            steps: scenario.steps.clone(),
            next_step: 0,
        })
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn aggregators(&self) -> impl Iterator<Item = &StatusAggregator> {
        self.stages.iter().map(|s| &s.aggregator)
    }

    pub fn tree(&self) -> Tree<String> {
        self.app.with_model(|m| m.dump_tree())
    }

    /// Let all aggregators process pending changes until none is left.
    pub fn settle(&mut self) -> PvResult<()> {
        loop {
            let mut progress = false;
            for stage in &mut self.stages {
                progress |= stage.settle()?;
            }
            if !progress {
                return Ok(());
            }
        }
    }

    /// Apply source values, then settle.
    pub fn apply(&mut self, description: &str, set: &[SetDef]) -> ScenarioResult<StepReport> {
        for entry in set {
            let source = self.sources.get(&entry.source).ok_or_else(|| {
                crate::ValidationError::MissingReference {
                    id: entry.source.clone(),
                    context: description.to_string(),
                }
            })?;
            source.set(&entry.source, entry.status, entry.message.as_deref())?;
        }
        self.settle()?;
        Ok(self.report(description))
    }

    /// Run the next scripted step, `None` once all steps ran.
    pub fn next_step(&mut self) -> Option<ScenarioResult<StepReport>> {
        let step = self.steps.get(self.next_step)?.clone();
        self.next_step += 1;
        tracing::info!(step = self.next_step, description = %step.description, "running step");
        Some(self.apply(&step.description, &step.set))
    }

    /// Settle the initial values, then run every step.
    pub fn run(&mut self) -> ScenarioResult<Vec<StepReport>> {
        self.settle()?;
        let mut reports = vec![self.report("initial")];
        while let Some(report) = self.next_step() {
            reports.push(report?);
        }
        Ok(reports)
    }

    pub fn report(&self, description: &str) -> StepReport {
        let aggregates = self
            .stages
            .iter()
            .map(|s| {
                let output = s.aggregator.output();
                AggregateState {
                    path: output.name().to_string(),
                    status: output.status(),
                    message: output.message(),
                    validity: output.validity(),
                }
            })
            .collect();
        StepReport {
            description: description.to_string(),
            aggregates,
        }
    }

    pub fn shutdown(&self) {
        self.app.shutdown();
    }
}

/// Module at the absolute `module_path`, creating missing groups on the way.
fn ensure_group(modules: &mut HashMap<String, Module>, module_path: &str) -> PvResult<Module> {
    if let Some(module) = modules.get(module_path) {
        return Ok(module.clone());
    }
    let parent = ensure_group(modules, path::path_name(module_path))?;
    let group = parent.add_group(path::unqualified_name(module_path))?;
    modules.insert(module_path.to_string(), group.clone());
    Ok(group)
}

fn build_source(modules: &mut HashMap<String, Module>, def: &SourceDef) -> PvResult<Source> {
    let parent = ensure_group(modules, path::path_name(&def.module))?;
    let module = parent.add_module(path::unqualified_name(&def.module), &def.id)?;
    modules.insert(def.module.clone(), module.clone());
    let decl = Decl::new(def.output.clone())
        .description(def.id.clone())
        .tags(def.tags.iter().cloned());
    Ok(if def.with_message {
        Source::WithMessage(StatusWithMessage::new(&module, decl)?)
    } else {
        Source::Plain(StatusOutput::new(&module, decl)?)
    })
}
