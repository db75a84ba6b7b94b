//! Scenario harness
//!
//! Drives a registered call-chain topology until its deepest frame throws,
//! captures the trace at a capture point, and compares its normalized form
//! with the chain the registry says should be active.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::classify::{DeclarationLookup, classify_chain};
use crate::compare::{ComparisonResult, compare};
use crate::config::{StackprintConfig, install_stack_trace_limit, stack_trace_limit};
use crate::engine::EngineDialect;
use crate::error::{HarnessFault, RegistryError};
use crate::normalize::{
    ChainEntry, Normalize, NormalizedChain, NormalizedFrame, canonical_label, strip_path,
};
use crate::parser::parse;
use crate::registry::{Registry, Thrown};
use crate::scopes::ScopeIndex;

/// What a capture point observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// The thunk threw; this is its trace text
    Trace(String),
    /// The thunk completed normally
    NoFailure,
}

impl From<Result<(), Thrown>> for Captured {
    fn from(result: Result<(), Thrown>) -> Self {
        match result {
            Ok(()) => Captured::NoFailure,
            Err(thrown) => Captured::Trace(thrown.stack),
        }
    }
}

/// Run `thunk` and turn a throw into its captured trace.
pub fn capture<F>(thunk: F) -> Captured
where
    F: FnOnce() -> Result<(), Thrown>,
{
    thunk().into()
}

/// Await `future` for at most `timeout` and capture its trace.
pub async fn capture_async<F>(
    future: F,
    timeout: Duration,
) -> Result<Captured, tokio::time::error::Elapsed>
where
    F: Future<Output = Result<(), Thrown>>,
{
    tokio::time::timeout(timeout, future).await.map(Captured::from)
}

/// Whether a scenario runs straight through or suspends between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioMode {
    Sync,
    Async,
}

/// A named entry point into the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub entry: String,
    pub mode: ScenarioMode,
}

impl Scenario {
    pub fn sync(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            mode: ScenarioMode::Sync,
        }
    }

    pub fn asynchronous(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            mode: ScenarioMode::Async,
        }
    }
}

/// Result of one scenario on one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    /// A trace was captured and compared
    Compared {
        expected: NormalizedChain,
        actual: NormalizedChain,
        result: ComparisonResult,
    },
    /// The scenario could not produce a comparable trace
    Fault(HarnessFault),
}

/// Outcome of a single scenario run
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario name
    pub scenario: String,
    /// Dialect the trace was captured in
    pub engine: EngineDialect,
    /// Comparison or fault
    pub outcome: ScenarioOutcome,
    /// Wall time
    pub duration: Duration,
}

impl ScenarioResult {
    /// Captured, compared, and equal
    pub fn passed(&self) -> bool {
        matches!(
            &self.outcome,
            ScenarioOutcome::Compared { result, .. } if result.is_equal()
        )
    }
}

/// Runs scenarios against a frozen registry.
pub struct Harness {
    registry: Registry,
    config: StackprintConfig,
    scopes: Option<ScopeIndex>,
}

impl Harness {
    /// Create a harness and install the configured stack-trace limit.
    pub fn new(registry: Registry, config: StackprintConfig) -> Self {
        let requested = config.requested_stack_trace_limit();
        if let Err(installed) = install_stack_trace_limit(requested) {
            tracing::warn!(
                ?requested,
                ?installed,
                "stack trace limit already installed, keeping it"
            );
        }
        Self {
            registry,
            config,
            scopes: None,
        }
    }

    /// Classify captured frames with statically extracted scopes instead of
    /// the registry's own declarations.
    pub fn with_scopes(mut self, scopes: ScopeIndex) -> Self {
        self.scopes = Some(scopes);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &StackprintConfig {
        &self.config
    }

    fn lookup(&self) -> &dyn DeclarationLookup {
        match &self.scopes {
            Some(scopes) => scopes,
            None => &self.registry,
        }
    }

    /// The chain the registry says is active when `scenario` throws.
    pub fn expected_chain(&self, scenario: &Scenario) -> Result<NormalizedChain, HarnessFault> {
        let path = self.registry.call_path(&scenario.entry)?;
        let prefix = self.config.path_prefix_to_strip.as_deref();
        let depth = stack_trace_limit().cap(path.len());

        let mut entries = Vec::with_capacity(depth * 2);
        for decl in path.iter().rev().take(depth) {
            if scenario.mode == ScenarioMode::Async && decl.suspends() {
                entries.push(ChainEntry::AsyncBoundary);
            }
            let site = decl.site();
            entries.push(ChainEntry::Frame(NormalizedFrame {
                label: canonical_label(&decl.label(), decl.kind),
                kind: decl.kind,
                file: site.file.as_deref().map(|f| strip_path(f, prefix)),
                line: site.line,
                has_column: site.column.is_some(),
                tags: decl.tags(),
            }));
        }
        Ok(NormalizedChain::from_entries(entries).normalize(&self.config))
    }

    /// Run the scenario in `engine`'s dialect and return the captured trace.
    pub async fn capture_trace(
        &self,
        scenario: &Scenario,
        engine: EngineDialect,
    ) -> Result<String, HarnessFault> {
        if self.registry.get(&scenario.entry).is_none() {
            return Err(RegistryError::UnknownEntry(scenario.entry.clone()).into());
        }

        let captured = match scenario.mode {
            ScenarioMode::Sync => capture(|| self.registry.invoke(&scenario.entry, engine)),
            ScenarioMode::Async => {
                let timeout = self.config.timeout();
                capture_async(self.registry.invoke_async(&scenario.entry, engine), timeout)
                    .await
                    .map_err(|_| HarnessFault::NeverSettled {
                        scenario: scenario.name.clone(),
                        timeout,
                    })?
            }
        };

        match captured {
            Captured::Trace(raw) => Ok(raw),
            Captured::NoFailure => Err(HarnessFault::NeverThrew(scenario.name.clone())),
        }
    }

    /// Parse, classify and normalize a captured trace.
    pub fn normalize_trace(
        &self,
        scenario: &Scenario,
        raw: &str,
    ) -> Result<NormalizedChain, HarnessFault> {
        let chain = parse(raw)
            .into_chain()
            .ok_or_else(|| HarnessFault::EmptyTrace(scenario.name.clone()))?;
        let frames = classify_chain(&chain, Some(self.lookup()));
        Ok(frames.normalize(&self.config))
    }

    async fn try_run(
        &self,
        scenario: &Scenario,
        engine: EngineDialect,
    ) -> Result<ScenarioOutcome, HarnessFault> {
        let raw = self.capture_trace(scenario, engine).await?;
        let actual = self.normalize_trace(scenario, &raw)?;
        let expected = self.expected_chain(scenario)?;
        let result = compare(&expected, &actual, &self.config);
        Ok(ScenarioOutcome::Compared {
            expected,
            actual,
            result,
        })
    }

    /// Run one scenario. Faults are reported in the result, never propagated.
    pub async fn run_scenario(&self, scenario: &Scenario, engine: EngineDialect) -> ScenarioResult {
        let start = Instant::now();
        let outcome = match self.try_run(scenario, engine).await {
            Ok(outcome) => outcome,
            Err(fault) => {
                tracing::warn!(scenario = %scenario.name, %engine, "{}", fault);
                ScenarioOutcome::Fault(fault)
            }
        };
        let result = ScenarioResult {
            scenario: scenario.name.clone(),
            engine,
            outcome,
            duration: start.elapsed(),
        };
        tracing::info!(
            scenario = %result.scenario,
            %engine,
            passed = result.passed(),
            "scenario finished"
        );
        result
    }

    /// Run every scenario on every engine, one at a time.
    pub async fn run_all(
        &self,
        scenarios: &[Scenario],
        engines: &[EngineDialect],
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::with_capacity(scenarios.len() * engines.len());
        for &engine in engines {
            for scenario in scenarios {
                results.push(self.run_scenario(scenario, engine).await);
            }
        }
        results
    }
}
