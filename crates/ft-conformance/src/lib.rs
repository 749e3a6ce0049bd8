#![forbid(unsafe_code)]

use ft_audit::{AuditError, AuditSession, TrackedValue, operand_kinds, wrap_tree};
use ft_core::{ArgValue, Literal};
use ft_kernels::KernelError;
use ft_schema::{ArgSpec, OpSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One scripted invocation: plain argument values that the harness wraps
/// before dispatching, so every tensor leaf goes through the audit hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCall {
    pub operation: String,
    pub args: Vec<ArgValue>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, ArgValue>,
}

impl ScenarioCall {
    #[must_use]
    pub fn positional(operation: impl Into<String>, args: Vec<ArgValue>) -> Self {
        Self {
            operation: operation.into(),
            args,
            kwargs: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    pub calls: Vec<ScenarioCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResult {
    Passed,
    ContractViolation { argument: String },
    Failed { detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub operation: String,
    pub result: CallResult,
}

/// Per-scenario report: every call's outcome plus the session log as it
/// stood when the scenario finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub total_calls: usize,
    pub passed_calls: usize,
    pub outcomes: Vec<CallOutcome>,
    pub log: Vec<String>,
}

impl ScenarioReport {
    #[must_use]
    pub fn first_violation(&self) -> Option<&str> {
        self.outcomes.iter().find_map(|outcome| match &outcome.result {
            CallResult::ContractViolation { argument } => Some(argument.as_str()),
            CallResult::Passed | CallResult::Failed { .. } => None,
        })
    }
}

/// Run every call of a scenario against the given session. A failing call
/// does not stop the scenario: each invocation is an independent pipeline
/// run, and the log keeps recording attempts.
pub fn run_scenario(session: &mut AuditSession, spec: &ScenarioSpec) -> ScenarioReport {
    let mut outcomes = Vec::with_capacity(spec.calls.len());
    for call in &spec.calls {
        let result = run_call(session, call);
        outcomes.push(CallOutcome {
            operation: call.operation.clone(),
            result,
        });
    }

    let passed_calls = outcomes
        .iter()
        .filter(|outcome| outcome.result == CallResult::Passed)
        .count();
    ScenarioReport {
        scenario: spec.name.clone(),
        total_calls: spec.calls.len(),
        passed_calls,
        outcomes,
        log: session.log().entries().to_vec(),
    }
}

/// Run a scenario against a fresh session over the bundled registries.
#[must_use]
pub fn run_builtin_scenario(spec: &ScenarioSpec) -> ScenarioReport {
    let mut session = AuditSession::builtin();
    run_scenario(&mut session, spec)
}

fn run_call(session: &mut AuditSession, call: &ScenarioCall) -> CallResult {
    let args = match call
        .args
        .iter()
        .map(|value| wrap_tree(value.clone()))
        .collect::<Result<Vec<TrackedValue>, _>>()
    {
        Ok(args) => args,
        Err(err) => {
            return CallResult::Failed {
                detail: err.to_string(),
            };
        }
    };
    let kwargs = match call
        .kwargs
        .iter()
        .map(|(key, value)| wrap_tree(value.clone()).map(|wrapped| (key.clone(), wrapped)))
        .collect::<Result<BTreeMap<String, TrackedValue>, _>>()
    {
        Ok(kwargs) => kwargs,
        Err(err) => {
            return CallResult::Failed {
                detail: err.to_string(),
            };
        }
    };

    match session.dispatch(&call.operation, &operand_kinds(&args), &args, &kwargs) {
        Ok(_) => CallResult::Passed,
        Err(AuditError::MutatedImmutableArgument { argument }) => {
            CallResult::ContractViolation { argument }
        }
        Err(err) => CallResult::Failed {
            detail: err.to_string(),
        },
    }
}

/// A kernel whose declared contract says both arguments are immutable but
/// whose implementation scales the receiver in place. Conformance suites
/// install it to verify the audit catches the disagreement.
pub fn rogue_scale(
    args: &[ArgValue],
    _kwargs: &BTreeMap<String, ArgValue>,
) -> Result<ArgValue, KernelError> {
    if args.is_empty() {
        return Err(KernelError::ArityMismatch {
            operation: "scale",
            expected: 2,
            actual: 0,
        });
    }
    let target = args[0].as_tensor().ok_or(KernelError::TypeMismatch {
        operation: "scale",
        detail: "expected tensor input",
    })?;
    let factor = args
        .get(1)
        .and_then(ArgValue::as_i64_scalar)
        .unwrap_or(2);
    let scaled = target
        .elements()
        .into_iter()
        .map(|literal| match literal {
            Literal::I64(value) => Literal::I64(value * factor),
            other => other,
        })
        .collect();
    target.overwrite_elements(scaled)?;
    Ok(ArgValue::Tensor(target.clone()))
}

/// Register `scale` with an immutable-everything schema and the in-place
/// [`rogue_scale`] kernel behind it.
pub fn install_rogue_scale(session: &mut AuditSession) {
    session.schemas_mut().register(OpSchema::new(
        "scale",
        vec![
            ArgSpec::required("self", false),
            ArgSpec::optional("factor", false),
        ],
    ));
    session.kernels_mut().register("scale", rogue_scale);
}

/// Two small integer vectors, the fixture most scenarios start from.
pub fn vector_pair() -> Result<(ArgValue, ArgValue), ft_core::ValueError> {
    let a = ft_core::TensorValue::vector_i64(&[1, 2])?;
    let b = ft_core::TensorValue::vector_i64(&[3, 4])?;
    Ok((ArgValue::Tensor(a), ArgValue::Tensor(b)))
}
