//! Constraint matching.
//!
//! Extra specs are either plain scalars (compared by equality) or strings
//! in a small operator language:
//!
//! ```text
//! "x86_64"              plain equality
//! "= 4"   ">= 4"        offered >= 4       (numeric, `+`/`-` suffixes are aliases)
//! "== 4"  "!= 4"        numeric equality / inequality
//! "<= 4"                offered <= 4
//! "s== fermi"           string comparison (s==, s!=, s<, s<=, s>, s>=)
//! "<in> avx"            substring of the offered value
//! "<or> a <or> b"       offered equals any alternative
//! ```
//!
//! Base resources (vcpus, memory, disk) are expressed as the same
//! [`Constraint`] type and go through the same numeric operator table.

use fleetgrid_state::{ResourceProfile, SpecValue};
use thiserror::Error;
use tracing::debug;

use crate::capability::{CapabilityValue, NormalizedCapability};

/// Numeric comparison, offered value on the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    /// `=`, `>=`
    AtLeast,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<=`
    AtMost,
}

impl NumericOp {
    pub fn apply(self, offered: f64, wanted: f64) -> bool {
        match self {
            NumericOp::AtLeast => offered >= wanted,
            NumericOp::Equal => offered == wanted,
            NumericOp::NotEqual => offered != wanted,
            NumericOp::AtMost => offered <= wanted,
        }
    }
}

/// Lexicographic comparison, offered value on the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl TextOp {
    pub fn apply(self, offered: &str, wanted: &str) -> bool {
        match self {
            TextOp::Eq => offered == wanted,
            TextOp::Ne => offered != wanted,
            TextOp::Lt => offered < wanted,
            TextOp::Le => offered <= wanted,
            TextOp::Gt => offered > wanted,
            TextOp::Ge => offered >= wanted,
        }
    }
}

/// A comparison operator taking a single operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Numeric(NumericOp),
    Text(TextOp),
    /// `<in>`
    Contains,
}

impl Operator {
    /// Look up an operator token. `<or>` is handled by [`Requirement::parse`].
    pub fn parse(token: &str) -> Option<Self> {
        let op = match token {
            "s==" => Operator::Text(TextOp::Eq),
            "s!=" => Operator::Text(TextOp::Ne),
            "s<" => Operator::Text(TextOp::Lt),
            "s<=" => Operator::Text(TextOp::Le),
            "s>" => Operator::Text(TextOp::Gt),
            "s>=" => Operator::Text(TextOp::Ge),
            "<in>" => Operator::Contains,
            _ => {
                let base = token
                    .strip_suffix(|c: char| c == '+' || c == '-')
                    .unwrap_or(token);
                match base {
                    "=" | ">=" => Operator::Numeric(NumericOp::AtLeast),
                    "==" => Operator::Numeric(NumericOp::Equal),
                    "!=" => Operator::Numeric(NumericOp::NotEqual),
                    "<=" => Operator::Numeric(NumericOp::AtMost),
                    _ => return None,
                }
            }
        };
        Some(op)
    }
}

/// An extra-spec expression that cannot be evaluated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("{value:?} is not numeric")]
    NotNumeric { value: String },
}

/// Parsed form of a single extra-spec value.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// Boolean or numeric scalar, compared by equality.
    Scalar(SpecValue),
    /// Single-token string, compared by equality.
    Plain(String),
    /// `<or> v1 <or> v2 ...`
    AnyOf(Vec<String>),
    Compare { op: Operator, operand: String },
    /// Unknown operator token; the full string is compared by equality.
    Unrecognized(String),
}

impl Requirement {
    pub fn parse(value: &SpecValue) -> Self {
        let raw = match value {
            SpecValue::Text(raw) => raw,
            scalar => return Requirement::Scalar(scalar.clone()),
        };

        let words: Vec<&str> = raw.split_whitespace().collect();
        if words.len() <= 1 {
            return Requirement::Plain(raw.clone());
        }

        if words[0] == "<or>" {
            let alternatives = words.iter().skip(1).step_by(2).map(|w| w.to_string()).collect();
            return Requirement::AnyOf(alternatives);
        }

        match Operator::parse(words[0]) {
            Some(op) => Requirement::Compare {
                op,
                operand: words[1..].concat(),
            },
            None => Requirement::Unrecognized(raw.clone()),
        }
    }

    /// Evaluate against an offered capability.
    pub fn evaluate(&self, offered: &CapabilityValue) -> Result<bool, ConstraintError> {
        let matched = match self {
            Requirement::Scalar(SpecValue::Bool(b)) => match offered {
                CapabilityValue::Integer(n) => *n == i64::from(*b),
                CapabilityValue::Text(t) => *t == b.to_string(),
            },
            Requirement::Scalar(SpecValue::Integer(n)) => offered.as_i64() == Some(*n),
            Requirement::Scalar(SpecValue::Float(x)) => {
                offered.as_i64().map(|n| n as f64) == Some(*x)
            }
            Requirement::Scalar(SpecValue::Text(s)) | Requirement::Plain(s) => {
                offered.to_string() == *s
            }
            Requirement::AnyOf(alternatives) => {
                let offered = offered.to_string();
                alternatives.iter().any(|alt| *alt == offered)
            }
            Requirement::Compare {
                op: Operator::Numeric(op),
                operand,
            } => {
                let have = offered.as_f64().ok_or_else(|| ConstraintError::NotNumeric {
                    value: offered.to_string(),
                })?;
                let want: f64 = operand.parse().map_err(|_| ConstraintError::NotNumeric {
                    value: operand.clone(),
                })?;
                op.apply(have, want)
            }
            Requirement::Compare {
                op: Operator::Text(op),
                operand,
            } => op.apply(&offered.to_string(), operand),
            Requirement::Compare {
                op: Operator::Contains,
                operand,
            } => offered.to_string().contains(operand.as_str()),
            Requirement::Unrecognized(raw) => offered.to_string() == *raw,
        };
        Ok(matched)
    }

    /// The wanted amount when this is a bare number.
    fn plain_number(&self) -> Option<f64> {
        match self {
            Requirement::Scalar(SpecValue::Integer(n)) => Some(*n as f64),
            Requirement::Scalar(SpecValue::Float(x)) => Some(*x),
            Requirement::Plain(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Comma-separated items of a plain requirement, if there are several.
    fn wanted_set(&self) -> Option<Vec<&str>> {
        let Requirement::Plain(s) = self else {
            return None;
        };
        let items: Vec<&str> = s.split(',').map(str::trim).collect();
        (items.len() > 1).then_some(items)
    }
}

/// How an extra spec is compared with an offered capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The operator language only.
    Exact,
    /// A comma-separated plain requirement passes when every wanted item
    /// is among the offered items.
    Containment,
    /// As `Containment`, and a bare number against an integer capability
    /// is a minimum (`wanted <= offered`).
    Capacity,
}

/// Match with the operator language only.
pub fn matches(offered: Option<&CapabilityValue>, requirement: &SpecValue) -> bool {
    matches_with(offered, requirement, MatchMode::Exact)
}

/// Match under the given mode. A missing capability never matches.
pub fn matches_with(
    offered: Option<&CapabilityValue>,
    requirement: &SpecValue,
    mode: MatchMode,
) -> bool {
    let Some(offered) = offered else {
        return false;
    };
    let parsed = Requirement::parse(requirement);

    if mode == MatchMode::Capacity {
        if let (CapabilityValue::Integer(have), Some(want)) = (offered, parsed.plain_number()) {
            return want <= *have as f64;
        }
    }

    if mode != MatchMode::Exact {
        if let Some(wanted) = parsed.wanted_set() {
            let offered_items = offered.items();
            return wanted
                .iter()
                .all(|want| offered_items.iter().any(|item| item == want));
        }
    }

    match parsed.evaluate(offered) {
        Ok(matched) => matched,
        Err(err) => {
            debug!(%err, %requirement, "malformed constraint treated as mismatch");
            false
        }
    }
}

// ── Unified constraints ────────────────────────────────────────────

/// Base resources every profile asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseResource {
    Vcpus,
    MemoryMb,
    RootGb,
}

impl BaseResource {
    pub fn name(self) -> &'static str {
        match self {
            BaseResource::Vcpus => "vcpus",
            BaseResource::MemoryMb => "memory_mb",
            BaseResource::RootGb => "root_gb",
        }
    }

    /// Free amount of this resource advertised by the host.
    pub fn available(self, caps: &NormalizedCapability) -> Option<i64> {
        match self {
            BaseResource::Vcpus => {
                Some(caps.integer("vcpus")?.saturating_sub(caps.integer("vcpus_used")?))
            }
            BaseResource::MemoryMb => caps.integer("host_memory_free"),
            BaseResource::RootGb => {
                Some(caps.integer("disk_total")?.saturating_sub(caps.integer("disk_used")?))
            }
        }
    }
}

/// A single requirement of a placement request.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint<'a> {
    BaseResource { resource: BaseResource, wanted: u64 },
    ExtraSpec { key: &'a str, requirement: &'a SpecValue },
}

impl Constraint<'_> {
    pub fn evaluate(&self, caps: &NormalizedCapability, mode: MatchMode) -> bool {
        match self {
            Constraint::BaseResource { resource, wanted } => match resource.available(caps) {
                Some(free) => NumericOp::AtLeast.apply(free as f64, *wanted as f64),
                None => {
                    debug!(resource = resource.name(), "base resource not advertised");
                    false
                }
            },
            Constraint::ExtraSpec { key, requirement } => {
                matches_with(caps.get(key), requirement, mode)
            }
        }
    }
}

/// The vcpus, memory and root-disk constraints of a profile.
pub fn base_constraints(profile: &ResourceProfile) -> [Constraint<'static>; 3] {
    [
        Constraint::BaseResource {
            resource: BaseResource::Vcpus,
            wanted: u64::from(profile.vcpus),
        },
        Constraint::BaseResource {
            resource: BaseResource::MemoryMb,
            wanted: profile.memory_mb,
        },
        Constraint::BaseResource {
            resource: BaseResource::RootGb,
            wanted: profile.root_gb,
        },
    ]
}

/// The extra specs of a profile, minus the keys in `skip`.
pub fn extra_spec_constraints<'a>(
    profile: &'a ResourceProfile,
    skip: &'a [&'a str],
) -> impl Iterator<Item = Constraint<'a>> + 'a {
    profile
        .extra_specs
        .iter()
        .filter(move |(key, _)| !skip.contains(&key.as_str()))
        .map(|(key, requirement)| Constraint::ExtraSpec {
            key: key.as_str(),
            requirement,
        })
}
